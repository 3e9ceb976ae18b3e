use parking_lot::Mutex;

use super::link_chain::LinkChain;

/// Global store of free link chains that no cache currently owns.
///
/// Only whole bundles are shelved. Short chains left over by dropped caches
/// are merged into a single store-side remainder, which is shelved as a bundle
/// once it fills up. Either way a hand-over takes the lock once; it is the only
/// lock in the allocator.
#[derive(Debug)]
pub(crate) struct BundleStore {
    links_per_bundle: usize,
    shelves: Mutex<Shelves>,
}

#[derive(Debug, Default)]
struct Shelves {
    bundles: Vec<LinkChain>,
    remainder: LinkChain,
}

impl BundleStore {
    pub(crate) fn new(links_per_bundle: usize) -> Self {
        BundleStore {
            links_per_bundle,
            shelves: Mutex::new(Shelves::default()),
        }
    }

    /// Shelves a full bundle.
    pub(crate) fn push(&self, bundle: LinkChain) {
        debug_assert_eq!(
            bundle.len(),
            self.links_per_bundle,
            "only whole bundles are shelved"
        );
        self.shelves.lock().bundles.push(bundle);
    }

    /// Merges a short chain into the remainder.
    pub(crate) fn merge(&self, mut chain: LinkChain) {
        debug_assert!(chain.len() < self.links_per_bundle);

        let mut shelves = self.shelves.lock();
        let shelves = &mut *shelves;
        // SAFETY: the caller hands over `chain`; the remainder is only touched
        // under the lock.
        while let Some(link) = unsafe { chain.pop() } {
            unsafe { shelves.remainder.push(link) };
            if shelves.remainder.len() == self.links_per_bundle {
                shelves.bundles.push(shelves.remainder);
                shelves.remainder = LinkChain::EMPTY;
            }
        }
    }

    /// Takes a bundle, falling back to the remainder once no bundle is left.
    pub(crate) fn pop(&self) -> Option<LinkChain> {
        let mut shelves = self.shelves.lock();
        if let Some(bundle) = shelves.bundles.pop() {
            return Some(bundle);
        }

        let remainder = std::mem::take(&mut shelves.remainder);
        (!remainder.is_empty()).then_some(remainder)
    }

    /// Number of whole bundles on the shelves.
    pub(crate) fn len(&self) -> usize {
        self.shelves.lock().bundles.len()
    }

    /// Number of links in the remainder.
    pub(crate) fn remainder_len(&self) -> usize {
        self.shelves.lock().remainder.len()
    }
}
