//! Read access to already-validated chain history
//!
//! Difficulty rules only ever walk backwards from the tip by following
//! `prev_block_hash` links, so the view is a plain lookup by hash. History may
//! be truncated at a checkpoint: a lookup that returns `None` means the header
//! is not retained, not that it never existed.

use crate::error::{ConsensusError, Result};
use crate::types::*;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// ChainView: ℍ → 𝒮 ∪ {⊥}
pub trait ChainView {
    /// Look up a stored header by its block hash
    fn get_header_by_hash(&self, hash: &Hash) -> Option<StoredHeader>;

    /// Parent of `header`, if it is retained
    fn get_prev(&self, header: &StoredHeader) -> Option<StoredHeader> {
        self.get_header_by_hash(header.prev_block_hash())
    }
}

impl<T: ChainView + ?Sized> ChainView for &T {
    fn get_header_by_hash(&self, hash: &Hash) -> Option<StoredHeader> {
        (**self).get_header_by_hash(hash)
    }
}

impl<T: ChainView + ?Sized> ChainView for Box<T> {
    fn get_header_by_hash(&self, hash: &Hash) -> Option<StoredHeader> {
        (**self).get_header_by_hash(hash)
    }
}

impl<T: ChainView + ?Sized> ChainView for Rc<T> {
    fn get_header_by_hash(&self, hash: &Hash) -> Option<StoredHeader> {
        (**self).get_header_by_hash(hash)
    }
}

impl<T: ChainView + ?Sized> ChainView for Arc<T> {
    fn get_header_by_hash(&self, hash: &Hash) -> Option<StoredHeader> {
        (**self).get_header_by_hash(hash)
    }
}

/// In-memory header store indexed by hash and by main-chain height
#[derive(Debug, Clone, Default)]
pub struct HeaderStore {
    by_hash: HashMap<Hash, StoredHeader>,
    by_height: BTreeMap<Height, Hash>,
    tip: Option<Hash>,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store by connecting `headers` in order, starting at height 0
    pub fn from_headers<I>(headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = BlockHeader>,
    {
        let mut store = Self::new();
        for header in headers {
            store.push(header)?;
        }
        Ok(store)
    }

    /// Insert a stored header as-is and return its hash.
    ///
    /// The header becomes the tip when it is higher than the current tip.
    pub fn insert(&mut self, stored: StoredHeader) -> Hash {
        let hash = stored.hash();
        let height = stored.height;

        let is_new_tip = match self.tip() {
            Some(tip) => height > tip.height,
            None => true,
        };

        self.by_height.insert(height, hash);
        self.by_hash.insert(hash, stored);
        if is_new_tip {
            self.tip = Some(hash);
        }

        hash
    }

    /// Connect `header` on top of the current tip.
    ///
    /// An empty store accepts any header as genesis at height 0.
    pub fn push(&mut self, header: BlockHeader) -> Result<Hash> {
        let height = match self.tip() {
            Some(tip) => {
                if header.prev_block_hash != tip.hash() {
                    return Err(ConsensusError::InvariantViolation(format!(
                        "header does not extend tip at height {}",
                        tip.height
                    )));
                }
                tip.height + 1
            }
            None => 0,
        };

        Ok(self.insert(StoredHeader::new(header, height)))
    }

    /// Header most recently inserted at `height`, if retained
    pub fn get_header_by_height(&self, height: Height) -> Option<StoredHeader> {
        self.by_height
            .get(&height)
            .and_then(|hash| self.by_hash.get(hash))
            .cloned()
    }

    pub fn tip(&self) -> Option<StoredHeader> {
        self.tip.and_then(|hash| self.by_hash.get(&hash)).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Drop every header below `height`, leaving a checkpoint boundary.
    ///
    /// The tip is always retained, so `height` is capped at the tip height.
    /// Returns the number of headers removed.
    pub fn prune_below(&mut self, height: Height) -> usize {
        let height = match self.tip() {
            Some(tip) => height.min(tip.height),
            None => height,
        };

        let before = self.by_hash.len();
        self.by_hash.retain(|_, stored| stored.height >= height);
        self.by_height = self.by_height.split_off(&height);

        let removed = before - self.by_hash.len();
        debug!(height, removed, "pruned header history below checkpoint");
        removed
    }
}

impl ChainView for HeaderStore {
    fn get_header_by_hash(&self, hash: &Hash) -> Option<StoredHeader> {
        self.by_hash.get(hash).cloned()
    }
}
