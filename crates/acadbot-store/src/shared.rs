//! Live index handle shared between readers and the rebuild path.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::index::VectorIndex;

/// Readers clone the current `Arc` and never observe a half-built index.
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Option<Arc<VectorIndex>>>,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the live index, if one is installed.
    pub fn get(&self) -> Option<Arc<VectorIndex>> {
        self.current.read().clone()
    }

    /// Install a new index. Returns the one it replaced.
    pub fn swap(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        self.current.write().replace(Arc::new(index))
    }
}
