//! Immutable snapshot: the vector store plus both built indices.

use crate::search::index::{CosineIndex, EuclideanIndex};
use crate::search::store::VectorStore;

/// A fully built, never-mutated view of the catalogue. Queries only read
/// it; a reload replaces the whole snapshot, never patches it.
#[derive(Debug)]
pub struct Snapshot {
    store: VectorStore,
    cosine: CosineIndex,
    euclidean: EuclideanIndex,
}

impl Snapshot {
    /// Build both indices over the store's matrices.
    pub fn build(store: VectorStore) -> Self {
        let cosine = CosineIndex::build(store.normalized_matrix());
        let euclidean = EuclideanIndex::build(store.raw_matrix());
        Self {
            store,
            cosine,
            euclidean,
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn cosine(&self) -> &CosineIndex {
        &self.cosine
    }

    pub fn euclidean(&self) -> &EuclideanIndex {
        &self.euclidean
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }
}
