//! Vector store: decoded catalogue embeddings plus the row→id mapping.
//!
//! Vector blobs are little-endian 32-bit floats, row-major, contiguous per
//! vector. Any change to this layout must be versioned by the source.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::model::ItemId;

/// Dense row-major matrix of f32 embeddings. Immutable after construction.
#[derive(Debug)]
pub struct Matrix {
    data: Vec<f32>,
    dimension: usize,
}

impl Matrix {
    fn from_rows(data: Vec<f32>, dimension: usize) -> Self {
        debug_assert!(dimension > 0);
        debug_assert_eq!(data.len() % dimension, 0);
        Self { data, dimension }
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

/// One raw entry enumerated from a vector source.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub item_id: ItemId,
    pub bytes: Vec<u8>,
}

/// Enumerable source of (id, raw-vector-bytes) pairs, e.g. a persisted table.
pub trait VectorSource: Send + Sync {
    fn records(&self) -> anyhow::Result<Vec<VectorRecord>>;
}

/// Fatal failure while building a [`VectorStore`]. Per-vector dimension
/// mismatches are not errors; they are skipped during construction.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("vector source unreadable: {0}")]
    Source(#[source] anyhow::Error),
    #[error("no usable vectors in source (expected dimension {dimension})")]
    Empty { dimension: usize },
}

/// Owns the raw and normalized embedding matrices and the stable
/// row-index→id mapping for one snapshot.
#[derive(Debug)]
pub struct VectorStore {
    raw: Arc<Matrix>,
    normalized: Arc<Matrix>,
    ids: Vec<ItemId>,
}

impl VectorStore {
    /// Build a store from decoded source records.
    ///
    /// Records whose decoded length differs from `dimension` are logged and
    /// skipped. Fails only when nothing survives filtering.
    pub fn from_records<I>(records: I, dimension: usize) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = VectorRecord>,
    {
        let mut raw = Vec::new();
        let mut ids = Vec::new();
        let mut skipped = 0usize;

        for record in records {
            let Some(vector) = decode_vector(&record.bytes) else {
                warn!(
                    item_id = %record.item_id,
                    bytes = record.bytes.len(),
                    "vector blob is not a whole number of f32s, skipping"
                );
                skipped += 1;
                continue;
            };
            if vector.len() != dimension {
                warn!(
                    item_id = %record.item_id,
                    got = vector.len(),
                    expected = dimension,
                    "vector dimension mismatch, skipping"
                );
                skipped += 1;
                continue;
            }
            raw.extend_from_slice(&vector);
            ids.push(record.item_id);
        }

        if ids.is_empty() {
            return Err(LoadError::Empty { dimension });
        }
        if skipped > 0 {
            warn!(skipped, accepted = ids.len(), "excluded malformed vectors during load");
        }

        let mut normalized = raw.clone();
        for row in normalized.chunks_exact_mut(dimension) {
            normalize_in_place(row);
        }

        Ok(Self {
            raw: Arc::new(Matrix::from_rows(raw, dimension)),
            normalized: Arc::new(Matrix::from_rows(normalized, dimension)),
            ids,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.raw.dimension()
    }

    pub fn raw_vector(&self, i: usize) -> &[f32] {
        self.raw.row(i)
    }

    pub fn normalized_vector(&self, i: usize) -> &[f32] {
        self.normalized.row(i)
    }

    pub fn id_at(&self, i: usize) -> &str {
        &self.ids[i]
    }

    pub fn raw_matrix(&self) -> Arc<Matrix> {
        Arc::clone(&self.raw)
    }

    pub fn normalized_matrix(&self) -> Arc<Matrix> {
        Arc::clone(&self.normalized)
    }
}

/// Decode a little-endian f32 blob. Returns `None` when the byte length is
/// not a multiple of 4.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if !bytes.len().is_multiple_of(4) {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Encode a vector in the source byte layout (little-endian f32, row-major).
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scale to unit L2 norm. A zero vector is left untouched.
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
