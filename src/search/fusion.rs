//! Score fusion: merge ranked candidate lists from independent scoring
//! methods into one ranked, normalized result.
//!
//! Three methods run per query: the cosine index, the euclidean index, and
//! an exhaustive direct-cosine pass over the raw matrix that deliberately
//! bypasses both pre-built indices. Each list contributes a percentage
//! score plus a rank bonus; totals are summed per item, ranked, truncated
//! to `k`, and normalized by a calibration divisor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::SearchError;
use super::cancel::CancelToken;
use super::index::{ExactIndex, dot_product, select_top_k};
use super::snapshot::Snapshot;
use super::store::{l2_norm, normalize_in_place};
use crate::model::ItemId;

/// Tunable fusion parameters. Defaults reproduce the calibration the engine
/// shipped with; the divisor is empirical, not a derived bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Candidate pool per method is `candidate_multiplier * k`.
    pub candidate_multiplier: usize,
    /// Maximum rank bonus, awarded to rank 0 of each list.
    pub rank_bonus_max: f32,
    /// Final sum is divided by this and clamped to [0, 1].
    pub score_divisor: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            candidate_multiplier: 2,
            rank_bonus_max: 10.0,
            score_divisor: 200.0,
        }
    }
}

/// A query embedding prepared once per search: the raw vector, its unit
/// normalization, and its norm.
#[derive(Debug, Clone)]
pub struct QueryVector {
    raw: Vec<f32>,
    normalized: Vec<f32>,
    raw_norm: f32,
}

impl QueryVector {
    pub fn new(raw: &[f32]) -> Self {
        let raw_norm = l2_norm(raw);
        let mut normalized = raw.to_vec();
        normalize_in_place(&mut normalized);
        Self {
            raw: raw.to_vec(),
            normalized,
            raw_norm,
        }
    }

    pub fn raw(&self) -> &[f32] {
        &self.raw
    }

    pub fn normalized(&self) -> &[f32] {
        &self.normalized
    }
}

/// One ranked entry produced by a scoring method: the matrix row and its
/// percentage contribution (rank bonus is added by the fusion step).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedContribution {
    pub row: usize,
    pub value: f32,
}

/// A named scoring method contributing one ranked candidate list.
pub trait ScoringMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// Best-first candidates with their percentage contributions, at most
    /// `pool` entries.
    fn contributions(
        &self,
        snapshot: &Snapshot,
        query: &QueryVector,
        pool: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<RankedContribution>, SearchError>;
}

/// Cosine similarity via the pre-built index over normalized vectors.
/// Contribution is `similarity * 100` and may be negative.
pub struct CosineIndexMethod;

impl ScoringMethod for CosineIndexMethod {
    fn name(&self) -> &'static str {
        "cosine-index"
    }

    fn contributions(
        &self,
        snapshot: &Snapshot,
        query: &QueryVector,
        pool: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<RankedContribution>, SearchError> {
        let neighbors = snapshot.cosine().query(query.normalized(), pool, cancel)?;
        Ok(neighbors
            .into_iter()
            .map(|n| RankedContribution {
                row: n.row,
                value: n.score * 100.0,
            })
            .collect())
    }
}

/// Squared Euclidean distance via the pre-built index over raw vectors.
/// Contribution is `max(0, 1 - d / max_d) * 100` where `max_d` is the
/// largest distance in this query's own candidate batch (query-relative,
/// not globally calibrated).
pub struct EuclideanIndexMethod;

impl ScoringMethod for EuclideanIndexMethod {
    fn name(&self) -> &'static str {
        "euclidean-index"
    }

    fn contributions(
        &self,
        snapshot: &Snapshot,
        query: &QueryVector,
        pool: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<RankedContribution>, SearchError> {
        let neighbors = snapshot.euclidean().query(query.raw(), pool, cancel)?;
        let max_distance = neighbors
            .iter()
            .map(|n| n.score)
            .fold(0.0f32, f32::max);
        Ok(neighbors
            .into_iter()
            .map(|n| {
                let value = if max_distance > 0.0 {
                    (1.0 - n.score / max_distance).max(0.0) * 100.0
                } else {
                    // Every candidate is an exact match.
                    100.0
                };
                RankedContribution { row: n.row, value }
            })
            .collect())
    }
}

/// Exhaustive direct cosine between the query and every raw row; a third,
/// independent pass not backed by either index. Contribution is
/// `max(0, cosine) * 100`.
pub struct DirectCosineMethod;

impl ScoringMethod for DirectCosineMethod {
    fn name(&self) -> &'static str {
        "direct-cosine"
    }

    fn contributions(
        &self,
        snapshot: &Snapshot,
        query: &QueryVector,
        pool: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<RankedContribution>, SearchError> {
        let raw = snapshot.store().raw_matrix();
        let neighbors = select_top_k(raw.rows(), pool, cancel, |row| {
            let v = raw.row(row);
            let norm = l2_norm(v);
            if norm > 0.0 && query.raw_norm > 0.0 {
                dot_product(query.raw(), v) / (query.raw_norm * norm)
            } else {
                0.0
            }
        })?;
        Ok(neighbors
            .into_iter()
            .map(|n| RankedContribution {
                row: n.row,
                value: n.score.max(0.0) * 100.0,
            })
            .collect())
    }
}

/// The ensemble the engine ships with.
pub fn standard_methods() -> Vec<Box<dyn ScoringMethod>> {
    vec![
        Box::new(CosineIndexMethod),
        Box::new(EuclideanIndexMethod),
        Box::new(DirectCosineMethod),
    ]
}

/// One fused result before metadata hydration.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub item_id: ItemId,
    pub score: f32,
}

/// Run every method, sum contributions and rank bonuses per item, and keep
/// the normalized top `k`.
///
/// An item absent from a method's list contributes 0 for that method. The
/// rank bonus at 0-indexed rank `r` out of pool `p` is
/// `(p - r) / p * rank_bonus_max`, once per list the item appears in.
/// Ranking is descending by total with ascending item id as tie-break, so
/// identical query + snapshot always yields identical output.
pub fn fuse(
    snapshot: &Snapshot,
    query: &QueryVector,
    top_k: usize,
    config: &FusionConfig,
    methods: &[Box<dyn ScoringMethod>],
    cancel: &CancelToken,
) -> Result<Vec<FusedCandidate>, SearchError> {
    if top_k == 0 || snapshot.is_empty() {
        return Ok(Vec::new());
    }
    let pool = config.candidate_multiplier.max(1) * top_k;

    let mut combined: HashMap<usize, f32> = HashMap::new();
    for method in methods {
        let list = method.contributions(snapshot, query, pool, cancel)?;
        for (rank, contribution) in list.iter().enumerate() {
            let bonus = (pool - rank) as f32 / pool as f32 * config.rank_bonus_max;
            *combined.entry(contribution.row).or_insert(0.0) += contribution.value + bonus;
        }
    }

    let store = snapshot.store();
    let mut ranked: Vec<(usize, f32)> = combined.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| store.id_at(a.0).cmp(store.id_at(b.0)))
    });
    ranked.truncate(top_k);

    Ok(ranked
        .into_iter()
        .map(|(row, total)| FusedCandidate {
            item_id: store.id_at(row).to_string(),
            score: (total / config.score_divisor).clamp(0.0, 1.0),
        })
        .collect())
}
