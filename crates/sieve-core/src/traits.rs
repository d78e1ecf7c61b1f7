//! Trait seams for pluggable capabilities.
//!
//! The relational store is accessed through the concrete `Database`
//! aggregate in `sieve-db`; only the capabilities with more than one
//! reasonable backend live behind traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::FeatureMap;

/// Searchable text index over invoice text blobs.
///
/// Writes are best-effort: the scoring path logs and continues when the
/// index is unavailable, and near-text retrieval is skipped.
#[async_trait]
pub trait TextIndex: Send + Sync {
    /// Index (or re-index) the text blob for one invoice.
    async fn index_invoice(&self, invoice_id: &str, vendor_id: &str, blob: &str) -> Result<()>;

    /// Return up to `limit` same-vendor invoice ids whose text is close to
    /// `blob`, excluding the given ids.
    async fn neighbor_ids(
        &self,
        vendor_id: &str,
        blob: &str,
        exclude: &[String],
        limit: i64,
    ) -> Result<Vec<String>>;
}

/// Duplicate probability scorer over the canonical feature map.
///
/// Implementations: the trained classifier loaded from the model artifact,
/// and the deterministic heuristic fallback used when no artifact loads.
pub trait DuplicateScorer: Send + Sync {
    /// Probability in `[0, 1]` that the candidate is a duplicate.
    fn predict_dup_prob(&self, features: &FeatureMap) -> f64;

    /// Identifier written into each decision row.
    fn model_id(&self) -> &str;

    /// Version written into each decision row (`heuristic` for the
    /// fallback).
    fn model_version(&self) -> &str;
}
