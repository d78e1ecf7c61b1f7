//! Duplicate model loading and inference.
//!
//! The trained artifact is a JSON logistic regression exported by the
//! training pipeline. It is loaded once at process start; when the artifact
//! is missing or malformed the service degrades to a deterministic linear
//! heuristic over the same features instead of failing, and decisions
//! record `heuristic` as the model version.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use sieve_core::{DuplicateScorer, FeatureMap};

use crate::features::FEATURE_ORDER;

/// Heuristic weights over [`FEATURE_ORDER`], tuned to mirror the trained
/// model's direction on each feature: coverage and text overlap push the
/// probability up, distance-like features push it down.
const HEURISTIC_WEIGHTS: [f64; 13] = [
    -1.2,  // abs_total_diff_pct
    -0.03, // days_diff
    0.8,   // same_po
    0.3,   // same_currency
    0.2,   // same_tax_total
    -0.4,  // bank_change_flag
    -0.1,  // payee_name_change_flag
    -1.5,  // invnum_edit
    1.6,   // line_coverage_pct
    -1.8,  // unmatched_amount_frac
    -0.4,  // count_new_items
    -0.05, // median_unit_price_diff
    2.2,   // text_cosine
];
const HEURISTIC_BIAS: f64 = -0.3;

/// On-disk artifact shape.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    model_id: String,
    version: String,
    features: Vec<String>,
    weights: Vec<f64>,
    bias: f64,
}

/// Logistic regression scorer backed by a loaded artifact.
pub struct LogisticModel {
    model_id: String,
    version: String,
    features: Vec<String>,
    weights: Vec<f64>,
    bias: f64,
}

impl DuplicateScorer for LogisticModel {
    fn predict_dup_prob(&self, features: &FeatureMap) -> f64 {
        let logit = self
            .features
            .iter()
            .zip(&self.weights)
            .map(|(name, w)| w * features.get(name).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.bias;
        sigmoid(logit).clamp(0.0, 1.0)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

/// Deterministic fallback used when no artifact loads.
pub struct HeuristicScorer;

impl DuplicateScorer for HeuristicScorer {
    fn predict_dup_prob(&self, features: &FeatureMap) -> f64 {
        let logit = FEATURE_ORDER
            .iter()
            .zip(HEURISTIC_WEIGHTS)
            .map(|(name, w)| w * features.get(*name).copied().unwrap_or(0.0))
            .sum::<f64>()
            + HEURISTIC_BIAS;
        sigmoid(logit).clamp(0.0, 1.0)
    }

    fn model_id(&self) -> &str {
        "dup_model"
    }

    fn model_version(&self) -> &str {
        "heuristic"
    }
}

/// Load the duplicate scorer from the artifact path, degrading to the
/// heuristic on any failure.
pub fn load_scorer(path: &str) -> Arc<dyn DuplicateScorer> {
    match try_load(Path::new(path)) {
        Ok(model) => {
            info!(
                subsystem = "engine",
                component = "dup_model",
                op = "load",
                model_id = %model.model_id,
                model_version = %model.version,
                "Duplicate model artifact loaded"
            );
            Arc::new(model)
        }
        Err(reason) => {
            warn!(
                subsystem = "engine",
                component = "dup_model",
                op = "load",
                degraded = true,
                path,
                %reason,
                "Falling back to heuristic duplicate scorer"
            );
            Arc::new(HeuristicScorer)
        }
    }
}

fn try_load(path: &Path) -> std::result::Result<LogisticModel, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("read failed: {e}"))?;
    let artifact: ModelArtifact =
        serde_json::from_slice(&bytes).map_err(|e| format!("parse failed: {e}"))?;
    if artifact.features.len() != artifact.weights.len() {
        return Err(format!(
            "feature/weight length mismatch: {} vs {}",
            artifact.features.len(),
            artifact.weights.len()
        ));
    }
    Ok(LogisticModel {
        model_id: artifact.model_id,
        version: artifact.version,
        features: artifact.features,
        weights: artifact.weights,
        bias: artifact.bias,
    })
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_match_features() -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("abs_total_diff_pct".into(), 0.0);
        f.insert("days_diff".into(), 1.0);
        f.insert("same_po".into(), 1.0);
        f.insert("same_currency".into(), 1.0);
        f.insert("same_tax_total".into(), 1.0);
        f.insert("invnum_edit".into(), 0.0);
        f.insert("line_coverage_pct".into(), 1.0);
        f.insert("unmatched_amount_frac".into(), 0.0);
        f.insert("count_new_items".into(), 0.0);
        f.insert("median_unit_price_diff".into(), 0.0);
        f.insert("text_cosine".into(), 0.9);
        f
    }

    fn weak_match_features() -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("abs_total_diff_pct".into(), 1.5);
        f.insert("days_diff".into(), 200.0);
        f.insert("invnum_edit".into(), 0.9);
        f.insert("line_coverage_pct".into(), 0.1);
        f.insert("unmatched_amount_frac".into(), 0.9);
        f.insert("count_new_items".into(), 4.0);
        f.insert("text_cosine".into(), 0.05);
        f
    }

    #[test]
    fn test_heuristic_separates_strong_from_weak() {
        let scorer = HeuristicScorer;
        let strong = scorer.predict_dup_prob(&strong_match_features());
        let weak = scorer.predict_dup_prob(&weak_match_features());
        assert!(strong > 0.9, "strong match scored {strong}");
        assert!(weak < 0.1, "weak match scored {weak}");
    }

    #[test]
    fn test_heuristic_bounds_and_determinism() {
        let scorer = HeuristicScorer;
        let f = strong_match_features();
        let p = scorer.predict_dup_prob(&f);
        assert!((0.0..=1.0).contains(&p));
        assert_eq!(p, scorer.predict_dup_prob(&f));
    }

    #[test]
    fn test_heuristic_ignores_unknown_features() {
        let scorer = HeuristicScorer;
        let mut f = strong_match_features();
        let base = scorer.predict_dup_prob(&f);
        f.insert("some_future_feature".into(), 42.0);
        assert_eq!(scorer.predict_dup_prob(&f), base);
    }

    #[test]
    fn test_heuristic_version_tag() {
        assert_eq!(HeuristicScorer.model_version(), "heuristic");
        assert_eq!(HeuristicScorer.model_id(), "dup_model");
    }

    #[test]
    fn test_load_scorer_missing_file_degrades() {
        let scorer = load_scorer("/nonexistent/dup_model.json");
        assert_eq!(scorer.model_version(), "heuristic");
    }

    #[test]
    fn test_logistic_model_unknown_artifact_features_fill_zero() {
        let model = LogisticModel {
            model_id: "dup_model".into(),
            version: "v2".into(),
            features: vec!["text_cosine".into(), "not_computed_yet".into()],
            weights: vec![2.0, 5.0],
            bias: 0.0,
        };
        let mut f = FeatureMap::new();
        f.insert("text_cosine".into(), 0.5);
        // missing "not_computed_yet" contributes 0, so logit = 1.0
        let p = model.predict_dup_prob(&f);
        assert!((p - sigmoid(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_artifact_length_mismatch_rejected() {
        let dir = std::env::temp_dir().join("sieve_dup_model_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad_model.json");
        std::fs::write(
            &path,
            r#"{"model_id":"m","version":"v","features":["a","b"],"weights":[0.1],"bias":0}"#,
        )
        .unwrap();
        let scorer = load_scorer(path.to_str().unwrap());
        assert_eq!(scorer.model_version(), "heuristic");
    }

    #[test]
    fn test_artifact_roundtrip() {
        let dir = std::env::temp_dir().join("sieve_dup_model_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("good_model.json");
        std::fs::write(
            &path,
            r#"{"model_id":"dup_model","version":"2026.03","features":["text_cosine"],"weights":[3.0],"bias":-1.0}"#,
        )
        .unwrap();
        let scorer = load_scorer(path.to_str().unwrap());
        assert_eq!(scorer.model_version(), "2026.03");
        let mut f = FeatureMap::new();
        f.insert("text_cosine".into(), 1.0);
        assert!((scorer.predict_dup_prob(&f) - sigmoid(2.0)).abs() < 1e-12);
    }
}
