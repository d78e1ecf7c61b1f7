//! # sieve-engine
//!
//! Scoring engine for the invoice anomaly sieve: pairwise feature
//! engineering, optimal line assignment, the duplicate scorer with its
//! heuristic fallback, anomaly signals, deterministic rules, score fusion,
//! and the request-scoped scoring pipeline.

pub mod anomaly;
pub mod assignment;
pub mod decision;
pub mod dup_model;
pub mod features;
pub mod pipeline;
pub mod rules;

pub use anomaly::{anomaly_score, AnomalyInputs, AnomalySignals};
pub use decision::{decide, fuse_scores};
pub use dup_model::{load_scorer, HeuristicScorer, LogisticModel};
pub use features::{
    header_features, line_assign_features, line_assign_features_weighted, text_cosine, MatchLine,
    FEATURE_ORDER,
};
pub use pipeline::ScoringPipeline;
pub use rules::{apply_rules, RuleContext, RuleOutcome, RULESET_VERSION};
