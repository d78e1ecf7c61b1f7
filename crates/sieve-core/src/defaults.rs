//! Centralized default constants for the invoice sieve.
//!
//! This module is the single source of truth for tunable defaults. The
//! keyed config store can override the scoring tunables per tenant (scope
//! `vendor:{vendor_id}` first, then `global`); the constants here are the
//! fallback of last resort and the documented baseline.

use rust_decimal::Decimal;

// =============================================================================
// DECISION THRESHOLDS
// =============================================================================

/// Minimum risk score for a HOLD decision. Config key: `T_hold`.
pub const T_HOLD: f64 = 80.0;

/// Minimum risk score for a REVIEW decision. Config key: `T_review`.
pub const T_REVIEW: f64 = 50.0;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Maximum candidates considered per scoring request. Config key:
/// `candidate_cap`.
pub const CANDIDATE_CAP: i64 = 200;

// =============================================================================
// RULES
// =============================================================================

/// Relative total tolerance for the same-PO rule. Config key:
/// `same_po_total_tol`.
pub const SAME_PO_TOTAL_TOL: f64 = 0.005;

/// Date window in days for the same-PO rule. Config key:
/// `same_po_window_days`.
pub const SAME_PO_WINDOW_DAYS: i64 = 30;

/// Shingle-Jaccard threshold for PDF near-duplicate detection.
pub const PDF_SHINGLE_JACCARD_MIN: f64 = 0.9;

/// Months of sighting history consulted for the bank-change rule.
/// Config key: `bank_change_lookback_months`.
pub const BANK_CHANGE_LOOKBACK_MONTHS: i64 = 12;

// =============================================================================
// ANOMALY
// =============================================================================

/// Vendors with fewer historical invoices than this get a damped anomaly
/// score. Config key: `cold_start_invoices`.
pub const COLD_START_INVOICES: i64 = 50;

/// Damping factor applied to the anomaly score for cold-start vendors.
pub const COLD_START_DAMPING: f64 = 0.8;

/// z-score at which `AMOUNT_OUTLIER` is emitted.
pub const AMOUNT_OUTLIER_Z: f64 = 6.0;

/// Floor applied to the anomaly score when an unseen remit account appears.
pub const BANK_CHANGE_ANOM_FLOOR: f64 = 0.6;

// =============================================================================
// LINE ASSIGNMENT
// =============================================================================

/// Description-distance weight in the line cost matrix.
pub const LINE_COST_ALPHA: f64 = 0.7;

/// Unit-price-difference weight in the line cost matrix.
pub const LINE_COST_BETA: f64 = 0.2;

/// Quantity-difference weight in the line cost matrix.
pub const LINE_COST_GAMMA: f64 = 0.1;

/// Cap on the relative price/quantity terms in the line cost matrix.
pub const LINE_COST_TERM_CAP: f64 = 5.0;

// =============================================================================
// CASES
// =============================================================================

/// SLA window for a newly opened review case.
pub const CASE_SLA_HOURS: i64 = 48;

// =============================================================================
// DATA QUALITY
// =============================================================================

/// Relative tolerance when comparing the line-item sum to the header total.
pub const LINE_SUM_TOL_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 3); // 0.005

/// Invoices dated further in the future than this are implausible.
pub const MAX_FUTURE_DAYS: i64 = 370;

/// Invoices older than this are implausible.
pub const MAX_AGE_DAYS: i64 = 3650;

// =============================================================================
// PIPELINE
// =============================================================================

/// Default per-request deadline in milliseconds.
pub const SCORE_DEADLINE_MS: u64 = 10_000;

/// Default per-request candidate feature fan-out.
pub const FEATURE_CONCURRENCY: usize = 8;

/// Number of top matches returned and persisted per decision.
pub const TOP_K: usize = 3;

/// TTL for the in-process config cache.
pub const CONFIG_CACHE_TTL_SECS: u64 = 30;
