//! Core data models for the invoice sieve.
//!
//! These types are shared across all sieve crates and represent the
//! scoring request/response surface and the persisted domain entities.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

// =============================================================================
// SCORING REQUEST
// =============================================================================

/// A single invoice line as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemIn {
    pub desc: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub gl_code: Option<String>,
    #[serde(default)]
    pub cost_center: Option<String>,
}

/// Incoming invoice payload for `/scoreInvoice`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceIn {
    pub invoice_id: String,
    pub vendor_id: String,
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub currency: String,
    pub total: Decimal,
    #[serde(default)]
    pub tax_total: Option<Decimal>,
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default)]
    pub remit_bank_iban_or_account: Option<String>,
    #[serde(default)]
    pub remit_name: Option<String>,
    #[serde(default)]
    pub pdf_hash: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
    pub line_items: Vec<LineItemIn>,
}

impl InvoiceIn {
    /// Schema-level validation. Violations reject the request before any
    /// write happens; softer data-quality findings are reported separately
    /// by [`InvoiceIn::quality_warnings`].
    pub fn validate(&self) -> Result<()> {
        if self.invoice_id.trim().is_empty() {
            return Err(Error::InvalidInput("invoice_id required".into()));
        }
        if self.vendor_id.trim().is_empty() {
            return Err(Error::InvalidInput("vendor_id required".into()));
        }
        if self.invoice_number.trim().is_empty() {
            return Err(Error::InvalidInput("invoice_number required".into()));
        }
        if self.line_items.is_empty() {
            return Err(Error::InvalidInput("line_items required".into()));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::InvalidInput(format!(
                "currency must be a 3-letter ISO 4217 code, got {:?}",
                self.currency
            )));
        }
        Ok(())
    }

    /// Data-quality findings that do not reject the request. Scoring
    /// proceeds, tagging the decision with `DATA_QUALITY_CHECK_FAIL` and
    /// biasing it toward REVIEW.
    pub fn quality_warnings(&self, today: NaiveDate) -> Vec<String> {
        let mut warnings = Vec::new();

        let line_sum: Decimal = self.line_items.iter().map(|l| l.amount).sum();
        let tolerance =
            (self.total.abs() * crate::defaults::LINE_SUM_TOL_PCT).max(Decimal::new(1, 2));
        if (line_sum - self.total).abs() > tolerance {
            warnings.push(format!(
                "line sum {} deviates from header total {}",
                line_sum, self.total
            ));
        }

        let age_days = (today - self.invoice_date).num_days();
        if age_days < -(crate::defaults::MAX_FUTURE_DAYS) || age_days > crate::defaults::MAX_AGE_DAYS
        {
            warnings.push(format!("implausible invoice_date {}", self.invoice_date));
        }

        if self.currency.chars().any(|c| c.is_ascii_lowercase()) {
            warnings.push(format!("currency {:?} is not upper-case", self.currency));
        }

        warnings
    }
}

// =============================================================================
// PERSISTED ENTITIES
// =============================================================================

/// Immutable invoice snapshot header as persisted.
///
/// Every derived field (`invoice_number_norm`, account hash/mask, payload
/// hash) is a pure function of the submitted payload; the normalizer version
/// is recorded so snapshots stay reproducible across releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub invoice_id: String,
    pub vendor_id: String,
    pub invoice_number: String,
    pub invoice_number_norm: String,
    pub invoice_date: NaiveDate,
    pub currency: String,
    pub total: Decimal,
    pub tax_total: Option<Decimal>,
    pub po_number: Option<String>,
    pub remit_account_masked: Option<String>,
    pub remit_account_hash: Option<String>,
    pub remit_name: Option<String>,
    pub pdf_hash: Option<String>,
    pub terms: Option<String>,
    pub payload_hash: String,
    pub normalizer_version: String,
    pub created_at: DateTime<Utc>,
}

/// Invoice line as persisted, 1-based `line_no` in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineRow {
    pub line_no: i32,
    pub desc: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub sku: Option<String>,
    pub gl_code: Option<String>,
    pub cost_center: Option<String>,
}

/// Observation record for a vendor remit account hash.
#[derive(Debug, Clone)]
pub struct RemitSighting {
    pub vendor_id: String,
    pub remit_account_hash: String,
    pub remit_name: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Per-vendor amount baseline. `mad_like` keeps the batch pipeline's
/// median-of-absolute-totals computation under its historical name.
#[derive(Debug, Clone)]
pub struct VendorBaseline {
    pub median: Decimal,
    pub mad_like: Decimal,
    pub sample_count: i64,
}

// =============================================================================
// DECISIONS
// =============================================================================

/// Final decision label, ordered by strictness: PASS < REVIEW < HOLD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionLabel {
    Pass,
    Review,
    Hold,
}

impl DecisionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Review => "REVIEW",
            Self::Hold => "HOLD",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PASS" => Ok(Self::Pass),
            "REVIEW" => Ok(Self::Review),
            "HOLD" => Ok(Self::Hold),
            other => Err(Error::Internal(format!("unknown decision label {other:?}"))),
        }
    }
}

impl std::fmt::Display for DecisionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature map keyed by canonical feature name. `BTreeMap` keeps the
/// serialized form byte-stable across runs.
pub type FeatureMap = BTreeMap<String, f64>;

/// A scored candidate invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMatch {
    pub invoice_id: String,
    pub similarity: f64,
    pub features: FeatureMap,
}

/// One `{feature, value}` explanation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub feature: String,
    pub value: f64,
}

/// Persisted decision record. Append-only; the newest row per invoice is
/// the active decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: String,
    pub invoice_id: String,
    pub model_id: String,
    pub model_version: String,
    pub ruleset_version: String,
    pub risk_score: Decimal,
    pub decision: DecisionLabel,
    pub reason_codes: Vec<String>,
    pub top_matches: JsonValue,
    pub explanations: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Review case status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Open,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

/// Review case for a held or flagged invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub invoice_id: String,
    pub status: CaseStatus,
    pub sla_due: DateTime<Utc>,
    pub disposition_user: Option<String>,
    pub disposition_at: Option<DateTime<Utc>>,
    pub disposition_label: Option<String>,
    pub disposition_notes: Option<String>,
}

/// Append-only audit entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub payload: JsonValue,
}

// =============================================================================
// SCORING RESPONSE
// =============================================================================

/// Result of scoring one invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub risk_score: f64,
    pub decision: DecisionLabel,
    pub reason_codes: Vec<String>,
    pub top_matches: Vec<TopMatch>,
    pub explanations: Vec<Explanation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_invoice() -> InvoiceIn {
        InvoiceIn {
            invoice_id: "inv-1".into(),
            vendor_id: "v-1".into(),
            vendor_name: "ACME GmbH".into(),
            invoice_number: "INV-001".into(),
            invoice_date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            currency: "EUR".into(),
            total: dec!(100.00),
            tax_total: None,
            po_number: None,
            remit_bank_iban_or_account: None,
            remit_name: None,
            pdf_hash: None,
            terms: None,
            line_items: vec![LineItemIn {
                desc: "paper a4".into(),
                qty: dec!(10),
                unit_price: dec!(10),
                amount: dec!(100),
                sku: None,
                gl_code: None,
                cost_center: None,
            }],
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_invoice().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_lines() {
        let mut inv = sample_invoice();
        inv.line_items.clear();
        assert!(matches!(inv.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_bad_currency() {
        let mut inv = sample_invoice();
        inv.currency = "EURO".into();
        assert!(inv.validate().is_err());
        inv.currency = "E1R".into();
        assert!(inv.validate().is_err());
    }

    #[test]
    fn test_quality_warnings_clean_invoice() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        assert!(sample_invoice().quality_warnings(today).is_empty());
    }

    #[test]
    fn test_quality_warnings_line_sum_mismatch() {
        let mut inv = sample_invoice();
        inv.line_items[0].amount = dec!(50);
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let warnings = inv.quality_warnings(today);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("line sum"));
    }

    #[test]
    fn test_quality_warnings_lowercase_currency() {
        let mut inv = sample_invoice();
        inv.currency = "eur".into();
        // lowercase passes schema shape but is flagged as a quality finding
        assert!(inv.validate().is_ok());
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        assert!(!inv.quality_warnings(today).is_empty());
    }

    #[test]
    fn test_quality_warnings_far_future_date() {
        let mut inv = sample_invoice();
        inv.invoice_date = NaiveDate::from_ymd_opt(2031, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        assert!(!inv.quality_warnings(today).is_empty());
    }

    #[test]
    fn test_decision_label_ordering() {
        assert!(DecisionLabel::Hold > DecisionLabel::Review);
        assert!(DecisionLabel::Review > DecisionLabel::Pass);
        assert_eq!(
            DecisionLabel::Hold.max(DecisionLabel::Review),
            DecisionLabel::Hold
        );
    }

    #[test]
    fn test_decision_label_roundtrip() {
        for label in [DecisionLabel::Pass, DecisionLabel::Review, DecisionLabel::Hold] {
            assert_eq!(DecisionLabel::parse(label.as_str()).unwrap(), label);
        }
        assert!(DecisionLabel::parse("MAYBE").is_err());
    }
}
