//! Deterministic duplicate and anomaly rules.
//!
//! Rules run before score fusion and can force a minimum decision that is
//! authoritative over score-only thresholds. Conflicts resolve to the
//! strictest outcome (HOLD > REVIEW > PASS).

use rust_decimal::prelude::ToPrimitive;

use sieve_core::defaults::PDF_SHINGLE_JACCARD_MIN;
use sieve_core::{DecisionLabel, InvoiceRow};

/// Ruleset version recorded on every decision.
pub const RULESET_VERSION: &str = "r1";

/// Inputs to one rule evaluation pass.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub query: &'a InvoiceRow,
    /// Highest-probability candidate, when retrieval produced any.
    pub top_candidate: Option<&'a InvoiceRow>,
    /// Unseen-remit-account signal from the anomaly scorer.
    pub bank_change: bool,
    /// Data-quality findings collected during validation.
    pub quality_warnings: &'a [String],
    /// Same-PO rule total tolerance (config `same_po_total_tol`).
    pub same_po_total_tol: f64,
    /// Same-PO rule date window in days (config `same_po_window_days`).
    pub same_po_window_days: i64,
    /// Optional shingle-Jaccard similarity of the two PDF texts.
    pub pdf_shingle_jaccard: Option<f64>,
}

/// Reason codes plus the rule-forced minimum decision.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub reasons: Vec<String>,
    pub forced: DecisionLabel,
}

/// Evaluate all rules against the query and the top candidate.
pub fn apply_rules(ctx: &RuleContext<'_>) -> RuleOutcome {
    let mut reasons = Vec::new();
    let mut forced = DecisionLabel::Pass;

    if let Some(candidate) = ctx.top_candidate {
        if rule_same_invnum_norm(&ctx.query.invoice_number_norm, &candidate.invoice_number_norm)
        {
            reasons.push("EXACT_INVNUM".to_string());
            forced = forced.max(DecisionLabel::Hold);
        }
        if rule_same_po_near_total(
            ctx.query,
            candidate,
            ctx.same_po_total_tol,
            ctx.same_po_window_days,
        ) {
            reasons.push("SAME_PO_NEAR_TOTAL".to_string());
            forced = forced.max(DecisionLabel::Hold);
        }
        if rule_pdf_near_dup(
            ctx.query.pdf_hash.as_deref(),
            candidate.pdf_hash.as_deref(),
            ctx.pdf_shingle_jaccard,
        ) {
            reasons.push("PDF_NEAR_DUP".to_string());
            forced = forced.max(DecisionLabel::Hold);
        }
    }

    if ctx.bank_change {
        reasons.push("BANK_CHANGE".to_string());
        forced = forced.max(DecisionLabel::Review);
    }

    if !ctx.quality_warnings.is_empty() {
        reasons.push("DATA_QUALITY_CHECK_FAIL".to_string());
        forced = forced.max(DecisionLabel::Review);
    }

    RuleOutcome { reasons, forced }
}

fn rule_same_invnum_norm(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a == b
}

fn rule_same_po_near_total(
    a: &InvoiceRow,
    b: &InvoiceRow,
    pct_tol: f64,
    window_days: i64,
) -> bool {
    let same_po = match (&a.po_number, &b.po_number) {
        (Some(pa), Some(pb)) => !pa.is_empty() && pa == pb,
        _ => false,
    };
    if !same_po {
        return false;
    }

    let total_a = a.total.to_f64().unwrap_or(0.0);
    let total_b = b.total.to_f64().unwrap_or(0.0);
    if (total_a - total_b).abs() > pct_tol * total_a.abs().max(1.0) {
        return false;
    }

    (a.invoice_date - b.invoice_date).num_days().abs() <= window_days
}

fn rule_pdf_near_dup(
    hash_a: Option<&str>,
    hash_b: Option<&str>,
    shingle_jaccard: Option<f64>,
) -> bool {
    if let (Some(a), Some(b)) = (hash_a, hash_b) {
        if !a.is_empty() && a == b {
            return true;
        }
    }
    shingle_jaccard.unwrap_or(0.0) >= PDF_SHINGLE_JACCARD_MIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn row(
        invnum_norm: &str,
        po: Option<&str>,
        total: Decimal,
        date: NaiveDate,
    ) -> InvoiceRow {
        InvoiceRow {
            invoice_id: format!("inv-{invnum_norm}"),
            vendor_id: "v-1".into(),
            invoice_number: invnum_norm.into(),
            invoice_number_norm: invnum_norm.into(),
            invoice_date: date,
            currency: "EUR".into(),
            total,
            tax_total: None,
            po_number: po.map(String::from),
            remit_account_masked: None,
            remit_account_hash: None,
            remit_name: None,
            pdf_hash: None,
            terms: None,
            payload_hash: "ph".into(),
            normalizer_version: "v1".into(),
            created_at: chrono::Utc::now(),
        }
    }

    fn ctx<'a>(query: &'a InvoiceRow, candidate: Option<&'a InvoiceRow>) -> RuleContext<'a> {
        RuleContext {
            query,
            top_candidate: candidate,
            bank_change: false,
            quality_warnings: &[],
            same_po_total_tol: 0.005,
            same_po_window_days: 30,
            pdf_shingle_jaccard: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_exact_invnum_forces_hold() {
        let a = row("123", None, dec!(100), date(2026, 3, 1));
        let b = row("123", None, dec!(999), date(2025, 1, 1));
        let outcome = apply_rules(&ctx(&a, Some(&b)));
        assert!(outcome.reasons.contains(&"EXACT_INVNUM".to_string()));
        assert_eq!(outcome.forced, DecisionLabel::Hold);
    }

    #[test]
    fn test_same_po_near_total_within_tolerance() {
        let a = row("1", Some("PO1"), dec!(100.00), date(2026, 3, 1));
        let b = row("2", Some("PO1"), dec!(100.40), date(2026, 3, 6));
        let outcome = apply_rules(&ctx(&a, Some(&b)));
        assert!(outcome.reasons.contains(&"SAME_PO_NEAR_TOTAL".to_string()));
        assert_eq!(outcome.forced, DecisionLabel::Hold);
    }

    #[test]
    fn test_same_po_total_out_of_tolerance() {
        let a = row("1", Some("PO1"), dec!(100.00), date(2026, 3, 1));
        let b = row("2", Some("PO1"), dec!(106.00), date(2026, 3, 6));
        let outcome = apply_rules(&ctx(&a, Some(&b)));
        assert!(!outcome.reasons.contains(&"SAME_PO_NEAR_TOTAL".to_string()));
    }

    #[test]
    fn test_same_po_outside_date_window() {
        let a = row("1", Some("PO1"), dec!(100.00), date(2026, 3, 1));
        let b = row("2", Some("PO1"), dec!(100.20), date(2026, 5, 15));
        let outcome = apply_rules(&ctx(&a, Some(&b)));
        assert!(!outcome.reasons.contains(&"SAME_PO_NEAR_TOTAL".to_string()));
    }

    #[test]
    fn test_same_po_requires_both_pos() {
        let a = row("1", Some("PO1"), dec!(100.00), date(2026, 3, 1));
        let b = row("2", None, dec!(100.00), date(2026, 3, 1));
        let outcome = apply_rules(&ctx(&a, Some(&b)));
        assert!(!outcome.reasons.contains(&"SAME_PO_NEAR_TOTAL".to_string()));
    }

    #[test]
    fn test_pdf_near_dup_by_hash() {
        let mut a = row("1", None, dec!(100), date(2026, 3, 1));
        let mut b = row("2", None, dec!(200), date(2026, 3, 1));
        a.pdf_hash = Some("abc".into());
        b.pdf_hash = Some("abc".into());
        let outcome = apply_rules(&ctx(&a, Some(&b)));
        assert!(outcome.reasons.contains(&"PDF_NEAR_DUP".to_string()));
        assert_eq!(outcome.forced, DecisionLabel::Hold);
    }

    #[test]
    fn test_pdf_near_dup_by_shingle_jaccard() {
        let a = row("1", None, dec!(100), date(2026, 3, 1));
        let b = row("2", None, dec!(200), date(2026, 3, 1));
        let mut context = ctx(&a, Some(&b));
        context.pdf_shingle_jaccard = Some(0.95);
        assert!(apply_rules(&context)
            .reasons
            .contains(&"PDF_NEAR_DUP".to_string()));
        context.pdf_shingle_jaccard = Some(0.5);
        assert!(!apply_rules(&context)
            .reasons
            .contains(&"PDF_NEAR_DUP".to_string()));
    }

    #[test]
    fn test_bank_change_forces_at_least_review() {
        let a = row("1", None, dec!(100), date(2026, 3, 1));
        let mut context = ctx(&a, None);
        context.bank_change = true;
        let outcome = apply_rules(&context);
        assert!(outcome.reasons.contains(&"BANK_CHANGE".to_string()));
        assert_eq!(outcome.forced, DecisionLabel::Review);
    }

    #[test]
    fn test_strictest_outcome_wins() {
        let a = row("123", None, dec!(100), date(2026, 3, 1));
        let b = row("123", None, dec!(100), date(2026, 3, 1));
        let mut context = ctx(&a, Some(&b));
        context.bank_change = true;
        let outcome = apply_rules(&context);
        assert_eq!(outcome.forced, DecisionLabel::Hold);
    }

    #[test]
    fn test_quality_warnings_force_review() {
        let a = row("1", None, dec!(100), date(2026, 3, 1));
        let warnings = vec!["line sum mismatch".to_string()];
        let mut context = ctx(&a, None);
        context.quality_warnings = &warnings;
        let outcome = apply_rules(&context);
        assert!(outcome
            .reasons
            .contains(&"DATA_QUALITY_CHECK_FAIL".to_string()));
        assert_eq!(outcome.forced, DecisionLabel::Review);
    }

    #[test]
    fn test_no_candidate_no_signals_passes() {
        let a = row("1", None, dec!(100), date(2026, 3, 1));
        let outcome = apply_rules(&ctx(&a, None));
        assert!(outcome.reasons.is_empty());
        assert_eq!(outcome.forced, DecisionLabel::Pass);
    }
}
