//! Vendor-scoped anomaly signals.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;

use sieve_core::defaults::{
    AMOUNT_OUTLIER_Z, BANK_CHANGE_ANOM_FLOOR, COLD_START_DAMPING,
};
use sieve_core::{InvoiceRow, RemitSighting, VendorBaseline};

/// A fresh sighting (created by this very request) still counts as unseen:
/// the row exists by the time we look, so the observation window tells us
/// whether the vendor had the account before.
const FRESH_SIGHTING_WINDOW_SECS: i64 = 60;

/// Anomaly output: probability, reason codes, and the bank-change signal
/// consumed by rules and score fusion.
#[derive(Debug, Clone)]
pub struct AnomalySignals {
    pub anom_prob: f64,
    pub reasons: Vec<String>,
    pub bank_change: bool,
}

/// Inputs resolved from storage before scoring.
#[derive(Debug, Clone)]
pub struct AnomalyInputs<'a> {
    pub baseline: Option<&'a VendorBaseline>,
    pub sighting: Option<&'a RemitSighting>,
    pub vendor_history_count: i64,
    pub cold_start_threshold: i64,
    pub lookback_months: i64,
    pub now: DateTime<Utc>,
}

/// Compute the amount outlier score and the bank-change flag for the query
/// invoice.
pub fn anomaly_score(invoice: &InvoiceRow, inputs: &AnomalyInputs<'_>) -> AnomalySignals {
    let mut reasons = Vec::new();

    let z = amount_z(invoice, inputs.baseline);
    let mut amount_score = (z / 10.0).min(1.0);
    if z >= AMOUNT_OUTLIER_Z {
        reasons.push("AMOUNT_OUTLIER".to_string());
    }

    if inputs.vendor_history_count < inputs.cold_start_threshold {
        amount_score *= COLD_START_DAMPING;
    }

    let bank_change = invoice.remit_account_hash.is_some()
        && is_unseen_account(inputs.sighting, inputs.lookback_months, inputs.now);
    if bank_change {
        reasons.push("BANK_CHANGE".to_string());
        amount_score = amount_score.max(BANK_CHANGE_ANOM_FLOOR);
    }

    AnomalySignals {
        anom_prob: amount_score.clamp(0.0, 1.0),
        reasons,
        bank_change,
    }
}

fn amount_z(invoice: &InvoiceRow, baseline: Option<&VendorBaseline>) -> f64 {
    let Some(baseline) = baseline else {
        return 0.0;
    };
    let median = baseline.median.to_f64().unwrap_or(0.0);
    let mad = baseline.mad_like.to_f64().unwrap_or(0.0);
    // A degenerate zero spread falls back to the median's own magnitude.
    let mad = if mad == 0.0 { median.abs().max(1.0) } else { mad };
    let total = invoice.total.to_f64().unwrap_or(0.0);
    (total - median).abs() / mad.max(1.0)
}

fn is_unseen_account(
    sighting: Option<&RemitSighting>,
    lookback_months: i64,
    now: DateTime<Utc>,
) -> bool {
    match sighting {
        None => true,
        Some(s) => {
            let fresh =
                s.last_seen - s.first_seen <= Duration::seconds(FRESH_SIGHTING_WINDOW_SECS);
            let stale = now - s.last_seen > Duration::days(lookback_months * 30);
            fresh || stale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn invoice(total: rust_decimal::Decimal, remit_hash: Option<&str>) -> InvoiceRow {
        InvoiceRow {
            invoice_id: "inv-1".into(),
            vendor_id: "v-1".into(),
            invoice_number: "INV-1".into(),
            invoice_number_norm: "1".into(),
            invoice_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            currency: "EUR".into(),
            total,
            tax_total: None,
            po_number: None,
            remit_account_masked: None,
            remit_account_hash: remit_hash.map(String::from),
            remit_name: None,
            pdf_hash: None,
            terms: None,
            payload_hash: "ph".into(),
            normalizer_version: "v1".into(),
            created_at: Utc::now(),
        }
    }

    fn inputs<'a>(
        baseline: Option<&'a VendorBaseline>,
        sighting: Option<&'a RemitSighting>,
    ) -> AnomalyInputs<'a> {
        AnomalyInputs {
            baseline,
            sighting,
            vendor_history_count: 100,
            cold_start_threshold: 50,
            lookback_months: 12,
            now: Utc::now(),
        }
    }

    fn sighting(first_seen_days_ago: i64, last_seen_days_ago: i64) -> RemitSighting {
        let now = Utc::now();
        RemitSighting {
            vendor_id: "v-1".into(),
            remit_account_hash: "h".into(),
            remit_name: None,
            first_seen: now - Duration::days(first_seen_days_ago),
            last_seen: now - Duration::days(last_seen_days_ago),
        }
    }

    #[test]
    fn test_amount_outlier_fires_at_z6() {
        let baseline = VendorBaseline {
            median: dec!(100),
            mad_like: dec!(10),
            sample_count: 40,
        };
        // z = |760 - 100| / 10 = 66
        let signals = anomaly_score(&invoice(dec!(760), None), &inputs(Some(&baseline), None));
        assert!(signals.reasons.contains(&"AMOUNT_OUTLIER".to_string()));
        assert_eq!(signals.anom_prob, 1.0);

        // z = 5.5: below the reason threshold, score 0.55
        let signals = anomaly_score(&invoice(dec!(155), None), &inputs(Some(&baseline), None));
        assert!(!signals.reasons.contains(&"AMOUNT_OUTLIER".to_string()));
        assert!((signals.anom_prob - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_zero_mad_falls_back_to_median_magnitude() {
        let baseline = VendorBaseline {
            median: dec!(200),
            mad_like: dec!(0),
            sample_count: 40,
        };
        // mad -> max(|200|, 1) = 200; z = |400-200|/200 = 1
        let signals = anomaly_score(&invoice(dec!(400), None), &inputs(Some(&baseline), None));
        assert!((signals.anom_prob - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_no_baseline_scores_zero() {
        let signals = anomaly_score(&invoice(dec!(1000), None), &inputs(None, None));
        assert_eq!(signals.anom_prob, 0.0);
        assert!(signals.reasons.is_empty());
        assert!(!signals.bank_change);
    }

    #[test]
    fn test_unseen_account_flags_bank_change_with_floor() {
        let signals = anomaly_score(&invoice(dec!(100), Some("h")), &inputs(None, None));
        assert!(signals.bank_change);
        assert!(signals.reasons.contains(&"BANK_CHANGE".to_string()));
        assert!(signals.anom_prob >= 0.6);
    }

    #[test]
    fn test_fresh_sighting_counts_as_unseen() {
        let s = sighting(0, 0);
        let signals = anomaly_score(&invoice(dec!(100), Some("h")), &inputs(None, Some(&s)));
        assert!(signals.bank_change);
    }

    #[test]
    fn test_established_sighting_is_not_a_change() {
        let s = sighting(400, 10);
        let signals = anomaly_score(&invoice(dec!(100), Some("h")), &inputs(None, Some(&s)));
        assert!(!signals.bank_change);
        assert!(signals.reasons.is_empty());
    }

    #[test]
    fn test_stale_sighting_counts_as_change() {
        let s = sighting(900, 400);
        let signals = anomaly_score(&invoice(dec!(100), Some("h")), &inputs(None, Some(&s)));
        assert!(signals.bank_change);
    }

    #[test]
    fn test_no_remit_hash_never_flags() {
        let signals = anomaly_score(&invoice(dec!(100), None), &inputs(None, None));
        assert!(!signals.bank_change);
    }

    #[test]
    fn test_cold_start_damping() {
        let baseline = VendorBaseline {
            median: dec!(100),
            mad_like: dec!(10),
            sample_count: 5,
        };
        let mut cold = inputs(Some(&baseline), None);
        cold.vendor_history_count = 5;
        // z = 4 -> 0.4, damped to 0.32
        let signals = anomaly_score(&invoice(dec!(140), None), &cold);
        assert!((signals.anom_prob - 0.32).abs() < 1e-9);
    }
}
