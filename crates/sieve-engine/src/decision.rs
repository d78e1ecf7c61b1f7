//! Score fusion and threshold decisioning.

use sieve_core::{DecisionLabel, Error, Result};

/// Independent-signal contribution of a bank change to the fused score.
const BANK_CHANGE_WEIGHT: f64 = 0.6;

/// Fuse the probability signals into a 0-100 risk score.
///
/// Noisy-or over the independent signals: the score only grows as any
/// input grows, and the formula is order-independent and idempotent.
pub fn fuse_scores(
    dup_prob: f64,
    anom_prob: f64,
    bank_change: bool,
    text_dup_prob: f64,
) -> f64 {
    let bank = if bank_change { BANK_CHANGE_WEIGHT } else { 0.0 };
    let p = 1.0
        - (1.0 - dup_prob.clamp(0.0, 1.0))
            * (1.0 - anom_prob.clamp(0.0, 1.0))
            * (1.0 - bank)
            * (1.0 - text_dup_prob.clamp(0.0, 1.0));
    round2(100.0 * p)
}

/// Map a risk score to a decision via the configured thresholds.
pub fn decide(score: f64, review_threshold: f64, hold_threshold: f64) -> Result<DecisionLabel> {
    if hold_threshold < review_threshold {
        return Err(Error::Config(format!(
            "T_hold ({hold_threshold}) must be >= T_review ({review_threshold})"
        )));
    }
    Ok(if score >= hold_threshold {
        DecisionLabel::Hold
    } else if score >= review_threshold {
        DecisionLabel::Review
    } else {
        DecisionLabel::Pass
    })
}

/// Round half away from zero to two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fusion_reference_scenario() {
        let score = fuse_scores(0.8, 0.2, true, 0.1);
        assert!((80.0..=100.0).contains(&score), "got {score}");
        assert_eq!(decide(score, 50.0, 80.0).unwrap(), DecisionLabel::Hold);
    }

    #[test]
    fn test_fusion_zero_signals() {
        assert_eq!(fuse_scores(0.0, 0.0, false, 0.0), 0.0);
    }

    #[test]
    fn test_fusion_saturates_at_100() {
        assert_eq!(fuse_scores(1.0, 0.5, true, 0.2), 100.0);
    }

    #[test]
    fn test_fusion_monotone_in_each_signal() {
        let base = fuse_scores(0.3, 0.2, false, 0.1);
        assert!(fuse_scores(0.4, 0.2, false, 0.1) >= base);
        assert!(fuse_scores(0.3, 0.3, false, 0.1) >= base);
        assert!(fuse_scores(0.3, 0.2, true, 0.1) >= base);
        assert!(fuse_scores(0.3, 0.2, false, 0.2) >= base);
    }

    #[test]
    fn test_fusion_monotone_grid() {
        let steps = [0.0, 0.25, 0.5, 0.75, 1.0];
        for &dup in &steps {
            for &anom in &steps {
                for &text in &steps {
                    let without = fuse_scores(dup, anom, false, text);
                    let with = fuse_scores(dup, anom, true, text);
                    assert!(with >= without, "bank change lowered {dup}/{anom}/{text}");
                }
            }
        }
    }

    #[test]
    fn test_fusion_deterministic() {
        assert_eq!(fuse_scores(0.37, 0.11, true, 0.2), fuse_scores(0.37, 0.11, true, 0.2));
    }

    #[test]
    fn test_decide_threshold_edges() {
        assert_eq!(decide(80.0, 50.0, 80.0).unwrap(), DecisionLabel::Hold);
        assert_eq!(decide(79.99, 50.0, 80.0).unwrap(), DecisionLabel::Review);
        assert_eq!(decide(50.0, 50.0, 80.0).unwrap(), DecisionLabel::Review);
        assert_eq!(decide(49.99, 50.0, 80.0).unwrap(), DecisionLabel::Pass);
    }

    #[test]
    fn test_decide_rejects_inverted_thresholds() {
        assert!(decide(10.0, 80.0, 50.0).is_err());
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        // 10.125 is exactly representable, so the midpoint case is real
        assert_eq!(round2(10.125), 10.13);
        assert_eq!(round2(-10.125), -10.13);
        assert_eq!(round2(10.124), 10.12);
    }
}
