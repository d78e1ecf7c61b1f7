//! Pairwise feature engineering for duplicate detection.

use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use strsim::jaro_winkler;

use sieve_core::defaults::{
    LINE_COST_ALPHA, LINE_COST_BETA, LINE_COST_GAMMA, LINE_COST_TERM_CAP,
};
use sieve_core::{desc_norm, FeatureMap, InvoiceLineRow, InvoiceRow};

use crate::assignment;

/// Canonical feature ordering shared with the model artifact. Feature names
/// absent from a map are read as 0.
pub const FEATURE_ORDER: [&str; 13] = [
    "abs_total_diff_pct",
    "days_diff",
    "same_po",
    "same_currency",
    "same_tax_total",
    "bank_change_flag",
    "payee_name_change_flag",
    "invnum_edit",
    "line_coverage_pct",
    "unmatched_amount_frac",
    "count_new_items",
    "median_unit_price_diff",
    "text_cosine",
];

/// An invoice line prepared for matching: normalized description plus
/// numeric fields as floats.
#[derive(Debug, Clone)]
pub struct MatchLine {
    pub desc_norm: String,
    pub qty: f64,
    pub unit_price: f64,
    pub amount: f64,
}

impl From<&InvoiceLineRow> for MatchLine {
    fn from(line: &InvoiceLineRow) -> Self {
        Self {
            desc_norm: desc_norm(&line.desc),
            qty: line.qty.to_f64().unwrap_or(0.0),
            unit_price: line.unit_price.to_f64().unwrap_or(0.0),
            amount: line.amount.to_f64().unwrap_or(0.0),
        }
    }
}

/// Header-level comparison features for a (query, candidate) pair.
pub fn header_features(a: &InvoiceRow, b: &InvoiceRow) -> FeatureMap {
    let mut features = FeatureMap::new();

    let a_total = a.total.to_f64().unwrap_or(0.0);
    let b_total = b.total.to_f64().unwrap_or(0.0);
    features.insert(
        "abs_total_diff_pct".into(),
        (a_total - b_total).abs() / a_total.abs().max(1.0),
    );

    features.insert(
        "days_diff".into(),
        (a.invoice_date - b.invoice_date).num_days().abs() as f64,
    );

    let same_po = match (&a.po_number, &b.po_number) {
        (Some(pa), Some(pb)) => !pa.is_empty() && pa == pb,
        _ => false,
    };
    features.insert("same_po".into(), flag(same_po));

    features.insert("same_currency".into(), flag(a.currency == b.currency));

    // Absent tax totals compare as zero, so two invoices both missing tax
    // count as equal on this dimension.
    features.insert(
        "same_tax_total".into(),
        flag(round2(a.tax_total.unwrap_or_default()) == round2(b.tax_total.unwrap_or_default())),
    );

    features.insert(
        "bank_change_flag".into(),
        flag(a.remit_account_hash != b.remit_account_hash),
    );

    features.insert(
        "payee_name_change_flag".into(),
        flag(a.remit_name.as_deref().unwrap_or("") != b.remit_name.as_deref().unwrap_or("")),
    );

    features.insert(
        "invnum_edit".into(),
        1.0 - jaro_winkler(&a.invoice_number_norm, &b.invoice_number_norm),
    );

    features
}

/// Line-assignment features from the optimal matching of the two line
/// lists under the weighted description/price/quantity cost.
pub fn line_assign_features(a_lines: &[MatchLine], b_lines: &[MatchLine]) -> FeatureMap {
    line_assign_features_weighted(
        a_lines,
        b_lines,
        LINE_COST_ALPHA,
        LINE_COST_BETA,
        LINE_COST_GAMMA,
    )
}

/// Line-assignment features with explicit cost weights.
pub fn line_assign_features_weighted(
    a_lines: &[MatchLine],
    b_lines: &[MatchLine],
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> FeatureMap {
    let n = a_lines.len();

    let cost: Vec<Vec<f64>> = a_lines
        .iter()
        .map(|a| {
            b_lines
                .iter()
                .map(|b| {
                    let desc_cost = 1.0 - jaro_winkler(&a.desc_norm, &b.desc_norm);
                    let up_term = ((a.unit_price - b.unit_price).abs()
                        / a.unit_price.abs().max(1.0))
                    .min(LINE_COST_TERM_CAP);
                    let qty_term =
                        ((a.qty - b.qty).abs() / a.qty.abs().max(1.0)).min(LINE_COST_TERM_CAP);
                    alpha * desc_cost + beta * up_term + gamma * qty_term
                })
                .collect()
        })
        .collect();

    let matching = assignment::solve(&cost);

    let matched: Vec<(usize, usize)> = matching
        .iter()
        .enumerate()
        .filter_map(|(i, j)| j.map(|j| (i, j)))
        .collect();

    let total_amount: f64 = a_lines.iter().map(|l| l.amount).sum();
    let matched_amount: f64 = matched.iter().map(|&(i, _)| a_lines[i].amount).sum();
    let unmatched_amount_frac =
        (total_amount - matched_amount).max(0.0) / total_amount.max(1.0);

    let mut price_diffs: Vec<f64> = matched
        .iter()
        .map(|&(i, j)| (a_lines[i].unit_price - b_lines[j].unit_price).abs())
        .collect();
    price_diffs.sort_by(|x, y| x.partial_cmp(y).expect("finite price diffs"));

    let mut features = FeatureMap::new();
    features.insert("line_coverage_pct".into(), 1.0 - unmatched_amount_frac);
    features.insert("unmatched_amount_frac".into(), unmatched_amount_frac);
    features.insert(
        "count_new_items".into(),
        n.saturating_sub(matched.len()) as f64,
    );
    features.insert("median_unit_price_diff".into(), median_sorted(&price_diffs));
    features
}

/// Character-3-gram overlap proxy over the concatenated normalized line
/// descriptions. Deterministic, in `[0, 1]`; not a true cosine, since the
/// denominator is the summed character length of the two texts.
pub fn text_cosine(a_text: &str, b_text: &str) -> f64 {
    let a_grams = trigrams(a_text);
    let b_grams = trigrams(b_text);
    let overlap = a_grams.intersection(&b_grams).count() as f64;
    let denom = (a_text.chars().count() + b_text.chars().count()).max(1) as f64;
    (2.0 * overlap / denom).min(1.0)
}

/// Concatenate normalized line descriptions for the text feature.
pub fn joined_descs(lines: &[MatchLine]) -> String {
    lines
        .iter()
        .map(|l| l.desc_norm.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn trigrams(text: &str) -> BTreeSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return BTreeSet::new();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
