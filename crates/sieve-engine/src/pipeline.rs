//! Request-scoped scoring pipeline.
//!
//! Drives one `/scoreInvoice` request end to end: persist the snapshot,
//! retrieve candidates, compute pairwise features (fanned out under a
//! bounded concurrency cap), fuse the signals, resolve rules, and persist
//! the decision trail. Candidate results are merged in a stable order
//! before top-K selection, so the fan-out never changes outputs.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sieve_core::defaults;
use sieve_core::{
    text_blob, AuditEntry, DecisionRecord, DuplicateScorer, Error, Explanation, FeatureMap,
    InvoiceIn, InvoiceRow, Result, ScoreOutcome, TextIndex, TopMatch,
};
use sieve_db::Database;

use crate::anomaly::{anomaly_score, AnomalyInputs};
use crate::decision::{decide, fuse_scores};
use crate::features::{
    header_features, joined_descs, line_assign_features_weighted, text_cosine, MatchLine,
};
use crate::rules::{apply_rules, RuleContext, RuleOutcome, RULESET_VERSION};

/// One candidate with its computed features and duplicate probability.
#[derive(Debug, Clone)]
struct ScoredCandidate {
    candidate: InvoiceRow,
    dup_prob: f64,
    features: FeatureMap,
}

/// Tunables resolved from the config store for one request.
#[derive(Debug, Clone, Copy)]
struct RequestTunables {
    candidate_cap: i64,
    t_hold: f64,
    t_review: f64,
    same_po_total_tol: f64,
    same_po_window_days: i64,
    bank_change_lookback_months: i64,
    cold_start_invoices: i64,
    alpha: f64,
    beta: f64,
    gamma: f64,
}

/// The scoring orchestrator. Holds shared read-only state; one instance
/// serves all requests.
pub struct ScoringPipeline {
    db: Arc<Database>,
    text_index: Arc<dyn TextIndex>,
    scorer: Arc<dyn DuplicateScorer>,
    feature_concurrency: usize,
}

impl ScoringPipeline {
    pub fn new(
        db: Arc<Database>,
        text_index: Arc<dyn TextIndex>,
        scorer: Arc<dyn DuplicateScorer>,
        feature_concurrency: usize,
    ) -> Self {
        Self {
            db,
            text_index,
            scorer,
            feature_concurrency: feature_concurrency.max(1),
        }
    }

    /// Score one invoice and persist the full decision trail.
    pub async fn score(&self, invoice: InvoiceIn, actor: &str) -> Result<ScoreOutcome> {
        let started = Instant::now();
        invoice.validate()?;
        let quality_warnings = invoice.quality_warnings(Utc::now().date_naive());
        if !quality_warnings.is_empty() {
            debug!(
                subsystem = "engine",
                component = "pipeline",
                op = "quality_check",
                invoice_id = %invoice.invoice_id,
                findings = ?quality_warnings,
                "Data-quality findings, scoring continues"
            );
        }

        // Snapshot + lines + vendor + remit sighting commit atomically.
        self.db.invoices.ingest(&invoice).await?;

        // Text indexing is best-effort; a degraded index never fails scoring.
        let blob = text_blob(&invoice);
        if let Err(e) = self
            .text_index
            .index_invoice(&invoice.invoice_id, &invoice.vendor_id, &blob)
            .await
        {
            warn!(
                subsystem = "engine",
                component = "pipeline",
                op = "index_text",
                invoice_id = %invoice.invoice_id,
                degraded = true,
                error = %e,
                "Text index write skipped"
            );
        }

        let query = self.db.invoices.load_invoice(&invoice.invoice_id).await?;
        let tunables = self.resolve_tunables(&query.vendor_id).await?;

        let candidates = self.retrieve_candidates(&query, &blob, &tunables).await?;
        let scored = self.score_candidates(&query, candidates, &tunables).await?;

        let top: Vec<&ScoredCandidate> = scored.iter().take(defaults::TOP_K).collect();
        let dup_prob = top.first().map(|c| c.dup_prob).unwrap_or(0.0);
        let text_dup_prob = top
            .iter()
            .filter_map(|c| c.features.get("text_cosine").copied())
            .fold(0.0, f64::max);

        let anomaly = self.anomaly_signals(&query, &tunables).await?;

        let rule_outcome = apply_rules(&RuleContext {
            query: &query,
            top_candidate: top.first().map(|c| &c.candidate),
            bank_change: anomaly.bank_change,
            quality_warnings: &quality_warnings,
            same_po_total_tol: tunables.same_po_total_tol,
            same_po_window_days: tunables.same_po_window_days,
            pdf_shingle_jaccard: None,
        });

        let risk_score = fuse_scores(dup_prob, anomaly.anom_prob, anomaly.bank_change, text_dup_prob);
        let score_decision = decide(risk_score, tunables.t_review, tunables.t_hold)?;
        let final_decision = score_decision.max(rule_outcome.forced);

        let reason_codes = collect_reasons(&rule_outcome, &anomaly.reasons);

        let top_matches: Vec<TopMatch> = top
            .iter()
            .map(|c| TopMatch {
                invoice_id: c.candidate.invoice_id.clone(),
                similarity: c.dup_prob,
                features: c.features.clone(),
            })
            .collect();
        let explanations: Vec<Explanation> = top
            .first()
            .map(|c| {
                c.features
                    .iter()
                    .map(|(feature, value)| Explanation {
                        feature: feature.clone(),
                        value: *value,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let record = DecisionRecord {
            decision_id: format!("dec_{}", &Uuid::new_v4().simple().to_string()[..12]),
            invoice_id: query.invoice_id.clone(),
            model_id: self.scorer.model_id().to_string(),
            model_version: self.scorer.model_version().to_string(),
            ruleset_version: RULESET_VERSION.to_string(),
            risk_score: Decimal::from_f64(risk_score)
                .unwrap_or_default()
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            decision: final_decision,
            reason_codes: reason_codes.clone(),
            top_matches: serde_json::to_value(&top_matches)?,
            explanations: serde_json::to_value(&explanations)?,
            created_at: Utc::now(),
        };

        // Decision, case, and audit entry commit atomically.
        let mut tx = self.db.begin().await?;
        self.db.decisions.append_tx(&mut tx, &record).await?;
        self.db
            .cases
            .open_for_decision_tx(&mut tx, &query.invoice_id, final_decision)
            .await?;
        self.db
            .audit
            .append_tx(
                &mut tx,
                &AuditEntry {
                    actor: actor.to_string(),
                    action: "score".to_string(),
                    entity: "invoice".to_string(),
                    entity_id: query.invoice_id.clone(),
                    payload: serde_json::json!({
                        "risk_score": risk_score,
                        "decision": final_decision.as_str(),
                    }),
                },
            )
            .await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "engine",
            component = "pipeline",
            op = "score",
            invoice_id = %query.invoice_id,
            vendor_id = %query.vendor_id,
            risk_score,
            decision = final_decision.as_str(),
            result_count = scored.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Invoice scored"
        );

        Ok(ScoreOutcome {
            risk_score,
            decision: final_decision,
            reason_codes,
            top_matches,
            explanations,
        })
    }

    async fn resolve_tunables(&self, vendor_id: &str) -> Result<RequestTunables> {
        let vendor = Some(vendor_id);
        let configs = &self.db.configs;
        Ok(RequestTunables {
            candidate_cap: configs
                .get_f64("candidate_cap", vendor, defaults::CANDIDATE_CAP as f64)
                .await? as i64,
            t_hold: configs.get_f64("T_hold", vendor, defaults::T_HOLD).await?,
            t_review: configs
                .get_f64("T_review", vendor, defaults::T_REVIEW)
                .await?,
            same_po_total_tol: configs
                .get_f64("same_po_total_tol", vendor, defaults::SAME_PO_TOTAL_TOL)
                .await?,
            same_po_window_days: configs
                .get_f64(
                    "same_po_window_days",
                    vendor,
                    defaults::SAME_PO_WINDOW_DAYS as f64,
                )
                .await? as i64,
            bank_change_lookback_months: configs
                .get_f64(
                    "bank_change_lookback_months",
                    vendor,
                    defaults::BANK_CHANGE_LOOKBACK_MONTHS as f64,
                )
                .await? as i64,
            cold_start_invoices: configs
                .get_f64(
                    "cold_start_invoices",
                    vendor,
                    defaults::COLD_START_INVOICES as f64,
                )
                .await? as i64,
            alpha: configs
                .get_f64("line_cost_alpha", vendor, defaults::LINE_COST_ALPHA)
                .await?,
            beta: configs
                .get_f64("line_cost_beta", vendor, defaults::LINE_COST_BETA)
                .await?,
            gamma: configs
                .get_f64("line_cost_gamma", vendor, defaults::LINE_COST_GAMMA)
                .await?,
        })
    }

    /// Structured blocking predicates first; the near-text path only fills
    /// whatever headroom is left under the cap and is skipped outright when
    /// the index is degraded.
    async fn retrieve_candidates(
        &self,
        query: &InvoiceRow,
        blob: &str,
        tunables: &RequestTunables,
    ) -> Result<Vec<InvoiceRow>> {
        let cap = tunables.candidate_cap;
        let mut candidates = self.db.invoices.candidates(query, cap).await?;

        let headroom = cap - candidates.len() as i64;
        if headroom > 0 {
            let mut exclude: Vec<String> =
                candidates.iter().map(|c| c.invoice_id.clone()).collect();
            exclude.push(query.invoice_id.clone());

            match self
                .text_index
                .neighbor_ids(&query.vendor_id, blob, &exclude, headroom)
                .await
            {
                Ok(ids) if !ids.is_empty() => {
                    let neighbors = self.db.invoices.load_many(&ids).await?;
                    candidates.extend(neighbors);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        subsystem = "engine",
                        component = "pipeline",
                        op = "text_neighbors",
                        invoice_id = %query.invoice_id,
                        degraded = true,
                        error = %e,
                        "Near-text retrieval skipped"
                    );
                }
            }
        }

        candidates.truncate(cap.max(0) as usize);
        Ok(candidates)
    }

    /// Fan candidate feature computation out across a bounded `JoinSet`,
    /// then merge deterministically: sort by candidate id, then by
    /// probability with the id as tie-break.
    async fn score_candidates(
        &self,
        query: &InvoiceRow,
        candidates: Vec<InvoiceRow>,
        tunables: &RequestTunables,
    ) -> Result<Vec<ScoredCandidate>> {
        let query_lines: Vec<MatchLine> = self
            .db
            .invoices
            .load_lines(&query.invoice_id)
            .await?
            .iter()
            .map(MatchLine::from)
            .collect();
        let query_lines = Arc::new(query_lines);
        let query_text = Arc::new(joined_descs(&query_lines));
        let query = Arc::new(query.clone());

        let mut scored: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len());
        for chunk in candidates.chunks(self.feature_concurrency) {
            let mut tasks: JoinSet<Result<ScoredCandidate>> = JoinSet::new();
            for candidate in chunk.iter().cloned() {
                let db = Arc::clone(&self.db);
                let scorer = Arc::clone(&self.scorer);
                let query = Arc::clone(&query);
                let query_lines = Arc::clone(&query_lines);
                let query_text = Arc::clone(&query_text);
                let (alpha, beta, gamma) = (tunables.alpha, tunables.beta, tunables.gamma);

                tasks.spawn(async move {
                    let cand_lines: Vec<MatchLine> = db
                        .invoices
                        .load_lines(&candidate.invoice_id)
                        .await?
                        .iter()
                        .map(MatchLine::from)
                        .collect();

                    let mut features = header_features(&query, &candidate);
                    features.extend(line_assign_features_weighted(
                        &query_lines,
                        &cand_lines,
                        alpha,
                        beta,
                        gamma,
                    ));
                    features.insert(
                        "text_cosine".to_string(),
                        text_cosine(&query_text, &joined_descs(&cand_lines)),
                    );

                    let dup_prob = scorer.predict_dup_prob(&features);
                    Ok(ScoredCandidate {
                        candidate,
                        dup_prob,
                        features,
                    })
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let result =
                    joined.map_err(|e| Error::Internal(format!("feature task panicked: {e}")))?;
                scored.push(result?);
            }
        }

        scored.sort_by(|a, b| a.candidate.invoice_id.cmp(&b.candidate.invoice_id));
        scored.sort_by(|a, b| {
            b.dup_prob
                .partial_cmp(&a.dup_prob)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scored)
    }

    async fn anomaly_signals(
        &self,
        query: &InvoiceRow,
        tunables: &RequestTunables,
    ) -> Result<crate::anomaly::AnomalySignals> {
        let baseline = self.db.baselines.resolve(&query.vendor_id).await?;
        let sighting = match &query.remit_account_hash {
            Some(hash) => {
                self.db
                    .invoices
                    .remit_sighting(&query.vendor_id, hash)
                    .await?
            }
            None => None,
        };
        let history = self
            .db
            .invoices
            .vendor_history_count(&query.vendor_id, &query.invoice_id)
            .await?;

        Ok(anomaly_score(
            query,
            &AnomalyInputs {
                baseline: baseline.as_ref(),
                sighting: sighting.as_ref(),
                vendor_history_count: history,
                cold_start_threshold: tunables.cold_start_invoices,
                lookback_months: tunables.bank_change_lookback_months,
                now: Utc::now(),
            },
        ))
    }
}

/// Rule reasons lead, anomaly reasons follow; duplicates collapse while
/// keeping first-occurrence order.
fn collect_reasons(rules: &RuleOutcome, anomaly_reasons: &[String]) -> Vec<String> {
    let mut reasons: Vec<String> = Vec::new();
    for code in rules.reasons.iter().chain(anomaly_reasons) {
        if !reasons.iter().any(|r| r == code) {
            reasons.push(code.clone());
        }
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::DecisionLabel;

    #[test]
    fn test_collect_reasons_dedups_preserving_order() {
        let rules = RuleOutcome {
            reasons: vec!["EXACT_INVNUM".into(), "BANK_CHANGE".into()],
            forced: DecisionLabel::Hold,
        };
        let anomaly = vec!["AMOUNT_OUTLIER".to_string(), "BANK_CHANGE".to_string()];
        assert_eq!(
            collect_reasons(&rules, &anomaly),
            vec!["EXACT_INVNUM", "BANK_CHANGE", "AMOUNT_OUTLIER"]
        );
    }

    #[test]
    fn test_collect_reasons_empty() {
        let rules = RuleOutcome {
            reasons: vec![],
            forced: DecisionLabel::Pass,
        };
        assert!(collect_reasons(&rules, &[]).is_empty());
    }
}
