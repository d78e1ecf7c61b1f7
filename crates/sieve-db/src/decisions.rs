//! Append-only decision store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use sieve_core::{DecisionLabel, DecisionRecord, Error, Result};

/// PostgreSQL decision store, scoped to one tenant.
pub struct PgDecisionStore {
    pool: PgPool,
    tenant_id: String,
}

impl PgDecisionStore {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id }
    }

    /// Append a decision row within an open transaction.
    ///
    /// Decisions are never updated or deleted; the newest row per invoice
    /// is the active decision.
    pub async fn append_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        decision: &DecisionRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decisions (
                tenant_id, decision_id, invoice_id, model_id, model_version,
                ruleset_version, risk_score, decision, reason_codes, top_matches, explanations
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&decision.decision_id)
        .bind(&decision.invoice_id)
        .bind(&decision.model_id)
        .bind(&decision.model_version)
        .bind(&decision.ruleset_version)
        .bind(decision.risk_score)
        .bind(decision.decision.as_str())
        .bind(&decision.reason_codes)
        .bind(&decision.top_matches)
        .bind(&decision.explanations)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Most recent decision for an invoice, if any.
    pub async fn latest(&self, invoice_id: &str) -> Result<Option<DecisionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT decision_id, invoice_id, model_id, model_version, ruleset_version,
                   risk_score, decision, reason_codes, top_matches, explanations, created_at
            FROM decisions
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| decision_from(&r)).transpose()
    }

    /// All decisions for an invoice, newest first.
    pub async fn history(&self, invoice_id: &str) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT decision_id, invoice_id, model_id, model_version, ruleset_version,
                   risk_score, decision, reason_codes, top_matches, explanations, created_at
            FROM decisions
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(decision_from).collect()
    }
}

fn decision_from(r: &PgRow) -> Result<DecisionRecord> {
    Ok(DecisionRecord {
        decision_id: r.get("decision_id"),
        invoice_id: r.get("invoice_id"),
        model_id: r.get("model_id"),
        model_version: r.get("model_version"),
        ruleset_version: r.get("ruleset_version"),
        risk_score: r.get::<Decimal, _>("risk_score"),
        decision: DecisionLabel::parse(r.get::<String, _>("decision").as_str())?,
        reason_codes: r.get::<Vec<String>, _>("reason_codes"),
        top_matches: r.get("top_matches"),
        explanations: r.get("explanations"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    })
}
