//! Review case store.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use sieve_core::defaults::CASE_SLA_HOURS;
use sieve_core::{CaseRecord, CaseStatus, DecisionLabel, Error, Result};

/// PostgreSQL case store, scoped to one tenant.
pub struct PgCaseStore {
    pool: PgPool,
    tenant_id: String,
}

impl PgCaseStore {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id }
    }

    /// Open or refresh the case for an invoice when the decision requires
    /// manual work. Returns the case id, or `None` for PASS.
    ///
    /// At most one case exists per `(tenant, invoice)`. A refresh only
    /// touches `status` and `updated_at`; the SLA deadline and any recorded
    /// disposition stay as written.
    pub async fn open_for_decision_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: &str,
        decision: DecisionLabel,
    ) -> Result<Option<String>> {
        if decision == DecisionLabel::Pass {
            return Ok(None);
        }

        let case_id = format!("case_{}", Uuid::new_v4().simple());
        let row: (String,) = sqlx::query_as(
            r#"
            INSERT INTO cases (tenant_id, case_id, invoice_id, status, sla_due)
            VALUES ($1, $2, $3, 'OPEN', NOW() + make_interval(hours => $4))
            ON CONFLICT (tenant_id, invoice_id)
                DO UPDATE SET status = 'OPEN', updated_at = NOW()
            RETURNING case_id
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&case_id)
        .bind(invoice_id)
        .bind(CASE_SLA_HOURS as i32)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(Some(row.0))
    }

    /// Load the case for an invoice, if one exists.
    pub async fn find_by_invoice(&self, invoice_id: &str) -> Result<Option<CaseRecord>> {
        let row = sqlx::query(
            r#"
            SELECT case_id, invoice_id, status, sla_due,
                   disposition_user, disposition_at, disposition_label, disposition_notes
            FROM cases
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| {
            let status = match r.get::<String, _>("status").as_str() {
                "OPEN" => CaseStatus::Open,
                "CLOSED" => CaseStatus::Closed,
                other => return Err(Error::Internal(format!("unknown case status {other:?}"))),
            };
            Ok(CaseRecord {
                case_id: r.get("case_id"),
                invoice_id: r.get("invoice_id"),
                status,
                sla_due: r.get::<DateTime<Utc>, _>("sla_due"),
                disposition_user: r.get("disposition_user"),
                disposition_at: r.get::<Option<DateTime<Utc>>, _>("disposition_at"),
                disposition_label: r.get("disposition_label"),
                disposition_notes: r.get("disposition_notes"),
            })
        })
        .transpose()
    }

    /// Record a disposition on an open case, once. Later calls do not
    /// overwrite an existing disposition.
    pub async fn dispose(
        &self,
        case_id: &str,
        user: &str,
        label: &str,
        notes: Option<&str>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE cases
            SET status = 'CLOSED',
                disposition_user = $3,
                disposition_label = $4,
                disposition_notes = $5,
                disposition_at = NOW(),
                updated_at = NOW()
            WHERE tenant_id = $1 AND case_id = $2 AND disposition_user IS NULL
            "#,
        )
        .bind(&self.tenant_id)
        .bind(case_id)
        .bind(user)
        .bind(label)
        .bind(notes)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "open case {case_id} without disposition"
            )));
        }
        Ok(())
    }
}
