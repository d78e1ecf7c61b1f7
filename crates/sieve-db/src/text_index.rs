//! Postgres full-text implementation of the text index capability.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use sieve_core::{Error, Result, TextIndex};

/// Text index backed by a `tsvector` column over the invoice text blob.
pub struct PgTextIndex {
    pool: PgPool,
    tenant_id: String,
}

impl PgTextIndex {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id }
    }
}

#[async_trait]
impl TextIndex for PgTextIndex {
    async fn index_invoice(&self, invoice_id: &str, vendor_id: &str, blob: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_text (tenant_id, invoice_id, vendor_id, blob)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, invoice_id) DO UPDATE SET blob = EXCLUDED.blob
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_id)
        .bind(vendor_id)
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Index(e.to_string()))?;
        Ok(())
    }

    async fn neighbor_ids(
        &self,
        vendor_id: &str,
        blob: &str,
        exclude: &[String],
        limit: i64,
    ) -> Result<Vec<String>> {
        if blob.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT invoice_id
            FROM invoice_text
            WHERE tenant_id = $1
              AND vendor_id = $2
              AND invoice_id <> ALL($3)
              AND ts @@ plainto_tsquery('simple', $4)
            ORDER BY ts_rank(ts, plainto_tsquery('simple', $4)) DESC, invoice_id ASC
            LIMIT $5
            "#,
        )
        .bind(&self.tenant_id)
        .bind(vendor_id)
        .bind(exclude)
        .bind(blob)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Index(e.to_string()))?;

        let ids: Vec<String> = rows.iter().map(|r| r.get("invoice_id")).collect();
        debug!(
            subsystem = "index",
            component = "text_index",
            op = "neighbor_ids",
            vendor_id,
            result_count = ids.len(),
            "Near-text neighbor lookup"
        );
        Ok(ids)
    }
}
