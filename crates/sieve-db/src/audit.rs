//! Append-only audit log.

use sqlx::{PgPool, Postgres, Transaction};

use sieve_core::{AuditEntry, Error, Result};

/// PostgreSQL audit log, scoped to one tenant. Rows are only ever
/// inserted; there is no update or delete path.
pub struct PgAuditLog {
    pool: PgPool,
    tenant_id: String,
}

impl PgAuditLog {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id }
    }

    /// Append an audit entry within an open transaction.
    pub async fn append_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &AuditEntry,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (tenant_id, actor, action, entity, entity_id, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.payload)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Append an audit entry outside any transaction.
    pub async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.append_tx(&mut tx, entry).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
