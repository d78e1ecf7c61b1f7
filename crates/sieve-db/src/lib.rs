//! # sieve-db
//!
//! PostgreSQL storage layer for the invoice anomaly sieve.
//!
//! This crate provides:
//! - Connection pool management
//! - Tenant-scoped stores for snapshots, decisions, cases, audit entries
//! - The keyed config store with vendor-then-global scope fallback
//! - Vendor amount baselines with inline percentile derivation
//! - The Postgres full-text implementation of the text index capability

pub mod audit;
pub mod baselines;
pub mod cases;
pub mod configs;
pub mod decisions;
pub mod invoices;
pub mod pool;
pub mod text_index;

pub use audit::PgAuditLog;
pub use baselines::PgBaselineStore;
pub use cases::PgCaseStore;
pub use configs::PgConfigStore;
pub use decisions::PgDecisionStore;
pub use invoices::{IngestReceipt, PgInvoiceStore};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use text_index::PgTextIndex;

use sieve_core::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};

/// Combined database context with all tenant-scoped stores.
pub struct Database {
    /// The underlying connection pool.
    pub pool: PgPool,
    /// Tenant every store is scoped to.
    pub tenant_id: String,
    /// Invoice snapshot store and candidate retrieval.
    pub invoices: PgInvoiceStore,
    /// Append-only decision store.
    pub decisions: PgDecisionStore,
    /// Review case store.
    pub cases: PgCaseStore,
    /// Append-only audit log.
    pub audit: PgAuditLog,
    /// Vendor amount baselines.
    pub baselines: PgBaselineStore,
    /// Keyed config store with scope fallback.
    pub configs: PgConfigStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: PgPool, tenant_id: &str) -> Self {
        Self {
            invoices: PgInvoiceStore::new(pool.clone(), tenant_id.to_string()),
            decisions: PgDecisionStore::new(pool.clone(), tenant_id.to_string()),
            cases: PgCaseStore::new(pool.clone(), tenant_id.to_string()),
            audit: PgAuditLog::new(pool.clone(), tenant_id.to_string()),
            baselines: PgBaselineStore::new(pool.clone(), tenant_id.to_string()),
            configs: PgConfigStore::new(pool.clone(), tenant_id.to_string()),
            tenant_id: tenant_id.to_string(),
            pool,
        }
    }

    /// Connect and build the store aggregate.
    pub async fn connect(url: &str, tenant_id: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool, tenant_id))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Begin a transaction for composing multi-store writes.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(Error::Database)
    }

    /// Build the text index capability for this tenant.
    pub fn text_index(&self) -> PgTextIndex {
        PgTextIndex::new(self.pool.clone(), self.tenant_id.clone())
    }
}
