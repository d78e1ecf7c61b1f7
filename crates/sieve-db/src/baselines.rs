//! Vendor amount baselines.

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::debug;

use sieve_core::{Error, Result, VendorBaseline};

/// Reader for per-vendor amount baselines.
///
/// Baselines are produced by an external batch job. When no row exists the
/// reader derives one inline from the vendor's invoice history using SQL
/// percentiles; `mad_like` preserves the batch job's median-of-absolute-
/// totals computation under its historical name.
pub struct PgBaselineStore {
    pool: PgPool,
    tenant_id: String,
}

impl PgBaselineStore {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id }
    }

    /// Resolve the baseline for a vendor: stored row first, inline
    /// derivation otherwise. `None` when the vendor has no history at all.
    pub async fn resolve(&self, vendor_id: &str) -> Result<Option<VendorBaseline>> {
        if let Some(stored) = self.load(vendor_id).await? {
            return Ok(Some(stored));
        }
        let derived = self.derive_inline(vendor_id).await?;
        if derived.is_some() {
            debug!(
                subsystem = "db",
                component = "baselines",
                op = "derive_inline",
                vendor_id,
                "No stored baseline, derived from invoice history"
            );
        }
        Ok(derived)
    }

    /// Load the stored baseline row.
    pub async fn load(&self, vendor_id: &str) -> Result<Option<VendorBaseline>> {
        let row = sqlx::query(
            r#"
            SELECT median, mad_like, sample_count
            FROM vendor_amount_baselines
            WHERE tenant_id = $1 AND vendor_id = $2
            "#,
        )
        .bind(&self.tenant_id)
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| VendorBaseline {
            median: r.get::<Decimal, _>("median"),
            mad_like: r.get::<Decimal, _>("mad_like"),
            sample_count: r.get("sample_count"),
        }))
    }

    /// Derive a baseline from the vendor's invoice totals via SQL
    /// percentiles.
    async fn derive_inline(&self, vendor_id: &str) -> Result<Option<VendorBaseline>> {
        let row = sqlx::query(
            r#"
            SELECT
                (PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY total::double precision))::numeric(18,4) AS median,
                (PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY ABS(total)::double precision))::numeric(18,4) AS mad_like,
                COUNT(*) AS sample_count
            FROM invoices
            WHERE tenant_id = $1 AND vendor_id = $2
            "#,
        )
        .bind(&self.tenant_id)
        .bind(vendor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let sample_count: i64 = row.get("sample_count");
        if sample_count == 0 {
            return Ok(None);
        }

        Ok(Some(VendorBaseline {
            median: row.get::<Option<Decimal>, _>("median").unwrap_or_default(),
            mad_like: row
                .get::<Option<Decimal>, _>("mad_like")
                .unwrap_or_default(),
            sample_count,
        }))
    }
}
