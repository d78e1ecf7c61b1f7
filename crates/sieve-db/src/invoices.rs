//! Invoice snapshot store and candidate retrieval.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use sieve_core::normalize;
use sieve_core::{Error, InvoiceIn, InvoiceLineRow, InvoiceRow, RemitSighting, Result};

/// Outcome of persisting an incoming invoice.
#[derive(Debug, Clone, Copy)]
pub struct IngestReceipt {
    /// Whether this call created the snapshot. A repeated submission with
    /// the same `invoice_id` leaves the existing snapshot and lines
    /// untouched.
    pub newly_created: bool,
}

/// PostgreSQL snapshot store, scoped to one tenant.
pub struct PgInvoiceStore {
    pool: PgPool,
    tenant_id: String,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id }
    }

    /// Persist the snapshot, its lines, the vendor row, and the remit
    /// sighting in one transaction.
    ///
    /// The snapshot insert is insert-if-absent: once a `(tenant_id,
    /// invoice_id)` snapshot exists it is immutable. The remit sighting is
    /// refreshed on every observation regardless.
    pub async fn ingest(&self, invoice: &InvoiceIn) -> Result<IngestReceipt> {
        let invoice_number_norm = normalize::invoice_number_norm(&invoice.invoice_number);
        let remit_account_masked =
            normalize::mask_account_last4(invoice.remit_bank_iban_or_account.as_deref());
        let remit_account_hash =
            normalize::hash_account(invoice.remit_bank_iban_or_account.as_deref());
        let raw_json = serde_json::to_value(invoice)?;
        let payload_hash = normalize::payload_hash(&raw_json);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO vendors (tenant_id, vendor_id, vendor_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, vendor_id) DO UPDATE SET vendor_name = EXCLUDED.vendor_name
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&invoice.vendor_id)
        .bind(&invoice.vendor_name)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO invoices (
                tenant_id, invoice_id, vendor_id, invoice_number, invoice_number_norm,
                invoice_date, currency, total, tax_total, po_number,
                remit_account_masked, remit_account_hash, remit_name, pdf_hash, terms,
                payload_hash, normalizer_version, raw_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (tenant_id, invoice_id) DO NOTHING
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&invoice.invoice_id)
        .bind(&invoice.vendor_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice_number_norm)
        .bind(invoice.invoice_date)
        .bind(&invoice.currency)
        .bind(invoice.total)
        .bind(invoice.tax_total)
        .bind(&invoice.po_number)
        .bind(&remit_account_masked)
        .bind(&remit_account_hash)
        .bind(&invoice.remit_name)
        .bind(&invoice.pdf_hash)
        .bind(&invoice.terms)
        .bind(&payload_hash)
        .bind(normalize::NORMALIZER_VERSION)
        .bind(&raw_json)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let newly_created = inserted.rows_affected() == 1;

        if newly_created {
            for (idx, line) in invoice.line_items.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO invoice_lines (
                        tenant_id, invoice_id, line_no, "desc", qty, unit_price, amount,
                        sku, gl_code, cost_center
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(&self.tenant_id)
                .bind(&invoice.invoice_id)
                .bind((idx + 1) as i32)
                .bind(&line.desc)
                .bind(line.qty)
                .bind(line.unit_price)
                .bind(line.amount)
                .bind(&line.sku)
                .bind(&line.gl_code)
                .bind(&line.cost_center)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
        }

        if let Some(hash) = &remit_account_hash {
            sqlx::query(
                r#"
                INSERT INTO vendor_remit_accounts (tenant_id, vendor_id, remit_account_hash, remit_name)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (tenant_id, vendor_id, remit_account_hash)
                    DO UPDATE SET last_seen = NOW(), remit_name = EXCLUDED.remit_name
                "#,
            )
            .bind(&self.tenant_id)
            .bind(&invoice.vendor_id)
            .bind(hash)
            .bind(&invoice.remit_name)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "invoices",
            op = "ingest",
            invoice_id = %invoice.invoice_id,
            newly_created,
            "Invoice snapshot persisted"
        );

        Ok(IngestReceipt { newly_created })
    }

    /// Load the snapshot header row.
    pub async fn load_invoice(&self, invoice_id: &str) -> Result<InvoiceRow> {
        let row = sqlx::query(
            r#"
            SELECT invoice_id, vendor_id, invoice_number, invoice_number_norm, invoice_date,
                   currency, total, tax_total, po_number, remit_account_masked,
                   remit_account_hash, remit_name, pdf_hash, terms, payload_hash,
                   normalizer_version, created_at
            FROM invoices
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| invoice_row_from(&r))
            .ok_or_else(|| Error::NotFound(format!("invoice {invoice_id}")))
    }

    /// Load lines ordered by `line_no`.
    pub async fn load_lines(&self, invoice_id: &str) -> Result<Vec<InvoiceLineRow>> {
        let rows = sqlx::query(
            r#"
            SELECT line_no, "desc", qty, unit_price, amount, sku, gl_code, cost_center
            FROM invoice_lines
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY line_no
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| InvoiceLineRow {
                line_no: r.get("line_no"),
                desc: r.get("desc"),
                qty: r.get("qty"),
                unit_price: r.get("unit_price"),
                amount: r.get("amount"),
                sku: r.get("sku"),
                gl_code: r.get("gl_code"),
                cost_center: r.get("cost_center"),
            })
            .collect())
    }

    /// Load multiple snapshot rows by id (used by the near-text path).
    pub async fn load_many(&self, invoice_ids: &[String]) -> Result<Vec<InvoiceRow>> {
        if invoice_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT invoice_id, vendor_id, invoice_number, invoice_number_norm, invoice_date,
                   currency, total, tax_total, po_number, remit_account_masked,
                   remit_account_hash, remit_name, pdf_hash, terms, payload_hash,
                   normalizer_version, created_at
            FROM invoices
            WHERE tenant_id = $1 AND invoice_id = ANY($2)
            ORDER BY invoice_date DESC, invoice_id
            "#,
        )
        .bind(&self.tenant_id)
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(invoice_row_from).collect())
    }

    /// Retrieve same-vendor candidates matching any structured blocking
    /// predicate, priority-ordered and capped.
    ///
    /// Priority: exact normalized invoice number, then same PO, then
    /// amount-and-month; recency breaks ties. `round(..., 2)` on both sides
    /// happens in SQL so the comparison uses one rounding mode.
    pub async fn candidates(&self, query: &InvoiceRow, cap: i64) -> Result<Vec<InvoiceRow>> {
        let rows = sqlx::query(
            r#"
            WITH base AS (
                SELECT invoice_id, vendor_id, invoice_number, invoice_number_norm, invoice_date,
                       currency, total, tax_total, po_number, remit_account_masked,
                       remit_account_hash, remit_name, pdf_hash, terms, payload_hash,
                       normalizer_version, created_at
                FROM invoices
                WHERE tenant_id = $1 AND vendor_id = $2 AND invoice_id <> $3
            )
            SELECT *,
                   CASE
                       WHEN invoice_number_norm = $4 THEN 1
                       WHEN po_number IS NOT NULL AND po_number = $5 THEN 2
                       WHEN round(total, 2) = round($6::numeric, 2)
                            AND date_trunc('month', invoice_date) = date_trunc('month', $7::date)
                           THEN 3
                       ELSE 4
                   END AS priority
            FROM base
            WHERE (
                      round(total, 2) = round($6::numeric, 2)
                      AND date_trunc('month', invoice_date) = date_trunc('month', $7::date)
                  )
               OR (po_number IS NOT NULL AND po_number = $5)
               OR invoice_number_norm = $4
               OR (remit_account_hash IS NOT NULL AND remit_account_hash = $8)
            ORDER BY priority ASC, invoice_date DESC, invoice_id ASC
            LIMIT $9
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&query.vendor_id)
        .bind(&query.invoice_id)
        .bind(&query.invoice_number_norm)
        .bind(&query.po_number)
        .bind(query.total)
        .bind(query.invoice_date)
        .bind(&query.remit_account_hash)
        .bind(cap)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "retriever",
            op = "candidates",
            invoice_id = %query.invoice_id,
            vendor_id = %query.vendor_id,
            result_count = rows.len(),
            "Structured candidate retrieval"
        );

        Ok(rows.iter().map(invoice_row_from).collect())
    }

    /// Count the vendor's historical invoices, excluding the query itself.
    pub async fn vendor_history_count(
        &self,
        vendor_id: &str,
        exclude_invoice_id: &str,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoices
            WHERE tenant_id = $1 AND vendor_id = $2 AND invoice_id <> $3
            "#,
        )
        .bind(&self.tenant_id)
        .bind(vendor_id)
        .bind(exclude_invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    /// Look up the sighting record for one remit account hash.
    pub async fn remit_sighting(
        &self,
        vendor_id: &str,
        remit_account_hash: &str,
    ) -> Result<Option<RemitSighting>> {
        let row = sqlx::query(
            r#"
            SELECT vendor_id, remit_account_hash, remit_name, first_seen, last_seen
            FROM vendor_remit_accounts
            WHERE tenant_id = $1 AND vendor_id = $2 AND remit_account_hash = $3
            "#,
        )
        .bind(&self.tenant_id)
        .bind(vendor_id)
        .bind(remit_account_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| RemitSighting {
            vendor_id: r.get("vendor_id"),
            remit_account_hash: r.get("remit_account_hash"),
            remit_name: r.get("remit_name"),
            first_seen: r.get::<DateTime<Utc>, _>("first_seen"),
            last_seen: r.get::<DateTime<Utc>, _>("last_seen"),
        }))
    }
}

pub(crate) fn invoice_row_from(r: &PgRow) -> InvoiceRow {
    InvoiceRow {
        invoice_id: r.get("invoice_id"),
        vendor_id: r.get("vendor_id"),
        invoice_number: r.get("invoice_number"),
        invoice_number_norm: r.get("invoice_number_norm"),
        invoice_date: r.get::<NaiveDate, _>("invoice_date"),
        currency: r.get("currency"),
        total: r.get::<Decimal, _>("total"),
        tax_total: r.get::<Option<Decimal>, _>("tax_total"),
        po_number: r.get("po_number"),
        remit_account_masked: r.get("remit_account_masked"),
        remit_account_hash: r.get("remit_account_hash"),
        remit_name: r.get("remit_name"),
        pdf_hash: r.get("pdf_hash"),
        terms: r.get("terms"),
        payload_hash: r.get("payload_hash"),
        normalizer_version: r.get("normalizer_version"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}
