// SPDX-License-Identifier: MIT OR Apache-2.0
//! Package and invoice row operations.

use crate::rows::{InvoiceRow, PackageRow};
use crate::{Store, StoreError, StoreResult, now_text, parse_timestamp};
use apc_core::{DataReference, FeedlotFamily, InvoiceStatus, PackageStatus};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

fn ref_json(r: &DataReference) -> StoreResult<String> {
    serde_json::to_string(r).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_ref(s: &str) -> StoreResult<DataReference> {
    serde_json::from_str(s).map_err(|e| StoreError::Corrupt(format!("bad reference: {e}")))
}

fn parse_opt_ref(s: Option<String>) -> StoreResult<Option<DataReference>> {
    s.map(|v| parse_ref(&v)).transpose()
}

/// Fields for an invoice upsert.
#[derive(Debug, Clone)]
pub struct InvoiceUpsert<'a> {
    /// Owning package.
    pub package_id: &'a str,
    /// Invoice number (already defaulted to `page_<n>` when missing).
    pub invoice_number: &'a str,
    /// Lot number, when extracted.
    pub lot_number: Option<&'a str>,
    /// Invoice date, when extracted.
    pub invoice_date: Option<NaiveDate>,
    /// Resolved total, when extracted.
    pub total_amount: Option<Decimal>,
    /// Invoice artifact reference.
    pub invoice_ref: &'a DataReference,
}

impl Store {
    /// Insert the package row with status `STARTED`.
    ///
    /// Replays tolerate an existing row: the insert is a no-op when the id is
    /// already present, whatever state the row has advanced to.
    pub fn upsert_package_started(
        &self,
        package_id: &str,
        family: FeedlotFamily,
        document_refs: &[DataReference],
    ) -> StoreResult<()> {
        let now = now_text();
        let refs =
            serde_json::to_string(document_refs).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let inserted = self.conn().execute(
            "INSERT INTO packages
                 (package_id, feedlot_family, status, document_refs, created_at, updated_at)
             VALUES (?1, ?2, 'STARTED', ?3, ?4, ?4)
             ON CONFLICT(package_id) DO NOTHING",
            params![package_id, family.to_string(), refs, now],
        )?;
        debug!(target: "ap.store", package_id, inserted, "package started");
        Ok(())
    }

    /// Update a package's status, optionally recording the statement
    /// reference at the same time.
    pub fn update_package_status(
        &self,
        package_id: &str,
        status: PackageStatus,
        statement_ref: Option<&DataReference>,
    ) -> StoreResult<()> {
        let now = now_text();
        let changed = match statement_ref {
            Some(r) => self.conn().execute(
                "UPDATE packages SET status = ?2, statement_ref = ?3, updated_at = ?4
                 WHERE package_id = ?1",
                params![package_id, status.as_str(), ref_json(r)?, now],
            )?,
            None => self.conn().execute(
                "UPDATE packages SET status = ?2, updated_at = ?3 WHERE package_id = ?1",
                params![package_id, status.as_str(), now],
            )?,
        };
        if changed == 0 {
            return Err(StoreError::NotFound(format!("package {package_id}")));
        }
        debug!(target: "ap.store", package_id, status = %status, "package status updated");
        Ok(())
    }

    /// Record the number of invoice pages the split found. Set once.
    pub fn set_total_invoices(&self, package_id: &str, total: u32) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE packages SET total_invoices = ?2, updated_at = ?3 WHERE package_id = ?1",
            params![package_id, total, now_text()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("package {package_id}")));
        }
        Ok(())
    }

    /// Increment the extracted-invoice counter.
    pub fn increment_extracted_invoices(&self, package_id: &str) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE packages
             SET extracted_invoices = extracted_invoices + 1, updated_at = ?2
             WHERE package_id = ?1",
            params![package_id, now_text()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("package {package_id}")));
        }
        Ok(())
    }

    /// Set the extracted-invoice counter to an absolute value. Used when a
    /// replayed workflow recounts from persisted rows.
    pub fn set_extracted_invoices(&self, package_id: &str, extracted: u32) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE packages SET extracted_invoices = ?2, updated_at = ?3 WHERE package_id = ?1",
            params![package_id, extracted, now_text()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("package {package_id}")));
        }
        Ok(())
    }

    /// Read a package row.
    pub fn package(&self, package_id: &str) -> StoreResult<Option<PackageRow>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT package_id, feedlot_family, status, document_refs, statement_ref,
                        total_invoices, extracted_invoices, created_at, updated_at
                 FROM packages WHERE package_id = ?1",
                params![package_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, u32>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        row.map(
            |(id, family, status, refs, statement, total, extracted, created, updated)| {
                Ok(PackageRow {
                    package_id: id,
                    feedlot_family: FeedlotFamily::from_str(&family)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    status: PackageStatus::from_str(&status)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    document_refs: serde_json::from_str(&refs)
                        .map_err(|e| StoreError::Corrupt(format!("bad document_refs: {e}")))?,
                    statement_ref: parse_opt_ref(statement)?,
                    total_invoices: total,
                    extracted_invoices: extracted,
                    created_at: parse_timestamp(&created)?,
                    updated_at: parse_timestamp(&updated)?,
                })
            },
        )
        .transpose()
    }

    /// Upsert an invoice row keyed by `(package_id, invoice_number)`.
    ///
    /// A conflicting insert refreshes the extracted fields and `updated_at`
    /// and leaves `status`, `validation_ref`, and `created_at` alone.
    pub fn upsert_invoice(&self, invoice: &InvoiceUpsert<'_>) -> StoreResult<()> {
        let now = now_text();
        self.conn().execute(
            "INSERT INTO invoices
                 (package_id, invoice_number, lot_number, invoice_date, total_amount,
                  status, invoice_ref, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'EXTRACTED', ?6, ?7, ?7)
             ON CONFLICT(package_id, invoice_number) DO UPDATE SET
                 lot_number = excluded.lot_number,
                 invoice_date = excluded.invoice_date,
                 total_amount = excluded.total_amount,
                 invoice_ref = excluded.invoice_ref,
                 updated_at = excluded.updated_at",
            params![
                invoice.package_id,
                invoice.invoice_number,
                invoice.lot_number,
                invoice.invoice_date.map(|d| d.to_string()),
                invoice.total_amount.map(|a| a.to_string()),
                ref_json(invoice.invoice_ref)?,
                now,
            ],
        )?;
        debug!(
            target: "ap.store",
            package_id = invoice.package_id,
            invoice_number = invoice.invoice_number,
            "invoice upserted"
        );
        Ok(())
    }

    /// Update an invoice's status, optionally attaching the validation
    /// report reference.
    pub fn update_invoice_status(
        &self,
        package_id: &str,
        invoice_number: &str,
        status: InvoiceStatus,
        validation_ref: Option<&DataReference>,
    ) -> StoreResult<()> {
        let now = now_text();
        let changed = match validation_ref {
            Some(r) => self.conn().execute(
                "UPDATE invoices SET status = ?3, validation_ref = ?4, updated_at = ?5
                 WHERE package_id = ?1 AND invoice_number = ?2",
                params![package_id, invoice_number, status.as_str(), ref_json(r)?, now],
            )?,
            None => self.conn().execute(
                "UPDATE invoices SET status = ?3, updated_at = ?4
                 WHERE package_id = ?1 AND invoice_number = ?2",
                params![package_id, invoice_number, status.as_str(), now],
            )?,
        };
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "invoice {package_id}/{invoice_number}"
            )));
        }
        Ok(())
    }

    /// All invoice rows for a package, ordered by invoice number.
    pub fn invoices(&self, package_id: &str) -> StoreResult<Vec<InvoiceRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT package_id, invoice_number, lot_number, invoice_date, total_amount,
                    status, invoice_ref, validation_ref, created_at, updated_at
             FROM invoices WHERE package_id = ?1 ORDER BY invoice_number",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![package_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(
                |(pkg, num, lot, date, amount, status, inv_ref, val_ref, created, updated)| {
                    Ok(InvoiceRow {
                        package_id: pkg,
                        invoice_number: num,
                        lot_number: lot,
                        invoice_date: date
                            .map(|d| {
                                NaiveDate::from_str(&d).map_err(|e| {
                                    StoreError::Corrupt(format!("bad invoice_date '{d}': {e}"))
                                })
                            })
                            .transpose()?,
                        total_amount: amount
                            .map(|a| {
                                Decimal::from_str(&a).map_err(|e| {
                                    StoreError::Corrupt(format!("bad total_amount '{a}': {e}"))
                                })
                            })
                            .transpose()?,
                        status: InvoiceStatus::from_str(&status)
                            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                        invoice_ref: parse_ref(&inv_ref)?,
                        validation_ref: parse_opt_ref(val_ref)?,
                        created_at: parse_timestamp(&created)?,
                        updated_at: parse_timestamp(&updated)?,
                    })
                },
            )
            .collect()
    }

    /// Number of invoice rows persisted for a package.
    pub fn invoice_count(&self, package_id: &str) -> StoreResult<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM invoices WHERE package_id = ?1",
            params![package_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_ref(name: &str) -> DataReference {
        DataReference {
            storage_uri: format!("/artifacts/bovina/invoices/{name}.json"),
            content_hash: "cd".repeat(32),
            content_type: "application/json".into(),
            size_bytes: 128,
            stored_at: chrono::Utc::now(),
        }
    }

    fn store_with_package() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_package_started("pkg-1", FeedlotFamily::Bovina, &[])
            .unwrap();
        store
    }

    #[test]
    fn package_started_is_idempotent() {
        let store = store_with_package();
        store
            .update_package_status("pkg-1", PackageStatus::Extracting, None)
            .unwrap();
        // Replay of the start activity must not reset the row.
        store
            .upsert_package_started("pkg-1", FeedlotFamily::Bovina, &[])
            .unwrap();
        let row = store.package("pkg-1").unwrap().unwrap();
        assert_eq!(row.status, PackageStatus::Extracting);
    }

    #[test]
    fn status_update_on_missing_package_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .update_package_status("nope", PackageStatus::Failed, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn invoice_upsert_keeps_one_row_per_number() {
        let store = store_with_package();
        let r = sample_ref("13330");
        let upsert = InvoiceUpsert {
            package_id: "pkg-1",
            invoice_number: "13330",
            lot_number: Some("20-3883"),
            invoice_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            total_amount: Some(dec!(12345.67)),
            invoice_ref: &r,
        };
        store.upsert_invoice(&upsert).unwrap();
        store.upsert_invoice(&upsert).unwrap();
        assert_eq!(store.invoice_count("pkg-1").unwrap(), 1);
        let rows = store.invoices("pkg-1").unwrap();
        assert_eq!(rows[0].total_amount, Some(dec!(12345.67)));
        assert_eq!(rows[0].status, InvoiceStatus::Extracted);
    }

    #[test]
    fn invoice_upsert_preserves_status() {
        let store = store_with_package();
        let r = sample_ref("13330");
        let upsert = InvoiceUpsert {
            package_id: "pkg-1",
            invoice_number: "13330",
            lot_number: None,
            invoice_date: None,
            total_amount: None,
            invoice_ref: &r,
        };
        store.upsert_invoice(&upsert).unwrap();
        store
            .update_invoice_status("pkg-1", "13330", InvoiceStatus::ValidatedPass, None)
            .unwrap();
        // A replayed persist must not reset validation status.
        store.upsert_invoice(&upsert).unwrap();
        let rows = store.invoices("pkg-1").unwrap();
        assert_eq!(rows[0].status, InvoiceStatus::ValidatedPass);
    }

    #[test]
    fn extraction_counters() {
        let store = store_with_package();
        store.set_total_invoices("pkg-1", 5).unwrap();
        store.increment_extracted_invoices("pkg-1").unwrap();
        store.increment_extracted_invoices("pkg-1").unwrap();
        let row = store.package("pkg-1").unwrap().unwrap();
        assert_eq!(row.total_invoices, 5);
        assert_eq!(row.extracted_invoices, 2);
        store.set_extracted_invoices("pkg-1", 5).unwrap();
        assert_eq!(store.package("pkg-1").unwrap().unwrap().extracted_invoices, 5);
    }

    #[test]
    fn statement_ref_round_trips() {
        let store = store_with_package();
        let r = sample_ref("statement");
        store
            .update_package_status("pkg-1", PackageStatus::Extracted, Some(&r))
            .unwrap();
        let row = store.package("pkg-1").unwrap().unwrap();
        assert_eq!(row.statement_ref, Some(r));
    }
}
