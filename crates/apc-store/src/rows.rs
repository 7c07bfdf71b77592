// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed row structs returned by readback queries.

use apc_core::{DataReference, FeedlotFamily, InvoiceStatus, PackageStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// A row in `packages`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRow {
    /// Stable package id; doubles as the owning workflow id.
    pub package_id: String,
    /// Feedlot family the package belongs to.
    pub feedlot_family: FeedlotFamily,
    /// Current state-machine position.
    pub status: PackageStatus,
    /// Source document references supplied at submission.
    pub document_refs: Vec<DataReference>,
    /// Statement artifact, once extracted.
    pub statement_ref: Option<DataReference>,
    /// Number of invoice pages found by the split.
    pub total_invoices: u32,
    /// Number of invoices extracted so far.
    pub extracted_invoices: u32,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// A row in `invoices`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRow {
    /// Owning package.
    pub package_id: String,
    /// Invoice number (unique within the package).
    pub invoice_number: String,
    /// Lot the invoice bills, when extracted.
    pub lot_number: Option<String>,
    /// Invoice date, when extracted.
    pub invoice_date: Option<NaiveDate>,
    /// Resolved total, when extracted.
    pub total_amount: Option<Decimal>,
    /// Current invoice status.
    pub status: InvoiceStatus,
    /// Invoice artifact reference. Always present after extraction.
    pub invoice_ref: DataReference,
    /// Validation report artifact, once validated.
    pub validation_ref: Option<DataReference>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}
