// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical extracted documents.
//!
//! Extractor output is validated into these shapes at the activity boundary;
//! downstream code never sees raw extractor JSON. Amounts are fixed-point
//! decimals serialized as strings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Feedlot block shared by statements and invoices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeedlotInfo {
    /// Feedlot display name as printed on the document.
    pub name: Option<String>,
    /// Two-letter state code, when printed.
    pub state: Option<String>,
}

/// Owner / remit-to block shared by statements and invoices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OwnerInfo {
    /// Owner display name.
    pub name: Option<String>,
    /// Owner account number as printed (kept as a string; leading zeros
    /// matter for routing keys).
    pub owner_number: Option<String>,
    /// Remit-to state code.
    pub state: Option<String>,
}

/// Lot block on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LotInfo {
    /// Lot number, e.g. `20-3883`.
    pub lot_number: Option<String>,
    /// Head count on the lot, when printed.
    pub head_count: Option<u32>,
}

/// One per-invoice reference row on a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LotReference {
    /// Invoice number the statement claims.
    pub invoice_number: String,
    /// Lot the invoice bills.
    pub lot_number: Option<String>,
    /// The authoritative per-invoice amount claimed by the statement.
    pub statement_charge: Option<Decimal>,
    /// Free-text description.
    pub description: Option<String>,
}

/// A transaction row on a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatementTransaction {
    /// Transaction date, when printed.
    pub date: Option<NaiveDate>,
    /// Description text.
    pub description: Option<String>,
    /// Amount, when printed.
    pub amount: Option<Decimal>,
}

/// A summary row at the bottom of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryRow {
    /// Row label, e.g. `Total Due`.
    pub label: String,
    /// Row amount.
    pub amount: Option<Decimal>,
}

/// Extracted statement document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatementDocument {
    /// Feedlot block.
    pub feedlot: FeedlotInfo,
    /// Owner block.
    pub owner: OwnerInfo,
    /// Statement period start.
    pub period_start: Option<NaiveDate>,
    /// Statement period end.
    pub period_end: Option<NaiveDate>,
    /// Per-invoice references. Drives A1/A2/A5/A7.
    #[serde(default)]
    pub lot_references: Vec<LotReference>,
    /// Transaction rows.
    #[serde(default)]
    pub transactions: Vec<StatementTransaction>,
    /// Summary rows (grand totals and the like).
    #[serde(default)]
    pub summary_rows: Vec<SummaryRow>,
}

/// One billed line on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// Line description (drives categorization).
    pub description: String,
    /// Quantity, when printed.
    pub quantity: Option<Decimal>,
    /// Unit rate, when printed.
    pub rate: Option<Decimal>,
    /// Line total, when printed.
    pub total: Option<Decimal>,
}

/// Totals block on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvoiceTotals {
    /// Total amount due, the preferred total.
    pub total_amount_due: Option<Decimal>,
    /// Total period charges, the first fallback.
    pub total_period_charges: Option<Decimal>,
}

/// Extracted invoice document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvoiceDocument {
    /// Invoice number as printed. Missing numbers fall back to
    /// `page_<index+1>` when persisted.
    pub invoice_number: Option<String>,
    /// Invoice date.
    pub invoice_date: Option<NaiveDate>,
    /// Feedlot block.
    pub feedlot: FeedlotInfo,
    /// Owner block.
    pub owner: OwnerInfo,
    /// Lot block.
    pub lot: LotInfo,
    /// Billed lines, in print order.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Totals block.
    #[serde(default)]
    pub totals: InvoiceTotals,
    /// Zero-based source page index, recorded at extraction time so cached
    /// artifacts can be matched back to their page.
    pub page_index: Option<usize>,
}

impl InvoiceDocument {
    /// Resolve the invoice total with the fixed precedence:
    /// `totals.total_amount_due`, then `totals.total_period_charges`, then
    /// the sum of line totals (only when at least one line carries one).
    #[must_use]
    pub fn resolved_total(&self) -> Option<Decimal> {
        if let Some(due) = self.totals.total_amount_due {
            return Some(due);
        }
        if let Some(charges) = self.totals.total_period_charges {
            return Some(charges);
        }
        let mut any = false;
        let mut sum = Decimal::ZERO;
        for line in &self.line_items {
            if let Some(total) = line.total {
                any = true;
                sum += total;
            }
        }
        any.then_some(sum)
    }

    /// Sum of line totals, when at least one line carries one.
    #[must_use]
    pub fn line_sum(&self) -> Option<Decimal> {
        let mut any = false;
        let mut sum = Decimal::ZERO;
        for line in &self.line_items {
            if let Some(total) = line.total {
                any = true;
                sum += total;
            }
        }
        any.then_some(sum)
    }
}
