// SPDX-License-Identifier: MIT OR Apache-2.0
//! The purchase-invoice payload envelope.
//!
//! Amounts travel as decimal strings with explicit two-digit scale. The
//! `idempotency_key` is echoed unchanged by ERP adapters.

use apc_coding::InvoiceCoding;
use apc_core::document::InvoiceDocument;
use apc_error::{ApError, ApResult};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header block of a purchase-invoice payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PayloadHeader {
    /// Vendor code in the ERP.
    pub vendor_code: String,
    /// External document number (the invoice number).
    pub external_document_no: String,
    /// Document date, ISO `YYYY-MM-DD`.
    pub document_date: String,
    /// Due date, when known.
    pub due_date: Option<String>,
    /// Posting date override, when supplied.
    pub posting_date: Option<String>,
    /// Currency code, when not the entity default.
    pub currency_code: Option<String>,
    /// Total amount as a decimal string, scale 2.
    pub total_amount: String,
}

/// One payload line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PayloadLine {
    /// Line description.
    pub description: String,
    /// Quantity as a decimal string, scale 2. Defaults to `1.00`.
    pub quantity: String,
    /// Unit price as a decimal string, scale 2.
    pub unit_price: String,
    /// GL account the line posts to.
    pub gl_account_code: String,
    /// Dimension code -> value.
    pub dimensions: BTreeMap<String, String>,
}

/// The full envelope handed to ERP adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurchaseInvoicePayload {
    /// Header block.
    pub header: PayloadHeader,
    /// Ordered lines.
    pub lines: Vec<PayloadLine>,
    /// Caller-supplied idempotency key, echoed unchanged.
    pub idempotency_key: String,
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// Build the payload for a coded invoice.
///
/// The header total comes from the invoice's resolved total; each line takes
/// its amount as `quantity 1 x unit_price` unless the line carried an
/// explicit quantity and rate.
pub fn build_payload(
    invoice: &InvoiceDocument,
    coding: &InvoiceCoding,
    vendor_code: &str,
    idempotency_key: &str,
) -> ApResult<PurchaseInvoicePayload> {
    let document_date = invoice
        .invoice_date
        .ok_or_else(|| ApError::validation("cannot build payload without an invoice date"))?;
    let total = invoice
        .resolved_total()
        .ok_or_else(|| ApError::validation("cannot build payload without a resolvable total"))?;

    let mut lines = Vec::with_capacity(coding.line_codings.len());
    for line_coding in &coding.line_codings {
        let item = invoice
            .line_items
            .get(line_coding.line_index)
            .ok_or_else(|| {
                ApError::internal(format!(
                    "line coding index {} out of bounds",
                    line_coding.line_index
                ))
            })?;
        let (quantity, unit_price) = match (item.quantity, item.rate) {
            (Some(quantity), Some(rate)) if quantity != Decimal::ZERO => (quantity, rate),
            _ => (Decimal::ONE, item.total.unwrap_or(Decimal::ZERO)),
        };
        let dimensions = line_coding
            .dimensions
            .iter()
            .map(|d| (d.code.clone(), d.value.clone()))
            .collect();
        lines.push(PayloadLine {
            description: item.description.clone(),
            quantity: money(quantity),
            unit_price: money(unit_price),
            gl_account_code: line_coding.gl_ref.clone(),
            dimensions,
        });
    }

    Ok(PurchaseInvoicePayload {
        header: PayloadHeader {
            vendor_code: vendor_code.to_string(),
            external_document_no: coding.invoice_number.clone(),
            document_date: document_date.to_string(),
            due_date: None,
            posting_date: None,
            currency_code: None,
            total_amount: money(total),
        },
        lines,
        idempotency_key: idempotency_key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use apc_coding::{LineCategory, LineCoding};
    use apc_core::catalog::MappingLevel;
    use apc_core::document::{InvoiceTotals, LineItem};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn coded_invoice() -> (InvoiceDocument, InvoiceCoding) {
        let invoice = InvoiceDocument {
            invoice_number: Some("13330".into()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 6, 15),
            line_items: vec![
                LineItem {
                    description: "FEED CHARGES".into(),
                    quantity: Some(dec!(100)),
                    rate: Some(dec!(120.00)),
                    total: Some(dec!(12000.00)),
                },
                LineItem {
                    description: "Yardage".into(),
                    quantity: None,
                    rate: None,
                    total: Some(dec!(345.67)),
                },
            ],
            totals: InvoiceTotals {
                total_amount_due: Some(dec!(12345.67)),
                total_period_charges: None,
            },
            ..InvoiceDocument::default()
        };
        let coding = InvoiceCoding {
            invoice_number: "13330".into(),
            entity_id: "BF2".into(),
            vendor_id: Some("V-BF2".into()),
            line_codings: vec![
                LineCoding {
                    line_index: 0,
                    description: "FEED CHARGES".into(),
                    amount: Some(dec!(12000.00)),
                    category: LineCategory::Feed,
                    gl_ref: "5000".into(),
                    mapping_level: MappingLevel::Entity,
                    dimensions: vec![apc_coding::DimensionValue {
                        code: "LOT".into(),
                        value: "20-3883".into(),
                        source: "invoice.lot.lot_number".into(),
                    }],
                    missing_dimensions: Vec::new(),
                    complete: true,
                },
                LineCoding {
                    line_index: 1,
                    description: "Yardage".into(),
                    amount: Some(dec!(345.67)),
                    category: LineCategory::Yardage,
                    gl_ref: "5100".into(),
                    mapping_level: MappingLevel::Global,
                    dimensions: Vec::new(),
                    missing_dimensions: Vec::new(),
                    complete: true,
                },
            ],
            missing_mappings: Vec::new(),
            missing_dimensions: Vec::new(),
            warnings: Vec::new(),
            complete: true,
        };
        (invoice, coding)
    }

    #[test]
    fn payload_carries_scaled_decimal_strings() {
        let (invoice, coding) = coded_invoice();
        let payload = build_payload(&invoice, &coding, "V00001", "pkg-1:13330").unwrap();
        assert_eq!(payload.header.total_amount, "12345.67");
        assert_eq!(payload.header.external_document_no, "13330");
        assert_eq!(payload.lines[0].quantity, "100.00");
        assert_eq!(payload.lines[0].unit_price, "120.00");
        // Lines without explicit quantity/rate post as 1 x amount.
        assert_eq!(payload.lines[1].quantity, "1.00");
        assert_eq!(payload.lines[1].unit_price, "345.67");
        assert_eq!(payload.lines[0].dimensions["LOT"], "20-3883");
    }

    #[test]
    fn idempotency_key_is_echoed_unchanged() {
        let (invoice, coding) = coded_invoice();
        let payload = build_payload(&invoice, &coding, "V00001", "pkg-1:13330").unwrap();
        assert_eq!(payload.idempotency_key, "pkg-1:13330");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["idempotency_key"], "pkg-1:13330");
    }

    #[test]
    fn missing_date_or_total_is_a_validation_error() {
        let (mut invoice, coding) = coded_invoice();
        invoice.invoice_date = None;
        let err = build_payload(&invoice, &coding, "V00001", "k").unwrap_err();
        assert!(matches!(err, ApError::Validation { .. }));

        let (mut invoice, coding) = coded_invoice();
        invoice.totals = InvoiceTotals::default();
        invoice.line_items.iter_mut().for_each(|l| l.total = None);
        let err = build_payload(&invoice, &coding, "V00001", "k").unwrap_err();
        assert!(matches!(err, ApError::Validation { .. }));
    }
}
