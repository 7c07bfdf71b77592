// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-invoice validation (the B-checks), used by the workflow's
//! `validate_invoice` activity.

use crate::amounts_match;
use apc_core::document::InvoiceDocument;
use apc_core::report::{CheckResult, CheckSeverity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Validation result for one invoice, persisted as an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceValidation {
    /// Effective invoice number.
    pub invoice_number: String,
    /// True when no BLOCK check failed.
    pub passed: bool,
    /// B1/B2 results in emission order.
    pub checks: Vec<CheckResult>,
}

/// Names of required fields the invoice is missing, in stable order.
#[must_use]
pub fn missing_required_fields(invoice: &InvoiceDocument) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if invoice
        .invoice_number
        .as_deref()
        .is_none_or(|n| n.trim().is_empty())
    {
        missing.push("invoice_number");
    }
    if invoice.invoice_date.is_none() {
        missing.push("invoice_date");
    }
    if invoice.line_items.is_empty() {
        missing.push("line_items");
    }
    if invoice.resolved_total().is_none() {
        missing.push("invoice_total");
    }
    missing
}

/// Run the per-invoice checks (B1 required fields, B2 line sum).
#[must_use]
pub fn validate_invoice(invoice: &InvoiceDocument, effective_number: &str) -> InvoiceValidation {
    let missing = missing_required_fields(invoice);
    let b1 = CheckResult {
        check_id: "B1".into(),
        severity: CheckSeverity::Block,
        passed: missing.is_empty(),
        message: if missing.is_empty() {
            "all required fields present".into()
        } else {
            format!("missing required fields: {}", missing.join(", "))
        },
        evidence: BTreeMap::from([("missing".to_string(), json!(missing))]),
    };

    let line_sum = invoice.line_sum();
    let total = invoice.resolved_total();
    let b2_passed = amounts_match(line_sum, total);
    let b2 = CheckResult {
        check_id: "B2".into(),
        severity: CheckSeverity::Warn,
        passed: b2_passed,
        message: if b2_passed {
            "line sum matches invoice total".into()
        } else {
            "line sum does not match invoice total".into()
        },
        evidence: BTreeMap::from([
            ("line_sum".to_string(), json!(line_sum.map(|a| a.to_string()))),
            (
                "invoice_total".to_string(),
                json!(total.map(|a| a.to_string())),
            ),
        ]),
    };

    let passed = b1.passed;
    InvoiceValidation {
        invoice_number: effective_number.to_string(),
        passed,
        checks: vec![b1, b2],
    }
}
