// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-invoice validation activity.

use super::derived_event_id;
use crate::engine::ActivityDeps;
use apc_core::audit::{AuditEventBuilder, AuditKind, AuditSeverity};
use apc_core::document::InvoiceDocument;
use apc_core::progress::ProgressStep;
use apc_core::{DataReference, FeedlotFamily, InvoiceStatus, safe_invoice_number};
use apc_error::ApResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Output of the `validate_invoice` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateInvoiceOutput {
    /// Whether the blocking checks passed.
    pub passed: bool,
    /// Status the invoice row should move to.
    pub status: InvoiceStatus,
    /// Stored validation report.
    pub validation_ref: DataReference,
}

/// Run the B-checks against a stored invoice and persist the report.
pub async fn validate_invoice(
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    invoice_number: &str,
    invoice_ref: &DataReference,
) -> ApResult<ValidateInvoiceOutput> {
    let invoice: InvoiceDocument = deps.artifacts.get_json(invoice_ref, true)?;
    let validation = apc_reconcile::validate_invoice(&invoice, invoice_number);

    let safe = safe_invoice_number(invoice_number);
    let relative = format!("{}/validations/{safe}.json", family.artifact_key());
    let validation_ref = deps.artifacts.put_json(&validation, &relative)?;

    let status = if validation.passed {
        InvoiceStatus::ValidatedPass
    } else {
        InvoiceStatus::ValidatedFail
    };
    let message = format!("Invoice {invoice_number} validation: {status}");
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::Validate, &message)?;

    let event = AuditEventBuilder::new(AuditKind::Validation, message)
        .package_id(package_id)
        .invoice_number(invoice_number)
        .workflow_id(package_id)
        .activity_name("validate_invoice")
        .severity(if validation.passed {
            AuditSeverity::Info
        } else {
            AuditSeverity::Warn
        })
        .detail(
            "failed_checks",
            serde_json::json!(
                validation
                    .checks
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| c.check_id.clone())
                    .collect::<Vec<_>>()
            ),
        )
        .artifact(validation_ref.clone())
        .build(
            derived_event_id(package_id, "validate_invoice", invoice_number),
            Utc::now(),
        );
    deps.store.append_audit(&event)?;

    Ok(ValidateInvoiceOutput {
        passed: validation.passed,
        status,
        validation_ref,
    })
}
