// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence activities.

use super::derived_event_id;
use crate::engine::{ActivityContext, ActivityDeps};
use apc_core::audit::{AuditEvent, AuditEventBuilder, AuditKind, AuditSeverity};
use apc_core::{DataReference, FeedlotFamily, InvoiceStatus, PackageStatus};
use apc_error::ApResult;
use apc_store::InvoiceUpsert;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for [`persist_invoice`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistInvoiceInput {
    /// Owning package.
    pub package_id: String,
    /// Effective invoice number.
    pub invoice_number: String,
    /// Lot number, when extracted.
    pub lot_number: Option<String>,
    /// Invoice date, when extracted.
    pub invoice_date: Option<NaiveDate>,
    /// Resolved total, when extracted.
    pub total_amount: Option<Decimal>,
    /// Invoice artifact.
    pub invoice_ref: DataReference,
}

/// Create the package row with status `STARTED`. A replay against an
/// existing row is a no-op.
pub async fn persist_package_started(
    actx: &ActivityContext,
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    document_refs: &[DataReference],
) -> ApResult<()> {
    actx.check_cancelled()?;
    deps.store
        .upsert_package_started(package_id, family, document_refs)?;
    info!(target: "ap.workflow", package_id, %family, "package persisted with status STARTED");
    let event = AuditEventBuilder::new(AuditKind::Workflow, "package workflow started")
        .package_id(package_id)
        .workflow_id(package_id)
        .activity_name("persist_package_started")
        .detail("feedlot_family", serde_json::json!(family.to_string()))
        .build(
            derived_event_id(package_id, "persist_package_started", "started"),
            Utc::now(),
        );
    deps.store.append_audit(&event)?;
    Ok(())
}

/// Update the package's status, optionally attaching the statement
/// reference.
pub async fn update_package_status(
    deps: &ActivityDeps,
    package_id: &str,
    status: PackageStatus,
    statement_ref: Option<&DataReference>,
) -> ApResult<()> {
    deps.store
        .update_package_status(package_id, status, statement_ref)?;
    let event = AuditEventBuilder::new(
        AuditKind::Workflow,
        format!("package status updated to {status}"),
    )
    .package_id(package_id)
    .workflow_id(package_id)
    .activity_name("update_package_status")
    .severity(match status {
        PackageStatus::Failed | PackageStatus::ReconciledFail => AuditSeverity::Error,
        PackageStatus::ReconciledWarn | PackageStatus::Cancelled => AuditSeverity::Warn,
        _ => AuditSeverity::Info,
    })
    .build(
        derived_event_id(package_id, "update_package_status", status.as_str()),
        Utc::now(),
    );
    deps.store.append_audit(&event)?;
    Ok(())
}

/// Upsert an invoice row. Keyed on `(package_id, invoice_number)`, so
/// replays and retries collapse to one row.
pub async fn persist_invoice(deps: &ActivityDeps, input: &PersistInvoiceInput) -> ApResult<()> {
    deps.store.upsert_invoice(&InvoiceUpsert {
        package_id: &input.package_id,
        invoice_number: &input.invoice_number,
        lot_number: input.lot_number.as_deref(),
        invoice_date: input.invoice_date,
        total_amount: input.total_amount,
        invoice_ref: &input.invoice_ref,
    })?;
    let event = AuditEventBuilder::new(
        AuditKind::Extraction,
        format!("invoice {} persisted", input.invoice_number),
    )
    .package_id(&input.package_id)
    .invoice_number(&input.invoice_number)
    .workflow_id(&input.package_id)
    .activity_name("persist_invoice")
    .artifact(input.invoice_ref.clone())
    .build(
        derived_event_id(&input.package_id, "persist_invoice", &input.invoice_number),
        Utc::now(),
    );
    deps.store.append_audit(&event)?;
    Ok(())
}

/// Update an invoice's status after validation (or mapping/posting).
pub async fn update_invoice_status(
    deps: &ActivityDeps,
    package_id: &str,
    invoice_number: &str,
    status: InvoiceStatus,
    validation_ref: Option<&DataReference>,
) -> ApResult<()> {
    deps.store
        .update_invoice_status(package_id, invoice_number, status, validation_ref)?;
    let event = AuditEventBuilder::new(
        AuditKind::Validation,
        format!("invoice {invoice_number} status updated to {status}"),
    )
    .package_id(package_id)
    .invoice_number(invoice_number)
    .workflow_id(package_id)
    .activity_name("update_invoice_status")
    .severity(if status == InvoiceStatus::ValidatedFail {
        AuditSeverity::Warn
    } else {
        AuditSeverity::Info
    })
    .build(
        derived_event_id(
            package_id,
            "update_invoice_status",
            &format!("{invoice_number}:{status}"),
        ),
        Utc::now(),
    );
    deps.store.append_audit(&event)?;
    Ok(())
}

/// Append a pre-built audit event. Duplicate ids from replay are tolerated.
pub async fn persist_audit_event(deps: &ActivityDeps, event: &AuditEvent) -> ApResult<()> {
    deps.store.append_audit(event)?;
    Ok(())
}
