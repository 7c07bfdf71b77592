// SPDX-License-Identifier: MIT OR Apache-2.0
//! Package reconciliation activity.

use super::derived_event_id;
use crate::engine::ActivityDeps;
use apc_core::audit::{AuditEventBuilder, AuditKind, AuditSeverity};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_core::progress::ProgressStep;
use apc_core::report::ReconciliationStatus;
use apc_core::{DataReference, FeedlotFamily};
use apc_error::ApResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Compact reconciliation result carried through workflow history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutput {
    /// Overall verdict.
    pub status: ReconciliationStatus,
    /// Checks that passed.
    pub passed_checks: u32,
    /// Checks emitted.
    pub total_checks: u32,
    /// Failed BLOCK checks.
    pub blocking_issues: u32,
    /// Failed WARN checks.
    pub warnings: u32,
    /// Stored full report.
    pub report_ref: DataReference,
}

/// Load the statement and invoices behind their references, run the pure
/// engine, and persist the report. Deterministic given the artifacts, so
/// retries and replays are free.
pub async fn reconcile_package(
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    statement_ref: &DataReference,
    invoice_refs: &[DataReference],
) -> ApResult<ReconcileOutput> {
    let statement: StatementDocument = deps.artifacts.get_json(statement_ref, true)?;
    let mut invoices = Vec::with_capacity(invoice_refs.len());
    for invoice_ref in invoice_refs {
        invoices.push(deps.artifacts.get_json::<InvoiceDocument>(invoice_ref, true)?);
    }

    let report = apc_reconcile::reconcile(&statement, &invoices, family);
    let relative = format!("{}/reconciliation.json", family.artifact_key());
    let report_ref = deps.artifacts.put_json(&report, &relative)?;

    let message = format!(
        "Reconciliation {}: {}/{} checks passed, {} blocking, {} warnings",
        report.status,
        report.summary.passed_checks,
        report.summary.total_checks,
        report.summary.blocking_issues,
        report.summary.warnings,
    );
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::Reconcile, &message)?;

    let severity = match report.status {
        ReconciliationStatus::Pass => AuditSeverity::Info,
        ReconciliationStatus::Warn => AuditSeverity::Warn,
        ReconciliationStatus::Fail => AuditSeverity::Error,
    };
    let event = AuditEventBuilder::new(AuditKind::Reconciliation, message)
        .package_id(package_id)
        .workflow_id(package_id)
        .activity_name("reconcile_package")
        .severity(severity)
        .detail("status", serde_json::json!(report.status))
        .detail(
            "statement_total_source",
            serde_json::json!(report.statement_total_source),
        )
        .artifact(report_ref.clone())
        .build(
            derived_event_id(package_id, "reconcile_package", "report"),
            Utc::now(),
        );
    deps.store.append_audit(&event)?;

    Ok(ReconcileOutput {
        status: report.status,
        passed_checks: report.summary.passed_checks,
        total_checks: report.summary.total_checks,
        blocking_issues: report.summary.blocking_issues,
        warnings: report.summary.warnings,
        report_ref,
    })
}
