// SPDX-License-Identifier: MIT OR Apache-2.0
//! The package workflow.
//!
//! Sequences split -> statement extraction -> per-invoice
//! extract/persist/validate -> reconciliation -> final status, entirely
//! through journaled activities. The function body is deterministic: every
//! branch depends only on the input and recorded activity results, and only
//! references travel through history.

use crate::activities::{persist, reconcile, validate};
use crate::engine::{ActivityDeps, WorkflowContext};
use crate::extract;
use crate::retry::RetryPolicy;
use crate::WorkflowError;
use apc_core::report::ReconciliationStatus;
use apc_core::{DataReference, FeedlotFamily, PackageStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input to the package workflow. The workflow id is the package id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageWorkflowInput {
    /// Stable package id.
    pub package_id: String,
    /// Feedlot family the PDF belongs to.
    pub feedlot_family: FeedlotFamily,
    /// Absolute path to the source PDF.
    pub pdf_path: String,
    /// Source document references supplied at submission.
    #[serde(default)]
    pub document_refs: Vec<DataReference>,
    /// Reuse existing artifacts when they parse. Makes re-runs after a
    /// crash cheap.
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

/// Compact reconciliation verdict carried in the workflow summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
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

/// Result of a package workflow run. Counts and references only, no
/// document bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageWorkflowSummary {
    /// Package processed.
    pub package_id: String,
    /// Family processed.
    pub feedlot_family: FeedlotFamily,
    /// Terminal package status.
    pub status: PackageStatus,
    /// Whether a statement was extracted.
    pub statement_extracted: bool,
    /// Statement artifact, when extracted.
    pub statement_ref: Option<DataReference>,
    /// Invoices extracted.
    pub invoices_extracted: u32,
    /// Invoices that passed validation.
    pub invoices_validated_pass: u32,
    /// Invoices that failed validation.
    pub invoices_validated_fail: u32,
    /// Effective invoice numbers, in extraction order.
    pub invoice_numbers: Vec<String>,
    /// Invoice artifacts, in extraction order.
    pub invoice_refs: Vec<DataReference>,
    /// Reconciliation verdict, when reconciliation ran.
    pub reconciliation: Option<ReconciliationSummary>,
}

/// Run the package workflow to completion.
pub async fn run_package(
    ctx: &WorkflowContext,
    deps: &ActivityDeps,
    input: &PackageWorkflowInput,
) -> Result<PackageWorkflowSummary, WorkflowError> {
    let package_id = input.package_id.clone();
    let family = input.feedlot_family;
    info!(target: "ap.workflow", package_id = %package_id, %family, "starting package workflow");

    // Step 1: package row, STARTED.
    ctx.execute("persist_package_started", &RetryPolicy::db_write(), |actx| {
        let deps = deps.clone();
        let input = input.clone();
        async move {
            persist::persist_package_started(
                &actx,
                &deps,
                &input.package_id,
                input.feedlot_family,
                &input.document_refs,
            )
            .await
        }
    })
    .await?;

    ctx.execute("update_package_extracting", &RetryPolicy::db_write(), |_actx| {
        let deps = deps.clone();
        let package_id = package_id.clone();
        async move {
            persist::update_package_status(&deps, &package_id, PackageStatus::Extracting, None)
                .await
        }
    })
    .await?;

    // Step 2: categorize pages.
    let split = ctx
        .execute("split_pdf", &RetryPolicy::split_pdf(), |actx| {
            let deps = deps.clone();
            let input = input.clone();
            async move {
                extract::split_pdf(
                    &actx,
                    &deps,
                    &input.package_id,
                    input.feedlot_family,
                    &input.pdf_path,
                )
                .await
            }
        })
        .await?;

    // Step 3: statement, when present.
    let statement = if split.statement_pages.is_empty() {
        None
    } else {
        let output = ctx
            .execute("extract_statement", &RetryPolicy::extraction(), |actx| {
                let deps = deps.clone();
                let input = input.clone();
                let pages = split.statement_pages.clone();
                async move {
                    extract::extract_statement(
                        &actx,
                        &deps,
                        &input.package_id,
                        input.feedlot_family,
                        &input.pdf_path,
                        &pages,
                        input.use_cache,
                    )
                    .await
                }
            })
            .await?;
        info!(
            target: "ap.workflow",
            package_id = %package_id,
            feedlot = output.feedlot_name.as_deref().unwrap_or("unknown"),
            owner = output.owner_name.as_deref().unwrap_or("unknown"),
            "statement extracted"
        );
        Some(output)
    };
    let statement_ref = statement.as_ref().map(|s| s.statement_ref.clone());

    // Steps 4-5: extract, persist, and validate each invoice, in page order.
    let total_invoices = split.invoice_pages.len();
    let mut invoice_numbers = Vec::with_capacity(total_invoices);
    let mut invoice_refs = Vec::with_capacity(total_invoices);
    let mut validated_pass = 0u32;
    let mut validated_fail = 0u32;

    for (i, page_index) in split.invoice_pages.iter().copied().enumerate() {
        let invoice_index = i + 1;
        let extracted = ctx
            .execute(
                &format!("extract_invoice_{invoice_index}"),
                &RetryPolicy::extraction(),
                |actx| {
                    let deps = deps.clone();
                    let input = input.clone();
                    async move {
                        extract::extract_invoice(
                            &actx,
                            &deps,
                            &input.package_id,
                            input.feedlot_family,
                            &input.pdf_path,
                            page_index,
                            invoice_index,
                            total_invoices,
                            input.use_cache,
                        )
                        .await
                    }
                },
            )
            .await?;

        let effective_number = extracted
            .invoice_number
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("page_{}", page_index + 1));

        ctx.execute(
            &format!("persist_invoice_{invoice_index}"),
            &RetryPolicy::db_write(),
            |_actx| {
                let deps = deps.clone();
                let persist_input = persist::PersistInvoiceInput {
                    package_id: package_id.clone(),
                    invoice_number: effective_number.clone(),
                    lot_number: extracted.lot_number.clone(),
                    invoice_date: extracted.invoice_date,
                    total_amount: extracted.total_amount,
                    invoice_ref: extracted.invoice_ref.clone(),
                };
                async move { persist::persist_invoice(&deps, &persist_input).await }
            },
        )
        .await?;

        let validation = ctx
            .execute(
                &format!("validate_invoice_{invoice_index}"),
                &RetryPolicy::validation(),
                |_actx| {
                    let deps = deps.clone();
                    let package_id = package_id.clone();
                    let effective_number = effective_number.clone();
                    let invoice_ref = extracted.invoice_ref.clone();
                    async move {
                        validate::validate_invoice(
                            &deps,
                            &package_id,
                            family,
                            &effective_number,
                            &invoice_ref,
                        )
                        .await
                    }
                },
            )
            .await?;

        ctx.execute(
            &format!("update_invoice_status_{invoice_index}"),
            &RetryPolicy::db_write(),
            |_actx| {
                let deps = deps.clone();
                let package_id = package_id.clone();
                let effective_number = effective_number.clone();
                let validation = validation.clone();
                async move {
                    persist::update_invoice_status(
                        &deps,
                        &package_id,
                        &effective_number,
                        validation.status,
                        Some(&validation.validation_ref),
                    )
                    .await
                }
            },
        )
        .await?;

        if validation.passed {
            validated_pass += 1;
        } else {
            validated_fail += 1;
        }
        invoice_numbers.push(effective_number);
        invoice_refs.push(extracted.invoice_ref);
    }

    ctx.execute("update_package_extracted", &RetryPolicy::db_write(), |_actx| {
        let deps = deps.clone();
        let package_id = package_id.clone();
        let statement_ref = statement_ref.clone();
        async move {
            persist::update_package_status(
                &deps,
                &package_id,
                PackageStatus::Extracted,
                statement_ref.as_ref(),
            )
            .await
        }
    })
    .await?;

    // Step 6: reconcile when both sides are present.
    let reconciliation = match (&statement_ref, invoice_refs.is_empty()) {
        (Some(statement_ref), false) => {
            ctx.execute("update_package_reconciling", &RetryPolicy::db_write(), |_actx| {
                let deps = deps.clone();
                let package_id = package_id.clone();
                async move {
                    persist::update_package_status(
                        &deps,
                        &package_id,
                        PackageStatus::Reconciling,
                        None,
                    )
                    .await
                }
            })
            .await?;

            let output = ctx
                .execute("reconcile_package", &RetryPolicy::reconciliation(), |_actx| {
                    let deps = deps.clone();
                    let package_id = package_id.clone();
                    let statement_ref = statement_ref.clone();
                    let invoice_refs = invoice_refs.clone();
                    async move {
                        reconcile::reconcile_package(
                            &deps,
                            &package_id,
                            family,
                            &statement_ref,
                            &invoice_refs,
                        )
                        .await
                    }
                })
                .await?;
            Some(ReconciliationSummary {
                status: output.status,
                passed_checks: output.passed_checks,
                total_checks: output.total_checks,
                blocking_issues: output.blocking_issues,
                warnings: output.warnings,
                report_ref: output.report_ref,
            })
        }
        _ => None,
    };

    // Step 7: final status.
    let final_status = match &reconciliation {
        Some(summary) => match summary.status {
            ReconciliationStatus::Pass => PackageStatus::ReconciledPass,
            ReconciliationStatus::Warn => PackageStatus::ReconciledWarn,
            ReconciliationStatus::Fail => PackageStatus::ReconciledFail,
        },
        None => PackageStatus::Extracted,
    };
    if final_status != PackageStatus::Extracted {
        ctx.execute("update_package_final", &RetryPolicy::db_write(), |_actx| {
            let deps = deps.clone();
            let package_id = package_id.clone();
            let statement_ref = statement_ref.clone();
            async move {
                persist::update_package_status(
                    &deps,
                    &package_id,
                    final_status,
                    statement_ref.as_ref(),
                )
                .await
            }
        })
        .await?;
    }

    info!(
        target: "ap.workflow",
        package_id = %package_id,
        status = %final_status,
        invoices = invoice_numbers.len(),
        validated_pass,
        validated_fail,
        "package workflow complete"
    );

    Ok(PackageWorkflowSummary {
        package_id,
        feedlot_family: family,
        status: final_status,
        statement_extracted: statement.is_some(),
        statement_ref,
        invoices_extracted: invoice_numbers.len() as u32,
        invoices_validated_pass: validated_pass,
        invoices_validated_fail: validated_fail,
        invoice_numbers,
        invoice_refs,
        reconciliation,
    })
}
