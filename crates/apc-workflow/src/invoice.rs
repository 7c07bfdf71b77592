// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-invoice child workflow.
//!
//! Stages run in a fixed order; each one executes a single activity and
//! emits an audit event tagged with the stage name and outcome. A stage
//! failure emits an audit error and skips everything downstream; the
//! result then carries `failed = true` and the stage that stopped it.

use crate::activities::{derived_event_id, integrate, persist, validate};
use crate::engine::{ActivityDeps, WorkflowContext};
use crate::retry::RetryPolicy;
use crate::WorkflowError;
use apc_core::audit::{AuditEventBuilder, AuditKind, AuditSeverity};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_core::{DataReference, FeedlotFamily, InvoiceStatus};
use apc_reconcile::amounts_match;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Stages of the invoice workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStage {
    /// Load and integrity-check the extracted invoice artifact.
    Extract,
    /// Run the B-checks.
    Validate,
    /// Link the invoice to its statement reference and check the charge.
    ReconcileLink,
    /// Choose the owning entity.
    ResolveEntity,
    /// Match the biller to a catalog vendor.
    ResolveVendor,
    /// Generate GL coding.
    ApplyMappingOverlay,
    /// Build the ERP payload.
    BuildErpPayload,
    /// Terminal stage: payload stored, invoice marked mapped.
    PayloadGenerated,
}

impl InvoiceStage {
    /// Stage name as audited.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "EXTRACT",
            Self::Validate => "VALIDATE",
            Self::ReconcileLink => "RECONCILE_LINK",
            Self::ResolveEntity => "RESOLVE_ENTITY",
            Self::ResolveVendor => "RESOLVE_VENDOR",
            Self::ApplyMappingOverlay => "APPLY_MAPPING_OVERLAY",
            Self::BuildErpPayload => "BUILD_ERP_PAYLOAD",
            Self::PayloadGenerated => "PAYLOAD_GENERATED",
        }
    }
}

impl fmt::Display for InvoiceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input to the invoice workflow. The workflow id is
/// `package_id:invoice_number`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWorkflowInput {
    /// Owning package.
    pub package_id: String,
    /// Effective invoice number.
    pub invoice_number: String,
    /// Feedlot family, for artifact paths.
    pub feedlot_family: FeedlotFamily,
    /// Extracted invoice artifact.
    pub invoice_ref: DataReference,
    /// Statement artifact, when the package had one.
    pub statement_ref: Option<DataReference>,
}

impl InvoiceWorkflowInput {
    /// The child workflow id for this input.
    #[must_use]
    pub fn workflow_id(&self) -> String {
        format!("{}:{}", self.package_id, self.invoice_number)
    }
}

/// Result of an invoice workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWorkflowResult {
    /// Owning package.
    pub package_id: String,
    /// Invoice processed.
    pub invoice_number: String,
    /// Last stage that ran.
    pub stage_reached: InvoiceStage,
    /// True when a stage failed and downstream stages were skipped.
    pub failed: bool,
    /// Why the failing stage failed, when it did.
    pub failure_reason: Option<String>,
    /// Entity chosen by resolution.
    pub entity_id: Option<String>,
    /// Vendor chosen by resolution.
    pub vendor_id: Option<String>,
    /// Vendor number, for the payload.
    pub vendor_number: Option<String>,
    /// Stored coding artifact.
    pub coding_ref: Option<DataReference>,
    /// Stored payload artifact.
    pub payload_ref: Option<DataReference>,
    /// Idempotency key embedded in the payload.
    pub idempotency_key: Option<String>,
}

impl InvoiceWorkflowResult {
    fn new(input: &InvoiceWorkflowInput) -> Self {
        Self {
            package_id: input.package_id.clone(),
            invoice_number: input.invoice_number.clone(),
            stage_reached: InvoiceStage::Extract,
            failed: false,
            failure_reason: None,
            entity_id: None,
            vendor_id: None,
            vendor_number: None,
            coding_ref: None,
            payload_ref: None,
            idempotency_key: None,
        }
    }
}

/// Emit the per-stage audit event through the `persist_audit_event`
/// activity.
async fn audit_stage(
    ctx: &WorkflowContext,
    deps: &ActivityDeps,
    input: &InvoiceWorkflowInput,
    stage: InvoiceStage,
    severity: AuditSeverity,
    message: String,
) -> Result<(), WorkflowError> {
    let workflow_id = input.workflow_id();
    ctx.execute(
        &format!("audit_{}", stage.as_str().to_lowercase()),
        &RetryPolicy::db_write(),
        |_actx| {
            let deps = deps.clone();
            let input = input.clone();
            let workflow_id = workflow_id.clone();
            let message = message.clone();
            async move {
                let kind = match stage {
                    InvoiceStage::Extract => AuditKind::Extraction,
                    InvoiceStage::Validate => AuditKind::Validation,
                    InvoiceStage::ReconcileLink => AuditKind::Reconciliation,
                    InvoiceStage::ResolveEntity | InvoiceStage::ResolveVendor => AuditKind::Mapping,
                    InvoiceStage::ApplyMappingOverlay => AuditKind::Mapping,
                    InvoiceStage::BuildErpPayload | InvoiceStage::PayloadGenerated => {
                        AuditKind::Posting
                    }
                };
                let event = AuditEventBuilder::new(kind, message)
                    .severity(severity)
                    .package_id(&input.package_id)
                    .invoice_number(&input.invoice_number)
                    .workflow_id(&workflow_id)
                    .activity_name("persist_audit_event")
                    .detail("stage", serde_json::json!(stage.as_str()))
                    .build(
                        derived_event_id(&workflow_id, "stage", stage.as_str()),
                        chrono::Utc::now(),
                    );
                persist::persist_audit_event(&deps, &event).await
            }
        },
    )
    .await
}

/// Mark the result failed at `stage`, audit the error, and return it.
async fn fail_stage(
    ctx: &WorkflowContext,
    deps: &ActivityDeps,
    input: &InvoiceWorkflowInput,
    mut result: InvoiceWorkflowResult,
    stage: InvoiceStage,
    reason: String,
) -> Result<InvoiceWorkflowResult, WorkflowError> {
    audit_stage(
        ctx,
        deps,
        input,
        stage,
        AuditSeverity::Error,
        format!("{stage} failed: {reason}"),
    )
    .await?;
    result.stage_reached = stage;
    result.failed = true;
    result.failure_reason = Some(reason);
    Ok(result)
}

/// Run the invoice workflow to completion (or to its first failed stage).
pub async fn run_invoice(
    ctx: &WorkflowContext,
    deps: &ActivityDeps,
    input: &InvoiceWorkflowInput,
) -> Result<InvoiceWorkflowResult, WorkflowError> {
    let mut result = InvoiceWorkflowResult::new(input);
    info!(
        target: "ap.workflow",
        workflow_id = %input.workflow_id(),
        "starting invoice workflow"
    );

    // EXTRACT: the package workflow already extracted the document; this
    // stage re-validates the artifact behind the reference.
    let stage = InvoiceStage::Extract;
    let loaded = ctx
        .execute("stage_extract", &RetryPolicy::validation(), |_actx| {
            let deps = deps.clone();
            let invoice_ref = input.invoice_ref.clone();
            async move {
                let invoice: InvoiceDocument = deps.artifacts.get_json(&invoice_ref, true)?;
                Ok(invoice.invoice_number)
            }
        })
        .await;
    match loaded {
        Ok(_) => {
            audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
                "{stage} ok: invoice artifact verified"
            ))
            .await?;
        }
        Err(WorkflowError::ActivityFailed { message, .. }) => {
            return fail_stage(ctx, deps, input, result, stage, message).await;
        }
        Err(other) => return Err(other),
    }
    result.stage_reached = stage;

    // VALIDATE: B-checks.
    let stage = InvoiceStage::Validate;
    let validation = ctx
        .execute("stage_validate", &RetryPolicy::validation(), |_actx| {
            let deps = deps.clone();
            let input = input.clone();
            async move {
                validate::validate_invoice(
                    &deps,
                    &input.package_id,
                    input.feedlot_family,
                    &input.invoice_number,
                    &input.invoice_ref,
                )
                .await
            }
        })
        .await?;
    if !validation.passed {
        return fail_stage(
            ctx,
            deps,
            input,
            result,
            stage,
            "required fields missing (B1)".into(),
        )
        .await;
    }
    audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
        "{stage} ok: blocking checks passed"
    ))
    .await?;
    result.stage_reached = stage;

    // RECONCILE_LINK: tie the invoice back to its statement reference.
    let stage = InvoiceStage::ReconcileLink;
    if let Some(statement_ref) = &input.statement_ref {
        let linked = ctx
            .execute("stage_reconcile_link", &RetryPolicy::validation(), |_actx| {
                let deps = deps.clone();
                let input = input.clone();
                let statement_ref = statement_ref.clone();
                async move {
                    let statement: StatementDocument =
                        deps.artifacts.get_json(&statement_ref, true)?;
                    let invoice: InvoiceDocument =
                        deps.artifacts.get_json(&input.invoice_ref, true)?;
                    let reference = statement
                        .lot_references
                        .iter()
                        .find(|r| r.invoice_number == input.invoice_number);
                    Ok(match reference {
                        Some(reference) => {
                            let matches = amounts_match(
                                invoice.resolved_total(),
                                reference.statement_charge,
                            );
                            (true, matches)
                        }
                        None => (false, false),
                    })
                }
            })
            .await?;
        match linked {
            (false, _) => {
                return fail_stage(
                    ctx,
                    deps,
                    input,
                    result,
                    stage,
                    "invoice not referenced on statement".into(),
                )
                .await;
            }
            (true, false) => {
                return fail_stage(
                    ctx,
                    deps,
                    input,
                    result,
                    stage,
                    "invoice total does not match statement charge".into(),
                )
                .await;
            }
            (true, true) => {
                audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
                    "{stage} ok: statement charge matches"
                ))
                .await?;
            }
        }
    } else {
        audit_stage(ctx, deps, input, stage, AuditSeverity::Warn, format!(
            "{stage} skipped: package has no statement"
        ))
        .await?;
    }
    result.stage_reached = stage;

    // RESOLVE_ENTITY.
    let stage = InvoiceStage::ResolveEntity;
    let entity = ctx
        .execute("stage_resolve_entity", &RetryPolicy::resolution(), |_actx| {
            let deps = deps.clone();
            let input = input.clone();
            async move {
                integrate::resolve_entity(
                    &deps,
                    &input.package_id,
                    &input.invoice_ref,
                    input.statement_ref.as_ref(),
                )
                .await
            }
        })
        .await?;
    let Some(entity_id) = entity.entity_id.clone() else {
        return fail_stage(
            ctx,
            deps,
            input,
            result,
            stage,
            format!(
                "entity resolution requires manual confirmation (top score {})",
                entity.confidence
            ),
        )
        .await;
    };
    audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
        "{stage} ok: assigned to {} at {}",
        entity.entity_code.as_deref().unwrap_or(&entity_id),
        entity.confidence
    ))
    .await?;
    result.entity_id = Some(entity_id.clone());
    result.stage_reached = stage;

    // RESOLVE_VENDOR.
    let stage = InvoiceStage::ResolveVendor;
    let vendor = ctx
        .execute("stage_resolve_vendor", &RetryPolicy::resolution(), |_actx| {
            let deps = deps.clone();
            let input = input.clone();
            let entity_id = entity_id.clone();
            async move {
                integrate::resolve_vendor(&deps, &input.package_id, &entity_id, &input.invoice_ref)
                    .await
            }
        })
        .await?;
    let (Some(vendor_id), Some(vendor_number)) =
        (vendor.vendor_id.clone(), vendor.vendor_number.clone())
    else {
        return fail_stage(
            ctx,
            deps,
            input,
            result,
            stage,
            format!(
                "vendor resolution requires manual confirmation (top score {})",
                vendor.confidence
            ),
        )
        .await;
    };
    audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
        "{stage} ok: matched {} ({:?}) at {}",
        vendor.vendor_name.as_deref().unwrap_or(&vendor_number),
        vendor.match_type,
        vendor.confidence
    ))
    .await?;
    result.vendor_id = Some(vendor_id.clone());
    result.vendor_number = Some(vendor_number.clone());
    result.stage_reached = stage;

    // APPLY_MAPPING_OVERLAY.
    let stage = InvoiceStage::ApplyMappingOverlay;
    let coding = ctx
        .execute("stage_apply_mapping", &RetryPolicy::mapping(), |_actx| {
            let deps = deps.clone();
            let input = input.clone();
            let entity_id = entity_id.clone();
            let vendor_id = vendor_id.clone();
            async move {
                integrate::apply_mapping_overlay(
                    &deps,
                    &input.package_id,
                    input.feedlot_family,
                    &entity_id,
                    Some(&vendor_id),
                    &input.invoice_number,
                    &input.invoice_ref,
                    input.statement_ref.as_ref(),
                )
                .await
            }
        })
        .await?;
    let severity = if coding.complete {
        AuditSeverity::Info
    } else {
        AuditSeverity::Warn
    };
    let mut message = format!("{stage} {}", if coding.complete { "ok" } else { "incomplete" });
    if !coding.missing_mappings.is_empty() {
        message.push_str(&format!("; missing mappings: {}", coding.missing_mappings.join(", ")));
    }
    if !coding.missing_dimensions.is_empty() {
        message.push_str(&format!(
            "; missing dimensions: {}",
            coding.missing_dimensions.join(", ")
        ));
    }
    audit_stage(ctx, deps, input, stage, severity, message).await?;
    result.coding_ref = Some(coding.coding_ref.clone());
    result.stage_reached = stage;

    // BUILD_ERP_PAYLOAD.
    let stage = InvoiceStage::BuildErpPayload;
    let payload = ctx
        .execute("stage_build_payload", &RetryPolicy::mapping(), |_actx| {
            let deps = deps.clone();
            let input = input.clone();
            let coding_ref = coding.coding_ref.clone();
            let vendor_number = vendor_number.clone();
            async move {
                integrate::build_erp_payload(
                    &deps,
                    &input.package_id,
                    input.feedlot_family,
                    &input.invoice_number,
                    &input.invoice_ref,
                    &coding_ref,
                    &vendor_number,
                )
                .await
            }
        })
        .await;
    let payload = match payload {
        Ok(payload) => payload,
        Err(WorkflowError::ActivityFailed { message, .. }) => {
            return fail_stage(ctx, deps, input, result, stage, message).await;
        }
        Err(other) => return Err(other),
    };
    audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
        "{stage} ok: total {}",
        payload.total_amount
    ))
    .await?;
    result.payload_ref = Some(payload.payload_ref.clone());
    result.idempotency_key = Some(payload.idempotency_key.clone());
    result.stage_reached = stage;

    // PAYLOAD_GENERATED: terminal stage, marking the invoice mapped.
    let stage = InvoiceStage::PayloadGenerated;
    ctx.execute("stage_payload_generated", &RetryPolicy::db_write(), |_actx| {
        let deps = deps.clone();
        let input = input.clone();
        async move {
            persist::update_invoice_status(
                &deps,
                &input.package_id,
                &input.invoice_number,
                InvoiceStatus::Mapped,
                None,
            )
            .await
        }
    })
    .await?;
    audit_stage(ctx, deps, input, stage, AuditSeverity::Info, format!(
        "{stage}: payload stored"
    ))
    .await?;
    result.stage_reached = stage;

    info!(
        target: "ap.workflow",
        workflow_id = %input.workflow_id(),
        stage = %result.stage_reached,
        "invoice workflow complete"
    );
    Ok(result)
}
