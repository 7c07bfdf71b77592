// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration activities: entity resolution, vendor resolution, GL coding,
//! and ERP payload construction.

use crate::engine::ActivityDeps;
use apc_coding::{CodingEngine, InvoiceCoding};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_core::progress::ProgressStep;
use apc_core::{DataReference, FeedlotFamily, safe_invoice_number};
use apc_entity::EntityResolver;
use apc_error::{ApError, ApResult};
use apc_vendor::VendorResolver;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Output of the `resolve_entity` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveEntityOutput {
    /// Whether the resolver auto-assigned.
    pub auto_assigned: bool,
    /// Chosen entity id, when auto-assigned.
    pub entity_id: Option<String>,
    /// Chosen entity code, when auto-assigned.
    pub entity_code: Option<String>,
    /// Top score.
    pub confidence: Decimal,
    /// Candidate `(entity_id, score)` pairs, best first.
    pub candidates: Vec<(String, Decimal)>,
    /// Decision trail.
    pub reasons: Vec<String>,
}

/// Score the entity catalog against a stored invoice (statement filling
/// gaps).
pub async fn resolve_entity(
    deps: &ActivityDeps,
    package_id: &str,
    invoice_ref: &DataReference,
    statement_ref: Option<&DataReference>,
) -> ApResult<ResolveEntityOutput> {
    let invoice: InvoiceDocument = deps.artifacts.get_json(invoice_ref, true)?;
    let statement: Option<StatementDocument> = statement_ref
        .map(|r| deps.artifacts.get_json(r, true))
        .transpose()?;

    let resolver = EntityResolver::new(deps.store.clone(), deps.entity_weights.clone());
    let resolution = resolver
        .resolve(
            &invoice,
            statement.as_ref(),
            deps.vendor_directory.as_deref(),
        )
        .await?;

    info!(
        target: "ap.workflow",
        package_id,
        auto = resolution.auto_assigned,
        confidence = %resolution.confidence,
        "entity resolved"
    );
    Ok(ResolveEntityOutput {
        auto_assigned: resolution.auto_assigned,
        entity_id: resolution.entity.as_ref().map(|e| e.entity_id.clone()),
        entity_code: resolution.entity.as_ref().map(|e| e.entity_code.clone()),
        confidence: resolution.confidence,
        candidates: resolution
            .candidates
            .iter()
            .map(|c| (c.entity.entity_id.clone(), c.score))
            .collect(),
        reasons: resolution.reasons,
    })
}

/// Output of the `resolve_vendor` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveVendorOutput {
    /// Whether the resolver auto-matched.
    pub auto_matched: bool,
    /// Matched vendor id.
    pub vendor_id: Option<String>,
    /// Matched vendor number.
    pub vendor_number: Option<String>,
    /// Matched vendor name.
    pub vendor_name: Option<String>,
    /// Match type wire string (`EXACT_ALIAS`, `FUZZY_NAME`, ...).
    pub match_type: apc_vendor::MatchType,
    /// Top score.
    pub confidence: Decimal,
    /// Decision trail.
    pub reasons: Vec<String>,
}

/// Match the invoice's biller (the feedlot) against the entity's vendor
/// catalog.
pub async fn resolve_vendor(
    deps: &ActivityDeps,
    package_id: &str,
    entity_id: &str,
    invoice_ref: &DataReference,
) -> ApResult<ResolveVendorOutput> {
    let invoice: InvoiceDocument = deps.artifacts.get_json(invoice_ref, true)?;
    let extracted_name = invoice
        .feedlot
        .name
        .as_deref()
        .or(invoice.owner.name.as_deref())
        .ok_or_else(|| ApError::validation("invoice carries no vendor name to resolve"))?;

    let catalog = deps.erp.list_vendors(entity_id).await?;
    let resolver = VendorResolver::new(
        deps.store.clone(),
        deps.vendor_matching.clone(),
        deps.customer_id.clone(),
    );
    let resolution = resolver.resolve(extracted_name, entity_id, &catalog, None)?;

    info!(
        target: "ap.workflow",
        package_id,
        entity_id,
        auto = resolution.auto_matched,
        match_type = ?resolution.match_type,
        "vendor resolved"
    );
    Ok(ResolveVendorOutput {
        auto_matched: resolution.auto_matched,
        vendor_id: resolution.vendor_id,
        vendor_number: resolution.vendor_number,
        vendor_name: resolution.vendor_name,
        match_type: resolution.match_type,
        confidence: resolution.confidence,
        reasons: resolution.reasons,
    })
}

/// Output of the `apply_mapping_overlay` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyMappingOutput {
    /// Stored coding artifact.
    pub coding_ref: DataReference,
    /// Whether every mapping and dimension resolved.
    pub complete: bool,
    /// Categories that fell through to suspense.
    pub missing_mappings: Vec<String>,
    /// Required dimensions that stayed empty.
    pub missing_dimensions: Vec<String>,
    /// Coding warnings.
    pub warnings: Vec<String>,
}

/// Generate GL coding for an invoice and persist it as an artifact.
#[allow(clippy::too_many_arguments)]
pub async fn apply_mapping_overlay(
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    entity_id: &str,
    vendor_id: Option<&str>,
    invoice_number: &str,
    invoice_ref: &DataReference,
    statement_ref: Option<&DataReference>,
) -> ApResult<ApplyMappingOutput> {
    let invoice: InvoiceDocument = deps.artifacts.get_json(invoice_ref, true)?;
    let statement: Option<StatementDocument> = statement_ref
        .map(|r| deps.artifacts.get_json(r, true))
        .transpose()?;
    let entity = deps.store.entity_profile(entity_id)?;

    let engine = CodingEngine::new(
        deps.store.clone(),
        entity_id,
        vendor_id.map(str::to_string),
        deps.suspense.clone(),
    )?;
    let coding = engine.code_invoice(
        &invoice,
        invoice_number,
        None,
        statement.as_ref(),
        entity.as_ref(),
    )?;

    let safe = safe_invoice_number(invoice_number);
    let relative = format!("{}/codings/{safe}.json", family.artifact_key());
    let coding_ref = deps.artifacts.put_json(&coding, &relative)?;

    let message = format!(
        "Invoice {invoice_number} coded ({} lines, complete: {})",
        coding.line_codings.len(),
        coding.complete
    );
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::Mapping, &message)?;

    Ok(ApplyMappingOutput {
        coding_ref,
        complete: coding.complete,
        missing_mappings: coding.missing_mappings,
        missing_dimensions: coding.missing_dimensions,
        warnings: coding.warnings,
    })
}

/// Output of the `build_erp_payload` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPayloadOutput {
    /// Stored payload artifact.
    pub payload_ref: DataReference,
    /// Idempotency key embedded in the payload.
    pub idempotency_key: String,
    /// Header total, as the payload string.
    pub total_amount: String,
}

/// Build the ERP-neutral purchase-invoice payload and persist it.
pub async fn build_erp_payload(
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    invoice_number: &str,
    invoice_ref: &DataReference,
    coding_ref: &DataReference,
    vendor_number: &str,
) -> ApResult<BuildPayloadOutput> {
    let invoice: InvoiceDocument = deps.artifacts.get_json(invoice_ref, true)?;
    let coding: InvoiceCoding = deps.artifacts.get_json(coding_ref, true)?;

    let idempotency_key = format!("{package_id}:{invoice_number}");
    let payload = apc_erp::build_payload(&invoice, &coding, vendor_number, &idempotency_key)?;

    let safe = safe_invoice_number(invoice_number);
    let relative = format!("{}/payloads/{safe}.json", family.artifact_key());
    let payload_ref = deps.artifacts.put_json(&payload, &relative)?;

    let message = format!(
        "Payload generated for invoice {invoice_number} (total {})",
        payload.header.total_amount
    );
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::Payload, &message)?;

    Ok(BuildPayloadOutput {
        payload_ref,
        idempotency_key,
        total_amount: payload.header.total_amount,
    })
}
