// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-invoice workflow tests: the full resolve -> code -> payload pipeline.

mod common;

use apc_core::{FeedlotFamily, InvoiceStatus};
use apc_erp::PurchaseInvoicePayload;
use apc_store::AuditFilter;
use apc_workflow::{InvoiceStage, InvoiceWorkflowInput};
use common::*;

/// Run the package workflow and hand back the input for one invoice child.
async fn package_then_invoice_input(fx: &Fixture, invoice_number: &str) -> InvoiceWorkflowInput {
    let summary = fx
        .runner
        .run_package(package_input(fx, "pkg-1"))
        .await
        .unwrap();
    let position = summary
        .invoice_numbers
        .iter()
        .position(|n| n == invoice_number)
        .expect("invoice extracted");
    InvoiceWorkflowInput {
        package_id: "pkg-1".into(),
        invoice_number: invoice_number.into(),
        feedlot_family: FeedlotFamily::Bovina,
        invoice_ref: summary.invoice_refs[position].clone(),
        statement_ref: summary.statement_ref.clone(),
    }
}

#[tokio::test]
async fn invoice_pipeline_reaches_payload_generated() {
    let fx = fixture(scripted_two_invoices(), 2);
    seed_resolution_catalog(&fx);
    let input = package_then_invoice_input(&fx, "13330").await;

    let result = fx.runner.run_invoice(input).await.unwrap();
    assert!(!result.failed, "{:?}", result.failure_reason);
    assert_eq!(result.stage_reached, InvoiceStage::PayloadGenerated);
    assert_eq!(result.entity_id.as_deref(), Some("BF2"));
    assert_eq!(result.vendor_id.as_deref(), Some("V-BF2"));
    assert_eq!(result.idempotency_key.as_deref(), Some("pkg-1:13330"));

    // The payload artifact is complete and carries the echoed key.
    let payload: PurchaseInvoicePayload = fx
        .artifacts
        .get_json(result.payload_ref.as_ref().unwrap(), true)
        .unwrap();
    assert_eq!(payload.idempotency_key, "pkg-1:13330");
    assert_eq!(payload.header.vendor_code, "V00001");
    assert_eq!(payload.header.external_document_no, "13330");
    assert_eq!(payload.header.total_amount, "12345.67");
    assert_eq!(payload.lines.len(), 1);
    assert_eq!(payload.lines[0].gl_account_code, "5000");

    // The invoice row advanced to MAPPED.
    let rows = fx.store.invoices("pkg-1").unwrap();
    let row = rows.iter().find(|r| r.invoice_number == "13330").unwrap();
    assert_eq!(row.status, InvoiceStatus::Mapped);

    // Every stage left an audit line for this invoice.
    let events = fx
        .store
        .audit_events(&AuditFilter {
            package_id: Some("pkg-1".into()),
            limit: Some(200),
            ..AuditFilter::default()
        })
        .unwrap();
    for stage in [
        "EXTRACT",
        "VALIDATE",
        "RECONCILE_LINK",
        "RESOLVE_ENTITY",
        "RESOLVE_VENDOR",
        "APPLY_MAPPING_OVERLAY",
        "BUILD_ERP_PAYLOAD",
        "PAYLOAD_GENERATED",
    ] {
        assert!(
            events.iter().any(|e| {
                e.invoice_number.as_deref() == Some("13330")
                    && e.details.get("stage") == Some(&serde_json::json!(stage))
            }),
            "missing audit for stage {stage}"
        );
    }
}

#[tokio::test]
async fn unresolvable_entity_fails_the_resolve_stage() {
    let fx = fixture(scripted_two_invoices(), 2);
    // No routing keys, no catalog: nothing can score.
    let input = package_then_invoice_input(&fx, "13330").await;
    let result = fx.runner.run_invoice(input).await.unwrap();
    assert!(result.failed);
    assert_eq!(result.stage_reached, InvoiceStage::ResolveEntity);
    assert!(
        result
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("manual confirmation")
    );
    assert!(result.payload_ref.is_none());
}

#[tokio::test]
async fn statement_mismatch_fails_reconcile_link() {
    let fx = fixture(
        {
            let mut statement = bovina_statement();
            // Statement claims a different charge for 13330.
            statement.lot_references[0].statement_charge =
                Some(rust_decimal_macros::dec!(999.99));
            apc_workflow::testing::ScriptedExtractor::new()
                .with_statement(statement)
                .with_invoice(1, bovina_invoice("13330", "20-3883", rust_decimal_macros::dec!(12345.67)))
                .with_invoice(2, bovina_invoice("13335", "20-3884", rust_decimal_macros::dec!(500.00)))
        },
        2,
    );
    seed_resolution_catalog(&fx);
    let input = package_then_invoice_input(&fx, "13330").await;
    let result = fx.runner.run_invoice(input).await.unwrap();
    assert!(result.failed);
    assert_eq!(result.stage_reached, InvoiceStage::ReconcileLink);
}

#[tokio::test]
async fn invoice_workflow_replays_after_completion() {
    let fx = fixture(scripted_two_invoices(), 2);
    seed_resolution_catalog(&fx);
    let input = package_then_invoice_input(&fx, "13330").await;

    let first = fx.runner.run_invoice(input.clone()).await.unwrap();
    let second = fx.runner.run_invoice(input).await.unwrap();
    assert_eq!(first.stage_reached, second.stage_reached);
    assert_eq!(
        first.payload_ref.as_ref().unwrap().content_hash,
        second.payload_ref.as_ref().unwrap().content_hash
    );
    // One draft-worthy payload, one audit trail: stage events dedupe on
    // their derived ids.
    let events = fx
        .store
        .audit_events(&AuditFilter {
            package_id: Some("pkg-1".into()),
            limit: Some(500),
            ..AuditFilter::default()
        })
        .unwrap();
    let payload_events = events
        .iter()
        .filter(|e| e.details.get("stage") == Some(&serde_json::json!("PAYLOAD_GENERATED")))
        .count();
    assert_eq!(payload_events, 1);
}
