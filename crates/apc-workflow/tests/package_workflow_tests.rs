// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end package workflow tests over scripted extraction.

mod common;

use apc_core::report::ReconciliationStatus;
use apc_core::{InvoiceStatus, PackageStatus};
use apc_store::{AuditFilter, WorkflowState};
use apc_workflow::testing::{InjectedFailure, ScriptedExtractor};
use common::*;
use rust_decimal_macros::dec;

#[tokio::test]
async fn complete_bovina_package_reconciles_pass() {
    let fx = fixture(scripted_two_invoices(), 2);
    let summary = fx
        .runner
        .run_package(package_input(&fx, "pkg-1"))
        .await
        .unwrap();

    assert_eq!(summary.status, PackageStatus::ReconciledPass);
    assert!(summary.statement_extracted);
    assert_eq!(summary.invoices_extracted, 2);
    assert_eq!(summary.invoices_validated_pass, 2);
    assert_eq!(summary.invoices_validated_fail, 0);
    assert_eq!(summary.invoice_numbers, vec!["13330", "13335"]);
    let recon = summary.reconciliation.unwrap();
    assert_eq!(recon.status, ReconciliationStatus::Pass);
    assert_eq!(recon.blocking_issues, 0);

    // Rows, counters, and artifacts agree with the summary.
    let package = fx.store.package("pkg-1").unwrap().unwrap();
    assert_eq!(package.status, PackageStatus::ReconciledPass);
    assert_eq!(package.total_invoices, 2);
    assert_eq!(package.extracted_invoices, 2);
    assert!(package.statement_ref.is_some());

    let rows = fx.store.invoices("pkg-1").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == InvoiceStatus::ValidatedPass));
    assert!(rows.iter().all(|r| r.validation_ref.is_some()));
    assert_eq!(rows[0].total_amount, Some(dec!(12345.67)));

    assert!(fx.artifacts.exists("bovina/statement.json"));
    assert_eq!(
        fx.artifacts.list("bovina/invoices").unwrap(),
        vec!["13330.json", "13335.json"]
    );

    // Progress log covers every step, with dense ordinals.
    let progress = fx.store.progress("pkg-1").unwrap();
    let ordinals: Vec<_> = progress.iter().map(|p| p.ordinal).collect();
    assert_eq!(ordinals, (1..=progress.len() as u64).collect::<Vec<_>>());

    let workflow = fx.store.workflow("pkg-1").unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Completed);
}

#[tokio::test]
async fn rerun_replays_without_new_extraction() {
    let fx = fixture(scripted_two_invoices(), 2);
    let first = fx
        .runner
        .run_package(package_input(&fx, "pkg-1"))
        .await
        .unwrap();
    let calls_after_first = fx.extractor.call_count();
    let hashes_first: Vec<_> = first
        .invoice_refs
        .iter()
        .map(|r| r.content_hash.clone())
        .collect();

    let second = fx
        .runner
        .run_package(package_input(&fx, "pkg-1"))
        .await
        .unwrap();

    assert_eq!(second.status, first.status);
    assert_eq!(fx.extractor.call_count(), calls_after_first, "no re-extraction");
    assert_eq!(fx.store.invoice_count("pkg-1").unwrap(), 2);
    let hashes_second: Vec<_> = second
        .invoice_refs
        .iter()
        .map(|r| r.content_hash.clone())
        .collect();
    assert_eq!(hashes_first, hashes_second, "artifact set is byte-identical");
}

#[tokio::test(start_paused = true)]
async fn transient_extractor_failures_are_retried() {
    let fx = fixture(scripted_two_invoices().flaky(2), 2);
    let summary = fx
        .runner
        .run_package(package_input(&fx, "pkg-flaky"))
        .await
        .unwrap();
    assert_eq!(summary.status, PackageStatus::ReconciledPass);
}

#[tokio::test]
async fn terminal_schema_failure_fails_the_package() {
    // The statement extracts, then the first invoice violates its schema.
    let fx = fixture(
        scripted_two_invoices().failing_after(1, InjectedFailure::Terminal),
        2,
    );
    let err = fx
        .runner
        .run_package(package_input(&fx, "pkg-bad"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains(apc_error::ApError::SCHEMA), "{err}");

    let package = fx.store.package("pkg-bad").unwrap().unwrap();
    assert_eq!(package.status, PackageStatus::Failed);
    let workflow = fx.store.workflow("pkg-bad").unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Failed);

    // The failure is audited with severity ERROR.
    let events = fx
        .store
        .audit_events(&AuditFilter {
            package_id: Some("pkg-bad".into()),
            ..AuditFilter::default()
        })
        .unwrap();
    assert!(events.iter().any(|e| {
        e.severity == apc_core::audit::AuditSeverity::Error && e.message.contains("failed")
    }));
}

#[tokio::test]
async fn missing_invoice_reconciles_fail() {
    // Statement references 13330 and 13335 but the PDF only carries one
    // invoice page.
    let fx = fixture(
        ScriptedExtractor::new()
            .with_statement(bovina_statement())
            .with_invoice(1, bovina_invoice("13330", "20-3883", dec!(12345.67))),
        1,
    );
    let summary = fx
        .runner
        .run_package(package_input(&fx, "pkg-missing"))
        .await
        .unwrap();

    assert_eq!(summary.status, PackageStatus::ReconciledFail);
    assert_eq!(summary.invoices_extracted, 1);
    let recon = summary.reconciliation.unwrap();
    assert_eq!(recon.status, ReconciliationStatus::Fail);
    assert!(recon.blocking_issues >= 1);
    assert_eq!(fx.store.invoice_count("pkg-missing").unwrap(), 1);

    // The stored report carries the machine-readable missing list.
    let report: apc_core::report::ReconciliationReport =
        fx.artifacts.get_json(&recon.report_ref, true).unwrap();
    let a1 = report.check("A1").unwrap();
    assert!(!a1.passed);
    assert_eq!(a1.evidence["missing"], serde_json::json!(["13335"]));
}

#[tokio::test]
async fn amount_mismatch_outside_tolerance_reconciles_fail() {
    let fx = fixture(
        ScriptedExtractor::new()
            .with_statement(bovina_statement())
            // 12345.80 vs the statement's 12345.67: 0.13 over tolerance.
            .with_invoice(1, bovina_invoice("13330", "20-3883", dec!(12345.80)))
            .with_invoice(2, bovina_invoice("13335", "20-3884", dec!(500.00))),
        2,
    );
    let summary = fx
        .runner
        .run_package(package_input(&fx, "pkg-mismatch"))
        .await
        .unwrap();
    assert_eq!(summary.status, PackageStatus::ReconciledFail);
    let recon = summary.reconciliation.unwrap();
    let report: apc_core::report::ReconciliationReport =
        fx.artifacts.get_json(&recon.report_ref, true).unwrap();
    assert!(!report.check("A5").unwrap().passed);
}

#[tokio::test]
async fn statementless_package_stops_at_extracted() {
    let fx = {
        let mut fx = fixture(
            ScriptedExtractor::new()
                .with_invoice(1, bovina_invoice("13330", "20-3883", dec!(12345.67))),
            1,
        );
        // No statement page in the split.
        let deps = apc_workflow::ActivityDeps {
            splitter: std::sync::Arc::new(apc_workflow::testing::FixedSplitter::new(
                apc_workflow::PageSplit {
                    statement_pages: vec![],
                    invoice_pages: vec![1],
                    total_pages: 1,
                },
            )),
            ..fx.runner.deps().clone()
        };
        fx.runner = apc_workflow::WorkflowRunner::new(deps);
        fx
    };
    let summary = fx
        .runner
        .run_package(package_input(&fx, "pkg-nostmt"))
        .await
        .unwrap();
    assert_eq!(summary.status, PackageStatus::Extracted);
    assert!(!summary.statement_extracted);
    assert!(summary.reconciliation.is_none());
}

#[tokio::test]
async fn crash_mid_package_resumes_to_identical_terminal_state() {
    // Five invoices; the worker "dies" after the statement and two invoices.
    let script = ScriptedExtractor::new()
        .with_statement({
            let mut statement = bovina_statement();
            statement.lot_references = (0..5)
                .map(|i| apc_core::document::LotReference {
                    invoice_number: format!("1400{i}"),
                    lot_number: Some(format!("20-400{i}")),
                    statement_charge: Some(dec!(100.00)),
                    description: None,
                })
                .collect();
            statement
        })
        .failing_after(3, InjectedFailure::Cancelled);
    let script = (0..5).fold(script, |script, i| {
        script.with_invoice(i + 1, bovina_invoice(&format!("1400{i}"), &format!("20-400{i}"), dec!(100.00)))
    });

    let fx = fixture(script, 5);
    let err = fx
        .runner
        .run_package(package_input(&fx, "pkg-crash"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        fx.store.package("pkg-crash").unwrap().unwrap().status,
        PackageStatus::Cancelled
    );
    assert_eq!(fx.store.invoice_count("pkg-crash").unwrap(), 2);
    let calls_at_crash = fx.extractor.call_count();
    // Statement + two invoices succeeded; the fourth call observed the kill.
    assert_eq!(calls_at_crash, 4);

    // Restart the worker: same store, same artifacts, healed extractor.
    fx.extractor.heal();
    let resumed = fx
        .runner
        .run_package(package_input(&fx, "pkg-crash"))
        .await
        .unwrap();

    assert_eq!(resumed.status, PackageStatus::ReconciledPass);
    assert_eq!(resumed.invoices_extracted, 5);
    // Completed slots replayed; only invoices 3 through 5 extracted fresh.
    assert_eq!(fx.extractor.call_count(), calls_at_crash + 3);
    assert_eq!(fx.store.invoice_count("pkg-crash").unwrap(), 5);
    assert_eq!(fx.artifacts.list("bovina/invoices").unwrap().len(), 5);
    assert_eq!(
        fx.store.package("pkg-crash").unwrap().unwrap().status,
        PackageStatus::ReconciledPass
    );
}

#[tokio::test]
async fn cancellation_before_first_extraction_marks_cancelled() {
    let fx = fixture(
        scripted_two_invoices().failing_after(0, InjectedFailure::Cancelled),
        2,
    );
    let err = fx
        .runner
        .run_package(package_input(&fx, "pkg-cancel"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    let package = fx.store.package("pkg-cancel").unwrap().unwrap();
    assert_eq!(package.status, PackageStatus::Cancelled);
    let workflow = fx.store.workflow("pkg-cancel").unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Cancelled);
}
