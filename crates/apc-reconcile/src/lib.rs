// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-reconcile
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Finance-grade reconciliation for AP packages.
//!
//! [`reconcile`] is a pure function over `(statement, invoices, family)`:
//! no I/O, no clock, no randomness. Given the same inputs it produces a
//! bit-identical report. Checks are emitted in a fixed order regardless of
//! which fired:
//!
//! - **A1** package completeness (BLOCK)
//! - **A2** no extra invoices (WARN)
//! - **A3** period consistency (WARN)
//! - **A4** feedlot/owner consistency (WARN)
//! - **A5** per-invoice amount match (BLOCK)
//! - **A6** package total (BLOCK)
//! - **A7** lot completeness (INFO)
//! - **B1** required fields (BLOCK)
//! - **B2** line sums (WARN)
//! - **D1** duplicate invoice numbers (BLOCK)
//!
//! Tolerance is additive and inclusive: a difference of exactly `0.05`
//! passes. Missing amounts fail their comparison; they are never treated
//! as zero.

mod checks;
mod validate;

pub use validate::{InvoiceValidation, validate_invoice};

use apc_core::FeedlotFamily;
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_core::report::{
    CheckResult, CheckSummary, ReconciliationReport, ReconciliationStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

/// Inclusive tolerance for every amount comparison.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.05);

/// True when both amounts are present and within [`AMOUNT_TOLERANCE`].
#[must_use]
pub fn amounts_match(a: Option<Decimal>, b: Option<Decimal>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= AMOUNT_TOLERANCE,
        _ => false,
    }
}

/// Effective invoice number used for set matching: the extracted number, or
/// `page_<index+1>` for invoices that lost theirs.
#[must_use]
pub fn effective_invoice_number(invoice: &InvoiceDocument, index: usize) -> String {
    invoice
        .invoice_number
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("page_{}", index + 1))
}

/// Run every check and aggregate the verdict.
#[must_use]
pub fn reconcile(
    statement: &StatementDocument,
    invoices: &[InvoiceDocument],
    family: FeedlotFamily,
) -> ReconciliationReport {
    let ctx = checks::Context::new(statement, invoices, family);

    let checks: Vec<CheckResult> = vec![
        ctx.a1_package_completeness(),
        ctx.a2_no_extras(),
        ctx.a3_period_consistency(),
        ctx.a4_feedlot_owner_consistency(),
        ctx.a5_per_invoice_amounts(),
        ctx.a6_package_total(),
        ctx.a7_lot_completeness(),
        ctx.b1_required_fields(),
        ctx.b2_line_sums(),
        ctx.d1_duplicate_invoice_numbers(),
    ];

    let summary = summarize(&checks);
    let status = aggregate(&checks);
    let (total_sum, statement_total, source) = ctx.totals();

    debug!(
        target: "ap.reconcile",
        family = %family,
        status = %status,
        blocking = summary.blocking_issues,
        warnings = summary.warnings,
        "reconciliation complete"
    );

    ReconciliationReport {
        feedlot_key: family.artifact_key().to_string(),
        status,
        checks,
        summary,
        matched_invoices: ctx.matched_invoices(),
        expected_invoices: statement.lot_references.len() as u32,
        total_invoice_sum: total_sum,
        statement_total_reference: statement_total,
        statement_total_source: source,
    }
}

fn summarize(checks: &[CheckResult]) -> CheckSummary {
    use apc_core::report::CheckSeverity;
    let mut summary = CheckSummary {
        total_checks: checks.len() as u32,
        ..CheckSummary::default()
    };
    for check in checks {
        if check.passed {
            summary.passed_checks += 1;
        } else {
            match check.severity {
                CheckSeverity::Block => summary.blocking_issues += 1,
                CheckSeverity::Warn => summary.warnings += 1,
                CheckSeverity::Info => {}
            }
        }
    }
    summary
}

fn aggregate(checks: &[CheckResult]) -> ReconciliationStatus {
    use apc_core::report::CheckSeverity;
    let mut status = ReconciliationStatus::Pass;
    for check in checks {
        if check.passed {
            continue;
        }
        match check.severity {
            CheckSeverity::Block => return ReconciliationStatus::Fail,
            CheckSeverity::Warn => status = ReconciliationStatus::Warn,
            CheckSeverity::Info => {}
        }
    }
    status
}
