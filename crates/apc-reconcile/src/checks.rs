// SPDX-License-Identifier: MIT OR Apache-2.0
//! The individual reconciliation checks.

use crate::{amounts_match, effective_invoice_number};
use apc_core::FeedlotFamily;
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_core::report::{CheckResult, CheckSeverity};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

fn check(
    check_id: &str,
    severity: CheckSeverity,
    passed: bool,
    message: impl Into<String>,
    evidence: BTreeMap<String, serde_json::Value>,
) -> CheckResult {
    CheckResult {
        check_id: check_id.to_string(),
        severity,
        passed,
        message: message.into(),
        evidence,
    }
}

fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() || ch == '-' || ch.is_whitespace() {
            out.extend(ch.to_uppercase());
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) struct Context<'a> {
    statement: &'a StatementDocument,
    invoices: &'a [InvoiceDocument],
    family: FeedlotFamily,
    /// Effective invoice numbers, parallel to `invoices`.
    numbers: Vec<String>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        statement: &'a StatementDocument,
        invoices: &'a [InvoiceDocument],
        family: FeedlotFamily,
    ) -> Self {
        let numbers = invoices
            .iter()
            .enumerate()
            .map(|(i, inv)| effective_invoice_number(inv, i))
            .collect();
        Self {
            statement,
            invoices,
            family,
            numbers,
        }
    }

    fn invoice_by_number(&self, number: &str) -> Option<&InvoiceDocument> {
        self.numbers
            .iter()
            .position(|n| n == number)
            .map(|i| &self.invoices[i])
    }

    pub(crate) fn matched_invoices(&self) -> u32 {
        let have: BTreeSet<&str> = self.numbers.iter().map(String::as_str).collect();
        self.statement
            .lot_references
            .iter()
            .filter(|r| have.contains(r.invoice_number.as_str()))
            .count() as u32
    }

    /// Resolve the family-specific statement grand total.
    ///
    /// BOVINA statements of notes carry one note per lot, so the grand total
    /// is the sum of the per-lot charges. MESQUITE statements of account
    /// print a summary total row; the lot-reference sum is the fallback when
    /// none is present.
    pub(crate) fn statement_total(&self) -> (Option<Decimal>, String) {
        let lot_sum = || {
            let mut sum = Decimal::ZERO;
            for r in &self.statement.lot_references {
                match r.statement_charge {
                    Some(charge) => sum += charge,
                    None => return None,
                }
            }
            (!self.statement.lot_references.is_empty()).then_some(sum)
        };
        match self.family {
            FeedlotFamily::Bovina => (lot_sum(), "lot_references.statement_charge".to_string()),
            FeedlotFamily::Mesquite => {
                let total_row = self
                    .statement
                    .summary_rows
                    .iter()
                    .find(|row| row.label.to_ascii_lowercase().contains("total"));
                match total_row {
                    Some(row) if row.amount.is_some() => {
                        (row.amount, format!("summary_rows.{}", row.label))
                    }
                    _ => (lot_sum(), "lot_references.statement_charge".to_string()),
                }
            }
        }
    }

    /// `(sum of resolved invoice totals, statement total, source)` for the
    /// report metrics. The invoice sum is `None` when any invoice total is
    /// unresolvable.
    pub(crate) fn totals(&self) -> (Option<Decimal>, Option<Decimal>, String) {
        let mut sum = Decimal::ZERO;
        let mut complete = true;
        for invoice in self.invoices {
            match invoice.resolved_total() {
                Some(total) => sum += total,
                None => complete = false,
            }
        }
        let invoice_sum = (complete && !self.invoices.is_empty()).then_some(sum);
        let (statement_total, source) = self.statement_total();
        (invoice_sum, statement_total, source)
    }

    // ── A-checks: package-level ─────────────────────────────────────

    pub(crate) fn a1_package_completeness(&self) -> CheckResult {
        let have: BTreeSet<&str> = self.numbers.iter().map(String::as_str).collect();
        let missing: Vec<&str> = self
            .statement
            .lot_references
            .iter()
            .map(|r| r.invoice_number.as_str())
            .filter(|n| !have.contains(n))
            .collect();
        let passed = missing.is_empty();
        let message = if passed {
            format!(
                "all {} statement-referenced invoices are present",
                self.statement.lot_references.len()
            )
        } else {
            format!("{} statement-referenced invoice(s) missing", missing.len())
        };
        check(
            "A1",
            CheckSeverity::Block,
            passed,
            message,
            BTreeMap::from([("missing".to_string(), json!(missing))]),
        )
    }

    pub(crate) fn a2_no_extras(&self) -> CheckResult {
        let referenced: BTreeSet<&str> = self
            .statement
            .lot_references
            .iter()
            .map(|r| r.invoice_number.as_str())
            .collect();
        let extra: Vec<&str> = self
            .numbers
            .iter()
            .map(String::as_str)
            .filter(|n| !referenced.contains(n))
            .collect();
        let passed = extra.is_empty();
        let message = if passed {
            "no invoices outside the statement references".to_string()
        } else {
            format!("{} invoice(s) not referenced on the statement", extra.len())
        };
        check(
            "A2",
            CheckSeverity::Warn,
            passed,
            message,
            BTreeMap::from([("extra".to_string(), json!(extra))]),
        )
    }

    pub(crate) fn a3_period_consistency(&self) -> CheckResult {
        let (Some(start), Some(end)) = (self.statement.period_start, self.statement.period_end)
        else {
            return check(
                "A3",
                CheckSeverity::Warn,
                true,
                "statement period not fully specified; skipped",
                BTreeMap::new(),
            );
        };
        let mut out_of_period = Vec::new();
        for (i, invoice) in self.invoices.iter().enumerate() {
            if let Some(date) = invoice.invoice_date
                && (date < start || date > end)
            {
                out_of_period.push(json!({
                    "invoice_number": self.numbers[i],
                    "invoice_date": date.to_string(),
                }));
            }
        }
        let passed = out_of_period.is_empty();
        let message = if passed {
            format!("all invoice dates fall within {start}..{end}")
        } else {
            format!("{} invoice(s) dated outside {start}..{end}", out_of_period.len())
        };
        check(
            "A3",
            CheckSeverity::Warn,
            passed,
            message,
            BTreeMap::from([("out_of_period".to_string(), json!(out_of_period))]),
        )
    }

    pub(crate) fn a4_feedlot_owner_consistency(&self) -> CheckResult {
        let stmt_feedlot = self.statement.feedlot.name.as_deref().map(normalize_name);
        let stmt_owner = self.statement.owner.name.as_deref().map(normalize_name);
        let mut mismatches = Vec::new();
        for (i, invoice) in self.invoices.iter().enumerate() {
            if let (Some(expected), Some(actual)) =
                (&stmt_feedlot, invoice.feedlot.name.as_deref().map(normalize_name))
                && *expected != actual
            {
                mismatches.push(json!({
                    "invoice_number": self.numbers[i],
                    "field": "feedlot",
                    "expected": expected,
                    "actual": actual,
                }));
            }
            if let (Some(expected), Some(actual)) =
                (&stmt_owner, invoice.owner.name.as_deref().map(normalize_name))
                && *expected != actual
            {
                mismatches.push(json!({
                    "invoice_number": self.numbers[i],
                    "field": "owner",
                    "expected": expected,
                    "actual": actual,
                }));
            }
        }
        let passed = mismatches.is_empty();
        let message = if passed {
            "feedlot and owner agree with the statement".to_string()
        } else {
            format!("{} feedlot/owner mismatch(es)", mismatches.len())
        };
        check(
            "A4",
            CheckSeverity::Warn,
            passed,
            message,
            BTreeMap::from([("mismatches".to_string(), json!(mismatches))]),
        )
    }

    pub(crate) fn a5_per_invoice_amounts(&self) -> CheckResult {
        let mut mismatches = Vec::new();
        for reference in &self.statement.lot_references {
            let Some(invoice) = self.invoice_by_number(&reference.invoice_number) else {
                // A1 already reports the missing invoice.
                continue;
            };
            let invoice_total = invoice.resolved_total();
            if !amounts_match(invoice_total, reference.statement_charge) {
                let difference = match (invoice_total, reference.statement_charge) {
                    (Some(a), Some(b)) => Some((a - b).abs()),
                    _ => None,
                };
                mismatches.push(json!({
                    "invoice_number": reference.invoice_number,
                    "invoice_total": invoice_total.map(|a| a.to_string()),
                    "statement_charge": reference.statement_charge.map(|a| a.to_string()),
                    "difference": difference.map(|a| a.to_string()),
                }));
            }
        }
        let passed = mismatches.is_empty();
        let message = if passed {
            "every invoice total matches its statement charge".to_string()
        } else {
            format!("{} invoice amount mismatch(es)", mismatches.len())
        };
        check(
            "A5",
            CheckSeverity::Block,
            passed,
            message,
            BTreeMap::from([("mismatches".to_string(), json!(mismatches))]),
        )
    }

    pub(crate) fn a6_package_total(&self) -> CheckResult {
        let (invoice_sum, statement_total, source) = self.totals();
        let passed = amounts_match(invoice_sum, statement_total);
        let message = match (invoice_sum, statement_total) {
            (Some(sum), Some(total)) if passed => {
                format!("invoice sum {sum} matches statement total {total}")
            }
            (Some(sum), Some(total)) => {
                format!(
                    "invoice sum {sum} differs from statement total {total} by {}",
                    (sum - total).abs()
                )
            }
            (None, _) => "invoice totals incomplete; package sum unresolvable".to_string(),
            (_, None) => "statement grand total unresolvable".to_string(),
        };
        check(
            "A6",
            CheckSeverity::Block,
            passed,
            message,
            BTreeMap::from([
                (
                    "invoice_sum".to_string(),
                    json!(invoice_sum.map(|a| a.to_string())),
                ),
                (
                    "statement_total".to_string(),
                    json!(statement_total.map(|a| a.to_string())),
                ),
                ("statement_total_source".to_string(), json!(source)),
            ]),
        )
    }

    pub(crate) fn a7_lot_completeness(&self) -> CheckResult {
        let invoice_lots: BTreeSet<&str> = self
            .invoices
            .iter()
            .filter_map(|i| i.lot.lot_number.as_deref())
            .collect();
        let missing: Vec<&str> = self
            .statement
            .lot_references
            .iter()
            .filter_map(|r| r.lot_number.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|lot| !invoice_lots.contains(lot))
            .collect();
        let passed = missing.is_empty();
        let message = if passed {
            "every referenced lot has an invoice".to_string()
        } else {
            format!("{} lot(s) without an invoice", missing.len())
        };
        check(
            "A7",
            CheckSeverity::Info,
            passed,
            message,
            BTreeMap::from([("lots_without_invoice".to_string(), json!(missing))]),
        )
    }

    // ── B-checks: per-invoice ───────────────────────────────────────

    pub(crate) fn b1_required_fields(&self) -> CheckResult {
        let mut failures = Vec::new();
        for (i, invoice) in self.invoices.iter().enumerate() {
            let missing = crate::validate::missing_required_fields(invoice);
            if !missing.is_empty() {
                failures.push(json!({
                    "invoice_number": self.numbers[i],
                    "missing": missing,
                }));
            }
        }
        let passed = failures.is_empty();
        let message = if passed {
            "all invoices carry the required fields".to_string()
        } else {
            format!("{} invoice(s) missing required fields", failures.len())
        };
        check(
            "B1",
            CheckSeverity::Block,
            passed,
            message,
            BTreeMap::from([("failures".to_string(), json!(failures))]),
        )
    }

    pub(crate) fn b2_line_sums(&self) -> CheckResult {
        let mut mismatches = Vec::new();
        for (i, invoice) in self.invoices.iter().enumerate() {
            let line_sum = invoice.line_sum();
            let total = invoice.resolved_total();
            if !amounts_match(line_sum, total) {
                mismatches.push(json!({
                    "invoice_number": self.numbers[i],
                    "line_sum": line_sum.map(|a| a.to_string()),
                    "invoice_total": total.map(|a| a.to_string()),
                }));
            }
        }
        let passed = mismatches.is_empty();
        let message = if passed {
            "line sums match invoice totals".to_string()
        } else {
            format!("{} invoice(s) with line-sum mismatches", mismatches.len())
        };
        check(
            "B2",
            CheckSeverity::Warn,
            passed,
            message,
            BTreeMap::from([("mismatches".to_string(), json!(mismatches))]),
        )
    }

    // ── D-checks ────────────────────────────────────────────────────

    pub(crate) fn d1_duplicate_invoice_numbers(&self) -> CheckResult {
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for number in &self.numbers {
            *counts.entry(number.as_str()).or_default() += 1;
        }
        let duplicates: Vec<&str> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(number, _)| number)
            .collect();
        let passed = duplicates.is_empty();
        let message = if passed {
            "no duplicate invoice numbers".to_string()
        } else {
            format!("{} duplicate invoice number(s)", duplicates.len())
        };
        check(
            "D1",
            CheckSeverity::Block,
            passed,
            message,
            BTreeMap::from([("duplicates".to_string(), json!(duplicates))]),
        )
    }
}
