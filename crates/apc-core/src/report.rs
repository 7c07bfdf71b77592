// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reconciliation report types.
//!
//! These are contract types: the reconciliation engine produces them, the
//! workflow persists them as artifacts, and the audit log embeds their
//! summaries. The engine itself lives in `apc-reconcile`.

use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a reconciliation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckSeverity {
    /// A failure blocks the package.
    Block,
    /// A failure downgrades the package to WARN.
    Warn,
    /// Informational only.
    Info,
}

/// Overall reconciliation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Every check passed.
    Pass,
    /// At least one WARN check failed; no BLOCK failures.
    Warn,
    /// At least one BLOCK check failed.
    Fail,
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Warn => write!(f, "WARN"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of a single reconciliation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckResult {
    /// Stable check identifier (`A1`..`A7`, `B1`, `B2`, `D1`).
    pub check_id: String,
    /// Severity class of the check.
    pub severity: CheckSeverity,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Machine-readable evidence (missing lists, mismatch pairs, ...).
    #[serde(default)]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

/// Aggregate counts over a report's checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CheckSummary {
    /// Number of checks that passed.
    pub passed_checks: u32,
    /// Number of checks emitted.
    pub total_checks: u32,
    /// Number of failed BLOCK checks.
    pub blocking_issues: u32,
    /// Number of failed WARN checks.
    pub warnings: u32,
}

/// Full reconciliation report for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReconciliationReport {
    /// Lower-case feedlot key the package belongs to.
    pub feedlot_key: String,
    /// Overall verdict.
    pub status: ReconciliationStatus,
    /// Every check, in stable emission order regardless of which fired.
    pub checks: Vec<CheckResult>,
    /// Aggregate counts.
    pub summary: CheckSummary,
    /// Invoices matched to statement references.
    pub matched_invoices: u32,
    /// Invoices the statement expects.
    pub expected_invoices: u32,
    /// Sum of resolved invoice totals, when resolvable.
    pub total_invoice_sum: Option<Decimal>,
    /// Family-specific statement grand total used by A6.
    pub statement_total_reference: Option<Decimal>,
    /// Where the statement grand total came from.
    pub statement_total_source: String,
}

impl ReconciliationReport {
    /// Look up a check by id.
    #[must_use]
    pub fn check(&self, check_id: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check_id == check_id)
    }

    /// True when no BLOCK check failed.
    #[must_use]
    pub fn blocking_clean(&self) -> bool {
        self.summary.blocking_issues == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_lookup_by_id() {
        let report = ReconciliationReport {
            feedlot_key: "bovina".into(),
            status: ReconciliationStatus::Pass,
            checks: vec![CheckResult {
                check_id: "A1".into(),
                severity: CheckSeverity::Block,
                passed: true,
                message: "ok".into(),
                evidence: BTreeMap::new(),
            }],
            summary: CheckSummary {
                passed_checks: 1,
                total_checks: 1,
                blocking_issues: 0,
                warnings: 0,
            },
            matched_invoices: 2,
            expected_invoices: 2,
            total_invoice_sum: None,
            statement_total_reference: None,
            statement_total_source: String::new(),
        };
        assert!(report.check("A1").is_some());
        assert!(report.check("D1").is_none());
        assert!(report.blocking_clean());
    }
}
