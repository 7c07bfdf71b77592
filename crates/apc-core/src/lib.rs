// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for the AP orchestration core.
//!
//! Every other crate in the workspace consumes these types; none of them
//! perform I/O. Documents travel between activities as [`DataReference`]s,
//! never as bodies.

/// Audit event kinds, severities, and the persisted event record.
pub mod audit;
/// Catalog rows: entity profiles, routing keys, vendor aliases, GL mappings,
/// dimension rules.
pub mod catalog;
/// Canonical extracted documents (statement + invoice).
pub mod document;
/// Progress log records.
pub mod progress;
/// Immutable artifact references.
pub mod refs;
/// Reconciliation report types shared by the engine and the workflows.
pub mod report;

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;

pub use refs::DataReference;

/// Feedlot family variant for an AP package.
///
/// The family selects page-categorization keywords, prompt templates, and the
/// statement grand-total source used by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedlotFamily {
    /// Bovina Feeders packages ("statement of notes" + "feed invoice").
    Bovina,
    /// Mesquite Cattle Feeders packages ("statement of account" + "invoice").
    Mesquite,
}

impl FeedlotFamily {
    /// Keyword that identifies a statement page for this family.
    #[must_use]
    pub fn statement_keyword(&self) -> &'static str {
        match self {
            Self::Bovina => "statement of notes",
            Self::Mesquite => "statement of account",
        }
    }

    /// Keyword that identifies an invoice page for this family.
    #[must_use]
    pub fn invoice_keyword(&self) -> &'static str {
        match self {
            Self::Bovina => "feed invoice",
            Self::Mesquite => "invoice",
        }
    }

    /// Prompt template name for the given document type (`statement` or
    /// `invoice`).
    #[must_use]
    pub fn prompt_name(&self, doc_type: &str) -> String {
        format!("{}_{doc_type}_prompt.txt", self.artifact_key())
    }

    /// Lower-case key used for the per-family artifact directory.
    #[must_use]
    pub fn artifact_key(&self) -> &'static str {
        match self {
            Self::Bovina => "bovina",
            Self::Mesquite => "mesquite",
        }
    }
}

impl fmt::Display for FeedlotFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bovina => write!(f, "BOVINA"),
            Self::Mesquite => write!(f, "MESQUITE"),
        }
    }
}

/// Error returned when parsing an unknown feedlot family string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feedlot family: {0}")]
pub struct UnknownFamily(pub String);

impl FromStr for FeedlotFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BOVINA" => Ok(Self::Bovina),
            "MESQUITE" => Ok(Self::Mesquite),
            other => Err(UnknownFamily(other.to_string())),
        }
    }
}

/// Lifecycle state of an AP package.
///
/// Transitions are append-only and performed by the owning workflow; the
/// storage layer records whatever it is told. `Failed` and `Cancelled` are
/// reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    /// Package row created; nothing extracted yet.
    Started,
    /// Page extraction in flight.
    Extracting,
    /// All pages extracted; no reconciliation performed.
    Extracted,
    /// Per-invoice validation in flight.
    Validating,
    /// Validation complete.
    Validated,
    /// Reconciliation in flight.
    Reconciling,
    /// Reconciliation finished with no failed checks.
    ReconciledPass,
    /// Reconciliation finished with warnings only.
    ReconciledWarn,
    /// Reconciliation finished with at least one blocking failure.
    ReconciledFail,
    /// GL mapping overlay in flight.
    Mapping,
    /// Mapping complete.
    Mapped,
    /// ERP posting in flight.
    Posting,
    /// Posted into the ERP.
    Posted,
    /// Terminal failure.
    Failed,
    /// Cancelled by operator or shutdown.
    Cancelled,
}

impl PackageStatus {
    /// Whether this state admits a transition to `next` under the package
    /// state machine. `Failed` and `Cancelled` are reachable from anywhere.
    #[must_use]
    pub fn can_transition_to(&self, next: PackageStatus) -> bool {
        use PackageStatus::*;
        if matches!(next, Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Started, Extracting)
                | (Extracting, Extracted)
                | (Extracted, Validating)
                | (Validating, Validated)
                | (Validated, Reconciling)
                | (Extracted, Reconciling)
                | (Reconciling, ReconciledPass)
                | (Reconciling, ReconciledWarn)
                | (Reconciling, ReconciledFail)
                | (ReconciledPass, Mapping)
                | (ReconciledWarn, Mapping)
                | (Mapping, Mapped)
                | (Mapped, Posting)
                | (Posting, Posted)
        )
    }

    /// True for states from which no further transition happens.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Failed | Self::Cancelled)
    }

    /// Canonical wire string (`SCREAMING_SNAKE_CASE`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Extracting => "EXTRACTING",
            Self::Extracted => "EXTRACTED",
            Self::Validating => "VALIDATING",
            Self::Validated => "VALIDATED",
            Self::Reconciling => "RECONCILING",
            Self::ReconciledPass => "RECONCILED_PASS",
            Self::ReconciledWarn => "RECONCILED_WARN",
            Self::ReconciledFail => "RECONCILED_FAIL",
            Self::Mapping => "MAPPING",
            Self::Mapped => "MAPPED",
            Self::Posting => "POSTING",
            Self::Posted => "POSTED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(Self::Started),
            "EXTRACTING" => Ok(Self::Extracting),
            "EXTRACTED" => Ok(Self::Extracted),
            "VALIDATING" => Ok(Self::Validating),
            "VALIDATED" => Ok(Self::Validated),
            "RECONCILING" => Ok(Self::Reconciling),
            "RECONCILED_PASS" => Ok(Self::ReconciledPass),
            "RECONCILED_WARN" => Ok(Self::ReconciledWarn),
            "RECONCILED_FAIL" => Ok(Self::ReconciledFail),
            "MAPPING" => Ok(Self::Mapping),
            "MAPPED" => Ok(Self::Mapped),
            "POSTING" => Ok(Self::Posting),
            "POSTED" => Ok(Self::Posted),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// Lifecycle state of a single invoice row within a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Extracted and persisted; not yet validated.
    Extracted,
    /// Passed B1/B2 validation.
    ValidatedPass,
    /// Failed B1/B2 validation.
    ValidatedFail,
    /// GL coding applied.
    Mapped,
    /// Posted into the ERP.
    Posted,
}

impl InvoiceStatus {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "EXTRACTED",
            Self::ValidatedPass => "VALIDATED_PASS",
            Self::ValidatedFail => "VALIDATED_FAIL",
            Self::Mapped => "MAPPED",
            Self::Posted => "POSTED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXTRACTED" => Ok(Self::Extracted),
            "VALIDATED_PASS" => Ok(Self::ValidatedPass),
            "VALIDATED_FAIL" => Ok(Self::ValidatedFail),
            "MAPPED" => Ok(Self::Mapped),
            "POSTED" => Ok(Self::Posted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Strip every character outside `[A-Za-z0-9_-]` from an invoice number so it
/// can be used as an artifact file name.
///
/// Callers resolve collisions by appending `_page_<index+1>`.
#[must_use]
pub fn safe_invoice_number(invoice_number: &str) -> String {
    invoice_number
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_keywords_are_family_specific() {
        assert_eq!(FeedlotFamily::Bovina.statement_keyword(), "statement of notes");
        assert_eq!(FeedlotFamily::Bovina.invoice_keyword(), "feed invoice");
        assert_eq!(FeedlotFamily::Mesquite.statement_keyword(), "statement of account");
        assert_eq!(FeedlotFamily::Mesquite.invoice_keyword(), "invoice");
    }

    #[test]
    fn family_parses_case_insensitively() {
        assert_eq!("bovina".parse::<FeedlotFamily>().unwrap(), FeedlotFamily::Bovina);
        assert_eq!("MESQUITE".parse::<FeedlotFamily>().unwrap(), FeedlotFamily::Mesquite);
        assert!("ANGUS".parse::<FeedlotFamily>().is_err());
    }

    #[test]
    fn package_status_happy_path_transitions() {
        use PackageStatus::*;
        let path = [
            Started, Extracting, Extracted, Validating, Validated, Reconciling,
            ReconciledPass, Mapping, Mapped, Posting, Posted,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn any_state_can_fail_or_cancel() {
        use PackageStatus::*;
        for s in [Started, Extracting, Reconciling, Mapped, Posting] {
            assert!(s.can_transition_to(Failed));
            assert!(s.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!PackageStatus::Started.can_transition_to(PackageStatus::Posted));
        assert!(!PackageStatus::ReconciledFail.can_transition_to(PackageStatus::Mapping));
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            PackageStatus::Started,
            PackageStatus::ReconciledWarn,
            PackageStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<PackageStatus>().unwrap(), s);
        }
        for s in [InvoiceStatus::Extracted, InvoiceStatus::ValidatedFail] {
            assert_eq!(s.as_str().parse::<InvoiceStatus>().unwrap(), s);
        }
    }

    #[test]
    fn safe_invoice_number_strips_punctuation() {
        assert_eq!(safe_invoice_number("13330"), "13330");
        assert_eq!(safe_invoice_number("INV #13/330."), "INV13330");
        assert_eq!(safe_invoice_number("20-3883_a"), "20-3883_a");
    }
}
