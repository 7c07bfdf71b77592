// SPDX-License-Identifier: MIT OR Apache-2.0
//! Progress log records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline step a progress line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    /// PDF page categorization.
    SplitPdf,
    /// Statement extraction.
    ExtractStatement,
    /// Invoice extraction.
    ExtractInvoice,
    /// Per-invoice validation.
    Validate,
    /// Package reconciliation.
    Reconcile,
    /// GL mapping overlay.
    Mapping,
    /// ERP payload construction.
    Payload,
    /// ERP posting.
    Posting,
}

impl ProgressStep {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SplitPdf => "split_pdf",
            Self::ExtractStatement => "extract_statement",
            Self::ExtractInvoice => "extract_invoice",
            Self::Validate => "validate",
            Self::Reconcile => "reconcile",
            Self::Mapping => "mapping",
            Self::Payload => "payload",
            Self::Posting => "posting",
        }
    }
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProgressStep {
    type Err = crate::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "split_pdf" => Ok(Self::SplitPdf),
            "extract_statement" => Ok(Self::ExtractStatement),
            "extract_invoice" => Ok(Self::ExtractInvoice),
            "validate" => Ok(Self::Validate),
            "reconcile" => Ok(Self::Reconcile),
            "mapping" => Ok(Self::Mapping),
            "payload" => Ok(Self::Payload),
            "posting" => Ok(Self::Posting),
            other => Err(crate::UnknownStatus(other.to_string())),
        }
    }
}

/// One line in a package's append-only progress log.
///
/// Ordinals are assigned server-side, monotonically per package, so parallel
/// extraction fan-outs can be re-sequenced for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    /// Owning package.
    pub package_id: String,
    /// Monotone per-package sequence number.
    pub ordinal: u64,
    /// Step the line belongs to.
    pub step: ProgressStep,
    /// Human-readable message.
    pub message: String,
    /// When the line was written (UTC).
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_strings_round_trip() {
        for step in [
            ProgressStep::SplitPdf,
            ProgressStep::ExtractStatement,
            ProgressStep::ExtractInvoice,
            ProgressStep::Validate,
            ProgressStep::Reconcile,
            ProgressStep::Mapping,
            ProgressStep::Payload,
            ProgressStep::Posting,
        ] {
            assert_eq!(step.as_str().parse::<ProgressStep>().unwrap(), step);
        }
    }
}
