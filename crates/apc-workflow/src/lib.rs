// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-workflow
#![deny(unsafe_code)]
//!
//! Durable workflow layer.
//!
//! Responsibilities:
//! - journal every activity invocation so a re-run replays recorded results
//!   instead of re-executing (crash recovery, idempotent effects)
//! - enforce per-activity-class timeouts, retries with backoff, and
//!   heartbeat liveness for long-running extractions
//! - sequence the package workflow (split -> extract -> validate -> reconcile)
//!   and the per-invoice workflow (resolve -> code -> payload)
//! - propagate cancellation cooperatively and leave rows in `CANCELLED`
//!
//! Workflow bodies are deterministic: no I/O, no wall-clock reads, no random
//! ids. Everything non-deterministic happens inside activities, whose
//! results the journal captures.

/// Activity implementations, grouped the way the pipeline runs them.
pub mod activities;
/// Cancellation primitives.
pub mod cancel;
/// The durable execution engine: contexts, journal replay, retry loop.
pub mod engine;
/// Extraction seams: the PDF splitter and document extractor traits.
pub mod extract;
/// The per-invoice child workflow.
pub mod invoice;
/// The package workflow.
pub mod package;
/// Retry and timeout policies per activity class.
pub mod retry;
/// Worker-side workflow runner.
pub mod runner;
/// Deterministic in-memory extraction fixtures for tests and dry runs.
pub mod testing;

pub use cancel::CancellationToken;
pub use engine::{ActivityContext, ActivityDeps, WorkflowContext};
pub use extract::{Extractor, PageSplit, PdfSplitter};
pub use invoice::{InvoiceStage, InvoiceWorkflowInput, InvoiceWorkflowResult};
pub use package::{PackageWorkflowInput, PackageWorkflowSummary, ReconciliationSummary};
pub use retry::RetryPolicy;
pub use runner::WorkflowRunner;

use apc_error::ApError;

/// Errors surfaced from a workflow run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// An activity exhausted its retries or failed terminally. Carries the
    /// first fatal category's stable code plus a human summary.
    #[error("activity '{activity}' failed [{code}]: {message}")]
    ActivityFailed {
        /// Activity name.
        activity: String,
        /// Stable error code (`AP-...`).
        code: String,
        /// Human-readable summary.
        message: String,
    },

    /// The workflow was cancelled.
    #[error("workflow cancelled")]
    Cancelled,

    /// The journal or workflow bookkeeping failed.
    #[error("journal error: {0}")]
    Journal(#[from] apc_store::StoreError),

    /// A journaled payload failed to (de)serialize; history drift.
    #[error("journal payload corrupt for '{activity}': {detail}")]
    Corrupt {
        /// Activity whose record failed to decode.
        activity: String,
        /// Decode failure detail.
        detail: String,
    },
}

impl WorkflowError {
    /// True when the failure is the cooperative-cancellation path.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn from_activity(activity: &str, error: &ApError) -> Self {
        Self::ActivityFailed {
            activity: activity.to_string(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
