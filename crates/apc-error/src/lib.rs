// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-error
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Unified error taxonomy for the AP orchestration core.
//!
//! Every fallible operation in the pipeline classifies its failures into one
//! of these variants, so the workflow retry policy can decide totally:
//! transient errors are retried with backoff, rate limits honor their
//! server-supplied delay, and everything else terminates the attempt
//! immediately. Business warnings (reconciliation WARN, missing mappings,
//! low-confidence resolutions) are **not** errors; they travel in result
//! payloads and audit events.
//!
//! Error codes follow the pattern `AP-X###` where `X` is the category letter:
//!
//! - **T**: transient (retried)
//! - **D**: data (non-retryable)
//! - **V**: validation (non-retryable)
//! - **C**: control (cancellation, shutdown)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classification of an [`ApError`] for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retried under the activity's backoff policy.
    Transient,
    /// Retried after the server-supplied delay.
    RateLimited,
    /// Never retried; fails the activity and surfaces to the workflow.
    Terminal,
    /// Cooperative cancellation; never retried, never audited as an error.
    Cancelled,
}

/// The unified pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum ApError {
    /// Network, database lock, 5xx, or timeout; safe to retry.
    #[error("[{code}] transient i/o failure: {detail}", code = ApError::TRANSIENT_IO)]
    TransientIo {
        /// What failed.
        detail: String,
        /// Underlying cause, when available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The upstream service asked us to slow down.
    #[error("[{code}] rate limited, retry after {retry_after:?}", code = ApError::RATE_LIMITED)]
    RateLimited {
        /// Server-supplied delay to honor before the next attempt.
        retry_after: Duration,
    },

    /// Artifact hash mismatch or referential corruption. Fatal.
    #[error("[{code}] integrity violation: {detail}", code = ApError::INTEGRITY)]
    Integrity {
        /// What was corrupted.
        detail: String,
    },

    /// Extractor output failed document schema validation. Fatal.
    #[error("[{code}] schema validation failed for {document}: {detail}", code = ApError::SCHEMA)]
    SchemaValidation {
        /// Document kind that failed (`statement`, `invoice`, ...).
        document: String,
        /// Validation detail.
        detail: String,
    },

    /// A referenced file or row does not exist. Fatal.
    #[error("[{code}] not found: {what}", code = ApError::NOT_FOUND)]
    NotFound {
        /// What was missing.
        what: String,
    },

    /// A domain rule was violated (unknown feedlot family, illegal status
    /// transition, ...). Fatal.
    #[error("[{code}] validation error: {detail}", code = ApError::VALIDATION)]
    Validation {
        /// Rule that was violated.
        detail: String,
    },

    /// The activity observed cancellation and stopped.
    #[error("[{code}] cancelled", code = ApError::CANCELLED)]
    Cancelled,

    /// Anything unexpected. Treated as terminal.
    #[error("[{code}] internal error: {detail}", code = ApError::INTERNAL)]
    Internal {
        /// Description of the surprise.
        detail: String,
        /// Underlying cause, when available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ApError {
    /// Stable code for [`ApError::TransientIo`].
    pub const TRANSIENT_IO: &'static str = "AP-T001";
    /// Stable code for [`ApError::RateLimited`].
    pub const RATE_LIMITED: &'static str = "AP-T002";
    /// Stable code for [`ApError::Integrity`].
    pub const INTEGRITY: &'static str = "AP-D001";
    /// Stable code for [`ApError::SchemaValidation`].
    pub const SCHEMA: &'static str = "AP-D002";
    /// Stable code for [`ApError::NotFound`].
    pub const NOT_FOUND: &'static str = "AP-D003";
    /// Stable code for [`ApError::Validation`].
    pub const VALIDATION: &'static str = "AP-V001";
    /// Stable code for [`ApError::Cancelled`].
    pub const CANCELLED: &'static str = "AP-C001";
    /// Stable code for [`ApError::Internal`].
    pub const INTERNAL: &'static str = "AP-S001";

    /// Build a transient error from a message.
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::TransientIo {
            detail: detail.into(),
            source: None,
        }
    }

    /// Build a transient error wrapping a cause.
    pub fn transient_with(
        detail: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TransientIo {
            detail: detail.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an integrity error.
    pub fn integrity(detail: impl Into<String>) -> Self {
        Self::Integrity {
            detail: detail.into(),
        }
    }

    /// Build a schema-validation error.
    pub fn schema(document: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaValidation {
            document: document.into(),
            detail: detail.into(),
        }
    }

    /// Build a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Build a validation error.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
        }
    }

    /// Build an internal error from a message.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
            source: None,
        }
    }

    /// Stable code string for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransientIo { .. } => Self::TRANSIENT_IO,
            Self::RateLimited { .. } => Self::RATE_LIMITED,
            Self::Integrity { .. } => Self::INTEGRITY,
            Self::SchemaValidation { .. } => Self::SCHEMA,
            Self::NotFound { .. } => Self::NOT_FOUND,
            Self::Validation { .. } => Self::VALIDATION,
            Self::Cancelled => Self::CANCELLED,
            Self::Internal { .. } => Self::INTERNAL,
        }
    }

    /// Retry classification. Total: every variant maps to exactly one class.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TransientIo { .. } => ErrorClass::Transient,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Integrity { .. }
            | Self::SchemaValidation { .. }
            | Self::NotFound { .. }
            | Self::Validation { .. }
            | Self::Internal { .. } => ErrorClass::Terminal,
        }
    }

    /// True when the retry policy may attempt again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::RateLimited)
    }

    /// Server-mandated delay, for rate-limit errors.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ApError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                what: e.to_string(),
            },
            _ => Self::TransientIo {
                detail: e.to_string(),
                source: Some(Box::new(e)),
            },
        }
    }
}

impl From<serde_json::Error> for ApError {
    fn from(e: serde_json::Error) -> Self {
        Self::SchemaValidation {
            document: "json".into(),
            detail: e.to_string(),
        }
    }
}

/// Convenience result alias used across the workspace.
pub type ApResult<T> = Result<T, ApError>;
