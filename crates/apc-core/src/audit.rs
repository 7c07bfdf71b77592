// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit event records.
//!
//! Every stage transition, warning, and error in the pipeline lands in the
//! append-only audit log. Event ids are generated inside activities (never in
//! workflow bodies) or derived deterministically so replay duplicates stay
//! rare.

use crate::refs::DataReference;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    /// Successful stage or informational note.
    Info,
    /// Business warning (reconciliation WARN, missing mapping, ...).
    Warn,
    /// Error that failed a stage or the workflow.
    Error,
}

impl AuditSeverity {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of an audit event: which pipeline concern emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Workflow lifecycle (started, completed, failed, cancelled).
    Workflow,
    /// Document extraction.
    Extraction,
    /// Per-invoice validation.
    Validation,
    /// Package reconciliation.
    Reconciliation,
    /// GL mapping and dimension evaluation.
    Mapping,
    /// ERP payload build / posting.
    Posting,
    /// User action (confirmation, rejection, override).
    User,
    /// Anything else (configuration change, internal error).
    System,
}

impl AuditKind {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Extraction => "extraction",
            Self::Validation => "validation",
            Self::Reconciliation => "reconciliation",
            Self::Mapping => "mapping",
            Self::Posting => "posting",
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single persisted audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AuditEvent {
    /// Globally unique event id.
    pub event_id: String,
    /// When the event occurred (UTC).
    pub timestamp: DateTime<Utc>,
    /// Which concern emitted the event.
    pub kind: AuditKind,
    /// Severity.
    pub severity: AuditSeverity,
    /// Associated package, if any.
    pub package_id: Option<String>,
    /// Associated invoice number, if any.
    pub invoice_number: Option<String>,
    /// Owning workflow id, if emitted from a workflow activity.
    pub workflow_id: Option<String>,
    /// Activity that emitted the event, if any.
    pub activity_name: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Structured details (deterministic key order).
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Who or what performed the action (`system`, a user id, ...).
    pub actor: String,
    /// Related artifact references.
    #[serde(default)]
    pub artifact_refs: Vec<DataReference>,
}

/// Fluent constructor for [`AuditEvent`].
///
/// ```
/// use apc_core::audit::{AuditEventBuilder, AuditKind, AuditSeverity};
///
/// let ev = AuditEventBuilder::new(AuditKind::Extraction, "invoice 13330 extracted")
///     .severity(AuditSeverity::Info)
///     .package_id("pkg-1")
///     .invoice_number("13330")
///     .build("evt-1", chrono::Utc::now());
/// assert_eq!(ev.kind, AuditKind::Extraction);
/// ```
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    kind: AuditKind,
    severity: AuditSeverity,
    message: String,
    package_id: Option<String>,
    invoice_number: Option<String>,
    workflow_id: Option<String>,
    activity_name: Option<String>,
    details: BTreeMap<String, serde_json::Value>,
    actor: String,
    artifact_refs: Vec<DataReference>,
}

impl AuditEventBuilder {
    /// Start a builder with the given kind and message. Severity defaults to
    /// `Info` and actor to `system`.
    #[must_use]
    pub fn new(kind: AuditKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: AuditSeverity::Info,
            message: message.into(),
            package_id: None,
            invoice_number: None,
            workflow_id: None,
            activity_name: None,
            details: BTreeMap::new(),
            actor: "system".into(),
            artifact_refs: Vec::new(),
        }
    }

    /// Set the severity.
    #[must_use]
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a package id.
    #[must_use]
    pub fn package_id(mut self, id: impl Into<String>) -> Self {
        self.package_id = Some(id.into());
        self
    }

    /// Attach an invoice number.
    #[must_use]
    pub fn invoice_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self
    }

    /// Attach the owning workflow id.
    #[must_use]
    pub fn workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    /// Attach the emitting activity name.
    #[must_use]
    pub fn activity_name(mut self, name: impl Into<String>) -> Self {
        self.activity_name = Some(name.into());
        self
    }

    /// Add one structured detail entry.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Set the actor.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Attach an artifact reference.
    #[must_use]
    pub fn artifact(mut self, r: DataReference) -> Self {
        self.artifact_refs.push(r);
        self
    }

    /// Finish with the caller-supplied id and timestamp.
    ///
    /// Ids and timestamps come from the caller so that activities can derive
    /// them deterministically where possible.
    #[must_use]
    pub fn build(self, event_id: impl Into<String>, timestamp: DateTime<Utc>) -> AuditEvent {
        AuditEvent {
            event_id: event_id.into(),
            timestamp,
            kind: self.kind,
            severity: self.severity,
            package_id: self.package_id,
            invoice_number: self.invoice_number,
            workflow_id: self.workflow_id,
            activity_name: self.activity_name,
            message: self.message,
            details: self.details,
            actor: self.actor,
            artifact_refs: self.artifact_refs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let ev = AuditEventBuilder::new(AuditKind::Workflow, "started")
            .build("e1", Utc::now());
        assert_eq!(ev.severity, AuditSeverity::Info);
        assert_eq!(ev.actor, "system");
        assert!(ev.details.is_empty());
    }

    #[test]
    fn details_keep_deterministic_order() {
        let ev = AuditEventBuilder::new(AuditKind::Mapping, "m")
            .detail("zeta", serde_json::json!(1))
            .detail("alpha", serde_json::json!(2))
            .build("e2", Utc::now());
        let keys: Vec<_> = ev.details.keys().cloned().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn kind_and_severity_wire_strings() {
        assert_eq!(AuditKind::Reconciliation.as_str(), "reconciliation");
        assert_eq!(AuditSeverity::Warn.as_str(), "WARN");
    }
}
