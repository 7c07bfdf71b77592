// SPDX-License-Identifier: MIT OR Apache-2.0
//! Activity implementations.
//!
//! Activities are the only place the pipeline touches the outside world:
//! database, artifact store, extractor, ERP. Each is safe to re-invoke, so the
//! engine can retry and replay freely: persistence is upsert-based,
//! artifacts are content-addressed, and audit ids are derived.

/// Integration activities: entity, vendor, coding, payload.
pub mod integrate;
/// Database persistence activities.
pub mod persist;
/// Package reconciliation activity.
pub mod reconcile;
/// Per-invoice validation activity.
pub mod validate;

/// Derive a deterministic audit event id from its coordinates, so replayed
/// activities insert the same id and the append-only log dedupes.
#[must_use]
pub fn derived_event_id(workflow_id: &str, activity: &str, label: &str) -> String {
    format!("{workflow_id}:{activity}:{label}")
}
