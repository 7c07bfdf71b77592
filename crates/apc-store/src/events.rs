// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only event logs: progress and audit.

use crate::{Store, StoreError, StoreResult, now_text, parse_timestamp};
use apc_core::audit::{AuditEvent, AuditKind, AuditSeverity};
use apc_core::progress::{ProgressEvent, ProgressStep};
use rusqlite::params;
use std::str::FromStr;
use tracing::debug;

/// Filter for audit readback. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Restrict to one event kind.
    pub kind: Option<AuditKind>,
    /// Restrict to one package.
    pub package_id: Option<String>,
    /// Inclusive lower bound on the timestamp.
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    /// Inclusive upper bound on the timestamp.
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    /// Maximum rows returned (default 100).
    pub limit: Option<u32>,
}

impl Store {
    /// Append a progress line for a package.
    ///
    /// The ordinal is assigned inside the transaction so concurrent writers
    /// (bounded fan-outs) still get a dense, monotone sequence per package.
    pub fn log_progress(
        &self,
        package_id: &str,
        step: ProgressStep,
        message: &str,
    ) -> StoreResult<u64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ordinal: u64 = tx.query_row(
            "SELECT COALESCE(MAX(ordinal), 0) + 1 FROM progress_events WHERE package_id = ?1",
            params![package_id],
            |row| row.get::<_, i64>(0),
        )? as u64;
        tx.execute(
            "INSERT INTO progress_events (package_id, ordinal, step, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![package_id, ordinal as i64, step.as_str(), message, now_text()],
        )?;
        tx.commit()?;
        debug!(target: "ap.store", package_id, ordinal, step = %step, "progress");
        Ok(ordinal)
    }

    /// Read a package's progress log in ordinal order.
    pub fn progress(&self, package_id: &str) -> StoreResult<Vec<ProgressEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ordinal, step, message, created_at
             FROM progress_events WHERE package_id = ?1 ORDER BY ordinal",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![package_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(|(ordinal, step, message, created)| {
                Ok(ProgressEvent {
                    package_id: package_id.to_string(),
                    ordinal: ordinal as u64,
                    step: ProgressStep::from_str(&step)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    message,
                    created_at: parse_timestamp(&created)?,
                })
            })
            .collect()
    }

    /// Append an audit event.
    ///
    /// The log is append-only; a duplicate `event_id` (workflow replay) is
    /// treated as success and leaves the original row untouched.
    pub fn append_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        let details =
            serde_json::to_string(&event.details).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let refs = serde_json::to_string(&event.artifact_refs)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn().execute(
            "INSERT INTO audit_events
                 (event_id, timestamp, kind, severity, package_id, invoice_number,
                  workflow_id, activity_name, message, details, actor, artifact_refs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(event_id) DO NOTHING",
            params![
                event.event_id,
                event.timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
                event.kind.as_str(),
                event.severity.as_str(),
                event.package_id,
                event.invoice_number,
                event.workflow_id,
                event.activity_name,
                event.message,
                details,
                event.actor,
                refs,
            ],
        )?;
        Ok(())
    }

    /// Query audit events, newest last.
    pub fn audit_events(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEvent>> {
        let mut sql = String::from(
            "SELECT event_id, timestamp, kind, severity, package_id, invoice_number,
                    workflow_id, activity_name, message, details, actor, artifact_refs
             FROM audit_events WHERE 1 = 1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            args.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(pkg) = &filter.package_id {
            sql.push_str(" AND package_id = ?");
            args.push(Box::new(pkg.clone()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(since.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(until.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()));
        }
        sql.push_str(" ORDER BY timestamp LIMIT ?");
        args.push(Box::new(filter.limit.unwrap_or(100)));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let raw: Vec<_> = stmt
            .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(11)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(
                |(id, ts, kind, severity, pkg, inv, wf, act, message, details, actor, refs)| {
                    Ok(AuditEvent {
                        event_id: id,
                        timestamp: parse_timestamp(&ts)?,
                        kind: parse_kind(&kind)?,
                        severity: parse_severity(&severity)?,
                        package_id: pkg,
                        invoice_number: inv,
                        workflow_id: wf,
                        activity_name: act,
                        message,
                        details: serde_json::from_str(&details)
                            .map_err(|e| StoreError::Corrupt(format!("bad details: {e}")))?,
                        actor,
                        artifact_refs: serde_json::from_str(&refs)
                            .map_err(|e| StoreError::Corrupt(format!("bad artifact_refs: {e}")))?,
                    })
                },
            )
            .collect()
    }
}

fn parse_kind(s: &str) -> StoreResult<AuditKind> {
    match s {
        "workflow" => Ok(AuditKind::Workflow),
        "extraction" => Ok(AuditKind::Extraction),
        "validation" => Ok(AuditKind::Validation),
        "reconciliation" => Ok(AuditKind::Reconciliation),
        "mapping" => Ok(AuditKind::Mapping),
        "posting" => Ok(AuditKind::Posting),
        "user" => Ok(AuditKind::User),
        "system" => Ok(AuditKind::System),
        other => Err(StoreError::Corrupt(format!("unknown audit kind: {other}"))),
    }
}

fn parse_severity(s: &str) -> StoreResult<AuditSeverity> {
    match s {
        "INFO" => Ok(AuditSeverity::Info),
        "WARN" => Ok(AuditSeverity::Warn),
        "ERROR" => Ok(AuditSeverity::Error),
        other => Err(StoreError::Corrupt(format!("unknown severity: {other}"))),
    }
}
