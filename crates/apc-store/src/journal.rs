// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow execution journal.
//!
//! The durable engine records every activity invocation here, keyed by
//! `(workflow_id, seq)` where `seq` is the deterministic program-order index
//! of the call site. On replay, a completed record short-circuits the
//! activity and returns its recorded result; a terminally failed record
//! replays its recorded error. This is what makes re-running a workflow after
//! a worker crash produce identical effects.

use crate::{Store, StoreError, StoreResult, now_text, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use std::str::FromStr;

/// State of a workflow execution row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// The workflow has started and may be mid-flight or crashed.
    Running,
    /// The workflow returned a result.
    Completed,
    /// The workflow failed terminally.
    Failed,
    /// The workflow was cancelled.
    Cancelled,
}

impl WorkflowState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for WorkflowState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(StoreError::Corrupt(format!("unknown workflow state: {other}"))),
        }
    }
}

/// A row in `workflow_executions`.
#[derive(Debug, Clone)]
pub struct WorkflowRecord {
    /// Workflow id (the package id, or `package_id:invoice_number`).
    pub workflow_id: String,
    /// Workflow type name.
    pub workflow_type: String,
    /// Serialized input.
    pub input: String,
    /// Current state.
    pub state: WorkflowState,
    /// Serialized result, when completed.
    pub result: Option<String>,
    /// Error message, when failed.
    pub error: Option<String>,
}

/// Terminal outcome of a journaled activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// The activity completed; the payload is its serialized result.
    Completed(String),
    /// The activity failed terminally.
    Failed {
        /// Stable error code (`AP-...`).
        code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// A row in `activity_executions`.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    /// Owning workflow.
    pub workflow_id: String,
    /// Program-order call index.
    pub seq: u32,
    /// Activity name, recorded for drift detection.
    pub activity_name: String,
    /// Terminal outcome.
    pub outcome: ActivityOutcome,
    /// Attempts consumed.
    pub attempts: u32,
    /// Last heartbeat, when the activity reported any.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl Store {
    /// Register a workflow execution, tolerating an existing row from a
    /// previous (crashed) run. Returns the current record.
    pub fn begin_workflow(
        &self,
        workflow_id: &str,
        workflow_type: &str,
        input: &str,
    ) -> StoreResult<WorkflowRecord> {
        let now = now_text();
        self.conn().execute(
            "INSERT INTO workflow_executions
                 (workflow_id, workflow_type, input, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'RUNNING', ?4, ?4)
             ON CONFLICT(workflow_id) DO NOTHING",
            params![workflow_id, workflow_type, input, now],
        )?;
        self.workflow(workflow_id)?
            .ok_or_else(|| StoreError::NotFound(format!("workflow {workflow_id}")))
    }

    /// Read a workflow execution row.
    pub fn workflow(&self, workflow_id: &str) -> StoreResult<Option<WorkflowRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT workflow_id, workflow_type, input, status, result, error
                 FROM workflow_executions WHERE workflow_id = ?1",
                params![workflow_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, ty, input, status, result, error)| {
            Ok(WorkflowRecord {
                workflow_id: id,
                workflow_type: ty,
                input,
                state: WorkflowState::from_str(&status)?,
                result,
                error,
            })
        })
        .transpose()
    }

    /// Mark a workflow's terminal state.
    pub fn finish_workflow(
        &self,
        workflow_id: &str,
        state: WorkflowState,
        result: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE workflow_executions
             SET status = ?2, result = ?3, error = ?4, updated_at = ?5
             WHERE workflow_id = ?1",
            params![workflow_id, state.as_str(), result, error, now_text()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("workflow {workflow_id}")));
        }
        Ok(())
    }

    /// Look up the journal entry for one activity call site.
    pub fn journal_lookup(
        &self,
        workflow_id: &str,
        seq: u32,
    ) -> StoreResult<Option<ActivityRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT activity_name, status, attempts, result, error_code, error_message,
                        last_heartbeat_at
                 FROM activity_executions WHERE workflow_id = ?1 AND seq = ?2",
                params![workflow_id, seq],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, status, attempts, result, code, message, heartbeat)) = row else {
            return Ok(None);
        };
        let outcome = match status.as_str() {
            // Heartbeat-only rows are not terminal records.
            "RUNNING" => return Ok(None),
            "COMPLETED" => ActivityOutcome::Completed(result.unwrap_or_default()),
            "FAILED" => ActivityOutcome::Failed {
                code: code.unwrap_or_default(),
                message: message.unwrap_or_default(),
            },
            other => {
                return Err(StoreError::Corrupt(format!(
                    "unknown activity status: {other}"
                )));
            }
        };
        Ok(Some(ActivityRecord {
            workflow_id: workflow_id.to_string(),
            seq,
            activity_name: name,
            outcome,
            attempts,
            last_heartbeat_at: heartbeat.map(|h| parse_timestamp(&h)).transpose()?,
        }))
    }

    /// Record an activity heartbeat.
    pub fn journal_heartbeat(&self, workflow_id: &str, seq: u32) -> StoreResult<()> {
        // Heartbeats for still-running activities have no journal row yet;
        // keep them in a running row so operators can observe liveness.
        let now = now_text();
        self.conn().execute(
            "INSERT INTO activity_executions
                 (workflow_id, seq, activity_name, status, attempts, last_heartbeat_at,
                  created_at, updated_at)
             VALUES (?1, ?2, '', 'RUNNING', 0, ?3, ?3, ?3)
             ON CONFLICT(workflow_id, seq) DO UPDATE SET
                 last_heartbeat_at = excluded.last_heartbeat_at,
                 updated_at = excluded.updated_at",
            params![workflow_id, seq, now],
        )?;
        Ok(())
    }

    /// Record a terminal activity outcome, promoting a running heartbeat row
    /// when one exists. Terminal records are first-write-wins: a replay that
    /// races the original write leaves the recorded outcome untouched.
    pub fn journal_finalize(
        &self,
        workflow_id: &str,
        seq: u32,
        activity_name: &str,
        outcome: &ActivityOutcome,
        attempts: u32,
    ) -> StoreResult<()> {
        let now = now_text();
        let (status, result, code, message) = match outcome {
            ActivityOutcome::Completed(result) => {
                ("COMPLETED", Some(result.as_str()), None, None)
            }
            ActivityOutcome::Failed { code, message } => {
                ("FAILED", None, Some(code.as_str()), Some(message.as_str()))
            }
        };
        self.conn().execute(
            "INSERT INTO activity_executions
                 (workflow_id, seq, activity_name, status, attempts, result,
                  error_code, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(workflow_id, seq) DO UPDATE SET
                 activity_name = excluded.activity_name,
                 status = excluded.status,
                 attempts = excluded.attempts,
                 result = excluded.result,
                 error_code = excluded.error_code,
                 error_message = excluded.error_message,
                 updated_at = excluded.updated_at
             WHERE activity_executions.status = 'RUNNING'",
            params![workflow_id, seq, activity_name, status, attempts, result, code, message, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_workflow_tolerates_existing_row() {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow("pkg-1", "ap_package", "{}").unwrap();
        let again = store.begin_workflow("pkg-1", "ap_package", "{}").unwrap();
        assert_eq!(again.state, WorkflowState::Running);
    }

    #[test]
    fn journal_replays_first_completed_record() {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow("pkg-1", "ap_package", "{}").unwrap();
        let first = ActivityOutcome::Completed("{\"pages\":3}".into());
        store
            .journal_finalize("pkg-1", 0, "split_pdf", &first, 1)
            .unwrap();
        // A racing duplicate must not overwrite the recorded result.
        let second = ActivityOutcome::Completed("{\"pages\":99}".into());
        store
            .journal_finalize("pkg-1", 0, "split_pdf", &second, 1)
            .unwrap();
        let rec = store.journal_lookup("pkg-1", 0).unwrap().unwrap();
        assert_eq!(rec.outcome, first);
        assert_eq!(rec.activity_name, "split_pdf");
    }

    #[test]
    fn journal_records_terminal_failures() {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow("pkg-1", "ap_package", "{}").unwrap();
        store
            .journal_finalize(
                "pkg-1",
                3,
                "extract_invoice",
                &ActivityOutcome::Failed {
                    code: "AP-D002".into(),
                    message: "schema".into(),
                },
                5,
            )
            .unwrap();
        let rec = store.journal_lookup("pkg-1", 3).unwrap().unwrap();
        assert!(matches!(rec.outcome, ActivityOutcome::Failed { .. }));
        assert_eq!(rec.attempts, 5);
    }

    #[test]
    fn heartbeat_then_finalize() {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow("pkg-1", "ap_package", "{}").unwrap();
        store.journal_heartbeat("pkg-1", 2).unwrap();
        // A running heartbeat row is not a terminal record.
        assert!(store.journal_lookup("pkg-1", 2).unwrap().is_none());
        store
            .journal_finalize(
                "pkg-1",
                2,
                "extract_statement",
                &ActivityOutcome::Completed("{}".into()),
                2,
            )
            .unwrap();
        let rec = store.journal_lookup("pkg-1", 2).unwrap().unwrap();
        assert!(matches!(rec.outcome, ActivityOutcome::Completed(_)));
        assert!(rec.last_heartbeat_at.is_some());
    }

    #[test]
    fn finish_workflow_sets_state() {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow("pkg-1", "ap_package", "{}").unwrap();
        store
            .finish_workflow("pkg-1", WorkflowState::Completed, Some("{}"), None)
            .unwrap();
        let rec = store.workflow("pkg-1").unwrap().unwrap();
        assert_eq!(rec.state, WorkflowState::Completed);
        assert_eq!(rec.result.as_deref(), Some("{}"));
    }
}
