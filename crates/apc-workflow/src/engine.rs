// SPDX-License-Identifier: MIT OR Apache-2.0
//! The durable execution engine.
//!
//! A [`WorkflowContext`] hands out monotonically numbered activity slots.
//! Each `execute` call first consults the journal: a recorded outcome for
//! `(workflow_id, seq)` replays without running anything, which is what
//! makes a restarted workflow converge on the same effects as an
//! uninterrupted one. Live executions run under the activity's timeout and
//! heartbeat policy, retrying transient failures with bounded backoff.

use crate::cancel::CancellationToken;
use crate::extract::{Extractor, PdfSplitter};
use crate::retry::RetryPolicy;
use crate::WorkflowError;
use apc_artifact::ArtifactStore;
use apc_coding::SuspenseConfig;
use apc_entity::{ScoringWeights, VendorDirectory};
use apc_erp::ErpClient;
use apc_error::{ApError, ApResult, ErrorClass};
use apc_store::{ActivityOutcome, Store};
use apc_vendor::MatchingConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shared dependencies injected into activities.
///
/// Constructed per worker; no module-level mutable state anywhere in the
/// core. Everything here is either immutable configuration or an
/// internally synchronized handle.
#[derive(Clone)]
pub struct ActivityDeps {
    /// Relational store.
    pub store: Store,
    /// Artifact store.
    pub artifacts: ArtifactStore,
    /// PDF page categorizer.
    pub splitter: Arc<dyn PdfSplitter>,
    /// Document extractor.
    pub extractor: Arc<dyn Extractor>,
    /// ERP client.
    pub erp: Arc<dyn ErpClient>,
    /// Vendor-existence lookup for entity scoring, when available.
    pub vendor_directory: Option<Arc<dyn VendorDirectory>>,
    /// Entity-resolver weights.
    pub entity_weights: ScoringWeights,
    /// Vendor-matching config.
    pub vendor_matching: MatchingConfig,
    /// Suspense account config.
    pub suspense: SuspenseConfig,
    /// Tenant id for alias scoping.
    pub customer_id: String,
}

impl std::fmt::Debug for ActivityDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityDeps")
            .field("customer_id", &self.customer_id)
            .finish_non_exhaustive()
    }
}

/// Handle passed into a running activity: heartbeating and cancellation.
pub struct ActivityContext {
    workflow_id: String,
    seq: u32,
    attempt: u32,
    store: Store,
    cancel: CancellationToken,
    heartbeat_tx: watch::Sender<Instant>,
}

impl ActivityContext {
    /// Record a heartbeat. Fails with [`ApError::Cancelled`] when the
    /// workflow has been cancelled, so long activities can bail between
    /// logical steps.
    pub fn heartbeat(&self, message: &str) -> ApResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ApError::Cancelled);
        }
        let _ = self.heartbeat_tx.send(Instant::now());
        // Liveness bookkeeping is best-effort; a busy database must not fail
        // the activity.
        let _ = self.store.journal_heartbeat(&self.workflow_id, self.seq);
        debug!(
            target: "ap.workflow",
            workflow_id = %self.workflow_id,
            seq = self.seq,
            message,
            "heartbeat"
        );
        Ok(())
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Error out when cancellation has been requested.
    pub fn check_cancelled(&self) -> ApResult<()> {
        if self.cancel.is_cancelled() {
            Err(ApError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Current attempt number, 1-based.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Per-workflow execution context.
///
/// Single-threaded cooperative: one workflow instance drives its activities
/// in program order, so the sequence counter alone identifies a call site
/// across replays.
pub struct WorkflowContext {
    workflow_id: String,
    store: Store,
    seq: AtomicU32,
    retries: AtomicU32,
    cancel: CancellationToken,
    limiter: Option<Arc<tokio::sync::Semaphore>>,
}

impl WorkflowContext {
    /// Build a context for a workflow id. The caller must have registered
    /// the workflow via [`Store::begin_workflow`].
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, store: Store, cancel: CancellationToken) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            store,
            seq: AtomicU32::new(0),
            retries: AtomicU32::new(0),
            cancel,
            limiter: None,
        }
    }

    /// Gate live activity executions on a shared semaphore (the per-worker
    /// activity-concurrency cap). Replayed activities never take a permit.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Option<Arc<tokio::sync::Semaphore>>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Activity slots consumed so far (executed or replayed).
    #[must_use]
    pub fn activity_count(&self) -> u32 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Retry attempts beyond the first, across all activities.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// The owning workflow id.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// The workflow's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Deterministic workflow time: journaled on first execution, replayed
    /// afterwards. Workflow bodies never read the system clock directly.
    pub async fn now(&self) -> Result<DateTime<Utc>, WorkflowError> {
        self.execute("workflow_now", &RetryPolicy::db_write(), |_ctx| async {
            Ok(Utc::now())
        })
        .await
    }

    /// Run (or replay) one activity.
    ///
    /// The closure is invoked once per live attempt with a fresh
    /// [`ActivityContext`]; it must be safe to re-invoke, which every
    /// activity in this crate is (idempotent persistence, content-addressed
    /// artifacts).
    pub async fn execute<O, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        run: F,
    ) -> Result<O, WorkflowError>
    where
        O: Serialize + DeserializeOwned,
        F: Fn(ActivityContext) -> Fut,
        Fut: Future<Output = ApResult<O>>,
    {
        let seq = self.next_seq();

        if let Some(record) = self.store.journal_lookup(&self.workflow_id, seq)? {
            if record.activity_name != name {
                return Err(WorkflowError::Corrupt {
                    activity: name.to_string(),
                    detail: format!(
                        "journal slot {seq} holds '{}'; workflow code drifted from history",
                        record.activity_name
                    ),
                });
            }
            return match record.outcome {
                ActivityOutcome::Completed(json) => {
                    debug!(
                        target: "ap.workflow",
                        workflow_id = %self.workflow_id,
                        seq,
                        activity = name,
                        "replaying recorded result"
                    );
                    serde_json::from_str(&json).map_err(|e| WorkflowError::Corrupt {
                        activity: name.to_string(),
                        detail: e.to_string(),
                    })
                }
                ActivityOutcome::Failed { code, message } => Err(WorkflowError::ActivityFailed {
                    activity: name.to_string(),
                    code,
                    message,
                }),
            };
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            let result = {
                // Permit covers only the live execution, not backoff sleeps.
                let _permit = match &self.limiter {
                    Some(limiter) => Some(
                        Arc::clone(limiter)
                            .acquire_owned()
                            .await
                            .map_err(|_| WorkflowError::Cancelled)?,
                    ),
                    None => None,
                };

                let (heartbeat_tx, heartbeat_rx) = watch::channel(Instant::now());
                let actx = ActivityContext {
                    workflow_id: self.workflow_id.clone(),
                    seq,
                    attempt,
                    store: self.store.clone(),
                    cancel: self.cancel.clone(),
                    heartbeat_tx,
                };
                debug!(
                    target: "ap.workflow",
                    workflow_id = %self.workflow_id,
                    seq,
                    activity = name,
                    attempt,
                    "starting activity"
                );

                match policy.heartbeat_timeout {
                    Some(window) => {
                        run_with_heartbeat(run(actx), heartbeat_rx, window, policy.start_to_close)
                            .await
                    }
                    None => match tokio::time::timeout(policy.start_to_close, run(actx)).await {
                        Ok(result) => result,
                        Err(_) => Err(ApError::transient(format!(
                            "activity '{name}' exceeded its start-to-close timeout"
                        ))),
                    },
                }
            };

            match result {
                Ok(value) => {
                    let json = serde_json::to_string(&value).map_err(|e| {
                        WorkflowError::Corrupt {
                            activity: name.to_string(),
                            detail: e.to_string(),
                        }
                    })?;
                    self.store.journal_finalize(
                        &self.workflow_id,
                        seq,
                        name,
                        &ActivityOutcome::Completed(json),
                        attempt,
                    )?;
                    return Ok(value);
                }
                Err(error) if error.class() == ErrorClass::Cancelled => {
                    // Cancellation is not journaled: a resumed run should
                    // re-execute this slot.
                    return Err(WorkflowError::Cancelled);
                }
                Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                    self.retries.fetch_add(1, Ordering::SeqCst);
                    let delay = policy.delay_after(attempt, &error);
                    warn!(
                        target: "ap.workflow",
                        workflow_id = %self.workflow_id,
                        activity = name,
                        attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    warn!(
                        target: "ap.workflow",
                        workflow_id = %self.workflow_id,
                        activity = name,
                        attempt,
                        error = %error,
                        "activity failed terminally"
                    );
                    self.store.journal_finalize(
                        &self.workflow_id,
                        seq,
                        name,
                        &ActivityOutcome::Failed {
                            code: error.code().to_string(),
                            message: error.to_string(),
                        },
                        attempt,
                    )?;
                    return Err(WorkflowError::from_activity(name, &error));
                }
            }
        }
    }
}

/// Drive an activity future while enforcing a heartbeat window: the attempt
/// fails when no heartbeat lands within `window`, or when `start_to_close`
/// elapses.
async fn run_with_heartbeat<O>(
    fut: impl Future<Output = ApResult<O>>,
    heartbeat_rx: watch::Receiver<Instant>,
    window: std::time::Duration,
    start_to_close: std::time::Duration,
) -> ApResult<O> {
    let deadline = Instant::now() + start_to_close;
    tokio::pin!(fut);
    loop {
        let last = *heartbeat_rx.borrow();
        let next_check = (last + window).min(deadline);
        tokio::select! {
            result = &mut fut => return result,
            () = tokio::time::sleep_until(next_check) => {
                if Instant::now() >= deadline {
                    return Err(ApError::transient(
                        "activity exceeded its start-to-close timeout",
                    ));
                }
                if *heartbeat_rx.borrow() == last {
                    return Err(ApError::transient("activity missed its heartbeat window"));
                }
                // A heartbeat arrived; keep waiting.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn context(workflow_id: &str) -> (Store, WorkflowContext) {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow(workflow_id, "test", "{}").unwrap();
        let ctx = WorkflowContext::new(workflow_id, store.clone(), CancellationToken::new());
        (store, ctx)
    }

    #[tokio::test]
    async fn completed_activities_replay_without_rerunning() {
        let (store, ctx) = context("wf-1");
        let calls = AtomicUsize::new(0);
        let out: u32 = ctx
            .execute("double", &RetryPolicy::db_write(), |_actx| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(21 * 2)
            })
            .await
            .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A fresh context (same workflow id) replays from the journal.
        let replay = WorkflowContext::new("wf-1", store, CancellationToken::new());
        let out: u32 = replay
            .execute("double", &RetryPolicy::db_write(), |_actx| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await
            .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_to_success() {
        let (_store, ctx) = context("wf-2");
        let calls = AtomicUsize::new(0);
        let mut policy = RetryPolicy::db_write();
        policy.initial_delay = std::time::Duration::from_secs(1);
        tokio::time::pause();
        let out: String = ctx
            .execute("flaky", &policy, |_actx| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApError::transient("lock"))
                } else {
                    Ok("done".to_string())
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failures_are_recorded_and_replayed() {
        let (store, ctx) = context("wf-3");
        let err = ctx
            .execute::<u32, _, _>("broken", &RetryPolicy::db_write(), |_actx| async {
                Err(ApError::schema("invoice", "missing number"))
            })
            .await
            .unwrap_err();
        let WorkflowError::ActivityFailed { code, .. } = &err else {
            panic!("expected ActivityFailed, got {err:?}");
        };
        assert_eq!(code, ApError::SCHEMA);

        // Replay returns the recorded failure without re-running.
        let replay = WorkflowContext::new("wf-3", store, CancellationToken::new());
        let err = replay
            .execute::<u32, _, _>("broken", &RetryPolicy::db_write(), |_actx| async { Ok(7) })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ActivityFailed { .. }));
    }

    #[tokio::test]
    async fn journal_drift_is_detected() {
        let (store, ctx) = context("wf-4");
        let _: u32 = ctx
            .execute("first", &RetryPolicy::db_write(), |_actx| async { Ok(1) })
            .await
            .unwrap();
        let replay = WorkflowContext::new("wf-4", store, CancellationToken::new());
        let err = replay
            .execute::<u32, _, _>("renamed", &RetryPolicy::db_write(), |_actx| async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Corrupt { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn cancellation_preempts_new_attempts() {
        let store = Store::open_in_memory().unwrap();
        store.begin_workflow("wf-5", "test", "{}").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = WorkflowContext::new("wf-5", store.clone(), cancel);
        let err = ctx
            .execute::<u32, _, _>("never", &RetryPolicy::db_write(), |_actx| async { Ok(1) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        // Nothing journaled: a resumed run re-executes the slot.
        assert!(store.journal_lookup("wf-5", 0).unwrap().is_none());
    }

    #[tokio::test]
    async fn missed_heartbeats_fail_the_attempt() {
        let (_store, ctx) = context("wf-6");
        let mut policy = RetryPolicy::extraction();
        policy.max_attempts = 1;
        policy.heartbeat_timeout = Some(std::time::Duration::from_millis(20));
        let err = ctx
            .execute::<u32, _, _>("silent", &policy, |_actx| async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(1)
            })
            .await
            .unwrap_err();
        let WorkflowError::ActivityFailed { message, .. } = &err else {
            panic!("expected ActivityFailed, got {err:?}");
        };
        assert!(message.contains("heartbeat"), "{message}");
    }

    #[tokio::test]
    async fn heartbeats_keep_a_slow_activity_alive() {
        let (_store, ctx) = context("wf-7");
        let mut policy = RetryPolicy::extraction();
        policy.heartbeat_timeout = Some(std::time::Duration::from_millis(50));
        let out: u32 = ctx
            .execute("chatty", &policy, |actx| async move {
                for step in 0..5 {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    actx.heartbeat(&format!("step {step}"))?;
                }
                Ok(9)
            })
            .await
            .unwrap();
        assert_eq!(out, 9);
    }

    #[tokio::test]
    async fn workflow_now_is_journaled() {
        let (store, ctx) = context("wf-8");
        let first = ctx.now().await.unwrap();
        let replay = WorkflowContext::new("wf-8", store, CancellationToken::new());
        let second = replay.now().await.unwrap();
        assert_eq!(first, second);
    }
}
