// SPDX-License-Identifier: MIT OR Apache-2.0
//! Worker-side workflow runner.
//!
//! Hosts many concurrent workflow instances (each single-threaded
//! cooperative over its own activities), tracks their cancellation tokens,
//! and owns the terminal bookkeeping: completed runs record their result,
//! failures mark the package `FAILED`, cancellations mark it `CANCELLED`
//! before returning.

use crate::engine::{ActivityDeps, WorkflowContext};
use crate::cancel::CancellationToken;
use crate::invoice::{self, InvoiceWorkflowInput, InvoiceWorkflowResult};
use crate::package::{self, PackageWorkflowInput, PackageWorkflowSummary};
use crate::WorkflowError;
use apc_core::PackageStatus;
use apc_core::audit::{AuditEventBuilder, AuditKind, AuditSeverity};
use apc_store::WorkflowState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Handle to a running package workflow.
pub struct PackageRunHandle {
    /// Workflow id (the package id).
    pub workflow_id: String,
    /// Unique id for this execution attempt of the workflow.
    pub run_id: Uuid,
    /// Cancels this run.
    pub cancel: CancellationToken,
    /// Resolves to the workflow result.
    pub join: JoinHandle<Result<PackageWorkflowSummary, WorkflowError>>,
}

/// Handle to a running invoice workflow.
pub struct InvoiceRunHandle {
    /// Workflow id (`package_id:invoice_number`).
    pub workflow_id: String,
    /// Unique id for this execution attempt of the workflow.
    pub run_id: Uuid,
    /// Cancels this run.
    pub cancel: CancellationToken,
    /// Resolves to the workflow result.
    pub join: JoinHandle<Result<InvoiceWorkflowResult, WorkflowError>>,
}

/// Hosts workflow executions for one worker process.
#[derive(Clone)]
pub struct WorkflowRunner {
    deps: ActivityDeps,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    metrics: Option<apc_telemetry::MetricsCollector>,
    activity_limiter: Option<Arc<tokio::sync::Semaphore>>,
}

impl WorkflowRunner {
    /// Build a runner over the given dependencies.
    #[must_use]
    pub fn new(deps: ActivityDeps) -> Self {
        Self {
            deps,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            metrics: None,
            activity_limiter: None,
        }
    }

    /// Record per-package run metrics into `collector`.
    #[must_use]
    pub fn with_metrics(mut self, collector: apc_telemetry::MetricsCollector) -> Self {
        self.metrics = Some(collector);
        self
    }

    /// Cap concurrent live activity executions across all hosted workflows.
    /// `0` leaves them unbounded (the default).
    #[must_use]
    pub fn with_activity_limit(mut self, limit: u32) -> Self {
        self.activity_limiter = (limit > 0)
            .then(|| Arc::new(tokio::sync::Semaphore::new(limit as usize)));
        self
    }

    /// The runner's shared dependencies.
    #[must_use]
    pub fn deps(&self) -> &ActivityDeps {
        &self.deps
    }

    fn register(&self, workflow_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .expect("runner lock poisoned")
            .insert(workflow_id.to_string(), token.clone());
        token
    }

    fn unregister(tokens: &Arc<Mutex<HashMap<String, CancellationToken>>>, workflow_id: &str) {
        tokens
            .lock()
            .expect("runner lock poisoned")
            .remove(workflow_id);
    }

    /// Cancel one running workflow. Unknown ids are a no-op.
    pub fn cancel(&self, workflow_id: &str) {
        if let Some(token) = self
            .tokens
            .lock()
            .expect("runner lock poisoned")
            .get(workflow_id)
        {
            info!(target: "ap.runner", workflow_id, "cancelling workflow");
            token.cancel();
        }
    }

    /// Cancel every running workflow (worker shutdown).
    pub fn cancel_all(&self) {
        for (workflow_id, token) in self.tokens.lock().expect("runner lock poisoned").iter() {
            info!(target: "ap.runner", workflow_id, "cancelling workflow");
            token.cancel();
        }
    }

    /// Number of workflows currently registered.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tokens.lock().expect("runner lock poisoned").len()
    }

    /// Start a package workflow. Re-submitting an id whose journal already
    /// holds progress resumes it: completed activities replay, the rest run.
    pub fn submit_package(&self, input: PackageWorkflowInput) -> Result<PackageRunHandle, WorkflowError> {
        let workflow_id = input.package_id.clone();
        let input_json = serde_json::to_string(&input).map_err(|e| WorkflowError::Corrupt {
            activity: "submit_package".into(),
            detail: e.to_string(),
        })?;
        self.deps
            .store
            .begin_workflow(&workflow_id, "ap_package", &input_json)?;

        let token = self.register(&workflow_id);
        let deps = self.deps.clone();
        let tokens = Arc::clone(&self.tokens);
        let metrics = self.metrics.clone();
        let cancel = token.clone();
        let task_id = workflow_id.clone();
        let run_id = Uuid::new_v4();
        info!(target: "ap.runner", workflow_id = %task_id, run_id = %run_id, "starting run");

        let limiter = self.activity_limiter.clone();
        let join = tokio::spawn(async move {
            let started = std::time::Instant::now();
            let ctx =
                WorkflowContext::new(&task_id, deps.store.clone(), cancel).with_limiter(limiter);
            let outcome = package::run_package(&ctx, &deps, &input).await;
            finish_package(&deps, &task_id, &outcome);
            if let (Some(metrics), Ok(summary)) = (&metrics, &outcome) {
                metrics.record(apc_telemetry::PackageRunMetrics {
                    feedlot_family: summary.feedlot_family.to_string(),
                    final_status: summary.status.to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    invoices_extracted: u64::from(summary.invoices_extracted),
                    activities_executed: u64::from(ctx.activity_count()),
                    retries: u64::from(ctx.retry_count()),
                });
            }
            Self::unregister(&tokens, &task_id);
            outcome
        });

        Ok(PackageRunHandle {
            workflow_id,
            run_id,
            cancel: token,
            join,
        })
    }

    /// Run a package workflow and wait for its result.
    pub async fn run_package(
        &self,
        input: PackageWorkflowInput,
    ) -> Result<PackageWorkflowSummary, WorkflowError> {
        let handle = self.submit_package(input)?;
        handle.join.await.map_err(|e| WorkflowError::Corrupt {
            activity: "run_package".into(),
            detail: format!("workflow task panicked: {e}"),
        })?
    }

    /// Start an invoice workflow (the per-invoice child).
    pub fn submit_invoice(&self, input: InvoiceWorkflowInput) -> Result<InvoiceRunHandle, WorkflowError> {
        let workflow_id = input.workflow_id();
        let input_json = serde_json::to_string(&input).map_err(|e| WorkflowError::Corrupt {
            activity: "submit_invoice".into(),
            detail: e.to_string(),
        })?;
        self.deps
            .store
            .begin_workflow(&workflow_id, "ap_invoice", &input_json)?;

        let token = self.register(&workflow_id);
        let deps = self.deps.clone();
        let tokens = Arc::clone(&self.tokens);
        let cancel = token.clone();
        let task_id = workflow_id.clone();
        let run_id = Uuid::new_v4();
        info!(target: "ap.runner", workflow_id = %task_id, run_id = %run_id, "starting run");

        let limiter = self.activity_limiter.clone();
        let join = tokio::spawn(async move {
            let ctx =
                WorkflowContext::new(&task_id, deps.store.clone(), cancel).with_limiter(limiter);
            let outcome = invoice::run_invoice(&ctx, &deps, &input).await;
            finish_invoice(&deps, &task_id, &outcome);
            Self::unregister(&tokens, &task_id);
            outcome
        });

        Ok(InvoiceRunHandle {
            workflow_id,
            run_id,
            cancel: token,
            join,
        })
    }

    /// Run an invoice workflow and wait for its result.
    pub async fn run_invoice(
        &self,
        input: InvoiceWorkflowInput,
    ) -> Result<InvoiceWorkflowResult, WorkflowError> {
        let handle = self.submit_invoice(input)?;
        handle.join.await.map_err(|e| WorkflowError::Corrupt {
            activity: "run_invoice".into(),
            detail: format!("workflow task panicked: {e}"),
        })?
    }
}

fn finish_package(
    deps: &ActivityDeps,
    workflow_id: &str,
    outcome: &Result<PackageWorkflowSummary, WorkflowError>,
) {
    let bookkeeping = match outcome {
        Ok(summary) => {
            let result_json = serde_json::to_string(summary).unwrap_or_default();
            deps.store
                .finish_workflow(workflow_id, WorkflowState::Completed, Some(&result_json), None)
        }
        Err(error) if error.is_cancelled() => {
            warn!(target: "ap.runner", workflow_id, "package workflow cancelled");
            deps.store
                .update_package_status(workflow_id, PackageStatus::Cancelled, None)
                .and_then(|()| {
                    deps.store.finish_workflow(
                        workflow_id,
                        WorkflowState::Cancelled,
                        None,
                        Some("cancelled"),
                    )
                })
        }
        Err(error) => {
            error!(target: "ap.runner", workflow_id, %error, "package workflow failed");
            let audit = AuditEventBuilder::new(
                AuditKind::Workflow,
                format!("package workflow failed: {error}"),
            )
            .severity(AuditSeverity::Error)
            .package_id(workflow_id)
            .workflow_id(workflow_id)
            .build(
                format!("{workflow_id}:workflow:failed"),
                chrono::Utc::now(),
            );
            deps.store
                .append_audit(&audit)
                .and_then(|()| {
                    deps.store
                        .update_package_status(workflow_id, PackageStatus::Failed, None)
                })
                .and_then(|()| {
                    deps.store.finish_workflow(
                        workflow_id,
                        WorkflowState::Failed,
                        None,
                        Some(&error.to_string()),
                    )
                })
        }
    };
    if let Err(e) = bookkeeping {
        // Partial progress stays inspectable even when bookkeeping fails.
        error!(target: "ap.runner", workflow_id, error = %e, "terminal bookkeeping failed");
    }
}

fn finish_invoice(
    deps: &ActivityDeps,
    workflow_id: &str,
    outcome: &Result<InvoiceWorkflowResult, WorkflowError>,
) {
    let bookkeeping = match outcome {
        Ok(result) => {
            let result_json = serde_json::to_string(result).unwrap_or_default();
            let state = if result.failed {
                WorkflowState::Failed
            } else {
                WorkflowState::Completed
            };
            deps.store.finish_workflow(
                workflow_id,
                state,
                Some(&result_json),
                result.failure_reason.as_deref(),
            )
        }
        Err(error) if error.is_cancelled() => deps.store.finish_workflow(
            workflow_id,
            WorkflowState::Cancelled,
            None,
            Some("cancelled"),
        ),
        Err(error) => {
            error!(target: "ap.runner", workflow_id, %error, "invoice workflow failed");
            deps.store.finish_workflow(
                workflow_id,
                WorkflowState::Failed,
                None,
                Some(&error.to_string()),
            )
        }
    };
    if let Err(e) = bookkeeping {
        error!(target: "ap.runner", workflow_id, error = %e, "terminal bookkeeping failed");
    }
}
