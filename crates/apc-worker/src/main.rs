// SPDX-License-Identifier: MIT OR Apache-2.0
//! AP automation worker.
//!
//! `apc-worker run` hosts the workflow runner until SIGINT/SIGTERM.
//! `apc-worker submit` drives one package workflow to completion and prints
//! its summary.
//!
//! Exit codes: `0` graceful shutdown, `1` fatal initialization error, `2`
//! lost connection not recoverable.

mod seams;

use apc_artifact::ArtifactStore;
use apc_config::{WorkerConfig, load_config, validate};
use apc_core::FeedlotFamily;
use apc_erp::MockErpClient;
use apc_store::Store;
use apc_workflow::{ActivityDeps, PackageWorkflowInput, WorkflowRunner};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_OK: u8 = 0;
const EXIT_INIT: u8 = 1;
const EXIT_LOST_CONNECTION: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "apc-worker", about = "AP automation workflow worker", version)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host the workflow runner until shutdown.
    Run,
    /// Run one package workflow to completion and print the summary.
    Submit {
        /// Stable package id (doubles as the workflow id).
        #[arg(long)]
        package_id: String,
        /// Feedlot family (BOVINA, MESQUITE).
        #[arg(long)]
        family: String,
        /// Path to the source PDF.
        #[arg(long)]
        pdf: String,
        /// Ignore cached artifacts and force fresh extraction.
        #[arg(long)]
        no_cache: bool,
    },
}

fn build_deps(config: &WorkerConfig, feedlot_key: &str) -> anyhow::Result<ActivityDeps> {
    let store = Store::open(&config.database_path)?;
    let artifacts = ArtifactStore::new(&config.artifact_root)?;
    let erp = Arc::new(MockErpClient::new());
    Ok(ActivityDeps {
        store,
        artifacts: artifacts.clone(),
        splitter: Arc::new(seams::CachedArtifactSplitter::new(artifacts, feedlot_key)),
        extractor: Arc::new(seams::UnlinkedExtractor),
        erp: erp.clone(),
        vendor_directory: Some(erp),
        entity_weights: config.entity_weights.clone(),
        vendor_matching: config.vendor_matching.clone(),
        suspense: config.suspense.clone(),
        customer_id: "default".into(),
    })
}

async fn run_worker(config: WorkerConfig) -> u8 {
    match validate(&config) {
        Ok(warnings) => {
            for warning in warnings {
                warn!(target: "ap.worker", %warning, "configuration warning");
            }
        }
        Err(e) => {
            error!(target: "ap.worker", error = %e, "configuration invalid");
            return EXIT_INIT;
        }
    }
    let deps = match build_deps(&config, "bovina") {
        Ok(deps) => deps,
        Err(e) => {
            error!(target: "ap.worker", error = %e, "initialization failed");
            return EXIT_INIT;
        }
    };
    let metrics = apc_telemetry::MetricsCollector::new();
    let runner = WorkflowRunner::new(deps)
        .with_metrics(metrics.clone())
        .with_activity_limit(config.max_concurrent_activities);
    info!(target: "ap.worker", "worker ready; waiting for shutdown signal");

    let mut health = tokio::time::interval(Duration::from_secs(30));
    let mut health_failures = 0u32;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: "ap.worker", "shutdown signal received");
                break;
            }
            _ = health.tick() => {
                // The database is the shared spine; when it stays
                // unreachable the worker cannot make progress.
                match runner.deps().store.entity_profiles(true) {
                    Ok(_) => health_failures = 0,
                    Err(e) => {
                        health_failures += 1;
                        warn!(
                            target: "ap.worker",
                            error = %e,
                            consecutive = health_failures,
                            "store health check failed"
                        );
                        if health_failures >= 5 {
                            error!(target: "ap.worker", "store unreachable, giving up");
                            return EXIT_LOST_CONNECTION;
                        }
                    }
                }
            }
        }
    }

    runner.cancel_all();
    // Give in-flight workflows a moment to observe cancellation and mark
    // their packages CANCELLED.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while runner.active_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let summary = metrics.summary();
    info!(
        target: "ap.worker",
        runs = summary.count,
        invoices = summary.total_invoices,
        "worker stopped"
    );
    EXIT_OK
}

async fn submit(
    config: WorkerConfig,
    package_id: String,
    family: String,
    pdf: String,
    no_cache: bool,
) -> u8 {
    let family: FeedlotFamily = match family.parse() {
        Ok(family) => family,
        Err(e) => {
            error!(target: "ap.worker", error = %e, "invalid feedlot family");
            return EXIT_INIT;
        }
    };
    let deps = match build_deps(&config, family.artifact_key()) {
        Ok(deps) => deps,
        Err(e) => {
            error!(target: "ap.worker", error = %e, "initialization failed");
            return EXIT_INIT;
        }
    };
    let runner = WorkflowRunner::new(deps);
    let input = PackageWorkflowInput {
        package_id,
        feedlot_family: family,
        pdf_path: pdf,
        document_refs: vec![],
        use_cache: !no_cache,
    };
    match runner.run_package(input).await {
        Ok(summary) => {
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => error!(target: "ap.worker", error = %e, "summary serialization failed"),
            }
            EXIT_OK
        }
        Err(e) => {
            error!(target: "ap.worker", error = %e, "package workflow failed");
            EXIT_INIT
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::from(EXIT_INIT);
        }
    };
    apc_telemetry::init_telemetry(config.log_level.as_deref(), cli.json_logs);

    let code = match cli.command {
        Command::Run => run_worker(config).await,
        Command::Submit {
            package_id,
            family,
            pdf,
            no_cache,
        } => submit(config, package_id, family, pdf, no_cache).await,
    };
    ExitCode::from(code)
}
