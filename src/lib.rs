// SPDX-License-Identifier: MIT OR Apache-2.0
//! apcore
#![deny(unsafe_code)]
//!
//! Durable orchestration core for feedlot AP automation.
//!
//! This facade crate re-exports the workspace's public surface. The pieces:
//!
//! - [`apc_core`]: contract types (packages, documents, references, audit)
//! - [`apc_error`]: the unified error taxonomy
//! - [`apc_artifact`]: content-addressed artifact store
//! - [`apc_store`]: SQLite persistence and the workflow journal
//! - [`apc_reconcile`]: the pure reconciliation engine
//! - [`apc_entity`] / [`apc_vendor`] / [`apc_coding`]: the resolution and
//!   coding engines
//! - [`apc_erp`]: the ERP client seam and payload envelope
//! - [`apc_workflow`]: durable package and invoice workflows
//! - [`apc_config`] / [`apc_telemetry`]: worker configuration and tracing

pub use apc_artifact;
pub use apc_coding;
pub use apc_config;
pub use apc_core;
pub use apc_entity;
pub use apc_erp;
pub use apc_error;
pub use apc_reconcile;
pub use apc_store;
pub use apc_telemetry;
pub use apc_vendor;
pub use apc_workflow;
