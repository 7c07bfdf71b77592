// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the AP worker.
//!
//! This crate provides [`WorkerConfig`], the top-level runtime settings,
//! together with helpers for loading from TOML files, applying environment
//! overrides, and producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// The configured activity concurrency is unusually large.
    LargeConcurrency {
        /// Configured value.
        value: u32,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeConcurrency { value } => {
                write!(f, "activity concurrency {value} is unusually large")
            }
        }
    }
}

/// Durable-execution endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DurableConfig {
    /// Endpoint URL of the durable-execution service.
    pub endpoint: String,
    /// Namespace the worker registers in.
    pub namespace: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lands in config files.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Path to a client certificate, for mTLS deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,
}

fn default_api_key_env() -> String {
    "AP_API_KEY".into()
}

/// Extractor provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractorConfig {
    /// Name of the environment variable holding the provider key.
    #[serde(default = "default_extractor_key_env")]
    pub api_key_env: String,
}

fn default_extractor_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_extractor_key_env(),
        }
    }
}

/// Top-level worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkerConfig {
    /// Durable-execution endpoint. Required for a live worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durable: Option<DurableConfig>,

    /// Extractor provider settings.
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Root directory for the artifact store.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: String,

    /// SQLite database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Log level override (e.g. `"debug"`, `"info"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Cap on concurrent activity executions; `0` means unbounded.
    #[serde(default)]
    pub max_concurrent_activities: u32,

    /// Entity-resolver weights and thresholds.
    #[serde(default)]
    pub entity_weights: apc_entity::ScoringWeights,

    /// Vendor-matching thresholds and weights.
    #[serde(default)]
    pub vendor_matching: apc_vendor::MatchingConfig,

    /// Suspense account for unmapped categories.
    #[serde(default)]
    pub suspense: apc_coding::SuspenseConfig,
}

fn default_artifact_root() -> String {
    "artifacts".into()
}

fn default_database_path() -> String {
    "ap_automation.db".into()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            durable: None,
            extractor: ExtractorConfig::default(),
            artifact_root: default_artifact_root(),
            database_path: default_database_path(),
            log_level: Some("info".into()),
            max_concurrent_activities: 0,
            entity_weights: apc_entity::ScoringWeights::default(),
            vendor_matching: apc_vendor::MatchingConfig::default(),
            suspense: apc_coding::SuspenseConfig::default(),
        }
    }
}

/// Load a [`WorkerConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`WorkerConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<WorkerConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => WorkerConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`WorkerConfig`].
pub fn parse_toml(content: &str) -> Result<WorkerConfig, ConfigError> {
    toml::from_str::<WorkerConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `AP_ENDPOINT`, `AP_NAMESPACE` (durable endpoint)
/// - `AP_ARTIFACT_ROOT`, `AP_DATABASE_PATH`
/// - `AP_LOG_LEVEL`
pub fn apply_env_overrides(config: &mut WorkerConfig) {
    if let Ok(endpoint) = std::env::var("AP_ENDPOINT") {
        let namespace = std::env::var("AP_NAMESPACE").unwrap_or_else(|_| "default".into());
        match &mut config.durable {
            Some(durable) => {
                durable.endpoint = endpoint;
                durable.namespace = namespace;
            }
            None => {
                config.durable = Some(DurableConfig {
                    endpoint,
                    namespace,
                    api_key_env: default_api_key_env(),
                    cert_path: None,
                });
            }
        }
    }
    if let Ok(root) = std::env::var("AP_ARTIFACT_ROOT") {
        config.artifact_root = root;
    }
    if let Ok(path) = std::env::var("AP_DATABASE_PATH") {
        config.database_path = path;
    }
    if let Ok(level) = std::env::var("AP_LOG_LEVEL") {
        config.log_level = Some(level);
    }
}

/// Validate a configuration for a live worker, returning advisory warnings.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] listing every problem found.
pub fn validate(config: &WorkerConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    match &config.durable {
        None => reasons.push("durable endpoint is not configured".to_string()),
        Some(durable) => {
            if durable.endpoint.trim().is_empty() {
                reasons.push("durable.endpoint must not be empty".to_string());
            }
            if durable.namespace.trim().is_empty() {
                reasons.push("durable.namespace must not be empty".to_string());
            }
            if durable.cert_path.is_none() && std::env::var(&durable.api_key_env).is_err() {
                reasons.push(format!(
                    "neither {} nor durable.cert_path is set",
                    durable.api_key_env
                ));
            }
        }
    }
    if std::env::var(&config.extractor.api_key_env).is_err() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: config.extractor.api_key_env.clone(),
            hint: "extraction activities will fail without a provider key".into(),
        });
    }
    if config.max_concurrent_activities > 256 {
        warnings.push(ConfigWarning::LargeConcurrency {
            value: config.max_concurrent_activities,
        });
    }
    if let Some(level) = &config.log_level
        && !["error", "warn", "info", "debug", "trace"].contains(&level.as_str())
    {
        reasons.push(format!("unknown log level: {level}"));
    }

    if reasons.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons })
    }
}
