// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dimension rule evaluation.
//!
//! Each rule reads a dotted `source_field` path out of the evaluation
//! context (`invoice`, `statement`, `entity`, `vendor`, `line`), applies its
//! transform, falls back to its default, and reports itself missing when a
//! required value stays empty.

use apc_core::catalog::{DimensionRule, DimensionTransform};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved dimension value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionValue {
    /// ERP dimension code.
    pub code: String,
    /// Resolved value.
    pub value: String,
    /// Path the value came from (or `default`).
    pub source: String,
}

/// Evaluation context assembled per line.
#[derive(Debug, Clone)]
pub struct DimensionContext {
    root: Value,
}

impl DimensionContext {
    /// Build a context from the documents in scope. Everything is converted
    /// to JSON once so path lookup is uniform.
    pub fn new(
        invoice: &Value,
        statement: Option<&Value>,
        entity: Option<&Value>,
        vendor: Option<&Value>,
        line: &Value,
    ) -> Self {
        let mut root = serde_json::Map::new();
        root.insert("invoice".into(), invoice.clone());
        root.insert("statement".into(), statement.cloned().unwrap_or(Value::Null));
        root.insert("entity".into(), entity.cloned().unwrap_or(Value::Null));
        root.insert("vendor".into(), vendor.cloned().unwrap_or(Value::Null));
        root.insert("line".into(), line.clone());
        Self {
            root: Value::Object(root),
        }
    }

    /// Walk a dotted path; numeric segments index arrays.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn simple_normalize(value: &str) -> String {
    value
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_date(value: &str, format: &str) -> String {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => date.format(format).to_string(),
        // Tolerate already-shortened values.
        Err(_) if format == "%Y-%m" && value.len() >= 7 => value[..7].to_string(),
        Err(_) if format == "%Y" && value.len() >= 4 => value[..4].to_string(),
        Err(_) => String::new(),
    }
}

/// Apply one transform to a raw value.
#[must_use]
pub fn apply_transform(rule: &DimensionRule, raw: &str) -> String {
    match rule.transform {
        DimensionTransform::None => raw.to_string(),
        DimensionTransform::Uppercase => raw.to_uppercase(),
        DimensionTransform::YyyyMm => format_date(raw, "%Y-%m"),
        DimensionTransform::Yyyy => format_date(raw, "%Y"),
        DimensionTransform::Normalize => simple_normalize(raw),
        DimensionTransform::Prefix => match rule.transform_params.get("value") {
            Some(prefix) if !raw.is_empty() => format!("{prefix}{raw}"),
            _ => raw.to_string(),
        },
        DimensionTransform::Suffix => match rule.transform_params.get("value") {
            Some(suffix) if !raw.is_empty() => format!("{raw}{suffix}"),
            _ => raw.to_string(),
        },
        DimensionTransform::Truncate => {
            let length = rule
                .transform_params
                .get("length")
                .and_then(|l| l.parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            raw.chars().take(length).collect()
        }
        DimensionTransform::Map => rule
            .transform_params
            .get(raw)
            .cloned()
            .unwrap_or_default(),
    }
}

/// Evaluate every rule against a context. Returns resolved values and the
/// codes of required dimensions that stayed empty.
#[must_use]
pub fn resolve_dimensions(
    rules: &[DimensionRule],
    context: &DimensionContext,
) -> (Vec<DimensionValue>, Vec<String>) {
    let mut values = Vec::new();
    let mut missing = Vec::new();
    for rule in rules {
        let raw = context
            .lookup(&rule.source_field)
            .map(value_to_string)
            .unwrap_or_default();
        let mut resolved = apply_transform(rule, &raw);
        let mut source = rule.source_field.clone();
        if resolved.is_empty()
            && let Some(default) = &rule.default_value
        {
            resolved = default.clone();
            source = "default".into();
        }
        if resolved.is_empty() {
            if rule.is_required {
                missing.push(rule.dimension_code.clone());
            }
            continue;
        }
        values.push(DimensionValue {
            code: rule.dimension_code.clone(),
            value: resolved,
            source,
        });
    }
    (values, missing)
}
