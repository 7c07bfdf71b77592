// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-coding
#![deny(unsafe_code)]
//!
//! GL coding engine.
//!
//! For each invoice line: categorize the description, look the category up
//! through the mapping hierarchy (vendor -> entity -> global -> suspense), and
//! evaluate the entity's dimension rules. Missing mappings and dimensions are
//! carried in the result as business warnings, never as errors.

/// Line-description categorization.
pub mod category;
/// Dimension rule evaluation.
pub mod dimensions;

pub use category::{LineCategory, categorize_line};
pub use dimensions::{DimensionContext, DimensionValue, resolve_dimensions};

use apc_core::catalog::{DimensionRule, EntityProfile, MappingLevel, VendorRecord};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_error::ApResult;
use apc_store::Store;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Fallback account configuration for unmapped categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SuspenseConfig {
    /// GL account unmapped lines post to.
    pub gl_account_ref: String,
}

impl Default for SuspenseConfig {
    fn default() -> Self {
        Self {
            gl_account_ref: "9999-SUSPENSE".into(),
        }
    }
}

/// Coding for one invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCoding {
    /// Position in `line_items`.
    pub line_index: usize,
    /// Line description.
    pub description: String,
    /// Line amount, when printed.
    pub amount: Option<Decimal>,
    /// Category the description mapped to.
    pub category: LineCategory,
    /// GL account the line posts to.
    pub gl_ref: String,
    /// Which mapping level supplied the account.
    pub mapping_level: MappingLevel,
    /// Resolved dimensions.
    pub dimensions: Vec<DimensionValue>,
    /// Required dimensions that stayed empty.
    pub missing_dimensions: Vec<String>,
    /// True when nothing is missing.
    pub complete: bool,
}

/// Coding for a whole invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCoding {
    /// Effective invoice number.
    pub invoice_number: String,
    /// Entity the coding is scoped to.
    pub entity_id: String,
    /// Vendor id, when resolved.
    pub vendor_id: Option<String>,
    /// Per-line codings, in line order.
    pub line_codings: Vec<LineCoding>,
    /// Categories that fell through to suspense.
    pub missing_mappings: Vec<String>,
    /// Required dimensions missing on any line.
    pub missing_dimensions: Vec<String>,
    /// Business warnings (uncategorized lines, suspense usage).
    pub warnings: Vec<String>,
    /// True when no mapping or dimension is missing.
    pub complete: bool,
}

/// Summary of configured mappings for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSummary {
    /// Entity summarized.
    pub entity_id: String,
    /// Mapping row counts by level.
    pub vendor_level: u32,
    /// Entity-level row count.
    pub entity_level: u32,
    /// Global row count.
    pub global_level: u32,
    /// Categories with at least one row.
    pub categories_covered: Vec<String>,
    /// Number of dimension rules in scope.
    pub dimension_rules: u32,
}

/// The coding engine. Scoped to one entity (and optionally one vendor).
#[derive(Debug, Clone)]
pub struct CodingEngine {
    store: Store,
    entity_id: String,
    vendor_id: Option<String>,
    suspense: SuspenseConfig,
    rules: Vec<DimensionRule>,
}

impl CodingEngine {
    /// Build an engine, caching the entity's dimension rules.
    pub fn new(
        store: Store,
        entity_id: impl Into<String>,
        vendor_id: Option<String>,
        suspense: SuspenseConfig,
    ) -> ApResult<Self> {
        let entity_id = entity_id.into();
        let rules = store.dimension_rules(&entity_id)?;
        Ok(Self {
            store,
            entity_id,
            vendor_id,
            suspense,
            rules,
        })
    }

    /// Look a category up through vendor -> entity -> global, falling back to
    /// the suspense account.
    pub fn lookup_gl(&self, category: LineCategory) -> ApResult<(String, MappingLevel)> {
        let category = category.as_str();
        if let Some(vendor_id) = &self.vendor_id
            && let Some(hit) = self.store.gl_mapping(
                MappingLevel::Vendor,
                Some(&self.entity_id),
                Some(vendor_id),
                category,
            )?
        {
            return Ok((hit.gl_account_ref, MappingLevel::Vendor));
        }
        if let Some(hit) =
            self.store
                .gl_mapping(MappingLevel::Entity, Some(&self.entity_id), None, category)?
        {
            return Ok((hit.gl_account_ref, MappingLevel::Entity));
        }
        if let Some(hit) = self
            .store
            .gl_mapping(MappingLevel::Global, None, None, category)?
        {
            return Ok((hit.gl_account_ref, MappingLevel::Global));
        }
        Ok((self.suspense.gl_account_ref.clone(), MappingLevel::Suspense))
    }

    /// Generate complete coding for an invoice.
    pub fn code_invoice(
        &self,
        invoice: &InvoiceDocument,
        effective_number: &str,
        vendor: Option<&VendorRecord>,
        statement: Option<&StatementDocument>,
        entity: Option<&EntityProfile>,
    ) -> ApResult<InvoiceCoding> {
        let invoice_value = serde_json::to_value(invoice)?;
        let statement_value = statement.map(serde_json::to_value).transpose()?;
        let entity_value = entity.map(serde_json::to_value).transpose()?;
        let vendor_value = vendor.map(serde_json::to_value).transpose()?;

        let mut line_codings = Vec::with_capacity(invoice.line_items.len());
        let mut missing_mappings = BTreeSet::new();
        let mut missing_dimensions = BTreeSet::new();

        for (line_index, line) in invoice.line_items.iter().enumerate() {
            let category = categorize_line(&line.description);
            let (gl_ref, mapping_level) = self.lookup_gl(category)?;
            if mapping_level == MappingLevel::Suspense {
                missing_mappings.insert(category.as_str().to_string());
            }

            let line_value = serde_json::to_value(line)?;
            let context = DimensionContext::new(
                &invoice_value,
                statement_value.as_ref(),
                entity_value.as_ref(),
                vendor_value.as_ref(),
                &line_value,
            );
            let (mut dimensions, missing) = resolve_dimensions(&self.rules, &context);

            // Entity defaults cover dimensions no rule speaks for.
            if let Some(entity) = entity {
                let covered: BTreeSet<String> =
                    dimensions.iter().map(|d| d.code.clone()).collect();
                for (code, value) in &entity.default_dimensions {
                    if !covered.contains(code.as_str()) && !missing.contains(code) {
                        dimensions.push(DimensionValue {
                            code: code.clone(),
                            value: value.clone(),
                            source: "entity_default".into(),
                        });
                    }
                }
            }

            for code in &missing {
                missing_dimensions.insert(code.clone());
            }
            let complete = missing.is_empty();
            line_codings.push(LineCoding {
                line_index,
                description: line.description.clone(),
                amount: line.total,
                category,
                gl_ref,
                mapping_level,
                dimensions,
                missing_dimensions: missing,
                complete,
            });
        }

        let mut warnings = Vec::new();
        let uncategorized = line_codings
            .iter()
            .filter(|lc| lc.category == LineCategory::Uncategorized)
            .count();
        if uncategorized > 0 {
            warnings.push(format!("{uncategorized} line(s) could not be categorized"));
        }
        let suspense = line_codings
            .iter()
            .filter(|lc| lc.mapping_level == MappingLevel::Suspense)
            .count();
        if suspense > 0 {
            warnings.push(format!("{suspense} line(s) mapped to suspense account"));
        }

        let complete = missing_mappings.is_empty() && missing_dimensions.is_empty();
        debug!(
            target: "ap.coding",
            invoice = effective_number,
            entity = %self.entity_id,
            lines = line_codings.len(),
            complete,
            "invoice coded"
        );

        Ok(InvoiceCoding {
            invoice_number: effective_number.to_string(),
            entity_id: self.entity_id.clone(),
            vendor_id: self.vendor_id.clone(),
            line_codings,
            missing_mappings: missing_mappings.into_iter().collect(),
            missing_dimensions: missing_dimensions.into_iter().collect(),
            warnings,
            complete,
        })
    }

    /// Summarize the mappings visible to this engine's entity.
    pub fn mapping_summary(&self) -> ApResult<MappingSummary> {
        let mappings = self.store.gl_mappings_for_entity(&self.entity_id)?;
        let mut summary = MappingSummary {
            entity_id: self.entity_id.clone(),
            vendor_level: 0,
            entity_level: 0,
            global_level: 0,
            categories_covered: Vec::new(),
            dimension_rules: self.rules.len() as u32,
        };
        let mut categories = BTreeSet::new();
        for mapping in mappings {
            match mapping.level {
                MappingLevel::Vendor => summary.vendor_level += 1,
                MappingLevel::Entity => summary.entity_level += 1,
                MappingLevel::Global => summary.global_level += 1,
                MappingLevel::Suspense => {}
            }
            categories.insert(mapping.category);
        }
        summary.categories_covered = categories.into_iter().collect();
        Ok(summary)
    }
}
