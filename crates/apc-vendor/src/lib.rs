// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-vendor
#![deny(unsafe_code)]
//!
//! Vendor resolution: match an extracted vendor/feedlot name to a catalog
//! entry.
//!
//! Strategy, designed for minimal user input:
//! 1. normalize the extracted name,
//! 2. exact alias lookup (instant, confidence 100),
//! 3. fuzzy-score every catalog vendor on name and (when available) address,
//! 4. auto-match above the confidence gate, otherwise return candidates.
//!
//! A confirmed candidate becomes an alias, so the next identical extraction
//! resolves exactly.

/// Name and address normalization primitives.
pub mod normalize;

use apc_core::catalog::{VendorAlias, VendorRecord};
use apc_error::ApResult;
use apc_store::Store;
use normalize::{
    AddressParts, address_parts, address_similarity, normalize_vendor_name, string_similarity,
    token_similarity, tokenize_name,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a resolution (or candidate) matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Exact hit in the alias table.
    ExactAlias,
    /// Fuzzy name match.
    FuzzyName,
    /// Name match corroborated by address.
    AddressMatch,
    /// Nothing cleared the floor.
    NoMatch,
}

/// Matching thresholds and weights. All configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchingConfig {
    /// Candidates below this score are dropped.
    pub fuzzy_threshold: Decimal,
    /// Top candidates at or above this score auto-match.
    pub auto_threshold: Decimal,
    /// Maximum candidates returned.
    pub max_candidates: usize,
    /// Name weight in the combined score (weights sum to 1).
    pub name_weight: Decimal,
    /// Address weight in the combined score.
    pub address_weight: Decimal,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: dec!(60),
            auto_threshold: dec!(85),
            max_candidates: 5,
            name_weight: dec!(0.75),
            address_weight: dec!(0.25),
        }
    }
}

/// Address block extracted alongside the vendor name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedAddress {
    /// Street line.
    pub address_line1: Option<String>,
    /// City.
    pub city: Option<String>,
    /// State.
    pub state: Option<String>,
}

/// One scored catalog vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorCandidate {
    /// Vendor id in the ERP.
    pub vendor_id: String,
    /// Vendor number / code.
    pub vendor_number: String,
    /// Vendor display name.
    pub vendor_name: String,
    /// Combined score out of 100.
    pub score: Decimal,
    /// Name-similarity component.
    pub name_score: Decimal,
    /// Address-similarity component.
    pub address_score: Decimal,
    /// How this candidate matched.
    pub match_type: MatchType,
    /// Tokens shared between the extracted and catalog names.
    pub matched_tokens: Vec<String>,
    /// Why the candidate scored what it did.
    pub reasons: Vec<String>,
}

/// Outcome of vendor resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorResolution {
    /// True when an alias hit or the top candidate cleared the gate.
    pub auto_matched: bool,
    /// Matched vendor id, when auto-matched.
    pub vendor_id: Option<String>,
    /// Matched vendor number, when auto-matched.
    pub vendor_number: Option<String>,
    /// Matched vendor name, when auto-matched.
    pub vendor_name: Option<String>,
    /// How the match was made.
    pub match_type: MatchType,
    /// Top score (100 for alias hits).
    pub confidence: Decimal,
    /// Original extracted text.
    pub extracted_name: String,
    /// Normalized form used for matching.
    pub normalized_name: String,
    /// Entity the resolution is scoped to.
    pub entity_id: String,
    /// Scored candidates, best first.
    pub candidates: Vec<VendorCandidate>,
    /// Human-readable decision trail.
    pub reasons: Vec<String>,
    /// Wall-clock resolution time.
    pub resolution_time_ms: u64,
}

/// The resolver. Holds the store (for aliases) and matching config.
#[derive(Debug, Clone)]
pub struct VendorResolver {
    store: Store,
    config: MatchingConfig,
    customer_id: String,
}

impl VendorResolver {
    /// Build a resolver for one customer/tenant.
    #[must_use]
    pub fn new(store: Store, config: MatchingConfig, customer_id: impl Into<String>) -> Self {
        Self {
            store,
            config,
            customer_id: customer_id.into(),
        }
    }

    /// Current config.
    #[must_use]
    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Resolve an extracted name against an entity's vendor catalog.
    pub fn resolve(
        &self,
        extracted_name: &str,
        entity_id: &str,
        vendor_list: &[VendorRecord],
        extracted_address: Option<&ExtractedAddress>,
    ) -> ApResult<VendorResolution> {
        let start = std::time::Instant::now();
        let normalized = normalize_vendor_name(extracted_name);
        let finish = |mut r: VendorResolution| {
            r.resolution_time_ms = start.elapsed().as_millis() as u64;
            r
        };

        if normalized.is_empty() {
            return Ok(finish(VendorResolution {
                auto_matched: false,
                vendor_id: None,
                vendor_number: None,
                vendor_name: None,
                match_type: MatchType::NoMatch,
                confidence: Decimal::ZERO,
                extracted_name: extracted_name.to_string(),
                normalized_name: normalized,
                entity_id: entity_id.to_string(),
                candidates: Vec::new(),
                reasons: vec!["empty or invalid vendor name".into()],
                resolution_time_ms: 0,
            }));
        }

        // Fast path: a confirmed alias is authoritative.
        if let Some(alias) = self
            .store
            .vendor_alias(&self.customer_id, entity_id, &normalized)?
        {
            debug!(target: "ap.vendor", entity_id, normalized, "alias hit");
            return Ok(finish(VendorResolution {
                auto_matched: true,
                vendor_id: Some(alias.vendor_id),
                vendor_number: Some(alias.vendor_number),
                vendor_name: Some(alias.vendor_name),
                match_type: MatchType::ExactAlias,
                confidence: dec!(100),
                extracted_name: extracted_name.to_string(),
                normalized_name: normalized.clone(),
                entity_id: entity_id.to_string(),
                candidates: Vec::new(),
                reasons: vec![format!("Exact alias match: '{normalized}'")],
                resolution_time_ms: 0,
            }));
        }

        if vendor_list.is_empty() {
            return Ok(finish(VendorResolution {
                auto_matched: false,
                vendor_id: None,
                vendor_number: None,
                vendor_name: None,
                match_type: MatchType::NoMatch,
                confidence: Decimal::ZERO,
                extracted_name: extracted_name.to_string(),
                normalized_name: normalized,
                entity_id: entity_id.to_string(),
                candidates: Vec::new(),
                reasons: vec!["no alias found and no vendor catalog supplied".into()],
                resolution_time_ms: 0,
            }));
        }

        let mut candidates = self.score_vendors(&normalized, vendor_list, extracted_address);
        candidates.retain(|c| c.score >= self.config.fuzzy_threshold);
        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.vendor_number.cmp(&b.vendor_number))
        });
        candidates.truncate(self.config.max_candidates);

        let resolution = match candidates.first() {
            Some(best) if best.score >= self.config.auto_threshold => {
                let best = best.clone();
                let mut reasons = vec![format!("High confidence match ({}%)", best.score)];
                reasons.extend(best.reasons.iter().cloned());
                VendorResolution {
                    auto_matched: true,
                    vendor_id: Some(best.vendor_id.clone()),
                    vendor_number: Some(best.vendor_number.clone()),
                    vendor_name: Some(best.vendor_name.clone()),
                    match_type: best.match_type,
                    confidence: best.score,
                    extracted_name: extracted_name.to_string(),
                    normalized_name: normalized,
                    entity_id: entity_id.to_string(),
                    candidates,
                    reasons,
                    resolution_time_ms: 0,
                }
            }
            Some(best) => VendorResolution {
                auto_matched: false,
                vendor_id: None,
                vendor_number: None,
                vendor_name: None,
                match_type: MatchType::FuzzyName,
                confidence: best.score,
                extracted_name: extracted_name.to_string(),
                normalized_name: normalized,
                entity_id: entity_id.to_string(),
                reasons: vec![format!(
                    "Best match score ({}%) below auto-match threshold",
                    best.score
                )],
                candidates,
                resolution_time_ms: 0,
            },
            None => VendorResolution {
                auto_matched: false,
                vendor_id: None,
                vendor_number: None,
                vendor_name: None,
                match_type: MatchType::NoMatch,
                confidence: Decimal::ZERO,
                extracted_name: extracted_name.to_string(),
                normalized_name: normalized,
                entity_id: entity_id.to_string(),
                candidates: Vec::new(),
                reasons: vec![format!(
                    "No vendors matched above threshold ({}%)",
                    self.config.fuzzy_threshold
                )],
                resolution_time_ms: 0,
            },
        };
        Ok(finish(resolution))
    }

    fn score_vendors(
        &self,
        normalized_name: &str,
        vendor_list: &[VendorRecord],
        extracted_address: Option<&ExtractedAddress>,
    ) -> Vec<VendorCandidate> {
        let extracted_tokens = tokenize_name(normalized_name);
        let extracted_addr: Option<AddressParts> = extracted_address.map(|a| {
            address_parts(
                a.address_line1.as_deref(),
                a.city.as_deref(),
                a.state.as_deref(),
            )
        });

        let mut candidates = Vec::new();
        for vendor in vendor_list {
            if vendor.name.is_empty() || !vendor.is_active {
                continue;
            }
            let vendor_normalized = normalize_vendor_name(&vendor.name);
            let vendor_tokens = tokenize_name(&vendor_normalized);

            let token_sim = token_similarity(&extracted_tokens, &vendor_tokens);
            let string_sim = string_similarity(normalized_name, &vendor_normalized);
            let name_score = to_score((token_sim * 0.7 + string_sim * 0.3) * 100.0);

            let address_score = match &extracted_addr {
                Some(extracted) => {
                    let vendor_addr = address_parts(
                        vendor.address_line1.as_deref(),
                        vendor.city.as_deref(),
                        vendor.state.as_deref(),
                    );
                    to_score(address_similarity(extracted, &vendor_addr) * 100.0)
                }
                None => Decimal::ZERO,
            };

            let total = if address_score > Decimal::ZERO {
                (name_score * self.config.name_weight
                    + address_score * self.config.address_weight)
                    .round_dp(2)
            } else {
                name_score
            };

            let mut reasons = Vec::new();
            if token_sim >= 0.8 {
                reasons.push(format!("Strong name match: '{vendor_normalized}'"));
            } else if token_sim >= 0.6 {
                reasons.push(format!("Moderate name match: '{vendor_normalized}'"));
            }
            if address_score >= dec!(50) {
                reasons.push("Address matches".into());
            }

            let match_type = if address_score >= dec!(50) && name_score >= dec!(60) {
                MatchType::AddressMatch
            } else {
                MatchType::FuzzyName
            };

            let matched_tokens = extracted_tokens
                .iter()
                .filter(|t| vendor_tokens.contains(t))
                .cloned()
                .collect();

            candidates.push(VendorCandidate {
                vendor_id: vendor.id.clone(),
                vendor_number: vendor.number.clone(),
                vendor_name: vendor.name.clone(),
                score: total,
                name_score,
                address_score,
                match_type,
                matched_tokens,
                reasons,
            });
        }
        candidates
    }

    /// Confirm a candidate match: persist an alias so the next identical
    /// normalized name resolves exactly. Idempotent on the alias key.
    pub fn confirm_match(
        &self,
        extracted_name: &str,
        entity_id: &str,
        vendor_id: &str,
        vendor_number: &str,
        vendor_name: &str,
        created_by: &str,
    ) -> ApResult<VendorAlias> {
        let alias = VendorAlias {
            customer_id: self.customer_id.clone(),
            entity_id: entity_id.to_string(),
            alias_normalized: normalize_vendor_name(extracted_name),
            alias_original: extracted_name.to_string(),
            vendor_id: vendor_id.to_string(),
            vendor_number: vendor_number.to_string(),
            vendor_name: vendor_name.to_string(),
            created_by: created_by.to_string(),
        };
        self.store.put_vendor_alias(&alias)?;
        debug!(
            target: "ap.vendor",
            entity_id,
            alias = %alias.alias_normalized,
            vendor = %alias.vendor_number,
            "alias confirmed"
        );
        Ok(alias)
    }
}

fn to_score(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}

/// Render a human-readable explanation of a resolution.
#[must_use]
pub fn explain(resolution: &VendorResolution) -> String {
    let mut lines = vec![
        "Vendor resolution".to_string(),
        format!("  extracted: '{}'", resolution.extracted_name),
        format!("  normalized: '{}'", resolution.normalized_name),
    ];
    if resolution.auto_matched {
        lines.push(format!(
            "  matched {} ({}) at {}%",
            resolution.vendor_name.as_deref().unwrap_or("?"),
            resolution.vendor_number.as_deref().unwrap_or("?"),
            resolution.confidence
        ));
    } else {
        lines.push("  requires confirmation".to_string());
    }
    for reason in &resolution.reasons {
        lines.push(format!("  - {reason}"));
    }
    for (i, c) in resolution.candidates.iter().enumerate() {
        lines.push(format!(
            "  {}. {} ({}) score {} (name {}, address {})",
            i + 1,
            c.vendor_name,
            c.vendor_number,
            c.score,
            c.name_score,
            c.address_score,
        ));
    }
    lines.push(format!("  resolved in {}ms", resolution.resolution_time_ms));
    lines.join("\n")
}

#[cfg(test)]
mod tests;
