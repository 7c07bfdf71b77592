// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-entity
#![deny(unsafe_code)]
//!
//! Entity resolution: decide which tenant company owns a document.
//!
//! Each active [`EntityProfile`] is scored against signals extracted from the
//! invoice (with the statement filling gaps). The strongest signal is an
//! owner-number routing key; vendor existence, feedlot name, remit state, and
//! lot prefix contribute progressively less. The decision is confidence
//! gated: a clear winner is auto-assigned, anything else returns candidates
//! for manual confirmation. Given the same catalog snapshot and inputs the
//! resolution is identical.

use apc_core::catalog::{EntityProfile, KeyConfidence, RoutingKey, RoutingKeyType};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_error::ApResult;
use apc_store::Store;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Scoring weights and decision thresholds. All configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoringWeights {
    /// Points for a hard owner-number key.
    pub owner_number_hard: Decimal,
    /// Points for a soft owner-number key.
    pub owner_number_soft: Decimal,
    /// Points when the owner's vendor exists in the entity.
    pub vendor_existence: Decimal,
    /// Points for a hard feedlot-name key (soft and alias matches score
    /// half).
    pub feedlot_name_match: Decimal,
    /// Points for a remit-state key.
    pub remit_state_match: Decimal,
    /// Points for a lot-prefix key.
    pub lot_prefix_match: Decimal,
    /// Minimum top score for auto-assignment.
    pub auto_assign_threshold: Decimal,
    /// Minimum gap between top and runner-up for auto-assignment.
    pub margin_threshold: Decimal,
    /// Candidates returned for manual confirmation.
    pub max_candidates: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            owner_number_hard: dec!(40),
            owner_number_soft: dec!(25),
            vendor_existence: dec!(30),
            feedlot_name_match: dec!(15),
            remit_state_match: dec!(15),
            lot_prefix_match: dec!(10),
            auto_assign_threshold: dec!(70),
            margin_threshold: dec!(15),
            max_candidates: 3,
        }
    }
}

/// Signals extracted from the invoice and statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    /// Owner account number.
    pub owner_number: Option<String>,
    /// Owner display name.
    pub owner_name: Option<String>,
    /// Feedlot display name.
    pub feedlot_name: Option<String>,
    /// Feedlot state code.
    pub feedlot_state: Option<String>,
    /// Lot number.
    pub lot_number: Option<String>,
    /// Remit-to state code.
    pub remit_state: Option<String>,
}

impl Signals {
    /// Extract signals from an invoice; statement fields fill gaps.
    #[must_use]
    pub fn extract(invoice: &InvoiceDocument, statement: Option<&StatementDocument>) -> Self {
        let mut signals = Self {
            owner_number: invoice.owner.owner_number.clone(),
            owner_name: invoice.owner.name.clone(),
            remit_state: invoice.owner.state.clone(),
            feedlot_name: invoice.feedlot.name.clone(),
            feedlot_state: invoice.feedlot.state.clone(),
            lot_number: invoice.lot.lot_number.clone(),
        };
        if let Some(statement) = statement {
            signals.owner_number = signals
                .owner_number
                .or_else(|| statement.owner.owner_number.clone());
            signals.owner_name = signals.owner_name.or_else(|| statement.owner.name.clone());
            signals.remit_state = signals.remit_state.or_else(|| statement.owner.state.clone());
            signals.feedlot_name = signals
                .feedlot_name
                .or_else(|| statement.feedlot.name.clone());
        }
        signals
    }
}

/// One scored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    /// The scored profile.
    pub entity: EntityProfile,
    /// Total score out of 100.
    pub score: Decimal,
    /// Per-signal breakdown.
    pub owner_number_score: Decimal,
    /// Vendor-existence contribution.
    pub vendor_existence_score: Decimal,
    /// Feedlot-name contribution.
    pub feedlot_name_score: Decimal,
    /// Remit-state contribution.
    pub remit_state_score: Decimal,
    /// Lot-prefix contribution.
    pub lot_prefix_score: Decimal,
    /// Why the entity scored what it did.
    pub reasons: Vec<String>,
    /// Routing keys that fired.
    pub matched_keys: Vec<RoutingKey>,
}

/// How the resolution was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Scored and auto-assigned.
    AutoScored,
    /// Candidates returned for manual confirmation.
    ManualConfirmation,
    /// No active profiles configured.
    NoEntities,
    /// No candidate scored above zero.
    NoCandidates,
}

/// Outcome of entity resolution. Advisory: the workflow persists the final
/// choice to audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityResolution {
    /// True when the top candidate cleared both thresholds.
    pub auto_assigned: bool,
    /// The chosen entity, when auto-assigned.
    pub entity: Option<EntityProfile>,
    /// Top candidates, best first, at most `max_candidates`.
    pub candidates: Vec<EntityCandidate>,
    /// How the decision was made.
    pub method: ResolutionMethod,
    /// Top candidate's score.
    pub confidence: Decimal,
    /// Human-readable decision trail.
    pub reasons: Vec<String>,
    /// Wall-clock resolution time.
    pub resolution_time_ms: u64,
}

/// Async lookup for "does this vendor exist in that entity".
///
/// Implemented by the ERP client; the resolver treats lookup errors as a
/// missing signal rather than a failure.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    /// Whether a vendor with this name exists in the entity.
    async fn vendor_exists_in_entity(&self, vendor_name: &str, entity_id: &str) -> ApResult<bool>;
}

/// The resolver. Cheap to construct; holds a store handle and weights.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    store: Store,
    weights: ScoringWeights,
}

impl EntityResolver {
    /// Build a resolver over the given store with the given weights.
    #[must_use]
    pub fn new(store: Store, weights: ScoringWeights) -> Self {
        Self { store, weights }
    }

    /// Current weights.
    #[must_use]
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Resolve the owning entity for an invoice.
    pub async fn resolve(
        &self,
        invoice: &InvoiceDocument,
        statement: Option<&StatementDocument>,
        directory: Option<&dyn VendorDirectory>,
    ) -> ApResult<EntityResolution> {
        let start = std::time::Instant::now();
        let profiles = self.store.entity_profiles(true)?;
        if profiles.is_empty() {
            return Ok(EntityResolution {
                auto_assigned: false,
                entity: None,
                candidates: Vec::new(),
                method: ResolutionMethod::NoEntities,
                confidence: Decimal::ZERO,
                reasons: vec!["no active entity profiles configured".into()],
                resolution_time_ms: start.elapsed().as_millis() as u64,
            });
        }

        let signals = Signals::extract(invoice, statement);
        let mut candidates = Vec::with_capacity(profiles.len());
        for profile in profiles {
            candidates.push(self.score_entity(profile, &signals, directory).await?);
        }
        // Descending by score; entity code breaks ties deterministically.
        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.entity.entity_code.cmp(&b.entity.entity_code))
        });
        candidates.truncate(self.weights.max_candidates);

        let mut resolution = self.decide(candidates);
        resolution.resolution_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            target: "ap.entity",
            auto = resolution.auto_assigned,
            confidence = %resolution.confidence,
            method = ?resolution.method,
            "entity resolution"
        );
        Ok(resolution)
    }

    async fn score_entity(
        &self,
        profile: EntityProfile,
        signals: &Signals,
        directory: Option<&dyn VendorDirectory>,
    ) -> ApResult<EntityCandidate> {
        let mut candidate = EntityCandidate {
            entity: profile,
            score: Decimal::ZERO,
            owner_number_score: Decimal::ZERO,
            vendor_existence_score: Decimal::ZERO,
            feedlot_name_score: Decimal::ZERO,
            remit_state_score: Decimal::ZERO,
            lot_prefix_score: Decimal::ZERO,
            reasons: Vec::new(),
            matched_keys: Vec::new(),
        };

        self.score_owner_number(&mut candidate, signals)?;
        self.score_vendor_existence(&mut candidate, signals, directory)
            .await;
        self.score_feedlot_name(&mut candidate, signals)?;
        self.score_remit_state(&mut candidate, signals)?;
        self.score_lot_prefix(&mut candidate, signals)?;

        candidate.score = candidate.owner_number_score
            + candidate.vendor_existence_score
            + candidate.feedlot_name_score
            + candidate.remit_state_score
            + candidate.lot_prefix_score;
        Ok(candidate)
    }

    fn score_owner_number(
        &self,
        candidate: &mut EntityCandidate,
        signals: &Signals,
    ) -> ApResult<()> {
        let Some(owner_number) = &signals.owner_number else {
            return Ok(());
        };
        let keys = self.store.routing_keys(
            RoutingKeyType::OwnerNumber,
            &candidate.entity.entity_id,
            Some(owner_number),
        )?;
        // routing_keys orders by priority descending.
        let Some(best) = keys.first().cloned() else {
            return Ok(());
        };
        let (points, label) = match best.confidence {
            KeyConfidence::Hard => (self.weights.owner_number_hard, "hard"),
            KeyConfidence::Soft => (self.weights.owner_number_soft, "soft"),
        };
        candidate.owner_number_score = points;
        candidate
            .reasons
            .push(format!("Owner number '{owner_number}' matches ({label})"));
        candidate.matched_keys.push(best);
        Ok(())
    }

    async fn score_vendor_existence(
        &self,
        candidate: &mut EntityCandidate,
        signals: &Signals,
        directory: Option<&dyn VendorDirectory>,
    ) {
        let (Some(directory), Some(owner_name)) = (directory, &signals.owner_name) else {
            return;
        };
        match directory
            .vendor_exists_in_entity(owner_name, &candidate.entity.entity_id)
            .await
        {
            Ok(true) => {
                candidate.vendor_existence_score = self.weights.vendor_existence;
                candidate
                    .reasons
                    .push(format!("Vendor '{owner_name}' exists in entity"));
            }
            Ok(false) => {}
            Err(e) => {
                // A broken lookup is a missing signal, not a failed resolution.
                warn!(target: "ap.entity", error = %e, "vendor existence lookup failed");
            }
        }
    }

    fn score_feedlot_name(
        &self,
        candidate: &mut EntityCandidate,
        signals: &Signals,
    ) -> ApResult<()> {
        let Some(feedlot_name) = &signals.feedlot_name else {
            return Ok(());
        };
        let feedlot_upper = feedlot_name.to_uppercase();
        let keys = self.store.routing_keys(
            RoutingKeyType::FeedlotName,
            &candidate.entity.entity_id,
            None,
        )?;
        let matched: Vec<RoutingKey> = keys
            .into_iter()
            .filter(|key| feedlot_upper.contains(&key.key_value.to_uppercase()))
            .collect();
        if let Some(best) = matched.first() {
            candidate.feedlot_name_score = match best.confidence {
                KeyConfidence::Hard => self.weights.feedlot_name_match,
                KeyConfidence::Soft => self.weights.feedlot_name_match / dec!(2),
            };
            candidate.reasons.push(format!(
                "Feedlot name matches '{}'",
                candidate.entity.entity_code
            ));
            candidate.matched_keys.extend(matched);
            return Ok(());
        }
        // Fall back to profile aliases, worth a soft match.
        for alias in &candidate.entity.aliases {
            let alias_upper = alias.to_uppercase();
            if alias_upper.contains(&feedlot_upper) || feedlot_upper.contains(&alias_upper) {
                candidate.feedlot_name_score = self.weights.feedlot_name_match / dec!(2);
                candidate
                    .reasons
                    .push(format!("Feedlot name matches alias '{alias}'"));
                break;
            }
        }
        Ok(())
    }

    fn score_remit_state(
        &self,
        candidate: &mut EntityCandidate,
        signals: &Signals,
    ) -> ApResult<()> {
        let Some(remit_state) = &signals.remit_state else {
            return Ok(());
        };
        let keys = self.store.routing_keys(
            RoutingKeyType::RemitState,
            &candidate.entity.entity_id,
            Some(&remit_state.to_uppercase()),
        )?;
        if let Some(best) = keys.first().cloned() {
            candidate.remit_state_score = self.weights.remit_state_match;
            candidate
                .reasons
                .push(format!("Remit state '{remit_state}' matches"));
            candidate.matched_keys.push(best);
        }
        Ok(())
    }

    fn score_lot_prefix(
        &self,
        candidate: &mut EntityCandidate,
        signals: &Signals,
    ) -> ApResult<()> {
        let Some(lot_number) = &signals.lot_number else {
            return Ok(());
        };
        let keys = self.store.routing_keys(
            RoutingKeyType::LotPrefix,
            &candidate.entity.entity_id,
            None,
        )?;
        // Longest prefix wins; priority breaks ties.
        let best = keys
            .into_iter()
            .filter(|key| lot_number.starts_with(&key.key_value))
            .max_by_key(|key| (key.key_value.len(), key.priority));
        if let Some(best) = best {
            candidate.lot_prefix_score = self.weights.lot_prefix_match;
            candidate.reasons.push(format!(
                "Lot '{lot_number}' matches prefix '{}'",
                best.key_value
            ));
            candidate.matched_keys.push(best);
        }
        Ok(())
    }

    fn decide(&self, candidates: Vec<EntityCandidate>) -> EntityResolution {
        let Some(top) = candidates.first().cloned() else {
            return EntityResolution {
                auto_assigned: false,
                entity: None,
                candidates,
                method: ResolutionMethod::NoCandidates,
                confidence: Decimal::ZERO,
                reasons: vec!["no candidate entities found".into()],
                resolution_time_ms: 0,
            };
        };
        let second_score = candidates
            .get(1)
            .map(|c| c.score)
            .unwrap_or(Decimal::ZERO);
        let margin = top.score - second_score;
        let weights = &self.weights;

        if top.score >= weights.auto_assign_threshold && margin >= weights.margin_threshold {
            let mut reasons = vec![
                format!(
                    "Top score {} >= threshold {}",
                    top.score, weights.auto_assign_threshold
                ),
                format!("Margin {} >= required {}", margin, weights.margin_threshold),
            ];
            reasons.extend(top.reasons.iter().cloned());
            EntityResolution {
                auto_assigned: true,
                entity: Some(top.entity.clone()),
                confidence: top.score,
                candidates,
                method: ResolutionMethod::AutoScored,
                reasons,
                resolution_time_ms: 0,
            }
        } else {
            let mut reasons = Vec::new();
            if top.score < weights.auto_assign_threshold {
                reasons.push(format!(
                    "Top score {} < threshold {}",
                    top.score, weights.auto_assign_threshold
                ));
            }
            if margin < weights.margin_threshold {
                reasons.push(format!(
                    "Margin {} < required {}",
                    margin, weights.margin_threshold
                ));
            }
            EntityResolution {
                auto_assigned: false,
                entity: None,
                confidence: top.score,
                candidates,
                method: ResolutionMethod::ManualConfirmation,
                reasons,
                resolution_time_ms: 0,
            }
        }
    }
}

/// Render a human-readable explanation of a resolution.
#[must_use]
pub fn explain(resolution: &EntityResolution) -> String {
    let mut lines = vec!["Entity resolution".to_string()];
    if let Some(entity) = &resolution.entity {
        lines.push(format!(
            "  auto-assigned to {} ({}) at {}",
            entity.entity_code, entity.entity_id, resolution.confidence
        ));
    } else {
        lines.push(format!(
            "  manual confirmation required (top score {})",
            resolution.confidence
        ));
    }
    for reason in &resolution.reasons {
        lines.push(format!("  - {reason}"));
    }
    for (i, candidate) in resolution.candidates.iter().enumerate() {
        lines.push(format!(
            "  {}. {} score {} (owner={}, vendor={}, feedlot={}, state={}, lot={})",
            i + 1,
            candidate.entity.entity_code,
            candidate.score,
            candidate.owner_number_score,
            candidate.vendor_existence_score,
            candidate.feedlot_name_score,
            candidate.remit_state_score,
            candidate.lot_prefix_score,
        ));
    }
    lines.push(format!("  resolved in {}ms", resolution.resolution_time_ms));
    lines.join("\n")
}
