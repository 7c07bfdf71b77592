// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalog rows: the typed configuration records the resolvers and the coding
//! engine read from the store. Rules are persisted rows, not free-form
//! dictionaries.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A tenant company documents can be routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityProfile {
    /// Opaque id the ERP knows the company by.
    pub entity_id: String,
    /// Short code, e.g. `BF2`.
    pub entity_code: String,
    /// Display name.
    pub name: String,
    /// Alternative names the entity is known under.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Default dimension values applied when no rule supplies one.
    #[serde(default)]
    pub default_dimensions: BTreeMap<String, String>,
    /// Inactive profiles are skipped during resolution.
    pub is_active: bool,
}

/// What signal a routing key matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingKeyType {
    /// Owner account number.
    OwnerNumber,
    /// Remit-to state code.
    RemitState,
    /// Lot-number prefix (longest match wins).
    LotPrefix,
    /// Feedlot name substring.
    FeedlotName,
    /// Vendor name.
    VendorName,
}

impl RoutingKeyType {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OwnerNumber => "OWNER_NUMBER",
            Self::RemitState => "REMIT_STATE",
            Self::LotPrefix => "LOT_PREFIX",
            Self::FeedlotName => "FEEDLOT_NAME",
            Self::VendorName => "VENDOR_NAME",
        }
    }
}

impl fmt::Display for RoutingKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoutingKeyType {
    type Err = crate::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER_NUMBER" => Ok(Self::OwnerNumber),
            "REMIT_STATE" => Ok(Self::RemitState),
            "LOT_PREFIX" => Ok(Self::LotPrefix),
            "FEEDLOT_NAME" => Ok(Self::FeedlotName),
            "VENDOR_NAME" => Ok(Self::VendorName),
            other => Err(crate::UnknownStatus(other.to_string())),
        }
    }
}

/// Confidence class of a routing key.
///
/// Hard keys are globally unique per `(key_type, key_value)`; soft keys may
/// overlap across entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyConfidence {
    /// Authoritative mapping.
    Hard,
    /// Suggestive mapping.
    Soft,
}

impl KeyConfidence {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "HARD",
            Self::Soft => "SOFT",
        }
    }
}

impl FromStr for KeyConfidence {
    type Err = crate::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HARD" => Ok(Self::Hard),
            "SOFT" => Ok(Self::Soft),
            other => Err(crate::UnknownStatus(other.to_string())),
        }
    }
}

/// An indexed `(key_type, key_value)` tuple mapping a signal to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingKey {
    /// Signal the key matches on.
    pub key_type: RoutingKeyType,
    /// Value to match (upper-cased on write for state codes and names).
    pub key_value: String,
    /// Entity the signal routes to.
    pub entity_id: String,
    /// Confidence class.
    pub confidence: KeyConfidence,
    /// Tie-breaker among matching keys; higher wins.
    pub priority: i64,
}

/// A confirmed alias mapping a normalized extracted name to a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VendorAlias {
    /// Tenant the alias belongs to.
    pub customer_id: String,
    /// Entity the alias is scoped to.
    pub entity_id: String,
    /// Normalized form of the extracted name (unique per customer+entity).
    pub alias_normalized: String,
    /// Original extracted text, kept for audit.
    pub alias_original: String,
    /// Vendor id in the ERP.
    pub vendor_id: String,
    /// Vendor number / code.
    pub vendor_number: String,
    /// Vendor display name.
    pub vendor_name: String,
    /// Who confirmed the match.
    pub created_by: String,
}

/// A vendor catalog entry supplied by the ERP client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VendorRecord {
    /// Vendor id in the ERP.
    pub id: String,
    /// Vendor number / code.
    pub number: String,
    /// Display name.
    pub name: String,
    /// Street address, when known.
    pub address_line1: Option<String>,
    /// City, when known.
    pub city: Option<String>,
    /// State code, when known.
    pub state: Option<String>,
    /// Inactive vendors are skipped during matching.
    pub is_active: bool,
}

/// Specificity level a GL mapping row is defined at.
///
/// Lookup precedence is `Vendor` -> `Entity` -> `Global`; `Suspense` is never a
/// row, only the recorded level when no row hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingLevel {
    /// Scoped to `(entity, vendor)`.
    Vendor,
    /// Scoped to an entity.
    Entity,
    /// Applies everywhere.
    Global,
    /// Fallback suspense account was used.
    Suspense,
}

impl MappingLevel {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "VENDOR",
            Self::Entity => "ENTITY",
            Self::Global => "GLOBAL",
            Self::Suspense => "SUSPENSE",
        }
    }
}

impl FromStr for MappingLevel {
    type Err = crate::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VENDOR" => Ok(Self::Vendor),
            "ENTITY" => Ok(Self::Entity),
            "GLOBAL" => Ok(Self::Global),
            "SUSPENSE" => Ok(Self::Suspense),
            other => Err(crate::UnknownStatus(other.to_string())),
        }
    }
}

/// A GL account mapping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlMapping {
    /// Level the row is defined at (`Vendor`, `Entity`, or `Global`).
    pub level: MappingLevel,
    /// Entity scope; `None` for global rows.
    pub entity_id: Option<String>,
    /// Vendor scope; `None` below vendor level.
    pub vendor_id: Option<String>,
    /// Line category the row maps.
    pub category: String,
    /// GL account code the category posts to.
    pub gl_account_ref: String,
}

/// Transform applied to a dimension source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DimensionTransform {
    /// Pass the value through unchanged.
    None,
    /// Upper-case the value.
    Uppercase,
    /// Format a date value as `YYYY-MM`.
    YyyyMm,
    /// Format a date value as `YYYY`.
    Yyyy,
    /// Upper-case, strip punctuation, collapse whitespace.
    Normalize,
    /// Prepend `transform_params["value"]`.
    Prefix,
    /// Append `transform_params["value"]`.
    Suffix,
    /// Truncate to `transform_params["length"]` characters.
    Truncate,
    /// Look the value up in the `transform_params` table.
    Map,
}

impl DimensionTransform {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uppercase => "uppercase",
            Self::YyyyMm => "yyyy_mm",
            Self::Yyyy => "yyyy",
            Self::Normalize => "normalize",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::Truncate => "truncate",
            Self::Map => "map",
        }
    }
}

impl FromStr for DimensionTransform {
    type Err = crate::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "uppercase" => Ok(Self::Uppercase),
            "yyyy_mm" => Ok(Self::YyyyMm),
            "yyyy" => Ok(Self::Yyyy),
            "normalize" => Ok(Self::Normalize),
            "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            "truncate" => Ok(Self::Truncate),
            "map" => Ok(Self::Map),
            other => Err(crate::UnknownStatus(other.to_string())),
        }
    }
}

/// A dimension evaluation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DimensionRule {
    /// Entity scope; `None` for global rules.
    pub entity_id: Option<String>,
    /// ERP dimension code the rule fills, e.g. `LOT`.
    pub dimension_code: String,
    /// Dotted path into the evaluation context, e.g. `invoice.lot.lot_number`.
    pub source_field: String,
    /// Transform applied to the raw value.
    pub transform: DimensionTransform,
    /// Transform parameters (`value`, `length`, or a lookup table).
    #[serde(default)]
    pub transform_params: BTreeMap<String, String>,
    /// Used when the transformed value is empty.
    pub default_value: Option<String>,
    /// Whether a missing value is reported.
    pub is_required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_type_round_trips() {
        for t in [
            RoutingKeyType::OwnerNumber,
            RoutingKeyType::RemitState,
            RoutingKeyType::LotPrefix,
            RoutingKeyType::FeedlotName,
            RoutingKeyType::VendorName,
        ] {
            assert_eq!(t.as_str().parse::<RoutingKeyType>().unwrap(), t);
        }
    }

    #[test]
    fn mapping_level_round_trips() {
        for l in [
            MappingLevel::Vendor,
            MappingLevel::Entity,
            MappingLevel::Global,
            MappingLevel::Suspense,
        ] {
            assert_eq!(l.as_str().parse::<MappingLevel>().unwrap(), l);
        }
    }

    #[test]
    fn transform_round_trips() {
        for t in [
            DimensionTransform::None,
            DimensionTransform::YyyyMm,
            DimensionTransform::Map,
        ] {
            assert_eq!(t.as_str().parse::<DimensionTransform>().unwrap(), t);
        }
    }
}
