// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalog row operations: entity profiles, routing keys, vendor aliases,
//! GL mappings, and dimension rules.

use crate::{Store, StoreError, StoreResult, now_text};
use apc_core::catalog::{
    DimensionRule, DimensionTransform, EntityProfile, GlMapping, KeyConfidence, MappingLevel,
    RoutingKey, RoutingKeyType, VendorAlias,
};
use rusqlite::{OptionalExtension, params};
use std::str::FromStr;

impl Store {
    /// Insert or replace an entity profile.
    pub fn upsert_entity_profile(&self, profile: &EntityProfile) -> StoreResult<()> {
        let aliases =
            serde_json::to_string(&profile.aliases).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let dims = serde_json::to_string(&profile.default_dimensions)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn().execute(
            "INSERT INTO entity_profiles
                 (entity_id, entity_code, name, aliases, default_dimensions, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(entity_id) DO UPDATE SET
                 entity_code = excluded.entity_code,
                 name = excluded.name,
                 aliases = excluded.aliases,
                 default_dimensions = excluded.default_dimensions,
                 is_active = excluded.is_active",
            params![
                profile.entity_id,
                profile.entity_code,
                profile.name,
                aliases,
                dims,
                profile.is_active,
            ],
        )?;
        Ok(())
    }

    /// All entity profiles, optionally restricted to active ones, ordered by
    /// entity code for deterministic scoring.
    pub fn entity_profiles(&self, active_only: bool) -> StoreResult<Vec<EntityProfile>> {
        let sql = if active_only {
            "SELECT entity_id, entity_code, name, aliases, default_dimensions, is_active
             FROM entity_profiles WHERE is_active = 1 ORDER BY entity_code"
        } else {
            "SELECT entity_id, entity_code, name, aliases, default_dimensions, is_active
             FROM entity_profiles ORDER BY entity_code"
        };
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let raw: Vec<_> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(|(id, code, name, aliases, dims, active)| {
                Ok(EntityProfile {
                    entity_id: id,
                    entity_code: code,
                    name,
                    aliases: serde_json::from_str(&aliases)
                        .map_err(|e| StoreError::Corrupt(format!("bad aliases: {e}")))?,
                    default_dimensions: serde_json::from_str(&dims)
                        .map_err(|e| StoreError::Corrupt(format!("bad dimensions: {e}")))?,
                    is_active: active,
                })
            })
            .collect()
    }

    /// Read one entity profile.
    pub fn entity_profile(&self, entity_id: &str) -> StoreResult<Option<EntityProfile>> {
        Ok(self
            .entity_profiles(false)?
            .into_iter()
            .find(|p| p.entity_id == entity_id))
    }

    /// Add a routing key. Hard keys are globally unique per
    /// `(key_type, key_value)`; a conflicting hard insert fails.
    pub fn add_routing_key(&self, key: &RoutingKey) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO routing_keys (key_type, key_value, entity_id, confidence, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key_type, key_value, entity_id) DO UPDATE SET
                 confidence = excluded.confidence,
                 priority = excluded.priority",
            params![
                key.key_type.as_str(),
                key.key_value,
                key.entity_id,
                key.confidence.as_str(),
                key.priority,
            ],
        )?;
        Ok(())
    }

    /// Routing keys of one type for one entity, optionally narrowed to an
    /// exact value. Ordered by priority descending, then value.
    pub fn routing_keys(
        &self,
        key_type: RoutingKeyType,
        entity_id: &str,
        key_value: Option<&str>,
    ) -> StoreResult<Vec<RoutingKey>> {
        let key_type_text = key_type.as_str();
        let (sql, args): (&str, Vec<&dyn rusqlite::ToSql>) = match &key_value {
            Some(value) => (
                "SELECT key_type, key_value, entity_id, confidence, priority
                 FROM routing_keys
                 WHERE key_type = ?1 AND entity_id = ?2 AND key_value = ?3
                 ORDER BY priority DESC, key_value",
                vec![&key_type_text, &entity_id, value],
            ),
            None => (
                "SELECT key_type, key_value, entity_id, confidence, priority
                 FROM routing_keys
                 WHERE key_type = ?1 AND entity_id = ?2
                 ORDER BY priority DESC, key_value",
                vec![&key_type_text, &entity_id],
            ),
        };
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let raw: Vec<_> = stmt
            .query_map(&args[..], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(|(kt, value, entity, confidence, priority)| {
                Ok(RoutingKey {
                    key_type: RoutingKeyType::from_str(&kt)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    key_value: value,
                    entity_id: entity,
                    confidence: KeyConfidence::from_str(&confidence)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    priority,
                })
            })
            .collect()
    }

    /// Persist a confirmed vendor alias. Idempotent on the unique key: a
    /// repeat confirmation refreshes the vendor fields.
    pub fn put_vendor_alias(&self, alias: &VendorAlias) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO vendor_aliases
                 (customer_id, entity_id, alias_normalized, alias_original,
                  vendor_id, vendor_number, vendor_name, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(customer_id, entity_id, alias_normalized) DO UPDATE SET
                 alias_original = excluded.alias_original,
                 vendor_id = excluded.vendor_id,
                 vendor_number = excluded.vendor_number,
                 vendor_name = excluded.vendor_name,
                 created_by = excluded.created_by",
            params![
                alias.customer_id,
                alias.entity_id,
                alias.alias_normalized,
                alias.alias_original,
                alias.vendor_id,
                alias.vendor_number,
                alias.vendor_name,
                alias.created_by,
                now_text(),
            ],
        )?;
        Ok(())
    }

    /// Exact alias lookup.
    pub fn vendor_alias(
        &self,
        customer_id: &str,
        entity_id: &str,
        alias_normalized: &str,
    ) -> StoreResult<Option<VendorAlias>> {
        let row = self
            .conn()
            .query_row(
                "SELECT customer_id, entity_id, alias_normalized, alias_original,
                        vendor_id, vendor_number, vendor_name, created_by
                 FROM vendor_aliases
                 WHERE customer_id = ?1 AND entity_id = ?2 AND alias_normalized = ?3",
                params![customer_id, entity_id, alias_normalized],
                |row| {
                    Ok(VendorAlias {
                        customer_id: row.get(0)?,
                        entity_id: row.get(1)?,
                        alias_normalized: row.get(2)?,
                        alias_original: row.get(3)?,
                        vendor_id: row.get(4)?,
                        vendor_number: row.get(5)?,
                        vendor_name: row.get(6)?,
                        created_by: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Insert or replace a GL mapping row.
    pub fn upsert_gl_mapping(&self, mapping: &GlMapping) -> StoreResult<()> {
        if mapping.level == MappingLevel::Suspense {
            return Err(StoreError::Corrupt(
                "suspense is a fallback, not a mapping row".into(),
            ));
        }
        self.conn().execute(
            "INSERT INTO gl_mappings (level, entity_id, vendor_id, category, gl_account_ref)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(level, entity_id, vendor_id, category) DO UPDATE SET
                 gl_account_ref = excluded.gl_account_ref",
            params![
                mapping.level.as_str(),
                mapping.entity_id,
                mapping.vendor_id,
                mapping.category,
                mapping.gl_account_ref,
            ],
        )?;
        Ok(())
    }

    /// Exact mapping lookup at one level.
    pub fn gl_mapping(
        &self,
        level: MappingLevel,
        entity_id: Option<&str>,
        vendor_id: Option<&str>,
        category: &str,
    ) -> StoreResult<Option<GlMapping>> {
        let row = self
            .conn()
            .query_row(
                "SELECT level, entity_id, vendor_id, category, gl_account_ref
                 FROM gl_mappings
                 WHERE level = ?1 AND entity_id IS ?2 AND vendor_id IS ?3 AND category = ?4",
                params![level.as_str(), entity_id, vendor_id, category],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(level, entity, vendor, category, gl)| {
            Ok(GlMapping {
                level: MappingLevel::from_str(&level)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                entity_id: entity,
                vendor_id: vendor,
                category,
                gl_account_ref: gl,
            })
        })
        .transpose()
    }

    /// Every mapping row visible to an entity (vendor- and entity-level rows
    /// for it, plus global rows).
    pub fn gl_mappings_for_entity(&self, entity_id: &str) -> StoreResult<Vec<GlMapping>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT level, entity_id, vendor_id, category, gl_account_ref
             FROM gl_mappings
             WHERE entity_id = ?1 OR entity_id IS NULL
             ORDER BY level, category",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![entity_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(|(level, entity, vendor, category, gl)| {
                Ok(GlMapping {
                    level: MappingLevel::from_str(&level)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    entity_id: entity,
                    vendor_id: vendor,
                    category,
                    gl_account_ref: gl,
                })
            })
            .collect()
    }

    /// Insert or replace a dimension rule.
    pub fn upsert_dimension_rule(&self, rule: &DimensionRule) -> StoreResult<()> {
        let params_json = serde_json::to_string(&rule.transform_params)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn().execute(
            "INSERT INTO dimension_rules
                 (entity_id, dimension_code, source_field, transform, transform_params,
                  default_value, is_required)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(entity_id, dimension_code) DO UPDATE SET
                 source_field = excluded.source_field,
                 transform = excluded.transform,
                 transform_params = excluded.transform_params,
                 default_value = excluded.default_value,
                 is_required = excluded.is_required",
            params![
                rule.entity_id,
                rule.dimension_code,
                rule.source_field,
                rule.transform.as_str(),
                params_json,
                rule.default_value,
                rule.is_required,
            ],
        )?;
        Ok(())
    }

    /// Dimension rules scoped to an entity plus global rules, ordered by
    /// dimension code. Entity-scoped rules shadow global ones with the same
    /// code.
    pub fn dimension_rules(&self, entity_id: &str) -> StoreResult<Vec<DimensionRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT entity_id, dimension_code, source_field, transform, transform_params,
                    default_value, is_required
             FROM dimension_rules
             WHERE entity_id = ?1 OR entity_id IS NULL
             ORDER BY dimension_code, entity_id IS NULL",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![entity_id], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        let mut rules = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for (entity, code, field, transform, params_json, default, required) in raw {
            // The ORDER BY puts entity-scoped rules first per code.
            if !seen.insert(code.clone()) {
                continue;
            }
            rules.push(DimensionRule {
                entity_id: entity,
                dimension_code: code,
                source_field: field,
                transform: DimensionTransform::from_str(&transform)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                transform_params: serde_json::from_str(&params_json)
                    .map_err(|e| StoreError::Corrupt(format!("bad transform_params: {e}")))?,
                default_value: default,
                is_required: required,
            });
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, code: &str) -> EntityProfile {
        EntityProfile {
            entity_id: id.into(),
            entity_code: code.into(),
            name: format!("{code} Feeders"),
            aliases: vec![],
            default_dimensions: Default::default(),
            is_active: true,
        }
    }

    #[test]
    fn entity_profiles_filter_inactive() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_entity_profile(&profile("e1", "BF2")).unwrap();
        let mut inactive = profile("e2", "MESQ");
        inactive.is_active = false;
        store.upsert_entity_profile(&inactive).unwrap();
        assert_eq!(store.entity_profiles(true).unwrap().len(), 1);
        assert_eq!(store.entity_profiles(false).unwrap().len(), 2);
    }

    #[test]
    fn hard_routing_keys_are_globally_unique() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_entity_profile(&profile("e1", "BF2")).unwrap();
        store.upsert_entity_profile(&profile("e2", "MESQ")).unwrap();
        store
            .add_routing_key(&RoutingKey {
                key_type: RoutingKeyType::OwnerNumber,
                key_value: "531".into(),
                entity_id: "e1".into(),
                confidence: KeyConfidence::Hard,
                priority: 100,
            })
            .unwrap();
        let err = store
            .add_routing_key(&RoutingKey {
                key_type: RoutingKeyType::OwnerNumber,
                key_value: "531".into(),
                entity_id: "e2".into(),
                confidence: KeyConfidence::Hard,
                priority: 50,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn soft_routing_keys_may_overlap() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_entity_profile(&profile("e1", "BF2")).unwrap();
        store.upsert_entity_profile(&profile("e2", "MESQ")).unwrap();
        for entity in ["e1", "e2"] {
            store
                .add_routing_key(&RoutingKey {
                    key_type: RoutingKeyType::RemitState,
                    key_value: "TX".into(),
                    entity_id: entity.into(),
                    confidence: KeyConfidence::Soft,
                    priority: 10,
                })
                .unwrap();
        }
        let keys = store
            .routing_keys(RoutingKeyType::RemitState, "e2", Some("TX"))
            .unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn vendor_alias_confirmation_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let alias = VendorAlias {
            customer_id: "default".into(),
            entity_id: "e1".into(),
            alias_normalized: "BOVINA FEEDERS BF2".into(),
            alias_original: "BOVINA FEEDERS INC. DBA BF2".into(),
            vendor_id: "V-BF2".into(),
            vendor_number: "V00001".into(),
            vendor_name: "Bovina Feeders Inc".into(),
            created_by: "user".into(),
        };
        store.put_vendor_alias(&alias).unwrap();
        store.put_vendor_alias(&alias).unwrap();
        let found = store
            .vendor_alias("default", "e1", "BOVINA FEEDERS BF2")
            .unwrap()
            .unwrap();
        assert_eq!(found.vendor_id, "V-BF2");
    }

    #[test]
    fn gl_mapping_lookup_by_level() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_gl_mapping(&GlMapping {
                level: MappingLevel::Entity,
                entity_id: Some("e1".into()),
                vendor_id: None,
                category: "FEED".into(),
                gl_account_ref: "5000".into(),
            })
            .unwrap();
        let hit = store
            .gl_mapping(MappingLevel::Entity, Some("e1"), None, "FEED")
            .unwrap();
        assert_eq!(hit.unwrap().gl_account_ref, "5000");
        let miss = store
            .gl_mapping(MappingLevel::Entity, Some("e1"), None, "VET")
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn suspense_rows_are_rejected() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .upsert_gl_mapping(&GlMapping {
                level: MappingLevel::Suspense,
                entity_id: None,
                vendor_id: None,
                category: "FEED".into(),
                gl_account_ref: "9999".into(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn entity_rules_shadow_global_rules() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_dimension_rule(&DimensionRule {
                entity_id: None,
                dimension_code: "LOT".into(),
                source_field: "invoice.lot.lot_number".into(),
                transform: DimensionTransform::None,
                transform_params: Default::default(),
                default_value: None,
                is_required: true,
            })
            .unwrap();
        store
            .upsert_dimension_rule(&DimensionRule {
                entity_id: Some("e1".into()),
                dimension_code: "LOT".into(),
                source_field: "statement.lot_references.0.lot_number".into(),
                transform: DimensionTransform::Uppercase,
                transform_params: Default::default(),
                default_value: None,
                is_required: true,
            })
            .unwrap();
        let rules = store.dimension_rules("e1").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].transform, DimensionTransform::Uppercase);
    }
}
