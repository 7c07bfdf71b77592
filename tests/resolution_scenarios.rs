// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resolution scenarios across the catalog, resolvers, and store.

use apcore::apc_core::catalog::{
    EntityProfile, KeyConfidence, RoutingKey, RoutingKeyType, VendorRecord,
};
use apcore::apc_core::document::{InvoiceDocument, OwnerInfo};
use apcore::apc_entity::{EntityResolver, ScoringWeights, VendorDirectory};
use apcore::apc_error::ApResult;
use apcore::apc_store::Store;
use apcore::apc_vendor::{MatchType, MatchingConfig, VendorResolver};
use async_trait::async_trait;

struct EveryVendor;

#[async_trait]
impl VendorDirectory for EveryVendor {
    async fn vendor_exists_in_entity(&self, _name: &str, _entity: &str) -> ApResult<bool> {
        Ok(true)
    }
}

fn profile(id: &str, code: &str) -> EntityProfile {
    EntityProfile {
        entity_id: id.into(),
        entity_code: code.into(),
        name: format!("{code} Feeders"),
        aliases: Vec::new(),
        default_dimensions: Default::default(),
        is_active: true,
    }
}

#[tokio::test]
async fn owner_number_routing_auto_assigns_quickly() {
    let store = Store::open_in_memory().unwrap();
    // Fifty profiles; only BF2 carries the hard owner key.
    store.upsert_entity_profile(&profile("BF2", "BF2")).unwrap();
    for i in 0..49 {
        store
            .upsert_entity_profile(&profile(&format!("E{i:02}"), &format!("E{i:02}")))
            .unwrap();
    }
    store
        .add_routing_key(&RoutingKey {
            key_type: RoutingKeyType::OwnerNumber,
            key_value: "531".into(),
            entity_id: "BF2".into(),
            confidence: KeyConfidence::Hard,
            priority: 100,
        })
        .unwrap();

    let invoice = InvoiceDocument {
        owner: OwnerInfo {
            name: Some("Sugar Mountain Livestock".into()),
            owner_number: Some("531".into()),
            state: None,
        },
        ..InvoiceDocument::default()
    };
    let resolver = EntityResolver::new(store, ScoringWeights::default());
    let resolution = resolver
        .resolve(&invoice, None, Some(&EveryVendor))
        .await
        .unwrap();

    assert!(resolution.auto_assigned, "{:?}", resolution.reasons);
    assert_eq!(resolution.entity.as_ref().unwrap().entity_id, "BF2");
    assert!(
        resolution
            .reasons
            .iter()
            .any(|r| r.contains("Owner number '531' matches (hard)")),
        "{:?}",
        resolution.reasons
    );
    // The auto-assign gate held: score and margin both cleared.
    let weights = ScoringWeights::default();
    assert!(resolution.confidence >= weights.auto_assign_threshold);
    let second = resolution
        .candidates
        .get(1)
        .map(|c| c.score)
        .unwrap_or_default();
    assert!(resolution.confidence - second >= weights.margin_threshold);
    assert!(
        resolution.resolution_time_ms < 50,
        "resolved in {}ms",
        resolution.resolution_time_ms
    );
}

#[tokio::test]
async fn confirmed_alias_resolves_exactly_forever_after() {
    let store = Store::open_in_memory().unwrap();
    let resolver = VendorResolver::new(store, MatchingConfig::default(), "default");
    let catalog = vec![VendorRecord {
        id: "V-BF2".into(),
        number: "V00001".into(),
        name: "Bovina Feeders Inc".into(),
        address_line1: None,
        city: None,
        state: None,
        is_active: true,
    }];

    let extracted = "BOVINA FEEDERS INC. DBA BF2";
    resolver
        .confirm_match(extracted, "BF2", "V-BF2", "V00001", "Bovina Feeders Inc", "user")
        .unwrap();

    let resolution = resolver.resolve(extracted, "BF2", &catalog, None).unwrap();
    assert!(resolution.auto_matched);
    assert_eq!(resolution.match_type, MatchType::ExactAlias);
    assert_eq!(resolution.confidence, rust_decimal::Decimal::from(100));
    assert!(resolution.candidates.is_empty());
    assert_eq!(resolution.vendor_id.as_deref(), Some("V-BF2"));

    // A differently-spelled extraction of the same name normalizes to the
    // same alias and also hits exactly.
    let respelled = resolver
        .resolve("Bovina Feeders, Inc. dba BF2", "BF2", &catalog, None)
        .unwrap();
    assert_eq!(respelled.match_type, MatchType::ExactAlias);
}
