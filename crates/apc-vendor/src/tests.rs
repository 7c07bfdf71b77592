// SPDX-License-Identifier: MIT OR Apache-2.0
use super::*;
use apc_store::Store;

fn vendor(id: &str, number: &str, name: &str) -> VendorRecord {
    VendorRecord {
        id: id.into(),
        number: number.into(),
        name: name.into(),
        address_line1: None,
        city: None,
        state: None,
        is_active: true,
    }
}

fn catalog() -> Vec<VendorRecord> {
    vec![
        vendor("V-BF2", "V00001", "Bovina Feeders Inc"),
        vendor("V-MESQ", "V00002", "Mesquite Cattle Feeders LLC"),
        vendor("V-SUGAR", "V00003", "Sugar Mountain Livestock"),
    ]
}

fn resolver() -> VendorResolver {
    VendorResolver::new(
        Store::open_in_memory().unwrap(),
        MatchingConfig::default(),
        "default",
    )
}

#[test]
fn close_name_auto_matches() {
    let r = resolver();
    let resolution = r
        .resolve("BOVINA FEEDERS INC.", "BF2", &catalog(), None)
        .unwrap();
    assert!(resolution.auto_matched, "{:?}", resolution.reasons);
    assert_eq!(resolution.vendor_id.as_deref(), Some("V-BF2"));
    assert!(resolution.confidence >= MatchingConfig::default().auto_threshold);
}

#[test]
fn ambiguous_name_returns_candidates() {
    let r = resolver();
    let resolution = r.resolve("Feeders", "BF2", &catalog(), None).unwrap();
    assert!(!resolution.auto_matched);
    // Either fuzzy candidates below the gate, or nothing at all, never an
    // auto-match on a bare generic token.
    assert!(resolution.vendor_id.is_none());
}

#[test]
fn no_catalog_requires_confirmation() {
    let r = resolver();
    let resolution = r.resolve("Bovina Feeders", "BF2", &[], None).unwrap();
    assert!(!resolution.auto_matched);
    assert_eq!(resolution.match_type, MatchType::NoMatch);
    assert!(resolution.reasons[0].contains("no vendor catalog"));
}

#[test]
fn confirm_then_exact_alias_hit() {
    let r = resolver();
    let extracted = "BOVINA FEEDERS INC. DBA BF2";
    r.confirm_match(extracted, "BF2", "V-BF2", "V00001", "Bovina Feeders Inc", "user")
        .unwrap();

    let resolution = r.resolve(extracted, "BF2", &catalog(), None).unwrap();
    assert!(resolution.auto_matched);
    assert_eq!(resolution.match_type, MatchType::ExactAlias);
    assert_eq!(resolution.confidence, rust_decimal_macros::dec!(100));
    assert!(resolution.candidates.is_empty());
    assert_eq!(resolution.vendor_id.as_deref(), Some("V-BF2"));
}

#[test]
fn alias_is_scoped_to_entity() {
    let r = resolver();
    r.confirm_match("Bovina Feeders", "BF2", "V-BF2", "V00001", "Bovina Feeders Inc", "user")
        .unwrap();
    let other_entity = r.resolve("Bovina Feeders", "MESQ", &[], None).unwrap();
    assert_ne!(other_entity.match_type, MatchType::ExactAlias);
}

#[test]
fn confirm_match_is_idempotent() {
    let r = resolver();
    let a = r
        .confirm_match("Bovina Feeders", "BF2", "V-BF2", "V00001", "Bovina Feeders Inc", "user")
        .unwrap();
    let b = r
        .confirm_match("Bovina Feeders", "BF2", "V-BF2", "V00001", "Bovina Feeders Inc", "user")
        .unwrap();
    assert_eq!(a.alias_normalized, b.alias_normalized);
}

#[test]
fn address_agreement_lifts_the_score() {
    let mut with_addr = catalog();
    with_addr[0].address_line1 = Some("100 Feed Rd".into());
    with_addr[0].city = Some("Bovina".into());
    with_addr[0].state = Some("TX".into());

    let r = resolver();
    let extracted_addr = ExtractedAddress {
        address_line1: Some("100 Feed Rd.".into()),
        city: Some("Bovina".into()),
        state: Some("Texas".into()),
    };
    let with_address = r
        .resolve("Bovina Feeders", "BF2", &with_addr, Some(&extracted_addr))
        .unwrap();
    let without_address = r
        .resolve("Bovina Feeders", "BF2", &with_addr, None)
        .unwrap();
    let top_with = &with_address.candidates[0];
    let top_without = &without_address.candidates[0];
    assert!(top_with.address_score > rust_decimal_macros::dec!(90));
    assert_eq!(top_with.match_type, MatchType::AddressMatch);
    // Name-only score for this pair is already high; the blended score must
    // not collapse when the address agrees.
    assert!(top_with.score >= top_without.score - rust_decimal_macros::dec!(5));
}

#[test]
fn inactive_vendors_are_skipped() {
    let mut vendors = catalog();
    vendors[0].is_active = false;
    let r = resolver();
    let resolution = r
        .resolve("Bovina Feeders Inc", "BF2", &vendors, None)
        .unwrap();
    assert!(resolution.candidates.iter().all(|c| c.vendor_id != "V-BF2"));
}

#[test]
fn empty_name_is_no_match() {
    let r = resolver();
    let resolution = r.resolve("  ", "BF2", &catalog(), None).unwrap();
    assert_eq!(resolution.match_type, MatchType::NoMatch);
    assert!(!resolution.auto_matched);
}

#[test]
fn candidates_are_sorted_descending() {
    let r = resolver();
    let resolution = r
        .resolve("Mesquite Cattle Feeders", "MESQ", &catalog(), None)
        .unwrap();
    let scores: Vec<_> = resolution.candidates.iter().map(|c| c.score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
    assert_eq!(resolution.candidates[0].vendor_id, "V-MESQ");
}
