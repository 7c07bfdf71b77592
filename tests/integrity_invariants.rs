// SPDX-License-Identifier: MIT OR Apache-2.0
//! Universally quantified invariants over the artifact store and the
//! relational store.

use apcore::apc_artifact::{ArtifactStore, content_hash};
use apcore::apc_core::document::{InvoiceDocument, LineItem};
use apcore::apc_core::{DataReference, FeedlotFamily};
use apcore::apc_store::{InvoiceUpsert, Store};
use chrono::Utc;

fn invoice_fixture(number: &str, lines: usize) -> InvoiceDocument {
    InvoiceDocument {
        invoice_number: Some(number.into()),
        line_items: (0..lines)
            .map(|i| LineItem {
                description: format!("FEED CHARGES {i}"),
                ..LineItem::default()
            })
            .collect(),
        ..InvoiceDocument::default()
    }
}

#[test]
fn every_reference_hash_matches_the_bytes_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    for (i, lines) in [0usize, 1, 3, 17].iter().enumerate() {
        let doc = invoice_fixture(&format!("inv-{i}"), *lines);
        let r = store
            .put_json(&doc, &format!("bovina/invoices/inv-{i}.json"))
            .unwrap();
        let bytes = std::fs::read(&r.storage_uri).unwrap();
        assert_eq!(content_hash(&bytes), r.content_hash);
        assert_eq!(bytes.len() as u64, r.size_bytes);
        // get_json with validation round-trips the object.
        let back: InvoiceDocument = store.get_json(&r, true).unwrap();
        assert_eq!(back, doc);
    }
}

#[test]
fn validated_reads_never_return_mismatched_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let r = store
        .put_json(&invoice_fixture("inv-x", 2), "x.json")
        .unwrap();
    // Flip one byte on disk.
    let mut bytes = std::fs::read(&r.storage_uri).unwrap();
    bytes[0] ^= 0x01;
    std::fs::write(&r.storage_uri, &bytes).unwrap();
    assert!(store.get_json::<InvoiceDocument>(&r, true).is_err());
}

#[test]
fn at_most_one_invoice_row_per_package_and_number() {
    let store = Store::open_in_memory().unwrap();
    store
        .upsert_package_started("pkg-1", FeedlotFamily::Bovina, &[])
        .unwrap();
    let r = DataReference {
        storage_uri: "/tmp/inv.json".into(),
        content_hash: "00".repeat(32),
        content_type: "application/json".into(),
        size_bytes: 2,
        stored_at: Utc::now(),
    };
    for _ in 0..5 {
        store
            .upsert_invoice(&InvoiceUpsert {
                package_id: "pkg-1",
                invoice_number: "13330",
                lot_number: None,
                invoice_date: None,
                total_amount: None,
                invoice_ref: &r,
            })
            .unwrap();
    }
    assert_eq!(store.invoice_count("pkg-1").unwrap(), 1);
}

#[test]
fn extracted_never_exceeds_total_in_store_accounting() {
    let store = Store::open_in_memory().unwrap();
    store
        .upsert_package_started("pkg-1", FeedlotFamily::Mesquite, &[])
        .unwrap();
    store.set_total_invoices("pkg-1", 3).unwrap();
    for _ in 0..3 {
        store.increment_extracted_invoices("pkg-1").unwrap();
        let row = store.package("pkg-1").unwrap().unwrap();
        assert!(row.extracted_invoices <= row.total_invoices);
    }
}
