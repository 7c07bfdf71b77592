// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for workflow integration tests.
#![allow(dead_code)]

use apc_artifact::ArtifactStore;
use apc_coding::SuspenseConfig;
use apc_core::FeedlotFamily;
use apc_core::catalog::{
    EntityProfile, GlMapping, KeyConfidence, MappingLevel, RoutingKey, RoutingKeyType, VendorRecord,
};
use apc_core::document::{
    FeedlotInfo, InvoiceDocument, InvoiceTotals, LineItem, LotInfo, LotReference, OwnerInfo,
    StatementDocument,
};
use apc_entity::ScoringWeights;
use apc_erp::MockErpClient;
use apc_store::Store;
use apc_vendor::MatchingConfig;
use apc_workflow::testing::{FixedSplitter, ScriptedExtractor};
use apc_workflow::{ActivityDeps, PackageWorkflowInput, WorkflowRunner};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn bovina_statement() -> StatementDocument {
    StatementDocument {
        feedlot: FeedlotInfo {
            name: Some("Bovina Feeders".into()),
            state: Some("TX".into()),
        },
        owner: OwnerInfo {
            name: Some("Sugar Mountain Livestock".into()),
            owner_number: Some("531".into()),
            state: Some("TX".into()),
        },
        period_start: Some(date(2024, 6, 1)),
        period_end: Some(date(2024, 6, 30)),
        lot_references: vec![
            LotReference {
                invoice_number: "13330".into(),
                lot_number: Some("20-3883".into()),
                statement_charge: Some(dec!(12345.67)),
                description: Some("feed note".into()),
            },
            LotReference {
                invoice_number: "13335".into(),
                lot_number: Some("20-3884".into()),
                statement_charge: Some(dec!(500.00)),
                description: None,
            },
        ],
        transactions: vec![],
        summary_rows: vec![],
    }
}

pub fn bovina_invoice(number: &str, lot: &str, total: Decimal) -> InvoiceDocument {
    InvoiceDocument {
        invoice_number: Some(number.into()),
        invoice_date: Some(date(2024, 6, 15)),
        feedlot: FeedlotInfo {
            name: Some("Bovina Feeders".into()),
            state: Some("TX".into()),
        },
        owner: OwnerInfo {
            name: Some("Sugar Mountain Livestock".into()),
            owner_number: Some("531".into()),
            state: Some("TX".into()),
        },
        lot: LotInfo {
            lot_number: Some(lot.into()),
            head_count: Some(120),
        },
        line_items: vec![LineItem {
            description: "FEED CHARGES".into(),
            quantity: None,
            rate: None,
            total: Some(total),
        }],
        totals: InvoiceTotals {
            total_amount_due: Some(total),
            total_period_charges: None,
        },
        page_index: None,
    }
}

/// The standard two-invoice Bovina script.
pub fn scripted_two_invoices() -> ScriptedExtractor {
    ScriptedExtractor::new()
        .with_statement(bovina_statement())
        .with_invoice(1, bovina_invoice("13330", "20-3883", dec!(12345.67)))
        .with_invoice(2, bovina_invoice("13335", "20-3884", dec!(500.00)))
}

pub struct Fixture {
    pub runner: WorkflowRunner,
    pub store: Store,
    pub artifacts: ArtifactStore,
    pub erp: Arc<MockErpClient>,
    pub extractor: Arc<ScriptedExtractor>,
    pub pdf_path: String,
    // Owns the scratch directory for the fixture's lifetime.
    _dir: tempfile::TempDir,
}

/// Build a runner over fresh in-memory state with the given script.
pub fn fixture(extractor: ScriptedExtractor, invoice_pages: usize) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("package.pdf");
    std::fs::write(&pdf_path, b"%PDF-1.4 fixture").unwrap();

    let store = Store::open_in_memory().unwrap();
    let artifacts = ArtifactStore::new(dir.path().join("artifacts")).unwrap();
    let erp = Arc::new(MockErpClient::new());
    let extractor = Arc::new(extractor);

    let deps = ActivityDeps {
        store: store.clone(),
        artifacts: artifacts.clone(),
        splitter: Arc::new(FixedSplitter::statement_and_invoices(invoice_pages)),
        extractor: extractor.clone(),
        erp: erp.clone(),
        vendor_directory: Some(erp.clone()),
        entity_weights: ScoringWeights::default(),
        vendor_matching: MatchingConfig::default(),
        suspense: SuspenseConfig::default(),
        customer_id: "default".into(),
    };

    Fixture {
        runner: WorkflowRunner::new(deps),
        store,
        artifacts,
        erp,
        extractor,
        pdf_path: pdf_path.display().to_string(),
        _dir: dir,
    }
}

pub fn package_input(fixture: &Fixture, package_id: &str) -> PackageWorkflowInput {
    PackageWorkflowInput {
        package_id: package_id.into(),
        feedlot_family: FeedlotFamily::Bovina,
        pdf_path: fixture.pdf_path.clone(),
        document_refs: vec![],
        use_cache: true,
    }
}

/// Seed the catalog so entity and vendor resolution auto-assign: a hard
/// owner-number key for BF2, a vendor catalog on the mock ERP, and GL
/// mappings for the categories the fixtures bill.
pub fn seed_resolution_catalog(fixture: &Fixture) {
    fixture
        .store
        .upsert_entity_profile(&EntityProfile {
            entity_id: "BF2".into(),
            entity_code: "BF2".into(),
            name: "Bovina Feeders Two LLC".into(),
            aliases: vec!["BOVINA".into()],
            default_dimensions: Default::default(),
            is_active: true,
        })
        .unwrap();
    fixture
        .store
        .add_routing_key(&RoutingKey {
            key_type: RoutingKeyType::OwnerNumber,
            key_value: "531".into(),
            entity_id: "BF2".into(),
            confidence: KeyConfidence::Hard,
            priority: 100,
        })
        .unwrap();
    fixture
        .store
        .add_routing_key(&RoutingKey {
            key_type: RoutingKeyType::FeedlotName,
            key_value: "BOVINA".into(),
            entity_id: "BF2".into(),
            confidence: KeyConfidence::Hard,
            priority: 50,
        })
        .unwrap();
    fixture
        .store
        .add_routing_key(&RoutingKey {
            key_type: RoutingKeyType::RemitState,
            key_value: "TX".into(),
            entity_id: "BF2".into(),
            confidence: KeyConfidence::Soft,
            priority: 10,
        })
        .unwrap();
    fixture
        .store
        .upsert_gl_mapping(&GlMapping {
            level: MappingLevel::Entity,
            entity_id: Some("BF2".into()),
            vendor_id: None,
            category: "FEED".into(),
            gl_account_ref: "5000".into(),
        })
        .unwrap();
    fixture.erp.seed_vendors(
        "BF2",
        vec![VendorRecord {
            id: "V-BF2".into(),
            number: "V00001".into(),
            name: "Bovina Feeders Inc".into(),
            address_line1: None,
            city: None,
            state: None,
            is_active: true,
        }],
    );
}
