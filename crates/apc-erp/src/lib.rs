// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-erp
#![deny(unsafe_code)]
//!
//! The ERP boundary.
//!
//! The core never talks to a specific ERP: it consumes the [`ErpClient`]
//! trait (normalized listings, idempotent draft creation, post, status) and
//! produces the neutral purchase-invoice envelope. Wire adapters live
//! outside this workspace.

/// Purchase-invoice payload envelope and builder.
pub mod payload;

pub use payload::{PayloadHeader, PayloadLine, PurchaseInvoicePayload, build_payload};

use apc_core::catalog::VendorRecord;
use apc_entity::VendorDirectory;
use apc_error::{ApError, ApResult};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A normalized reference returned by ERP listing operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErpRef {
    /// Opaque id in the ERP.
    pub id: String,
    /// Short code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Whether the record is usable.
    pub is_active: bool,
}

/// Status of a posted (or posting) document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingStatus {
    /// Draft exists, not posted.
    Draft,
    /// Posting in flight.
    Posting,
    /// Posted.
    Posted,
    /// The ERP rejected the document.
    Rejected,
}

/// Reference to a created draft document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DraftInvoiceRef {
    /// Document id in the ERP.
    pub id: String,
    /// Document number, when assigned.
    pub number: Option<String>,
    /// Current status.
    pub status: PostingStatus,
}

/// The consumed ERP surface. Implementations wrap a concrete ERP's API and
/// normalize its records.
#[async_trait]
pub trait ErpClient: Send + Sync {
    /// List the companies (entities) visible to the connection.
    async fn list_entities(&self) -> ApResult<Vec<ErpRef>>;

    /// List vendors for an entity.
    async fn list_vendors(&self, entity_id: &str) -> ApResult<Vec<VendorRecord>>;

    /// List GL accounts for an entity.
    async fn list_gl_accounts(&self, entity_id: &str) -> ApResult<Vec<ErpRef>>;

    /// List dimension codes for an entity.
    async fn list_dimensions(&self, entity_id: &str) -> ApResult<Vec<ErpRef>>;

    /// List the allowed values of one dimension.
    async fn list_dimension_values(
        &self,
        entity_id: &str,
        dimension_code: &str,
    ) -> ApResult<Vec<ErpRef>>;

    /// Create a draft purchase invoice. Idempotent on
    /// `payload.idempotency_key`: re-sending the same key returns the
    /// original draft.
    async fn create_draft_purchase_invoice(
        &self,
        entity_id: &str,
        payload: &PurchaseInvoicePayload,
    ) -> ApResult<DraftInvoiceRef>;

    /// Post a draft.
    async fn post_purchase_invoice(&self, entity_id: &str, draft_id: &str) -> ApResult<()>;

    /// Query a document's status.
    async fn invoice_status(&self, entity_id: &str, draft_id: &str) -> ApResult<PostingStatus>;
}

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

/// In-memory [`ErpClient`] for tests and dry runs.
///
/// Drafts are stored keyed by idempotency key, so replayed creates return
/// the original draft id.
#[derive(Debug, Default)]
pub struct MockErpClient {
    vendors: std::sync::Mutex<std::collections::BTreeMap<String, Vec<VendorRecord>>>,
    drafts: std::sync::Mutex<std::collections::BTreeMap<String, DraftInvoiceRef>>,
}

impl MockErpClient {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the vendor catalog for an entity.
    pub fn seed_vendors(&self, entity_id: &str, vendors: Vec<VendorRecord>) {
        self.vendors
            .lock()
            .expect("mock lock poisoned")
            .insert(entity_id.to_string(), vendors);
    }

    /// Number of drafts created so far.
    #[must_use]
    pub fn draft_count(&self) -> usize {
        self.drafts.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl ErpClient for MockErpClient {
    async fn list_entities(&self) -> ApResult<Vec<ErpRef>> {
        Ok(self
            .vendors
            .lock()
            .expect("mock lock poisoned")
            .keys()
            .map(|id| ErpRef {
                id: id.clone(),
                code: id.clone(),
                name: id.clone(),
                is_active: true,
            })
            .collect())
    }

    async fn list_vendors(&self, entity_id: &str) -> ApResult<Vec<VendorRecord>> {
        Ok(self
            .vendors
            .lock()
            .expect("mock lock poisoned")
            .get(entity_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_gl_accounts(&self, _entity_id: &str) -> ApResult<Vec<ErpRef>> {
        Ok(Vec::new())
    }

    async fn list_dimensions(&self, _entity_id: &str) -> ApResult<Vec<ErpRef>> {
        Ok(Vec::new())
    }

    async fn list_dimension_values(
        &self,
        _entity_id: &str,
        _dimension_code: &str,
    ) -> ApResult<Vec<ErpRef>> {
        Ok(Vec::new())
    }

    async fn create_draft_purchase_invoice(
        &self,
        _entity_id: &str,
        payload: &PurchaseInvoicePayload,
    ) -> ApResult<DraftInvoiceRef> {
        let mut drafts = self.drafts.lock().expect("mock lock poisoned");
        if let Some(existing) = drafts.get(&payload.idempotency_key) {
            return Ok(existing.clone());
        }
        let draft = DraftInvoiceRef {
            id: format!("draft-{}", drafts.len() + 1),
            number: None,
            status: PostingStatus::Draft,
        };
        drafts.insert(payload.idempotency_key.clone(), draft.clone());
        Ok(draft)
    }

    async fn post_purchase_invoice(&self, _entity_id: &str, draft_id: &str) -> ApResult<()> {
        let mut drafts = self.drafts.lock().expect("mock lock poisoned");
        for draft in drafts.values_mut() {
            if draft.id == draft_id {
                draft.status = PostingStatus::Posted;
                return Ok(());
            }
        }
        Err(ApError::not_found(format!("draft {draft_id}")))
    }

    async fn invoice_status(&self, _entity_id: &str, draft_id: &str) -> ApResult<PostingStatus> {
        let drafts = self.drafts.lock().expect("mock lock poisoned");
        drafts
            .values()
            .find(|d| d.id == draft_id)
            .map(|d| d.status)
            .ok_or_else(|| ApError::not_found(format!("draft {draft_id}")))
    }
}

#[async_trait]
impl VendorDirectory for MockErpClient {
    async fn vendor_exists_in_entity(&self, vendor_name: &str, entity_id: &str) -> ApResult<bool> {
        let needle = vendor_name.to_uppercase();
        Ok(self
            .list_vendors(entity_id)
            .await?
            .iter()
            .any(|v| v.name.to_uppercase().contains(&needle) || needle.contains(&v.name.to_uppercase())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(key: &str) -> PurchaseInvoicePayload {
        PurchaseInvoicePayload {
            header: PayloadHeader {
                vendor_code: "V00001".into(),
                external_document_no: "13330".into(),
                document_date: "2024-06-15".into(),
                due_date: None,
                posting_date: None,
                currency_code: None,
                total_amount: "12345.67".into(),
            },
            lines: Vec::new(),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn draft_creation_is_idempotent_on_key() {
        let erp = MockErpClient::new();
        let a = erp
            .create_draft_purchase_invoice("BF2", &payload("pkg-1:13330"))
            .await
            .unwrap();
        let b = erp
            .create_draft_purchase_invoice("BF2", &payload("pkg-1:13330"))
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(erp.draft_count(), 1);
    }

    #[tokio::test]
    async fn post_then_status() {
        let erp = MockErpClient::new();
        let draft = erp
            .create_draft_purchase_invoice("BF2", &payload("k"))
            .await
            .unwrap();
        erp.post_purchase_invoice("BF2", &draft.id).await.unwrap();
        let status = erp.invoice_status("BF2", &draft.id).await.unwrap();
        assert_eq!(status, PostingStatus::Posted);
    }

    #[tokio::test]
    async fn vendor_directory_matches_by_containment() {
        let erp = MockErpClient::new();
        erp.seed_vendors(
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
        assert!(
            erp.vendor_exists_in_entity("Bovina Feeders", "BF2")
                .await
                .unwrap()
        );
        assert!(
            !erp.vendor_exists_in_entity("Mesquite Cattle", "BF2")
                .await
                .unwrap()
        );
    }
}
