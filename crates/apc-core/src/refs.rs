// SPDX-License-Identifier: MIT OR Apache-2.0
//! Immutable artifact references.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a stored artifact.
///
/// A reference never contains document bytes; it is the only form in which
/// documents travel through workflow history. Retrieving the bytes behind a
/// reference and re-hashing them must reproduce `content_hash`; any mismatch
/// is a fatal integrity error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DataReference {
    /// Absolute path (or URI) of the stored artifact.
    pub storage_uri: String,
    /// Hex-encoded SHA-256 of the exact bytes written.
    pub content_hash: String,
    /// MIME type, e.g. `application/json`.
    pub content_type: String,
    /// Size of the artifact in bytes.
    pub size_bytes: u64,
    /// When the artifact was stored (UTC).
    pub stored_at: DateTime<Utc>,
}

impl DataReference {
    /// File name component of `storage_uri`, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        std::path::Path::new(&self.storage_uri)
            .file_name()
            .and_then(|n| n.to_str())
    }
}

/// References to every artifact extracted from one package.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedPackageRefs {
    /// Lower-case feedlot key (`bovina`, `mesquite`).
    pub feedlot_key: String,
    /// Statement artifact, when a statement page was present.
    pub statement_ref: Option<DataReference>,
    /// One reference per extracted invoice, in page order.
    pub invoice_refs: Vec<DataReference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataReference {
        DataReference {
            storage_uri: "/artifacts/bovina/invoices/13330.json".into(),
            content_hash: "ab".repeat(32),
            content_type: "application/json".into(),
            size_bytes: 512,
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn file_name_is_last_component() {
        assert_eq!(sample().file_name(), Some("13330.json"));
    }

    #[test]
    fn serde_round_trip() {
        let r = sample();
        let json = serde_json::to_string(&r).unwrap();
        let back: DataReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
