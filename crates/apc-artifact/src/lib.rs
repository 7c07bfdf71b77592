// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-artifact
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Content-addressed artifact store.
//!
//! Artifacts are written atomically (tmp + rename) and addressed by the
//! SHA-256 of the exact bytes on disk. Retrieval with validation re-hashes
//! the bytes and refuses to return anything that does not match its
//! [`DataReference`]. The hash is a property of the bytes alone: the same
//! content produces the same hash regardless of where it is stored.

use apc_core::DataReference;
use apc_error::ApError;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors from the artifact store.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Filesystem failure.
    #[error("artifact i/o failed for {path}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// The referenced artifact does not exist.
    #[error("artifact not found: {path}")]
    NotFound {
        /// Path that was missing.
        path: String,
    },

    /// Serialization or deserialization failure.
    #[error("artifact serialization failed for {path}")]
    Json {
        /// Path involved.
        path: String,
        /// Underlying cause.
        #[source]
        source: serde_json::Error,
    },

    /// Stored bytes do not hash to the reference's `content_hash`.
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    Integrity {
        /// Path involved.
        path: String,
        /// Hash recorded in the reference.
        expected: String,
        /// Hash recomputed from the bytes.
        actual: String,
    },

    /// Refusing to overwrite existing content with different bytes.
    #[error("refusing to overwrite {path} with different content")]
    WouldClobber {
        /// Path involved.
        path: String,
    },
}

impl From<ArtifactError> for ApError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::Io { path, source } => {
                ApError::transient_with(format!("artifact i/o: {path}"), source)
            }
            ArtifactError::NotFound { path } => ApError::not_found(format!("artifact {path}")),
            ArtifactError::Json { path, source } => {
                ApError::schema("artifact", format!("{path}: {source}"))
            }
            ArtifactError::Integrity {
                path,
                expected,
                actual,
            } => ApError::integrity(format!("{path}: expected {expected}, got {actual}")),
            ArtifactError::WouldClobber { path } => {
                ApError::integrity(format!("overwrite with different content: {path}"))
            }
        }
    }
}

/// Hex-encoded SHA-256 of a byte slice.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Serialize a value to the canonical artifact form: UTF-8 JSON, two-space
/// indent, keys in producer order, trailing newline.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Filesystem-backed artifact store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a store rooted at `root`. The directory is created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| ArtifactError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store-relative path to an absolute one.
    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Serialize `value` as canonical JSON and store it under `relative`.
    ///
    /// The write is atomic at file granularity; parent directories are
    /// created on demand. Re-writing identical bytes is a no-op that returns
    /// a fresh reference; re-writing *different* bytes to an existing path is
    /// an error, because stored content is immutable.
    pub fn put_json<T: Serialize>(
        &self,
        value: &T,
        relative: &str,
    ) -> Result<DataReference, ArtifactError> {
        let path = self.resolve(relative);
        let bytes = canonical_json(value).map_err(|source| ArtifactError::Json {
            path: path.display().to_string(),
            source,
        })?;
        self.put_bytes(&bytes, &path, "application/json")
    }

    /// Store raw bytes under `relative` with the given content type.
    pub fn put_binary(
        &self,
        data: &[u8],
        relative: &str,
        content_type: &str,
    ) -> Result<DataReference, ArtifactError> {
        let path = self.resolve(relative);
        self.put_bytes(data, &path, content_type)
    }

    fn put_bytes(
        &self,
        bytes: &[u8],
        path: &Path,
        content_type: &str,
    ) -> Result<DataReference, ArtifactError> {
        let display_path = path.display().to_string();
        let hash = content_hash(bytes);

        if path.exists() {
            let existing = std::fs::read(path).map_err(|source| ArtifactError::Io {
                path: display_path.clone(),
                source,
            })?;
            if content_hash(&existing) != hash {
                return Err(ArtifactError::WouldClobber { path: display_path });
            }
            debug!(target: "ap.artifact", path = %display_path, "identical content already stored");
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
                    path: display_path.clone(),
                    source,
                })?;
            }
            // tmp + rename keeps readers from ever observing a partial write.
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, bytes).map_err(|source| ArtifactError::Io {
                path: tmp.display().to_string(),
                source,
            })?;
            std::fs::rename(&tmp, path).map_err(|source| ArtifactError::Io {
                path: display_path.clone(),
                source,
            })?;
            debug!(target: "ap.artifact", path = %display_path, size = bytes.len(), "artifact stored");
        }

        Ok(DataReference {
            storage_uri: display_path,
            content_hash: hash,
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as u64,
            stored_at: Utc::now(),
        })
    }

    /// Retrieve and deserialize a JSON artifact.
    ///
    /// With `validate` the bytes are re-hashed and compared against the
    /// reference before deserialization; a mismatch is an integrity error.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        r: &DataReference,
        validate: bool,
    ) -> Result<T, ArtifactError> {
        let bytes = self.get_binary(r, validate)?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
            path: r.storage_uri.clone(),
            source,
        })
    }

    /// Retrieve raw artifact bytes, optionally validating the hash.
    pub fn get_binary(&self, r: &DataReference, validate: bool) -> Result<Vec<u8>, ArtifactError> {
        let path = Path::new(&r.storage_uri);
        if !path.exists() {
            return Err(ArtifactError::NotFound {
                path: r.storage_uri.clone(),
            });
        }
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: r.storage_uri.clone(),
            source,
        })?;
        if validate {
            let actual = content_hash(&bytes);
            if actual != r.content_hash {
                return Err(ArtifactError::Integrity {
                    path: r.storage_uri.clone(),
                    expected: r.content_hash.clone(),
                    actual,
                });
            }
        }
        Ok(bytes)
    }

    /// Whether an artifact exists at the store-relative path.
    #[must_use]
    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_file()
    }

    /// List artifact file names directly under a store-relative directory,
    /// sorted for determinism. Missing directories list as empty.
    pub fn list(&self, relative: &str) -> Result<Vec<String>, ArtifactError> {
        let dir = self.resolve(relative);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|source| ArtifactError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            if entry.path().is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete an artifact at the store-relative path. Deleting a missing
    /// artifact is a no-op.
    pub fn delete(&self, relative: &str) -> Result<(), ArtifactError> {
        let path = self.resolve(relative);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Build a [`DataReference`] for content that already exists on disk,
    /// re-hashing the current bytes. Used by extraction caching.
    pub fn reference_existing(
        &self,
        relative: &str,
        content_type: &str,
    ) -> Result<DataReference, ArtifactError> {
        let path = self.resolve(relative);
        if !path.is_file() {
            return Err(ArtifactError::NotFound {
                path: path.display().to_string(),
            });
        }
        let bytes = std::fs::read(&path).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(DataReference {
            storage_uri: path.display().to_string(),
            content_hash: content_hash(&bytes),
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as u64,
            stored_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        value: u32,
    }

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_round_trip() {
        let (_dir, store) = store();
        let doc = Doc {
            name: "statement".into(),
            value: 7,
        };
        let r = store.put_json(&doc, "bovina/statement.json").unwrap();
        let back: Doc = store.get_json(&r, true).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn reference_hash_matches_bytes_on_disk() {
        let (_dir, store) = store();
        let r = store
            .put_json(&Doc { name: "x".into(), value: 1 }, "a/b.json")
            .unwrap();
        let bytes = std::fs::read(&r.storage_uri).unwrap();
        assert_eq!(content_hash(&bytes), r.content_hash);
        assert_eq!(bytes.len() as u64, r.size_bytes);
    }

    #[test]
    fn tampering_is_detected() {
        let (_dir, store) = store();
        let r = store
            .put_json(&Doc { name: "x".into(), value: 1 }, "t.json")
            .unwrap();
        std::fs::write(&r.storage_uri, b"{\"name\":\"x\",\"value\":2}\n").unwrap();
        let err = store.get_json::<Doc>(&r, true).unwrap_err();
        assert!(matches!(err, ArtifactError::Integrity { .. }), "{err}");
        // Without validation the (tampered) bytes still parse.
        let back: Doc = store.get_json(&r, false).unwrap();
        assert_eq!(back.value, 2);
    }

    #[test]
    fn identical_rewrite_is_a_no_op() {
        let (_dir, store) = store();
        let doc = Doc { name: "x".into(), value: 1 };
        let a = store.put_json(&doc, "same.json").unwrap();
        let b = store.put_json(&doc, "same.json").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn divergent_rewrite_is_rejected() {
        let (_dir, store) = store();
        store
            .put_json(&Doc { name: "x".into(), value: 1 }, "fixed.json")
            .unwrap();
        let err = store
            .put_json(&Doc { name: "x".into(), value: 2 }, "fixed.json")
            .unwrap_err();
        assert!(matches!(err, ArtifactError::WouldClobber { .. }), "{err}");
    }

    #[test]
    fn hash_is_independent_of_path() {
        let (_dir, store) = store();
        let doc = Doc { name: "x".into(), value: 1 };
        let a = store.put_json(&doc, "one/here.json").unwrap();
        let b = store.put_json(&doc, "two/there.json").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn list_is_sorted_and_missing_dir_is_empty() {
        let (_dir, store) = store();
        store.put_binary(b"b", "inv/b.json", "application/json").unwrap();
        store.put_binary(b"a", "inv/a.json", "application/json").unwrap();
        assert_eq!(store.list("inv").unwrap(), vec!["a.json", "b.json"]);
        assert!(store.list("nope").unwrap().is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, store) = store();
        store.put_binary(b"x", "gone.bin", "application/octet-stream").unwrap();
        store.delete("gone.bin").unwrap();
        store.delete("gone.bin").unwrap();
        assert!(!store.exists("gone.bin"));
    }

    #[test]
    fn reference_existing_rehashes() {
        let (_dir, store) = store();
        let original = store
            .put_json(&Doc { name: "x".into(), value: 1 }, "cached.json")
            .unwrap();
        let again = store
            .reference_existing("cached.json", "application/json")
            .unwrap();
        assert_eq!(again.content_hash, original.content_hash);
        assert!(store
            .reference_existing("missing.json", "application/json")
            .is_err());
    }
}
