// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-store
#![deny(unsafe_code)]
//!
//! SQLite persistence layer.
//!
//! One [`Store`] owns the connection; clones share it. Writes use short
//! transactions and never hold locks across await points (the API is
//! synchronous; callers run inside activities where brief blocking is
//! acceptable). Status-transition legality is *not* checked here; the
//! workflow is the sole writer and enforces the state machine.
//!
//! Idempotency rules:
//! - `(package_id, invoice_number)` conflicts upsert with an `updated_at`
//!   refresh.
//! - duplicate audit `event_id`s from workflow replay are treated as success.
//! - `progress_events.ordinal` is assigned server-side, monotone per package.

mod catalog;
mod events;
mod journal;
mod packages;
mod rows;
mod schema;

pub use events::AuditFilter;
pub use journal::{ActivityOutcome, ActivityRecord, WorkflowRecord, WorkflowState};
pub use packages::InvoiceUpsert;
pub use rows::{InvoiceRow, PackageRow};

use apc_error::ApError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A referenced row does not exist.
    #[error("row not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded (status string, JSON blob, ...).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for lock/busy conditions that are safe to retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<StoreError> for ApError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            return ApError::transient_with("database busy", e);
        }
        match e {
            StoreError::NotFound(what) => ApError::not_found(what),
            StoreError::Corrupt(detail) => ApError::integrity(detail),
            other => ApError::internal(other.to_string()),
        }
    }
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to the relational store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if necessary) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open an in-memory store. Used by tests and the worker's dry-run mode.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::DDL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }
}

/// Current UTC timestamp in the store's canonical text form (RFC 3339,
/// second precision).
pub(crate) fn now_text() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

pub(crate) fn parse_timestamp(s: &str) -> StoreResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{s}': {e}")))
}
