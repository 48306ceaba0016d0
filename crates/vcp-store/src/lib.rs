// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-store
//!
//! SQLite-backed persistent store for every long-lived entity: collections,
//! artifacts, approvals and sign-offs, scope audits, normalized records,
//! integration connections, sync runs, documents, and user confirmations.
//!
//! Connections are short-lived (one per operation); SQLite's own locking
//! serializes concurrent access. Writes for one collection cycle go
//! through [`PlatformStore::record_collection_cycle`], which wraps them in
//! a single transaction so the cycle's rows appear all-or-nothing.
#![deny(unsafe_code)]

mod approvals;
mod collections;
mod confirmations;
mod integrations;
mod rows;
mod schema;

pub use approvals::NewApproval;
pub use collections::{CollectionCycleRecord, NewNormalizedRecord};
pub use integrations::{ConnectionUpsert, NewSyncRun};
pub use rows::{
    ApprovalPayload, ApprovalRow, ArtifactRow, CollectionRow, ConfirmationRow, ConnectionRow,
    IntegrationDocumentRow, NormalizedRecordRow, ScopeAuditRow, SignoffRow, SyncRunRow,
};

use chrono::Utc;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Persistent-store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("row decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Handle to the platform database.
///
/// Cloning is cheap; each operation opens its own connection.
#[derive(Debug, Clone)]
pub struct PlatformStore {
    db_path: PathBuf,
}

impl PlatformStore {
    /// Open (and create if needed) the database at `db_path`, ensuring the
    /// schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        let conn = store.connect()?;
        schema::init(&conn)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Tolerant JSON column parse with a caller-supplied fallback, mirroring
/// how rows written by earlier releases are read back.
pub(crate) fn parse_json_or(raw: &str, fallback: serde_json::Value) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(fallback)
}

pub(crate) fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::test_util::open_store;
    use super::*;

    #[test]
    fn open_is_idempotent() {
        let (dir, _store) = open_store();
        // A second open against the same file must re-run schema init
        // without error.
        let again = PlatformStore::open(dir.path().join("data").join("vc_platform.db"));
        assert!(again.is_ok());
    }

    #[test]
    fn schema_contains_required_indexes() {
        let (_dir, store) = open_store();
        let conn = store.connect().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for required in [
            "idx_collections_startup_created",
            "idx_artifacts_collection",
            "idx_approvals_status",
            "idx_scope_audits_startup_created",
            "idx_normalized_startup_created",
            "idx_signoffs_approval",
            "idx_integration_connections_startup_provider",
        ] {
            assert!(names.iter().any(|n| n == required), "missing index {required}");
        }
    }
}
