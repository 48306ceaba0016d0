// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collections, artifacts, scope audits, and normalized records.

use crate::rows::{ArtifactRow, CollectionRow, NormalizedRecordRow, ScopeAuditRow};
use crate::{PlatformStore, StoreError, now_iso};
use rusqlite::{Connection, Row, params, params_from_iter};
use vcp_core::{
    ArtifactMeta, CollectionStatus, CollectionSummary, DocType, ScopeAudit, ScopeDecision,
};

/// Normalized record staged for insertion.
#[derive(Debug, Clone)]
pub struct NewNormalizedRecord {
    pub record_id: String,
    pub artifact_id: String,
    pub schema_type: DocType,
    pub payload: serde_json::Value,
}

/// Everything one collection cycle persists, committed atomically.
#[derive(Debug, Clone)]
pub struct CollectionCycleRecord {
    pub collection_id: String,
    pub startup_id: String,
    pub window_from: String,
    pub window_to: String,
    pub status: CollectionStatus,
    pub encrypted_path: String,
    pub summary: CollectionSummary,
    pub artifacts: Vec<ArtifactMeta>,
    pub scope_audits: Vec<ScopeAudit>,
    pub normalized: Vec<NewNormalizedRecord>,
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRow> {
    let status_raw: String = row.get("status")?;
    let summary_raw: String = row.get("summary_json")?;
    Ok(CollectionRow {
        collection_id: row.get("collection_id")?,
        startup_id: row.get("startup_id")?,
        window_from: row.get("window_from")?,
        window_to: row.get("window_to")?,
        status: CollectionStatus::parse(&status_raw).unwrap_or(CollectionStatus::Collected),
        encrypted_path: row.get("encrypted_path")?,
        summary: serde_json::from_str(&summary_raw).unwrap_or_default(),
        created_at: row.get("created_at")?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<ArtifactRow> {
    let doc_type_raw: String = row.get("doc_type")?;
    let size: i64 = row.get("size_bytes")?;
    Ok(ArtifactRow {
        artifact_id: row.get("artifact_id")?,
        collection_id: row.get("collection_id")?,
        rel_path: row.get("rel_path")?,
        sha256: row.get("sha256")?,
        size_bytes: size.max(0) as u64,
        doc_type: DocType::parse_or_unknown(&doc_type_raw),
        confidence: row.get("confidence")?,
        mtime: row.get("mtime")?,
    })
}

fn insert_collection(
    conn: &Connection,
    record: &CollectionCycleRecord,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO collections(
            collection_id, startup_id, window_from, window_to, status, encrypted_path,
            summary_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.collection_id,
            record.startup_id,
            record.window_from,
            record.window_to,
            record.status.as_str(),
            record.encrypted_path,
            serde_json::to_string(&record.summary)?,
            now_iso(),
        ],
    )?;
    Ok(())
}

fn insert_artifact(
    conn: &Connection,
    collection_id: &str,
    meta: &ArtifactMeta,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO artifacts(
            artifact_id, collection_id, rel_path, sha256, size_bytes, doc_type, confidence, mtime
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            meta.artifact_id,
            collection_id,
            meta.rel_path,
            meta.sha256,
            meta.size_bytes as i64,
            meta.doc_type.as_str(),
            meta.confidence,
            meta.mtime,
        ],
    )?;
    Ok(())
}

fn insert_scope_audit(
    conn: &Connection,
    collection_id: &str,
    startup_id: &str,
    audit: &ScopeAudit,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO scope_audits(
            collection_id, startup_id, rel_path, doc_type, decision, reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            collection_id,
            startup_id,
            audit.rel_path,
            audit.doc_type.as_str(),
            audit.decision.as_str(),
            audit.reason,
            now_iso(),
        ],
    )?;
    Ok(())
}

fn insert_normalized(
    conn: &Connection,
    startup_id: &str,
    collection_id: &str,
    record: &NewNormalizedRecord,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO normalized_records(
            record_id, startup_id, collection_id, artifact_id, schema_type, payload_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.record_id,
            startup_id,
            collection_id,
            record.artifact_id,
            record.schema_type.as_str(),
            serde_json::to_string(&record.payload)?,
            now_iso(),
        ],
    )?;
    Ok(())
}

impl PlatformStore {
    /// Persist one cycle's rows inside a single transaction.
    pub fn record_collection_cycle(
        &self,
        record: &CollectionCycleRecord,
    ) -> Result<(), StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        insert_collection(&tx, record)?;
        for audit in &record.scope_audits {
            insert_scope_audit(&tx, &record.collection_id, &record.startup_id, audit)?;
        }
        for meta in &record.artifacts {
            insert_artifact(&tx, &record.collection_id, meta)?;
        }
        for normalized in &record.normalized {
            insert_normalized(&tx, &record.startup_id, &record.collection_id, normalized)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_collection_status(
        &self,
        collection_id: &str,
        status: CollectionStatus,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE collections SET status = ?1 WHERE collection_id = ?2",
            params![status.as_str(), collection_id],
        )?;
        Ok(())
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<Option<CollectionRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM collections WHERE collection_id = ?1")?;
        let mut rows = stmt.query_map(params![collection_id], collection_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Collections for a tenant overlapping the optional window, newest
    /// first.
    pub fn list_collections(
        &self,
        startup_id: &str,
        window_from: Option<&str>,
        window_to: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CollectionRow>, StoreError> {
        let mut sql = "SELECT * FROM collections WHERE startup_id = ?".to_string();
        let mut args: Vec<String> = vec![startup_id.to_string()];
        if let Some(from) = window_from {
            sql.push_str(" AND window_to >= ?");
            args.push(from.to_string());
        }
        if let Some(to) = window_to {
            sql.push_str(" AND window_from <= ?");
            args.push(to.to_string());
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {}",
            limit.clamp(1, 1000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), collection_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn add_artifact(
        &self,
        collection_id: &str,
        meta: &ArtifactMeta,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        insert_artifact(&conn, collection_id, meta)
    }

    pub fn list_artifacts(&self, collection_id: &str) -> Result<Vec<ArtifactRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT artifact_id, collection_id, rel_path, sha256, size_bytes, doc_type,
                    confidence, mtime
             FROM artifacts WHERE collection_id = ?1 ORDER BY rel_path ASC",
        )?;
        let rows = stmt.query_map(params![collection_id], artifact_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn add_scope_audit(
        &self,
        collection_id: &str,
        startup_id: &str,
        audit: &ScopeAudit,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        insert_scope_audit(&conn, collection_id, startup_id, audit)
    }

    /// Audit rows for a tenant, newest first, optionally filtered by
    /// collection and decision.
    pub fn list_scope_audits(
        &self,
        startup_id: &str,
        collection_id: Option<&str>,
        decision: Option<ScopeDecision>,
        limit: usize,
    ) -> Result<Vec<ScopeAuditRow>, StoreError> {
        let mut sql = "SELECT * FROM scope_audits WHERE startup_id = ?".to_string();
        let mut args: Vec<String> = vec![startup_id.to_string()];
        if let Some(cid) = collection_id {
            sql.push_str(" AND collection_id = ?");
            args.push(cid.to_string());
        }
        if let Some(decision) = decision {
            sql.push_str(" AND decision = ?");
            args.push(decision.as_str().to_string());
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {}",
            limit.clamp(1, 2000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let doc_type_raw: String = row.get("doc_type")?;
            let decision_raw: String = row.get("decision")?;
            Ok(ScopeAuditRow {
                audit_id: row.get("audit_id")?,
                collection_id: row.get("collection_id")?,
                startup_id: row.get("startup_id")?,
                rel_path: row.get("rel_path")?,
                doc_type: DocType::parse_or_unknown(&doc_type_raw),
                decision: ScopeDecision::parse(&decision_raw).unwrap_or(ScopeDecision::Reject),
                reason: row.get("reason")?,
                created_at: row.get("created_at")?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn add_normalized_record(
        &self,
        startup_id: &str,
        collection_id: &str,
        record: &NewNormalizedRecord,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        insert_normalized(&conn, startup_id, collection_id, record)
    }

    pub fn list_normalized_records(
        &self,
        startup_id: Option<&str>,
        collection_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecordRow>, StoreError> {
        let mut sql = "SELECT * FROM normalized_records WHERE 1=1".to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(sid) = startup_id {
            sql.push_str(" AND startup_id = ?");
            args.push(sid.to_string());
        }
        if let Some(cid) = collection_id {
            sql.push_str(" AND collection_id = ?");
            args.push(cid.to_string());
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {}",
            limit.clamp(1, 5000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let schema_raw: String = row.get("schema_type")?;
            let payload_raw: String = row.get("payload_json")?;
            Ok(NormalizedRecordRow {
                record_id: row.get("record_id")?,
                startup_id: row.get("startup_id")?,
                collection_id: row.get("collection_id")?,
                artifact_id: row.get("artifact_id")?,
                schema_type: DocType::parse_or_unknown(&schema_raw),
                payload: crate::parse_json_or(&payload_raw, serde_json::json!({})),
                created_at: row.get("created_at")?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::open_store;

    fn meta(rel: &str, sha: &str, doc: DocType) -> ArtifactMeta {
        ArtifactMeta {
            artifact_id: format!("sha256:{sha}"),
            rel_path: rel.into(),
            size_bytes: 42,
            mtime: "2026-02-01T00:00:00+00:00".into(),
            sha256: sha.into(),
            doc_type: doc,
            confidence: 0.7,
        }
    }

    fn cycle(collection_id: &str, artifacts: Vec<ArtifactMeta>) -> CollectionCycleRecord {
        let summary = CollectionSummary::from_artifacts(&artifacts);
        CollectionCycleRecord {
            collection_id: collection_id.into(),
            startup_id: "acme".into(),
            window_from: "2026-01-01T00:00:00+00:00".into(),
            window_to: "2026-02-01T00:00:00+00:00".into(),
            status: CollectionStatus::Collected,
            encrypted_path: format!("vault/acme/2026/02/01/{collection_id}.bin"),
            summary,
            artifacts,
            scope_audits: vec![ScopeAudit {
                rel_path: "desktop_common/a.txt".into(),
                doc_type: DocType::IrDeck,
                decision: ScopeDecision::Allow,
                reason: "in_scope".into(),
            }],
            normalized: vec![],
        }
    }

    #[test]
    fn cycle_rows_roundtrip() {
        let (_dir, store) = open_store();
        let artifacts = vec![meta("desktop_common/a.txt", "aa", DocType::IrDeck)];
        store.record_collection_cycle(&cycle("c-1", artifacts)).unwrap();

        let collection = store.get_collection("c-1").unwrap().unwrap();
        assert_eq!(collection.startup_id, "acme");
        assert_eq!(collection.status, CollectionStatus::Collected);
        assert_eq!(collection.summary.artifact_count, 1);

        let artifacts = store.list_artifacts("c-1").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].doc_type, DocType::IrDeck);
        assert_eq!(artifacts[0].size_bytes, 42);

        let audits = store.list_scope_audits("acme", Some("c-1"), None, 100).unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].decision, ScopeDecision::Allow);
    }

    #[test]
    fn duplicate_artifact_sha_replaces_row() {
        let (_dir, store) = open_store();
        store.record_collection_cycle(&cycle("c-1", vec![])).unwrap();
        store
            .add_artifact("c-1", &meta("desktop_common/a.txt", "aa", DocType::IrDeck))
            .unwrap();
        store
            .add_artifact("c-1", &meta("desktop_common/b.txt", "aa", DocType::IrDeck))
            .unwrap();
        let artifacts = store.list_artifacts("c-1").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].rel_path, "desktop_common/b.txt");
    }

    #[test]
    fn status_update_persists() {
        let (_dir, store) = open_store();
        store.record_collection_cycle(&cycle("c-1", vec![])).unwrap();
        store
            .set_collection_status("c-1", CollectionStatus::AwaitingApproval)
            .unwrap();
        let collection = store.get_collection("c-1").unwrap().unwrap();
        assert_eq!(collection.status, CollectionStatus::AwaitingApproval);
    }

    #[test]
    fn list_collections_window_overlap() {
        let (_dir, store) = open_store();
        store.record_collection_cycle(&cycle("c-1", vec![])).unwrap();
        let hit = store
            .list_collections("acme", Some("2026-01-15T00:00:00+00:00"), None, 10)
            .unwrap();
        assert_eq!(hit.len(), 1);
        let miss = store
            .list_collections("acme", Some("2026-03-01T00:00:00+00:00"), None, 10)
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn normalized_upsert_is_idempotent() {
        let (_dir, store) = open_store();
        store.record_collection_cycle(&cycle("c-1", vec![])).unwrap();
        let record = NewNormalizedRecord {
            record_id: "r-1".into(),
            artifact_id: "sha256:aa".into(),
            schema_type: DocType::IrDeck,
            payload: serde_json::json!({"fields": {"deck_title": "Acme"}}),
        };
        store.add_normalized_record("acme", "c-1", &record).unwrap();
        store.add_normalized_record("acme", "c-1", &record).unwrap();
        let rows = store.list_normalized_records(Some("acme"), Some("c-1"), 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload["fields"]["deck_title"], "Acme");
    }

    #[test]
    fn scope_audit_decision_filter() {
        let (_dir, store) = open_store();
        store.record_collection_cycle(&cycle("c-1", vec![])).unwrap();
        store
            .add_scope_audit(
                "c-1",
                "acme",
                &ScopeAudit {
                    rel_path: "desktop_common/x.tmp".into(),
                    doc_type: DocType::Unknown,
                    decision: ScopeDecision::Reject,
                    reason: "deny_pattern:*.tmp".into(),
                },
            )
            .unwrap();
        let rejects = store
            .list_scope_audits("acme", None, Some(ScopeDecision::Reject), 100)
            .unwrap();
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].reason, "deny_pattern:*.tmp");
    }
}
