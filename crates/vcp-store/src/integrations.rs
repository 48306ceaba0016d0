// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration connections, sync runs, and per-run documents.

use crate::rows::{ConnectionRow, IntegrationDocumentRow, SyncRunRow};
use crate::{PlatformStore, StoreError, now_iso, parse_json_or, parse_string_list};
use rusqlite::{Row, params, params_from_iter};
use vcp_core::{ConnectionStatus, DocType, SyncRunStatus};

/// Full connection state for an upsert; existing rows keep `created_at`.
#[derive(Debug, Clone)]
pub struct ConnectionUpsert {
    pub connection_id: String,
    pub startup_id: String,
    pub provider: String,
    pub mode: String,
    pub status: ConnectionStatus,
    pub scopes: Vec<String>,
    pub token_ref: String,
    pub refresh_token_ref: String,
    pub metadata: serde_json::Value,
}

/// Sync run staged for insertion in `running` status.
#[derive(Debug, Clone)]
pub struct NewSyncRun {
    pub run_id: String,
    pub startup_id: String,
    pub provider: String,
    pub connection_id: String,
    pub run_mode: String,
    pub window_from: String,
    pub window_to: String,
    pub summary: serde_json::Value,
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    let status_raw: String = row.get("status")?;
    let scopes_raw: String = row.get("scopes_json")?;
    let metadata_raw: String = row.get("metadata_json")?;
    Ok(ConnectionRow {
        connection_id: row.get("connection_id")?,
        startup_id: row.get("startup_id")?,
        provider: row.get("provider")?,
        mode: row.get("mode")?,
        status: ConnectionStatus::parse(&status_raw).unwrap_or(ConnectionStatus::Error),
        scopes: parse_string_list(&scopes_raw),
        token_ref: row.get("token_ref")?,
        refresh_token_ref: row.get("refresh_token_ref")?,
        metadata: parse_json_or(&metadata_raw, serde_json::json!({})),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        revoked_at: row.get("revoked_at")?,
    })
}

fn sync_run_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRunRow> {
    let status_raw: String = row.get("status")?;
    let summary_raw: String = row.get("summary_json")?;
    Ok(SyncRunRow {
        run_id: row.get("run_id")?,
        startup_id: row.get("startup_id")?,
        provider: row.get("provider")?,
        connection_id: row.get("connection_id")?,
        run_mode: row.get("run_mode")?,
        window_from: row.get("window_from")?,
        window_to: row.get("window_to")?,
        status: SyncRunStatus::parse(&status_raw).unwrap_or(SyncRunStatus::Failed),
        summary: parse_json_or(&summary_raw, serde_json::json!({})),
        error: row.get("error")?,
        created_at: row.get("created_at")?,
        finished_at: row.get("finished_at")?,
    })
}

impl PlatformStore {
    pub fn upsert_integration_connection(
        &self,
        upsert: &ConnectionUpsert,
    ) -> Result<(), StoreError> {
        let now = now_iso();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO integration_connections(
                connection_id, startup_id, provider, mode, status, scopes_json,
                token_ref, refresh_token_ref, metadata_json, created_at, updated_at, revoked_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '')
            ON CONFLICT(connection_id) DO UPDATE SET
                startup_id = excluded.startup_id,
                provider = excluded.provider,
                mode = excluded.mode,
                status = excluded.status,
                scopes_json = excluded.scopes_json,
                token_ref = excluded.token_ref,
                refresh_token_ref = excluded.refresh_token_ref,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at",
            params![
                upsert.connection_id,
                upsert.startup_id,
                upsert.provider,
                upsert.mode,
                upsert.status.as_str(),
                serde_json::to_string(&upsert.scopes)?,
                upsert.token_ref,
                upsert.refresh_token_ref,
                serde_json::to_string(&upsert.metadata)?,
                now,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_integration_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM integration_connections WHERE connection_id = ?1")?;
        let mut rows = stmt.query_map(params![connection_id], connection_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_integration_connections(
        &self,
        startup_id: Option<&str>,
        provider: Option<&str>,
        status: Option<ConnectionStatus>,
        limit: usize,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        let mut sql = "SELECT * FROM integration_connections WHERE 1=1".to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(sid) = startup_id {
            sql.push_str(" AND startup_id = ?");
            args.push(sid.to_string());
        }
        if let Some(provider) = provider {
            sql.push_str(" AND provider = ?");
            args.push(provider.to_string());
        }
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(&format!(
            " ORDER BY updated_at DESC LIMIT {}",
            limit.clamp(1, 2000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), connection_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Set a connection status, recording the reason in metadata and
    /// stamping `revoked_at` for revocations. Unknown ids are a no-op.
    pub fn set_integration_connection_status(
        &self,
        connection_id: &str,
        status: ConnectionStatus,
        reason: &str,
    ) -> Result<(), StoreError> {
        let Some(existing) = self.get_integration_connection(connection_id)? else {
            return Ok(());
        };
        let mut metadata = match existing.metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let reason = reason.trim();
        if !reason.is_empty() {
            metadata.insert("status_reason".into(), serde_json::Value::String(reason.into()));
        }
        let now = now_iso();
        let revoked_at = if status == ConnectionStatus::Revoked { now.clone() } else { String::new() };
        let conn = self.connect()?;
        conn.execute(
            "UPDATE integration_connections
             SET status = ?1, updated_at = ?2, revoked_at = ?3, metadata_json = ?4
             WHERE connection_id = ?5",
            params![
                status.as_str(),
                now,
                revoked_at,
                serde_json::to_string(&serde_json::Value::Object(metadata))?,
                connection_id,
            ],
        )?;
        Ok(())
    }

    pub fn create_integration_sync_run(&self, new: &NewSyncRun) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO integration_sync_runs(
                run_id, startup_id, provider, connection_id, run_mode, window_from, window_to,
                status, summary_json, error, created_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, '', ?10, '')",
            params![
                new.run_id,
                new.startup_id,
                new.provider,
                new.connection_id,
                new.run_mode,
                new.window_from,
                new.window_to,
                SyncRunStatus::Running.as_str(),
                serde_json::to_string(&new.summary)?,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    pub fn finish_integration_sync_run(
        &self,
        run_id: &str,
        status: SyncRunStatus,
        summary: &serde_json::Value,
        error: &str,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE integration_sync_runs
             SET status = ?1, summary_json = ?2, error = ?3, finished_at = ?4
             WHERE run_id = ?5",
            params![
                status.as_str(),
                serde_json::to_string(summary)?,
                error.trim(),
                now_iso(),
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_integration_sync_run(&self, run_id: &str) -> Result<Option<SyncRunRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM integration_sync_runs WHERE run_id = ?1")?;
        let mut rows = stmt.query_map(params![run_id], sync_run_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_integration_sync_runs(
        &self,
        startup_id: Option<&str>,
        provider: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SyncRunRow>, StoreError> {
        let mut sql = "SELECT * FROM integration_sync_runs WHERE 1=1".to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(sid) = startup_id {
            sql.push_str(" AND startup_id = ?");
            args.push(sid.to_string());
        }
        if let Some(provider) = provider {
            sql.push_str(" AND provider = ?");
            args.push(provider.to_string());
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {}",
            limit.clamp(1, 2000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), sync_run_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn add_integration_document(
        &self,
        doc: &IntegrationDocumentRow,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO integration_documents(
                document_id, run_id, startup_id, provider, source_id, title, mime_type,
                doc_type, confidence, metadata_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                doc.document_id,
                doc.run_id,
                doc.startup_id,
                doc.provider,
                doc.source_id,
                doc.title,
                doc.mime_type,
                doc.doc_type.as_str(),
                doc.confidence.clamp(0.0, 1.0),
                serde_json::to_string(&doc.metadata)?,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    pub fn list_integration_documents(
        &self,
        run_id: Option<&str>,
        startup_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IntegrationDocumentRow>, StoreError> {
        let mut sql = "SELECT * FROM integration_documents WHERE 1=1".to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(rid) = run_id {
            sql.push_str(" AND run_id = ?");
            args.push(rid.to_string());
        }
        if let Some(sid) = startup_id {
            sql.push_str(" AND startup_id = ?");
            args.push(sid.to_string());
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {}",
            limit.clamp(1, 5000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let doc_type_raw: String = row.get("doc_type")?;
            let metadata_raw: String = row.get("metadata_json")?;
            Ok(IntegrationDocumentRow {
                document_id: row.get("document_id")?,
                run_id: row.get("run_id")?,
                startup_id: row.get("startup_id")?,
                provider: row.get("provider")?,
                source_id: row.get("source_id")?,
                title: row.get("title")?,
                mime_type: row.get("mime_type")?,
                doc_type: DocType::parse_or_unknown(&doc_type_raw),
                confidence: row.get("confidence")?,
                metadata: parse_json_or(&metadata_raw, serde_json::json!({})),
                created_at: row.get("created_at")?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
