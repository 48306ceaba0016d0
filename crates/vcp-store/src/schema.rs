// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema creation and additive column migrations.

use rusqlite::Connection;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    collection_id TEXT PRIMARY KEY,
    startup_id TEXT NOT NULL,
    window_from TEXT NOT NULL,
    window_to TEXT NOT NULL,
    status TEXT NOT NULL,
    encrypted_path TEXT NOT NULL,
    summary_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    rel_path TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    doc_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    mtime TEXT NOT NULL,
    PRIMARY KEY (artifact_id, collection_id),
    FOREIGN KEY (collection_id) REFERENCES collections(collection_id)
);

CREATE TABLE IF NOT EXISTS approvals (
    approval_id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT NOT NULL DEFAULT '',
    requested_at TEXT NOT NULL,
    approved_at TEXT NOT NULL DEFAULT '',
    dispatched_at TEXT NOT NULL DEFAULT '',
    approver TEXT NOT NULL DEFAULT '',
    expires_at TEXT NOT NULL DEFAULT '',
    risk_score REAL NOT NULL DEFAULT 0.0,
    risk_level TEXT NOT NULL DEFAULT 'low',
    risk_reasons_json TEXT NOT NULL DEFAULT '[]',
    FOREIGN KEY (collection_id) REFERENCES collections(collection_id)
);

CREATE TABLE IF NOT EXISTS scope_audits (
    audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id TEXT NOT NULL,
    startup_id TEXT NOT NULL,
    rel_path TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    decision TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS normalized_records (
    record_id TEXT PRIMARY KEY,
    startup_id TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    artifact_id TEXT NOT NULL,
    schema_type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS approval_signoffs (
    signoff_id INTEGER PRIMARY KEY AUTOINCREMENT,
    approval_id TEXT NOT NULL,
    approver TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(approval_id, approver),
    FOREIGN KEY (approval_id) REFERENCES approvals(approval_id)
);

CREATE TABLE IF NOT EXISTS integration_connections (
    connection_id TEXT PRIMARY KEY,
    startup_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    mode TEXT NOT NULL DEFAULT 'byo_oauth',
    status TEXT NOT NULL,
    scopes_json TEXT NOT NULL DEFAULT '[]',
    token_ref TEXT NOT NULL DEFAULT '',
    refresh_token_ref TEXT NOT NULL DEFAULT '',
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    revoked_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS integration_sync_runs (
    run_id TEXT PRIMARY KEY,
    startup_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    connection_id TEXT NOT NULL,
    run_mode TEXT NOT NULL DEFAULT 'manual',
    window_from TEXT NOT NULL,
    window_to TEXT NOT NULL,
    status TEXT NOT NULL,
    summary_json TEXT NOT NULL DEFAULT '{}',
    error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    finished_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS integration_documents (
    document_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    startup_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_confirmations (
    confirmation_id TEXT PRIMARY KEY,
    startup_id TEXT NOT NULL,
    collection_id TEXT NOT NULL DEFAULT '',
    channel TEXT NOT NULL DEFAULT 'telegram',
    message TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    responded_at TEXT NOT NULL DEFAULT '',
    responder TEXT NOT NULL DEFAULT '',
    response_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_collections_startup_created ON collections(startup_id, created_at);
CREATE INDEX IF NOT EXISTS idx_artifacts_collection ON artifacts(collection_id);
CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status, requested_at);
CREATE INDEX IF NOT EXISTS idx_scope_audits_startup_created ON scope_audits(startup_id, created_at);
CREATE INDEX IF NOT EXISTS idx_scope_audits_collection ON scope_audits(collection_id);
CREATE INDEX IF NOT EXISTS idx_normalized_startup_created ON normalized_records(startup_id, created_at);
CREATE INDEX IF NOT EXISTS idx_normalized_collection ON normalized_records(collection_id);
CREATE INDEX IF NOT EXISTS idx_signoffs_approval ON approval_signoffs(approval_id, created_at);
CREATE INDEX IF NOT EXISTS idx_integration_connections_startup_provider
    ON integration_connections(startup_id, provider, status, updated_at);
CREATE INDEX IF NOT EXISTS idx_integration_sync_runs_startup_provider
    ON integration_sync_runs(startup_id, provider, created_at);
CREATE INDEX IF NOT EXISTS idx_integration_docs_run ON integration_documents(run_id, created_at);
CREATE INDEX IF NOT EXISTS idx_integration_docs_startup_provider
    ON integration_documents(startup_id, provider, created_at);
CREATE INDEX IF NOT EXISTS idx_user_confirmations_status
    ON user_confirmations(startup_id, status, requested_at);
"#;

fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_column(conn: &Connection, table: &str, column: &str, ddl: &str) -> rusqlite::Result<()> {
    if table_has_column(conn, table, column)? {
        return Ok(());
    }
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {ddl}"), [])?;
    Ok(())
}

/// Create the schema and apply additive migrations for databases created
/// by earlier releases.
pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;

    ensure_column(conn, "approvals", "dispatched_at", "dispatched_at TEXT NOT NULL DEFAULT ''")?;
    ensure_column(conn, "approvals", "expires_at", "expires_at TEXT NOT NULL DEFAULT ''")?;
    ensure_column(conn, "approvals", "risk_score", "risk_score REAL NOT NULL DEFAULT 0.0")?;
    ensure_column(conn, "approvals", "risk_level", "risk_level TEXT NOT NULL DEFAULT 'low'")?;
    ensure_column(
        conn,
        "approvals",
        "risk_reasons_json",
        "risk_reasons_json TEXT NOT NULL DEFAULT '[]'",
    )?;
    Ok(())
}
