// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration sync-run bookkeeping.
//!
//! Sync runs gate on a connected connection and record their window and
//! outcome; the actual provider document fetch is deferred to the
//! provider adapters, so a completed run may carry zero documents.

use crate::client::OAuthClient;
use crate::connections::{RefreshRequest, fetch_connection, refresh_token};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;
use vcp_core::{ConnectionStatus, OauthDefaults, SyncRunStatus, resolve_window, validate_startup_id};
use vcp_crypto::KeyStore;
use vcp_error::{ErrorCode, VcError};
use vcp_store::{NewSyncRun, PlatformStore};

fn storage_error(err: vcp_store::StoreError) -> VcError {
    VcError::new(ErrorCode::StorageFailure, "store access failed").with_source(err)
}

/// Input for [`run_sync`].
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRunRequest {
    pub startup_id: String,
    pub connection_id: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub window_from: String,
    #[serde(default)]
    pub window_to: String,
    #[serde(default)]
    pub folder_id: String,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    #[serde(default = "default_min_valid_seconds")]
    pub min_valid_seconds: i64,
}

fn default_max_files() -> usize {
    300
}

fn default_true() -> bool {
    true
}

fn default_min_valid_seconds() -> i64 {
    120
}

/// Result of [`run_sync`].
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunOutcome {
    pub run_id: String,
    pub startup_id: String,
    pub provider: String,
    pub window_from: String,
    pub window_to: String,
    pub dry_run: bool,
    pub refreshed: bool,
    pub summary: Value,
}

/// Record one sync attempt against a connected integration.
pub async fn run_sync(
    store: &PlatformStore,
    keys: &KeyStore,
    client: &OAuthClient,
    defaults: &OauthDefaults,
    request: SyncRunRequest,
) -> Result<SyncRunOutcome, VcError> {
    let startup_id = validate_startup_id(&request.startup_id)
        .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
    let connection_id = request.connection_id.trim().to_string();
    if connection_id.is_empty() {
        return Err(VcError::new(ErrorCode::ProtocolMalformedRequest, "connection_id is required"));
    }

    let connection = fetch_connection(store, &connection_id)?;
    match connection.status {
        ConnectionStatus::Revoked => {
            return Err(VcError::new(
                ErrorCode::StateInvalidTransition,
                format!("connection is revoked: {connection_id}"),
            ));
        }
        ConnectionStatus::Connected => {}
        other => {
            return Err(VcError::new(
                ErrorCode::StateInvalidTransition,
                format!("connection status must be connected: {other}"),
            ));
        }
    }

    let mut refreshed = false;
    if request.auto_refresh {
        let outcome = refresh_token(
            store,
            keys,
            client,
            defaults,
            RefreshRequest {
                connection_id: connection_id.clone(),
                min_valid_seconds: request.min_valid_seconds.max(0),
                ..RefreshRequest::default()
            },
        )
        .await?;
        refreshed = outcome.refreshed;
    }

    let period = if request.period.trim().is_empty() { "7d" } else { request.period.trim() };
    let (window_from, window_to) = resolve_window(
        &request.window_from,
        &request.window_to,
        period,
        chrono::Utc::now(),
    );
    let run_id = Uuid::new_v4().to_string();
    let max_files = request.max_files.clamp(1, 2000);
    let run_mode = if request.dry_run { "dry_run" } else { "pull" };

    store
        .create_integration_sync_run(&NewSyncRun {
            run_id: run_id.clone(),
            startup_id: startup_id.clone(),
            provider: connection.provider.clone(),
            connection_id: connection_id.clone(),
            run_mode: run_mode.into(),
            window_from: window_from.clone(),
            window_to: window_to.clone(),
            summary: json!({
                "planned_max_files": max_files,
                "folder_id": request.folder_id.trim(),
            }),
        })
        .map_err(storage_error)?;

    // Provider document fetch happens in the adapter layer; this run
    // records the attempt and its window either way.
    let summary = json!({
        "document_count": 0,
        "planned_max_files": max_files,
        "dry_run": request.dry_run,
        "folder_id": request.folder_id.trim(),
        "auto_refresh": request.auto_refresh,
        "refreshed": refreshed,
    });
    store
        .finish_integration_sync_run(&run_id, SyncRunStatus::Completed, &summary, "")
        .map_err(storage_error)?;

    info!(run_id = %run_id, connection_id = %connection_id, "sync run recorded");
    Ok(SyncRunOutcome {
        run_id,
        startup_id,
        provider: connection.provider,
        window_from,
        window_to,
        dry_run: request.dry_run,
        refreshed,
        summary,
    })
}
