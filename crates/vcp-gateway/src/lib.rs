// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-gateway
//!
//! Startup-side HTTP service exposing `/health`, `/manifest`, and
//! `/artifact-content` over a whitelisted folder tree. POST endpoints are
//! authenticated with a timestamped HMAC signature over the raw body;
//! every path resolution enforces the symlink and traversal rules in
//! [`scan`].
#![deny(unsafe_code)]

mod config;
mod scan;

pub use config::{ConfigError, DEFAULT_MAX_ARTIFACTS, GatewayConfig, SERVER_MAX_ARTIFACTS};
pub use scan::{PathError, resolve_rel_path, scan_manifest};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use vcp_core::{
    ArtifactContent, ArtifactContentRequest, ArtifactContentResponse, HealthResponse,
    ManifestRequest, ManifestResponse, SIGNATURE_HEADER, TIMESTAMP_HEADER, sha256_hex,
    verify_signature,
};

/// Request body cap: 20 MiB.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// HTTP-facing gateway failure; renders as `{ok: false, error}` JSON.
///
/// Messages are short and never carry stack traces or internal paths.
#[derive(Debug)]
pub struct GatewayError {
    pub status: StatusCode,
    pub message: String,
}

impl GatewayError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<PathError> for GatewayError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Symlink => GatewayError::forbidden(err.to_string()),
            PathError::NotFound(_) => GatewayError::not_found(err.to_string()),
            PathError::InvalidRelPath
            | PathError::MissingAlias
            | PathError::UnknownAlias(_)
            | PathError::Traversal
            | PathError::Escaped => GatewayError::bad_request(err.to_string()),
        }
    }
}

/// Shared state behind the router.
pub struct GatewayState {
    pub config: GatewayConfig,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    fn authorize(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), GatewayError> {
        if self.config.shared_secret.is_empty() {
            return Ok(());
        }
        let timestamp = headers
            .get(TIMESTAMP_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        verify_signature(
            &self.config.shared_secret,
            timestamp,
            signature,
            body,
            Utc::now().timestamp(),
        )
        .map_err(|err| GatewayError::unauthorized(err.to_string()))
    }

    fn check_tenant(&self, startup_id: &str) -> Result<(), GatewayError> {
        if startup_id.trim().to_lowercase() != self.config.startup_id {
            return Err(GatewayError::forbidden("startup_id mismatch"));
        }
        Ok(())
    }
}

/// Build the gateway router.
pub fn build_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/manifest", post(cmd_manifest))
        .route("/artifact-content", post(cmd_artifact_content))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = std::time::Instant::now();

    let resp = next.run(req).await;

    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

async fn cmd_health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        startup_id: state.config.startup_id.clone(),
        folders: state.config.folders.keys().cloned().collect(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|err| GatewayError::bad_request(format!("invalid json: {err}")))
}

async fn cmd_manifest(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ManifestResponse>, GatewayError> {
    state.authorize(&headers, &body)?;
    let request: ManifestRequest = parse_body(&body)?;
    state.check_tenant(&request.startup_id)?;
    if request.request_id.trim().is_empty() {
        return Err(GatewayError::bad_request("request_id is required"));
    }

    let config = state.config.clone();
    let request_id = request.request_id.clone();
    let artifacts = tokio::task::spawn_blocking(move || scan_manifest(&config, &request))
        .await
        .map_err(|_| GatewayError::bad_request("manifest scan failed"))?;

    info!(
        startup_id = %state.config.startup_id,
        request_id = %request_id,
        artifact_count = artifacts.len(),
        "manifest served"
    );
    Ok(Json(ManifestResponse { ok: true, request_id, artifacts }))
}

async fn cmd_artifact_content(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ArtifactContentResponse>, GatewayError> {
    state.authorize(&headers, &body)?;
    let request: ArtifactContentRequest = parse_body(&body)?;
    state.check_tenant(&request.startup_id)?;
    let rel_path = request.rel_path.trim().to_string();
    if rel_path.is_empty() {
        return Err(GatewayError::bad_request("rel_path is required"));
    }

    let config = state.config.clone();
    let resolve_path = rel_path.clone();
    let raw: Vec<u8> = tokio::task::spawn_blocking(move || {
        let target = resolve_rel_path(&config, &resolve_path)?;
        std::fs::read(&target).map_err(|_| PathError::NotFound(resolve_path.clone()))
    })
    .await
    .map_err(|_| GatewayError::bad_request("artifact read failed"))??;

    let digest = sha256_hex(&raw);
    Ok(Json(ArtifactContentResponse {
        ok: true,
        artifact: ArtifactContent {
            rel_path,
            size_bytes: raw.len() as u64,
            sha256: digest,
            content_b64: BASE64.encode(&raw),
        },
    }))
}
