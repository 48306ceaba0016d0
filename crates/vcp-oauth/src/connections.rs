// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection lifecycle: connect, exchange_code, refresh_token, status,
//! test, revoke.
//!
//! Client credentials and token payloads are envelope-encrypted under the
//! tenant key before they touch the store; the AAD binds the client
//! envelope to `connection_id` and the token envelope to
//! `<connection_id>:token`. Responses are always sanitized.

use crate::client::{
    DEFAULT_REDIRECT_URI, OAuthClient, SUPPORTED_PROVIDERS, build_token_ref, default_scopes,
    mask_client_id,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;
use vcp_core::{ConnectionStatus, OauthDefaults, validate_startup_id};
use vcp_crypto::{Envelope, KeyStore};
use vcp_error::{ErrorCode, VcError};
use vcp_store::{ConnectionRow, ConnectionUpsert, PlatformStore};

pub(crate) const CLIENT_ENVELOPE_KEY: &str = "oauth_client_envelope";
pub(crate) const TOKEN_ENVELOPE_KEY: &str = "oauth_token_envelope";

fn storage_error(err: vcp_store::StoreError) -> VcError {
    VcError::new(ErrorCode::StorageFailure, "store access failed").with_source(err)
}

fn crypto_error(context: &str, err: vcp_crypto::CryptoError) -> VcError {
    VcError::new(ErrorCode::CryptoFailure, context.to_string()).with_source(err)
}

pub(crate) fn fetch_connection(
    store: &PlatformStore,
    connection_id: &str,
) -> Result<ConnectionRow, VcError> {
    store
        .get_integration_connection(connection_id)
        .map_err(storage_error)?
        .ok_or_else(|| {
            VcError::new(
                ErrorCode::StateNotFound,
                format!("connection not found: {connection_id}"),
            )
        })
}

/// Strip envelope material from a connection before it leaves the core.
pub fn sanitize_connection(mut row: ConnectionRow) -> ConnectionRow {
    if let Value::Object(map) = &mut row.metadata {
        map.remove(CLIENT_ENVELOPE_KEY);
        map.remove(TOKEN_ENVELOPE_KEY);
    }
    row
}

fn metadata_map(row: &ConnectionRow) -> serde_json::Map<String, Value> {
    match &row.metadata {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

fn envelope_from(metadata: &serde_json::Map<String, Value>, key: &str) -> Option<Envelope> {
    metadata.get(key).cloned().and_then(|value| serde_json::from_value(value).ok())
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(candidate)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Resolved OAuth client configuration for one connection.
struct ClientConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

/// Resolve client credentials: caller input, then environment defaults,
/// then (overriding both) the stored encrypted client envelope.
fn resolve_client_config(
    keys: &KeyStore,
    defaults: &OauthDefaults,
    startup_id: &str,
    connection_id: &str,
    metadata: &serde_json::Map<String, Value>,
    input_client_id: &str,
    input_client_secret: &str,
    input_redirect_uri: &str,
) -> Result<ClientConfig, VcError> {
    let mut client_id = if input_client_id.trim().is_empty() {
        defaults.client_id.clone()
    } else {
        input_client_id.trim().to_string()
    };
    let mut client_secret = if input_client_secret.trim().is_empty() {
        defaults.client_secret.clone()
    } else {
        input_client_secret.trim().to_string()
    };
    let mut redirect_uri = if input_redirect_uri.trim().is_empty() {
        metadata
            .get("redirect_uri")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
            .to_string()
    } else {
        input_redirect_uri.trim().to_string()
    };

    if let Some(envelope) = envelope_from(metadata, CLIENT_ENVELOPE_KEY) {
        let decrypted = keys
            .decrypt(startup_id, &envelope, connection_id.as_bytes())
            .map_err(|err| crypto_error("oauth client config decrypt failed", err))?;
        let config: Value = serde_json::from_slice(&decrypted).map_err(|err| {
            VcError::new(ErrorCode::CryptoFailure, "oauth client config invalid").with_source(err)
        })?;
        if let Some(value) = config["client_id"].as_str().map(str::trim).filter(|v| !v.is_empty()) {
            client_id = value.to_string();
        }
        if let Some(value) =
            config["client_secret"].as_str().map(str::trim).filter(|v| !v.is_empty())
        {
            client_secret = value.to_string();
        }
        if let Some(value) =
            config["redirect_uri"].as_str().map(str::trim).filter(|v| !v.is_empty())
        {
            redirect_uri = value.to_string();
        }
    }

    if client_id.is_empty() || client_secret.is_empty() {
        return Err(VcError::new(
            ErrorCode::ConfigOauthMissing,
            "client_id/client_secret not available; run connect with credentials first",
        ));
    }
    Ok(ClientConfig { client_id, client_secret, redirect_uri })
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

/// Input for [`connect`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectRequest {
    pub startup_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Result of [`connect`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectOutcome {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub connection: ConnectionRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_url: Option<String>,
    pub next_steps: Vec<String>,
}

/// Create or update a connection and emit a consent URL when credentials
/// are available; otherwise park it in `awaiting_credentials`.
pub fn connect(
    store: &PlatformStore,
    keys: &KeyStore,
    client: &OAuthClient,
    defaults: &OauthDefaults,
    request: ConnectRequest,
) -> Result<ConnectOutcome, VcError> {
    let startup_id = validate_startup_id(&request.startup_id)
        .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
    let provider = {
        let value = request.provider.trim().to_lowercase();
        if value.is_empty() { "google".to_string() } else { value }
    };
    if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
        return Err(VcError::new(
            ErrorCode::ProtocolMalformedRequest,
            "provider must be google_drive|google_gmail|google",
        ));
    }

    let connection_id = {
        let value = request.connection_id.trim().to_string();
        if value.is_empty() { Uuid::new_v4().to_string() } else { value }
    };
    let mode = {
        let value = request.mode.trim().to_string();
        if value.is_empty() { "byo_oauth".to_string() } else { value }
    };
    let client_id = if request.client_id.trim().is_empty() {
        defaults.client_id.clone()
    } else {
        request.client_id.trim().to_string()
    };
    let client_secret = if request.client_secret.trim().is_empty() {
        defaults.client_secret.clone()
    } else {
        request.client_secret.trim().to_string()
    };
    let redirect_uri = if request.redirect_uri.trim().is_empty() {
        DEFAULT_REDIRECT_URI.to_string()
    } else {
        request.redirect_uri.trim().to_string()
    };
    let scopes = {
        let mut cleaned: Vec<String> = Vec::new();
        for scope in &request.scopes {
            let value = scope.trim().to_string();
            if !value.is_empty() && !cleaned.contains(&value) {
                cleaned.push(value);
            }
        }
        if cleaned.is_empty() { default_scopes(&provider) } else { cleaned }
    };

    let (status, token_ref, metadata, consent_url, next_steps) =
        if !client_id.is_empty() && !client_secret.is_empty() {
            let client_config = json!({
                "client_id": &client_id,
                "client_secret": &client_secret,
                "redirect_uri": &redirect_uri,
            });
            let client_bytes = serde_json::to_vec(&client_config).map_err(|err| {
                VcError::new(ErrorCode::Internal, "client config serialization").with_source(err)
            })?;
            let envelope = keys
                .encrypt(&startup_id, &client_bytes, connection_id.as_bytes())
                .map_err(|err| crypto_error("client config encryption failed", err))?;
            let consent_url =
                client.build_consent_url(&client_id, &scopes, &connection_id, &redirect_uri)?;
            let token_ref = build_token_ref(
                &provider,
                &json!({
                    "client_id": &client_id,
                    "scopes": &scopes,
                    "redirect_uri": &redirect_uri,
                    "state": &connection_id,
                    "mode": &mode,
                }),
            );
            let metadata = json!({
                "consent_url": &consent_url,
                "client_id_masked": mask_client_id(&client_id),
                "redirect_uri": &redirect_uri,
                (CLIENT_ENVELOPE_KEY): envelope,
            });
            (
                ConnectionStatus::PendingConsent,
                token_ref,
                metadata,
                Some(consent_url),
                vec![
                    "open the consent_url in a browser and complete the grant".to_string(),
                    "run exchange_code with the code returned to the redirect_uri".to_string(),
                ],
            )
        } else {
            (
                ConnectionStatus::AwaitingCredentials,
                String::new(),
                json!({ "redirect_uri": redirect_uri }),
                None,
                vec![
                    "re-run connect with client_id/client_secret".to_string(),
                    "or set GOOGLE_OAUTH_CLIENT_ID/GOOGLE_OAUTH_CLIENT_SECRET".to_string(),
                ],
            )
        };

    store
        .upsert_integration_connection(&ConnectionUpsert {
            connection_id: connection_id.clone(),
            startup_id,
            provider,
            mode,
            status,
            scopes,
            token_ref,
            refresh_token_ref: String::new(),
            metadata,
        })
        .map_err(storage_error)?;

    let connection = sanitize_connection(fetch_connection(store, &connection_id)?);
    info!(connection_id = %connection_id, status = %status, "oauth connection upserted");
    Ok(ConnectOutcome { connection_id, status, connection, consent_url, next_steps })
}

// ---------------------------------------------------------------------------
// exchange_code
// ---------------------------------------------------------------------------

/// Input for [`exchange_code`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeRequest {
    pub connection_id: String,
    pub code: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
}

/// Result of [`exchange_code`].
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeOutcome {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    pub connection: ConnectionRow,
}

/// Exchange an authorization code and persist the encrypted token payload.
pub async fn exchange_code(
    store: &PlatformStore,
    keys: &KeyStore,
    client: &OAuthClient,
    defaults: &OauthDefaults,
    request: ExchangeRequest,
) -> Result<ExchangeOutcome, VcError> {
    let connection_id = request.connection_id.trim().to_string();
    if connection_id.is_empty() {
        return Err(VcError::new(ErrorCode::ProtocolMalformedRequest, "connection_id is required"));
    }
    let code = request.code.trim().to_string();
    if code.is_empty() {
        return Err(VcError::new(ErrorCode::ProtocolMalformedRequest, "code is required"));
    }

    let connection = fetch_connection(store, &connection_id)?;
    if connection.status == ConnectionStatus::Revoked {
        return Err(VcError::new(
            ErrorCode::StateInvalidTransition,
            format!("connection is revoked: {connection_id}"),
        ));
    }
    let metadata = metadata_map(&connection);
    let config = resolve_client_config(
        keys,
        defaults,
        &connection.startup_id,
        &connection_id,
        &metadata,
        &request.client_id,
        &request.client_secret,
        &request.redirect_uri,
    )?;

    let exchanged = client
        .exchange_code(&config.client_id, &config.client_secret, &code, &config.redirect_uri)
        .await?;

    let token_bytes = serde_json::to_vec(&exchanged.raw).map_err(|err| {
        VcError::new(ErrorCode::Internal, "token payload serialization").with_source(err)
    })?;
    let token_envelope = keys
        .encrypt(
            &connection.startup_id,
            &token_bytes,
            format!("{connection_id}:token").as_bytes(),
        )
        .map_err(|err| crypto_error("token payload encryption failed", err))?;

    let connected_at = Utc::now().to_rfc3339();
    let expires_at = if exchanged.expires_in > 0 {
        (Utc::now() + Duration::seconds(exchanged.expires_in)).to_rfc3339()
    } else {
        String::new()
    };

    let mut next_metadata = metadata;
    next_metadata.insert("redirect_uri".into(), json!(config.redirect_uri));
    next_metadata.insert(
        TOKEN_ENVELOPE_KEY.into(),
        serde_json::to_value(&token_envelope).unwrap_or_default(),
    );
    next_metadata.insert("token_type".into(), json!(&exchanged.token_type));
    next_metadata.insert("scope".into(), json!(&exchanged.scope));
    next_metadata.insert("connected_at".into(), json!(&connected_at));
    next_metadata.insert("token_expires_at".into(), json!(expires_at));
    next_metadata.insert("last_exchange_at".into(), json!(&connected_at));

    let token_ref = build_token_ref(
        &connection.provider,
        &json!({
            "connection_id": &connection_id,
            "connected_at": &connected_at,
            "token_type": &exchanged.token_type,
        }),
    );
    let refresh_token_ref = if exchanged.refresh_token.is_empty() {
        String::new()
    } else {
        build_token_ref(
            &connection.provider,
            &json!({
                "connection_id": &connection_id,
                "connected_at": &connected_at,
                "kind": "refresh",
            }),
        )
    };

    store
        .upsert_integration_connection(&ConnectionUpsert {
            connection_id: connection_id.clone(),
            startup_id: connection.startup_id.clone(),
            provider: connection.provider.clone(),
            mode: connection.mode.clone(),
            status: ConnectionStatus::Connected,
            scopes: connection.scopes.clone(),
            token_ref,
            refresh_token_ref,
            metadata: Value::Object(next_metadata),
        })
        .map_err(storage_error)?;

    let updated = sanitize_connection(fetch_connection(store, &connection_id)?);
    info!(connection_id = %connection_id, "authorization code exchanged");
    Ok(ExchangeOutcome {
        connection_id,
        status: ConnectionStatus::Connected,
        token_type: exchanged.token_type,
        expires_in: exchanged.expires_in,
        scope: exchanged.scope,
        connection: updated,
    })
}

// ---------------------------------------------------------------------------
// refresh_token
// ---------------------------------------------------------------------------

/// Input for [`refresh_token`].
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub connection_id: String,
    #[serde(default)]
    pub force_refresh: bool,
    /// Skip the refresh while the current token is valid for at least
    /// this long.
    #[serde(default = "default_min_valid_seconds")]
    pub min_valid_seconds: i64,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
}

fn default_min_valid_seconds() -> i64 {
    120
}

impl Default for RefreshRequest {
    fn default() -> Self {
        Self {
            connection_id: String::new(),
            force_refresh: false,
            min_valid_seconds: default_min_valid_seconds(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
        }
    }
}

/// Result of [`refresh_token`].
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub connection_id: String,
    pub status: ConnectionStatus,
    /// False when the stored token was still fresh enough.
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    pub connection: ConnectionRow,
}

/// Rotate the access token, preserving the refresh token when the
/// provider omits it from the response.
pub async fn refresh_token(
    store: &PlatformStore,
    keys: &KeyStore,
    client: &OAuthClient,
    defaults: &OauthDefaults,
    request: RefreshRequest,
) -> Result<RefreshOutcome, VcError> {
    let connection_id = request.connection_id.trim().to_string();
    if connection_id.is_empty() {
        return Err(VcError::new(ErrorCode::ProtocolMalformedRequest, "connection_id is required"));
    }
    let min_valid_seconds = request.min_valid_seconds.max(0);

    let connection = fetch_connection(store, &connection_id)?;
    let metadata = metadata_map(&connection);
    let config = resolve_client_config(
        keys,
        defaults,
        &connection.startup_id,
        &connection_id,
        &metadata,
        &request.client_id,
        &request.client_secret,
        &request.redirect_uri,
    )?;

    let token_payload: Value = match envelope_from(&metadata, TOKEN_ENVELOPE_KEY) {
        Some(envelope) => {
            let decrypted = keys
                .decrypt(
                    &connection.startup_id,
                    &envelope,
                    format!("{connection_id}:token").as_bytes(),
                )
                .map_err(|err| crypto_error("oauth token payload decrypt failed", err))?;
            serde_json::from_slice(&decrypted).map_err(|err| {
                VcError::new(ErrorCode::CryptoFailure, "oauth token payload invalid")
                    .with_source(err)
            })?
        }
        None => json!({}),
    };
    let stored_refresh_token =
        token_payload["refresh_token"].as_str().unwrap_or_default().trim().to_string();
    if stored_refresh_token.is_empty() {
        return Err(VcError::new(
            ErrorCode::ConfigOauthMissing,
            "refresh_token is missing; re-run exchange_code with offline consent",
        ));
    }

    let expires_at = metadata
        .get("token_expires_at")
        .and_then(Value::as_str)
        .and_then(parse_expiry);
    let seconds_left = expires_at.map(|at| (at - Utc::now()).num_seconds());
    if !request.force_refresh {
        if let Some(left) = seconds_left {
            if left > min_valid_seconds {
                return Ok(RefreshOutcome {
                    connection_id,
                    status: connection.status,
                    refreshed: false,
                    seconds_left: Some(left),
                    token_type: None,
                    expires_in: None,
                    connection: sanitize_connection(connection),
                });
            }
        }
    }

    let refreshed = client
        .refresh_access_token(&config.client_id, &config.client_secret, &stored_refresh_token)
        .await?;

    let mut next_payload = match token_payload {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    if let Value::Object(raw) = &refreshed.raw {
        for (key, value) in raw {
            next_payload.insert(key.clone(), value.clone());
        }
    }
    let keeps_refresh_token = next_payload
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .is_some_and(|v| !v.is_empty());
    if !keeps_refresh_token {
        next_payload.insert("refresh_token".into(), json!(stored_refresh_token));
    }

    let payload_bytes = serde_json::to_vec(&Value::Object(next_payload.clone())).map_err(|err| {
        VcError::new(ErrorCode::Internal, "token payload serialization").with_source(err)
    })?;
    let token_envelope = keys
        .encrypt(
            &connection.startup_id,
            &payload_bytes,
            format!("{connection_id}:token").as_bytes(),
        )
        .map_err(|err| crypto_error("token payload encryption failed", err))?;

    let refreshed_at = Utc::now().to_rfc3339();
    let next_expires_at = if refreshed.expires_in > 0 {
        (Utc::now() + Duration::seconds(refreshed.expires_in)).to_rfc3339()
    } else {
        String::new()
    };

    let mut next_metadata = metadata;
    next_metadata.insert("redirect_uri".into(), json!(config.redirect_uri));
    next_metadata.insert(
        TOKEN_ENVELOPE_KEY.into(),
        serde_json::to_value(&token_envelope).unwrap_or_default(),
    );
    next_metadata.insert("token_type".into(), json!(&refreshed.token_type));
    next_metadata.insert("scope".into(), json!(&refreshed.scope));
    next_metadata.insert("token_expires_at".into(), json!(next_expires_at));
    next_metadata.insert("last_refresh_at".into(), json!(&refreshed_at));

    let token_ref = build_token_ref(
        &connection.provider,
        &json!({
            "connection_id": &connection_id,
            "refreshed_at": &refreshed_at,
            "token_type": &refreshed.token_type,
        }),
    );
    let refresh_token_ref = build_token_ref(
        &connection.provider,
        &json!({
            "connection_id": &connection_id,
            "refreshed_at": &refreshed_at,
            "kind": "refresh",
        }),
    );

    store
        .upsert_integration_connection(&ConnectionUpsert {
            connection_id: connection_id.clone(),
            startup_id: connection.startup_id.clone(),
            provider: connection.provider.clone(),
            mode: connection.mode.clone(),
            status: ConnectionStatus::Connected,
            scopes: connection.scopes.clone(),
            token_ref,
            refresh_token_ref,
            metadata: Value::Object(next_metadata),
        })
        .map_err(storage_error)?;

    let updated = sanitize_connection(fetch_connection(store, &connection_id)?);
    info!(connection_id = %connection_id, "access token refreshed");
    Ok(RefreshOutcome {
        connection_id,
        status: ConnectionStatus::Connected,
        refreshed: true,
        seconds_left,
        token_type: Some(refreshed.token_type),
        expires_in: Some(refreshed.expires_in),
        connection: updated,
    })
}

// ---------------------------------------------------------------------------
// status / test / revoke
// ---------------------------------------------------------------------------

/// Sanitized connections for a tenant.
pub fn connection_status(
    store: &PlatformStore,
    startup_id: &str,
    provider: Option<&str>,
) -> Result<Vec<ConnectionRow>, VcError> {
    let sid = validate_startup_id(startup_id)
        .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
    let rows = store
        .list_integration_connections(Some(sid.as_str()), provider, None, 200)
        .map_err(storage_error)?;
    Ok(rows.into_iter().map(sanitize_connection).collect())
}

/// Result of [`test_connection`].
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub is_connectable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshOutcome>,
}

/// Probe a connection, optionally refreshing a near-expiry token first.
pub async fn test_connection(
    store: &PlatformStore,
    keys: &KeyStore,
    client: &OAuthClient,
    defaults: &OauthDefaults,
    connection_id: &str,
    auto_refresh: bool,
    min_valid_seconds: i64,
) -> Result<TestOutcome, VcError> {
    let connection = fetch_connection(store, connection_id)?;
    let mut status = connection.status;
    let mut refresh = None;
    if status == ConnectionStatus::Connected && auto_refresh {
        let outcome = refresh_token(
            store,
            keys,
            client,
            defaults,
            RefreshRequest {
                connection_id: connection_id.to_string(),
                min_valid_seconds,
                ..RefreshRequest::default()
            },
        )
        .await?;
        status = outcome.status;
        refresh = Some(outcome);
    }
    let is_connectable =
        !matches!(status, ConnectionStatus::Revoked | ConnectionStatus::Error);
    Ok(TestOutcome {
        connection_id: connection_id.to_string(),
        status,
        is_connectable,
        refresh,
    })
}

/// Revoke a connection, recording the reason in its metadata.
pub fn revoke(
    store: &PlatformStore,
    connection_id: &str,
    reason: &str,
) -> Result<ConnectionRow, VcError> {
    fetch_connection(store, connection_id)?;
    let reason = if reason.trim().is_empty() { "manual revoke" } else { reason.trim() };
    store
        .set_integration_connection_status(connection_id, ConnectionStatus::Revoked, reason)
        .map_err(storage_error)?;
    info!(connection_id = %connection_id, "connection revoked");
    Ok(sanitize_connection(fetch_connection(store, connection_id)?))
}
