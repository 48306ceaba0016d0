// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth provider client: consent URLs, auth-code exchange, and refresh.

use serde_json::Value;
use std::time::Duration;
use vcp_error::{ErrorCode, VcError};

/// Out-of-band redirect used when the tenant supplies none.
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
/// Google consent screen.
pub const GOOGLE_AUTH_BASE: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google token endpoint.
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(20);
/// Provider error payloads are truncated to this length before being
/// surfaced to callers.
const ERROR_PAYLOAD_CHARS: usize = 400;

/// Providers a connection may bind to.
pub const SUPPORTED_PROVIDERS: &[&str] = &["google_drive", "google_gmail", "google"];

/// Default consent scopes per provider.
pub fn default_scopes(provider: &str) -> Vec<String> {
    let scopes: &[&str] = match provider {
        "google_drive" => &[
            "https://www.googleapis.com/auth/drive.metadata.readonly",
            "https://www.googleapis.com/auth/drive.readonly",
        ],
        "google_gmail" => &["https://www.googleapis.com/auth/gmail.readonly"],
        _ => &[
            "https://www.googleapis.com/auth/drive.metadata.readonly",
            "https://www.googleapis.com/auth/drive.readonly",
            "https://www.googleapis.com/auth/gmail.readonly",
        ],
    };
    scopes.iter().map(|s| s.to_string()).collect()
}

/// Mask a client id for operator display: `xxx...yyy`.
pub fn mask_client_id(value: &str) -> String {
    let text: Vec<char> = value.trim().chars().collect();
    if text.len() <= 6 {
        return "***".to_string();
    }
    let head: String = text[..3].iter().collect();
    let tail: String = text[text.len() - 3..].iter().collect();
    format!("{head}...{tail}")
}

/// Opaque reference derived from a canonical JSON payload; lets operators
/// correlate token generations without ever storing token material.
pub fn build_token_ref(provider: &str, payload: &Value) -> String {
    let canonical = serde_json::to_string(payload).unwrap_or_default();
    let digest = vcp_core::sha256_hex(canonical.as_bytes());
    format!("{provider}:{}", &digest[..24])
}

/// Result of a token-endpoint exchange.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    /// Full provider payload, envelope-encrypted at rest by callers.
    pub raw: Value,
}

/// Provider client with an overridable token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    token_endpoint: String,
}

impl OAuthClient {
    pub fn new() -> Result<Self, VcError> {
        Self::with_token_endpoint(GOOGLE_TOKEN_ENDPOINT)
    }

    /// Point the client at a non-default token endpoint.
    pub fn with_token_endpoint(endpoint: &str) -> Result<Self, VcError> {
        let http = reqwest::Client::builder().build().map_err(|err| {
            VcError::new(ErrorCode::Internal, "http client init failed").with_source(err)
        })?;
        Ok(Self { http, token_endpoint: endpoint.trim_end_matches('/').to_string() })
    }

    /// Consent URL requesting offline access for a refresh token.
    pub fn build_consent_url(
        &self,
        client_id: &str,
        scopes: &[String],
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, VcError> {
        let mut ordered: Vec<&str> = Vec::new();
        for scope in scopes {
            let value = scope.trim();
            if !value.is_empty() && !ordered.contains(&value) {
                ordered.push(value);
            }
        }
        let redirect = if redirect_uri.trim().is_empty() {
            DEFAULT_REDIRECT_URI
        } else {
            redirect_uri.trim()
        };
        let url = reqwest::Url::parse_with_params(
            GOOGLE_AUTH_BASE,
            &[
                ("client_id", client_id.trim()),
                ("redirect_uri", redirect),
                ("response_type", "code"),
                ("scope", &ordered.join(" ")),
                ("state", state.trim()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|err| VcError::new(ErrorCode::Internal, "consent url build failed").with_source(err))?;
        Ok(url.to_string())
    }

    async fn post_token_request(&self, form: &[(&str, &str)]) -> Result<TokenExchange, VcError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .timeout(TOKEN_TIMEOUT)
            .form(form)
            .send()
            .await
            .map_err(|err| {
                VcError::new(ErrorCode::ExternalOauthFailure, "token endpoint unreachable")
                    .with_source(err)
            })?;

        let status = response.status();
        let raw_text = response.text().await.map_err(|err| {
            VcError::new(ErrorCode::ExternalOauthFailure, "token response unreadable")
                .with_source(err)
        })?;
        if !status.is_success() {
            let truncated: String = raw_text.chars().take(ERROR_PAYLOAD_CHARS).collect();
            return Err(VcError::new(
                ErrorCode::ExternalOauthFailure,
                format!("token exchange failed: http={status}"),
            )
            .with_context("provider_payload", truncated));
        }

        let raw: Value = serde_json::from_str(&raw_text).map_err(|err| {
            VcError::new(ErrorCode::ExternalOauthFailure, "token payload is not JSON")
                .with_source(err)
        })?;
        let access_token = raw["access_token"].as_str().unwrap_or_default().trim().to_string();
        if access_token.is_empty() {
            return Err(VcError::new(
                ErrorCode::ExternalOauthFailure,
                "token exchange failed: access_token missing",
            ));
        }
        Ok(TokenExchange {
            access_token,
            refresh_token: raw["refresh_token"].as_str().unwrap_or_default().trim().to_string(),
            token_type: raw["token_type"].as_str().unwrap_or_default().trim().to_string(),
            expires_in: raw["expires_in"].as_i64().unwrap_or(0).max(0),
            scope: raw["scope"].as_str().unwrap_or_default().trim().to_string(),
            raw,
        })
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchange, VcError> {
        let redirect = if redirect_uri.trim().is_empty() {
            DEFAULT_REDIRECT_URI
        } else {
            redirect_uri.trim()
        };
        self.post_token_request(&[
            ("client_id", client_id.trim()),
            ("client_secret", client_secret.trim()),
            ("code", code.trim()),
            ("redirect_uri", redirect),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenExchange, VcError> {
        self.post_token_request(&[
            ("client_id", client_id.trim()),
            ("client_secret", client_secret.trim()),
            ("refresh_token", refresh_token.trim()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_url_carries_offline_access() {
        let client = OAuthClient::new().unwrap();
        let url = client
            .build_consent_url(
                "client-123",
                &["scope-a".into(), "scope-b".into(), "scope-a".into()],
                "conn-1",
                "",
            )
            .unwrap();
        assert!(url.starts_with(GOOGLE_AUTH_BASE));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=conn-1"));
        // Scopes are deduplicated and space-joined before encoding.
        assert!(url.contains("scope=scope-a+scope-b") || url.contains("scope=scope-a%20scope-b"));
        assert!(url.contains("urn%3Aietf%3Awg%3Aoauth%3A2.0%3Aoob"));
    }

    #[test]
    fn client_id_masking() {
        assert_eq!(mask_client_id("abc"), "***");
        assert_eq!(mask_client_id("shorty"), "***");
        assert_eq!(mask_client_id("1234567890"), "123...890");
    }

    #[test]
    fn token_ref_is_deterministic_and_opaque() {
        let payload = serde_json::json!({"connection_id": "conn-1", "kind": "refresh"});
        let a = build_token_ref("google_drive", &payload);
        let b = build_token_ref("google_drive", &payload);
        assert_eq!(a, b);
        assert!(a.starts_with("google_drive:"));
        assert_eq!(a.len(), "google_drive:".len() + 24);
        let other = build_token_ref("google_drive", &serde_json::json!({"connection_id": "conn-2"}));
        assert_ne!(a, other);
    }

    #[test]
    fn provider_scope_defaults() {
        assert_eq!(default_scopes("google_gmail").len(), 1);
        assert_eq!(default_scopes("google_drive").len(), 2);
        assert_eq!(default_scopes("google").len(), 3);
        assert_eq!(default_scopes("anything-else").len(), 3);
    }
}
