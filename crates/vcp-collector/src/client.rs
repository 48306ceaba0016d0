// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP client for the startup-side gateway.
//!
//! POST bodies are serialized once and signed over those exact bytes, so
//! the signature the gateway verifies covers what was actually sent.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use vcp_core::{
    ArtifactContentRequest, ArtifactContentResponse, HealthResponse, ManifestRequest,
    ManifestResponse, signed_headers,
};
use vcp_error::{ErrorCode, VcError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONTENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Signed client bound to one tenant's gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    secret: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, secret: &str) -> Result<Self, VcError> {
        let http = reqwest::Client::builder().build().map_err(|err| {
            VcError::new(ErrorCode::Internal, "http client init failed").with_source(err)
        })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn gateway_error(context: &str, err: reqwest::Error) -> VcError {
        VcError::new(ErrorCode::ExternalGatewayFailure, format!("{context} failed"))
            .with_source(err)
    }

    async fn post_signed<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<R, VcError> {
        let raw = serde_json::to_vec(body).map_err(|err| {
            VcError::new(ErrorCode::Internal, "request serialization failed").with_source(err)
        })?;
        let mut request = self
            .http
            .post(self.url(path))
            .timeout(timeout)
            .header("content-type", "application/json");
        for (name, value) in signed_headers(&self.secret, &raw, Utc::now().timestamp()) {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .body(raw)
            .send()
            .await
            .map_err(|err| Self::gateway_error(path, err))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Self::gateway_error(path, err))?;
        if !status.is_success() {
            let detail: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
            let message = detail["error"].as_str().unwrap_or("gateway request rejected");
            return Err(
                VcError::new(ErrorCode::ExternalGatewayFailure, format!("{path}: {message}"))
                    .with_context("http_status", status.as_u16()),
            );
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            VcError::new(
                ErrorCode::ExternalGatewayFailure,
                format!("{path}: invalid response payload"),
            )
            .with_source(err)
        })
    }

    /// Unauthenticated liveness probe.
    pub async fn health(&self) -> Result<HealthResponse, VcError> {
        let response = self
            .http
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| Self::gateway_error("/health", err))?;
        response
            .json()
            .await
            .map_err(|err| Self::gateway_error("/health", err))
    }

    pub async fn manifest(&self, request: &ManifestRequest) -> Result<ManifestResponse, VcError> {
        self.post_signed("/manifest", request, MANIFEST_TIMEOUT).await
    }

    pub async fn artifact_content(
        &self,
        request: &ArtifactContentRequest,
    ) -> Result<ArtifactContentResponse, VcError> {
        self.post_signed("/artifact-content", request, CONTENT_TIMEOUT).await
    }
}
