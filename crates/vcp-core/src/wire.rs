// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway wire protocol: request and response bodies for `/health`,
//! `/manifest`, and `/artifact-content`.

use crate::artifact::ArtifactMeta;
use crate::types::DocType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Response body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub startup_id: String,
    /// Sorted folder aliases the gateway serves.
    pub folders: Vec<String>,
    pub timestamp: String,
}

/// Request body of `POST /manifest`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestRequest {
    pub startup_id: String,
    pub request_id: String,
    /// RFC 3339 window start; empty disables the lower bound.
    #[serde(default)]
    pub window_from: String,
    /// RFC 3339 window end; empty disables the upper bound.
    #[serde(default)]
    pub window_to: String,
    /// Doc-type filter; empty means all.
    #[serde(default)]
    pub doc_types: Vec<DocType>,
    #[serde(default)]
    pub include_ocr: bool,
    /// Restrict the scan to one alias; empty scans every configured folder.
    #[serde(default)]
    pub folder_alias: String,
    /// Client-side cap; the server clamps to its own maximum.
    #[serde(default)]
    pub max_artifacts: Option<usize>,
}

/// Response body of `POST /manifest`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestResponse {
    pub ok: bool,
    pub request_id: String,
    /// Candidate artifacts sorted by descending mtime.
    pub artifacts: Vec<ArtifactMeta>,
}

/// Request body of `POST /artifact-content`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactContentRequest {
    pub startup_id: String,
    #[serde(default)]
    pub request_id: String,
    pub rel_path: String,
}

/// File bytes returned by `POST /artifact-content`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactContent {
    pub rel_path: String,
    pub size_bytes: u64,
    /// SHA-256 recomputed over the bytes actually read.
    pub sha256: String,
    pub content_b64: String,
}

/// Response body of `POST /artifact-content`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactContentResponse {
    pub ok: bool,
    pub artifact: ArtifactContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_request_defaults() {
        let req: ManifestRequest = serde_json::from_str(
            r#"{"startup_id":"acme","request_id":"r-1"}"#,
        )
        .unwrap();
        assert!(req.window_from.is_empty());
        assert!(req.doc_types.is_empty());
        assert!(!req.include_ocr);
        assert!(req.max_artifacts.is_none());
    }

    #[test]
    fn manifest_response_roundtrip() {
        let resp = ManifestResponse {
            ok: true,
            request_id: "r-1".into(),
            artifacts: vec![],
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ManifestResponse = serde_json::from_str(&json).unwrap();
        assert!(back.ok);
        assert_eq!(back.request_id, "r-1");
    }
}
