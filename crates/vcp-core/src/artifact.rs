// SPDX-License-Identifier: MIT OR Apache-2.0
//! Artifact metadata, payloads, and collection summaries.

use crate::types::DocType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one collected file, as advertised by a gateway manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactMeta {
    /// `sha256:<hex>` content identifier.
    pub artifact_id: String,
    /// `<alias>/<relative path>` within the gateway folder tree.
    pub rel_path: String,
    pub size_bytes: u64,
    /// RFC 3339 modification time; may be empty when unknown.
    #[serde(default)]
    pub mtime: String,
    pub sha256: String,
    pub doc_type: DocType,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ArtifactMeta {
    /// Content identifier derived from a hex digest.
    pub fn artifact_id_for(sha256: &str) -> String {
        format!("sha256:{sha256}")
    }
}

/// Raw content of one collected file, carried inside the encrypted bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactPayload {
    pub rel_path: String,
    pub sha256: String,
    pub content_b64: String,
}

/// Plaintext bundle serialized and encrypted into the vault `.bin` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlePayload {
    pub collection_id: String,
    pub startup_id: String,
    pub window_from: String,
    pub window_to: String,
    pub created_at: String,
    pub artifacts: Vec<ArtifactPayload>,
}

/// One scope-policy decision over a manifest entry.
///
/// Audits are append-only: one row per artifact considered, allows and
/// rejects alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScopeAudit {
    pub rel_path: String,
    pub doc_type: DocType,
    pub decision: crate::types::ScopeDecision,
    pub reason: String,
}

/// Non-secret roll-up of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CollectionSummary {
    pub artifact_count: usize,
    pub total_size_bytes: u64,
    /// Histogram of doc-type labels, deterministic ordering.
    pub doc_types: BTreeMap<String, u64>,
}

impl CollectionSummary {
    pub fn from_artifacts(artifacts: &[ArtifactMeta]) -> Self {
        let mut doc_types: BTreeMap<String, u64> = BTreeMap::new();
        let mut total_size_bytes = 0u64;
        for meta in artifacts {
            *doc_types.entry(meta.doc_type.as_str().to_string()).or_default() += 1;
            total_size_bytes += meta.size_bytes;
        }
        Self {
            artifact_count: artifacts.len(),
            total_size_bytes,
            doc_types,
        }
    }
}
