// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-core
//!
//! Shared domain types for the VC evidence platform: document types and
//! lifecycle statuses, tenant and scope-policy records, artifact metadata,
//! the gateway wire protocol, HMAC request signing, and collection windows.
#![deny(unsafe_code)]

mod artifact;
mod config;
mod sign;
mod tenant;
mod types;
mod window;
mod wire;

pub use artifact::{ArtifactMeta, ArtifactPayload, BundlePayload, CollectionSummary, ScopeAudit};
pub use config::{OauthDefaults, PlatformPaths, SmtpConfig, default_approver};
pub use sign::{
    MAX_CLOCK_SKEW_SECS, SIGNATURE_HEADER, SignatureError, TIMESTAMP_HEADER, sign_body,
    signed_headers, verify_signature,
};
pub use tenant::{
    DEFAULT_FOLDER_ALIAS, DEFAULT_RETENTION_DAYS, ScopePolicy, Tenant, normalize_allow_prefixes,
    normalize_rel_path,
};
pub use types::{
    ApprovalStatus, CollectionStatus, ConfirmationStatus, ConnectionStatus, DocType, RiskLevel,
    ScopeDecision, SyncRunStatus,
};
pub use window::{period_to_days, resolve_window};
pub use wire::{
    ArtifactContent, ArtifactContentRequest, ArtifactContentResponse, HealthResponse,
    ManifestRequest, ManifestResponse,
};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Validation failure for a tenant identifier.
#[derive(Debug, thiserror::Error)]
#[error("startup_id must match [a-z0-9][a-z0-9_-]{{1,63}}")]
pub struct InvalidStartupId;

/// Normalize and validate a tenant identifier.
///
/// Identifiers are lowercased and must match `[a-z0-9][a-z0-9_-]{1,63}`.
pub fn validate_startup_id(raw: &str) -> Result<String, InvalidStartupId> {
    let normalized = raw.trim().to_lowercase();
    let mut chars = normalized.chars();
    let Some(first) = chars.next() else {
        return Err(InvalidStartupId);
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(InvalidStartupId);
    }
    let rest_len = normalized.len() - 1;
    if !(1..=63).contains(&rest_len) {
        return Err(InvalidStartupId);
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(InvalidStartupId);
    }
    Ok(normalized)
}
