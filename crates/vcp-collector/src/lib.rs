// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-collector
//!
//! One call runs a full collection cycle against a tenant's gateway:
//! health gate, signed manifest, per-artifact download with SHA-256
//! verification, scope-policy filtering, normalization, envelope
//! encryption into the vault, an atomic database commit, post-collect
//! verification, and finally a pending approval with a computed risk
//! score. No outbound data ever moves without that approval.
#![deny(unsafe_code)]

mod client;
mod vault;
mod verify;

pub use client::GatewayClient;
pub use vault::{BundleMetaDoc, EnvelopeMeta, SavedBundle, save_bundle};
pub use verify::{VerificationCheck, VerificationReport, verify_collection_integrity};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use vcp_core::{
    ArtifactContentRequest, ArtifactMeta, ArtifactPayload, CollectionStatus, CollectionSummary,
    ManifestRequest, PlatformPaths, Tenant, resolve_window, sha256_hex, validate_startup_id,
};
use vcp_crypto::KeyStore;
use vcp_error::{ErrorCode, VcError};
use vcp_policy::PolicySummary;
use vcp_registry::TenantRegistry;
use vcp_risk::RiskAssessment;
use vcp_store::{
    ApprovalPayload, ApprovalRow, CollectionCycleRecord, CollectionRow, NewApproval,
    NewNormalizedRecord, PlatformStore,
};

/// Default approval TTL in hours.
pub const APPROVAL_TTL_HOURS: i64 = 48;

/// Knobs for one collection cycle.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Period shorthand used when explicit bounds are absent.
    pub period: String,
    pub window_from: String,
    pub window_to: String,
    pub include_ocr: bool,
    /// Clamped to `[1, 1000]`.
    pub max_artifacts: usize,
    /// Re-read and decrypt the vault envelope after the commit.
    pub auto_verify: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            period: "7d".into(),
            window_from: String::new(),
            window_to: String::new(),
            include_ocr: true,
            max_artifacts: 200,
            auto_verify: true,
        }
    }
}

/// Result of a successful collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectOutcome {
    pub startup_id: String,
    pub request_id: String,
    pub collection_id: String,
    pub approval_id: String,
    pub window_from: String,
    pub window_to: String,
    pub encrypted_path: String,
    pub metadata_path: String,
    pub summary: CollectionSummary,
    pub verification: VerificationReport,
    pub scope_policy_summary: PolicySummary,
    pub normalized_record_count: usize,
    pub risk: RiskAssessment,
}

/// Operator-facing tenant snapshot (secret redacted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantStatus {
    pub tenant: Tenant,
    pub scope_policy: vcp_core::ScopePolicy,
    pub pending_approvals: Vec<ApprovalRow>,
    pub recent_collections: Vec<CollectionRow>,
}

fn active_tenant(registry: &TenantRegistry, startup_id: &str) -> Result<Tenant, VcError> {
    let sid = validate_startup_id(startup_id)
        .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
    let tenant = registry
        .get(&sid)
        .map_err(|err| VcError::new(ErrorCode::StorageFailure, "registry read failed").with_source(err))?
        .ok_or_else(|| {
            VcError::new(ErrorCode::ConfigTenantMissing, format!("tenant not found: {sid}"))
        })?;
    if !tenant.active {
        return Err(VcError::new(
            ErrorCode::ConfigTenantInactive,
            format!("tenant is inactive: {sid}"),
        ));
    }
    Ok(tenant)
}

async fn download_artifacts(
    client: &GatewayClient,
    tenant: &Tenant,
    request_id: &str,
    window_from: &str,
    window_to: &str,
    include_ocr: bool,
    max_artifacts: usize,
) -> Result<(Vec<ArtifactMeta>, Vec<ArtifactPayload>), VcError> {
    let manifest = client
        .manifest(&ManifestRequest {
            startup_id: tenant.startup_id.clone(),
            request_id: request_id.to_string(),
            window_from: window_from.to_string(),
            window_to: window_to.to_string(),
            doc_types: tenant.allowed_doc_types.clone(),
            include_ocr,
            folder_alias: tenant.folder_alias_or_default().to_string(),
            max_artifacts: Some(max_artifacts),
        })
        .await?;

    let mut collected_meta: Vec<ArtifactMeta> = Vec::new();
    let mut collected_payload: Vec<ArtifactPayload> = Vec::new();
    for entry in manifest.artifacts.into_iter().take(max_artifacts) {
        let rel_path = entry.rel_path.trim().to_string();
        if rel_path.is_empty() {
            continue;
        }
        let response = client
            .artifact_content(&ArtifactContentRequest {
                startup_id: tenant.startup_id.clone(),
                request_id: request_id.to_string(),
                rel_path: rel_path.clone(),
            })
            .await?;
        let content_b64 = response.artifact.content_b64;
        if content_b64.is_empty() {
            continue;
        }
        let raw = BASE64.decode(&content_b64).map_err(|err| {
            VcError::new(
                ErrorCode::ExternalGatewayFailure,
                format!("invalid artifact encoding: {rel_path}"),
            )
            .with_source(err)
        })?;
        let digest = sha256_hex(&raw);
        let expected = if entry.sha256.trim().is_empty() {
            response.artifact.sha256.trim().to_string()
        } else {
            entry.sha256.trim().to_string()
        };
        if !expected.is_empty() && digest != expected {
            return Err(VcError::new(
                ErrorCode::IntegrityShaMismatch,
                format!("sha256 mismatch: {rel_path}"),
            )
            .with_context("expected", expected)
            .with_context("actual", digest));
        }

        collected_meta.push(ArtifactMeta {
            artifact_id: if entry.artifact_id.trim().is_empty() {
                ArtifactMeta::artifact_id_for(&digest)
            } else {
                entry.artifact_id.clone()
            },
            rel_path: rel_path.clone(),
            size_bytes: if entry.size_bytes > 0 { entry.size_bytes } else { raw.len() as u64 },
            mtime: entry.mtime.clone(),
            sha256: digest.clone(),
            doc_type: entry.doc_type,
            confidence: entry.confidence,
        });
        collected_payload.push(ArtifactPayload { rel_path, sha256: digest, content_b64 });
    }
    Ok((collected_meta, collected_payload))
}

/// Run one full collection cycle for a tenant.
///
/// Failures before the database commit leave no rows behind; a failed
/// post-commit verification marks the collection `verification_failed`
/// and creates no approval.
pub async fn collect(
    registry: &TenantRegistry,
    store: &PlatformStore,
    keys: &KeyStore,
    paths: &PlatformPaths,
    startup_id: &str,
    options: CollectOptions,
) -> Result<CollectOutcome, VcError> {
    let tenant = active_tenant(registry, startup_id)?;
    let sid = tenant.startup_id.clone();
    if tenant.gateway_url.trim().is_empty() {
        return Err(VcError::new(
            ErrorCode::ConfigGatewayMissing,
            format!("tenant has no gateway_url: {sid}"),
        ));
    }

    let (window_from, window_to) = resolve_window(
        &options.window_from,
        &options.window_to,
        &options.period,
        chrono::Utc::now(),
    );
    let max_artifacts = options.max_artifacts.clamp(1, 1000);
    let request_id = Uuid::new_v4().to_string();
    let collection_id = Uuid::new_v4().to_string();

    let client = GatewayClient::new(&tenant.gateway_url, &tenant.gateway_secret)?;
    let health = client.health().await?;
    if !health.ok {
        return Err(VcError::new(
            ErrorCode::ExternalGatewayFailure,
            "gateway health check failed",
        ));
    }

    let (raw_meta, raw_payload) = download_artifacts(
        &client,
        &tenant,
        &request_id,
        &window_from,
        &window_to,
        options.include_ocr,
        max_artifacts,
    )
    .await?;

    let filtered = vcp_policy::filter_artifacts_by_policy(&tenant, raw_meta, raw_payload);
    let saved = save_bundle(
        paths,
        keys,
        &sid,
        &collection_id,
        &window_from,
        &window_to,
        &filtered.accepted_meta,
        &filtered.accepted_payload,
    )?;

    let normalized = vcp_normalizer::normalize_collection_artifacts(
        &sid,
        &collection_id,
        &filtered.accepted_meta,
        &filtered.accepted_payload,
    );
    let normalized_record_count = normalized.len();
    store
        .record_collection_cycle(&CollectionCycleRecord {
            collection_id: collection_id.clone(),
            startup_id: sid.clone(),
            window_from: window_from.clone(),
            window_to: window_to.clone(),
            status: CollectionStatus::Collected,
            encrypted_path: saved.encrypted_path.clone(),
            summary: saved.summary.clone(),
            artifacts: filtered.accepted_meta.clone(),
            scope_audits: filtered.audits.clone(),
            normalized: normalized
                .into_iter()
                .map(|record| NewNormalizedRecord {
                    record_id: record.record_id,
                    artifact_id: record.artifact_id,
                    schema_type: record.schema_type,
                    payload: record.payload,
                })
                .collect(),
        })
        .map_err(|err| {
            VcError::new(ErrorCode::StorageFailure, "collection commit failed").with_source(err)
        })?;

    let verification = if options.auto_verify {
        verify_collection_integrity(
            paths,
            store,
            keys,
            &sid,
            &collection_id,
            &saved.encrypted_path,
            &saved.metadata_path,
            &filtered.accepted_meta,
        )
    } else {
        VerificationReport::skipped()
    };
    if !verification.success {
        warn!(
            startup_id = %sid,
            collection_id = %collection_id,
            "collection verification failed"
        );
        store
            .set_collection_status(&collection_id, CollectionStatus::VerificationFailed)
            .map_err(|err| {
                VcError::new(ErrorCode::StorageFailure, "status update failed").with_source(err)
            })?;
        return Err(VcError::new(
            ErrorCode::IntegrityVerificationFailed,
            "automatic verification failed",
        )
        .with_context("collection_id", &collection_id)
        .with_context("verification", serde_json::to_value(&verification).unwrap_or_default()));
    }

    let risk = vcp_risk::assess_collection_risk(&tenant, &filtered.accepted_meta, &filtered.audits);
    let approval_id = Uuid::new_v4().to_string();
    store
        .create_approval(&NewApproval {
            approval_id: approval_id.clone(),
            collection_id: collection_id.clone(),
            action_type: "dispatch_email".into(),
            payload: ApprovalPayload {
                startup_id: sid.clone(),
                collection_id: collection_id.clone(),
                email_recipients: tenant.email_recipients.clone(),
                metadata_path: saved.metadata_path.clone(),
            },
            risk_score: risk.score,
            risk_level: risk.level,
            risk_reasons: risk.reasons.clone(),
            expires_hours: APPROVAL_TTL_HOURS,
        })
        .map_err(|err| {
            VcError::new(ErrorCode::StorageFailure, "approval creation failed").with_source(err)
        })?;
    store
        .set_collection_status(&collection_id, CollectionStatus::AwaitingApproval)
        .map_err(|err| {
            VcError::new(ErrorCode::StorageFailure, "status update failed").with_source(err)
        })?;

    info!(
        startup_id = %sid,
        collection_id = %collection_id,
        approval_id = %approval_id,
        artifact_count = saved.summary.artifact_count,
        risk_level = %risk.level,
        "collection cycle complete"
    );

    Ok(CollectOutcome {
        startup_id: sid,
        request_id,
        collection_id,
        approval_id,
        window_from,
        window_to,
        encrypted_path: saved.encrypted_path,
        metadata_path: saved.metadata_path,
        summary: saved.summary,
        verification,
        scope_policy_summary: filtered.summary,
        normalized_record_count,
        risk,
    })
}

/// Tenant snapshot for the operator: configuration, resolved scope
/// policy, pending approvals, and recent collections.
pub fn tenant_status(
    registry: &TenantRegistry,
    store: &PlatformStore,
    startup_id: &str,
) -> Result<TenantStatus, VcError> {
    let sid = validate_startup_id(startup_id)
        .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
    let mut tenant = registry
        .get(&sid)
        .map_err(|err| VcError::new(ErrorCode::StorageFailure, "registry read failed").with_source(err))?
        .ok_or_else(|| {
            VcError::new(ErrorCode::ConfigTenantMissing, format!("tenant not found: {sid}"))
        })?;
    let scope_policy = tenant.scope_policy();
    // The shared secret never leaves the registry file.
    tenant.gateway_secret = String::new();

    let pending_approvals = store
        .list_pending_approvals(Some(sid.as_str()), 20)
        .map_err(|err| VcError::new(ErrorCode::StorageFailure, "approval read failed").with_source(err))?;
    let recent_collections = store
        .list_collections(&sid, None, None, 5)
        .map_err(|err| VcError::new(ErrorCode::StorageFailure, "collection read failed").with_source(err))?;

    Ok(TenantStatus { tenant, scope_policy, pending_approvals, recent_collections })
}
