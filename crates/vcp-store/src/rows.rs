// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed rows for every long-lived entity.

use serde::{Deserialize, Serialize};
use vcp_core::{
    ApprovalStatus, CollectionStatus, CollectionSummary, ConfirmationStatus, ConnectionStatus,
    DocType, RiskLevel, ScopeDecision, SyncRunStatus,
};

/// One pull cycle's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRow {
    pub collection_id: String,
    pub startup_id: String,
    pub window_from: String,
    pub window_to: String,
    pub status: CollectionStatus,
    /// Workdir-relative path of the encrypted bundle.
    pub encrypted_path: String,
    pub summary: CollectionSummary,
    pub created_at: String,
}

/// One collected file, keyed by `(artifact_id, collection_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRow {
    pub artifact_id: String,
    pub collection_id: String,
    pub rel_path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub doc_type: DocType,
    pub confidence: f64,
    pub mtime: String,
}

/// Payload attached to a dispatch approval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    #[serde(default)]
    pub startup_id: String,
    #[serde(default)]
    pub collection_id: String,
    #[serde(default)]
    pub email_recipients: Vec<String>,
    #[serde(default)]
    pub metadata_path: String,
}

/// Approval row joined with its collection's startup_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRow {
    pub approval_id: String,
    pub collection_id: String,
    pub startup_id: String,
    pub action_type: String,
    pub payload: ApprovalPayload,
    pub status: ApprovalStatus,
    pub reason: String,
    pub requested_at: String,
    /// Empty unless the approval reached `approved` or `dispatched`.
    pub approved_at: String,
    /// Empty unless the approval reached `dispatched`.
    pub dispatched_at: String,
    pub approver: String,
    pub expires_at: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_reasons: Vec<String>,
}

/// Append-only scope-policy decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeAuditRow {
    pub audit_id: i64,
    pub collection_id: String,
    pub startup_id: String,
    pub rel_path: String,
    pub doc_type: DocType,
    pub decision: ScopeDecision,
    pub reason: String,
    pub created_at: String,
}

/// Doc-type-specific extracted fields keyed by a deterministic hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecordRow {
    pub record_id: String,
    pub startup_id: String,
    pub collection_id: String,
    pub artifact_id: String,
    pub schema_type: DocType,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// One high-risk sign-off; unique per `(approval_id, approver)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignoffRow {
    pub signoff_id: i64,
    pub approval_id: String,
    pub approver: String,
    pub created_at: String,
}

/// SaaS credential binding per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub connection_id: String,
    pub startup_id: String,
    pub provider: String,
    pub mode: String,
    pub status: ConnectionStatus,
    pub scopes: Vec<String>,
    pub token_ref: String,
    pub refresh_token_ref: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
    pub revoked_at: String,
}

/// Bookkeeping for one integration sync attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunRow {
    pub run_id: String,
    pub startup_id: String,
    pub provider: String,
    pub connection_id: String,
    pub run_mode: String,
    pub window_from: String,
    pub window_to: String,
    pub status: SyncRunStatus,
    pub summary: serde_json::Value,
    pub error: String,
    pub created_at: String,
    pub finished_at: String,
}

/// Per-run document record for non-filesystem ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationDocumentRow {
    pub document_id: String,
    pub run_id: String,
    pub startup_id: String,
    pub provider: String,
    pub source_id: String,
    pub title: String,
    pub mime_type: String,
    pub doc_type: DocType,
    pub confidence: f64,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Out-of-band confirmation captured before external dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRow {
    pub confirmation_id: String,
    pub startup_id: String,
    pub collection_id: String,
    pub channel: String,
    pub message: String,
    pub status: ConfirmationStatus,
    pub requested_at: String,
    pub responded_at: String,
    pub responder: String,
    pub response: serde_json::Value,
}
