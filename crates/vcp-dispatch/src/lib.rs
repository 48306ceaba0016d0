// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-dispatch
//!
//! Approval-gated outbound delivery. An approval must already be in
//! `approved` (or `dispatched`, for re-sends) before anything leaves the
//! system; a successful send transitions both the approval and its
//! collection to `dispatched`. Dry runs render the exact email without
//! touching state.
#![deny(unsafe_code)]

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use vcp_core::{ApprovalStatus, CollectionStatus, PlatformPaths, SmtpConfig};
use vcp_error::{ErrorCode, VcError};
use vcp_registry::TenantRegistry;
use vcp_store::{ApprovalRow, CollectionRow, PlatformStore};

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Body preview length returned from dry runs.
const PREVIEW_CHARS: usize = 1000;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub approval_id: String,
    pub collection_id: String,
    pub subject: String,
    pub recipients: Vec<String>,
    pub sent: bool,
    pub dry_run: bool,
    /// Transport description (`smtp://host:port`) on real sends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Rendered body head, only on dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_preview: Option<String>,
    pub metadata_path: String,
}

fn storage_error(err: vcp_store::StoreError) -> VcError {
    VcError::new(ErrorCode::StorageFailure, "store access failed").with_source(err)
}

/// Deterministic plaintext report body for one approval.
pub fn build_email_body(approval: &ApprovalRow, collection: Option<&CollectionRow>) -> String {
    let summary = collection.map(|c| c.summary.clone()).unwrap_or_default();
    let reasons = serde_json::to_string(&approval.risk_reasons).unwrap_or_else(|_| "[]".into());
    let doc_types = serde_json::to_string(&summary.doc_types).unwrap_or_else(|_| "{}".into());
    let lines = [
        "[OpenClaw VC Report]".to_string(),
        format!("startup_id: {}", approval.startup_id),
        format!("approval_id: {}", approval.approval_id),
        format!("collection_id: {}", approval.collection_id),
        format!("risk_level: {}", approval.risk_level),
        format!("risk_score: {}", approval.risk_score),
        format!("risk_reasons: {reasons}"),
        String::new(),
        "Summary".to_string(),
        format!("- artifact_count: {}", summary.artifact_count),
        format!("- total_size_bytes: {}", summary.total_size_bytes),
        format!("- doc_types: {doc_types}"),
        String::new(),
        format!("metadata_path: {}", approval.payload.metadata_path),
    ];
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

fn smtp_send(
    smtp: &SmtpConfig,
    recipients: &[String],
    subject: &str,
    body: &str,
) -> Result<String, VcError> {
    let smtp_error =
        |message: &str| VcError::new(ErrorCode::ExternalSmtpFailure, message.to_string());

    let from: Mailbox = smtp
        .from
        .parse()
        .map_err(|_| smtp_error("invalid from address"))?;
    let mut message = Message::builder().from(from).subject(subject);
    for recipient in recipients {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| smtp_error("invalid recipient address"))?;
        message = message.to(to);
    }
    let email = message
        .body(body.to_string())
        .map_err(|_| smtp_error("message build failed"))?;

    let mut builder = if smtp.tls {
        SmtpTransport::starttls_relay(&smtp.host)
            .map_err(|err| smtp_error("starttls setup failed").with_source(err))?
    } else {
        SmtpTransport::builder_dangerous(&smtp.host)
    };
    builder = builder.port(smtp.port).timeout(Some(SMTP_TIMEOUT));
    if !smtp.user.is_empty() {
        builder = builder.credentials(Credentials::new(smtp.user.clone(), smtp.password.clone()));
    }
    let mailer = builder.build();
    mailer
        .send(&email)
        .map_err(|err| smtp_error("smtp send failed").with_source(err))?;
    Ok(format!("smtp://{}:{}", smtp.host, smtp.port))
}

/// Dispatch one approved collection by email.
///
/// Recipient resolution prefers the approval payload and falls back to
/// the tenant configuration. SMTP failures leave all state untouched.
pub fn dispatch_approval(
    store: &PlatformStore,
    registry: &TenantRegistry,
    smtp: Option<&SmtpConfig>,
    _paths: &PlatformPaths,
    approval_id: &str,
    dry_run: bool,
) -> Result<DispatchOutcome, VcError> {
    let approval = store
        .get_approval(approval_id)
        .map_err(storage_error)?
        .ok_or_else(|| {
            VcError::new(ErrorCode::StateNotFound, format!("approval not found: {approval_id}"))
        })?;
    if !matches!(approval.status, ApprovalStatus::Approved | ApprovalStatus::Dispatched) {
        return Err(VcError::new(
            ErrorCode::StateInvalidTransition,
            format!("approval status must be approved/dispatched, got={}", approval.status),
        ));
    }

    let mut recipients: Vec<String> = approval
        .payload
        .email_recipients
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if recipients.is_empty() {
        if let Ok(Some(tenant)) = registry.get(&approval.startup_id) {
            recipients = tenant
                .email_recipients
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
    }
    if recipients.is_empty() {
        return Err(VcError::new(
            ErrorCode::ConfigRecipientsMissing,
            "no email recipients configured",
        ));
    }

    let collection = store
        .get_collection(&approval.collection_id)
        .map_err(storage_error)?;
    let subject = format!(
        "[OpenClaw][{}] Collection {}",
        approval.startup_id, approval.collection_id
    );
    let body = build_email_body(&approval, collection.as_ref());

    if dry_run {
        return Ok(DispatchOutcome {
            approval_id: approval.approval_id,
            collection_id: approval.collection_id,
            subject,
            recipients,
            sent: false,
            dry_run: true,
            transport: None,
            body_preview: Some(body.chars().take(PREVIEW_CHARS).collect()),
            metadata_path: approval.payload.metadata_path,
        });
    }

    let smtp = smtp.ok_or_else(|| {
        VcError::new(ErrorCode::ConfigSmtpMissing, "smtp host not configured")
    })?;
    let transport = smtp_send(smtp, &recipients, &subject, &body)?;

    store
        .update_approval_status(
            &approval.approval_id,
            ApprovalStatus::Dispatched,
            &approval.approver,
            "",
        )
        .map_err(storage_error)?;
    store
        .set_collection_status(&approval.collection_id, CollectionStatus::Dispatched)
        .map_err(storage_error)?;

    info!(
        approval_id = %approval.approval_id,
        collection_id = %approval.collection_id,
        recipients = recipients.len(),
        "approval dispatched"
    );

    Ok(DispatchOutcome {
        approval_id: approval.approval_id,
        collection_id: approval.collection_id,
        subject,
        recipients,
        sent: true,
        dry_run: false,
        transport: Some(transport),
        body_preview: None,
        metadata_path: approval.payload.metadata_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_core::{CollectionSummary, RiskLevel};
    use vcp_store::{ApprovalPayload, CollectionCycleRecord, NewApproval};

    struct Env {
        _dir: tempfile::TempDir,
        paths: PlatformPaths,
        registry: TenantRegistry,
        store: PlatformStore,
    }

    fn env() -> Env {
        let dir = tempfile::tempdir().unwrap();
        let paths = PlatformPaths::new(dir.path());
        let registry = TenantRegistry::new(paths.registry_path());
        let store = PlatformStore::open(paths.db_path()).unwrap();
        Env { _dir: dir, paths, registry, store }
    }

    fn seed(env: &Env, approval_id: &str, recipients: Vec<String>) {
        env.store
            .record_collection_cycle(&CollectionCycleRecord {
                collection_id: "c-1".into(),
                startup_id: "acme".into(),
                window_from: "2026-01-01T00:00:00+00:00".into(),
                window_to: "2026-02-01T00:00:00+00:00".into(),
                status: vcp_core::CollectionStatus::AwaitingApproval,
                encrypted_path: "vault/acme/2026/02/01/c-1.bin".into(),
                summary: CollectionSummary::default(),
                artifacts: vec![],
                scope_audits: vec![],
                normalized: vec![],
            })
            .unwrap();
        env.store
            .create_approval(&NewApproval {
                approval_id: approval_id.into(),
                collection_id: "c-1".into(),
                action_type: "dispatch_email".into(),
                payload: ApprovalPayload {
                    startup_id: "acme".into(),
                    collection_id: "c-1".into(),
                    email_recipients: recipients,
                    metadata_path: "vault/acme/2026/02/01/c-1.json".into(),
                },
                risk_score: 0.2,
                risk_level: RiskLevel::Low,
                risk_reasons: vec![],
                expires_hours: 48,
            })
            .unwrap();
    }

    #[test]
    fn pending_approval_cannot_dispatch() {
        let env = env();
        seed(&env, "a-1", vec!["ops@fund.example".into()]);
        let err =
            dispatch_approval(&env.store, &env.registry, None, &env.paths, "a-1", true).unwrap_err();
        assert_eq!(err.code, ErrorCode::StateInvalidTransition);
    }

    #[test]
    fn unknown_approval_is_not_found() {
        let env = env();
        let err =
            dispatch_approval(&env.store, &env.registry, None, &env.paths, "ghost", true).unwrap_err();
        assert_eq!(err.code, ErrorCode::StateNotFound);
    }

    #[test]
    fn dry_run_renders_without_state_change() {
        let env = env();
        seed(&env, "a-1", vec!["ops@fund.example".into()]);
        env.store
            .update_approval_status("a-1", ApprovalStatus::Approved, "alice", "")
            .unwrap();

        let outcome =
            dispatch_approval(&env.store, &env.registry, None, &env.paths, "a-1", true).unwrap();
        assert!(outcome.dry_run);
        assert!(!outcome.sent);
        assert_eq!(outcome.subject, "[OpenClaw][acme] Collection c-1");
        let preview = outcome.body_preview.unwrap();
        assert!(preview.contains("approval_id: a-1"));
        assert!(preview.contains("collection_id: c-1"));

        let approval = env.store.get_approval("a-1").unwrap().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert!(approval.dispatched_at.is_empty());
    }

    #[test]
    fn recipients_fall_back_to_tenant() {
        let env = env();
        env.registry.register("acme", "Acme").unwrap();
        env.registry
            .set_email_recipients("acme", &["cfo@fund.example".to_string()])
            .unwrap();
        seed(&env, "a-1", vec![]);
        env.store
            .update_approval_status("a-1", ApprovalStatus::Approved, "alice", "")
            .unwrap();

        let outcome =
            dispatch_approval(&env.store, &env.registry, None, &env.paths, "a-1", true).unwrap();
        assert_eq!(outcome.recipients, vec!["cfo@fund.example"]);
    }

    #[test]
    fn empty_recipients_fail_without_state_change() {
        let env = env();
        seed(&env, "a-1", vec![]);
        env.store
            .update_approval_status("a-1", ApprovalStatus::Approved, "alice", "")
            .unwrap();

        let err =
            dispatch_approval(&env.store, &env.registry, None, &env.paths, "a-1", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigRecipientsMissing);
        let approval = env.store.get_approval("a-1").unwrap().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Approved);
    }

    #[test]
    fn missing_smtp_fails_real_send() {
        let env = env();
        seed(&env, "a-1", vec!["ops@fund.example".into()]);
        env.store
            .update_approval_status("a-1", ApprovalStatus::Approved, "alice", "")
            .unwrap();

        let err =
            dispatch_approval(&env.store, &env.registry, None, &env.paths, "a-1", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigSmtpMissing);
    }

    #[test]
    fn body_is_deterministic() {
        let env = env();
        seed(&env, "a-1", vec!["ops@fund.example".into()]);
        let approval = env.store.get_approval("a-1").unwrap().unwrap();
        let collection = env.store.get_collection("c-1").unwrap();
        let first = build_email_body(&approval, collection.as_ref());
        let second = build_email_body(&approval, collection.as_ref());
        assert_eq!(first, second);
        assert!(first.ends_with('\n'));
        assert!(first.contains("metadata_path: vault/acme/2026/02/01/c-1.json"));
    }
}
