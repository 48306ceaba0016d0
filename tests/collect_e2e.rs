// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end collection cycle against a live local gateway: manifest,
//! download, policy, vault, verification, approval, and gated dispatch.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use vcp_approval::{ApproveOptions, approve, list_pending};
use vcp_collector::{CollectOptions, collect};
use vcp_core::{ApprovalStatus, CollectionStatus, DocType, PlatformPaths, RiskLevel, ScopeDecision};
use vcp_crypto::KeyStore;
use vcp_gateway::{GatewayConfig, GatewayState, build_app};
use vcp_registry::{ScopePolicyUpdate, TenantRegistry};
use vcp_store::PlatformStore;

const SECRET: &str = "local-secret";

struct Central {
    _dir: tempfile::TempDir,
    paths: PlatformPaths,
    registry: TenantRegistry,
    store: PlatformStore,
    keys: KeyStore,
}

fn central() -> Central {
    let dir = tempfile::tempdir().unwrap();
    let paths = PlatformPaths::new(dir.path());
    let registry = TenantRegistry::new(paths.registry_path());
    let store = PlatformStore::open(paths.db_path()).unwrap();
    let keys = KeyStore::new(paths.key_path());
    Central { _dir: dir, paths, registry, store, keys }
}

async fn spawn_gateway(root: &Path) -> String {
    let mut folders = BTreeMap::new();
    folders.insert("desktop_common".to_string(), root.to_path_buf());
    let config = GatewayConfig::new("acme", folders, SECRET, 100).unwrap();
    let app = build_app(Arc::new(GatewayState::new(config)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn collect_then_approve_happy_path() {
    let folder = tempfile::tempdir().unwrap();
    std::fs::write(folder.path().join("acme_ir_deck.txt"), "investor deck\nroadmap").unwrap();
    std::fs::write(folder.path().join("acme_tax_invoice_202602.txt"), "세금계산서 #1").unwrap();
    std::fs::write(folder.path().join("scan_0042.bin"), b"\x00\x01binary scan").unwrap();
    let gateway_url = spawn_gateway(folder.path()).await;

    let env = central();
    env.registry.register("acme", "Acme AI").unwrap();
    env.registry
        .bind_folder("acme", &gateway_url, "desktop_common", SECRET)
        .unwrap();
    env.registry
        .set_email_recipients("acme", &["founder@gmail.com".to_string()])
        .unwrap();
    // Accept everything the classifier can label, unknown included.
    env.registry
        .update_scope_policy(
            "acme",
            ScopePolicyUpdate {
                allowed_doc_types: Some(DocType::ALL.to_vec()),
                ..ScopePolicyUpdate::default()
            },
        )
        .unwrap();

    let outcome = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "acme",
        CollectOptions { period: "7d".into(), ..CollectOptions::default() },
    )
    .await
    .unwrap();

    assert_eq!(outcome.summary.artifact_count, 3);
    assert!(outcome.summary.doc_types.contains_key("ir_deck"));
    assert!(outcome.summary.doc_types.contains_key("tax_invoice"));
    assert!(outcome.summary.doc_types.contains_key("unknown"));
    assert!(outcome.verification.success);
    assert_eq!(outcome.scope_policy_summary.allow_count, 3);
    assert_eq!(outcome.scope_policy_summary.reject_count, 0);
    assert_eq!(outcome.normalized_record_count, 3);
    // One unknown doc plus a free-mail recipient and missing core docs
    // push the deterministic score into the medium band.
    assert!(matches!(outcome.risk.level, RiskLevel::Medium | RiskLevel::High));
    assert!(outcome.risk.reasons.iter().any(|r| r.starts_with("unknown_doc_ratio:")));
    assert!(outcome.risk.reasons.iter().any(|r| r.starts_with("missing_core_docs:")));
    assert!(outcome
        .risk
        .reasons
        .contains(&"free_mail_recipient:gmail.com".to_string()));

    // Vault artifacts exist at the reported workdir-relative paths.
    assert!(env.paths.workdir().join(&outcome.encrypted_path).is_file());
    assert!(env.paths.workdir().join(&outcome.metadata_path).is_file());

    // Database state: collection awaits approval with all companion rows.
    let collection = env.store.get_collection(&outcome.collection_id).unwrap().unwrap();
    assert_eq!(collection.status, CollectionStatus::AwaitingApproval);
    assert_eq!(env.store.list_artifacts(&outcome.collection_id).unwrap().len(), 3);
    let audits = env
        .store
        .list_scope_audits("acme", Some(outcome.collection_id.as_str()), None, 100)
        .unwrap();
    assert_eq!(audits.len(), 3);
    assert!(audits.iter().all(|a| a.decision == ScopeDecision::Allow));
    assert_eq!(
        env.store
            .list_normalized_records(Some("acme"), Some(outcome.collection_id.as_str()), 100)
            .unwrap()
            .len(),
        3
    );

    let overview = list_pending(&env.store, Some("acme")).unwrap();
    assert_eq!(overview.count, 1);
    assert_eq!(overview.pending[0].approval.approval_id, outcome.approval_id);

    // Approve with a dry-run dispatch: approval advances, nothing leaves.
    let approved = approve(
        &env.store,
        &env.registry,
        None,
        &env.paths,
        &outcome.approval_id,
        ApproveOptions {
            approver: "tester".into(),
            dry_run_dispatch: Some(true),
            ..ApproveOptions::default()
        },
    )
    .unwrap();
    assert!(!approved.requires_second_approval);
    assert_eq!(approved.approval.status, ApprovalStatus::Approved);
    assert!(!approved.dispatched);
    let dispatch = approved.dispatch.unwrap();
    assert!(dispatch.dry_run);
    assert_eq!(
        dispatch.subject,
        format!("[OpenClaw][acme] Collection {}", outcome.collection_id)
    );
    // Dry run leaves the collection awaiting approval.
    let collection = env.store.get_collection(&outcome.collection_id).unwrap().unwrap();
    assert_eq!(collection.status, CollectionStatus::AwaitingApproval);
}

#[tokio::test]
async fn deny_patterns_keep_artifacts_out_of_the_bundle() {
    let folder = tempfile::tempdir().unwrap();
    std::fs::write(folder.path().join("acme_ir_deck.txt"), "investor deck").unwrap();
    std::fs::write(folder.path().join("secret_plan.txt"), "do not share").unwrap();
    let gateway_url = spawn_gateway(folder.path()).await;

    let env = central();
    env.registry.register("acme", "Acme AI").unwrap();
    env.registry
        .bind_folder("acme", &gateway_url, "desktop_common", SECRET)
        .unwrap();
    env.registry
        .update_scope_policy(
            "acme",
            ScopePolicyUpdate {
                deny_patterns: Some(vec!["secret".into()]),
                allowed_doc_types: Some(DocType::ALL.to_vec()),
                ..ScopePolicyUpdate::default()
            },
        )
        .unwrap();

    let outcome = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "acme",
        CollectOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.summary.artifact_count, 1);
    assert_eq!(outcome.scope_policy_summary.reject_count, 1);
    assert!(outcome.risk.reasons.contains(&"scope_rejections:1".to_string()));

    // The reject shows up in the audit log but never in the artifact rows.
    let rejects = env
        .store
        .list_scope_audits("acme", Some(outcome.collection_id.as_str()), Some(ScopeDecision::Reject), 100)
        .unwrap();
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].reason, "deny_pattern:secret");
    let artifacts = env.store.list_artifacts(&outcome.collection_id).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].rel_path.ends_with("acme_ir_deck.txt"));
}

#[tokio::test]
async fn collection_window_excludes_old_files() {
    let folder = tempfile::tempdir().unwrap();
    std::fs::write(folder.path().join("fresh_invoice.txt"), "invoice").unwrap();
    std::fs::write(folder.path().join("stale_invoice.txt"), "invoice").unwrap();
    let two_weeks_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(14 * 86_400);
    let stale = std::fs::File::options()
        .write(true)
        .open(folder.path().join("stale_invoice.txt"))
        .unwrap();
    stale.set_modified(two_weeks_ago).unwrap();
    drop(stale);
    let gateway_url = spawn_gateway(folder.path()).await;

    let env = central();
    env.registry.register("acme", "Acme AI").unwrap();
    env.registry
        .bind_folder("acme", &gateway_url, "desktop_common", SECRET)
        .unwrap();

    let outcome = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "acme",
        CollectOptions { period: "7d".into(), ..CollectOptions::default() },
    )
    .await
    .unwrap();
    assert_eq!(outcome.summary.artifact_count, 1);
    let artifacts = env.store.list_artifacts(&outcome.collection_id).unwrap();
    assert!(artifacts[0].rel_path.ends_with("fresh_invoice.txt"));
}
