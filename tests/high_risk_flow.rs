// SPDX-License-Identifier: MIT OR Apache-2.0
//! High-risk dual sign-off, end to end: an empty collection with a
//! free-mail recipient scores high, and promotion needs two distinct
//! approvers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use vcp_approval::{ApproveOptions, approve};
use vcp_collector::{CollectOptions, collect};
use vcp_core::{ApprovalStatus, PlatformPaths, RiskLevel};
use vcp_crypto::KeyStore;
use vcp_error::ErrorCode;
use vcp_gateway::{GatewayConfig, GatewayState, build_app};
use vcp_registry::TenantRegistry;
use vcp_store::PlatformStore;

const SECRET: &str = "local-secret";

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
async fn empty_collection_requires_two_distinct_approvers() {
    let folder = tempfile::tempdir().unwrap();
    let gateway_url = spawn_gateway(folder.path()).await;

    let dir = tempfile::tempdir().unwrap();
    let paths = PlatformPaths::new(dir.path());
    let registry = TenantRegistry::new(paths.registry_path());
    let store = PlatformStore::open(paths.db_path()).unwrap();
    let keys = KeyStore::new(paths.key_path());

    registry.register("acme", "Acme AI").unwrap();
    registry.bind_folder("acme", &gateway_url, "desktop_common", SECRET).unwrap();
    registry
        .set_email_recipients("acme", &["founder@gmail.com".to_string()])
        .unwrap();

    let outcome = collect(&registry, &store, &keys, &paths, "acme", CollectOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.summary.artifact_count, 0);
    assert_eq!(outcome.risk.level, RiskLevel::High);
    assert!(outcome.risk.reasons.contains(&"no_artifacts_collected".to_string()));

    // Without the explicit high-risk acknowledgement the gate refuses.
    let err = approve(
        &store,
        &registry,
        None,
        &paths,
        &outcome.approval_id,
        ApproveOptions { approver: "alice".into(), ..ApproveOptions::default() },
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::StateInvalidTransition);

    // First forced sign-off: still pending, waiting for a second approver.
    let first = approve(
        &store,
        &registry,
        None,
        &paths,
        &outcome.approval_id,
        ApproveOptions {
            approver: "alice".into(),
            force_high_risk: true,
            ..ApproveOptions::default()
        },
    )
    .unwrap();
    assert!(first.requires_second_approval);
    assert_eq!(first.signoff_count, 1);
    assert_eq!(first.approval.status, ApprovalStatus::Pending);

    // Second distinct approver promotes and (dry-run) dispatches.
    let second = approve(
        &store,
        &registry,
        None,
        &paths,
        &outcome.approval_id,
        ApproveOptions {
            approver: "bob".into(),
            force_high_risk: true,
            dry_run_dispatch: Some(true),
            ..ApproveOptions::default()
        },
    )
    .unwrap();
    assert!(!second.requires_second_approval);
    assert_eq!(second.approval.status, ApprovalStatus::Approved);
    assert_eq!(second.approval.approver, "alice,bob");
    assert_eq!(store.list_approval_signoffs(&outcome.approval_id).unwrap().len(), 2);

    // A repeat sign-off never double-counts.
    let third = approve(
        &store,
        &registry,
        None,
        &paths,
        &outcome.approval_id,
        ApproveOptions {
            approver: "alice".into(),
            force_high_risk: true,
            dry_run_dispatch: Some(true),
            ..ApproveOptions::default()
        },
    )
    .unwrap();
    assert_eq!(third.approval.status, ApprovalStatus::Approved);
    assert_eq!(store.list_approval_signoffs(&outcome.approval_id).unwrap().len(), 2);
}
