// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration-error paths of the collection cycle. The happy path runs
//! against a live gateway in the workspace-level end-to-end suite.

use vcp_collector::{CollectOptions, collect};
use vcp_core::PlatformPaths;
use vcp_crypto::KeyStore;
use vcp_error::ErrorCode;
use vcp_registry::TenantRegistry;
use vcp_store::PlatformStore;

struct Env {
    _dir: tempfile::TempDir,
    paths: PlatformPaths,
    registry: TenantRegistry,
    store: PlatformStore,
    keys: KeyStore,
}

fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let paths = PlatformPaths::new(dir.path());
    let registry = TenantRegistry::new(paths.registry_path());
    let store = PlatformStore::open(paths.db_path()).unwrap();
    let keys = KeyStore::new(paths.key_path());
    Env { _dir: dir, paths, registry, store, keys }
}

#[tokio::test]
async fn missing_tenant_is_rejected() {
    let env = env();
    let err = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "ghost",
        CollectOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigTenantMissing);
}

#[tokio::test]
async fn inactive_tenant_is_rejected() {
    let env = env();
    env.registry.register("acme", "Acme").unwrap();
    // Deactivate by rewriting the registry document.
    let raw = std::fs::read_to_string(env.registry.config_path()).unwrap();
    std::fs::write(env.registry.config_path(), raw.replace("true", "false")).unwrap();

    let err = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "acme",
        CollectOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigTenantInactive);
}

#[tokio::test]
async fn unbound_tenant_is_rejected() {
    let env = env();
    env.registry.register("acme", "Acme").unwrap();
    let err = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "acme",
        CollectOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigGatewayMissing);
}

#[tokio::test]
async fn invalid_startup_id_is_rejected() {
    let env = env();
    let err = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "Bad Id!",
        CollectOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolMalformedRequest);
}

#[test]
fn tampered_vault_envelope_fails_verification() {
    use vcp_collector::{save_bundle, verify_collection_integrity};
    use vcp_core::{ArtifactMeta, ArtifactPayload, CollectionStatus, DocType};
    use vcp_store::CollectionCycleRecord;

    let env = env();
    let meta = ArtifactMeta {
        artifact_id: "sha256:aa".into(),
        rel_path: "desktop_common/deck.txt".into(),
        size_bytes: 4,
        mtime: "2026-02-01T00:00:00+00:00".into(),
        sha256: "aa".into(),
        doc_type: DocType::IrDeck,
        confidence: 0.9,
    };
    let payload = ArtifactPayload {
        rel_path: "desktop_common/deck.txt".into(),
        sha256: "aa".into(),
        content_b64: "ZGVjaw==".into(),
    };
    let saved = save_bundle(
        &env.paths,
        &env.keys,
        "acme",
        "c-1",
        "2026-01-01T00:00:00+00:00",
        "2026-02-01T00:00:00+00:00",
        std::slice::from_ref(&meta),
        std::slice::from_ref(&payload),
    )
    .unwrap();
    env.store
        .record_collection_cycle(&CollectionCycleRecord {
            collection_id: "c-1".into(),
            startup_id: "acme".into(),
            window_from: "2026-01-01T00:00:00+00:00".into(),
            window_to: "2026-02-01T00:00:00+00:00".into(),
            status: CollectionStatus::Collected,
            encrypted_path: saved.encrypted_path.clone(),
            summary: saved.summary.clone(),
            artifacts: vec![meta.clone()],
            scope_audits: vec![],
            normalized: vec![],
        })
        .unwrap();

    // Untouched bundle verifies end to end.
    let clean = verify_collection_integrity(
        &env.paths,
        &env.store,
        &env.keys,
        "acme",
        "c-1",
        &saved.encrypted_path,
        &saved.metadata_path,
        std::slice::from_ref(&meta),
    );
    assert!(clean.success, "{clean:?}");

    // Corrupt the envelope on disk: decryption must fail the report.
    let bin_abs = env.paths.workdir().join(&saved.encrypted_path);
    std::fs::write(&bin_abs, b"{\"alg\":\"AES-256-GCM\",\"key_version\":1,\"nonce_b64\":\"AAAAAAAAAAAAAAAA\",\"ciphertext_b64\":\"AAAA\",\"created_at\":\"\"}").unwrap();
    let tampered = verify_collection_integrity(
        &env.paths,
        &env.store,
        &env.keys,
        "acme",
        "c-1",
        &saved.encrypted_path,
        &saved.metadata_path,
        std::slice::from_ref(&meta),
    );
    assert!(!tampered.success);
    assert!(tampered.error.unwrap().contains("decrypt"));
}

#[tokio::test]
async fn unreachable_gateway_is_external_failure() {
    let env = env();
    env.registry
        .bind_folder("acme", "http://127.0.0.1:1", "desktop_common", "s")
        .unwrap();
    let err = collect(
        &env.registry,
        &env.store,
        &env.keys,
        &env.paths,
        "acme",
        CollectOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExternalGatewayFailure);
    // Nothing was committed.
    assert!(env.store.list_collections("acme", None, None, 10).unwrap().is_empty());
}
