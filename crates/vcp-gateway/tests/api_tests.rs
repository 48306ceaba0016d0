// SPDX-License-Identifier: MIT OR Apache-2.0
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;
use vcp_core::{ArtifactContentResponse, ManifestResponse, signed_headers};
use vcp_gateway::{GatewayConfig, GatewayState, build_app};

const SECRET: &str = "shared-secret";

fn test_app(root: &Path) -> axum::Router {
    let mut folders = BTreeMap::new();
    folders.insert("desktop_common".to_string(), root.to_path_buf());
    let config = GatewayConfig::new("acme", folders, SECRET, 500).unwrap();
    build_app(Arc::new(GatewayState::new(config)))
}

fn signed_post(path: &str, body: serde_json::Value) -> Request<Body> {
    let raw = serde_json::to_vec(&body).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (name, value) in signed_headers(SECRET, &raw, chrono::Utc::now().timestamp()) {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(raw)).unwrap()
}

fn unsigned_post(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open_and_lists_folders() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["startup_id"], "acme");
    assert_eq!(json["folders"][0], "desktop_common");
}

#[tokio::test]
async fn post_without_signature_is_401() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(unsigned_post(
            "/manifest",
            r#"{"startup_id":"acme","request_id":"r-1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(resp).await;
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn stale_timestamp_is_401() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let body = br#"{"startup_id":"acme","request_id":"r-1"}"#.to_vec();
    let stale = chrono::Utc::now().timestamp() - 3600;
    let mut builder = Request::builder().method("POST").uri("/manifest");
    for (name, value) in signed_headers(SECRET, &body, stale) {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let resp = app.oneshot(builder.body(Body::from(body)).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn startup_id_mismatch_is_403() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(signed_post(
            "/manifest",
            serde_json::json!({"startup_id": "globex", "request_id": "r-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let raw = b"{not json".to_vec();
    let mut builder = Request::builder().method("POST").uri("/manifest");
    for (name, value) in signed_headers(SECRET, &raw, chrono::Utc::now().timestamp()) {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let resp = app.oneshot(builder.body(Body::from(raw)).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manifest_lists_folder_contents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("acme_ir_deck.txt"), b"deck").unwrap();
    std::fs::write(dir.path().join("acme_tax_invoice_202602.txt"), b"invoice").unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(signed_post(
            "/manifest",
            serde_json::json!({
                "startup_id": "acme",
                "request_id": "r-1",
                "include_ocr": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let manifest: ManifestResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(manifest.ok);
    assert_eq!(manifest.request_id, "r-1");
    assert_eq!(manifest.artifacts.len(), 2);
}

#[tokio::test]
async fn artifact_content_returns_bytes_and_hash() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("invoice_2026.txt"), b"hello invoice").unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(signed_post(
            "/artifact-content",
            serde_json::json!({
                "startup_id": "acme",
                "rel_path": "desktop_common/invoice_2026.txt",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let content: ArtifactContentResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(content.ok);
    assert_eq!(content.artifact.size_bytes, 13);
    assert_eq!(content.artifact.sha256, vcp_core::sha256_hex(b"hello invoice"));
    use base64::Engine as _;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&content.artifact.content_b64)
        .unwrap();
    assert_eq!(decoded, b"hello invoice");
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(signed_post(
            "/artifact-content",
            serde_json::json!({
                "startup_id": "acme",
                "rel_path": "desktop_common/../etc/passwd",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["ok"], false);
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_access_is_403() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("invoice_2026.txt"), b"real").unwrap();
    std::os::unix::fs::symlink(
        dir.path().join("invoice_2026.txt"),
        dir.path().join("link_invoice.txt"),
    )
    .unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(signed_post(
            "/artifact-content",
            serde_json::json!({
                "startup_id": "acme",
                "rel_path": "desktop_common/link_invoice.txt",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json = body_json(resp).await;
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn missing_file_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let resp = app
        .oneshot(signed_post(
            "/artifact-content",
            serde_json::json!({
                "startup_id": "acme",
                "rel_path": "desktop_common/missing.txt",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
