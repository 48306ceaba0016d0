// SPDX-License-Identifier: MIT OR Apache-2.0
//! Encrypted bundle vault.
//!
//! Layout: `vault/<startup_id>/<YYYY>/<MM>/<DD>/<collection_id>.bin` for
//! the envelope and `<collection_id>.json` for plaintext metadata. The
//! metadata file records only the envelope's algorithm, key version, and
//! creation time; ciphertext and nonce live exclusively in the `.bin`.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use vcp_core::{ArtifactMeta, ArtifactPayload, BundlePayload, CollectionSummary, PlatformPaths};
use vcp_crypto::KeyStore;
use vcp_error::{ErrorCode, VcError};

/// Non-secret envelope attributes recorded next to the ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub alg: String,
    pub key_version: u32,
    pub created_at: String,
}

/// Plaintext companion document written beside the `.bin` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetaDoc {
    pub collection_id: String,
    pub startup_id: String,
    pub window_from: String,
    pub window_to: String,
    pub summary: CollectionSummary,
    pub envelope_meta: EnvelopeMeta,
    pub artifacts: Vec<ArtifactMeta>,
}

/// Workdir-relative locations of a saved bundle.
#[derive(Debug, Clone)]
pub struct SavedBundle {
    pub encrypted_path: String,
    pub metadata_path: String,
    pub summary: CollectionSummary,
}

fn io_error(context: &str, err: std::io::Error) -> VcError {
    VcError::new(ErrorCode::Internal, format!("vault io: {context}")).with_source(err)
}

/// Serialize, encrypt (AAD = collection_id), and write one bundle.
pub fn save_bundle(
    paths: &PlatformPaths,
    keys: &KeyStore,
    startup_id: &str,
    collection_id: &str,
    window_from: &str,
    window_to: &str,
    artifacts: &[ArtifactMeta],
    payload_artifacts: &[ArtifactPayload],
) -> Result<SavedBundle, VcError> {
    let now = Utc::now();
    let target_dir = paths
        .vault_root()
        .join(startup_id)
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&target_dir).map_err(|err| io_error("create vault dir", err))?;

    let bundle = BundlePayload {
        collection_id: collection_id.to_string(),
        startup_id: startup_id.to_string(),
        window_from: window_from.to_string(),
        window_to: window_to.to_string(),
        created_at: now.to_rfc3339(),
        artifacts: payload_artifacts.to_vec(),
    };
    let plaintext = serde_json::to_vec(&bundle)
        .map_err(|err| VcError::new(ErrorCode::Internal, "bundle serialization").with_source(err))?;
    let envelope = keys
        .encrypt(startup_id, &plaintext, collection_id.as_bytes())
        .map_err(|err| {
            VcError::new(ErrorCode::CryptoFailure, "bundle encryption failed").with_source(err)
        })?;

    let bin_path = target_dir.join(format!("{collection_id}.bin"));
    let meta_path = target_dir.join(format!("{collection_id}.json"));
    let envelope_bytes = serde_json::to_vec(&envelope)
        .map_err(|err| VcError::new(ErrorCode::Internal, "envelope serialization").with_source(err))?;
    std::fs::write(&bin_path, envelope_bytes).map_err(|err| io_error("write envelope", err))?;

    let summary = CollectionSummary::from_artifacts(artifacts);
    let meta_doc = BundleMetaDoc {
        collection_id: collection_id.to_string(),
        startup_id: startup_id.to_string(),
        window_from: window_from.to_string(),
        window_to: window_to.to_string(),
        summary: summary.clone(),
        envelope_meta: EnvelopeMeta {
            alg: envelope.alg.clone(),
            key_version: envelope.key_version,
            created_at: envelope.created_at.clone(),
        },
        artifacts: artifacts.to_vec(),
    };
    let rendered = serde_json::to_vec_pretty(&meta_doc)
        .map_err(|err| VcError::new(ErrorCode::Internal, "metadata serialization").with_source(err))?;
    std::fs::write(&meta_path, rendered).map_err(|err| io_error("write metadata", err))?;

    let rel = |path: &std::path::Path| {
        path.strip_prefix(paths.workdir())
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    };
    Ok(SavedBundle {
        encrypted_path: rel(&bin_path),
        metadata_path: rel(&meta_path),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_core::DocType;

    #[test]
    fn bundle_files_land_under_dated_vault_path() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PlatformPaths::new(dir.path());
        let keys = KeyStore::new(paths.key_path());

        let meta = ArtifactMeta {
            artifact_id: "sha256:aa".into(),
            rel_path: "desktop_common/deck.txt".into(),
            size_bytes: 4,
            mtime: "2026-02-01T00:00:00+00:00".into(),
            sha256: "aa".into(),
            doc_type: DocType::IrDeck,
            confidence: 0.8,
        };
        let payload = ArtifactPayload {
            rel_path: "desktop_common/deck.txt".into(),
            sha256: "aa".into(),
            content_b64: "ZGVjaw==".into(),
        };

        let saved = save_bundle(
            &paths,
            &keys,
            "acme",
            "c-1",
            "2026-01-01T00:00:00+00:00",
            "2026-02-01T00:00:00+00:00",
            std::slice::from_ref(&meta),
            std::slice::from_ref(&payload),
        )
        .unwrap();

        assert!(saved.encrypted_path.starts_with("vault/acme/"));
        assert!(saved.encrypted_path.ends_with("c-1.bin"));
        assert!(saved.metadata_path.ends_with("c-1.json"));
        assert_eq!(saved.summary.artifact_count, 1);

        let bin_abs = dir.path().join(&saved.encrypted_path);
        let meta_abs = dir.path().join(&saved.metadata_path);
        assert!(bin_abs.is_file());
        assert!(meta_abs.is_file());

        // The envelope decrypts back to the original bundle payload.
        let envelope: vcp_crypto::Envelope =
            serde_json::from_slice(&std::fs::read(&bin_abs).unwrap()).unwrap();
        let plain = keys.decrypt("acme", &envelope, b"c-1").unwrap();
        let bundle: BundlePayload = serde_json::from_slice(&plain).unwrap();
        assert_eq!(bundle.artifacts.len(), 1);
        assert_eq!(bundle.artifacts[0].rel_path, "desktop_common/deck.txt");

        // The metadata doc records envelope attributes but no ciphertext.
        let meta_doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&meta_abs).unwrap()).unwrap();
        assert_eq!(meta_doc["envelope_meta"]["alg"], "AES-256-GCM");
        assert_eq!(meta_doc["envelope_meta"]["key_version"], 1);
        assert!(meta_doc["envelope_meta"].get("ciphertext_b64").is_none());
        assert!(meta_doc["envelope_meta"].get("nonce_b64").is_none());
    }
}
