// SPDX-License-Identifier: MIT OR Apache-2.0
//! Post-collect integrity verification.
//!
//! Re-reads the envelope from disk, decrypts it with the tenant key, and
//! cross-checks artifact counts and the SHA-256 set against both the
//! metadata file and the database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vcp_core::{ArtifactMeta, BundlePayload, PlatformPaths};
use vcp_crypto::{Envelope, KeyStore};
use vcp_store::PlatformStore;

/// One named check with optional expected/actual counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<usize>,
}

impl VerificationCheck {
    fn flag(name: &str, ok: bool) -> Self {
        Self { name: name.into(), ok, expected: None, actual: None }
    }

    fn counted(name: &str, expected: usize, actual: usize) -> Self {
        Self {
            name: name.into(),
            ok: expected == actual,
            expected: Some(expected),
            actual: Some(actual),
        }
    }
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub success: bool,
    pub checks: Vec<VerificationCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationReport {
    /// Report for cycles that skipped verification.
    pub fn skipped() -> Self {
        Self { success: true, checks: Vec::new(), error: None }
    }

    fn failed(checks: Vec<VerificationCheck>, error: String) -> Self {
        Self { success: false, checks, error: Some(error) }
    }
}

fn sha_set(artifacts: &[ArtifactMeta]) -> BTreeSet<String> {
    artifacts
        .iter()
        .map(|meta| meta.sha256.clone())
        .filter(|sha| !sha.is_empty())
        .collect()
}

/// Verify one persisted collection end to end.
pub fn verify_collection_integrity(
    paths: &PlatformPaths,
    store: &PlatformStore,
    keys: &KeyStore,
    startup_id: &str,
    collection_id: &str,
    encrypted_path: &str,
    metadata_path: &str,
    expected_artifacts: &[ArtifactMeta],
) -> VerificationReport {
    let mut checks: Vec<VerificationCheck> = Vec::new();

    let workdir = match paths.workdir().canonicalize() {
        Ok(dir) => dir,
        Err(err) => return VerificationReport::failed(checks, format!("workdir unreadable: {err}")),
    };
    let enc_file = workdir.join(encrypted_path);
    let meta_file = workdir.join(metadata_path);
    for file in [&enc_file, &meta_file] {
        if let Ok(resolved) = file.canonicalize() {
            if !resolved.starts_with(&workdir) {
                return VerificationReport::failed(checks, "verification path escaped workdir".into());
            }
        }
    }

    checks.push(VerificationCheck::flag("encrypted_file_exists", enc_file.is_file()));
    checks.push(VerificationCheck::flag("metadata_file_exists", meta_file.is_file()));
    if !enc_file.is_file() || !meta_file.is_file() {
        return VerificationReport::failed(checks, "missing encrypted/metadata file".into());
    }

    let meta_doc: serde_json::Value = match std::fs::read(&meta_file)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_slice(&raw).map_err(|err| err.to_string()))
    {
        Ok(doc) => doc,
        Err(err) => return VerificationReport::failed(checks, format!("metadata unreadable: {err}")),
    };
    let meta_count = meta_doc["summary"]["artifact_count"].as_u64().unwrap_or(0) as usize;
    checks.push(VerificationCheck::counted(
        "metadata_artifact_count_matches",
        expected_artifacts.len(),
        meta_count,
    ));

    let envelope: Envelope = match std::fs::read(&enc_file)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_slice(&raw).map_err(|err| err.to_string()))
    {
        Ok(envelope) => envelope,
        Err(err) => return VerificationReport::failed(checks, format!("envelope unreadable: {err}")),
    };
    let plaintext = match keys.decrypt(startup_id, &envelope, collection_id.as_bytes()) {
        Ok(plaintext) => plaintext,
        Err(err) => return VerificationReport::failed(checks, format!("bundle decrypt failed: {err}")),
    };
    let bundle: BundlePayload = match serde_json::from_slice(&plaintext) {
        Ok(bundle) => bundle,
        Err(err) => {
            return VerificationReport::failed(checks, format!("bundle payload invalid: {err}"));
        }
    };
    checks.push(VerificationCheck::counted(
        "decrypted_bundle_artifact_count_matches",
        expected_artifacts.len(),
        bundle.artifacts.len(),
    ));

    let expected_sha = sha_set(expected_artifacts);
    let bundle_sha: BTreeSet<String> = bundle
        .artifacts
        .iter()
        .map(|artifact| artifact.sha256.clone())
        .filter(|sha| !sha.is_empty())
        .collect();
    checks.push(VerificationCheck {
        name: "decrypted_bundle_sha_set_matches".into(),
        ok: bundle_sha == expected_sha,
        expected: Some(expected_sha.len()),
        actual: Some(bundle_sha.len()),
    });

    let db_count = match store.list_artifacts(collection_id) {
        Ok(rows) => rows.len(),
        Err(err) => return VerificationReport::failed(checks, format!("db read failed: {err}")),
    };
    checks.push(VerificationCheck::counted(
        "db_artifact_count_matches",
        expected_artifacts.len(),
        db_count,
    ));

    let success = checks.iter().all(|check| check.ok);
    VerificationReport { success, checks, error: None }
}
