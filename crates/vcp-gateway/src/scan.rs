// SPDX-License-Identifier: MIT OR Apache-2.0
//! Filesystem safety checks and manifest scanning.
//!
//! Safety rules enforced on every path resolution:
//! 1. `rel_path` must be `<alias>/<rest>` with a configured alias;
//! 2. no segment may be `..`;
//! 3. the candidate must not be a symlink;
//! 4. the fully resolved path must stay under the alias root;
//! 5. the target must be a regular file.

use crate::config::GatewayConfig;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use vcp_core::{ArtifactMeta, ManifestRequest, normalize_rel_path, sha256_hex};
use walkdir::WalkDir;

/// Path resolution failure; variants map onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("invalid rel_path")]
    InvalidRelPath,
    #[error("rel_path must be <alias>/<relative_path>")]
    MissingAlias,
    #[error("unknown alias: {0}")]
    UnknownAlias(String),
    #[error("path traversal is not allowed")]
    Traversal,
    #[error("symlink access is not allowed")]
    Symlink,
    #[error("path escaped alias root")]
    Escaped,
    #[error("file not found: {0}")]
    NotFound(String),
}

/// Resolve `<alias>/<rest>` to a verified regular file under the alias root.
pub fn resolve_rel_path(config: &GatewayConfig, rel_path: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize_rel_path(rel_path);
    if normalized.is_empty() || rel_path.trim_start().starts_with('/') {
        return Err(PathError::InvalidRelPath);
    }
    let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Err(PathError::MissingAlias);
    }
    let alias = parts[0];
    let root = config
        .folders
        .get(alias)
        .ok_or_else(|| PathError::UnknownAlias(alias.to_string()))?;

    let rel_parts = &parts[1..];
    if rel_parts.iter().any(|part| *part == "..") {
        return Err(PathError::Traversal);
    }
    let mut candidate = root.clone();
    for part in rel_parts {
        candidate.push(part);
    }

    // lstat: reject the link itself before following anything.
    if candidate
        .symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
    {
        return Err(PathError::Symlink);
    }

    let target = candidate
        .canonicalize()
        .map_err(|_| PathError::NotFound(rel_path.to_string()))?;
    if !target.starts_with(root) {
        return Err(PathError::Escaped);
    }
    if !target.is_file() {
        return Err(PathError::NotFound(rel_path.to_string()));
    }
    Ok(target)
}

fn parse_window_bound(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            text.parse::<chrono::NaiveDateTime>()
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = path.metadata().ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Walk the requested folders and build a manifest.
///
/// Symlinks and paths escaping their root are skipped silently; the mtime
/// window and doc-type filters apply before hashing. Results are sorted
/// by descending mtime and truncated to the effective cap.
pub fn scan_manifest(config: &GatewayConfig, request: &ManifestRequest) -> Vec<ArtifactMeta> {
    let window_from = parse_window_bound(&request.window_from);
    let window_to = parse_window_bound(&request.window_to);
    let requested_alias = request.folder_alias.trim();
    let max_artifacts = request
        .max_artifacts
        .unwrap_or(config.max_artifacts)
        .clamp(1, config.max_artifacts);

    let aliases: Vec<&String> = if requested_alias.is_empty() {
        config.folders.keys().collect()
    } else {
        config
            .folders
            .keys()
            .filter(|alias| alias.as_str() == requested_alias)
            .collect()
    };

    let mut artifacts: Vec<ArtifactMeta> = Vec::new();
    for alias in aliases {
        let root = &config.folders[alias];
        for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
            if entry.file_type().is_symlink() || !entry.file_type().is_file() {
                continue;
            }
            let Ok(resolved) = entry.path().canonicalize() else {
                continue;
            };
            if !resolved.starts_with(root) {
                continue;
            }
            let Some(mtime) = file_mtime(&resolved) else {
                continue;
            };
            if window_from.is_some_and(|from| mtime < from) {
                continue;
            }
            if window_to.is_some_and(|to| mtime > to) {
                continue;
            }
            let (doc_type, confidence) =
                vcp_classifier::classify_document(&resolved, request.include_ocr, &[]);
            if !request.doc_types.is_empty() && !request.doc_types.contains(&doc_type) {
                continue;
            }
            let Ok(raw) = std::fs::read(&resolved) else {
                continue;
            };
            let digest = sha256_hex(&raw);
            let Ok(rel) = resolved.strip_prefix(root) else {
                continue;
            };
            let rel_path = format!("{alias}/{}", rel.to_string_lossy().replace('\\', "/"));
            artifacts.push(ArtifactMeta {
                artifact_id: ArtifactMeta::artifact_id_for(&digest),
                rel_path,
                size_bytes: raw.len() as u64,
                mtime: mtime.to_rfc3339(),
                sha256: digest,
                doc_type,
                confidence,
            });
        }
    }

    artifacts.sort_by(|a, b| b.mtime.cmp(&a.mtime));
    artifacts.truncate(max_artifacts);
    artifacts
}
