// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway configuration loading and validation.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Hard ceiling on manifest size a gateway will ever advertise.
pub const SERVER_MAX_ARTIFACTS: usize = 5000;

/// Default manifest cap when the config does not set one.
pub const DEFAULT_MAX_ARTIFACTS: usize = 500;

/// Configuration failure while loading the gateway config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("gateway config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("gateway config parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gateway config requires startup_id")]
    MissingStartupId,
    #[error("gateway config requires a non-empty folders mapping")]
    MissingFolders,
    #[error("folder does not exist: {alias} -> {path}")]
    FolderMissing { alias: String, path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    startup_id: String,
    #[serde(default)]
    folders: BTreeMap<String, String>,
    #[serde(default)]
    shared_secret: String,
    #[serde(default)]
    max_artifacts: Option<usize>,
}

/// Validated gateway configuration.
///
/// Folder roots are canonicalized at load time so later prefix checks
/// compare against resolved paths.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub startup_id: String,
    pub folders: BTreeMap<String, PathBuf>,
    /// Empty disables request signing.
    pub shared_secret: String,
    pub max_artifacts: usize,
}

impl GatewayConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_slice(&std::fs::read(path)?)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let startup_id = raw.startup_id.trim().to_lowercase();
        if startup_id.is_empty() {
            return Err(ConfigError::MissingStartupId);
        }

        let mut folders = BTreeMap::new();
        for (alias, root) in raw.folders {
            let alias = alias.trim().to_string();
            let root = root.trim();
            if alias.is_empty() || root.is_empty() {
                continue;
            }
            let resolved = PathBuf::from(root)
                .canonicalize()
                .map_err(|_| ConfigError::FolderMissing {
                    alias: alias.clone(),
                    path: PathBuf::from(root),
                })?;
            if !resolved.is_dir() {
                return Err(ConfigError::FolderMissing { alias, path: resolved });
            }
            folders.insert(alias, resolved);
        }
        if folders.is_empty() {
            return Err(ConfigError::MissingFolders);
        }

        Ok(Self {
            startup_id,
            folders,
            shared_secret: raw.shared_secret.trim().to_string(),
            max_artifacts: raw
                .max_artifacts
                .unwrap_or(DEFAULT_MAX_ARTIFACTS)
                .clamp(1, SERVER_MAX_ARTIFACTS),
        })
    }

    /// Build a config directly, canonicalizing the folder roots.
    ///
    /// Used by the binary for `--folder alias=path` overrides and by tests.
    pub fn new(
        startup_id: &str,
        folders: BTreeMap<String, PathBuf>,
        shared_secret: &str,
        max_artifacts: usize,
    ) -> Result<Self, ConfigError> {
        let raw = RawConfig {
            startup_id: startup_id.to_string(),
            folders: folders
                .into_iter()
                .map(|(alias, path)| (alias, path.to_string_lossy().into_owned()))
                .collect(),
            shared_secret: shared_secret.to_string(),
            max_artifacts: Some(max_artifacts),
        };
        Self::from_raw(raw)
    }
}
