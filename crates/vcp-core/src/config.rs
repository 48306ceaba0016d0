// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workdir-derived paths and environment-backed configuration.

use std::path::{Path, PathBuf};

/// Well-known file locations under the central process workdir.
///
/// The registry, database, key file, and vault are process-wide singletons
/// keyed by the workdir; operations receive explicit handles built from
/// these paths rather than global state.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    workdir: PathBuf,
}

impl PlatformPaths {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into() }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Tenant registry JSON file.
    pub fn registry_path(&self) -> PathBuf {
        self.workdir.join("config").join("vc_tenants.json")
    }

    /// SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.workdir.join("data").join("vc_platform.db")
    }

    /// Per-tenant key file.
    pub fn key_path(&self) -> PathBuf {
        self.workdir.join("data").join("vc_keys.json")
    }

    /// Root of the encrypted bundle vault.
    pub fn vault_root(&self) -> PathBuf {
        self.workdir.join("vault")
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_trimmed(name) {
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Outbound SMTP settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    /// Upgrade the connection with STARTTLS before authenticating.
    pub tls: bool,
}

impl SmtpConfig {
    /// Read `VC_SMTP_*` variables; `None` when no host is configured,
    /// which callers treat as "dry-run only".
    pub fn from_env() -> Option<Self> {
        let host = env_trimmed("VC_SMTP_HOST")?;
        let port = env_trimmed("VC_SMTP_PORT")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(587);
        let user = env_trimmed("VC_SMTP_USER").unwrap_or_default();
        let from = env_trimmed("VC_SMTP_FROM")
            .or_else(|| if user.is_empty() { None } else { Some(user.clone()) })
            .unwrap_or_else(|| "openclaw-vc@localhost".to_string());
        Some(Self {
            host,
            port,
            user,
            password: std::env::var("VC_SMTP_PASSWORD").unwrap_or_default(),
            from,
            tls: env_bool("VC_SMTP_TLS", true),
        })
    }
}

/// Fallback OAuth client credentials when a caller supplies none.
#[derive(Debug, Clone, Default)]
pub struct OauthDefaults {
    pub client_id: String,
    pub client_secret: String,
}

impl OauthDefaults {
    pub fn from_env() -> Self {
        Self {
            client_id: env_trimmed("GOOGLE_OAUTH_CLIENT_ID").unwrap_or_default(),
            client_secret: env_trimmed("GOOGLE_OAUTH_CLIENT_SECRET").unwrap_or_default(),
        }
    }
}

/// Approver identity used when an operation does not name one.
pub fn default_approver() -> String {
    env_trimmed("VC_APPROVER_ID").unwrap_or_else(|| "vc_operator".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_workdir_relative() {
        let paths = PlatformPaths::new("/tmp/vc");
        assert_eq!(paths.registry_path(), Path::new("/tmp/vc/config/vc_tenants.json"));
        assert_eq!(paths.db_path(), Path::new("/tmp/vc/data/vc_platform.db"));
        assert_eq!(paths.key_path(), Path::new("/tmp/vc/data/vc_keys.json"));
        assert_eq!(paths.vault_root(), Path::new("/tmp/vc/vault"));
    }
}
