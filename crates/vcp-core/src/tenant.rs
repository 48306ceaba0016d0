// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tenant configuration and consent-scope policy records.

use crate::types::DocType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default folder alias a gateway exposes when none is configured.
pub const DEFAULT_FOLDER_ALIAS: &str = "desktop_common";

/// Default retention horizon in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 365;

fn default_folder_alias() -> String {
    DEFAULT_FOLDER_ALIAS.to_string()
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_active() -> bool {
    true
}

/// Persistent per-startup configuration owned by the tenant registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Tenant {
    /// Immutable tenant identifier (`[a-z0-9][a-z0-9_-]{1,63}`).
    pub startup_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Base URL of the startup-side gateway, empty until bound.
    #[serde(default)]
    pub gateway_url: String,
    /// Folder alias the gateway serves for this tenant.
    #[serde(default = "default_folder_alias")]
    pub folder_alias: String,
    /// Shared HMAC secret for gateway requests; empty disables signing.
    #[serde(default)]
    pub gateway_secret: String,
    /// Document types the tenant has consented to share.
    #[serde(default)]
    pub allowed_doc_types: Vec<DocType>,
    /// Path prefixes (rooted under the folder alias) that may be collected.
    #[serde(default)]
    pub scope_allow_prefixes: Vec<String>,
    /// Glob or substring patterns that must never be collected.
    #[serde(default)]
    pub scope_deny_patterns: Vec<String>,
    /// External reference to the signed consent document.
    #[serde(default)]
    pub consent_reference: String,
    /// Retention horizon in days, clamped to `[1, 3650]`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Outbound report recipients.
    #[serde(default)]
    pub email_recipients: Vec<String>,
    /// Inactive tenants are skipped by the collector.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Tenant {
    /// Fresh tenant with collection defaults: every doc type except
    /// `unknown` allowed, scope limited to the default alias root.
    pub fn new(startup_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            startup_id: startup_id.into(),
            display_name: display_name.into(),
            gateway_url: String::new(),
            folder_alias: default_folder_alias(),
            gateway_secret: String::new(),
            allowed_doc_types: DocType::ALL
                .into_iter()
                .filter(|d| *d != DocType::Unknown)
                .collect(),
            scope_allow_prefixes: vec![format!("{DEFAULT_FOLDER_ALIAS}/")],
            scope_deny_patterns: Vec::new(),
            consent_reference: String::new(),
            retention_days: DEFAULT_RETENTION_DAYS,
            email_recipients: Vec::new(),
            active: true,
        }
    }

    /// Folder alias with the configured fallback applied.
    pub fn folder_alias_or_default(&self) -> &str {
        let alias = self.folder_alias.trim();
        if alias.is_empty() { DEFAULT_FOLDER_ALIAS } else { alias }
    }

    /// Resolve the effective consent-scope policy for this tenant.
    pub fn scope_policy(&self) -> ScopePolicy {
        let folder_alias = self.folder_alias_or_default().to_string();
        ScopePolicy {
            allow_prefixes: normalize_allow_prefixes(&self.scope_allow_prefixes, &folder_alias),
            deny_patterns: dedupe_trimmed(&self.scope_deny_patterns),
            allowed_doc_types: self.allowed_doc_types.clone(),
            consent_reference: self.consent_reference.trim().to_string(),
            retention_days: self.retention_days.clamp(1, 3650),
            folder_alias,
        }
    }
}

/// Effective consent-scope policy applied to every manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScopePolicy {
    pub folder_alias: String,
    pub allow_prefixes: Vec<String>,
    pub deny_patterns: Vec<String>,
    pub allowed_doc_types: Vec<DocType>,
    pub consent_reference: String,
    pub retention_days: u32,
}

/// Normalize a wire path: forward slashes, no leading slash, trimmed.
pub fn normalize_rel_path(raw: &str) -> String {
    raw.trim().replace('\\', "/").trim_start_matches('/').to_string()
}

fn normalize_prefix(raw: &str) -> String {
    let mut value = normalize_rel_path(raw);
    if !value.is_empty() && !value.ends_with('/') {
        value.push('/');
    }
    value
}

/// Canonicalize allow prefixes: trailing `/`, rooted under the alias,
/// deduplicated. An empty result collapses to the alias root.
pub fn normalize_allow_prefixes(prefixes: &[String], folder_alias: &str) -> Vec<String> {
    let alias = {
        let trimmed = folder_alias.trim();
        if trimmed.is_empty() { DEFAULT_FOLDER_ALIAS } else { trimmed }
    };
    let alias_root = format!("{alias}/");

    let mut normalized: Vec<String> = Vec::new();
    for raw in prefixes {
        let mut value = normalize_prefix(raw);
        if value.is_empty() {
            continue;
        }
        if value != alias_root && !value.starts_with(&alias_root) {
            value = format!("{alias}/{value}");
        }
        if !normalized.contains(&value) {
            normalized.push(value);
        }
    }
    if normalized.is_empty() {
        normalized.push(alias_root);
    }
    normalized
}

fn dedupe_trimmed(values: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for raw in values {
        let value = raw.trim().to_string();
        if !value.is_empty() && !result.contains(&value) {
            result.push(value);
        }
    }
    result
}
