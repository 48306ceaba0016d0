// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-registry
//!
//! Persistent tenant configuration backed by `config/vc_tenants.json`.
//! The central process is the only writer; every operation is a full
//! read-modify-write of the registry document.
#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vcp_core::{
    DocType, InvalidStartupId, ScopePolicy, Tenant, normalize_allow_prefixes, validate_startup_id,
};

/// Registry operation failure.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidStartupId(#[from] InvalidStartupId),
    #[error("startup_id not found: {0}")]
    NotFound(String),
    #[error("registry io: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry parse: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDoc {
    #[serde(default)]
    tenants: Vec<Tenant>,
}

/// Requested scope-policy changes; `None` fields keep the current value.
#[derive(Debug, Clone, Default)]
pub struct ScopePolicyUpdate {
    pub allow_prefixes: Option<Vec<String>>,
    pub deny_patterns: Option<Vec<String>>,
    pub allowed_doc_types: Option<Vec<DocType>>,
    pub consent_reference: Option<String>,
    pub retention_days: Option<u32>,
}

/// Tenant registry handle.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    config_path: PathBuf,
}

impl TenantRegistry {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn load_doc(&self) -> RegistryDoc {
        let Ok(raw) = std::fs::read(&self.config_path) else {
            return RegistryDoc::default();
        };
        serde_json::from_slice(&raw).unwrap_or_default()
    }

    fn save_doc(&self, doc: &RegistryDoc) -> Result<(), RegistryError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_vec_pretty(doc)?;
        std::fs::write(&self.config_path, rendered)?;
        Ok(())
    }

    /// All tenants, optionally filtered to active ones.
    pub fn list_tenants(&self, active_only: bool) -> Vec<Tenant> {
        self.load_doc()
            .tenants
            .into_iter()
            .filter(|t| !active_only || t.active)
            .collect()
    }

    /// Look up a tenant by identifier.
    pub fn get(&self, startup_id: &str) -> Result<Option<Tenant>, RegistryError> {
        let target = validate_startup_id(startup_id)?;
        Ok(self
            .load_doc()
            .tenants
            .into_iter()
            .find(|t| t.startup_id == target))
    }

    /// Register a tenant, or reactivate and rename an existing one.
    pub fn register(&self, startup_id: &str, display_name: &str) -> Result<Tenant, RegistryError> {
        let sid = validate_startup_id(startup_id)?;
        let mut doc = self.load_doc();

        if let Some(existing) = doc.tenants.iter_mut().find(|t| t.startup_id == sid) {
            let name = display_name.trim();
            if !name.is_empty() {
                existing.display_name = name.to_string();
            }
            existing.active = true;
            let updated = existing.clone();
            self.save_doc(&doc)?;
            return Ok(updated);
        }

        let name = display_name.trim();
        let created = Tenant::new(&sid, if name.is_empty() { sid.as_str() } else { name });
        doc.tenants.push(created.clone());
        self.save_doc(&doc)?;
        Ok(created)
    }

    /// Bind the tenant to a gateway endpoint and folder alias.
    ///
    /// Registers the tenant first when it does not exist yet. A blank
    /// secret keeps any previously configured one.
    pub fn bind_folder(
        &self,
        startup_id: &str,
        gateway_url: &str,
        folder_alias: &str,
        gateway_secret: &str,
    ) -> Result<Tenant, RegistryError> {
        let sid = validate_startup_id(startup_id)?;
        if self.get(&sid)?.is_none() {
            self.register(&sid, &sid)?;
        }

        let mut doc = self.load_doc();
        let tenant = doc
            .tenants
            .iter_mut()
            .find(|t| t.startup_id == sid)
            .ok_or_else(|| RegistryError::NotFound(sid.clone()))?;

        tenant.gateway_url = gateway_url.trim().to_string();
        let alias = folder_alias.trim();
        tenant.folder_alias = if alias.is_empty() {
            vcp_core::DEFAULT_FOLDER_ALIAS.to_string()
        } else {
            alias.to_string()
        };
        let secret = gateway_secret.trim();
        if !secret.is_empty() {
            tenant.gateway_secret = secret.to_string();
        }
        if tenant.scope_allow_prefixes.is_empty() {
            tenant.scope_allow_prefixes = vec![format!("{}/", tenant.folder_alias)];
        }
        tenant.active = true;

        let updated = tenant.clone();
        self.save_doc(&doc)?;
        Ok(updated)
    }

    /// Replace the outbound recipient list.
    pub fn set_email_recipients(
        &self,
        startup_id: &str,
        recipients: &[String],
    ) -> Result<Tenant, RegistryError> {
        let sid = validate_startup_id(startup_id)?;
        let mut doc = self.load_doc();
        let tenant = doc
            .tenants
            .iter_mut()
            .find(|t| t.startup_id == sid)
            .ok_or_else(|| RegistryError::NotFound(sid.clone()))?;
        tenant.email_recipients = recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        let updated = tenant.clone();
        self.save_doc(&doc)?;
        Ok(updated)
    }

    /// Apply a partial scope-policy update with normalization.
    pub fn update_scope_policy(
        &self,
        startup_id: &str,
        update: ScopePolicyUpdate,
    ) -> Result<Tenant, RegistryError> {
        let sid = validate_startup_id(startup_id)?;
        let mut doc = self.load_doc();
        let tenant = doc
            .tenants
            .iter_mut()
            .find(|t| t.startup_id == sid)
            .ok_or_else(|| RegistryError::NotFound(sid.clone()))?;

        let alias = tenant.folder_alias_or_default().to_string();
        if let Some(prefixes) = update.allow_prefixes {
            tenant.scope_allow_prefixes = normalize_allow_prefixes(&prefixes, &alias);
        } else if tenant.scope_allow_prefixes.is_empty() {
            tenant.scope_allow_prefixes = vec![format!("{alias}/")];
        }
        if let Some(patterns) = update.deny_patterns {
            tenant.scope_deny_patterns = patterns
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(doc_types) = update.allowed_doc_types {
            if !doc_types.is_empty() {
                tenant.allowed_doc_types = doc_types;
            }
        }
        if let Some(reference) = update.consent_reference {
            tenant.consent_reference = reference.trim().to_string();
        }
        if let Some(days) = update.retention_days {
            tenant.retention_days = days.clamp(1, 3650);
        }

        let updated = tenant.clone();
        self.save_doc(&doc)?;
        Ok(updated)
    }

    /// Resolved scope policy for a tenant.
    pub fn get_scope_policy(&self, startup_id: &str) -> Result<ScopePolicy, RegistryError> {
        let tenant = self
            .get(startup_id)?
            .ok_or_else(|| RegistryError::NotFound(startup_id.trim().to_lowercase()))?;
        Ok(tenant.scope_policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, TenantRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = TenantRegistry::new(dir.path().join("config").join("vc_tenants.json"));
        (dir, registry)
    }

    #[test]
    fn register_creates_tenant_with_defaults() {
        let (_dir, registry) = registry();
        let tenant = registry.register("Acme", "Acme Inc").unwrap();
        assert_eq!(tenant.startup_id, "acme");
        assert_eq!(tenant.display_name, "Acme Inc");
        assert_eq!(tenant.scope_allow_prefixes, vec!["desktop_common/"]);
        assert_eq!(tenant.retention_days, 365);
        assert!(tenant.active);
    }

    #[test]
    fn register_is_idempotent_and_reactivates() {
        let (_dir, registry) = registry();
        registry.register("acme", "Acme").unwrap();
        let again = registry.register("acme", "Acme Renamed").unwrap();
        assert_eq!(again.display_name, "Acme Renamed");
        assert_eq!(registry.list_tenants(false).len(), 1);
    }

    #[test]
    fn invalid_startup_id_is_rejected() {
        let (_dir, registry) = registry();
        assert!(matches!(
            registry.register("Bad Id!", "x"),
            Err(RegistryError::InvalidStartupId(_))
        ));
    }

    #[test]
    fn bind_folder_registers_on_demand() {
        let (_dir, registry) = registry();
        let tenant = registry
            .bind_folder("acme", "http://127.0.0.1:8742", "desktop_common", "s3cret")
            .unwrap();
        assert_eq!(tenant.gateway_url, "http://127.0.0.1:8742");
        assert_eq!(tenant.folder_alias, "desktop_common");
        assert_eq!(tenant.gateway_secret, "s3cret");
    }

    #[test]
    fn bind_folder_keeps_existing_secret_when_blank() {
        let (_dir, registry) = registry();
        registry.bind_folder("acme", "http://a", "desktop_common", "first").unwrap();
        let rebound = registry.bind_folder("acme", "http://b", "desktop_common", "").unwrap();
        assert_eq!(rebound.gateway_url, "http://b");
        assert_eq!(rebound.gateway_secret, "first");
    }

    #[test]
    fn recipients_are_trimmed_and_filtered() {
        let (_dir, registry) = registry();
        registry.register("acme", "Acme").unwrap();
        let tenant = registry
            .set_email_recipients(
                "acme",
                &[" ops@fund.example ".into(), "".into(), "cfo@fund.example".into()],
            )
            .unwrap();
        assert_eq!(tenant.email_recipients, vec!["ops@fund.example", "cfo@fund.example"]);
    }

    #[test]
    fn scope_policy_update_normalizes_prefixes() {
        let (_dir, registry) = registry();
        registry.register("acme", "Acme").unwrap();
        let tenant = registry
            .update_scope_policy(
                "acme",
                ScopePolicyUpdate {
                    allow_prefixes: Some(vec!["invoices".into(), "/decks/".into()]),
                    deny_patterns: Some(vec!["*.tmp".into(), " secret ".into()]),
                    retention_days: Some(9000),
                    ..ScopePolicyUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(
            tenant.scope_allow_prefixes,
            vec!["desktop_common/invoices/", "desktop_common/decks/"]
        );
        assert_eq!(tenant.scope_deny_patterns, vec!["*.tmp", "secret"]);
        assert_eq!(tenant.retention_days, 3650);
    }

    #[test]
    fn empty_doc_type_update_is_ignored() {
        let (_dir, registry) = registry();
        registry.register("acme", "Acme").unwrap();
        let before = registry.get("acme").unwrap().unwrap().allowed_doc_types;
        let tenant = registry
            .update_scope_policy(
                "acme",
                ScopePolicyUpdate {
                    allowed_doc_types: Some(vec![]),
                    ..ScopePolicyUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(tenant.allowed_doc_types, before);
    }

    #[test]
    fn scope_policy_for_missing_tenant_errors() {
        let (_dir, registry) = registry();
        assert!(matches!(
            registry.get_scope_policy("ghost"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn registry_survives_reload() {
        let (dir, registry) = registry();
        registry.register("acme", "Acme").unwrap();
        let reopened = TenantRegistry::new(dir.path().join("config").join("vc_tenants.json"));
        assert_eq!(reopened.list_tenants(true).len(), 1);
    }
}
