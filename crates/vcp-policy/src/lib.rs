// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-policy
//!
//! Consent-scope policy evaluation. Every manifest entry is checked
//! against the tenant's allow prefixes, deny patterns, and allowed doc
//! types; each decision is recorded as an audit row whether it allowed or
//! rejected the artifact.
#![deny(unsafe_code)]

use globset::Glob;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vcp_core::{
    ArtifactMeta, ArtifactPayload, ScopeAudit, ScopeDecision, ScopePolicy, Tenant,
    normalize_rel_path,
};

/// Outcome of evaluating one artifact against a scope policy.
///
/// `reason` is always populated: `in_scope` for allows, a rejection tag
/// (`outside_allowed_scope`, `deny_pattern:<p>`, …) otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: "in_scope".into() }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: reason.into() }
    }
}

/// Aggregate counts for one filtering pass, returned alongside the audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySummary {
    pub allow_count: usize,
    pub reject_count: usize,
    pub policy: ScopePolicy,
}

/// Result of [`filter_artifacts_by_policy`].
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub accepted_meta: Vec<ArtifactMeta>,
    pub accepted_payload: Vec<ArtifactPayload>,
    pub audits: Vec<ScopeAudit>,
    pub summary: PolicySummary,
}

fn deny_pattern_matches(pattern: &str, lowered_path: &str) -> bool {
    let pat = pattern.to_lowercase();
    if lowered_path.contains(&pat) {
        return true;
    }
    // An unparseable glob falls back to the substring check above.
    match Glob::new(&pat) {
        Ok(glob) => glob.compile_matcher().is_match(lowered_path),
        Err(_) => false,
    }
}

/// Evaluate one artifact against a resolved scope policy.
///
/// Rules apply in order: empty path, allow prefixes, deny patterns
/// (glob or substring over the lowercased path), allowed doc types.
pub fn evaluate_artifact_policy(
    rel_path: &str,
    doc_type: vcp_core::DocType,
    policy: &ScopePolicy,
) -> Decision {
    let normalized = normalize_rel_path(rel_path);
    if normalized.is_empty() {
        return Decision::reject("empty_rel_path");
    }

    if !policy.allow_prefixes.is_empty()
        && !policy.allow_prefixes.iter().any(|prefix| normalized.starts_with(prefix))
    {
        return Decision::reject("outside_allowed_scope");
    }

    let lowered = normalized.to_lowercase();
    for pattern in &policy.deny_patterns {
        if deny_pattern_matches(pattern, &lowered) {
            return Decision::reject(format!("deny_pattern:{pattern}"));
        }
    }

    if !policy.allowed_doc_types.is_empty() && !policy.allowed_doc_types.contains(&doc_type) {
        return Decision::reject("doc_type_not_allowed");
    }

    Decision::allow()
}

/// Filter a downloaded manifest through the tenant's scope policy.
///
/// Non-allowed artifacts are dropped before encryption; one audit row is
/// emitted per artifact considered, and payloads are kept only for paths
/// that survived.
pub fn filter_artifacts_by_policy(
    tenant: &Tenant,
    artifacts_meta: Vec<ArtifactMeta>,
    artifacts_payload: Vec<ArtifactPayload>,
) -> FilterOutcome {
    let policy = tenant.scope_policy();

    let mut accepted_meta: Vec<ArtifactMeta> = Vec::new();
    let mut audits: Vec<ScopeAudit> = Vec::new();
    for meta in artifacts_meta {
        let rel_path = normalize_rel_path(&meta.rel_path);
        let decision = evaluate_artifact_policy(&rel_path, meta.doc_type, &policy);
        audits.push(ScopeAudit {
            rel_path: rel_path.clone(),
            doc_type: meta.doc_type,
            decision: if decision.allowed { ScopeDecision::Allow } else { ScopeDecision::Reject },
            reason: decision.reason.clone(),
        });
        if decision.allowed {
            accepted_meta.push(meta);
        } else {
            debug!(
                startup_id = %tenant.startup_id,
                rel_path = %rel_path,
                reason = %decision.reason,
                "artifact rejected by scope policy"
            );
        }
    }

    let accepted_paths: Vec<String> = accepted_meta
        .iter()
        .map(|meta| normalize_rel_path(&meta.rel_path))
        .collect();
    let accepted_payload = artifacts_payload
        .into_iter()
        .filter(|payload| accepted_paths.iter().any(|p| *p == normalize_rel_path(&payload.rel_path)))
        .collect();

    let allow_count = audits.iter().filter(|a| a.decision == ScopeDecision::Allow).count();
    let reject_count = audits.len() - allow_count;
    FilterOutcome {
        accepted_meta,
        accepted_payload,
        audits,
        summary: PolicySummary { allow_count, reject_count, policy },
    }
}
