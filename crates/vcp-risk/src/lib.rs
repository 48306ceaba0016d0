// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-risk
//!
//! Deterministic risk scoring over a collection's artifacts and scope
//! audits. The score accumulates fixed penalties, clamps to `[0, 1]`, and
//! buckets into low/medium/high; identical inputs always produce the
//! identical `{score, level, reasons}` triple because the approval gate
//! and the operator UI both key off it.
#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vcp_core::{ArtifactMeta, DocType, RiskLevel, ScopeAudit, ScopeDecision, Tenant};

/// Recipient domains that trigger the free-mail penalty.
const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "naver.com",
    "daum.net",
    "outlook.com",
    "hotmail.com",
    "yahoo.com",
];

/// Doc types a complete evidence bundle is expected to contain.
const CORE_DOC_TYPES: &[DocType] = &[
    DocType::BusinessRegistration,
    DocType::TaxInvoice,
    DocType::InvestmentDecision,
];

/// Deterministic `{score, level, reasons}` triple for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Clamped to `[0, 1]`, four decimal places.
    pub score: f64,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Score one collection cycle.
pub fn assess_collection_risk(
    tenant: &Tenant,
    artifacts_meta: &[ArtifactMeta],
    scope_audits: &[ScopeAudit],
) -> RiskAssessment {
    let mut score = 0.0f64;
    let mut reasons: Vec<String> = Vec::new();

    let artifact_count = artifacts_meta.len();
    let unknown_count = artifacts_meta
        .iter()
        .filter(|meta| meta.doc_type == DocType::Unknown)
        .count();
    let rejected_count = scope_audits
        .iter()
        .filter(|audit| audit.decision == ScopeDecision::Reject)
        .count();

    if artifact_count == 0 {
        score += 0.55;
        reasons.push("no_artifacts_collected".into());
    }

    if unknown_count > 0 {
        let unknown_ratio = unknown_count as f64 / artifact_count.max(1) as f64;
        score += (0.10 + unknown_ratio * 0.40).min(0.30);
        reasons.push(format!("unknown_doc_ratio:{unknown_ratio:.2}"));
    }

    if rejected_count > 0 {
        score += (0.05 * rejected_count as f64).min(0.20);
        reasons.push(format!("scope_rejections:{rejected_count}"));
    }

    if artifact_count > 200 {
        score += 0.20;
        reasons.push("large_collection_over_200".into());
    } else if artifact_count > 80 {
        score += 0.10;
        reasons.push("large_collection_over_80".into());
    }

    if artifact_count > 0 {
        let avg_confidence = artifacts_meta.iter().map(|m| m.confidence).sum::<f64>()
            / artifact_count as f64;
        if avg_confidence < 0.55 {
            score += 0.12;
            reasons.push(format!("low_classifier_confidence:{avg_confidence:.2}"));
        }
    }

    let present: BTreeSet<DocType> = artifacts_meta.iter().map(|m| m.doc_type).collect();
    let missing: Vec<&str> = CORE_DOC_TYPES
        .iter()
        .filter(|doc| !present.contains(doc))
        .map(|doc| doc.as_str())
        .collect();
    if !missing.is_empty() {
        score += 0.10;
        reasons.push(format!("missing_core_docs:{}", missing.join(",")));
    }

    for recipient in &tenant.email_recipients {
        let email = recipient.trim().to_lowercase();
        let Some((_, domain)) = email.split_once('@') else {
            continue;
        };
        if FREE_MAIL_DOMAINS.contains(&domain) {
            score += 0.08;
            reasons.push(format!("free_mail_recipient:{domain}"));
            break;
        }
    }

    let score = round4(score.clamp(0.0, 1.0));
    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        reasons,
    }
}
