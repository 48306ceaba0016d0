// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-normalizer
//!
//! Doc-type-specific field extraction. Each collected artifact yields a
//! versioned JSON record keyed by a deterministic hash of
//! `collection_id:artifact_id:doc_type`, so re-normalizing the same
//! artifact upserts the same row.
#![deny(unsafe_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use vcp_core::{ArtifactMeta, ArtifactPayload, DocType, sha256_hex};

/// Schema tag stamped on every normalized payload.
pub const SCHEMA_VERSION: &str = "vc_evidence_v1";

static REGISTRATION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{5}\b").expect("static regex"));
static INVOICE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(invoice|inv)[-_ ]?([a-z0-9]{3,})").expect("static regex"));
static AMOUNT_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)\s*(krw|원|usd)?\b").expect("static regex")
});

/// One normalized evidence record ready for upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub record_id: String,
    pub startup_id: String,
    pub collection_id: String,
    pub artifact_id: String,
    pub schema_type: DocType,
    pub payload: Value,
}

fn decode_text(content_b64: &str) -> String {
    if content_b64.is_empty() {
        return String::new();
    }
    match BASE64.decode(content_b64) {
        Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
        Err(_) => String::new(),
    }
}

fn first_non_empty_line(text: &str) -> String {
    for line in text.lines() {
        let value = line.trim();
        if !value.is_empty() {
            return value.chars().take(120).collect();
        }
    }
    String::new()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn extract_fields(doc_type: DocType, rel_path: &str, text: &str) -> Map<String, Value> {
    let lowered = text.to_lowercase();
    let mut fields = Map::new();
    fields.insert("source_rel_path".into(), json!(rel_path));
    match doc_type {
        DocType::BusinessRegistration => {
            let number = REGISTRATION_NUMBER
                .find(text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            fields.insert("registration_number".into(), json!(number));
            fields.insert("entity_name".into(), json!(first_non_empty_line(text)));
        }
        DocType::TaxInvoice => {
            let reference = INVOICE_REFERENCE
                .find(&lowered)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let amount = AMOUNT_HINT
                .find(&lowered)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            fields.insert("invoice_reference".into(), json!(reference));
            fields.insert("amount_hint".into(), json!(amount));
        }
        DocType::SocialInsurance => {
            let confirmed = contains_any(&lowered, &["납부", "완료", "confirmed", "paid"]);
            fields.insert("status".into(), json!(if confirmed { "confirmed" } else { "" }));
        }
        DocType::InvestmentDecision => {
            let decision = if contains_any(&lowered, &["approve", "승인", "가결"]) {
                "approved"
            } else if contains_any(&lowered, &["reject", "부결", "반려"]) {
                "rejected"
            } else {
                "unknown"
            };
            fields.insert("decision".into(), json!(decision));
            fields.insert("meeting_note_title".into(), json!(first_non_empty_line(text)));
        }
        DocType::IrDeck => {
            fields.insert("deck_title".into(), json!(first_non_empty_line(text)));
            let roadmap = contains_any(&lowered, &["roadmap", "전략", "plan", "go-to-market"]);
            fields.insert("has_roadmap_hint".into(), json!(roadmap));
        }
        DocType::Unknown => {
            fields.insert("preview".into(), json!(first_non_empty_line(text)));
        }
    }
    fields
}

fn non_empty_field_count(fields: &Map<String, Value>) -> usize {
    fields
        .values()
        .filter(|value| match value {
            Value::String(s) => !s.trim().is_empty(),
            Value::Null => false,
            _ => true,
        })
        .count()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Deterministic record key: `sha256(collection_id:artifact_id:doc_type)`.
pub fn record_id_for(collection_id: &str, artifact_id: &str, doc_type: DocType) -> String {
    sha256_hex(format!("{collection_id}:{artifact_id}:{}", doc_type.as_str()).as_bytes())
}

/// Normalize every accepted artifact of one collection.
///
/// Payloads are matched to metadata by `rel_path`; an artifact without a
/// payload still normalizes with empty text.
pub fn normalize_collection_artifacts(
    startup_id: &str,
    collection_id: &str,
    artifacts_meta: &[ArtifactMeta],
    artifacts_payload: &[ArtifactPayload],
) -> Vec<NormalizedRecord> {
    let mut records = Vec::with_capacity(artifacts_meta.len());
    for meta in artifacts_meta {
        let rel_path = meta.rel_path.trim().replace('\\', "/");
        if rel_path.is_empty() {
            continue;
        }
        let artifact_id = if meta.artifact_id.trim().is_empty() {
            ArtifactMeta::artifact_id_for(&meta.sha256)
        } else {
            meta.artifact_id.trim().to_string()
        };
        let text = artifacts_payload
            .iter()
            .find(|p| p.rel_path.trim().replace('\\', "/") == rel_path)
            .map(|p| decode_text(&p.content_b64))
            .unwrap_or_default();
        let fields = extract_fields(meta.doc_type, &rel_path, &text);

        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "schema_type": meta.doc_type.as_str(),
            "source": {
                "rel_path": rel_path,
                "sha256": meta.sha256.trim(),
                "size_bytes": meta.size_bytes,
                "mtime": meta.mtime.trim(),
                "artifact_id": artifact_id,
            },
            "quality": {
                "classifier_confidence": round4(meta.confidence),
                "text_length": text.chars().count(),
                "field_count": non_empty_field_count(&fields),
            },
            "fields": Value::Object(fields),
            "normalized_at": Utc::now().to_rfc3339(),
        });

        records.push(NormalizedRecord {
            record_id: record_id_for(collection_id, &artifact_id, meta.doc_type),
            startup_id: startup_id.to_string(),
            collection_id: collection_id.to_string(),
            artifact_id,
            schema_type: meta.doc_type,
            payload,
        });
    }
    records
}
