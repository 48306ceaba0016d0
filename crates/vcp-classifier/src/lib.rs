// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-classifier
//!
//! Keyword-driven document-type classification. Filenames are the primary
//! signal; a short plaintext preview is consulted only when the caller
//! opts into content inspection and the filename gave no match.
#![deny(unsafe_code)]

use std::path::Path;
use vcp_core::DocType;

/// Keyword table per document type. Keywords are matched after
/// tokenization, so `ir_deck`, `ir-deck`, and `IR Deck` all hit.
const DOC_TYPE_KEYWORDS: &[(DocType, &[&str])] = &[
    (
        DocType::BusinessRegistration,
        &[
            "business_registration",
            "business-registration",
            "biz_registration",
            "사업자등록증",
            "사업자 등록증",
            "사업자등록",
        ],
    ),
    (
        DocType::IrDeck,
        &[
            "ir_deck",
            "ir deck",
            "pitch",
            "investor deck",
            "투자제안서",
            "ir",
            "deck",
        ],
    ),
    (
        DocType::TaxInvoice,
        &["tax_invoice", "invoice", "세금계산서", "tax", "vat"],
    ),
    (
        DocType::SocialInsurance,
        &[
            "social_insurance",
            "4대보험",
            "4대 보험",
            "고용보험",
            "국민연금",
            "건강보험",
            "산재보험",
        ],
    ),
    (
        DocType::InvestmentDecision,
        &[
            "investment_decision",
            "board_minutes",
            "의사결정",
            "투자결정",
            "결재",
            "minutes",
            "approval",
        ],
    ),
];

/// File extensions cheap enough to read for content hints.
const LIGHTWEIGHT_SUFFIXES: &[&str] = &["txt", "md", "csv", "json", "log"];

/// Maximum preview length read from a candidate file.
const PREVIEW_CHARS: usize = 4000;

fn tokenize(text: &str) -> String {
    text.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify free text into a doc type with a confidence score.
///
/// Confidence scales with the number of distinct keyword hits:
/// `min(0.99, 0.55 + hits * 0.15)`, rounded to two decimals. Text with no
/// hits is `(unknown, 0.0)`.
pub fn classify_text(text: &str) -> (DocType, f64) {
    let normalized = tokenize(text);
    if normalized.is_empty() {
        return (DocType::Unknown, 0.0);
    }

    let mut best = (DocType::Unknown, 0u32);
    for (doc_type, keywords) in DOC_TYPE_KEYWORDS {
        let hits = keywords
            .iter()
            .map(|kw| tokenize(kw))
            .filter(|kw| !kw.is_empty() && normalized.contains(kw.as_str()))
            .count() as u32;
        if hits > best.1 {
            best = (*doc_type, hits);
        }
    }

    let (doc_type, hits) = best;
    if doc_type == DocType::Unknown {
        return (DocType::Unknown, 0.0);
    }
    let confidence = (0.55 + f64::from(hits) * 0.15).min(0.99);
    (doc_type, (confidence * 100.0).round() / 100.0)
}

fn read_lightweight_text(path: &Path) -> String {
    let suffix = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    if !LIGHTWEIGHT_SUFFIXES.contains(&suffix.as_str()) {
        return String::new();
    }
    match std::fs::read(path) {
        Ok(raw) => {
            let text = String::from_utf8_lossy(&raw);
            text.chars().take(PREVIEW_CHARS).collect()
        }
        Err(_) => String::new(),
    }
}

/// Classify a file on disk.
///
/// The filename (plus any extra hints) is tried first; when it yields
/// `unknown` and `include_ocr` is set, up to 4000 characters of a
/// plaintext preview are classified instead.
pub fn classify_document(path: &Path, include_ocr: bool, extra_hints: &[String]) -> (DocType, f64) {
    let mut hints: Vec<String> = Vec::with_capacity(1 + extra_hints.len());
    hints.push(path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string());
    hints.extend(extra_hints.iter().filter(|h| !h.trim().is_empty()).cloned());

    let (doc_type, confidence) = classify_text(&hints.join(" "));
    if doc_type != DocType::Unknown {
        return (doc_type, confidence);
    }

    if include_ocr {
        let text = read_lightweight_text(path);
        if !text.is_empty() {
            return classify_text(&text);
        }
    }
    (DocType::Unknown, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn filename_keywords_classify() {
        assert_eq!(classify_text("acme_ir_deck_2026.pdf").0, DocType::IrDeck);
        assert_eq!(
            classify_text("tax_invoice_202602.txt").0,
            DocType::TaxInvoice
        );
        assert_eq!(
            classify_text("business_registration.pdf").0,
            DocType::BusinessRegistration
        );
        assert_eq!(
            classify_text("board_minutes_2026_q1.md").0,
            DocType::InvestmentDecision
        );
    }

    #[test]
    fn korean_keywords_classify() {
        assert_eq!(classify_text("사업자등록증.pdf").0, DocType::BusinessRegistration);
        assert_eq!(classify_text("세금계산서_3월.pdf").0, DocType::TaxInvoice);
        assert_eq!(classify_text("국민연금 납부확인.txt").0, DocType::SocialInsurance);
    }

    #[test]
    fn confidence_scales_with_hits() {
        let (doc, single) = classify_text("invoice.txt");
        assert_eq!(doc, DocType::TaxInvoice);
        assert_eq!(single, 0.70);

        let (doc, multiple) = classify_text("tax_invoice vat 2026.txt");
        assert_eq!(doc, DocType::TaxInvoice);
        assert!(multiple > single);
        assert!(multiple <= 0.99);
    }

    #[test]
    fn unmatched_text_is_unknown() {
        assert_eq!(classify_text("quarterly_photos.zip"), (DocType::Unknown, 0.0));
        assert_eq!(classify_text(""), (DocType::Unknown, 0.0));
        assert_eq!(classify_text("   "), (DocType::Unknown, 0.0));
    }

    #[test]
    fn tokenizer_bridges_separators() {
        assert_eq!(classify_text("IR-DECK").0, DocType::IrDeck);
        assert_eq!(classify_text("ir deck").0, DocType::IrDeck);
    }

    #[test]
    fn content_fallback_requires_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "세금계산서 발행 내역").unwrap();

        assert_eq!(classify_document(&path, false, &[]), (DocType::Unknown, 0.0));
        let (doc, confidence) = classify_document(&path, true, &[]);
        assert_eq!(doc, DocType::TaxInvoice);
        assert!(confidence > 0.0);
    }

    #[test]
    fn binary_suffixes_skip_content_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        std::fs::write(&path, b"invoice invoice invoice").unwrap();
        assert_eq!(classify_document(&path, true, &[]), (DocType::Unknown, 0.0));
    }

    #[test]
    fn extra_hints_participate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_0001.pdf");
        std::fs::write(&path, b"").unwrap();
        let (doc, _) = classify_document(&path, false, &["investor deck".to_string()]);
        assert_eq!(doc, DocType::IrDeck);
    }
}
