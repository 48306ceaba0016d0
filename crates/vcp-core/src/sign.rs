// SPDX-License-Identifier: MIT OR Apache-2.0
//! HMAC-SHA256 request signing for the gateway wire protocol.
//!
//! Every authenticated POST carries a Unix-seconds timestamp and a hex
//! signature over `timestamp "." body`. Verification is constant-time and
//! rejects timestamps outside a ±300 s window.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the Unix-seconds timestamp.
pub const TIMESTAMP_HEADER: &str = "x-vc-timestamp";
/// Header carrying the hex HMAC-SHA256 signature.
pub const SIGNATURE_HEADER: &str = "x-vc-signature";
/// Maximum tolerated clock skew between signer and verifier.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Signature verification failure, surfaced to clients as HTTP 401.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("invalid timestamp header")]
    InvalidTimestamp,
    #[error("timestamp out of range")]
    TimestampOutOfRange,
    #[error("invalid signature")]
    InvalidSignature,
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Hex HMAC-SHA256 over `timestamp "." body`.
pub fn sign_body(secret: &str, timestamp: &str, body: &[u8]) -> String {
    hex::encode(mac_for(secret, timestamp, body).finalize().into_bytes())
}

/// Build the signed header pair for an outgoing POST.
///
/// Returns an empty list when the secret is blank (signing disabled).
pub fn signed_headers(secret: &str, body: &[u8], now_unix: i64) -> Vec<(String, String)> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Vec::new();
    }
    let timestamp = now_unix.to_string();
    let signature = sign_body(secret, &timestamp, body);
    vec![
        (TIMESTAMP_HEADER.to_string(), timestamp),
        (SIGNATURE_HEADER.to_string(), signature),
    ]
}

/// Verify an inbound signature in constant time.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let timestamp = timestamp.trim();
    let signature = signature.trim();
    if timestamp.is_empty() || signature.is_empty() {
        return Err(SignatureError::MissingHeaders);
    }
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::InvalidTimestamp)?;
    if (now_unix - ts).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::TimestampOutOfRange);
    }
    let expected = hex::decode(signature).map_err(|_| SignatureError::InvalidSignature)?;
    mac_for(secret, timestamp, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::InvalidSignature)
}
