// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the VC platform.
//!
//! Every platform error carries an [`ErrorCode`] (a machine-readable,
//! stable string tag), a human-readable message, an optional cause chain,
//! and arbitrary key-value context. Use the builder returned by
//! [`VcError::new`] to construct errors fluently.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Wire-protocol failures: bad signatures, clock skew, malformed
    /// bodies, unsafe paths.
    Protocol,
    /// Content-hash or bundle verification failures.
    Integrity,
    /// Scope-policy evaluation failures.
    Policy,
    /// Approval state-machine violations.
    State,
    /// Failures of external collaborators (gateway, OAuth provider, SMTP).
    External,
    /// Missing or invalid configuration.
    Config,
    /// Persistent-store failures.
    Storage,
    /// Key-store and envelope failures.
    Crypto,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Protocol => "protocol",
            Self::Integrity => "integrity",
            Self::Policy => "policy",
            Self::State => "state",
            Self::External => "external",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Crypto => "crypto",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Protocol --
    /// HMAC signature missing or invalid.
    ProtocolInvalidSignature,
    /// Request timestamp outside the tolerated skew window.
    ProtocolClockSkew,
    /// Request body failed to parse or is missing required fields.
    ProtocolMalformedRequest,
    /// Path contains `..` segments or escapes the alias root.
    ProtocolPathTraversal,
    /// Path resolves through a symlink.
    ProtocolSymlinkDenied,
    /// Request startup_id does not match the gateway tenant.
    ProtocolTenantMismatch,

    // -- Integrity --
    /// Recomputed content hash differs from the advertised one.
    IntegrityShaMismatch,
    /// Post-collect bundle verification failed.
    IntegrityVerificationFailed,

    // -- Policy --
    /// A scope-policy rule rejected the artifact.
    PolicyDenied,
    /// A deny pattern could not be compiled.
    PolicyInvalidPattern,

    // -- State --
    /// Requested transition is not legal from the current status.
    StateInvalidTransition,
    /// Approval TTL elapsed before the action.
    StateApprovalExpired,
    /// High-risk approval needs a second distinct approver.
    StateSecondApproverRequired,
    /// Referenced approval or collection does not exist.
    StateNotFound,

    // -- External --
    /// Gateway call failed or returned a non-ok payload.
    ExternalGatewayFailure,
    /// OAuth provider rejected or failed the token request.
    ExternalOauthFailure,
    /// SMTP relay refused or failed the send.
    ExternalSmtpFailure,

    // -- Config --
    /// Tenant is not registered.
    ConfigTenantMissing,
    /// Tenant exists but is inactive.
    ConfigTenantInactive,
    /// SMTP transport is not configured.
    ConfigSmtpMissing,
    /// OAuth client credentials are not available.
    ConfigOauthMissing,
    /// Tenant has no gateway URL bound.
    ConfigGatewayMissing,
    /// No outbound recipients configured for the tenant or approval.
    ConfigRecipientsMissing,

    // -- Storage / Crypto / Internal --
    /// Persistent-store operation failed.
    StorageFailure,
    /// Key-store or AEAD operation failed.
    CryptoFailure,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProtocolInvalidSignature
            | Self::ProtocolClockSkew
            | Self::ProtocolMalformedRequest
            | Self::ProtocolPathTraversal
            | Self::ProtocolSymlinkDenied
            | Self::ProtocolTenantMismatch => ErrorCategory::Protocol,

            Self::IntegrityShaMismatch | Self::IntegrityVerificationFailed => {
                ErrorCategory::Integrity
            }

            Self::PolicyDenied | Self::PolicyInvalidPattern => ErrorCategory::Policy,

            Self::StateInvalidTransition
            | Self::StateApprovalExpired
            | Self::StateSecondApproverRequired
            | Self::StateNotFound => ErrorCategory::State,

            Self::ExternalGatewayFailure
            | Self::ExternalOauthFailure
            | Self::ExternalSmtpFailure => ErrorCategory::External,

            Self::ConfigTenantMissing
            | Self::ConfigTenantInactive
            | Self::ConfigSmtpMissing
            | Self::ConfigOauthMissing
            | Self::ConfigGatewayMissing
            | Self::ConfigRecipientsMissing => ErrorCategory::Config,

            Self::StorageFailure => ErrorCategory::Storage,
            Self::CryptoFailure => ErrorCategory::Crypto,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtocolInvalidSignature => "PROTOCOL_INVALID_SIGNATURE",
            Self::ProtocolClockSkew => "PROTOCOL_CLOCK_SKEW",
            Self::ProtocolMalformedRequest => "PROTOCOL_MALFORMED_REQUEST",
            Self::ProtocolPathTraversal => "PROTOCOL_PATH_TRAVERSAL",
            Self::ProtocolSymlinkDenied => "PROTOCOL_SYMLINK_DENIED",
            Self::ProtocolTenantMismatch => "PROTOCOL_TENANT_MISMATCH",
            Self::IntegrityShaMismatch => "INTEGRITY_SHA_MISMATCH",
            Self::IntegrityVerificationFailed => "INTEGRITY_VERIFICATION_FAILED",
            Self::PolicyDenied => "POLICY_DENIED",
            Self::PolicyInvalidPattern => "POLICY_INVALID_PATTERN",
            Self::StateInvalidTransition => "STATE_INVALID_TRANSITION",
            Self::StateApprovalExpired => "STATE_APPROVAL_EXPIRED",
            Self::StateSecondApproverRequired => "STATE_SECOND_APPROVER_REQUIRED",
            Self::StateNotFound => "STATE_NOT_FOUND",
            Self::ExternalGatewayFailure => "EXTERNAL_GATEWAY_FAILURE",
            Self::ExternalOauthFailure => "EXTERNAL_OAUTH_FAILURE",
            Self::ExternalSmtpFailure => "EXTERNAL_SMTP_FAILURE",
            Self::ConfigTenantMissing => "CONFIG_TENANT_MISSING",
            Self::ConfigTenantInactive => "CONFIG_TENANT_INACTIVE",
            Self::ConfigSmtpMissing => "CONFIG_SMTP_MISSING",
            Self::ConfigOauthMissing => "CONFIG_OAUTH_MISSING",
            Self::ConfigGatewayMissing => "CONFIG_GATEWAY_MISSING",
            Self::ConfigRecipientsMissing => "CONFIG_RECIPIENTS_MISSING",
            Self::StorageFailure => "STORAGE_FAILURE",
            Self::CryptoFailure => "CRYPTO_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// VcError
// ---------------------------------------------------------------------------

/// Unified platform error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use vcp_error::{ErrorCode, VcError};
///
/// let err = VcError::new(ErrorCode::ExternalGatewayFailure, "manifest fetch timed out")
///     .with_context("startup_id", "acme")
///     .with_context("timeout_ms", 30_000);
/// ```
pub struct VcError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl VcError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for VcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("VcError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for VcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for VcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`VcError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VcErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&VcError> for VcErrorDto {
    fn from(err: &VcError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::ProtocolInvalidSignature,
        ErrorCode::ProtocolClockSkew,
        ErrorCode::ProtocolMalformedRequest,
        ErrorCode::ProtocolPathTraversal,
        ErrorCode::ProtocolSymlinkDenied,
        ErrorCode::ProtocolTenantMismatch,
        ErrorCode::IntegrityShaMismatch,
        ErrorCode::IntegrityVerificationFailed,
        ErrorCode::PolicyDenied,
        ErrorCode::PolicyInvalidPattern,
        ErrorCode::StateInvalidTransition,
        ErrorCode::StateApprovalExpired,
        ErrorCode::StateSecondApproverRequired,
        ErrorCode::StateNotFound,
        ErrorCode::ExternalGatewayFailure,
        ErrorCode::ExternalOauthFailure,
        ErrorCode::ExternalSmtpFailure,
        ErrorCode::ConfigTenantMissing,
        ErrorCode::ConfigTenantInactive,
        ErrorCode::ConfigSmtpMissing,
        ErrorCode::ConfigOauthMissing,
        ErrorCode::ConfigGatewayMissing,
        ErrorCode::ConfigRecipientsMissing,
        ErrorCode::StorageFailure,
        ErrorCode::CryptoFailure,
        ErrorCode::Internal,
    ];

    #[test]
    fn display_includes_code_and_context() {
        let err = VcError::new(ErrorCode::IntegrityShaMismatch, "hash mismatch")
            .with_context("rel_path", "desktop_common/a.txt");
        let s = err.to_string();
        assert!(s.starts_with("[INTEGRITY_SHA_MISMATCH] hash mismatch"));
        assert!(s.contains("rel_path"));
    }

    #[test]
    fn source_chain_is_preserved() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err = VcError::new(ErrorCode::StorageFailure, "read failed").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "missing");
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate: {}", code.as_str());
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
        }
    }

    #[test]
    fn categories_cover_every_code() {
        for code in ALL_CODES {
            // Category resolution must not panic and must be stable.
            let _ = code.category();
        }
        assert_eq!(
            ErrorCode::ProtocolSymlinkDenied.category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            ErrorCode::StateApprovalExpired.category(),
            ErrorCategory::State
        );
        assert_eq!(ErrorCode::CryptoFailure.category(), ErrorCategory::Crypto);
    }

    #[test]
    fn dto_roundtrip() {
        let err = VcError::new(ErrorCode::ExternalSmtpFailure, "relay refused")
            .with_context("host", "smtp.example.com");
        let dto: VcErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: VcErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
    }
}
