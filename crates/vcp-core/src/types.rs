// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document types and lifecycle statuses shared across the platform.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document classification label for a collected artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Business registration certificate.
    BusinessRegistration,
    /// Investor-relations deck.
    IrDeck,
    /// Tax invoice.
    TaxInvoice,
    /// Social-insurance enrollment or payment record.
    SocialInsurance,
    /// Investment decision minutes.
    InvestmentDecision,
    /// Anything the classifier could not place.
    Unknown,
}

impl DocType {
    /// All labels the classifier can produce, `unknown` last.
    pub const ALL: [DocType; 6] = [
        DocType::BusinessRegistration,
        DocType::IrDeck,
        DocType::TaxInvoice,
        DocType::SocialInsurance,
        DocType::InvestmentDecision,
        DocType::Unknown,
    ];

    /// Stable snake_case representation used on the wire and in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::BusinessRegistration => "business_registration",
            DocType::IrDeck => "ir_deck",
            DocType::TaxInvoice => "tax_invoice",
            DocType::SocialInsurance => "social_insurance",
            DocType::InvestmentDecision => "investment_decision",
            DocType::Unknown => "unknown",
        }
    }

    /// Parse a stored label, falling back to [`DocType::Unknown`].
    pub fn parse_or_unknown(raw: &str) -> DocType {
        match raw.trim() {
            "business_registration" => DocType::BusinessRegistration,
            "ir_deck" => DocType::IrDeck,
            "tax_invoice" => DocType::TaxInvoice,
            "social_insurance" => DocType::SocialInsurance,
            "investment_decision" => DocType::InvestmentDecision,
            _ => DocType::Unknown,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! status_enum {
    (
        $(#[$outer:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$outer])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Stable snake_case representation used in the store.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }

            /// Parse a stored label.
            pub fn parse(raw: &str) -> Option<Self> {
                match raw.trim() {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum! {
    /// Lifecycle of one collection cycle.
    CollectionStatus {
        /// Artifacts downloaded and persisted.
        Collected => "collected",
        /// Pending approval created; waiting for an operator.
        AwaitingApproval => "awaiting_approval",
        /// Post-collect integrity verification failed.
        VerificationFailed => "verification_failed",
        /// Bundle delivered externally.
        Dispatched => "dispatched",
    }
}

status_enum! {
    /// Lifecycle of an outbound-dispatch approval.
    ApprovalStatus {
        /// Waiting for an approver decision.
        Pending => "pending",
        /// Cleared for dispatch.
        Approved => "approved",
        /// Terminally rejected.
        Rejected => "rejected",
        /// TTL elapsed before a decision.
        Expired => "expired",
        /// Outbound delivery completed.
        Dispatched => "dispatched",
    }
}

status_enum! {
    /// Lifecycle of a BYO-OAuth integration connection.
    ConnectionStatus {
        /// Created without client credentials.
        AwaitingCredentials => "awaiting_credentials",
        /// Consent URL issued; waiting for the authorization code.
        PendingConsent => "pending_consent",
        /// Token exchange completed.
        Connected => "connected",
        /// Explicitly revoked.
        Revoked => "revoked",
        /// Provider or decrypt failure.
        Error => "error",
    }
}

status_enum! {
    /// Lifecycle of an integration sync run.
    SyncRunStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

status_enum! {
    /// Lifecycle of an out-of-band user confirmation.
    ConfirmationStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Rejected => "rejected",
    }
}

status_enum! {
    /// Outcome of a scope-policy evaluation.
    ScopeDecision {
        Allow => "allow",
        Reject => "reject",
    }
}

/// Severity bucket for a collection risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a clamped `[0, 1]` score: `>= 0.70` high, `>= 0.35` medium.
    pub fn from_score(score: f64) -> RiskLevel {
        if score >= 0.70 {
            RiskLevel::High
        } else if score >= 0.35 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Parse a stored label, falling back to [`RiskLevel::Low`].
    pub fn parse_or_low(raw: &str) -> RiskLevel {
        match raw.trim().to_lowercase().as_str() {
            "high" => RiskLevel::High,
            "medium" => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_roundtrip() {
        for doc in DocType::ALL {
            assert_eq!(DocType::parse_or_unknown(doc.as_str()), doc);
        }
        assert_eq!(DocType::parse_or_unknown("payroll"), DocType::Unknown);
    }

    #[test]
    fn doc_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&DocType::BusinessRegistration).unwrap();
        assert_eq!(json, r#""business_registration""#);
        let back: DocType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DocType::BusinessRegistration);
    }

    #[test]
    fn statuses_parse_their_own_labels() {
        assert_eq!(
            CollectionStatus::parse("awaiting_approval"),
            Some(CollectionStatus::AwaitingApproval)
        );
        assert_eq!(ApprovalStatus::parse("dispatched"), Some(ApprovalStatus::Dispatched));
        assert_eq!(
            ConnectionStatus::parse("pending_consent"),
            Some(ConnectionStatus::PendingConsent)
        );
        assert_eq!(ApprovalStatus::parse("bogus"), None);
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.34), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.35), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.69), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.70), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::High);
    }
}
