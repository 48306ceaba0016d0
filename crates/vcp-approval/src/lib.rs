// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-approval
//!
//! Approval state machine: `pending → {approved, rejected, expired}` and
//! `approved → dispatched`. TTL expiry is enforced lazily on the next
//! action that observes it; high-risk approvals require two distinct
//! sign-offs before promotion, and sign-off rows are never deleted.
#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use vcp_core::{ApprovalStatus, RiskLevel, SmtpConfig, PlatformPaths};
use vcp_dispatch::{DispatchOutcome, dispatch_approval};
use vcp_error::{ErrorCode, VcError};
use vcp_registry::TenantRegistry;
use vcp_store::{ApprovalRow, PlatformStore, SignoffRow};

fn storage_error(err: vcp_store::StoreError) -> VcError {
    VcError::new(ErrorCode::StorageFailure, "store access failed").with_source(err)
}

fn fetch_approval(store: &PlatformStore, approval_id: &str) -> Result<ApprovalRow, VcError> {
    store
        .get_approval(approval_id)
        .map_err(storage_error)?
        .ok_or_else(|| {
            VcError::new(ErrorCode::StateNotFound, format!("approval not found: {approval_id}"))
        })
}

fn is_expired(expires_at: &str, now: DateTime<Utc>) -> bool {
    let value = expires_at.trim();
    if value.is_empty() {
        return false;
    }
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => parsed.with_timezone(&Utc) <= now,
        Err(_) => false,
    }
}

/// One pending approval with its recorded sign-offs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval: ApprovalRow,
    pub signoffs: Vec<SignoffRow>,
    pub signoff_count: usize,
}

/// Pending-queue counts by risk level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

/// Pending queue ordered by `(risk_score DESC, requested_at ASC)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOverview {
    pub count: usize,
    pub risk_breakdown: RiskBreakdown,
    pub pending: Vec<PendingApproval>,
}

/// Non-expired pending approvals with sign-off counts and a risk
/// breakdown. Expired rows are filtered here, not transitioned.
pub fn list_pending(
    store: &PlatformStore,
    startup_id: Option<&str>,
) -> Result<PendingOverview, VcError> {
    let rows = store
        .list_pending_approvals(startup_id, 200)
        .map_err(storage_error)?;
    let mut breakdown = RiskBreakdown::default();
    let mut pending = Vec::with_capacity(rows.len());
    for approval in rows {
        match approval.risk_level {
            RiskLevel::Low => breakdown.low += 1,
            RiskLevel::Medium => breakdown.medium += 1,
            RiskLevel::High => breakdown.high += 1,
        }
        let signoffs = store
            .list_approval_signoffs(&approval.approval_id)
            .map_err(storage_error)?;
        pending.push(PendingApproval {
            signoff_count: signoffs.len(),
            signoffs,
            approval,
        });
    }
    Ok(PendingOverview { count: pending.len(), risk_breakdown: breakdown, pending })
}

/// One approval with its sign-offs.
pub fn approval_status(
    store: &PlatformStore,
    approval_id: &str,
) -> Result<PendingApproval, VcError> {
    let approval = fetch_approval(store, approval_id)?;
    let signoffs = store
        .list_approval_signoffs(approval_id)
        .map_err(storage_error)?;
    Ok(PendingApproval { signoff_count: signoffs.len(), signoffs, approval })
}

/// Terminally reject a pending approval.
pub fn reject(
    store: &PlatformStore,
    approval_id: &str,
    approver: &str,
    reason: &str,
) -> Result<ApprovalRow, VcError> {
    let approval = fetch_approval(store, approval_id)?;
    if approval.status != ApprovalStatus::Pending {
        return Err(VcError::new(
            ErrorCode::StateInvalidTransition,
            format!("cannot reject from current status: {}", approval.status),
        ));
    }
    let reason = if reason.trim().is_empty() { "rejected" } else { reason.trim() };
    store
        .update_approval_status(approval_id, ApprovalStatus::Rejected, approver, reason)
        .map_err(storage_error)?;
    fetch_approval(store, approval_id)
}

/// Knobs for one approve action.
#[derive(Debug, Clone)]
pub struct ApproveOptions {
    pub approver: String,
    /// Call the dispatcher immediately after promotion.
    pub auto_dispatch: bool,
    /// `None` defaults to dry-run when SMTP is not configured.
    pub dry_run_dispatch: Option<bool>,
    /// Required acknowledgement for high-risk approvals.
    pub force_high_risk: bool,
}

impl Default for ApproveOptions {
    fn default() -> Self {
        Self {
            approver: vcp_core::default_approver(),
            auto_dispatch: true,
            dry_run_dispatch: None,
            force_high_risk: false,
        }
    }
}

/// Result of one approve action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveOutcome {
    pub approval: ApprovalRow,
    /// Set when a high-risk approval still waits for a second approver.
    pub requires_second_approval: bool,
    pub signoff_count: usize,
    pub signoffs: Vec<SignoffRow>,
    pub dispatched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchOutcome>,
}

/// Approve a pending approval, enforcing TTL and dual sign-off.
///
/// High-risk approvals require `force_high_risk` and two distinct
/// approvers: the first call records a sign-off and leaves the approval
/// pending with `requires_second_approval`; the second promotes it.
pub fn approve(
    store: &PlatformStore,
    registry: &TenantRegistry,
    smtp: Option<&SmtpConfig>,
    paths: &PlatformPaths,
    approval_id: &str,
    options: ApproveOptions,
) -> Result<ApproveOutcome, VcError> {
    let approval = fetch_approval(store, approval_id)?;
    let approver = options.approver.trim().to_string();

    if is_expired(&approval.expires_at, Utc::now()) {
        if approval.status == ApprovalStatus::Pending {
            store
                .update_approval_status(
                    approval_id,
                    ApprovalStatus::Expired,
                    &approver,
                    "approval ttl exceeded",
                )
                .map_err(storage_error)?;
        }
        return Err(VcError::new(
            ErrorCode::StateApprovalExpired,
            format!("approval expired: {approval_id}"),
        ));
    }

    if approval.risk_level == RiskLevel::High && !options.force_high_risk {
        return Err(VcError::new(
            ErrorCode::StateInvalidTransition,
            "high-risk approval requires force_high_risk=true",
        ));
    }

    let mut effective_approver = approver.clone();
    let mut signoffs: Vec<SignoffRow> = Vec::new();
    if approval.risk_level == RiskLevel::High {
        store
            .add_approval_signoff(approval_id, &approver)
            .map_err(storage_error)?;
        signoffs = store
            .list_approval_signoffs(approval_id)
            .map_err(storage_error)?;
        let mut distinct: Vec<String> = Vec::new();
        for signoff in &signoffs {
            let name = signoff.approver.trim().to_string();
            if !name.is_empty() && !distinct.contains(&name) {
                distinct.push(name);
            }
        }
        if distinct.len() < 2 {
            store
                .update_approval_status(
                    approval_id,
                    ApprovalStatus::Pending,
                    &distinct.join(","),
                    "high-risk waiting second approver",
                )
                .map_err(storage_error)?;
            let signoff_count = distinct.len();
            info!(approval_id, signoff_count, "high-risk approval waiting for second approver");
            return Ok(ApproveOutcome {
                approval: fetch_approval(store, approval_id)?,
                requires_second_approval: true,
                signoff_count,
                signoffs,
                dispatched: false,
                dispatch: None,
            });
        }
        effective_approver = distinct.join(",");
    }

    match approval.status {
        ApprovalStatus::Pending => {
            store
                .update_approval_status(
                    approval_id,
                    ApprovalStatus::Approved,
                    &effective_approver,
                    "",
                )
                .map_err(storage_error)?;
            info!(approval_id, approver = %effective_approver, "approval granted");
        }
        ApprovalStatus::Approved | ApprovalStatus::Dispatched => {}
        other => {
            return Err(VcError::new(
                ErrorCode::StateInvalidTransition,
                format!("cannot approve from current status: {other}"),
            ));
        }
    }

    let signoff_count = signoffs.len();
    if !options.auto_dispatch {
        return Ok(ApproveOutcome {
            approval: fetch_approval(store, approval_id)?,
            requires_second_approval: false,
            signoff_count,
            signoffs,
            dispatched: false,
            dispatch: None,
        });
    }

    let dry_run = options.dry_run_dispatch.unwrap_or(smtp.is_none());
    let dispatch = dispatch_approval(store, registry, smtp, paths, approval_id, dry_run)?;
    Ok(ApproveOutcome {
        approval: fetch_approval(store, approval_id)?,
        requires_second_approval: false,
        signoff_count,
        dispatched: dispatch.sent,
        dispatch: Some(dispatch),
        signoffs,
    })
}
