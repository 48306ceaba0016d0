// SPDX-License-Identifier: MIT OR Apache-2.0
//! Approvals and high-risk sign-offs.

use crate::rows::{ApprovalPayload, ApprovalRow, SignoffRow};
use crate::{PlatformStore, StoreError, now_iso};
use chrono::{Duration, Utc};
use rusqlite::{Row, params, params_from_iter};
use vcp_core::{ApprovalStatus, RiskLevel};

/// Approval staged for insertion.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub approval_id: String,
    pub collection_id: String,
    pub action_type: String,
    pub payload: ApprovalPayload,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_reasons: Vec<String>,
    /// TTL in hours; values below 1 clamp to 1.
    pub expires_hours: i64,
}

fn approval_from_row(row: &Row<'_>) -> rusqlite::Result<ApprovalRow> {
    let status_raw: String = row.get("status")?;
    let payload_raw: String = row.get("payload_json")?;
    let level_raw: String = row.get("risk_level")?;
    let reasons_raw: String = row.get("risk_reasons_json")?;
    Ok(ApprovalRow {
        approval_id: row.get("approval_id")?,
        collection_id: row.get("collection_id")?,
        startup_id: row.get("startup_id")?,
        action_type: row.get("action_type")?,
        payload: serde_json::from_str(&payload_raw).unwrap_or_default(),
        status: ApprovalStatus::parse(&status_raw).unwrap_or(ApprovalStatus::Pending),
        reason: row.get("reason")?,
        requested_at: row.get("requested_at")?,
        approved_at: row.get("approved_at")?,
        dispatched_at: row.get("dispatched_at")?,
        approver: row.get("approver")?,
        expires_at: row.get("expires_at")?,
        risk_score: row.get("risk_score")?,
        risk_level: RiskLevel::parse_or_low(&level_raw),
        risk_reasons: crate::parse_string_list(&reasons_raw),
    })
}

const APPROVAL_SELECT: &str = "SELECT a.*, c.startup_id \
     FROM approvals a JOIN collections c ON c.collection_id = a.collection_id";

impl PlatformStore {
    /// Insert a pending approval with a TTL measured from now.
    pub fn create_approval(&self, new: &NewApproval) -> Result<(), StoreError> {
        let requested_at = now_iso();
        let expires_at = (Utc::now() + Duration::hours(new.expires_hours.max(1))).to_rfc3339();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO approvals(
                approval_id, collection_id, action_type, payload_json, status, reason,
                requested_at, approved_at, dispatched_at, approver, expires_at,
                risk_score, risk_level, risk_reasons_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, '', '', '', ?7, ?8, ?9, ?10)",
            params![
                new.approval_id,
                new.collection_id,
                new.action_type,
                serde_json::to_string(&new.payload)?,
                ApprovalStatus::Pending.as_str(),
                requested_at,
                expires_at,
                new.risk_score.clamp(0.0, 1.0),
                new.risk_level.as_str(),
                serde_json::to_string(&new.risk_reasons)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_approval(&self, approval_id: &str) -> Result<Option<ApprovalRow>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("{APPROVAL_SELECT} WHERE a.approval_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![approval_id], approval_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Pending approvals that have not expired, riskiest first, oldest
    /// request winning ties. Expired rows are filtered but not
    /// transitioned here; expiry is enforced lazily on the next action.
    pub fn list_pending_approvals(
        &self,
        startup_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ApprovalRow>, StoreError> {
        let mut sql = format!(
            "{APPROVAL_SELECT} WHERE a.status = 'pending' \
             AND (a.expires_at = '' OR a.expires_at > ?)"
        );
        let mut args: Vec<String> = vec![now_iso()];
        if let Some(sid) = startup_id {
            sql.push_str(" AND c.startup_id = ?");
            args.push(sid.to_string());
        }
        sql.push_str(&format!(
            " ORDER BY a.risk_score DESC, a.requested_at ASC LIMIT {}",
            limit.clamp(1, 1000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), approval_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn list_approvals(
        &self,
        startup_id: Option<&str>,
        status: Option<ApprovalStatus>,
        limit: usize,
    ) -> Result<Vec<ApprovalRow>, StoreError> {
        let mut sql = format!("{APPROVAL_SELECT} WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(sid) = startup_id {
            sql.push_str(" AND c.startup_id = ?");
            args.push(sid.to_string());
        }
        if let Some(status) = status {
            sql.push_str(" AND a.status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(&format!(
            " ORDER BY a.requested_at DESC LIMIT {}",
            limit.clamp(1, 5000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), approval_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Transition an approval, stamping `approved_at`/`dispatched_at`
    /// atomically with the status.
    pub fn update_approval_status(
        &self,
        approval_id: &str,
        status: ApprovalStatus,
        approver: &str,
        reason: &str,
    ) -> Result<(), StoreError> {
        let approved_at = match status {
            ApprovalStatus::Approved | ApprovalStatus::Dispatched => now_iso(),
            _ => String::new(),
        };
        let dispatched_at = match status {
            ApprovalStatus::Dispatched => now_iso(),
            _ => String::new(),
        };
        let conn = self.connect()?;
        conn.execute(
            "UPDATE approvals
             SET status = ?1, approver = ?2, reason = ?3, approved_at = ?4, dispatched_at = ?5
             WHERE approval_id = ?6",
            params![
                status.as_str(),
                approver.trim(),
                reason.trim(),
                approved_at,
                dispatched_at,
                approval_id,
            ],
        )?;
        Ok(())
    }

    /// Record a sign-off; duplicates per `(approval_id, approver)` are
    /// ignored, and sign-offs are never deleted.
    pub fn add_approval_signoff(&self, approval_id: &str, approver: &str) -> Result<(), StoreError> {
        let approver = approver.trim();
        if approver.is_empty() {
            return Ok(());
        }
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO approval_signoffs(approval_id, approver, created_at)
             VALUES (?1, ?2, ?3)",
            params![approval_id, approver, now_iso()],
        )?;
        Ok(())
    }

    pub fn list_approval_signoffs(&self, approval_id: &str) -> Result<Vec<SignoffRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT signoff_id, approval_id, approver, created_at
             FROM approval_signoffs WHERE approval_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![approval_id], |row| {
            Ok(SignoffRow {
                signoff_id: row.get(0)?,
                approval_id: row.get(1)?,
                approver: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
