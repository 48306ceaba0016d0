// SPDX-License-Identifier: MIT OR Apache-2.0
//! User confirmations gating external dispatch.

use crate::rows::ConfirmationRow;
use crate::{PlatformStore, StoreError, now_iso, parse_json_or};
use rusqlite::{Row, params, params_from_iter};
use vcp_core::ConfirmationStatus;

fn confirmation_from_row(row: &Row<'_>) -> rusqlite::Result<ConfirmationRow> {
    let status_raw: String = row.get("status")?;
    let response_raw: String = row.get("response_json")?;
    Ok(ConfirmationRow {
        confirmation_id: row.get("confirmation_id")?,
        startup_id: row.get("startup_id")?,
        collection_id: row.get("collection_id")?,
        channel: row.get("channel")?,
        message: row.get("message")?,
        status: ConfirmationStatus::parse(&status_raw).unwrap_or(ConfirmationStatus::Pending),
        requested_at: row.get("requested_at")?,
        responded_at: row.get("responded_at")?,
        responder: row.get("responder")?,
        response: parse_json_or(&response_raw, serde_json::json!({})),
    })
}

impl PlatformStore {
    pub fn create_user_confirmation(
        &self,
        confirmation_id: &str,
        startup_id: &str,
        collection_id: &str,
        channel: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO user_confirmations(
                confirmation_id, startup_id, collection_id, channel, message,
                status, requested_at, responded_at, responder, response_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '', '', '{}')",
            params![
                confirmation_id,
                startup_id,
                collection_id,
                channel,
                message,
                ConfirmationStatus::Pending.as_str(),
                now_iso(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user_confirmation(
        &self,
        confirmation_id: &str,
    ) -> Result<Option<ConfirmationRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM user_confirmations WHERE confirmation_id = ?1")?;
        let mut rows = stmt.query_map(params![confirmation_id], confirmation_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_user_confirmations(
        &self,
        startup_id: Option<&str>,
        status: Option<ConfirmationStatus>,
        limit: usize,
    ) -> Result<Vec<ConfirmationRow>, StoreError> {
        let mut sql = "SELECT * FROM user_confirmations WHERE 1=1".to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(sid) = startup_id {
            sql.push_str(" AND startup_id = ?");
            args.push(sid.to_string());
        }
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(&format!(
            " ORDER BY requested_at DESC LIMIT {}",
            limit.clamp(1, 2000)
        ));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), confirmation_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn set_user_confirmation_response(
        &self,
        confirmation_id: &str,
        status: ConfirmationStatus,
        responder: &str,
        response: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE user_confirmations
             SET status = ?1, responded_at = ?2, responder = ?3, response_json = ?4
             WHERE confirmation_id = ?5",
            params![
                status.as_str(),
                now_iso(),
                responder.trim(),
                serde_json::to_string(response)?,
                confirmation_id,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::open_store;

    #[test]
    fn confirmation_lifecycle() {
        let (_dir, store) = open_store();
        store
            .create_user_confirmation("conf-1", "acme", "c-1", "telegram", "ok to dispatch?")
            .unwrap();

        let row = store.get_user_confirmation("conf-1").unwrap().unwrap();
        assert_eq!(row.status, ConfirmationStatus::Pending);
        assert!(row.responded_at.is_empty());

        store
            .set_user_confirmation_response(
                "conf-1",
                ConfirmationStatus::Confirmed,
                "founder",
                &serde_json::json!({"response": "confirm", "note": ""}),
            )
            .unwrap();
        let row = store.get_user_confirmation("conf-1").unwrap().unwrap();
        assert_eq!(row.status, ConfirmationStatus::Confirmed);
        assert_eq!(row.responder, "founder");
        assert!(!row.responded_at.is_empty());
    }

    #[test]
    fn pending_filter() {
        let (_dir, store) = open_store();
        store
            .create_user_confirmation("conf-1", "acme", "", "telegram", "msg")
            .unwrap();
        store
            .create_user_confirmation("conf-2", "acme", "", "telegram", "msg")
            .unwrap();
        store
            .set_user_confirmation_response(
                "conf-2",
                ConfirmationStatus::Rejected,
                "founder",
                &serde_json::json!({}),
            )
            .unwrap();

        let pending = store
            .list_user_confirmations(Some("acme"), Some(ConfirmationStatus::Pending), 10)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].confirmation_id, "conf-1");
    }
}
