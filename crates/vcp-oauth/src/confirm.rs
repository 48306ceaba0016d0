// SPDX-License-Identifier: MIT OR Apache-2.0
//! User-confirmation queue preceding external dispatch.

use serde_json::json;
use uuid::Uuid;
use vcp_core::{ConfirmationStatus, validate_startup_id};
use vcp_error::{ErrorCode, VcError};
use vcp_store::{ConfirmationRow, PlatformStore};

fn storage_error(err: vcp_store::StoreError) -> VcError {
    VcError::new(ErrorCode::StorageFailure, "store access failed").with_source(err)
}

fn fetch_confirmation(
    store: &PlatformStore,
    confirmation_id: &str,
) -> Result<ConfirmationRow, VcError> {
    store
        .get_user_confirmation(confirmation_id)
        .map_err(storage_error)?
        .ok_or_else(|| {
            VcError::new(
                ErrorCode::StateNotFound,
                format!("confirmation not found: {confirmation_id}"),
            )
        })
}

/// Queue a confirmation request toward the startup's contact channel.
pub fn request_confirmation(
    store: &PlatformStore,
    startup_id: &str,
    collection_id: &str,
    channel: &str,
    message: &str,
) -> Result<ConfirmationRow, VcError> {
    let sid = validate_startup_id(startup_id)
        .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
    let confirmation_id = Uuid::new_v4().to_string();
    let channel = if channel.trim().is_empty() { "telegram" } else { channel.trim() };
    store
        .create_user_confirmation(&confirmation_id, &sid, collection_id.trim(), channel, message.trim())
        .map_err(storage_error)?;
    fetch_confirmation(store, &confirmation_id)
}

/// Record the user's answer. `response` must be `confirm` or `reject`.
pub fn respond_confirmation(
    store: &PlatformStore,
    confirmation_id: &str,
    response: &str,
    responder: &str,
    note: &str,
) -> Result<ConfirmationRow, VcError> {
    let status = match response.trim().to_lowercase().as_str() {
        "confirm" => ConfirmationStatus::Confirmed,
        "reject" => ConfirmationStatus::Rejected,
        _ => {
            return Err(VcError::new(
                ErrorCode::ProtocolMalformedRequest,
                "response must be confirm|reject",
            ));
        }
    };
    let existing = fetch_confirmation(store, confirmation_id)?;
    if existing.status != ConfirmationStatus::Pending {
        return Err(VcError::new(
            ErrorCode::StateInvalidTransition,
            format!("confirmation already {}", existing.status),
        ));
    }
    store
        .set_user_confirmation_response(
            confirmation_id,
            status,
            responder,
            &json!({ "response": response.trim().to_lowercase(), "note": note.trim() }),
        )
        .map_err(storage_error)?;
    fetch_confirmation(store, confirmation_id)
}

/// Pending confirmations, optionally per tenant.
pub fn pending_confirmations(
    store: &PlatformStore,
    startup_id: Option<&str>,
    limit: usize,
) -> Result<Vec<ConfirmationRow>, VcError> {
    store
        .list_user_confirmations(startup_id, Some(ConfirmationStatus::Pending), limit)
        .map_err(storage_error)
}

/// One confirmation by id.
pub fn confirmation_status(
    store: &PlatformStore,
    confirmation_id: &str,
) -> Result<ConfirmationRow, VcError> {
    fetch_confirmation(store, confirmation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PlatformStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PlatformStore::open(dir.path().join("vc_platform.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn request_then_confirm() {
        let (_dir, store) = store();
        let row = request_confirmation(&store, "acme", "c-1", "", "ok to send?").unwrap();
        assert_eq!(row.status, ConfirmationStatus::Pending);
        assert_eq!(row.channel, "telegram");

        let updated =
            respond_confirmation(&store, &row.confirmation_id, "confirm", "founder", "").unwrap();
        assert_eq!(updated.status, ConfirmationStatus::Confirmed);
        assert_eq!(updated.response["response"], "confirm");
    }

    #[test]
    fn double_response_is_rejected() {
        let (_dir, store) = store();
        let row = request_confirmation(&store, "acme", "", "telegram", "msg").unwrap();
        respond_confirmation(&store, &row.confirmation_id, "reject", "founder", "no").unwrap();
        let err =
            respond_confirmation(&store, &row.confirmation_id, "confirm", "founder", "").unwrap_err();
        assert_eq!(err.code, ErrorCode::StateInvalidTransition);
    }

    #[test]
    fn invalid_response_is_rejected() {
        let (_dir, store) = store();
        let row = request_confirmation(&store, "acme", "", "telegram", "msg").unwrap();
        let err =
            respond_confirmation(&store, &row.confirmation_id, "maybe", "founder", "").unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtocolMalformedRequest);
    }

    #[test]
    fn pending_listing_drops_resolved_rows() {
        let (_dir, store) = store();
        let first = request_confirmation(&store, "acme", "", "telegram", "one").unwrap();
        request_confirmation(&store, "acme", "", "telegram", "two").unwrap();
        respond_confirmation(&store, &first.confirmation_id, "confirm", "founder", "").unwrap();

        let pending = pending_confirmations(&store, Some("acme"), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message, "two");
    }
}
