// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-oauth
//!
//! BYO-OAuth connection lifecycle for third-party SaaS ingest, plus the
//! sync-run and user-confirmation bookkeeping that precedes any external
//! dispatch. Tenant credentials and token payloads only ever touch the
//! store inside AES-256-GCM envelopes bound to their connection id.
#![deny(unsafe_code)]

mod client;
mod confirm;
mod connections;
mod sync;

pub use client::{
    DEFAULT_REDIRECT_URI, GOOGLE_AUTH_BASE, GOOGLE_TOKEN_ENDPOINT, OAuthClient,
    SUPPORTED_PROVIDERS, TokenExchange, build_token_ref, default_scopes, mask_client_id,
};
pub use confirm::{
    confirmation_status, pending_confirmations, request_confirmation, respond_confirmation,
};
pub use connections::{
    ConnectOutcome, ConnectRequest, ExchangeOutcome, ExchangeRequest, RefreshOutcome,
    RefreshRequest, TestOutcome, connect, connection_status, exchange_code, refresh_token, revoke,
    sanitize_connection, test_connection,
};
pub use sync::{SyncRunOutcome, SyncRunRequest, run_sync};
