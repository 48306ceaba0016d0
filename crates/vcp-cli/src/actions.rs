// SPDX-License-Identifier: MIT OR Apache-2.0
//! Action dispatch: one typed request and one JSON result per operation.

use clap::ValueEnum;
use serde::Deserialize;
use serde_json::{Value, json};
use vcp_core::{
    DocType, OauthDefaults, PlatformPaths, ScopeDecision, SmtpConfig, default_approver,
};
use vcp_crypto::KeyStore;
use vcp_error::{ErrorCode, VcError};
use vcp_registry::{ScopePolicyUpdate, TenantRegistry};
use vcp_store::PlatformStore;

/// Every operation the platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Register,
    BindFolder,
    Collect,
    Status,
    ApprovalPending,
    ApprovalApprove,
    ApprovalReject,
    ApprovalStatus,
    DispatchEmail,
    OauthConnect,
    OauthExchange,
    OauthRefresh,
    OauthStatus,
    OauthTest,
    OauthRevoke,
    SyncRun,
    ConfirmRequest,
    ConfirmRespond,
    ConfirmPending,
    ConfirmStatus,
    ScopePolicyGet,
    ScopePolicySet,
    ScopeAudits,
    RotateKey,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::BindFolder => "bind_folder",
            Action::Collect => "collect",
            Action::Status => "status",
            Action::ApprovalPending => "approval_pending",
            Action::ApprovalApprove => "approval_approve",
            Action::ApprovalReject => "approval_reject",
            Action::ApprovalStatus => "approval_status",
            Action::DispatchEmail => "dispatch_email",
            Action::OauthConnect => "oauth_connect",
            Action::OauthExchange => "oauth_exchange",
            Action::OauthRefresh => "oauth_refresh",
            Action::OauthStatus => "oauth_status",
            Action::OauthTest => "oauth_test",
            Action::OauthRevoke => "oauth_revoke",
            Action::SyncRun => "sync_run",
            Action::ConfirmRequest => "confirm_request",
            Action::ConfirmRespond => "confirm_respond",
            Action::ConfirmPending => "confirm_pending",
            Action::ConfirmStatus => "confirm_status",
            Action::ScopePolicyGet => "scope_policy_get",
            Action::ScopePolicySet => "scope_policy_set",
            Action::ScopeAudits => "scope_audits",
            Action::RotateKey => "rotate_key",
        }
    }
}

/// Explicit handles threaded through every operation.
pub struct Context {
    pub paths: PlatformPaths,
    pub registry: TenantRegistry,
    pub store: PlatformStore,
    pub keys: KeyStore,
    pub smtp: Option<SmtpConfig>,
    pub oauth_defaults: OauthDefaults,
}

impl Context {
    pub fn open(workdir: &std::path::Path) -> Result<Self, VcError> {
        let paths = PlatformPaths::new(workdir);
        let store = PlatformStore::open(paths.db_path())
            .map_err(|err| VcError::new(ErrorCode::StorageFailure, "open store failed").with_source(err))?;
        Ok(Self {
            registry: TenantRegistry::new(paths.registry_path()),
            keys: KeyStore::new(paths.key_path()),
            smtp: SmtpConfig::from_env(),
            oauth_defaults: OauthDefaults::from_env(),
            paths,
            store,
        })
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, VcError> {
    serde_json::from_value(input.clone()).map_err(|err| {
        VcError::new(ErrorCode::ProtocolMalformedRequest, format!("invalid input: {err}"))
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, VcError> {
    serde_json::to_value(value)
        .map_err(|err| VcError::new(ErrorCode::Internal, "result serialization").with_source(err))
}

fn registry_error(err: vcp_registry::RegistryError) -> VcError {
    match &err {
        vcp_registry::RegistryError::InvalidStartupId(_) => {
            VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string())
        }
        vcp_registry::RegistryError::NotFound(_) => {
            VcError::new(ErrorCode::ConfigTenantMissing, err.to_string())
        }
        _ => VcError::new(ErrorCode::StorageFailure, "registry access failed").with_source(err),
    }
}

fn storage_error(err: vcp_store::StoreError) -> VcError {
    VcError::new(ErrorCode::StorageFailure, "store access failed").with_source(err)
}

#[derive(Deserialize)]
struct RegisterInput {
    startup_id: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
struct BindFolderInput {
    startup_id: String,
    gateway_url: String,
    #[serde(default)]
    folder_alias: String,
    #[serde(default)]
    gateway_secret: String,
}

#[derive(Deserialize)]
struct CollectInput {
    startup_id: String,
    #[serde(default)]
    period: String,
    #[serde(default)]
    window_from: String,
    #[serde(default)]
    window_to: String,
    #[serde(default = "default_true")]
    include_ocr: bool,
    #[serde(default = "default_max_artifacts")]
    max_artifacts: usize,
    #[serde(default = "default_true")]
    auto_verify: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_artifacts() -> usize {
    200
}

#[derive(Deserialize)]
struct StartupIdInput {
    startup_id: String,
}

#[derive(Deserialize)]
struct OptionalStartupIdInput {
    #[serde(default)]
    startup_id: String,
}

#[derive(Deserialize)]
struct ApprovalIdInput {
    approval_id: String,
}

#[derive(Deserialize)]
struct ApproveInput {
    approval_id: String,
    #[serde(default)]
    approver: String,
    #[serde(default = "default_true")]
    auto_dispatch: bool,
    #[serde(default)]
    dry_run_dispatch: Option<bool>,
    #[serde(default)]
    force_high_risk: bool,
}

#[derive(Deserialize)]
struct RejectInput {
    approval_id: String,
    #[serde(default)]
    approver: String,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct DispatchInput {
    approval_id: String,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Deserialize)]
struct OauthStatusInput {
    startup_id: String,
    #[serde(default)]
    provider: String,
}

#[derive(Deserialize)]
struct OauthTestInput {
    connection_id: String,
    #[serde(default = "default_true")]
    auto_refresh: bool,
    #[serde(default = "default_min_valid_seconds")]
    min_valid_seconds: i64,
}

fn default_min_valid_seconds() -> i64 {
    120
}

#[derive(Deserialize)]
struct OauthRevokeInput {
    connection_id: String,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct ConfirmRequestInput {
    startup_id: String,
    #[serde(default)]
    collection_id: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ConfirmRespondInput {
    confirmation_id: String,
    response: String,
    #[serde(default)]
    responder: String,
    #[serde(default)]
    note: String,
}

#[derive(Deserialize)]
struct ConfirmPendingInput {
    #[serde(default)]
    startup_id: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Deserialize)]
struct ConfirmStatusInput {
    confirmation_id: String,
}

#[derive(Deserialize)]
struct ScopePolicySetInput {
    startup_id: String,
    #[serde(default)]
    allow_prefixes: Option<Vec<String>>,
    #[serde(default)]
    deny_patterns: Option<Vec<String>>,
    #[serde(default)]
    allowed_doc_types: Option<Vec<DocType>>,
    #[serde(default)]
    consent_reference: Option<String>,
    #[serde(default)]
    retention_days: Option<u32>,
}

#[derive(Deserialize)]
struct ScopeAuditsInput {
    startup_id: String,
    #[serde(default)]
    collection_id: String,
    #[serde(default)]
    decision: String,
    #[serde(default = "default_audit_limit")]
    limit: usize,
}

fn default_audit_limit() -> usize {
    200
}

/// Run one action and return its JSON result payload.
pub async fn run_action(ctx: &Context, action: Action, input: &Value) -> Result<Value, VcError> {
    match action {
        Action::Register => {
            let req: RegisterInput = parse_input(input)?;
            let display_name =
                if req.display_name.trim().is_empty() { req.startup_id.clone() } else { req.display_name };
            let tenant = ctx
                .registry
                .register(&req.startup_id, &display_name)
                .map_err(registry_error)?;
            to_value(&json!({ "tenant": tenant }))
        }
        Action::BindFolder => {
            let req: BindFolderInput = parse_input(input)?;
            if req.gateway_url.trim().is_empty() {
                return Err(VcError::new(
                    ErrorCode::ProtocolMalformedRequest,
                    "gateway_url is required",
                ));
            }
            let tenant = ctx
                .registry
                .bind_folder(&req.startup_id, &req.gateway_url, &req.folder_alias, &req.gateway_secret)
                .map_err(registry_error)?;
            to_value(&json!({ "tenant": tenant }))
        }
        Action::Collect => {
            let req: CollectInput = parse_input(input)?;
            let outcome = vcp_collector::collect(
                &ctx.registry,
                &ctx.store,
                &ctx.keys,
                &ctx.paths,
                &req.startup_id,
                vcp_collector::CollectOptions {
                    period: if req.period.trim().is_empty() { "7d".into() } else { req.period },
                    window_from: req.window_from,
                    window_to: req.window_to,
                    include_ocr: req.include_ocr,
                    max_artifacts: req.max_artifacts,
                    auto_verify: req.auto_verify,
                },
            )
            .await?;
            to_value(&outcome)
        }
        Action::Status => {
            let req: StartupIdInput = parse_input(input)?;
            let status = vcp_collector::tenant_status(&ctx.registry, &ctx.store, &req.startup_id)?;
            to_value(&status)
        }
        Action::ApprovalPending => {
            let req: OptionalStartupIdInput = parse_input(input)?;
            let sid = req.startup_id.trim().to_lowercase();
            let overview = vcp_approval::list_pending(
                &ctx.store,
                if sid.is_empty() { None } else { Some(sid.as_str()) },
            )?;
            to_value(&overview)
        }
        Action::ApprovalApprove => {
            let req: ApproveInput = parse_input(input)?;
            let approver =
                if req.approver.trim().is_empty() { default_approver() } else { req.approver };
            let outcome = vcp_approval::approve(
                &ctx.store,
                &ctx.registry,
                ctx.smtp.as_ref(),
                &ctx.paths,
                &req.approval_id,
                vcp_approval::ApproveOptions {
                    approver,
                    auto_dispatch: req.auto_dispatch,
                    dry_run_dispatch: req.dry_run_dispatch,
                    force_high_risk: req.force_high_risk,
                },
            )?;
            to_value(&outcome)
        }
        Action::ApprovalReject => {
            let req: RejectInput = parse_input(input)?;
            let approver =
                if req.approver.trim().is_empty() { default_approver() } else { req.approver };
            let approval =
                vcp_approval::reject(&ctx.store, &req.approval_id, &approver, &req.reason)?;
            to_value(&json!({ "approval": approval }))
        }
        Action::ApprovalStatus => {
            let req: ApprovalIdInput = parse_input(input)?;
            let detail = vcp_approval::approval_status(&ctx.store, &req.approval_id)?;
            to_value(&detail)
        }
        Action::DispatchEmail => {
            let req: DispatchInput = parse_input(input)?;
            let outcome = vcp_dispatch::dispatch_approval(
                &ctx.store,
                &ctx.registry,
                ctx.smtp.as_ref(),
                &ctx.paths,
                &req.approval_id,
                req.dry_run,
            )?;
            to_value(&outcome)
        }
        Action::OauthConnect => {
            let req: vcp_oauth::ConnectRequest = parse_input(input)?;
            let client = vcp_oauth::OAuthClient::new()?;
            let outcome =
                vcp_oauth::connect(&ctx.store, &ctx.keys, &client, &ctx.oauth_defaults, req)?;
            to_value(&outcome)
        }
        Action::OauthExchange => {
            let req: vcp_oauth::ExchangeRequest = parse_input(input)?;
            let client = vcp_oauth::OAuthClient::new()?;
            let outcome =
                vcp_oauth::exchange_code(&ctx.store, &ctx.keys, &client, &ctx.oauth_defaults, req)
                    .await?;
            to_value(&outcome)
        }
        Action::OauthRefresh => {
            let req: vcp_oauth::RefreshRequest = parse_input(input)?;
            let client = vcp_oauth::OAuthClient::new()?;
            let outcome =
                vcp_oauth::refresh_token(&ctx.store, &ctx.keys, &client, &ctx.oauth_defaults, req)
                    .await?;
            to_value(&outcome)
        }
        Action::OauthStatus => {
            let req: OauthStatusInput = parse_input(input)?;
            let provider = req.provider.trim().to_lowercase();
            let connections = vcp_oauth::connection_status(
                &ctx.store,
                &req.startup_id,
                if provider.is_empty() { None } else { Some(provider.as_str()) },
            )?;
            to_value(&json!({ "count": connections.len(), "connections": connections }))
        }
        Action::OauthTest => {
            let req: OauthTestInput = parse_input(input)?;
            let client = vcp_oauth::OAuthClient::new()?;
            let outcome = vcp_oauth::test_connection(
                &ctx.store,
                &ctx.keys,
                &client,
                &ctx.oauth_defaults,
                &req.connection_id,
                req.auto_refresh,
                req.min_valid_seconds,
            )
            .await?;
            to_value(&outcome)
        }
        Action::OauthRevoke => {
            let req: OauthRevokeInput = parse_input(input)?;
            let connection = vcp_oauth::revoke(&ctx.store, &req.connection_id, &req.reason)?;
            to_value(&json!({ "connection": connection }))
        }
        Action::SyncRun => {
            let req: vcp_oauth::SyncRunRequest = parse_input(input)?;
            let client = vcp_oauth::OAuthClient::new()?;
            let outcome =
                vcp_oauth::run_sync(&ctx.store, &ctx.keys, &client, &ctx.oauth_defaults, req)
                    .await?;
            to_value(&outcome)
        }
        Action::ConfirmRequest => {
            let req: ConfirmRequestInput = parse_input(input)?;
            let confirmation = vcp_oauth::request_confirmation(
                &ctx.store,
                &req.startup_id,
                &req.collection_id,
                &req.channel,
                &req.message,
            )?;
            to_value(&json!({ "confirmation": confirmation }))
        }
        Action::ConfirmRespond => {
            let req: ConfirmRespondInput = parse_input(input)?;
            let confirmation = vcp_oauth::respond_confirmation(
                &ctx.store,
                &req.confirmation_id,
                &req.response,
                &req.responder,
                &req.note,
            )?;
            to_value(&json!({ "confirmation": confirmation }))
        }
        Action::ConfirmPending => {
            let req: ConfirmPendingInput = parse_input(input)?;
            let sid = req.startup_id.trim().to_lowercase();
            let confirmations = vcp_oauth::pending_confirmations(
                &ctx.store,
                if sid.is_empty() { None } else { Some(sid.as_str()) },
                req.limit,
            )?;
            to_value(&json!({ "count": confirmations.len(), "confirmations": confirmations }))
        }
        Action::ConfirmStatus => {
            let req: ConfirmStatusInput = parse_input(input)?;
            let confirmation = vcp_oauth::confirmation_status(&ctx.store, &req.confirmation_id)?;
            to_value(&json!({ "confirmation": confirmation }))
        }
        Action::ScopePolicyGet => {
            let req: StartupIdInput = parse_input(input)?;
            let policy = ctx.registry.get_scope_policy(&req.startup_id).map_err(registry_error)?;
            to_value(&json!({ "scope_policy": policy }))
        }
        Action::ScopePolicySet => {
            let req: ScopePolicySetInput = parse_input(input)?;
            let tenant = ctx
                .registry
                .update_scope_policy(
                    &req.startup_id,
                    ScopePolicyUpdate {
                        allow_prefixes: req.allow_prefixes,
                        deny_patterns: req.deny_patterns,
                        allowed_doc_types: req.allowed_doc_types,
                        consent_reference: req.consent_reference,
                        retention_days: req.retention_days,
                    },
                )
                .map_err(registry_error)?;
            let scope_policy = tenant.scope_policy();
            to_value(&json!({ "tenant": tenant, "scope_policy": scope_policy }))
        }
        Action::ScopeAudits => {
            let req: ScopeAuditsInput = parse_input(input)?;
            let decision = match req.decision.trim().to_lowercase().as_str() {
                "" => None,
                "allow" => Some(ScopeDecision::Allow),
                "reject" => Some(ScopeDecision::Reject),
                other => {
                    return Err(VcError::new(
                        ErrorCode::ProtocolMalformedRequest,
                        format!("decision must be allow|reject, got {other}"),
                    ));
                }
            };
            let collection_id = req.collection_id.trim();
            let audits = ctx
                .store
                .list_scope_audits(
                    &req.startup_id.trim().to_lowercase(),
                    if collection_id.is_empty() { None } else { Some(collection_id) },
                    decision,
                    req.limit,
                )
                .map_err(storage_error)?;
            to_value(&json!({ "count": audits.len(), "audits": audits }))
        }
        Action::RotateKey => {
            let req: StartupIdInput = parse_input(input)?;
            let sid = vcp_core::validate_startup_id(&req.startup_id)
                .map_err(|err| VcError::new(ErrorCode::ProtocolMalformedRequest, err.to_string()))?;
            let rotation = ctx.keys.rotate_key(&sid).map_err(|err| {
                VcError::new(ErrorCode::CryptoFailure, "key rotation failed").with_source(err)
            })?;
            to_value(&json!({ "rotation": rotation }))
        }
    }
}
