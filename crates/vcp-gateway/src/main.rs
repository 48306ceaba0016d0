// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vcp_gateway::{GatewayConfig, GatewayState, build_app};

#[derive(Parser, Debug)]
#[command(name = "vcp-gateway", version, about = "Startup-side evidence gateway")]
struct Args {
    /// Bind host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8742)]
    port: u16,

    /// Gateway config file (startup_id, folders, shared_secret).
    #[arg(long, default_value = "config/vc_gateway.json")]
    config: PathBuf,

    /// Enable request debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("vcp=debug")
    } else {
        EnvFilter::new("vcp=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = args
        .config
        .canonicalize()
        .with_context(|| format!("gateway config not found: {}", args.config.display()))?;
    let config = GatewayConfig::load(&config_path)
        .with_context(|| format!("load gateway config {}", config_path.display()))?;
    let startup_id = config.startup_id.clone();

    let app = build_app(Arc::new(GatewayState::new(config)));
    let bind = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, startup_id = %startup_id, "vcp-gateway listening");

    axum::serve(listener, app).await.context("serve")
}
