// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single JSON-in/JSON-out entry point for the VC platform.
//!
//! Every operation takes `--action <name>` plus a JSON object on
//! `--input`; results are printed as one JSON document. Failures print
//! `{"success": false, "error": ..., "code": ...}` and exit non-zero.
#![deny(unsafe_code)]

mod actions;

use actions::{Action, Context, run_action};
use clap::Parser;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vcp_error::{ErrorCode, VcError};

#[derive(Parser, Debug)]
#[command(name = "vc-platform", version, about = "VC evidence collection and approval platform")]
struct Args {
    /// Operation to run.
    #[arg(long, value_enum)]
    action: Action,

    /// JSON object with the operation's parameters.
    #[arg(long, default_value = "{}")]
    input: String,

    /// Workdir holding config/, data/, and vault/.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn parse_input(raw: &str) -> Result<Value, VcError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(json!({}));
    }
    let parsed: Value = serde_json::from_str(trimmed).map_err(|err| {
        VcError::new(ErrorCode::ProtocolMalformedRequest, format!("invalid input json: {err}"))
    })?;
    if !parsed.is_object() {
        return Err(VcError::new(
            ErrorCode::ProtocolMalformedRequest,
            "input must be a JSON object",
        ));
    }
    Ok(parsed)
}

async fn run(args: Args) -> Result<Value, VcError> {
    let input = parse_input(&args.input)?;
    let ctx = Context::open(&args.workdir)?;
    let result = run_action(&ctx, args.action, &input).await?;
    Ok(json!({
        "success": true,
        "action": args.action.as_str(),
        "result": result,
    }))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("vcp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vcp=warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(args).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_else(|_| "{}".into()));
        }
        Err(err) => {
            let rendered = json!({
                "success": false,
                "error": err.message,
                "code": err.code.as_str(),
            });
            eprintln!("{}", serde_json::to_string(&rendered).unwrap_or_else(|_| "{}".into()));
            std::process::exit(1);
        }
    }
}
