//! herald CLI: build a dispatcher from a JSON config and send one
//! notification request through it.

use std::io::Read;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use herald_engine::{DispatchConfig, NotificationRequest, NotificationStatus};

#[derive(Parser, Debug)]
#[command(name = "herald", about = "Multichannel notification dispatcher", version)]
struct Args {
    /// Path to the dispatch configuration (JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// Path to the notification request (JSON); `-` reads stdin.
    request: String,

    /// Pretty-print the aggregate status.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(status) if status.is_success() => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            error!("{e:#}");
            process::exit(2);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<NotificationStatus> {
    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let config: DispatchConfig =
        serde_json::from_str(&config_text).context("parsing dispatch config")?;
    let dispatcher = config.build().context("building dispatcher")?;

    let request_text = if args.request == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.request)
            .with_context(|| format!("reading request {}", args.request))?
    };
    let request_value: Value =
        serde_json::from_str(&request_text).context("parsing notification request")?;
    let request = parse_request(request_value)?;

    let status = dispatcher.send(&request).await;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&status)?
    } else {
        serde_json::to_string(&status)?
    };
    println!("{rendered}");

    Ok(status)
}

/// Split a flat request object into metadata and channel payloads.
///
/// `id`, `userId` and `metadata` are request metadata; every other key is
/// treated as a channel payload (unknown channel names are ignored by the
/// dispatcher).
fn parse_request(value: Value) -> anyhow::Result<NotificationRequest> {
    let Value::Object(map) = value else {
        bail!("request must be a JSON object");
    };

    let mut request = NotificationRequest::new();
    for (key, value) in map {
        match key.as_str() {
            "id" => request.id = value.as_str().map(str::to_string),
            "userId" => request.user_id = value.as_str().map(str::to_string),
            "metadata" => request.metadata = Some(value),
            _ => {
                request.payloads.insert(key, value);
            }
        }
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_keys_are_never_channels() {
        let request = parse_request(json!({
            "id": "n-1",
            "userId": "u-2",
            "metadata": {"origin": "test"},
            "email": {"to": "a@b.c"},
            "sms": {"to": "+1"}
        }))
        .unwrap();

        assert_eq!(request.id.as_deref(), Some("n-1"));
        assert_eq!(request.user_id.as_deref(), Some("u-2"));
        assert!(request.metadata.is_some());
        assert_eq!(request.payloads.len(), 2);
        assert!(request.payloads.contains_key("email"));
        assert!(request.payloads.contains_key("sms"));
    }

    #[test]
    fn non_object_request_is_rejected() {
        assert!(parse_request(json!(["email"])).is_err());
    }
}
