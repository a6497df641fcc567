//! Switchlink Stream Deck plugin: entry point.
//!
//! The Stream Deck application starts this binary and tells it, on the
//! command line, which local port to connect back to and how to register.
//! Everything else (which servers to talk to, which switches the buttons
//! control) arrives later as button settings over that socket.
//!
//! # Usage
//!
//! ```text
//! switchlink-plugin -port <PORT> -pluginUUID <UUID> -registerEvent <EVENT> -info <JSON>
//!                   [--config <PATH>]
//! ```
//!
//! The host passes long flags with a single dash; they are rewritten to the
//! usual `--flag` form before parsing, so both spellings work.
//!
//! # Environment variable overrides
//!
//! | Variable                    | Description                          |
//! |-----------------------------|--------------------------------------|
//! | `SWITCHLINK_PORT`           | Host WebSocket port                  |
//! | `SWITCHLINK_PLUGIN_UUID`    | Registration token                   |
//! | `SWITCHLINK_REGISTER_EVENT` | Registration event name              |
//! | `SWITCHLINK_CONFIG`         | Path to a TOML config file           |
//! | `RUST_LOG`                  | Log filter (default `info`)          |
//!
//! Logs go to stderr; the host only sees what is sent as `logMessage`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use switchlink_plugin::infrastructure::{load_config, run_host, HostConnection, WsConnector};

/// Long flags the host passes with a single leading dash.
const HOST_FLAGS: [&str; 4] = ["-port", "-pluginUUID", "-registerEvent", "-info"];

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Stream Deck plugin for smart switches on game servers.
#[derive(Debug, Parser)]
#[command(
    name = "switchlink-plugin",
    about = "Stream Deck plugin multiplexing smart-switch buttons over shared server connections",
    version
)]
struct Cli {
    /// Port of the host's local WebSocket server.
    #[arg(long, env = "SWITCHLINK_PORT")]
    port: u16,

    /// Token identifying this plugin instance to the host.
    #[arg(long = "pluginUUID", env = "SWITCHLINK_PLUGIN_UUID")]
    plugin_uuid: String,

    /// Event name to register with.
    #[arg(
        long = "registerEvent",
        default_value = "registerPlugin",
        env = "SWITCHLINK_REGISTER_EVENT"
    )]
    register_event: String,

    /// Host and device information (JSON). Only logged.
    #[arg(long, default_value = "{}")]
    info: String,

    /// Optional TOML file overriding multiplexer timings.
    #[arg(long, env = "SWITCHLINK_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    fn host_connection(&self) -> HostConnection {
        HostConnection {
            port: self.port,
            plugin_uuid: self.plugin_uuid.clone(),
            register_event: self.register_event.clone(),
        }
    }
}

/// Rewrites the host's single-dash long flags (`-port`) to `--port`.
///
/// Only the known host flags are touched, so values and short flags such as
/// `-h` pass through unchanged.
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            if HOST_FLAGS.contains(&arg.as_str()) {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// A single-threaded runtime is plenty: the plugin spends its life waiting on
/// a handful of sockets.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` wins; otherwise `info`. stdout is left alone.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_args(std::env::args()));
    let config = load_config(cli.config.as_deref()).context("loading plugin config")?;
    debug!("host info: {}", cli.info);
    info!(
        "Switchlink plugin starting: host port {}, action {}",
        cli.port, config.plugin.action_uuid
    );

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                ctrl_c.cancel();
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_host(
        cli.host_connection(),
        config,
        Arc::new(WsConnector::new()),
        shutdown,
    )
    .await?;

    info!("Switchlink plugin stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
