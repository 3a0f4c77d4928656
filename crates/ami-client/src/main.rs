//! ami-client entry point.
//!
//! Connects to a manager interface, logs every event it receives, prints the
//! active channels once, and stays connected until Ctrl+C or until the
//! server drops the connection.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides
//!  └─ AmiClient::open()          -- greeting check + login
//!  └─ tokio::spawn(client.run()) -- the single reader
//!  └─ client.call(CoreShowChannels)
//!  └─ select! { ctrl_c, run finished }
//!  └─ client.close()
//! ```
//!
//! # Configuration precedence
//!
//! Command-line flags override the config file, which overrides the built-in
//! defaults.  `RUST_LOG` overrides the configured log level.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ami_client::infrastructure::config::{default_config_path, load_config, ClientConfig};
use ami_client::infrastructure::network::TcpConnector;
use ami_client::{AmiClient, EngineOptions};
use ami_core::domain::Listener;
use ami_core::protocol::CoreShowChannelsAction;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Asterisk Manager Interface client.
#[derive(Debug, Parser)]
#[command(
    name = "ami-client",
    about = "Connects to an Asterisk Manager Interface and logs its events",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config dir.
    #[arg(long, env = "AMI_CONFIG")]
    config: Option<PathBuf>,

    /// Manager host, overrides `[connection] host`.
    #[arg(long, env = "AMI_HOST")]
    host: Option<String>,

    /// Manager port, overrides `[connection] port`.
    #[arg(long, env = "AMI_PORT")]
    port: Option<u16>,

    /// Login user, overrides `[credentials] username`.
    #[arg(long, env = "AMI_USERNAME")]
    username: Option<String>,

    /// Login secret, overrides `[credentials] secret`.
    #[arg(long, env = "AMI_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Log at debug level, including every frame sent and received.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`.
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(username) = &self.username {
            config.credentials.username = username.clone();
        }
        if let Some(secret) = &self.secret {
            config.credentials.secret = secret.clone();
        }
        if self.debug {
            config.logging.log_level = "debug".to_string();
        }
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path().context("no --config given"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config_path()?;
    let mut config =
        load_config(&path).with_context(|| format!("loading config from {}", path.display()))?;
    cli.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    info!(
        "ami-client starting, manager={} user={}",
        config.connection.address(),
        config.credentials.username
    );

    let client = Arc::new(AmiClient::new(
        EngineOptions::from(&config),
        Arc::new(TcpConnector::new(&config.connection)),
    ));
    client.register_listener(Listener::from_fn(|event| {
        info!(event = event.name(), channel = ?event.channel(), "event");
        Ok(())
    }));

    let banner = client
        .open()
        .await
        .with_context(|| format!("connecting to {}", config.connection.address()))?;
    info!("logged in to {banner}");

    let mut runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    match client
        .call(CoreShowChannelsAction, config.connection.response_timeout())
        .await
    {
        Ok(response) => {
            let channels: Vec<&str> =
                response.events().iter().filter_map(|e| e.channel()).collect();
            info!(count = channels.len(), "active channels: {channels:?}");
        }
        Err(e) => warn!("could not list channels: {e}"),
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
            info!("received Ctrl+C, closing");
            client.close().await;
            runner.await.context("run task panicked")??;
        }
        finished = &mut runner => {
            finished.context("run task panicked")??;
        }
    }

    info!("ami-client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
