//! Mirage - an LLM-backed web honeypot.
//!
//! Listens on the configured HTTP/TLS ports, synthesizes responses to
//! whatever scanners send, replays them from the cache, and appends one
//! enriched JSON event per served request.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use mirage_core::{Config, EnrichCache, LlmClient, NullSource};
use mirage_server::{AppState, EventLogger, Supervisor};
use mirage_storage::ResponseCache;

#[derive(Debug, Parser)]
#[command(name = "mirage", version, about = "LLM-backed web honeypot")]
struct Cli {
    /// Interface to serve on (default: first non-loopback, up interface).
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// Path to the config file.
    #[arg(short = 'c', long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the response cache database.
    #[arg(long = "db", default_value = "cache.db")]
    db: PathBuf,

    /// Path to the event log.
    #[arg(short = 'o', long, default_value = "log.json")]
    output: PathBuf,

    /// Verbose mode (per-request diagnostics).
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "mirage=debug"
    } else {
        "mirage=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .init();

    let config =
        Arc::new(Config::load(&cli.config).with_context(|| {
            format!("error loading config from {:?}", cli.config)
        })?);

    let cache = ResponseCache::open(&cli.db)
        .with_context(|| format!("error opening cache database at {:?}", cli.db))?;

    let sensor = hostname::get()
        .context("error getting hostname")?
        .to_string_lossy()
        .into_owned();

    let interface = match cli.interface {
        Some(name) => name,
        None => default_interface().context("error getting default interface")?,
    };
    tracing::info!("serving on interface {interface} as sensor {sensor:?}");

    let generator = Arc::new(LlmClient::new(&config)?);
    let enrich = Arc::new(EnrichCache::new(Arc::new(NullSource)));
    let logger = EventLogger::new(&cli.output);

    let state = AppState::new(
        config.clone(),
        cache,
        generator,
        enrich,
        logger,
        sensor,
    );
    let supervisor = Arc::new(Supervisor::new(config, state));

    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("received shutdown signal, shutting down servers");
            supervisor.shutdown();
        });
    }

    supervisor.run().await?;
    tracing::info!("all servers shut down");
    Ok(())
}

/// First non-loopback interface that is up.
fn default_interface() -> anyhow::Result<String> {
    pnet::datalink::interfaces()
        .into_iter()
        .find(|iface| iface.is_up() && !iface.is_loopback())
        .map(|iface| iface.name)
        .ok_or_else(|| anyhow::anyhow!("no active non-loopback interface found"))
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
