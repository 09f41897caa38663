//! Mirage Server - listeners, request handling and event logging.
//!
//! The [`Supervisor`] runs one HTTP or TLS listener per configured port.
//! Listeners are independent: one failing to start does not stop the
//! others, and the first error is reported once every sibling has settled.
//! Every listener shares the same [`AppState`] and differs only in the port
//! it stamps into cache keys and events.

pub mod error;
mod handler;
pub mod logger;
pub mod state;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tower_http::timeout::TimeoutLayer;

use mirage_core::{Config, PortConfig, Protocol};

pub use error::{Result, ServerError};
pub use logger::EventLogger;
pub use state::{AppState, ListenerState};

/// Per-request deadline on every listener.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for in-flight requests at shutdown.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Builds the router for one listener.
pub fn build_router(state: AppState, port: u16) -> Router {
    let listener = ListenerState {
        shared: state,
        port: port.to_string(),
    };

    Router::new()
        .fallback(handler::handle)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(listener)
}

/// Runs the configured listeners and coordinates their shutdown.
pub struct Supervisor {
    config: Arc<Config>,
    state: AppState,
    /// Live server handles by port. Constructed once, written by each
    /// listener before its accept loop starts, and only snapshotted by the
    /// shutdown path - so shutdown always sees every started listener.
    servers: Arc<RwLock<HashMap<u16, Handle>>>,
}

impl Supervisor {
    pub fn new(config: Arc<Config>, state: AppState) -> Self {
        Self {
            config,
            state,
            servers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Runs all listeners until they stop.
    ///
    /// Every port is attempted; the first observed error is returned after
    /// all listeners have settled.
    pub async fn run(&self) -> Result<()> {
        let mut listeners = JoinSet::new();
        for pc in self.config.ports.clone() {
            let state = self.state.clone();
            let config = self.config.clone();
            let servers = self.servers.clone();
            listeners.spawn(async move { serve_port(state, config, pc, servers).await });
        }

        let mut first_error = None;
        while let Some(joined) = listeners.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(ServerError::Runtime(e.to_string())),
            };
            if let Err(e) = result {
                tracing::error!("{e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Gracefully shuts down every live listener with a 10-second deadline.
    /// Requests still in flight past the deadline are abandoned.
    pub fn shutdown(&self) {
        let snapshot: Vec<(u16, Handle)> = self
            .servers
            .read()
            .iter()
            .map(|(port, handle)| (*port, handle.clone()))
            .collect();

        for (port, handle) in snapshot {
            tracing::info!("shutting down server on port {port}");
            handle.graceful_shutdown(Some(SHUTDOWN_DEADLINE));
        }
    }
}

/// Binds and serves one port until shutdown.
async fn serve_port(
    state: AppState,
    config: Arc<Config>,
    pc: PortConfig,
    servers: Arc<RwLock<HashMap<u16, Handle>>>,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], pc.port));
    let service = build_router(state, pc.port).into_make_service_with_connect_info::<SocketAddr>();
    let handle = Handle::new();

    match pc.protocol {
        Protocol::Http => {
            servers.write().insert(pc.port, handle.clone());
            tracing::info!("starting HTTP server on port {}", pc.port);
            axum_server::bind(addr)
                .handle(handle)
                .serve(service)
                .await
                .map_err(|source| ServerError::Bind {
                    port: pc.port,
                    source,
                })
        }
        Protocol::Tls => {
            let profile = config.tls_profile_for(&pc)?;
            let tls = RustlsConfig::from_pem_file(&profile.certificate, &profile.key)
                .await
                .map_err(|source| ServerError::TlsLoad {
                    port: pc.port,
                    source,
                })?;

            servers.write().insert(pc.port, handle.clone());
            tracing::info!(
                "starting HTTPS server on port {} with TLS profile: {}",
                pc.port,
                pc.tls_profile.as_deref().unwrap_or_default()
            );
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(service)
                .await
                .map_err(|source| ServerError::Bind {
                    port: pc.port,
                    source,
                })
        }
    }
}
