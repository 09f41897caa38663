//! The request handler.
//!
//! Every request follows the same path: cache lookup, synthesis on a miss,
//! parse, filtered reply, then enrichment and event logging off the reply
//! path. For a fixed `(port, key)` inside the cache window the bytes sent
//! back are identical on every probe.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use mirage_core::event::{self, Event, HttpRequestRecord, HttpResponseData};
use mirage_core::{fingerprint, EnrichmentInfo};
use mirage_storage::Lookup;

use crate::state::{AppState, ListenerState};

const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Per-key synthesis locks.
///
/// A scan burst hitting an uncached URI would otherwise fan out into one
/// completion call per probe; the key lock coalesces them into one, and
/// waiters re-read the cache once they hold it.
#[derive(Clone, Default)]
pub(crate) struct KeyLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops the map entry once no task holds or awaits the key.
    async fn release(&self, key: &str) {
        let mut map = self.inner.lock().await;
        if let Some(lock) = map.get(key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(key);
            }
        }
    }
}

/// Serves one honeypot request end to end.
pub(crate) async fn handle(
    State(state): State<ListenerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("error reading request body from {remote}: {e}");
            Default::default()
        }
    };

    tracing::debug!("received a request for {:?} from {remote}", parts.uri.to_string());

    let record = fingerprint::record_request(
        &parts.method,
        parts.version,
        &parts.uri,
        &parts.headers,
        &bytes,
    );
    let key = state.cache_key(&record);
    let ttl = state.shared.config.cache_ttl();

    let blob = match state.shared.cache.get(&key, ttl) {
        Ok(Lookup::Hit(blob)) => blob,
        Ok(lookup) => {
            tracing::debug!(
                "request cache {} for {key:?}",
                if lookup == Lookup::Expired { "entry too old" } else { "miss" }
            );
            let dump = fingerprint::dump_request(
                &parts.method,
                parts.version,
                &parts.uri,
                &parts.headers,
                &bytes,
            );
            match synthesize(&state, &key, dump).await {
                Some(blob) => blob,
                None => return internal_error(),
            }
        }
        Err(e) => {
            tracing::error!("cache lookup failed for {key:?}: {e}");
            return internal_error();
        }
    };

    let data: HttpResponseData = match serde_json::from_slice(&blob) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!("error unmarshalling the generated response: {e}");
            return internal_error();
        }
    };

    tracing::debug!("sending the crafted response to {remote}");
    let response = build_response(&data);

    // Enrichment and the log append run detached so they never sit on the
    // attacker-visible path.
    let shared = state.shared.clone();
    let port = state.port.clone();
    tokio::spawn(async move {
        let event = make_event(&shared, remote, port, record, data).await;
        shared.logger.write(&event).await;
    });

    response
}

/// Synthesizes, caches and returns the response blob for `key`, one
/// in-flight synthesis per key. `None` means the 500 path.
async fn synthesize(state: &ListenerState, key: &str, dump: String) -> Option<Vec<u8>> {
    let guard = state.shared.locks.acquire(key).await;

    // A sibling may have filled the cache while we waited for the key lock.
    let ttl = state.shared.config.cache_ttl();
    if let Ok(Lookup::Hit(blob)) = state.shared.cache.get(key, ttl) {
        drop(guard);
        state.shared.locks.release(key).await;
        return Some(blob);
    }

    let generator = state.shared.generator.clone();
    let cache = state.shared.cache.clone();
    let locks = state.shared.locks.clone();
    let key = key.to_string();

    // Detached task: a client that hangs up early still pays for (and
    // caches) the synthesis exactly once.
    let task = tokio::spawn(async move {
        let result = match generator.generate(&dump).await {
            Ok(text) => {
                let blob = text.into_bytes();
                if let Err(e) = cache.put(&key, &blob, Utc::now()) {
                    tracing::error!("failed to cache response for {key:?}: {e}");
                }
                Some(blob)
            }
            Err(e) => {
                tracing::error!("error generating response: {e}");
                None
            }
        };
        drop(guard);
        locks.release(&key).await;
        result
    });

    task.await.ok().flatten()
}

/// Builds the outbound reply: body verbatim, headers filtered through the
/// ignored set. Malformed names or values from the model are dropped, never
/// fatal.
fn build_response(data: &HttpResponseData) -> Response {
    let mut response = Response::new(Body::from(data.body.clone()));
    for (name, value) in &data.headers {
        if event::is_ignored_header(name) {
            continue;
        }
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::debug!("dropping malformed response header {name:?}"),
        }
    }
    response
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
}

/// Assembles the event for one served request.
async fn make_event(
    shared: &AppState,
    remote: SocketAddr,
    port: String,
    http_request: HttpRequestRecord,
    http_response: HttpResponseData,
) -> Event {
    let src_ip = remote.ip();
    let info = match shared.enrich.process(src_ip).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!("error getting enrichment info for {src_ip}: {e}");
            EnrichmentInfo::default()
        }
    };

    let mut tags = Vec::new();
    if !info.known_scanner.is_empty() {
        tags.push(info.known_scanner.clone());
    }

    Event {
        timestamp: Utc::now(),
        src_ip: src_ip.to_string(),
        src_host: info.host,
        tags,
        src_port: remote.port().to_string(),
        sensor_name: shared.sensor.clone(),
        port,
        http_request,
        http_response,
    }
}
