//! Mirage Core - shared building blocks for the LLM honeypot.
//!
//! ## Modules
//!
//! - [`config`] - Declarative configuration (ports, TLS profiles, model, cache policy)
//! - [`event`] - The event log record and the LLM response shape
//! - [`fingerprint`] - Request fingerprinting (sorted headers, SHA-256 digests, raw dump)
//! - [`llm`] - Completion-API client that synthesizes HTTP responses
//! - [`enrich`] - Bounded TTL/LRU cache over a pluggable source-IP lookup

pub mod config;
pub mod enrich;
pub mod event;
pub mod fingerprint;
pub mod llm;

pub use config::{CacheKeyPolicy, Config, ConfigError, PortConfig, Protocol, TlsProfile};
pub use enrich::{EnrichCache, EnrichError, EnrichmentInfo, LookupSource, NullSource};
pub use event::{is_ignored_header, Event, HttpRequestRecord, HttpResponseData};
pub use llm::{LlmClient, LlmError, ResponseGenerator};
