//! Mirage Storage - the durable response cache.
//!
//! Served responses are keyed by request fingerprint and replayed until
//! they age out, so repeated probes see a stable fake service while each
//! response is paid for at most once.

pub mod cache;
pub mod error;
pub mod pool;
pub mod schema;

pub use cache::{Lookup, ResponseCache};
pub use error::{Result, StorageError};
pub use pool::ConnectionPool;
