//! Event log records.
//!
//! One [`Event`] is appended to the line-delimited JSON log for every served
//! request. The JSON key spelling (`srcIP`, `headersSorted`, ...) is part of
//! the log format and consumed by downstream tooling, so it is fixed here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response headers that are suppressed on the wire.
///
/// The framing headers are recomputed by the HTTP stack; the pseudo-header
/// names are hallucinated by some models and would be rejected anyway. All of
/// them are still preserved verbatim in the logged event.
pub const IGNORED_RESPONSE_HEADERS: [&str; 10] = [
    "content-length",
    "content-type",
    "date",
    "expires",
    "last-modified",
    "http",
    "http/1.0",
    "http/1.1",
    "http/1.2",
    "http/2.0",
];

/// Returns true when a response header must not be forwarded to the client.
pub fn is_ignored_header(name: &str) -> bool {
    IGNORED_RESPONSE_HEADERS
        .iter()
        .any(|ignored| name.eq_ignore_ascii_case(ignored))
}

/// Fingerprint of an inbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestRecord {
    pub method: String,
    pub protocol_version: String,
    /// The request URI as received.
    pub request: String,
    pub user_agent: String,
    /// `"Name: value"` pairs joined by `", "` in wire order.
    pub headers: String,
    /// Header names, canonical-cased, ascending, comma-joined.
    pub headers_sorted: String,
    /// Hex SHA-256 of `headers_sorted`.
    pub headers_sorted_sha256: String,
    pub body: String,
    /// Hex SHA-256 of the raw body bytes.
    pub body_sha256: String,
}

/// The response shape the model is asked to produce.
///
/// Headers live in a `BTreeMap` so a cached response replays its headers in
/// the same order on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseData {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// One served request, enriched and ready for the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "srcIP")]
    pub src_ip: String,
    pub src_host: String,
    pub tags: Vec<String>,
    pub src_port: String,
    pub sensor_name: String,
    pub port: String,
    pub http_request: HttpRequestRecord,
    pub http_response: HttpResponseData,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            timestamp: Utc::now(),
            src_ip: "198.51.100.7".to_string(),
            src_host: "scanner.example.net".to_string(),
            tags: vec!["acme-scanner".to_string()],
            src_port: "40312".to_string(),
            sensor_name: "sensor-1".to_string(),
            port: "8080".to_string(),
            http_request: HttpRequestRecord {
                method: "GET".to_string(),
                protocol_version: "HTTP/1.1".to_string(),
                request: "/admin".to_string(),
                user_agent: "curl/8.0".to_string(),
                headers: "Host: target, User-Agent: curl/8.0".to_string(),
                headers_sorted: "Host,User-Agent".to_string(),
                headers_sorted_sha256: "aa".repeat(32),
                body: String::new(),
                body_sha256: "bb".repeat(32),
            },
            http_response: HttpResponseData {
                headers: BTreeMap::from([("Server".to_string(), "nginx".to_string())]),
                body: "hello".to_string(),
            },
        }
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = sample_event();
        let line = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn event_uses_log_format_keys() {
        let line = serde_json::to_string(&sample_event()).unwrap();
        for key in [
            "\"srcIP\"",
            "\"srcHost\"",
            "\"srcPort\"",
            "\"sensorName\"",
            "\"httpRequest\"",
            "\"httpResponse\"",
            "\"protocolVersion\"",
            "\"headersSorted\"",
            "\"headersSortedSha256\"",
            "\"bodySha256\"",
            "\"userAgent\"",
        ] {
            assert!(line.contains(key), "missing {key} in {line}");
        }
    }

    #[test]
    fn response_data_tolerates_missing_fields() {
        let parsed: HttpResponseData = serde_json::from_str("{}").unwrap();
        assert!(parsed.headers.is_empty());
        assert!(parsed.body.is_empty());

        let parsed: HttpResponseData =
            serde_json::from_str(r#"{"body":"hi"}"#).unwrap();
        assert_eq!(parsed.body, "hi");
    }

    #[test]
    fn ignored_header_matching_is_case_insensitive() {
        assert!(is_ignored_header("Content-Length"));
        assert!(is_ignored_header("DATE"));
        assert!(is_ignored_header("http/1.1"));
        assert!(!is_ignored_header("Server"));
        assert!(!is_ignored_header("X-Trap"));
    }
}
