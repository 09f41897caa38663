//! Request fingerprinting.
//!
//! Builds the [`HttpRequestRecord`] for the event log and the raw request
//! dump that goes into the LLM prompt. The `http` crate lowercases header
//! names on the way in, so fingerprints use canonical MIME casing
//! (`x-forwarded-for` -> `X-Forwarded-For`) to stay comparable with logs
//! from stacks that preserve the wire casing.

use http::header::USER_AGENT;
use http::{HeaderMap, Method, Uri, Version};
use sha2::{Digest, Sha256};

use crate::event::HttpRequestRecord;

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Canonical MIME header casing: the first letter of every hyphen-separated
/// token is uppercased, the rest lowercased.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn version_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Sorted, comma-joined canonical header names.
fn sorted_header_names(headers: &HeaderMap) -> String {
    let mut names: Vec<String> = headers
        .keys()
        .map(|name| canonical_header_name(name.as_str()))
        .collect();
    names.sort();
    names.join(",")
}

/// `"Name: value"` pairs joined by `", "` in wire order.
fn joined_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}",
                canonical_header_name(name.as_str()),
                String::from_utf8_lossy(value.as_bytes())
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Assembles the full request fingerprint.
pub fn record_request(
    method: &Method,
    version: Version,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> HttpRequestRecord {
    let headers_sorted = sorted_header_names(headers);
    let user_agent = headers
        .get(USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();

    HttpRequestRecord {
        method: method.to_string(),
        protocol_version: version_name(version).to_string(),
        request: uri.to_string(),
        user_agent,
        headers: joined_headers(headers),
        headers_sorted_sha256: sha256_hex(headers_sorted.as_bytes()),
        headers_sorted,
        body: String::from_utf8_lossy(body).into_owned(),
        body_sha256: sha256_hex(body),
    }
}

/// Renders the raw request as text for prompt substitution: request line,
/// headers in wire order, blank line, body.
pub fn dump_request(
    method: &Method,
    version: Version,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> String {
    let mut dump = format!("{} {} {}\r\n", method, uri, version_name(version));
    for (name, value) in headers {
        dump.push_str(&format!(
            "{}: {}\r\n",
            canonical_header_name(name.as_str()),
            String::from_utf8_lossy(value.as_bytes())
        ));
    }
    dump.push_str("\r\n");
    dump.push_str(&String::from_utf8_lossy(body));
    dump
}
