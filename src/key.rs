//! Bucket key derivation.
//!
//! Maps a check request and its matching policy onto the store key that
//! holds the per-caller bucket state. Pure string work: no I/O, no clock,
//! so the same inputs always land on the same bucket on every replica.

use std::collections::HashMap;
use std::net::SocketAddr;

/// Longest a caller-controlled key segment may grow, in bytes.
const MAX_SEGMENT_BYTES: usize = 256;

/// Derives the store key for one check.
///
/// The key is the colon-joined tuple `service:path:<discriminator>`:
/// `ip:<addr>` for the `"ip"` strategy, `header:<name>:<value>` for a
/// `"header:<name>"` strategy, and the shared `default` bucket for
/// anything else. Every variable segment is sanitized so callers cannot
/// inject separators that collide with another key.
pub fn bucket_key(
    service: &str,
    path: &str,
    key_strategy: &str,
    caller_ip: &str,
    headers: &HashMap<String, String>,
) -> String {
    let service = sanitize(service);
    let path = sanitize(path);

    if key_strategy == "ip" {
        let host = strip_port(caller_ip);
        return format!("{}:{}:ip:{}", service, path, sanitize(&host));
    }

    if let Some(header_name) = key_strategy.strip_prefix("header:") {
        let value = headers.get(header_name).map(String::as_str).unwrap_or("");
        return format!(
            "{}:{}:header:{}:{}",
            service,
            path,
            sanitize(header_name),
            sanitize(value)
        );
    }

    // one shared bucket for the endpoint
    format!("{}:{}:default", service, path)
}

/// Replaces `:` and whitespace with `_` and truncates to
/// [`MAX_SEGMENT_BYTES`] on a character boundary.
pub fn sanitize(segment: &str) -> String {
    let mut cleaned: String = segment
        .chars()
        .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
        .collect();

    if cleaned.len() > MAX_SEGMENT_BYTES {
        let mut end = MAX_SEGMENT_BYTES;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    cleaned
}

/// Extracts the host portion when the caller address arrives as
/// `host:port`; bare hosts pass through unchanged.
fn strip_port(caller_ip: &str) -> String {
    match caller_ip.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => caller_ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ip_strategy_key() {
        let key = bucket_key("api-gateway", "/api/login", "ip", "192.168.1.100", &headers(&[]));
        assert_eq!(key, "api-gateway:/api/login:ip:192.168.1.100");
    }

    #[test]
    fn ip_strategy_strips_port() {
        let key = bucket_key("svc", "/a", "ip", "192.168.1.100:54321", &headers(&[]));
        assert_eq!(key, "svc:/a:ip:192.168.1.100");
    }

    #[test]
    fn ip_strategy_strips_ipv6_port() {
        let key = bucket_key("svc", "/a", "ip", "[::1]:54321", &headers(&[]));
        assert_eq!(key, "svc:/a:ip:__1");
    }

    #[test]
    fn header_strategy_key() {
        let hdrs = headers(&[("X-Session-ID", "AAA")]);
        let key = bucket_key("pay", "/payment/process", "header:X-Session-ID", "1.2.3.4", &hdrs);
        assert_eq!(key, "pay:/payment/process:header:X-Session-ID:AAA");
    }

    #[test]
    fn missing_header_yields_empty_value_segment() {
        let key = bucket_key("pay", "/p", "header:X-Session-ID", "1.2.3.4", &headers(&[]));
        assert_eq!(key, "pay:/p:header:X-Session-ID:");
    }

    #[test]
    fn unknown_strategy_shares_default_bucket() {
        let a = bucket_key("svc", "/a", "global", "1.1.1.1", &headers(&[]));
        let b = bucket_key("svc", "/a", "global", "2.2.2.2", &headers(&[]));
        assert_eq!(a, "svc:/a:default");
        assert_eq!(a, b);
    }

    #[test]
    fn sanitize_replaces_separators_and_whitespace() {
        assert_eq!(sanitize("a:b c\td"), "a_b_c_d");
        assert_eq!(sanitize("plain-value_1.2"), "plain-value_1.2");
    }

    #[test]
    fn sanitize_truncates_long_segments() {
        let long = "x".repeat(1000);
        assert_eq!(sanitize(&long).len(), 256);
    }

    #[test]
    fn sanitize_truncates_on_char_boundary() {
        // 255 ASCII bytes followed by a multi-byte char straddling the cut
        let mut s = "x".repeat(255);
        s.push('é');
        let out = sanitize(&s);
        assert!(out.len() <= 256);
        assert_eq!(out, "x".repeat(255));
    }

    #[test]
    fn injected_separators_cannot_collide() {
        // "a:b"/"c" and "a"/"b:c" must stay distinct buckets
        let first = bucket_key("a:b", "c", "default", "", &headers(&[]));
        let second = bucket_key("a", "b:c", "default", "", &headers(&[]));
        assert_ne!(first, second);
    }

    #[test]
    fn header_values_with_separators_are_neutralized() {
        let hdrs = headers(&[("X-Tenant", "evil:ip:1.2.3.4")]);
        let key = bucket_key("svc", "/a", "header:X-Tenant", "9.9.9.9", &hdrs);
        assert_eq!(key, "svc:/a:header:X-Tenant:evil_ip_1.2.3.4");
    }
}
