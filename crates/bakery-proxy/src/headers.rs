//! Host parsing and forwarded-header synthesis.
//!
//! Pure functions; the server applies them per request.

use std::net::IpAddr;

use http::HeaderValue;

/// Routing key for a raw `Host` header value: port stripped, trimmed,
/// lowercased. Empty input (or missing header) yields an empty string.
pub fn normalize_host(raw: &str) -> String {
    strip_port(raw.trim()).to_lowercase()
}

/// The host part of a `Host` header, without any `:port` suffix.
/// IPv6 literals keep their brackets: `[::1]:4080` → `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rfind(':') {
            Some(idx) if is_port(&host[idx + 1..]) => &host[..idx],
            _ => host,
        }
    }
}

/// The numeric port embedded in a `Host` header, if any.
pub fn host_port(raw: &str) -> Option<u16> {
    let host = raw.trim();
    let suffix = if host.starts_with('[') {
        &host[host.find(']')? + 1..]
    } else {
        &host[host.rfind(':')?..]
    };
    let digits = suffix.strip_prefix(':')?;
    if !is_port(digits) {
        return None;
    }
    digits.parse().ok()
}

fn is_port(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Effective forwarded proto: the lowercased first comma-separated token of
/// the incoming `X-Forwarded-Proto`, or `http` when absent or empty.
pub fn forwarded_proto(existing: Option<&HeaderValue>) -> String {
    existing
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http".to_string())
}

/// Effective forwarded port: the port embedded in the original `Host`
/// header when present, else the proto's default.
pub fn forwarded_port(original_host: Option<&str>, proto: &str) -> String {
    if let Some(port) = original_host.and_then(host_port) {
        return port.to_string();
    }
    if proto == "https" { "443" } else { "80" }.to_string()
}

/// The outgoing `X-Forwarded-For`: the peer address appended to any
/// existing chain, comma-space separated.
pub fn append_forwarded_for(existing: Option<&HeaderValue>, peer: IpAddr) -> String {
    match existing
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(prior) => format!("{prior}, {peer}"),
        None => peer.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    // ── Host normalization ─────────────────────────────────────────

    #[test]
    fn normalize_strips_port_trims_and_lowercases() {
        assert_eq!(normalize_host(" My-App-S1.Localtest.ME:4080 "), "my-app-s1.localtest.me");
        assert_eq!(normalize_host("my-app-s1.localtest.me"), "my-app-s1.localtest.me");
    }

    #[test]
    fn normalize_keeps_ipv6_brackets() {
        assert_eq!(normalize_host("[::1]:4080"), "[::1]");
        assert_eq!(normalize_host("[2001:DB8::1]"), "[2001:db8::1]");
    }

    #[test]
    fn normalize_empty_stays_empty() {
        assert_eq!(normalize_host(""), "");
        assert_eq!(normalize_host("   "), "");
    }

    #[test]
    fn non_numeric_suffix_is_not_a_port() {
        assert_eq!(normalize_host("example.com:abc"), "example.com:abc");
    }

    // ── Port extraction ────────────────────────────────────────────

    #[test]
    fn extracts_port_from_hostname() {
        assert_eq!(host_port("my-app-s1.localtest.me:4080"), Some(4080));
        assert_eq!(host_port("my-app-s1.localtest.me"), None);
    }

    #[test]
    fn extracts_port_from_ipv6_literal() {
        assert_eq!(host_port("[::1]:4080"), Some(4080));
        assert_eq!(host_port("[::1]"), None);
    }

    #[test]
    fn rejects_garbage_ports() {
        assert_eq!(host_port("example.com:"), None);
        assert_eq!(host_port("example.com:12ab"), None);
        assert_eq!(host_port("example.com:99999"), None);
    }

    // ── Forwarded proto ────────────────────────────────────────────

    #[test]
    fn proto_defaults_to_http() {
        assert_eq!(forwarded_proto(None), "http");
        assert_eq!(forwarded_proto(Some(&value(""))), "http");
    }

    #[test]
    fn proto_takes_first_token_lowercased() {
        assert_eq!(forwarded_proto(Some(&value("HTTPS, http"))), "https");
        assert_eq!(forwarded_proto(Some(&value("https"))), "https");
    }

    // ── Forwarded port ─────────────────────────────────────────────

    #[test]
    fn port_prefers_host_header() {
        assert_eq!(forwarded_port(Some("app.localtest.me:4080"), "https"), "4080");
    }

    #[test]
    fn port_falls_back_to_proto_default() {
        assert_eq!(forwarded_port(Some("app.localtest.me"), "https"), "443");
        assert_eq!(forwarded_port(Some("app.localtest.me"), "http"), "80");
        assert_eq!(forwarded_port(None, "http"), "80");
    }

    // ── Forwarded for ──────────────────────────────────────────────

    #[test]
    fn forwarded_for_appends_to_chain() {
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            append_forwarded_for(Some(&value("10.0.0.1, 10.0.0.2")), peer),
            "10.0.0.1, 10.0.0.2, 127.0.0.1"
        );
    }

    #[test]
    fn forwarded_for_starts_chain_when_absent() {
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(append_forwarded_for(None, peer), "127.0.0.1");
        assert_eq!(append_forwarded_for(Some(&value("  ")), peer), "127.0.0.1");
    }
}
