use std::net::IpAddr;

/// Extract the client IP from an `X-Forwarded-For` header value. Proxies append, so the first entry is the
/// original client.
pub fn x_forwarded_for_ip(value: &str) -> Option<IpAddr> {
    value.split(',').next().and_then(|s| s.trim().parse().ok())
}

/// Extract the client IP from a `Forwarded` header value (RFC 7239), e.g. `for=203.0.113.60;proto=https`.
/// Quoted forms and an optional port are handled; anything else yields `None`.
pub fn forwarded_header_ip(value: &str) -> Option<IpAddr> {
    let token = value
        .split(';')
        .flat_map(|part| part.split(','))
        .map(str::trim)
        .find_map(|part| part.strip_prefix("for=").or_else(|| part.strip_prefix("For=")))?;
    let token = token.trim_matches('"');
    // IPv6 forms arrive as "[2001:db8::1]:4711"
    if let Some(stripped) = token.strip_prefix('[') {
        let end = stripped.find(']')?;
        return stripped[..end].parse().ok();
    }
    token.parse().or_else(|_| token.rsplit_once(':').map(|(ip, _)| ip).unwrap_or(token).parse()).ok()
}
