//! SSRF protection for outbound MCP connects (§4.10, §5): reject hostnames on a
//! static blocklist or that resolve to a private/reserved address before any
//! network transport is opened.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use pi_runtime_core::RuntimeError;

/// Hostnames rejected outright, regardless of what they resolve to.
const BLOCKED_HOSTS: &[&str] = &["metadata.google.internal"];

/// Cloud metadata endpoints reachable as literal IPs.
const BLOCKED_IPS: &[&str] = &["169.254.169.254"];

/// Extracts the `host[:port]` component from an `http(s)://` or `sse://`/
/// `http+sse://` URL.
fn extract_host(url: &str) -> Option<&str> {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest)?;
    let host_port = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(after_scheme);
    // strip userinfo if present
    let host_port = host_port.rsplit_once('@').map(|(_, h)| h).unwrap_or(host_port);
    let host = if host_port.starts_with('[') {
        host_port.split(']').next().map(|h| &h[1..]).unwrap_or(host_port)
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    };
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => is_reserved_v6(v6),
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    // fc00::/7 (unique local) and fe80::/10 (link-local) are not publicly routable.
    let segments = ip.segments();
    (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
}

/// Resolves `host` to its addresses and rejects the connect if any of them, or
/// the host string itself, fall in the blocklist or a private/reserved range.
/// Runs on the blocking pool since `ToSocketAddrs::to_socket_addrs` is a
/// synchronous DNS call.
fn check_blocking(host: String) -> Result<(), RuntimeError> {
    if BLOCKED_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
        return Err(RuntimeError::ssrf_blocked(host));
    }
    if BLOCKED_IPS.contains(&host.as_str()) {
        return Err(RuntimeError::ssrf_blocked(host));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_reserved(ip) {
            return Err(RuntimeError::ssrf_blocked(host));
        }
        return Ok(());
    }

    // A bare hostname has no port; append one so `to_socket_addrs` resolves it.
    let lookup = format!("{host}:0");
    match lookup.to_socket_addrs() {
        Ok(addrs) => {
            for addr in addrs {
                if is_reserved(addr.ip()) {
                    return Err(RuntimeError::ssrf_blocked(host));
                }
            }
            Ok(())
        }
        // unresolvable hosts are left to the transport to fail with its own error
        Err(_) => Ok(()),
    }
}

/// Checks `url` for SSRF risk before an outbound `http(s)`/`sse` connect.
/// No-op for transports that don't carry a network host (stdio).
pub async fn check_url(url: &str) -> Result<(), RuntimeError> {
    let Some(host) = extract_host(url) else {
        return Ok(());
    };
    let host = host.to_string();
    tokio::task::spawn_blocking(move || check_blocking(host))
        .await
        .map_err(|_| RuntimeError::corrupt_state("ssrf check worker panicked"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_and_port() {
        assert_eq!(extract_host("https://example.com:8443/path"), Some("example.com"));
        assert_eq!(extract_host("http://example.com"), Some("example.com"));
        assert_eq!(extract_host("sse://10.0.0.1/stream"), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn rejects_loopback_literal() {
        let err = check_url("http://127.0.0.1:8080").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "ssrf_blocked");
    }

    #[tokio::test]
    async fn rejects_metadata_ip() {
        let err = check_url("http://169.254.169.254/latest/meta-data").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "ssrf_blocked");
    }

    #[tokio::test]
    async fn rejects_private_range() {
        let err = check_url("http://10.1.2.3:9000").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "ssrf_blocked");
    }

    #[tokio::test]
    async fn allows_public_literal_ip() {
        assert!(check_url("http://93.184.216.34").await.is_ok());
    }

    #[tokio::test]
    async fn stdio_targets_are_not_checked() {
        assert!(check_url("my-mcp-server --flag").await.is_ok());
    }
}
