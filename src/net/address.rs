//! Bind address resolution.
//!
//! # Responsibilities
//! - Turn (host, port, allow-lan) into the address a listener binds
//! - Split and inspect address strings without touching sockets
//!
//! # Design Decisions
//! - Pure functions: no I/O, no global state
//! - `allow_lan = false` always yields the IPv6 loopback form
//! - The wildcard host `*` yields `:<port>` (all interfaces)

/// Host value meaning "all interfaces".
pub const WILDCARD_HOST: &str = "*";

/// Resolve the address a listener should bind for the given settings.
pub fn resolve_bind_address(host: &str, port: u16, allow_lan: bool) -> String {
    if !allow_lan {
        return format!("[::1]:{}", port);
    }

    if host == WILDCARD_HOST {
        format!(":{}", port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts and an empty host.
///
/// Returns `None` when the string has no port separator or the brackets are
/// unbalanced.
pub fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let port = rest[end + 1..].strip_prefix(':')?;
        return Some((host, port));
    }

    let idx = addr.rfind(':')?;
    let host = &addr[..idx];
    // An unbracketed IPv6 literal is ambiguous.
    if host.contains(':') {
        return None;
    }
    Some((host, &addr[idx + 1..]))
}

/// Numeric port of an address string, if it has one.
pub fn port_of(addr: &str) -> Option<u16> {
    split_host_port(addr).and_then(|(_, port)| port.parse().ok())
}

/// True when the address carries no usable port: `0`, empty, or unparsable.
pub fn port_is_zero(addr: &str) -> bool {
    match split_host_port(addr) {
        Some((_, port)) => port.is_empty() || port == "0",
        None => true,
    }
}

/// Translate a resolved address into something the OS resolver accepts.
///
/// `:<port>` becomes `0.0.0.0:<port>`; everything else is passed through.
pub fn socket_target(addr: &str) -> String {
    match split_host_port(addr) {
        Some(("", port)) => format!("0.0.0.0:{}", port),
        _ => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_when_lan_disallowed() {
        for host in ["*", "0.0.0.0", "192.168.1.10", "example.lan", ""] {
            assert_eq!(resolve_bind_address(host, 7890, false), "[::1]:7890");
        }
    }

    #[test]
    fn wildcard_binds_all_interfaces() {
        assert_eq!(resolve_bind_address("*", 7890, true), ":7890");
    }

    #[test]
    fn specific_host_is_kept() {
        assert_eq!(resolve_bind_address("192.168.1.10", 7891, true), "192.168.1.10:7891");
    }

    #[test]
    fn zero_port_detection() {
        assert!(port_is_zero(":0"));
        assert!(port_is_zero("[::1]:0"));
        assert!(port_is_zero("127.0.0.1:"));
        assert!(port_is_zero("garbage"));
        assert!(!port_is_zero(":7890"));
        assert!(!port_is_zero("[::1]:7890"));
    }

    #[test]
    fn split_and_port() {
        assert_eq!(split_host_port("[::1]:53"), Some(("::1", "53")));
        assert_eq!(split_host_port(":7890"), Some(("", "7890")));
        assert_eq!(split_host_port("::1:53"), None);
        assert_eq!(port_of("127.0.0.1:7892"), Some(7892));
        assert_eq!(port_of("[::1]:x"), None);
    }

    #[test]
    fn wildcard_target() {
        assert_eq!(socket_target(":7890"), "0.0.0.0:7890");
        assert_eq!(socket_target("[::1]:7890"), "[::1]:7890");
    }
}
