//! Static host overrides.
//!
//! Entries are exact domains, `*.example.com` (exactly one extra label) or
//! `+.example.com` (the domain itself and any subdomain). Exact entries win
//! over wildcards; among wildcards the longest suffix wins.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wildcard {
    /// `*.suffix`
    OneLabel,
    /// `+.suffix`
    AnyDepth,
}

#[derive(Debug, Clone, Default)]
pub struct Hosts {
    exact: HashMap<String, IpAddr>,
    wildcard: Vec<(String, Wildcard, IpAddr)>,
}

impl Hosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: &str, ip: IpAddr) -> Result<(), String> {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return Err("empty host entry".into());
        }

        if let Some(suffix) = domain.strip_prefix("*.") {
            self.push_wildcard(suffix, Wildcard::OneLabel, ip);
        } else if let Some(suffix) = domain.strip_prefix("+.") {
            self.push_wildcard(suffix, Wildcard::AnyDepth, ip);
        } else if domain.contains('*') || domain.contains('+') {
            return Err(format!("unsupported host pattern {:?}", domain));
        } else {
            self.exact.insert(domain, ip);
        }
        Ok(())
    }

    fn push_wildcard(&mut self, suffix: &str, kind: Wildcard, ip: IpAddr) {
        self.wildcard.push((suffix.to_string(), kind, ip));
        // Longest suffix first so the most specific pattern matches.
        self.wildcard.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn lookup(&self, domain: &str) -> Option<IpAddr> {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        if let Some(ip) = self.exact.get(&domain) {
            return Some(*ip);
        }

        self.wildcard.iter().find_map(|(suffix, kind, ip)| {
            if *kind == Wildcard::AnyDepth && domain == *suffix {
                return Some(*ip);
            }
            let prefix = domain.strip_suffix(suffix.as_str())?.strip_suffix('.')?;
            let matched = match kind {
                Wildcard::OneLabel => !prefix.is_empty() && !prefix.contains('.'),
                Wildcard::AnyDepth => !prefix.is_empty(),
            };
            matched.then_some(*ip)
        })
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds the active host table.
#[derive(Debug)]
pub struct HostStore {
    current: ArcSwap<Hosts>,
}

impl HostStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Hosts::new()),
        }
    }

    pub fn current(&self) -> Arc<Hosts> {
        self.current.load_full()
    }

    pub fn replace(&self, hosts: Arc<Hosts>) {
        let count = hosts.len();
        self.current.store(hosts);
        tracing::debug!(count, "Hosts replaced");
    }
}

impl Default for HostStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn exact_and_wildcards() {
        let mut hosts = Hosts::new();
        hosts.insert("router.lan", ip("192.168.1.1")).unwrap();
        hosts.insert("*.example.com", ip("10.0.0.1")).unwrap();
        hosts.insert("+.corp.internal", ip("10.0.0.2")).unwrap();

        assert_eq!(hosts.lookup("Router.LAN."), Some(ip("192.168.1.1")));
        assert_eq!(hosts.lookup("www.example.com"), Some(ip("10.0.0.1")));
        assert_eq!(hosts.lookup("a.b.example.com"), None);
        assert_eq!(hosts.lookup("example.com"), None);
        assert_eq!(hosts.lookup("corp.internal"), Some(ip("10.0.0.2")));
        assert_eq!(hosts.lookup("x.y.corp.internal"), Some(ip("10.0.0.2")));
        assert_eq!(hosts.lookup("notcorp.internal"), None);
    }

    #[test]
    fn exact_beats_wildcard() {
        let mut hosts = Hosts::new();
        hosts.insert("*.example.com", ip("10.0.0.1")).unwrap();
        hosts.insert("api.example.com", ip("10.0.0.9")).unwrap();
        assert_eq!(hosts.lookup("api.example.com"), Some(ip("10.0.0.9")));
    }

    #[test]
    fn store_swaps() {
        let store = HostStore::new();
        assert!(store.current().is_empty());
        let mut hosts = Hosts::new();
        hosts.insert("a.lan", ip("10.1.1.1")).unwrap();
        store.replace(Arc::new(hosts));
        assert_eq!(store.current().lookup("a.lan"), Some(ip("10.1.1.1")));
    }
}
