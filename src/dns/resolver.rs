//! Resolver construction.
//!
//! Holds what a resolver is built from: upstream nameservers, fallback
//! servers, IPv6 policy, enhanced mode, fake-IP pool and fallback filter.
//! Query strategies, caching and the fake-IP allocator are provided by the
//! resolution engine that consumes a [`Resolver`].

use std::net::{IpAddr, SocketAddr};

use ipnet::{IpNet, Ipv4Net};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dns::DnsError;

const DEFAULT_DNS_PORT: u16 = 53;
const DEFAULT_DOT_PORT: u16 = 853;

/// How domains are answered to local clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnhancedMode {
    #[default]
    Normal,
    FakeIp,
    RedirHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
}

/// One upstream nameserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameServer {
    pub transport: Transport,
    /// `host:port`
    pub addr: String,
}

impl FromStr for NameServer {
    type Err = DnsError;

    /// Accepts `udp://`, `tcp://` and `tls://` URLs, or a bare host with an
    /// optional port (UDP).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let with_scheme = if s.contains("://") { s.to_string() } else { format!("udp://{}", s) };
        let url = Url::parse(&with_scheme).map_err(|e| DnsError::Config(format!("nameserver {:?}: {}", s, e)))?;

        let (transport, default_port) = match url.scheme() {
            "udp" => (Transport::Udp, DEFAULT_DNS_PORT),
            "tcp" => (Transport::Tcp, DEFAULT_DNS_PORT),
            "tls" => (Transport::Tls, DEFAULT_DOT_PORT),
            other => return Err(DnsError::Config(format!("nameserver {:?}: unsupported scheme {}", s, other))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DnsError::Config(format!("nameserver {:?}: missing host", s)))?;
        let port = url.port().unwrap_or(default_port);

        Ok(Self {
            transport,
            addr: format!("{}:{}", host, port),
        })
    }
}

/// Which answers from the main servers are distrusted in favour of fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackFilter {
    pub geoip: bool,
    pub ipcidr: Vec<IpNet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    pub main: Vec<NameServer>,
    pub fallback: Vec<NameServer>,
    pub ipv6: bool,
    pub enhanced_mode: EnhancedMode,
    pub pool: Option<Ipv4Net>,
    pub fallback_filter: FallbackFilter,
}

#[derive(Debug)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Result<Self, DnsError> {
        if config.main.is_empty() {
            return Err(DnsError::Config("resolver needs at least one nameserver".into()));
        }
        if config.enhanced_mode == EnhancedMode::FakeIp {
            match config.pool {
                Some(pool) if pool.prefix_len() < 31 => {}
                _ => return Err(DnsError::Config("fake-ip mode requires an IPv4 fake-ip-range of /30 or wider".into())),
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn ipv6(&self) -> bool {
        self.config.ipv6
    }

    pub fn enhanced_mode(&self) -> EnhancedMode {
        self.config.enhanced_mode
    }

    pub fn is_fake_ip(&self, ip: IpAddr) -> bool {
        if self.config.enhanced_mode != EnhancedMode::FakeIp {
            return false;
        }
        match (self.config.pool, ip) {
            (Some(pool), IpAddr::V4(v4)) => pool.contains(&v4),
            _ => false,
        }
    }

    /// Upstream used when relaying raw queries: the first UDP main server.
    pub fn udp_upstream(&self) -> Option<SocketAddr> {
        self.config
            .main
            .iter()
            .filter(|ns| ns.transport == Transport::Udp)
            .find_map(|ns| ns.addr.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn parse_nameservers() {
        let ns: NameServer = "114.114.114.114".parse().unwrap();
        assert_eq!(ns.transport, Transport::Udp);
        assert_eq!(ns.addr, "114.114.114.114:53");

        let ns: NameServer = "tls://dns.google".parse().unwrap();
        assert_eq!(ns.transport, Transport::Tls);
        assert_eq!(ns.addr, "dns.google:853");

        let ns: NameServer = "tcp://1.1.1.1:5353".parse().unwrap();
        assert_eq!(ns.addr, "1.1.1.1:5353");

        assert!("https://dns.google/dns-query".parse::<NameServer>().is_err());
    }

    #[test]
    fn fake_ip_pool_membership() {
        let resolver = Resolver::new(ResolverConfig {
            main: vec!["8.8.8.8".parse().unwrap()],
            enhanced_mode: EnhancedMode::FakeIp,
            pool: Some("198.18.0.1/16".parse().unwrap()),
            ..Default::default()
        })
        .unwrap();
        assert!(resolver.is_fake_ip(IpAddr::V4(Ipv4Addr::new(198, 18, 200, 3))));
        assert!(!resolver.is_fake_ip(IpAddr::V4(Ipv4Addr::new(198, 19, 0, 1))));
        assert!(!resolver.is_fake_ip("::1".parse().unwrap()));
    }

    #[test]
    fn fake_ip_pool_too_small() {
        let config = ResolverConfig {
            main: vec!["8.8.8.8".parse().unwrap()],
            enhanced_mode: EnhancedMode::FakeIp,
            pool: Some("198.18.0.1/31".parse().unwrap()),
            ..Default::default()
        };
        assert!(Resolver::new(config).is_err());
    }

    #[test]
    fn fake_ip_requires_pool() {
        let config = ResolverConfig {
            main: vec!["8.8.8.8".parse().unwrap()],
            enhanced_mode: EnhancedMode::FakeIp,
            ..Default::default()
        };
        assert!(Resolver::new(config.clone()).is_err());

        let resolver = Resolver::new(ResolverConfig {
            pool: Some("198.18.0.1/16".parse().unwrap()),
            ..config
        })
        .unwrap();
        assert!(resolver.is_fake_ip("198.18.0.9".parse().unwrap()));
        assert_eq!(resolver.udp_upstream(), Some("8.8.8.8:53".parse().unwrap()));
    }
}
