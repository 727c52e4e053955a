//! DNS subsystem.
//!
//! # Data Flow
//! ```text
//! [dns] config
//!     → DnsConfig (validated)
//!     → Resolver::new (nameservers, fallback, ipv6, enhanced mode, pool, filter)
//!     → DnsService (default resolver + UDP listener at `listen`)
//!
//! [hosts] config
//!     → Hosts (exact + wildcard entries)
//!     → HostStore (atomic swap)
//! ```
//!
//! # Design Decisions
//! - Disabled DNS clears the resolver and stops the listener
//! - A listener start failure is reported to the caller, who records it;
//!   the resolver is left unset so DNS reads as disabled

pub mod hosts;
pub mod resolver;
pub mod server;

use ipnet::Ipv4Net;
use thiserror::Error;

pub use hosts::{HostStore, Hosts};
pub use resolver::{EnhancedMode, FallbackFilter, NameServer, Resolver, ResolverConfig};
pub use server::DnsService;

/// Errors that can occur during DNS operations.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS configuration error: {0}")]
    Config(String),

    #[error("failed to bind DNS server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// DNS section of a configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsConfig {
    pub enable: bool,
    /// Listening address; empty for resolver-only operation.
    pub listen: String,
    pub ipv6: bool,
    pub enhanced_mode: EnhancedMode,
    pub nameserver: Vec<NameServer>,
    pub fallback: Vec<NameServer>,
    pub fake_ip_range: Option<Ipv4Net>,
    pub fallback_filter: FallbackFilter,
}

impl DnsConfig {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            main: self.nameserver.clone(),
            fallback: self.fallback.clone(),
            ipv6: self.ipv6,
            enhanced_mode: self.enhanced_mode,
            pool: self.fake_ip_range,
            fallback_filter: self.fallback_filter.clone(),
        }
    }
}
