//! Outbound proxy set.
//!
//! # Data Flow
//! ```text
//! [[proxies]] + [[proxy-groups]] (config)
//!     → build_proxies (resolve group members, add DIRECT / REJECT)
//!     → ProxySet (name → Arc<dyn Proxy>)
//!     → Tunnel::update_proxies (destroy old set, start new set)
//! ```
//!
//! # Design Decisions
//! - Wire protocols are external; a proxy here is a named descriptor
//! - Groups that probe members own a background task; `destroy` stops it
//! - Groups may reference proxies and other groups in any order, cycles fail

pub mod group;
pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::schema::{ProxyEntry, ProxyGroupEntry};

pub use group::{GroupKind, ProxyGroup};
pub use remote::{Direct, Reject, RemoteProxy};

pub const DIRECT: &str = "DIRECT";
pub const REJECT: &str = "REJECT";

/// Kind of an outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyKind {
    Direct,
    Reject,
    Socks5,
    Http,
    Shadowsocks,
    Select,
    UrlTest,
    Fallback,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Direct => "direct",
            ProxyKind::Reject => "reject",
            ProxyKind::Socks5 => "socks5",
            ProxyKind::Http => "http",
            ProxyKind::Shadowsocks => "ss",
            ProxyKind::Select => "select",
            ProxyKind::UrlTest => "url-test",
            ProxyKind::Fallback => "fallback",
        }
    }
}

/// An installed outbound.
pub trait Proxy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> ProxyKind;

    /// `host:port` of the upstream server, for reachability probes.
    fn endpoint(&self) -> Option<String> {
        None
    }

    /// Begin background work. Called once the proxy is installed.
    fn start(&self) {}

    /// Stop background work. Called once when the proxy is replaced.
    fn destroy(&self) {}
}

/// Installed outbounds keyed by name.
pub type ProxySet = HashMap<String, Arc<dyn Proxy>>;

/// Build the proxy set from validated configuration entries.
pub fn build_proxies(proxies: &[ProxyEntry], groups: &[ProxyGroupEntry]) -> Result<ProxySet, String> {
    let mut set: ProxySet = HashMap::new();
    set.insert(DIRECT.to_string(), Arc::new(Direct));
    set.insert(REJECT.to_string(), Arc::new(Reject));

    for entry in proxies {
        let proxy = RemoteProxy::from_entry(entry)?;
        set.insert(entry.name.clone(), Arc::new(proxy));
    }

    // Groups can reference groups declared later; resolve in passes.
    let mut pending: Vec<&ProxyGroupEntry> = groups.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut unresolved = Vec::new();

        for entry in pending {
            if entry.proxies.iter().all(|m| set.contains_key(m)) {
                let members = entry.proxies.iter().map(|m| Arc::clone(&set[m])).collect();
                let group = ProxyGroup::from_entry(entry, members)?;
                set.insert(entry.name.clone(), Arc::new(group));
            } else {
                unresolved.push(entry);
            }
        }

        if unresolved.len() == before {
            let names: Vec<&str> = unresolved.iter().map(|g| g.name.as_str()).collect();
            return Err(format!("proxy groups with unresolvable members: {}", names.join(", ")));
        }
        pending = unresolved;
    }

    Ok(set)
}
