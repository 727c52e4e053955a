//! Built-in and remote outbounds.

use crate::config::schema::ProxyEntry;
use crate::outbound::{Proxy, ProxyKind, DIRECT, REJECT};

/// Connects straight to the destination.
#[derive(Debug)]
pub struct Direct;

impl Proxy for Direct {
    fn name(&self) -> &str {
        DIRECT
    }

    fn kind(&self) -> ProxyKind {
        ProxyKind::Direct
    }
}

/// Refuses every connection.
#[derive(Debug)]
pub struct Reject;

impl Proxy for Reject {
    fn name(&self) -> &str {
        REJECT
    }

    fn kind(&self) -> ProxyKind {
        ProxyKind::Reject
    }
}

/// A proxy server reached over the network.
#[derive(Debug, Clone)]
pub struct RemoteProxy {
    name: String,
    kind: ProxyKind,
    server: String,
    port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cipher: Option<String>,
    pub tls: bool,
    pub udp: bool,
}

impl RemoteProxy {
    pub fn from_entry(entry: &ProxyEntry) -> Result<Self, String> {
        let kind = match entry.kind.as_str() {
            "socks5" => ProxyKind::Socks5,
            "http" => ProxyKind::Http,
            "ss" => ProxyKind::Shadowsocks,
            other => return Err(format!("proxy {}: unsupported type {:?}", entry.name, other)),
        };

        if kind == ProxyKind::Shadowsocks && (entry.cipher.is_none() || entry.password.is_none()) {
            return Err(format!("proxy {}: ss requires cipher and password", entry.name));
        }

        Ok(Self {
            name: entry.name.clone(),
            kind,
            server: entry.server.clone(),
            port: entry.port,
            username: entry.username.clone(),
            password: entry.password.clone(),
            cipher: entry.cipher.clone(),
            tls: entry.tls,
            udp: entry.udp,
        })
    }
}

impl Proxy for RemoteProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProxyKind {
        self.kind
    }

    fn endpoint(&self) -> Option<String> {
        if self.server.contains(':') {
            Some(format!("[{}]:{}", self.server, self.port))
        } else {
            Some(format!("{}:{}", self.server, self.port))
        }
    }
}
