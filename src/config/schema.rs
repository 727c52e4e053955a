//! Configuration file schema.
//!
//! This module defines the on-disk TOML structure. Keys are kebab-case and
//! match the control API field names. Everything has a default so minimal
//! files are accepted; semantic checks live in `validation.rs`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dns::EnhancedMode;
use crate::observability::LogLevel;
use crate::tunnel::{Experimental, Mode};

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawConfig {
    /// HTTP proxy port (0 = disabled).
    pub port: u16,

    /// SOCKS5 port, TCP and UDP (0 = disabled).
    pub socks_port: u16,

    /// Transparent redirect port (0 = disabled).
    pub redir_port: u16,

    /// Host the redirect listener binds when LAN access is allowed.
    pub redir_bind_address: String,

    /// Bind all interfaces instead of loopback only.
    pub allow_lan: bool,

    /// Host the HTTP / SOCKS listeners bind when LAN access is allowed.
    pub bind_address: String,

    pub mode: Mode,

    pub log_level: LogLevel,

    /// Control API address (e.g. "127.0.0.1:9090"); empty disables it.
    pub external_controller: String,

    /// Bearer token required by the control API; empty disables auth.
    pub secret: String,

    /// Inbound credentials as "user:pass".
    pub authentication: Vec<String>,

    pub experimental: Experimental,

    pub dns: DnsEntry,

    /// Static host overrides: domain → IP.
    pub hosts: BTreeMap<String, String>,

    pub proxies: Vec<ProxyEntry>,

    pub proxy_groups: Vec<ProxyGroupEntry>,

    /// Rules as "TYPE,payload,target[,no-resolve]".
    pub rules: Vec<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            port: 0,
            socks_port: 0,
            redir_port: 0,
            redir_bind_address: "*".to_string(),
            allow_lan: false,
            bind_address: "*".to_string(),
            mode: Mode::Rule,
            log_level: LogLevel::Info,
            external_controller: String::new(),
            secret: String::new(),
            authentication: Vec::new(),
            experimental: Experimental::default(),
            dns: DnsEntry::default(),
            hosts: BTreeMap::new(),
            proxies: Vec::new(),
            proxy_groups: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// `[dns]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DnsEntry {
    pub enable: bool,

    /// UDP listen address for the local DNS server (e.g. "0.0.0.0:53").
    pub listen: String,

    pub ipv6: bool,

    pub enhanced_mode: EnhancedMode,

    pub nameserver: Vec<String>,

    pub fallback: Vec<String>,

    pub fake_ip_range: String,

    pub fallback_filter: FallbackFilterEntry,
}

impl Default for DnsEntry {
    fn default() -> Self {
        Self {
            enable: false,
            listen: String::new(),
            ipv6: false,
            enhanced_mode: EnhancedMode::Normal,
            nameserver: Vec::new(),
            fallback: Vec::new(),
            fake_ip_range: "198.18.0.1/16".to_string(),
            fallback_filter: FallbackFilterEntry::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackFilterEntry {
    pub geoip: bool,
    pub ipcidr: Vec<String>,
}

impl Default for FallbackFilterEntry {
    fn default() -> Self {
        Self {
            geoip: true,
            ipcidr: Vec::new(),
        }
    }
}

/// `[[proxies]]` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyEntry {
    pub name: String,

    /// "socks5", "http" or "ss".
    #[serde(rename = "type")]
    pub kind: String,

    pub server: String,

    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Shadowsocks cipher.
    #[serde(default)]
    pub cipher: Option<String>,

    #[serde(default)]
    pub tls: bool,

    #[serde(default)]
    pub udp: bool,
}

/// `[[proxy-groups]]` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyGroupEntry {
    pub name: String,

    /// "select", "url-test" or "fallback".
    #[serde(rename = "type")]
    pub kind: String,

    pub proxies: Vec<String>,

    /// Probe target kept for compatibility; probing connects to members directly.
    #[serde(default)]
    pub url: Option<String>,

    /// Probe interval in seconds (url-test, fallback).
    #[serde(default)]
    pub interval: u64,
}
