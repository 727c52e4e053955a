//! Configuration loading from disk.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::auth::AuthUser;
use crate::config::schema::RawConfig;
use crate::config::snapshot::{ConfigSnapshot, ControllerSettings, GeneralSettings};
use crate::config::validation::{validate_config, ValidationError};
use ipnet::IpNet;

use crate::dns::{DnsConfig, DnsError, FallbackFilter, Hosts, NameServer};
use crate::outbound::build_proxies;
use crate::tunnel::Rule;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Build error: {0}")]
    Build(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load, validate and build a snapshot from a TOML file.
pub fn load_config(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse, validate and build a snapshot from TOML text.
pub fn parse_config(content: &str) -> Result<ConfigSnapshot, ConfigError> {
    let raw: RawConfig = toml::from_str(content)?;
    validate_config(&raw).map_err(ConfigError::Validation)?;
    build_snapshot(raw)
}

fn build_snapshot(raw: RawConfig) -> Result<ConfigSnapshot, ConfigError> {
    let users: Vec<AuthUser> = raw
        .authentication
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()
        .map_err(ConfigError::Build)?;

    let proxies = build_proxies(&raw.proxies, &raw.proxy_groups).map_err(ConfigError::Build)?;

    let rules: Vec<Rule> = raw
        .rules
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()
        .map_err(ConfigError::Build)?;

    let dns = build_dns(&raw)?;

    let mut hosts = Hosts::new();
    for (domain, value) in &raw.hosts {
        let ip: IpAddr = value
            .parse()
            .map_err(|_| ConfigError::Build(format!("host {} has invalid address {}", domain, value)))?;
        hosts.insert(domain, ip).map_err(ConfigError::Build)?;
    }

    Ok(ConfigSnapshot {
        general: GeneralSettings {
            port: raw.port,
            socks_port: raw.socks_port,
            redir_port: raw.redir_port,
            redir_bind_address: raw.redir_bind_address,
            allow_lan: raw.allow_lan,
            bind_address: raw.bind_address,
            mode: raw.mode,
            log_level: raw.log_level,
        },
        controller: ControllerSettings {
            external_controller: raw.external_controller,
            secret: raw.secret,
        },
        users,
        proxies,
        rules,
        dns,
        hosts: Arc::new(hosts),
        experimental: raw.experimental,
    })
}

fn build_dns(raw: &RawConfig) -> Result<DnsConfig, ConfigError> {
    let entry = &raw.dns;
    let build = |e: DnsError| ConfigError::Build(e.to_string());

    let nameserver: Vec<NameServer> = entry.nameserver.iter().map(|s| s.parse()).collect::<Result<Vec<_>, _>>().map_err(build)?;
    let fallback: Vec<NameServer> = entry.fallback.iter().map(|s| s.parse()).collect::<Result<Vec<_>, _>>().map_err(build)?;
    let ipcidr: Vec<IpNet> = entry
        .fallback_filter
        .ipcidr
        .iter()
        .map(|s| s.parse::<IpNet>().map_err(|e| ConfigError::Build(format!("ipcidr {:?}: {}", s, e))))
        .collect::<Result<Vec<_>, _>>()?;
    // The pool only matters in fake-ip mode; a bad range elsewhere is ignored.
    let fake_ip_range = entry.fake_ip_range.parse().ok();

    Ok(DnsConfig {
        enable: entry.enable,
        listen: entry.listen.clone(),
        ipv6: entry.ipv6,
        enhanced_mode: entry.enhanced_mode,
        nameserver,
        fallback,
        fake_ip_range,
        fallback_filter: FallbackFilter {
            geoip: entry.fallback_filter.geoip,
            ipcidr,
        },
    })
}
