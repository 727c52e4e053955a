//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Referential integrity: groups and rules name existing proxies
//! - Value formats: credentials, rules, nameservers, CIDRs, host entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RawConfig → Result<(), Vec<ValidationError>>
//! - Runs before a snapshot is built

use std::collections::HashSet;
use std::net::IpAddr;

use thiserror::Error;

use crate::auth::AuthUser;
use crate::config::schema::RawConfig;
use ipnet::{IpNet, Ipv4Net};

use crate::dns::{EnhancedMode, NameServer};
use crate::net::address::split_host_port;
use crate::outbound::{DIRECT, REJECT};
use crate::tunnel::Rule;

const PROXY_TYPES: &[&str] = &["socks5", "http", "ss"];
const GROUP_TYPES: &[&str] = &["select", "url-test", "fallback"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("authentication: {0}")]
    InvalidCredential(String),

    #[error("proxy name {0:?} is reserved")]
    ReservedProxyName(String),

    #[error("duplicate proxy name {0:?}")]
    DuplicateProxy(String),

    #[error("proxy {name:?}: {reason}")]
    InvalidProxy { name: String, reason: String },

    #[error("proxy group {group:?} references unknown proxy {member:?}")]
    UnknownGroupMember { group: String, member: String },

    #[error("{0}")]
    InvalidRule(String),

    #[error("rule {rule:?} targets unknown proxy {target:?}")]
    UnknownRuleTarget { rule: String, target: String },

    #[error("dns: {0}")]
    Dns(String),

    #[error("hosts: {domain:?} has invalid address {value:?}")]
    InvalidHost { domain: String, value: String },

    #[error("external-controller {0:?} is not host:port")]
    InvalidController(String),
}

/// Check a parsed file before it becomes a snapshot.
pub fn validate_config(config: &RawConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for credential in &config.authentication {
        if let Err(e) = credential.parse::<AuthUser>() {
            errors.push(ValidationError::InvalidCredential(e));
        }
    }

    let names = validate_proxies(config, &mut errors);
    validate_rules(config, &names, &mut errors);
    validate_dns(config, &mut errors);

    for (domain, value) in &config.hosts {
        if value.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidHost {
                domain: domain.clone(),
                value: value.clone(),
            });
        }
    }

    let controller = &config.external_controller;
    if !controller.is_empty() && split_host_port(controller).is_none() {
        errors.push(ValidationError::InvalidController(controller.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Returns every outbound name a rule or group may reference.
fn validate_proxies<'a>(config: &'a RawConfig, errors: &mut Vec<ValidationError>) -> HashSet<&'a str> {
    let mut names: HashSet<&str> = HashSet::from([DIRECT, REJECT]);

    for proxy in &config.proxies {
        check_name(&proxy.name, &mut names, errors);
        if !PROXY_TYPES.contains(&proxy.kind.as_str()) {
            errors.push(ValidationError::InvalidProxy {
                name: proxy.name.clone(),
                reason: format!("unknown type {:?}", proxy.kind),
            });
        }
        if proxy.server.is_empty() || proxy.port == 0 {
            errors.push(ValidationError::InvalidProxy {
                name: proxy.name.clone(),
                reason: "server and port are required".into(),
            });
        }
    }

    for group in &config.proxy_groups {
        check_name(&group.name, &mut names, errors);
        if !GROUP_TYPES.contains(&group.kind.as_str()) {
            errors.push(ValidationError::InvalidProxy {
                name: group.name.clone(),
                reason: format!("unknown group type {:?}", group.kind),
            });
        }
        if group.proxies.is_empty() {
            errors.push(ValidationError::InvalidProxy {
                name: group.name.clone(),
                reason: "group has no members".into(),
            });
        }
        if group.kind != "select" && group.interval == 0 {
            errors.push(ValidationError::InvalidProxy {
                name: group.name.clone(),
                reason: "interval must be greater than 0".into(),
            });
        }
    }

    for group in &config.proxy_groups {
        for member in &group.proxies {
            if !names.contains(member.as_str()) {
                errors.push(ValidationError::UnknownGroupMember {
                    group: group.name.clone(),
                    member: member.clone(),
                });
            }
        }
    }

    names
}

fn check_name<'a>(name: &'a str, names: &mut HashSet<&'a str>, errors: &mut Vec<ValidationError>) {
    if name == DIRECT || name == REJECT {
        errors.push(ValidationError::ReservedProxyName(name.to_string()));
    } else if !names.insert(name) {
        errors.push(ValidationError::DuplicateProxy(name.to_string()));
    }
}

fn validate_rules(config: &RawConfig, names: &HashSet<&str>, errors: &mut Vec<ValidationError>) {
    for line in &config.rules {
        match line.parse::<Rule>() {
            Ok(rule) if !names.contains(rule.target.as_str()) => {
                errors.push(ValidationError::UnknownRuleTarget {
                    rule: line.clone(),
                    target: rule.target,
                });
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidRule(e)),
        }
    }
}

fn validate_dns(config: &RawConfig, errors: &mut Vec<ValidationError>) {
    let dns = &config.dns;

    for server in dns.nameserver.iter().chain(&dns.fallback) {
        if let Err(e) = server.parse::<NameServer>() {
            errors.push(ValidationError::Dns(e.to_string()));
        }
    }
    for cidr in &dns.fallback_filter.ipcidr {
        if let Err(e) = cidr.parse::<IpNet>() {
            errors.push(ValidationError::Dns(format!("ipcidr {:?}: {}", cidr, e)));
        }
    }

    if !dns.enable {
        return;
    }
    if dns.nameserver.is_empty() {
        errors.push(ValidationError::Dns("at least one nameserver is required".into()));
    }
    if !dns.listen.is_empty() && split_host_port(&dns.listen).is_none() {
        errors.push(ValidationError::Dns(format!("listen {:?} is not host:port", dns.listen)));
    }
    if dns.enhanced_mode == EnhancedMode::FakeIp {
        match dns.fake_ip_range.parse::<Ipv4Net>() {
            Ok(pool) if pool.prefix_len() < 31 => {}
            Ok(_) => errors.push(ValidationError::Dns("fake-ip-range must be /30 or wider".into())),
            Err(_) if dns.fake_ip_range.parse::<IpNet>().is_ok() => {
                errors.push(ValidationError::Dns("fake-ip-range must be IPv4".into()))
            }
            Err(e) => errors.push(ValidationError::Dns(format!("fake-ip-range {:?}: {}", dns.fake_ip_range, e))),
        }
    }
}
