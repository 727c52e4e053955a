//! Parsed configuration, ready to apply.

use std::sync::Arc;

use serde::Serialize;

use crate::auth::AuthUser;
use crate::dns::{DnsConfig, Hosts};
use crate::observability::LogLevel;
use crate::outbound::ProxySet;
use crate::tunnel::{Experimental, Mode, Rule};

/// Listener and routing settings applied only on forced applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneralSettings {
    pub port: u16,
    pub socks_port: u16,
    pub redir_port: u16,
    pub redir_bind_address: String,
    pub allow_lan: bool,
    pub bind_address: String,
    pub mode: Mode,
    pub log_level: LogLevel,
}

impl Default for GeneralSettings {
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
        }
    }
}

/// Where the control API listens and the token it requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerSettings {
    pub external_controller: String,
    pub secret: String,
}

/// One fully parsed configuration. Never mutated after it is built.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub general: GeneralSettings,
    pub controller: ControllerSettings,
    pub users: Vec<AuthUser>,
    pub proxies: ProxySet,
    pub rules: Vec<Rule>,
    pub dns: DnsConfig,
    pub hosts: Arc<Hosts>,
    pub experimental: Experimental,
}
