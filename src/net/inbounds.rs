//! Bind settings and the per-protocol listeners.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::net::address::{port_of, resolve_bind_address, WILDCARD_HOST};
use crate::net::listener::{BindError, ListenerFactory};
use crate::net::reconciler::{ReconcileOutcome, Reconciler, SocksOutcome, SocksReconciler};
use crate::net::Protocol;

/// LAN policy and bind hosts used when resolving listener addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSettings {
    pub allow_lan: bool,
    pub bind_address: String,
    pub redir_bind_address: String,
}

impl Default for BindSettings {
    fn default() -> Self {
        Self {
            allow_lan: false,
            bind_address: WILDCARD_HOST.to_string(),
            redir_bind_address: WILDCARD_HOST.to_string(),
        }
    }
}

/// Currently bound port per protocol; 0 when no listener is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Ports {
    pub port: u16,
    pub socks_port: u16,
    pub redir_port: u16,
}

/// Owns the bind settings and the HTTP, SOCKS (+UDP) and redirect listeners.
pub struct Inbounds {
    settings: ArcSwap<BindSettings>,
    http: Reconciler,
    socks: SocksReconciler,
    redir: Reconciler,
}

impl Inbounds {
    pub fn new(factory: Arc<dyn ListenerFactory>) -> Self {
        Self {
            settings: ArcSwap::from_pointee(BindSettings::default()),
            http: Reconciler::new(Protocol::Http, Arc::clone(&factory)),
            socks: SocksReconciler::new(Arc::clone(&factory)),
            redir: Reconciler::new(Protocol::Redir, factory),
        }
    }

    pub fn settings(&self) -> BindSettings {
        self.settings.load().as_ref().clone()
    }

    pub fn allow_lan(&self) -> bool {
        self.settings.load().allow_lan
    }

    pub fn bind_address(&self) -> String {
        self.settings.load().bind_address.clone()
    }

    pub fn redir_bind_address(&self) -> String {
        self.settings.load().redir_bind_address.clone()
    }

    pub fn set_allow_lan(&self, allow_lan: bool) {
        self.settings.rcu(|s| BindSettings { allow_lan, ..s.as_ref().clone() });
    }

    pub fn set_bind_address(&self, host: impl Into<String>) {
        let host = host.into();
        self.settings.rcu(|s| BindSettings {
            bind_address: host.clone(),
            ..s.as_ref().clone()
        });
    }

    pub fn set_redir_bind_address(&self, host: impl Into<String>) {
        let host = host.into();
        self.settings.rcu(|s| BindSettings {
            redir_bind_address: host.clone(),
            ..s.as_ref().clone()
        });
    }

    /// Resolved address for a protocol under the current settings.
    pub fn desired_address(&self, protocol: Protocol, port: u16) -> String {
        let settings = self.settings.load();
        let host = match protocol {
            Protocol::Redir => &settings.redir_bind_address,
            _ => &settings.bind_address,
        };
        resolve_bind_address(host, port, settings.allow_lan)
    }

    pub async fn recreate_http(&self, port: u16) -> Result<ReconcileOutcome, BindError> {
        let addr = self.desired_address(Protocol::Http, port);
        self.http.reconcile(&addr).await
    }

    pub async fn recreate_socks(&self, port: u16) -> Result<SocksOutcome, BindError> {
        let addr = self.desired_address(Protocol::Socks, port);
        self.socks.reconcile(&addr).await
    }

    pub async fn recreate_redir(&self, port: u16) -> Result<ReconcileOutcome, BindError> {
        let addr = self.desired_address(Protocol::Redir, port);
        self.redir.reconcile(&addr).await
    }

    /// Bound address of a protocol's listener.
    pub fn address(&self, protocol: Protocol) -> Option<String> {
        match protocol {
            Protocol::Http => self.http.address(),
            Protocol::Socks => self.socks.address(),
            Protocol::SocksUdp => self.socks.udp_address(),
            Protocol::Redir => self.redir.address(),
        }
    }

    pub fn ports(&self) -> Ports {
        let port = |p: Protocol| self.address(p).as_deref().and_then(port_of).unwrap_or(0);
        Ports {
            port: port(Protocol::Http),
            socks_port: port(Protocol::Socks),
            redir_port: port(Protocol::Redir),
        }
    }

    pub async fn close_all(&self) {
        self.http.close().await;
        self.socks.close().await;
        self.redir.close().await;
    }
}
