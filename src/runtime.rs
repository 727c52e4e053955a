//! Process runtime context.
//!
//! One `Runtime` owns every subsystem the dispatcher mutates and the control
//! API reads. It is built once at start and shared as `Arc<Runtime>`; tests
//! build as many isolated instances as they need.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth::AuthStore;
use crate::dns::{DnsService, HostStore};
use crate::net::{Inbounds, ListenerFactory};
use crate::observability::LogControl;
use crate::outbound::ProxySet;
use crate::tunnel::Tunnel;

pub struct Runtime {
    inbounds: Inbounds,
    auth: AuthStore,
    tunnel: Tunnel,
    dns: DnsService,
    hosts: HostStore,
    log: LogControl,
    writer: Mutex<()>,
}

impl Runtime {
    pub fn new(factory: Arc<dyn ListenerFactory>, log: LogControl) -> Self {
        Self {
            inbounds: Inbounds::new(factory),
            auth: AuthStore::new(),
            tunnel: Tunnel::new(),
            dns: DnsService::new(),
            hosts: HostStore::new(),
            log,
            writer: Mutex::new(()),
        }
    }

    pub fn inbounds(&self) -> &Inbounds {
        &self.inbounds
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn tunnel(&self) -> &Tunnel {
        &self.tunnel
    }

    pub fn dns(&self) -> &DnsService {
        &self.dns
    }

    pub fn hosts(&self) -> &HostStore {
        &self.hosts
    }

    pub fn log(&self) -> &LogControl {
        &self.log
    }

    /// Lock held by whoever applies configuration, so applies never overlap.
    pub fn writer(&self) -> &Mutex<()> {
        &self.writer
    }

    /// True when a resolver is installed.
    pub fn dns_enabled(&self) -> bool {
        self.dns.resolver().is_some()
    }

    /// Close every listener, stop DNS and tear down the proxy set.
    pub async fn shutdown(&self) {
        self.inbounds.close_all().await;
        if let Err(e) = self.dns.shutdown().await {
            tracing::warn!(error = %e, "DNS shutdown failed");
        }
        self.tunnel.update_proxies(ProxySet::new());
        tracing::info!("Runtime stopped");
    }
}
