//! Proxy groups.
//!
//! # Responsibilities
//! - Pick a member outbound (manual select, lowest latency, first alive)
//! - Periodically probe members with a TCP connect (url-test, fallback)
//! - Stop probing when the group is destroyed

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::ProxyGroupEntry;
use crate::outbound::{Proxy, ProxyKind};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Select,
    UrlTest,
    Fallback,
}

impl GroupKind {
    fn probes(&self) -> bool {
        !matches!(self, GroupKind::Select)
    }
}

/// Background probe task handle.
#[derive(Debug)]
struct Prober {
    shutdown_tx: broadcast::Sender<()>,
}

#[derive(Debug)]
pub struct ProxyGroup {
    name: String,
    kind: GroupKind,
    members: Vec<Arc<dyn Proxy>>,
    interval: Duration,
    probe_timeout: Duration,
    /// Last measured connect latency per member name.
    latencies: Arc<DashMap<String, Duration>>,
    selected: AtomicUsize,
    prober: Mutex<Option<Prober>>,
}

impl ProxyGroup {
    pub fn new(name: impl Into<String>, kind: GroupKind, members: Vec<Arc<dyn Proxy>>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            members,
            interval,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            latencies: Arc::new(DashMap::new()),
            selected: AtomicUsize::new(0),
            prober: Mutex::new(None),
        }
    }

    pub fn from_entry(entry: &ProxyGroupEntry, members: Vec<Arc<dyn Proxy>>) -> Result<Self, String> {
        let kind = match entry.kind.as_str() {
            "select" => GroupKind::Select,
            "url-test" => GroupKind::UrlTest,
            "fallback" => GroupKind::Fallback,
            other => return Err(format!("proxy group {}: unsupported type {:?}", entry.name, other)),
        };
        if members.is_empty() {
            return Err(format!("proxy group {}: no members", entry.name));
        }
        if kind.probes() && entry.interval == 0 {
            return Err(format!("proxy group {}: interval must be > 0", entry.name));
        }

        Ok(Self::new(&entry.name, kind, members, Duration::from_secs(entry.interval)))
    }

    pub fn members(&self) -> &[Arc<dyn Proxy>] {
        &self.members
    }

    /// Choose a member for a select group. Returns false if unknown.
    pub fn select(&self, member: &str) -> bool {
        match self.members.iter().position(|m| m.name() == member) {
            Some(idx) => {
                self.selected.store(idx, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// The member traffic would currently use; `None` only for an empty group.
    pub fn now(&self) -> Option<Arc<dyn Proxy>> {
        let pick = match self.kind {
            GroupKind::Select => self.members.get(self.selected.load(Ordering::Relaxed)),
            GroupKind::UrlTest => self
                .members
                .iter()
                .filter_map(|m| self.latency_of(m.as_ref()).map(|d| (d, m)))
                .min_by_key(|(d, _)| *d)
                .map(|(_, m)| m),
            GroupKind::Fallback => self.members.iter().find(|m| self.latency_of(m.as_ref()).is_some()),
        };
        pick.or_else(|| self.members.first()).map(Arc::clone)
    }

    /// Members without an endpoint count as instantly reachable.
    fn latency_of(&self, member: &dyn Proxy) -> Option<Duration> {
        if member.endpoint().is_none() {
            return Some(Duration::ZERO);
        }
        self.latencies.get(member.name()).map(|d| *d)
    }

    pub fn is_probing(&self) -> bool {
        self.prober.lock().expect("prober mutex poisoned").is_some()
    }
}

impl Proxy for ProxyGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProxyKind {
        match self.kind {
            GroupKind::Select => ProxyKind::Select,
            GroupKind::UrlTest => ProxyKind::UrlTest,
            GroupKind::Fallback => ProxyKind::Fallback,
        }
    }

    fn start(&self) {
        if !self.kind.probes() {
            return;
        }
        let mut prober = self.prober.lock().expect("prober mutex poisoned");
        if prober.is_some() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(group = %self.name, "No runtime available, member probing disabled");
            return;
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let targets: Vec<(String, String)> = self
            .members
            .iter()
            .filter_map(|m| m.endpoint().map(|e| (m.name().to_string(), e)))
            .collect();

        tokio::spawn(probe_loop(
            self.name.clone(),
            targets,
            Arc::clone(&self.latencies),
            self.interval,
            self.probe_timeout,
            shutdown_rx,
        ));
        *prober = Some(Prober { shutdown_tx });
    }

    fn destroy(&self) {
        if let Some(prober) = self.prober.lock().expect("prober mutex poisoned").take() {
            let _ = prober.shutdown_tx.send(());
            tracing::debug!(group = %self.name, "Member probing stopped");
        }
    }
}

async fn probe_loop(
    group: String,
    targets: Vec<(String, String)>,
    latencies: Arc<DashMap<String, Duration>>,
    interval: Duration,
    timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(group = %group, interval = ?interval, members = targets.len(), "Member probing starting");
    let mut ticker = time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (name, endpoint) in &targets {
                    let started = Instant::now();
                    match time::timeout(timeout, TcpStream::connect(endpoint.as_str())).await {
                        Ok(Ok(_)) => {
                            latencies.insert(name.clone(), started.elapsed());
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(group = %group, member = %name, error = %e, "Probe failed: connection error");
                            latencies.remove(name);
                        }
                        Err(_) => {
                            tracing::debug!(group = %group, member = %name, "Probe failed: timeout");
                            latencies.remove(name);
                        }
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
