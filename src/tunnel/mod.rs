//! Routing core state.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → set_mode (global / rule / direct)
//!     → update_proxies (destroy old members, install + start new)
//!     → update_rules (atomic swap)
//!     → update_experimental (resolve-failure policy)
//!
//! Traffic classification (external) reads the current snapshot of each.
//! ```
//!
//! # Design Decisions
//! - Proxies and rules are swapped whole through `arc-swap`; readers never
//!   see a half-updated list
//! - Every member of the replaced proxy set is destroyed exactly once

pub mod rules;

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::outbound::ProxySet;

pub use rules::{Rule, RuleKind};

/// How traffic is routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Global,
    #[default]
    Rule,
    Direct,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Global => "global",
            Mode::Rule => "rule",
            Mode::Direct => "direct",
        })
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(Mode::Global),
            "rule" => Ok(Mode::Rule),
            "direct" => Ok(Mode::Direct),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Experimental switches pushed into the routing core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Experimental {
    /// Tolerate domains that fail to resolve instead of failing the connection.
    pub ignore_resolve_fail: bool,
}

pub struct Tunnel {
    mode: Mutex<Mode>,
    proxies: ArcSwap<ProxySet>,
    rules: ArcSwap<Vec<Rule>>,
    ignore_resolve_fail: AtomicBool,
}

impl Tunnel {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(Mode::default()),
            proxies: ArcSwap::from_pointee(ProxySet::new()),
            rules: ArcSwap::from_pointee(Vec::new()),
            ignore_resolve_fail: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.lock().expect("mode mutex poisoned")
    }

    pub fn set_mode(&self, mode: Mode) {
        let mut current = self.mode.lock().expect("mode mutex poisoned");
        if *current != mode {
            tracing::info!(from = %*current, to = %mode, "Routing mode changed");
        }
        *current = mode;
    }

    pub fn proxies(&self) -> Arc<ProxySet> {
        self.proxies.load_full()
    }

    /// Replace the proxy set.
    ///
    /// Members of the previous set are destroyed before the new set is
    /// installed and started.
    pub fn update_proxies(&self, proxies: ProxySet) {
        let old = self.proxies.load_full();
        for proxy in old.values() {
            proxy.destroy();
        }

        let new = Arc::new(proxies);
        self.proxies.store(Arc::clone(&new));
        for proxy in new.values() {
            proxy.start();
        }
        tracing::info!(retired = old.len(), installed = new.len(), "Proxy set replaced");
    }

    pub fn rules(&self) -> Arc<Vec<Rule>> {
        self.rules.load_full()
    }

    pub fn update_rules(&self, rules: Vec<Rule>) {
        let count = rules.len();
        self.rules.store(Arc::new(rules));
        tracing::info!(count, "Rules replaced");
    }

    pub fn update_experimental(&self, experimental: &Experimental) {
        self.ignore_resolve_fail
            .store(experimental.ignore_resolve_fail, Ordering::SeqCst);
    }

    pub fn ignore_resolve_fail(&self) -> bool {
        self.ignore_resolve_fail.load(Ordering::SeqCst)
    }
}

impl Default for Tunnel {
    fn default() -> Self {
        Self::new()
    }
}
