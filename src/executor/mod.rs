//! Configuration dispatcher.
//!
//! # Data Flow
//! ```text
//! ConfigSnapshot + force
//!     → Users        (authenticator rebuilt, empty list disables auth)
//!     → General      (force only: log level, mode, bind settings, listeners)
//!     → Proxies      (old set destroyed, new set installed and started)
//!     → Rules        (atomic swap)
//!     → Dns          (disable, or new resolver + listener restart)
//!     → Hosts        (atomic swap)
//!     → Experimental (pushed into the tunnel)
//!     → ApplyReport
//! ```
//!
//! # Design Decisions
//! - Every step runs in its own failure boundary: a failure is logged,
//!   recorded in the report and the next step still runs
//! - No rollback of earlier steps
//! - Callers serialize applies; nothing here takes a global lock

pub mod general;
pub mod patch;

use std::sync::Arc;

use crate::auth::{AuthUser, Authenticator};
use crate::config::ConfigSnapshot;
use crate::dns::{DnsConfig, DnsError, Resolver};
use crate::observability::metrics;
use crate::runtime::Runtime;

pub use general::{get_general, patch_general, reconcile_listeners, update_general, General, ListenerFailure};
pub use patch::{GeneralPatch, Patch};

/// The dispatcher's steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Users,
    General,
    Proxies,
    Rules,
    Dns,
    Hosts,
    Experimental,
}

impl ApplyStep {
    pub const ORDER: [ApplyStep; 7] = [
        ApplyStep::Users,
        ApplyStep::General,
        ApplyStep::Proxies,
        ApplyStep::Rules,
        ApplyStep::Dns,
        ApplyStep::Hosts,
        ApplyStep::Experimental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStep::Users => "users",
            ApplyStep::General => "general",
            ApplyStep::Proxies => "proxies",
            ApplyStep::Rules => "rules",
            ApplyStep::Dns => "dns",
            ApplyStep::Hosts => "hosts",
            ApplyStep::Experimental => "experimental",
        }
    }
}

impl std::fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    Skipped,
    Failed(String),
}

impl StepOutcome {
    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Applied => "applied",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }
}

/// What happened during one apply.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub steps: Vec<(ApplyStep, StepOutcome)>,
    pub listener_failures: Vec<ListenerFailure>,
}

impl ApplyReport {
    pub fn outcome(&self, step: ApplyStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    /// No step failed and every listener bound.
    pub fn is_clean(&self) -> bool {
        self.listener_failures.is_empty() && self.steps.iter().all(|(_, o)| !matches!(o, StepOutcome::Failed(_)))
    }

    fn record(&mut self, step: ApplyStep, outcome: StepOutcome) {
        metrics::record_apply_step(step.as_str(), outcome.label());
        match &outcome {
            StepOutcome::Failed(reason) => tracing::error!(step = %step, error = %reason, "Apply step failed"),
            _ => tracing::debug!(step = %step, outcome = outcome.label(), "Apply step finished"),
        }
        self.steps.push((step, outcome));
    }
}

/// Apply a snapshot across every subsystem.
///
/// General settings (log level, mode, bind settings, listeners) are touched
/// only when `force` is set.
pub async fn apply(runtime: &Runtime, mut snapshot: ConfigSnapshot, force: bool) -> ApplyReport {
    let mut report = ApplyReport::default();

    for step in ApplyStep::ORDER {
        let outcome = match step {
            ApplyStep::Users => {
                update_users(runtime, &snapshot.users);
                StepOutcome::Applied
            }
            ApplyStep::General if !force => StepOutcome::Skipped,
            ApplyStep::General => {
                report.listener_failures = update_general(runtime, &snapshot.general).await;
                StepOutcome::Applied
            }
            ApplyStep::Proxies => {
                runtime.tunnel().update_proxies(std::mem::take(&mut snapshot.proxies));
                StepOutcome::Applied
            }
            ApplyStep::Rules => {
                runtime.tunnel().update_rules(std::mem::take(&mut snapshot.rules));
                StepOutcome::Applied
            }
            ApplyStep::Dns => match update_dns(runtime, &snapshot.dns).await {
                Ok(()) => StepOutcome::Applied,
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
            ApplyStep::Hosts => {
                runtime.hosts().replace(Arc::clone(&snapshot.hosts));
                StepOutcome::Applied
            }
            ApplyStep::Experimental => {
                runtime.tunnel().update_experimental(&snapshot.experimental);
                StepOutcome::Applied
            }
        };
        report.record(step, outcome);
    }

    tracing::info!(
        force,
        clean = report.is_clean(),
        listener_failures = report.listener_failures.len(),
        "Configuration applied"
    );
    report
}

fn update_users(runtime: &Runtime, users: &[AuthUser]) {
    let authenticator = Authenticator::new(users);
    if authenticator.is_none() {
        tracing::debug!("Inbound authentication disabled");
    }
    runtime.auth().set_authenticator(authenticator);
}

/// Disable DNS, or install a new resolver and (re)start the listener.
///
/// On failure the resolver is cleared and the listener stopped, so DNS
/// reads as disabled until a later apply succeeds.
async fn update_dns(runtime: &Runtime, config: &DnsConfig) -> Result<(), DnsError> {
    let dns = runtime.dns();

    if !config.enable {
        return dns.shutdown().await;
    }

    let result = start_dns(runtime, config).await;
    if result.is_err() {
        if let Err(e) = dns.shutdown().await {
            tracing::warn!(error = %e, "Failed to stop DNS after start failure");
        }
    }
    result
}

async fn start_dns(runtime: &Runtime, config: &DnsConfig) -> Result<(), DnsError> {
    let resolver = Arc::new(Resolver::new(config.resolver_config())?);
    runtime.dns().set_resolver(Some(Arc::clone(&resolver)));
    runtime.dns().recreate_server(&config.listen, Some(resolver)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::net::SocketBinder;
    use crate::observability::{LogControl, LogLevel};
    use crate::tunnel::Mode;

    fn runtime() -> Runtime {
        Runtime::new(Arc::new(SocketBinder::default()), LogControl::detached(LogLevel::Info))
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let runtime = runtime();
        let report = apply(&runtime, parse_config("").unwrap(), true).await;
        let steps: Vec<ApplyStep> = report.steps.iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, ApplyStep::ORDER);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn general_skipped_without_force() {
        let runtime = runtime();
        let snapshot = parse_config("mode = \"global\"\nlog-level = \"error\"").unwrap();
        let report = apply(&runtime, snapshot, false).await;

        assert_eq!(report.outcome(ApplyStep::General), Some(&StepOutcome::Skipped));
        assert_eq!(runtime.tunnel().mode(), Mode::Rule);
        assert_eq!(runtime.log().level(), LogLevel::Info);
    }

    #[tokio::test]
    async fn dns_failure_does_not_stop_later_steps() {
        let runtime = runtime();
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let snapshot = parse_config(&format!(
            r#"
authentication = ["bob:builder"]

[dns]
enable = true
listen = "{}"
nameserver = ["8.8.8.8"]

[hosts]
"nas.lan" = "192.168.1.5"

[experimental]
ignore-resolve-fail = true
"#,
            taken.local_addr().unwrap()
        ))
        .unwrap();

        let report = apply(&runtime, snapshot, false).await;

        assert!(matches!(report.outcome(ApplyStep::Dns), Some(StepOutcome::Failed(_))));
        assert!(!runtime.dns_enabled());
        assert_eq!(runtime.auth().users(), vec!["bob".to_string()]);
        assert_eq!(runtime.hosts().current().len(), 1);
        assert!(runtime.tunnel().ignore_resolve_fail());
    }
}
