//! General settings: listener reconciliation and the read-back view.

use serde::Serialize;

use crate::config::GeneralSettings;
use crate::executor::patch::GeneralPatch;
use crate::net::{BindError, Inbounds, Ports, Protocol};
use crate::observability::LogLevel;
use crate::runtime::Runtime;
use crate::tunnel::Mode;

/// A listener that could not be bound during an apply.
#[derive(Debug)]
pub struct ListenerFailure {
    pub protocol: Protocol,
    pub error: BindError,
}

/// Effective general settings as reported by `GET /configs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct General {
    #[serde(flatten)]
    pub ports: Ports,
    pub redir_bind_address: String,
    pub allow_lan: bool,
    pub bind_address: String,
    pub mode: Mode,
    pub log_level: LogLevel,
    pub authentication: Vec<String>,
}

/// Read the current effective settings from each subsystem.
pub fn get_general(runtime: &Runtime) -> General {
    let inbounds = runtime.inbounds();
    let settings = inbounds.settings();

    General {
        ports: inbounds.ports(),
        redir_bind_address: settings.redir_bind_address,
        allow_lan: settings.allow_lan,
        bind_address: settings.bind_address,
        mode: runtime.tunnel().mode(),
        log_level: runtime.log().level(),
        authentication: runtime.auth().users(),
    }
}

/// Reconcile HTTP, SOCKS (TCP then UDP) and redirect against `ports`.
///
/// Bind failures are logged and returned; later listeners are still
/// reconciled.
pub async fn reconcile_listeners(inbounds: &Inbounds, ports: Ports) -> Vec<ListenerFailure> {
    let mut failures = Vec::new();

    if let Err(error) = inbounds.recreate_http(ports.port).await {
        failures.push(ListenerFailure {
            protocol: Protocol::Http,
            error,
        });
    }
    if let Err(error) = inbounds.recreate_socks(ports.socks_port).await {
        failures.push(ListenerFailure {
            protocol: Protocol::Socks,
            error,
        });
    }
    if let Err(error) = inbounds.recreate_redir(ports.redir_port).await {
        failures.push(ListenerFailure {
            protocol: Protocol::Redir,
            error,
        });
    }

    for failure in &failures {
        tracing::error!(protocol = %failure.protocol, error = %failure.error, "Start listener failed");
    }
    failures
}

/// Apply the general section of a snapshot.
pub async fn update_general(runtime: &Runtime, general: &GeneralSettings) -> Vec<ListenerFailure> {
    runtime.log().set_level(general.log_level);
    runtime.tunnel().set_mode(general.mode);

    let inbounds = runtime.inbounds();
    inbounds.set_allow_lan(general.allow_lan);
    inbounds.set_bind_address(general.bind_address.as_str());
    inbounds.set_redir_bind_address(general.redir_bind_address.as_str());

    let ports = Ports {
        port: general.port,
        socks_port: general.socks_port,
        redir_port: general.redir_port,
    };
    reconcile_listeners(inbounds, ports).await
}

/// Apply a partial update. Ports left out keep the currently bound value.
pub async fn patch_general(runtime: &Runtime, patch: GeneralPatch) -> Vec<ListenerFailure> {
    let inbounds = runtime.inbounds();

    if let Some(allow_lan) = patch.allow_lan.value() {
        inbounds.set_allow_lan(allow_lan);
    }
    if let Some(host) = patch.bind_address.value() {
        inbounds.set_bind_address(host);
    }
    if let Some(host) = patch.redir_bind_address.value() {
        inbounds.set_redir_bind_address(host);
    }

    let current = inbounds.ports();
    let ports = Ports {
        port: patch.port.value().unwrap_or(current.port),
        socks_port: patch.socks_port.value().unwrap_or(current.socks_port),
        redir_port: patch.redir_port.value().unwrap_or(current.redir_port),
    };
    let failures = reconcile_listeners(inbounds, ports).await;

    if let Some(mode) = patch.mode.value() {
        runtime.tunnel().set_mode(mode);
    }
    if let Some(level) = patch.log_level.value() {
        runtime.log().set_level(level);
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::{AuthUser, Authenticator};
    use crate::net::SocketBinder;
    use crate::observability::LogControl;

    fn runtime() -> Runtime {
        Runtime::new(Arc::new(SocketBinder::default()), LogControl::detached(LogLevel::Info))
    }

    #[test]
    fn fresh_runtime_reports_defaults() {
        let general = get_general(&runtime());
        assert_eq!(general.ports, Ports::default());
        assert_eq!(general.bind_address, "*");
        assert_eq!(general.redir_bind_address, "*");
        assert!(!general.allow_lan);
        assert_eq!(general.mode, Mode::Rule);
        assert_eq!(general.log_level, LogLevel::Info);
        assert!(general.authentication.is_empty());
    }

    #[test]
    fn serializes_with_wire_names() {
        let runtime = runtime();
        let users = [AuthUser {
            user: "alice".into(),
            pass: "pw".into(),
        }];
        runtime.auth().set_authenticator(Authenticator::new(&users));

        let json = serde_json::to_value(get_general(&runtime)).unwrap();
        assert_eq!(json["port"], 0);
        assert_eq!(json["socks-port"], 0);
        assert_eq!(json["redir-port"], 0);
        assert_eq!(json["allow-lan"], false);
        assert_eq!(json["bind-address"], "*");
        assert_eq!(json["mode"], "rule");
        assert_eq!(json["log-level"], "info");
        assert_eq!(json["authentication"], serde_json::json!(["alice"]));
    }

    #[tokio::test]
    async fn patch_sets_mode_and_level_without_listeners() {
        let runtime = runtime();
        let patch: GeneralPatch = serde_json::from_str(r#"{"mode": "direct", "log-level": "silent"}"#).unwrap();
        let failures = patch_general(&runtime, patch).await;
        assert!(failures.is_empty());
        assert_eq!(runtime.tunnel().mode(), Mode::Direct);
        assert_eq!(runtime.log().level(), LogLevel::Silent);
    }
}
