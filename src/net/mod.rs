//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Desired settings (allow-lan, bind-address, ports)
//!     → address.rs (resolve bind address, pure)
//!     → reconciler.rs (converge one protocol's listener to the address)
//!     → listener.rs (bind sockets, run accept / receive loops)
//!     → inbound.rs (hand accepted traffic to protocol handlers)
//!     → connection.rs (per-connection IDs and accounting)
//!
//! inbounds.rs owns the bind settings and the four reconcilers.
//! ```
//!
//! # Design Decisions
//! - At most one active listener per protocol
//! - Unchanged address = no-op (no socket churn)
//! - Old listener is closed before a new bind is attempted
//! - SOCKS UDP is reconciled as an explicit dependent of SOCKS TCP

use serde::Serialize;

pub mod address;
pub mod connection;
pub mod inbound;
pub mod inbounds;
pub mod listener;
pub mod reconciler;

pub use inbound::{InboundHandlers, SocketBinder};
pub use inbounds::{BindSettings, Inbounds, Ports};
pub use listener::{BindError, BoundListener, ListenerFactory};
pub use reconciler::{ReconcileOutcome, Reconciler, SocksOutcome, SocksReconciler};

/// Inbound protocols served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Http,
    Socks,
    SocksUdp,
    Redir,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Socks => "socks",
            Protocol::SocksUdp => "socks-udp",
            Protocol::Redir => "redir",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
