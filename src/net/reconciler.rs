//! Listener reconciliation.
//!
//! A [`Reconciler`] owns at most one listener for its protocol and converges
//! it toward a desired address:
//!
//! ```text
//! same address            → no-op
//! different address       → close old, then bind new
//! port 0 / no port        → close old, stay unbound
//! bind failure            → stay unbound, return the error
//! ```
//!
//! [`SocksReconciler`] pairs the SOCKS TCP listener with its UDP relay so the
//! dependency is one explicit composite step.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::net::address::port_is_zero;
use crate::net::listener::{BindError, BoundListener, ListenerFactory};
use crate::net::Protocol;
use crate::observability::metrics;

/// What a reconcile call did to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Already bound at the desired address; nothing touched.
    Unchanged,
    /// A new listener was bound (any previous one was closed first).
    Bound,
    /// A previous listener was closed and none is wanted.
    Closed,
    /// No listener before, none wanted.
    Idle,
}

pub struct Reconciler {
    protocol: Protocol,
    factory: Arc<dyn ListenerFactory>,
    active: Mutex<Option<Box<dyn BoundListener>>>,
    /// Mirror of the active listener's address for lock-free reads.
    address: ArcSwapOption<String>,
}

impl Reconciler {
    pub fn new(protocol: Protocol, factory: Arc<dyn ListenerFactory>) -> Self {
        Self {
            protocol,
            factory,
            active: Mutex::new(None),
            address: ArcSwapOption::empty(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Converge the listener toward `desired`.
    pub async fn reconcile(&self, desired: &str) -> Result<ReconcileOutcome, BindError> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.address() == desired {
                tracing::debug!(protocol = %self.protocol, address = %desired, "Listener unchanged");
                return Ok(ReconcileOutcome::Unchanged);
            }
        }

        let closed = match active.take() {
            Some(old) => {
                self.address.store(None);
                old.close().await;
                metrics::record_listener_active(self.protocol, false);
                true
            }
            None => false,
        };

        if port_is_zero(desired) {
            return Ok(if closed { ReconcileOutcome::Closed } else { ReconcileOutcome::Idle });
        }

        match self.factory.bind(self.protocol, desired).await {
            Ok(listener) => {
                self.address.store(Some(Arc::new(listener.address().to_string())));
                *active = Some(listener);
                metrics::record_listener_bind(self.protocol, true);
                metrics::record_listener_active(self.protocol, true);
                Ok(ReconcileOutcome::Bound)
            }
            Err(e) => {
                metrics::record_listener_bind(self.protocol, false);
                Err(e)
            }
        }
    }

    /// Address of the active listener, if any.
    pub fn address(&self) -> Option<String> {
        self.address.load_full().map(|a| a.as_ref().clone())
    }

    /// Close the active listener. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if let Some(old) = active.take() {
            self.address.store(None);
            old.close().await;
            metrics::record_listener_active(self.protocol, false);
        }
    }
}

/// Result of reconciling the SOCKS pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocksOutcome {
    pub tcp: ReconcileOutcome,
    pub udp: ReconcileOutcome,
}

/// SOCKS TCP listener plus its dependent UDP relay.
pub struct SocksReconciler {
    tcp: Reconciler,
    udp: Reconciler,
}

impl SocksReconciler {
    pub fn new(factory: Arc<dyn ListenerFactory>) -> Self {
        Self {
            tcp: Reconciler::new(Protocol::Socks, Arc::clone(&factory)),
            udp: Reconciler::new(Protocol::SocksUdp, factory),
        }
    }

    /// Reconcile TCP, then UDP at the same address.
    ///
    /// When the TCP bind fails the UDP relay is closed as well, so SOCKS is
    /// never left serving UDP alone.
    pub async fn reconcile(&self, desired: &str) -> Result<SocksOutcome, BindError> {
        let tcp = match self.tcp.reconcile(desired).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.udp.close().await;
                return Err(e);
            }
        };
        let udp = self.udp.reconcile(desired).await?;
        Ok(SocksOutcome { tcp, udp })
    }

    pub fn address(&self) -> Option<String> {
        self.tcp.address()
    }

    pub fn udp_address(&self) -> Option<String> {
        self.udp.address()
    }

    pub async fn close(&self) {
        self.tcp.close().await;
        self.udp.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::SocketBinder;

    #[tokio::test]
    async fn zero_port_leaves_nothing_bound() {
        let reconciler = Reconciler::new(Protocol::Http, Arc::new(SocketBinder::default()));
        assert_eq!(reconciler.reconcile("127.0.0.1:0").await.unwrap(), ReconcileOutcome::Idle);
        assert_eq!(reconciler.address(), None);
    }

    #[tokio::test]
    async fn invalid_address_is_a_bind_error() {
        let reconciler = Reconciler::new(Protocol::Redir, Arc::new(SocketBinder::default()));
        let err = reconciler.reconcile("127.0.0.1:notaport").await;
        assert!(matches!(err, Err(BindError::InvalidAddress { .. })));
        assert_eq!(reconciler.address(), None);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let reconciler = Reconciler::new(Protocol::Http, Arc::new(SocketBinder::default()));
        reconciler.close().await;
        reconciler.close().await;
        assert_eq!(reconciler.address(), None);
    }
}
