//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM / SIGINT (Ctrl-C) → graceful shutdown
//! - SIGHUP → reload the configuration file (Unix only)
//!
//! Handlers are registered once at startup and kept for the life of the
//! process. A signal that arrives while a reload is being applied stays
//! queued on its stream and is returned by the next [`Signals::recv`].

use std::io;

/// What a received signal asks the process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Reload,
}

#[cfg(unix)]
pub struct Signals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal the gateway reacts to.
    pub async fn recv(&mut self) -> SignalAction {
        let action = tokio::select! {
            _ = self.terminate.recv() => SignalAction::Shutdown,
            _ = self.interrupt.recv() => SignalAction::Shutdown,
            _ = self.hangup.recv() => SignalAction::Reload,
        };
        tracing::info!(action = ?action, "Signal received");
        action
    }
}

#[cfg(not(unix))]
pub struct Signals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl Signals {
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    pub async fn recv(&mut self) -> SignalAction {
        self.ctrl_c.recv().await;
        tracing::info!("Ctrl-C received");
        SignalAction::Shutdown
    }
}
