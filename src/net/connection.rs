//! Per-listener connection accounting.
//!
//! Closing a listener stops accepting; connections already handed to a
//! protocol handler keep running until the handler returns, and stay
//! counted until then.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::net::Protocol;

/// Sequence number of an accepted connection, scoped to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionTag {
    protocol: Protocol,
    seq: u64,
}

impl ConnectionTag {
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for ConnectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.protocol, self.seq)
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    live: AtomicU64,
}

/// Counts connections accepted by one listener.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    protocol: Protocol,
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            counters: Arc::default(),
        }
    }

    /// Register an accepted connection; it stays live until the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        let seq = self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        crate::observability::metrics::record_connection(self.protocol);
        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            tag: ConnectionTag {
                protocol: self.protocol,
                seq,
            },
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Connections ever accepted by this listener.
    pub fn accepted_count(&self) -> u64 {
        self.counters.accepted.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    tag: ConnectionTag,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionTag {
        self.tag
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection = %self.tag, "Connection finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sequential_per_listener() {
        let http = ConnectionTracker::new(Protocol::Http);
        let socks = ConnectionTracker::new(Protocol::Socks);

        let a = http.track();
        let b = http.track();
        let c = socks.track();

        assert_eq!((a.id().seq(), b.id().seq()), (1, 2));
        assert_eq!(c.id().seq(), 1);
        assert_eq!(c.id().protocol(), Protocol::Socks);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn live_count_follows_guards() {
        let tracker = ConnectionTracker::new(Protocol::Redir);
        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.accepted_count(), 2);
    }
}
