//! Bound socket listeners.
//!
//! # Responsibilities
//! - Bind TCP / UDP sockets at a resolved address
//! - Run the accept (TCP) or receive (UDP) loop as a background task
//! - Stop the loop promptly on close and wait for it to exit
//!
//! # Design Decisions
//! - Close signals the loop through a watch channel, so a blocked accept
//!   is interrupted without waiting for the next inbound connection
//! - Dropping a listener without `close` also stops its loop
//! - Bind failures are classified (in use, permission, invalid address)

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::net::address::socket_target;
use crate::net::connection::ConnectionTracker;
use crate::net::Protocol;

/// Largest datagram the UDP relay accepts.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Pause after a failed accept so fd exhaustion does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Pause after a failed receive; some socket errors repeat on every call.
pub(crate) const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error raised when a listener cannot be bound.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("address {0} already in use")]
    AddrInUse(String),

    #[error("permission denied binding {0}")]
    PermissionDenied(String),

    #[error("invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    /// Classify an I/O error raised while binding `addr`.
    pub fn from_io(addr: &str, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::AddrInUse => BindError::AddrInUse(addr.to_string()),
            ErrorKind::PermissionDenied => BindError::PermissionDenied(addr.to_string()),
            ErrorKind::InvalidInput | ErrorKind::AddrNotAvailable => BindError::InvalidAddress {
                addr: addr.to_string(),
                reason: err.to_string(),
            },
            _ => BindError::Io {
                addr: addr.to_string(),
                source: err,
            },
        }
    }
}

/// Handles one accepted TCP connection.
pub type ConnectionHandler = Arc<dyn Fn(TcpStream, SocketAddr) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handles one received datagram; replies go out through the shared socket.
pub type PacketHandler =
    Arc<dyn Fn(Arc<UdpSocket>, Vec<u8>, SocketAddr) -> BoxFuture<'static, ()> + Send + Sync>;

/// A listener that currently owns an OS socket.
pub trait BoundListener: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// The resolved address this listener was bound with.
    fn address(&self) -> &str;

    /// The socket's actual local address, when known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Release the socket and wait for the background loop to finish.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Constructs listeners for a protocol at an address.
pub trait ListenerFactory: Send + Sync {
    fn bind<'a>(
        &'a self,
        protocol: Protocol,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn BoundListener>, BindError>>;
}

/// Background loop handle shared by the TCP and UDP listeners.
struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Listener task ended abnormally");
        }
    }
}

/// TCP listener driving an accept loop.
pub struct TcpInbound {
    protocol: Protocol,
    address: String,
    local_addr: SocketAddr,
    tracker: ConnectionTracker,
    handle: LoopHandle,
}

impl TcpInbound {
    pub async fn bind(protocol: Protocol, addr: &str, handler: ConnectionHandler) -> Result<Self, BindError> {
        let listener = TcpListener::bind(socket_target(addr))
            .await
            .map_err(|e| BindError::from_io(addr, e))?;
        let local_addr = listener.local_addr().map_err(|e| BindError::from_io(addr, e))?;

        let tracker = ConnectionTracker::new(protocol);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(protocol, listener, handler, tracker.clone(), shutdown_rx));

        tracing::info!(protocol = %protocol, address = %addr, local_addr = %local_addr, "Listener bound");

        Ok(Self {
            protocol,
            address: addr.to_string(),
            local_addr,
            tracker,
            handle: LoopHandle { shutdown_tx, task },
        })
    }
}

async fn accept_loop(
    protocol: Protocol,
    listener: TcpListener,
    handler: ConnectionHandler,
    tracker: ConnectionTracker,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    let guard = tracker.track();
                    tracing::debug!(peer_addr = %peer, connection = %guard.id(), "Connection accepted");
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        let _guard = guard;
                        handler(stream, peer).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(protocol = %protocol, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
    tracing::debug!(protocol = %protocol, "Accept loop stopped");
}

impl BoundListener for TcpInbound {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        let this = *self;
        Box::pin(async move {
            this.handle.stop().await;
            tracing::info!(
                protocol = %this.protocol,
                address = %this.address,
                accepted = this.tracker.accepted_count(),
                in_flight = this.tracker.active_count(),
                "Listener closed"
            );
        })
    }
}

/// UDP socket driving a receive loop.
pub struct UdpInbound {
    protocol: Protocol,
    address: String,
    local_addr: SocketAddr,
    handle: LoopHandle,
}

impl UdpInbound {
    pub async fn bind(protocol: Protocol, addr: &str, handler: PacketHandler) -> Result<Self, BindError> {
        let socket = UdpSocket::bind(socket_target(addr))
            .await
            .map_err(|e| BindError::from_io(addr, e))?;
        let local_addr = socket.local_addr().map_err(|e| BindError::from_io(addr, e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(recv_loop(protocol, Arc::new(socket), handler, shutdown_rx));

        tracing::info!(protocol = %protocol, address = %addr, local_addr = %local_addr, "Listener bound");

        Ok(Self {
            protocol,
            address: addr.to_string(),
            local_addr,
            handle: LoopHandle { shutdown_tx, task },
        })
    }
}

async fn recv_loop(
    protocol: Protocol,
    socket: Arc<UdpSocket>,
    handler: PacketHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, src)) => {
                    let packet = buf[..len].to_vec();
                    tokio::spawn(handler(Arc::clone(&socket), packet, src));
                }
                Err(e) => {
                    tracing::debug!(protocol = %protocol, error = %e, "Receive failed");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
            }
        }
    }
    tracing::debug!(protocol = %protocol, "Receive loop stopped");
}

impl BoundListener for UdpInbound {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        let this = *self;
        Box::pin(async move {
            this.handle.stop().await;
            tracing::info!(protocol = %this.protocol, address = %this.address, "Listener closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn noop_handler() -> ConnectionHandler {
        Arc::new(|_stream, _peer| Box::pin(async {}))
    }

    #[test]
    fn classify_bind_errors() {
        let err = BindError::from_io("[::1]:80", std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, BindError::PermissionDenied(_)));

        let err = BindError::from_io(":7890", std::io::Error::from(ErrorKind::AddrInUse));
        assert!(matches!(err, BindError::AddrInUse(_)));

        let err = BindError::from_io("bogus", std::io::Error::from(ErrorKind::InvalidInput));
        assert!(matches!(err, BindError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn close_releases_port() {
        let inbound = TcpInbound::bind(Protocol::Http, "127.0.0.1:0", noop_handler())
            .await
            .unwrap();
        let local = inbound.local_addr().unwrap();

        Box::new(inbound).close().await;

        // Rebinding the exact port succeeds once the socket is gone.
        let again = TcpListener::bind(local).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn second_bind_reports_in_use() {
        let first = TcpInbound::bind(Protocol::Http, "127.0.0.1:0", noop_handler())
            .await
            .unwrap();
        let taken = first.local_addr().unwrap().to_string();

        let second = TcpInbound::bind(Protocol::Http, &taken, noop_handler()).await;
        assert!(matches!(second, Err(BindError::AddrInUse(_))));
    }

    #[tokio::test]
    async fn accepted_connections_reach_handler() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler: ConnectionHandler = Arc::new(move |_stream, peer| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(peer);
            })
        });

        let inbound = TcpInbound::bind(Protocol::Socks, "127.0.0.1:0", handler).await.unwrap();
        let mut client = TcpStream::connect(inbound.local_addr().unwrap()).await.unwrap();
        client.write_all(b"x").await.unwrap();

        let peer = rx.recv().await.unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
        Box::new(inbound).close().await;
    }

    #[tokio::test]
    async fn udp_loop_serves_until_closed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler: PacketHandler = Arc::new(move |_socket, packet, _src| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(packet);
            })
        });

        let inbound = UdpInbound::bind(Protocol::SocksUdp, "127.0.0.1:0", handler).await.unwrap();
        let local = inbound.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"one", local).await.unwrap();
        client.send_to(b"two", local).await.unwrap();

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort();
        assert_eq!(got, vec![b"one".to_vec(), b"two".to_vec()]);

        tokio::time::timeout(Duration::from_secs(1), Box::new(inbound).close())
            .await
            .unwrap();
        assert!(UdpSocket::bind(local).await.is_ok());
    }
}
