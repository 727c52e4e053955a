//! Socket-backed listener construction.
//!
//! The HTTP proxy, SOCKS5 and redirect protocol handlers live outside this
//! crate. They plug in through [`InboundHandlers`]; the defaults accept and
//! immediately drop traffic so the gateway can run without them.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::net::{TcpStream, UdpSocket};

use crate::net::listener::{
    BindError, BoundListener, ConnectionHandler, ListenerFactory, PacketHandler, TcpInbound, UdpInbound,
};
use crate::net::Protocol;

/// Per-protocol traffic handlers.
#[derive(Clone)]
pub struct InboundHandlers {
    pub http: ConnectionHandler,
    pub socks: ConnectionHandler,
    pub socks_udp: PacketHandler,
    pub redir: ConnectionHandler,
}

impl InboundHandlers {
    fn stream_handler(&self, protocol: Protocol) -> ConnectionHandler {
        match protocol {
            Protocol::Http => Arc::clone(&self.http),
            Protocol::Redir => Arc::clone(&self.redir),
            _ => Arc::clone(&self.socks),
        }
    }
}

impl Default for InboundHandlers {
    fn default() -> Self {
        Self {
            http: drop_connection(Protocol::Http),
            socks: drop_connection(Protocol::Socks),
            socks_udp: drop_packet(),
            redir: drop_connection(Protocol::Redir),
        }
    }
}

fn drop_connection(protocol: Protocol) -> ConnectionHandler {
    Arc::new(move |stream: TcpStream, peer: SocketAddr| -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tracing::debug!(protocol = %protocol, peer_addr = %peer, "No handler installed, dropping connection");
            drop(stream);
        })
    })
}

fn drop_packet() -> PacketHandler {
    Arc::new(|_socket: Arc<UdpSocket>, packet: Vec<u8>, src: SocketAddr| -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tracing::trace!(peer_addr = %src, len = packet.len(), "No handler installed, dropping datagram");
        })
    })
}

/// [`ListenerFactory`] binding real OS sockets.
#[derive(Clone, Default)]
pub struct SocketBinder {
    handlers: InboundHandlers,
}

impl SocketBinder {
    pub fn new(handlers: InboundHandlers) -> Self {
        Self { handlers }
    }
}

impl ListenerFactory for SocketBinder {
    fn bind<'a>(
        &'a self,
        protocol: Protocol,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn BoundListener>, BindError>> {
        Box::pin(async move {
            let listener: Box<dyn BoundListener> = match protocol {
                Protocol::SocksUdp => {
                    Box::new(UdpInbound::bind(protocol, addr, Arc::clone(&self.handlers.socks_udp)).await?)
                }
                _ => Box::new(TcpInbound::bind(protocol, addr, self.handlers.stream_handler(protocol)).await?),
            };
            Ok(listener)
        })
    }
}
