//! Local DNS listener.
//!
//! Listens for DNS queries on the configured address and relays them to
//! the active resolver's UDP upstream. Restarting at the same address only
//! swaps the resolver; a different address closes the old socket first.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::dns::resolver::Resolver;
use crate::dns::DnsError;
use crate::net::address::{port_is_zero, socket_target};
use crate::net::listener::RECV_ERROR_BACKOFF;
use crate::observability::metrics;

/// Maximum DNS message size for UDP.
const MAX_DNS_MESSAGE_SIZE: usize = 4096;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// DNS header length; anything shorter is not a query.
const DNS_HEADER_LEN: usize = 12;

type Handler = Arc<ArcSwapOption<Resolver>>;

struct RunningServer {
    address: String,
    local_addr: SocketAddr,
    handler: Handler,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningServer {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        metrics::record_dns_server(false);
        tracing::info!(address = %self.address, "DNS server stopped");
    }
}

/// Default resolver plus the DNS listening service.
#[derive(Default)]
pub struct DnsService {
    resolver: ArcSwapOption<Resolver>,
    server: Mutex<Option<RunningServer>>,
}

impl DnsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver used by the routing core, if DNS is enabled.
    pub fn resolver(&self) -> Option<Arc<Resolver>> {
        self.resolver.load_full()
    }

    pub fn set_resolver(&self, resolver: Option<Arc<Resolver>>) {
        self.resolver.store(resolver);
    }

    /// (Re)start the listener at `addr` serving `resolver`.
    ///
    /// An empty address or port 0 leaves the service stopped.
    pub async fn recreate_server(&self, addr: &str, resolver: Option<Arc<Resolver>>) -> Result<(), DnsError> {
        let mut server = self.server.lock().await;

        if let Some(running) = server.as_ref() {
            if running.address == addr {
                running.handler.store(resolver);
                return Ok(());
            }
        }

        if let Some(running) = server.take() {
            running.stop().await;
        }

        if port_is_zero(addr) {
            return Ok(());
        }

        let socket = UdpSocket::bind(socket_target(addr)).await.map_err(|e| DnsError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = socket.local_addr()?;

        let handler: Handler = Arc::new(ArcSwapOption::new(resolver));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(serve(Arc::new(socket), Arc::clone(&handler), shutdown_rx));

        metrics::record_dns_server(true);
        tracing::info!(address = %addr, local_addr = %local_addr, "DNS server listening");

        *server = Some(RunningServer {
            address: addr.to_string(),
            local_addr,
            handler,
            shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Configured address of the running listener.
    pub async fn address(&self) -> Option<String> {
        self.server.lock().await.as_ref().map(|s| s.address.clone())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|s| s.local_addr)
    }

    pub async fn is_running(&self) -> bool {
        self.server.lock().await.is_some()
    }

    /// Clear the resolver and stop the listener.
    pub async fn shutdown(&self) -> Result<(), DnsError> {
        self.set_resolver(None);
        self.recreate_server("", None).await
    }
}

async fn serve(socket: Arc<UdpSocket>, handler: Handler, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, src)) => {
                    let query = buf[..len].to_vec();
                    let socket = Arc::clone(&socket);
                    let resolver = handler.load_full();
                    tokio::spawn(async move {
                        if let Err(e) = handle_query(&socket, resolver.as_deref(), &query, src).await {
                            tracing::debug!(peer_addr = %src, error = %e, "DNS query failed");
                        }
                    });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "DNS server recv error");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_query(
    socket: &UdpSocket,
    resolver: Option<&Resolver>,
    query: &[u8],
    src: SocketAddr,
) -> Result<(), DnsError> {
    if query.len() < DNS_HEADER_LEN {
        return Err(DnsError::Upstream("DNS query too short".into()));
    }
    let resolver = resolver.ok_or_else(|| DnsError::Upstream("no resolver installed".into()))?;
    let upstream = resolver
        .udp_upstream()
        .ok_or_else(|| DnsError::Upstream("no UDP upstream configured".into()))?;

    let bind = if upstream.is_ipv4() {
        SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
    } else {
        SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
    };
    let relay = UdpSocket::bind(bind).await?;
    relay.connect(upstream).await?;
    relay.send(query).await?;

    let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];
    let len = tokio::time::timeout(UPSTREAM_TIMEOUT, relay.recv(&mut buf))
        .await
        .map_err(|_| DnsError::Upstream(format!("upstream {} timed out", upstream)))??;

    socket.send_to(&buf[..len], src).await?;
    Ok(())
}
