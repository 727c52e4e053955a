//! Shared utilities for integration tests.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use proxy_gateway::net::{BindError, BoundListener, ListenerFactory, Protocol};
use proxy_gateway::observability::{LogControl, LogLevel};
use proxy_gateway::outbound::{Proxy, ProxyKind};
use proxy_gateway::runtime::Runtime;

/// A socket operation observed by [`RecordingFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Bind(Protocol, String),
    Close(Protocol, String),
}

/// Listener factory that binds nothing and records every bind and close.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    events: Arc<Mutex<Vec<SocketEvent>>>,
    refused: Arc<Mutex<HashSet<String>>>,
}

#[allow(dead_code)]
impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SocketEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Addresses bound for a protocol, in order.
    pub fn binds(&self, protocol: Protocol) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SocketEvent::Bind(p, addr) if p == protocol => Some(addr),
                _ => None,
            })
            .collect()
    }

    /// Addresses closed for a protocol, in order.
    pub fn closes(&self, protocol: Protocol) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SocketEvent::Close(p, addr) if p == protocol => Some(addr),
                _ => None,
            })
            .collect()
    }

    /// Make binds at `addr` fail with "address in use".
    pub fn refuse(&self, addr: &str) {
        self.refused.lock().unwrap().insert(addr.to_string());
    }
}

impl ListenerFactory for RecordingFactory {
    fn bind<'a>(
        &'a self,
        protocol: Protocol,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn BoundListener>, BindError>> {
        Box::pin(async move {
            if self.refused.lock().unwrap().contains(addr) {
                return Err(BindError::AddrInUse(addr.to_string()));
            }
            self.events
                .lock()
                .unwrap()
                .push(SocketEvent::Bind(protocol, addr.to_string()));
            Ok(Box::new(FakeListener {
                protocol,
                address: addr.to_string(),
                events: Arc::clone(&self.events),
            }) as Box<dyn BoundListener>)
        })
    }
}

struct FakeListener {
    protocol: Protocol,
    address: String,
    events: Arc<Mutex<Vec<SocketEvent>>>,
}

impl BoundListener for FakeListener {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.events
                .lock()
                .unwrap()
                .push(SocketEvent::Close(self.protocol, self.address.clone()));
        })
    }
}

/// Proxy that counts lifecycle calls.
#[derive(Debug)]
pub struct CountingProxy {
    name: String,
    pub starts: AtomicUsize,
    pub destroys: AtomicUsize,
}

#[allow(dead_code)]
impl CountingProxy {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            starts: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

impl Proxy for CountingProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProxyKind {
        ProxyKind::Socks5
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runtime backed by the given factory, logging detached from any subscriber.
#[allow(dead_code)]
pub fn runtime_with(factory: &RecordingFactory) -> Arc<Runtime> {
    Arc::new(Runtime::new(
        Arc::new(factory.clone()),
        LogControl::detached(LogLevel::Info),
    ))
}

/// Write a configuration file to a unique temporary path.
#[allow(dead_code)]
pub fn write_config(content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("proxy-gateway-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, content).unwrap();
    path
}

/// A port that was free a moment ago on 127.0.0.1 (TCP and UDP).
#[allow(dead_code)]
pub fn free_port() -> u16 {
    loop {
        let tcp = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = tcp.local_addr().unwrap().port();
        if std::net::UdpSocket::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
    }
}
