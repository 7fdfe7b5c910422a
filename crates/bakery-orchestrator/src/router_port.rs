//! Late-bound router port.
//!
//! The proxy binds to the first free of several candidate ports, which
//! happens after the orchestrator and API are constructed. `RouterPort`
//! decouples the two: it starts unresolved (0) and is set exactly once when
//! the proxy listener is up.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Shared provider for the router proxy's resolved listen port.
#[derive(Debug, Clone, Default)]
pub struct RouterPort(Arc<AtomicU16>);

impl RouterPort {
    /// A provider with no resolved port yet.
    pub fn unresolved() -> Self {
        Self::default()
    }

    /// A provider pre-resolved to `port` (for tests).
    pub fn resolved(port: u16) -> Self {
        let provider = Self::default();
        provider.set(port);
        provider
    }

    /// Publish the resolved port. Called once, after the proxy binds.
    pub fn set(&self, port: u16) {
        self.0.store(port, Ordering::Release);
    }

    /// Current value; 0 while unresolved.
    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }
}

/// Public URL for a route host behind the router proxy. The port suffix is
/// omitted for the schemes' default ports.
pub fn route_url(route_host: &str, router_port: u16) -> String {
    match router_port {
        80 | 443 => format!("http://{route_host}"),
        port => format!("http://{route_host}:{port}"),
    }
}
