//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the audit server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address a transport should bind to.
    pub bind_addr: SocketAddr,
    /// Page size when a request gives no usable limit.
    pub default_limit: usize,
    /// Largest page a single request may ask for.
    pub max_limit: usize,
    /// Deadline for one request's ledger work.
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            default_limit: 100,
            max_limit: 1000,
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the default page size.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
