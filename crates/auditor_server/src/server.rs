//! Main audit server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::AuditHandler;
use crate::request::{Request, Response, REQUEST_ID_HEADER};
use auditor_core::{new_store, AuditEvent, LedgerConfig, Store};
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

/// The audit server.
///
/// Owns one long-lived store and turns [`Request`]s into [`Response`]s. A
/// transport (an HTTP listener, a test harness) feeds it requests; every
/// request is handled inside a `tracing` span carrying its request id and
/// action, and the id is echoed in the `X-Request-Id` response header.
///
/// # Example
///
/// ```
/// use auditor_core::{BackendKind, LedgerConfig};
/// use auditor_server::{AuditServer, Request, ServerConfig};
///
/// let server = AuditServer::open(
///     ServerConfig::default(),
///     &LedgerConfig::new(BackendKind::Document),
/// )
/// .unwrap();
///
/// let body = r#"{"customer":"acme","category":"auth","subcategory":"session","event":"login"}"#;
/// let response = server.handle(&Request::post("/audit", body));
/// assert_eq!(response.status, 200);
/// ```
pub struct AuditServer {
    handler: AuditHandler,
    store: Arc<dyn Store<AuditEvent>>,
}

impl AuditServer {
    /// Creates a server over an existing store.
    pub fn new(config: ServerConfig, store: Arc<dyn Store<AuditEvent>>) -> Self {
        let handler = AuditHandler::new(config, Arc::clone(&store));
        Self { handler, store }
    }

    /// Creates a server with a store built from `ledger`.
    ///
    /// # Errors
    ///
    /// Returns the ledger's configuration or backend error.
    pub fn open(config: ServerConfig, ledger: &LedgerConfig) -> ServerResult<Self> {
        let store = new_store::<AuditEvent>(ledger)?;
        info!(backend = %ledger.backend, addr = %config.bind_addr, "audit server ready");
        Ok(Self::new(config, Arc::new(store)))
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        self.handler.config()
    }

    /// Handles one request. Failures become JSON error responses.
    pub fn handle(&self, request: &Request) -> Response {
        let request_id = request
            .header(REQUEST_ID_HEADER)
            .filter(|id| !id.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().simple().to_string(), str::to_string);
        let action = format!("{} {}", request.method, request.target);
        let span = info_span!("request", request_id = %request_id, action = %action);
        let _entered = span.enter();

        info!("start");
        let response = match self.handler.handle(request) {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                if e.is_server_error() {
                    error!(status, error = %e, "request failed");
                } else {
                    warn!(status, error = %e, "request rejected");
                }
                let message = match status {
                    404 => "Not Found".to_string(),
                    405 => "Method Not Allowed".to_string(),
                    _ => e.to_string(),
                };
                Response::error(status, &message)
            }
        };
        info!(status = response.status, "done");
        response.with_header(REQUEST_ID_HEADER, request_id)
    }

    /// Closes the underlying store.
    ///
    /// # Errors
    ///
    /// Returns the store's close error.
    pub fn close(&self) -> ServerResult<()> {
        Ok(self.store.close()?)
    }
}
