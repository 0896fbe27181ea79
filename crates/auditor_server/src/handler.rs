//! Handlers for the `/audit` endpoint.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::request::{Method, Request, Response};
use auditor_core::{AuditEvent, Deadline, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Path served by [`AuditHandler`].
pub const AUDIT_PATH: &str = "/audit";

/// Body returned by a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {
    /// Hash assigned to the new event.
    pub hash: String,
    /// Hash of the event it was chained to; empty for the first.
    pub previous_hash: String,
}

/// Handles list and append requests against one store.
pub struct AuditHandler {
    config: ServerConfig,
    store: Arc<dyn Store<AuditEvent>>,
}

impl AuditHandler {
    /// Creates a handler over `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn Store<AuditEvent>>) -> Self {
        Self { config, store }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routes a request.
    pub fn handle(&self, request: &Request) -> ServerResult<Response> {
        if request.path() != AUDIT_PATH {
            return Err(ServerError::NotFound(request.path().to_string()));
        }
        match request.method {
            Method::Get => self.handle_list(request),
            Method::Post => self.handle_append(request),
            Method::Other(ref name) => Err(ServerError::MethodNotAllowed(name.clone())),
        }
    }

    /// `GET /audit?limit=N&timestamp=T&customer=C`: newest first, older
    /// than `T` when given.
    pub fn handle_list(&self, request: &Request) -> ServerResult<Response> {
        let limit = self.limit(request);
        let page_cursor = cursor(request);
        let deadline = Deadline::after(self.config.request_timeout);
        let events = self.store.read_until(
            i64::try_from(limit).unwrap_or(i64::MAX),
            page_cursor.as_ref(),
            deadline,
        )?;
        debug!(limit, returned = events.len(), "listed events");
        Ok(Response::json(200, &events))
    }

    /// `POST /audit` with a JSON event: validates, chains and stores it.
    pub fn handle_append(&self, request: &Request) -> ServerResult<Response> {
        let mut event: AuditEvent = serde_json::from_slice(&request.body)
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        event.validate()?;

        let deadline = Deadline::after(self.config.request_timeout);
        self.store.save_until(&mut event, deadline)?;
        info!(hash = %event.hash, previous_hash = %event.previous_hash, "event appended");

        Ok(Response::json(
            200,
            &AppendResponse {
                hash: event.hash,
                previous_hash: event.previous_hash,
            },
        ))
    }

    /// Page size: the `limit` parameter when it is a positive integer,
    /// capped at the maximum; the default otherwise.
    fn limit(&self, request: &Request) -> usize {
        request
            .query("limit")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .map_or(self.config.default_limit, |n| n.min(self.config.max_limit))
    }
}

/// Builds the read cursor from `timestamp` and `customer`. An unparsable
/// timestamp means no time bound.
fn cursor(request: &Request) -> Option<AuditEvent> {
    let before = request
        .query("timestamp")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc));
    let customer = request.query("customer").filter(|c| !c.is_empty());
    if before.is_none() && customer.is_none() {
        return None;
    }
    Some(AuditEvent::cursor(customer.unwrap_or_default(), before))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::{new_store, BackendKind, LedgerConfig};

    fn create_handler(kind: BackendKind) -> AuditHandler {
        let store = new_store::<AuditEvent>(&LedgerConfig::new(kind)).unwrap();
        AuditHandler::new(ServerConfig::default().with_max_limit(50), Arc::new(store))
    }

    fn append(handler: &AuditHandler, customer: &str, event: &str) -> AppendResponse {
        let body = serde_json::json!({
            "customer": customer,
            "category": "auth",
            "subcategory": "session",
            "event": event,
        });
        let response = handler
            .handle(&Request::post("/audit", body.to_string()))
            .unwrap();
        assert_eq!(response.status, 200);
        response.body_json().unwrap()
    }

    fn list(handler: &AuditHandler, target: &str) -> Vec<AuditEvent> {
        let response = handler.handle(&Request::get(target)).unwrap();
        assert_eq!(response.status, 200);
        response.body_json().unwrap()
    }

    #[test]
    fn append_chains_events() {
        let handler = create_handler(BackendKind::Document);
        let first = append(&handler, "acme", "login");
        let second = append(&handler, "acme", "logout");
        assert_eq!(first.previous_hash, "");
        assert_eq!(second.previous_hash, first.hash);

        let events = list(&handler, "/audit");
        let names: Vec<_> = events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["logout", "login"]);
    }

    #[test]
    fn limit_parsing() {
        let handler = create_handler(BackendKind::Document);
        let limit = |target: &str| handler.limit(&Request::get(target));
        assert_eq!(limit("/audit"), 100);
        assert_eq!(limit("/audit?limit=abc"), 100);
        assert_eq!(limit("/audit?limit=-3"), 100);
        assert_eq!(limit("/audit?limit=0"), 100);
        assert_eq!(limit("/audit?limit=7"), 7);
        assert_eq!(limit("/audit?limit=5000"), 50);
    }

    #[test]
    fn cursor_parsing() {
        assert!(cursor(&Request::get("/audit")).is_none());
        assert!(cursor(&Request::get("/audit?timestamp=yesterday")).is_none());

        let c = cursor(&Request::get(
            "/audit?timestamp=2024-05-01T10:00:00.5Z&customer=acme",
        ))
        .unwrap();
        assert_eq!(c.customer, "acme");
        assert_eq!(
            c.timestamp.unwrap().timestamp_nanos_opt(),
            Some(1_714_557_600_500_000_000)
        );

        let c = cursor(&Request::get("/audit?customer=acme")).unwrap();
        assert!(c.timestamp.is_none());
    }

    #[test]
    fn list_pages_by_timestamp() {
        let handler = create_handler(BackendKind::Document);
        for name in ["a", "b", "c"] {
            append(&handler, "acme", name);
        }
        let newest = list(&handler, "/audit?limit=1");
        assert_eq!(newest[0].event, "c");

        let ts = auditor_core::Value::from(newest[0].timestamp).to_string();
        let older = list(&handler, &format!("/audit?timestamp={ts}"));
        let names: Vec<_> = older.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn partitioned_list_needs_customer() {
        let handler = create_handler(BackendKind::Partitioned);
        append(&handler, "acme", "login");
        append(&handler, "globex", "login");

        let err = handler.handle(&Request::get("/audit")).unwrap_err();
        assert_eq!(err.status_code(), 400);

        let events = list(&handler, "/audit?customer=globex");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].customer, "globex");
    }

    #[test]
    fn bad_bodies_are_client_errors() {
        let handler = create_handler(BackendKind::Document);

        let err = handler
            .handle(&Request::post("/audit", "{not json"))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let missing_event = serde_json::json!({
            "customer": "acme", "category": "auth", "subcategory": "session", "event": " "
        });
        let err = handler
            .handle(&Request::post("/audit", missing_event.to_string()))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let forged = serde_json::json!({
            "customer": "acme", "category": "auth", "subcategory": "session",
            "event": "login", "hash": "ff"
        });
        let err = handler
            .handle(&Request::post("/audit", forged.to_string()))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(list(&handler, "/audit").is_empty());
    }

    #[test]
    fn routing() {
        let handler = create_handler(BackendKind::Document);
        let err = handler.handle(&Request::get("/other")).unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = handler
            .handle(&Request::new(Method::parse("DELETE"), "/audit"))
            .unwrap_err();
        assert_eq!(err.status_code(), 405);
    }
}
