//! # Auditor Server
//!
//! Request layer for the auditor ledger.
//!
//! This crate provides:
//! - `GET /audit` listing events newest first, paged by timestamp
//! - `POST /audit` validating, chaining and appending one event
//! - JSON bodies, `{"error_message": ...}` errors and status mapping
//! - Request ids from `X-Request-Id` (generated when absent) on every log line
//!
//! # Architecture
//!
//! The server is transport-agnostic: it consumes [`Request`] values and
//! produces [`Response`] values, so any HTTP stack (or a test) can drive
//! it. Chain consistency lives entirely in the store; the server holds no
//! lock of its own.
//!
//! # Parameters
//!
//! - `limit`: page size; missing, non-numeric or non-positive values give
//!   the configured default, larger values are capped
//! - `timestamp`: RFC 3339 cursor; only older events are returned, and an
//!   unparsable value means no cursor
//! - `customer`: partition to read, required by partitioned stores

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod request;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{AppendResponse, AuditHandler, AUDIT_PATH};
pub use request::{Method, Request, Response, REQUEST_ID_HEADER};
pub use server::AuditServer;
