//! CLI command implementations.

pub mod append;
pub mod list;
pub mod verify;

use auditor_core::config::ENV_STORE;
use auditor_core::{new_store, AuditEvent, ChainedStore, LedgerConfig};
use std::path::PathBuf;

/// Opens the durable store named by the flags, falling back to the
/// `AUDITOR_*` environment for anything not given.
pub fn open_store(
    data_dir: Option<PathBuf>,
    store: Option<&str>,
) -> Result<ChainedStore<AuditEvent>, Box<dyn std::error::Error>> {
    let mut config = LedgerConfig::from_lookup(|name| {
        if name == ENV_STORE {
            store.map(str::to_string).or_else(|| std::env::var(name).ok())
        } else {
            std::env::var(name).ok()
        }
    })?;
    if let Some(dir) = data_dir {
        config.data_dir = Some(dir);
    }
    if config.data_dir.is_none() {
        return Err("data directory required (--data-dir or AUDITOR_DATA_DIR)".into());
    }
    Ok(new_store(&config)?)
}

/// Read cursor for an optional customer and upper time bound.
pub fn cursor(
    customer: Option<String>,
    before: Option<chrono::DateTime<chrono::Utc>>,
) -> Option<AuditEvent> {
    if customer.is_none() && before.is_none() {
        None
    } else {
        Some(AuditEvent::cursor(customer.unwrap_or_default(), before))
    }
}
