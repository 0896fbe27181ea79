//! Append command implementation.

use auditor_core::{AuditEvent, ChainedStore, Store};
use std::io::Write;
use tracing::info;

/// Runs the append command.
pub fn run(
    store: &ChainedStore<AuditEvent>,
    mut event: AuditEvent,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    event.validate()?;
    store.save(&mut event)?;
    store.close()?;
    info!(hash = %event.hash, "event appended");

    writeln!(out, "hash:          {}", event.hash)?;
    writeln!(
        out,
        "previous hash: {}",
        if event.previous_hash.is_empty() {
            "(genesis)"
        } else {
            &event.previous_hash
        }
    )?;
    Ok(())
}
