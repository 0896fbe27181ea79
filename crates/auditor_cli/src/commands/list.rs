//! List command implementation.

use super::cursor;
use auditor_core::{AuditEvent, ChainedStore, Store, Value};
use chrono::{DateTime, Utc};
use std::io::Write;

/// Runs the list command.
pub fn run(
    store: &ChainedStore<AuditEvent>,
    limit: i64,
    before: Option<DateTime<Utc>>,
    customer: Option<String>,
    format: &str,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = store.read(limit, cursor(customer, before).as_ref())?;

    match format {
        "json" => {
            writeln!(out, "{}", serde_json::to_string_pretty(&events)?)?;
        }
        "text" => {
            for event in &events {
                print_event(event, out)?;
            }
            writeln!(out, "{} event(s)", events.len())?;
        }
        other => return Err(format!("unknown format '{other}', expected text or json").into()),
    }
    Ok(())
}

fn print_event(event: &AuditEvent, out: &mut dyn Write) -> std::io::Result<()> {
    let short = event.hash.get(..12).unwrap_or(&event.hash);
    writeln!(
        out,
        "{}  {}  {}/{}  {}  {short}",
        Value::from(event.timestamp),
        event.customer,
        event.category,
        event.subcategory,
        event.event,
    )
}
