//! Verify command implementation.

use super::cursor;
use auditor_core::{AuditEvent, ChainedStore, Deadline};
use std::io::Write;

/// Page size used while walking the chain.
const PAGE_SIZE: i64 = 500;

/// Runs the verify command.
pub fn run(
    store: &ChainedStore<AuditEvent>,
    customer: Option<String>,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = cursor(customer, None);
    let report = store.verify(scope.as_ref(), PAGE_SIZE, Deadline::never())?;

    writeln!(out, "Records checked: {}", report.checked)?;
    for issue in &report.issues {
        writeln!(out, "  {issue}")?;
    }

    if report.is_valid() {
        writeln!(out, "✓ Chain verification passed")?;
        Ok(())
    } else {
        writeln!(out, "✗ Chain verification failed")?;
        Err(format!("{} issue(s) found", report.issues.len()).into())
    }
}
