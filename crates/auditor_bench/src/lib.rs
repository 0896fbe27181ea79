//! Benchmark utilities.

use auditor_core::AuditEvent;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate random alphanumeric text of the specified length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate an unsaved event whose description is `payload` characters.
pub fn random_event(customer: &str, payload: usize) -> AuditEvent {
    AuditEvent::new(customer, "auth", "session", random_text(payload))
}
