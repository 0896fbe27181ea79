//! Content hashing of records.
//!
//! The hash input is the canonical CBOR encoding of
//! `[[field_name, value], ...]` over every schema field except the hash
//! field, in declaration order. The digest is SHA-256, rendered as 64
//! lowercase hex characters.

use crate::error::{LedgerError, LedgerResult};
use crate::schema::Schema;
use auditor_codec::{to_canonical_cbor, Value};
use sha2::{Digest, Sha256};

/// Hash of the record as it currently stands.
///
/// # Errors
///
/// Returns a serialization error if the record cannot be encoded.
pub fn compute_hash<R>(schema: &Schema<R>, record: &R) -> LedgerResult<String> {
    let bytes = to_canonical_cbor(&schema.hash_input(record))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Computes the hash and writes it into the record's hash field.
///
/// # Errors
///
/// Returns a serialization error if the record cannot be encoded or its
/// hash field rejects the digest. The record is unchanged on error.
pub fn compute_and_set_hash<R>(schema: &Schema<R>, record: &mut R) -> LedgerResult<String> {
    let hash = compute_hash(schema, record)?;
    let field = schema.hash_field();
    if !field.set(record, Value::text(hash.clone())) {
        return Err(LedgerError::serialization(format!(
            "hash field '{}' rejected the digest",
            field.name()
        )));
    }
    Ok(hash)
}

/// Whether the stored hash matches the record's content.
///
/// # Errors
///
/// Returns a serialization error if the record cannot be encoded.
pub fn verify_hash<R>(schema: &Schema<R>, record: &R) -> LedgerResult<bool> {
    let stored = schema.hash_field().get(record);
    let computed = compute_hash(schema, record)?;
    Ok(stored.as_text() == Some(computed.as_str()))
}
