//! # Auditor Codec
//!
//! Canonical CBOR encoding/decoding for the audit ledger.
//!
//! Chained hashes are only meaningful if every process serializes a record
//! to exactly the same bytes. This crate provides that encoding:
//! - Identical inputs produce identical bytes
//! - Maps are sorted by encoded key, never by insertion order
//! - Integers use shortest encoding
//! - No floats, no indefinite-length items
//! - Timestamps are CBOR tag 0 over fixed-width RFC 3339 UTC text
//!
//! The same encoding is used for documents persisted by the embedded engines
//! and for the tail-cache entries shared between replicas.
//!
//! ## Usage
//!
//! ```
//! use auditor_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::Array(vec![Value::text("event"), Value::Integer(42)]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{format_timestamp, Value};
