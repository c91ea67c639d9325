//! Encoded key layout for secondary-index entries.
//!
//! An index entry key is the concatenation of the encoded hash scalar,
//! the encoded range scalar (when the index declares one), and the
//! encoded primary key of the originating item. The primary-key suffix
//! makes entry keys unique across items that share hash/range values
//! while keeping byte order equal to (hash, range, primary key) order.

use strata_core::{KeyValue, PrimaryKey};

/// Full entry key for one item in one index.
#[must_use]
pub fn entry_key(hash: &KeyValue, range: Option<&KeyValue>, primary: &PrimaryKey) -> Vec<u8> {
    let mut out = Vec::new();
    hash.encode_into(&mut out);
    if let Some(range) = range {
        range.encode_into(&mut out);
    }
    out.extend_from_slice(&primary.encode());
    out
}

/// Prefix covering every entry with the given hash value.
#[must_use]
pub fn hash_prefix(hash: &KeyValue) -> Vec<u8> {
    hash.encode()
}

/// Prefix covering every entry with the given hash and range values
/// (entries differ only in their primary-key suffix).
#[must_use]
pub fn hash_range_prefix(hash: &KeyValue, range: &KeyValue) -> Vec<u8> {
    let mut out = Vec::new();
    hash.encode_into(&mut out);
    range.encode_into(&mut out);
    out
}

/// Prefix covering every entry whose string range value starts with
/// `range_prefix`, under the given hash value.
#[must_use]
pub fn hash_begins_with_prefix(hash: &KeyValue, range_prefix: &str) -> Vec<u8> {
    let mut out = Vec::new();
    hash.encode_into(&mut out);
    out.extend_from_slice(&KeyValue::encode_string_prefix(range_prefix));
    out
}
