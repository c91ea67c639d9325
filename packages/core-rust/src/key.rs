//! Typed key scalars and order-preserving byte encoding.
//!
//! Every key attribute (partition, sort, index hash, index range) is a
//! [`KeyValue`]: a string, number, or binary scalar. Encoded keys are
//! compared as plain byte strings, so the encoding must preserve the
//! logical order of the scalars it contains:
//!
//! - Numbers use the IEEE-754 total-order complement transform (sign-flip
//!   for positives, full complement for negatives) in big-endian form.
//! - Strings and binary escape interior `0x00` bytes and append a
//!   terminator that sorts below any escaped content, so prefix order and
//!   tuple order both survive concatenation.
//!
//! [`PrimaryKey`] concatenates the partition component and the optional
//! sort component into a single encoded key. [`CompositeKey`] is the
//! documented replacement for ad hoc `"{flag}-{ownerId}"` string
//! concatenation: an explicit two-part key with an escape-based encoding
//! that cannot collide on the delimiter.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// The declared type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// UTF-8 string.
    String,
    /// 64-bit floating-point number (integers are widened on write).
    Number,
    /// Raw bytes.
    Binary,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::String => write!(f, "string"),
            KeyType::Number => write!(f, "number"),
            KeyType::Binary => write!(f, "binary"),
        }
    }
}

/// Why an attribute value could not be coerced into a [`KeyValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCoercionError {
    /// The attribute value's type does not match the declared key type.
    WrongType {
        /// The declared key type.
        expected: KeyType,
        /// The actual value type name.
        actual: &'static str,
    },
    /// The attribute value is a non-finite float (NaN or infinity).
    NotFinite,
}

impl fmt::Display for KeyCoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCoercionError::WrongType { expected, actual } => {
                write!(f, "expected {expected} value, got {actual}")
            }
            KeyCoercionError::NotFinite => write!(f, "number key must be finite"),
        }
    }
}

impl std::error::Error for KeyCoercionError {}

// Component tag bytes. Schemas fix the type of each component, so cross-type
// order is never observed, but the tags keep encoded keys self-describing.
const TAG_NUMBER: u8 = 0x11;
const TAG_STRING: u8 = 0x21;
const TAG_BINARY: u8 = 0x31;

// Escape scheme for variable-length components: interior 0x00 becomes
// 0x00 0xFF, and the component ends with 0x00 0x01. The terminator sorts
// below every escaped content pair, which preserves prefix order.
const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

const SIGN_MASK: u64 = 1u64 << 63;

/// Maps an f64 onto a u64 whose unsigned big-endian byte order equals the
/// number's total order. Negative values are fully complemented; positive
/// values have the sign bit flipped.
fn encode_f64_ordered(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let mapped = if bits & SIGN_MASK != 0 {
        !bits
    } else {
        bits ^ SIGN_MASK
    };
    mapped.to_be_bytes()
}

fn push_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == ESCAPE {
            out.push(ESCAPE);
            out.push(ESCAPED_ZERO);
        } else {
            out.push(b);
        }
    }
}

fn push_terminator(out: &mut Vec<u8>) {
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

/// Smallest byte string strictly greater than every string that starts
/// with `prefix`, or `None` if no such string exists (all bytes `0xFF`).
///
/// Used to turn an encoded-key prefix into an exclusive upper scan bound.
#[must_use]
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    loop {
        match out.last().copied() {
            None => return None,
            Some(0xFF) => {
                out.pop();
            }
            Some(last) => {
                let end = out.len() - 1;
                out[end] = last + 1;
                return Some(out);
            }
        }
    }
}

/// A typed key scalar: the runtime value of a partition, sort, or index
/// key attribute.
///
/// Invariant: `Number` values are always finite. [`KeyValue::from_attribute`]
/// rejects NaN and infinity, and every engine entry point goes through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyValue {
    /// String key.
    String(String),
    /// Number key (finite f64).
    Number(f64),
    /// Binary key.
    Binary(Vec<u8>),
}

impl KeyValue {
    /// The [`KeyType`] of this scalar.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::String(_) => KeyType::String,
            KeyValue::Number(_) => KeyType::Number,
            KeyValue::Binary(_) => KeyType::Binary,
        }
    }

    /// Coerces an item attribute into a key scalar of the declared type.
    ///
    /// `Value::Int` widens to a number key. Non-finite floats are rejected
    /// so that encoded order stays total.
    ///
    /// # Errors
    ///
    /// [`KeyCoercionError::WrongType`] on a type mismatch,
    /// [`KeyCoercionError::NotFinite`] on NaN or infinity.
    pub fn from_attribute(value: &Value, key_type: KeyType) -> Result<Self, KeyCoercionError> {
        match (key_type, value) {
            (KeyType::String, Value::String(s)) => Ok(KeyValue::String(s.clone())),
            (KeyType::Number, Value::Int(i)) => {
                // i64 -> f64 is lossy above 2^53; number keys share f64
                // semantics with the value model.
                #[allow(clippy::cast_precision_loss)]
                Ok(KeyValue::Number(*i as f64))
            }
            (KeyType::Number, Value::Float(f)) => {
                if f.is_finite() {
                    Ok(KeyValue::Number(*f))
                } else {
                    Err(KeyCoercionError::NotFinite)
                }
            }
            (KeyType::Binary, Value::Bytes(b)) => Ok(KeyValue::Binary(b.clone())),
            (expected, actual) => Err(KeyCoercionError::WrongType {
                expected,
                actual: actual.type_name(),
            }),
        }
    }

    /// Appends this scalar's order-preserving encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            KeyValue::Number(n) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&encode_f64_ordered(*n));
            }
            KeyValue::String(s) => {
                out.push(TAG_STRING);
                push_escaped(out, s.as_bytes());
                push_terminator(out);
            }
            KeyValue::Binary(b) => {
                out.push(TAG_BINARY);
                push_escaped(out, b);
                push_terminator(out);
            }
        }
    }

    /// This scalar's order-preserving encoding as a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Encoded-form prefix matching every string key that starts with
    /// `prefix` (the `begins_with` predicate). The escape transform maps
    /// bytes independently, so escaping a logical prefix yields a byte
    /// prefix of the full escaped string.
    #[must_use]
    pub fn encode_string_prefix(prefix: &str) -> Vec<u8> {
        let mut out = vec![TAG_STRING];
        push_escaped(&mut out, prefix.as_bytes());
        out
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Number(a), KeyValue::Number(b)) => a.total_cmp(b),
            (KeyValue::String(a), KeyValue::String(b)) => a.cmp(b),
            (KeyValue::Binary(a), KeyValue::Binary(b)) => a.cmp(b),
            // Mixed types never meet within one schema-typed component;
            // fall back to encoded byte order for a consistent total order.
            _ => self.encode().cmp(&other.encode()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::String(s) => write!(f, "{s:?}"),
            KeyValue::Number(n) => write!(f, "{n}"),
            KeyValue::Binary(b) => write!(f, "0x{}", hex_string(b)),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The primary key of an item: partition scalar plus optional sort scalar.
///
/// Encodes to a single byte string whose order is (partition, sort)
/// lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Partition key scalar.
    pub partition: KeyValue,
    /// Sort key scalar, for tables with a declared sort key.
    pub sort: Option<KeyValue>,
}

impl PrimaryKey {
    /// Creates a primary key from its components.
    #[must_use]
    pub fn new(partition: KeyValue, sort: Option<KeyValue>) -> Self {
        Self { partition, sort }
    }

    /// Encodes the full primary key (partition, then sort).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.partition.encode_into(&mut out);
        if let Some(sort) = &self.sort {
            sort.encode_into(&mut out);
        }
        out
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "({}, {})", self.partition, sort),
            None => write!(f, "({})", self.partition),
        }
    }
}

/// Composite-key delimiter in the string encoding.
const COMPOSITE_DELIMITER: char = '#';
/// Composite-key escape character in the string encoding.
const COMPOSITE_ESCAPE: char = '\\';

/// An explicit two-part logical key, for encoding two attributes into one
/// string-typed index hash attribute.
///
/// Encoding contract: `head` and `tail` are joined with `#`; literal `#`
/// and `\` inside either part are escaped as `\#` and `\\`. [`parse`]
/// inverts [`encode`] exactly, so values containing the delimiter cannot
/// collide with values that do not.
///
/// [`encode`]: CompositeKey::encode
/// [`parse`]: CompositeKey::parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeKey {
    /// Leading logical component.
    pub head: String,
    /// Trailing logical component.
    pub tail: String,
}

impl CompositeKey {
    /// Creates a composite key from its two logical parts.
    #[must_use]
    pub fn new(head: impl Into<String>, tail: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            tail: tail.into(),
        }
    }

    /// Encodes the composite key into its delimited string form.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.head.len() + self.tail.len() + 1);
        escape_composite_part(&mut out, &self.head);
        out.push(COMPOSITE_DELIMITER);
        escape_composite_part(&mut out, &self.tail);
        out
    }

    /// Parses a delimited string form back into its two parts.
    ///
    /// # Errors
    ///
    /// Fails if the string has no unescaped delimiter, more than one, or a
    /// dangling escape character.
    pub fn parse(encoded: &str) -> anyhow::Result<Self> {
        let mut head = String::new();
        let mut tail = String::new();
        let mut current = &mut head;
        let mut saw_delimiter = false;
        let mut chars = encoded.chars();

        while let Some(c) = chars.next() {
            match c {
                COMPOSITE_ESCAPE => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("dangling escape in composite key"))?;
                    if escaped != COMPOSITE_DELIMITER && escaped != COMPOSITE_ESCAPE {
                        anyhow::bail!("invalid escape sequence '\\{escaped}' in composite key");
                    }
                    current.push(escaped);
                }
                COMPOSITE_DELIMITER => {
                    if saw_delimiter {
                        anyhow::bail!("composite key has more than one delimiter");
                    }
                    saw_delimiter = true;
                    current = &mut tail;
                }
                other => current.push(other),
            }
        }

        if !saw_delimiter {
            anyhow::bail!("composite key has no delimiter");
        }
        Ok(Self { head, tail })
    }
}

fn escape_composite_part(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == COMPOSITE_DELIMITER || c == COMPOSITE_ESCAPE {
            out.push(COMPOSITE_ESCAPE);
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn number_encoding_orders_across_sign() {
        let values = [-1e9, -2.5, -1.0, -0.0, 0.0, 0.5, 1.0, 2004.0, 1e9];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| KeyValue::Number(*v).encode())
            .collect();
        for window in encoded.windows(2) {
            assert!(window[0] <= window[1], "encoding must be monotone");
        }
    }

    #[test]
    fn string_prefix_order_survives_terminator() {
        let a = KeyValue::String("a".to_string()).encode();
        let ab = KeyValue::String("ab".to_string()).encode();
        let a_nul = KeyValue::String("a\u{0}".to_string()).encode();
        assert!(a < ab);
        assert!(a < a_nul);
        assert!(a_nul < ab, "escaped NUL sorts before printable bytes");
    }

    #[test]
    fn tuple_order_matches_component_order() {
        // (2004, "Beta") must sort between (2004, "Alpha") and (2005, "Alpha").
        let alpha = PrimaryKey::new(
            KeyValue::Number(2004.0),
            Some(KeyValue::String("Alpha".to_string())),
        );
        let beta = PrimaryKey::new(
            KeyValue::Number(2004.0),
            Some(KeyValue::String("Beta".to_string())),
        );
        let next_year = PrimaryKey::new(
            KeyValue::Number(2005.0),
            Some(KeyValue::String("Alpha".to_string())),
        );
        assert!(alpha.encode() < beta.encode());
        assert!(beta.encode() < next_year.encode());
    }

    #[test]
    fn encode_string_prefix_is_byte_prefix_of_full_encoding() {
        let full = KeyValue::String("Little Black Book".to_string()).encode();
        let prefix = KeyValue::encode_string_prefix("Little");
        assert!(full.starts_with(&prefix));

        let other = KeyValue::String("Gamma".to_string()).encode();
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn prefix_successor_bounds_the_prefix_range() {
        let prefix = KeyValue::encode_string_prefix("ab");
        let successor = prefix_successor(&prefix).expect("not all 0xFF");
        let inside = KeyValue::String("abz".to_string()).encode();
        let outside = KeyValue::String("ac".to_string()).encode();
        assert!(inside > prefix && inside < successor);
        assert!(outside >= successor);
    }

    #[test]
    fn prefix_successor_handles_trailing_ff() {
        assert_eq!(prefix_successor(&[0x01, 0xFF, 0xFF]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn from_attribute_widens_int_to_number() {
        let kv = KeyValue::from_attribute(&Value::Int(2004), KeyType::Number).unwrap();
        assert_eq!(kv, KeyValue::Number(2004.0));
    }

    #[test]
    fn from_attribute_rejects_wrong_type() {
        let err = KeyValue::from_attribute(&Value::Int(1), KeyType::String).unwrap_err();
        assert_eq!(
            err,
            KeyCoercionError::WrongType {
                expected: KeyType::String,
                actual: "int"
            }
        );
    }

    #[test]
    fn from_attribute_rejects_nan() {
        let err = KeyValue::from_attribute(&Value::Float(f64::NAN), KeyType::Number).unwrap_err();
        assert_eq!(err, KeyCoercionError::NotFinite);
    }

    #[test]
    fn composite_key_round_trips_delimiter_collisions() {
        let tricky = CompositeKey::new("1#active", "author\\42");
        let encoded = tricky.encode();
        assert_eq!(CompositeKey::parse(&encoded).unwrap(), tricky);

        // The naive concatenation of these parts would be ambiguous.
        let plain = CompositeKey::new("1", "active#author\\42");
        assert_ne!(plain.encode(), tricky.encode());
    }

    #[test]
    fn composite_key_parse_rejects_malformed_input() {
        assert!(CompositeKey::parse("no-delimiter").is_err());
        assert!(CompositeKey::parse("a#b#c").is_err());
        assert!(CompositeKey::parse("a#b\\").is_err());
        assert!(CompositeKey::parse("a\\zb#c").is_err());
    }

    proptest! {
        #[test]
        fn prop_number_encoding_preserves_order(a in proptest::num::f64::NORMAL, b in proptest::num::f64::NORMAL) {
            let ka = KeyValue::Number(a);
            let kb = KeyValue::Number(b);
            prop_assert_eq!(ka.cmp(&kb), ka.encode().cmp(&kb.encode()));
        }

        #[test]
        fn prop_string_encoding_preserves_order(a in ".*", b in ".*") {
            let ka = KeyValue::String(a);
            let kb = KeyValue::String(b);
            prop_assert_eq!(ka.cmp(&kb), ka.encode().cmp(&kb.encode()));
        }

        #[test]
        fn prop_binary_encoding_preserves_order(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let ka = KeyValue::Binary(a);
            let kb = KeyValue::Binary(b);
            prop_assert_eq!(ka.cmp(&kb), ka.encode().cmp(&kb.encode()));
        }

        #[test]
        fn prop_composite_key_round_trips(head in ".*", tail in ".*") {
            let key = CompositeKey::new(head, tail);
            let parsed = CompositeKey::parse(&key.encode()).unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
