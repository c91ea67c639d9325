//! Query request/response types and opaque cursor tokens.
//!
//! A query targets either the primary index (no index selector) or a named
//! secondary index, with an equality condition on the hash attribute and
//! an optional predicate on the range attribute. Responses carry a page of
//! items plus an opaque continuation token; the engine itself never holds
//! continuation state, so pagination is entirely caller-driven.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::key::KeyValue;
use crate::types::Item;

/// Predicate on a sort or index-range attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortPredicate {
    /// Exact match.
    Eq(KeyValue),
    /// String keys whose value starts with the given prefix.
    /// Only valid on string-typed range attributes.
    BeginsWith(String),
    /// Inclusive range `[low, high]`.
    Between(KeyValue, KeyValue),
}

/// Range condition: the attribute it applies to plus the predicate.
///
/// The attribute name is validated against the selected index's declared
/// range attribute before evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeCondition {
    /// Attribute the predicate applies to.
    pub attribute: String,
    /// The predicate itself.
    pub predicate: SortPredicate,
}

/// A query against the primary index or a named secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Secondary index to target; `None` means the primary index.
    pub index: Option<String>,
    /// Attribute name of the hash (partition) condition. Must match the
    /// selected index's declared hash attribute.
    pub hash_attribute: String,
    /// Equality value for the hash attribute.
    pub hash_value: KeyValue,
    /// Optional predicate on the range attribute.
    pub range: Option<RangeCondition>,
    /// Maximum number of items to return. `None` uses the engine default.
    pub limit: Option<usize>,
    /// Continuation token from a previous response.
    pub cursor: Option<String>,
}

impl QueryRequest {
    /// Builds a primary-index query with an equality hash condition only.
    #[must_use]
    pub fn primary(hash_attribute: impl Into<String>, hash_value: KeyValue) -> Self {
        Self {
            index: None,
            hash_attribute: hash_attribute.into(),
            hash_value,
            range: None,
            limit: None,
            cursor: None,
        }
    }

    /// Builds a query against a named secondary index.
    #[must_use]
    pub fn on_index(
        index: impl Into<String>,
        hash_attribute: impl Into<String>,
        hash_value: KeyValue,
    ) -> Self {
        Self {
            index: Some(index.into()),
            hash_attribute: hash_attribute.into(),
            hash_value,
            range: None,
            limit: None,
            cursor: None,
        }
    }

    /// Adds a range condition.
    #[must_use]
    pub fn with_range(mut self, attribute: impl Into<String>, predicate: SortPredicate) -> Self {
        self.range = Some(RangeCondition {
            attribute: attribute.into(),
            predicate,
        });
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the continuation token.
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// One page of query or scan results.
///
/// `next_cursor` is `None` when the result set is exhausted. An empty
/// `items` with a present cursor is possible (the page boundary landed on
/// the end of the matching range); callers should loop until the cursor
/// is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Matching items, ascending by sort/range order.
    pub items: Vec<Item>,
    /// Opaque continuation token for the next page.
    pub next_cursor: Option<String>,
    /// Whether more results are available.
    pub has_more: bool,
}

/// Decoded continuation cursor.
///
/// Encodes the last-evaluated key position; resumption is strictly after
/// this key. The `index` field pins a cursor to the index it was produced
/// by, so a token cannot be replayed against a different index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Index the cursor belongs to; `None` for the primary index.
    pub index: Option<String>,
    /// Encoded form of the last-evaluated key.
    pub last_key: Vec<u8>,
}

impl Cursor {
    /// Encodes this cursor into an opaque URL-safe token.
    ///
    /// # Errors
    ///
    /// Fails only if `MsgPack` serialization fails, which cannot happen
    /// for this struct in practice.
    pub fn encode_token(&self) -> anyhow::Result<String> {
        let bytes = rmp_serde::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decodes an opaque token back into a cursor.
    ///
    /// # Errors
    ///
    /// Fails on malformed base64 or `MsgPack` payloads.
    pub fn decode_token(token: &str) -> anyhow::Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| anyhow::anyhow!("cursor token is not valid base64: {e}"))?;
        let cursor = rmp_serde::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("cursor token payload is malformed: {e}"))?;
        Ok(cursor)
    }
}
