//! Table and secondary-index schema definitions.
//!
//! A [`TableSchema`] declares the partition key and optional sort key of a
//! table; an [`IndexSchema`] declares the hash/range attributes and the
//! projection policy of a global secondary index. Both carry the key
//! extraction and validation helpers the engine relies on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::{KeyType, KeyValue, PrimaryKey};
use crate::types::Item;

/// A key attribute definition: attribute name plus declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    /// Attribute name.
    pub name: String,
    /// Declared key type.
    pub key_type: KeyType,
}

impl KeyDefinition {
    /// Creates a key definition.
    #[must_use]
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
        }
    }

    /// Extracts this key attribute from an item.
    ///
    /// Returns `Ok(None)` when the attribute is absent (the sparse-index
    /// case) and an error when it is present with the wrong type or a
    /// non-finite number.
    ///
    /// # Errors
    ///
    /// [`SchemaViolation`] naming the offending attribute.
    pub fn extract(&self, item: &Item) -> Result<Option<KeyValue>, SchemaViolation> {
        match item.get(&self.name) {
            None => Ok(None),
            Some(value) => KeyValue::from_attribute(value, self.key_type)
                .map(Some)
                .map_err(|source| SchemaViolation {
                    attribute: self.name.clone(),
                    reason: source.to_string(),
                }),
        }
    }

    /// Extracts this key attribute, requiring it to be present.
    ///
    /// # Errors
    ///
    /// [`SchemaViolation`] when the attribute is missing, mistyped, or a
    /// non-finite number.
    pub fn extract_required(&self, item: &Item) -> Result<KeyValue, SchemaViolation> {
        self.extract(item)?.ok_or_else(|| SchemaViolation {
            attribute: self.name.clone(),
            reason: "required key attribute is missing".to_string(),
        })
    }

    /// Checks that a caller-supplied scalar matches the declared type.
    ///
    /// # Errors
    ///
    /// [`SchemaViolation`] on a type mismatch.
    pub fn check_value(&self, value: &KeyValue) -> Result<(), SchemaViolation> {
        if value.key_type() == self.key_type {
            Ok(())
        } else {
            Err(SchemaViolation {
                attribute: self.name.clone(),
                reason: format!(
                    "expected {} value, got {}",
                    self.key_type,
                    value.key_type()
                ),
            })
        }
    }
}

/// A single attribute-level schema failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// The attribute that violated the schema.
    pub attribute: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attribute '{}': {}", self.attribute, self.reason)
    }
}

impl std::error::Error for SchemaViolation {}

/// Schema of a table: name, partition key, optional sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Partition key definition.
    pub partition_key: KeyDefinition,
    /// Optional sort key definition.
    pub sort_key: Option<KeyDefinition>,
}

impl TableSchema {
    /// Extracts and validates an item's primary key.
    ///
    /// Both declared key attributes must be present with matching types.
    ///
    /// # Errors
    ///
    /// [`SchemaViolation`] naming the first offending attribute.
    pub fn primary_key_of(&self, item: &Item) -> Result<PrimaryKey, SchemaViolation> {
        let partition = self.partition_key.extract_required(item)?;
        let sort = match &self.sort_key {
            Some(def) => Some(def.extract_required(item)?),
            None => None,
        };
        Ok(PrimaryKey::new(partition, sort))
    }

    /// Validates caller-supplied key scalars against the declared types
    /// and assembles a [`PrimaryKey`].
    ///
    /// # Errors
    ///
    /// [`SchemaViolation`] on a type mismatch, a missing sort scalar for
    /// a table with a sort key, or a sort scalar for a table without one.
    pub fn primary_key_from_values(
        &self,
        partition: KeyValue,
        sort: Option<KeyValue>,
    ) -> Result<PrimaryKey, SchemaViolation> {
        self.partition_key.check_value(&partition)?;
        let sort = match (&self.sort_key, sort) {
            (Some(def), Some(value)) => {
                def.check_value(&value)?;
                Some(value)
            }
            (Some(def), None) => {
                return Err(SchemaViolation {
                    attribute: def.name.clone(),
                    reason: "sort key value is required".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(SchemaViolation {
                    attribute: self.partition_key.name.clone(),
                    reason: "table has no sort key".to_string(),
                })
            }
            (None, None) => None,
        };
        Ok(PrimaryKey::new(partition, sort))
    }
}

/// Which attributes a secondary index stores alongside its keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// Project every attribute of the item.
    All,
    /// Project only the index keys and the table's primary key attributes.
    KeysOnly,
    /// Project the keys plus the named attributes.
    Include(Vec<String>),
}

/// Schema of a global secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name, unique within the table.
    pub name: String,
    /// Hash key definition. Items lacking this attribute are omitted from
    /// the index (sparse semantics).
    pub hash_key: KeyDefinition,
    /// Optional range key definition.
    pub range_key: Option<KeyDefinition>,
    /// Projection policy.
    pub projection: Projection,
}

impl IndexSchema {
    /// Applies the projection policy to an item, given the owning table's
    /// schema (whose key attributes are always projected).
    #[must_use]
    pub fn project(&self, item: &Item, table: &TableSchema) -> Item {
        match &self.projection {
            Projection::All => item.clone(),
            Projection::KeysOnly => {
                let keep = |name: &str| self.is_key_attribute(name, table);
                item.iter()
                    .filter(|(name, _)| keep(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            }
            Projection::Include(extra) => item
                .iter()
                .filter(|(name, _)| {
                    self.is_key_attribute(name, table) || extra.iter().any(|e| e == *name)
                })
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    fn is_key_attribute(&self, name: &str, table: &TableSchema) -> bool {
        name == self.hash_key.name
            || self.range_key.as_ref().is_some_and(|def| def.name == name)
            || name == table.partition_key.name
            || table.sort_key.as_ref().is_some_and(|def| def.name == name)
    }
}
