//! Entity identity contract.
//!
//! # Responsibility
//! - Mark a type as persistable and expose its uniquely-typed identifier.
//! - Map typed identifiers to the untyped key values the store understands.
//!
//! # Invariants
//! - Every entity has exactly one identifier of type `Entity::Key`.
//! - An identifier is immutable once assigned (by the session sequence or by
//!   the caller before the first save).
//! - Entities are plain data; related entities are never loaded implicitly.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use thiserror::Error;
use uuid::Uuid;

/// Untyped primary key value as stored by the engine.
///
/// Ordering is integers first (numeric), then text (lexicographic), matching
/// SQLite's ordering for an affinity-less key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// Identifier types usable as entity keys.
pub trait EntityKey: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {
    /// Converts the key into its stored representation.
    fn to_key_value(&self) -> KeyValue;

    /// Parses a stored key value; `None` when the stored shape does not fit.
    fn from_key_value(value: &KeyValue) -> Option<Self>;

    /// Returns whether this key still has to be assigned before first save.
    fn is_unassigned(&self) -> bool;

    /// Whether new keys are drawn from the session's integer sequence.
    fn uses_sequence() -> bool {
        false
    }

    /// Produces a fresh key. `sequence` is only meaningful for sequence-backed
    /// keys. Returns `None` when keys must be supplied by the caller.
    fn generate(sequence: i64) -> Option<Self>;
}

impl EntityKey for i64 {
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int(*self)
    }

    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Int(value) => Some(*value),
            KeyValue::Text(_) => None,
        }
    }

    fn is_unassigned(&self) -> bool {
        *self == 0
    }

    fn uses_sequence() -> bool {
        true
    }

    fn generate(sequence: i64) -> Option<Self> {
        Some(sequence)
    }
}

impl EntityKey for Uuid {
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Text(self.to_string())
    }

    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Text(value) => Uuid::parse_str(value).ok(),
            KeyValue::Int(_) => None,
        }
    }

    fn is_unassigned(&self) -> bool {
        self.is_nil()
    }

    fn generate(_sequence: i64) -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl EntityKey for String {
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Text(self.clone())
    }

    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Text(value) => Some(value.clone()),
            KeyValue::Int(_) => None,
        }
    }

    fn is_unassigned(&self) -> bool {
        self.is_empty()
    }

    fn generate(_sequence: i64) -> Option<Self> {
        None
    }
}

/// Validation failure raised before an entity is staged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {message}")]
pub struct EntityValidationError {
    pub kind: &'static str,
    pub message: String,
}

impl EntityValidationError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A persistable record with one typed identifier.
///
/// `KIND` names the backing table and must be a plain SQL identifier.
/// Navigation fields (related entities) should be `#[serde(skip)]` so they
/// are filled only through explicit include specs.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Key: EntityKey;

    const KIND: &'static str;

    fn id(&self) -> &Self::Key;

    fn set_id(&mut self, id: Self::Key);

    /// Checks field-level invariants. Called before every staged insert/update.
    fn validate(&self) -> Result<(), EntityValidationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityKey, KeyValue};
    use uuid::Uuid;

    #[test]
    fn key_value_orders_integers_before_text() {
        let mut keys = vec![
            KeyValue::Text("b".to_string()),
            KeyValue::Int(10),
            KeyValue::Text("a".to_string()),
            KeyValue::Int(2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                KeyValue::Int(2),
                KeyValue::Int(10),
                KeyValue::Text("a".to_string()),
                KeyValue::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn integer_keys_come_from_sequence() {
        assert!(0_i64.is_unassigned());
        assert!(!7_i64.is_unassigned());
        assert!(i64::uses_sequence());
        assert_eq!(i64::generate(42), Some(42));
        assert_eq!(i64::from_key_value(&KeyValue::Text("1".into())), None);
    }

    #[test]
    fn uuid_keys_are_generated_locally() {
        assert!(Uuid::nil().is_unassigned());
        assert!(!Uuid::uses_sequence());
        let generated = Uuid::generate(0).unwrap();
        assert!(!generated.is_nil());
        assert_eq!(
            Uuid::from_key_value(&generated.to_key_value()),
            Some(generated)
        );
    }

    #[test]
    fn string_keys_must_be_supplied() {
        assert!(String::new().is_unassigned());
        assert_eq!(String::generate(1), None);
    }
}
