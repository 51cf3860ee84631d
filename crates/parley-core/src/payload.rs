//! User-visible message fields.
//!
//! A [`Payload`] is a JSON object whose own keys never start with
//! [`RESERVED_PREFIX`]. Client data can only become a payload through
//! [`Payload::from_untrusted`], which also rejects reserved keys at any
//! depth. Server code builds payloads with [`Payload::text`] and
//! [`Payload::with`], which refuse reserved keys; nested values it inserts
//! (history records) may carry them.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::InboundError;

/// Prefix marking keys that only the server may set.
pub const RESERVED_PREFIX: char = '_';

/// Whether `key` belongs to the server-reserved namespace.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// JSON object of user-defined fields (`text`, `name`, `recipient`, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload carrying only a `text` field.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with("text", Value::String(text.into()))
    }

    /// Admit untrusted client data.
    ///
    /// Non-object values are coerced to `{"text": value}`. The whole tree is
    /// then walked; any reserved key, or nesting deeper than `max_depth`,
    /// rejects the payload.
    pub fn from_untrusted(value: Value, max_depth: usize) -> Result<Self, InboundError> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                let _ = map.insert("text".to_string(), other);
                map
            }
        };
        check_object(&map, 1, max_depth)?;
        Ok(Self(map))
    }

    /// Builder-style insert of a server-chosen field.
    ///
    /// Reserved keys are ignored.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.insert(key, value);
        self
    }

    /// Insert a server-chosen field. Returns `false` (and does nothing) for
    /// reserved keys.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if is_reserved_key(key) {
            return false;
        }
        let _ = self.0.insert(key.to_string(), value.into());
        true
    }

    /// Raw field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer field, if present and numeric.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn check_value(value: &Value, depth: usize, max_depth: usize) -> Result<(), InboundError> {
    match value {
        Value::Object(map) => check_object(map, depth + 1, max_depth),
        Value::Array(items) => {
            if depth + 1 > max_depth {
                return Err(InboundError::TooDeep(max_depth));
            }
            items
                .iter()
                .try_for_each(|item| check_value(item, depth + 1, max_depth))
        }
        _ => Ok(()),
    }
}

fn check_object(
    map: &Map<String, Value>,
    depth: usize,
    max_depth: usize,
) -> Result<(), InboundError> {
    if depth > max_depth {
        return Err(InboundError::TooDeep(max_depth));
    }
    for (key, value) in map {
        if is_reserved_key(key) {
            return Err(InboundError::ReservedKey(key.clone()));
        }
        check_value(value, depth, max_depth)?;
    }
    Ok(())
}
