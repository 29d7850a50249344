//! State message: a mapping from caller-defined keys to values

use crate::error::MessageError;
use crate::value::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Key of the sentinel entry that marks an envelope as ours
pub const SENTINEL_KEY: &str = "HeLlO";

/// Value the sentinel entry must carry
pub const SENTINEL_VALUE: &str = "wOrLd";

/// Named values relayed between host and client
///
/// Key order carries no meaning; a `BTreeMap` keeps encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMessage {
    fields: BTreeMap<String, Value>,
}

impl StateMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, refusing the reserved sentinel key
    pub fn try_insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, MessageError> {
        let key = key.into();
        if key == SENTINEL_KEY {
            return Err(MessageError::ReservedKey { key });
        }
        Ok(self.fields.insert(key, value.into()))
    }

    /// Builder-style insert
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self, MessageError> {
        self.try_insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Build a message from a whole map, refusing the reserved sentinel key
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Result<Self, MessageError> {
        if fields.contains_key(SENTINEL_KEY) {
            return Err(MessageError::ReservedKey {
                key: SENTINEL_KEY.to_string(),
            });
        }
        Ok(Self { fields })
    }

    /// Wrap a map the caller has already stripped of the sentinel key
    #[doc(hidden)]
    pub fn from_fields_unchecked(fields: BTreeMap<String, Value>) -> Self {
        debug_assert!(!fields.contains_key(SENTINEL_KEY));
        Self { fields }
    }
}

impl<'a> IntoIterator for &'a StateMessage {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl IntoIterator for StateMessage {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_key_rejected() {
        let mut msg = StateMessage::new();
        assert_eq!(
            msg.try_insert(SENTINEL_KEY, "x"),
            Err(MessageError::ReservedKey {
                key: SENTINEL_KEY.to_string()
            })
        );
        assert!(msg.is_empty());

        assert!(StateMessage::new().with(SENTINEL_KEY, 1).is_err());
    }

    #[test]
    fn test_from_fields_rejects_reserved_key() {
        let fields = BTreeMap::from([
            (SENTINEL_KEY.to_string(), Value::Int(7)),
            ("x".to_string(), Value::Int(1)),
        ]);
        assert!(matches!(
            StateMessage::from_fields(fields),
            Err(MessageError::ReservedKey { .. })
        ));

        let msg = StateMessage::from_fields(BTreeMap::from([("x".to_string(), Value::Int(1))])).unwrap();
        assert_eq!(msg.get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_builder_and_lookup() {
        let msg = StateMessage::new()
            .with("step", 3)
            .and_then(|m| m.with("loss", 0.25))
            .unwrap();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get("step"), Some(&Value::Int(3)));
        assert_eq!(msg.keys().collect::<Vec<_>>(), vec!["loss", "step"]);
    }
}
