//! Classifications as typed slot vectors.
//!
//! The compiler maintains an explicit association between each observable
//! and a slot index (the [`Layout`]); a [`Classification`] is a vector of
//! optional values over that layout. Field access is by precomputed slot,
//! never by runtime name reflection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::value::Value;

/// Compiler-maintained accessor table: observable key to slot index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    keys: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Layout {
    /// Build a layout from observable keys in a fixed order.
    ///
    /// Duplicate keys are rejected; slot indices follow the given order.
    pub fn new(keys: Vec<String>) -> Result<Self, NetworkError> {
        let mut index = HashMap::with_capacity(keys.len());
        for (slot, key) in keys.iter().enumerate() {
            if index.insert(key.clone(), slot).is_some() {
                return Err(NetworkError::DuplicateObservable { key: key.clone() });
            }
        }
        Ok(Self { keys, index })
    }

    /// Slot index for an observable key.
    #[must_use]
    pub fn slot(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the layout has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Observable keys in slot order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Rebuild the key index after deserialization.
    fn reindex(&mut self) {
        self.index = self
            .keys
            .iter()
            .enumerate()
            .map(|(slot, key)| (key.clone(), slot))
            .collect();
    }
}

/// A partially-populated assignment of values to observables.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    layout: Arc<Layout>,
    slots: Vec<Option<Value>>,
}

impl Classification {
    /// An empty classification over a layout.
    #[must_use]
    pub fn new(layout: Arc<Layout>) -> Self {
        let slots = vec![None; layout.len()];
        Self { layout, slots }
    }

    /// The layout this classification is addressed by.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Value for an observable key, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let slot = self.layout.slot(key)?;
        self.slots[slot].as_ref()
    }

    /// Returns true if the observable has a value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set an observable's value.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::UnknownObservable` for keys outside the layout.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), NetworkError> {
        let slot = self
            .layout
            .slot(key)
            .ok_or_else(|| NetworkError::UnknownObservable {
                key: key.to_string(),
            })?;
        self.slots[slot] = Some(value);
        Ok(())
    }

    /// Clear an observable's value.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::UnknownObservable` for keys outside the layout.
    pub fn clear(&mut self, key: &str) -> Result<(), NetworkError> {
        let slot = self
            .layout
            .slot(key)
            .ok_or_else(|| NetworkError::UnknownObservable {
                key: key.to_string(),
            })?;
        self.slots[slot] = None;
        Ok(())
    }

    /// Builder-style `set` for fixture construction.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::UnknownObservable` for keys outside the layout.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Result<Self, NetworkError> {
        self.set(key, value.into())?;
        Ok(self)
    }

    /// Number of populated slots.
    #[must_use]
    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if no slot is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Iterate populated `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.layout
            .keys()
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(key, slot)| slot.as_ref().map(|value| (key.as_str(), value)))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for Classification {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.populated()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Deserialization requires a layout, so classifications deserialize through
/// [`Classification::from_map`].
impl Classification {
    /// Build a classification from a key/value map over a layout.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::UnknownObservable` for keys outside the layout.
    pub fn from_map(
        layout: Arc<Layout>,
        values: HashMap<String, Value>,
    ) -> Result<Self, NetworkError> {
        let mut classification = Self::new(layout);
        for (key, value) in values {
            classification.set(&key, value)?;
        }
        Ok(classification)
    }
}

impl<'de> Deserialize<'de> for Layout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            keys: Vec<String>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let mut layout = Layout {
            keys: raw.keys,
            index: HashMap::new(),
        };
        layout.reindex();
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Arc<Layout> {
        Arc::new(
            Layout::new(vec![
                "kingdom".to_string(),
                "genus".to_string(),
                "scientificName".to_string(),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn layout_rejects_duplicates() {
        assert!(Layout::new(vec!["a".to_string(), "a".to_string()]).is_err());
    }

    #[test]
    fn slots_follow_order() {
        let layout = layout();
        assert_eq!(layout.slot("kingdom"), Some(0));
        assert_eq!(layout.slot("scientificName"), Some(2));
        assert_eq!(layout.slot("family"), None);
    }

    #[test]
    fn set_get_clear() {
        let mut c = Classification::new(layout());
        assert!(c.is_empty());
        c.set("genus", Value::from("Acacia")).unwrap();
        assert_eq!(c.get("genus"), Some(&Value::from("Acacia")));
        assert!(c.has("genus"));
        assert_eq!(c.populated(), 1);
        c.clear("genus").unwrap();
        assert!(!c.has("genus"));
    }

    #[test]
    fn unknown_key_is_error() {
        let mut c = Classification::new(layout());
        assert!(c.set("order", Value::from("Fabales")).is_err());
        assert!(c.clear("order").is_err());
        assert_eq!(c.get("order"), None);
    }

    #[test]
    fn iteration_in_slot_order() {
        let c = Classification::new(layout())
            .with("scientificName", "Acacia dealbata")
            .unwrap()
            .with("kingdom", "Plantae")
            .unwrap();
        let keys: Vec<&str> = c.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["kingdom", "scientificName"]);
        assert_eq!(c.to_string(), "kingdom=Plantae, scientificName=Acacia dealbata");
    }

    #[test]
    fn serializes_as_map() {
        let c = Classification::new(layout())
            .with("kingdom", "Plantae")
            .unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, serde_json::json!({"kingdom": "Plantae"}));
    }

    #[test]
    fn from_map_round_trip() {
        let mut values = HashMap::new();
        values.insert("genus".to_string(), Value::from("Acacia"));
        let c = Classification::from_map(layout(), values).unwrap();
        assert_eq!(c.get("genus"), Some(&Value::from("Acacia")));
    }

    #[test]
    fn layout_deserialize_rebuilds_index() {
        let layout = layout();
        let json = serde_json::to_string(&*layout).unwrap();
        let back: Layout = serde_json::from_str(&json).unwrap();
        assert_eq!(back.slot("genus"), Some(1));
    }
}
