//! Projection and aggregation results.

use std::collections::{BTreeMap, BTreeSet};

use super::value::Value;

/// Result of a compiled projector for one source element.
///
/// Entries keep the order of the compile-time shape. When everything was
/// selected the bag carries the full source instance instead of copying
/// its properties into entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyBag {
    instance: Option<Value>,
    entries: Vec<(String, Value)>,
    auto_selected: BTreeSet<String>,
}

impl PropertyBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag carrying the full instance.
    #[must_use]
    pub fn with_instance(instance: Value) -> Self {
        PropertyBag {
            instance: Some(instance),
            ..Self::default()
        }
    }

    /// Appends an entry.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    /// Appends an entry that was added for identity rather than selection.
    pub fn push_auto_selected(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.auto_selected.insert(name.clone());
        self.entries.push((name, value));
    }

    /// Returns the full instance, if everything was selected.
    #[must_use]
    pub fn instance(&self) -> Option<&Value> {
        self.instance.as_ref()
    }

    /// Returns the itemized entries in shape order.
    #[must_use]
    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// Returns the names of the entries in shape order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Returns whether the named entry was added automatically.
    #[must_use]
    pub fn is_auto_selected(&self, name: &str) -> bool {
        self.auto_selected.contains(name)
    }

    /// Returns the names of automatically added entries.
    #[must_use]
    pub fn auto_selected(&self) -> &BTreeSet<String> {
        &self.auto_selected
    }

    /// Gets a value by name: entries first, then the carried instance
    /// (declared, then dynamic properties).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some((_, value)) = self.entries.iter().find(|(n, _)| n == name) {
            return Some(value.clone());
        }
        match &self.instance {
            Some(Value::Resource(record)) => record.get(name).cloned().or_else(|| {
                record
                    .dynamic_properties()
                    .and_then(|d| d.get(name).cloned())
            }),
            _ => None,
        }
    }

    /// Returns the number of itemized entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.instance.is_none()
    }

    /// Flattens the bag into a name -> value map.
    ///
    /// A carried instance contributes its declared and dynamic properties;
    /// itemized entries override them.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        if let Some(Value::Resource(record)) = &self.instance {
            for (name, value) in record.properties() {
                map.insert(name.clone(), value.clone());
            }
            if let Some(dynamic) = record.dynamic_properties() {
                for (name, value) in dynamic {
                    map.insert(name.clone(), value.clone());
                }
            }
        }
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.clone());
        }
        map
    }
}

/// One output record of an aggregation: the group key bag plus the bag of
/// aggregate values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupResult {
    pub key: PropertyBag,
    pub aggregates: PropertyBag,
}

impl GroupResult {
    /// Gets a value by name, looking in the key first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.key.get(name).or_else(|| self.aggregates.get(name))
    }

    /// Flattens key and aggregates into one map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = self.key.to_map();
        map.extend(self.aggregates.to_map());
        map
    }
}

/// A partition of the source sharing one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grouping {
    pub key: Value,
    pub elements: Vec<Value>,
}
