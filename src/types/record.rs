//! Entity and complex instances.

use std::collections::BTreeMap;

use super::value::Value;

/// An entity or complex instance: declared properties plus, for open types,
/// a side dictionary of dynamic properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    type_name: String,
    properties: BTreeMap<String, Value>,
    dynamic: Option<BTreeMap<String, Value>>,
}

impl Record {
    /// Creates an empty instance of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Record {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
            dynamic: None,
        }
    }

    /// Sets a declared property.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a dynamic property, creating the dictionary if needed.
    #[must_use]
    pub fn with_dynamic(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.dynamic
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Gives the instance an empty dynamic dictionary.
    #[must_use]
    pub fn with_empty_dynamic(mut self) -> Self {
        self.dynamic.get_or_insert_with(BTreeMap::new);
        self
    }

    /// Sets a declared property.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Returns the runtime type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Gets a declared property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Returns the dynamic dictionary, if the instance has one.
    #[must_use]
    pub fn dynamic_properties(&self) -> Option<&BTreeMap<String, Value>> {
        self.dynamic.as_ref()
    }

    /// Looks up a dynamic property: null when the dictionary is absent or
    /// does not contain the key.
    #[must_use]
    pub fn get_dynamic(&self, name: &str) -> Value {
        match &self.dynamic {
            Some(dynamic) if dynamic.contains_key(name) => {
                dynamic.get(name).cloned().unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    }

    /// Returns an iterator over declared properties.
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }
}
