//! Compile-time shapes of synthesized result records.
//!
//! A shape is an ordered slot list fixed when a clause is compiled. Every
//! record produced by the same compiled projector or aggregation has the
//! same shape; the evaluator walks the slots to fill in values.

use serde::{Deserialize, Serialize};

use super::data_type::TypeRef;

/// Why a slot is present in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// Structural property named in the selection.
    Selected,
    /// Key or concurrency-token property added to a partial selection.
    AutoSelected,
    /// Open-type property looked up by name.
    Dynamic,
    /// Property defined by a `$compute` clause.
    Computed,
    /// Expanded navigation property (nested record or collection of records).
    Expanded,
    /// Count of an expanded collection, taken before paging.
    NestedCount,
    /// Grouping key (or nested key level) of an aggregation result.
    GroupKey,
    /// Aggregate value of an aggregation result.
    Aggregate,
}

/// One named slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotShape {
    pub name: String,
    pub type_ref: TypeRef,
    pub kind: SlotKind,
}

impl SlotShape {
    #[must_use]
    pub fn new(name: impl Into<String>, type_ref: TypeRef, kind: SlotKind) -> Self {
        SlotShape {
            name: name.into(),
            type_ref,
            kind,
        }
    }
}

/// Ordered slot list of a synthesized record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BagShape {
    /// Slots in evaluation order.
    pub slots: Vec<SlotShape>,
    /// Type of the full instance carried when everything was selected.
    pub instance_type: Option<TypeRef>,
}

impl BagShape {
    /// Creates an empty shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether records of this shape carry the full source instance.
    #[must_use]
    pub fn has_instance(&self) -> bool {
        self.instance_type.is_some()
    }

    /// Finds a slot by name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&SlotShape> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Finds the index of a slot by name.
    #[must_use]
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Returns slot names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the names of the slots of the given kind.
    #[must_use]
    pub fn names_of(&self, kind: SlotKind) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
