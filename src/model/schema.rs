//! Schema definitions for structured and enum types.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{OdexError, Result};
use crate::types::convert::EnumMembers;
use crate::types::{PrimitiveKind, TypeKind, TypeRef};

/// Central registry of all types known to the compiler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    /// Entity and complex types by qualified name.
    types: HashMap<String, StructuredType>,
    /// Enum types by qualified name.
    #[serde(default)]
    enums: HashMap<String, EnumType>,
}

impl Model {
    /// Creates a new empty model.
    #[must_use]
    pub fn new() -> Self {
        Model {
            types: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    /// Registers a structured type.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A type with the same name already exists
    /// - The base type doesn't exist or is of a different kind
    /// - A property name is declared twice along the inheritance chain
    /// - An entity type without a base declares no key, or a key property is missing
    pub fn add_type(&mut self, ty: StructuredType) -> Result<()> {
        if self.types.contains_key(&ty.name) || self.enums.contains_key(&ty.name) {
            return Err(OdexError::SchemaError(format!(
                "Type '{}' already exists",
                ty.name
            )));
        }

        let mut seen = HashSet::new();
        for name in ty.member_names() {
            if !seen.insert(name) {
                return Err(OdexError::SchemaError(format!(
                    "Duplicate property name '{name}' on '{}'",
                    ty.name
                )));
            }
        }

        match &ty.base_type {
            Some(base) => {
                let base_ty = self.types.get(base).ok_or_else(|| {
                    OdexError::SchemaError(format!("Base type '{base}' does not exist"))
                })?;
                if base_ty.kind != ty.kind {
                    return Err(OdexError::SchemaError(format!(
                        "Type '{}' and its base '{base}' differ in kind",
                        ty.name
                    )));
                }
                for name in ty.member_names() {
                    if self.find_member(base, name).is_some() {
                        return Err(OdexError::SchemaError(format!(
                            "Property '{name}' on '{}' hides an inherited property",
                            ty.name
                        )));
                    }
                }
                if !ty.key.is_empty() {
                    return Err(OdexError::SchemaError(format!(
                        "Derived type '{}' cannot redeclare the key",
                        ty.name
                    )));
                }
            }
            None if ty.kind == StructuredKind::Entity => {
                if ty.key.is_empty() {
                    return Err(OdexError::SchemaError(format!(
                        "Entity type '{}' must declare a key",
                        ty.name
                    )));
                }
                for key in &ty.key {
                    if ty.structural(key).is_none() {
                        return Err(OdexError::SchemaError(format!(
                            "Key property '{key}' not found in '{}'",
                            ty.name
                        )));
                    }
                }
            }
            None => {}
        }

        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    /// Registers an enum type.
    ///
    /// # Errors
    ///
    /// Returns an error if a type with the same name already exists.
    pub fn add_enum(&mut self, ty: EnumType) -> Result<()> {
        if self.types.contains_key(&ty.name) || self.enums.contains_key(&ty.name) {
            return Err(OdexError::SchemaError(format!(
                "Type '{}' already exists",
                ty.name
            )));
        }
        self.enums.insert(ty.name.clone(), ty);
        Ok(())
    }

    /// Retrieves a structured type by name.
    #[must_use]
    pub fn structured_type(&self, name: &str) -> Option<&StructuredType> {
        self.types.get(name)
    }

    /// Retrieves an enum type by name.
    #[must_use]
    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    /// Returns all structured type names.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Resolves a qualified type name to a type reference: primitive kinds
    /// first, then enums, then entity and complex types.
    #[must_use]
    pub fn resolve_type_name(&self, name: &str) -> Option<TypeRef> {
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return Some(TypeRef::primitive(kind, true));
        }
        if self.enums.contains_key(name) {
            return Some(TypeRef::enumeration(name));
        }
        self.types.get(name).map(StructuredType::type_ref)
    }

    /// Walks the inheritance chain from `name` up to the root.
    pub fn ancestors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a StructuredType> + 'a {
        let mut next = self.types.get(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.base_type.as_ref().and_then(|b| self.types.get(b));
            Some(current)
        })
    }

    /// Returns whether `derived` is `base` or inherits from it.
    #[must_use]
    pub fn is_derived_from(&self, derived: &str, base: &str) -> bool {
        self.ancestors(derived).any(|t| t.name == base)
    }

    /// Returns whether a value statically typed `a` can ever be an instance
    /// of `b` (one is a subtype of the other).
    #[must_use]
    pub fn is_related(&self, a: &str, b: &str) -> bool {
        self.is_derived_from(a, b) || self.is_derived_from(b, a)
    }

    /// Returns `name` plus every type deriving from it.
    #[must_use]
    pub fn derived_types(&self, name: &str) -> BTreeSet<String> {
        self.types
            .keys()
            .filter(|candidate| self.is_derived_from(candidate, name))
            .cloned()
            .collect()
    }

    /// Finds a structural or navigation property on `type_name` or its ancestors.
    #[must_use]
    pub fn find_member(&self, type_name: &str, name: &str) -> Option<Member<'_>> {
        self.ancestors(type_name).find_map(|t| {
            t.structural(name)
                .map(Member::Structural)
                .or_else(|| t.navigation(name).map(Member::Navigation))
        })
    }

    /// Returns the key property names of an entity type (declared on its root).
    #[must_use]
    pub fn key_properties(&self, type_name: &str) -> Vec<String> {
        self.ancestors(type_name)
            .find(|t| !t.key.is_empty())
            .map(|t| t.key.clone())
            .unwrap_or_default()
    }

    /// Returns the concurrency-token properties of a type, root first.
    #[must_use]
    pub fn concurrency_tokens(&self, type_name: &str) -> Vec<String> {
        let mut chain: Vec<&StructuredType> = self.ancestors(type_name).collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|t| t.properties.iter())
            .filter(|p| p.concurrency_token)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Returns whether a type (or any ancestor) is open.
    #[must_use]
    pub fn is_open(&self, type_name: &str) -> bool {
        self.ancestors(type_name).any(|t| t.is_open)
    }

    /// Serializes the model to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| OdexError::ModelError(format!("Failed to serialize model: {e}")))
    }

    /// Deserializes a model from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| OdexError::ModelError(format!("Failed to deserialize model: {e}")))
    }
}

/// A property found by [`Model::find_member`].
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Structural(&'a StructuralProperty),
    Navigation(&'a NavigationProperty),
}

impl Member<'_> {
    /// Returns the declared type of the member.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Member::Structural(p) => p.type_ref.clone(),
            Member::Navigation(n) => n.type_ref(),
        }
    }
}

/// Entity or complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuredKind {
    Entity,
    Complex,
}

/// Schema definition of an entity or complex type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredType {
    /// Qualified type name.
    pub name: String,
    pub kind: StructuredKind,
    /// Base type name, if derived.
    pub base_type: Option<String>,
    /// Key property names (root entity types only).
    pub key: Vec<String>,
    /// Declared structural properties.
    pub properties: Vec<StructuralProperty>,
    /// Declared navigation properties.
    pub navigations: Vec<NavigationProperty>,
    /// Whether instances carry a dynamic property dictionary.
    pub is_open: bool,
}

impl StructuredType {
    /// Creates an entity type.
    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), StructuredKind::Entity)
    }

    /// Creates a complex type.
    #[must_use]
    pub fn complex(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), StructuredKind::Complex)
    }

    fn with_kind(name: String, kind: StructuredKind) -> Self {
        StructuredType {
            name,
            kind,
            base_type: None,
            key: Vec::new(),
            properties: Vec::new(),
            navigations: Vec::new(),
            is_open: false,
        }
    }

    /// Sets the base type.
    #[must_use]
    pub fn derived_from(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    /// Sets the key property names.
    #[must_use]
    pub fn with_key(mut self, key: &[&str]) -> Self {
        self.key = key.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Adds a structural property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.properties.push(StructuralProperty::new(name, type_ref));
        self
    }

    /// Adds a structural property flagged as a concurrency token.
    #[must_use]
    pub fn with_concurrency_token(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        let mut property = StructuralProperty::new(name, type_ref);
        property.concurrency_token = true;
        self.properties.push(property);
        self
    }

    /// Adds a navigation property.
    #[must_use]
    pub fn with_navigation(mut self, navigation: NavigationProperty) -> Self {
        self.navigations.push(navigation);
        self
    }

    /// Marks the type as open.
    #[must_use]
    pub fn open(mut self) -> Self {
        self.is_open = true;
        self
    }

    /// Returns a non-nullable reference to this type.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        match self.kind {
            StructuredKind::Entity => TypeRef::entity(self.name.clone()),
            StructuredKind::Complex => TypeRef::complex(self.name.clone()).with_nullable(false),
        }
    }

    /// Finds a declared structural property by name.
    #[must_use]
    pub fn structural(&self, name: &str) -> Option<&StructuralProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Finds a declared navigation property by name.
    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigations.iter().find(|n| n.name == name)
    }

    fn member_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.navigations.iter().map(|n| n.name.as_str()))
    }
}

/// Definition of a structural property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralProperty {
    pub name: String,
    pub type_ref: TypeRef,
    /// Whether the property participates in optimistic concurrency (ETags).
    pub concurrency_token: bool,
}

impl StructuralProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        StructuralProperty {
            name: name.into(),
            type_ref,
            concurrency_token: false,
        }
    }
}

/// Definition of a navigation property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationProperty {
    pub name: String,
    /// Qualified name of the target entity type.
    pub target_type: String,
    /// Collection-valued (true) or single-valued (false).
    pub is_collection: bool,
    /// Whether a single-valued navigation may be absent.
    pub nullable: bool,
    /// Name of the container (entity set) holding the targets.
    pub target_container: Option<String>,
}

impl NavigationProperty {
    /// Creates a nullable single-valued navigation.
    #[must_use]
    pub fn single(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        NavigationProperty {
            name: name.into(),
            target_type: target_type.into(),
            is_collection: false,
            nullable: true,
            target_container: None,
        }
    }

    /// Creates a collection-valued navigation.
    #[must_use]
    pub fn collection(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        NavigationProperty {
            is_collection: true,
            ..Self::single(name, target_type)
        }
    }

    /// Marks a single-valued navigation as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the target container name.
    #[must_use]
    pub fn in_container(mut self, container: impl Into<String>) -> Self {
        self.target_container = Some(container.into());
        self
    }

    /// Returns the type of the navigation value.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        let target = TypeRef::entity(self.target_type.clone());
        if self.is_collection {
            TypeRef::collection(target)
        } else {
            target.with_nullable(self.nullable)
        }
    }
}

/// Schema definition of an enum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<(String, i64)>,
    /// Whether members combine as bit flags.
    pub is_flags: bool,
}

impl EnumType {
    #[must_use]
    pub fn new(name: impl Into<String>, members: &[(&str, i64)]) -> Self {
        EnumType {
            name: name.into(),
            members: members
                .iter()
                .map(|(n, v)| ((*n).to_string(), *v))
                .collect(),
            is_flags: false,
        }
    }

    /// Marks the enum as a flags enum.
    #[must_use]
    pub fn flags(mut self) -> Self {
        self.is_flags = true;
        self
    }
}

impl EnumMembers for EnumType {
    fn member_value(&self, name: &str) -> Option<i64> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    fn member_name(&self, value: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

/// Returns the element entity/complex name of a (collection) type.
#[must_use]
pub fn structured_element_name(type_ref: &TypeRef) -> Option<&str> {
    match &type_ref.kind {
        TypeKind::Collection(element) => element.structured_name(),
        _ => type_ref.structured_name(),
    }
}
