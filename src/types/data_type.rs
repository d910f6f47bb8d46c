//! Static type references used by the model, the AST and compiled expressions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::shape::BagShape;

/// Primitive (scalar) kinds.
///
/// The declaration order of the numeric kinds is the promotion order:
/// a binary operator over two different numeric kinds promotes both sides
/// to the later of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    Guid,
    Date,
    TimeOfDay,
    DateTimeOffset,
    Duration,
    Binary,
}

impl PrimitiveKind {
    /// All primitive kinds, in declaration order.
    pub const ALL: [PrimitiveKind; 16] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::SByte,
        PrimitiveKind::Int16,
        PrimitiveKind::Int32,
        PrimitiveKind::Int64,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
        PrimitiveKind::Decimal,
        PrimitiveKind::String,
        PrimitiveKind::Guid,
        PrimitiveKind::Date,
        PrimitiveKind::TimeOfDay,
        PrimitiveKind::DateTimeOffset,
        PrimitiveKind::Duration,
        PrimitiveKind::Binary,
    ];

    /// Returns the qualified name of the kind (`Edm.Int32`, ...).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Edm.Boolean",
            PrimitiveKind::Byte => "Edm.Byte",
            PrimitiveKind::SByte => "Edm.SByte",
            PrimitiveKind::Int16 => "Edm.Int16",
            PrimitiveKind::Int32 => "Edm.Int32",
            PrimitiveKind::Int64 => "Edm.Int64",
            PrimitiveKind::Single => "Edm.Single",
            PrimitiveKind::Double => "Edm.Double",
            PrimitiveKind::Decimal => "Edm.Decimal",
            PrimitiveKind::String => "Edm.String",
            PrimitiveKind::Guid => "Edm.Guid",
            PrimitiveKind::Date => "Edm.Date",
            PrimitiveKind::TimeOfDay => "Edm.TimeOfDay",
            PrimitiveKind::DateTimeOffset => "Edm.DateTimeOffset",
            PrimitiveKind::Duration => "Edm.Duration",
            PrimitiveKind::Binary => "Edm.Binary",
        }
    }

    /// Resolves a primitive kind from its qualified or short name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix("Edm.").unwrap_or(name);
        PrimitiveKind::ALL
            .into_iter()
            .find(|kind| &kind.name()[4..] == short)
    }

    /// Returns the position of a numeric kind in the promotion order.
    #[must_use]
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            PrimitiveKind::Byte => Some(0),
            PrimitiveKind::SByte => Some(1),
            PrimitiveKind::Int16 => Some(2),
            PrimitiveKind::Int32 => Some(3),
            PrimitiveKind::Int64 => Some(4),
            PrimitiveKind::Single => Some(5),
            PrimitiveKind::Double => Some(6),
            PrimitiveKind::Decimal => Some(7),
            _ => None,
        }
    }

    /// Returns whether this kind is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Returns whether this kind is an integral numeric kind.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte
                | PrimitiveKind::SByte
                | PrimitiveKind::Int16
                | PrimitiveKind::Int32
                | PrimitiveKind::Int64
        )
    }

    /// Returns whether this kind is a floating point kind.
    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(self, PrimitiveKind::Single | PrimitiveKind::Double)
    }

    /// Returns whether this kind is a temporal kind.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Date
                | PrimitiveKind::TimeOfDay
                | PrimitiveKind::DateTimeOffset
                | PrimitiveKind::Duration
        )
    }
}

/// Shape of a static type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Scalar value.
    Primitive(PrimitiveKind),
    /// Enum type, by qualified name.
    Enum(String),
    /// Entity type, by qualified name.
    Entity(String),
    /// Complex type, by qualified name.
    Complex(String),
    /// Collection of the element type.
    Collection(Box<TypeRef>),
    /// Dynamically typed value (open-type property).
    Untyped,
    /// Compiler-synthesized record (projection or aggregation result).
    Record(Arc<BagShape>),
}

/// A type plus nullability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl TypeRef {
    #[must_use]
    pub fn new(kind: TypeKind, nullable: bool) -> Self {
        TypeRef { kind, nullable }
    }

    /// Creates a primitive type reference.
    #[must_use]
    pub fn primitive(kind: PrimitiveKind, nullable: bool) -> Self {
        TypeRef::new(TypeKind::Primitive(kind), nullable)
    }

    /// Non-nullable `Edm.Boolean`.
    #[must_use]
    pub fn boolean() -> Self {
        TypeRef::primitive(PrimitiveKind::Boolean, false)
    }

    /// Non-nullable `Edm.Int32`.
    #[must_use]
    pub fn int32() -> Self {
        TypeRef::primitive(PrimitiveKind::Int32, false)
    }

    /// Non-nullable `Edm.Int64`.
    #[must_use]
    pub fn int64() -> Self {
        TypeRef::primitive(PrimitiveKind::Int64, false)
    }

    /// Nullable `Edm.String`.
    #[must_use]
    pub fn string() -> Self {
        TypeRef::primitive(PrimitiveKind::String, true)
    }

    /// Non-nullable entity reference.
    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        TypeRef::new(TypeKind::Entity(name.into()), false)
    }

    /// Nullable complex reference.
    #[must_use]
    pub fn complex(name: impl Into<String>) -> Self {
        TypeRef::new(TypeKind::Complex(name.into()), true)
    }

    /// Nullable enum reference.
    #[must_use]
    pub fn enumeration(name: impl Into<String>) -> Self {
        TypeRef::new(TypeKind::Enum(name.into()), true)
    }

    /// Collection of `element`. Collections themselves are nullable.
    #[must_use]
    pub fn collection(element: TypeRef) -> Self {
        TypeRef::new(TypeKind::Collection(Box::new(element)), true)
    }

    /// Dynamically typed, always nullable.
    #[must_use]
    pub fn untyped() -> Self {
        TypeRef::new(TypeKind::Untyped, true)
    }

    /// Synthesized record with the given shape.
    #[must_use]
    pub fn record(shape: Arc<BagShape>) -> Self {
        TypeRef::new(TypeKind::Record(shape), false)
    }

    /// Returns a copy with the given nullability.
    #[must_use]
    pub fn with_nullable(&self, nullable: bool) -> Self {
        TypeRef {
            kind: self.kind.clone(),
            nullable,
        }
    }

    /// Returns a nullable copy.
    #[must_use]
    pub fn as_nullable(&self) -> Self {
        self.with_nullable(true)
    }

    /// Returns the primitive kind, if primitive.
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.kind {
            TypeKind::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    /// Returns whether this is a numeric primitive.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.primitive_kind().is_some_and(|k| k.is_numeric())
    }

    /// Returns whether this is `Edm.Boolean`.
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        self.primitive_kind() == Some(PrimitiveKind::Boolean)
    }

    /// Returns whether this is `Edm.String`.
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.primitive_kind() == Some(PrimitiveKind::String)
    }

    /// Returns whether this is the dynamic type.
    #[must_use]
    pub fn is_untyped(&self) -> bool {
        matches!(self.kind, TypeKind::Untyped)
    }

    /// Returns whether this is a collection type.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, TypeKind::Collection(_))
    }

    /// Returns the element type of a collection.
    #[must_use]
    pub fn element_type(&self) -> Option<&TypeRef> {
        match &self.kind {
            TypeKind::Collection(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the enum type name, if an enum.
    #[must_use]
    pub fn enum_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Enum(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the entity or complex type name, if structured.
    #[must_use]
    pub fn structured_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Entity(name) | TypeKind::Complex(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the record shape, if a synthesized record.
    #[must_use]
    pub fn record_shape(&self) -> Option<&Arc<BagShape>> {
        match &self.kind {
            TypeKind::Record(shape) => Some(shape),
            _ => None,
        }
    }

    /// Returns the display name of the type (without nullability).
    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            TypeKind::Primitive(kind) => kind.name().to_string(),
            TypeKind::Enum(name) | TypeKind::Entity(name) | TypeKind::Complex(name) => name.clone(),
            TypeKind::Collection(element) => format!("Collection({})", element.name()),
            TypeKind::Untyped => "Edm.Untyped".to_string(),
            TypeKind::Record(_) => "Record".to_string(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.name())
        } else {
            f.write_str(&self.name())
        }
    }
}
