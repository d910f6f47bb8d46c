//! Model for the types a query can address.

mod schema;

pub use schema::{
    structured_element_name, EnumType, Member, Model, NavigationProperty, StructuralProperty,
    StructuredKind, StructuredType,
};
