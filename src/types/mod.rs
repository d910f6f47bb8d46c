//! Value domain: static types, runtime values, instances and result shapes.

mod bag;
pub mod convert;
mod data_type;
mod record;
mod shape;
mod value;

pub use bag::{GroupResult, Grouping, PropertyBag};
pub use data_type::{PrimitiveKind, TypeKind, TypeRef};
pub use record::Record;
pub use shape::{BagShape, SlotKind, SlotShape};
pub use value::{EnumValue, Value};
