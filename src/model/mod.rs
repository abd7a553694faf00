//! Conversion data model

mod mapping;
mod query;
mod result;

pub use mapping::{ControlMapping, StorageLocation};
pub use query::{DeclaredParameter, LegacyType, QueryDescriptor, QueryType};
pub use result::{
    ConversionResult, Diagnostics, ExtractedFunction, ObjectKind, StateReference,
};
