//! Mapping catalog.
//!
//! The catalog describes entities, their attributes and identifiers, the
//! associations between them, filters and fetch profiles. Everything the
//! translator and decoder need about the schema is resolved from here at
//! compile time, never at row-read time.

mod catalog;
mod entity;
mod field;
mod relation;
mod schema;
mod types;

pub use catalog::Catalog;
pub use entity::{EntityDef, EntityFilter};
pub use field::{AttributeDef, AttributeKind, ComponentDef};
pub use relation::{Cardinality, CascadeStyle, RelationDef};
pub use schema::{FetchDef, FetchProfileDef, SchemaBundle};
pub use types::{ColumnDef, ValueConverter};
