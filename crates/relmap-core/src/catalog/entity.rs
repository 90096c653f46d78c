//! Entity definitions.

use serde::{Deserialize, Serialize};

use super::field::{AttributeDef, ComponentDef};
use super::types::ColumnDef;
use relmap_proto::SqlType;

/// A filter condition attached to an entity.
///
/// `condition` is an SQL fragment where `{alias}` stands for the entity's
/// table alias and `:name` for a filter parameter set on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Filter name, enabled per session.
    pub name: String,
    /// SQL condition.
    pub condition: String,
}

/// A mapped entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within schema).
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Identifier; embedded when the id is composite.
    pub identifier: AttributeDef,
    /// Non-identifier attributes, in declaration order.
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    /// Filters that can restrict queries over this entity.
    #[serde(default)]
    pub filters: Vec<EntityFilter>,
}

impl EntityDef {
    /// Create an entity with a single-column identifier.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        id_column: impl Into<String>,
        id_type: SqlType,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identifier: AttributeDef::basic("id", id_column, id_type),
            attributes: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Create an entity with a composite identifier.
    pub fn with_composite_id(
        name: impl Into<String>,
        table: impl Into<String>,
        components: Vec<ComponentDef>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identifier: AttributeDef::embedded("id", components),
            attributes: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = AttributeDef>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Attach a filter condition.
    pub fn with_filter(mut self, name: impl Into<String>, condition: impl Into<String>) -> Self {
        self.filters.push(EntityFilter {
            name: name.into(),
            condition: condition.into(),
        });
        self
    }

    /// Get an attribute by name; `id` resolves to the identifier.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        if name == self.identifier.name {
            return Some(&self.identifier);
        }
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Identifier columns.
    pub fn id_columns(&self) -> Vec<&ColumnDef> {
        self.identifier.columns()
    }

    /// Identifier column names.
    pub fn id_column_names(&self) -> Vec<&str> {
        self.identifier.column_names()
    }

    /// Whether the identifier spans several columns.
    pub fn has_composite_id(&self) -> bool {
        self.identifier.is_embedded()
    }

    /// Get a filter by name.
    pub fn get_filter(&self, name: &str) -> Option<&EntityFilter> {
        self.filters.iter().find(|f| f.name == name)
    }

    /// Total number of columns selected when loading the entity.
    pub fn column_span(&self) -> usize {
        self.identifier.column_span()
            + self.attributes.iter().map(|a| a.column_span()).sum::<usize>()
    }
}
