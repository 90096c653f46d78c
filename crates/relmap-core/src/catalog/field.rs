//! Attribute definitions.

use serde::{Deserialize, Serialize};

use super::types::{ColumnDef, ValueConverter};
use relmap_proto::SqlType;

/// A named column inside an embedded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDef {
    /// Component property name.
    pub name: String,
    /// Backing column.
    pub column: ColumnDef,
}

impl ComponentDef {
    /// Create a component definition.
    pub fn new(name: impl Into<String>, column: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            column: ColumnDef::new(column, sql_type),
        }
    }
}

/// How an attribute is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    /// A single column, optionally converted.
    Basic {
        column: ColumnDef,
        converter: Option<ValueConverter>,
    },
    /// Several columns forming one embedded value.
    Embedded { components: Vec<ComponentDef> },
}

/// A persistent attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name (unique within its entity).
    pub name: String,
    /// Storage shape.
    pub kind: AttributeKind,
}

impl AttributeDef {
    /// A single-column attribute.
    pub fn basic(name: impl Into<String>, column: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Basic {
                column: ColumnDef::new(column, sql_type),
                converter: None,
            },
        }
    }

    /// A single-column attribute whose column type is dictated by `converter`.
    pub fn converted(
        name: impl Into<String>,
        column: impl Into<String>,
        converter: ValueConverter,
    ) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Basic {
                column: ColumnDef::new(column, converter.relational_type()),
                converter: Some(converter),
            },
        }
    }

    /// A multi-column embedded attribute.
    pub fn embedded(name: impl Into<String>, components: Vec<ComponentDef>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Embedded { components },
        }
    }

    /// Backing columns, in declaration order.
    pub fn columns(&self) -> Vec<&ColumnDef> {
        match &self.kind {
            AttributeKind::Basic { column, .. } => vec![column],
            AttributeKind::Embedded { components } => {
                components.iter().map(|c| &c.column).collect()
            }
        }
    }

    /// Column names, in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns().into_iter().map(|c| c.name.as_str()).collect()
    }

    /// JDBC types of the backing columns.
    pub fn sql_types(&self) -> Vec<SqlType> {
        self.columns().into_iter().map(|c| c.sql_type).collect()
    }

    /// Number of backing columns.
    pub fn column_span(&self) -> usize {
        match &self.kind {
            AttributeKind::Basic { .. } => 1,
            AttributeKind::Embedded { components } => components.len(),
        }
    }

    /// Whether the attribute spans more than one column.
    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, AttributeKind::Embedded { .. })
    }

    /// The converter of a basic attribute.
    pub fn converter(&self) -> Option<&ValueConverter> {
        match &self.kind {
            AttributeKind::Basic { converter, .. } => converter.as_ref(),
            AttributeKind::Embedded { .. } => None,
        }
    }

    /// A component of an embedded attribute.
    pub fn component(&self, name: &str) -> Option<&ComponentDef> {
        match &self.kind {
            AttributeKind::Basic { .. } => None,
            AttributeKind::Embedded { components } => components.iter().find(|c| c.name == name),
        }
    }

    /// Component names of an embedded attribute.
    pub fn component_names(&self) -> Vec<String> {
        match &self.kind {
            AttributeKind::Basic { .. } => vec![],
            AttributeKind::Embedded { components } => {
                components.iter().map(|c| c.name.clone()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_attribute() {
        let attr = AttributeDef::basic("name", "name", SqlType::Varchar);
        assert_eq!(attr.column_span(), 1);
        assert_eq!(attr.column_names(), vec!["name"]);
        assert!(attr.converter().is_none());
        assert!(!attr.is_embedded());
    }

    #[test]
    fn test_converted_attribute_uses_relational_type() {
        let attr = AttributeDef::converted("active", "active_flag", ValueConverter::YesNoBoolean);
        assert_eq!(attr.sql_types(), vec![SqlType::Varchar]);
        assert_eq!(attr.converter(), Some(&ValueConverter::YesNoBoolean));
    }

    #[test]
    fn test_embedded_attribute() {
        let attr = AttributeDef::embedded(
            "address",
            vec![
                ComponentDef::new("street", "street", SqlType::Varchar),
                ComponentDef::new("city", "city", SqlType::Varchar),
            ],
        );
        assert_eq!(attr.column_span(), 2);
        assert_eq!(attr.component("city").unwrap().column.name, "city");
        assert!(attr.component("zip").is_none());
        assert_eq!(attr.component_names(), vec!["street", "city"]);
    }
}
