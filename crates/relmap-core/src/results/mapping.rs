//! Result set mapping.
//!
//! The mapping is built once at translation time. It says which JDBC columns
//! belong to which caller-visible result and how each result is decoded, so
//! reading a row never consults the catalog.

use crate::catalog::ValueConverter;
use crate::error::Error;
use crate::exec::jdbc::ResultSetMetadata;
use crate::sql::SqlSelection;
use relmap_proto::SqlType;

/// How one attribute of an entity result is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReader {
    pub name: String,
    pub selection: SqlSelection,
    pub converter: Option<ValueConverter>,
    /// Component names of an embedded attribute; empty for basic ones.
    pub components: Vec<String>,
}

/// An association fetched together with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchDescriptor {
    pub association: String,
    /// Whether the association is a collection.
    pub collection: bool,
    pub target: EntityDescriptor,
}

/// How an entity result is assembled from its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity: String,
    /// Query alias the entity was selected under.
    pub alias: String,
    /// Identifier columns; a composite id spans several.
    pub id: SqlSelection,
    pub attributes: Vec<AttributeReader>,
    pub fetches: Vec<FetchDescriptor>,
}

impl EntityDescriptor {
    /// Whether this entity or any nested fetch fetches a collection.
    pub fn contains_collection_fetches(&self) -> bool {
        self.fetches
            .iter()
            .any(|f| f.collection || f.target.contains_collection_fetches())
    }
}

/// Shape of one result in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultDescriptor {
    /// A single column, optionally converted to its domain value.
    Scalar {
        selection: SqlSelection,
        converter: Option<ValueConverter>,
    },
    /// A contiguous multi-column value such as an embedded attribute.
    Tuple {
        selection: SqlSelection,
        components: Vec<String>,
    },
    /// A mapped entity.
    Entity(EntityDescriptor),
}

impl ResultDescriptor {
    /// Whether this result fetches a collection.
    pub fn contains_collection_fetches(&self) -> bool {
        match self {
            ResultDescriptor::Entity(entity) => entity.contains_collection_fetches(),
            _ => false,
        }
    }
}

/// A result together with its caller-facing alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedResult {
    pub descriptor: ResultDescriptor,
    pub user_alias: Option<String>,
    /// `false` for auxiliary results dropped before transformation.
    pub include_in_result: bool,
}

/// Column layout and result descriptors of a compiled select.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSetMapping {
    /// Every selection of the select clause, in JDBC order.
    pub selections: Vec<SqlSelection>,
    /// Results in declaration order.
    pub results: Vec<MappedResult>,
    /// Total number of JDBC columns.
    pub column_count: usize,
}

impl ResultSetMapping {
    /// Whether any result fetches a collection, requiring row merging.
    pub fn contains_collection_fetches(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.descriptor.contains_collection_fetches())
    }

    /// Aliases of the results passed to transformers.
    pub fn user_aliases(&self) -> Vec<Option<String>> {
        self.results
            .iter()
            .filter(|r| r.include_in_result)
            .map(|r| r.user_alias.clone())
            .collect()
    }

    /// Resolve the JDBC type of every column against live result set metadata.
    ///
    /// Declared types win; inferred selections are looked up by column label,
    /// then by position. A column no source knows stays `None` and is read
    /// untyped row by row.
    pub fn resolve_column_types(&self, metadata: &ResultSetMetadata) -> Result<Vec<Option<SqlType>>, Error> {
        if metadata.columns.len() < self.column_count {
            return Err(Error::ResultShape(format!(
                "result set has {} columns, mapping expects {}",
                metadata.columns.len(),
                self.column_count
            )));
        }
        let mut types: Vec<Option<SqlType>> = vec![None; self.column_count];
        for selection in &self.selections {
            for (offset, declared) in selection.expressable.sql_types().into_iter().enumerate() {
                let index = selection.values_array_position() + offset;
                let resolved = declared
                    .or_else(|| {
                        selection
                            .column_alias
                            .as_deref()
                            .and_then(|alias| metadata.find_column(alias))
                            .and_then(|i| metadata.column_type(i))
                    })
                    .or_else(|| metadata.column_type(index));
                if let Some(slot) = types.get_mut(index) {
                    *slot = resolved;
                }
            }
        }
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::jdbc::ColumnMetadata;
    use crate::sql::ExpressableType;

    fn selection(position: usize, expressable: ExpressableType, alias: Option<&str>) -> SqlSelection {
        SqlSelection {
            jdbc_position: position,
            expressable,
            column_alias: alias.map(str::to_string),
        }
    }

    fn scalar(selection: SqlSelection, include: bool) -> MappedResult {
        MappedResult {
            descriptor: ResultDescriptor::Scalar {
                selection,
                converter: None,
            },
            user_alias: None,
            include_in_result: include,
        }
    }

    #[test]
    fn test_inferred_type_resolved_by_label() {
        let mapping = ResultSetMapping {
            selections: vec![
                selection(1, ExpressableType::Basic(SqlType::BigInt), None),
                selection(2, ExpressableType::Inferred, Some("total")),
            ],
            results: vec![],
            column_count: 2,
        };
        let metadata = ResultSetMetadata::new(vec![
            ColumnMetadata::new("id", Some(SqlType::BigInt)),
            ColumnMetadata::new("TOTAL", Some(SqlType::Double)),
        ]);
        assert_eq!(
            mapping.resolve_column_types(&metadata).unwrap(),
            vec![Some(SqlType::BigInt), Some(SqlType::Double)]
        );
    }

    #[test]
    fn test_unresolvable_type_is_left_to_the_row_reader() {
        let mapping = ResultSetMapping {
            selections: vec![selection(1, ExpressableType::Inferred, Some("x"))],
            results: vec![],
            column_count: 1,
        };
        let metadata = ResultSetMetadata::new(vec![ColumnMetadata::new("y", None)]);
        assert_eq!(mapping.resolve_column_types(&metadata).unwrap(), vec![None]);
    }

    #[test]
    fn test_user_aliases_skip_hidden_results() {
        let mut visible = scalar(selection(1, ExpressableType::Basic(SqlType::Varchar), None), true);
        visible.user_alias = Some("name".into());
        let hidden = scalar(selection(2, ExpressableType::Basic(SqlType::Double), None), false);
        let mapping = ResultSetMapping {
            selections: vec![],
            results: vec![visible, hidden],
            column_count: 2,
        };
        assert_eq!(mapping.user_aliases(), vec![Some("name".to_string())]);
        assert!(!mapping.contains_collection_fetches());
    }
}
