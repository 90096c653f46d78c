//! Incremental construction of a select over mapped entities.

use std::collections::BTreeSet;

use crate::catalog::{AttributeDef, AttributeKind, Cardinality, Catalog, EntityDef, RelationDef, ValueConverter};
use crate::error::TranslationError;
use crate::exec::JdbcParameterBindings;
use crate::results::{
    AttributeReader, EntityDescriptor, FetchDescriptor, MappedResult, ResultDescriptor,
    ResultSetMapping,
};
use crate::sql::{
    ExpressableType, Expression, ParameterId, Predicate, QuerySpec, SqlSelection, SqlTuple,
    TableGroup, TableGroupJoin, TableReference,
};
use crate::translate::influencers::{InternalFetchProfile, LoadQueryInfluencers};
use crate::translate::lock::LockableAlias;
use relmap_proto::{ComparisonOp, JoinType, SqlType, Value};

/// A query alias and the table group backing it.
#[derive(Debug)]
pub(crate) struct AliasEntry<'c> {
    pub alias: String,
    pub sql_alias: String,
    pub entity: &'c EntityDef,
    /// Owner alias index and association, for joined aliases.
    pub owner: Option<(usize, &'c RelationDef)>,
    pub fetch: bool,
}

/// A property path resolved against the aliases of a query.
#[derive(Debug)]
pub(crate) struct ResolvedPath<'c> {
    pub path: String,
    pub expression: Expression,
    pub converter: Option<&'c ValueConverter>,
    pub components: Vec<String>,
}

pub(crate) struct QueryBuilder<'c> {
    catalog: &'c Catalog,
    pub aliases: Vec<AliasEntry<'c>>,
    pub spec: QuerySpec,
    pub bindings: JdbcParameterBindings,
    next_parameter: ParameterId,
}

impl<'c> QueryBuilder<'c> {
    /// Start a select rooted at `entity` under `alias`.
    pub fn new(catalog: &'c Catalog, entity: &str, alias: &str) -> Result<Self, TranslationError> {
        let root = catalog
            .entity(entity)
            .ok_or_else(|| TranslationError::UnknownEntity(entity.to_string()))?;
        let sql_alias = sql_alias_for(alias);
        let mut spec = QuerySpec::default();
        spec.from_clause.make_table_space(TableGroup {
            alias: alias.to_string(),
            entity: root.name.clone(),
            table: TableReference {
                table: root.table.clone(),
                sql_alias: sql_alias.clone(),
            },
        });
        Ok(Self {
            catalog,
            aliases: vec![AliasEntry {
                alias: alias.to_string(),
                sql_alias,
                entity: root,
                owner: None,
                fetch: false,
            }],
            spec,
            bindings: JdbcParameterBindings::new(),
            next_parameter: 0,
        })
    }

    pub fn root(&self) -> &AliasEntry<'c> {
        &self.aliases[0]
    }

    pub fn alias_index(&self, alias: &str) -> Option<usize> {
        self.aliases.iter().position(|a| a.alias == alias)
    }

    /// Join the association named by `path` (`alias.association`, or a root association).
    pub fn add_join(
        &mut self,
        path: &str,
        alias: &str,
        join_type: JoinType,
        fetch: bool,
    ) -> Result<(), TranslationError> {
        let (owner_alias, association) = match path.rsplit_once('.') {
            Some((owner, association)) => (owner, association),
            None => (self.aliases[0].alias.as_str(), path),
        };
        let owner_index = self
            .alias_index(owner_alias)
            .ok_or_else(|| TranslationError::UnknownAlias(owner_alias.to_string()))?;
        if self.alias_index(alias).is_some() {
            return Err(TranslationError::DuplicateAlias(alias.to_string()));
        }
        let owner = self.aliases[owner_index].entity;
        let relation = self.catalog.relation(&owner.name, association).ok_or_else(|| {
            TranslationError::UnknownAssociation {
                entity: owner.name.clone(),
                association: association.to_string(),
            }
        })?;
        if relation.cardinality == Cardinality::ManyToMany {
            return Err(TranslationError::UnsupportedJoin(format!(
                "{}.{} is a many-to-many association",
                owner.name, association
            )));
        }
        let target = self
            .catalog
            .entity(&relation.to_entity)
            .ok_or_else(|| TranslationError::UnknownEntity(relation.to_entity.clone()))?;

        let sql_alias = sql_alias_for(alias);
        let owner_type = column_type(owner, &relation.from_column);
        let target_type = column_type(target, &relation.to_column);
        let predicate = Predicate::relational(
            ComparisonOp::Eq,
            Expression::column(
                self.aliases[owner_index].sql_alias.clone(),
                relation.from_column.clone(),
                owner_type.or(target_type).unwrap_or(SqlType::BigInt),
            ),
            Expression::column(
                sql_alias.clone(),
                relation.to_column.clone(),
                target_type.or(owner_type).unwrap_or(SqlType::BigInt),
            ),
        )?;

        self.spec.from_clause.spaces[0].joins.push(TableGroupJoin {
            join_type,
            group: TableGroup {
                alias: alias.to_string(),
                entity: target.name.clone(),
                table: TableReference {
                    table: target.table.clone(),
                    sql_alias: sql_alias.clone(),
                },
            },
            predicate,
        });
        self.aliases.push(AliasEntry {
            alias: alias.to_string(),
            sql_alias,
            entity: target,
            owner: Some((owner_index, relation)),
            fetch,
        });
        Ok(())
    }

    /// Add fetch joins for the root associations named by enabled fetch
    /// profiles, the entity graph and the internal fetch profile.
    pub fn add_influencer_fetches(
        &mut self,
        influencers: &LoadQueryInfluencers,
    ) -> Result<(), TranslationError> {
        let root = self.aliases[0].entity;
        let mut associations: Vec<String> = Vec::new();

        for name in &influencers.enabled_fetch_profiles {
            let profile = self
                .catalog
                .fetch_profile(name)
                .ok_or_else(|| TranslationError::UnknownFetchProfile(name.clone()))?;
            associations.extend(profile.fetches_for(&root.name).map(str::to_string));
        }
        if let Some(graph) = influencers
            .entity_graph
            .as_ref()
            .filter(|g| g.entity == root.name)
        {
            associations.extend(graph.attribute_nodes.iter().cloned());
        }
        if let Some(profile) = influencers.internal_fetch_profile {
            for relation in self.catalog.relations_from(&root.name) {
                let cascades = match profile {
                    InternalFetchProfile::Merge => relation.cascade.merge,
                    InternalFetchProfile::Refresh => relation.cascade.refresh,
                };
                if cascades && relation.cardinality != Cardinality::ManyToMany {
                    associations.push(relation.name.clone());
                }
            }
        }

        let root_alias = self.aliases[0].alias.clone();
        for association in associations {
            let already_joined = self.aliases.iter().any(|a| {
                a.owner
                    .is_some_and(|(owner, relation)| owner == 0 && relation.name == association)
            });
            if already_joined {
                continue;
            }
            let alias = format!("{}_fetch", association);
            self.add_join(
                &format!("{}.{}", root_alias, association),
                &alias,
                JoinType::LeftOuter,
                true,
            )?;
        }
        Ok(())
    }

    /// Apply enabled session filters declared by the joined entities.
    ///
    /// Root filters restrict the where clause; filters of joined entities
    /// restrict their join condition.
    pub fn apply_filters(&mut self, influencers: &LoadQueryInfluencers) -> Result<(), TranslationError> {
        for index in 0..self.aliases.len() {
            let entity = self.aliases[index].entity;
            for (name, parameters) in &influencers.enabled_filters {
                let Some(filter) = entity.get_filter(name) else {
                    continue;
                };
                let (sql, names) =
                    expand_filter_condition(&filter.condition, &self.aliases[index].sql_alias);
                let mut expressions = Vec::with_capacity(names.len());
                for parameter in names {
                    let value = parameters.get(&parameter).ok_or_else(|| {
                        TranslationError::MissingFilterParameter {
                            filter: name.clone(),
                            parameter: parameter.clone(),
                        }
                    })?;
                    expressions.push(self.parameter(value_expressable(value), vec![value.clone()]));
                }
                let predicate = Predicate::Fragment {
                    sql,
                    parameters: expressions,
                };
                if index == 0 {
                    self.spec.add_restriction(predicate);
                } else {
                    let join = &mut self.spec.from_clause.spaces[0].joins[index - 1];
                    join.predicate = Predicate::and(vec![join.predicate.clone(), predicate]);
                }
            }
        }
        Ok(())
    }

    /// Allocate a parameter and bind its values.
    pub fn parameter(&mut self, expressable: ExpressableType, values: Vec<Value>) -> Expression {
        let id = self.next_parameter;
        self.next_parameter += 1;
        self.bindings.bind(id, values);
        Expression::parameter(id, expressable)
    }

    /// Allocate a parameter whose value is bound at execution time.
    pub fn unbound_parameter(&mut self, expressable: ExpressableType) -> Expression {
        let id = self.next_parameter;
        self.next_parameter += 1;
        Expression::parameter(id, expressable)
    }

    /// Resolve `alias.property`, `property`, `alias.embedded.component` or `id`.
    pub fn resolve_path(&self, path: &str) -> Result<ResolvedPath<'c>, TranslationError> {
        let segments: Vec<&str> = path.split('.').collect();
        let (index, rest) = match segments.split_first() {
            Some((first, rest)) if !rest.is_empty() => match self.alias_index(first) {
                Some(index) => (index, rest),
                None if self.aliases[0].entity.get_attribute(first).is_some() => (0, &segments[..]),
                None => return Err(TranslationError::UnknownAlias(first.to_string())),
            },
            _ => (0, &segments[..]),
        };
        let entry = &self.aliases[index];
        let unknown = || TranslationError::UnknownProperty {
            entity: entry.entity.name.clone(),
            property: path.to_string(),
        };

        match rest {
            [name] => {
                let attribute = entry.entity.get_attribute(name).ok_or_else(unknown)?;
                Ok(ResolvedPath {
                    path: path.to_string(),
                    expression: attribute_expression(&entry.sql_alias, attribute)?,
                    converter: attribute.converter(),
                    components: attribute.component_names(),
                })
            }
            [name, component] => {
                let component = entry
                    .entity
                    .get_attribute(name)
                    .and_then(|a| a.component(component))
                    .ok_or_else(unknown)?;
                Ok(ResolvedPath {
                    path: path.to_string(),
                    expression: Expression::column(
                        entry.sql_alias.clone(),
                        component.column.name.clone(),
                        component.column.sql_type,
                    ),
                    converter: None,
                    components: Vec::new(),
                })
            }
            _ => Err(unknown()),
        }
    }

    /// Identifier expression of an alias.
    pub fn id_expression(&self, index: usize) -> Result<Expression, TranslationError> {
        let entry = &self.aliases[index];
        attribute_expression(&entry.sql_alias, &entry.entity.identifier)
    }

    /// Select `expression`, reusing an identical selection if present.
    pub fn select_or_find(&mut self, expression: Expression) -> SqlSelection {
        match self.spec.select_clause.find(&expression) {
            Some(selection) => selection.clone(),
            None => self.spec.select_clause.add(expression),
        }
    }

    /// Select every column of an alias's entity and its fetched associations.
    pub fn entity_descriptor(&mut self, index: usize) -> Result<EntityDescriptor, TranslationError> {
        let entity = self.aliases[index].entity;
        let sql_alias = self.aliases[index].sql_alias.clone();

        let id_expression = attribute_expression(&sql_alias, &entity.identifier)?;
        let id = self.select_or_find(id_expression);

        let mut attributes = Vec::with_capacity(entity.attributes.len());
        for attribute in &entity.attributes {
            let expression = attribute_expression(&sql_alias, attribute)?;
            attributes.push(AttributeReader {
                name: attribute.name.clone(),
                selection: self.select_or_find(expression),
                converter: attribute.converter().cloned(),
                components: attribute.component_names(),
            });
        }

        let fetched: Vec<(usize, &'c RelationDef)> = self
            .aliases
            .iter()
            .enumerate()
            .filter_map(|(i, a)| match a.owner {
                Some((owner, relation)) if a.fetch && owner == index => Some((i, relation)),
                _ => None,
            })
            .collect();
        let mut fetches = Vec::with_capacity(fetched.len());
        for (target_index, relation) in fetched {
            fetches.push(FetchDescriptor {
                association: relation.name.clone(),
                collection: relation.is_collection(),
                target: self.entity_descriptor(target_index)?,
            });
        }

        Ok(EntityDescriptor {
            entity: entity.name.clone(),
            alias: self.aliases[index].alias.clone(),
            id,
            attributes,
            fetches,
        })
    }

    /// One entity result per returned alias: non-fetch joins in declaration
    /// order, then the root.
    pub fn entity_results(&mut self) -> Result<Vec<MappedResult>, TranslationError> {
        let returned: Vec<usize> = (1..self.aliases.len())
            .filter(|&i| !self.aliases[i].fetch)
            .chain(std::iter::once(0))
            .collect();
        let mut results = Vec::with_capacity(returned.len());
        for index in returned {
            let descriptor = self.entity_descriptor(index)?;
            results.push(MappedResult {
                descriptor: ResultDescriptor::Entity(descriptor),
                user_alias: Some(self.aliases[index].alias.clone()),
                include_in_result: true,
            });
        }
        Ok(results)
    }

    /// Aliases eligible for locking.
    pub fn lockable_aliases(&self) -> Vec<LockableAlias> {
        self.aliases
            .iter()
            .map(|a| LockableAlias {
                alias: a.alias.clone(),
                sql_alias: a.sql_alias.clone(),
                key_columns: a
                    .entity
                    .id_column_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
            .collect()
    }

    /// Tables of every joined entity.
    pub fn query_spaces(&self) -> BTreeSet<String> {
        self.aliases.iter().map(|a| a.entity.table.clone()).collect()
    }

    /// Result set mapping over the current select clause.
    pub fn mapping(&self, results: Vec<MappedResult>) -> ResultSetMapping {
        ResultSetMapping {
            selections: self.spec.select_clause.selections(),
            results,
            column_count: self.spec.select_clause.column_count(),
        }
    }
}

/// SQL alias of a query alias.
pub(crate) fn sql_alias_for(alias: &str) -> String {
    format!("{}_", alias)
}

/// Expression covering every column of an attribute.
pub(crate) fn attribute_expression(
    sql_alias: &str,
    attribute: &AttributeDef,
) -> Result<Expression, TranslationError> {
    match &attribute.kind {
        AttributeKind::Basic { column, .. } => Ok(Expression::column(
            sql_alias.to_string(),
            column.name.clone(),
            column.sql_type,
        )),
        AttributeKind::Embedded { components } => {
            let columns = components
                .iter()
                .map(|c| Expression::column(sql_alias.to_string(), c.column.name.clone(), c.column.sql_type))
                .collect();
            Ok(Expression::Tuple(SqlTuple::new(columns)?))
        }
    }
}

/// Shape of a parameter bound to `value` when no column type applies.
pub(crate) fn value_expressable(value: &Value) -> ExpressableType {
    value
        .sql_type()
        .map_or(ExpressableType::Inferred, ExpressableType::Basic)
}

/// Type of a mapped column, if `column` belongs to the entity's id or attributes.
fn column_type(entity: &EntityDef, column: &str) -> Option<SqlType> {
    std::iter::once(&entity.identifier)
        .chain(entity.attributes.iter())
        .flat_map(|a| a.columns())
        .find(|c| c.name == column)
        .map(|c| c.sql_type)
}

/// Replace `{alias}` and turn `:name` parameters into `?`, returning the
/// parameter names in order. `::` is kept as a cast operator.
pub(crate) fn expand_filter_condition(condition: &str, sql_alias: &str) -> (String, Vec<String>) {
    let condition = condition.replace("{alias}", sql_alias);
    let mut sql = String::with_capacity(condition.len());
    let mut names = Vec::new();
    let mut chars = condition.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != ':' {
            sql.push(ch);
            continue;
        }
        if chars.peek() == Some(&':') {
            chars.next();
            sql.push_str("::");
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            sql.push(':');
        } else {
            sql.push('?');
            names.push(name);
        }
    }
    (sql, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_filter_condition() {
        let (sql, names) =
            expand_filter_condition("{alias}.region = :region and {alias}.tier >= :tier", "c_");
        assert_eq!(sql, "c_.region = ? and c_.tier >= ?");
        assert_eq!(names, vec!["region".to_string(), "tier".to_string()]);
    }

    #[test]
    fn test_expand_filter_condition_keeps_casts() {
        let (sql, names) = expand_filter_condition("{alias}.created::date = :day", "o_");
        assert_eq!(sql, "o_.created::date = ?");
        assert_eq!(names, vec!["day".to_string()]);
    }
}
