//! Criteria query translation.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::builder::{value_expressable, QueryBuilder, ResolvedPath};
use super::influencers::LoadQueryInfluencers;
use super::lock::{plan_locking, FollowOnLock, FollowOnTarget, LockStrategy};
use crate::catalog::{Catalog, EntityDef};
use crate::dialect::Dialect;
use crate::error::TranslationError;
use crate::exec::{CompiledSelect, JdbcParameterBindings};
use crate::results::{MappedResult, ResultDescriptor, ResultSetMapping};
use crate::sql::{
    AggregateFunction, BinaryOperator, ExpressableType, Expression, Predicate, SelectStatement,
    SortSpecification, SqlAstRenderer, UnaryOperator,
};
use relmap_proto::{
    ArithmeticOp, ComparisonOp, Criteria, LockOptions, Order, Projection, ProjectionItem,
    Restriction, SqlType, Value,
};

/// A criteria query translated into an SQL AST.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    pub statement: SelectStatement,
    pub mapping: ResultSetMapping,
    /// Tables the query reads.
    pub query_spaces: BTreeSet<String>,
    pub bindings: JdbcParameterBindings,
    /// Locks deferred to follow-on statements.
    pub follow_on: Option<FollowOnLock>,
    /// Aliases of the results handed to transformers.
    pub user_aliases: Vec<Option<String>>,
}

/// Translates criteria queries against a catalog for one dialect.
///
/// Translation is pure: the same criteria and influencers always produce the
/// same statement, and a translator can be shared between threads.
#[derive(Debug, Clone, Copy)]
pub struct CriteriaTranslator<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) dialect: &'a dyn Dialect,
    pub(crate) follow_on_locking: Option<bool>,
}

impl<'a> CriteriaTranslator<'a> {
    pub fn new(catalog: &'a Catalog, dialect: &'a dyn Dialect) -> Self {
        Self {
            catalog,
            dialect,
            follow_on_locking: None,
        }
    }

    /// Follow-on locking preference used when a query does not state one.
    pub fn with_follow_on_locking(mut self, follow_on: Option<bool>) -> Self {
        self.follow_on_locking = follow_on;
        self
    }

    /// Translate `criteria` into a select statement.
    pub fn translate(
        &self,
        criteria: &Criteria,
        influencers: &LoadQueryInfluencers,
    ) -> Result<TranslatedQuery, TranslationError> {
        let mut builder = QueryBuilder::new(self.catalog, &criteria.entity, &criteria.alias)?;
        for join in &criteria.joins {
            builder.add_join(&join.path, &join.alias, join.join_type, join.fetch)?;
        }
        if !criteria.has_projections() {
            builder.add_influencer_fetches(influencers)?;
        }
        builder.apply_filters(influencers)?;

        for restriction in &criteria.restrictions {
            let predicate = self.restriction(&mut builder, restriction)?;
            builder.spec.add_restriction(predicate);
        }

        let mut projected: Vec<(Option<String>, Expression)> = Vec::new();
        let results = if criteria.has_projections() {
            let mut results = Vec::with_capacity(criteria.projections.len());
            for item in &criteria.projections {
                results.push(self.projection(&mut builder, item, &mut projected)?);
            }
            results
        } else {
            builder.entity_results()?
        };

        for order in &criteria.orders {
            self.order(&mut builder, order, &projected)?;
        }
        builder.spec.select_clause.distinct = criteria.distinct;
        builder.spec.selection = criteria.options.selection;

        let follow_on = self.apply_locks(&mut builder, &criteria.options.lock_options)?;
        let user_aliases = results
            .iter()
            .filter(|r| r.include_in_result)
            .map(|r| r.user_alias.clone())
            .collect();
        let mapping = builder.mapping(results);
        let query_spaces = builder.query_spaces();

        Ok(TranslatedQuery {
            statement: SelectStatement {
                query_spec: builder.spec,
                comment: criteria.options.comment.clone(),
            },
            mapping,
            query_spaces,
            bindings: builder.bindings,
            follow_on,
            user_aliases,
        })
    }

    /// Translate and render `criteria`.
    pub fn compile(
        &self,
        criteria: &Criteria,
        influencers: &LoadQueryInfluencers,
    ) -> Result<CompiledSelect, TranslationError> {
        let translated = self.translate(criteria, influencers)?;
        self.render(translated)
    }

    /// Render a translated query for this translator's dialect.
    pub fn render(&self, translated: TranslatedQuery) -> Result<CompiledSelect, TranslationError> {
        let rendered = SqlAstRenderer::render(self.dialect, &translated.statement)?;
        debug!(
            dialect = self.dialect.name(),
            sql = %rendered.sql,
            parameters = rendered.parameters.len(),
            "Compiled select"
        );
        Ok(CompiledSelect {
            sql: rendered.sql,
            parameters: rendered.parameters,
            mapping: Arc::new(translated.mapping),
            affected_table_names: translated.query_spaces,
            follow_on: translated.follow_on.map(Arc::new),
            bindings: translated.bindings,
        })
    }

    /// Plan the locks of a built query, embedding the clause or preparing
    /// follow-on lock statements.
    pub(crate) fn apply_locks(
        &self,
        builder: &mut QueryBuilder<'a>,
        lock_options: &LockOptions,
    ) -> Result<Option<FollowOnLock>, TranslationError> {
        let strategy = plan_locking(
            lock_options,
            &builder.lockable_aliases(),
            self.dialect,
            &builder.spec.selection,
            self.follow_on_locking,
        );
        match strategy {
            LockStrategy::None => Ok(None),
            LockStrategy::Embedded(clause) => {
                builder.spec.lock = Some(clause);
                Ok(None)
            }
            LockStrategy::FollowOn {
                lock_mode,
                timeout,
                aliases,
            } => {
                let mut targets = Vec::with_capacity(aliases.len());
                for alias in aliases {
                    let index = builder
                        .alias_index(&alias)
                        .ok_or_else(|| TranslationError::UnknownAlias(alias.clone()))?;
                    let entity: &EntityDef = builder.aliases[index].entity;
                    let id_expression = builder.id_expression(index)?;
                    // The primary select is never widened for follow-on locking.
                    let Some(id) = builder.spec.select_clause.find(&id_expression).cloned() else {
                        warn!(
                            alias = %alias,
                            entity = %entity.name,
                            "Identifier is not selected, skipping follow-on lock for alias"
                        );
                        continue;
                    };
                    let lock = self.lock_select(entity, lock_mode, timeout)?;
                    targets.push(FollowOnTarget {
                        alias,
                        entity: entity.name.clone(),
                        id,
                        lock_sql: lock.sql,
                        parameters: lock.parameters,
                    });
                }
                if targets.is_empty() {
                    return Ok(None);
                }
                Ok(Some(FollowOnLock {
                    lock_mode,
                    timeout,
                    targets,
                }))
            }
        }
    }

    fn restriction(
        &self,
        builder: &mut QueryBuilder<'a>,
        restriction: &Restriction,
    ) -> Result<Predicate, TranslationError> {
        match restriction {
            Restriction::Compare {
                property,
                op,
                value,
            } => {
                let path = builder.resolve_path(property)?;
                if value.is_null() && matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
                    return Ok(Predicate::NullCheck {
                        expression: path.expression,
                        negated: *op == ComparisonOp::Ne,
                    });
                }
                let rhs = value_parameter(builder, &path, value)?;
                Predicate::relational(*op, path.expression, rhs)
            }
            Restriction::PropertyCompare { property, op, other } => {
                let lhs = builder.resolve_path(property)?;
                let rhs = builder.resolve_path(other)?;
                Predicate::relational(*op, lhs.expression, rhs.expression)
            }
            Restriction::IsNull { property } => Ok(Predicate::NullCheck {
                expression: builder.resolve_path(property)?.expression,
                negated: false,
            }),
            Restriction::IsNotNull { property } => Ok(Predicate::NullCheck {
                expression: builder.resolve_path(property)?.expression,
                negated: true,
            }),
            Restriction::Like {
                property,
                pattern,
                ignore_case,
            } => {
                let path = builder.resolve_path(property)?;
                require_single_column(&path)?;
                let pattern = if *ignore_case {
                    pattern.to_lowercase()
                } else {
                    pattern.clone()
                };
                let pattern = builder.parameter(
                    ExpressableType::Basic(SqlType::Varchar),
                    vec![Value::String(pattern)],
                );
                Ok(Predicate::Like {
                    expression: path.expression,
                    pattern,
                    ignore_case: *ignore_case,
                    negated: false,
                })
            }
            Restriction::In { property, values } => {
                let path = builder.resolve_path(property)?;
                if values.is_empty() {
                    return Err(TranslationError::MalformedPredicate(format!(
                        "in-list on '{}' has no values",
                        property
                    )));
                }
                let mut parameters = Vec::with_capacity(values.len());
                for value in values {
                    parameters.push(value_parameter(builder, &path, value)?);
                }
                Predicate::in_list(path.expression, parameters, false)
            }
            Restriction::Between {
                property,
                low,
                high,
            } => {
                let path = builder.resolve_path(property)?;
                let low = value_parameter(builder, &path, low)?;
                let high = value_parameter(builder, &path, high)?;
                Predicate::between(path.expression, low, high)
            }
            Restriction::IdEq { values } => {
                let id = builder.id_expression(0)?;
                let expressable = id.expressable_type();
                if values.len() != expressable.column_span() {
                    return Err(TranslationError::MalformedPredicate(format!(
                        "identifier of {} spans {} columns, {} values given",
                        builder.root().entity.name,
                        expressable.column_span(),
                        values.len()
                    )));
                }
                let parameter = builder.parameter(expressable, values.clone());
                Predicate::relational(ComparisonOp::Eq, id, parameter)
            }
            Restriction::Truth { property, value } => {
                let path = builder.resolve_path(property)?;
                match path.converter {
                    Some(converter) if converter.is_boolean() => {
                        let rhs = value_parameter(builder, &path, &Value::Bool(*value))?;
                        Predicate::relational(ComparisonOp::Eq, path.expression, rhs)
                    }
                    _ if path.expression.expressable_type()
                        == ExpressableType::Basic(SqlType::Boolean) =>
                    {
                        Ok(Predicate::TruthValue {
                            expression: path.expression,
                            truth: *value,
                            negated: false,
                        })
                    }
                    _ => Err(TranslationError::MalformedPredicate(format!(
                        "'{}' is not a boolean property",
                        property
                    ))),
                }
            }
            Restriction::Not(inner) => Ok(self.restriction(builder, inner)?.negate()),
            Restriction::And(members) | Restriction::Or(members) => {
                if members.is_empty() {
                    return Err(TranslationError::MalformedPredicate(
                        "junction has no members".to_string(),
                    ));
                }
                let mut predicates = Vec::with_capacity(members.len());
                for member in members {
                    predicates.push(self.restriction(builder, member)?);
                }
                Ok(match restriction {
                    Restriction::And(_) => Predicate::and(predicates),
                    _ => Predicate::or(predicates),
                })
            }
            Restriction::Sql { fragment, values } => {
                let sql = fragment.replace("{alias}", &builder.root().sql_alias);
                let parameters = values
                    .iter()
                    .map(|v| builder.parameter(value_expressable(v), vec![v.clone()]))
                    .collect();
                Ok(Predicate::Fragment { sql, parameters })
            }
        }
    }

    fn projection(
        &self,
        builder: &mut QueryBuilder<'a>,
        item: &ProjectionItem,
        projected: &mut Vec<(Option<String>, Expression)>,
    ) -> Result<MappedResult, TranslationError> {
        let mut converter = None;
        let mut components = Vec::new();
        let expression = match &item.projection {
            Projection::Property(path) | Projection::GroupProperty(path) => {
                let path = builder.resolve_path(path)?;
                converter = path.converter.cloned();
                components = path.components;
                if matches!(item.projection, Projection::GroupProperty(_)) {
                    builder.spec.group_by.push(path.expression.clone());
                }
                path.expression
            }
            Projection::Id => {
                components = builder.root().entity.identifier.component_names();
                builder.id_expression(0)?
            }
            Projection::RowCount => Expression::Aggregate {
                function: AggregateFunction::Count,
                argument: None,
                distinct: false,
                result_type: SqlType::BigInt,
            },
            Projection::Count { property, distinct } => {
                let path = builder.resolve_path(property)?;
                require_single_column(&path).map_err(|_| unsupported("count", property))?;
                Expression::Aggregate {
                    function: AggregateFunction::Count,
                    argument: Some(Box::new(path.expression)),
                    distinct: *distinct,
                    result_type: SqlType::BigInt,
                }
            }
            Projection::Sum(property) => {
                let (expression, sql_type) = numeric_operand(builder, "sum", property)?;
                aggregate(AggregateFunction::Sum, expression, sql_type.sum_type())
            }
            Projection::Avg(property) => {
                let (expression, _) = numeric_operand(builder, "avg", property)?;
                aggregate(AggregateFunction::Avg, expression, SqlType::Double)
            }
            Projection::Min(property) | Projection::Max(property) => {
                let function = match item.projection {
                    Projection::Min(_) => AggregateFunction::Min,
                    _ => AggregateFunction::Max,
                };
                let path = builder.resolve_path(property)?;
                let sql_type = path
                    .expression
                    .expressable_type()
                    .basic_type()
                    .ok_or_else(|| unsupported(function.sql(), property))?;
                converter = path.converter.cloned();
                aggregate(function, path.expression, sql_type)
            }
            Projection::Negate(property) => {
                let (expression, _) = numeric_operand(builder, "negation", property)?;
                Expression::Unary {
                    operator: UnaryOperator::Minus,
                    operand: Box::new(expression),
                }
            }
            Projection::Arithmetic { op, left, right } => {
                let operator = match op {
                    ArithmeticOp::Add => BinaryOperator::Add,
                    ArithmeticOp::Subtract => BinaryOperator::Subtract,
                    ArithmeticOp::Multiply => BinaryOperator::Multiply,
                    ArithmeticOp::Divide => BinaryOperator::Divide,
                    ArithmeticOp::Concat => BinaryOperator::Concat,
                };
                let (lhs, rhs, result_type) = if operator == BinaryOperator::Concat {
                    let lhs = builder.resolve_path(left)?;
                    let rhs = builder.resolve_path(right)?;
                    require_single_column(&lhs).map_err(|_| unsupported("concat", left))?;
                    require_single_column(&rhs).map_err(|_| unsupported("concat", right))?;
                    (lhs.expression, rhs.expression, SqlType::Varchar)
                } else {
                    let (lhs, left_type) = numeric_operand(builder, operator.sql(), left)?;
                    let (rhs, right_type) = numeric_operand(builder, operator.sql(), right)?;
                    (lhs, rhs, left_type.widen(right_type))
                };
                Expression::Binary {
                    operator,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    result_type,
                }
            }
            Projection::Sql {
                fragment,
                column_alias,
                sql_type,
            } => Expression::Fragment {
                sql: fragment.replace("{alias}", &builder.root().sql_alias),
                column_alias: Some(column_alias.clone()),
                expressable: sql_type.map_or(ExpressableType::Inferred, ExpressableType::Basic),
            },
        };

        let selection = builder.spec.select_clause.add(expression.clone());
        projected.push((item.alias.clone(), expression));
        let descriptor = if selection.span() > 1 {
            ResultDescriptor::Tuple {
                selection,
                components,
            }
        } else {
            ResultDescriptor::Scalar {
                selection,
                converter,
            }
        };
        Ok(MappedResult {
            descriptor,
            user_alias: item.alias.clone(),
            include_in_result: item.include_in_result,
        })
    }

    /// Order by a projection alias or a property; composite properties order
    /// by each column.
    fn order(
        &self,
        builder: &mut QueryBuilder<'a>,
        order: &Order,
        projected: &[(Option<String>, Expression)],
    ) -> Result<(), TranslationError> {
        let expressions = match projected
            .iter()
            .find(|(alias, _)| alias.as_deref() == Some(order.property.as_str()))
        {
            Some((_, expression)) => vec![expression.clone()],
            None => match builder.resolve_path(&order.property)?.expression {
                Expression::Tuple(tuple) => tuple.columns().into_iter().cloned().collect(),
                other => vec![other],
            },
        };
        for expression in expressions {
            builder.spec.sort_specifications.push(SortSpecification {
                expression,
                ascending: order.ascending,
            });
        }
        Ok(())
    }
}

fn aggregate(function: AggregateFunction, argument: Expression, result_type: SqlType) -> Expression {
    Expression::Aggregate {
        function,
        argument: Some(Box::new(argument)),
        distinct: false,
        result_type,
    }
}

fn unsupported(operation: &str, property: &str) -> TranslationError {
    TranslationError::UnsupportedProjection(format!("{} of '{}'", operation, property))
}

fn require_single_column(path: &ResolvedPath<'_>) -> Result<(), TranslationError> {
    let span = path.expression.column_span();
    if span != 1 {
        return Err(TranslationError::MalformedPredicate(format!(
            "'{}' spans {} columns and cannot be compared with a single value",
            path.path, span
        )));
    }
    Ok(())
}

/// A single-column numeric property and its type.
fn numeric_operand(
    builder: &QueryBuilder<'_>,
    operation: &str,
    property: &str,
) -> Result<(Expression, SqlType), TranslationError> {
    let path = builder.resolve_path(property)?;
    match path.expression.expressable_type().basic_type() {
        Some(sql_type) if sql_type.is_numeric() => Ok((path.expression, sql_type)),
        _ => Err(unsupported(operation, property)),
    }
}

/// Bind `value` against a single-column property, converting it to its
/// relational form.
fn value_parameter(
    builder: &mut QueryBuilder<'_>,
    path: &ResolvedPath<'_>,
    value: &Value,
) -> Result<Expression, TranslationError> {
    require_single_column(path)?;
    let bound = match path.converter {
        Some(converter) => converter
            .to_relational_value(value)
            .map_err(|e| TranslationError::MalformedPredicate(e.to_string()))?,
        None => value.clone(),
    };
    Ok(builder.parameter(path.expression.expressable_type(), vec![bound]))
}
