//! Criteria queries.
//!
//! A [`Criteria`] names a root entity, the associations joined from it, a
//! restriction tree, an optional projection list, ordering, and the
//! [`QueryOptions`] for execution. Property paths are written
//! `alias.property`; a bare `property` refers to the root alias, and `id`
//! names the identifier (single column or composite).

use serde::{Deserialize, Serialize};

use crate::lock::{LockMode, LockOptions, LockTimeout};
use crate::options::{CacheMode, QueryOptions, RowSelection};
use crate::types::SqlType;
use crate::value::Value;

/// Alias given to the root entity when none is supplied.
pub const ROOT_ALIAS: &str = "this";

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    /// SQL operator text.
    pub fn sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    /// The operator that holds exactly when `self` does not.
    pub fn negate(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Eq => ComparisonOp::Ne,
            ComparisonOp::Ne => ComparisonOp::Eq,
            ComparisonOp::Lt => ComparisonOp::Ge,
            ComparisonOp::Le => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::Le,
            ComparisonOp::Ge => ComparisonOp::Lt,
        }
    }
}

/// Arithmetic operator used in projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
}

/// A node of the restriction tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Restriction {
    /// `property op value`.
    Compare {
        property: String,
        op: ComparisonOp,
        value: Value,
    },
    /// `property op other_property`.
    PropertyCompare {
        property: String,
        op: ComparisonOp,
        other: String,
    },
    /// `property is null`.
    IsNull { property: String },
    /// `property is not null`.
    IsNotNull { property: String },
    /// `property like pattern`.
    Like {
        property: String,
        pattern: String,
        ignore_case: bool,
    },
    /// `property in (values...)`.
    In { property: String, values: Vec<Value> },
    /// `property between low and high`.
    Between {
        property: String,
        low: Value,
        high: Value,
    },
    /// Identifier equality; one value per identifier column.
    IdEq { values: Vec<Value> },
    /// Explicit truth-value check on a boolean property.
    Truth { property: String, value: bool },
    /// Negation.
    Not(Box<Restriction>),
    /// Conjunction.
    And(Vec<Restriction>),
    /// Disjunction.
    Or(Vec<Restriction>),
    /// Raw SQL; `{alias}` is replaced by the root table alias and each `?`
    /// consumes one of `values`.
    Sql { fragment: String, values: Vec<Value> },
}

impl Restriction {
    fn compare(property: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Restriction::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    /// `property = value`.
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, ComparisonOp::Eq, value)
    }

    /// `property <> value`.
    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, ComparisonOp::Ne, value)
    }

    /// `property < value`.
    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, ComparisonOp::Lt, value)
    }

    /// `property <= value`.
    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, ComparisonOp::Le, value)
    }

    /// `property > value`.
    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, ComparisonOp::Gt, value)
    }

    /// `property >= value`.
    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, ComparisonOp::Ge, value)
    }

    /// `property = other`.
    pub fn eq_property(property: impl Into<String>, other: impl Into<String>) -> Self {
        Restriction::PropertyCompare {
            property: property.into(),
            op: ComparisonOp::Eq,
            other: other.into(),
        }
    }

    /// `property is null`.
    pub fn is_null(property: impl Into<String>) -> Self {
        Restriction::IsNull {
            property: property.into(),
        }
    }

    /// `property is not null`.
    pub fn is_not_null(property: impl Into<String>) -> Self {
        Restriction::IsNotNull {
            property: property.into(),
        }
    }

    /// `property like pattern`.
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Restriction::Like {
            property: property.into(),
            pattern: pattern.into(),
            ignore_case: false,
        }
    }

    /// Case-insensitive `like`.
    pub fn ilike(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Restriction::Like {
            property: property.into(),
            pattern: pattern.into(),
            ignore_case: true,
        }
    }

    /// `property in (values...)`.
    pub fn in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        Restriction::In {
            property: property.into(),
            values,
        }
    }

    /// `property between low and high`.
    pub fn between(
        property: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Restriction::Between {
            property: property.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// Identifier equality against a single-column id.
    pub fn id_eq(value: impl Into<Value>) -> Self {
        Restriction::IdEq {
            values: vec![value.into()],
        }
    }

    /// Identifier equality against a composite id, one value per column.
    pub fn id_eq_tuple(values: Vec<Value>) -> Self {
        Restriction::IdEq { values }
    }

    /// `property = true`.
    pub fn is_true(property: impl Into<String>) -> Self {
        Restriction::Truth {
            property: property.into(),
            value: true,
        }
    }

    /// `property = false`.
    pub fn is_false(property: impl Into<String>) -> Self {
        Restriction::Truth {
            property: property.into(),
            value: false,
        }
    }

    /// Negate a restriction.
    #[allow(clippy::should_implement_trait)]
    pub fn not(restriction: Restriction) -> Self {
        Restriction::Not(Box::new(restriction))
    }

    /// Conjunction.
    pub fn and(restrictions: Vec<Restriction>) -> Self {
        Restriction::And(restrictions)
    }

    /// Disjunction.
    pub fn or(restrictions: Vec<Restriction>) -> Self {
        Restriction::Or(restrictions)
    }

    /// Raw SQL restriction.
    pub fn sql(fragment: impl Into<String>, values: Vec<Value>) -> Self {
        Restriction::Sql {
            fragment: fragment.into(),
            values,
        }
    }
}

/// A selected expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// A mapped property; embedded properties select every component column.
    Property(String),
    /// The identifier of the root entity.
    Id,
    /// `count(*)`.
    RowCount,
    /// `count([distinct] property)`.
    Count { property: String, distinct: bool },
    /// `sum(property)`.
    Sum(String),
    /// `avg(property)`.
    Avg(String),
    /// `min(property)`.
    Min(String),
    /// `max(property)`.
    Max(String),
    /// Unary minus applied to a property.
    Negate(String),
    /// Binary arithmetic over two properties.
    Arithmetic {
        op: ArithmeticOp,
        left: String,
        right: String,
    },
    /// A property that is also added to the `group by` clause.
    GroupProperty(String),
    /// Raw SQL selected under `column_alias`; without `sql_type` the type is
    /// taken from the result set metadata.
    Sql {
        fragment: String,
        column_alias: String,
        sql_type: Option<SqlType>,
    },
}

impl Projection {
    /// Project a property.
    pub fn property(path: impl Into<String>) -> Self {
        Projection::Property(path.into())
    }

    /// `count(property)`.
    pub fn count(path: impl Into<String>) -> Self {
        Projection::Count {
            property: path.into(),
            distinct: false,
        }
    }

    /// `count(distinct property)`.
    pub fn count_distinct(path: impl Into<String>) -> Self {
        Projection::Count {
            property: path.into(),
            distinct: true,
        }
    }

    /// `sum(property)`.
    pub fn sum(path: impl Into<String>) -> Self {
        Projection::Sum(path.into())
    }

    /// `avg(property)`.
    pub fn avg(path: impl Into<String>) -> Self {
        Projection::Avg(path.into())
    }

    /// `min(property)`.
    pub fn min(path: impl Into<String>) -> Self {
        Projection::Min(path.into())
    }

    /// `max(property)`.
    pub fn max(path: impl Into<String>) -> Self {
        Projection::Max(path.into())
    }

    /// Group by and select a property.
    pub fn group(path: impl Into<String>) -> Self {
        Projection::GroupProperty(path.into())
    }

    /// Raw SQL projection.
    pub fn sql(
        fragment: impl Into<String>,
        column_alias: impl Into<String>,
        sql_type: Option<SqlType>,
    ) -> Self {
        Projection::Sql {
            fragment: fragment.into(),
            column_alias: column_alias.into(),
            sql_type,
        }
    }
}

/// A projection together with its caller-visible alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub projection: Projection,
    /// Alias handed to result transformers.
    pub alias: Option<String>,
    /// `false` for auxiliary columns that are computed but not returned.
    pub include_in_result: bool,
}

/// Join type of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JoinType {
    #[default]
    Inner,
    LeftOuter,
}

/// An association joined into the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaJoin {
    /// `alias.association` path from an already-declared alias.
    pub path: String,
    /// Alias of the joined entity.
    pub alias: String,
    pub join_type: JoinType,
    /// Attach the joined entity to its owner instead of returning it.
    pub fetch: bool,
}

/// Ordering on a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub ascending: bool,
}

impl Order {
    /// Ascending order.
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }

    /// Descending order.
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: false,
        }
    }
}

/// A criteria query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Root entity name.
    pub entity: String,
    /// Root alias.
    pub alias: String,
    #[serde(default)]
    pub joins: Vec<CriteriaJoin>,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
    #[serde(default)]
    pub projections: Vec<ProjectionItem>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub options: QueryOptions,
}

impl Criteria {
    /// A query over `entity` with the default root alias.
    pub fn new(entity: impl Into<String>) -> Self {
        Self::with_alias(entity, ROOT_ALIAS)
    }

    /// A query over `entity` with an explicit root alias.
    pub fn with_alias(entity: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            alias: alias.into(),
            joins: vec![],
            restrictions: vec![],
            projections: vec![],
            orders: vec![],
            distinct: false,
            options: QueryOptions::default(),
        }
    }

    fn push_join(mut self, path: impl Into<String>, alias: impl Into<String>, join_type: JoinType, fetch: bool) -> Self {
        self.joins.push(CriteriaJoin {
            path: path.into(),
            alias: alias.into(),
            join_type,
            fetch,
        });
        self
    }

    /// Inner join an association under `alias`.
    pub fn join(self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.push_join(path, alias, JoinType::Inner, false)
    }

    /// Left outer join an association under `alias`.
    pub fn left_join(self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.push_join(path, alias, JoinType::LeftOuter, false)
    }

    /// Eagerly fetch an association into its owner.
    pub fn fetch(self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.push_join(path, alias, JoinType::LeftOuter, true)
    }

    /// Add a restriction; top-level restrictions are conjoined.
    pub fn add(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    /// Add a projection without an alias.
    pub fn project(mut self, projection: Projection) -> Self {
        self.projections.push(ProjectionItem {
            projection,
            alias: None,
            include_in_result: true,
        });
        self
    }

    /// Add a projection under a caller-visible alias.
    pub fn project_as(mut self, projection: Projection, alias: impl Into<String>) -> Self {
        self.projections.push(ProjectionItem {
            projection,
            alias: Some(alias.into()),
            include_in_result: true,
        });
        self
    }

    /// Add an auxiliary projection that is selected but not returned.
    pub fn project_hidden(mut self, projection: Projection) -> Self {
        self.projections.push(ProjectionItem {
            projection,
            alias: None,
            include_in_result: false,
        });
        self
    }

    /// Add an ordering.
    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// Select distinct rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Skip the first `first` rows.
    pub fn first_result(mut self, first: u32) -> Self {
        self.options.selection.first_row = Some(first);
        self
    }

    /// Return at most `max` rows.
    pub fn max_results(mut self, max: u32) -> Self {
        self.options.selection.max_rows = Some(max);
        self
    }

    /// Replace the row selection.
    pub fn with_selection(mut self, selection: RowSelection) -> Self {
        self.options.selection = selection;
        self
    }

    /// Lock every alias with `mode`.
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.options.lock_options.lock_mode = mode;
        self
    }

    /// Lock one alias with `mode`.
    pub fn alias_lock_mode(mut self, alias: impl Into<String>, mode: LockMode) -> Self {
        self.options.lock_options.alias_lock_modes.insert(alias.into(), mode);
        self
    }

    /// Set the lock wait timeout.
    pub fn lock_timeout(mut self, timeout: LockTimeout) -> Self {
        self.options.lock_options.timeout = timeout;
        self
    }

    /// Replace the lock options.
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.options.lock_options = lock_options;
        self
    }

    /// Mark results as cacheable.
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.options.cacheable = cacheable;
        self
    }

    /// Set the cache mode.
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.options.cache_mode = Some(mode);
        self
    }

    /// Use a named results cache region.
    pub fn cache_region(mut self, region: impl Into<String>) -> Self {
        self.options.result_cache_region = Some(region.into());
        self
    }

    /// Set the fetch size hint.
    pub fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.options.fetch_size = Some(fetch_size);
        self
    }

    /// Set the statement timeout in seconds.
    pub fn timeout(mut self, secs: u32) -> Self {
        self.options.timeout_secs = Some(secs);
        self
    }

    /// Prefix the generated SQL with a comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Whether the query declares projections.
    pub fn has_projections(&self) -> bool {
        !self.projections.is_empty()
    }

    /// Caller-visible aliases of the included projections, in order.
    pub fn user_aliases(&self) -> Vec<Option<String>> {
        self.projections
            .iter()
            .filter(|p| p.include_in_result)
            .map(|p| p.alias.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder() {
        let criteria = Criteria::new("Order")
            .join("this.customer", "c")
            .add(Restriction::eq("c.name", "Alice"))
            .add(Restriction::gt("total", 100i64))
            .project_as(Projection::property("id"), "orderId")
            .project_hidden(Projection::property("total"))
            .order(Order::desc("total"))
            .max_results(10)
            .alias_lock_mode("c", LockMode::PessimisticWrite);

        assert_eq!(criteria.alias, ROOT_ALIAS);
        assert_eq!(criteria.joins.len(), 1);
        assert_eq!(criteria.restrictions.len(), 2);
        assert_eq!(criteria.user_aliases(), vec![Some("orderId".to_string())]);
        assert!(criteria.options.selection.defines_limits());
        assert_eq!(
            criteria.options.lock_options.effective_lock_mode("c"),
            LockMode::PessimisticWrite
        );
    }

    #[test]
    fn test_negated_operators() {
        assert_eq!(ComparisonOp::Lt.negate(), ComparisonOp::Ge);
        assert_eq!(ComparisonOp::Eq.negate().negate(), ComparisonOp::Eq);
    }

    #[test]
    fn test_json_round_trip() {
        let criteria = Criteria::new("Customer")
            .add(Restriction::or(vec![
                Restriction::is_null("email"),
                Restriction::not(Restriction::like("name", "A%")),
            ]))
            .project(Projection::RowCount)
            .cacheable(true);

        let json = serde_json::to_string(&criteria).unwrap();
        let back: Criteria = serde_json::from_str(&json).unwrap();
        assert_eq!(back, criteria);
    }
}
