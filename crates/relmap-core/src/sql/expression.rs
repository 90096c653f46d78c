//! SQL expression nodes.
//!
//! Every node knows its [`ExpressableType`], so decoding never has to go back
//! to the catalog, and can describe the selection it produces when placed in
//! the select clause at a given JDBC position.

use crate::error::TranslationError;
use relmap_proto::SqlType;

/// Identifier of a logical parameter; bindings are looked up by it.
pub type ParameterId = usize;

/// The JDBC shape of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressableType {
    /// A single column of a known type.
    Basic(SqlType),
    /// Several contiguous columns, e.g. an embedded value or composite id.
    Composite(Vec<SqlType>),
    /// A single column whose type is only known from result set metadata.
    Inferred,
}

impl ExpressableType {
    /// Number of JDBC columns.
    pub fn column_span(&self) -> usize {
        match self {
            ExpressableType::Basic(_) | ExpressableType::Inferred => 1,
            ExpressableType::Composite(types) => types.len(),
        }
    }

    /// Column types, `None` where the type must be inferred.
    pub fn sql_types(&self) -> Vec<Option<SqlType>> {
        match self {
            ExpressableType::Basic(t) => vec![Some(*t)],
            ExpressableType::Composite(types) => types.iter().copied().map(Some).collect(),
            ExpressableType::Inferred => vec![None],
        }
    }

    /// The single type of a basic expression.
    pub fn basic_type(&self) -> Option<SqlType> {
        match self {
            ExpressableType::Basic(t) => Some(*t),
            _ => None,
        }
    }

    /// Build the type for a list of column types.
    pub fn from_types(types: Vec<SqlType>) -> Self {
        if types.len() == 1 {
            ExpressableType::Basic(types[0])
        } else {
            ExpressableType::Composite(types)
        }
    }
}

/// A column of a table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReference {
    /// SQL alias of the table.
    pub qualifier: String,
    /// Column name.
    pub column: String,
    /// Column type.
    pub sql_type: SqlType,
}

impl ColumnReference {
    /// Create a column reference.
    pub fn new(qualifier: impl Into<String>, column: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            qualifier: qualifier.into(),
            column: column.into(),
            sql_type,
        }
    }

    /// `qualifier.column`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.qualifier, self.column)
    }
}

/// A parameter placeholder; composite parameters bind one value per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JdbcParameter {
    pub id: ParameterId,
    pub expressable: ExpressableType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
}

impl BinaryOperator {
    /// SQL operator text.
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// SQL function name.
    pub fn sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// A composite value made of several expressions, e.g. a composite identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTuple {
    expressions: Vec<Expression>,
    expressable: ExpressableType,
}

impl SqlTuple {
    /// Build a tuple whose type is the concatenation of its members' types.
    pub fn new(expressions: Vec<Expression>) -> Result<Self, TranslationError> {
        let mut types = Vec::new();
        for expression in &expressions {
            match expression.expressable_type() {
                ExpressableType::Basic(t) => types.push(t),
                ExpressableType::Composite(ts) => types.extend(ts),
                ExpressableType::Inferred => {
                    return Err(TranslationError::MalformedPredicate(
                        "tuple members must have a known type".to_string(),
                    ))
                }
            }
        }
        Self::with_type(expressions, ExpressableType::Composite(types))
    }

    /// Build a tuple with a declared type; its span must equal the members' total span.
    pub fn with_type(
        expressions: Vec<Expression>,
        expressable: ExpressableType,
    ) -> Result<Self, TranslationError> {
        let actual: usize = expressions.iter().map(|e| e.column_span()).sum();
        let expected = expressable.column_span();
        if actual != expected {
            return Err(TranslationError::ShapeMismatch { expected, actual });
        }
        Ok(Self {
            expressions,
            expressable,
        })
    }

    /// Member expressions.
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    /// Declared type.
    pub fn expressable_type(&self) -> &ExpressableType {
        &self.expressable
    }

    /// Flatten into one expression per column, when every member is single-column.
    pub fn columns(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        for expression in &self.expressions {
            match expression {
                Expression::Tuple(inner) => out.extend(inner.columns()),
                other => out.push(other),
            }
        }
        out
    }
}

/// An SQL expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Column(ColumnReference),
    Parameter(JdbcParameter),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        result_type: SqlType,
    },
    Tuple(SqlTuple),
    /// Aggregate call; `argument: None` is `count(*)`.
    Aggregate {
        function: AggregateFunction,
        argument: Option<Box<Expression>>,
        distinct: bool,
        result_type: SqlType,
    },
    /// Raw SQL, selected under `column_alias` when present.
    Fragment {
        sql: String,
        column_alias: Option<String>,
        expressable: ExpressableType,
    },
}

impl Expression {
    /// Column reference shorthand.
    pub fn column(qualifier: impl Into<String>, column: impl Into<String>, sql_type: SqlType) -> Self {
        Expression::Column(ColumnReference::new(qualifier, column, sql_type))
    }

    /// Parameter shorthand.
    pub fn parameter(id: ParameterId, expressable: ExpressableType) -> Self {
        Expression::Parameter(JdbcParameter { id, expressable })
    }

    /// The JDBC shape of the expression.
    pub fn expressable_type(&self) -> ExpressableType {
        match self {
            Expression::Column(c) => ExpressableType::Basic(c.sql_type),
            Expression::Parameter(p) => p.expressable.clone(),
            Expression::Unary { operand, .. } => operand.expressable_type(),
            Expression::Binary { result_type, .. } | Expression::Aggregate { result_type, .. } => {
                ExpressableType::Basic(*result_type)
            }
            Expression::Tuple(t) => t.expressable.clone(),
            Expression::Fragment { expressable, .. } => expressable.clone(),
        }
    }

    /// Number of JDBC columns the expression produces.
    pub fn column_span(&self) -> usize {
        self.expressable_type().column_span()
    }

    /// Number of JDBC parameter slots consumed when rendered.
    pub fn parameter_count(&self) -> usize {
        match self {
            Expression::Parameter(p) => p.expressable.column_span(),
            Expression::Unary { operand, .. } => operand.parameter_count(),
            Expression::Binary { lhs, rhs, .. } => lhs.parameter_count() + rhs.parameter_count(),
            Expression::Tuple(t) => t.expressions.iter().map(|e| e.parameter_count()).sum(),
            Expression::Aggregate { argument, .. } => {
                argument.as_ref().map_or(0, |a| a.parameter_count())
            }
            Expression::Column(_) | Expression::Fragment { .. } => 0,
        }
    }

    /// Describe this expression placed in the select clause at `jdbc_position` (1-based).
    pub fn create_sql_selection(&self, jdbc_position: usize) -> SqlSelection {
        let column_alias = match self {
            Expression::Fragment { column_alias, .. } => column_alias.clone(),
            _ => None,
        };
        SqlSelection {
            jdbc_position,
            expressable: self.expressable_type(),
            column_alias,
        }
    }
}

/// A selected expression bound to its position in the result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSelection {
    /// 1-based position of the first column.
    pub jdbc_position: usize,
    /// Shape of the selected value.
    pub expressable: ExpressableType,
    /// Column label used to locate inferred selections in result metadata.
    pub column_alias: Option<String>,
}

impl SqlSelection {
    /// 0-based index of the first column in a raw row.
    pub fn values_array_position(&self) -> usize {
        self.jdbc_position - 1
    }

    /// Number of columns covered.
    pub fn span(&self) -> usize {
        self.expressable.column_span()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_tuple() -> SqlTuple {
        SqlTuple::new(vec![
            Expression::column("l_", "order_id", SqlType::BigInt),
            Expression::column("l_", "line_no", SqlType::Integer),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_selection_is_one_based() {
        let expr = Expression::column("c_", "name", SqlType::Varchar);
        let selection = expr.create_sql_selection(3);
        assert_eq!(selection.jdbc_position, 3);
        assert_eq!(selection.values_array_position(), 2);
        assert_eq!(selection.span(), 1);
        assert_eq!(expr.parameter_count(), 0);
    }

    #[test]
    fn test_tuple_span_is_sum_of_members() {
        let tuple = id_tuple();
        assert_eq!(
            tuple.expressable_type(),
            &ExpressableType::Composite(vec![SqlType::BigInt, SqlType::Integer])
        );
        let nested = SqlTuple::new(vec![
            Expression::Tuple(tuple),
            Expression::column("l_", "qty", SqlType::Integer),
        ])
        .unwrap();
        assert_eq!(Expression::Tuple(nested.clone()).column_span(), 3);
        assert_eq!(nested.columns().len(), 3);
    }

    #[test]
    fn test_tuple_rejects_wrong_declared_span() {
        let err = SqlTuple::with_type(
            vec![Expression::column("l_", "order_id", SqlType::BigInt)],
            ExpressableType::Composite(vec![SqlType::BigInt, SqlType::Integer]),
        )
        .unwrap_err();
        assert_eq!(err, TranslationError::ShapeMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_parameter_slots() {
        let param = Expression::parameter(
            0,
            ExpressableType::Composite(vec![SqlType::BigInt, SqlType::Integer]),
        );
        assert_eq!(param.parameter_count(), 2);

        let sum = Expression::Binary {
            operator: BinaryOperator::Add,
            lhs: Box::new(Expression::column("o_", "total", SqlType::Double)),
            rhs: Box::new(Expression::parameter(1, ExpressableType::Basic(SqlType::Double))),
            result_type: SqlType::Double,
        };
        assert_eq!(sum.parameter_count(), 1);
        assert_eq!(sum.expressable_type(), ExpressableType::Basic(SqlType::Double));
    }

    #[test]
    fn test_unary_minus_keeps_operand_type() {
        let neg = Expression::Unary {
            operator: UnaryOperator::Minus,
            operand: Box::new(Expression::column("o_", "total", SqlType::Double)),
        };
        let selection = neg.create_sql_selection(1);
        assert_eq!(selection.expressable, ExpressableType::Basic(SqlType::Double));
    }

    #[test]
    fn test_fragment_selection_carries_alias() {
        let fragment = Expression::Fragment {
            sql: "upper(name)".into(),
            column_alias: Some("upper_name".into()),
            expressable: ExpressableType::Inferred,
        };
        let selection = fragment.create_sql_selection(2);
        assert_eq!(selection.column_alias.as_deref(), Some("upper_name"));
        assert_eq!(selection.expressable, ExpressableType::Inferred);
    }
}
