//! SQL predicates.

use super::expression::Expression;
use crate::error::TranslationError;
use relmap_proto::ComparisonOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionKind {
    Conjunction,
    Disjunction,
}

/// A restriction in the where clause or a join condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `lhs op rhs`; multi-column operands compare component-wise.
    Relational {
        operator: ComparisonOp,
        lhs: Expression,
        rhs: Expression,
    },
    NullCheck {
        expression: Expression,
        negated: bool,
    },
    Like {
        expression: Expression,
        pattern: Expression,
        ignore_case: bool,
        negated: bool,
    },
    InList {
        expression: Expression,
        values: Vec<Expression>,
        negated: bool,
    },
    Between {
        expression: Expression,
        low: Expression,
        high: Expression,
        negated: bool,
    },
    Junction {
        kind: JunctionKind,
        predicates: Vec<Predicate>,
    },
    Negated(Box<Predicate>),
    /// `expression = true`, or `expression <> true` when negated.
    TruthValue {
        expression: Expression,
        truth: bool,
        negated: bool,
    },
    /// Raw SQL; each `?` consumes one parameter expression in order.
    Fragment {
        sql: String,
        parameters: Vec<Expression>,
    },
}

impl Predicate {
    /// Relational comparison, validating that both sides have the same column span.
    ///
    /// Multi-column operands only support `=` and `<>`.
    pub fn relational(
        operator: ComparisonOp,
        lhs: Expression,
        rhs: Expression,
    ) -> Result<Self, TranslationError> {
        let expected = lhs.column_span();
        let actual = rhs.column_span();
        if expected != actual {
            return Err(TranslationError::ShapeMismatch { expected, actual });
        }
        if expected > 1 && !matches!(operator, ComparisonOp::Eq | ComparisonOp::Ne) {
            return Err(TranslationError::MalformedPredicate(format!(
                "operator '{}' cannot compare composite values",
                operator.sql()
            )));
        }
        Ok(Predicate::Relational { operator, lhs, rhs })
    }

    /// `expression in (values...)`.
    pub fn in_list(
        expression: Expression,
        values: Vec<Expression>,
        negated: bool,
    ) -> Result<Self, TranslationError> {
        if values.is_empty() {
            return Err(TranslationError::MalformedPredicate(
                "in-list requires at least one value".to_string(),
            ));
        }
        let expected = expression.column_span();
        if let Some(bad) = values.iter().find(|v| v.column_span() != expected) {
            return Err(TranslationError::ShapeMismatch {
                expected,
                actual: bad.column_span(),
            });
        }
        Ok(Predicate::InList {
            expression,
            values,
            negated,
        })
    }

    /// `expression between low and high`.
    pub fn between(
        expression: Expression,
        low: Expression,
        high: Expression,
    ) -> Result<Self, TranslationError> {
        for operand in [&expression, &low, &high] {
            if operand.column_span() != 1 {
                return Err(TranslationError::MalformedPredicate(
                    "between requires single-column operands".to_string(),
                ));
            }
        }
        Ok(Predicate::Between {
            expression,
            low,
            high,
            negated: false,
        })
    }

    /// Conjunction of `predicates`, flattening a single member.
    pub fn and(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            return predicates.remove(0);
        }
        Predicate::Junction {
            kind: JunctionKind::Conjunction,
            predicates,
        }
    }

    /// Disjunction of `predicates`, flattening a single member.
    pub fn or(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            return predicates.remove(0);
        }
        Predicate::Junction {
            kind: JunctionKind::Disjunction,
            predicates,
        }
    }

    /// Logical negation.
    pub fn negate(self) -> Self {
        match self {
            Predicate::Negated(inner) => *inner,
            other => Predicate::Negated(Box::new(other)),
        }
    }

    /// Number of JDBC parameter slots consumed when rendered.
    pub fn parameter_count(&self) -> usize {
        match self {
            Predicate::Relational { lhs, rhs, .. } => lhs.parameter_count() + rhs.parameter_count(),
            Predicate::NullCheck { expression, .. } | Predicate::TruthValue { expression, .. } => {
                expression.parameter_count()
            }
            Predicate::Like {
                expression, pattern, ..
            } => expression.parameter_count() + pattern.parameter_count(),
            Predicate::InList {
                expression, values, ..
            } => {
                expression.parameter_count()
                    + values.iter().map(|v| v.parameter_count()).sum::<usize>()
            }
            Predicate::Between {
                expression,
                low,
                high,
                ..
            } => expression.parameter_count() + low.parameter_count() + high.parameter_count(),
            Predicate::Junction { predicates, .. } => {
                predicates.iter().map(|p| p.parameter_count()).sum()
            }
            Predicate::Negated(inner) => inner.parameter_count(),
            Predicate::Fragment { parameters, .. } => {
                parameters.iter().map(|p| p.parameter_count()).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{ExpressableType, SqlTuple};
    use relmap_proto::SqlType;

    fn composite_id() -> Expression {
        Expression::Tuple(
            SqlTuple::new(vec![
                Expression::column("l_", "order_id", SqlType::BigInt),
                Expression::column("l_", "line_no", SqlType::Integer),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_relational_requires_equal_spans() {
        let err = Predicate::relational(
            ComparisonOp::Eq,
            composite_id(),
            Expression::parameter(0, ExpressableType::Basic(SqlType::BigInt)),
        )
        .unwrap_err();
        assert_eq!(err, TranslationError::ShapeMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_tuple_ordering_comparison_is_rejected() {
        let rhs = Expression::parameter(
            0,
            ExpressableType::Composite(vec![SqlType::BigInt, SqlType::Integer]),
        );
        assert!(matches!(
            Predicate::relational(ComparisonOp::Lt, composite_id(), rhs.clone()),
            Err(TranslationError::MalformedPredicate(_))
        ));
        let eq = Predicate::relational(ComparisonOp::Eq, composite_id(), rhs).unwrap();
        assert_eq!(eq.parameter_count(), 2);
    }

    #[test]
    fn test_empty_in_list_is_malformed() {
        assert!(matches!(
            Predicate::in_list(Expression::column("c_", "id", SqlType::BigInt), vec![], false),
            Err(TranslationError::MalformedPredicate(_))
        ));
    }

    #[test]
    fn test_junction_flattening_and_double_negation() {
        let p = Predicate::NullCheck {
            expression: Expression::column("c_", "email", SqlType::Varchar),
            negated: false,
        };
        assert_eq!(Predicate::and(vec![p.clone()]), p);
        assert_eq!(p.clone().negate().negate(), p);
    }
}
