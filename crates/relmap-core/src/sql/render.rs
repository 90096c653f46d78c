//! Rendering of the SQL AST to text.
//!
//! The renderer walks a [`SelectStatement`] once, emitting SQL and recording,
//! in placeholder order, which logical parameter component each `?` binds.

use super::expression::{Expression, ParameterId, UnaryOperator};
use super::predicate::{JunctionKind, Predicate};
use super::select::{SelectStatement, TableGroupJoin};
use crate::dialect::Dialect;
use crate::error::TranslationError;
use relmap_proto::{ComparisonOp, JoinType, SqlType};

/// One `?` placeholder: the component of a logical parameter it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    pub id: ParameterId,
    /// Component index inside a composite parameter, 0 for basic ones.
    pub component: usize,
    /// Declared type; `None` binds with the value's own type.
    pub sql_type: Option<SqlType>,
}

/// Rendered SQL with its placeholder layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSql {
    pub sql: String,
    pub parameters: Vec<ParameterSlot>,
}

/// One column-sized operand of a component-wise comparison.
enum Atom<'a> {
    Expr(&'a Expression),
    ParameterComponent {
        id: ParameterId,
        component: usize,
        sql_type: Option<SqlType>,
    },
}

/// Renders select statements for a dialect.
pub struct SqlAstRenderer<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    parameters: Vec<ParameterSlot>,
}

impl<'d> SqlAstRenderer<'d> {
    /// Create a renderer for `dialect`.
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            parameters: Vec::new(),
        }
    }

    /// Render a complete statement, including limits, locks and comment.
    pub fn render(dialect: &'d dyn Dialect, statement: &SelectStatement) -> Result<RenderedSql, TranslationError> {
        let mut renderer = Self::new(dialect);
        renderer.render_query(statement)?;

        let spec = &statement.query_spec;
        let mut sql = dialect.apply_limit(&renderer.sql, &spec.selection);
        if let Some(lock) = &spec.lock {
            sql = dialect.apply_locks_to_sql(&sql, lock);
        }
        if let Some(comment) = statement.comment.as_deref().filter(|c| !c.is_empty()) {
            sql = format!("/* {} */ {}", comment.replace("*/", "*\\/"), sql);
        }
        Ok(RenderedSql {
            sql,
            parameters: renderer.parameters,
        })
    }

    fn render_query(&mut self, statement: &SelectStatement) -> Result<(), TranslationError> {
        let spec = &statement.query_spec;

        self.sql.push_str("select ");
        if spec.select_clause.distinct {
            self.sql.push_str("distinct ");
        }
        for (i, item) in spec.select_clause.items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.render_select_item(&item.expression)?;
        }

        self.sql.push_str(" from ");
        for (i, space) in spec.from_clause.spaces.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push_str(&format!(
                "{} {}",
                space.root.table.table, space.root.table.sql_alias
            ));
            for join in &space.joins {
                self.render_join(join)?;
            }
        }

        if let Some(restriction) = spec.restriction() {
            self.sql.push_str(" where ");
            self.render_predicate(&restriction)?;
        }

        if !spec.group_by.is_empty() {
            self.sql.push_str(" group by ");
            for (i, expression) in spec.group_by.iter().enumerate() {
                if i > 0 {
                    self.sql.push_str(", ");
                }
                self.render_select_item(expression)?;
            }
        }

        if !spec.sort_specifications.is_empty() {
            self.sql.push_str(" order by ");
            for (i, sort) in spec.sort_specifications.iter().enumerate() {
                if i > 0 {
                    self.sql.push_str(", ");
                }
                self.render_expression(&sort.expression)?;
                self.sql.push_str(if sort.ascending { " asc" } else { " desc" });
            }
        }
        Ok(())
    }

    fn render_join(&mut self, join: &TableGroupJoin) -> Result<(), TranslationError> {
        let keyword = match join.join_type {
            JoinType::Inner => " inner join ",
            JoinType::LeftOuter => " left outer join ",
        };
        self.sql.push_str(keyword);
        self.sql.push_str(&format!(
            "{} {} on ",
            join.group.table.table, join.group.table.sql_alias
        ));
        self.render_predicate(&join.predicate)
    }

    /// Select items render tuples as a flat column list.
    fn render_select_item(&mut self, expression: &Expression) -> Result<(), TranslationError> {
        match expression {
            Expression::Tuple(tuple) => {
                for (i, member) in tuple.expressions().iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.render_select_item(member)?;
                }
                Ok(())
            }
            Expression::Fragment {
                sql,
                column_alias: Some(alias),
                ..
            } => {
                self.sql.push_str(&format!("{} as {}", sql, alias));
                Ok(())
            }
            other => self.render_expression(other),
        }
    }

    fn render_expression(&mut self, expression: &Expression) -> Result<(), TranslationError> {
        match expression {
            Expression::Column(column) => {
                self.sql.push_str(&column.qualified_name());
            }
            Expression::Parameter(parameter) => {
                let types = parameter.expressable.sql_types();
                let composite = types.len() > 1;
                if composite {
                    self.sql.push('(');
                }
                for (component, sql_type) in types.into_iter().enumerate() {
                    if component > 0 {
                        self.sql.push_str(", ");
                    }
                    self.push_parameter(parameter.id, component, sql_type);
                }
                if composite {
                    self.sql.push(')');
                }
            }
            Expression::Unary { operator, operand } => {
                self.sql.push(match operator {
                    UnaryOperator::Plus => '+',
                    UnaryOperator::Minus => '-',
                });
                self.render_expression(operand)?;
            }
            Expression::Binary {
                operator, lhs, rhs, ..
            } => {
                self.sql.push('(');
                self.render_expression(lhs)?;
                self.sql.push_str(&format!(" {} ", operator.sql()));
                self.render_expression(rhs)?;
                self.sql.push(')');
            }
            Expression::Tuple(tuple) => {
                self.sql.push('(');
                for (i, member) in tuple.expressions().iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.render_expression(member)?;
                }
                self.sql.push(')');
            }
            Expression::Aggregate {
                function,
                argument,
                distinct,
                ..
            } => {
                self.sql.push_str(function.sql());
                self.sql.push('(');
                match argument {
                    None => self.sql.push('*'),
                    Some(argument) => {
                        if *distinct {
                            self.sql.push_str("distinct ");
                        }
                        self.render_expression(argument)?;
                    }
                }
                self.sql.push(')');
            }
            Expression::Fragment { sql, .. } => {
                self.sql.push_str(sql);
            }
        }
        Ok(())
    }

    fn render_predicate(&mut self, predicate: &Predicate) -> Result<(), TranslationError> {
        match predicate {
            Predicate::Relational { operator, lhs, rhs } => {
                if lhs.column_span() > 1 {
                    return self.render_component_wise(*operator, lhs, rhs);
                }
                self.render_expression(lhs)?;
                self.sql.push_str(&format!(" {} ", operator.sql()));
                self.render_expression(rhs)?;
            }
            Predicate::NullCheck {
                expression,
                negated,
            } => {
                let check = if *negated { " is not null" } else { " is null" };
                match Self::atoms(expression) {
                    Some(atoms) if atoms.len() > 1 => {
                        self.sql.push('(');
                        for (i, atom) in atoms.iter().enumerate() {
                            if i > 0 {
                                self.sql.push_str(" and ");
                            }
                            self.render_atom(atom)?;
                            self.sql.push_str(check);
                        }
                        self.sql.push(')');
                    }
                    _ => {
                        self.render_expression(expression)?;
                        self.sql.push_str(check);
                    }
                }
            }
            Predicate::Like {
                expression,
                pattern,
                ignore_case,
                negated,
            } => {
                if *ignore_case {
                    self.sql.push_str("lower(");
                    self.render_expression(expression)?;
                    self.sql.push(')');
                } else {
                    self.render_expression(expression)?;
                }
                self.sql.push_str(if *negated { " not like " } else { " like " });
                self.render_expression(pattern)?;
            }
            Predicate::InList {
                expression,
                values,
                negated,
            } => {
                self.render_expression(expression)?;
                self.sql.push_str(if *negated { " not in (" } else { " in (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.render_expression(value)?;
                }
                self.sql.push(')');
            }
            Predicate::Between {
                expression,
                low,
                high,
                negated,
            } => {
                self.render_expression(expression)?;
                self.sql
                    .push_str(if *negated { " not between " } else { " between " });
                self.render_expression(low)?;
                self.sql.push_str(" and ");
                self.render_expression(high)?;
            }
            Predicate::Junction { kind, predicates } => {
                if predicates.is_empty() {
                    self.sql.push_str(match kind {
                        JunctionKind::Conjunction => "1=1",
                        JunctionKind::Disjunction => "1=0",
                    });
                    return Ok(());
                }
                let separator = match kind {
                    JunctionKind::Conjunction => " and ",
                    JunctionKind::Disjunction => " or ",
                };
                self.sql.push('(');
                for (i, member) in predicates.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(separator);
                    }
                    self.render_predicate(member)?;
                }
                self.sql.push(')');
            }
            Predicate::Negated(inner) => {
                self.sql.push_str("not (");
                self.render_predicate(inner)?;
                self.sql.push(')');
            }
            Predicate::TruthValue {
                expression,
                truth,
                negated,
            } => {
                self.render_expression(expression)?;
                self.sql.push_str(if *negated { " <> " } else { " = " });
                self.sql.push_str(self.dialect.boolean_literal(*truth));
            }
            Predicate::Fragment { sql, parameters } => {
                let mut remaining = parameters.iter();
                for ch in sql.chars() {
                    if ch == '?' {
                        let parameter = remaining.next().ok_or_else(|| {
                            TranslationError::MalformedPredicate(format!(
                                "sql fragment '{}' has more placeholders than values",
                                sql
                            ))
                        })?;
                        self.render_expression(parameter)?;
                    } else {
                        self.sql.push(ch);
                    }
                }
                if remaining.next().is_some() {
                    return Err(TranslationError::MalformedPredicate(format!(
                        "sql fragment '{}' has more values than placeholders",
                        sql
                    )));
                }
            }
        }
        Ok(())
    }

    /// `(a = ? and b = ?)`, or `(a <> ? or b <> ?)` for inequality.
    fn render_component_wise(
        &mut self,
        operator: ComparisonOp,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<(), TranslationError> {
        let (Some(left), Some(right)) = (Self::atoms(lhs), Self::atoms(rhs)) else {
            // Fall back to a row-value comparison.
            self.render_expression(lhs)?;
            self.sql.push_str(&format!(" {} ", operator.sql()));
            return self.render_expression(rhs);
        };
        if left.len() != right.len() {
            return Err(TranslationError::ShapeMismatch {
                expected: left.len(),
                actual: right.len(),
            });
        }
        let separator = if operator == ComparisonOp::Ne { " or " } else { " and " };
        self.sql.push('(');
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            self.render_atom(l)?;
            self.sql.push_str(&format!(" {} ", operator.sql()));
            self.render_atom(r)?;
        }
        self.sql.push(')');
        Ok(())
    }

    /// Split a multi-column operand into column-sized pieces.
    fn atoms(expression: &Expression) -> Option<Vec<Atom<'_>>> {
        match expression {
            Expression::Tuple(tuple) => {
                let mut out = Vec::new();
                for member in tuple.expressions() {
                    if member.column_span() == 1 {
                        out.push(Atom::Expr(member));
                    } else {
                        out.extend(Self::atoms(member)?);
                    }
                }
                Some(out)
            }
            Expression::Parameter(parameter) => Some(
                parameter
                    .expressable
                    .sql_types()
                    .into_iter()
                    .enumerate()
                    .map(|(component, sql_type)| Atom::ParameterComponent {
                        id: parameter.id,
                        component,
                        sql_type,
                    })
                    .collect(),
            ),
            other if other.column_span() == 1 => Some(vec![Atom::Expr(other)]),
            _ => None,
        }
    }

    fn render_atom(&mut self, atom: &Atom<'_>) -> Result<(), TranslationError> {
        match atom {
            Atom::Expr(expression) => self.render_expression(expression),
            Atom::ParameterComponent {
                id,
                component,
                sql_type,
            } => {
                self.push_parameter(*id, *component, *sql_type);
                Ok(())
            }
        }
    }

    fn push_parameter(&mut self, id: ParameterId, component: usize, sql_type: Option<SqlType>) {
        self.sql.push('?');
        self.parameters.push(ParameterSlot {
            id,
            component,
            sql_type,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{AnsiDialect, OracleDialect, SqliteDialect};
    use crate::sql::{ExpressableType, SqlTuple};
    use crate::sql::{LockClause, LockedTable, TableGroup, TableReference};
    use pretty_assertions::assert_eq;
    use relmap_proto::{LockMode, LockTimeout, RowSelection};

    fn group(alias: &str, entity: &str, table: &str) -> TableGroup {
        TableGroup {
            alias: alias.into(),
            entity: entity.into(),
            table: TableReference {
                table: table.into(),
                sql_alias: format!("{}_", alias),
            },
        }
    }

    fn order_statement() -> SelectStatement {
        let mut statement = SelectStatement::default();
        let spec = &mut statement.query_spec;
        spec.from_clause.make_table_space(group("this", "Order", "orders"));
        spec.select_clause
            .add(Expression::column("this_", "id", SqlType::BigInt));
        spec.select_clause
            .add(Expression::column("this_", "total", SqlType::Double));
        spec.add_restriction(
            Predicate::relational(
                ComparisonOp::Gt,
                Expression::column("this_", "total", SqlType::Double),
                Expression::parameter(0, ExpressableType::Basic(SqlType::Double)),
            )
            .unwrap(),
        );
        statement
    }

    #[test]
    fn test_render_simple_select() {
        let rendered = SqlAstRenderer::render(&AnsiDialect, &order_statement()).unwrap();
        assert_eq!(
            rendered.sql,
            "select this_.id, this_.total from orders this_ where this_.total > ?"
        );
        assert_eq!(
            rendered.parameters,
            vec![ParameterSlot {
                id: 0,
                component: 0,
                sql_type: Some(SqlType::Double)
            }]
        );
    }

    #[test]
    fn test_render_composite_equality_component_wise() {
        let mut statement = SelectStatement::default();
        let spec = &mut statement.query_spec;
        spec.from_clause.make_table_space(group("this", "OrderLine", "order_lines"));
        spec.select_clause
            .add(Expression::column("this_", "qty", SqlType::Integer));
        let id = Expression::Tuple(
            SqlTuple::new(vec![
                Expression::column("this_", "order_id", SqlType::BigInt),
                Expression::column("this_", "line_no", SqlType::Integer),
            ])
            .unwrap(),
        );
        let param = Expression::parameter(
            3,
            ExpressableType::Composite(vec![SqlType::BigInt, SqlType::Integer]),
        );
        spec.add_restriction(Predicate::relational(ComparisonOp::Eq, id, param).unwrap());

        let rendered = SqlAstRenderer::render(&AnsiDialect, &statement).unwrap();
        assert_eq!(
            rendered.sql,
            "select this_.qty from order_lines this_ where (this_.order_id = ? and this_.line_no = ?)"
        );
        assert_eq!(rendered.parameters.len(), 2);
        assert_eq!(rendered.parameters[1].component, 1);
        assert_eq!(rendered.parameters[1].sql_type, Some(SqlType::Integer));
    }

    #[test]
    fn test_render_limit_lock_and_comment() {
        let mut statement = order_statement();
        statement.comment = Some("orders over threshold".into());
        statement.query_spec.selection = RowSelection::page(0, 5);
        statement.query_spec.lock = Some(LockClause {
            lock_mode: LockMode::PessimisticWrite,
            timeout: LockTimeout::NoWait,
            locked: vec![LockedTable {
                sql_alias: "this_".into(),
                key_columns: vec!["id".into()],
            }],
            all_tables: false,
        });
        let rendered = SqlAstRenderer::render(&OracleDialect, &statement).unwrap();
        assert_eq!(
            rendered.sql,
            "/* orders over threshold */ select this_.id, this_.total from orders this_ \
             where this_.total > ? fetch first 5 rows only for update of this_.id nowait"
        );
    }

    #[test]
    fn test_render_truth_value_uses_dialect_literal() {
        let mut statement = SelectStatement::default();
        let spec = &mut statement.query_spec;
        spec.from_clause.make_table_space(group("this", "Customer", "customers"));
        spec.select_clause
            .add(Expression::column("this_", "id", SqlType::BigInt));
        spec.add_restriction(Predicate::TruthValue {
            expression: Expression::column("this_", "active", SqlType::Boolean),
            truth: true,
            negated: false,
        });
        assert_eq!(
            SqlAstRenderer::render(&AnsiDialect, &statement).unwrap().sql,
            "select this_.id from customers this_ where this_.active = true"
        );
        assert_eq!(
            SqlAstRenderer::render(&SqliteDialect, &statement).unwrap().sql,
            "select this_.id from customers this_ where this_.active = 1"
        );
    }

    #[test]
    fn test_render_fragment_placeholder_mismatch() {
        let mut statement = order_statement();
        statement.query_spec.add_restriction(Predicate::Fragment {
            sql: "this_.status in (?, ?)".into(),
            parameters: vec![Expression::parameter(1, ExpressableType::Inferred)],
        });
        assert!(matches!(
            SqlAstRenderer::render(&AnsiDialect, &statement),
            Err(TranslationError::MalformedPredicate(_))
        ));
    }
}
