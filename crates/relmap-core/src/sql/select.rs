//! Select statement tree.

use super::expression::{Expression, SqlSelection};
use super::predicate::Predicate;
use relmap_proto::{JoinType, LockMode, LockTimeout, RowSelection};

/// A table with its SQL alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub table: String,
    pub sql_alias: String,
}

/// The tables backing one query alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGroup {
    /// Query alias (`this`, `c`, ...).
    pub alias: String,
    /// Mapped entity.
    pub entity: String,
    pub table: TableReference,
}

/// A joined table group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGroupJoin {
    pub join_type: JoinType,
    pub group: TableGroup,
    pub predicate: Predicate,
}

/// A root table group and everything joined to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpace {
    pub root: TableGroup,
    pub joins: Vec<TableGroupJoin>,
}

impl TableSpace {
    /// All table groups, root first.
    pub fn table_groups(&self) -> impl Iterator<Item = &TableGroup> {
        std::iter::once(&self.root).chain(self.joins.iter().map(|j| &j.group))
    }
}

/// The from clause.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FromClause {
    pub spaces: Vec<TableSpace>,
}

impl FromClause {
    /// Start a new table space rooted at `root`.
    pub fn make_table_space(&mut self, root: TableGroup) -> &mut TableSpace {
        self.spaces.push(TableSpace {
            root,
            joins: Vec::new(),
        });
        let last = self.spaces.len() - 1;
        &mut self.spaces[last]
    }

    /// All table groups in declaration order.
    pub fn table_groups(&self) -> impl Iterator<Item = &TableGroup> {
        self.spaces.iter().flat_map(|s| s.table_groups())
    }

    /// Find the table group of a query alias.
    pub fn find_table_group(&self, alias: &str) -> Option<&TableGroup> {
        self.table_groups().find(|g| g.alias == alias)
    }
}

/// An expression in the select clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub expression: Expression,
    pub selection: SqlSelection,
}

/// The select clause; tracks JDBC positions as expressions are added.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectClause {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
}

impl SelectClause {
    /// Number of JDBC columns selected so far.
    pub fn column_count(&self) -> usize {
        self.items.iter().map(|i| i.selection.span()).sum()
    }

    /// Append an expression and return the selection describing its position.
    pub fn add(&mut self, expression: Expression) -> SqlSelection {
        let selection = expression.create_sql_selection(self.column_count() + 1);
        self.items.push(SelectItem {
            expression,
            selection: selection.clone(),
        });
        selection
    }

    /// Position of an already-selected expression, to avoid selecting it twice.
    pub fn find(&self, expression: &Expression) -> Option<&SqlSelection> {
        self.items
            .iter()
            .find(|i| &i.expression == expression)
            .map(|i| &i.selection)
    }

    /// Selections in clause order.
    pub fn selections(&self) -> Vec<SqlSelection> {
        self.items.iter().map(|i| i.selection.clone()).collect()
    }
}

/// An order-by item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpecification {
    pub expression: Expression,
    pub ascending: bool,
}

/// A table locked by the lock clause, with its key columns for `for update of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedTable {
    pub sql_alias: String,
    pub key_columns: Vec<String>,
}

/// Lock clause embedded in the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockClause {
    /// Highest lock mode requested across the locked aliases.
    pub lock_mode: LockMode,
    pub timeout: LockTimeout,
    /// Tables the lock applies to.
    pub locked: Vec<LockedTable>,
    /// Whether every table of the statement is locked.
    pub all_tables: bool,
}

impl LockClause {
    /// `alias.col, alias.col` list for dialects supporting `for update of`.
    pub fn key_column_list(&self) -> String {
        self.locked
            .iter()
            .flat_map(|t| t.key_columns.iter().map(move |c| format!("{}.{}", t.sql_alias, c)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One query specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySpec {
    pub select_clause: SelectClause,
    pub from_clause: FromClause,
    pub restrictions: Vec<Predicate>,
    pub group_by: Vec<Expression>,
    pub sort_specifications: Vec<SortSpecification>,
    pub selection: RowSelection,
    pub lock: Option<LockClause>,
}

impl QuerySpec {
    /// Add a restriction; all restrictions are conjoined.
    pub fn add_restriction(&mut self, predicate: Predicate) {
        self.restrictions.push(predicate);
    }

    /// The combined where-clause predicate.
    pub fn restriction(&self) -> Option<Predicate> {
        if self.restrictions.is_empty() {
            None
        } else {
            Some(Predicate::and(self.restrictions.clone()))
        }
    }
}

/// A complete select statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectStatement {
    pub query_spec: QuerySpec,
    /// Comment prepended to the rendered SQL.
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlTuple;
    use relmap_proto::SqlType;

    #[test]
    fn test_select_clause_positions() {
        let mut clause = SelectClause::default();
        let a = clause.add(Expression::column("t_", "id", SqlType::BigInt));
        let b = clause.add(Expression::Tuple(
            SqlTuple::new(vec![
                Expression::column("t_", "street", SqlType::Varchar),
                Expression::column("t_", "city", SqlType::Varchar),
            ])
            .unwrap(),
        ));
        let c = clause.add(Expression::column("t_", "name", SqlType::Varchar));
        assert_eq!(a.jdbc_position, 1);
        assert_eq!(b.jdbc_position, 2);
        assert_eq!(c.jdbc_position, 4);
        assert_eq!(clause.column_count(), 4);
        assert!(clause.find(&Expression::column("t_", "name", SqlType::Varchar)).is_some());
    }

    #[test]
    fn test_key_column_list() {
        let clause = LockClause {
            lock_mode: LockMode::PessimisticWrite,
            timeout: LockTimeout::Default,
            locked: vec![
                LockedTable {
                    sql_alias: "o_".into(),
                    key_columns: vec!["id".into()],
                },
                LockedTable {
                    sql_alias: "l_".into(),
                    key_columns: vec!["order_id".into(), "line_no".into()],
                },
            ],
            all_tables: false,
        };
        assert_eq!(clause.key_column_list(), "o_.id, l_.order_id, l_.line_no");
    }
}
