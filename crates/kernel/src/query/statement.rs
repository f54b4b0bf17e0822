//! SELECT and COUNT statement assembly.
//!
//! Statements are built with sea-query so identifiers, LIMIT/OFFSET and the
//! bind-parameter numbering are handled by one builder. The compiled filter
//! is embedded as a custom expression with its parameters attached.

use sea_query::{Alias, Expr, Order, PostgresQueryBuilder, Query, SelectStatement, Values};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{QueryError, QueryResult};
use super::predicate::{ColumnRef, CompiledPredicate};
use super::schema::{TableSchema, is_valid_identifier};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl From<SortDirection> for Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        }
    }
}

/// One ORDER BY entry requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column_name: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column_name: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column_name: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// A ready-to-run statement with its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL with `$n` placeholders.
    pub sql: String,
    pub values: Values,
    /// Output columns, in SELECT order. Empty for COUNT statements.
    pub columns: Vec<String>,
}

/// Builds the data and count statements for one list request.
///
/// Requested columns and sort keys that the table does not declare are
/// dropped. The key column is always appended as the final sort key so
/// that paging is stable.
#[derive(Debug)]
pub struct StatementBuilder<'a> {
    table: &'a TableSchema,
    alias: String,
    filter: &'a CompiledPredicate,
    columns: Vec<String>,
    sorts: Vec<(String, SortDirection)>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(
        table: &'a TableSchema,
        alias: &str,
        filter: &'a CompiledPredicate,
    ) -> QueryResult<Self> {
        if !is_valid_identifier(alias) {
            return Err(QueryError::InvalidIdentifier(alias.to_string()));
        }
        Ok(Self {
            table,
            alias: alias.to_string(),
            filter,
            columns: table
                .columns()
                .iter()
                .map(|c| c.column_name.clone())
                .collect(),
            sorts: Vec::new(),
        })
    }

    /// Restrict the projection to `requested`. An empty list, or one naming
    /// no declared column, keeps every column.
    pub fn columns(mut self, requested: &[String]) -> Self {
        let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            match self.table.column(name) {
                Some(column) if !resolved.contains(&column.column_name) => {
                    resolved.push(column.column_name.clone());
                }
                Some(_) => {}
                None => warn!(
                    table = self.table.table_name(),
                    column = %name,
                    "dropping unknown projection column"
                ),
            }
        }
        if !resolved.is_empty() {
            self.columns = resolved;
        }
        self
    }

    pub fn sort(mut self, sorts: &[SortSpec]) -> Self {
        for sort in sorts {
            let Some(column) = self.table.column(&sort.column_name) else {
                warn!(
                    table = self.table.table_name(),
                    column = %sort.column_name,
                    "dropping sort on unknown column"
                );
                continue;
            };
            if !self.sorts.iter().any(|(c, _)| *c == column.column_name) {
                self.sorts.push((column.column_name.clone(), sort.direction));
            }
        }
        self
    }

    /// `SELECT COUNT(*) FROM table alias WHERE filter`.
    pub fn build_count(&self) -> Statement {
        let mut query = Query::select();
        query.expr(Expr::cust("COUNT(*)"));
        self.from_and_where(&mut query);
        let (sql, values) = query.build(PostgresQueryBuilder);
        Statement {
            sql,
            values,
            columns: Vec::new(),
        }
    }

    /// Page of records, ordered, limited and offset.
    pub fn build_page(&self, limit: u32, offset: u64) -> Statement {
        let mut query = Query::select();
        for column in &self.columns {
            query.expr_as(
                Expr::cust(ColumnRef::new(&self.alias, column).to_string()),
                Alias::new(column.as_str()),
            );
        }
        self.from_and_where(&mut query);
        for (column, direction) in self.order_by() {
            query.order_by_expr(
                Expr::cust(ColumnRef::new(&self.alias, &column).to_string()),
                direction.into(),
            );
        }
        query.limit(u64::from(limit)).offset(offset);

        let (sql, values) = query.build(PostgresQueryBuilder);
        Statement {
            sql,
            values,
            columns: self.columns.clone(),
        }
    }

    fn from_and_where(&self, query: &mut SelectStatement) {
        // Unquoted column references fold to lower case, so the quoted
        // table and alias names must be lower case too.
        query.from_as(
            Alias::new(self.table.table_name().to_ascii_lowercase()),
            Alias::new(self.alias.to_ascii_lowercase()),
        );
        if !self.filter.is_empty() {
            query.and_where(Expr::cust_with_values(
                self.filter.numbered_sql(),
                self.filter.parameters().iter().cloned(),
            ));
        }
    }

    fn order_by(&self) -> Vec<(String, SortDirection)> {
        let mut order = self.sorts.clone();
        if let Some(key) = self.table.key_column()
            && !order.iter().any(|(c, _)| c == key)
        {
            order.push((key.to_string(), SortDirection::Asc));
        }
        order
    }
}
