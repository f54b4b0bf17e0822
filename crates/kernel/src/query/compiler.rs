//! Compiles filter criteria into a parameterized WHERE fragment.

use tracing::{debug, warn};

use super::criteria::{Criteria, Operator};
use super::error::{QueryError, QueryResult};
use super::predicate::{ColumnRef, Comparison, CompiledPredicate, Predicate, SqlValue};
use super::schema::TableSchema;

/// Most bind values one filter may carry, leaving room under PostgreSQL's
/// 65535 parameter limit for access scoping and paging.
pub const MAX_FILTER_VALUES: usize = 10_000;

/// Turns criteria lists into [`CompiledPredicate`]s for one table.
///
/// Criteria on columns the table does not declare are skipped; values that
/// cannot be coerced to their column's type fail the whole compilation.
pub struct FilterCompiler<'a> {
    schema: &'a TableSchema,
    alias: &'a str,
}

impl<'a> FilterCompiler<'a> {
    /// Create a compiler for `schema`, qualifying columns with `alias`.
    ///
    /// The alias must already have passed the identifier allow-list.
    pub fn new(schema: &'a TableSchema, alias: &'a str) -> Self {
        Self { schema, alias }
    }

    /// Compile all criteria, ANDed, in input order.
    pub fn compile(&self, criteria: &[Criteria]) -> QueryResult<CompiledPredicate> {
        let supplied: usize = criteria.iter().map(|c| c.values().len()).sum();
        if supplied > MAX_FILTER_VALUES {
            return Err(QueryError::InvalidCriteria(format!(
                "filter carries {supplied} values, at most {MAX_FILTER_VALUES} allowed"
            )));
        }
        let predicates = self.predicates(criteria)?;
        let compiled = CompiledPredicate::from_predicates(&predicates);
        debug!(
            table = self.schema.table_name(),
            criteria = criteria.len(),
            emitted = predicates.len(),
            parameters = compiled.parameters().len(),
            "compiled filter criteria"
        );
        Ok(compiled)
    }

    /// Build the structured predicates without rendering them.
    pub fn predicates(&self, criteria: &[Criteria]) -> QueryResult<Vec<Predicate>> {
        let mut predicates = Vec::with_capacity(criteria.len());
        for c in criteria {
            if let Some(predicate) = self.predicate(c)? {
                predicates.push(predicate);
            }
        }
        Ok(predicates)
    }

    fn predicate(&self, criteria: &Criteria) -> QueryResult<Option<Predicate>> {
        let Some(column) = self.schema.column(criteria.column_name()) else {
            warn!(
                table = self.schema.table_name(),
                column = criteria.column_name(),
                "dropping filter on unknown column"
            );
            return Ok(None);
        };

        let name = column.column_name.as_str();
        let column_type = column.column_type;
        let column_ref = ColumnRef::new(self.alias, name);
        let coerce = |index: usize| -> QueryResult<SqlValue> {
            let value = criteria.values().get(index).ok_or_else(|| {
                QueryError::InvalidCriteria(format!("missing value for {name}"))
            })?;
            column_type.coerce(name, value)
        };

        let predicate = match criteria.operator() {
            Operator::Equal => compare(column_ref, Comparison::Eq, coerce(0)?),
            Operator::NotEqual => compare(column_ref, Comparison::Ne, coerce(0)?),
            Operator::Greater => compare(column_ref, Comparison::Gt, coerce(0)?),
            Operator::Less => compare(column_ref, Comparison::Lt, coerce(0)?),
            Operator::GreaterEqual => compare(column_ref, Comparison::Gte, coerce(0)?),
            Operator::LessEqual => compare(column_ref, Comparison::Lte, coerce(0)?),
            Operator::Like | Operator::NotLike => {
                if !column_type.is_textual() {
                    return Err(QueryError::coercion(
                        name,
                        format!("{} requires a text column", criteria.operator().as_str()),
                    ));
                }
                let value = match coerce(0)? {
                    SqlValue::Text(text) => SqlValue::Text(escape_like_wildcards(&text)),
                    other => other,
                };
                Predicate::Contains {
                    column: column_ref,
                    value,
                    negated: criteria.operator() == Operator::NotLike,
                }
            }
            Operator::Between => Predicate::Between {
                column: column_ref,
                low: coerce(0)?,
                high: coerce(1)?,
            },
            Operator::In | Operator::NotIn => Predicate::InList {
                column: column_ref,
                values: (0..criteria.values().len())
                    .map(coerce)
                    .collect::<QueryResult<Vec<_>>>()?,
                negated: criteria.operator() == Operator::NotIn,
            },
            Operator::Null => Predicate::IsNull {
                column: column_ref,
                negated: false,
            },
            Operator::NotNull => Predicate::IsNull {
                column: column_ref,
                negated: true,
            },
        };

        Ok(Some(predicate))
    }
}

fn compare(column: ColumnRef, op: Comparison, value: SqlValue) -> Predicate {
    Predicate::Compare { column, op, value }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Compile `criteria` against `schema` using `alias`.
pub fn compile(
    criteria: &[Criteria],
    alias: &str,
    schema: &TableSchema,
) -> QueryResult<CompiledPredicate> {
    FilterCompiler::new(schema, alias).compile(criteria)
}
