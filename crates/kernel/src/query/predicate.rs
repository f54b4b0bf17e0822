//! Structured SQL predicates with positional parameters.
//!
//! Every [`Predicate`] variant writes its SQL text and pushes its parameters
//! in the same step, so a [`CompiledPredicate`] always carries exactly one
//! parameter per `?` placeholder, in placeholder order.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::error::{QueryError, QueryResult};

/// Typed bind parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Timestamp(NaiveDateTime),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<SqlValue> for sea_query::Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Text(s) => s.into(),
            SqlValue::Integer(i) => i.into(),
            SqlValue::Decimal(d) => d.into(),
            SqlValue::Timestamp(ts) => ts.into(),
        }
    }
}

/// A column qualified by a table alias, rendered as `alias.column`.
///
/// Both parts must come from the schema catalog or the identifier
/// allow-list; they are written into SQL verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: &str, column: &str) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Comparison {
    fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
        }
    }
}

/// One SQL boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `col {op} ?`
    Compare {
        column: ColumnRef,
        op: Comparison,
        value: SqlValue,
    },
    /// `UPPER(col) [NOT ]LIKE '%' || UPPER(?) || '%'`
    Contains {
        column: ColumnRef,
        value: SqlValue,
        negated: bool,
    },
    /// `col BETWEEN ? AND ?`
    Between {
        column: ColumnRef,
        low: SqlValue,
        high: SqlValue,
    },
    /// `col [NOT ]IN (?, ...)`
    InList {
        column: ColumnRef,
        values: Vec<SqlValue>,
        negated: bool,
    },
    /// `col IS [NOT ]NULL`
    IsNull { column: ColumnRef, negated: bool },
    /// Pre-rendered fragment whose placeholder count was checked.
    Raw(CompiledPredicate),
    /// Conjunction; rendered in parentheses when it has more than one member.
    All(Vec<Predicate>),
}

impl Predicate {
    /// Append this predicate's SQL to `sql` and its parameters to `params`.
    pub fn render(&self, sql: &mut String, params: &mut Vec<SqlValue>) {
        match self {
            Predicate::Compare { column, op, value } => {
                sql.push_str(&format!("{column} {} ?", op.as_sql()));
                params.push(value.clone());
            }
            Predicate::Contains {
                column,
                value,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                sql.push_str(&format!("UPPER({column}) {not}LIKE '%' || UPPER(?) || '%'"));
                params.push(value.clone());
            }
            Predicate::Between { column, low, high } => {
                sql.push_str(&format!("{column} BETWEEN ? AND ?"));
                params.push(low.clone());
                params.push(high.clone());
            }
            Predicate::InList {
                column,
                values,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!("{column} {not}IN ({placeholders})"));
                params.extend(values.iter().cloned());
            }
            Predicate::IsNull { column, negated } => {
                let not = if *negated { "NOT " } else { "" };
                sql.push_str(&format!("{column} IS {not}NULL"));
            }
            Predicate::Raw(compiled) => {
                sql.push_str(&compiled.sql);
                params.extend(compiled.parameters.iter().cloned());
            }
            Predicate::All(members) => {
                let wrap = members.len() > 1;
                if wrap {
                    sql.push('(');
                }
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    member.render(sql, params);
                }
                if wrap {
                    sql.push(')');
                }
            }
        }
    }

    /// Render a single predicate.
    pub fn compile(&self) -> CompiledPredicate {
        CompiledPredicate::from_predicates(std::slice::from_ref(self))
    }
}

/// SQL fragment plus its ordered parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledPredicate {
    sql: String,
    parameters: Vec<SqlValue>,
}

impl CompiledPredicate {
    /// Render predicates joined with `AND`.
    pub fn from_predicates(predicates: &[Predicate]) -> Self {
        let mut sql = String::new();
        let mut parameters = Vec::new();
        for (i, predicate) in predicates.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            predicate.render(&mut sql, &mut parameters);
        }
        Self { sql, parameters }
    }

    /// Wrap a hand-written fragment, rejecting it when the number of `?`
    /// placeholders differs from the number of parameters.
    pub fn raw(sql: impl Into<String>, parameters: Vec<SqlValue>) -> QueryResult<Self> {
        let sql = sql.into();
        let placeholders = count_placeholders(&sql);
        if placeholders != parameters.len() {
            return Err(QueryError::Binding(format!(
                "fragment has {placeholders} placeholder(s) but {} parameter(s)",
                parameters.len()
            )));
        }
        Ok(Self { sql, parameters })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[SqlValue] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Combine two predicates with `AND`, keeping parameter order.
    pub fn and(mut self, other: CompiledPredicate) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        self.sql.push_str(" AND ");
        self.sql.push_str(&other.sql);
        self.parameters.extend(other.parameters);
        self
    }

    /// SQL with `?` placeholders rewritten to `$1`, `$2`, ... (quoted
    /// literals are left alone).
    pub fn numbered_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 8);
        let mut n = 0;
        for_each_unquoted(&self.sql, |c, quoted| {
            if c == '?' && !quoted {
                n += 1;
                out.push_str(&format!("${n}"));
            } else {
                out.push(c);
            }
        });
        out
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.parameters)
    }
}

/// Count `?` placeholders outside single-quoted literals.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    for_each_unquoted(sql, |c, quoted| {
        if c == '?' && !quoted {
            count += 1;
        }
    });
    count
}

/// Walk `sql`, telling the callback whether each char sits inside a
/// single-quoted literal (`''` escapes stay inside).
fn for_each_unquoted(sql: &str, mut f: impl FnMut(char, bool)) {
    let mut quoted = false;
    for c in sql.chars() {
        if c == '\'' {
            quoted = !quoted;
            f(c, true);
        } else {
            f(c, quoted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new("c", name)
    }

    #[test]
    fn contains_template() {
        let p = Predicate::Contains {
            column: col("Name"),
            value: "acme".into(),
            negated: false,
        }
        .compile();
        assert_eq!(p.sql(), "UPPER(c.Name) LIKE '%' || UPPER(?) || '%'");
        assert_eq!(p.parameters(), &[SqlValue::Text("acme".to_string())]);
        assert_eq!(count_placeholders(p.sql()), 1);
    }

    #[test]
    fn in_list_has_one_placeholder_per_value() {
        let p = Predicate::InList {
            column: col("C_BPartner_ID"),
            values: vec![1.into(), 2.into(), 3.into()],
            negated: true,
        }
        .compile();
        assert_eq!(p.sql(), "c.C_BPartner_ID NOT IN (?, ?, ?)");
        assert_eq!(p.parameters().len(), 3);
    }

    #[test]
    fn predicates_join_with_and_in_order() {
        let p = CompiledPredicate::from_predicates(&[
            Predicate::Compare {
                column: col("AD_Client_ID"),
                op: Comparison::Eq,
                value: 11.into(),
            },
            Predicate::IsNull {
                column: col("Description"),
                negated: true,
            },
            Predicate::Between {
                column: col("Qty"),
                low: 1.into(),
                high: 5.into(),
            },
        ]);
        assert_eq!(
            p.sql(),
            "c.AD_Client_ID = ? AND c.Description IS NOT NULL AND c.Qty BETWEEN ? AND ?"
        );
        assert_eq!(
            p.parameters(),
            &[
                SqlValue::Integer(11),
                SqlValue::Integer(1),
                SqlValue::Integer(5)
            ]
        );
    }

    #[test]
    fn nested_conjunction_is_parenthesized() {
        let p = Predicate::All(vec![
            Predicate::Compare {
                column: col("A"),
                op: Comparison::Gt,
                value: 1.into(),
            },
            Predicate::Compare {
                column: col("B"),
                op: Comparison::Lte,
                value: 2.into(),
            },
        ])
        .compile();
        assert_eq!(p.sql(), "(c.A > ? AND c.B <= ?)");
    }

    #[test]
    fn raw_fragment_checks_placeholders() {
        assert!(CompiledPredicate::raw("x = ? AND y = '?'", vec![1.into()]).is_ok());
        assert!(CompiledPredicate::raw("x = ?", Vec::new()).is_err());
        assert!(CompiledPredicate::raw("x = 1", vec![1.into()]).is_err());
    }

    #[test]
    fn and_keeps_parameter_order() {
        let a = CompiledPredicate::raw("a = ?", vec![1.into()]).unwrap();
        let b = CompiledPredicate::raw("b IN (?, ?)", vec![2.into(), 3.into()]).unwrap();
        let combined = a.and(b).and(CompiledPredicate::default());
        assert_eq!(combined.sql(), "a = ? AND b IN (?, ?)");
        assert_eq!(
            combined.parameters(),
            &[
                SqlValue::Integer(1),
                SqlValue::Integer(2),
                SqlValue::Integer(3)
            ]
        );
        assert_eq!(
            CompiledPredicate::default().and(combined.clone()),
            combined
        );
    }

    #[test]
    fn numbered_sql_skips_quoted_literals() {
        let p = Predicate::Contains {
            column: col("Name"),
            value: "x".into(),
            negated: false,
        }
        .compile()
        .and(CompiledPredicate::raw("c.Value = ? AND c.Note <> '?'", vec!["v".into()]).unwrap());
        assert_eq!(
            p.numbered_sql(),
            "UPPER(c.Name) LIKE '%' || UPPER($1) || '%' AND c.Value = $2 AND c.Note <> '?'"
        );
    }
}
