//! Filter criteria received from list requests.
//!
//! A [`Criteria`] is one condition over one column. Value arity is checked
//! at construction (and on deserialization), so a `Criteria` that exists is
//! always well-formed. Values stay untyped until the compiler coerces them
//! against the column's declared type.

use serde::{Deserialize, Serialize};

use super::error::{QueryError, QueryResult};

/// Comparison operators accepted in filter criteria.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Exact match.
    Equal,
    /// Not equal.
    NotEqual,
    /// Case-insensitive substring match.
    Like,
    /// Negated case-insensitive substring match.
    NotLike,
    /// Inclusive range.
    Between,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    /// Column is NULL.
    Null,
    /// Column is not NULL.
    NotNull,
}

/// How many values an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

impl Operator {
    /// Every operator, in declaration order.
    pub const ALL: [Operator; 13] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::Like,
        Operator::NotLike,
        Operator::Between,
        Operator::In,
        Operator::NotIn,
        Operator::Greater,
        Operator::Less,
        Operator::GreaterEqual,
        Operator::LessEqual,
        Operator::Null,
        Operator::NotNull,
    ];

    /// Number of values the operator requires.
    pub fn arity(self) -> Arity {
        match self {
            Operator::Null | Operator::NotNull => Arity::Exactly(0),
            Operator::Between => Arity::Exactly(2),
            Operator::In | Operator::NotIn => Arity::AtLeast(1),
            _ => Arity::Exactly(1),
        }
    }

    /// Wire name of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "EQUAL",
            Operator::NotEqual => "NOT_EQUAL",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT_LIKE",
            Operator::Between => "BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Greater => "GREATER",
            Operator::Less => "LESS",
            Operator::GreaterEqual => "GREATER_EQUAL",
            Operator::LessEqual => "LESS_EQUAL",
            Operator::Null => "NULL",
            Operator::NotNull => "NOT_NULL",
        }
    }
}

/// Untyped filter value as received from the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Boolean value.
    Boolean(bool),
    /// Integer value (also epoch milliseconds for date columns).
    Integer(i64),
    /// Decimal value.
    Decimal(f64),
    /// Text value (also ISO-8601 dates).
    Text(String),
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Integer(i64::from(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Decimal(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Decimal(d) => write!(f, "{d}"),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

/// Wire shape of a criteria before validation.
#[derive(Debug, Clone, Deserialize)]
struct RawCriteria {
    column_name: String,
    operator: Operator,
    #[serde(default)]
    values: Vec<ScalarValue>,
}

/// One validated filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCriteria")]
pub struct Criteria {
    column_name: String,
    operator: Operator,
    values: Vec<ScalarValue>,
}

impl TryFrom<RawCriteria> for Criteria {
    type Error = QueryError;

    fn try_from(raw: RawCriteria) -> QueryResult<Self> {
        Criteria::new(raw.column_name, raw.operator, raw.values)
    }
}

/// Most values a single criteria may carry.
pub const MAX_VALUES: usize = 1000;

impl Criteria {
    /// Build a criteria, checking the column name and the value count.
    pub fn new(
        column_name: impl Into<String>,
        operator: Operator,
        values: Vec<ScalarValue>,
    ) -> QueryResult<Self> {
        let column_name = column_name.into();
        if column_name.trim().is_empty() {
            return Err(QueryError::InvalidCriteria(
                "column name must not be empty".to_string(),
            ));
        }

        let arity = operator.arity();
        if !arity.accepts(values.len()) {
            return Err(QueryError::InvalidCriteria(format!(
                "{} on {column_name} takes {arity} value(s), got {}",
                operator.as_str(),
                values.len()
            )));
        }
        if values.len() > MAX_VALUES {
            return Err(QueryError::InvalidCriteria(format!(
                "{} on {column_name} takes at most {MAX_VALUES} values, got {}",
                operator.as_str(),
                values.len()
            )));
        }

        Ok(Self {
            column_name,
            operator,
            values,
        })
    }

    pub fn equal(column: &str, value: impl Into<ScalarValue>) -> QueryResult<Self> {
        Self::new(column, Operator::Equal, vec![value.into()])
    }

    pub fn not_equal(column: &str, value: impl Into<ScalarValue>) -> QueryResult<Self> {
        Self::new(column, Operator::NotEqual, vec![value.into()])
    }

    pub fn like(column: &str, value: impl Into<ScalarValue>) -> QueryResult<Self> {
        Self::new(column, Operator::Like, vec![value.into()])
    }

    pub fn between(
        column: &str,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> QueryResult<Self> {
        Self::new(column, Operator::Between, vec![low.into(), high.into()])
    }

    pub fn is_in<V: Into<ScalarValue>>(
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> QueryResult<Self> {
        Self::new(
            column,
            Operator::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn is_null(column: &str) -> QueryResult<Self> {
        Self::new(column, Operator::Null, Vec::new())
    }

    pub fn is_not_null(column: &str) -> QueryResult<Self> {
        Self::new(column, Operator::NotNull, Vec::new())
    }

    /// Column the condition applies to, as sent by the client.
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(n: usize) -> Vec<ScalarValue> {
        (0..n).map(|i| ScalarValue::Integer(i as i64)).collect()
    }

    #[test]
    fn arity_is_enforced_for_every_operator() {
        for op in Operator::ALL {
            for count in 0..4 {
                let result = Criteria::new("Name", op, values(count));
                let expected_ok = match op.arity() {
                    Arity::Exactly(n) => count == n,
                    Arity::AtLeast(n) => count >= n,
                };
                assert_eq!(
                    result.is_ok(),
                    expected_ok,
                    "{} with {count} values",
                    op.as_str()
                );
                if !expected_ok {
                    assert!(matches!(result, Err(QueryError::InvalidCriteria(_))));
                }
            }
        }
    }

    #[test]
    fn between_with_one_value_is_rejected() {
        let err = Criteria::new("DateInvoiced", Operator::Between, values(1)).unwrap_err();
        assert!(err.to_string().contains("exactly 2"), "{err}");
    }

    #[test]
    fn in_with_no_values_is_rejected() {
        assert!(Criteria::new("C_BPartner_ID", Operator::In, Vec::new()).is_err());
    }

    #[test]
    fn empty_column_name_is_rejected() {
        assert!(Criteria::equal("  ", 1).is_err());
    }

    #[test]
    fn operator_wire_names() {
        let json = serde_json::to_string(&Operator::GreaterEqual).unwrap();
        assert_eq!(json, "\"GREATER_EQUAL\"");
        let parsed: Operator = serde_json::from_str("\"NOT_NULL\"").unwrap();
        assert_eq!(parsed, Operator::NotNull);
        for op in Operator::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn oversized_value_lists_are_rejected() {
        assert!(Criteria::is_in("C_BPartner_ID", 0..MAX_VALUES as i64).is_ok());
        let err = Criteria::is_in("C_BPartner_ID", 0..=MAX_VALUES as i64).unwrap_err();
        assert!(matches!(err, QueryError::InvalidCriteria(ref m) if m.contains("at most")));
    }

    #[test]
    fn deserialization_validates_arity() {
        let ok: Criteria = serde_json::from_str(
            r#"{"column_name": "Name", "operator": "LIKE", "values": ["acme"]}"#,
        )
        .unwrap();
        assert_eq!(ok.values(), &[ScalarValue::Text("acme".to_string())]);

        let bad = serde_json::from_str::<Criteria>(
            r#"{"column_name": "Name", "operator": "BETWEEN", "values": [1]}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn null_operator_defaults_to_no_values() {
        let c: Criteria =
            serde_json::from_str(r#"{"column_name": "Description", "operator": "NULL"}"#).unwrap();
        assert_eq!(c.operator(), Operator::Null);
        assert!(c.values().is_empty());
    }

    #[test]
    fn scalar_values_keep_their_wire_type() {
        let parsed: Vec<ScalarValue> = serde_json::from_str(r#"[true, 7, 2.5, "x"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                ScalarValue::Boolean(true),
                ScalarValue::Integer(7),
                ScalarValue::Decimal(2.5),
                ScalarValue::Text("x".to_string()),
            ]
        );
    }
}
