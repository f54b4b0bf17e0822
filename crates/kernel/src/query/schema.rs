//! Table metadata used to resolve and type filter columns.
//!
//! The catalog is the allow-list for every identifier that reaches SQL:
//! table names, column names and key columns are always taken from a
//! [`TableSchema`], never from the request.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::criteria::ScalarValue;
use super::error::{QueryError, QueryResult};
use super::predicate::SqlValue;

/// Regex for valid SQL identifiers (table/column names and aliases).
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static VALID_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex literal"));

/// Check whether `name` is safe to splice into SQL as an identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= 63 && VALID_IDENTIFIER.is_match(name)
}

/// Declared storage type of a column, as far as filtering cares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Character data (names, codes, list values, memos).
    Text,
    /// Whole numbers and record IDs.
    Integer,
    /// Amounts, quantities, prices.
    Number,
    /// `'Y'`/`'N'` flag stored as a single character.
    YesNo,
    /// Date without a meaningful time part.
    Date,
    /// Timestamp.
    DateTime,
}

impl ColumnType {
    /// Whether LIKE/NOT LIKE can be applied to the column.
    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::YesNo)
    }

    /// Coerce an untyped filter value into a bind parameter for this type.
    pub fn coerce(self, column: &str, value: &ScalarValue) -> QueryResult<SqlValue> {
        match self {
            ColumnType::Text => Ok(SqlValue::Text(value.to_string())),
            ColumnType::Integer => coerce_integer(column, value).map(SqlValue::Integer),
            ColumnType::Number => coerce_number(column, value).map(SqlValue::Decimal),
            ColumnType::YesNo => coerce_yes_no(column, value).map(|flag| {
                SqlValue::Text(if flag { "Y" } else { "N" }.to_string())
            }),
            ColumnType::DateTime => coerce_timestamp(column, value).map(SqlValue::Timestamp),
            ColumnType::Date => {
                let ts = coerce_timestamp(column, value)?;
                ts.date()
                    .and_hms_opt(0, 0, 0)
                    .map(SqlValue::Timestamp)
                    .ok_or_else(|| QueryError::coercion(column, "date out of range"))
            }
        }
    }
}

fn coerce_integer(column: &str, value: &ScalarValue) -> QueryResult<i64> {
    match value {
        ScalarValue::Integer(i) => Ok(*i),
        ScalarValue::Decimal(d) if d.is_finite() && d.fract() == 0.0 => {
            // i64::MAX as f64 rounds up to 2^63, which does not fit.
            if *d >= i64::MIN as f64 && *d < i64::MAX as f64 {
                Ok(*d as i64)
            } else {
                Err(QueryError::coercion(column, format!("{d} is out of range")))
            }
        }
        ScalarValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| QueryError::coercion(column, format!("'{s}' is not an integer"))),
        other => Err(QueryError::coercion(
            column,
            format!("{other} is not an integer"),
        )),
    }
}

fn coerce_number(column: &str, value: &ScalarValue) -> QueryResult<f64> {
    let number = match value {
        ScalarValue::Integer(i) => *i as f64,
        ScalarValue::Decimal(d) => *d,
        ScalarValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| QueryError::coercion(column, format!("'{s}' is not a number")))?,
        ScalarValue::Boolean(b) => {
            return Err(QueryError::coercion(column, format!("{b} is not a number")));
        }
    };
    if number.is_finite() {
        Ok(number)
    } else {
        Err(QueryError::coercion(column, "number must be finite"))
    }
}

fn coerce_yes_no(column: &str, value: &ScalarValue) -> QueryResult<bool> {
    match value {
        ScalarValue::Boolean(b) => Ok(*b),
        ScalarValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" => Ok(true),
            "n" | "no" | "false" => Ok(false),
            _ => Err(QueryError::coercion(column, format!("'{s}' is not Y/N"))),
        },
        other => Err(QueryError::coercion(column, format!("{other} is not Y/N"))),
    }
}

/// Accepted text layouts for timestamps, tried in order after RFC 3339.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

fn coerce_timestamp(column: &str, value: &ScalarValue) -> QueryResult<NaiveDateTime> {
    match value {
        // Epoch milliseconds.
        ScalarValue::Integer(ms) => DateTime::<Utc>::from_timestamp_millis(*ms)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| QueryError::coercion(column, format!("{ms} is out of range"))),
        ScalarValue::Text(s) => parse_timestamp(s.trim())
            .ok_or_else(|| QueryError::coercion(column, format!("'{s}' is not a date"))),
        other => Err(QueryError::coercion(column, format!("{other} is not a date"))),
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One column known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Canonical column name as declared in the dictionary.
    pub column_name: String,
    pub column_type: ColumnType,
}

/// Metadata for one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table_name: String,
    key_column: Option<String>,
    columns: Vec<ColumnSchema>,
    /// Lowercased column name -> index into `columns`.
    index: HashMap<String, usize>,
}

impl TableSchema {
    /// Build a table schema. Columns whose names are not valid identifiers
    /// are dropped.
    pub fn new(
        table_name: impl Into<String>,
        key_column: Option<String>,
        columns: Vec<ColumnSchema>,
    ) -> QueryResult<Self> {
        let table_name = table_name.into();
        if !is_valid_identifier(&table_name) {
            return Err(QueryError::InvalidIdentifier(table_name));
        }

        let mut kept = Vec::with_capacity(columns.len());
        let mut index = HashMap::with_capacity(columns.len());
        for column in columns {
            if !is_valid_identifier(&column.column_name) {
                warn!(
                    table = %table_name,
                    column = %column.column_name,
                    "ignoring column with invalid identifier"
                );
                continue;
            }
            let key = column.column_name.to_ascii_lowercase();
            if index.contains_key(&key) {
                continue;
            }
            index.insert(key, kept.len());
            kept.push(column);
        }

        let key_column = key_column.and_then(|key| {
            index
                .get(&key.to_ascii_lowercase())
                .map(|&i| kept[i].column_name.clone())
        });

        Ok(Self {
            table_name,
            key_column,
            columns: kept,
            index,
        })
    }

    /// Start a schema definition in code.
    pub fn builder(table_name: &str) -> TableSchemaBuilder {
        TableSchemaBuilder {
            table_name: table_name.to_string(),
            key_column: None,
            columns: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Single key column, when the table has one.
    pub fn key_column(&self) -> Option<&str> {
        self.key_column.as_deref()
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Resolve a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.columns[i])
    }

    /// Declared type of a column.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.column_type)
    }
}

/// Builder returned by [`TableSchema::builder`].
#[derive(Debug, Clone)]
pub struct TableSchemaBuilder {
    table_name: String,
    key_column: Option<String>,
    columns: Vec<ColumnSchema>,
}

impl TableSchemaBuilder {
    /// Declare the key column (also added as an integer column).
    pub fn key(mut self, column: &str) -> Self {
        self.key_column = Some(column.to_string());
        self.column(column, ColumnType::Integer)
    }

    pub fn column(mut self, column: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSchema {
            column_name: column.to_string(),
            column_type,
        });
        self
    }

    /// Add the client/organization scoping columns every ERP record carries.
    pub fn with_standard_columns(self) -> Self {
        self.column("AD_Client_ID", ColumnType::Integer)
            .column("AD_Org_ID", ColumnType::Integer)
            .column("IsActive", ColumnType::YesNo)
            .column("Created", ColumnType::DateTime)
            .column("Updated", ColumnType::DateTime)
    }

    pub fn build(self) -> QueryResult<TableSchema> {
        TableSchema::new(self.table_name, self.key_column, self.columns)
    }
}

/// Source of table metadata.
///
/// The ERP data dictionary is the production implementation; fixtures and
/// tests use [`StaticCatalog`].
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Look up a table by name (case-insensitive).
    ///
    /// Returns `None` if the table is unknown.
    async fn table(&self, table_name: &str) -> QueryResult<Option<Arc<TableSchema>>>;

    /// Declared type of one column, `None` if the table or column is unknown.
    async fn column_type(
        &self,
        table_name: &str,
        column_name: &str,
    ) -> QueryResult<Option<ColumnType>> {
        Ok(self
            .table(table_name)
            .await?
            .and_then(|t| t.column_type(column_name)))
    }
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, replacing any previous definition with the same name.
    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.insert(schema);
        self
    }

    pub fn insert(&mut self, schema: TableSchema) {
        self.tables
            .insert(schema.table_name().to_ascii_lowercase(), Arc::new(schema));
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[async_trait]
impl SchemaCatalog for StaticCatalog {
    async fn table(&self, table_name: &str) -> QueryResult<Option<Arc<TableSchema>>> {
        Ok(self.tables.get(&table_name.to_ascii_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner() -> TableSchema {
        TableSchema::builder("C_BPartner")
            .key("C_BPartner_ID")
            .with_standard_columns()
            .column("Name", ColumnType::Text)
            .column("IsCustomer", ColumnType::YesNo)
            .build()
            .unwrap()
    }

    #[test]
    fn columns_resolve_case_insensitively() {
        let schema = partner();
        let column = schema.column("name").unwrap();
        assert_eq!(column.column_name, "Name");
        assert_eq!(schema.column_type("c_bpartner_id"), Some(ColumnType::Integer));
        assert!(schema.column("Missing").is_none());
        assert_eq!(schema.key_column(), Some("C_BPartner_ID"));
    }

    #[test]
    fn invalid_identifiers_are_dropped() {
        let schema = TableSchema::new(
            "C_BPartner",
            None,
            vec![
                ColumnSchema {
                    column_name: "Name".to_string(),
                    column_type: ColumnType::Text,
                },
                ColumnSchema {
                    column_name: "Name; DROP TABLE x".to_string(),
                    column_type: ColumnType::Text,
                },
            ],
        )
        .unwrap();
        assert_eq!(schema.columns().len(), 1);

        assert!(TableSchema::new("bad table", None, Vec::new()).is_err());
    }

    #[test]
    fn identifier_check() {
        assert!(is_valid_identifier("C_Invoice"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("a.b"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn integer_coercion() {
        let t = ColumnType::Integer;
        assert_eq!(
            t.coerce("Qty", &ScalarValue::Text(" 42 ".to_string())).unwrap(),
            SqlValue::Integer(42)
        );
        assert_eq!(
            t.coerce("Qty", &ScalarValue::Decimal(3.0)).unwrap(),
            SqlValue::Integer(3)
        );
        assert!(t.coerce("Qty", &ScalarValue::Decimal(3.5)).is_err());
        let err = t
            .coerce("Qty", &ScalarValue::Decimal(9_223_372_036_854_775_808.0))
            .unwrap_err();
        assert!(matches!(err, QueryError::TypeCoercion { .. }));
        assert_eq!(
            t.coerce("Qty", &ScalarValue::Decimal(i64::MIN as f64)).unwrap(),
            SqlValue::Integer(i64::MIN)
        );
        let err = t.coerce("Qty", &ScalarValue::Text("abc".to_string())).unwrap_err();
        assert!(matches!(err, QueryError::TypeCoercion { .. }));
        assert!(t.coerce("Qty", &ScalarValue::Boolean(true)).is_err());
    }

    #[test]
    fn number_coercion() {
        let t = ColumnType::Number;
        assert_eq!(
            t.coerce("GrandTotal", &ScalarValue::Integer(10)).unwrap(),
            SqlValue::Decimal(10.0)
        );
        assert_eq!(
            t.coerce("GrandTotal", &ScalarValue::Text("12.5".to_string()))
                .unwrap(),
            SqlValue::Decimal(12.5)
        );
        assert!(
            t.coerce("GrandTotal", &ScalarValue::Text("NaN".to_string()))
                .is_err()
        );
    }

    #[test]
    fn yes_no_coercion() {
        let t = ColumnType::YesNo;
        assert_eq!(
            t.coerce("IsSOTrx", &ScalarValue::Boolean(true)).unwrap(),
            SqlValue::Text("Y".to_string())
        );
        assert_eq!(
            t.coerce("IsSOTrx", &ScalarValue::Text("n".to_string())).unwrap(),
            SqlValue::Text("N".to_string())
        );
        assert!(t.coerce("IsSOTrx", &ScalarValue::Integer(1)).is_err());
    }

    #[test]
    fn timestamp_coercion() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let t = ColumnType::DateTime;
        for text in [
            "2024-03-15 10:30:00",
            "2024-03-15T10:30:00",
            "2024-03-15T10:30:00Z",
        ] {
            assert_eq!(
                t.coerce("Updated", &ScalarValue::Text(text.to_string()))
                    .unwrap(),
                SqlValue::Timestamp(expected),
                "{text}"
            );
        }
        let millis = expected.and_utc().timestamp_millis();
        assert_eq!(
            t.coerce("Updated", &ScalarValue::Integer(millis)).unwrap(),
            SqlValue::Timestamp(expected)
        );
        assert!(
            t.coerce("Updated", &ScalarValue::Text("yesterday".to_string()))
                .is_err()
        );
    }

    #[test]
    fn date_coercion_truncates_time() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            ColumnType::Date
                .coerce(
                    "DateInvoiced",
                    &ScalarValue::Text("2024-03-15 18:45:00".to_string())
                )
                .unwrap(),
            SqlValue::Timestamp(midnight)
        );
    }

    #[tokio::test]
    async fn static_catalog_lookup() {
        let catalog = StaticCatalog::new().with_table(partner());
        assert!(catalog.table("c_bpartner").await.unwrap().is_some());
        assert!(catalog.table("C_Order").await.unwrap().is_none());
        assert_eq!(
            catalog.column_type("C_BPartner", "IsCustomer").await.unwrap(),
            Some(ColumnType::YesNo)
        );
        assert_eq!(
            catalog.column_type("C_BPartner", "Nope").await.unwrap(),
            None
        );
    }
}
