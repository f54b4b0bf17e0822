//! Result rows and their projection into output records.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

use super::error::{QueryError, QueryResult};

/// One result row: the projected columns in SELECT order.
///
/// NULL columns are kept as `None` rather than omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Option<JsonValue>)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Builder style, used by fixtures and executors.
    pub fn with(mut self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.push(column, Some(value.into()));
        self
    }

    /// Append a NULL column.
    pub fn with_null(mut self, column: &str) -> Self {
        self.push(column, None);
        self
    }

    pub fn push(&mut self, column: &str, value: Option<JsonValue>) {
        let value = value.filter(|v| !v.is_null());
        self.cells.push((column.to_string(), value));
    }

    /// Build a row from a JSON object, taking `columns` in order.
    ///
    /// Keys are matched exactly first and then ignoring ASCII case; a
    /// missing key becomes NULL.
    pub fn from_json(columns: &[String], object: JsonValue) -> QueryResult<Self> {
        let JsonValue::Object(mut map) = object else {
            return Err(QueryError::Binding(format!(
                "expected a JSON object row, got {object}"
            )));
        };
        let mut row = Row {
            cells: Vec::with_capacity(columns.len()),
        };
        for column in columns {
            let value = match map.remove(column.as_str()) {
                Some(v) => Some(v),
                None => {
                    let found = map
                        .keys()
                        .find(|k| k.eq_ignore_ascii_case(column))
                        .cloned();
                    found.and_then(|k| map.remove(&k))
                }
            };
            row.push(column, value);
        }
        Ok(row)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    /// Whether the row has `column` at all (NULL or not).
    pub fn contains(&self, column: &str) -> bool {
        self.cell(column).is_some()
    }

    /// Value of `column`, `None` when NULL or absent.
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.cell(column).and_then(|(_, v)| v.as_ref())
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(JsonValue::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| match v {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|v| match v {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    /// `Y`/`N` flag columns as booleans.
    pub fn get_flag(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::String(s) if s == "Y" => Some(true),
            JsonValue::String(s) if s == "N" => Some(false),
            _ => None,
        }
    }

    fn cell(&self, column: &str) -> Option<&(String, Option<JsonValue>)> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .or_else(|| self.cells.iter().find(|(c, _)| c.eq_ignore_ascii_case(column)))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Maps a [`Row`] into an entity-specific record.
///
/// Each business area supplies its own projector.
pub trait RecordProjector: Send + Sync {
    type Record: Send;

    fn project(&self, row: &Row) -> QueryResult<Self::Record>;
}

/// Passes rows through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowProjector;

impl RecordProjector for RowProjector {
    type Record = Row;

    fn project(&self, row: &Row) -> QueryResult<Row> {
        Ok(row.clone())
    }
}

/// Projects rows into JSON objects keyed by column name, in column order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProjector;

impl RecordProjector for JsonProjector {
    type Record = JsonValue;

    fn project(&self, row: &Row) -> QueryResult<JsonValue> {
        serde_json::to_value(row).map_err(|e| QueryError::Binding(e.to_string()))
    }
}
