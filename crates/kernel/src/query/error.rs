//! Error taxonomy for the list query layer.

use thiserror::Error;

/// Errors raised while compiling or executing a list query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A filter condition is malformed (empty column, wrong value count).
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    /// A filter value cannot be coerced to the target column's type.
    #[error("cannot coerce value for column {column}: {reason}")]
    TypeCoercion { column: String, reason: String },

    /// A table alias or identifier fails the identifier allow-list.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The requested table is not known to the schema catalog.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The caller's role has no visibility on the requested rows.
    #[error("access denied for role {role_id}")]
    AccessDenied { role_id: i64 },

    /// The database or driver failed while running a statement.
    #[error("query execution failed: {0}")]
    QueryExecution(#[from] sqlx::Error),

    /// A statement could not be bound (unsupported parameter type).
    #[error("statement binding failed: {0}")]
    Binding(String),
}

impl QueryError {
    pub(crate) fn coercion(column: &str, reason: impl Into<String>) -> Self {
        QueryError::TypeCoercion {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the client's request (as opposed to
    /// the database or the server).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidCriteria(_)
                | QueryError::TypeCoercion { .. }
                | QueryError::InvalidIdentifier(_)
                | QueryError::UnknownTable(_)
        )
    }
}

/// Result type alias for the query layer.
pub type QueryResult<T> = Result<T, QueryError>;
