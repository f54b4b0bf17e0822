//! Statement execution against PostgreSQL.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{Value, Values};
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool};
use tracing::debug;

use super::error::{QueryError, QueryResult};
use super::projector::Row;
use super::statement::Statement;

/// Runs parameterized statements.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a data statement and return its rows in order.
    async fn execute(&self, statement: &Statement) -> QueryResult<Vec<Row>>;

    /// Run a `COUNT(*)` statement.
    async fn execute_count(&self, statement: &Statement) -> QueryResult<u64>;
}

/// Executor backed by an sqlx PostgreSQL pool.
///
/// Each statement runs in its own short transaction so the statement
/// timeout can be set with `SET LOCAL`.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgExecutor {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    async fn begin(&self) -> QueryResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, statement: &Statement) -> QueryResult<Vec<Row>> {
        let arguments = bind_values(&statement.values)?;
        let sql = format!("SELECT row_to_json(t) FROM ({}) t", statement.sql);

        let mut tx = self.begin().await?;
        let objects: Vec<serde_json::Value> =
            sqlx::query_scalar_with(&sql, arguments)
                .fetch_all(&mut *tx)
                .await?;
        tx.commit().await?;

        debug!(rows = objects.len(), "executed data statement");
        objects
            .into_iter()
            .map(|object| Row::from_json(&statement.columns, object))
            .collect()
    }

    async fn execute_count(&self, statement: &Statement) -> QueryResult<u64> {
        let arguments = bind_values(&statement.values)?;

        let mut tx = self.begin().await?;
        let count: i64 = sqlx::query_scalar_with(&statement.sql, arguments)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// Convert sea-query values into sqlx arguments, in order.
pub fn bind_values(values: &Values) -> QueryResult<PgArguments> {
    let mut args = PgArguments::default();
    for value in &values.0 {
        let added = match value {
            Value::Bool(v) => args.add(*v),
            Value::TinyInt(v) => args.add(v.map(i16::from)),
            Value::SmallInt(v) => args.add(*v),
            Value::Int(v) => args.add(*v),
            Value::BigInt(v) => args.add(*v),
            Value::TinyUnsigned(v) => args.add(v.map(i16::from)),
            Value::SmallUnsigned(v) => args.add(v.map(i32::from)),
            Value::Unsigned(v) => args.add(v.map(i64::from)),
            Value::BigUnsigned(v) => {
                let v = v
                    .map(i64::try_from)
                    .transpose()
                    .map_err(|e| QueryError::Binding(e.to_string()))?;
                args.add(v)
            }
            Value::Float(v) => args.add(*v),
            Value::Double(v) => args.add(*v),
            Value::String(v) => args.add(v.as_deref().map(ToString::to_string)),
            Value::Char(v) => args.add(v.map(String::from)),
            Value::Bytes(v) => args.add(v.as_deref().map(|b| b.to_vec())),
            Value::ChronoDateTime(v) => args.add(v.as_deref().copied()),
            Value::Uuid(v) => args.add(v.as_deref().copied()),
            other => {
                return Err(QueryError::Binding(format!(
                    "unsupported parameter type: {other:?}"
                )));
            }
        };
        added.map_err(|e| QueryError::Binding(e.to_string()))?;
    }
    Ok(args)
}
