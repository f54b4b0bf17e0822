//! Schema catalog read from the ERP data dictionary (`AD_Table` /
//! `AD_Column`), with an in-process TTL cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use sqlx::PgPool;
use tracing::{debug, warn};

use super::error::QueryResult;
use super::schema::{ColumnSchema, ColumnType, SchemaCatalog, TableSchema};

/// Maximum number of cached table definitions.
const CACHE_MAX_CAPACITY: u64 = 2_000;

const COLUMNS_SQL: &str = "SELECT t.TableName::text, c.ColumnName::text, \
     c.AD_Reference_ID::int4, c.IsKey::text \
     FROM AD_Table t \
     INNER JOIN AD_Column c ON (c.AD_Table_ID = t.AD_Table_ID) \
     WHERE UPPER(t.TableName) = UPPER($1) \
     AND t.IsActive = 'Y' AND c.IsActive = 'Y' AND c.ColumnSQL IS NULL \
     ORDER BY c.SeqNo, c.AD_Column_ID";

/// Column type for a dictionary display reference, or `None` for columns
/// that cannot be filtered (binary data).
pub fn column_type_for_reference(reference_id: i32) -> Option<ColumnType> {
    let column_type = match reference_id {
        // ID, Integer, Table/TableDir, List-of-IDs, Search, Location, Locator,
        // Account, Assignment, Product Attribute, Resource Assignment
        11 | 13 | 18 | 19 | 21 | 25 | 30 | 31 | 32 | 33 | 35 => ColumnType::Integer,
        // Amount, Number, Costs+Prices, Quantity
        12 | 22 | 29 | 37 => ColumnType::Number,
        15 => ColumnType::Date,
        16 | 24 => ColumnType::DateTime,
        20 => ColumnType::YesNo,
        23 => return None,
        _ => ColumnType::Text,
    };
    Some(column_type)
}

/// One `AD_Column` row: table name, column name, reference, key flag.
pub type DictionaryRow = (String, String, i32, String);

/// Assemble a table schema from dictionary rows.
///
/// The key column is only set when exactly one column is flagged as key.
pub fn schema_from_rows(rows: Vec<DictionaryRow>) -> QueryResult<Option<TableSchema>> {
    let Some(table_name) = rows.first().map(|(t, _, _, _)| t.clone()) else {
        return Ok(None);
    };

    let mut keys = Vec::new();
    let mut columns = Vec::with_capacity(rows.len());
    for (_, column_name, reference_id, is_key) in rows {
        let Some(column_type) = column_type_for_reference(reference_id) else {
            continue;
        };
        if is_key == "Y" {
            keys.push(column_name.clone());
        }
        columns.push(ColumnSchema {
            column_name,
            column_type,
        });
    }

    let key_column = if keys.len() == 1 { keys.pop() } else { None };
    TableSchema::new(table_name, key_column, columns).map(Some)
}

/// Catalog backed by PostgreSQL.
#[derive(Clone)]
pub struct PgSchemaCatalog {
    pool: PgPool,
    cache: Cache<String, Option<Arc<TableSchema>>>,
}

impl PgSchemaCatalog {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_MAX_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { pool, cache }
    }

    /// Drop one cached table definition.
    pub async fn invalidate(&self, table_name: &str) {
        self.cache.invalidate(&table_name.to_ascii_lowercase()).await;
    }

    async fn load(&self, table_name: &str) -> QueryResult<Option<Arc<TableSchema>>> {
        let rows: Vec<DictionaryRow> = sqlx::query_as(COLUMNS_SQL)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;
        let schema = match schema_from_rows(rows) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(table = %table_name, error = %e, "unusable dictionary entry");
                None
            }
        };
        debug!(
            table = %table_name,
            found = schema.is_some(),
            "loaded table definition"
        );
        Ok(schema.map(Arc::new))
    }
}

#[async_trait]
impl SchemaCatalog for PgSchemaCatalog {
    async fn table(&self, table_name: &str) -> QueryResult<Option<Arc<TableSchema>>> {
        let key = table_name.to_ascii_lowercase();
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }
        let schema = self.load(table_name).await?;
        self.cache.insert(key, schema.clone()).await;
        Ok(schema)
    }
}
