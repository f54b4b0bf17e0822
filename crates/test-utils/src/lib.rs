//! ERP gateway test utilities.
//!
//! Helpers for integration testing: schema fixtures, an in-memory query
//! executor that records every statement, access-context builders, and
//! assertion utilities.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sea_query::Value;

use erpgate_kernel::query::{
    AccessContext, AccessPolicy, ColumnType, EntityQueryService, PagingConfig, QueryError,
    QueryExecutor, QueryResult, RecordAccessPolicy, Row, StaticCatalog, Statement, TableSchema,
};

/// `C_BPartner` with the usual scoping columns and a few business columns.
pub fn bpartner_schema() -> TableSchema {
    TableSchema::new(
        "C_BPartner",
        Some("C_BPartner_ID".to_string()),
        columns(&[
            ("C_BPartner_ID", ColumnType::Integer),
            ("AD_Client_ID", ColumnType::Integer),
            ("AD_Org_ID", ColumnType::Integer),
            ("IsActive", ColumnType::YesNo),
            ("Created", ColumnType::DateTime),
            ("Value", ColumnType::Text),
            ("Name", ColumnType::Text),
            ("IsCustomer", ColumnType::YesNo),
            ("SO_CreditLimit", ColumnType::Number),
            ("FirstSale", ColumnType::Date),
        ]),
    )
    .unwrap_or_else(|e| panic!("invalid fixture schema: {e}"))
}

/// `C_Invoice` fixture.
pub fn invoice_schema() -> TableSchema {
    TableSchema::new(
        "C_Invoice",
        Some("C_Invoice_ID".to_string()),
        columns(&[
            ("C_Invoice_ID", ColumnType::Integer),
            ("AD_Client_ID", ColumnType::Integer),
            ("AD_Org_ID", ColumnType::Integer),
            ("DocumentNo", ColumnType::Text),
            ("C_BPartner_ID", ColumnType::Integer),
            ("DateInvoiced", ColumnType::Date),
            ("GrandTotal", ColumnType::Number),
            ("IsPaid", ColumnType::YesNo),
        ]),
    )
    .unwrap_or_else(|e| panic!("invalid fixture schema: {e}"))
}

/// Dictionary table without client/org scoping columns.
pub fn reference_schema() -> TableSchema {
    TableSchema::new(
        "AD_Reference",
        Some("AD_Reference_ID".to_string()),
        columns(&[
            ("AD_Reference_ID", ColumnType::Integer),
            ("Name", ColumnType::Text),
        ]),
    )
    .unwrap_or_else(|e| panic!("invalid fixture schema: {e}"))
}

fn columns(defs: &[(&str, ColumnType)]) -> Vec<erpgate_kernel::query::ColumnSchema> {
    defs.iter()
        .map(|(name, column_type)| erpgate_kernel::query::ColumnSchema {
            column_name: name.to_string(),
            column_type: *column_type,
        })
        .collect()
}

/// Catalog holding every fixture table.
pub fn test_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_table(bpartner_schema())
        .with_table(invoice_schema())
        .with_table(reference_schema())
}

/// `n` business-partner rows with ids starting at 1000.
pub fn bpartner_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            let id = 1000 + i as i64;
            Row::new()
                .with("C_BPartner_ID", id)
                .with("AD_Client_ID", 11)
                .with("AD_Org_ID", 11)
                .with("Value", format!("BP{id}"))
                .with("Name", format!("Partner {id}"))
        })
        .collect()
}

/// Service over the fixture catalog, the record-access policy, and
/// `executor`.
pub fn test_service(executor: Arc<MockExecutor>) -> EntityQueryService {
    test_service_with(executor, Arc::new(RecordAccessPolicy), PagingConfig::default())
}

/// Service with an explicit policy and paging configuration.
pub fn test_service_with(
    executor: Arc<MockExecutor>,
    policy: Arc<dyn AccessPolicy>,
    paging: PagingConfig,
) -> EntityQueryService {
    EntityQueryService::new(Arc::new(test_catalog()), policy, executor, paging)
}

/// Executor that serves rows from memory and records every statement.
///
/// Data statements honour the trailing `LIMIT`/`OFFSET` bind values, so a
/// sequence of page requests walks the configured rows.
#[derive(Debug, Default)]
pub struct MockExecutor {
    rows: Vec<Row>,
    count: Option<u64>,
    fail: bool,
    counts: Mutex<Vec<Statement>>,
    pages: Mutex<Vec<Statement>>,
}

impl MockExecutor {
    /// Executor whose table holds `rows`.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Report `count` from COUNT statements regardless of the rows held.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Executor whose every statement fails like a dropped connection.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// COUNT statements received so far.
    pub fn count_statements(&self) -> Vec<Statement> {
        self.counts.lock().clone()
    }

    /// Data statements received so far.
    pub fn page_statements(&self) -> Vec<Statement> {
        self.pages.lock().clone()
    }

    fn check(&self) -> QueryResult<()> {
        if self.fail {
            Err(QueryError::QueryExecution(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(&self, statement: &Statement) -> QueryResult<Vec<Row>> {
        self.pages.lock().push(statement.clone());
        self.check()?;

        let (limit, offset) = limit_offset(statement);
        Ok(self
            .rows
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn execute_count(&self, statement: &Statement) -> QueryResult<u64> {
        self.counts.lock().push(statement.clone());
        self.check()?;
        Ok(self.count.unwrap_or(self.rows.len() as u64))
    }
}

/// LIMIT and OFFSET are the last two values of a page statement.
fn limit_offset(statement: &Statement) -> (usize, usize) {
    let values = &statement.values.0;
    let as_usize = |v: Option<&Value>| match v {
        Some(Value::BigUnsigned(Some(n))) => *n as usize,
        Some(Value::BigInt(Some(n))) => *n as usize,
        _ => 0,
    };
    let n = values.len();
    if n < 2 {
        return (usize::MAX, 0);
    }
    (as_usize(values.get(n - 2)), as_usize(values.get(n - 1)))
}

/// Build an access context for tests.
pub fn test_access() -> TestAccess {
    TestAccess {
        session_id: "test-session".to_string(),
        role_id: 102,
        client_id: 11,
        organization_ids: vec![0, 11],
    }
}

/// Access context builder.
#[derive(Debug, Clone)]
pub struct TestAccess {
    pub session_id: String,
    pub role_id: i64,
    pub client_id: i64,
    pub organization_ids: Vec<i64>,
}

impl TestAccess {
    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    pub fn role(mut self, role_id: i64) -> Self {
        self.role_id = role_id;
        self
    }

    pub fn client(mut self, client_id: i64) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn organizations(mut self, organization_ids: &[i64]) -> Self {
        self.organization_ids = organization_ids.to_vec();
        self
    }

    /// A role with no organization access.
    pub fn without_organizations(mut self) -> Self {
        self.organization_ids.clear();
        self
    }

    pub fn build(self) -> AccessContext {
        AccessContext::new(
            self.session_id,
            self.role_id,
            self.client_id,
            self.organization_ids,
        )
    }
}

/// Assertion helpers for generated SQL and JSON.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that the number of `$n` placeholders equals `expected`.
    pub fn placeholder_count(sql: &str, expected: usize) {
        let mut highest = 0;
        for (i, _) in sql.match_indices('$') {
            let digits: String = sql[i + 1..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(n) = digits.parse::<usize>() {
                highest = highest.max(n);
            }
        }
        assert_eq!(
            highest, expected,
            "Expected {expected} placeholder(s) in: {sql}"
        );
    }
}
