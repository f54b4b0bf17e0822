//! The list entry point: schema lookup, filter compilation, access
//! restriction, pagination and projection, in that order.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use super::access::{AccessAugmenter, AccessContext, AccessPolicy};
use super::compiler::FilterCompiler;
use super::criteria::Criteria;
use super::error::{QueryError, QueryResult};
use super::executor::QueryExecutor;
use super::pagination::{PageRequest, Paginator, PagingConfig};
use super::projector::{RecordProjector, Row, RowProjector};
use super::schema::{SchemaCatalog, is_valid_identifier};
use super::statement::{SortSpec, StatementBuilder};

/// Everything a caller specifies for one list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub table_name: String,
    pub criteria: Vec<Criteria>,
    pub page: PageRequest,
    pub sort: Vec<SortSpec>,
    /// Projection; empty selects every catalog column.
    pub columns: Vec<String>,
    /// Alias used to qualify columns; defaults to the table name.
    pub table_alias: Option<String>,
}

impl ListRequest {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    pub fn criteria(mut self, criteria: Vec<Criteria>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn page(mut self, page_size: i64, page_token: &str) -> Self {
        self.page = PageRequest::new(page_size, page_token);
        self
    }

    pub fn sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.table_alias = Some(alias.to_string());
        self
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult<T> {
    /// Total matching records across all pages.
    pub record_count: u64,
    /// Empty on the last page.
    pub next_page_token: String,
    pub records: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn empty() -> Self {
        Self {
            record_count: 0,
            next_page_token: String::new(),
            records: Vec::new(),
        }
    }
}

/// Paginated, access-restricted listing over any cataloged table.
#[derive(Clone)]
pub struct EntityQueryService {
    catalog: Arc<dyn SchemaCatalog>,
    policy: Arc<dyn AccessPolicy>,
    executor: Arc<dyn QueryExecutor>,
    paginator: Paginator,
}

impl EntityQueryService {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        policy: Arc<dyn AccessPolicy>,
        executor: Arc<dyn QueryExecutor>,
        paging: PagingConfig,
    ) -> Self {
        Self {
            catalog,
            policy,
            executor,
            paginator: Paginator::new(paging),
        }
    }

    pub fn paging(&self) -> PagingConfig {
        self.paginator.config()
    }

    /// List rows of `request.table_name` visible to `access`.
    pub async fn list_entities(
        &self,
        request: &ListRequest,
        access: &AccessContext,
    ) -> QueryResult<PageResult<Row>> {
        self.list_with(request, access, &RowProjector).await
    }

    /// Like [`list_entities`](Self::list_entities), projecting each row with
    /// `projector`.
    pub async fn list_with<P: RecordProjector>(
        &self,
        request: &ListRequest,
        access: &AccessContext,
        projector: &P,
    ) -> QueryResult<PageResult<P::Record>> {
        let table = self
            .catalog
            .table(&request.table_name)
            .await?
            .ok_or_else(|| QueryError::UnknownTable(request.table_name.clone()))?;

        let alias = request
            .table_alias
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(table.table_name());
        if !is_valid_identifier(alias) {
            return Err(QueryError::InvalidIdentifier(alias.to_string()));
        }

        let filter = FilterCompiler::new(&table, alias).compile(&request.criteria)?;
        let filter = match AccessAugmenter::new(self.policy.as_ref())
            .augment(filter, &table, alias, access, true)
        {
            Ok(filter) => filter,
            Err(QueryError::AccessDenied { role_id }) => {
                debug!(
                    table = table.table_name(),
                    role_id, "role has no organization access, returning empty page"
                );
                return Ok(PageResult::empty());
            }
            Err(e) => return Err(e),
        };

        let builder = StatementBuilder::new(&table, alias, &filter)?
            .columns(&request.columns)
            .sort(&request.sort);

        let pagination = self
            .paginator
            .paginate(
                self.executor.as_ref(),
                &builder.build_count(),
                &request.page,
                &access.session_id,
            )
            .await
            .inspect_err(|e| log_failure(table.table_name(), e))?;

        if pagination.is_past_end() {
            return Ok(PageResult {
                record_count: pagination.record_count,
                next_page_token: pagination.next_page_token,
                records: Vec::new(),
            });
        }

        let rows = self
            .executor
            .execute(&builder.build_page(pagination.limit(), pagination.offset()))
            .await
            .inspect_err(|e| log_failure(table.table_name(), e))?;

        let records = rows
            .iter()
            .map(|row| projector.project(row))
            .collect::<QueryResult<Vec<_>>>()?;

        debug!(
            table = table.table_name(),
            record_count = pagination.record_count,
            returned = records.len(),
            "listed entities"
        );

        Ok(PageResult {
            record_count: pagination.record_count,
            next_page_token: pagination.next_page_token,
            records,
        })
    }
}

fn log_failure(table: &str, e: &QueryError) {
    if !e.is_client_error() {
        error!(table = %table, error = %e, "list query failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_request_builder() {
        let request = ListRequest::new("C_BPartner")
            .page(10, "s-2")
            .columns(&["Name", "Value"])
            .alias("c");
        assert_eq!(request.page.page_size, 10);
        assert_eq!(request.page.page_token, "s-2");
        assert_eq!(request.columns, vec!["Name".to_string(), "Value".to_string()]);
        assert_eq!(request.table_alias.as_deref(), Some("c"));
    }

    #[test]
    fn empty_page_result() {
        let page: PageResult<Row> = PageResult::empty();
        assert_eq!(page.record_count, 0);
        assert!(page.next_page_token.is_empty());
        assert!(page.records.is_empty());
    }
}
