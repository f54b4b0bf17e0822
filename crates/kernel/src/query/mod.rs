//! Paginated, dynamically filtered list queries over ERP tables.
//!
//! A list call flows through:
//! 1. [`FilterCompiler`]: client [`Criteria`] → parameterized WHERE fragment
//! 2. [`AccessAugmenter`]: client, organization and record-access scoping
//! 3. [`StatementBuilder`]: COUNT and page SELECT statements
//! 4. [`Paginator`]: page size, page tokens, record count
//! 5. [`RecordProjector`]: rows → output records
//!
//! [`EntityQueryService`] wires the steps together behind `list_entities`.

pub mod access;
pub mod compiler;
pub mod criteria;
pub mod dictionary;
pub mod error;
pub mod executor;
pub mod pagination;
pub mod predicate;
pub mod projector;
pub mod schema;
pub mod service;
pub mod statement;

pub use access::{AccessAugmenter, AccessContext, AccessPolicy, RecordAccessPolicy, Unrestricted};
pub use compiler::FilterCompiler;
pub use criteria::{Criteria, Operator, ScalarValue};
pub use dictionary::PgSchemaCatalog;
pub use error::{QueryError, QueryResult};
pub use executor::{PgExecutor, QueryExecutor};
pub use pagination::{PageRequest, PageToken, PageWindow, Pagination, Paginator, PagingConfig};
pub use predicate::{CompiledPredicate, Predicate, SqlValue};
pub use projector::{JsonProjector, RecordProjector, Row, RowProjector};
pub use schema::{ColumnSchema, ColumnType, SchemaCatalog, StaticCatalog, TableSchema};
pub use service::{EntityQueryService, ListRequest, PageResult};
pub use statement::{SortDirection, SortSpec, Statement, StatementBuilder};
