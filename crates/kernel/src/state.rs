//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::query::{
    AccessPolicy, EntityQueryService, PgExecutor, PgSchemaCatalog, QueryExecutor,
    RecordAccessPolicy, SchemaCatalog,
};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// List query service.
    entities: EntityQueryService,
}

impl AppState {
    /// Create application state, connecting to PostgreSQL.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        info!(
            max_connections = config.database_max_connections,
            "database pool created"
        );
        Ok(Self::with_pool(db, config))
    }

    /// Create application state over an existing pool, wiring the
    /// dictionary catalog, record-access policy and pooled executor.
    pub fn with_pool(db: PgPool, config: &Config) -> Self {
        let catalog: Arc<dyn SchemaCatalog> =
            Arc::new(PgSchemaCatalog::new(db.clone(), config.schema_cache_ttl));
        let policy: Arc<dyn AccessPolicy> = Arc::new(RecordAccessPolicy);
        let executor: Arc<dyn QueryExecutor> =
            Arc::new(PgExecutor::new(db.clone(), config.statement_timeout));
        let entities = EntityQueryService::new(catalog, policy, executor, config.paging());
        Self::from_parts(db, entities)
    }

    /// Assemble state from prebuilt parts (tests swap in fixtures here).
    pub fn from_parts(db: PgPool, entities: EntityQueryService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { db, entities }),
        }
    }

    /// Get the database pool.
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    /// Get the list query service.
    pub fn entities(&self) -> &EntityQueryService {
        &self.inner.entities
    }

    /// Check if PostgreSQL is healthy.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }
}
