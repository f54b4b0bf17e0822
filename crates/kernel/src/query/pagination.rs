//! Page-size clamping, page tokens, and record counting.
//!
//! Page tokens have the form `{session_id}-{page_number}`. A token that is
//! missing, malformed, or minted for another session is not an error: the
//! request is served as page 1.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::QueryResult;
use super::executor::QueryExecutor;
use super::statement::Statement;

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default upper bound on records per page.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Page-size policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Used when the client asks for zero or a negative size.
    pub default_page_size: u32,
    /// Hard upper bound.
    pub max_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl PagingConfig {
    /// Effective page size for a client-requested size.
    pub fn page_size(&self, requested: i64) -> u32 {
        if requested <= 0 {
            return self.default_page_size.min(self.max_page_size);
        }
        if requested > i64::from(self.max_page_size) {
            warn!(
                requested,
                capped = self.max_page_size,
                "page_size exceeds maximum, capping"
            );
            return self.max_page_size;
        }
        // In range of u32 because it is <= max_page_size.
        requested as u32
    }
}

/// Client pagination input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub page_token: String,
}

impl PageRequest {
    pub fn new(page_size: i64, page_token: impl Into<String>) -> Self {
        Self {
            page_size,
            page_token: page_token.into(),
        }
    }
}

/// Encoding and decoding of session-bound page tokens.
pub struct PageToken;

impl PageToken {
    /// Token pointing at `page_number` for `session_id`.
    pub fn encode(session_id: &str, page_number: u32) -> String {
        format!("{session_id}-{page_number}")
    }

    /// Page number carried by `token`, or 1 when the token is empty,
    /// malformed, not positive, or from a different session.
    pub fn page_number(token: &str, session_id: &str) -> u32 {
        if token.is_empty() {
            return 1;
        }
        let page = token
            .strip_prefix(session_id)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|&n| n > 0);
        match page {
            Some(page) => page,
            None => {
                debug!("ignoring page token not issued for this session");
                1
            }
        }
    }
}

/// Whether records remain after the page at `offset` of size `limit`.
pub fn has_next_page(offset: u64, limit: u32, record_count: u64) -> bool {
    offset.saturating_add(u64::from(limit)) < record_count
}

/// Resolved page position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// 1-based page number.
    pub page_number: u32,
    pub limit: u32,
    pub offset: u64,
}

impl PageWindow {
    pub fn new(page_number: u32, limit: u32) -> Self {
        let page_number = page_number.max(1);
        Self {
            page_number,
            limit,
            offset: u64::from(page_number - 1) * u64::from(limit),
        }
    }

    /// Token for the following page, or empty when this is the last one.
    pub fn next_page_token(&self, record_count: u64, session_id: &str) -> String {
        if has_next_page(self.offset, self.limit, record_count) {
            PageToken::encode(session_id, self.page_number.saturating_add(1))
        } else {
            String::new()
        }
    }
}

/// Outcome of paginating one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub window: PageWindow,
    /// Total matching records, before paging.
    pub record_count: u64,
    /// Empty on the last page.
    pub next_page_token: String,
}

impl Pagination {
    pub fn limit(&self) -> u32 {
        self.window.limit
    }

    pub fn offset(&self) -> u64 {
        self.window.offset
    }

    /// Whether the requested page starts past the last record.
    pub fn is_past_end(&self) -> bool {
        self.window.offset >= self.record_count
    }
}

/// Computes page windows and runs the record count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Paginator {
    config: PagingConfig,
}

impl Paginator {
    pub fn new(config: PagingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PagingConfig {
        self.config
    }

    /// Page window for a request, without touching the database.
    pub fn window(&self, request: &PageRequest, session_id: &str) -> PageWindow {
        let limit = self.config.page_size(request.page_size);
        let page_number = PageToken::page_number(&request.page_token, session_id);
        PageWindow::new(page_number, limit)
    }

    /// Count matching records and resolve the page.
    ///
    /// The count runs once per call and is never cached.
    pub async fn paginate(
        &self,
        executor: &dyn QueryExecutor,
        count_statement: &Statement,
        request: &PageRequest,
        session_id: &str,
    ) -> QueryResult<Pagination> {
        let window = self.window(request, session_id);
        let record_count = executor.execute_count(count_statement).await?;
        let next_page_token = window.next_page_token(record_count, session_id);

        debug!(
            page = window.page_number,
            limit = window.limit,
            offset = window.offset,
            record_count,
            "resolved page"
        );

        Ok(Pagination {
            window,
            record_count,
            next_page_token,
        })
    }
}
