//! Generic entity list API.
//!
//! `POST /api/entities/{table}/list` runs a filtered, paginated list over
//! any table known to the data dictionary, scoped to the caller's access.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::query::{Criteria, ListRequest, PageRequest, PageResult, Row, SortSpec};
use crate::routes::helpers::Caller;
use crate::state::AppState;

/// Create the entity router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/entities/{table}/list", post(list_entities))
}

/// Request body for a list call. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListEntitiesBody {
    pub criteria: Vec<Criteria>,
    pub page_size: i64,
    pub page_token: String,
    pub sort: Vec<SortSpec>,
    pub columns: Vec<String>,
    pub table_alias: Option<String>,
}

impl ListEntitiesBody {
    fn into_request(self, table_name: String) -> ListRequest {
        ListRequest {
            table_name,
            criteria: self.criteria,
            page: PageRequest::new(self.page_size, self.page_token),
            sort: self.sort,
            columns: self.columns,
            table_alias: self.table_alias,
        }
    }
}

/// Records are serialized straight from [`Row`], so each object's keys
/// follow the SELECT column order.
async fn list_entities(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Caller(access): Caller,
    body: Result<Json<ListEntitiesBody>, JsonRejection>,
) -> AppResult<Json<PageResult<Row>>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request = body.into_request(table);

    let page = state.entities().list_entities(&request, &access).await?;

    Ok(Json(page))
}
