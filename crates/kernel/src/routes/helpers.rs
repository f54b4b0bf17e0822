//! Shared route helpers.
//!
//! The access headers are trusted as given: nothing here authenticates the
//! caller. The service must only be reachable through the session gateway,
//! which strips any client-supplied `X-Session-Id`, `X-Role-Id`,
//! `X-Client-Id` and `X-Organization-Ids` and sets them from the
//! authenticated session.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::query::AccessContext;

pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const ROLE_ID_HEADER: &str = "x-role-id";
pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const ORGANIZATION_IDS_HEADER: &str = "x-organization-ids";

/// Caller identity taken from the access headers set by the session layer.
///
/// Rejects with 401 when a header is missing or malformed. An empty
/// organization list is accepted; such callers simply see no rows.
#[derive(Debug, Clone)]
pub struct Caller(pub AccessContext);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        access_context_from_headers(&parts.headers).map(Caller)
    }
}

/// Parse the access headers into an [`AccessContext`].
pub fn access_context_from_headers(headers: &HeaderMap) -> Result<AccessContext, AppError> {
    let session_id = header(headers, SESSION_ID_HEADER)?;
    if session_id.is_empty() {
        return Err(AppError::Unauthorized(format!(
            "{SESSION_ID_HEADER} must not be empty"
        )));
    }
    let role_id = parse_id(header(headers, ROLE_ID_HEADER)?, ROLE_ID_HEADER)?;
    let client_id = parse_id(header(headers, CLIENT_ID_HEADER)?, CLIENT_ID_HEADER)?;
    let organization_ids = header(headers, ORGANIZATION_IDS_HEADER)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_id(s, ORGANIZATION_IDS_HEADER))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AccessContext::new(
        session_id,
        role_id,
        client_id,
        organization_ids,
    ))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    let value = headers
        .get(name)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))?;
    value
        .to_str()
        .map(str::trim)
        .map_err(|_| AppError::Unauthorized(format!("{name} is not valid text")))
}

fn parse_id(raw: &str, name: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::Unauthorized(format!("{name} must hold integer ids")))
}
