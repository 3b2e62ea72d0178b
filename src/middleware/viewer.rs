use axum::{
    extract::{Query, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::{error::PayError, models::UserId, services::Caller};

pub const USER_HEADER: &str = "X-User-Id";
pub const TOKEN_HEADER: &str = "X-Access-Token";

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Resolves who is calling and stores it as a [`Caller`] extension.
///
/// The session user comes from `X-User-Id`. External receivers present their
/// access token in `X-Access-Token` or as `?token=`. Neither is required here;
/// handlers decide what they need.
pub async fn identify_caller(mut request: Request, next: Next) -> Result<Response, PayError> {
    let viewer = parse_viewer(request.headers())?;

    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(request.uri())
                .ok()
                .and_then(|Query(q)| q.token)
        })
        .filter(|t| !t.is_empty());

    if let Some(id) = viewer {
        tracing::debug!("Caller identified as user {}", id);
    }

    request.extensions_mut().insert(Caller { viewer, token });
    Ok(next.run(request).await)
}

fn parse_viewer(headers: &HeaderMap) -> Result<Option<UserId>, PayError> {
    let Some(raw) = headers.get(USER_HEADER) else {
        return Ok(None);
    };

    let id = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<UserId>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| PayError::forbidden("malformed X-User-Id header"))?;

    Ok(Some(id))
}
