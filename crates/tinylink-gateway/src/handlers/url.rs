use crate::auth::UserId;
use crate::error::Result;
use crate::model::{
    BatchShortenItem, BatchShortenResult, ShortenRequest, ShortenResponse, UserUrl,
};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use tinylink_core::ShortId;
use tinylink_shortener::ShortenerError;

/// `POST /` with the URL as plain text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Extension(UserId(owner)): Extension<UserId>,
    body: String,
) -> Result<Response> {
    match state.shortener().shorten(&owner, &body).await {
        Ok(id) => Ok((StatusCode::CREATED, state.short_url(&id)).into_response()),
        Err(ShortenerError::Conflict(id)) => {
            Ok((StatusCode::CONFLICT, state.short_url(&id)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Extension(UserId(owner)): Extension<UserId>,
    Json(request): Json<ShortenRequest>,
) -> Result<Response> {
    let (status, id) = match state.shortener().shorten(&owner, &request.url).await {
        Ok(id) => (StatusCode::CREATED, id),
        Err(ShortenerError::Conflict(id)) => (StatusCode::CONFLICT, id),
        Err(err) => return Err(err.into()),
    };

    let body = ShortenResponse {
        result: state.short_url(&id),
    };
    Ok((status, Json(body)).into_response())
}

pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Extension(UserId(owner)): Extension<UserId>,
    Json(items): Json<Vec<BatchShortenItem>>,
) -> Result<(StatusCode, Json<Vec<BatchShortenResult>>)> {
    let items = items
        .into_iter()
        .map(|item| (item.correlation_id, item.original_url))
        .collect();

    let results = state
        .shortener()
        .shorten_batch(&owner, items)
        .await?
        .into_iter()
        .map(|(correlation_id, id)| BatchShortenResult {
            short_url: state.short_url(&id),
            correlation_id,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(results)))
}

pub async fn redirect_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let original_url = state.shortener().expand(&ShortId::new(id)).await?;
    Ok(Redirect::temporary(&location(&original_url)))
}

/// Percent-encodes ASCII control characters, which a `Location` header
/// cannot carry. Everything else is passed through as stored.
fn location(original_url: &str) -> String {
    let mut encoded = String::with_capacity(original_url.len());
    for c in original_url.chars() {
        if c.is_ascii_control() {
            encoded.push_str(&format!("%{:02X}", c as u8));
        } else {
            encoded.push(c);
        }
    }
    encoded
}

pub async fn user_urls_handler(
    State(state): State<AppState>,
    Extension(UserId(owner)): Extension<UserId>,
) -> Result<Response> {
    let records = state.shortener().user_urls(&owner).await?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let urls: Vec<UserUrl> = records
        .into_iter()
        .map(|record| UserUrl {
            short_url: state.short_url(&record.id),
            original_url: record.original_url,
        })
        .collect();
    Ok(Json(urls).into_response())
}

/// Schedules deletion and answers 202 right away.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    Extension(UserId(owner)): Extension<UserId>,
    Json(ids): Json<Vec<String>>,
) -> Result<StatusCode> {
    let ids = ids.into_iter().map(ShortId::new).collect();
    state.shortener().delete_urls(&owner, ids)?;
    Ok(StatusCode::ACCEPTED)
}
