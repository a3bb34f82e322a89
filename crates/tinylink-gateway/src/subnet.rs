use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::IpAddr;

pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Lets the request through only when `X-Real-IP` lies inside the trusted
/// subnet. Without a configured subnet every request is refused.
pub async fn trusted_subnet(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let subnet = state
        .trusted_subnet()
        .ok_or_else(|| AppError::Forbidden("trusted subnet is not configured".to_string()))?;

    let ip = request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .ok_or_else(|| AppError::Forbidden("missing or malformed client ip".to_string()))?;

    if !subnet.contains(&ip) {
        return Err(AppError::Forbidden(format!(
            "ip {ip} is not from trusted subnet"
        )));
    }

    Ok(next.run(request).await)
}
