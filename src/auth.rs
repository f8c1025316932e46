use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity forwarded by the session layer in front of this service.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| CurrentUser(id.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}
