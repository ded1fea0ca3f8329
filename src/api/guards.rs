use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderName};

use crate::api::errors::ApiError;
use crate::core::state::AppState;

/// Set by the authenticating gateway in front of this service.
pub(crate) const TEACHER_HEADER: HeaderName = HeaderName::from_static("x-teacher-id");

/// Caller identity, trusted as forwarded by the upstream authentication layer.
#[derive(Debug, Clone)]
pub(crate) struct CurrentTeacher(pub(crate) String);

#[async_trait]
impl FromRequestParts<AppState> for CurrentTeacher {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&TEACHER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentTeacher(value.to_string()))
            .ok_or(ApiError::Unauthorized("Missing teacher identity"))
    }
}
