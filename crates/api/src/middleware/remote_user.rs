//! Caller identity extractor.
//!
//! Authentication happens in front of this service; the authenticating
//! proxy forwards the principal in the `X-Remote-User` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use feedrun_core::error::CoreError;

use crate::error::AppError;

/// Header carrying the authenticated principal.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";

/// The authenticated caller, used as the owner of created instances.
///
/// ```ignore
/// async fn my_handler(user: RemoteUser) -> AppResult<Json<()>> {
///     tracing::info!(owner = %user.username, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteUser {
    pub username: String,
}

impl<S> FromRequestParts<S> for RemoteUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(REMOTE_USER_HEADER).ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing X-Remote-User header".into(),
            ))
        })?;

        let username = value
            .to_str()
            .map_err(|_| AppError::BadRequest("X-Remote-User must be valid ASCII".into()))?
            .trim();

        if username.is_empty() {
            return Err(AppError::Core(CoreError::Unauthorized(
                "Empty X-Remote-User header".into(),
            )));
        }

        Ok(RemoteUser {
            username: username.to_string(),
        })
    }
}
