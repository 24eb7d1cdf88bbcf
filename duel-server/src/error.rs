use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use duel_core::types::Addr;
use duel_core::Error;

use crate::state::AppState;

/// Wraps the transport-agnostic [`duel_core::Error`] with the HTTP status
/// code mapping from the wire error table (§7): one status per error
/// family, plus a `{error}` JSON body carrying the human-readable message.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError(Error::Invariant(e.to_string()))
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::Permission(_)
        | Error::NotAPlayer
        | Error::SpectatorForbidden
        | Error::TooManyConnections => StatusCode::FORBIDDEN,
        Error::UserNotFound(_)
        | Error::MatchNotFound(_)
        | Error::PositionNotFound(_)
        | Error::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyClosing | Error::DuplicateDepositSignature | Error::AlreadyQueued => {
            StatusCode::CONFLICT
        }
        Error::InsufficientBalance
        | Error::PriceStale
        | Error::MatchNotActive
        | Error::RateLimitExceeded
        | Error::MessageTooLarge
        | Error::UnknownEventType(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::TransientExternal(_) => StatusCode::BAD_GATEWAY,
        Error::Recoverable(_) | Error::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// An authenticated caller's address, extracted from the `Authorization:
/// Bearer <token>` header and verified via `duel_core::auth` (§4.10's
/// "verify token signature, extract player address", reused here for the
/// HTTP surface rather than only the WS handshake).
pub struct AuthUser(pub Addr);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError(Error::Auth("missing authorization header".into())))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError(Error::Auth("expected a bearer token".into())))?;
        let address = duel_core::auth::verify_token(token, state.config.auth.token_secret.as_bytes())?;
        Ok(AuthUser(address))
    }
}
