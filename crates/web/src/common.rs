use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use transit::RequestError;

pub type ApiResult<O> = Result<O, ApiError>;

/// Client-facing error: a status code and a short, stable message. Raw
/// storage errors never reach the response body.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status_code: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "could not validate credentials")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<RequestError> for ApiError {
    fn from(value: RequestError) -> Self {
        match value {
            RequestError::NotFound => Self::not_found("resource not found"),
            RequestError::Conflict(message) => {
                Self::new(StatusCode::CONFLICT, message)
            }
            RequestError::Precondition(message) => Self::bad_request(message),
            RequestError::NoNearbyStop => Self::not_found("no nearby stop"),
            RequestError::NoPath => Self::not_found("unreachable"),
            RequestError::Other(why) => {
                log::error!("request failed: {why}");
                Self::internal()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status_code,
            Json(ErrorBody {
                detail: self.message,
            }),
        )
            .into_response()
    }
}
