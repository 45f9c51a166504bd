use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Request-level errors, mapped onto HTTP statuses. Generation failures are
/// not here: the LLM is the only component allowed to fail inside a 200
/// response with `success=false`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded. Maximum {max_requests} requests per {window_secs} seconds.")]
    RateLimited {
        max_requests: usize,
        window_secs: u64,
    },

    #[error("System under heavy load. Please try again later.")]
    Overloaded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "detail": self.to_string()
        }))
    }
}
