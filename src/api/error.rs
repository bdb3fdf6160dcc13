use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::domain::order::{ErrorKind, OrderError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Order(OrderError::InvalidRequest(message.into()))
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Order(e) => e.kind().as_str(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::InvalidStatusTransition
        | ErrorKind::InsufficientStock
        | ErrorKind::ProductUnavailable
        | ErrorKind::AlreadyPaid
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::MixedFarmerOrder => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidPayment => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Order(e) => status_for(e.kind()),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Responding with internal error");
            "internal error".to_string()
        } else {
            tracing::debug!(error = %self, code = self.code(), "Responding with error");
            self.to_string()
        };

        HttpResponse::build(status).json(json!({
            "error": self.code(),
            "message": message,
        }))
    }
}
