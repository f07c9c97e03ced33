use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use skyfare_core::BookingError;

/// HTTP projection of the domain error taxonomy. User-correctable conditions
/// keep their message; system faults are logged and masked.
#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    BadRequest(String),
    Forbidden(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Booking(err) => match err {
                BookingError::SeatUnavailable { .. } => (StatusCode::CONFLICT, err.to_string()),
                BookingError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
                BookingError::OwnershipViolation { .. } => (StatusCode::FORBIDDEN, err.to_string()),
                BookingError::OtpExpiredOrInvalid => (StatusCode::BAD_REQUEST, err.to_string()),
                BookingError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
                BookingError::SagaStepFailed { .. }
                | BookingError::CompensationFailed { .. }
                | BookingError::Store(_) => {
                    tracing::error!("Internal Server Error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
