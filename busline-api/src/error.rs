use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;
use busline_booking::BookingError;
use busline_core::identity::IdentityError;
use busline_core::Leg;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// One leg of a linked pair was cancelled and the other is still active.
    PartialFailure {
        message: String,
        cancelled_booking_id: Uuid,
        pending_booking_id: Uuid,
        pending_leg: Leg,
    },
    UnavailableError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::PartialFailure { message, cancelled_booking_id, pending_booking_id, pending_leg } => {
                tracing::warn!("Partial cancellation: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "error": message,
                        "cancelled_booking_id": cancelled_booking_id,
                        "pending_booking_id": pending_booking_id,
                        "pending_leg": pending_leg,
                    }),
                )
            }
            AppError::UnavailableError(msg) => {
                tracing::warn!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "Booking store unavailable, try again" }))
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Validation(_) | BookingError::NoReversedRoute { .. } => AppError::ValidationError(message),
            BookingError::NotFound(_) => AppError::NotFoundError(message),
            BookingError::InsufficientSeats { .. } | BookingError::InvalidState { .. } => {
                AppError::ConflictError(message)
            }
            BookingError::PartialCancellation { cancelled_booking_id, pending_booking_id, pending_leg, .. } => {
                AppError::PartialFailure { message, cancelled_booking_id, pending_booking_id, pending_leg }
            }
            BookingError::RemoteFailure(_) => AppError::UnavailableError(message),
            BookingError::Persistence(_) | BookingError::IncompleteLink { .. } => {
                AppError::InternalServerError(message)
            }
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        AppError::AuthenticationError(err.to_string())
    }
}
