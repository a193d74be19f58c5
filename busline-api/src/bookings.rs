use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::Deserialize;
use uuid::Uuid;
use busline_booking::CancellationOutcome;
use busline_core::Booking;
use crate::auth::acting_user;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(my_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/number/{number}", get(get_booking_by_number))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

fn owned_by(booking: Booking, user: &str) -> Result<Booking, AppError> {
    if booking.user_id != user {
        return Err(AppError::NotFoundError(format!("Booking {} not found", booking.id)));
    }
    Ok(booking)
}

async fn my_bookings(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    Ok(Json(state.ledger.list_for_user(&user).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let booking = state.ledger.get(booking_id).await?;
    Ok(Json(owned_by(booking, &user)?))
}

async fn get_booking_by_number(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(number): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let booking = state.ledger.find_by_number(&number).await?;
    Ok(Json(owned_by(booking, &user)?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    owned_by(state.ledger.get(booking_id).await?, &user)?;

    let outcome = state.coordinator.cancel(booking_id, req.reason).await?;
    Ok(Json(outcome))
}
