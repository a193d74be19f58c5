pub mod route;
pub mod trip;
pub mod booking;
pub mod repository;
pub mod identity;
pub mod payment;

use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub use booking::{Booking, BookingKind, BookingStatus, BookingType, Leg};
pub use route::Route;
pub use trip::{StatusFilter, Trip, TripStatus};

/// Errors surfaced by the route, trip and booking stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Insufficient seats on trip {trip_id}: requested {requested}, available {available}")]
    InsufficientSeats {
        trip_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Booking {booking_id} is {status} and cannot transition to {requested}")]
    InvalidState {
        booking_id: Uuid,
        status: BookingStatus,
        requested: BookingStatus,
    },

    /// Only the first row of a linked pair reached the store.
    #[error("Linked pair partially written: {written} stored, partner missing ({reason})")]
    PartialWrite { written: Uuid, reason: String },

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Store call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Run a store call with an upper bound on its duration.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Store call timed out after {:?}", limit);
            Err(StoreError::Timeout(limit))
        }
    }
}
