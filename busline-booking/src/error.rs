use uuid::Uuid;
use busline_catalog::PricingError;
use busline_core::{BookingStatus, Leg, StoreError};

/// Every failure the booking engine reports to its caller.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid booking request: {0}")]
    Validation(String),

    #[error("No return route exists for {origin}→{destination}")]
    NoReversedRoute { origin: String, destination: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient seats on trip {trip_id}: requested {requested}, available {available}")]
    InsufficientSeats {
        trip_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Failed to persist booking: {0}")]
    Persistence(String),

    /// One leg of a round trip was written without its partner.
    #[error("Round trip incomplete: booking {written} has no linked leg ({reason}); rolled back: {compensated}")]
    IncompleteLink {
        written: Uuid,
        reason: String,
        compensated: bool,
    },

    #[error("Booking {booking_id} is {status}; operation not allowed")]
    InvalidState {
        booking_id: Uuid,
        status: BookingStatus,
    },

    /// The first leg is cancelled; `pending_booking_id` is still active and can be retried alone.
    #[error("Booking {cancelled_booking_id} cancelled but linked {pending_leg} leg {pending_booking_id} is still active: {reason}")]
    PartialCancellation {
        cancelled_booking_id: Uuid,
        pending_booking_id: Uuid,
        pending_leg: Leg,
        reason: String,
    },

    #[error("Remote store failure: {0}")]
    RemoteFailure(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => BookingError::NotFound(what),
            StoreError::InsufficientSeats { trip_id, requested, available } => {
                BookingError::InsufficientSeats { trip_id, requested, available }
            }
            StoreError::InvalidState { booking_id, status, .. } => {
                BookingError::InvalidState { booking_id, status }
            }
            StoreError::PartialWrite { written, reason } => BookingError::IncompleteLink {
                written,
                reason,
                compensated: false,
            },
            StoreError::Timeout(limit) => {
                BookingError::RemoteFailure(format!("store call timed out after {:?}", limit))
            }
            StoreError::Unavailable(msg) => BookingError::RemoteFailure(msg),
            StoreError::Conflict(msg) | StoreError::Backend(msg) => BookingError::Persistence(msg),
        }
    }
}

impl From<PricingError> for BookingError {
    fn from(err: PricingError) -> Self {
        BookingError::Validation(err.to_string())
    }
}
