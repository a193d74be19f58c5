use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use busline_core::repository::BookingRepository;
use busline_core::{with_deadline, Booking, BookingStatus, Leg, StoreError};
use crate::error::{BookingError, BookingResult};

/// What happened to the partner leg of a round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkedLegOutcome {
    Cancelled { booking: Booking },
    AlreadyCancelled { booking_id: Uuid },
    /// Travelled already; terminal, left as is.
    Completed { booking_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub linked: Option<LinkedLegOutcome>,
}

/// Cancels bookings and cascades to the linked leg of a round trip.
///
/// The two legs are cancelled by two separate store writes. If the second
/// fails, the caller gets `BookingError::PartialCancellation` naming the leg
/// still active; calling `cancel` on that leg again is safe.
pub struct CancellationCoordinator {
    bookings: Arc<dyn BookingRepository>,
    timeout: Duration,
}

impl CancellationCoordinator {
    pub fn new(bookings: Arc<dyn BookingRepository>, timeout: Duration) -> Self {
        Self { bookings, timeout }
    }

    pub async fn cancel(&self, booking_id: Uuid, reason: Option<String>) -> BookingResult<CancellationOutcome> {
        let booking = with_deadline(self.timeout, self.bookings.get(booking_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if booking.status.is_terminal() {
            return Err(BookingError::InvalidState {
                booking_id,
                status: booking.status,
            });
        }

        let now = Utc::now();
        let cancelled = self.cancel_row(booking_id, reason, now).await?;
        info!("Booking {} cancelled", cancelled.booking_number);

        let (linked_id, cancelled_leg) = match (cancelled.linked_booking_id(), cancelled.kind.leg()) {
            (Some(id), Some(leg)) => (id, leg),
            _ => return Ok(CancellationOutcome { booking: cancelled, linked: None }),
        };

        let linked = self
            .cancel_linked(&cancelled, linked_id, cancelled_leg, now)
            .await
            .map_err(|reason| {
                warn!(
                    "Booking {} cancelled but linked {} leg {} is still active: {}",
                    cancelled.booking_number,
                    cancelled_leg.other(),
                    linked_id,
                    reason
                );
                BookingError::PartialCancellation {
                    cancelled_booking_id: cancelled.id,
                    pending_booking_id: linked_id,
                    pending_leg: cancelled_leg.other(),
                    reason,
                }
            })?;

        Ok(CancellationOutcome { booking: cancelled, linked: Some(linked) })
    }

    async fn cancel_row(&self, id: Uuid, reason: Option<String>, at: DateTime<Utc>) -> Result<Booking, StoreError> {
        with_deadline(
            self.timeout,
            self.bookings.update_status(id, BookingStatus::Cancelled, reason, Some(at)),
        )
        .await
    }

    /// Errors come back as a description for the partial-cancellation report.
    async fn cancel_linked(
        &self,
        cancelled: &Booking,
        linked_id: Uuid,
        cancelled_leg: Leg,
        at: DateTime<Utc>,
    ) -> Result<LinkedLegOutcome, String> {
        let linked = with_deadline(self.timeout, self.bookings.get(linked_id))
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("linked booking {} not found", linked_id))?;

        match linked.status {
            BookingStatus::Cancelled => return Ok(LinkedLegOutcome::AlreadyCancelled { booking_id: linked_id }),
            BookingStatus::Completed => return Ok(LinkedLegOutcome::Completed { booking_id: linked_id }),
            BookingStatus::Pending | BookingStatus::Confirmed => {}
        }

        let reason = format!(
            "cancelled with linked {} booking {}",
            cancelled_leg, cancelled.booking_number
        );

        match self.cancel_row(linked_id, Some(reason), at).await {
            Ok(booking) => {
                info!("Linked booking {} cancelled", booking.booking_number);
                Ok(LinkedLegOutcome::Cancelled { booking })
            }
            // Lost a race with another writer that already moved it to a terminal state
            Err(StoreError::InvalidState { status: BookingStatus::Cancelled, .. }) => {
                Ok(LinkedLegOutcome::AlreadyCancelled { booking_id: linked_id })
            }
            Err(StoreError::InvalidState { status: BookingStatus::Completed, .. }) => {
                Ok(LinkedLegOutcome::Completed { booking_id: linked_id })
            }
            Err(e) => Err(e.to_string()),
        }
    }
}
