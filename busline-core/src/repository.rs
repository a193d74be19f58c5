use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::route::Route;
use crate::trip::{StatusFilter, Trip};
use crate::StoreResult;

/// Read-only access to route records
#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn get_routes(&self) -> StoreResult<Vec<Route>>;

    async fn find_route(&self, origin: &str, destination: &str) -> StoreResult<Option<Route>>;
}

/// Trip lookup. Status and seat counts are mutated by dispatch, outside this engine.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn find_trips(
        &self,
        route_id: Uuid,
        date: NaiveDate,
        status_filter: StatusFilter,
    ) -> StoreResult<Vec<Trip>>;
}

/// Persistence for booking rows.
///
/// Inserts decrement `available_seats` on the booked trip in the same write and
/// fail with `StoreError::InsufficientSeats` without writing anything when the
/// trip cannot seat the party.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> StoreResult<Booking>;

    /// Both rows are committed or neither is.
    async fn insert_linked_pair(
        &self,
        outbound: &Booking,
        inbound: &Booking,
    ) -> StoreResult<(Booking, Booking)>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_by_number(&self, booking_number: &str) -> StoreResult<Option<Booking>>;

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>>;

    /// Conditional status write. Fails with `StoreError::InvalidState` when the
    /// stored row cannot make the transition; cancelling returns the leg's seats.
    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Booking>;
}
