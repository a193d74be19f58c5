use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use busline_core::repository::{BookingRepository, RouteRepository, TripRepository};
use busline_core::{
    Booking, BookingStatus, Route, StatusFilter, StoreError, StoreResult, Trip, TripStatus,
};

#[derive(Default)]
struct MemoryState {
    routes: Vec<Route>,
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
}

impl MemoryState {
    fn check_seats(&self, trip_id: Uuid, requested: u32) -> StoreResult<()> {
        let trip = self
            .trips
            .get(&trip_id)
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", trip_id)))?;

        if trip.available_seats < requested {
            return Err(StoreError::InsufficientSeats {
                trip_id,
                requested,
                available: trip.available_seats,
            });
        }
        Ok(())
    }

    fn check_unique(&self, booking: &Booking) -> StoreResult<()> {
        if self.bookings.contains_key(&booking.id) {
            return Err(StoreError::Conflict(format!("booking id {}", booking.id)));
        }
        if self.bookings.values().any(|b| b.booking_number == booking.booking_number) {
            return Err(StoreError::Conflict(format!("booking number {}", booking.booking_number)));
        }
        Ok(())
    }

    fn adjust_seats(&mut self, trip_id: Uuid, delta: i64) {
        if let Some(trip) = self.trips.get_mut(&trip_id) {
            trip.available_seats = (trip.available_seats as i64 + delta).max(0) as u32;
        }
    }
}

/// Process-local store implementing every repository contract.
///
/// All mutations happen under one lock, which gives the same
/// all-or-nothing guarantees the Postgres store gets from transactions.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    pub fn add_route(&self, route: Route) -> StoreResult<()> {
        self.lock()?.routes.push(route);
        Ok(())
    }

    pub fn add_trip(&self, trip: Trip) -> StoreResult<()> {
        self.lock()?.trips.insert(trip.id, trip);
        Ok(())
    }

    pub fn trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self.lock()?.trips.get(&id).cloned())
    }

    /// Dispatch-side status change for a trip.
    pub fn set_trip_status(&self, id: Uuid, status: TripStatus) -> StoreResult<()> {
        let mut state = self.lock()?;
        let trip = state
            .trips
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", id)))?;
        trip.status = status;
        Ok(())
    }

    pub fn booking_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.bookings.len())
    }

    /// Build a store from a `{"routes": [...], "trips": [...]}` document.
    pub fn from_seed(json: &str) -> StoreResult<Self> {
        let seed: Seed = serde_json::from_str(json)
            .map_err(|e| StoreError::Backend(format!("invalid seed document: {}", e)))?;

        let store = Self::new();
        {
            let mut state = store.lock()?;
            state.routes = seed.routes;
            state.trips = seed.trips.into_iter().map(|t| (t.id, t)).collect();
        }
        Ok(store)
    }
}

#[derive(Deserialize)]
struct Seed {
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    trips: Vec<Trip>,
}

#[async_trait]
impl RouteRepository for InMemoryStore {
    async fn get_routes(&self) -> StoreResult<Vec<Route>> {
        Ok(self.lock()?.routes.clone())
    }

    async fn find_route(&self, origin: &str, destination: &str) -> StoreResult<Option<Route>> {
        let state = self.lock()?;
        let mut matches: Vec<&Route> = state
            .routes
            .iter()
            .filter(|r| r.origin == origin && r.destination == destination)
            .collect();
        matches.sort_by_key(|r| !r.active);
        Ok(matches.first().map(|r| (*r).clone()))
    }
}

#[async_trait]
impl TripRepository for InMemoryStore {
    async fn find_trips(
        &self,
        route_id: Uuid,
        date: NaiveDate,
        status_filter: StatusFilter,
    ) -> StoreResult<Vec<Trip>> {
        let state = self.lock()?;
        let mut trips: Vec<Trip> = state
            .trips
            .values()
            .filter(|t| t.route_id == route_id && t.trip_date == date && status_filter.matches(t.status))
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.departure_time);
        Ok(trips)
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert(&self, booking: &Booking) -> StoreResult<Booking> {
        let mut state = self.lock()?;
        state.check_unique(booking)?;
        state.check_seats(booking.trip_id, booking.passenger_count)?;

        state.adjust_seats(booking.trip_id, -(booking.passenger_count as i64));
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn insert_linked_pair(
        &self,
        outbound: &Booking,
        inbound: &Booking,
    ) -> StoreResult<(Booking, Booking)> {
        let mut state = self.lock()?;
        state.check_unique(outbound)?;
        state.check_unique(inbound)?;
        if outbound.booking_number == inbound.booking_number {
            return Err(StoreError::Conflict(format!("booking number {}", inbound.booking_number)));
        }

        if outbound.trip_id == inbound.trip_id {
            state.check_seats(outbound.trip_id, outbound.passenger_count + inbound.passenger_count)?;
        } else {
            state.check_seats(outbound.trip_id, outbound.passenger_count)?;
            state.check_seats(inbound.trip_id, inbound.passenger_count)?;
        }

        state.adjust_seats(outbound.trip_id, -(outbound.passenger_count as i64));
        state.adjust_seats(inbound.trip_id, -(inbound.passenger_count as i64));
        state.bookings.insert(outbound.id, outbound.clone());
        state.bookings.insert(inbound.id, inbound.clone());
        Ok((outbound.clone(), inbound.clone()))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    async fn find_by_number(&self, booking_number: &str) -> StoreResult<Option<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .find(|b| b.booking_number == booking_number)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let state = self.lock()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
        Ok(bookings)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Booking> {
        let mut state = self.lock()?;
        let booking = state
            .bookings
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?;

        if !booking.status.can_transition_to(status) {
            return Err(StoreError::InvalidState {
                booking_id: id,
                status: booking.status,
                requested: status,
            });
        }

        booking.status = status;
        if reason.is_some() {
            booking.cancellation_reason = reason;
        }
        if cancelled_at.is_some() {
            booking.cancelled_at = cancelled_at;
        }
        let updated = booking.clone();

        if status == BookingStatus::Cancelled {
            state.adjust_seats(updated.trip_id, updated.passenger_count as i64);
        }
        Ok(updated)
    }
}
