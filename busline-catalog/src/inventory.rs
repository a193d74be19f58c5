use std::sync::Arc;
use std::time::Duration;
use chrono::NaiveDate;
use tracing::debug;
use busline_core::repository::TripRepository;
use busline_core::{with_deadline, Route, StatusFilter, StoreResult, Trip, TripStatus};

/// Outbound search shows every trip that has not been cancelled.
pub const OUTBOUND_FILTER: StatusFilter = StatusFilter::NotCancelled;

/// Return search only shows trips still in `scheduled`, which is narrower
/// than `OUTBOUND_FILTER`.
pub const RETURN_FILTER: StatusFilter = StatusFilter::Only(TripStatus::Scheduled);

/// Candidate trips for a route and date.
#[derive(Clone)]
pub struct TripAvailability {
    repo: Arc<dyn TripRepository>,
    timeout: Duration,
}

impl TripAvailability {
    pub fn new(repo: Arc<dyn TripRepository>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    pub async fn outbound_candidates(&self, route: &Route, date: NaiveDate) -> StoreResult<Vec<Trip>> {
        with_deadline(self.timeout, self.repo.find_trips(route.id, date, OUTBOUND_FILTER)).await
    }

    pub async fn return_candidates(&self, route: &Route, date: NaiveDate) -> StoreResult<Vec<Trip>> {
        let trips = with_deadline(self.timeout, self.repo.find_trips(route.id, date, RETURN_FILTER)).await?;
        debug!("{} return trip(s) on {} for {}", trips.len(), route.label(), date);
        Ok(trips)
    }
}
