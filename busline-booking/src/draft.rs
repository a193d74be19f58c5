use std::sync::Arc;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use busline_catalog::{quote, FareBreakdown, RouteCatalog, TripAvailability};
use busline_core::payment::PaymentMethod;
use busline_core::{Route, Trip};
use crate::error::{BookingError, BookingResult};
use crate::ledger::{BookingLedger, ConfirmedDraft, LegSelection, Purchase};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    OneWay,
    RoundTrip,
}

/// Raw search input as entered; every field is checked by `DraftController::search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub route_id: Option<Uuid>,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub passenger_count: u32,
}

/// A validated search with its routes resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSearch {
    pub outbound_route: Route,
    pub return_route: Option<Route>,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passenger_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftStep {
    Search,
    SelectOutbound,
    SelectReturn,
    Confirm,
}

/// In-progress selections. Each step keeps what earlier steps collected so
/// `back` can return to them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum DraftState {
    Search,
    SelectOutbound {
        search: ResolvedSearch,
        outbound_candidates: Vec<Trip>,
    },
    SelectReturn {
        search: ResolvedSearch,
        outbound_candidates: Vec<Trip>,
        outbound: Trip,
        return_candidates: Vec<Trip>,
    },
    Confirm {
        search: ResolvedSearch,
        outbound_candidates: Vec<Trip>,
        outbound: Trip,
        return_candidates: Vec<Trip>,
        return_trip: Option<Trip>,
    },
}

impl DraftState {
    pub fn step(&self) -> DraftStep {
        match self {
            DraftState::Search => DraftStep::Search,
            DraftState::SelectOutbound { .. } => DraftStep::SelectOutbound,
            DraftState::SelectReturn { .. } => DraftStep::SelectReturn,
            DraftState::Confirm { .. } => DraftStep::Confirm,
        }
    }
}

fn wrong_step(expected: DraftStep, actual: DraftStep) -> BookingError {
    BookingError::Validation(format!("expected step {:?}, draft is at {:?}", expected, actual))
}

fn pick(candidates: &[Trip], trip_id: Uuid) -> BookingResult<Trip> {
    candidates
        .iter()
        .find(|t| t.id == trip_id)
        .cloned()
        .ok_or_else(|| BookingError::NotFound(format!("trip {} is not among the candidates", trip_id)))
}

/// Drives one passenger session from search to a committed purchase:
/// `Search → SelectOutbound → (SelectReturn) → Confirm`.
pub struct DraftController {
    routes: RouteCatalog,
    trips: TripAvailability,
    ledger: Arc<BookingLedger>,
    max_passengers: u32,
    state: DraftState,
}

impl DraftController {
    pub fn new(routes: RouteCatalog, trips: TripAvailability, ledger: Arc<BookingLedger>, max_passengers: u32) -> Self {
        Self {
            routes,
            trips,
            ledger,
            max_passengers,
            state: DraftState::Search,
        }
    }

    pub fn state(&self) -> &DraftState {
        &self.state
    }

    pub fn step(&self) -> DraftStep {
        self.state.step()
    }

    /// Drop everything collected so far.
    pub fn reset(&mut self) {
        self.state = DraftState::Search;
    }

    /// Validate the search and list outbound trips. Allowed from any step;
    /// a successful search discards earlier selections. With no matching trips
    /// the draft stays at `Search`.
    pub async fn search(&mut self, request: SearchRequest) -> BookingResult<Vec<Trip>> {
        let search = self.resolve(&request).await?;
        let candidates = self
            .trips
            .outbound_candidates(&search.outbound_route, search.departure_date)
            .await?;

        if candidates.is_empty() {
            info!(
                "No trips on {} for {}",
                search.outbound_route.label(),
                search.departure_date
            );
            self.state = DraftState::Search;
            return Ok(candidates);
        }

        debug!("{} outbound candidate(s) on {}", candidates.len(), search.outbound_route.label());
        self.state = DraftState::SelectOutbound {
            search,
            outbound_candidates: candidates.clone(),
        };
        Ok(candidates)
    }

    async fn resolve(&self, request: &SearchRequest) -> BookingResult<ResolvedSearch> {
        let route_id = request
            .route_id
            .ok_or_else(|| BookingError::Validation("select a route".into()))?;
        let departure_date = request
            .departure_date
            .ok_or_else(|| BookingError::Validation("select a departure date".into()))?;

        if request.passenger_count == 0 || request.passenger_count > self.max_passengers {
            return Err(BookingError::Validation(format!(
                "passenger count must be between 1 and {}",
                self.max_passengers
            )));
        }

        let outbound_route = self
            .routes
            .route(route_id)
            .await?
            .ok_or_else(|| BookingError::Validation(format!("unknown route {}", route_id)))?;
        if !outbound_route.active {
            return Err(BookingError::Validation(format!(
                "route {} is not open for booking",
                outbound_route.label()
            )));
        }

        let (return_route, return_date) = match request.trip_type {
            TripType::OneWay => (None, None),
            TripType::RoundTrip => {
                let return_date = request
                    .return_date
                    .ok_or_else(|| BookingError::Validation("select a return date".into()))?;
                if return_date < departure_date {
                    return Err(BookingError::Validation(
                        "return date cannot be before the departure date".into(),
                    ));
                }

                let reversed = self.routes.reversed(&outbound_route).await?.ok_or_else(|| {
                    BookingError::NoReversedRoute {
                        origin: outbound_route.origin.clone(),
                        destination: outbound_route.destination.clone(),
                    }
                })?;
                (Some(reversed), Some(return_date))
            }
        };

        // Unpriceable routes are rejected before any trips are listed
        quote(&outbound_route, return_route.as_ref(), request.passenger_count)?;

        Ok(ResolvedSearch {
            outbound_route,
            return_route,
            departure_date,
            return_date,
            passenger_count: request.passenger_count,
        })
    }

    /// Choose the outbound trip. One-way drafts move straight to `Confirm`;
    /// round trips list return trips and move to `SelectReturn`, or stay put
    /// when there are none.
    pub async fn select_outbound(&mut self, trip_id: Uuid) -> BookingResult<DraftStep> {
        let (search, outbound_candidates) = match &self.state {
            DraftState::SelectOutbound { search, outbound_candidates } => {
                (search.clone(), outbound_candidates.clone())
            }
            other => return Err(wrong_step(DraftStep::SelectOutbound, other.step())),
        };
        let outbound = pick(&outbound_candidates, trip_id)?;

        let (return_route, return_date) = match (&search.return_route, search.return_date) {
            (Some(route), Some(date)) => (route.clone(), date),
            _ => {
                self.state = DraftState::Confirm {
                    search,
                    outbound_candidates,
                    outbound,
                    return_candidates: Vec::new(),
                    return_trip: None,
                };
                return Ok(self.step());
            }
        };

        let return_candidates = self.trips.return_candidates(&return_route, return_date).await?;
        if return_candidates.is_empty() {
            info!("No return trips on {} for {}", return_route.label(), return_date);
            return Ok(self.step());
        }

        self.state = DraftState::SelectReturn {
            search,
            outbound_candidates,
            outbound,
            return_candidates,
        };
        Ok(self.step())
    }

    pub fn select_return(&mut self, trip_id: Uuid) -> BookingResult<DraftStep> {
        let state = std::mem::replace(&mut self.state, DraftState::Search);
        match state {
            DraftState::SelectReturn { search, outbound_candidates, outbound, return_candidates } => {
                match pick(&return_candidates, trip_id) {
                    Ok(return_trip) => {
                        self.state = DraftState::Confirm {
                            search,
                            outbound_candidates,
                            outbound,
                            return_candidates,
                            return_trip: Some(return_trip),
                        };
                        Ok(self.step())
                    }
                    Err(e) => {
                        self.state = DraftState::SelectReturn { search, outbound_candidates, outbound, return_candidates };
                        Err(e)
                    }
                }
            }
            other => {
                let step = other.step();
                self.state = other;
                Err(wrong_step(DraftStep::SelectReturn, step))
            }
        }
    }

    /// Step back one stage, discarding the selection made at the current one.
    pub fn back(&mut self) -> DraftStep {
        let state = std::mem::replace(&mut self.state, DraftState::Search);
        self.state = match state {
            DraftState::Search | DraftState::SelectOutbound { .. } => DraftState::Search,
            DraftState::SelectReturn { search, outbound_candidates, .. } => {
                DraftState::SelectOutbound { search, outbound_candidates }
            }
            DraftState::Confirm { search, outbound_candidates, outbound, return_candidates, return_trip } => {
                if return_trip.is_some() {
                    DraftState::SelectReturn { search, outbound_candidates, outbound, return_candidates }
                } else {
                    DraftState::SelectOutbound { search, outbound_candidates }
                }
            }
        };
        self.step()
    }

    /// Fares for the current selection, once at `Confirm`.
    pub fn fare_quote(&self) -> Option<FareBreakdown> {
        match &self.state {
            DraftState::Confirm { search, .. } => {
                quote(&search.outbound_route, search.return_route.as_ref(), search.passenger_count).ok()
            }
            _ => None,
        }
    }

    /// Price and persist the draft. On success the draft resets to `Search`;
    /// on failure it stays at `Confirm` so the caller can retry or go back.
    pub async fn confirm(&mut self, user_id: &str, payment_method: PaymentMethod) -> BookingResult<Purchase> {
        let draft = match &self.state {
            DraftState::Confirm { search, outbound, return_trip, .. } => ConfirmedDraft {
                user_id: user_id.to_string(),
                outbound: LegSelection {
                    route: search.outbound_route.clone(),
                    trip: outbound.clone(),
                },
                return_leg: match (&search.return_route, return_trip) {
                    (Some(route), Some(trip)) => Some(LegSelection {
                        route: route.clone(),
                        trip: trip.clone(),
                    }),
                    _ => None,
                },
                passenger_count: search.passenger_count,
                payment_method,
            },
            other => return Err(wrong_step(DraftStep::Confirm, other.step())),
        };

        let fare = quote(
            &draft.outbound.route,
            draft.return_leg.as_ref().map(|leg| &leg.route),
            draft.passenger_count,
        )?;

        let purchase = self.ledger.commit(&draft, &fare).await?;
        self.state = DraftState::Search;
        Ok(purchase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::BookingNumberGenerator;
    use busline_core::{BookingStatus, BookingType, TripStatus};
    use busline_store::InMemoryStore;
    use chrono::NaiveTime;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn trip(route: &Route, date: NaiveDate, status: TripStatus, seats: u32) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            route_id: route.id,
            bus_id: Uuid::new_v4(),
            trip_date: date,
            departure_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            arrival_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            status,
            available_seats: seats,
        }
    }

    struct World {
        store: Arc<InMemoryStore>,
        lagos_abuja: Route,
        abuja_lagos: Route,
        x_y: Route,
        out_trip: Trip,
        back_trip: Trip,
    }

    fn world() -> World {
        let store = Arc::new(InMemoryStore::new());
        let lagos_abuja = Route::new("Lagos", "Abuja", 25000);
        let abuja_lagos = Route::new("Abuja", "Lagos", 25000);
        let x_y = Route::new("CityX", "CityY", 9000);
        for r in [&lagos_abuja, &abuja_lagos, &x_y] {
            store.add_route(r.clone()).unwrap();
        }

        let out_trip = trip(&lagos_abuja, day(10), TripStatus::Scheduled, 40);
        let back_trip = trip(&abuja_lagos, day(14), TripStatus::Scheduled, 40);
        store.add_trip(out_trip.clone()).unwrap();
        store.add_trip(back_trip.clone()).unwrap();
        store.add_trip(trip(&x_y, day(10), TripStatus::Scheduled, 40)).unwrap();

        World { store, lagos_abuja, abuja_lagos, x_y, out_trip, back_trip }
    }

    fn controller(store: &Arc<InMemoryStore>) -> DraftController {
        let ledger = Arc::new(BookingLedger::new(store.clone(), BookingNumberGenerator::default(), TIMEOUT));
        DraftController::new(
            RouteCatalog::new(store.clone(), TIMEOUT),
            TripAvailability::new(store.clone(), TIMEOUT),
            ledger,
            10,
        )
    }

    fn one_way(route: &Route, date: NaiveDate, passengers: u32) -> SearchRequest {
        SearchRequest {
            route_id: Some(route.id),
            departure_date: Some(date),
            return_date: None,
            trip_type: TripType::OneWay,
            passenger_count: passengers,
        }
    }

    fn round_trip(route: &Route, out: NaiveDate, back: NaiveDate, passengers: u32) -> SearchRequest {
        SearchRequest {
            route_id: Some(route.id),
            departure_date: Some(out),
            return_date: Some(back),
            trip_type: TripType::RoundTrip,
            passenger_count: passengers,
        }
    }

    #[tokio::test]
    async fn test_one_way_purchase() {
        let w = world();
        let mut c = controller(&w.store);

        let trips = c.search(one_way(&w.lagos_abuja, day(10), 2)).await.unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(c.step(), DraftStep::SelectOutbound);

        assert_eq!(c.select_outbound(w.out_trip.id).await.unwrap(), DraftStep::Confirm);
        assert_eq!(c.fare_quote().unwrap().total, 50000);

        let purchase = c.confirm("user-1", PaymentMethod::Card).await.unwrap();
        let bookings = purchase.bookings();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].total_fare, 50000);
        assert_eq!(bookings[0].booking_type(), BookingType::OneWay);
        assert_eq!(bookings[0].linked_booking_id(), None);
        assert_eq!(bookings[0].status, BookingStatus::Confirmed);
        assert_eq!(c.step(), DraftStep::Search);
    }

    #[tokio::test]
    async fn test_round_trip_purchase() {
        let w = world();
        let mut c = controller(&w.store);

        c.search(round_trip(&w.lagos_abuja, day(10), day(14), 1)).await.unwrap();
        assert_eq!(c.select_outbound(w.out_trip.id).await.unwrap(), DraftStep::SelectReturn);
        assert_eq!(c.select_return(w.back_trip.id).unwrap(), DraftStep::Confirm);

        let fare = c.fare_quote().unwrap();
        assert_eq!(fare.outbound, w.lagos_abuja.base_fare);
        assert_eq!(fare.return_leg, Some(w.abuja_lagos.base_fare));

        let purchase = c.confirm("user-1", PaymentMethod::BankTransfer).await.unwrap();
        let Purchase::RoundTrip { outbound, return_leg } = &purchase else { panic!("expected round trip") };
        assert_eq!(outbound.total_fare, 25000);
        assert_eq!(return_leg.total_fare, 25000);
        assert_eq!(purchase.total_fare(), 50000);
        assert_eq!(outbound.linked_booking_id(), Some(return_leg.id));
        assert_eq!(return_leg.linked_booking_id(), Some(outbound.id));
        assert_eq!(outbound.trip_id, w.out_trip.id);
        assert_eq!(return_leg.trip_id, w.back_trip.id);
    }

    #[tokio::test]
    async fn test_round_trip_without_reverse_route_is_blocked() {
        let w = world();
        let mut c = controller(&w.store);

        let err = c.search(round_trip(&w.x_y, day(10), day(12), 1)).await.unwrap_err();
        assert!(matches!(err, BookingError::NoReversedRoute { .. }));
        assert_eq!(c.step(), DraftStep::Search);
        assert_eq!(w.store.booking_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_validation() {
        let w = world();
        let mut c = controller(&w.store);

        let mut missing_route = one_way(&w.lagos_abuja, day(10), 1);
        missing_route.route_id = None;
        assert!(matches!(c.search(missing_route).await, Err(BookingError::Validation(_))));

        let mut missing_date = one_way(&w.lagos_abuja, day(10), 1);
        missing_date.departure_date = None;
        assert!(matches!(c.search(missing_date).await, Err(BookingError::Validation(_))));

        let backwards = round_trip(&w.lagos_abuja, day(14), day(10), 1);
        assert!(matches!(c.search(backwards).await, Err(BookingError::Validation(_))));

        let mut no_return_date = round_trip(&w.lagos_abuja, day(10), day(14), 1);
        no_return_date.return_date = None;
        assert!(matches!(c.search(no_return_date).await, Err(BookingError::Validation(_))));

        assert!(matches!(c.search(one_way(&w.lagos_abuja, day(10), 0)).await, Err(BookingError::Validation(_))));
        assert!(matches!(c.search(one_way(&w.lagos_abuja, day(10), 11)).await, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_same_day_return_allowed() {
        let w = world();
        w.store.add_trip(trip(&w.abuja_lagos, day(10), TripStatus::Scheduled, 40)).unwrap();
        let mut c = controller(&w.store);

        c.search(round_trip(&w.lagos_abuja, day(10), day(10), 1)).await.unwrap();
        assert_eq!(c.select_outbound(w.out_trip.id).await.unwrap(), DraftStep::SelectReturn);
    }

    #[tokio::test]
    async fn test_no_trips_keeps_search_step() {
        let w = world();
        let mut c = controller(&w.store);

        let trips = c.search(one_way(&w.lagos_abuja, day(11), 1)).await.unwrap();
        assert!(trips.is_empty());
        assert_eq!(c.step(), DraftStep::Search);
    }

    #[tokio::test]
    async fn test_no_return_trips_keeps_outbound_step() {
        let w = world();
        let mut c = controller(&w.store);

        c.search(round_trip(&w.lagos_abuja, day(10), day(20), 1)).await.unwrap();
        assert_eq!(c.select_outbound(w.out_trip.id).await.unwrap(), DraftStep::SelectOutbound);
    }

    #[tokio::test]
    async fn test_return_requires_scheduled_trip() {
        let w = world();
        w.store.set_trip_status(w.back_trip.id, TripStatus::InProgress).unwrap();
        let mut c = controller(&w.store);

        c.search(round_trip(&w.lagos_abuja, day(10), day(14), 1)).await.unwrap();
        assert_eq!(c.select_outbound(w.out_trip.id).await.unwrap(), DraftStep::SelectOutbound);
    }

    #[tokio::test]
    async fn test_unknown_trip_selection() {
        let w = world();
        let mut c = controller(&w.store);
        c.search(one_way(&w.lagos_abuja, day(10), 1)).await.unwrap();

        let err = c.select_outbound(w.back_trip.id).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
        assert_eq!(c.step(), DraftStep::SelectOutbound);
    }

    #[tokio::test]
    async fn test_back_discards_later_selections() {
        let w = world();
        let mut c = controller(&w.store);

        c.search(round_trip(&w.lagos_abuja, day(10), day(14), 1)).await.unwrap();
        c.select_outbound(w.out_trip.id).await.unwrap();
        c.select_return(w.back_trip.id).unwrap();

        assert_eq!(c.back(), DraftStep::SelectReturn);
        assert!(c.fare_quote().is_none());
        assert_eq!(c.back(), DraftStep::SelectOutbound);
        assert_eq!(c.back(), DraftStep::Search);
        assert_eq!(c.back(), DraftStep::Search);

        assert!(matches!(c.select_return(w.back_trip.id), Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_research_clears_selections() {
        let w = world();
        let mut c = controller(&w.store);

        c.search(one_way(&w.lagos_abuja, day(10), 1)).await.unwrap();
        c.select_outbound(w.out_trip.id).await.unwrap();
        assert_eq!(c.step(), DraftStep::Confirm);

        c.search(one_way(&w.lagos_abuja, day(10), 3)).await.unwrap();
        assert_eq!(c.step(), DraftStep::SelectOutbound);
        assert!(c.fare_quote().is_none());
    }

    #[tokio::test]
    async fn test_failed_confirm_stays_at_confirm() {
        let w = world();
        let mut c = controller(&w.store);

        c.search(one_way(&w.lagos_abuja, day(10), 2)).await.unwrap();
        c.select_outbound(w.out_trip.id).await.unwrap();

        // Another passenger takes all but one seat meanwhile
        let mut rival = controller(&w.store);
        rival.search(one_way(&w.lagos_abuja, day(10), 10)).await.unwrap();
        rival.select_outbound(w.out_trip.id).await.unwrap();
        rival.confirm("user-2", PaymentMethod::Cash).await.unwrap();
        for _ in 0..2 {
            rival.search(one_way(&w.lagos_abuja, day(10), 10)).await.unwrap();
            rival.select_outbound(w.out_trip.id).await.unwrap();
            rival.confirm("user-2", PaymentMethod::Cash).await.unwrap();
        }
        rival.search(one_way(&w.lagos_abuja, day(10), 9)).await.unwrap();
        rival.select_outbound(w.out_trip.id).await.unwrap();
        rival.confirm("user-2", PaymentMethod::Cash).await.unwrap();
        assert_eq!(w.store.trip(w.out_trip.id).unwrap().unwrap().available_seats, 1);

        let err = c.confirm("user-1", PaymentMethod::Card).await.unwrap_err();
        assert!(matches!(err, BookingError::InsufficientSeats { requested: 2, available: 1, .. }));
        assert_eq!(c.step(), DraftStep::Confirm);
    }

    #[tokio::test]
    async fn test_confirm_requires_confirm_step() {
        let w = world();
        let mut c = controller(&w.store);
        let err = c.confirm("user-1", PaymentMethod::Card).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unpriceable_route_is_rejected_at_search() {
        let w = world();
        let pricey = Route::new("Lagos", "Kano", i64::MAX / 2);
        w.store.add_route(pricey.clone()).unwrap();
        w.store.add_trip(trip(&pricey, day(10), TripStatus::Scheduled, 40)).unwrap();
        let mut c = controller(&w.store);

        let err = c.search(one_way(&pricey, day(10), 3)).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(c.step(), DraftStep::Search);

        assert_eq!(c.search(one_way(&pricey, day(10), 2)).await.unwrap().len(), 1);
    }
}
