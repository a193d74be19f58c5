use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use busline_catalog::FareBreakdown;
use busline_core::payment::PaymentMethod;
use busline_core::repository::BookingRepository;
use busline_core::{with_deadline, Booking, BookingKind, BookingStatus, Route, StoreError, Trip};
use crate::error::{BookingError, BookingResult};
use crate::number::BookingNumberGenerator;

const ORPHAN_ROLLBACK_REASON: &str = "rolled back: linked leg could not be written";

/// A chosen trip together with the route it runs on.
#[derive(Debug, Clone, Serialize)]
pub struct LegSelection {
    pub route: Route,
    pub trip: Trip,
}

/// Everything the ledger needs to persist a purchase.
#[derive(Debug, Clone)]
pub struct ConfirmedDraft {
    pub user_id: String,
    pub outbound: LegSelection,
    pub return_leg: Option<LegSelection>,
    pub passenger_count: u32,
    pub payment_method: PaymentMethod,
}

/// The booking rows produced by one purchase.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "purchase", rename_all = "snake_case")]
pub enum Purchase {
    OneWay { booking: Booking },
    RoundTrip { outbound: Booking, return_leg: Booking },
}

impl Purchase {
    pub fn bookings(&self) -> Vec<&Booking> {
        match self {
            Purchase::OneWay { booking } => vec![booking],
            Purchase::RoundTrip { outbound, return_leg } => vec![outbound, return_leg],
        }
    }

    /// Combined fare across all legs, for display.
    pub fn total_fare(&self) -> i64 {
        self.bookings().iter().map(|b| b.total_fare).sum()
    }
}

/// Creates and reads booking rows.
pub struct BookingLedger {
    bookings: Arc<dyn BookingRepository>,
    numbers: BookingNumberGenerator,
    timeout: Duration,
}

impl BookingLedger {
    pub fn new(bookings: Arc<dyn BookingRepository>, numbers: BookingNumberGenerator, timeout: Duration) -> Self {
        Self { bookings, numbers, timeout }
    }

    /// Persist a confirmed draft as one booking, or as a linked pair for a round trip.
    pub async fn commit(&self, draft: &ConfirmedDraft, fare: &FareBreakdown) -> BookingResult<Purchase> {
        if draft.passenger_count == 0 {
            return Err(BookingError::Validation("passenger count must be at least 1".into()));
        }
        if draft.user_id.trim().is_empty() {
            return Err(BookingError::Validation("missing acting user".into()));
        }

        match (&draft.return_leg, fare.return_leg) {
            (None, None) => self.commit_one_way(draft, fare.outbound).await,
            (Some(return_leg), Some(return_fare)) => {
                self.commit_round_trip(draft, return_leg, fare.outbound, return_fare).await
            }
            _ => Err(BookingError::Validation("fare does not match the selected legs".into())),
        }
    }

    fn build(&self, id: Uuid, draft: &ConfirmedDraft, trip: &Trip, fare: i64, kind: BookingKind) -> Booking {
        let mut booking = Booking::new(
            id,
            self.numbers.next(),
            draft.user_id.clone(),
            trip.id,
            draft.passenger_count,
            fare,
            kind,
        );
        booking.record_payment_method(draft.payment_method);
        booking
    }

    async fn commit_one_way(&self, draft: &ConfirmedDraft, fare: i64) -> BookingResult<Purchase> {
        let booking = self.build(Uuid::new_v4(), draft, &draft.outbound.trip, fare, BookingKind::OneWay);
        let stored = with_deadline(self.timeout, self.bookings.insert(&booking)).await?;

        info!(
            "One-way booking {} confirmed: trip {}, {} passenger(s), fare {}",
            stored.booking_number, stored.trip_id, stored.passenger_count, stored.total_fare
        );
        Ok(Purchase::OneWay { booking: stored })
    }

    async fn commit_round_trip(
        &self,
        draft: &ConfirmedDraft,
        return_leg: &LegSelection,
        outbound_fare: i64,
        return_fare: i64,
    ) -> BookingResult<Purchase> {
        let outbound_id = Uuid::new_v4();
        let return_id = Uuid::new_v4();

        let outbound = self.build(
            outbound_id,
            draft,
            &draft.outbound.trip,
            outbound_fare,
            BookingKind::RoundTrip { linked_booking_id: return_id, is_return_leg: false },
        );
        let inbound = self.build(
            return_id,
            draft,
            &return_leg.trip,
            return_fare,
            BookingKind::RoundTrip { linked_booking_id: outbound_id, is_return_leg: true },
        );

        let (stored_out, stored_back) =
            match with_deadline(self.timeout, self.bookings.insert_linked_pair(&outbound, &inbound)).await {
                Ok(pair) => pair,
                Err(StoreError::PartialWrite { written, reason }) => {
                    return Err(self.roll_back_orphan(written, reason).await);
                }
                Err(other) => return Err(other.into()),
            };

        if !is_linked_pair(&stored_out, &stored_back) {
            return Err(BookingError::IncompleteLink {
                written: stored_out.id,
                reason: "store returned legs that do not reference each other".into(),
                compensated: false,
            });
        }

        info!(
            "Round-trip bookings {} / {} confirmed, combined fare {}",
            stored_out.booking_number,
            stored_back.booking_number,
            stored_out.total_fare + stored_back.total_fare
        );
        Ok(Purchase::RoundTrip { outbound: stored_out, return_leg: stored_back })
    }

    async fn roll_back_orphan(&self, written: Uuid, reason: String) -> BookingError {
        warn!("Round trip left orphan leg {}: {}; rolling back", written, reason);

        let rollback = with_deadline(
            self.timeout,
            self.bookings.update_status(
                written,
                BookingStatus::Cancelled,
                Some(ORPHAN_ROLLBACK_REASON.to_string()),
                Some(Utc::now()),
            ),
        )
        .await;

        if let Err(e) = &rollback {
            warn!("Rollback of orphan leg {} failed: {}", written, e);
        }

        BookingError::IncompleteLink {
            written,
            reason,
            compensated: rollback.is_ok(),
        }
    }

    pub async fn get(&self, id: Uuid) -> BookingResult<Booking> {
        with_deadline(self.timeout, self.bookings.get(id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", id)))
    }

    pub async fn find_by_number(&self, booking_number: &str) -> BookingResult<Booking> {
        with_deadline(self.timeout, self.bookings.find_by_number(booking_number))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking number {}", booking_number)))
    }

    pub async fn list_for_user(&self, user_id: &str) -> BookingResult<Vec<Booking>> {
        Ok(with_deadline(self.timeout, self.bookings.list_for_user(user_id)).await?)
    }
}

/// Both rows reference each other, agree on party size, and exactly one is the return leg.
pub fn is_linked_pair(a: &Booking, b: &Booking) -> bool {
    a.linked_booking_id() == Some(b.id)
        && b.linked_booking_id() == Some(a.id)
        && a.passenger_count == b.passenger_count
        && a.is_return_leg() != b.is_return_leg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use busline_catalog::quote;
    use busline_core::{BookingType, StoreResult, TripStatus};
    use busline_store::InMemoryStore;
    use chrono::{DateTime, NaiveDate, NaiveTime};

    fn trip(route: &Route, seats: u32) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            route_id: route.id,
            bus_id: Uuid::new_v4(),
            trip_date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            departure_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            arrival_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            status: TripStatus::Scheduled,
            available_seats: seats,
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        out: LegSelection,
        back: LegSelection,
    }

    fn fixture(out_seats: u32, back_seats: u32) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let out_route = Route::new("Lagos", "Abuja", 25000);
        let back_route = Route::new("Abuja", "Lagos", 25000);
        let out_trip = trip(&out_route, out_seats);
        let back_trip = trip(&back_route, back_seats);
        store.add_trip(out_trip.clone()).unwrap();
        store.add_trip(back_trip.clone()).unwrap();

        Fixture {
            store,
            out: LegSelection { route: out_route, trip: out_trip },
            back: LegSelection { route: back_route, trip: back_trip },
        }
    }

    fn ledger(repo: Arc<dyn BookingRepository>) -> BookingLedger {
        BookingLedger::new(repo, BookingNumberGenerator::default(), Duration::from_secs(1))
    }

    fn draft(f: &Fixture, passengers: u32, round_trip: bool) -> ConfirmedDraft {
        ConfirmedDraft {
            user_id: "user-42".into(),
            outbound: f.out.clone(),
            return_leg: round_trip.then(|| f.back.clone()),
            passenger_count: passengers,
            payment_method: PaymentMethod::Card,
        }
    }

    #[tokio::test]
    async fn test_one_way_commit() {
        let f = fixture(40, 40);
        let ledger = ledger(f.store.clone());
        let d = draft(&f, 2, false);
        let fare = quote(&d.outbound.route, None, 2).unwrap();

        let purchase = ledger.commit(&d, &fare).await.unwrap();
        let Purchase::OneWay { booking } = &purchase else { panic!("expected one-way") };

        assert_eq!(booking.total_fare, 50000);
        assert_eq!(booking.booking_type(), BookingType::OneWay);
        assert_eq!(booking.linked_booking_id(), None);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.seat_numbers, vec![1, 2]);
        assert_eq!(f.store.trip(f.out.trip.id).unwrap().unwrap().available_seats, 38);
    }

    #[tokio::test]
    async fn test_round_trip_commit_links_both_legs() {
        let f = fixture(40, 40);
        let ledger = ledger(f.store.clone());
        let d = draft(&f, 1, true);
        let fare = quote(&d.outbound.route, Some(&f.back.route), 1).unwrap();

        let purchase = ledger.commit(&d, &fare).await.unwrap();
        let Purchase::RoundTrip { outbound, return_leg } = &purchase else { panic!("expected round trip") };

        assert_eq!(outbound.total_fare, 25000);
        assert_eq!(return_leg.total_fare, 25000);
        assert_eq!(purchase.total_fare(), 50000);
        assert!(is_linked_pair(outbound, return_leg));
        assert!(!outbound.is_return_leg());
        assert!(return_leg.is_return_leg());
        assert_ne!(outbound.booking_number, return_leg.booking_number);

        let reloaded = ledger.get(outbound.linked_booking_id().unwrap()).await.unwrap();
        assert_eq!(reloaded.linked_booking_id(), Some(outbound.id));
    }

    #[tokio::test]
    async fn test_round_trip_without_return_seats_writes_nothing() {
        let f = fixture(40, 1);
        let ledger = ledger(f.store.clone());
        let d = draft(&f, 3, true);
        let fare = quote(&d.outbound.route, Some(&f.back.route), 3).unwrap();

        let err = ledger.commit(&d, &fare).await.unwrap_err();
        assert!(matches!(err, BookingError::InsufficientSeats { requested: 3, available: 1, .. }));
        assert_eq!(f.store.booking_count().unwrap(), 0);
        assert_eq!(f.store.trip(f.out.trip.id).unwrap().unwrap().available_seats, 40);
    }

    #[tokio::test]
    async fn test_fare_must_match_legs() {
        let f = fixture(40, 40);
        let ledger = ledger(f.store.clone());
        let d = draft(&f, 1, true);
        let one_way_fare = quote(&d.outbound.route, None, 1).unwrap();

        let err = ledger.commit(&d, &one_way_fare).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    /// Writes only the first leg of a pair, like a store without transactions would.
    struct HalfWritingStore {
        inner: Arc<InMemoryStore>,
    }

    #[async_trait]
    impl BookingRepository for HalfWritingStore {
        async fn insert(&self, booking: &Booking) -> StoreResult<Booking> {
            self.inner.insert(booking).await
        }

        async fn insert_linked_pair(&self, outbound: &Booking, _inbound: &Booking) -> StoreResult<(Booking, Booking)> {
            let mut orphan = outbound.clone();
            orphan.kind = BookingKind::OneWay;
            let written = self.inner.insert(&orphan).await?;
            Err(StoreError::PartialWrite { written: written.id, reason: "connection reset".into() })
        }

        async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
            self.inner.get(id).await
        }

        async fn find_by_number(&self, n: &str) -> StoreResult<Option<Booking>> {
            self.inner.find_by_number(n).await
        }

        async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
            self.inner.list_for_user(user_id).await
        }

        async fn update_status(
            &self,
            id: Uuid,
            status: BookingStatus,
            reason: Option<String>,
            cancelled_at: Option<DateTime<Utc>>,
        ) -> StoreResult<Booking> {
            self.inner.update_status(id, status, reason, cancelled_at).await
        }
    }

    #[tokio::test]
    async fn test_orphan_leg_is_rolled_back() {
        let f = fixture(40, 40);
        let ledger = ledger(Arc::new(HalfWritingStore { inner: f.store.clone() }));
        let d = draft(&f, 2, true);
        let fare = quote(&d.outbound.route, Some(&f.back.route), 2).unwrap();

        let err = ledger.commit(&d, &fare).await.unwrap_err();
        let (written, compensated) = match err {
            BookingError::IncompleteLink { written, compensated, .. } => (written, compensated),
            other => panic!("expected incomplete link, got {other:?}"),
        };

        assert!(compensated);
        let orphan = f.store.get(written).await.unwrap().unwrap();
        assert_eq!(orphan.status, BookingStatus::Cancelled);
        assert_eq!(orphan.cancellation_reason.as_deref(), Some(ORPHAN_ROLLBACK_REASON));
        assert_eq!(f.store.trip(f.out.trip.id).unwrap().unwrap().available_seats, 40);
    }

    #[tokio::test]
    async fn test_lookup_by_number_and_user() {
        let f = fixture(40, 40);
        let ledger = ledger(f.store.clone());
        let d = draft(&f, 1, false);
        let fare = quote(&d.outbound.route, None, 1).unwrap();
        let purchase = ledger.commit(&d, &fare).await.unwrap();
        let number = purchase.bookings()[0].booking_number.clone();

        assert_eq!(ledger.find_by_number(&number).await.unwrap().id, purchase.bookings()[0].id);
        assert_eq!(ledger.list_for_user("user-42").await.unwrap().len(), 1);
        assert!(matches!(ledger.find_by_number("BK-NOPE").await, Err(BookingError::NotFound(_))));
    }

    enum InsertFailure {
        Backend,
        Stall,
    }

    /// Fails every insert, either outright or by never answering in time.
    struct FailingInsertStore {
        inner: Arc<InMemoryStore>,
        failure: InsertFailure,
    }

    impl FailingInsertStore {
        async fn fail(&self) -> StoreResult<()> {
            match self.failure {
                InsertFailure::Backend => Err(StoreError::Backend("disk full".into())),
                InsertFailure::Stall => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl BookingRepository for FailingInsertStore {
        async fn insert(&self, booking: &Booking) -> StoreResult<Booking> {
            self.fail().await?;
            self.inner.insert(booking).await
        }

        async fn insert_linked_pair(&self, outbound: &Booking, inbound: &Booking) -> StoreResult<(Booking, Booking)> {
            self.fail().await?;
            self.inner.insert_linked_pair(outbound, inbound).await
        }

        async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
            self.inner.get(id).await
        }

        async fn find_by_number(&self, n: &str) -> StoreResult<Option<Booking>> {
            self.inner.find_by_number(n).await
        }

        async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
            self.inner.list_for_user(user_id).await
        }

        async fn update_status(
            &self,
            id: Uuid,
            status: BookingStatus,
            reason: Option<String>,
            cancelled_at: Option<DateTime<Utc>>,
        ) -> StoreResult<Booking> {
            self.inner.update_status(id, status, reason, cancelled_at).await
        }
    }

    fn failing_ledger(f: &Fixture, failure: InsertFailure) -> BookingLedger {
        let store = FailingInsertStore { inner: f.store.clone(), failure };
        BookingLedger::new(Arc::new(store), BookingNumberGenerator::default(), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_backend_failure_is_persistence_error() {
        let f = fixture(40, 40);
        let ledger = failing_ledger(&f, InsertFailure::Backend);

        let d = draft(&f, 2, false);
        let err = ledger.commit(&d, &quote(&d.outbound.route, None, 2).unwrap()).await.unwrap_err();
        assert!(matches!(err, BookingError::Persistence(_)));

        let d = draft(&f, 2, true);
        let fare = quote(&d.outbound.route, Some(&f.back.route), 2).unwrap();
        let err = ledger.commit(&d, &fare).await.unwrap_err();
        assert!(matches!(err, BookingError::Persistence(_)));

        assert_eq!(f.store.booking_count().unwrap(), 0);
        assert_eq!(f.store.trip(f.out.trip.id).unwrap().unwrap().available_seats, 40);
    }

    #[tokio::test]
    async fn test_stalled_store_is_remote_failure() {
        let f = fixture(40, 40);
        let ledger = failing_ledger(&f, InsertFailure::Stall);

        let d = draft(&f, 1, false);
        let err = ledger.commit(&d, &quote(&d.outbound.route, None, 1).unwrap()).await.unwrap_err();
        assert!(matches!(err, BookingError::RemoteFailure(_)));

        let d = draft(&f, 1, true);
        let fare = quote(&d.outbound.route, Some(&f.back.route), 1).unwrap();
        let err = ledger.commit(&d, &fare).await.unwrap_err();
        assert!(matches!(err, BookingError::RemoteFailure(_)));

        assert_eq!(f.store.booking_count().unwrap(), 0);
    }
}
