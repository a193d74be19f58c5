use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
use busline_booking::{BookingLedger, CancellationCoordinator, DraftController};
use busline_catalog::{RouteCatalog, TripAvailability};
use busline_core::identity::IdentityProvider;
use busline_core::repository::{BookingRepository, RouteRepository, TripRepository};
use busline_store::app_config::BusinessRules;
use busline_booking::BookingNumberGenerator;

/// A draft in progress, owned by the user who opened it.
pub struct DraftSession {
    pub owner: String,
    pub controller: Mutex<DraftController>,
    last_touched: Mutex<Instant>,
}

impl DraftSession {
    pub async fn touch(&self) {
        *self.last_touched.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_touched.lock().await.elapsed()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: RouteCatalog,
    pub trips: TripAvailability,
    pub ledger: Arc<BookingLedger>,
    pub coordinator: Arc<CancellationCoordinator>,
    pub drafts: Arc<RwLock<HashMap<Uuid, Arc<DraftSession>>>>,
    pub identity: Arc<dyn IdentityProvider>,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(
        routes: Arc<dyn RouteRepository>,
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        identity: Arc<dyn IdentityProvider>,
        business_rules: BusinessRules,
    ) -> Self {
        let timeout = business_rules.store_timeout();
        let numbers = BookingNumberGenerator::new(&business_rules.booking_number_prefix);

        Self {
            catalog: RouteCatalog::new(routes, timeout),
            trips: TripAvailability::new(trips, timeout),
            ledger: Arc::new(BookingLedger::new(bookings.clone(), numbers, timeout)),
            coordinator: Arc::new(CancellationCoordinator::new(bookings, timeout)),
            drafts: Arc::new(RwLock::new(HashMap::new())),
            identity,
            business_rules,
        }
    }

    fn new_draft(&self, owner: String) -> DraftSession {
        DraftSession {
            owner,
            controller: Mutex::new(DraftController::new(
                self.catalog.clone(),
                self.trips.clone(),
                self.ledger.clone(),
                self.business_rules.max_passengers,
            )),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    /// Register a new draft for `owner`. Idle drafts are swept first; if the
    /// owner is still at `max_drafts_per_user`, their least recently used
    /// drafts make room.
    pub async fn open_draft(&self, owner: String) -> (Uuid, Arc<DraftSession>) {
        self.sweep_idle_drafts().await;

        let cap = self.business_rules.max_drafts_per_user.max(1) as usize;
        let mut drafts = self.drafts.write().await;

        let mut owned = Vec::new();
        for (id, session) in drafts.iter() {
            if session.owner == owner {
                owned.push((session.idle_for().await, *id));
            }
        }
        if owned.len() >= cap {
            // Most idle first
            owned.sort_by(|a, b| b.0.cmp(&a.0));
            for (_, id) in owned.iter().take(owned.len() + 1 - cap) {
                drafts.remove(id);
                debug!("Draft {} evicted: {} is at the draft limit", id, owner);
            }
        }

        let draft_id = Uuid::new_v4();
        let session = Arc::new(self.new_draft(owner));
        drafts.insert(draft_id, session.clone());
        (draft_id, session)
    }

    /// Look up a live draft. Drafts idle past the timeout are dropped here too,
    /// so they expire even between sweeps.
    pub async fn draft(&self, draft_id: Uuid) -> Option<Arc<DraftSession>> {
        let session = self.drafts.read().await.get(&draft_id).cloned()?;
        if session.idle_for().await >= self.business_rules.draft_idle_timeout() {
            self.drafts.write().await.remove(&draft_id);
            return None;
        }
        session.touch().await;
        Some(session)
    }

    /// Drop every draft idle past the timeout; returns how many went.
    pub async fn sweep_idle_drafts(&self) -> usize {
        let limit = self.business_rules.draft_idle_timeout();
        let mut drafts = self.drafts.write().await;

        let mut idle = Vec::new();
        for (id, session) in drafts.iter() {
            if session.idle_for().await >= limit {
                idle.push(*id);
            }
        }
        for id in &idle {
            drafts.remove(id);
        }
        if !idle.is_empty() {
            debug!("Swept {} idle draft(s)", idle.len());
        }
        idle.len()
    }

    pub async fn draft_count(&self) -> usize {
        self.drafts.read().await.len()
    }
}
