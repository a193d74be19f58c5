use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use busline_core::repository::RouteRepository;
use busline_core::{with_deadline, Route, StoreResult};

/// Read-only route lookup over the route store.
#[derive(Clone)]
pub struct RouteCatalog {
    repo: Arc<dyn RouteRepository>,
    timeout: Duration,
}

impl RouteCatalog {
    pub fn new(repo: Arc<dyn RouteRepository>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Routes currently offered for sale
    pub async fn routes(&self) -> StoreResult<Vec<Route>> {
        let routes = with_deadline(self.timeout, self.repo.get_routes()).await?;
        Ok(routes.into_iter().filter(|r| r.active).collect())
    }

    /// Look a route up by id, active or not
    pub async fn route(&self, id: Uuid) -> StoreResult<Option<Route>> {
        let routes = with_deadline(self.timeout, self.repo.get_routes()).await?;
        Ok(routes.into_iter().find(|r| r.id == id))
    }

    /// The active route running the opposite direction of `route`, if any.
    pub async fn reversed(&self, route: &Route) -> StoreResult<Option<Route>> {
        let found = with_deadline(
            self.timeout,
            self.repo.find_route(&route.destination, &route.origin),
        )
        .await?;

        let found = found.filter(|r| r.active && r.is_reverse_of(route));
        if found.is_none() {
            debug!("No active reverse route for {}", route.label());
        }
        Ok(found)
    }
}
