use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use busline_api::{app, auth::JwtIdentityProvider, AppState};
use busline_core::repository::{BookingRepository, RouteRepository, TripRepository};
use busline_store::app_config::{Config, StorageBackend};
use busline_store::{DbClient, InMemoryStore, PgBookingRepository, PgRouteRepository, PgTripRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DRAFT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type Stores = (Arc<dyn RouteRepository>, Arc<dyn TripRepository>, Arc<dyn BookingRepository>);

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(
                &config.database.url,
                config.database.max_connections,
                config.business_rules.store_timeout(),
            )
            .await
            .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            let routes: Arc<dyn RouteRepository> = Arc::new(PgRouteRepository::new(db.pool.clone()));
            let trips: Arc<dyn TripRepository> = Arc::new(PgTripRepository::new(db.pool.clone()));
            let bookings: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(db.pool));
            Ok((routes, trips, bookings))
        }
        StorageBackend::Memory => {
            let store = match &config.storage.seed_file {
                Some(path) => {
                    let doc = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read seed file {}", path))?;
                    InMemoryStore::from_seed(&doc)?
                }
                None => InMemoryStore::new(),
            };
            tracing::warn!("Using in-memory store; bookings are lost on restart");

            let store = Arc::new(store);
            let routes: Arc<dyn RouteRepository> = store.clone();
            let trips: Arc<dyn TripRepository> = store.clone();
            let bookings: Arc<dyn BookingRepository> = store;
            Ok((routes, trips, bookings))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    let (routes, trips, bookings) = open_stores(&config).await?;
    let identity = Arc::new(JwtIdentityProvider::new(&config.auth.jwt_secret));
    let app_state = AppState::new(routes, trips, bookings, identity, config.business_rules.clone());

    let sweeper = app_state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(DRAFT_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let swept = sweeper.sweep_idle_drafts().await;
            if swept > 0 {
                tracing::info!("Dropped {} idle draft(s)", swept);
            }
        }
    });

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
