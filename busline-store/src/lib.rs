pub mod app_config;
pub mod database;
pub mod memory;
pub mod route_repo;
pub mod trip_repo;
pub mod booking_repo;

pub use database::DbClient;
pub use memory::InMemoryStore;
pub use route_repo::PgRouteRepository;
pub use trip_repo::PgTripRepository;
pub use booking_repo::PgBookingRepository;
