pub mod route;
pub mod pricing;
pub mod inventory;

pub use route::RouteCatalog;
pub use pricing::{leg_fare, quote, FareBreakdown, PricingError};
pub use inventory::TripAvailability;
