use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directional origin → destination route with its per-passenger fare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    /// Per-passenger fare in minor currency units.
    pub base_fare: i64,
    /// Kilometres.
    pub distance: f64,
    /// Minutes.
    pub duration: u32,
    pub active: bool,
}

impl Route {
    pub fn new(origin: &str, destination: &str, base_fare: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            base_fare,
            distance: 0.0,
            duration: 0,
            active: true,
        }
    }

    /// True when `other` runs the opposite direction of this route.
    pub fn is_reverse_of(&self, other: &Route) -> bool {
        self.origin == other.destination && self.destination == other.origin
    }

    pub fn label(&self) -> String {
        format!("{}→{}", self.origin, self.destination)
    }
}
