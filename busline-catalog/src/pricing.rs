use serde::{Deserialize, Serialize};
use busline_core::Route;

/// Per-leg and combined fares for a purchase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareBreakdown {
    pub outbound: i64,
    pub return_leg: Option<i64>,
    pub total: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Route {route} has a negative base fare {base_fare}")]
    NegativeFare { route: String, base_fare: i64 },
    #[error("Fare for {route} overflows for {passenger_count} passenger(s)")]
    Overflow { route: String, passenger_count: u32 },
}

/// Fare for one leg: the leg's own route fare times the party size.
pub fn leg_fare(route: &Route, passenger_count: u32) -> Result<i64, PricingError> {
    if route.base_fare < 0 {
        return Err(PricingError::NegativeFare {
            route: route.label(),
            base_fare: route.base_fare,
        });
    }
    route
        .base_fare
        .checked_mul(passenger_count as i64)
        .ok_or_else(|| PricingError::Overflow {
            route: route.label(),
            passenger_count,
        })
}

/// Price a purchase. Each leg is priced against its own route.
pub fn quote(
    outbound_route: &Route,
    return_route: Option<&Route>,
    passenger_count: u32,
) -> Result<FareBreakdown, PricingError> {
    let outbound = leg_fare(outbound_route, passenger_count)?;
    let return_leg = match return_route {
        Some(r) => Some(leg_fare(r, passenger_count)?),
        None => None,
    };

    let total = outbound
        .checked_add(return_leg.unwrap_or(0))
        .ok_or_else(|| PricingError::Overflow {
            route: outbound_route.label(),
            passenger_count,
        })?;

    Ok(FareBreakdown { outbound, return_leg, total })
}
