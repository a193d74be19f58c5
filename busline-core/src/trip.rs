use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{NaiveDate, NaiveTime};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::InProgress => "in_progress",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(TripStatus::Scheduled),
            "in_progress" => Some(TripStatus::InProgress),
            "completed" => Some(TripStatus::Completed),
            "cancelled" => Some(TripStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which trip statuses a search should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Everything except cancelled trips.
    NotCancelled,
    Only(TripStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: TripStatus) -> bool {
        match self {
            StatusFilter::NotCancelled => status != TripStatus::Cancelled,
            StatusFilter::Only(wanted) => status == *wanted,
        }
    }
}

/// A scheduled departure of a bus over a route on a given date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub trip_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub arrival_time: NaiveTime,
    pub status: TripStatus,
    pub available_seats: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_filters() {
        assert!(StatusFilter::NotCancelled.matches(TripStatus::InProgress));
        assert!(!StatusFilter::NotCancelled.matches(TripStatus::Cancelled));
        assert!(StatusFilter::Only(TripStatus::Scheduled).matches(TripStatus::Scheduled));
        assert!(!StatusFilter::Only(TripStatus::Scheduled).matches(TripStatus::InProgress));
    }

    #[test]
    fn test_status_parse() {
        for status in [
            TripStatus::Scheduled,
            TripStatus::InProgress,
            TripStatus::Completed,
            TripStatus::Cancelled,
        ] {
            assert_eq!(TripStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TripStatus::parse("delayed"), None);
    }
}
