use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::payment::{PaymentMethod, PaymentStatus};

/// Booking lifecycle: `Pending → Confirmed → {Cancelled, Completed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    OneWay,
    RoundTrip,
}

impl BookingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::OneWay => "one_way",
            BookingType::RoundTrip => "round_trip",
        }
    }
}

/// Direction of a round-trip leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Outbound,
    Return,
}

impl Leg {
    pub fn other(&self) -> Leg {
        match self {
            Leg::Outbound => Leg::Return,
            Leg::Return => Leg::Outbound,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Outbound => f.write_str("outbound"),
            Leg::Return => f.write_str("return"),
        }
    }
}

/// One-way bookings carry no link; round-trip legs always carry their partner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "booking_type", rename_all = "snake_case")]
pub enum BookingKind {
    OneWay,
    RoundTrip {
        linked_booking_id: Uuid,
        is_return_leg: bool,
    },
}

impl BookingKind {
    pub fn booking_type(&self) -> BookingType {
        match self {
            BookingKind::OneWay => BookingType::OneWay,
            BookingKind::RoundTrip { .. } => BookingType::RoundTrip,
        }
    }

    pub fn linked_booking_id(&self) -> Option<Uuid> {
        match self {
            BookingKind::OneWay => None,
            BookingKind::RoundTrip { linked_booking_id, .. } => Some(*linked_booking_id),
        }
    }

    pub fn is_return_leg(&self) -> bool {
        matches!(self, BookingKind::RoundTrip { is_return_leg: true, .. })
    }

    pub fn leg(&self) -> Option<Leg> {
        match self {
            BookingKind::OneWay => None,
            BookingKind::RoundTrip { is_return_leg: true, .. } => Some(Leg::Return),
            BookingKind::RoundTrip { is_return_leg: false, .. } => Some(Leg::Outbound),
        }
    }

    /// Rebuild the kind from flat column values.
    pub fn from_columns(
        booking_type: &str,
        linked_booking_id: Option<Uuid>,
        is_return_leg: bool,
    ) -> Option<Self> {
        match (booking_type, linked_booking_id) {
            ("one_way", None) if !is_return_leg => Some(BookingKind::OneWay),
            ("round_trip", Some(linked_booking_id)) => Some(BookingKind::RoundTrip {
                linked_booking_id,
                is_return_leg,
            }),
            _ => None,
        }
    }
}

/// A persisted reservation for one leg of travel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub booking_number: String,
    pub user_id: String,
    pub trip_id: Uuid,
    /// Purchase-local passenger ordinals, `1..=passenger_count`.
    pub seat_numbers: Vec<u32>,
    pub passenger_count: u32,
    /// Fare for this leg only.
    pub total_fare: i64,
    #[serde(flatten)]
    pub kind: BookingKind,
    pub status: BookingStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub booked_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        id: Uuid,
        booking_number: String,
        user_id: String,
        trip_id: Uuid,
        passenger_count: u32,
        total_fare: i64,
        kind: BookingKind,
    ) -> Self {
        Self {
            id,
            booking_number,
            user_id,
            trip_id,
            seat_numbers: (1..=passenger_count).collect(),
            passenger_count,
            total_fare,
            kind,
            status: BookingStatus::Pending,
            payment_method: None,
            payment_status: PaymentStatus::Pending,
            cancellation_reason: None,
            cancelled_at: None,
            booked_at: Utc::now(),
        }
    }

    /// Record how the passenger pays; this is what confirms a pending booking.
    pub fn record_payment_method(&mut self, method: PaymentMethod) {
        self.payment_method = Some(method);
        if self.status == BookingStatus::Pending {
            self.status = BookingStatus::Confirmed;
        }
    }

    pub fn booking_type(&self) -> BookingType {
        self.kind.booking_type()
    }

    pub fn linked_booking_id(&self) -> Option<Uuid> {
        self.kind.linked_booking_id()
    }

    pub fn is_return_leg(&self) -> bool {
        self.kind.is_return_leg()
    }
}
