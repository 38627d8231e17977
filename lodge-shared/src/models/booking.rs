use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pii::Masked;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Confirmed and Cancelled have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown booking status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted reservation. `final_total` is always server-computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: i64,
    pub hotel_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: BookingStatus,
    pub guest_name: String,
    pub guest_email: Option<Masked<String>>,
    pub guest_phone: Option<Masked<String>>,
    pub currency: String,
    pub expected_total: Option<Decimal>,
    pub final_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a booking row. Status always starts as Pending.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: i64,
    pub hotel_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_name: String,
    pub guest_email: Option<Masked<String>>,
    pub guest_phone: Option<Masked<String>>,
    pub currency: String,
    pub expected_total: Option<Decimal>,
    pub final_total: Decimal,
}

impl NewBooking {
    pub fn into_booking(self, id: Uuid, now: DateTime<Utc>) -> Booking {
        Booking {
            id,
            user_id: self.user_id,
            hotel_id: self.hotel_id,
            check_in: self.check_in,
            check_out: self.check_out,
            status: BookingStatus::Pending,
            guest_name: self.guest_name,
            guest_email: self.guest_email,
            guest_phone: self.guest_phone,
            currency: self.currency,
            expected_total: self.expected_total,
            final_total: self.final_total,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestInfoUpdate {
    pub guest_name: String,
    pub guest_email: Option<Masked<String>>,
    pub guest_phone: Option<Masked<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub user_id: Option<i64>,
    pub hotel_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.user_id.map_or(true, |id| booking.user_id == id)
            && self.hotel_id.map_or(true, |id| booking.hotel_id == id)
            && self.status.map_or(true, |s| booking.status == s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_wire_form() {
        for status in [BookingStatus::Pending, BookingStatus::Confirmed, BookingStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("EXPIRED".parse::<BookingStatus>().is_err());
        assert_eq!(
            serde_json::to_value(BookingStatus::Confirmed).unwrap(),
            serde_json::json!("CONFIRMED")
        );
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }
}
