use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::room_lock::RoomLock;

/// A room inside a booking. `price_per_night` is a snapshot taken at
/// booking time and never follows later catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRoom {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub room_id: Uuid,
    pub adults: u8,
    pub children: u8,
    pub price_per_night: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBookingRoom {
    pub booking_id: Uuid,
    pub room_id: Uuid,
    pub adults: u8,
    pub children: u8,
    pub price_per_night: Decimal,
}

impl NewBookingRoom {
    pub fn into_booking_room(self, id: Uuid, now: DateTime<Utc>) -> BookingRoom {
        BookingRoom {
            id,
            booking_id: self.booking_id,
            room_id: self.room_id,
            adults: self.adults,
            children: self.children,
            price_per_night: self.price_per_night,
            created_at: now,
        }
    }
}

/// Booking room joined with the lock that was taken for it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingRoomWithLock {
    #[serde(flatten)]
    pub room: BookingRoom,
    pub lock: Option<RoomLock>,
}
