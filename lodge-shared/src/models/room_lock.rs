use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Half-open stay range `[start, end)` in calendar days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StayRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Back-to-back stays (checkout day == next check-in day) do not overlap.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

/// A time-bounded exclusive hold on one room for a stay range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomLock {
    pub id: Uuid,
    pub room_id: Uuid,
    pub booking_id: Uuid,
    pub stay_range: StayRange,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    /// Set when the owning booking is confirmed. The hold is switched off
    /// but the stay stays reserved for good.
    #[serde(default)]
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl RoomLock {
    /// A hold is live while active and unexpired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// True when this lock would reject `candidate` for the same room at `now`:
    /// a live hold, or the reservation of a confirmed booking.
    pub fn blocks(&self, room_id: Uuid, candidate: &StayRange, now: DateTime<Utc>) -> bool {
        self.room_id == room_id
            && (self.confirmed || self.is_live(now))
            && self.stay_range.overlaps(candidate)
    }

    /// Whether the hold interval `[min(created_at, expires_at), expires_at)`,
    /// unbounded once confirmed, reaches past `since`.
    pub fn held_after(&self, since: DateTime<Utc>) -> bool {
        self.confirmed || (self.is_active && self.created_at < self.expires_at && self.expires_at > since)
    }
}

#[derive(Debug, Clone)]
pub struct NewRoomLock {
    pub room_id: Uuid,
    pub booking_id: Uuid,
    pub stay_range: StayRange,
    pub expires_at: DateTime<Utc>,
}

impl NewRoomLock {
    pub fn into_room_lock(self, id: Uuid, now: DateTime<Utc>) -> RoomLock {
        RoomLock {
            id,
            room_id: self.room_id,
            booking_id: self.booking_id,
            stay_range: self.stay_range,
            expires_at: self.expires_at,
            is_active: true,
            confirmed: false,
            created_at: now,
        }
    }
}
