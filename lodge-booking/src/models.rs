use chrono::NaiveDate;
use lodge_core::{CoreError, CoreResult};
use lodge_shared::pii::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_HOLD_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// One room requested inside a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRequest {
    pub room_id: Uuid,
    pub adults: u8,
    #[serde(default)]
    pub children: u8,
    pub price_per_night: Decimal,
}

/// A create request whose caller identity has already been established.
#[derive(Debug, Clone)]
pub struct CreateBookingRequest {
    pub user_id: i64,
    pub hotel_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_name: String,
    pub guest_email: Option<Masked<String>>,
    pub guest_phone: Option<Masked<String>>,
    pub currency: String,
    pub expected_total: Option<Decimal>,
    pub rooms: Vec<RoomRequest>,
}

impl CreateBookingRequest {
    /// Shape checks that need no pricing and no storage.
    pub fn validate_inputs(&self) -> CoreResult<()> {
        if self.rooms.is_empty() {
            return Err(CoreError::EmptyRoomList);
        }
        validate_guest_name(&self.guest_name)?;

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::Validation(format!(
                "currency must be a 3-letter code, got {:?}",
                self.currency
            )));
        }
        if self.expected_total.is_some_and(|t| t.is_sign_negative()) {
            return Err(CoreError::Validation("expected total must not be negative".to_string()));
        }

        let mut seen = HashSet::with_capacity(self.rooms.len());
        for room in &self.rooms {
            if room.adults == 0 {
                return Err(CoreError::Validation(format!(
                    "room {} needs at least one adult",
                    room.room_id
                )));
            }
            if room.price_per_night.is_sign_negative() {
                return Err(CoreError::Validation(format!(
                    "room {} has a negative price",
                    room.room_id
                )));
            }
            if !seen.insert(room.room_id) {
                return Err(CoreError::Validation(format!(
                    "room {} is listed more than once",
                    room.room_id
                )));
            }
        }

        Ok(())
    }

    pub fn prices_per_night(&self) -> Vec<Decimal> {
        self.rooms.iter().map(|r| r.price_per_night).collect()
    }
}

pub(crate) fn validate_guest_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("guest name must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// TTL of the locks taken for a Pending booking.
    pub hold_window: Duration,
    /// Budget for one storage transaction, begin through commit.
    pub operation_timeout: Duration,
    pub verify_catalog_prices: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hold_window: DEFAULT_HOLD_WINDOW,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            verify_catalog_prices: false,
        }
    }
}

impl CoordinatorConfig {
    pub(crate) fn hold_delta(&self) -> CoreResult<chrono::Duration> {
        chrono::Duration::from_std(self.hold_window)
            .map_err(|_| CoreError::InternalServer("hold window out of range".to_string()))
    }
}
