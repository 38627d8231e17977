pub mod repository;

use lodge_shared::BookingStatus;
use rust_decimal::Decimal;
use uuid::Uuid;

pub use repository::{ReservationStore, RoomCatalog, Transaction};

/// Error taxonomy of the reservation engine.
///
/// Validation variants are raised before any write. Conflict variants are
/// raised mid-transaction and always come with a rollback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid booking dates")]
    InvalidDates,

    #[error("expected total amount {expected} does not match calculated total {computed}")]
    PriceChanged {
        expected: Decimal,
        computed: Decimal,
    },

    #[error("room lock already exists for room {room_id}")]
    RoomLockAlreadyExist { room_id: Uuid },

    #[error("all rooms must have same booking_id")]
    ConflictBookingRooms,

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("booking room not found: {0}")]
    BookingRoomNotFound(Uuid),

    #[error("room lock not found: {0}")]
    RoomLockNotFound(Uuid),

    #[error("booking must contain at least one room")]
    EmptyRoomList,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("room hold for booking {0} has expired")]
    HoldExpired(Uuid),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("internal server error: {0}")]
    InternalServer(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
