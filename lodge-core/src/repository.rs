use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodge_shared::{
    Booking, BookingFilter, BookingPage, BookingRoom, BookingRoomWithLock, BookingStatus,
    GuestInfoUpdate, NewBooking, NewBookingRoom, NewRoomLock, RoomLock,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::CoreResult;

/// An open storage transaction.
///
/// Dropping a transaction without calling `commit` must discard every write
/// made through it, so early returns and cancelled futures never leave
/// partial state behind.
#[async_trait]
pub trait Transaction: Send + Sized {
    async fn commit(self) -> CoreResult<()>;

    async fn rollback(self) -> CoreResult<()>;
}

/// Storage capability used by the reservation engine, implemented once per
/// backing store.
///
/// Writes that must be atomic with each other take `&mut Self::Tx`.
/// `create_room_lock` must enforce the live-lock exclusion atomically in the
/// store itself and report a clash as `CoreError::RoomLockAlreadyExist`.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    type Tx: Transaction;

    async fn begin_tx(&self) -> CoreResult<Self::Tx>;

    async fn create_booking(&self, tx: &mut Self::Tx, booking: &NewBooking) -> CoreResult<Booking>;

    async fn create_booking_room(
        &self,
        tx: &mut Self::Tx,
        room: &NewBookingRoom,
    ) -> CoreResult<BookingRoom>;

    async fn create_room_lock(&self, tx: &mut Self::Tx, lock: &NewRoomLock) -> CoreResult<RoomLock>;

    /// Flip `is_active` off for every lock of the booking. Returns rows touched.
    async fn deactivate_locks(&self, tx: &mut Self::Tx, booking_id: Uuid) -> CoreResult<u64>;

    /// Turn the booking's active holds into permanent reservations: `is_active`
    /// off, `confirmed` on. The write goes through the same exclusion as
    /// `create_room_lock` and fails with `CoreError::RoomLockAlreadyExist`
    /// when another lock took an overlapping stay after the hold lapsed.
    async fn confirm_locks(&self, tx: &mut Self::Tx, booking_id: Uuid) -> CoreResult<u64>;

    /// Read a booking and keep it protected from concurrent status writers
    /// until the transaction ends.
    async fn get_booking_for_update(&self, tx: &mut Self::Tx, id: Uuid) -> CoreResult<Booking>;

    async fn count_live_locks(
        &self,
        tx: &mut Self::Tx,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<u64>;

    async fn update_booking_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: BookingStatus,
    ) -> CoreResult<DateTime<Utc>>;

    async fn update_guest_info(&self, id: Uuid, update: &GuestInfoUpdate) -> CoreResult<()>;

    /// Removes the booking together with its rooms and locks.
    async fn delete_booking(&self, id: Uuid) -> CoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Booking>;

    async fn get_booking_rooms(&self, booking_id: Uuid) -> CoreResult<Vec<BookingRoomWithLock>>;

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        limit: u64,
        offset: u64,
    ) -> CoreResult<BookingPage>;

    /// Pending bookings that no longer hold a single live lock.
    async fn find_lapsed_pending_bookings(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> CoreResult<Vec<Uuid>>;

    /// Hygiene sweep: deactivate active locks whose hold window has passed.
    async fn deactivate_expired_locks(&self, now: DateTime<Utc>) -> CoreResult<u64>;
}

/// Authoritative nightly room prices, owned by the hotel catalog.
#[async_trait]
pub trait RoomCatalog: Send + Sync {
    async fn get_room_price(&self, room_id: Uuid) -> CoreResult<Decimal>;
}
