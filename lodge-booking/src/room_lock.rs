use lodge_core::{CoreError, CoreResult, ReservationStore};
use lodge_shared::{NewRoomLock, RoomLock};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Time-bounded, date-ranged holds on rooms.
///
/// Non-overlap of live locks is enforced by the backing store on insert;
/// this type never reads availability before writing.
pub struct RoomLockStore<S> {
    store: Arc<S>,
}

impl<S> Clone for RoomLockStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ReservationStore> RoomLockStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Insert one lock inside the caller's transaction.
    pub async fn create_lock(
        &self,
        tx: &mut S::Tx,
        booking_id: Uuid,
        lock: &NewRoomLock,
    ) -> CoreResult<RoomLock> {
        if lock.booking_id != booking_id {
            return Err(CoreError::ConflictBookingRooms);
        }

        match self.store.create_room_lock(tx, lock).await {
            Ok(created) => {
                debug!(
                    booking_id = %booking_id,
                    room_id = %created.room_id,
                    expires_at = %created.expires_at,
                    "room lock acquired"
                );
                Ok(created)
            }
            Err(e @ CoreError::RoomLockAlreadyExist { .. }) => {
                warn!(booking_id = %booking_id, room_id = %lock.room_id, "room already held for overlapping dates");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Insert one lock per room. Every lock must belong to `booking_id`;
    /// that is checked for the whole batch before anything is written.
    pub async fn create_locks(
        &self,
        tx: &mut S::Tx,
        booking_id: Uuid,
        locks: &[NewRoomLock],
    ) -> CoreResult<Vec<RoomLock>> {
        if locks.iter().any(|l| l.booking_id != booking_id) {
            return Err(CoreError::ConflictBookingRooms);
        }

        let mut created = Vec::with_capacity(locks.len());
        for lock in locks {
            created.push(self.create_lock(tx, booking_id, lock).await?);
        }
        Ok(created)
    }

    /// Keep the booking's rooms reserved for good once it is confirmed. The
    /// holds are switched off, their stays keep blocking other bookings.
    pub async fn confirm(&self, tx: &mut S::Tx, booking_id: Uuid) -> CoreResult<u64> {
        match self.store.confirm_locks(tx, booking_id).await {
            Ok(confirmed) => {
                debug!(booking_id = %booking_id, confirmed, "room locks confirmed");
                Ok(confirmed)
            }
            Err(e @ CoreError::RoomLockAlreadyExist { .. }) => {
                warn!(booking_id = %booking_id, error = %e, "room taken after the hold lapsed");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Release every lock of the booking. Calling it twice is harmless.
    pub async fn deactivate(&self, tx: &mut S::Tx, booking_id: Uuid) -> CoreResult<u64> {
        let released = self.store.deactivate_locks(tx, booking_id).await?;
        debug!(booking_id = %booking_id, released, "room locks deactivated");
        Ok(released)
    }
}
