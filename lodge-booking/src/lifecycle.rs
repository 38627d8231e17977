use chrono::Utc;
use lodge_core::{CoreError, CoreResult, ReservationStore, Transaction};
use lodge_shared::{Booking, BookingStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::guard::guarded;
use crate::room_lock::RoomLockStore;

/// Check a status change against the lifecycle:
/// Pending → Confirmed | Cancelled, both terminal.
pub fn check_transition(from: BookingStatus, to: BookingStatus) -> CoreResult<()> {
    if from.is_terminal() || !to.is_terminal() {
        return Err(CoreError::InvalidStatusTransition { from, to });
    }
    Ok(())
}

/// Manages booking state transitions and their effect on room locks
pub struct BookingLifecycle<S> {
    store: Arc<S>,
    locks: RoomLockStore<S>,
    operation_timeout: Duration,
}

impl<S: ReservationStore> BookingLifecycle<S> {
    pub fn new(store: Arc<S>, operation_timeout: Duration) -> Self {
        Self {
            locks: RoomLockStore::new(Arc::clone(&store)),
            store,
            operation_timeout,
        }
    }

    /// Transition: Pending → Confirmed (hold must still be live)
    pub async fn confirm(&self, booking_id: Uuid, cancel: &CancellationToken) -> CoreResult<Booking> {
        self.transition(booking_id, BookingStatus::Confirmed, cancel).await
    }

    /// Transition: Pending → Cancelled (frees the rooms immediately)
    pub async fn cancel(&self, booking_id: Uuid, cancel: &CancellationToken) -> CoreResult<Booking> {
        self.transition(booking_id, BookingStatus::Cancelled, cancel).await
    }

    /// Apply `to` inside one transaction: lock the booking row, check the
    /// transition, write the status and settle the booking's room locks.
    /// Confirmation turns the holds into permanent reservations, cancellation
    /// releases them.
    pub async fn transition(
        &self,
        booking_id: Uuid,
        to: BookingStatus,
        cancel: &CancellationToken,
    ) -> CoreResult<Booking> {
        let deadline = Instant::now() + self.operation_timeout;
        let mut tx = guarded(cancel, deadline, self.store.begin_tx()).await?;

        let applied = guarded(cancel, deadline, self.apply(&mut tx, booking_id, to)).await;
        let booking = match applied {
            Ok(booking) => booking,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(booking_id = %booking_id, error = %rb, "rollback failed");
                }
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            if let Err(rb) = tx.rollback().await {
                warn!(booking_id = %booking_id, error = %rb, "rollback failed");
            }
            return Err(CoreError::Cancelled);
        }
        tx.commit().await?;

        info!(booking_id = %booking_id, status = %to, "booking status updated");
        Ok(booking)
    }

    async fn apply(&self, tx: &mut S::Tx, booking_id: Uuid, to: BookingStatus) -> CoreResult<Booking> {
        let mut booking = self.store.get_booking_for_update(tx, booking_id).await?;
        check_transition(booking.status, to)?;

        if to == BookingStatus::Confirmed {
            let live = self.store.count_live_locks(tx, booking_id, Utc::now()).await?;
            if live == 0 {
                return Err(CoreError::HoldExpired(booking_id));
            }
        }

        booking.updated_at = self.store.update_booking_status(tx, booking_id, to).await?;
        booking.status = to;
        if to == BookingStatus::Confirmed {
            self.locks.confirm(tx, booking_id).await?;
        } else {
            self.locks.deactivate(tx, booking_id).await?;
        }

        Ok(booking)
    }
}
