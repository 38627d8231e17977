use chrono::Utc;
use lodge_core::{CoreError, CoreResult, ReservationStore};
use lodge_shared::BookingStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lifecycle::BookingLifecycle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deactivated_locks: u64,
    pub cancelled_bookings: u64,
}

/// Background task that tidies up lapsed holds.
///
/// Expired locks already stop blocking on their own; the reaper only flips
/// them inactive and moves abandoned Pending bookings to Cancelled.
pub struct HoldReaper<S> {
    store: Arc<S>,
    lifecycle: Arc<BookingLifecycle<S>>,
    interval: Duration,
    batch_size: u64,
}

impl<S: ReservationStore> HoldReaper<S> {
    pub fn new(
        store: Arc<S>,
        lifecycle: Arc<BookingLifecycle<S>>,
        interval: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            store,
            lifecycle,
            interval,
            batch_size,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "hold reaper started");
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("hold reaper received shutdown signal");
                    return;
                }
                _ = interval.tick() => {
                    match self.sweep(&shutdown).await {
                        Ok(report) if report == SweepReport::default() => debug!("nothing to reap"),
                        Ok(report) => info!(
                            deactivated_locks = report.deactivated_locks,
                            cancelled_bookings = report.cancelled_bookings,
                            "reaped lapsed holds"
                        ),
                        Err(e) => warn!(error = %e, "hold reaper sweep failed"),
                    }
                }
            }
        }
    }

    pub async fn sweep(&self, cancel: &CancellationToken) -> CoreResult<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport {
            deactivated_locks: self.store.deactivate_expired_locks(now).await?,
            ..SweepReport::default()
        };

        for booking_id in self.store.find_lapsed_pending_bookings(now, self.batch_size).await? {
            match self.lifecycle.transition(booking_id, BookingStatus::Cancelled, cancel).await {
                Ok(_) => report.cancelled_bookings += 1,
                // Confirmed, cancelled or deleted since the scan
                Err(e @ (CoreError::InvalidStatusTransition { .. } | CoreError::BookingNotFound(_))) => {
                    debug!(booking_id = %booking_id, error = %e, "reaper skip");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}
