use chrono::Utc;
use lodge_catalog::{nights, PriceReconciler, Quote};
use lodge_core::{CoreError, CoreResult, ReservationStore, RoomCatalog, Transaction};
use lodge_shared::{Booking, NewBooking, NewBookingRoom, NewRoomLock, StayRange};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::guard::guarded;
use crate::models::{CoordinatorConfig, CreateBookingRequest};
use crate::room_lock::RoomLockStore;

/// Creates a booking, its rooms and their locks as one all-or-nothing unit.
pub struct ReservationCoordinator<S> {
    store: Arc<S>,
    locks: RoomLockStore<S>,
    reconciler: PriceReconciler,
    catalog: Option<Arc<dyn RoomCatalog>>,
    config: CoordinatorConfig,
}

impl<S: ReservationStore> ReservationCoordinator<S> {
    pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self {
            locks: RoomLockStore::new(Arc::clone(&store)),
            store,
            reconciler: PriceReconciler::default(),
            catalog: None,
            config,
        }
    }

    /// Source of authoritative prices, consulted when `verify_catalog_prices` is set.
    pub fn with_catalog(mut self, catalog: Arc<dyn RoomCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn create_booking(
        &self,
        req: CreateBookingRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<Booking> {
        let deadline = Instant::now() + self.config.operation_timeout;

        // Nothing is written until dates, inputs and prices check out
        nights(req.check_in, req.check_out)?;
        req.validate_inputs()?;
        let quote = self.reconciler.reconcile(
            req.check_in,
            req.check_out,
            &req.prices_per_night(),
            req.expected_total,
        )?;
        if self.config.verify_catalog_prices {
            guarded(cancel, deadline, self.verify_catalog_prices(&req)).await?;
        }

        let mut tx = guarded(cancel, deadline, self.store.begin_tx()).await?;

        let written = guarded(cancel, deadline, self.write_booking(&mut tx, &req, quote)).await;
        let booking = match written {
            Ok(booking) => booking,
            Err(e) => {
                rollback(tx, &e).await;
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            rollback(tx, &CoreError::Cancelled).await;
            return Err(CoreError::Cancelled);
        }
        tx.commit().await?;

        info!(
            booking_id = %booking.id,
            user_id = booking.user_id,
            rooms = req.rooms.len(),
            final_total = %booking.final_total,
            "booking created"
        );
        Ok(booking)
    }

    async fn write_booking(
        &self,
        tx: &mut S::Tx,
        req: &CreateBookingRequest,
        quote: Quote,
    ) -> CoreResult<Booking> {
        let booking = self
            .store
            .create_booking(
                tx,
                &NewBooking {
                    user_id: req.user_id,
                    hotel_id: req.hotel_id,
                    check_in: req.check_in,
                    check_out: req.check_out,
                    guest_name: req.guest_name.trim().to_string(),
                    guest_email: req.guest_email.clone(),
                    guest_phone: req.guest_phone.clone(),
                    currency: req.currency.to_ascii_uppercase(),
                    expected_total: req.expected_total,
                    final_total: quote.total,
                },
            )
            .await?;

        let stay_range = StayRange::new(req.check_in, req.check_out);
        let expires_at = Utc::now() + self.config.hold_delta()?;

        let mut locks = Vec::with_capacity(req.rooms.len());
        for room in &req.rooms {
            self.store
                .create_booking_room(
                    tx,
                    &NewBookingRoom {
                        booking_id: booking.id,
                        room_id: room.room_id,
                        adults: room.adults,
                        children: room.children,
                        price_per_night: room.price_per_night,
                    },
                )
                .await?;

            locks.push(NewRoomLock {
                room_id: room.room_id,
                booking_id: booking.id,
                stay_range,
                expires_at,
            });
        }
        self.locks.create_locks(tx, booking.id, &locks).await?;

        Ok(booking)
    }

    async fn verify_catalog_prices(&self, req: &CreateBookingRequest) -> CoreResult<()> {
        let Some(catalog) = &self.catalog else {
            return Err(CoreError::InternalServer(
                "catalog price verification enabled without a catalog".to_string(),
            ));
        };

        for room in &req.rooms {
            let listed = catalog.get_room_price(room.room_id).await?;
            if listed != room.price_per_night {
                return Err(CoreError::PriceChanged {
                    expected: room.price_per_night,
                    computed: listed,
                });
            }
        }
        Ok(())
    }
}

async fn rollback<T: Transaction>(tx: T, cause: &CoreError) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, cause = %cause, "rollback failed; transaction discarded on drop");
    }
}
