use async_trait::async_trait;
use lodge_core::{CoreError, CoreResult, ReservationStore, RoomCatalog};
use lodge_shared::{
    Booking, BookingFilter, BookingPage, BookingRoomWithLock, BookingStatus, GuestInfoUpdate,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::coordinator::ReservationCoordinator;
use crate::lifecycle::BookingLifecycle;
use crate::models::{validate_guest_name, CoordinatorConfig, CreateBookingRequest};

pub const MAX_PAGE_SIZE: u64 = 100;

/// Everything the transport layer can ask of the booking engine.
#[async_trait]
pub trait BookingEngine: Send + Sync {
    async fn create_booking(
        &self,
        req: CreateBookingRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<Booking>;

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
        cancel: &CancellationToken,
    ) -> CoreResult<Booking>;

    async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Booking>;

    /// `page` starts at 1.
    async fn list_bookings(&self, filter: &BookingFilter, page: u64, limit: u64) -> CoreResult<BookingPage>;

    async fn get_booking_rooms(&self, booking_id: Uuid) -> CoreResult<Vec<BookingRoomWithLock>>;

    async fn update_guest_info(&self, booking_id: Uuid, update: GuestInfoUpdate) -> CoreResult<Booking>;

    async fn delete_booking(&self, booking_id: Uuid) -> CoreResult<()>;
}

pub struct BookingService<S> {
    store: Arc<S>,
    coordinator: ReservationCoordinator<S>,
    lifecycle: Arc<BookingLifecycle<S>>,
}

impl<S: ReservationStore> BookingService<S> {
    pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self {
            lifecycle: Arc::new(BookingLifecycle::new(Arc::clone(&store), config.operation_timeout)),
            coordinator: ReservationCoordinator::new(Arc::clone(&store), config),
            store,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn RoomCatalog>) -> Self {
        self.coordinator = self.coordinator.with_catalog(catalog);
        self
    }

    pub fn lifecycle(&self) -> Arc<BookingLifecycle<S>> {
        Arc::clone(&self.lifecycle)
    }
}

#[async_trait]
impl<S: ReservationStore + 'static> BookingEngine for BookingService<S> {
    async fn create_booking(
        &self,
        req: CreateBookingRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<Booking> {
        self.coordinator.create_booking(req, cancel).await
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
        cancel: &CancellationToken,
    ) -> CoreResult<Booking> {
        self.lifecycle.transition(booking_id, status, cancel).await
    }

    async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.store.get_booking(booking_id).await
    }

    async fn list_bookings(&self, filter: &BookingFilter, page: u64, limit: u64) -> CoreResult<BookingPage> {
        if page == 0 {
            return Err(CoreError::Validation("page starts at 1".to_string()));
        }
        if limit == 0 {
            return Err(CoreError::Validation("limit must be positive".to_string()));
        }
        let limit = limit.min(MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(limit);

        self.store.list_bookings(filter, limit, offset).await
    }

    async fn get_booking_rooms(&self, booking_id: Uuid) -> CoreResult<Vec<BookingRoomWithLock>> {
        // Distinguish "no such booking" from "booking without rooms"
        self.store.get_booking(booking_id).await?;
        self.store.get_booking_rooms(booking_id).await
    }

    async fn update_guest_info(&self, booking_id: Uuid, update: GuestInfoUpdate) -> CoreResult<Booking> {
        validate_guest_name(&update.guest_name)?;
        let update = GuestInfoUpdate {
            guest_name: update.guest_name.trim().to_string(),
            ..update
        };

        self.store.update_guest_info(booking_id, &update).await?;
        info!(booking_id = %booking_id, "guest info updated");
        self.store.get_booking(booking_id).await
    }

    async fn delete_booking(&self, booking_id: Uuid) -> CoreResult<()> {
        self.store.delete_booking(booking_id).await?;
        info!(booking_id = %booking_id, "booking deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomRequest;
    use chrono::NaiveDate;
    use lodge_shared::pii::Masked;
    use lodge_store::MemoryReservationStore;
    use rust_decimal::Decimal;

    fn request(user_id: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            user_id,
            hotel_id: Uuid::new_v4(),
            check_in: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 2, 12).unwrap(),
            guest_name: "Ada".to_string(),
            guest_email: None,
            guest_phone: None,
            currency: "GBP".to_string(),
            expected_total: None,
            rooms: vec![RoomRequest {
                room_id: Uuid::new_v4(),
                adults: 1,
                children: 1,
                price_per_night: Decimal::new(8000, 2),
            }],
        }
    }

    fn service() -> BookingService<MemoryReservationStore> {
        BookingService::new(Arc::new(MemoryReservationStore::new()), CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn test_list_bookings_pages_and_filters() {
        let svc = service();
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            svc.create_booking(request(1), &cancel).await.unwrap();
        }
        svc.create_booking(request(2), &cancel).await.unwrap();

        let filter = BookingFilter {
            user_id: Some(1),
            ..BookingFilter::default()
        };
        let first = svc.list_bookings(&filter, 1, 2).await.unwrap();
        assert_eq!(first.total_count, 3);
        assert_eq!(first.bookings.len(), 2);

        let second = svc.list_bookings(&filter, 2, 2).await.unwrap();
        assert_eq!(second.bookings.len(), 1);

        assert!(matches!(svc.list_bookings(&filter, 0, 2).await, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_guest_info_update() {
        let svc = service();
        let booking = svc.create_booking(request(1), &CancellationToken::new()).await.unwrap();

        let updated = svc
            .update_guest_info(
                booking.id,
                GuestInfoUpdate {
                    guest_name: " Grace Hopper ".to_string(),
                    guest_email: Some(Masked("grace@example.com".to_string())),
                    guest_phone: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.guest_name, "Grace Hopper");
        assert_eq!(updated.final_total, booking.final_total);

        let err = svc
            .update_guest_info(
                booking.id,
                GuestInfoUpdate {
                    guest_name: "".to_string(),
                    guest_email: None,
                    guest_phone: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rooms_and_delete() {
        let svc = service();
        let booking = svc.create_booking(request(1), &CancellationToken::new()).await.unwrap();

        let rooms = svc.get_booking_rooms(booking.id).await.unwrap();
        assert_eq!(rooms.len(), 1);
        let lock = rooms[0].lock.as_ref().unwrap();
        assert!(lock.is_active);
        assert_eq!(lock.stay_range.start, booking.check_in);

        svc.delete_booking(booking.id).await.unwrap();
        assert_eq!(svc.get_booking(booking.id).await, Err(CoreError::BookingNotFound(booking.id)));
        assert_eq!(
            svc.get_booking_rooms(booking.id).await,
            Err(CoreError::BookingNotFound(booking.id))
        );
        assert_eq!(svc.delete_booking(booking.id).await, Err(CoreError::BookingNotFound(booking.id)));
    }
}
