use async_trait::async_trait;
use lodge_core::{CoreError, CoreResult, RoomCatalog};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Reads nightly prices from the hotel catalog's `room` table.
pub struct PgRoomCatalog {
    pool: PgPool,
}

impl PgRoomCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomCatalog for PgRoomCatalog {
    async fn get_room_price(&self, room_id: Uuid) -> CoreResult<Decimal> {
        let price: Option<Decimal> = sqlx::query_scalar("SELECT price FROM room WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %room_id, "room price lookup failed");
                CoreError::InternalServer(e.to_string())
            })?;

        price.ok_or_else(|| CoreError::Validation(format!("room {} not found in catalog", room_id)))
    }
}
