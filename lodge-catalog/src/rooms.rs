use async_trait::async_trait;
use lodge_core::{CoreError, CoreResult, RoomCatalog};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory nightly price list, for local runs and tests.
#[derive(Default)]
pub struct InMemoryRoomCatalog {
    prices: RwLock<HashMap<Uuid, Decimal>>,
}

impl InMemoryRoomCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, room_id: Uuid, price_per_night: Decimal) {
        self.prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(room_id, price_per_night);
    }
}

#[async_trait]
impl RoomCatalog for InMemoryRoomCatalog {
    async fn get_room_price(&self, room_id: Uuid) -> CoreResult<Decimal> {
        self.prices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&room_id)
            .copied()
            .ok_or_else(|| CoreError::Validation(format!("room {} not found in catalog", room_id)))
    }
}
