pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod memory_repo;
pub mod redis_repo;

pub use booking_repo::{PgReservationStore, PgTransaction};
pub use catalog_repo::PgRoomCatalog;
pub use database::DbClient;
pub use memory_repo::{FaultPoint, MemoryReservationStore, MemoryTransaction};
pub use redis_repo::RedisClient;
