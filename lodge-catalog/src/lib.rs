pub mod pricing;
pub mod rooms;

pub use pricing::{nights, PriceReconciler, Quote, PRICE_TOLERANCE};
pub use rooms::InMemoryRoomCatalog;
