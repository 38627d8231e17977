pub mod models;
pub mod guard;
pub mod room_lock;
pub mod coordinator;
pub mod lifecycle;
pub mod reaper;
pub mod service;

pub use models::{CoordinatorConfig, CreateBookingRequest, RoomRequest};
pub use room_lock::RoomLockStore;
pub use coordinator::ReservationCoordinator;
pub use lifecycle::BookingLifecycle;
pub use reaper::{HoldReaper, SweepReport};
pub use service::{BookingEngine, BookingService};
