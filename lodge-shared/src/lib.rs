pub mod models;
pub mod pii;

pub use models::booking::{Booking, BookingFilter, BookingPage, BookingStatus, GuestInfoUpdate, NewBooking};
pub use models::booking_room::{BookingRoom, BookingRoomWithLock, NewBookingRoom};
pub use models::room_lock::{NewRoomLock, RoomLock, StayRange};
