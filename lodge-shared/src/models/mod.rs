pub mod booking;
pub mod booking_room;
pub mod room_lock;
