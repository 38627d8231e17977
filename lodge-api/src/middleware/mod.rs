pub mod auth;

pub use auth::{Caller, Claims, ADMIN_ROLE};
