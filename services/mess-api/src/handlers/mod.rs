//! REST API handlers

pub mod attendance;
pub mod coupon;
pub mod health;
pub mod plans;
pub mod shared;
pub mod subscription;

pub use attendance::*;
pub use coupon::*;
pub use health::*;
pub use plans::*;
pub use subscription::*;
