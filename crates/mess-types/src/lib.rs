//! Mess Types - Shared domain types
//!
//! This crate contains domain types used across the mess services:
//! - User identity and roles
//! - Subscription plans and subscriptions
//! - Coupons, QR payloads and attendance records
//! - Notification events

pub mod attendance;
pub mod code;
pub mod coupon;
pub mod error;
pub mod event;
pub mod plan;
pub mod qr;
pub mod subscription;
pub mod user;

pub use attendance::*;
pub use code::*;
pub use coupon::*;
pub use error::*;
pub use event::*;
pub use plan::*;
pub use qr::*;
pub use subscription::*;
pub use user::*;
