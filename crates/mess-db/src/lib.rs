//! Mess DB - Database abstractions
//!
//! SQLx-based storage layer for the mess services.
//!
//! # Example
//!
//! ```rust,ignore
//! use mess_db::{create_pool, Repositories};
//!
//! let pool = create_pool("postgres://localhost/mess").await?;
//! mess_db::run_migrations(&pool).await?;
//! let repos = Repositories::new(pool);
//!
//! let coupon = repos.coupons.find_by_code("CPN1704067200000A1B2C3D4E5F6").await?;
//! ```

pub mod error;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
