//! PostgreSQL repository implementations

mod attendance;
mod coupon;
mod plan;
mod redemption;
mod subscription;

pub use attendance::PgAttendanceRepository;
pub use coupon::PgCouponRepository;
pub use plan::PgPlanRepository;
pub use redemption::PgRedemptionRepository;
pub use subscription::PgSubscriptionRepository;

use mess_types::MessTypeError;

use crate::error::DbResult;
use crate::DbPool;

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub plans: PgPlanRepository,
    pub subscriptions: PgSubscriptionRepository,
    pub coupons: PgCouponRepository,
    pub attendance: PgAttendanceRepository,
    pub redemptions: PgRedemptionRepository,
}

impl Repositories {
    /// Create all repositories from a database pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            plans: PgPlanRepository::new(pool.clone()),
            subscriptions: PgSubscriptionRepository::new(pool.clone()),
            coupons: PgCouponRepository::new(pool.clone()),
            attendance: PgAttendanceRepository::new(pool.clone()),
            redemptions: PgRedemptionRepository::new(pool),
        }
    }
}

/// Convert fetched rows into domain values
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> DbResult<Vec<T>>
where
    T: TryFrom<R, Error = MessTypeError>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(Into::into))
        .collect()
}

/// Convert an optional fetched row into a domain value
pub(crate) fn convert_opt<R, T>(row: Option<R>) -> DbResult<Option<T>>
where
    T: TryFrom<R, Error = MessTypeError>,
{
    row.map(T::try_from).transpose().map_err(Into::into)
}
