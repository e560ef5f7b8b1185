//! Engine wiring

use std::sync::Arc;

use mess_db::{
    AttendanceRepository, CouponRepository, PlanRepository, RedemptionRepository, Repositories,
    SubscriptionRepository,
};

use crate::catalog::PlanCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::journal::AttendanceJournal;
use crate::ledger::CouponLedger;
use crate::manager::SubscriptionManager;
use crate::notify::{Notifier, TracingNotifier};
use crate::redemption::RedemptionService;

/// Storage the engine runs against
#[derive(Clone)]
pub struct Stores {
    pub plans: Arc<dyn PlanRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub attendance: Arc<dyn AttendanceRepository>,
    pub redemptions: Arc<dyn RedemptionRepository>,
}

impl From<Repositories> for Stores {
    fn from(repos: Repositories) -> Self {
        Self {
            plans: Arc::new(repos.plans),
            subscriptions: Arc::new(repos.subscriptions),
            coupons: Arc::new(repos.coupons),
            attendance: Arc::new(repos.attendance),
            redemptions: Arc::new(repos.redemptions),
        }
    }
}

/// All engine components, sharing one set of stores
#[derive(Clone)]
pub struct MessEngine {
    pub catalog: Arc<PlanCatalog>,
    pub ledger: Arc<CouponLedger>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub redemptions: Arc<RedemptionService>,
    pub journal: Arc<AttendanceJournal>,
}

impl MessEngine {
    /// Wire the engine
    pub fn new(
        stores: Stores,
        config: LedgerConfig,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let catalog = Arc::new(PlanCatalog::new(stores.plans));
        let ledger = Arc::new(CouponLedger::new(
            stores.coupons,
            Arc::clone(&stores.attendance),
            stores.redemptions,
            Arc::clone(&clock),
            config.clone(),
        ));
        let journal = Arc::new(AttendanceJournal::new(stores.attendance, config));
        let subscriptions = Arc::new(SubscriptionManager::new(
            stores.subscriptions,
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            notifier,
            Arc::clone(&clock),
        ));
        let redemptions = Arc::new(RedemptionService::new(
            Arc::clone(&ledger),
            Arc::clone(&subscriptions),
            Arc::clone(&journal),
            clock,
        ));

        Self {
            catalog,
            ledger,
            subscriptions,
            redemptions,
            journal,
        }
    }

    /// Wire the engine over PostgreSQL with the wall clock and log notifier
    pub fn from_repositories(repos: Repositories, config: LedgerConfig) -> Self {
        Self::new(
            repos.into(),
            config,
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
        )
    }
}
