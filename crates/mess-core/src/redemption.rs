//! Redemption at a staff terminal
//!
//! Resolves the presented coupon, runs the validity checks, then has the
//! ledger consume it: the status flip, counter bump and attendance append
//! commit as one transaction. The coupon flip is a compare-and-swap, so of
//! two terminals scanning the same coupon exactly one succeeds.

use std::sync::Arc;

use serde::Serialize;

use mess_types::{
    Coupon, CouponInput, MealAttendance, MealType, Principal, SubscriptionStatus,
    SubscriptionSummary, UserId,
};

use crate::clock::Clock;
use crate::journal::AttendanceJournal;
use crate::ledger::{ConsumedCoupon, CouponLedger};
use crate::manager::SubscriptionManager;
use crate::metrics::{self, Operation, OperationTimer};
use crate::{MessError, MessResult};

/// What the terminal submitted
#[derive(Debug, Clone)]
pub struct RedemptionRequest {
    pub input: CouponInput,
    pub meal_type: MealType,
    pub location: Option<String>,
}

impl RedemptionRequest {
    /// Redeem by bare code
    pub fn by_code(code: impl Into<String>, meal_type: MealType) -> Self {
        Self {
            input: CouponInput::Code(code.into()),
            meal_type,
            location: None,
        }
    }

    /// Redeem from raw scanner output (bare code or QR JSON)
    pub fn from_scan(raw: &str, meal_type: MealType) -> MessResult<Self> {
        Ok(Self {
            input: CouponInput::from_scan(raw)?,
            meal_type,
            location: None,
        })
    }

    /// Set the mess location
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Student the coupon belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Successful redemption
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionReceipt {
    pub coupon: Coupon,
    pub student: StudentRef,
    pub subscription: SubscriptionSummary,
    pub attendance: MealAttendance,
}

/// Redemption service
pub struct RedemptionService {
    ledger: Arc<CouponLedger>,
    manager: Arc<SubscriptionManager>,
    journal: Arc<AttendanceJournal>,
    clock: Arc<dyn Clock>,
}

impl RedemptionService {
    /// Create a new redemption service
    pub fn new(
        ledger: Arc<CouponLedger>,
        manager: Arc<SubscriptionManager>,
        journal: Arc<AttendanceJournal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            manager,
            journal,
            clock,
        }
    }

    /// Redeem one coupon for one meal
    pub async fn redeem(
        &self,
        staff: &Principal,
        request: RedemptionRequest,
    ) -> MessResult<RedemptionReceipt> {
        if !staff.is_staff_or_admin() {
            return Err(MessError::Forbidden);
        }

        let timer = OperationTimer::start(Operation::Redeem);
        let result = self.redeem_inner(staff, request).await;
        timer.finish(&result);

        match &result {
            Ok(_) => metrics::record_redeemed(),
            Err(e) if e.is_rejection() => {
                tracing::info!(code = e.error_code(), reason = %e, "Redemption rejected");
                metrics::record_rejected(e.error_code());
            }
            Err(_) => {}
        }

        result
    }

    async fn redeem_inner(
        &self,
        staff: &Principal,
        request: RedemptionRequest,
    ) -> MessResult<RedemptionReceipt> {
        let mut coupon = self.ledger.lookup(request.input.code()).await?;

        let student_id = match &request.input {
            CouponInput::Qr(payload) => {
                if !payload.matches(&coupon) {
                    return Err(MessError::InvalidPayload(
                        "QR payload does not match the coupon".to_string(),
                    ));
                }
                payload.student_id.clone()
            }
            CouponInput::Code(_) => None,
        };

        let validity = self.ledger.check_validity(&mut coupon).await?;
        if !validity.is_valid() {
            return Err(MessError::InvalidCoupon(validity.reason().to_string()));
        }

        if let Some(bound) = coupon.meal_type {
            if bound != request.meal_type {
                return Err(MessError::InvalidCoupon(format!(
                    "coupon is only valid for {}",
                    bound.as_str()
                )));
            }
        }

        let subscription = self.manager.load_current(coupon.subscription_id).await?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(MessError::SubscriptionInactive);
        }

        let now = self.clock.now();
        let attendance = self.journal.entry_for(
            &coupon,
            request.meal_type,
            staff.user_id,
            request.location.as_deref(),
            now,
        );

        let ConsumedCoupon {
            coupon,
            subscription,
            attendance,
        } = self.ledger.mark_used(&coupon, attendance).await?;

        tracing::info!(
            coupon_id = %coupon.id,
            subscription_id = %subscription.id,
            staff_id = %staff.user_id,
            meal_type = request.meal_type.as_str(),
            remaining = subscription.remaining_coupons,
            "Coupon redeemed"
        );
        Ok(RedemptionReceipt {
            student: StudentRef {
                user_id: coupon.user_id,
                student_id,
            },
            subscription: subscription.summary(),
            coupon,
            attendance,
        })
    }
}
