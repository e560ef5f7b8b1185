//! Engine metrics
//!
//! Recorded through the `metrics` facade; the service installs a Prometheus
//! recorder. Without a recorder every call is a no-op.
//!
//! # Metrics
//!
//! - `mess_coupons_redeemed_total` - Counter of successful redemptions
//! - `mess_redemptions_rejected_total` - Counter of rejected redemptions by error code
//! - `mess_subscriptions_created_total` - Counter of subscriptions created with coupons
//! - `mess_subscriptions_cancelled_total` - Counter of cancellations
//! - `mess_operation_duration_seconds` - Histogram of engine operation latency

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric name for successful redemptions.
pub const COUPONS_REDEEMED_TOTAL: &str = "mess_coupons_redeemed_total";

/// Metric name for rejected redemptions.
pub const REDEMPTIONS_REJECTED_TOTAL: &str = "mess_redemptions_rejected_total";

/// Metric name for created subscriptions.
pub const SUBSCRIPTIONS_CREATED_TOTAL: &str = "mess_subscriptions_created_total";

/// Metric name for cancelled subscriptions.
pub const SUBSCRIPTIONS_CANCELLED_TOTAL: &str = "mess_subscriptions_cancelled_total";

/// Metric name for operation latency.
pub const OPERATION_DURATION_SECONDS: &str = "mess_operation_duration_seconds";

/// Timed engine operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateSubscription,
    CancelSubscription,
    Redeem,
}

impl Operation {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSubscription => "create_subscription",
            Self::CancelSubscription => "cancel_subscription",
            Self::Redeem => "redeem",
        }
    }
}

pub fn record_redeemed() {
    counter!(COUPONS_REDEEMED_TOTAL).increment(1);
}

/// Record a rejected redemption under its error code
pub fn record_rejected(code: &'static str) {
    counter!(REDEMPTIONS_REJECTED_TOTAL, "code" => code).increment(1);
}

pub fn record_subscription_created() {
    counter!(SUBSCRIPTIONS_CREATED_TOTAL).increment(1);
}

pub fn record_subscription_cancelled() {
    counter!(SUBSCRIPTIONS_CANCELLED_TOTAL).increment(1);
}

/// Timer for one engine operation.
///
/// Dropping it without calling [`finish`](Self::finish) records the
/// operation as an error.
#[must_use]
pub struct OperationTimer {
    operation: Operation,
    start: Instant,
    recorded: bool,
}

impl OperationTimer {
    /// Start timing an operation
    pub fn start(operation: Operation) -> Self {
        Self {
            operation,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Record the duration with the result of `outcome`
    pub fn finish<T, E>(mut self, outcome: &Result<T, E>) {
        let result = if outcome.is_ok() { "ok" } else { "error" };
        self.record(result);
    }

    fn record(&mut self, result: &'static str) {
        histogram!(
            OPERATION_DURATION_SECONDS,
            "operation" => self.operation.as_str(),
            "result" => result
        )
        .record(self.start.elapsed().as_secs_f64());
        self.recorded = true;
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !self.recorded {
            self.record("error");
        }
    }
}

/// Describe all metrics for registration with a recorder.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(
        COUPONS_REDEEMED_TOTAL,
        Unit::Count,
        "Coupons successfully redeemed at a terminal"
    );

    describe_counter!(
        REDEMPTIONS_REJECTED_TOTAL,
        Unit::Count,
        "Redemption attempts rejected, labelled by error code"
    );

    describe_counter!(
        SUBSCRIPTIONS_CREATED_TOTAL,
        Unit::Count,
        "Subscriptions created together with their coupons"
    );

    describe_counter!(
        SUBSCRIPTIONS_CANCELLED_TOTAL,
        Unit::Count,
        "Subscriptions cancelled"
    );

    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of lifecycle engine operations"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Redeem.as_str(), "redeem");
        assert_eq!(Operation::CreateSubscription.as_str(), "create_subscription");
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_redeemed();
        record_rejected("INVALID_COUPON");
        record_subscription_created();
        record_subscription_cancelled();
        OperationTimer::start(Operation::Redeem).finish(&Ok::<(), ()>(()));
        let _dropped = OperationTimer::start(Operation::CancelSubscription);
        describe_metrics();
    }
}
