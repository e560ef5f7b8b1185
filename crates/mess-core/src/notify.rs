//! Notification seam
//!
//! The engine hands events to a [`Notifier`] and moves on. Delivery failures
//! are logged here and never reach the caller.

use async_trait::async_trait;
use thiserror::Error;

use mess_types::MessEvent;

/// Delivery failure reported by a notifier
#[derive(Error, Debug)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receiver of lifecycle events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &MessEvent) -> Result<(), NotifyError>;
}

/// Notifier that writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &MessEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event).map_err(|e| NotifyError(e.to_string()))?;
        tracing::info!(
            kind = event.kind(),
            user_id = %event.user_id(),
            payload = %payload,
            "Notification emitted"
        );
        Ok(())
    }
}

/// Hand an event to the notifier, logging delivery failures
pub(crate) async fn emit(notifier: &dyn Notifier, event: MessEvent) {
    if let Err(e) = notifier.notify(&event).await {
        tracing::warn!(kind = event.kind(), error = %e, "Failed to deliver notification");
    }
}
