use super::NotificationSink;
use crate::alert::{AlertTransition, TransitionKind};
use crate::error::DeliveryError;
use async_trait::async_trait;
use tracing::info;

/// Sink that only writes transitions to the log. Used when no webhook is
/// configured.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, transition: &AlertTransition) -> Result<(), DeliveryError> {
        let alert = &transition.alert;
        match transition.kind {
            TransitionKind::Resolved => info!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                subject = %alert.subject,
                "[RESOLVED] {}",
                alert.message
            ),
            _ => info!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                subject = %alert.subject,
                "[{}] {}",
                alert.level,
                alert.message
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
