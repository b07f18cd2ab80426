//! Alert notification delivery
//!
//! The dispatcher receives committed alert transitions from the monitor
//! pipeline, applies the suppression policy and hands what is left to a
//! `NotificationSink`. Delivery is best-effort: failures are logged and
//! counted and never feed back into alert state.

mod dispatcher;
mod log_sink;
mod slack;

pub use dispatcher::{Dispatcher, NotificationPolicy, SuppressReason};
pub use log_sink::LogSink;
pub use slack::{SlackPayload, SlackSink};

use crate::alert::AlertTransition;
use crate::error::DeliveryError;
use async_trait::async_trait;

/// External delivery target for alert transitions
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, transition: &AlertTransition) -> Result<(), DeliveryError>;

    /// Sink name used in logs
    fn name(&self) -> &str;
}
