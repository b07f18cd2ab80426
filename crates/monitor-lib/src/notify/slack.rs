//! Slack incoming-webhook sink

use super::NotificationSink;
use crate::alert::{AlertTransition, TransitionKind};
use crate::config::SlackSettings;
use crate::error::DeliveryError;
use crate::models::AlertLevel;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
    pub attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackAttachment {
    pub color: String,
    pub title: String,
    pub text: String,
    pub fields: Vec<SlackField>,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl SlackPayload {
    pub fn from_transition(transition: &AlertTransition, channel: &str, username: &str) -> Self {
        let alert = &transition.alert;
        let (color, prefix) = match (transition.kind, alert.level) {
            (TransitionKind::Resolved, _) => ("good", ":white_check_mark: [RESOLVED]"),
            (_, AlertLevel::Critical) => ("danger", ":red_circle: [CRITICAL]"),
            (_, AlertLevel::Warning) => ("warning", ":warning: [WARNING]"),
        };

        let mut fields = vec![SlackField {
            title: "subject".to_string(),
            value: alert.subject.to_string(),
            short: true,
        }];
        fields.extend(alert.details.iter().map(|(key, value)| SlackField {
            title: key.clone(),
            value: value.to_string(),
            short: true,
        }));

        Self {
            channel: channel.to_string(),
            username: username.to_string(),
            icon_emoji: ":robot_face:".to_string(),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                title: format!("{} {}", prefix, alert.alert_type),
                text: alert.message.clone(),
                fields,
                ts: transition.at.timestamp().to_string(),
            }],
        }
    }
}

pub struct SlackSink {
    client: Client,
    webhook_url: String,
    channel: String,
    username: String,
}

impl SlackSink {
    pub fn new(settings: &SlackSettings, timeout: Duration) -> Result<Self> {
        if !settings.is_configured() {
            anyhow::bail!("Slack webhook URL is not configured");
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            webhook_url: settings.webhook_url.clone(),
            channel: settings.channel.clone(),
            username: settings.username.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for SlackSink {
    async fn send(&self, transition: &AlertTransition) -> Result<(), DeliveryError> {
        let payload = SlackPayload::from_transition(transition, &self.channel, &self.username);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(alert_id = %transition.alert.id, "Slack notification sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}
