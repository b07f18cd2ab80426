//! Self-hosted runner registry source backed by the GitHub REST API

use super::{async_trait, HealthSource};
use crate::clock::Clock;
use crate::config::GitHubSettings;
use crate::error::CollectionError;
use crate::models::{CollectorKind, GitHubRunnerStatus, Snapshot};
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("fleet-monitor/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RunnersResponse {
    runners: Vec<RunnerDto>,
}

#[derive(Debug, Deserialize)]
struct RunnerDto {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    busy: bool,
    #[serde(default)]
    labels: Vec<LabelDto>,
}

#[derive(Debug, Deserialize)]
struct LabelDto {
    name: String,
}

impl RunnerDto {
    fn into_status(self, timestamp: DateTime<Utc>) -> GitHubRunnerStatus {
        GitHubRunnerStatus {
            id: self.id,
            is_online: self.status.eq_ignore_ascii_case("online"),
            is_busy: self.busy,
            name: self.name,
            status: self.status,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            timestamp,
        }
    }
}

pub struct GitHubRunnerSource {
    client: Client,
    url: String,
    token: String,
    clock: Arc<dyn Clock>,
}

impl GitHubRunnerSource {
    /// `timeout` bounds each HTTP request
    pub fn new(settings: &GitHubSettings, timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if !settings.is_configured() {
            anyhow::bail!("GitHub token, owner and repo are required");
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: format!(
                "{}/repos/{}/{}/actions/runners",
                settings.api_base.trim_end_matches('/'),
                settings.owner,
                settings.repo
            ),
            token: settings.token.clone(),
            clock,
        })
    }
}

#[async_trait]
impl HealthSource for GitHubRunnerSource {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Runners
    }

    async fn poll(&self, timeout: Duration) -> Result<Snapshot, CollectionError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollectionError::Timeout(timeout)
                } else {
                    CollectionError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                return Err(CollectionError::Auth(format!("{}: {}", status, body.trim())));
            }
            s if !s.is_success() => {
                return Err(CollectionError::Unreachable(format!(
                    "runner registry returned {}",
                    s
                )));
            }
            _ => {}
        }

        let body: RunnersResponse = response
            .json()
            .await
            .map_err(|e| CollectionError::Malformed(e.to_string()))?;

        let now = self.clock.now();
        let runners: Vec<GitHubRunnerStatus> = body
            .runners
            .into_iter()
            .map(|r| r.into_status(now))
            .collect();

        debug!(
            runners = runners.len(),
            online = runners.iter().filter(|r| r.is_online).count(),
            "GitHub runners check"
        );
        Ok(Snapshot::Runners(runners))
    }
}
