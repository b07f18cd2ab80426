//! API client for the fleet monitor query surface

use anyhow::{Context, Result};
use monitor_lib::models::{Alert, AlertLevel, AlertType};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

/// API client for the fleet monitor daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a POST request without a body, expecting no content back
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response).await?;
        Ok(())
    }

    /// List open alerts with the server-side filter applied
    pub async fn list_alerts(
        &self,
        level: Option<AlertLevel>,
        alert_type: Option<AlertType>,
        acknowledged_only: bool,
    ) -> Result<Vec<Alert>> {
        let mut url = self.base_url.join("api/v1/alerts").context("Invalid path")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(level) = level {
                query.append_pair("level", level.as_str());
            }
            if let Some(alert_type) = alert_type {
                query.append_pair("type", alert_type.as_str());
            }
            if acknowledged_only {
                query.append_pair("acknowledged_only", "true");
            }
        }

        let path = match url.query() {
            Some(q) if !q.is_empty() => format!("api/v1/alerts?{}", q),
            _ => "api/v1/alerts".to_string(),
        };
        self.get(&path).await
    }

    pub async fn acknowledge(&self, id: &str) -> Result<()> {
        self.post_empty(&format!("api/v1/alerts/{}/acknowledge", id))
            .await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    anyhow::bail!("API error ({}): {}", status, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::models::SystemHealth;

    const HEALTH_BODY: &str = r#"{
        "system": null,
        "docker": null,
        "runners": [],
        "recent_alerts": [],
        "checks": [],
        "overall_status": "UNKNOWN",
        "timestamp": "2024-01-01T00:00:00Z"
    }"#;

    const ALERTS_BODY: &str = r#"[{
        "id": "abc123",
        "type": "CPU_HIGH",
        "subject": {"kind": "host"},
        "level": "CRITICAL",
        "message": "CPU usage at 97.0%",
        "details": {"cpuUsage": 0.97},
        "raised_at": "2024-01-01T00:00:00Z",
        "timestamp": "2024-01-01T00:00:30Z",
        "acknowledged": false
    }]"#;

    #[tokio::test]
    async fn test_get_health() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(HEALTH_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health: SystemHealth = client.get("api/v1/health").await.unwrap();

        mock.assert_async().await;
        assert!(health.system.is_none());
        assert!(health.runners.is_empty());
    }

    #[tokio::test]
    async fn test_list_alerts_sends_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/alerts")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("level".into(), "CRITICAL".into()),
                mockito::Matcher::UrlEncoded("type".into(), "CPU_HIGH".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ALERTS_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let alerts = client
            .list_alerts(Some(AlertLevel::Critical), Some(AlertType::CpuHigh), false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "abc123");
        assert_eq!(alerts[0].alert_type, AlertType::CpuHigh);
    }

    #[tokio::test]
    async fn test_acknowledge_not_found_surfaces_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/alerts/missing/acknowledge")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "alert not found: missing"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.acknowledge("missing").await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("alert not found: missing"));
    }

    #[tokio::test]
    async fn test_acknowledge_accepts_no_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/alerts/abc123/acknowledge")
            .with_status(204)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        client.acknowledge("abc123").await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
