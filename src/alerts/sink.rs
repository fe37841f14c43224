//! Delivery of alert batches to Alertmanager

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::registry::RegistryAlert;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alerts: &[RegistryAlert]) -> Result<()>;
}

/// Pushes alerts to the Alertmanager v2 API
#[derive(Debug, Clone)]
pub struct AlertmanagerSink {
    client: Client,
    url: String,
}

impl AlertmanagerSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Alertmanager client")?;

        Ok(Self {
            client,
            url: format!("{}/api/v2/alerts", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AlertSink for AlertmanagerSink {
    #[instrument(skip_all, fields(alerts = alerts.len()))]
    async fn send(&self, alerts: &[RegistryAlert]) -> Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(&self.url)
            .json(alerts)
            .send()
            .await
            .with_context(|| format!("failed to send alerts to {}", self.url))?;

        if !response.status().is_success() {
            bail!("Alertmanager responded with status {}", response.status());
        }

        debug!("alerts sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> RegistryAlert {
        RegistryAlert {
            labels: HashMap::from([("alertname".to_string(), "check".to_string())]),
            annotations: HashMap::new(),
            ends_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_send_alerts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = AlertmanagerSink::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        sink.send(&[alert()]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body[0]["labels"]["alertname"], "check");
        assert_eq!(body[0]["endsAt"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sink = AlertmanagerSink::new(&server.uri(), Duration::from_secs(5)).unwrap();
        sink.send(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = AlertmanagerSink::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert!(sink.send(&[alert()]).await.is_err());
    }
}
