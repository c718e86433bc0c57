use crate::adapters::http::truncate_body;
use crate::config::toml_config::WebhookConfig;
use crate::domain::model::RunReport;
use crate::domain::ports::ReportSink;
use crate::utils::error::{CensusError, Result};
use std::time::Duration;

/// Posts the run report to a Coda automation webhook.
pub struct CodaWebhook {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl CodaWebhook {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        config: &WebhookConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            token: token.into(),
        })
    }
}

impl ReportSink for CodaWebhook {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(report)
            .send()
            .await
            .map_err(|e| CensusError::WebhookDeliveryError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Webhook accepted report {} ({})", report.metadata.run_id, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(CensusError::WebhookDeliveryError {
            message: format!("HTTP {}: {}", status, truncate_body(&body)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CensusReport, FeedStats, RunMetadata, RunMode};
    use httpmock::prelude::*;

    fn report() -> RunReport {
        RunReport {
            metadata: RunMetadata::generate(),
            recency_days: 7,
            mode: RunMode::Test,
            feed: FeedStats::default(),
            report: CensusReport::default(),
            counts: vec![],
            tagging_results: None,
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_json_with_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/webhook")
                    .header("authorization", "Bearer coda-token")
                    .header("content-type", "application/json")
                    .body_contains("\"recency_days\":7")
                    .body_contains("\"mode\":\"test\"");
                then.status(202);
            })
            .await;

        let sink = CodaWebhook::new(server.url("/webhook"), "coda-token", &WebhookConfig::default())
            .unwrap();
        sink.deliver(&report()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_webhook_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/webhook");
                then.status(403).body("forbidden");
            })
            .await;

        let sink = CodaWebhook::new(server.url("/webhook"), "bad", &WebhookConfig::default())
            .unwrap();
        let err = sink.deliver(&report()).await.unwrap_err();

        match err {
            CensusError::WebhookDeliveryError { message } => {
                assert!(message.contains("403"));
                assert!(message.contains("forbidden"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
