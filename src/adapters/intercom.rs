use crate::adapters::http::{retry_after, send_with_retry};
use crate::config::toml_config::CensusConfig;
use crate::core::window::RecencyWindow;
use crate::domain::model::TaggingResults;
use crate::domain::ports::ContactDirectory;
use crate::utils::error::{CensusError, Result};
use crate::utils::retry::RetryPolicy;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// Wait applied after a rate-limited tag batch when no `Retry-After` is sent.
const DEFAULT_TAG_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SearchRequest {
    query: SearchQuery,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
struct SearchQuery {
    operator: &'static str,
    value: Vec<SearchFilter>,
}

#[derive(Debug, Serialize)]
struct SearchFilter {
    field: &'static str,
    operator: &'static str,
    value: Value,
}

#[derive(Debug, Serialize)]
struct Pagination {
    per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    starting_after: Option<String>,
}

impl SearchRequest {
    /// Users with an email and external id, seen after `seen_after` (unix seconds).
    fn active_users(seen_after: i64, per_page: u32, starting_after: Option<String>) -> Self {
        let filter = |field, operator, value| SearchFilter {
            field,
            operator,
            value,
        };
        Self {
            query: SearchQuery {
                operator: "AND",
                value: vec![
                    filter("role", "=", Value::from("user")),
                    filter("email", "!=", Value::Null),
                    filter("external_id", "!=", Value::Null),
                    filter("last_seen_at", ">", Value::from(seen_after)),
                ],
            },
            pagination: Pagination {
                per_page,
                starting_after,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    pages: Option<Pages>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Pages {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    starting_after: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    name: &'a str,
    users: Vec<TagUser<'a>>,
}

#[derive(Debug, Serialize)]
struct TagUser<'a> {
    id: &'a str,
}

struct BatchFailure {
    reason: String,
    /// Set when the batch was rate limited.
    wait: Option<Duration>,
}

/// Contacts search and tagging against the Intercom REST API.
pub struct IntercomClient {
    client: Client,
    base_url: String,
    token: String,
    api_version: String,
    per_page: u32,
    retry: RetryPolicy,
    batch_size: usize,
    batch_delay: Duration,
}

impl IntercomClient {
    pub fn new(config: &CensusConfig, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.intercom.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.intercom.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            api_version: config.intercom.api_version.clone(),
            per_page: config.intercom.per_page,
            retry: config.retry.policy(),
            batch_size: config.tagging.batch_size.max(1),
            batch_delay: Duration::from_millis(config.tagging.batch_delay_ms),
        })
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Intercom-Version", self.api_version.as_str())
            .header(ACCEPT, "application/json")
            .json(body)
    }

    async fn search_page(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let response = send_with_retry("contacts search", &self.retry, || {
            self.post("contacts/search", request)
        })
        .await?;

        let page: SearchResponse = response.json().await?;
        if let Some(errors) = &page.errors {
            return Err(CensusError::UpstreamRejected {
                details: errors.to_string(),
            });
        }
        Ok(page)
    }

    /// One attempt per batch; failures are counted by the caller.
    async fn tag_batch(
        &self,
        tag_name: &str,
        batch: &[String],
    ) -> std::result::Result<(), BatchFailure> {
        let body = TagRequest {
            name: tag_name,
            users: batch.iter().map(|id| TagUser { id: id.as_str() }).collect(),
        };

        match self.post("tags", &body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status();
                let wait = (status == StatusCode::TOO_MANY_REQUESTS).then(|| {
                    self.retry
                        .clamp(retry_after(&response).unwrap_or(DEFAULT_TAG_RATE_LIMIT_WAIT))
                });
                Err(BatchFailure {
                    reason: format!("HTTP {}", status),
                    wait,
                })
            }
            Err(e) => Err(BatchFailure {
                reason: e.to_string(),
                wait: None,
            }),
        }
    }
}

#[async_trait::async_trait]
impl ContactDirectory for IntercomClient {
    async fn search_active(&self, window: &RecencyWindow) -> Result<Vec<Value>> {
        tracing::info!(
            "🔎 Querying contacts seen after {}",
            window.query_start.format("%Y-%m-%d %H:%M:%S UTC")
        );

        let mut records = Vec::new();
        let mut starting_after: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut page = 1;

        loop {
            let request = SearchRequest::active_users(
                window.query_start.timestamp(),
                self.per_page,
                starting_after.clone(),
            );
            let response = self.search_page(&request).await?;

            let fetched = response.data.len();
            records.extend(response.data);
            tracing::info!(
                "  - Page {}: fetched {} contacts (total so far: {})",
                page,
                fetched,
                records.len()
            );

            match response
                .pages
                .and_then(|pages| pages.next)
                .and_then(|next| next.starting_after)
            {
                Some(cursor) if !seen_cursors.insert(cursor.clone()) => {
                    tracing::warn!("Pagination cursor repeated, stopping at page {}", page);
                    break;
                }
                Some(cursor) => {
                    starting_after = Some(cursor);
                    page += 1;
                }
                None => break,
            }
        }

        Ok(records)
    }

    async fn tag_profiles(
        &self,
        tag_name: &str,
        profile_ids: &[String],
    ) -> Result<Option<TaggingResults>> {
        let mut results = TaggingResults {
            total_profiles_to_tag: profile_ids.len() as u64,
            ..TaggingResults::default()
        };

        if profile_ids.is_empty() {
            tracing::info!("No profiles to tag");
            return Ok(Some(results));
        }

        let batches: Vec<&[String]> = profile_ids.chunks(self.batch_size).collect();
        let total_batches = batches.len();
        tracing::info!(
            "🏷️  Tagging {} profiles with '{}' in {} batches",
            profile_ids.len(),
            tag_name,
            total_batches
        );

        for (index, batch) in batches.iter().enumerate() {
            match self.tag_batch(tag_name, batch).await {
                Ok(()) => {
                    results.successfully_tagged += batch.len() as u64;
                    tracing::info!(
                        "✓ Tagged batch {}/{}: {} profiles",
                        index + 1,
                        total_batches,
                        batch.len()
                    );
                }
                Err(failure) => {
                    results.failed_batches += 1;
                    tracing::warn!(
                        "✗ Failed batch {}/{}: {}",
                        index + 1,
                        total_batches,
                        failure.reason
                    );
                    if let Some(wait) = failure.wait {
                        tracing::warn!("  Rate limited, waiting {:?} before continuing", wait);
                        tokio::time::sleep(wait).await;
                    }
                }
            }

            if index + 1 < total_batches {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        tracing::info!(
            "Tagging complete: {} profiles tagged, {} batches failed",
            results.successfully_tagged,
            results.failed_batches
        );
        Ok(Some(results))
    }
}
