use crate::config::toml_config::CensusConfig;
use crate::core::classifier::classify;
use crate::core::window::RecencyWindow;
use crate::domain::model::{
    count_rows, Contact, FeedStats, RunMetadata, RunMode, RunReport, TaggingResults,
};
use crate::domain::ports::{ContactDirectory, ReportSink};
use crate::utils::error::{CensusError, Result};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub recency_days: u32,
    pub mode: RunMode,
    pub tag_profiles: bool,
}

/// Webhook failures never fail the run; they are reported here instead.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: CensusError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub delivery: DeliveryOutcome,
}

/// Drives one census run: fetch, classify, optionally tag, then deliver.
pub struct CensusEngine<D: ContactDirectory, K: ReportSink> {
    directory: D,
    sink: K,
    config: CensusConfig,
}

impl<D: ContactDirectory, K: ReportSink> CensusEngine<D, K> {
    pub fn new(directory: D, sink: K, config: CensusConfig) -> Self {
        Self {
            directory,
            sink,
            config,
        }
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        self.run_at(Utc::now(), request).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>, request: RunRequest) -> Result<RunOutcome> {
        let window = RecencyWindow::ending_at(now, request.recency_days);
        tracing::info!(
            "🚀 Starting census run: {} day(s), cutoff {}, mode {:?}",
            request.recency_days,
            window.cutoff.to_rfc3339(),
            request.mode
        );

        // Extract
        let records = self.directory.search_active(&window).await?;
        let (contacts, feed) = Self::parse_records(records, &window);
        tracing::info!(
            "📥 Fetched {} profiles ({} malformed, {} outside window)",
            feed.fetched_profiles,
            feed.malformed_records,
            feed.outside_window
        );

        // Transform
        let classification = classify(contacts, &self.config.classification);
        tracing::info!(
            "📊 Classified {} unique emails across {} profiles",
            classification.report.total_unique_emails,
            classification.report.total_profiles_in_window
        );

        let tagging_results = if request.tag_profiles {
            self.tag(&classification.only_a_profile_ids).await
        } else {
            None
        };

        let labels = self.config.classification.category_labels();
        let counts = count_rows(&classification.report, &labels);
        let report = RunReport {
            metadata: RunMetadata {
                run_id: uuid::Uuid::new_v4(),
                timestamp: now,
            },
            recency_days: request.recency_days,
            mode: request.mode,
            feed,
            report: classification.report,
            counts,
            tagging_results,
        };

        // Load
        let delivery = self.deliver(&report).await;

        Ok(RunOutcome { report, delivery })
    }

    fn parse_records(
        records: Vec<serde_json::Value>,
        window: &RecencyWindow,
    ) -> (Vec<Contact>, FeedStats) {
        let mut stats = FeedStats {
            fetched_profiles: records.len() as u64,
            ..FeedStats::default()
        };
        let mut contacts = Vec::with_capacity(records.len());

        for record in records {
            match Contact::try_from(record) {
                Ok(contact) if window.contains(contact.last_seen_at) => contacts.push(contact),
                Ok(_) => stats.outside_window += 1,
                Err(reason) => {
                    stats.malformed_records += 1;
                    tracing::warn!("⚠️ Skipping malformed contact record: {}", reason);
                }
            }
        }

        (contacts, stats)
    }

    async fn tag(&self, profile_ids: &[String]) -> Option<TaggingResults> {
        let tag_name = &self.config.tagging.tag_name;
        tracing::info!(
            "🏷️ Tagging {} platform-A-only profiles with '{}'",
            profile_ids.len(),
            tag_name
        );

        match self.directory.tag_profiles(tag_name, profile_ids).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("⚠️ Tagging failed: {}", e);
                None
            }
        }
    }

    async fn deliver(&self, report: &RunReport) -> DeliveryOutcome {
        let policy = self.config.webhook.retry_policy();
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.sink.deliver(report).await {
                Ok(()) => {
                    tracing::info!("✅ Report delivered to webhook");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(error) if attempt >= max_attempts => {
                    tracing::warn!(
                        "⚠️ Webhook delivery failed after {} attempt(s): {}",
                        attempt,
                        error
                    );
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        error,
                    };
                }
                Err(error) => {
                    let delay = policy.delay_for(attempt - 1);
                    tracing::warn!(
                        "⚠️ Webhook delivery failed ({}), retrying in {:?}",
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
