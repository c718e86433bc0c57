use crate::core::window::RecencyWindow;
use crate::domain::model::{RunReport, TaggingResults};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Upstream source of contact profiles.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Raw contact records last seen after `window.query_start`, all pages.
    async fn search_active(&self, window: &RecencyWindow) -> Result<Vec<serde_json::Value>>;

    /// Applies `tag_name` to the given profile ids. `None` when the directory
    /// does not support tagging.
    async fn tag_profiles(
        &self,
        tag_name: &str,
        profile_ids: &[String],
    ) -> Result<Option<TaggingResults>>;
}

/// Downstream receiver of the finished report.
pub trait ReportSink: Send + Sync {
    /// A single delivery attempt.
    fn deliver(&self, report: &RunReport) -> impl std::future::Future<Output = Result<()>> + Send;
}
