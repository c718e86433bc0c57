use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Breakdown key for contacts with no usable subscription value.
pub const UNKNOWN_SUBSCRIPTION: &str = "Unknown";

/// The two product variants whose user bases are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    A,
    B,
}

/// Disjoint set-membership classes of an email across both platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    OnlyA,
    OnlyB,
    Both,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::OnlyA, Category::OnlyB, Category::Both];

    /// `None` only for an email seen on neither platform.
    pub fn from_membership(in_a: bool, in_b: bool) -> Option<Self> {
        match (in_a, in_b) {
            (true, false) => Some(Category::OnlyA),
            (false, true) => Some(Category::OnlyB),
            (true, true) => Some(Category::Both),
            (false, false) => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Category::OnlyA => "only_a",
            Category::OnlyB => "only_b",
            Category::Both => "both",
        }
    }
}

/// Human-facing names for each category, used in the webhook rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabels {
    pub only_a: String,
    pub only_b: String,
    pub both: String,
}

impl CategoryLabels {
    pub fn label(&self, category: Category) -> &str {
        match category {
            Category::OnlyA => &self.only_a,
            Category::OnlyB => &self.only_b,
            Category::Both => &self.both,
        }
    }
}

/// A validated contact profile from the feed. Held in memory for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub id: Option<String>,
    /// Trimmed and lower-cased.
    pub email: String,
    pub external_id: String,
    /// Unix seconds.
    pub last_seen_at: i64,
    pub tag_ids: Vec<String>,
    pub custom_attributes: Map<String, Value>,
}

impl Contact {
    /// Non-empty string attribute, trimmed.
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.custom_attributes
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tag_ids.iter().any(|id| id == tag_id)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedContact {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing email")]
    MissingEmail,
    #[error("missing external_id")]
    MissingExternalId,
    #[error("missing last_seen_at")]
    MissingLastSeen,
    #[error("invalid field: {0}")]
    InvalidField(String),
}

#[derive(Deserialize)]
struct RawContact {
    id: Option<String>,
    email: Option<String>,
    external_id: Option<String>,
    last_seen_at: Option<i64>,
    tags: Option<RawTagList>,
    custom_attributes: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawTagList {
    #[serde(default)]
    data: Vec<RawTag>,
}

#[derive(Deserialize)]
struct RawTag {
    id: Value,
}

impl TryFrom<Value> for Contact {
    type Error = MalformedContact;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        if !value.is_object() {
            return Err(MalformedContact::NotAnObject);
        }

        let raw: RawContact = serde_json::from_value(value)
            .map_err(|e| MalformedContact::InvalidField(e.to_string()))?;

        let email = raw
            .email
            .map(|email| normalize_email(&email))
            .filter(|email| !email.is_empty())
            .ok_or(MalformedContact::MissingEmail)?;

        let external_id = raw
            .external_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(MalformedContact::MissingExternalId)?;

        let last_seen_at = raw.last_seen_at.ok_or(MalformedContact::MissingLastSeen)?;

        // Intercom sends tag ids as strings; tolerate numeric ids from older exports.
        let tag_ids = raw
            .tags
            .map(|tags| {
                tags.data
                    .into_iter()
                    .filter_map(|tag| match tag.id {
                        Value::String(id) => Some(id),
                        Value::Number(id) => Some(id.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Contact {
            id: raw.id,
            email,
            external_id,
            last_seen_at,
            tag_ids,
            custom_attributes: raw.custom_attributes.unwrap_or_default(),
        })
    }
}

/// Regular vs fee-waiver counts for one subscription value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTally {
    pub regular: u64,
    pub fee_waiver: u64,
}

impl SubscriptionTally {
    pub fn record(&mut self, fee_waiver: bool) {
        if fee_waiver {
            self.fee_waiver += 1;
        } else {
            self.regular += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.regular + self.fee_waiver
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Unique emails in this category.
    pub count: u64,
    /// Profiles behind those emails.
    pub profiles: u64,
    pub fee_waiver_count: u64,
    pub sample: Vec<String>,
    pub subscription_breakdown: BTreeMap<String, SubscriptionTally>,
}

impl CategoryReport {
    pub fn subscription_total(&self) -> u64 {
        self.subscription_breakdown
            .values()
            .map(SubscriptionTally::total)
            .sum()
    }
}

/// One report per category. A struct rather than a map so every category is
/// always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub only_a: CategoryReport,
    pub only_b: CategoryReport,
    pub both: CategoryReport,
}

impl CategoryBreakdown {
    pub fn get(&self, category: Category) -> &CategoryReport {
        match category {
            Category::OnlyA => &self.only_a,
            Category::OnlyB => &self.only_b,
            Category::Both => &self.both,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategoryReport {
        match category {
            Category::OnlyA => &mut self.only_a,
            Category::OnlyB => &mut self.only_b,
            Category::Both => &mut self.both,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryReport)> {
        Category::ALL
            .into_iter()
            .map(move |category| (category, self.get(category)))
    }
}

/// Aggregate snapshot produced by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusReport {
    pub total_unique_emails: u64,
    pub total_profiles_in_window: u64,
    pub emails_with_multiple_profiles: u64,
    pub fee_waiver_count: u64,
    pub categories: CategoryBreakdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggingResults {
    pub total_profiles_to_tag: u64,
    pub successfully_tagged: u64,
    pub failed_batches: u64,
}

/// What the fetch step saw before classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub fetched_profiles: u64,
    pub malformed_records: u64,
    pub outside_window: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Live,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    /// Serialized as RFC 3339 / ISO-8601 UTC.
    pub timestamp: DateTime<Utc>,
}

impl RunMetadata {
    pub fn generate() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

/// Flat row for spreadsheet-style sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRow {
    pub category: String,
    pub subscription: String,
    pub fee_waiver: bool,
    pub total: u64,
}

/// Two rows (regular, fee waiver) per subscription per category.
pub fn count_rows(report: &CensusReport, labels: &CategoryLabels) -> Vec<CountRow> {
    let mut rows = Vec::new();
    for (category, category_report) in report.categories.iter() {
        for (subscription, tally) in &category_report.subscription_breakdown {
            for (fee_waiver, total) in [(false, tally.regular), (true, tally.fee_waiver)] {
                rows.push(CountRow {
                    category: labels.label(category).to_string(),
                    subscription: subscription.clone(),
                    fee_waiver,
                    total,
                });
            }
        }
    }
    rows
}

/// The document printed to stdout and posted to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub metadata: RunMetadata,
    pub recency_days: u32,
    pub mode: RunMode,
    pub feed: FeedStats,
    #[serde(flatten)]
    pub report: CensusReport,
    pub counts: Vec<CountRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagging_results: Option<TaggingResults>,
}
