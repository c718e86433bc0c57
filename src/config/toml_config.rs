use crate::domain::model::{CategoryLabels, Contact, Platform};
use crate::utils::error::{CensusError, Result};
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "census.toml";

/// Intercom's contacts search rejects larger pages.
pub const MAX_PER_PAGE: u32 = 150;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CensusConfig {
    pub credentials: CredentialsConfig,
    pub intercom: IntercomConfig,
    pub retry: RetryConfig,
    pub webhook: WebhookConfig,
    pub classification: ClassificationConfig,
    pub tagging: TaggingConfig,
}

/// File-level fallbacks; environment variables take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub intercom_token: Option<String>,
    pub coda_webhook_url: Option<String>,
    pub coda_api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntercomConfig {
    pub base_url: String,
    pub api_version: String,
    pub per_page: u32,
    pub timeout_seconds: u64,
}

impl Default for IntercomConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.intercom.io".to_string(),
            api_version: "2.14".to_string(),
            per_page: MAX_PER_PAGE,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_seconds: u64,
    pub retry_delay_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_delay_ms: 2_000,
        }
    }
}

impl WebhookConfig {
    /// The webhook gets exactly one retry.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(1, Duration::from_millis(self.retry_delay_ms))
    }
}

/// How to pick one subscription for an email that has several profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMerge {
    /// Best platform-A value, else best platform-B value.
    #[default]
    PreferPlatformA,
    /// Best value across all profiles.
    HighestRank,
}

/// A normalized subscription bucket and the raw attribute values that map to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub name: String,
    pub rank: u32,
    #[serde(default)]
    pub values: Vec<String>,
}

impl SubscriptionTier {
    fn new(name: &str, rank: u32, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            rank,
            values: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    /// Case-insensitive match on the tier name or any raw value.
    pub fn matches(&self, raw: &str) -> bool {
        self.name.eq_ignore_ascii_case(raw)
            || self.values.iter().any(|value| value.eq_ignore_ascii_case(raw))
    }
}

fn default_tiers() -> Vec<SubscriptionTier> {
    vec![
        SubscriptionTier::new("Admin", 5, &["admin", "Administrator", "Staff"]),
        SubscriptionTier::new("Coach", 4, &["coach", "Coaching"]),
        SubscriptionTier::new("Live", 3, &["live", "Yearly + Live"]),
        SubscriptionTier::new("Core", 2, &["core"]),
        SubscriptionTier::new("Free", 1, &["free", "Free Trial"]),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// `external_id` prefix that marks a platform B profile; any other id is platform A.
    pub b_external_id_prefix: String,
    pub a_label: String,
    pub b_label: String,
    pub both_label: String,
    pub a_subscription_attribute: String,
    pub b_subscription_attribute: String,
    pub fee_waiver_tag_id: String,
    pub purchase_names_attribute: String,
    pub waiver_keyword: String,
    pub merge: SubscriptionMerge,
    pub sample_size: usize,
    pub tiers: Vec<SubscriptionTier>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            b_external_id_prefix: "usr".to_string(),
            a_label: "7S1".to_string(),
            b_label: "7S2".to_string(),
            both_label: "Both".to_string(),
            a_subscription_attribute: "lsat_course".to_string(),
            b_subscription_attribute: "sub".to_string(),
            fee_waiver_tag_id: "11173348".to_string(),
            purchase_names_attribute: "lsat_purchase_names".to_string(),
            waiver_keyword: "waiver".to_string(),
            merge: SubscriptionMerge::default(),
            sample_size: 10,
            tiers: default_tiers(),
        }
    }
}

impl ClassificationConfig {
    pub fn platform_of(&self, contact: &Contact) -> Platform {
        if contact.external_id.starts_with(&self.b_external_id_prefix) {
            Platform::B
        } else {
            Platform::A
        }
    }

    pub fn subscription_attribute(&self, platform: Platform) -> &str {
        match platform {
            Platform::A => &self.a_subscription_attribute,
            Platform::B => &self.b_subscription_attribute,
        }
    }

    pub fn tier_for(&self, raw: &str) -> Option<&SubscriptionTier> {
        self.tiers.iter().find(|tier| tier.matches(raw))
    }

    pub fn category_labels(&self) -> CategoryLabels {
        CategoryLabels {
            only_a: self.a_label.clone(),
            only_b: self.b_label.clone(),
            both: self.both_label.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub tag_name: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            tag_name: "Recently Active on 7S1 Only".to_string(),
            batch_size: 50,
            batch_delay_ms: 2_000,
        }
    }
}

impl CensusConfig {
    /// Loads `path` if given (it must exist), otherwise [`DEFAULT_CONFIG_PATH`]
    /// when present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => {
                tracing::debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                Ok(Self::default())
            }
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CensusError::ConfigError {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| CensusError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Expands `${VAR}` references. Unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| CensusError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for CensusConfig {
    fn validate(&self) -> Result<()> {
        validate_url("intercom.base_url", &self.intercom.base_url)?;
        validate_non_empty_string("intercom.api_version", &self.intercom.api_version)?;
        validate_range("intercom.per_page", self.intercom.per_page, 1, MAX_PER_PAGE)?;
        validate_positive_number("intercom.timeout_seconds", self.intercom.timeout_seconds, 1)?;
        validate_positive_number("webhook.timeout_seconds", self.webhook.timeout_seconds, 1)?;

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(CensusError::InvalidConfigValueError {
                field: "retry.base_delay_ms".to_string(),
                value: self.retry.base_delay_ms.to_string(),
                reason: format!(
                    "must not exceed retry.max_delay_ms ({})",
                    self.retry.max_delay_ms
                ),
            });
        }

        let classification = &self.classification;
        validate_non_empty_string(
            "classification.b_external_id_prefix",
            &classification.b_external_id_prefix,
        )?;
        validate_non_empty_string(
            "classification.a_subscription_attribute",
            &classification.a_subscription_attribute,
        )?;
        validate_non_empty_string(
            "classification.b_subscription_attribute",
            &classification.b_subscription_attribute,
        )?;
        validate_non_empty_string(
            "classification.fee_waiver_tag_id",
            &classification.fee_waiver_tag_id,
        )?;
        validate_non_empty_string(
            "classification.waiver_keyword",
            &classification.waiver_keyword,
        )?;
        for tier in &classification.tiers {
            validate_non_empty_string("classification.tiers.name", &tier.name)?;
        }

        validate_non_empty_string("tagging.tag_name", &self.tagging.tag_name)?;
        validate_positive_number("tagging.batch_size", self.tagging.batch_size as u64, 1)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CensusConfig::from_toml_str("").unwrap();

        assert_eq!(config.intercom.base_url, "https://api.intercom.io");
        assert_eq!(config.intercom.per_page, 150);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.classification.b_external_id_prefix, "usr");
        assert_eq!(config.classification.merge, SubscriptionMerge::PreferPlatformA);
        assert_eq!(config.classification.tiers.len(), 5);
        assert_eq!(config.tagging.batch_size, 50);
        assert!(config.credentials.intercom_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml_config() {
        let toml_content = r#"
[credentials]
coda_webhook_url = "https://coda.io/apis/v1/docs/abc/hooks/automation/grid-auto-1"
coda_api_token = "coda-secret"

[intercom]
per_page = 50

[classification]
merge = "highest_rank"
sample_size = 3

[[classification.tiers]]
name = "Pro"
rank = 2
values = ["pro", "Professional"]
"#;

        let config = CensusConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(
            config.credentials.coda_api_token.as_deref(),
            Some("coda-secret")
        );
        assert_eq!(config.intercom.per_page, 50);
        assert_eq!(config.intercom.api_version, "2.14");
        assert_eq!(config.classification.merge, SubscriptionMerge::HighestRank);
        assert_eq!(config.classification.sample_size, 3);
        assert_eq!(config.classification.tiers.len(), 1);
        assert_eq!(
            config.classification.tier_for("PROFESSIONAL").map(|t| t.name.as_str()),
            Some("Pro")
        );
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CENSUS_TEST_INTERCOM_URL", "http://127.0.0.1:9999");

        let toml_content = r#"
[intercom]
base_url = "${CENSUS_TEST_INTERCOM_URL}"

[credentials]
intercom_token = "${CENSUS_TEST_UNSET_VARIABLE}"
"#;

        let config = CensusConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.intercom.base_url, "http://127.0.0.1:9999");
        assert_eq!(
            config.credentials.intercom_token.as_deref(),
            Some("${CENSUS_TEST_UNSET_VARIABLE}")
        );

        std::env::remove_var("CENSUS_TEST_INTERCOM_URL");
    }

    #[test]
    fn test_config_validation() {
        let invalid_url = CensusConfig::from_toml_str("[intercom]\nbase_url = \"invalid-url\"").unwrap();
        assert!(invalid_url.validate().is_err());

        let page_too_large = CensusConfig::from_toml_str("[intercom]\nper_page = 500").unwrap();
        assert!(page_too_large.validate().is_err());

        let zero_batch = CensusConfig::from_toml_str("[tagging]\nbatch_size = 0").unwrap();
        assert!(zero_batch.validate().is_err());

        let inverted_delays =
            CensusConfig::from_toml_str("[retry]\nbase_delay_ms = 10\nmax_delay_ms = 1").unwrap();
        assert!(inverted_delays.validate().is_err());

        let blank_keyword =
            CensusConfig::from_toml_str("[classification]\nwaiver_keyword = \"\"").unwrap();
        let err = blank_keyword.validate().unwrap_err();
        assert!(err.to_string().contains("classification.waiver_keyword"));

        let blank_tag =
            CensusConfig::from_toml_str("[classification]\nfee_waiver_tag_id = \" \"").unwrap();
        let err = blank_tag.validate().unwrap_err();
        assert!(err.to_string().contains("classification.fee_waiver_tag_id"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = CensusConfig::from_toml_str("[intercom\nper_page = ").unwrap_err();
        assert!(matches!(err, CensusError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[tagging]\ntag_name = \"Active on legacy only\"\n")
            .unwrap();

        let config = CensusConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.tagging.tag_name, "Active on legacy only");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = CensusConfig::load(Some(Path::new("/definitely/not/here/census.toml")))
            .unwrap_err();
        assert!(matches!(err, CensusError::ConfigError { .. }));
    }

    #[test]
    fn test_platform_rule_uses_external_id_prefix() {
        let rules = ClassificationConfig::default();
        let mut contact = Contact {
            id: None,
            email: "a@x.com".to_string(),
            external_id: "usr_9".to_string(),
            last_seen_at: 0,
            tag_ids: vec![],
            custom_attributes: Default::default(),
        };
        assert_eq!(rules.platform_of(&contact), Platform::B);

        contact.external_id = "48213".to_string();
        assert_eq!(rules.platform_of(&contact), Platform::A);
    }
}
