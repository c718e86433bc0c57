use crate::config::toml_config::CredentialsConfig;
use crate::utils::error::{CensusError, Result};
use crate::utils::validation::validate_url;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    IntercomToken,
    WebhookUrl,
    WebhookToken,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::IntercomToken,
        CredentialKey::WebhookUrl,
        CredentialKey::WebhookToken,
    ];

    pub fn env_var(self) -> &'static str {
        match self {
            CredentialKey::IntercomToken => "INTERCOM_TOKEN",
            CredentialKey::WebhookUrl => "CODA_WEBHOOK_URL",
            CredentialKey::WebhookToken => "CODA_API_TOKEN",
        }
    }

    pub fn config_key(self) -> &'static str {
        match self {
            CredentialKey::IntercomToken => "intercom_token",
            CredentialKey::WebhookUrl => "coda_webhook_url",
            CredentialKey::WebhookToken => "coda_api_token",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CredentialKey::IntercomToken => "Intercom API token",
            CredentialKey::WebhookUrl => "Coda webhook URL",
            CredentialKey::WebhookToken => "Coda API token",
        }
    }
}

/// Snapshot of everything a resolver may consult.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources {
    env: HashMap<String, String>,
    file: CredentialsConfig,
}

impl CredentialSources {
    pub fn new(env: HashMap<String, String>, file: CredentialsConfig) -> Self {
        Self { env, file }
    }

    /// Reads the credential variables from the process environment.
    pub fn from_process(file: &CredentialsConfig) -> Self {
        let env = CredentialKey::ALL
            .iter()
            .filter_map(|key| {
                std::env::var(key.env_var())
                    .ok()
                    .map(|value| (key.env_var().to_string(), value))
            })
            .collect();
        Self::new(env, file.clone())
    }
}

type Resolver = fn(&CredentialSources, CredentialKey) -> Option<String>;

/// Tried in order; the first hit wins.
const RESOLVERS: [Resolver; 2] = [from_environment, from_config_file];

fn from_environment(sources: &CredentialSources, key: CredentialKey) -> Option<String> {
    sources.env.get(key.env_var()).and_then(|value| usable(value))
}

fn from_config_file(sources: &CredentialSources, key: CredentialKey) -> Option<String> {
    let value = match key {
        CredentialKey::IntercomToken => sources.file.intercom_token.as_deref(),
        CredentialKey::WebhookUrl => sources.file.coda_webhook_url.as_deref(),
        CredentialKey::WebhookToken => sources.file.coda_api_token.as_deref(),
    };
    value.and_then(usable)
}

/// Blank values and unexpanded `${VAR}` placeholders count as absent.
fn usable(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || (value.starts_with("${") && value.ends_with('}')) {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn resolve(sources: &CredentialSources, key: CredentialKey) -> Result<String> {
    RESOLVERS
        .iter()
        .find_map(|resolver| resolver(sources, key))
        .ok_or_else(|| CensusError::MissingCredentialError {
            credential: key.description().to_string(),
            env_var: key.env_var().to_string(),
            config_key: key.config_key().to_string(),
        })
}

#[derive(Clone)]
pub struct Credentials {
    /// Absent only when the feed is not contacted (test mode).
    pub intercom_token: Option<String>,
    pub webhook_url: String,
    pub webhook_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("intercom_token", &self.intercom_token.as_ref().map(|_| "<redacted>"))
            .field("webhook_url", &self.webhook_url)
            .field("webhook_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn resolve(sources: &CredentialSources, require_feed_token: bool) -> Result<Self> {
        let intercom_token = if require_feed_token {
            Some(resolve(sources, CredentialKey::IntercomToken)?)
        } else {
            resolve(sources, CredentialKey::IntercomToken).ok()
        };

        let webhook_url = resolve(sources, CredentialKey::WebhookUrl)?;
        validate_url(CredentialKey::WebhookUrl.config_key(), &webhook_url)?;
        let webhook_token = resolve(sources, CredentialKey::WebhookToken)?;

        Ok(Self {
            intercom_token,
            webhook_url,
            webhook_token,
        })
    }
}
