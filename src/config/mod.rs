#[cfg(feature = "cli")]
pub mod cli;
pub mod credentials;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{Cli, Command, LogFormat, RunArgs};
pub use credentials::{CredentialKey, CredentialSources, Credentials};
pub use toml_config::{
    CensusConfig, ClassificationConfig, SubscriptionMerge, SubscriptionTier, TaggingConfig,
};
