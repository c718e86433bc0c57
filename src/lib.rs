pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{Cli, Command, LogFormat, RunArgs};

pub use adapters::{CodaWebhook, IntercomClient, SyntheticDirectory};
pub use config::{CensusConfig, Credentials};
pub use crate::core::{CensusEngine, DeliveryOutcome, RunOutcome, RunRequest};
pub use domain::model::{CensusReport, RunMode, RunReport};
pub use utils::error::{CensusError, Result};
