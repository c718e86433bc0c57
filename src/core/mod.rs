pub mod classifier;
pub mod engine;
pub mod window;

pub use crate::domain::ports::{ContactDirectory, ReportSink};
pub use crate::utils::error::Result;
pub use engine::{CensusEngine, DeliveryOutcome, RunOutcome, RunRequest};
pub use window::RecencyWindow;
