// Adapters layer: concrete implementations of the domain ports.

pub mod coda;
pub mod http;
pub mod intercom;
pub mod synthetic;

pub use coda::CodaWebhook;
pub use intercom::IntercomClient;
pub use synthetic::SyntheticDirectory;
