pub mod command;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod platform;
pub mod process_finder;
pub mod retry;
pub mod workspace_id;

#[cfg(test)]
mod test_support;

pub use config::LocatorConfig;
pub use connection::ServerConnection;
pub use error::{CommandError, ConfigError, DetectError, RequestError};
pub use http_client::{Protocol, SecureClient};
pub use process_finder::{DetectOptions, DetectionOutcome, FailureReason, ProcessFinder};
