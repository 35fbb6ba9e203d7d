use std::time::Duration;

use crate::http_client::Protocol;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The target is not loopback or a private-range address. Never retried.
    #[error("SECURITY ALERT: external connection blocked to {host}. Only localhost is allowed.")]
    Blocked { host: String },
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("{protocol} request failed: {message}")]
    Transport { protocol: Protocol, message: String },
    #[error("{protocol} request timeout")]
    Timeout { protocol: Protocol },
    #[error("{protocol} returned an invalid JSON response")]
    InvalidResponse { protocol: Protocol },
}

impl RequestError {
    pub fn is_security(&self) -> bool {
        matches!(self, RequestError::Blocked { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error(transparent)]
    Security(RequestError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
