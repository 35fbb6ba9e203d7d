//! Gateway verification: one proof-of-life request before a candidate port is trusted.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::ServerConnection;
use crate::error::RequestError;
use crate::http_client::{Protocol, SecureClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    /// 0 when no response was received.
    pub status_code: u16,
    pub protocol: Option<Protocol>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: 0,
            protocol: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait GatewayProbe: Send + Sync {
    /// Transport failures are folded into an unsuccessful result; only a blocked host is an
    /// error.
    async fn probe(&self, host: &str, port: u16, csrf_token: &str) -> Result<ProbeResult, RequestError>;
}

pub struct GatewayVerifier {
    client: SecureClient,
    path: String,
    timeout: Duration,
}

impl GatewayVerifier {
    pub fn new(client: SecureClient, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            path: path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GatewayProbe for GatewayVerifier {
    async fn probe(&self, host: &str, port: u16, csrf_token: &str) -> Result<ProbeResult, RequestError> {
        let req = ServerConnection::new(port, csrf_token)
            .request_for(host, &self.path, serde_json::json!({}))
            .timeout(self.timeout);
        match self.client.request(&req).await {
            Ok(resp) => Ok(ProbeResult {
                success: resp.is_success(),
                status_code: resp.status_code,
                protocol: Some(resp.protocol),
                error: None,
            }),
            Err(e) if e.is_security() => Err(e),
            Err(e) => Ok(ProbeResult::failed(e.to_string())),
        }
    }
}
