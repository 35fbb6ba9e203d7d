use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    CONNECT_PROTOCOL_HEADER, CONNECT_PROTOCOL_VERSION, CSRF_TOKEN_HEADER, PRODUCT_NAME,
};
use crate::error::RequestError;
use crate::http_client::{HttpRequest, HttpResponse, SecureClient};

/// A verified language server endpoint. This is all collaborators need to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConnection {
    pub port: u16,
    #[serde(rename = "token")]
    pub csrf_token: String,
}

impl ServerConnection {
    pub fn new(port: u16, csrf_token: impl Into<String>) -> Self {
        Self {
            port,
            csrf_token: csrf_token.into(),
        }
    }

    /// POST carrying the protocol-version marker and this server's csrf token.
    pub fn request_for(&self, host: &str, path: &str, body: Value) -> HttpRequest {
        HttpRequest::post(host, self.port, path)
            .header(CONNECT_PROTOCOL_HEADER, CONNECT_PROTOCOL_VERSION)
            .header(CSRF_TOKEN_HEADER, &self.csrf_token)
            .json(body)
    }

    /// Transport-level only: a 401/403 comes back as a response, not an error.
    pub async fn request(
        &self,
        client: &SecureClient,
        host: &str,
        path: &str,
        body: Value,
    ) -> Result<HttpResponse, RequestError> {
        client.request(&self.request_for(host, path, body)).await
    }

    pub fn user_status_body() -> Value {
        serde_json::json!({
            "metadata": {
                "ideName": PRODUCT_NAME,
                "extensionName": PRODUCT_NAME,
                "locale": "en",
            }
        })
    }
}
