//! Localhost-only HTTP client with HTTPS -> HTTP fallback.
//!
//! Only loopback and private-range IPv4 hosts are ever contacted; anything else fails before a
//! socket is opened. The protocol that last worked for a `host:port` is remembered for the
//! lifetime of the client (and of every clone sharing its cache).

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::error::RequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Https,
    Http,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Https => "https",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Https => "HTTPS",
            Protocol::Http => "HTTP",
        })
    }
}

/// `host:port` -> last protocol that succeeded. Never expires.
#[derive(Debug, Clone, Default)]
pub struct ProtocolCache {
    entries: Arc<RwLock<HashMap<String, Protocol>>>,
}

impl ProtocolCache {
    fn key(host: &str, port: u16) -> String {
        format!("{host}:{port}")
    }

    pub fn get(&self, host: &str, port: u16) -> Option<Protocol> {
        self.entries.read().get(&Self::key(host, port)).copied()
    }

    pub fn remember(&self, host: &str, port: u16, protocol: Protocol) {
        self.entries.write().insert(Self::key(host, port), protocol);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

pub fn is_allowed_host(host: &str) -> bool {
    if host == "localhost" || host == "127.0.0.1" {
        return true;
    }
    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16 (WSL host, VM bridges).
    host.parse::<Ipv4Addr>()
        .map(|ip| ip.is_private())
        .unwrap_or(false)
}

pub fn validate_local_host(host: &str) -> Result<(), RequestError> {
    if is_allowed_host(host) {
        Ok(())
    } else {
        log::error!("blocked request to non-local host {host}");
        Err(RequestError::Blocked {
            host: host.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub hostname: String,
    pub port: u16,
    pub path: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
    pub allow_fallback: bool,
}

impl HttpRequest {
    pub fn new(method: Method, hostname: &str, port: u16, path: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            path: path.to_string(),
            method,
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            allow_fallback: true,
        }
    }

    pub fn post(hostname: &str, port: u16, path: &str) -> Self {
        Self::new(Method::POST, hostname, port, path)
    }

    pub fn get(hostname: &str, port: u16, path: &str) -> Self {
        Self::new(Method::GET, hostname, port, path)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allow_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub data: Value,
    pub protocol: Protocol,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Collaborators report these as `auth_failed`.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status_code, 401 | 403)
    }
}

/// Empty body -> `{}`; unparseable body on an error status -> synthetic `{"error": "HTTP <code>"}`.
pub(crate) fn parse_body(bytes: &[u8], status: u16, protocol: Protocol) -> Result<Value, RequestError> {
    if bytes.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(v) => Ok(v),
        Err(_) if status >= 400 => Ok(serde_json::json!({ "error": format!("HTTP {status}") })),
        Err(_) => Err(RequestError::InvalidResponse { protocol }),
    }
}

fn map_reqwest_error(e: reqwest::Error, protocol: Protocol) -> RequestError {
    if e.is_timeout() {
        RequestError::Timeout { protocol }
    } else {
        RequestError::Transport {
            protocol,
            message: e.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct SecureClient {
    client: reqwest::Client,
    protocols: ProtocolCache,
}

impl SecureClient {
    pub fn new() -> Result<Self, RequestError> {
        Self::with_cache(ProtocolCache::default())
    }

    pub fn with_cache(protocols: ProtocolCache) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("server-locator/", env!("CARGO_PKG_VERSION")))
            // Local servers present self-signed certificates.
            .danger_accept_invalid_certs(true)
            // A system proxy must never see localhost traffic.
            .no_proxy()
            // 3xx comes back as a response. Redirect targets never pass the host allowlist.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RequestError::Client(e.to_string()))?;
        Ok(Self { client, protocols })
    }

    pub fn protocol_cache(&self) -> &ProtocolCache {
        &self.protocols
    }

    pub async fn request(&self, req: &HttpRequest) -> Result<HttpResponse, RequestError> {
        validate_local_host(&req.hostname)?;

        if self.protocols.get(&req.hostname, req.port) == Some(Protocol::Http) {
            return self.send(req, Protocol::Http).await;
        }

        match self.send(req, Protocol::Https).await {
            Ok(resp) => {
                self.protocols
                    .remember(&req.hostname, req.port, Protocol::Https);
                Ok(resp)
            }
            Err(https_err) if req.allow_fallback => {
                log::debug!(
                    "HTTPS failed for {}:{} ({https_err}), trying HTTP fallback",
                    req.hostname,
                    req.port
                );
                match self.send(req, Protocol::Http).await {
                    Ok(resp) => {
                        self.protocols
                            .remember(&req.hostname, req.port, Protocol::Http);
                        Ok(resp)
                    }
                    Err(_) => Err(https_err),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, req: &HttpRequest, protocol: Protocol) -> Result<HttpResponse, RequestError> {
        let url = format!(
            "{}://{}:{}{}",
            protocol.scheme(),
            req.hostname,
            req.port,
            req.path
        );
        let mut builder = self
            .client
            .request(req.method.clone(), url)
            .timeout(req.timeout)
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.to_string());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, protocol))?;
        let status_code = resp.status().as_u16();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, protocol))?;
        let data = parse_body(&bytes, status_code, protocol)?;
        Ok(HttpResponse {
            status_code,
            data,
            protocol,
        })
    }
}

#[cfg(test)]
mod tests;
