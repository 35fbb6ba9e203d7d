//! Finds the running language server that belongs to this workspace.
//!
//! One attempt: list processes, drop candidates bound to another workspace, then verify the
//! rest one at a time (declared port first, then the ports the OS reports for the pid). The
//! first verified port wins. Attempts are retried with exponential backoff; only a blocked
//! (non-local) host escapes as an error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::command::{CommandRunner, ShellRunner};
use crate::config::LocatorConfig;
use crate::connection::ServerConnection;
use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DETECT_ATTEMPTS, DEFAULT_DETECT_BASE_DELAY_MS,
    DEFAULT_DETECT_MAX_DELAY_MS, DEFAULT_SERVER_HOST,
};
use crate::error::{DetectError, RequestError};
use crate::gateway::{GatewayProbe, GatewayVerifier};
use crate::http_client::{validate_local_host, Protocol, SecureClient};
use crate::platform::{Platform, ProcessCandidate};
use crate::retry::{retry, Backoff, RetryPolicy};
use crate::workspace_id::WorkspaceContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoProcess,
    /// Reserved for multi-candidate disambiguation failures.
    Ambiguous,
    NoPort,
    /// Set by collaborators after a 401/403; never produced here.
    AuthFailed,
    WorkspaceMismatch,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::NoProcess => "no_process",
            FailureReason::Ambiguous => "ambiguous",
            FailureReason::NoPort => "no_port",
            FailureReason::AuthFailed => "auth_failed",
            FailureReason::WorkspaceMismatch => "workspace_mismatch",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            FailureReason::NoProcess => {
                "Local server process not found. Please ensure Antigravity IDE is running."
            }
            FailureReason::Ambiguous => "Several server processes found; none could be chosen.",
            FailureReason::NoPort => "Server process found but no listening port detected.",
            FailureReason::AuthFailed => {
                "Please ensure you are logged into Antigravity IDE (Authentication failed)."
            }
            FailureReason::WorkspaceMismatch => "Server process found but Workspace ID mismatch.",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectionOutcome {
    Connected { port: u16, token: String },
    Failed { reason: FailureReason },
}

impl DetectionOutcome {
    pub fn connection(&self) -> Option<ServerConnection> {
        match self {
            DetectionOutcome::Connected { port, token } => {
                Some(ServerConnection::new(*port, token.clone()))
            }
            DetectionOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSource {
    #[serde(rename = "cmdline")]
    CommandLine,
    PortScan,
}

/// One probe made during the last attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationAttempt {
    pub pid: u32,
    pub port: u16,
    pub hostname: String,
    pub status_code: u16,
    pub error: Option<String>,
    pub protocol: Option<Protocol>,
    pub port_source: PortSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    pub attempts: u32,
    pub base_delay: Duration,
    pub verbose: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_DETECT_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_DETECT_BASE_DELAY_MS),
            verbose: false,
        }
    }
}

#[derive(Debug, Default)]
struct FinderState {
    failure_reason: Option<FailureReason>,
    candidate_count: usize,
    attempts: Vec<CommunicationAttempt>,
    last_outcome: Option<DetectionOutcome>,
}

pub struct ProcessFinder {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn GatewayProbe>,
    workspace: WorkspaceContext,
    host: String,
    command_timeout: Duration,
    max_delay: Duration,
    state: Mutex<FinderState>,
}

impl ProcessFinder {
    /// Real shell commands and HTTP probes for the current OS.
    pub fn new(config: &LocatorConfig) -> Result<Self, RequestError> {
        Self::with_client(config, SecureClient::new()?)
    }

    /// Like [`ProcessFinder::new`], sharing `client`'s protocol cache with the caller.
    pub fn with_client(config: &LocatorConfig, client: SecureClient) -> Result<Self, RequestError> {
        let host = config.resolved_server_host();
        validate_local_host(&host)?;
        let verifier = GatewayVerifier::new(
            client,
            config.api_path.clone(),
            config.detect.probe_timeout(),
        );
        Ok(Self::from_parts(
            Platform::current(config.detect.port_tool),
            Arc::new(ShellRunner),
            Arc::new(verifier),
        )
        .with_host(host)
        .with_workspace(config.workspace.clone())
        .with_command_timeout(config.detect.command_timeout())
        .with_max_delay(config.detect.max_delay()))
    }

    pub fn from_parts(
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn GatewayProbe>,
    ) -> Self {
        Self {
            platform,
            runner,
            probe,
            workspace: WorkspaceContext::default(),
            host: DEFAULT_SERVER_HOST.to_string(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            max_delay: Duration::from_millis(DEFAULT_DETECT_MAX_DELAY_MS),
            state: Mutex::new(FinderState::default()),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceContext) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn expected_workspace_ids(&self) -> Vec<String> {
        self.workspace.expected_ids(self.platform.is_windows())
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.state.lock().failure_reason
    }

    pub fn candidate_count(&self) -> usize {
        self.state.lock().candidate_count
    }

    pub fn attempt_details(&self) -> Vec<CommunicationAttempt> {
        self.state.lock().attempts.clone()
    }

    pub fn last_outcome(&self) -> Option<DetectionOutcome> {
        self.state.lock().last_outcome.clone()
    }

    /// OS command for manual triage.
    pub fn get_diagnostics(&self) -> String {
        self.platform.diagnostic_command()
    }

    pub async fn detect(
        &self,
        options: &DetectOptions,
    ) -> Result<Option<ServerConnection>, DetectError> {
        let verbose = options.verbose;
        let policy: RetryPolicy<ServerConnection, DetectError> =
            RetryPolicy::new(options.attempts, options.base_delay)
                .backoff(Backoff::Exponential)
                .max_delay(self.max_delay)
                .should_retry(|outcome| matches!(outcome, Ok(None)))
                .on_retry(move |attempt, delay| {
                    if verbose {
                        log::debug!(
                            "attempt {attempt} failed, retrying in {}ms...",
                            delay.as_millis()
                        );
                    }
                });

        let found = retry(|| self.try_detect(), &policy).await?;
        match &found {
            Some(conn) => log::info!("connected to language server on port {}", conn.port),
            None => log::warn!(
                "language server not found: {}",
                self.failure_reason()
                    .map(FailureReason::as_str)
                    .unwrap_or("unknown")
            ),
        }
        Ok(found)
    }

    async fn try_detect(&self) -> Result<Option<ServerConnection>, DetectError> {
        *self.state.lock() = FinderState::default();
        let outcome = self.run_attempt().await?;
        let conn = outcome.connection();
        {
            let mut state = self.state.lock();
            if let DetectionOutcome::Failed { reason } = &outcome {
                state.failure_reason = Some(*reason);
            }
            state.last_outcome = Some(outcome);
        }
        Ok(conn)
    }

    async fn run_attempt(&self) -> Result<DetectionOutcome, DetectError> {
        let expected = self.expected_workspace_ids();
        let command = self.platform.list_processes_command();
        let stdout = match self.runner.run(&command, self.command_timeout).await {
            Ok(stdout) => stdout,
            Err(e) => {
                log::debug!("process listing failed: {e}");
                return Ok(DetectionOutcome::Failed {
                    reason: FailureReason::NoProcess,
                });
            }
        };
        let Some(candidates) = self.platform.parse_processes(&stdout) else {
            return Ok(DetectionOutcome::Failed {
                reason: FailureReason::NoProcess,
            });
        };
        self.state.lock().candidate_count = candidates.len();

        let mut tentative = None;
        let mut verified_any = false;
        for candidate in &candidates {
            if let Some(id) = candidate.workspace_id.as_deref() {
                if !expected.is_empty() && !expected.iter().any(|e| e == id) {
                    log::debug!(
                        "skipping pid {}: workspace {id} is not one of {expected:?}",
                        candidate.pid
                    );
                    if candidates.len() == 1 {
                        tentative = Some(FailureReason::WorkspaceMismatch);
                    }
                    continue;
                }
            }
            verified_any = true;
            if let Some(conn) = self.verify_and_connect(candidate).await? {
                return Ok(DetectionOutcome::Connected {
                    port: conn.port,
                    token: conn.csrf_token,
                });
            }
        }

        let reason = if verified_any {
            FailureReason::NoPort
        } else {
            tentative.unwrap_or(FailureReason::NoProcess)
        };
        Ok(DetectionOutcome::Failed { reason })
    }

    async fn verify_and_connect(
        &self,
        candidate: &ProcessCandidate,
    ) -> Result<Option<ServerConnection>, DetectError> {
        let declared = candidate.declared_port;
        if declared > 0 && self.probe_port(candidate, declared, PortSource::CommandLine).await? {
            return Ok(Some(ServerConnection::new(declared, candidate.csrf_token.clone())));
        }

        let command = self.platform.list_ports_command(candidate.pid);
        let ports = match self.runner.run(&command, self.command_timeout).await {
            Ok(stdout) => self.platform.parse_ports(&stdout, candidate.pid),
            Err(e) => {
                log::debug!("port listing for pid {} failed: {e}", candidate.pid);
                Vec::new()
            }
        };
        for port in ports.into_iter().filter(|p| *p != declared) {
            if self.probe_port(candidate, port, PortSource::PortScan).await? {
                return Ok(Some(ServerConnection::new(port, candidate.csrf_token.clone())));
            }
        }
        Ok(None)
    }

    async fn probe_port(
        &self,
        candidate: &ProcessCandidate,
        port: u16,
        port_source: PortSource,
    ) -> Result<bool, DetectError> {
        let result = self
            .probe
            .probe(&self.host, port, &candidate.csrf_token)
            .await
            .map_err(DetectError::Security)?;
        log::debug!(
            "probe pid {} {}:{} -> status {} ({})",
            candidate.pid,
            self.host,
            port,
            result.status_code,
            result
                .protocol
                .map(|p| p.to_string())
                .or_else(|| result.error.clone())
                .unwrap_or_default()
        );
        self.state.lock().attempts.push(CommunicationAttempt {
            pid: candidate.pid,
            port,
            hostname: self.host.clone(),
            status_code: result.status_code,
            error: result.error,
            protocol: result.protocol,
            port_source,
        });
        Ok(result.success)
    }

    pub fn diagnostics_report(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        out.push_str("Language Server Diagnostics\n");
        out.push_str("===========================\n");
        out.push_str(&format!("Timestamp: {}\n", chrono::Local::now().to_rfc3339()));
        out.push_str(&format!(
            "Platform: {} ({})\n",
            self.platform.os(),
            self.platform.arch()
        ));
        out.push_str(&format!("Process name: {}\n", self.platform.process_name()));
        out.push_str(&format!("Server host: {}\n", self.host));
        out.push_str(&format!(
            "Failure reason: {}\n",
            state
                .failure_reason
                .map(FailureReason::as_str)
                .unwrap_or("none")
        ));
        out.push_str(&format!("Candidates: {}\n", state.candidate_count));
        out.push_str("Attempts:\n");
        if state.attempts.is_empty() {
            out.push_str("  (none)\n");
        }
        for a in &state.attempts {
            let source = match a.port_source {
                PortSource::CommandLine => "cmdline",
                PortSource::PortScan => "port scan",
            };
            let detail = match (&a.protocol, &a.error) {
                (Some(p), _) => p.to_string(),
                (None, Some(e)) => e.clone(),
                (None, None) => String::new(),
            };
            out.push_str(&format!(
                "  pid {} {}:{} via {source}: status {} {detail}\n",
                a.pid, a.hostname, a.port, a.status_code
            ));
        }
        out.push_str(&format!("Diagnostic command: {}\n", self.get_diagnostics()));
        out.push_str("Troubleshooting:\n");
        for tip in self.platform.troubleshooting_tips() {
            out.push_str(&format!("  - {tip}\n"));
        }
        out
    }
}
