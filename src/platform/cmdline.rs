//! Best-effort extraction of server flags from a full command line.

use std::sync::OnceLock;

use regex::Regex;

use super::{static_regex, ProcessCandidate};

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#"--csrf_token[=\s]+["']?([A-Za-z0-9\-_.]+)["']?"#)
}

fn port_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"--extension_server_port[=\s]+(\d+)")
}

fn workspace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#"--workspace_id[=\s]+["']?([A-Za-z0-9\-_.]+)["']?"#)
}

fn product_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#"(?i)--app_data_dir[=\s]+["']?antigravity"#)
}

pub fn csrf_token(cmd: &str) -> Option<String> {
    token_re()
        .captures(cmd)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Declared port, or 0 when absent or out of range.
pub fn extension_port(cmd: &str) -> u16 {
    port_re()
        .captures(cmd)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .unwrap_or(0)
}

pub fn workspace_id(cmd: &str) -> Option<String> {
    workspace_re()
        .captures(cmd)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Only our product's server passes an `antigravity` app data dir.
pub fn has_product_marker(cmd: &str) -> bool {
    product_marker_re().is_match(cmd)
}

/// Builds a candidate from one process row. Rows without a token or the product marker are
/// not candidates.
pub fn candidate_from_command_line(pid: u32, ppid: Option<u32>, cmd: &str) -> Option<ProcessCandidate> {
    let csrf_token = csrf_token(cmd)?;
    if !has_product_marker(cmd) {
        log::debug!("pid {pid} carries a csrf token but no product marker; ignoring");
        return None;
    }
    Some(ProcessCandidate {
        pid,
        ppid,
        declared_port: extension_port(cmd),
        csrf_token,
        workspace_id: workspace_id(cmd),
    })
}
