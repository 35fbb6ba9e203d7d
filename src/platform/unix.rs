//! macOS and Linux: `ps` for processes; `lsof`, `ss` or `netstat` for listening ports.

use std::sync::OnceLock;

use regex::Regex;

use super::cmdline::candidate_from_command_line;
use super::{finalize_ports, static_regex, PortTool, ProcessCandidate};

pub const TROUBLESHOOTING_TIPS: &[&str] = &[
    "Ensure Antigravity IDE is running",
    "Try `ps aux | grep language_server`",
];

/// `[l]anguage_server_...` keeps the grep process itself out of the listing.
pub fn list_processes_command(process_name: &str) -> String {
    let mut chars = process_name.chars();
    let pattern = match chars.next() {
        Some(first) => format!("[{first}]{}", chars.as_str()),
        None => String::new(),
    };
    format!(r#"ps -A -ww -o pid,ppid,args | grep "{pattern}""#)
}

pub fn diagnostic_command() -> String {
    "ps aux | grep -E 'language|antigravity' | grep -v grep".to_string()
}

fn lsof_command(pid: u32) -> String {
    format!(r#"lsof -nP -a -iTCP -sTCP:LISTEN -p {pid} 2>/dev/null | grep -E "^\S+\s+{pid}\s""#)
}

fn ss_command(pid: u32) -> String {
    format!(r#"ss -tlnp 2>/dev/null | grep "pid={pid},""#)
}

fn netstat_command(pid: u32) -> String {
    format!("netstat -tlnp 2>/dev/null | grep {pid}")
}

pub fn list_ports_command(pid: u32, tool: PortTool) -> String {
    match tool {
        PortTool::Lsof => lsof_command(pid),
        PortTool::Ss => ss_command(pid),
        PortTool::Netstat => netstat_command(pid),
        PortTool::Auto => format!(
            "{} || {} || {}",
            ss_command(pid),
            lsof_command(pid),
            netstat_command(pid)
        ),
    }
}

fn ps_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"^(\d+)\s+(\d+)\s+(.+)$")
}

/// Rows that do not look like `pid ppid args` (headers, shell noise) are skipped.
pub fn parse_processes(raw: &str) -> Option<Vec<ProcessCandidate>> {
    let candidates: Vec<ProcessCandidate> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let caps = ps_row_re().captures(line)?;
            let pid = caps.get(1)?.as_str().parse::<u32>().ok()?;
            let ppid = caps.get(2)?.as_str().parse::<u32>().ok();
            candidate_from_command_line(pid, ppid, caps.get(3)?.as_str())
        })
        .collect();
    (!candidates.is_empty()).then_some(candidates)
}

struct PortRow {
    port: u32,
    owner: Option<u32>,
}

// lsof: `language_ 1234 me 9u IPv4 0x0 0t0 TCP 127.0.0.1:42100 (LISTEN)`
fn lsof_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?i)(?:TCP|UDP)\s+(?:\*|[\w.\-]+|\[[\da-f:.]+\]):(\d+)\s+\(LISTEN\)")
}

fn lsof_owner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"^\S+\s+(\d+)\s")
}

// ss: `LISTEN 0 4096 127.0.0.1:42100 0.0.0.0:* users:(("language_server",pid=1234,fd=9))`
fn ss_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(
        &RE,
        r"(?i)LISTEN\s+\d+\s+\d+\s+(?:\*|[\d.]+(?:%\S+?)?|\[[\da-f:.]*\](?:%\S+?)?):(\d+)",
    )
}

fn ss_owner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"pid=(\d+)")
}

// netstat: `tcp 0 0 127.0.0.1:42100 0.0.0.0:* LISTEN 1234/language_serv`
fn netstat_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?i)^tcp6?\s+\d+\s+\d+\s+\S*:(\d+)\s+\S+\s+LISTEN(?:\s+(\d+)/)?")
}

fn capture_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse::<u32>().ok()
}

fn parse_row(line: &str) -> Option<PortRow> {
    if let Some(caps) = lsof_row_re().captures(line) {
        let owner = lsof_owner_re()
            .captures(line)
            .and_then(|c| capture_u32(&c, 1));
        return Some(PortRow {
            port: capture_u32(&caps, 1)?,
            owner,
        });
    }
    if let Some(caps) = ss_row_re().captures(line) {
        let owner = ss_owner_re().captures(line).and_then(|c| capture_u32(&c, 1));
        return Some(PortRow {
            port: capture_u32(&caps, 1)?,
            owner,
        });
    }
    let caps = netstat_row_re().captures(line)?;
    Some(PortRow {
        port: capture_u32(&caps, 1)?,
        owner: capture_u32(&caps, 2),
    })
}

/// Rows that name a different owning pid are dropped; `grep <pid>` also matches substrings.
pub fn parse_ports(raw: &str, pid: u32) -> Vec<u16> {
    let ports = raw
        .lines()
        .map(str::trim)
        .filter_map(parse_row)
        .filter(|row| row.owner.map_or(true, |owner| owner == pid))
        .map(|row| row.port);
    finalize_ports(ports)
}
