//! Windows: PowerShell CIM queries for processes, `Get-NetTCPConnection` for ports.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use super::cmdline::candidate_from_command_line;
use super::{finalize_ports, static_regex, ProcessCandidate};

const UTF8_HEADER: &str = "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; ";

pub const TROUBLESHOOTING_TIPS: &[&str] = &[
    "Ensure Antigravity IDE is running",
    "Check with Task Manager if language_server process exists",
    "Try restarting IDE",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinProcessItem {
    process_id: Option<u32>,
    parent_process_id: Option<u32>,
    command_line: Option<String>,
}

// `ConvertTo-Json` emits a bare object when exactly one process matches.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<WinProcessItem>),
    One(WinProcessItem),
}

pub fn list_processes_command(process_name: &str) -> String {
    let script = format!(
        "{UTF8_HEADER}$n = '{process_name}'; $f = 'name=''' + $n + ''''; \
         $p = Get-CimInstance Win32_Process -Filter $f -ErrorAction SilentlyContinue; \
         if ($p) {{ @($p) | Select-Object ProcessId,ParentProcessId,CommandLine | ConvertTo-Json -Compress }} else {{ '[]' }}"
    );
    format!(r#"chcp 65001 >nul && powershell -ExecutionPolicy Bypass -NoProfile -Command "{script}""#)
}

pub fn diagnostic_command() -> String {
    format!(
        r#"chcp 65001 >nul && powershell -NoProfile -Command "{UTF8_HEADER}Get-Process | Where-Object {{ $_.ProcessName -match 'language|antigravity' }} | Select-Object Id,ProcessName,Path | Format-Table -AutoSize""#
    )
}

pub fn list_ports_command(pid: u32) -> String {
    format!(
        r#"chcp 65001 >nul && powershell -NoProfile -Command "{UTF8_HEADER}$p = Get-NetTCPConnection -State Listen -OwningProcess {pid} -ErrorAction SilentlyContinue | Select-Object -ExpandProperty LocalPort; if ($p) {{ $p | Sort-Object -Unique }}""#
    )
}

/// Skips anything before the first `[` or `{` (e.g. `Active code page: 65001`).
fn json_payload(raw: &str) -> Option<&str> {
    let start = raw.find(['[', '{'])?;
    Some(&raw[start..])
}

pub fn parse_processes(raw: &str) -> Option<Vec<ProcessCandidate>> {
    let payload = json_payload(raw.trim())?;
    // Trailing console noise after the JSON document is ignored.
    let parsed = serde_json::Deserializer::from_str(payload)
        .into_iter::<OneOrMany>()
        .next()?
        .ok()?;
    let items = match parsed {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    };

    let candidates: Vec<ProcessCandidate> = items
        .into_iter()
        .filter_map(|item| {
            let pid = item.process_id.filter(|pid| *pid > 0)?;
            let cmd = item.command_line.filter(|c| !c.is_empty())?;
            candidate_from_command_line(pid, item.parent_process_id, &cmd)
        })
        .collect();
    (!candidates.is_empty()).then_some(candidates)
}

fn netstat_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?i)^TCP\s+\S*:(\d+)\s+\S+\s+LISTENING\s+(\d+)$")
}

/// Accepts `Get-NetTCPConnection` output (one port per line) and `netstat -ano` rows owned
/// by `pid`.
pub fn parse_ports(raw: &str, pid: u32) -> Vec<u16> {
    let ports = raw.lines().map(str::trim).filter_map(|line| {
        if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            return line.parse::<u32>().ok();
        }
        let caps = netstat_row_re().captures(line)?;
        let owner = caps.get(2)?.as_str().parse::<u32>().ok()?;
        if owner != pid {
            return None;
        }
        caps.get(1)?.as_str().parse::<u32>().ok()
    });
    finalize_ports(ports)
}
