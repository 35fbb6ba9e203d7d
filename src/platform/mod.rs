//! Platform-specific process and port discovery.
//!
//! Keep OS-specific command lines and parsers out of the orchestrator so it can remain portable.
//! The variant is a pure function of OS and architecture; none of them carry mutable state.

pub mod cmdline;
pub mod unix;
pub mod windows;
pub mod wsl;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A process that plausibly hosts the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCandidate {
    pub pid: u32,
    pub ppid: Option<u32>,
    /// `--extension_server_port`, 0 when the command line does not declare one.
    pub declared_port: u16,
    pub csrf_token: String,
    pub workspace_id: Option<String>,
}

/// Tool used to list listening sockets on Linux.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortTool {
    #[default]
    Auto,
    Lsof,
    Ss,
    Netstat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformStrategy {
    Windows,
    MacOs,
    Linux,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    strategy: PlatformStrategy,
    process_name: String,
    os: String,
    arch: String,
    port_tool: PortTool,
}

fn is_arm(arch: &str) -> bool {
    matches!(arch, "aarch64" | "arm64")
}

impl Platform {
    pub fn for_target(os: &str, arch: &str, port_tool: PortTool) -> Self {
        let (strategy, process_name) = match os {
            "windows" | "win32" => (PlatformStrategy::Windows, "language_server_windows_x64.exe"),
            "macos" | "darwin" if is_arm(arch) => {
                (PlatformStrategy::MacOs, "language_server_macos_arm")
            }
            "macos" | "darwin" => (PlatformStrategy::MacOs, "language_server_macos"),
            _ if is_arm(arch) => (PlatformStrategy::Linux, "language_server_linux_arm"),
            _ => (PlatformStrategy::Linux, "language_server_linux_x64"),
        };
        Self {
            strategy,
            process_name: process_name.to_string(),
            os: os.to_string(),
            arch: arch.to_string(),
            port_tool,
        }
    }

    pub fn current(port_tool: PortTool) -> Self {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH, port_tool)
    }

    pub fn strategy(&self) -> PlatformStrategy {
        self.strategy
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn is_windows(&self) -> bool {
        self.strategy == PlatformStrategy::Windows
    }

    pub fn list_processes_command(&self) -> String {
        match self.strategy {
            PlatformStrategy::Windows => windows::list_processes_command(&self.process_name),
            PlatformStrategy::MacOs | PlatformStrategy::Linux => {
                unix::list_processes_command(&self.process_name)
            }
        }
    }

    /// `None` when the output holds no usable candidate at all.
    pub fn parse_processes(&self, raw: &str) -> Option<Vec<ProcessCandidate>> {
        match self.strategy {
            PlatformStrategy::Windows => windows::parse_processes(raw),
            PlatformStrategy::MacOs | PlatformStrategy::Linux => unix::parse_processes(raw),
        }
    }

    pub fn list_ports_command(&self, pid: u32) -> String {
        match self.strategy {
            PlatformStrategy::Windows => windows::list_ports_command(pid),
            PlatformStrategy::MacOs => unix::list_ports_command(pid, PortTool::Lsof),
            PlatformStrategy::Linux => unix::list_ports_command(pid, self.port_tool),
        }
    }

    /// Deduplicated, ascending, all within `1..=65535`.
    pub fn parse_ports(&self, raw: &str, pid: u32) -> Vec<u16> {
        match self.strategy {
            PlatformStrategy::Windows => windows::parse_ports(raw, pid),
            PlatformStrategy::MacOs | PlatformStrategy::Linux => unix::parse_ports(raw, pid),
        }
    }

    /// Broader listing meant for a human, not for parsing.
    pub fn diagnostic_command(&self) -> String {
        match self.strategy {
            PlatformStrategy::Windows => windows::diagnostic_command(),
            PlatformStrategy::MacOs | PlatformStrategy::Linux => unix::diagnostic_command(),
        }
    }

    pub fn troubleshooting_tips(&self) -> Vec<String> {
        let tips: &[&str] = match self.strategy {
            PlatformStrategy::Windows => windows::TROUBLESHOOTING_TIPS,
            PlatformStrategy::MacOs | PlatformStrategy::Linux => unix::TROUBLESHOOTING_TIPS,
        };
        tips.iter().map(|s| s.to_string()).collect()
    }
}

/// Compiles a pattern known to be valid into `cell` on first use.
pub(crate) fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Keeps ports in `1..=65535`, sorted and unique.
pub(crate) fn finalize_ports(ports: impl IntoIterator<Item = u32>) -> Vec<u16> {
    let mut out: Vec<u16> = ports
        .into_iter()
        .filter(|p| (1..=65_535).contains(p))
        .map(|p| p as u16)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
