//! WSL helpers: when this process runs inside WSL, the language server listens on the Windows
//! host, which is reachable through the resolver address in `/etc/resolv.conf`.

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use crate::constants::{AUTO_SERVER_HOST, DEFAULT_SERVER_HOST};

// Mirrored-networking DNS tunnel; it does not route to the host.
const WSL_DNS_TUNNEL: &str = "10.255.255.254";

fn normalize_ipv4(raw: &str) -> Option<String> {
    let token = raw
        .trim()
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .find(|s| !s.trim().is_empty())?
        .trim();
    let ip: Ipv4Addr = token.parse().ok()?;
    Some(ip.to_string())
}

pub fn is_wsl_with<F>(os: &str, read_version: F) -> bool
where
    F: FnOnce() -> std::io::Result<String>,
{
    if os != "linux" {
        return false;
    }
    match read_version() {
        Ok(version) => {
            let version = version.to_ascii_lowercase();
            version.contains("microsoft") || version.contains("wsl")
        }
        Err(_) => false,
    }
}

pub fn is_wsl() -> bool {
    static IS_WSL: OnceLock<bool> = OnceLock::new();
    *IS_WSL.get_or_init(|| {
        is_wsl_with(std::env::consts::OS, || {
            std::fs::read_to_string("/proc/version")
        })
    })
}

/// First `nameserver` entry, unless it is the DNS tunnel address.
pub fn wsl_host_ip_with<F>(read_resolv: F) -> Option<String>
where
    F: FnOnce() -> std::io::Result<String>,
{
    let resolv = read_resolv().ok()?;
    let value = resolv.lines().find_map(|line| {
        let rest = line.strip_prefix("nameserver")?;
        rest.starts_with(char::is_whitespace).then_some(rest)
    })?;
    let host = normalize_ipv4(value)?;
    (host != WSL_DNS_TUNNEL).then_some(host)
}

pub fn wsl_host_ip() -> Option<String> {
    wsl_host_ip_with(|| std::fs::read_to_string("/etc/resolv.conf"))
}

/// Resolves the configured host; `auto` picks the WSL host address when applicable.
pub fn resolve_service_host(configured: &str) -> String {
    let configured = configured.trim();
    if !configured.eq_ignore_ascii_case(AUTO_SERVER_HOST) {
        return configured.to_string();
    }
    if is_wsl() {
        if let Some(host) = wsl_host_ip() {
            log::debug!("running under WSL, using host {host}");
            return host;
        }
    }
    DEFAULT_SERVER_HOST.to_string()
}
