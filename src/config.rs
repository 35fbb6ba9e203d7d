use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DETECT_ATTEMPTS, DEFAULT_DETECT_BASE_DELAY_MS,
    DEFAULT_DETECT_MAX_DELAY_MS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_SERVER_HOST, USER_STATUS_PATH,
};
use crate::error::ConfigError;
use crate::platform::wsl::resolve_service_host;
use crate::platform::PortTool;
use crate::process_finder::DetectOptions;
use crate::workspace_id::WorkspaceContext;

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_api_path() -> String {
    USER_STATUS_PATH.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Hard limit for each process/port listing command.
    pub command_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub port_tool: PortTool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_DETECT_ATTEMPTS,
            base_delay_ms: DEFAULT_DETECT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_DETECT_MAX_DELAY_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            port_tool: PortTool::Auto,
        }
    }
}

impl DetectConfig {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Host used for probes and requests. `auto` picks the WSL host when running under WSL.
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub detect: DetectConfig,
    #[serde(default)]
    pub workspace: WorkspaceContext,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            api_path: default_api_path(),
            debug: false,
            detect: DetectConfig::default(),
            workspace: WorkspaceContext::default(),
        }
    }
}

impl LocatorConfig {
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let txt = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&txt)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn resolved_server_host(&self) -> String {
        resolve_service_host(&self.server_host)
    }

    pub fn detect_options(&self, verbose: bool) -> DetectOptions {
        DetectOptions {
            attempts: self.detect.attempts,
            base_delay: Duration::from_millis(self.detect.base_delay_ms),
            verbose: verbose || self.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LocatorConfig::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, LocatorConfig::default());
        assert_eq!(cfg.detect.attempts, 5);
        assert_eq!(cfg.detect.base_delay_ms, 1_500);
        assert_eq!(cfg.detect.max_delay_ms, 10_000);
        assert_eq!(cfg.server_host, "127.0.0.1");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("locator.toml");
        std::fs::write(
            &path,
            r#"
debug = true

[detect]
attempts = 2
port_tool = "lsof"

[workspace]
folders = ["/repo/a"]
"#,
        )
        .unwrap();
        let cfg = LocatorConfig::load_or_default(&path).unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.detect.attempts, 2);
        assert_eq!(cfg.detect.port_tool, PortTool::Lsof);
        assert_eq!(cfg.detect.probe_timeout_ms, 5_000);
        assert_eq!(cfg.workspace.folders, vec![PathBuf::from("/repo/a")]);
        assert_eq!(cfg.api_path, USER_STATUS_PATH);

        let opts = cfg.detect_options(false);
        assert!(opts.verbose);
        assert_eq!(opts.attempts, 2);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("locator.toml");
        let mut cfg = LocatorConfig::default();
        cfg.server_host = "auto".to_string();
        cfg.workspace.workspace_file = Some(PathBuf::from("/repo/all.code-workspace"));
        cfg.save(&path).unwrap();
        assert_eq!(LocatorConfig::load_or_default(&path).unwrap(), cfg);
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("locator.toml");
        std::fs::write(&path, "detect = 3").unwrap();
        assert!(matches!(
            LocatorConfig::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
