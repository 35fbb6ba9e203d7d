//! Runs the platform's shell command lines with a hard timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CommandError;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Returns stdout of a successful run.
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, CommandError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x08000000;
    let mut cmd = std::process::Command::new("cmd.exe");
    // Quoting inside the PowerShell script must reach cmd.exe untouched.
    cmd.arg("/C").raw_arg(command);
    cmd.creation_flags(CREATE_NO_WINDOW);
    Command::from(cmd)
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, CommandError> {
        let child = shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout {
                command: command.to_string(),
                timeout,
            })?
            .map_err(|e| CommandError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
