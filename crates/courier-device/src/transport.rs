//! Process transport for the control-channel binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::DeviceError;

/// Captured result of one control-channel invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful invocation printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Diagnostic text for a failed invocation: stderr, then stdout, then the exit code.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs control-channel commands.
///
/// Implementations do not apply timeouts; the channel wraps every call in its
/// own bound and drops the future when it elapses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run the control channel with the given arguments.
    async fn run(&self, args: &[String]) -> Result<CommandOutput, DeviceError>;

    /// Human-readable command line, for logs.
    fn command_line(&self, args: &[String]) -> String;
}

/// Spawns the control-channel binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    binary: PathBuf,
}

impl ProcessTransport {
    /// Create a transport for the binary at `binary` (a bare name is looked up in PATH).
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, DeviceError> {
        debug!(command = %self.command_line(args), "running channel command");

        // kill_on_drop: a timed-out call drops this future and must not leave the child behind
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DeviceError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn command_line(&self, args: &[String]) -> String {
        let mut line = self.binary.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = CommandOutput {
            success: false,
            code: Some(1),
            stdout: "out".to_string(),
            stderr: "  err\n".to_string(),
        };
        assert_eq!(output.diagnostic(), "err");
    }

    #[test]
    fn test_diagnostic_falls_back_to_stdout_then_code() {
        let mut output = CommandOutput::failed(7, "");
        assert_eq!(output.diagnostic(), "exit code 7");

        output.stdout = "error: device offline".to_string();
        assert_eq!(output.diagnostic(), "error: device offline");
    }

    #[test]
    fn test_command_line() {
        let transport = ProcessTransport::new("adb");
        assert_eq!(
            transport.command_line(&args(&["-s", "XYZ", "shell", "ls"])),
            "adb -s XYZ shell ls"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_transport_captures_output() {
        let transport = ProcessTransport::new("sh");
        let output = transport
            .run(&args(&["-c", "echo hello; echo oops >&2"]))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_transport_reports_exit_code() {
        let transport = ProcessTransport::new("sh");
        let output = transport.run(&args(&["-c", "exit 3"])).await.unwrap();

        assert!(!output.success);
        assert_eq!(output.code, Some(3));
    }

    #[tokio::test]
    async fn test_process_transport_missing_binary() {
        let transport = ProcessTransport::new("/nonexistent/courier-control-channel");
        let err = transport.run(&args(&["devices"])).await.unwrap_err();
        assert!(matches!(err, DeviceError::Spawn { .. }));
    }
}
