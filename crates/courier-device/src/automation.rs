//! UI-automation driver contract.
//!
//! The on-device gesture sequences that publish a post are performed by an
//! external driver. Courier only needs two operations from it: connect, and
//! post content with a set of media files.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::{DeviceError, DeviceProfile};

/// Environment variable carrying the device's lock credential to the driver.
pub const LOCK_PASSWORD_ENV: &str = "COURIER_LOCK_PASSWORD";

/// Default bound for one driver invocation.
pub const DEFAULT_AUTOMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a post attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResult {
    pub success: bool,
    /// Driver-provided status text.
    pub status: String,
}

impl PostResult {
    pub fn succeeded(status: impl Into<String>) -> Self {
        Self {
            success: true,
            status: status.into(),
        }
    }

    pub fn failed(status: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
        }
    }
}

/// Capability that drives the target application on a device.
#[async_trait]
pub trait Automation: Send + Sync {
    /// Attach to the device. `false` means the post must not be attempted.
    async fn connect(&self, device: &DeviceProfile) -> bool;

    /// Publish `title`/`body` with the given media files.
    async fn post_content(
        &self,
        device: &DeviceProfile,
        title: Option<&str>,
        body: Option<&str>,
        media: &[PathBuf],
    ) -> PostResult;
}

/// Automation backed by an external driver program.
///
/// The driver is invoked as:
/// ```text
/// <driver> connect --serial <id> --package <app>
/// <driver> post --serial <id> --package <app> --wait-timeout <secs> [--title T] [--body B] <media>...
/// ```
/// with the lock credential in `COURIER_LOCK_PASSWORD`. Exit status 0 is success.
#[derive(Debug, Clone)]
pub struct CommandAutomation {
    program: Option<PathBuf>,
    timeout: Duration,
}

impl CommandAutomation {
    /// Create a driver wrapper. With `None`, every connect attempt fails.
    pub fn new(program: Option<PathBuf>) -> Self {
        Self {
            program,
            timeout: DEFAULT_AUTOMATION_TIMEOUT,
        }
    }

    /// Override the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn invoke(
        &self,
        program: &PathBuf,
        device: &DeviceProfile,
        args: Vec<String>,
    ) -> Result<String, DeviceError> {
        let command = format!("{} {}", program.display(), args.join(" "));
        debug!(command = %command, "invoking automation driver");

        let result = tokio::time::timeout(self.timeout, async {
            Command::new(program)
                .args(&args)
                .env(LOCK_PASSWORD_ENV, &device.lock_password)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if output.status.success() {
                    Ok(stdout)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    let diagnostic = if stderr.is_empty() { stdout } else { stderr };
                    Err(DeviceError::Channel {
                        command,
                        diagnostic,
                    })
                }
            }
            Ok(Err(source)) => Err(DeviceError::Spawn {
                binary: program.clone(),
                source,
            }),
            Err(_) => Err(DeviceError::Timeout {
                command,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl Automation for CommandAutomation {
    async fn connect(&self, device: &DeviceProfile) -> bool {
        let Some(program) = &self.program else {
            warn!(device = %device.name, "no automation driver configured");
            return false;
        };

        match self.invoke(program, device, connect_args(device)).await {
            Ok(_) => true,
            Err(e) => {
                error!(device = %device.name, error = %e, "automation driver failed to connect");
                false
            }
        }
    }

    async fn post_content(
        &self,
        device: &DeviceProfile,
        title: Option<&str>,
        body: Option<&str>,
        media: &[PathBuf],
    ) -> PostResult {
        let Some(program) = &self.program else {
            return PostResult::failed("no automation driver configured");
        };

        match self
            .invoke(program, device, post_args(device, title, body, media))
            .await
        {
            Ok(status) => PostResult::succeeded(status),
            Err(e) => PostResult::failed(e.to_string()),
        }
    }
}

fn connect_args(device: &DeviceProfile) -> Vec<String> {
    vec![
        "connect".to_string(),
        "--serial".to_string(),
        device.serial.clone(),
        "--package".to_string(),
        device.app_package.clone(),
    ]
}

fn post_args(
    device: &DeviceProfile,
    title: Option<&str>,
    body: Option<&str>,
    media: &[PathBuf],
) -> Vec<String> {
    let mut args = vec![
        "post".to_string(),
        "--serial".to_string(),
        device.serial.clone(),
        "--package".to_string(),
        device.app_package.clone(),
        "--wait-timeout".to_string(),
        device.wait_timeout_secs.to_string(),
    ];
    if let Some(title) = title {
        args.push("--title".to_string());
        args.push(title.to_string());
    }
    if let Some(body) = body {
        args.push("--body".to_string());
        args.push(body.to_string());
    }
    args.extend(media.iter().map(|p| p.display().to_string()));
    args
}
