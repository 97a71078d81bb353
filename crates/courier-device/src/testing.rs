//! Scripted transport for tests.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! dependent crates' tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{CommandOutput, DeviceError, Transport};

type Handler = Box<dyn Fn(&[String]) -> CommandOutput + Send + Sync>;

/// A [`Transport`] that answers from a closure and records every call.
pub struct ScriptedTransport {
    handler: Mutex<Handler>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTransport {
    /// Answer every command with `handler`.
    pub fn new(handler: impl Fn(&[String]) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            handler: Mutex::new(Box::new(handler)),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Report `serials` as connected and succeed on every other command.
    pub fn with_devices(serials: &[&str]) -> Self {
        let mut listing = String::from("List of devices attached\n");
        for serial in serials {
            listing.push_str(serial);
            listing.push_str("\tdevice\n");
        }
        Self::new(move |args| match args.first().map(String::as_str) {
            Some("devices") => CommandOutput::ok(listing.clone()),
            Some("connect") => CommandOutput::ok("failed to connect"),
            _ => CommandOutput::ok(""),
        })
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the handler.
    pub fn set_handler(&self, handler: impl Fn(&[String]) -> CommandOutput + Send + Sync + 'static) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Box::new(handler);
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls whose arguments contain `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.iter().any(|arg| arg.contains(needle)))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, DeviceError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(handler(args))
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("scripted {}", args.join(" "))
    }
}
