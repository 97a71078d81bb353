//! Device command channel.
//!
//! Issues single-attempt commands to devices through the control channel and
//! tracks which physical identifiers are currently reachable.
//!
//! The connection set is a snapshot: it only changes when
//! [`DeviceChannel::refresh_connections`] runs, and a refresh replaces it
//! wholesale. Callers that need a fresh answer refresh first. Nothing here
//! queues or serializes commands per device.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{DeviceError, DeviceRegistry, Transport};

/// Bound for commands addressed to one device.
pub const DEVICE_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound for channel-lifecycle commands (server start, device listing, connect).
pub const LIFECYCLE_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Substrings of a connect response that mean the device is reachable.
const CONNECT_ACCEPTED: [&str; 2] = ["connected to", "already connected"];

/// Timeouts applied by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTimeouts {
    pub device: Duration,
    pub lifecycle: Duration,
}

impl Default for ChannelTimeouts {
    fn default() -> Self {
        Self {
            device: DEVICE_COMMAND_TIMEOUT,
            lifecycle: LIFECYCLE_COMMAND_TIMEOUT,
        }
    }
}

/// Command channel to the registered devices.
pub struct DeviceChannel {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn Transport>,
    timeouts: ChannelTimeouts,
    connected: RwLock<Arc<HashSet<String>>>,
}

impl DeviceChannel {
    /// Create a channel with the default timeouts and an empty connection set.
    pub fn new(registry: Arc<DeviceRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            timeouts: ChannelTimeouts::default(),
            connected: RwLock::new(Arc::new(HashSet::new())),
        }
    }

    /// Override the command timeouts.
    pub fn with_timeouts(mut self, timeouts: ChannelTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Start the control-channel server. Failure is logged, never returned.
    pub async fn start_server(&self) {
        match self.execute_global(&["start-server"]).await {
            Ok(_) => info!("control channel server started"),
            Err(e) => error!(error = %e, "failed to start control channel server"),
        }
    }

    /// Query the reachable devices and replace the cached connection set.
    ///
    /// Never fails: when the listing cannot be obtained the cache becomes empty.
    pub async fn refresh_connections(&self) -> Arc<HashSet<String>> {
        let devices = match self.execute_global(&["devices"]).await {
            Ok(output) => parse_device_list(&output),
            Err(e) => {
                error!(error = %e, "failed to list connected devices");
                HashSet::new()
            }
        };

        debug!(devices = ?devices, "refreshed connection set");
        let devices = Arc::new(devices);
        *self.connected.write().await = Arc::clone(&devices);
        devices
    }

    /// The cached connection set, as of the last refresh.
    pub async fn connected_devices(&self) -> Arc<HashSet<String>> {
        Arc::clone(&*self.connected.read().await)
    }

    /// Whether the device is in the cached connection set. Does not refresh.
    pub async fn is_connected(&self, name: &str) -> bool {
        let serial = self.registry.serial_for(name);
        self.connected.read().await.contains(serial)
    }

    /// Connect to a device unless it is already connected.
    ///
    /// Failures are logged and reported as `false`.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, name: &str) -> bool {
        let serial = self.registry.serial_for(name).to_string();

        if self.is_connected(name).await {
            debug!(serial = %serial, "device already connected");
            return true;
        }

        let response = match self.execute_global(&["connect", serial.as_str()]).await {
            Ok(response) => response,
            Err(e) => {
                error!(serial = %serial, error = %e, "error while connecting to device");
                return false;
            }
        };

        if connect_accepted(&response) {
            info!(serial = %serial, "connected to device");
            self.refresh_connections().await;
            true
        } else {
            error!(serial = %serial, response = %response, "device refused connection");
            false
        }
    }

    /// Run a command against one device, bounded by the device timeout.
    ///
    /// Returns trimmed stdout. Non-zero exit and timeout are distinct errors.
    pub async fn execute(&self, name: &str, args: &[&str]) -> Result<String, DeviceError> {
        let serial = self.registry.serial_for(name);
        let mut full = Vec::with_capacity(args.len() + 2);
        full.push("-s".to_string());
        full.push(serial.to_string());
        full.extend(args.iter().map(|a| a.to_string()));
        self.run(full, self.timeouts.device).await
    }

    /// Run a command against the channel itself, bounded by the lifecycle timeout.
    pub async fn execute_global(&self, args: &[&str]) -> Result<String, DeviceError> {
        let full = args.iter().map(|a| a.to_string()).collect();
        self.run(full, self.timeouts.lifecycle).await
    }

    /// Copy a local file to the device. Best-effort.
    pub async fn push_file(&self, name: &str, local: &Path, remote: &str) -> bool {
        let local = local.to_string_lossy();
        match self.execute(name, &["push", &*local, remote]).await {
            Ok(_) => true,
            Err(e) => {
                error!(device = %name, local = %local, remote = %remote, error = %e, "failed to push file");
                false
            }
        }
    }

    /// Create a directory (and parents) on the device. Best-effort.
    pub async fn make_remote_dir(&self, name: &str, path: &str) -> bool {
        let command = format!("mkdir -p '{path}'");
        match self.execute(name, &["shell", command.as_str()]).await {
            Ok(_) => true,
            Err(e) => {
                error!(device = %name, path = %path, error = %e, "failed to create remote directory");
                false
            }
        }
    }

    /// Remove a directory tree on the device. Best-effort.
    pub async fn remove_remote_dir(&self, name: &str, path: &str) -> bool {
        let command = format!("rm -rf '{path}'");
        match self.execute(name, &["shell", command.as_str()]).await {
            Ok(_) => true,
            Err(e) => {
                warn!(device = %name, path = %path, error = %e, "failed to remove remote directory");
                false
            }
        }
    }

    /// Ask the device's media indexer to rescan `path`. Best-effort.
    pub async fn broadcast_media_scan(&self, name: &str, path: &str) -> bool {
        let command = format!(
            "am broadcast -a android.intent.action.MEDIA_SCANNER_SCAN_FILE -d 'file://{path}'"
        );
        match self.execute(name, &["shell", command.as_str()]).await {
            Ok(_) => true,
            Err(e) => {
                error!(device = %name, path = %path, error = %e, "failed to send media scan broadcast");
                false
            }
        }
    }

    async fn run(&self, args: Vec<String>, limit: Duration) -> Result<String, DeviceError> {
        let command = self.transport.command_line(&args);
        debug!(command = %command, "executing channel command");

        match tokio::time::timeout(limit, self.transport.run(&args)).await {
            Ok(Ok(output)) if output.success => Ok(output.stdout.trim().to_string()),
            Ok(Ok(output)) => Err(DeviceError::Channel {
                command,
                diagnostic: output.diagnostic(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Timeout {
                command,
                secs: limit.as_secs(),
            }),
        }
    }
}

/// Parse the device listing into the set of reachable identifiers.
///
/// The first line is a header. Only entries whose state is exactly `device`
/// count: `unauthorized` and `offline` entries cannot take commands.
pub fn parse_device_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            (parts.next() == Some("device")).then(|| serial.to_string())
        })
        .collect()
}

fn connect_accepted(response: &str) -> bool {
    let response = response.to_lowercase();
    CONNECT_ACCEPTED.iter().any(|s| response.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandOutput;
    use crate::testing::ScriptedTransport;
    use proptest::prelude::*;

    const LISTING: &str = "List of devices attached\nXPL5T19A28003051\tdevice\nemulator-5554\toffline\nr8yhge69x8u8lzv8\tunauthorized\n";

    fn channel(transport: ScriptedTransport) -> (DeviceChannel, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let channel = DeviceChannel::new(
            Arc::new(DeviceRegistry::builtin()),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );
        (channel, transport)
    }

    #[test]
    fn test_parse_device_list() {
        let devices = parse_device_list(LISTING);
        assert_eq!(devices.len(), 1);
        assert!(devices.contains("XPL5T19A28003051"));
    }

    #[test]
    fn test_parse_device_list_empty() {
        assert!(parse_device_list("").is_empty());
        assert!(parse_device_list("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_connect_accepted() {
        assert!(connect_accepted("connected to 10.0.0.5:5555"));
        assert!(connect_accepted("already connected to 10.0.0.5:5555"));
        assert!(!connect_accepted("failed to connect to 10.0.0.5:5555"));
        assert!(!connect_accepted("cannot resolve host"));
    }

    #[tokio::test]
    async fn test_refresh_replaces_cache() {
        let (channel, _) = channel(ScriptedTransport::with_devices(&["XPL5T19A28003051"]));
        assert!(!channel.is_connected("deviceA").await);

        channel.refresh_connections().await;
        assert!(channel.is_connected("deviceA").await);
        assert!(channel.is_connected("deviceA_sys2").await);
        assert!(!channel.is_connected("deviceB").await);
    }

    #[tokio::test]
    async fn test_refresh_failure_degrades_to_empty() {
        let (channel, transport) = channel(ScriptedTransport::with_devices(&["XPL5T19A28003051"]));
        channel.refresh_connections().await;
        assert!(channel.is_connected("deviceA").await);

        transport.set_handler(|_| CommandOutput::failed(1, "daemon not running"));
        let devices = channel.refresh_connections().await;
        assert!(devices.is_empty());
        assert!(!channel.is_connected("deviceA").await);
    }

    #[tokio::test]
    async fn test_execute_prefixes_serial() {
        let (channel, transport) = channel(ScriptedTransport::with_devices(&[]));
        let out = channel.execute("deviceB", &["shell", "ls"]).await.unwrap();
        assert_eq!(out, "");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["-s", "r8yhge69x8u8lzv8", "shell", "ls"]);
    }

    #[tokio::test]
    async fn test_execute_non_zero_exit_is_channel_error() {
        let (channel, _) = channel(ScriptedTransport::new(|_| {
            CommandOutput::failed(1, "error: device 'XYZ' not found")
        }));

        let err = channel.execute("deviceA", &["shell", "ls"]).await.unwrap_err();
        match err {
            DeviceError::Channel { diagnostic, .. } => {
                assert_eq!(diagnostic, "error: device 'XYZ' not found")
            }
            other => panic!("expected channel error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout_is_distinct() {
        let (channel, _) = channel(
            ScriptedTransport::new(|_| CommandOutput::ok("late"))
                .with_delay(Duration::from_secs(31)),
        );

        let err = channel.execute("deviceA", &["shell", "ls"]).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, DeviceError::Timeout { secs: 30, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_command_uses_lifecycle_timeout() {
        let (channel, _) = channel(
            ScriptedTransport::new(|_| CommandOutput::ok("")).with_delay(Duration::from_secs(11)),
        );

        let err = channel.execute_global(&["devices"]).await.unwrap_err();
        assert!(matches!(err, DeviceError::Timeout { secs: 10, .. }));
    }

    #[tokio::test]
    async fn test_connect_skips_handshake_when_connected() {
        let (channel, transport) = channel(ScriptedTransport::with_devices(&["XPL5T19A28003051"]));
        channel.refresh_connections().await;
        let before = transport.calls().len();

        assert!(channel.connect("deviceA").await);
        assert_eq!(transport.calls().len(), before);
    }

    #[tokio::test]
    async fn test_connect_accepts_and_refreshes() {
        let (channel, transport) = channel(ScriptedTransport::new(|args| {
            match args.first().map(String::as_str) {
                Some("connect") => CommandOutput::ok("connected to IJKL9012"),
                Some("devices") => CommandOutput::ok("List of devices attached\nIJKL9012\tdevice\n"),
                _ => CommandOutput::ok(""),
            }
        }));

        assert!(channel.connect("deviceC").await);
        assert!(channel.is_connected("deviceC").await);
        assert!(transport.calls().iter().any(|c| c == &vec!["connect", "IJKL9012"]));
    }

    #[tokio::test]
    async fn test_connect_rejects_unexpected_response() {
        let (channel, _) = channel(ScriptedTransport::new(|args| {
            match args.first().map(String::as_str) {
                Some("connect") => CommandOutput::ok("failed to connect to IJKL9012"),
                _ => CommandOutput::ok("List of devices attached\n"),
            }
        }));

        assert!(!channel.connect("deviceC").await);
        assert!(!channel.is_connected("deviceC").await);
    }

    #[tokio::test]
    async fn test_best_effort_wrappers_convert_errors() {
        let (channel, _) = channel(ScriptedTransport::new(|_| CommandOutput::failed(1, "no space")));

        assert!(!channel.push_file("deviceA", Path::new("/tmp/a.png"), "/sdcard/a.png").await);
        assert!(!channel.make_remote_dir("deviceA", "/sdcard/x").await);
        assert!(!channel.remove_remote_dir("deviceA", "/sdcard/x").await);
        assert!(!channel.broadcast_media_scan("deviceA", "/sdcard/x").await);
    }

    #[tokio::test]
    async fn test_make_remote_dir_command() {
        let (channel, transport) = channel(ScriptedTransport::with_devices(&[]));
        assert!(channel.make_remote_dir("deviceC", "/storage/emulated/0/Pictures/20260101120000").await);

        let calls = transport.calls();
        assert_eq!(
            calls[0],
            vec![
                "-s",
                "IJKL9012",
                "shell",
                "mkdir -p '/storage/emulated/0/Pictures/20260101120000'"
            ]
        );
    }

    #[tokio::test]
    async fn test_media_scan_uri_is_quoted() {
        let (channel, transport) = channel(ScriptedTransport::with_devices(&[]));
        assert!(channel.broadcast_media_scan("deviceB", "/storage/emulated/0/My Photos/20260101120000").await);

        let calls = transport.calls();
        assert_eq!(
            calls[0][3],
            "am broadcast -a android.intent.action.MEDIA_SCANNER_SCAN_FILE -d 'file:///storage/emulated/0/My Photos/20260101120000'"
        );
    }

    proptest! {
        #[test]
        fn parse_device_list_keeps_only_ready_entries(
            ready in prop::collection::hash_set("[A-Za-z0-9]{4,16}", 0..6),
            offline in prop::collection::hash_set("[A-Za-z0-9]{4,16}", 0..6),
        ) {
            let mut listing = String::from("List of devices attached\n");
            for serial in &ready {
                listing.push_str(&format!("{serial}\tdevice\n"));
            }
            for serial in offline.difference(&ready) {
                listing.push_str(&format!("{serial}\toffline\n"));
            }

            let parsed = parse_device_list(&listing);
            prop_assert_eq!(parsed, ready);
        }
    }
}
