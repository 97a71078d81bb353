//! Device registry: logical names, physical identifiers and per-device parameters.
//!
//! The registry is loaded once at process start and never mutated afterwards.
//! It is shared between the request path and the scheduler behind an `Arc`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::DeviceError;

/// Default per-device wait budget for automation steps, in seconds.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 10;

/// Operational parameters for one logical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Logical name used by clients (e.g. "deviceA").
    #[serde(skip_deserializing, default)]
    pub name: String,
    /// Physical identifier understood by the control channel (serial or host:port).
    pub serial: String,
    /// Root directory on the device that mirrors the upload folders.
    pub storage_path: String,
    /// Screen-lock credential handed to the automation driver.
    #[serde(default)]
    pub lock_password: String,
    /// Package identifier of the target application.
    pub app_package: String,
    /// Wait budget for automation steps, in seconds.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

fn default_wait_timeout() -> u64 {
    DEFAULT_WAIT_TIMEOUT_SECS
}

impl DeviceProfile {
    /// Remote directory for a canonical folder name under this device's storage root.
    pub fn remote_dir(&self, folder: &str) -> String {
        format!("{}/{}", self.storage_path.trim_end_matches('/'), folder)
    }
}

/// Registry file format.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    devices: BTreeMap<String, DeviceProfile>,
}

/// Immutable mapping from logical device name to its profile.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceProfile>,
}

impl DeviceRegistry {
    /// Build a registry from profiles. Each profile's `name` is its key.
    pub fn new(profiles: impl IntoIterator<Item = DeviceProfile>) -> Self {
        let devices = profiles
            .into_iter()
            .map(|profile| (profile.name.clone(), profile))
            .collect();
        Self { devices }
    }

    /// Load the registry from a JSON file, or fall back to the built-in defaults.
    ///
    /// The file looks like:
    /// ```json
    /// { "devices": { "deviceA": { "serial": "XPL5T19A28003051",
    ///                             "storage_path": "/storage/emulated/0/Pictures/",
    ///                             "app_package": "com.xingin.xhs" } } }
    /// ```
    pub async fn load(path: Option<&Path>) -> Result<Self, DeviceError> {
        let Some(path) = path else {
            info!("no device registry file given, using built-in defaults");
            return Ok(Self::builtin());
        };

        let content = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            count = registry.len(),
            "loaded device registry"
        );
        Ok(registry)
    }

    /// Parse the registry file format.
    pub fn from_json(content: &str) -> Result<Self, DeviceError> {
        let file: RegistryFile = serde_json::from_str(content)?;
        let mut devices = BTreeMap::new();
        for (name, mut profile) in file.devices {
            if profile.serial.trim().is_empty() {
                return Err(DeviceError::InvalidRegistry(format!(
                    "device {name} has an empty serial"
                )));
            }
            if profile.storage_path.trim().is_empty() {
                return Err(DeviceError::InvalidRegistry(format!(
                    "device {name} has an empty storage_path"
                )));
            }
            profile.name = name.clone();
            devices.insert(name, profile);
        }
        Ok(Self { devices })
    }

    /// The defaults shipped with the service.
    pub fn builtin() -> Self {
        let profile = |name: &str, serial: &str, storage: &str, password: &str| DeviceProfile {
            name: name.to_string(),
            serial: serial.to_string(),
            storage_path: storage.to_string(),
            lock_password: password.to_string(),
            app_package: "com.xingin.xhs".to_string(),
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
        };

        Self::new([
            profile(
                "deviceA",
                "XPL5T19A28003051",
                "/storage/emulated/0/Pictures/",
                "000000",
            ),
            // Second system on the same handset
            profile(
                "deviceA_sys2",
                "XPL5T19A28003051",
                "/storage/emulated/0/Pictures/",
                "123456",
            ),
            profile(
                "deviceB",
                "r8yhge69x8u8lzv8",
                "/storage/emulated/0/DCIM/Camera/",
                "666666",
            ),
            profile(
                "deviceC",
                "IJKL9012",
                "/storage/emulated/0/Pictures",
                "888888",
            ),
        ])
    }

    /// Get a device profile by logical name.
    pub fn get(&self, name: &str) -> Option<&DeviceProfile> {
        self.devices.get(name)
    }

    /// Resolve a logical name to its physical identifier.
    ///
    /// Names not in the registry are passed through unchanged, so a raw serial
    /// can be used directly.
    pub fn serial_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.devices
            .get(name)
            .map(|p| p.serial.as_str())
            .unwrap_or(name)
    }

    /// Logical names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Iterate over all profiles in name order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceProfile> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
