//! The `devices` subcommand.

use std::path::Path;
use std::sync::Arc;

use miette::Result;

use courier_device::{DeviceChannel, DeviceRegistry, ProcessTransport};

pub async fn run(adb_path: &Path, devices: Option<&Path>) -> Result<()> {
    let registry = Arc::new(
        DeviceRegistry::load(devices)
            .await
            .map_err(|e| miette::miette!("failed to load device registry: {}", e))?,
    );

    let channel = DeviceChannel::new(
        Arc::clone(&registry),
        Arc::new(ProcessTransport::new(adb_path)),
    );
    let connected = channel.refresh_connections().await;

    println!("{:<16} {:<20} {:<10} STORAGE", "NAME", "SERIAL", "STATE");
    for profile in registry.iter() {
        let state = if connected.contains(&profile.serial) {
            "connected"
        } else {
            "offline"
        };
        println!(
            "{:<16} {:<20} {:<10} {}",
            profile.name, profile.serial, state, profile.storage_path
        );
    }

    Ok(())
}
