//! Immediate tasks: transfer staged media to the device, then ask it to rescan.
//!
//! Neither task can fail the upload. Every failure is logged here and
//! reported as a [`TaskOutcome`].

use serde::Serialize;
use tracing::{error, info, warn};

use courier_device::DeviceChannel;

use crate::{StagingArea, TaskOutcome};

/// Outcomes of the immediate tasks for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImmediateReport {
    pub transfer: TaskOutcome,
    /// `None` when the notification was skipped because the device was unreachable.
    pub notification: Option<TaskOutcome>,
}

/// Run the transfer, then the notification.
#[tracing::instrument(skip_all, fields(device = %staging.device_name(), folder = %staging.folder()))]
pub async fn run_immediate_tasks(channel: &DeviceChannel, staging: &StagingArea) -> ImmediateReport {
    let transfer = transfer_media(channel, staging).await;
    let notification = notify_media_scan(channel, staging).await;

    info!(
        transferred = transfer.success,
        notified = notification.as_ref().map(|n| n.success),
        "immediate tasks finished"
    );
    ImmediateReport {
        transfer,
        notification,
    }
}

/// Push every staged media file to the device's mirrored folder.
///
/// One connect attempt is made if the device is unreachable; there is no retry.
/// Succeeds if at least one file was pushed.
pub async fn transfer_media(channel: &DeviceChannel, staging: &StagingArea) -> TaskOutcome {
    let name = staging.device_name();

    channel.refresh_connections().await;
    if !channel.is_connected(name).await {
        info!(device = %name, "device not connected, attempting to connect");
        if !channel.connect(name).await || !channel.is_connected(name).await {
            error!(device = %name, "device unreachable, abandoning transfer");
            return TaskOutcome::failed("device unreachable");
        }
    }

    let Some(profile) = channel.registry().get(name) else {
        error!(device = %name, "no configuration for device, abandoning transfer");
        return TaskOutcome::failed("missing device configuration");
    };
    let remote_dir = profile.remote_dir(staging.folder());

    if !channel.make_remote_dir(name, &remote_dir).await {
        return TaskOutcome::failed(format!("could not create {remote_dir} on device"));
    }

    let files = match staging.list_media().await {
        Ok(Some(files)) if !files.is_empty() => files,
        Ok(_) => {
            warn!(device = %name, dir = %staging.media_dir().display(), "no media files to transfer");
            return TaskOutcome::failed("no media files");
        }
        Err(e) => {
            error!(device = %name, error = %e, "failed to list media files");
            return TaskOutcome::failed(format!("failed to list media files: {e}"));
        }
    };

    let mut pushed = 0;
    for file in &files {
        let Some(file_name) = file.file_name() else {
            continue;
        };
        let remote = format!("{remote_dir}/{}", file_name.to_string_lossy());
        if channel.push_file(name, file, &remote).await {
            pushed += 1;
        }
    }

    info!(device = %name, pushed, total = files.len(), "media transfer finished");
    if pushed > 0 {
        TaskOutcome::ok_with(format!("{pushed}/{} files transferred", files.len()))
    } else {
        TaskOutcome::failed(format!("0/{} files transferred", files.len()))
    }
}

/// Ask the device to rescan its mirrored folder.
///
/// Skipped entirely (returns `None`) when the device is not connected.
pub async fn notify_media_scan(channel: &DeviceChannel, staging: &StagingArea) -> Option<TaskOutcome> {
    let name = staging.device_name();

    channel.refresh_connections().await;
    if !channel.is_connected(name).await {
        warn!(device = %name, "device not connected, skipping media scan notification");
        return None;
    }

    let Some(profile) = channel.registry().get(name) else {
        error!(device = %name, "no configuration for device, skipping media scan notification");
        return Some(TaskOutcome::failed("missing device configuration"));
    };
    let scan_path = profile.remote_dir(staging.folder());

    if channel.broadcast_media_scan(name, &scan_path).await {
        info!(device = %name, path = %scan_path, "media scan notification sent");
        Some(TaskOutcome::ok())
    } else {
        Some(TaskOutcome::failed("media scan broadcast failed"))
    }
}
