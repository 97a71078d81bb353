//! Deferred tasks, run by the scheduler at a batch's target instant.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use courier_device::{Automation, DeviceRegistry};

use crate::{StagingArea, canonical_folder_name, resolve_content};

/// Selects which deferred sub-tasks run. Absent means all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Cleanup,
    Automation,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleanup => f.write_str("cleanup"),
            Self::Automation => f.write_str("automation"),
        }
    }
}

/// Arguments stored with a scheduled deferred job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredTaskArgs {
    pub device_name: String,
    /// Target instant, epoch seconds.
    pub task_time: i64,
    #[serde(default)]
    pub task_type: Option<TaskType>,
}

impl DeferredTaskArgs {
    fn selects(&self, task_type: TaskType) -> bool {
        self.task_type.is_none_or(|selected| selected == task_type)
    }
}

/// AND-combine sub-task results, ignoring those that produced no result.
pub fn combine_results(results: impl IntoIterator<Item = Option<bool>>) -> bool {
    results.into_iter().flatten().all(|ok| ok)
}

/// Runs the deferred sub-tasks for one batch.
pub struct DeferredDispatcher {
    upload_root: PathBuf,
    registry: Arc<DeviceRegistry>,
    automation: Arc<dyn Automation>,
}

impl DeferredDispatcher {
    pub fn new(
        upload_root: impl Into<PathBuf>,
        registry: Arc<DeviceRegistry>,
        automation: Arc<dyn Automation>,
    ) -> Self {
        Self {
            upload_root: upload_root.into(),
            registry,
            automation,
        }
    }

    /// Run the selected sub-tasks. Never fails; the result is the combined outcome.
    #[tracing::instrument(skip(self), fields(device = %args.device_name, task_time = args.task_time))]
    pub async fn dispatch(&self, args: &DeferredTaskArgs) -> bool {
        let selection = args
            .task_type
            .map_or_else(|| "all".to_string(), |t| t.to_string());
        info!(selection = %selection, "running deferred tasks");

        let mut results = Vec::new();
        if args.selects(TaskType::Cleanup) {
            results.push(self.cleanup(args).await);
        }
        if args.selects(TaskType::Automation) {
            results.push(self.automation(args).await);
        }

        let success = combine_results(results);
        if success {
            info!(selection = %selection, "deferred tasks succeeded");
        } else {
            error!(selection = %selection, "deferred tasks failed");
        }
        success
    }

    /// Post-run cleanup. Nothing to clean up yet; always succeeds.
    pub async fn cleanup(&self, args: &DeferredTaskArgs) -> Option<bool> {
        info!(device = %args.device_name, task_time = args.task_time, "running data cleanup");
        Some(true)
    }

    /// Publish the batch's content through the automation driver.
    pub async fn automation(&self, args: &DeferredTaskArgs) -> Option<bool> {
        let name = args.device_name.as_str();
        info!(device = %name, "running content automation");

        let Some(profile) = self.registry.get(name) else {
            error!(device = %name, "no configuration for device");
            return Some(false);
        };
        let Some(folder) = canonical_folder_name(args.task_time) else {
            error!(device = %name, task_time = args.task_time, "task time out of range");
            return Some(false);
        };
        let staging = StagingArea::new(&self.upload_root, name, folder);

        let content = resolve_content(&staging).await;
        info!(
            device = %name,
            title = content.title.as_deref().unwrap_or("[no title]"),
            body_len = content.body.as_ref().map_or(0, |b| b.chars().count()),
            "prepared content"
        );

        if !self.automation.connect(profile).await {
            error!(device = %name, "automation driver could not connect");
            return Some(false);
        }

        let media = match staging.list_media().await {
            Ok(Some(media)) => media,
            Ok(None) => {
                error!(device = %name, dir = %staging.media_dir().display(), "media directory does not exist");
                return Some(false);
            }
            Err(e) => {
                error!(device = %name, error = %e, "failed to list media files");
                return Some(false);
            }
        };
        if media.is_empty() {
            error!(device = %name, dir = %staging.media_dir().display(), "no media files to post");
            return Some(false);
        }

        let result = self
            .automation
            .post_content(
                profile,
                content.title.as_deref(),
                content.body.as_deref(),
                &media,
            )
            .await;

        if result.success {
            info!(device = %name, status = %result.status, "content posted");
        } else {
            warn!(device = %name, status = %result.status, "content post failed");
        }
        Some(result.success)
    }
}
