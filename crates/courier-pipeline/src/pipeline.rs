//! The upload pipeline: validate, clear stale state, persist, run immediate
//! tasks, register the deferred job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use courier_device::DeviceChannel;
use courier_scheduler::Scheduler;

use crate::{
    DecodedMedia, DeferredDispatcher, DeferredTaskArgs, FileMeta, ImmediateReport, PipelineError,
    StagingArea, TaskOutcome, UploadBatch, fire_time, run_immediate_tasks,
};

/// What happened to an accepted batch.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub device_name: String,
    pub timestamp: i64,
    /// Canonical folder name of the staging area.
    pub folder: String,
    pub files: Vec<FileMeta>,
    pub immediate: ImmediateReport,
    /// Registration of the deferred job; the detail is the job id on success.
    pub scheduled: TaskOutcome,
}

/// Sequences the phases of an upload.
///
/// Only validation and persistence can fail a request. Device interaction and
/// job registration are contained and reported in the [`UploadReceipt`].
pub struct UploadPipeline {
    upload_root: PathBuf,
    channel: Arc<DeviceChannel>,
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<DeferredDispatcher>,
}

impl UploadPipeline {
    pub fn new(
        upload_root: impl Into<PathBuf>,
        channel: Arc<DeviceChannel>,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<DeferredDispatcher>,
    ) -> Self {
        Self {
            upload_root: upload_root.into(),
            channel,
            scheduler,
            dispatcher,
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn channel(&self) -> &Arc<DeviceChannel> {
        &self.channel
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Accept one batch.
    #[tracing::instrument(skip_all, fields(device = %batch.device_name, timestamp = batch.timestamp))]
    pub async fn accept(&self, batch: UploadBatch) -> Result<UploadReceipt, PipelineError> {
        let media = batch.validate()?;
        batch.ensure_future(Utc::now().timestamp())?;
        let folder = batch
            .folder_name()
            .ok_or_else(|| PipelineError::InvalidField {
                field: "timestamp",
                reason: "out of range".to_string(),
            })?;

        let staging = StagingArea::new(&self.upload_root, &batch.device_name, folder.clone());
        self.clear_stale(&staging).await?;
        let files = self.persist(&staging, &batch, &media).await?;
        info!(folder = %folder, files = files.len(), "batch persisted");

        let immediate = run_immediate_tasks(&self.channel, &staging).await;
        let scheduled = self.schedule_deferred(&batch).await;

        Ok(UploadReceipt {
            device_name: batch.device_name,
            timestamp: batch.timestamp,
            folder,
            files,
            immediate,
            scheduled,
        })
    }

    /// Remove any earlier staging area for the same key, locally and on the device.
    ///
    /// Local failure is fatal. The device side is best-effort and only
    /// attempted while the device is connected.
    async fn clear_stale(&self, staging: &StagingArea) -> Result<(), PipelineError> {
        if staging.clear().await? {
            info!(dir = %staging.dir().display(), "removed stale local staging area");
        }

        let name = staging.device_name();
        self.channel.refresh_connections().await;
        if !self.channel.is_connected(name).await {
            debug!(device = %name, "device not connected, skipping device-side cleanup");
            return Ok(());
        }

        match self.channel.registry().get(name) {
            Some(profile) => {
                let remote = profile.remote_dir(staging.folder());
                if self.channel.remove_remote_dir(name, &remote).await {
                    debug!(device = %name, path = %remote, "cleared device-side staging area");
                }
            }
            None => warn!(device = %name, "no configuration for device, skipping device-side cleanup"),
        }
        Ok(())
    }

    async fn persist(
        &self,
        staging: &StagingArea,
        batch: &UploadBatch,
        media: &[DecodedMedia],
    ) -> Result<Vec<FileMeta>, PipelineError> {
        staging.create().await?;
        staging
            .write_content(batch.title.as_deref(), batch.content.as_deref())
            .await?;

        let mut files = Vec::with_capacity(media.len());
        for item in media {
            files.push(staging.write_media(item).await?);
        }
        Ok(files)
    }

    /// Register the deferred job for this batch. Failures are logged only.
    async fn schedule_deferred(&self, batch: &UploadBatch) -> TaskOutcome {
        let Some(fire_at) = fire_time(batch.timestamp) else {
            return TaskOutcome::failed("task time out of range");
        };

        let args = DeferredTaskArgs {
            device_name: batch.device_name.clone(),
            task_time: batch.timestamp,
            task_type: None,
        };
        let payload = match serde_json::to_value(&args) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to encode deferred task arguments");
                return TaskOutcome::failed(e.to_string());
            }
        };

        let name = format!("deferred:{}", args.device_name);
        let dispatcher = Arc::clone(&self.dispatcher);
        let registration = self
            .scheduler
            .register(name, fire_at, payload, move |_job| async move {
                if dispatcher.dispatch(&args).await {
                    Ok(())
                } else {
                    Err("deferred tasks reported failure".to_string())
                }
            })
            .await;

        match registration {
            Ok(handle) => {
                info!(id = %handle.id, fire_at = %handle.fire_at, "deferred tasks scheduled");
                TaskOutcome::ok_with(handle.id)
            }
            Err(e) => {
                error!(error = %e, "failed to schedule deferred tasks");
                TaskOutcome::failed(e.to_string())
            }
        }
    }
}
