//! Upload pipeline for courier.
//!
//! An accepted [`UploadBatch`] goes through four phases:
//! 1. stale-state cleanup for its (device, canonical folder) key
//! 2. persistence into a [`StagingArea`] (fatal on failure)
//! 3. immediate device tasks: media transfer and rescan notification
//! 4. registration of one deferred job that runs the [`DeferredDispatcher`]
//!
//! Phases 3 and 4, and everything the deferred job does, report through
//! [`TaskOutcome`] values and logs; they never fail the request.

mod batch;
mod content;
mod deferred;
mod error;
mod immediate;
mod outcome;
mod pipeline;
mod staging;

#[cfg(test)]
mod test_support;

pub use batch::{
    BODY_MAX_CHARS, DEVICE_NAME_MAX_CHARS, DEVICE_NAME_MIN_CHARS, DecodedMedia, FOLDER_NAME_FORMAT,
    MediaItem, TITLE_MAX_CHARS, UploadBatch, canonical_folder_name, fire_time,
};
pub use content::{ResolvedContent, parse_content, resolve_content};
pub use deferred::{DeferredDispatcher, DeferredTaskArgs, TaskType, combine_results};
pub use error::PipelineError;
pub use immediate::{ImmediateReport, notify_media_scan, run_immediate_tasks, transfer_media};
pub use outcome::TaskOutcome;
pub use pipeline::{UploadPipeline, UploadReceipt};
pub use staging::{CONTENT_FILE, FileMeta, MEDIA_DIR, StagingArea, render_content};
