//! Upload batches and their validation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use courier_scheduler::scheduler_timezone;

use crate::PipelineError;

pub const DEVICE_NAME_MIN_CHARS: usize = 2;
pub const DEVICE_NAME_MAX_CHARS: usize = 50;
pub const TITLE_MAX_CHARS: usize = 100;
pub const BODY_MAX_CHARS: usize = 1000;

/// Format of the canonical per-instant folder name.
pub const FOLDER_NAME_FORMAT: &str = "%Y%m%d%H%M%S";

/// One media item as received: original file name and base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub filename: String,
    pub data: String,
}

/// A media item whose payload has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMedia {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One unit of work from a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadBatch {
    /// Logical device name.
    pub device_name: String,
    /// Target instant, epoch seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub title: Option<String>,
    /// Post body.
    #[serde(default)]
    pub content: Option<String>,
    pub files: Vec<MediaItem>,
}

impl UploadBatch {
    /// Check field constraints and decode every media payload.
    ///
    /// Nothing is written; a batch that fails here leaves no trace.
    pub fn validate(&self) -> Result<Vec<DecodedMedia>, PipelineError> {
        let name_len = self.device_name.chars().count();
        if !(DEVICE_NAME_MIN_CHARS..=DEVICE_NAME_MAX_CHARS).contains(&name_len) {
            return Err(PipelineError::InvalidField {
                field: "device_name",
                reason: format!(
                    "must be {DEVICE_NAME_MIN_CHARS}-{DEVICE_NAME_MAX_CHARS} characters, got {name_len}"
                ),
            });
        }
        // The name becomes a directory component.
        if self.device_name.contains(['/', '\\']) || self.device_name.starts_with('.') {
            return Err(PipelineError::InvalidField {
                field: "device_name",
                reason: "must not contain path separators or start with '.'".to_string(),
            });
        }
        if self.timestamp <= 0 {
            return Err(PipelineError::InvalidField {
                field: "timestamp",
                reason: "must be greater than 0".to_string(),
            });
        }
        if fire_time(self.timestamp).is_none() {
            return Err(PipelineError::InvalidField {
                field: "timestamp",
                reason: "out of range".to_string(),
            });
        }
        check_max_chars("title", self.title.as_deref(), TITLE_MAX_CHARS)?;
        // The title occupies a single line of the content record.
        if self.title.as_deref().is_some_and(|t| t.contains(['\n', '\r'])) {
            return Err(PipelineError::InvalidField {
                field: "title",
                reason: "must be a single line".to_string(),
            });
        }
        check_max_chars("content", self.content.as_deref(), BODY_MAX_CHARS)?;

        self.files
            .iter()
            .map(|item| {
                STANDARD
                    .decode(item.data.as_bytes())
                    .map(|bytes| DecodedMedia {
                        filename: item.filename.clone(),
                        bytes,
                    })
                    .map_err(|source| PipelineError::InvalidBase64 {
                        filename: item.filename.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Reject the batch unless its target instant is strictly after `now`.
    pub fn ensure_future(&self, now: i64) -> Result<(), PipelineError> {
        if self.timestamp <= now {
            return Err(PipelineError::StaleInstant {
                timestamp: self.timestamp,
                now,
            });
        }
        Ok(())
    }

    pub fn folder_name(&self) -> Option<String> {
        canonical_folder_name(self.timestamp)
    }
}

fn check_max_chars(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), PipelineError> {
    let len = value.map_or(0, |v| v.chars().count());
    if len > max {
        return Err(PipelineError::InvalidField {
            field,
            reason: format!("must be at most {max} characters, got {len}"),
        });
    }
    Ok(())
}

/// The target instant in the scheduler's timezone.
pub fn fire_time(timestamp: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(timestamp, 0).map(|utc| utc.with_timezone(&scheduler_timezone()))
}

/// Canonical `YYYYMMDDHHMMSS` folder name for an instant, rendered in UTC+8.
pub fn canonical_folder_name(timestamp: i64) -> Option<String> {
    fire_time(timestamp).map(|at| at.format(FOLDER_NAME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batch() -> UploadBatch {
        UploadBatch {
            device_name: "deviceA".to_string(),
            timestamp: 1_700_000_000,
            title: Some("T".to_string()),
            content: Some("B".to_string()),
            files: vec![MediaItem {
                filename: "a.png".to_string(),
                data: STANDARD.encode(b"png bytes"),
            }],
        }
    }

    #[test]
    fn test_folder_name_is_rendered_in_utc_plus_eight() {
        // 2023-11-14T22:13:20Z
        assert_eq!(
            canonical_folder_name(1_700_000_000).as_deref(),
            Some("20231115061320")
        );
        assert_eq!(canonical_folder_name(1).as_deref(), Some("19700101080001"));
    }

    #[test]
    fn test_valid_batch_decodes_media() {
        let media = batch().validate().unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].filename, "a.png");
        assert_eq!(media[0].bytes, b"png bytes");
    }

    #[test]
    fn test_absent_text_is_valid() {
        let mut b = batch();
        b.title = None;
        b.content = None;
        b.files.clear();
        assert!(b.validate().unwrap().is_empty());
    }

    #[test]
    fn test_field_limits() {
        let mut b = batch();
        b.device_name = "a".to_string();
        assert!(matches!(
            b.validate(),
            Err(PipelineError::InvalidField { field: "device_name", .. })
        ));

        let mut b = batch();
        b.device_name = "x".repeat(51);
        assert!(b.validate().is_err());

        let mut b = batch();
        b.device_name = "../etc".to_string();
        assert!(b.validate().is_err());

        let mut b = batch();
        b.timestamp = 0;
        assert!(matches!(
            b.validate(),
            Err(PipelineError::InvalidField { field: "timestamp", .. })
        ));

        let mut b = batch();
        b.title = Some("t".repeat(101));
        assert!(matches!(
            b.validate(),
            Err(PipelineError::InvalidField { field: "title", .. })
        ));

        let mut b = batch();
        b.title = Some("标".repeat(100));
        assert!(b.validate().is_ok());

        let mut b = batch();
        b.content = Some("c".repeat(1001));
        assert!(matches!(
            b.validate(),
            Err(PipelineError::InvalidField { field: "content", .. })
        ));
    }

    #[test]
    fn test_multiline_title_rejected() {
        for title in ["A\nContent: injected", "A\rB"] {
            let mut b = batch();
            b.title = Some(title.to_string());
            assert!(matches!(
                b.validate(),
                Err(PipelineError::InvalidField { field: "title", .. })
            ));
        }

        let mut b = batch();
        b.content = Some("line one\nline two".to_string());
        assert!(b.validate().is_ok());
    }

    #[test]
    fn test_malformed_base64_rejected() {
        let mut b = batch();
        b.files.push(MediaItem {
            filename: "bad.jpg".to_string(),
            data: "not*base64!".to_string(),
        });

        match b.validate() {
            Err(PipelineError::InvalidBase64 { filename, .. }) => assert_eq!(filename, "bad.jpg"),
            other => panic!("expected InvalidBase64, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_future() {
        let b = batch();
        assert!(b.ensure_future(b.timestamp - 1).is_ok());
        assert!(matches!(
            b.ensure_future(b.timestamp),
            Err(PipelineError::StaleInstant { .. })
        ));
        assert!(b.ensure_future(b.timestamp + 10).is_err());
    }

    #[test]
    fn test_batch_deserializes_without_optional_text() {
        let b: UploadBatch = serde_json::from_str(
            r#"{"device_name":"deviceB","timestamp":42,"files":[]}"#,
        )
        .unwrap();
        assert_eq!(b.title, None);
        assert_eq!(b.content, None);
    }

    proptest! {
        #[test]
        fn prop_folder_name_depends_only_on_instant(ts in 1i64..4_102_444_800) {
            let first = canonical_folder_name(ts).unwrap();
            let second = canonical_folder_name(ts).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), 14);
            prop_assert!(first.chars().all(|c| c.is_ascii_digit()));

            let parsed = chrono::NaiveDateTime::parse_from_str(&first, FOLDER_NAME_FORMAT).unwrap();
            let back = parsed.and_utc().timestamp() - 8 * 3600;
            prop_assert_eq!(back, ts);
        }

        #[test]
        fn prop_distinct_seconds_give_distinct_folders(ts in 1i64..4_102_444_800, delta in 1i64..86_400) {
            prop_assert_ne!(canonical_folder_name(ts), canonical_folder_name(ts + delta));
        }
    }
}
