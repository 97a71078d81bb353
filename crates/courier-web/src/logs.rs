//! Read access to the service's rolling log files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File name prefix of the rolling log files (`courier.<date>.log`).
pub const LOG_FILE_PREFIX: &str = "courier";

/// File name suffix of the rolling log files.
pub const LOG_FILE_SUFFIX: &str = "log";

/// Rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 5;

/// The newest log file in `dir`. `None` if there is none or `dir` is missing.
pub async fn latest_log_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let prefix = format!("{LOG_FILE_PREFIX}.");
    let suffix = format!(".{LOG_FILE_SUFFIX}");
    let mut newest: Option<PathBuf> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&prefix) || !name.ends_with(&suffix) {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }
        // Dated names sort chronologically.
        let path = entry.path();
        if newest.as_ref().is_none_or(|current| path > *current) {
            newest = Some(path);
        }
    }
    Ok(newest)
}

/// Log lines, newest first, optionally restricted to one level.
///
/// Lines are in the plain `fmt` layout: `<timestamp> <LEVEL> <target>: <message>`.
pub fn select_lines(text: &str, level: Option<&str>) -> Vec<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| match level {
            Some(level) => line
                .split_whitespace()
                .nth(1)
                .is_some_and(|l| l.eq_ignore_ascii_case(level)),
            None => true,
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const LOG: &str = "\
2026-10-17T01:00:00.000000Z  INFO courier::serve: courier listening on http://0.0.0.0:8000
2026-10-17T01:00:05.000000Z  WARN courier_pipeline::immediate: device not connected, skipping media scan notification

2026-10-17T01:00:06.000000Z ERROR courier_scheduler::scheduler: job failed
";

    #[test]
    fn test_select_lines_newest_first() {
        let lines = select_lines(LOG, None);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("job failed"));
        assert!(lines[2].contains("courier listening"));
    }

    #[test]
    fn test_select_lines_by_level() {
        let lines = select_lines(LOG, Some("warn"));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" WARN "));

        assert!(select_lines(LOG, Some("DEBUG")).is_empty());
        // A level word inside a message does not match
        assert!(select_lines(LOG, Some("courier")).is_empty());
    }

    #[tokio::test]
    async fn test_latest_log_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(latest_log_file(&tmp.path().join("missing")).await.unwrap(), None);
        assert_eq!(latest_log_file(tmp.path()).await.unwrap(), None);

        for name in ["courier.2026-10-15.log", "courier.2026-10-17.log", "other.2026-10-18.log"] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }
        assert_eq!(
            latest_log_file(tmp.path()).await.unwrap(),
            Some(tmp.path().join("courier.2026-10-17.log"))
        );
    }
}
