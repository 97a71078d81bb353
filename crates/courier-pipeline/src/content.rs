//! Content resolution for automation runs.

use std::io::ErrorKind;

use tracing::{debug, error, warn};

use crate::StagingArea;

const TITLE_MARKER: &str = "Title:";
const BODY_MARKER: &str = "Content:";

/// Title and body read back from a staging area's text record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedContent {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Parse a text record.
///
/// The title comes from a line starting with `Title:`. The body is everything
/// after the marker of the first line starting with `Content:`, newlines
/// included. A later `Title:` line belongs to the body.
pub fn parse_content(text: &str) -> ResolvedContent {
    let text = text.trim();
    let mut resolved = ResolvedContent::default();

    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        let line = raw.trim();
        if let Some(title) = line.strip_prefix(TITLE_MARKER) {
            resolved.title = Some(title.trim().to_string());
        } else if line.starts_with(BODY_MARKER) {
            let indent = raw.len() - raw.trim_start().len();
            let start = offset + indent + BODY_MARKER.len();
            resolved.body = Some(text[start..].trim().to_string());
            break;
        }
        offset += raw.len();
    }

    resolved
}

/// Read and parse the text record of a staging area.
///
/// A missing or unreadable record yields an empty result rather than an error.
pub async fn resolve_content(staging: &StagingArea) -> ResolvedContent {
    let path = staging.content_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => {
            let resolved = parse_content(&text);
            debug!(
                title = ?resolved.title,
                body_len = resolved.body.as_ref().map_or(0, |b| b.chars().count()),
                "resolved content"
            );
            resolved
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "content record not found");
            ResolvedContent::default()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read content record");
            ResolvedContent::default()
        }
    }
}
