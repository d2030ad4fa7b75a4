//! Response assembly for completed builds
//!
//! Converts a [`BuildResult`] into the descriptor an outer transport layer
//! turns into headers, and opens the archive for streaming.

use crate::build::coordinator::{BuildOutcome, BuildResult};
use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::File;

/// IMF-fixdate, the preferred HTTP date format (RFC 9110)
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp as an HTTP date
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Outbound result descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResponse {
    /// HTTP status: 201 for a fresh build, 200 for a reused one
    pub status: u16,
    /// Whether this caller built the artifact
    pub outcome: BuildOutcome,
    /// Build identity
    pub identity: String,
    /// Location reference of the packaged archive
    pub location: String,
    /// `Expires` header value
    pub expires: String,
    /// `Content-Disposition` header value
    pub content_disposition: String,
    /// Download file name
    pub filename: String,
    /// Archive on disk
    pub archive_path: PathBuf,
}

impl BuildResponse {
    /// Assemble the descriptor for one caller's result
    pub fn assemble(result: &BuildResult, base_url: &str) -> Self {
        let artifact = &result.artifact;
        let status = match result.outcome {
            BuildOutcome::Created => 201,
            BuildOutcome::Existing => 200,
        };

        Self {
            status,
            outcome: result.outcome,
            identity: result.identity().to_string(),
            location: format!(
                "{}/download/{}/{}",
                base_url.trim_end_matches('/'),
                artifact.dir_name(),
                artifact.archive_filename
            ),
            expires: http_date(artifact.expires_at),
            content_disposition: format!(
                "attachment; filename=\"{}\"",
                artifact.archive_filename
            ),
            filename: artifact.archive_filename.clone(),
            archive_path: artifact.archive_path.clone(),
        }
    }

    /// Header name/value pairs for the response
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Location", self.location.clone()),
            ("Expires", self.expires.clone()),
            ("Content-Disposition", self.content_disposition.clone()),
        ]
    }

    /// Open the archive for streaming as the response body
    ///
    /// The handle belongs to this response only; dropping it has no effect on
    /// the shared build record.
    pub async fn open_body(&self) -> KilnResult<File> {
        File::open(&self.archive_path).await.map_err(|e| {
            KilnError::storage(&self.archive_path, format!("opening artifact: {}", e))
        })
    }
}
