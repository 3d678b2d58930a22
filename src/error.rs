// clipserver (video upload, subtitle preparation, and clip search service)

use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy shared by every component. The HTTP adapter maps these
/// kinds to status codes; everything that is not bad input or a missing
/// resource surfaces as a server-side failure.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("{0}")]
    Validation(String),

    #[error("file does not exist: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{tool} is not installed or not on PATH")]
    ToolMissing { tool: String },

    #[error("{tool} failed with exit code {exit_code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("malformed tool output: {0}")]
    MalformedOutput(String),

    #[error("could not decode transcript: {0}")]
    Decode(String),

    #[error("no transcript available: {0}")]
    NoTranscript(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),

    // Reserved for future concurrent-mutation surfaces.
    #[error("conflict: {0}")]
    #[allow(dead_code)]
    Conflict(String),
}

impl ClipError {
    pub fn tool_missing(tool: impl Into<String>) -> Self {
        Self::ToolMissing { tool: tool.into() }
    }

    pub fn tool_failed(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }
}

impl From<rusqlite::Error> for ClipError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for ClipError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
