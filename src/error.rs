use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StrikeError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid slice step: {0}")]
    InvalidStep(String),

    #[error("missing config file thunderstruck.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to decompress slice file: {0}")]
    Decompress(String),

    #[error("malformed strike record on line {line}: {message}")]
    RecordParse { line: usize, message: String },

    #[error("failed to write feature collection: {0}")]
    Output(String),
}

impl StrikeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StrikeError::ArchiveStatus { status: 404, .. })
    }
}
