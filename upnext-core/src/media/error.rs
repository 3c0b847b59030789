use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run media inspection for {path}: {source}")]
    Command {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("media inspection for {path} timed out after {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },
    #[error("no duration reported for {path}")]
    MissingDuration { path: PathBuf },
    #[error("unparseable duration {value:?} for {path}")]
    InvalidDuration { path: PathBuf, value: String },
}

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("failed to run transcoder: {0}")]
    Command(#[source] std::io::Error),
    #[error("transcode timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;
