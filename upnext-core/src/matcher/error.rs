use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("no candidate files to score against")]
    EmptyCandidates,
    #[error("query title is empty")]
    EmptyQuery,
    #[error("metric produced invalid score {score} for {path}")]
    InvalidScore { path: PathBuf, score: f64 },
    #[error("metric failed: {0}")]
    Metric(String),
}

pub type ScoringResult<T> = Result<T, ScoringError>;
