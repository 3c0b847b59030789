mod error;
pub mod similarity;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::library::MediaFileRecord;

pub use error::{ScoringError, ScoringResult};
pub use similarity::{partial_ratio, PartialRatio, SimilarityMetric};

/// Year value meaning "not known" in guide data.
pub const UNKNOWN_YEAR: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub path: PathBuf,
    pub score: f64,
}

/// Scores guide titles against a scan snapshot and applies the acceptance
/// threshold.
#[derive(Clone)]
pub struct Matcher {
    metric: Arc<dyn SimilarityMetric>,
    threshold: f64,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            metric: Arc::new(PartialRatio),
            threshold,
        }
    }

    pub fn with_metric(mut self, metric: Arc<dyn SimilarityMetric>) -> Self {
        self.metric = metric;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Appends ` ({year})` when a year is known.
    pub fn build_query(title: &str, year: Option<&str>) -> String {
        match year.map(str::trim) {
            Some(year) if !year.is_empty() && year != UNKNOWN_YEAR => format!("{title} ({year})"),
            _ => title.to_string(),
        }
    }

    /// Returns the best candidate when its score is strictly above the
    /// threshold. Scoring failures and empty snapshots yield `None`.
    pub fn find_best_match(
        &self,
        title: &str,
        files: &[MediaFileRecord],
        year: Option<&str>,
    ) -> Option<MatchResult> {
        let query = Self::build_query(title, year);
        let best = match self.best_candidate(&query, files) {
            Ok(best) => best,
            Err(ScoringError::EmptyCandidates) => {
                warn!(query = %query, "no media files available for matching");
                return None;
            }
            Err(error) => {
                warn!(query = %query, %error, "fuzzy matching failed");
                return None;
            }
        };
        let best = best?;
        info!(
            query = %query,
            path = %best.path.display(),
            score = best.score,
            "best candidate"
        );
        if best.score > self.threshold {
            Some(best)
        } else {
            None
        }
    }

    /// Highest scoring record regardless of threshold. On equal scores the
    /// record that comes first in `files` wins.
    pub fn best_candidate(
        &self,
        query: &str,
        files: &[MediaFileRecord],
    ) -> ScoringResult<Option<MatchResult>> {
        if files.is_empty() {
            return Err(ScoringError::EmptyCandidates);
        }
        if query.trim().is_empty() {
            return Err(ScoringError::EmptyQuery);
        }
        let mut best: Option<MatchResult> = None;
        for record in files {
            let score = self.metric.score(query, &record.normalized_title)?;
            if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                return Err(ScoringError::InvalidScore {
                    path: record.absolute_path.clone(),
                    score,
                });
            }
            debug!(candidate = %record.normalized_title, score, "scored candidate");
            let improves = best.as_ref().map_or(true, |current| score > current.score);
            if improves {
                best = Some(MatchResult {
                    path: record.absolute_path.clone(),
                    score,
                });
            }
        }
        Ok(best)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(60.0)
    }
}
