mod guard;
mod locks;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::config::UpnextConfig;
use crate::guide::ProgramEntry;
use crate::library::MediaFileRecord;
use crate::matcher::{MatchResult, Matcher};
use crate::media::{ClipExtractor, ClipOutcome, CommandExecutor, OffsetSource};

pub use guard::{artifact_path, is_processed, sanitize_title};
pub use locks::TitleLocks;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgramStatus {
    Processed,
    SkippedAlreadyDone,
    NoMatch,
    ExtractionFailed,
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProgramStatus::Processed => "processed",
            ProgramStatus::SkippedAlreadyDone => "skipped-already-done",
            ProgramStatus::NoMatch => "no-match",
            ProgramStatus::ExtractionFailed => "extraction-failed",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramOutcome {
    pub title: String,
    pub status: ProgramStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgramOutcome {
    fn new(title: &str, status: ProgramStatus) -> Self {
        Self {
            title: title.to_string(),
            status,
            matched: None,
            clip: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub outcomes: Vec<ProgramOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn count(&self, status: ProgramStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn status_of(&self, title: &str) -> Option<ProgramStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.title == title)
            .map(|outcome| outcome.status)
    }

    pub fn has_failures(&self) -> bool {
        self.count(ProgramStatus::ExtractionFailed) > 0
    }
}

/// Runs one batch: guard, match, extract, for every guide entry in order.
///
/// Per-program problems end up in the report; only an unusable output
/// directory fails the batch.
#[derive(Clone)]
pub struct Pipeline {
    output_dir: PathBuf,
    matcher: Matcher,
    extractor: ClipExtractor,
    locks: TitleLocks,
    concurrency: usize,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("output_dir", &self.output_dir)
            .field("matcher", &self.matcher)
            .field("extractor", &self.extractor)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Pipeline {
    pub fn new(config: &UpnextConfig, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        Self {
            output_dir: config.paths.output_dir.clone(),
            matcher: Matcher::new(config.matching.threshold),
            extractor: ClipExtractor::new(config, executor),
            locks: TitleLocks::new(),
            concurrency: config.limits.max_concurrent_extractions.max(1),
        }
    }

    pub fn with_offset_source(mut self, offsets: Arc<dyn OffsetSource>) -> Self {
        self.extractor = self.extractor.with_offset_source(offsets);
        self
    }

    pub async fn process_programs(
        &self,
        programs: &[ProgramEntry],
        files: &[MediaFileRecord],
    ) -> PipelineResult<PipelineReport> {
        let started_at = Utc::now();
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| PipelineError::OutputDir {
                source,
                path: self.output_dir.clone(),
            })?;
        info!(
            programs = programs.len(),
            files = files.len(),
            concurrency = self.concurrency,
            "processing guide batch"
        );

        let outcomes: Vec<ProgramOutcome> = stream::iter(programs)
            .map(|program| self.process_program(program, files))
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = PipelineReport {
            outcomes,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            processed = report.count(ProgramStatus::Processed),
            skipped = report.count(ProgramStatus::SkippedAlreadyDone),
            no_match = report.count(ProgramStatus::NoMatch),
            failed = report.count(ProgramStatus::ExtractionFailed),
            "batch complete"
        );
        Ok(report)
    }

    async fn process_program(
        &self,
        program: &ProgramEntry,
        files: &[MediaFileRecord],
    ) -> ProgramOutcome {
        let title = program.title.trim();
        let _lock = self.locks.acquire(&sanitize_title(title)).await;

        if is_processed(title, &self.output_dir) {
            return ProgramOutcome::new(title, ProgramStatus::SkippedAlreadyDone);
        }

        info!(title, category = %program.category, "processing program");
        let Some(matched) = self
            .matcher
            .find_best_match(title, files, program.match_year())
        else {
            warn!(title, "no suitable file found");
            return ProgramOutcome::new(title, ProgramStatus::NoMatch);
        };

        let result = self
            .extractor
            .extract_clip(title, &matched.path, &self.output_dir)
            .await;
        let mut outcome = ProgramOutcome::new(title, ProgramStatus::Processed);
        outcome.matched = Some(matched);
        match result {
            Ok(clip) => outcome.clip = Some(clip),
            Err(error) => {
                warn!(title, %error, "clip extraction failed");
                outcome.status = ProgramStatus::ExtractionFailed;
                outcome.error = Some(error.to_string());
            }
        }
        outcome
    }
}
