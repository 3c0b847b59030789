use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tokio::fs;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{ClipSection, UpnextConfig};
use crate::pipeline::artifact_path;

use super::error::{ExtractionError, ExtractionResult};
use super::probe::DurationProbe;
use super::{render_command, CommandExecutor, SystemCommandExecutor};

/// Chooses where in the source a clip starts.
pub trait OffsetSource: Send + Sync {
    /// A start offset in `[0, max_start]`. `max_start` is never negative.
    fn pick(&self, max_start: f64) -> f64;
}

/// Fresh entropy on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomOffset;

impl OffsetSource for RandomOffset {
    fn pick(&self, max_start: f64) -> f64 {
        if !(max_start > 0.0 && max_start.is_finite()) {
            return 0.0;
        }
        rand::thread_rng().gen_range(0.0..max_start)
    }
}

/// Reproducible offsets from a seeded ChaCha stream.
#[derive(Debug)]
pub struct SeededOffset {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededOffset {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

impl OffsetSource for SeededOffset {
    fn pick(&self, max_start: f64) -> f64 {
        if !(max_start > 0.0 && max_start.is_finite()) {
            return 0.0;
        }
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0.0..max_start)
    }
}

/// One extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipJob {
    pub program_title: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
}

impl ClipJob {
    pub fn new(program_title: &str, source_path: &Path, output_dir: &Path) -> Self {
        Self {
            program_title: program_title.to_string(),
            source_path: source_path.to_path_buf(),
            output_path: artifact_path(output_dir, program_title),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipOutcome {
    pub output_path: PathBuf,
    pub start_offset: f64,
    pub source_duration: f64,
}

/// Cuts a short, silent, fixed-size H.264 clip out of a random point of the
/// source.
///
/// Sources no longer than the clip length start at 0 and yield whatever the
/// file holds, so the output can be shorter than the configured length.
#[derive(Clone)]
pub struct ClipExtractor {
    ffmpeg: PathBuf,
    clip: ClipSection,
    transcode_timeout: Duration,
    probe: DurationProbe,
    executor: Arc<dyn CommandExecutor>,
    offsets: Arc<dyn OffsetSource>,
}

impl fmt::Debug for ClipExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipExtractor")
            .field("ffmpeg", &self.ffmpeg)
            .field("clip", &self.clip)
            .field("transcode_timeout", &self.transcode_timeout)
            .field("probe", &self.probe)
            .finish()
    }
}

impl ClipExtractor {
    pub fn new(config: &UpnextConfig, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        let probe = DurationProbe::new(
            config.tools.ffmpeg.clone(),
            config.tools.probe_timeout(),
            Some(Arc::clone(&executor)),
        );
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            clip: config.clip.clone(),
            transcode_timeout: config.tools.transcode_timeout(),
            probe,
            executor,
            offsets: Arc::new(RandomOffset),
        }
    }

    pub fn with_offset_source(mut self, offsets: Arc<dyn OffsetSource>) -> Self {
        self.offsets = offsets;
        self
    }

    pub async fn extract_clip(
        &self,
        program_title: &str,
        source_path: &Path,
        output_dir: &Path,
    ) -> ExtractionResult<ClipOutcome> {
        self.run(&ClipJob::new(program_title, source_path, output_dir))
            .await
    }

    pub async fn run(&self, job: &ClipJob) -> ExtractionResult<ClipOutcome> {
        info!(
            title = %job.program_title,
            source = %job.source_path.display(),
            "extracting clip"
        );
        let source_duration = self.probe.probe_duration(&job.source_path).await?;
        let start_offset = self.choose_start(source_duration);
        if source_duration <= self.clip.duration_seconds {
            info!(
                title = %job.program_title,
                source_duration,
                "source shorter than clip length, using whole file"
            );
        }

        if let Some(parent) = job.output_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ExtractionError::Io {
                    source,
                    path: parent.to_path_buf(),
                })?;
        }

        let args = self.transcode_args(&job.source_path, start_offset, &job.output_path);
        let command = render_command(&self.ffmpeg, &args);
        debug!(%command, "running transcoder");

        let output = match timeout(
            self.transcode_timeout,
            self.executor.run(&self.ffmpeg, &args),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                self.discard_partial(&job.output_path).await;
                return Err(ExtractionError::Command(error));
            }
            Err(_) => {
                self.discard_partial(&job.output_path).await;
                return Err(ExtractionError::Timeout(self.transcode_timeout));
            }
        };
        if !output.status.success() {
            self.discard_partial(&job.output_path).await;
            return Err(ExtractionError::CommandFailure {
                command,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            title = %job.program_title,
            output = %job.output_path.display(),
            start_offset,
            "clip saved"
        );
        Ok(ClipOutcome {
            output_path: job.output_path.clone(),
            start_offset,
            source_duration,
        })
    }

    /// Start offset within `[0, max(0, duration - clip length)]`. A
    /// non-finite duration starts at 0.
    pub fn choose_start(&self, source_duration: f64) -> f64 {
        let max_start = (source_duration - self.clip.duration_seconds).max(0.0);
        if !max_start.is_finite() {
            return 0.0;
        }
        let picked = self.offsets.pick(max_start);
        if picked.is_finite() {
            picked.clamp(0.0, max_start)
        } else {
            0.0
        }
    }

    pub fn transcode_args(&self, source: &Path, start_offset: f64, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-ss"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(format!("{start_offset:.3}").into());
        args.push("-i".into());
        args.push(source.as_os_str().to_os_string());
        args.extend(
            [
                "-map".to_string(),
                "0:v:0".to_string(),
                "-t".to_string(),
                self.clip.duration_seconds.to_string(),
                "-vf".to_string(),
                format!("scale={}:{}", self.clip.width, self.clip.height),
                "-c:v".to_string(),
                self.clip.video_codec.clone(),
                "-pix_fmt".to_string(),
                self.clip.pixel_format.clone(),
                "-crf".to_string(),
                self.clip.crf.to_string(),
                "-preset".to_string(),
                self.clip.preset.clone(),
                "-an".to_string(),
                "-movflags".to_string(),
                "+faststart".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_os_string());
        args
    }

    async fn discard_partial(&self, output: &Path) {
        match fs::remove_file(output).await {
            Ok(()) => warn!(path = %output.display(), "removed partial clip"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %output.display(), %error, "failed to remove partial clip")
            }
        }
    }
}
