use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tokio::time::timeout;
use tracing::debug;

use super::error::{ProbeError, ProbeResult};
use super::{CommandExecutor, SystemCommandExecutor};

/// Reads a file's total duration from the diagnostics ffmpeg prints for
/// `ffmpeg -i <file>`.
#[derive(Clone)]
pub struct DurationProbe {
    ffmpeg: PathBuf,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for DurationProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurationProbe")
            .field("ffmpeg", &self.ffmpeg)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DurationProbe {
    pub fn new(
        ffmpeg: PathBuf,
        timeout: Duration,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            ffmpeg,
            timeout,
            executor,
        }
    }

    /// Duration in seconds. The inspection exit status is ignored; ffmpeg
    /// exits non-zero when no output is given but still reports the input.
    pub async fn probe_duration(&self, path: &Path) -> ProbeResult<f64> {
        let args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-i".into(),
            path.as_os_str().to_os_string(),
        ];
        let output = match timeout(self.timeout, self.executor.run(&self.ffmpeg, &args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Command {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(_) => {
                return Err(ProbeError::Timeout {
                    path: path.to_path_buf(),
                    timeout: self.timeout,
                })
            }
        };
        let diagnostics = String::from_utf8_lossy(&output.stderr);
        let duration = parse_duration(path, &diagnostics)?;
        debug!(path = %path.display(), duration, "probed duration");
        Ok(duration)
    }
}

/// Parses the first `Duration: HH:MM:SS.ff,` line of ffmpeg diagnostics.
pub fn parse_duration(path: &Path, diagnostics: &str) -> ProbeResult<f64> {
    let line = diagnostics
        .lines()
        .find(|line| line.contains("Duration"))
        .ok_or_else(|| ProbeError::MissingDuration {
            path: path.to_path_buf(),
        })?;
    let invalid = |value: &str| ProbeError::InvalidDuration {
        path: path.to_path_buf(),
        value: value.to_string(),
    };
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| invalid(line.trim()))?;
    let value = token.trim_end_matches(',');

    let captures = duration_pattern()
        .captures(value)
        .ok_or_else(|| invalid(value))?;
    let field = |index: usize| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| invalid(value))
    };
    let total = field(1)? * 3600.0 + field(2)? * 60.0 + field(3)?;
    if total.is_finite() {
        Ok(total)
    } else {
        Err(invalid(value))
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+):(\d{2}):(\d{2}(?:\.\d+)?)$").expect("valid regex")
    })
}
