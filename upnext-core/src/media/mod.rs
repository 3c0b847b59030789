pub mod clip;
mod error;
pub mod probe;

use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

pub use clip::{ClipExtractor, ClipJob, ClipOutcome, OffsetSource, RandomOffset, SeededOffset};
pub use error::{ExtractionError, ExtractionResult, ProbeError, ProbeResult};
pub use probe::{parse_duration, DurationProbe};

/// Runs an external program to completion and hands back its output.
///
/// Arguments stay `OsString`s so file names reach the program byte for byte.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<Output>;
}

/// Spawns real processes. Children are killed when the pending call is
/// dropped, which is how timeouts and shutdown stop a running ffmpeg.
#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

pub(crate) fn render_command(program: &Path, args: &[OsString]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
