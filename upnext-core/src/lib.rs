pub mod config;
pub mod error;
pub mod guide;
pub mod library;
pub mod matcher;
pub mod media;
pub mod normalize;
pub mod pipeline;

pub use config::{load_upnext_config, parse_upnext_config, UpnextConfig};
pub use error::{ConfigError, Result};
pub use guide::{load_programmes, parse_programmes, GuideClient, GuideError, ProgramEntry};
pub use library::{scan_library, LibraryError, MediaFileRecord};
pub use matcher::{MatchResult, Matcher, ScoringError};
pub use media::{
    ClipExtractor, ClipJob, CommandExecutor, DurationProbe, ExtractionError, ProbeError,
    SystemCommandExecutor,
};
pub use normalize::FilenameNormalizer;
pub use pipeline::{
    is_processed, Pipeline, PipelineError, PipelineReport, ProgramOutcome, ProgramStatus,
};
