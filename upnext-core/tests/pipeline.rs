use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
#[cfg(windows)]
use std::os::windows::process::ExitStatusExt;

use upnext_core::media::{CommandExecutor, OffsetSource};
use upnext_core::{
    is_processed, parse_upnext_config, FilenameNormalizer, MediaFileRecord, Pipeline,
    ProgramEntry, ProgramStatus, UpnextConfig,
};

type RecordedCalls = Arc<Mutex<Vec<Vec<OsString>>>>;

/// Answers probes with a fixed duration and fakes the transcoder by writing
/// the output file, failing for sources listed in `failing`.
struct FakeFfmpeg {
    duration: &'static str,
    failing: HashSet<String>,
    calls: RecordedCalls,
}

impl FakeFfmpeg {
    fn build(failing: &[&str]) -> (Arc<dyn CommandExecutor>, RecordedCalls) {
        let calls: RecordedCalls = Arc::new(Mutex::new(Vec::new()));
        let executor: Arc<dyn CommandExecutor> = Arc::new(Self {
            duration: "00:42:10.50",
            failing: failing.iter().map(|name| name.to_string()).collect(),
            calls: Arc::clone(&calls),
        });
        (executor, calls)
    }
}

#[async_trait]
impl CommandExecutor for FakeFfmpeg {
    async fn run(&self, _program: &Path, args: &[OsString]) -> std::io::Result<Output> {
        self.calls.lock().unwrap().push(args.to_vec());
        let input = args
            .iter()
            .position(|arg| arg == "-i")
            .and_then(|index| args.get(index + 1))
            .map(PathBuf::from)
            .unwrap_or_default();
        if !args.iter().any(|arg| arg == "-map") {
            return Ok(Output {
                status: ExitStatus::from_raw(1 << 8),
                stdout: Vec::new(),
                stderr: format!("  Duration: {}, start: 0.000000\n", self.duration).into_bytes(),
            });
        }
        let file_name = input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&file_name) {
            return Ok(Output {
                status: ExitStatus::from_raw(1 << 8),
                stdout: Vec::new(),
                stderr: b"Invalid data found when processing input".to_vec(),
            });
        }
        let output = PathBuf::from(args.last().unwrap());
        std::fs::write(output, b"clip")?;
        Ok(Output {
            status: ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

struct FixedOffset(f64);

impl OffsetSource for FixedOffset {
    fn pick(&self, _max_start: f64) -> f64 {
        self.0
    }
}

fn test_config(base: &TempDir, concurrency: usize) -> UpnextConfig {
    let media = base.path().join("media");
    let output = base.path().join("programmes");
    parse_upnext_config(&format!(
        "[paths]\nmedia_dir = {:?}\noutput_dir = {:?}\n\n[limits]\nmax_concurrent_extractions = {}\n",
        media.display().to_string(),
        output.display().to_string(),
        concurrency
    ))
    .unwrap()
}

fn library(names: &[&str]) -> Vec<MediaFileRecord> {
    let normalizer = FilenameNormalizer::default();
    names
        .iter()
        .map(|name| MediaFileRecord::new(PathBuf::from("/srv/media").join(name), &normalizer))
        .collect()
}

fn transcodes(calls: &RecordedCalls) -> usize {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|args| args.iter().any(|arg| arg == "-map"))
        .count()
}

#[tokio::test]
async fn second_run_skips_processed_programs() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, calls) = FakeFfmpeg::build(&[]);
    let pipeline = Pipeline::new(&config, Some(executor));
    let files = library(&["Late.News.S01E02.1080p.mkv"]);
    let programs = vec![ProgramEntry::new("Late News", "News", "Unknown")];

    let first = pipeline.process_programs(&programs, &files).await.unwrap();
    assert_eq!(first.status_of("Late News"), Some(ProgramStatus::Processed));
    assert!(is_processed("Late News", &config.paths.output_dir));
    assert_eq!(transcodes(&calls), 1);

    let second = pipeline.process_programs(&programs, &files).await.unwrap();
    assert_eq!(
        second.status_of("Late News"),
        Some(ProgramStatus::SkippedAlreadyDone)
    );
    assert_eq!(transcodes(&calls), 1);
}

#[tokio::test]
async fn one_failed_extraction_does_not_stop_the_batch() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, calls) = FakeFfmpeg::build(&["Broken.Show.S02E01.mkv"]);
    let pipeline = Pipeline::new(&config, Some(executor));
    let files = library(&[
        "Morning.Show.S01E01.720p.mkv",
        "Broken.Show.S02E01.mkv",
        "Evening.Quiz.S03E07.mp4",
    ]);
    let programs = vec![
        ProgramEntry::new("Morning Show", "Talk", "Unknown"),
        ProgramEntry::new("Broken Show", "Drama", "Unknown"),
        ProgramEntry::new("Evening Quiz", "Game", "Unknown"),
    ];

    let report = pipeline.process_programs(&programs, &files).await.unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            ProgramStatus::Processed,
            ProgramStatus::ExtractionFailed,
            ProgramStatus::Processed,
        ]
    );
    let failed = &report.outcomes[1];
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("Invalid data found"));
    assert!(!config.paths.output_dir.join("Broken Show.mp4").exists());
    assert!(config.paths.output_dir.join("Evening Quiz.mp4").exists());
    assert_eq!(transcodes(&calls), 3);
    assert!(report.has_failures());
}

#[tokio::test]
async fn unmatched_programs_are_reported() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, calls) = FakeFfmpeg::build(&[]);
    let pipeline = Pipeline::new(&config, Some(executor));
    let files = library(&["Cooking.With.Gas.S01E01.mp4"]);
    let programs = vec![ProgramEntry::new("Zyxw Qvrt", "Documentary", "Unknown")];

    let report = pipeline.process_programs(&programs, &files).await.unwrap();

    assert_eq!(report.status_of("Zyxw Qvrt"), Some(ProgramStatus::NoMatch));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_library_yields_no_match() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, _) = FakeFfmpeg::build(&[]);
    let pipeline = Pipeline::new(&config, Some(executor));
    let programs = vec![ProgramEntry::new("Anything", "Movie", "2001")];

    let report = pipeline.process_programs(&programs, &[]).await.unwrap();

    assert_eq!(report.count(ProgramStatus::NoMatch), 1);
}

#[tokio::test]
async fn release_year_only_counts_for_movies() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, _) = FakeFfmpeg::build(&[]);
    let pipeline = Pipeline::new(&config, Some(executor));
    let files = library(&["Heat (1986).mkv", "Heat (1995).mkv"]);

    let movie = vec![ProgramEntry::new("Heat", "movie", "1995")];
    let report = pipeline.process_programs(&movie, &files).await.unwrap();
    let matched = report.outcomes[0].matched.as_ref().unwrap();
    assert_eq!(matched.path, PathBuf::from("/srv/media/Heat (1995).mkv"));

    std::fs::remove_file(config.paths.output_dir.join("Heat.mp4")).unwrap();

    let series = vec![ProgramEntry::new("Heat", "Series", "1995")];
    let report = pipeline.process_programs(&series, &files).await.unwrap();
    let matched = report.outcomes[0].matched.as_ref().unwrap();
    assert_eq!(matched.path, PathBuf::from("/srv/media/Heat (1986).mkv"));
}

#[tokio::test]
async fn injected_offset_reaches_the_transcoder() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, calls) = FakeFfmpeg::build(&[]);
    let pipeline =
        Pipeline::new(&config, Some(executor)).with_offset_source(Arc::new(FixedOffset(125.25)));
    let files = library(&["Late.News.S01E02.1080p.mkv"]);
    let programs = vec![ProgramEntry::new("Late News", "News", "Unknown")];

    let report = pipeline.process_programs(&programs, &files).await.unwrap();

    let clip = report.outcomes[0].clip.as_ref().unwrap();
    assert_eq!(clip.start_offset, 125.25);
    assert!((clip.source_duration - 2530.5).abs() < 1e-9);
    let calls = calls.lock().unwrap();
    let transcode = calls.iter().find(|args| args.iter().any(|a| a == "-map")).unwrap();
    let ss = transcode.iter().position(|arg| arg == "-ss").unwrap();
    assert_eq!(transcode[ss + 1].to_str(), Some("125.250"));
}

#[tokio::test]
async fn concurrent_workers_extract_each_title_once() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 4);
    let (executor, calls) = FakeFfmpeg::build(&[]);
    let pipeline = Pipeline::new(&config, Some(executor));
    let files = library(&["Late.News.S01E02.1080p.mkv", "Evening.Quiz.S03E07.mp4"]);
    let programs = vec![
        ProgramEntry::new("Late News", "News", "Unknown"),
        ProgramEntry::new("Late News", "News", "Unknown"),
        ProgramEntry::new("Evening Quiz", "Game", "Unknown"),
        ProgramEntry::new(" Late News ", "News", "Unknown"),
    ];

    let report = pipeline.process_programs(&programs, &files).await.unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            ProgramStatus::Processed,
            ProgramStatus::SkippedAlreadyDone,
            ProgramStatus::Processed,
            ProgramStatus::SkippedAlreadyDone,
        ]
    );
    assert_eq!(transcodes(&calls), 2);
}

#[tokio::test]
async fn output_directory_is_created() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base, 1);
    let (executor, _) = FakeFfmpeg::build(&[]);
    let pipeline = Pipeline::new(&config, Some(executor));
    assert!(!config.paths.output_dir.exists());

    pipeline.process_programs(&[], &[]).await.unwrap();

    assert!(config.paths.output_dir.is_dir());
}
