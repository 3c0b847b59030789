use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use upnext_core::matcher::Matcher;
use upnext_core::media::SeededOffset;
use upnext_core::{
    load_programmes, load_upnext_config, scan_library, FilenameNormalizer, GuideClient,
    MediaFileRecord, Pipeline, PipelineReport, ProgramEntry, ProgramStatus, UpnextConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] upnext_core::ConfigError),
    #[error("guide error: {0}")]
    Guide(#[from] upnext_core::GuideError),
    #[error("library error: {0}")]
    Library(#[from] upnext_core::LibraryError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] upnext_core::PipelineError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no guide source configured (set guide.url, --guide-url or --guide-file)")]
    MissingGuide,
    #[error("{0} program(s) failed extraction")]
    BatchFailures(usize),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Matches guide listings to local media and cuts up-next clips", long_about = None)]
pub struct Cli {
    /// Path to upnext.toml
    #[arg(long, default_value = "configs/upnext.toml")]
    pub config: PathBuf,
    /// Overrides paths.media_dir
    #[arg(long)]
    pub media_dir: Option<PathBuf>,
    /// Overrides paths.output_dir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Overrides guide.url
    #[arg(long)]
    pub guide_url: Option<String>,
    /// Reads the guide from a local XMLTV file instead of fetching it
    #[arg(long, conflicts_with = "guide_url")]
    pub guide_file: Option<PathBuf>,
    /// Seeds clip start offsets for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the guide, scan the library and process one batch
    Run,
    /// Repeat `run` every schedule.scan_interval_seconds until interrupted
    Watch(WatchArgs),
    /// List media files with their normalized titles
    Scan,
    /// List guide entries
    Guide,
    /// Show the best library match for a title without extracting
    Match(MatchArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Overrides schedule.scan_interval_seconds
    #[arg(long)]
    pub interval_seconds: Option<u64>,
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Program title as listed in the guide
    pub title: String,
    /// Release year, appended to the query as in movie listings
    #[arg(long)]
    pub year: Option<String>,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Run => {
            let report = runtime.block_on(context.run_batch())?;
            render(&BatchView::from(&report), cli.format)?;
            if report.has_failures() {
                return Err(AppError::BatchFailures(
                    report.count(ProgramStatus::ExtractionFailed),
                ));
            }
        }
        Commands::Watch(args) => {
            let interval = Duration::from_secs(
                args.interval_seconds
                    .unwrap_or(context.config.schedule.scan_interval_seconds),
            );
            runtime.block_on(context.watch(interval, cli.format))?;
        }
        Commands::Scan => {
            let records = context.scan()?;
            render(&LibraryView { records }, cli.format)?;
        }
        Commands::Guide => {
            let programmes = runtime.block_on(context.programmes())?;
            render(&GuideView { programmes }, cli.format)?;
        }
        Commands::Match(args) => {
            let view = context.match_title(args)?;
            render(&view, cli.format)?;
        }
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: UpnextConfig,
    guide_file: Option<PathBuf>,
    seed: Option<u64>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_upnext_config(&cli.config)?;
        apply_overrides(&mut config, cli);
        Ok(Self {
            config,
            guide_file: cli.guide_file.clone(),
            seed: cli.seed,
        })
    }

    fn normalizer(&self) -> Result<FilenameNormalizer> {
        Ok(FilenameNormalizer::new(&self.config.matching)?)
    }

    fn pipeline(&self) -> Pipeline {
        let pipeline = Pipeline::new(&self.config, None);
        match self.seed {
            Some(seed) => pipeline.with_offset_source(Arc::new(SeededOffset::new(seed))),
            None => pipeline,
        }
    }

    fn scan(&self) -> Result<Vec<MediaFileRecord>> {
        let normalizer = self.normalizer()?;
        Ok(scan_library(
            &self.config.paths.media_dir,
            &self.config.library,
            &normalizer,
        )?)
    }

    async fn programmes(&self) -> Result<Vec<ProgramEntry>> {
        let language = &self.config.guide.language;
        if let Some(path) = &self.guide_file {
            return Ok(load_programmes(path, language)?);
        }
        let url = self.config.guide.url.as_deref().ok_or(AppError::MissingGuide)?;
        let client = GuideClient::new(
            language.clone(),
            Duration::from_secs(self.config.guide.request_timeout_seconds),
        )?;
        Ok(client.fetch(url).await?)
    }

    async fn run_batch(&self) -> Result<PipelineReport> {
        let programmes = self.programmes().await?;
        let files = self.scan()?;
        Ok(self.pipeline().process_programs(&programmes, &files).await?)
    }

    async fn watch(&self, interval: Duration, format: OutputFormat) -> Result<()> {
        loop {
            let cycle = async {
                match self.run_batch().await {
                    Ok(report) => render(&BatchView::from(&report), format),
                    Err(error) => {
                        warn!(%error, "batch failed, retrying next cycle");
                        Ok(())
                    }
                }
            };
            tokio::select! {
                result = cycle => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping");
                    return Ok(());
                }
            }
            info!(seconds = interval.as_secs(), "waiting for next cycle");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping");
                    return Ok(());
                }
            }
        }
    }

    fn match_title(&self, args: &MatchArgs) -> Result<MatchView> {
        let files = self.scan()?;
        let matcher = Matcher::new(self.config.matching.threshold);
        let query = Matcher::build_query(args.title.trim(), args.year.as_deref());
        let best = matcher.best_candidate(&query, &files).ok().flatten();
        let accepted = best
            .as_ref()
            .map(|best| best.score > matcher.threshold())
            .unwrap_or(false);
        Ok(MatchView {
            query,
            threshold: matcher.threshold(),
            path: best.as_ref().map(|best| best.path.clone()),
            score: best.map(|best| best.score),
            accepted,
        })
    }
}

fn apply_overrides(config: &mut UpnextConfig, cli: &Cli) {
    if let Some(dir) = &cli.media_dir {
        config.paths.media_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(url) = &cli.guide_url {
        config.guide.url = Some(url.clone());
    }
}

#[derive(Debug, Serialize)]
pub struct BatchView {
    pub rows: Vec<BatchRow>,
    pub processed: usize,
    pub skipped: usize,
    pub no_match: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchRow {
    pub title: String,
    pub status: ProgramStatus,
    pub source: Option<PathBuf>,
    pub score: Option<f64>,
    pub output: Option<PathBuf>,
    pub start_offset: Option<f64>,
    pub error: Option<String>,
}

impl From<&PipelineReport> for BatchView {
    fn from(report: &PipelineReport) -> Self {
        let rows = report
            .outcomes
            .iter()
            .map(|outcome| BatchRow {
                title: outcome.title.clone(),
                status: outcome.status,
                source: outcome.matched.as_ref().map(|m| m.path.clone()),
                score: outcome.matched.as_ref().map(|m| m.score),
                output: outcome.clip.as_ref().map(|c| c.output_path.clone()),
                start_offset: outcome.clip.as_ref().map(|c| c.start_offset),
                error: outcome.error.clone(),
            })
            .collect();
        Self {
            rows,
            processed: report.count(ProgramStatus::Processed),
            skipped: report.count(ProgramStatus::SkippedAlreadyDone),
            no_match: report.count(ProgramStatus::NoMatch),
            failed: report.count(ProgramStatus::ExtractionFailed),
        }
    }
}

impl DisplayFallback for BatchView {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for row in &self.rows {
            let mut line = format!("[{}] {}", row.status, row.title);
            if let (Some(source), Some(score)) = (&row.source, row.score) {
                line.push_str(&format!(" <- {} ({score:.1})", source.display()));
            }
            if let (Some(output), Some(start)) = (&row.output, row.start_offset) {
                line.push_str(&format!(" -> {} @ {start:.2}s", output.display()));
            }
            if let Some(error) = &row.error {
                line.push_str(&format!(" error: {error}"));
            }
            lines.push(line);
        }
        lines.push(format!(
            "processed={} skipped={} no_match={} failed={}",
            self.processed, self.skipped, self.no_match, self.failed
        ));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct LibraryView {
    pub records: Vec<MediaFileRecord>,
}

impl DisplayFallback for LibraryView {
    fn display(&self) -> String {
        if self.records.is_empty() {
            return "No media files found".to_string();
        }
        self.records
            .iter()
            .map(|record| {
                format!(
                    "{} | {}",
                    record.normalized_title,
                    record.absolute_path.display()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct GuideView {
    pub programmes: Vec<ProgramEntry>,
}

impl DisplayFallback for GuideView {
    fn display(&self) -> String {
        if self.programmes.is_empty() {
            return "Guide is empty".to_string();
        }
        self.programmes
            .iter()
            .map(|entry| {
                format!(
                    "{} | category={} | year={}",
                    entry.title, entry.category, entry.release_year
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct MatchView {
    pub query: String,
    pub threshold: f64,
    pub path: Option<PathBuf>,
    pub score: Option<f64>,
    pub accepted: bool,
}

impl DisplayFallback for MatchView {
    fn display(&self) -> String {
        match (&self.path, self.score) {
            (Some(path), Some(score)) => format!(
                "{} -> {} (score {score:.1}, threshold {:.1}, {})",
                self.query,
                path.display(),
                self.threshold,
                if self.accepted { "accepted" } else { "rejected" }
            ),
            _ => format!("{} -> no candidates", self.query),
        }
    }
}
