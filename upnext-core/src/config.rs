use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpnextConfig {
    pub paths: PathsSection,
    #[serde(default)]
    pub guide: GuideSection,
    #[serde(default)]
    pub library: LibrarySection,
    #[serde(default)]
    pub matching: MatchingSection,
    #[serde(default)]
    pub clip: ClipSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

impl UpnextConfig {
    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.matching.threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.threshold must be within 0..=100, got {}",
                self.matching.threshold
            )));
        }
        if self.limits.max_concurrent_extractions == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_concurrent_extractions must be greater than zero".into(),
            ));
        }
        if self.clip.duration_seconds <= 0.0 {
            return Err(ConfigError::Invalid(
                "clip.duration_seconds must be greater than zero".into(),
            ));
        }
        if self.clip.width == 0 || self.clip.height == 0 {
            return Err(ConfigError::Invalid(
                "clip.width and clip.height must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub media_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuideSection {
    pub url: Option<String>,
    pub language: String,
    pub request_timeout_seconds: u64,
}

impl Default for GuideSection {
    fn default() -> Self {
        Self {
            url: None,
            language: "en".into(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    pub extensions: Vec<String>,
    pub skip_prefix: String,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            extensions: vec![".mp4".into(), ".mkv".into(), ".avi".into(), ".mov".into()],
            skip_prefix: "._".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingSection {
    /// Scores must be strictly greater than this to be accepted.
    pub threshold: f64,
    pub episode_pattern: String,
    pub episode_case_insensitive: bool,
    pub quality_tags: Vec<String>,
    pub quality_case_insensitive: bool,
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            episode_pattern: r"\bS\d{1,2}E\d{1,2}\b".into(),
            episode_case_insensitive: false,
            quality_tags: [
                "480p", "720p", "1080p", "2160p", "HD", "UHD", "DVDRip", "BluRay", "BRRip",
                "HDRip",
            ]
            .iter()
            .map(|tag| tag.to_string())
            .collect(),
            quality_case_insensitive: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClipSection {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub pixel_format: String,
    pub crf: u32,
    pub preset: String,
}

impl Default for ClipSection {
    fn default() -> Self {
        Self {
            duration_seconds: 10.0,
            width: 1920,
            height: 1080,
            video_codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
            crf: 23,
            preset: "medium".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub ffmpeg: PathBuf,
    pub probe_timeout_seconds: u64,
    pub transcode_timeout_seconds: u64,
}

impl ToolsSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_seconds)
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            probe_timeout_seconds: 30,
            transcode_timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_concurrent_extractions: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_concurrent_extractions: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub scan_interval_seconds: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            scan_interval_seconds: 3600,
        }
    }
}

pub fn load_upnext_config<P: AsRef<Path>>(path: P) -> Result<UpnextConfig> {
    let config: UpnextConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_upnext_config(contents: &str) -> Result<UpnextConfig> {
    let config: UpnextConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        source,
        path: PathBuf::from("<inline>"),
    })?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/upnext.toml");
        let config = load_upnext_config(path).expect("config should parse");
        assert_eq!(config.paths.output_dir, PathBuf::from("./programmes"));
        assert_eq!(config.matching.threshold, 60.0);
        assert_eq!(config.clip.crf, 23);
        assert_eq!(config.library.extensions.len(), 4);
        assert_eq!(config.limits.max_concurrent_extractions, 1);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = parse_upnext_config(
            r#"
            [paths]
            media_dir = "/srv/media"
            output_dir = "/srv/programmes"
            "#,
        )
        .unwrap();
        assert_eq!(config.guide.language, "en");
        assert!(!config.matching.episode_case_insensitive);
        assert!(config.matching.quality_case_insensitive);
        assert_eq!(config.clip.width, 1920);
        assert_eq!(config.clip.height, 1080);
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.schedule.scan_interval_seconds, 3600);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = parse_upnext_config(
            r#"
            [paths]
            media_dir = "/srv/media"
            output_dir = "/srv/programmes"

            [limits]
            max_concurrent_extractions = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
