use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::{Captures, Regex};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::matcher::UNKNOWN_YEAR;

pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("guide endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type GuideResult<T> = Result<T, GuideError>;

/// One broadcast listing from the guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramEntry {
    pub title: String,
    pub category: String,
    pub release_year: String,
}

impl ProgramEntry {
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        release_year: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            release_year: release_year.into(),
        }
    }

    pub fn is_movie(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case("movie")
    }

    /// Year to pass to the matcher; only movies carry one.
    pub fn match_year(&self) -> Option<&str> {
        if self.is_movie() {
            Some(self.release_year.as_str())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuideClient {
    http: Client,
    language: String,
}

impl GuideClient {
    pub fn new(language: impl Into<String>, timeout: Duration) -> GuideResult<Self> {
        let http = Client::builder()
            .user_agent("upnext/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            language: language.into(),
        })
    }

    pub async fn fetch(&self, url: &str) -> GuideResult<Vec<ProgramEntry>> {
        info!(%url, "fetching guide");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GuideError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        let programmes = parse_programmes(&body, &self.language);
        info!(count = programmes.len(), "guide entries extracted");
        Ok(programmes)
    }
}

pub fn load_programmes(path: &Path, language: &str) -> GuideResult<Vec<ProgramEntry>> {
    let body = std::fs::read_to_string(path).map_err(|source| GuideError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(parse_programmes(&body, language))
}

/// Extracts title, category and release year from every `<programme>` of an
/// XMLTV document, in document order.
pub fn parse_programmes(xml: &str, language: &str) -> Vec<ProgramEntry> {
    let patterns = GuidePatterns::new();
    let mut programmes = Vec::new();
    for block in patterns.programme.captures_iter(xml) {
        let body = block.get(1).map(|m| m.as_str()).unwrap_or_default();
        let Some(title) = patterns.localized(&patterns.title, body, language) else {
            warn!("guide programme without title skipped");
            continue;
        };
        let title = title.trim().to_string();
        if title.is_empty() {
            warn!("guide programme with empty title skipped");
            continue;
        }
        let category = patterns
            .localized(&patterns.category, body, language)
            .map(|category| category.trim().to_string())
            .filter(|category| !category.is_empty())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let mut entry = ProgramEntry::new(title, category, UNKNOWN_YEAR);
        if entry.is_movie() {
            if let Some(year) = patterns
                .date
                .captures(body)
                .and_then(|capture| capture.get(1))
                .and_then(|date| leading_year(date.as_str()))
            {
                entry.release_year = year;
            }
        }
        programmes.push(entry);
    }
    programmes
}

struct GuidePatterns {
    programme: Regex,
    title: Regex,
    category: Regex,
    date: Regex,
    lang: Regex,
    entity: Regex,
}

impl GuidePatterns {
    fn new() -> Self {
        Self {
            programme: Regex::new(r"(?s)<programme\b[^>]*>(.*?)</programme>")
                .expect("valid regex"),
            title: Regex::new(r#"(?s)<title\b([^>]*)>(.*?)</title>"#).expect("valid regex"),
            category: Regex::new(r#"(?s)<category\b([^>]*)>(.*?)</category>"#)
                .expect("valid regex"),
            date: Regex::new(r"(?s)<date\b[^>]*>(.*?)</date>").expect("valid regex"),
            lang: Regex::new(r#"lang\s*=\s*["']([^"']*)["']"#).expect("valid regex"),
            entity: Regex::new(r"&(#[xX][0-9A-Fa-f]+|#[0-9]+|[A-Za-z]+);").expect("valid regex"),
        }
    }

    /// Element text in the requested language, falling back to the first one.
    fn localized(&self, element: &Regex, body: &str, language: &str) -> Option<String> {
        let mut first = None;
        for capture in element.captures_iter(body) {
            let attributes = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let text = self.decode(capture.get(2).map(|m| m.as_str()).unwrap_or_default());
            let lang = self
                .lang
                .captures(attributes)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str());
            if lang == Some(language) {
                return Some(text);
            }
            if first.is_none() {
                first = Some(text);
            }
        }
        first
    }

    /// Resolves predefined entities and numeric character references in one
    /// pass. Unknown names and invalid code points are kept verbatim.
    fn decode(&self, text: &str) -> String {
        self.entity
            .replace_all(text, |caps: &Captures| {
                let reference = &caps[1];
                let decoded = match reference {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "amp" => Some('&'),
                    _ => reference.strip_prefix('#').and_then(|number| {
                        let hex = number.strip_prefix('x').or_else(|| number.strip_prefix('X'));
                        let code = match hex {
                            Some(hex) => u32::from_str_radix(hex, 16).ok(),
                            None => number.parse::<u32>().ok(),
                        };
                        code.and_then(char::from_u32)
                    }),
                };
                decoded.map_or_else(|| caps[0].to_string(), String::from)
            })
            .into_owned()
    }
}

fn leading_year(date: &str) -> Option<String> {
    let date = date.trim();
    let year: String = date.chars().take(4).collect();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Some(year)
    } else {
        None
    }
}
