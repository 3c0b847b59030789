use regex::{Regex, RegexBuilder};

use crate::config::MatchingSection;
use crate::error::{ConfigError, Result};

/// Reduces a media filename to a title that can be compared against guide
/// entries.
///
/// Rules run in a fixed order: episode markers, quality/source tags, then
/// `.`/`_` separators become spaces and the result is trimmed. Nothing else
/// is touched, in particular case and file extensions are kept.
///
/// The episode rule and the quality rule carry their own case sensitivity.
#[derive(Debug, Clone)]
pub struct FilenameNormalizer {
    episode: Regex,
    quality: Option<Regex>,
}

impl FilenameNormalizer {
    pub fn new(section: &MatchingSection) -> Result<Self> {
        let episode = RegexBuilder::new(&section.episode_pattern)
            .case_insensitive(section.episode_case_insensitive)
            .build()
            .map_err(|err| ConfigError::Invalid(format!("episode_pattern: {err}")))?;

        let tags: Vec<String> = section
            .quality_tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(regex::escape)
            .collect();
        let quality = if tags.is_empty() {
            None
        } else {
            let pattern = format!(r"\b(?:{})\b", tags.join("|"));
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(section.quality_case_insensitive)
                .build()
                .map_err(|err| ConfigError::Invalid(format!("quality_tags: {err}")))?;
            Some(regex)
        };

        Ok(Self { episode, quality })
    }

    pub fn normalize(&self, raw: &str) -> String {
        let without_episode = self.episode.replace_all(raw, "");
        let without_quality = match &self.quality {
            Some(regex) => regex.replace_all(&without_episode, "").into_owned(),
            None => without_episode.into_owned(),
        };
        without_quality
            .chars()
            .map(|c| if c == '.' || c == '_' { ' ' } else { c })
            .collect::<String>()
            .trim()
            .to_string()
    }
}

impl Default for FilenameNormalizer {
    fn default() -> Self {
        Self::new(&MatchingSection::default()).expect("default matching rules compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_separators() {
        let normalizer = FilenameNormalizer::default();
        let table = [
            ("Show.Name.S01E02.1080p.mkv", "Show Name   mkv"),
            ("The.Matrix.1999.BluRay.mp4", "The Matrix 1999  mp4"),
            ("Nature.Docs.720P.HDRip.avi", "Nature Docs   avi"),
            // `_` is a word character, so tags glued with it are not bounded.
            ("Nature_Docs_720P_HDRip.avi", "Nature Docs 720P HDRip avi"),
            ("  plain title  ", "plain title"),
            ("Planet Earth II S2E10 UHD.mov", "Planet Earth II   mov"),
        ];
        for (input, expected) in table {
            assert_eq!(normalizer.normalize(input), expected, "input: {input}");
        }
    }

    #[test]
    fn episode_rule_is_case_sensitive_by_default() {
        let normalizer = FilenameNormalizer::default();
        assert_eq!(normalizer.normalize("Show s01e02.mkv"), "Show s01e02 mkv");

        let relaxed = FilenameNormalizer::new(&MatchingSection {
            episode_case_insensitive: true,
            ..MatchingSection::default()
        })
        .unwrap();
        assert_eq!(relaxed.normalize("Show s01e02.mkv"), "Show  mkv");
    }

    #[test]
    fn quality_rule_respects_word_boundaries() {
        let normalizer = FilenameNormalizer::default();
        assert_eq!(normalizer.normalize("HDTV Classics.mp4"), "HDTV Classics mp4");
        assert_eq!(normalizer.normalize("Shadow hd.mp4"), "Shadow  mp4");
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = FilenameNormalizer::default();
        for input in [
            "Show.Name.S01E02.1080p.mkv",
            "The.Matrix.1999.BluRay.mp4",
            "Some Movie (2004) [DVDRip].avi",
            "",
            "...",
            "News at Ten",
        ] {
            let once = normalizer.normalize(input);
            assert_eq!(normalizer.normalize(&once), once, "input: {input}");
        }
    }

    #[test]
    fn invalid_episode_pattern_is_a_config_error() {
        let err = FilenameNormalizer::new(&MatchingSection {
            episode_pattern: "(".into(),
            ..MatchingSection::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
