use std::path::{Path, PathBuf};

use tracing::info;

const ARTIFACT_EXTENSION: &str = "mp4";
const FALLBACK_TITLE: &str = "untitled";

/// Makes a guide title safe to use as a single file name.
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`; leading dots are dropped so the name can neither be
/// hidden nor point at `.`/`..`.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = replaced.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Where the clip for `title` lives.
pub fn artifact_path(output_dir: &Path, title: &str) -> PathBuf {
    output_dir.join(format!("{}.{ARTIFACT_EXTENSION}", sanitize_title(title)))
}

/// A program counts as processed once its artifact exists.
pub fn is_processed(title: &str, output_dir: &Path) -> bool {
    let path = artifact_path(output_dir, title);
    let processed = path.is_file();
    if processed {
        info!(title, path = %path.display(), "already processed");
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_title("  The Matrix  "), "The Matrix");
        assert_eq!(sanitize_title("AC/DC: Live"), "AC_DC_ Live");
        assert_eq!(sanitize_title("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_title("What? Why*"), "What_ Why_");
        assert_eq!(sanitize_title("..."), "untitled");
        assert_eq!(sanitize_title(""), "untitled");
        assert_eq!(sanitize_title("Tab\there"), "Tab_here");
    }

    #[test]
    fn artifact_stays_inside_output_dir() {
        let dir = Path::new("/srv/programmes");
        let path = artifact_path(dir, "../escape/attempt");
        assert_eq!(path.parent(), Some(dir));
        assert_eq!(path, dir.join("_escape_attempt.mp4"));
    }

    #[test]
    fn guard_tracks_artifact_presence() {
        let dir = tempdir().unwrap();
        assert!(!is_processed("Late News", dir.path()));
        std::fs::write(dir.path().join("Late News.mp4"), b"clip").unwrap();
        assert!(is_processed("Late News", dir.path()));
        assert!(is_processed("  Late News ", dir.path()));
    }
}
