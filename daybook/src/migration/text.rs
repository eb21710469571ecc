//! Path, date and title heuristics for third-party exports.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

pub const FALLBACK_TITLE: &str = "Migrated item";
pub const MAX_TITLE_CHARS: usize = 120;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})-([0-9]{2})-([0-9]{2})").expect("static regex"));
static KOREAN_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{4})년\s*([0-9]{1,2})월\s*([0-9]{1,2})일").expect("static regex")
});
// Notion appends a 32-hex export id to page names
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+[0-9a-f]{32}$").expect("static regex"));

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// First `YYYY-MM-DD`, else first `YYYY년 M월 D일`, found anywhere in `source`.
pub fn find_date(source: &str) -> Option<NaiveDate> {
    if let Some(c) = ISO_DATE.captures(source) {
        if let Some(date) = ymd(&c[1], &c[2], &c[3]) {
            return Some(date);
        }
    }
    KOREAN_DATE
        .captures(source)
        .and_then(|c| ymd(&c[1], &c[2], &c[3]))
}

/// Trim, drop a trailing export id, fall back when blank.
pub fn normalize_title(raw: &str) -> String {
    let stripped = TRAILING_ID.replace(raw.trim(), "");
    let title = stripped.trim();
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title.to_string()
    }
}

/// First line, cut to the title length.
pub fn clip_title(raw: &str) -> String {
    let first = raw.lines().next().unwrap_or(raw).trim();
    first.chars().take(MAX_TITLE_CHARS).collect()
}

pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

pub fn dir_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

pub fn strip_extension(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

pub fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Segments below the first dated path segment, minus one. Archive
/// segments (`*.zip`) do not count.
pub fn level_from_date(path: &str) -> usize {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.trim().is_empty())
        .filter(|s| !s.to_ascii_lowercase().ends_with(".zip"))
        .collect();
    segments
        .iter()
        .position(|s| find_date(strip_extension(s)).is_some())
        .map_or(0, |idx| segments.len().saturating_sub(1 + idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_find_date() {
        assert_eq!(find_date("Daily 2024-03-05 notes"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(find_date("2024년 3월 5일 회의"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(find_date("2024년3월15일"), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(find_date("2024-02-30 then 2024년 1월 2일"), NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(find_date("no date"), None);
        assert_eq!(find_date("2024년 13월 1일"), None);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Weekly sync 0123456789abcdef0123456789ABCDEF "), "Weekly sync");
        assert_eq!(normalize_title("hash0123456789abcdef0123456789abcdef"), "hash0123456789abcdef0123456789abcdef");
        assert_eq!(normalize_title("   "), FALLBACK_TITLE);
    }

    #[test]
    fn test_clip_title() {
        assert_eq!(clip_title("first\nsecond"), "first");
        assert_eq!(clip_title(&"x".repeat(200)).len(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(file_name("a/b/c.md"), "c.md");
        assert_eq!(file_name("c.md"), "c.md");
        assert_eq!(dir_path("a/b/c.md"), "a/b");
        assert_eq!(dir_path("c.md"), "");
        assert_eq!(strip_extension("page.name.md"), "page.name");
        assert_eq!(depth("a/b/c"), 2);
    }

    #[test]
    fn test_level_from_date() {
        assert_eq!(level_from_date("upload.zip/export/2024-01-01/page.md"), 1);
        assert_eq!(level_from_date("upload.zip/2024-01-01/a/b/page.md"), 3);
        assert_eq!(level_from_date("upload.zip/2024-01-01.md"), 0);
        assert_eq!(level_from_date("upload.zip/notes/page.md"), 0);
        assert_eq!(level_from_date("2024-01-01.zip/x/y.md"), 0);
    }

    proptest! {
        #[test]
        fn normalize_title_is_idempotent(raw in "\\PC{0,60}") {
            let once = normalize_title(&raw);
            prop_assert_eq!(normalize_title(&once), once.clone());
            prop_assert!(!once.trim().is_empty());
        }
    }
}
