//! Utility functions for time handling, string manipulation, and file system operations.
//!
//! This module provides helper functions used throughout the pipeline:
//! - Run timestamps and their display strings ([`RunClock`])
//! - Publish-date formatting for chapter metadata
//! - Title slugification for chapter filenames
//! - String truncation for logging
//! - File system validation for the output directory

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static NOT_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]+").expect("valid regex"));
static HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

/// Parse an ISO-8601 timestamp into local time.
///
/// Accepts full RFC 3339 stamps (`2024-03-15T10:00:00Z`), naive date-times
/// (taken as local time) and bare dates (local midnight).
pub fn parse_iso(input: &str) -> Option<DateTime<Local>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Local));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

/// Format an article's publication timestamp for display.
///
/// A parsable timestamp gives a short `dd MMM` string such as `15 Mar`.
/// Anything else falls back to the current instant as a full ISO-8601
/// stamp, so the result is never empty.
pub fn format_publish_date(timestamp: Option<&str>) -> String {
    match timestamp.and_then(parse_iso) {
        Some(dt) => dt.format("%d %b").to_string(),
        None => Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// The local timestamp a run is stamped with.
///
/// Every name and title derived from the run time (EPUB filename, book
/// title, cover subtitle) goes through this so an override makes the whole
/// run reproducible.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    pub zoned: DateTime<Local>,
}

impl RunClock {
    /// Use `date_override` when it parses, otherwise the current time.
    pub fn new(date_override: Option<&str>) -> Self {
        let zoned = match date_override {
            Some(raw) => parse_iso(raw).unwrap_or_else(|| {
                warn!(date_override = %raw, "Unparsable date override; using current time");
                Local::now()
            }),
            None => Local::now(),
        };
        Self { zoned }
    }

    /// `yyyy-MM-dd`
    pub fn date_string(&self) -> String {
        self.zoned.format("%Y-%m-%d").to_string()
    }

    /// `HHmm`
    pub fn time_string(&self) -> String {
        self.zoned.format("%H%M").to_string()
    }

    /// `HH:mm`
    pub fn time_display(&self) -> String {
        self.zoned.format("%H:%M").to_string()
    }

    /// Full weekday name, e.g. `Friday`.
    pub fn day_of_week(&self) -> String {
        self.zoned.format("%A").to_string()
    }

    pub fn epub_filename(&self) -> String {
        format!("guardian-{}-{}.epub", self.date_string(), self.time_string())
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a headline into the slug used in chapter filenames.
///
/// Lowercases, turns whitespace runs into single hyphens, drops anything
/// outside `[a-z0-9-]`, collapses repeated hyphens and trims hyphens from
/// both ends. The result may be empty.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Ukraine: the latest"), "ukraine-the-latest");
/// ```
pub fn slugify_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    let stripped = NOT_SLUG.replace_all(&hyphenated, "");
    let collapsed = HYPHENS.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test
/// by creating and immediately deleting a probe file.
///
/// # Arguments
///
/// * `path` - The directory to check
///
/// # Errors
///
/// Returns the I/O error if the directory cannot be created or written to.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
