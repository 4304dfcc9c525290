use crate::error::{ImportError, ImportResult};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[cfg(test)]
mod tests;

fn capture_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"nfcapd\.([0-9]{12})([+-][0-9]{4})?$").expect("capture name regex is valid")
    })
}

/// Point in time a capture file covers, taken from its name.
#[derive(Debug, Clone, Copy)]
pub struct CaptureStamp {
    pub timestamp: i64,
    pub utc_offset_minutes: Option<i32>,
}

impl PartialEq for CaptureStamp {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for CaptureStamp {}

impl Ord for CaptureStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

impl PartialOrd for CaptureStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl CaptureStamp {
    pub fn date(&self) -> NaiveDate {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or_default()
    }
}

impl fmt::Display for CaptureStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.timestamp, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            None => write!(f, "@{}", self.timestamp),
        }
    }
}

/// Parses `nfcapd.YYYYMMDDHHMM[+-HHMM]`. The digits are read as UTC wall-clock.
pub fn parse_capture_name(name: &str) -> ImportResult<CaptureStamp> {
    let malformed = || ImportError::MalformedFilename(name.to_string());
    let caps = capture_name_regex().captures(name).ok_or_else(malformed)?;

    let digits = &caps[1];
    let naive = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M").map_err(|_| malformed())?;

    let utc_offset_minutes = match caps.get(2) {
        Some(m) => Some(parse_offset(m.as_str()).ok_or_else(malformed)?),
        None => None,
    };

    Ok(CaptureStamp {
        timestamp: naive.and_utc().timestamp(),
        utc_offset_minutes,
    })
}

fn parse_offset(raw: &str) -> Option<i32> {
    let (sign, rest) = raw.split_at(1);
    let hours: i32 = rest.get(..2)?.parse().ok()?;
    let minutes: i32 = rest.get(2..)?.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    let total = hours * 60 + minutes;
    Some(if sign == "-" { -total } else { total })
}

/// A capture file on disk, relative to a source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFile {
    pub path: PathBuf,
    pub stamp: CaptureStamp,
}

impl CaptureFile {
    pub fn from_path(path: impl Into<PathBuf>) -> ImportResult<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stamp = parse_capture_name(&name)?;
        Ok(Self { path, stamp })
    }

    /// Builds the `YYYY/MM/DD/<name>` form the tool resolves against a profile directory.
    pub fn in_day(date: NaiveDate, name: &str) -> ImportResult<Self> {
        Self::from_path(day_path(date).join(name))
    }

    pub fn timestamp(&self) -> i64 {
        self.stamp.timestamp
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Strips a `<source_dir>/` prefix off absolute paths so the tool can combine sources.
    pub fn relative_to(&self, source_dir: &Path) -> Self {
        match self.path.strip_prefix(source_dir) {
            Ok(rel) => Self {
                path: rel.to_path_buf(),
                stamp: self.stamp,
            },
            Err(_) => self.clone(),
        }
    }
}

pub fn day_path(date: NaiveDate) -> PathBuf {
    PathBuf::from(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(date.format("%d").to_string())
}
