/// Capture date resolution
///
/// exiftool reports up to three date fields per file and they often disagree:
/// edited JPEGs get a fresh FileModifyDate, phones sometimes only write
/// CreateDate, scans have no DateTimeOriginal at all. This module picks:
/// - a display date: the most authoritative single field
/// - an original date: the oldest credible evidence
///
/// All dates are naive wall-clock times. Zone suffixes are dropped so values
/// from different fields stay comparable with each other.
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::time::SystemTime;

use super::RawMetadata;

/// Output format for manifest dates (fraction only when non-zero)
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Formats accepted after exiftool's `YYYY:MM:DD` has been normalized
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Dates derived for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    /// Best guess capture time, used for sorting
    pub display: NaiveDateTime,
    /// Earliest or most authoritative capture evidence
    pub original: NaiveDateTime,
}

/// Compute display and original dates for one exiftool record.
///
/// `fallback` is the file's own modification time and is used when none of
/// the tool-provided fields parse.
pub fn resolve(raw: &RawMetadata, fallback: NaiveDateTime) -> ResolvedDates {
    let original_capture = parse_field(&raw.date_time_original);
    let created = parse_field(&raw.create_date);
    let modified = parse_field(&raw.file_modify_date);

    let display = original_capture
        .or(created)
        .or(modified)
        .unwrap_or(fallback);

    let original = original_capture
        .or_else(|| [created, modified].into_iter().flatten().min())
        .unwrap_or(fallback);

    ResolvedDates { display, original }
}

/// Dates for a file we know nothing about except its mtime.
pub fn filesystem_dates(mtime: SystemTime) -> ResolvedDates {
    let at = local_naive(mtime);
    ResolvedDates {
        display: at,
        original: at,
    }
}

/// Convert a filesystem timestamp to local wall-clock time.
pub fn local_naive(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

pub fn format_iso(at: &NaiveDateTime) -> String {
    at.format(ISO_FORMAT).to_string()
}

fn parse_field(value: &Option<String>) -> Option<NaiveDateTime> {
    value.as_deref().and_then(parse_timestamp)
}

/// Parse an exiftool or ISO-8601 date string.
///
/// Accepts `2023:05:05 10:11:12`, `2023-05-05T10:11:12.250`, trailing `Z` or
/// `+01:00`/`+0100` offsets (dropped, wall time kept), minute precision and
/// bare dates (midnight). Returns `None` for anything else, including the
/// `0000:00:00 00:00:00` placeholder some cameras write.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let normalized = normalize_date_separators(value);
    let local = strip_zone(&normalized);

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(local, format) {
            return Some(parsed);
        }
    }

    NaiveDate::parse_from_str(local, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// `YYYY:MM:DD...` -> `YYYY-MM-DD...`
fn normalize_date_separators(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 10 && bytes[4] == b':' && bytes[7] == b':' {
        let mut out = String::with_capacity(value.len());
        out.push_str(&value[..4]);
        out.push('-');
        out.push_str(&value[5..7]);
        out.push('-');
        out.push_str(&value[8..]);
        out
    } else {
        value.to_string()
    }
}

/// Drop a trailing `Z`, `+HH:MM` or `+HHMM` from a value that has a time part.
fn strip_zone(value: &str) -> &str {
    if value.len() <= 10 || !value.is_char_boundary(10) {
        return value;
    }
    let (date, time) = value.split_at(10);
    if !(time.starts_with('T') || time.starts_with(' ')) {
        return value;
    }

    if let Some(stripped) = time.strip_suffix('Z').or_else(|| time.strip_suffix('z')) {
        return &value[..date.len() + stripped.len()];
    }

    let bytes = time.as_bytes();
    let len = bytes.len();
    let is_digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    // +HH:MM
    if len >= 7
        && matches!(bytes[len - 6], b'+' | b'-')
        && bytes[len - 3] == b':'
        && is_digits(len - 5..len - 3)
        && is_digits(len - 2..len)
    {
        return &value[..value.len() - 6];
    }
    // +HHMM
    if len >= 6 && matches!(bytes[len - 5], b'+' | b'-') && is_digits(len - 4..len) {
        return &value[..value.len() - 5];
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn raw(original: Option<&str>, create: Option<&str>, modify: Option<&str>) -> RawMetadata {
        RawMetadata {
            source_file: Some("a.jpg".to_string()),
            date_time_original: original.map(str::to_string),
            create_date: create.map(str::to_string),
            file_modify_date: modify.map(str::to_string),
            ..RawMetadata::default()
        }
    }

    #[test]
    fn test_parse_exiftool_formats() {
        assert_eq!(parse_timestamp("2023:05:05 10:11:12"), Some(at("2023-05-05 10:11:12")));
        assert_eq!(
            parse_timestamp("2024:01:01 08:00:00+01:00"),
            Some(at("2024-01-01 08:00:00"))
        );
        assert_eq!(parse_timestamp("2024:01:01 08:00:00Z"), Some(at("2024-01-01 08:00:00")));
        assert_eq!(parse_timestamp("2024:01:01 08:00:00-0500"), Some(at("2024-01-01 08:00:00")));

        let fractional = parse_timestamp("2024:01:01 08:00:00.25").unwrap();
        assert_eq!(format_iso(&fractional), "2024-01-01T08:00:00.250");
    }

    #[test]
    fn test_parse_iso_formats() {
        assert_eq!(parse_timestamp("2023-05-05T10:11:12"), Some(at("2023-05-05 10:11:12")));
        assert_eq!(parse_timestamp("2023-05-05T10:11"), Some(at("2023-05-05 10:11:00")));
        assert_eq!(parse_timestamp(" 2023-05-05 "), Some(at("2023-05-05 00:00:00")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("0000:00:00 00:00:00"), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2023:13:45 10:00:00"), None);
    }

    #[test]
    fn test_display_prefers_original_capture() {
        let dates = resolve(
            &raw(
                Some("2020:01:01 00:00:00"),
                Some("2019:01:01 00:00:00"),
                Some("2024:01:01 00:00:00"),
            ),
            at("2025-01-01 00:00:00"),
        );
        assert_eq!(dates.display, at("2020-01-01 00:00:00"));
        assert_eq!(dates.original, at("2020-01-01 00:00:00"));
    }

    #[test]
    fn test_display_falls_back_to_create_date() {
        let dates = resolve(
            &raw(None, Some("2021:06:01 12:00:00"), Some("2018:01:01 00:00:00")),
            at("2025-01-01 00:00:00"),
        );
        assert_eq!(dates.display, at("2021-06-01 12:00:00"));
        // original is the oldest of the remaining candidates
        assert_eq!(dates.original, at("2018-01-01 00:00:00"));
    }

    #[test]
    fn test_unparseable_fields_are_skipped_not_defaulted() {
        let dates = resolve(
            &raw(Some("garbage"), Some("0000:00:00 00:00:00"), Some("2022:02:02 02:02:02")),
            at("2025-01-01 00:00:00"),
        );
        assert_eq!(dates.display, at("2022-02-02 02:02:02"));
        assert_eq!(dates.original, at("2022-02-02 02:02:02"));
    }

    #[test]
    fn test_fallback_when_nothing_parses() {
        let fallback = at("2025-03-04 05:06:07");
        let dates = resolve(&raw(None, Some("nope"), None), fallback);

        assert_eq!(dates.display, fallback);
        assert_eq!(dates.original, fallback);
        assert_eq!(format_iso(&dates.display), "2025-03-04T05:06:07");
        assert_eq!(parse_timestamp(&format_iso(&dates.display)), Some(fallback));
    }
}
