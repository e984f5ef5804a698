/// Shared data structures for the application state
///
/// These structs represent the data model that flows between the manifest
/// builder, the JSON documents on disk and the HTTP layer.
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::metadata::timestamp::{format_iso, parse_timestamp, ResolvedDates};

/// URL prefix under which the image root is served
pub const IMAGE_URL_PREFIX: &str = "/images/";

/// Represents a single photo in the manifest
///
/// Reading is lenient: manifests written by older builds only carry
/// `filename`, `src`, `dateTaken`, `lat` and `lon`, and the missing fields
/// are derived from those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredRecord")]
pub struct ImageRecord {
    /// Filename only (e.g., "IMG_0001.JPG")
    pub filename: String,
    /// Path relative to the image root, always with forward slashes
    pub path: String,
    /// Servable URL for the browsing UI (`/images/<path>`)
    pub src: String,
    /// Best guess capture time, the sort key
    #[serde(serialize_with = "serialize_date")]
    pub display_date: NaiveDateTime,
    /// Earliest or most authoritative capture evidence
    #[serde(serialize_with = "serialize_date")]
    pub original_date: NaiveDateTime,
    /// GPS latitude in decimal degrees
    #[serde(rename = "lat")]
    pub latitude: Option<f64>,
    /// GPS longitude in decimal degrees
    #[serde(rename = "lon")]
    pub longitude: Option<f64>,
}

/// A manifest entry as found on disk, old or new layout
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    src: Option<String>,
    #[serde(alias = "dateTaken", deserialize_with = "deserialize_date")]
    display_date: NaiveDateTime,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    original_date: Option<NaiveDateTime>,
    #[serde(rename = "lat", default)]
    latitude: Option<f64>,
    #[serde(rename = "lon", default)]
    longitude: Option<f64>,
}

impl TryFrom<StoredRecord> for ImageRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        let path = stored
            .path
            .or_else(|| {
                stored
                    .src
                    .as_deref()
                    .and_then(|src| src.strip_prefix(IMAGE_URL_PREFIX))
                    .map(str::to_string)
            })
            .or_else(|| stored.filename.clone())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| "manifest entry has no path, src or filename".to_string())?;

        let coordinates = stored.latitude.zip(stored.longitude);
        let mut record = ImageRecord::new(
            &path,
            ResolvedDates {
                display: stored.display_date,
                original: stored.original_date.unwrap_or(stored.display_date),
            },
            coordinates,
        );
        if let Some(filename) = stored.filename.filter(|f| !f.is_empty()) {
            record.filename = filename;
        }
        if let Some(src) = stored.src.filter(|s| !s.is_empty()) {
            record.src = src;
        }
        Ok(record)
    }
}

impl ImageRecord {
    /// Build a record; coordinates are taken as a pair so one can never
    /// be set without the other.
    pub fn new(
        relative_path: &str,
        dates: ResolvedDates,
        coordinates: Option<(f64, f64)>,
    ) -> Self {
        let path = relative_path.replace('\\', "/");
        let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
        let src = format!("{}{}", IMAGE_URL_PREFIX, path);

        Self {
            filename,
            src,
            path,
            display_date: dates.display,
            original_date: dates.original,
            latitude: coordinates.map(|(lat, _)| lat),
            longitude: coordinates.map(|(_, lon)| lon),
        }
    }

    pub fn has_gps(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Sort newest first. Stable, so equal dates keep their input order.
pub fn sort_newest_first(records: &mut [ImageRecord]) {
    records.sort_by(|a, b| b.display_date.cmp(&a.display_date));
}

fn serialize_date<S: Serializer>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_iso(date))
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn deserialize_optional_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(parse_timestamp))
}

/// User decision for a single photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Favorite,
    Like,
    Later,
    Delete,
}

impl DecisionStatus {
    pub const ALL: [DecisionStatus; 4] = [
        DecisionStatus::Favorite,
        DecisionStatus::Like,
        DecisionStatus::Later,
        DecisionStatus::Delete,
    ];

    /// Interpret a raw status string.
    ///
    /// `None`, the literal `"null"` and unknown values all mean "undecided".
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw? {
            "favorite" => Some(DecisionStatus::Favorite),
            "like" => Some(DecisionStatus::Like),
            "later" => Some(DecisionStatus::Later),
            "delete" => Some(DecisionStatus::Delete),
            _ => None,
        }
    }

    /// Name of the folder the sorter files this status under
    pub fn folder(self) -> &'static str {
        match self {
            DecisionStatus::Favorite => "favorite",
            DecisionStatus::Like => "like",
            DecisionStatus::Later => "later",
            DecisionStatus::Delete => "delete",
        }
    }
}

/// One entry of the decisions document as the UI writes it
///
/// Both fields are loose on purpose: the document is stored verbatim and
/// the sorter decides what to do with missing names or odd statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Decision {
    pub fn status(&self) -> Option<DecisionStatus> {
        DecisionStatus::parse(self.status.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(s: &str) -> ResolvedDates {
        let at = parse_timestamp(s).unwrap();
        ResolvedDates {
            display: at,
            original: at,
        }
    }

    #[test]
    fn test_record_paths_use_forward_slashes() {
        let record = ImageRecord::new("2024\\trip\\IMG_1.JPG", dates("2024-01-01"), None);
        assert_eq!(record.filename, "IMG_1.JPG");
        assert_eq!(record.path, "2024/trip/IMG_1.JPG");
        assert_eq!(record.src, "/images/2024/trip/IMG_1.JPG");
        assert!(!record.has_gps());
    }

    #[test]
    fn test_record_json_shape() {
        let record = ImageRecord::new("a.jpg", dates("2024-01-01T10:00:00"), Some((1.5, -2.5)));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["filename"], "a.jpg");
        assert_eq!(json["displayDate"], "2024-01-01T10:00:00");
        assert_eq!(json["originalDate"], "2024-01-01T10:00:00");
        assert_eq!(json["lat"], 1.5);
        assert_eq!(json["lon"], -2.5);

        let no_gps = ImageRecord::new("b.jpg", dates("2024-01-01"), None);
        let json = serde_json::to_value(&no_gps).unwrap();
        assert!(json["lat"].is_null());
        assert!(json["lon"].is_null());
    }

    #[test]
    fn test_legacy_date_taken_key_is_accepted() {
        let json = r#"{
            "filename": "a.jpg", "path": "a.jpg", "src": "/images/a.jpg",
            "dateTaken": "2023-05-05T10:00:00", "originalDate": "2023-05-05T10:00:00",
            "lat": null, "lon": null
        }"#;
        let record: ImageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.display_date, parse_timestamp("2023-05-05T10:00:00").unwrap());
    }

    #[test]
    fn test_manifest_from_older_builds_is_readable() {
        let json = r#"[
            {"filename": "a.jpg", "src": "/images/2020/a.jpg", "dateTaken": "2020-09-13T12:26:40", "lat": 48.1, "lon": 11.5},
            {"filename": "b.jpg", "src": "/images/b.jpg", "dateTaken": "2021-01-01T00:00:00", "lat": null, "lon": 3.0}
        ]"#;
        let records: Vec<ImageRecord> = serde_json::from_str(json).unwrap();

        assert_eq!(records[0].path, "2020/a.jpg");
        assert_eq!(records[0].filename, "a.jpg");
        assert_eq!(records[0].original_date, records[0].display_date);
        assert!(records[0].has_gps());
        // a lone longitude is no position
        assert_eq!((records[1].latitude, records[1].longitude), (None, None));

        let nameless = r#"[{"dateTaken": "2021-01-01T00:00:00"}]"#;
        assert!(serde_json::from_str::<Vec<ImageRecord>>(nameless).is_err());
    }

    #[test]
    fn test_sort_order_newest_first() {
        let mut records = vec![
            ImageRecord::new("a.jpg", dates("2024-01-01"), None),
            ImageRecord::new("b.jpg", dates("2023-05-05"), None),
            ImageRecord::new("c.jpg", dates("2024-06-01"), None),
            ImageRecord::new("d.jpg", dates("2024-01-01"), None),
        ];
        sort_newest_first(&mut records);

        let order: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(order, vec!["c.jpg", "a.jpg", "d.jpg", "b.jpg"]);
    }

    #[test]
    fn test_decision_status_parsing() {
        assert_eq!(DecisionStatus::parse(Some("favorite")), Some(DecisionStatus::Favorite));
        assert_eq!(DecisionStatus::parse(Some("delete")), Some(DecisionStatus::Delete));
        assert_eq!(DecisionStatus::parse(Some("null")), None);
        assert_eq!(DecisionStatus::parse(Some("maybe")), None);
        assert_eq!(DecisionStatus::parse(None), None);

        let decision: Decision = serde_json::from_str(r#"{"name":"a.jpg","status":null}"#).unwrap();
        assert_eq!(decision.status(), None);
    }
}
