use crate::error::StoreError;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_SOURCE: &str = "unknown";

/// One stored reading: a line of an active log or an archive chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub dam_id: String,
    pub observed_at: String,
    pub rate_pct: Option<f64>,
    pub level_m: Option<f64>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    UNKNOWN_SOURCE.to_string()
}

impl ObservationRecord {
    pub fn observed_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_observed_at(&self.observed_at)
    }
}

/// One reading inside `latest.json`. Anything besides the fields the store
/// cares about is descriptive metadata and passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(default)]
    pub dam_id: Option<String>,
    #[serde(default)]
    pub observed_at: Option<String>,
    #[serde(default)]
    pub rate_pct: Option<f64>,
    #[serde(default)]
    pub level_m: Option<f64>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestSnapshot {
    #[serde(default)]
    pub fetched_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub records: Vec<SnapshotEntry>,
}

/// A snapshot entry whose required keys were checked.
#[derive(Debug, Clone, Copy)]
pub struct ValidEntry<'a> {
    pub dam_id: &'a str,
    pub observed_at: &'a str,
    pub entry: &'a SnapshotEntry,
}

impl LatestSnapshot {
    /// Check every entry for `dam_id` and `observed_at` before anything is
    /// written.
    pub fn validated(&self) -> Result<Vec<ValidEntry<'_>>, StoreError> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let dam_id = entry
                    .dam_id
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .ok_or(StoreError::MissingField {
                        index,
                        field: "dam_id",
                    })?;
                let observed_at = entry
                    .observed_at
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .ok_or(StoreError::MissingField {
                        index,
                        field: "observed_at",
                    })?;
                Ok(ValidEntry {
                    dam_id,
                    observed_at,
                    entry,
                })
            })
            .collect()
    }

    /// Provenance for a stored record: the entry's own `source` string, else
    /// the snapshot's.
    pub fn provenance_for(&self, entry: &SnapshotEntry) -> String {
        entry
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .or(self.source.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string()
    }
}

impl ValidEntry<'_> {
    pub fn to_record(&self, source: String) -> ObservationRecord {
        ObservationRecord {
            dam_id: self.dam_id.to_string(),
            observed_at: self.observed_at.to_string(),
            rate_pct: self.entry.rate_pct,
            level_m: self.entry.level_m,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedIndexEntry {
    pub dam_id: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
    pub updated_at: String,
    pub rate_pct: Option<f64>,
    pub level_m: Option<f64>,
    pub delta_pct_last: Option<f64>,
    pub delta_pct_24h: Option<f64>,
    pub slope_pct_per_day: Option<f64>,
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
];

/// Parse an ISO-8601 timestamp carrying a UTC offset (`Z` included).
/// Timestamps without an offset have no known age and yield `None`.
pub fn parse_observed_at(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    let normalized = match trimmed.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => trimmed.to_string(),
    };
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(&normalized, fmt).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// UTC calendar month `YYYY-MM` used to name archive chunks.
pub fn month_key(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_offsets_and_zulu() {
        let want = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("ts");
        assert_eq!(parse_observed_at("2024-03-01T09:00:00+09:00"), Some(want));
        assert_eq!(parse_observed_at("2024-03-01T00:00:00Z"), Some(want));
        assert_eq!(parse_observed_at("2024-03-01 09:00:00+09:00"), Some(want));
        assert_eq!(parse_observed_at("2024-03-01T09:00+09:00"), Some(want));
        assert_eq!(parse_observed_at("2024-03-01T09:00:00+0900"), Some(want));
    }

    #[test]
    fn rejects_garbage_and_naive_timestamps() {
        assert_eq!(parse_observed_at(""), None);
        assert_eq!(parse_observed_at("not-a-date"), None);
        assert_eq!(parse_observed_at("2024-03-01T09:00:00"), None);
    }

    #[test]
    fn month_key_uses_utc_calendar() {
        let ts = parse_observed_at("2024-03-01T08:00:00+09:00").expect("ts");
        assert_eq!(month_key(&ts), "2024-02");
    }

    #[test]
    fn snapshot_validation_reports_first_missing_field() {
        let snapshot: LatestSnapshot = serde_json::from_str(
            r#"{"fetched_at":"2024-01-01T00:00:00Z","source":"feed","records":[
                {"dam_id":"E1","observed_at":"2024-01-01T00:00:00Z","rate_pct":50.0},
                {"dam_id":"E2","rate_pct":40.0}
            ]}"#,
        )
        .expect("parse snapshot");
        let err = snapshot.validated().expect_err("missing observed_at");
        assert!(matches!(
            err,
            StoreError::MissingField {
                index: 1,
                field: "observed_at"
            }
        ));
    }

    #[test]
    fn metadata_passes_through_and_source_falls_back() {
        let snapshot: LatestSnapshot = serde_json::from_str(
            r#"{"source":"feed","records":[
                {"dam_id":"E1","name":"North","lat":35.1,"observed_at":"2024-01-01T00:00:00Z","rate_pct":50.0,"level_m":null}
            ]}"#,
        )
        .expect("parse snapshot");
        let entry = &snapshot.records[0];
        assert_eq!(entry.metadata.get("name"), Some(&Value::from("North")));
        assert!(!entry.metadata.contains_key("dam_id"));
        assert_eq!(snapshot.provenance_for(entry), "feed");

        let valid = snapshot.validated().expect("valid");
        let record = valid[0].to_record(snapshot.provenance_for(entry));
        assert_eq!(record.rate_pct, Some(50.0));
        assert_eq!(record.level_m, None);
    }

    #[test]
    fn stored_line_shape_is_stable() {
        let record = ObservationRecord {
            dam_id: "E1".to_string(),
            observed_at: "2024-01-01T00:00:00+09:00".to_string(),
            rate_pct: Some(75.5),
            level_m: None,
            source: "feed".to_string(),
        };
        let line = serde_json::to_string(&record).expect("serialize");
        assert_eq!(
            line,
            r#"{"dam_id":"E1","observed_at":"2024-01-01T00:00:00+09:00","rate_pct":75.5,"level_m":null,"source":"feed"}"#
        );
    }
}
