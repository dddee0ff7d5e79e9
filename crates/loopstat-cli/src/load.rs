use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use loopstat_pipeline::{
    event::{CarbPayload, EventKind, ParticipantData, RawEvent},
    window::IssueReport,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::util;

/// One row of a participant's event export
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventRow {
    time: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    value: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    rate: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    normal: Option<f64>,
    #[serde(
        rename = "nutrition.carbohydrates.net",
        deserialize_with = "csv::invalid_option"
    )]
    carbohydrates_net: Option<f64>,
    #[serde(
        rename = "nutrition.carbohydrate.net",
        deserialize_with = "csv::invalid_option"
    )]
    carbohydrate_net: Option<f64>,
    #[serde(
        rename = "payload.com.loudnate.CarbKit.HKMetadataKey.AbsorptionTimeMinutes",
        deserialize_with = "csv::invalid_option"
    )]
    absorption_minutes: Option<f64>,
    #[serde(rename = "uploadId")]
    upload_id: Option<String>,
    #[serde(rename = "timezoneOffset", deserialize_with = "csv::invalid_option")]
    timezone_offset: Option<f64>,
}

impl EventRow {
    /// Converts the row, or `None` for rows of a type the pipeline ignores.
    fn into_event(self) -> anyhow::Result<Option<RawEvent>> {
        let Some(kind) = self.kind.as_deref().and_then(|k| k.parse::<EventKind>().ok()) else {
            return Ok(None);
        };
        let time = self.time.as_deref().unwrap_or_default();
        let timestamp =
            parse_timestamp(time).with_context(|| format!("Invalid event time: {time:?}"))?;
        let value = match kind {
            EventKind::Basal => self.rate,
            EventKind::Bolus => self.normal,
            EventKind::Cgm => self.value,
            EventKind::Carb => None,
        };
        #[expect(clippy::cast_possible_truncation)]
        let timezone_offset_minutes = self.timezone_offset.map(|m| m.round() as i32);
        Ok(Some(RawEvent {
            timestamp,
            kind,
            value,
            carbs: CarbPayload {
                carbohydrates_net: self.carbohydrates_net,
                carbohydrate_net: self.carbohydrate_net,
                absorption_minutes: self.absorption_minutes,
            },
            upload_id: self.upload_id.unwrap_or_default(),
            timezone_offset_minutes,
        }))
    }
}

/// One row of the issue report table
#[derive(Debug, Deserialize)]
struct IssueReportRow {
    loop_id: String,
    report_timestamp: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    basal_rate_schedule: Option<String>,
    #[serde(default, rename = "insulin_sensitivity_factor_schedule")]
    isf_schedule: Option<String>,
    #[serde(default, rename = "insulin_sensitivity_factor_unit")]
    isf_unit: Option<String>,
    #[serde(default)]
    carb_ratio_schedule: Option<String>,
    #[serde(default)]
    correction_range_schedule: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    suspend_threshold: Option<f64>,
    #[serde(default)]
    suspend_threshold_unit: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    maximum_basal_rate: Option<f64>,
    #[serde(
        default,
        rename = "basal_rate_timeZone",
        deserialize_with = "csv::invalid_option"
    )]
    basal_rate_time_zone: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl IssueReportRow {
    fn into_report(self) -> anyhow::Result<IssueReport> {
        let report_timestamp = parse_timestamp(&self.report_timestamp).with_context(|| {
            format!(
                "Invalid report timestamp for {}: {:?}",
                self.loop_id, self.report_timestamp
            )
        })?;
        let mut report = IssueReport::new(self.loop_id, report_timestamp);
        report.file_name = non_empty(self.file_name);
        report.basal_rate_schedule = non_empty(self.basal_rate_schedule);
        report.isf_schedule = non_empty(self.isf_schedule);
        report.isf_unit = non_empty(self.isf_unit);
        report.carb_ratio_schedule = non_empty(self.carb_ratio_schedule);
        report.correction_range_schedule = non_empty(self.correction_range_schedule);
        report.suspend_threshold = self.suspend_threshold;
        report.suspend_threshold_unit = non_empty(self.suspend_threshold_unit);
        report.maximum_basal_rate = self.maximum_basal_rate;
        #[expect(clippy::cast_possible_truncation)]
        let offset_seconds = self.basal_rate_time_zone.map(|s| s.round() as i32);
        report.basal_rate_utc_offset_seconds = offset_seconds;
        Ok(report)
    }
}

/// Parses RFC 3339 timestamps, the space-separated variant, and naive
/// timestamps (taken as UTC).
fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.to_utc());
    }
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(t.to_utc());
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))?;
    Ok(naive.and_utc())
}

fn csv_reader(file_kind: &str, path: &Path) -> anyhow::Result<csv::Reader<Box<dyn std::io::BufRead>>> {
    let reader = util::open_reader(file_kind, path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(util::delimiter_for(path))
        .flexible(true)
        .from_reader(reader))
}

/// Loads a participant's event table.
///
/// Rows of other types are skipped; rows with an unreadable time are
/// skipped with a warning.
pub fn read_events(participant_id: &str, path: &Path) -> anyhow::Result<ParticipantData> {
    let mut reader = csv_reader("event", path)?;
    let mut events = Vec::new();
    let mut invalid = 0_usize;
    for (line, row) in reader.deserialize::<EventRow>().enumerate() {
        let row = row.with_context(|| {
            format!("Failed to read event row {} of {}", line + 1, path.display())
        })?;
        match row.into_event() {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => {
                debug!(participant = participant_id, row = line + 1, "{e:#}");
                invalid += 1;
            }
        }
    }
    if invalid > 0 {
        warn!(
            participant = participant_id,
            invalid, "skipped event rows with unreadable time"
        );
    }
    debug!(
        participant = participant_id,
        events = events.len(),
        "loaded {}",
        path.display()
    );
    Ok(ParticipantData::new(participant_id, events))
}

/// Loads every issue report in the table.
pub fn read_issue_reports(path: &Path) -> anyhow::Result<Vec<IssueReport>> {
    let mut reader = csv_reader("issue report", path)?;
    reader
        .deserialize::<IssueReportRow>()
        .enumerate()
        .map(|(line, row)| {
            row.with_context(|| {
                format!("Failed to read issue report row {} of {}", line + 1, path.display())
            })?
            .into_report()
        })
        .collect()
}

/// Finds the event table whose file name contains `participant_id`.
///
/// Returns `None` when there is no match or more than one.
pub fn find_event_file(events_dir: &Path, participant_id: &str) -> anyhow::Result<Option<PathBuf>> {
    let mut matches = Vec::new();
    let entries = fs::read_dir(events_dir)
        .with_context(|| format!("Failed to read events directory: {}", events_dir.display()))?;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read events directory: {}", events_dir.display()))?;
        let path = entry.path();
        if path.is_file()
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().contains(participant_id))
        {
            matches.push(path);
        }
    }
    match matches.len() {
        0 => {
            debug!(participant = participant_id, "no event file");
            Ok(None)
        }
        1 => Ok(matches.pop()),
        n => {
            warn!(participant = participant_id, matches = n, "multiple event files, skipping");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use chrono::TimeZone as _;
    use flate2::{Compression, write::GzEncoder};

    use super::*;

    const EVENTS_TSV: &str = "\
time\ttype\tvalue\trate\tnormal\tnutrition.carbohydrates.net\tnutrition.carbohydrate.net\tpayload.com.loudnate.CarbKit.HKMetadataKey.AbsorptionTimeMinutes\tuploadId\ttimezoneOffset
2020-06-15T12:00:00.000Z\tbasal\t\t0.85\t\t\t\t\tup-1\t-300
2020-06-15T12:01:30Z\tbolus\t\t\t2.5\t\t\t\tup-1\t-300
2020-06-15 12:03:00+00:00\tcbg\t6.5\t\t\t\t\t\tup-2\t-300
2020-06-15T12:04:00Z\tfood\t\t\t\t30\t\t180\tup-2\t-300
2020-06-15T12:05:00Z\twizard\t\t\t\t\t\t\tup-2\t-300
not-a-time\tcbg\t7.0\t\t\t\t\t\tup-2\t-300
";

    #[test]
    fn test_read_gzip_tsv_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LOOP-0001.tsv.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        encoder.write_all(EVENTS_TSV.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let data = read_events("LOOP-0001", &path).unwrap();
        assert_eq!(data.participant_id, "LOOP-0001");
        let kinds: Vec<_> = data.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [EventKind::Basal, EventKind::Bolus, EventKind::Cgm, EventKind::Carb]
        );
        assert_eq!(data.events[0].value, Some(0.85));
        assert_eq!(data.events[1].value, Some(2.5));
        assert_eq!(data.events[2].value, Some(6.5));
        assert_eq!(
            data.events[2].timestamp,
            Utc.with_ymd_and_hms(2020, 6, 15, 12, 3, 0).unwrap()
        );
        assert_eq!(data.events[3].carbs.grams(), Some(30.0));
        assert_eq!(data.events[3].carbs.absorption_minutes, Some(180.0));
        assert_eq!(data.events[3].upload_id, "up-2");
        assert_eq!(data.most_common_offset_minutes(), Some(-300));
    }

    #[test]
    fn test_read_issue_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue-reports.csv");
        fs::write(
            &path,
            "loop_id,report_timestamp,file_name,basal_rate_schedule,\
insulin_sensitivity_factor_schedule,insulin_sensitivity_factor_unit,carb_ratio_schedule,\
correction_range_schedule,suspend_threshold,suspend_threshold_unit,maximum_basal_rate,basal_rate_timeZone
LOOP-0001,2020-06-15 12:00:00,report.md,\"[{'startTime': 0, 'value': 1.0}]\",,mg/dL,,,80,mg/dL,3.5,-18000.0
LOOP-0002,2020-07-01T08:30:00Z,,,,,,,,,,
",
        )
        .unwrap();

        let reports = read_issue_reports(&path).unwrap();
        assert_eq!(reports.len(), 2);
        let first = &reports[0];
        assert_eq!(first.participant_id, "LOOP-0001");
        assert_eq!(
            first.report_timestamp,
            Utc.with_ymd_and_hms(2020, 6, 15, 12, 0, 0).unwrap()
        );
        assert_eq!(first.file_name.as_deref(), Some("report.md"));
        assert_eq!(
            first.basal_rate_schedule.as_deref(),
            Some("[{'startTime': 0, 'value': 1.0}]")
        );
        assert_eq!(first.isf_schedule, None);
        assert_eq!(first.suspend_threshold, Some(80.0));
        assert_eq!(first.maximum_basal_rate, Some(3.5));
        assert_eq!(first.basal_rate_utc_offset_seconds, Some(-18000));

        let second = &reports[1];
        assert_eq!(second.file_name, None);
        assert_eq!(second.basal_rate_utc_offset_seconds, None);
    }

    #[test]
    fn test_find_event_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("LOOP-0001.tsv"), "").unwrap();
        fs::write(dir.path().join("LOOP-0002-a.csv"), "").unwrap();
        fs::write(dir.path().join("LOOP-0002-b.csv"), "").unwrap();

        let found = find_event_file(dir.path(), "LOOP-0001").unwrap();
        assert_eq!(found, Some(dir.path().join("LOOP-0001.tsv")));
        assert_eq!(find_event_file(dir.path(), "LOOP-0002").unwrap(), None);
        assert_eq!(find_event_file(dir.path(), "LOOP-0003").unwrap(), None);
    }
}
