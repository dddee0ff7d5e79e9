use std::path::{Path, PathBuf};

use anyhow::Context;
use loopstat_pipeline::{pipeline::WindowOutput, summary::WindowSummary, timeline::Timeline};

pub const SUMMARIES_DIR: &str = "summaries";
pub const TIME_SERIES_DIR: &str = "time-series";

fn window_file(output_dir: &Path, subdir: &str, summary: &WindowSummary, kind: &str) -> PathBuf {
    output_dir.join(subdir).join(format!(
        "{}-report-{}-{kind}.csv",
        summary.loop_id, summary.report_num
    ))
}

/// Writes the summary row and, when the window had data, its time series.
pub fn write_window(output_dir: &Path, output: &WindowOutput) -> anyhow::Result<()> {
    let summary_path = window_file(output_dir, SUMMARIES_DIR, &output.summary, "summary");
    write_summary(&summary_path, &output.summary)?;
    if let Some(timeline) = &output.timeline {
        let series_path = window_file(output_dir, TIME_SERIES_DIR, &output.summary, "time-series");
        write_time_series(&series_path, timeline)?;
    }
    Ok(())
}

pub fn write_summary(path: &Path, summary: &WindowSummary) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
    writer
        .serialize(summary)
        .with_context(|| format!("Failed to write summary: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush summary: {}", path.display()))?;
    Ok(())
}

/// Writes one row per tick; absent columns and unset values are empty cells.
pub fn write_time_series(path: &Path, timeline: &Timeline) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create time series file: {}", path.display()))?;
    let columns = timeline.named_columns();

    let header = std::iter::once("rounded_local_time").chain(columns.iter().map(|(name, _)| name.as_str()));
    writer
        .write_record(header)
        .with_context(|| format!("Failed to write time series header: {}", path.display()))?;

    let mut record = csv::StringRecord::with_capacity(columns.len() * 8, columns.len() + 1);
    for (i, time) in timeline.local_times.iter().enumerate() {
        record.clear();
        record.push_field(&time.to_rfc3339());
        for (_, values) in &columns {
            match values.and_then(|values| values[i]) {
                Some(v) => record.push_field(&v.to_string()),
                None => record.push_field(""),
            }
        }
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write time series row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush time series: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{TimeDelta, TimeZone as _, Utc};
    use loopstat_pipeline::{
        event::{EventKind, ParticipantData, RawEvent},
        pipeline::Pipeline,
        window::IssueReport,
    };

    use super::*;

    fn window_output(with_events: bool) -> WindowOutput {
        let report_time = Utc.with_ymd_and_hms(2020, 6, 15, 12, 0, 0).unwrap();
        let mut report = IssueReport::new("LOOP-0001", report_time);
        report.basal_rate_utc_offset_seconds = Some(0);
        let events = if with_events {
            vec![RawEvent::new(
                report_time - TimeDelta::minutes(10),
                EventKind::Cgm,
                Some(6.0),
                "u",
            )]
        } else {
            Vec::new()
        };
        let data = ParticipantData::new("LOOP-0001", events);
        Pipeline::default().process_window(&data, 2, report).unwrap()
    }

    fn make_dirs(root: &Path) {
        fs::create_dir(root.join(SUMMARIES_DIR)).unwrap();
        fs::create_dir(root.join(TIME_SERIES_DIR)).unwrap();
    }

    #[test]
    fn test_write_window_files() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path());
        let output = window_output(true);
        write_window(dir.path(), &output).unwrap();

        let summary = fs::read_to_string(dir.path().join("summaries/LOOP-0001-report-2-summary.csv")).unwrap();
        let mut lines = summary.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("loop_id,report_num,report_timestamp"));
        assert!(header.contains(",LBGI,"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("LOOP-0001,2,"));
        assert_eq!(lines.next(), None);

        let series = fs::read_to_string(dir.path().join("time-series/LOOP-0001-report-2-time-series.csv")).unwrap();
        let mut lines = series.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("rounded_local_time,cgm,set_basal_rate,"));
        assert!(header.contains("8hr_cgm_gt250_avg_event_length_minutes"));
        let timeline = output.timeline.as_ref().unwrap();
        assert_eq!(lines.count(), timeline.len());

        let mut reader = csv::Reader::from_path(dir.path().join("time-series/LOOP-0001-report-2-time-series.csv")).unwrap();
        let cgm_cells: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[1].to_owned())
            .filter(|cell| !cell.is_empty())
            .collect();
        assert_eq!(cgm_cells.len(), 1);
        let cgm: f64 = cgm_cells[0].parse().unwrap();
        assert!((cgm - 108.0).abs() < 1.0);
    }

    #[test]
    fn test_window_without_data_writes_only_summary() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path());
        let output = window_output(false);
        assert!(output.timeline.is_none());
        write_window(dir.path(), &output).unwrap();

        assert!(dir.path().join("summaries/LOOP-0001-report-2-summary.csv").exists());
        assert_eq!(fs::read_dir(dir.path().join(TIME_SERIES_DIR)).unwrap().count(), 0);
    }
}
