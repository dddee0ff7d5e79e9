//! Issue reports and the analysis windows around them
//!
//! Every issue report anchors one [`AnalysisWindow`]: the local days from
//! `analysis_window_days` before the report day through the same number of
//! days after it, plus a lookback used only to run in insulin on board.
//!
//! ```text
//!  buffered_start     sample_start        report day          sample_end
//!  |<-- lookback -->|<---- 7 days ---->|<------- 7 days ------->|
//! ```

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone as _, Timelike as _, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{
    config::PipelineConfig,
    event::RawEvent,
    series::{TickRange, ceil_to_tick, tick},
};

/// Settings snapshot a participant submitted, with the time it was generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub participant_id: String,
    pub report_timestamp: DateTime<Utc>,
    /// Source the report was extracted from
    pub file_name: Option<String>,
    pub basal_rate_schedule: Option<String>,
    pub isf_schedule: Option<String>,
    pub isf_unit: Option<String>,
    pub carb_ratio_schedule: Option<String>,
    pub correction_range_schedule: Option<String>,
    pub suspend_threshold: Option<f64>,
    pub suspend_threshold_unit: Option<String>,
    pub maximum_basal_rate: Option<f64>,
    /// UTC offset of the pump's basal schedule, in seconds
    pub basal_rate_utc_offset_seconds: Option<i32>,
}

impl IssueReport {
    #[must_use]
    pub fn new(participant_id: impl Into<String>, report_timestamp: DateTime<Utc>) -> Self {
        Self {
            participant_id: participant_id.into(),
            report_timestamp,
            file_name: None,
            basal_rate_schedule: None,
            isf_schedule: None,
            isf_unit: None,
            carb_ratio_schedule: None,
            correction_range_schedule: None,
            suspend_threshold: None,
            suspend_threshold_unit: None,
            maximum_basal_rate: None,
            basal_rate_utc_offset_seconds: None,
        }
    }
}

/// Sorts reports by time and drops any report closer than `window_days`
/// whole days to the report just before it.
///
/// The gap is measured against the immediate predecessor whether or not
/// that predecessor is kept, so a chain of closely spaced reports collapses
/// to its first report.
///
/// ```
/// # use chrono::{TimeDelta, TimeZone, Utc};
/// # use loopstat_pipeline::window::{IssueReport, remove_overlapping_reports};
/// let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
/// let reports = vec![
///     IssueReport::new("p", t + TimeDelta::days(3)),
///     IssueReport::new("p", t),
///     IssueReport::new("p", t + TimeDelta::days(10)),
/// ];
/// let kept = remove_overlapping_reports(reports, 7);
/// assert_eq!(kept.len(), 2);
/// assert_eq!(kept[0].report_timestamp, t);
/// ```
#[must_use]
pub fn remove_overlapping_reports(mut reports: Vec<IssueReport>, window_days: i64) -> Vec<IssueReport> {
    reports.sort_by_key(|report| report.report_timestamp);
    let mut previous: Option<DateTime<Utc>> = None;
    reports.retain(|report| {
        let overlaps = previous
            .is_some_and(|previous| (report.report_timestamp - previous).num_days() < window_days);
        previous = Some(report.report_timestamp);
        !overlaps
    });
    reports
}

/// Local midnight starting the day of `instant`.
fn local_midnight(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    let local = instant.with_timezone(&tz);
    tz.from_local_datetime(&local.date_naive().and_time(NaiveTime::MIN))
        .earliest()
        // midnight skipped by a DST jump
        .unwrap_or_else(|| local - TimeDelta::seconds(i64::from(local.num_seconds_from_midnight())))
}

/// The span of time analyzed around one issue report
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisWindow {
    pub participant_id: String,
    /// Position of the report among the participant's kept reports
    pub index: usize,
    pub report: IssueReport,
    pub timezone: Tz,
    pub sample_start: DateTime<Tz>,
    /// Last tick of the window (inclusive)
    pub sample_end: DateTime<Tz>,
    pub buffered_start: DateTime<Tz>,
}

impl AnalysisWindow {
    #[must_use]
    pub fn new(index: usize, report: IssueReport, timezone: Tz, config: &PipelineConfig) -> Self {
        let midnight = local_midnight(report.report_timestamp, timezone);
        let span = TimeDelta::days(config.analysis_window_days);
        let sample_start = midnight - span;
        let sample_end = midnight + span - tick();
        let buffered_start = sample_start - TimeDelta::days(config.lookback_days);
        Self {
            participant_id: report.participant_id.clone(),
            index,
            report,
            timezone,
            sample_start,
            sample_end,
            buffered_start,
        }
    }

    /// Ticks of the output window.
    #[must_use]
    pub fn sample_range(&self) -> TickRange {
        TickRange::inclusive(self.sample_start.to_utc(), self.sample_end.to_utc())
    }

    /// Ticks of the window including the lookback.
    #[must_use]
    pub fn buffered_range(&self) -> TickRange {
        TickRange::inclusive(self.buffered_start.to_utc(), self.sample_end.to_utc())
    }

    /// Events whose rounded-up tick falls inside the buffered window.
    #[must_use]
    pub fn buffered_events(&self, events: &[RawEvent]) -> Vec<RawEvent> {
        let start = self.buffered_start.to_utc();
        let end = self.sample_end.to_utc();
        events
            .iter()
            .filter(|event| (start..=end).contains(&ceil_to_tick(event.timestamp)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike as _, TimeZone as _, Timelike as _};

    use super::*;
    use crate::event::EventKind;

    fn report_at(y: i32, mo: u32, d: u32, h: u32) -> IssueReport {
        IssueReport::new("p", Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap())
    }

    #[test]
    fn test_three_days_apart_collapse_to_earlier() {
        let later = report_at(2020, 5, 4, 9);
        let earlier = report_at(2020, 5, 1, 9);
        let kept = remove_overlapping_reports(vec![later, earlier.clone()], 7);
        assert_eq!(kept, vec![earlier]);
    }

    #[test]
    fn test_overlap_chain_collapses_to_first() {
        let reports = vec![
            report_at(2020, 5, 9, 0),
            report_at(2020, 5, 1, 0),
            report_at(2020, 5, 5, 0),
        ];
        // 5/9 is 4 days after the dropped 5/5
        let kept = remove_overlapping_reports(reports, 7);
        assert_eq!(kept, vec![report_at(2020, 5, 1, 0)]);
    }

    #[test]
    fn test_overlap_gap_of_exactly_window_days_is_kept() {
        let reports = vec![
            report_at(2020, 5, 1, 0),
            report_at(2020, 5, 8, 0),
            report_at(2020, 5, 14, 23),
        ];
        let kept = remove_overlapping_reports(reports, 7);
        let days: Vec<_> = kept.iter().map(|r| r.report_timestamp.day()).collect();
        assert_eq!(days, [1, 8]);
    }

    #[test]
    fn test_window_bounds_follow_local_midnight() {
        let report = report_at(2020, 1, 15, 3);
        let tz = chrono_tz::America::Chicago;
        let window = AnalysisWindow::new(0, report, tz, &PipelineConfig::default());
        // 03:00 UTC is still the evening of the 14th in Chicago
        assert_eq!(window.sample_start.day(), 7);
        assert_eq!(window.sample_start.hour(), 0);
        assert_eq!(window.sample_end.day(), 20);
        assert_eq!((window.sample_end.hour(), window.sample_end.minute()), (23, 55));
        assert_eq!(window.sample_range().len(), 14 * 288);
        assert_eq!(window.buffered_range().len(), 15 * 288);
    }

    #[test]
    fn test_buffered_events_use_rounded_time() {
        let report = report_at(2020, 1, 15, 12);
        let window = AnalysisWindow::new(0, report, Tz::UTC, &PipelineConfig::default());
        let start = window.buffered_start.to_utc();
        let end = window.sample_end.to_utc();
        let cgm_at = |t| RawEvent::new(t, EventKind::Cgm, Some(5.0), "u");
        // rounds up to end
        let before_end = cgm_at(end - TimeDelta::seconds(30));
        // rounds up past end
        let after_end = cgm_at(end + TimeDelta::seconds(30));
        // rounds up to start
        let before_start = cgm_at(start - TimeDelta::minutes(4));
        // rounds up to one tick before start
        let too_early = cgm_at(start - TimeDelta::minutes(6));
        let at_start = cgm_at(start);
        let events = [
            before_end.clone(),
            after_end,
            before_start.clone(),
            too_early,
            at_start.clone(),
        ];
        let kept = window.buffered_events(&events);
        assert_eq!(kept, vec![before_end, before_start, at_start]);
    }
}
