//! Per-window processing
//!
//! [`Pipeline::process_window`] turns one issue report and the participant's
//! event log into a [`WindowOutput`]:
//!
//! 1. resolve the local timezone and the window bounds
//! 2. cut the buffered sample; with no events the summary is all that is
//!    produced
//! 3. expand the settings schedules
//! 4. align CGM over the window, and basal, bolus and carbs over the
//!    buffered window; convolve total insulin into IOB
//! 5. compose the timeline, append rolling statistics, and summarize
//!
//! [`Pipeline::process_participant`] runs every non-overlapping report of a
//! participant. A failed window is logged and skipped; it does not affect
//! the participant's other windows.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    align,
    config::PipelineConfig,
    event::{ParticipantData, RawEvent},
    iob::{self, DecayKernel},
    rolling,
    series::{RegularizedSeries, TickRange, ceil_to_tick},
    settings,
    summary::WindowSummary,
    timeline::{self, InsulinCarbStreams, Timeline},
    timezone::{TimezoneResolutionError, resolve_timezone},
    window::{AnalysisWindow, IssueReport, remove_overlapping_reports},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum WindowError {
    #[display("cannot resolve local timezone")]
    Timezone(TimezoneResolutionError),
    #[display("analysis window from {start} to {end} holds no ticks")]
    EmptyWindow { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl From<TimezoneResolutionError> for WindowError {
    fn from(err: TimezoneResolutionError) -> Self {
        Self::Timezone(err)
    }
}

/// Everything produced for one analysis window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutput {
    pub window: AnalysisWindow,
    pub summary: WindowSummary,
    /// Absent when there was no data around the report
    pub timeline: Option<Timeline>,
}

/// Outcome counts for one participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantOutcome {
    pub processed: usize,
    pub failed: usize,
}

/// Basal pulses plus boluses per tick; unset where neither has a value.
fn total_insulin(
    pulse: Option<&RegularizedSeries>,
    bolus: Option<&RegularizedSeries>,
) -> Option<RegularizedSeries> {
    match (pulse, bolus) {
        (None, None) => None,
        (Some(pulse), Some(bolus)) => Some(pulse.zip_with(bolus, |p, b| match (p, b) {
            (None, None) => None,
            _ => Some(p.unwrap_or(0.0) + b.unwrap_or(0.0)),
        })),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    kernel: DecayKernel,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig, kernel: DecayKernel) -> Self {
        Self { config, kernel }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn kernel(&self) -> &DecayKernel {
        &self.kernel
    }

    /// UTC offset of the participant at `report`, in seconds.
    ///
    /// Taken from the report's basal schedule if it has one, else the most
    /// common offset in the event log, else the configured fallback.
    #[must_use]
    pub fn utc_offset_seconds(&self, data: &ParticipantData, report: &IssueReport) -> i32 {
        if let Some(seconds) = report.basal_rate_utc_offset_seconds {
            return seconds;
        }
        if let Some(minutes) = data.most_common_offset_minutes() {
            return minutes * 60;
        }
        let minutes = self.config.fallback_utc_offset_minutes;
        warn!(
            participant = %data.participant_id,
            fallback_minutes = minutes,
            "no timezone offset in report or data, using fallback"
        );
        minutes * 60
    }

    /// Resolves the timezone and bounds of the window around `report`.
    pub fn window(
        &self,
        data: &ParticipantData,
        index: usize,
        report: IssueReport,
    ) -> Result<AnalysisWindow, WindowError> {
        let offset = self.utc_offset_seconds(data, &report);
        let timezone = resolve_timezone(offset, report.report_timestamp)?;
        let window = AnalysisWindow::new(index, report, timezone, &self.config);
        if window.sample_range().is_empty() {
            return Err(WindowError::EmptyWindow {
                start: window.sample_start.to_utc(),
                end: window.sample_end.to_utc(),
            });
        }
        Ok(window)
    }

    pub fn process_window(
        &self,
        data: &ParticipantData,
        index: usize,
        report: IssueReport,
    ) -> Result<WindowOutput, WindowError> {
        let window = self.window(data, index, report)?;
        debug!(
            participant = %window.participant_id,
            window = index,
            timezone = window.timezone.name(),
            "window resolved"
        );
        let mut summary = WindowSummary::new(&window);
        let events = window.buffered_events(&data.events);
        if events.is_empty() {
            info!(participant = %window.participant_id, window = index, "no data around report");
            return Ok(WindowOutput {
                window,
                summary,
                timeline: None,
            });
        }
        summary.surrounding_data_available = true;

        let profiles = settings::expand_settings(&window.report, &mut summary);
        let cgm = self.align_cgm(&window, &events, &mut summary);
        let streams = self.insulin_and_carbs(window.buffered_range(), &events, &mut summary);

        let mut timeline = timeline::compose(&window, cgm.as_ref(), &streams, &profiles);
        rolling::roll(&mut timeline, &self.config);
        summary.record_cgm(&timeline);
        summary.record_insulin_and_carbs(&timeline);

        Ok(WindowOutput {
            window,
            summary,
            timeline: Some(timeline),
        })
    }

    /// CGM over the output window only; the lookback is not needed.
    fn align_cgm(
        &self,
        window: &AnalysisWindow,
        events: &[RawEvent],
        summary: &mut WindowSummary,
    ) -> Option<RegularizedSeries> {
        let start = window.sample_start.to_utc();
        let in_window = events
            .iter()
            .filter(|event| ceil_to_tick(event.timestamp) >= start)
            .cloned()
            .collect::<Vec<_>>();
        let aligned = align::align_cgm(&in_window, window.sample_range())?;
        summary.cgm_deduplicated_points = Some(aligned.deduplicated);
        Some(aligned.series)
    }

    /// Insulin and carb streams over the buffered window, with IOB.
    fn insulin_and_carbs(
        &self,
        range: TickRange,
        events: &[RawEvent],
        summary: &mut WindowSummary,
    ) -> InsulinCarbStreams {
        let basal = align::align_basal(events, range, self.config.basal_fill_limit);
        let bolus = align::align_bolus(events, range);
        let carbs = align::align_carbs(events, range);
        summary.basals_deduplicated = Some(basal.as_ref().map_or(0, |b| b.deduplicated));
        summary.boluses_deduplicated = Some(bolus.as_ref().map_or(0, |b| b.deduplicated));
        summary.carb_entries_deduplicated = Some(carbs.as_ref().map_or(0, |c| c.deduplicated));

        let total_insulin_delivered = total_insulin(
            basal.as_ref().map(|b| &b.pulse_delivered),
            bolus.as_ref().map(|b| &b.series),
        );
        let iob = total_insulin_delivered.as_ref().map(|total| {
            let values = iob::convolve(total.values(), &self.kernel);
            RegularizedSeries::new(range, values.into_iter().map(Some).collect())
        });
        let (set_basal_rate, basal_pulse_delivered) =
            basal.map_or((None, None), |b| (Some(b.set_rate), Some(b.pulse_delivered)));
        let (carbs, carb_absorption_minutes) =
            carbs.map_or((None, None), |c| (Some(c.carbs), Some(c.absorption_minutes)));

        InsulinCarbStreams {
            set_basal_rate,
            basal_pulse_delivered,
            bolus: bolus.map(|b| b.series),
            carbs,
            carb_absorption_minutes,
            total_insulin_delivered,
            iob,
        }
    }

    /// Processes every non-overlapping report of one participant, handing
    /// each finished window to `sink`.
    pub fn process_participant<F>(
        &self,
        data: &ParticipantData,
        reports: Vec<IssueReport>,
        mut sink: F,
    ) -> ParticipantOutcome
    where
        F: FnMut(WindowOutput),
    {
        let reports = remove_overlapping_reports(reports, self.config.analysis_window_days);
        let mut outcome = ParticipantOutcome::default();
        for (index, report) in reports.into_iter().enumerate() {
            let file_name = report.file_name.clone().unwrap_or_default();
            match self.process_window(data, index, report) {
                Ok(output) => {
                    outcome.processed += 1;
                    sink(output);
                }
                Err(err) => {
                    outcome.failed += 1;
                    error!(
                        participant = %data.participant_id,
                        window = index,
                        file = %file_name,
                        error = %err,
                        "window failed"
                    );
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_total_insulin_treats_missing_bolus_as_zero() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let range = TickRange::new(start, 3);
        let pulse = RegularizedSeries::new(range, vec![Some(0.1), Some(0.1), None]);
        let bolus = RegularizedSeries::new(range, vec![None, Some(2.0), None]);
        let total = total_insulin(Some(&pulse), Some(&bolus)).unwrap();
        assert_eq!(total.values(), &[Some(0.1), Some(2.1), None]);
        assert_eq!(total_insulin(None, Some(&bolus)).unwrap(), bolus);
        assert!(total_insulin(None, None).is_none());
    }

    #[test]
    fn test_offset_priority() {
        let pipeline = Pipeline::default();
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut event = RawEvent::new(t, EventKind::Cgm, Some(5.0), "u");
        event.timezone_offset_minutes = Some(-300);
        let data = ParticipantData::new("p", vec![event]);
        let mut report = IssueReport::new("p", t);
        assert_eq!(pipeline.utc_offset_seconds(&data, &report), -300 * 60);
        report.basal_rate_utc_offset_seconds = Some(3600);
        assert_eq!(pipeline.utc_offset_seconds(&data, &report), 3600);
        let empty = ParticipantData::new("p", vec![]);
        let report = IssueReport::new("p", t);
        assert_eq!(pipeline.utc_offset_seconds(&empty, &report), -360 * 60);
    }

    #[test]
    fn test_unresolvable_offset_fails_window() {
        let pipeline = Pipeline::default();
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut report = IssueReport::new("p", t);
        report.basal_rate_utc_offset_seconds = Some(17);
        let data = ParticipantData::new("p", vec![]);
        let err = pipeline.process_window(&data, 0, report).unwrap_err();
        assert!(matches!(err, WindowError::Timezone(_)));
    }

    #[test]
    fn test_empty_sample_yields_summary_only() {
        let pipeline = Pipeline::default();
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut report = IssueReport::new("p", t);
        report.basal_rate_utc_offset_seconds = Some(0);
        let far_away = RawEvent::new(t + chrono::TimeDelta::days(60), EventKind::Cgm, Some(5.0), "u");
        let data = ParticipantData::new("p", vec![far_away]);
        let output = pipeline.process_window(&data, 0, report).unwrap();
        assert!(output.timeline.is_none());
        assert!(!output.summary.surrounding_data_available);
        assert_eq!(output.summary.local_timezone, "Africa/Abidjan");
    }
}
