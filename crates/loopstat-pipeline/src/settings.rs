//! Issue-report settings: schedule expansion, unit normalization and the
//! plausibility check
//!
//! A schedule that is missing leaves its statistics unset. A schedule that
//! is present but cannot be parsed or expanded is flagged in the summary
//! (`*_schedule_invalid`) and its profile is absent from the timeline; the
//! rest of the window is still processed.

use tracing::warn;

use crate::{
    schedule::{CorrectionRangeProfiles, DenseProfile, InvalidScheduleError, Schedule, ScheduleParseError},
    summary::{WindowSummary, finite},
    timeline::ScheduleProfiles,
    units::GlucoseUnit,
    window::IssueReport,
};

/// Highest plausible suspend threshold, mg/dL
pub const MAX_SUSPEND_THRESHOLD: f64 = 400.0;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ScheduleError {
    #[display("malformed schedule literal")]
    Parse(ScheduleParseError),
    #[display("schedule cannot be expanded")]
    Invalid(InvalidScheduleError),
}

impl From<ScheduleParseError> for ScheduleError {
    fn from(err: ScheduleParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<InvalidScheduleError> for ScheduleError {
    fn from(err: InvalidScheduleError) -> Self {
        Self::Invalid(err)
    }
}

/// Units settings are reported in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUnits {
    pub isf: GlucoseUnit,
    pub suspend_threshold: GlucoseUnit,
}

impl SettingsUnits {
    #[must_use]
    pub fn from_report(report: &IssueReport) -> Self {
        Self {
            isf: GlucoseUnit::from_label(report.isf_unit.as_deref()),
            suspend_threshold: GlucoseUnit::from_label(report.suspend_threshold_unit.as_deref()),
        }
    }

    /// Correction ranges carry no unit of their own; they are taken as
    /// mmol/L if any other glucose setting is.
    #[must_use]
    pub fn correction_range(self) -> GlucoseUnit {
        if self.isf.is_mmol() || self.suspend_threshold.is_mmol() {
            GlucoseUnit::Mmol
        } else {
            GlucoseUnit::MgDl
        }
    }
}

fn parse_and_expand(literal: &str) -> Result<(Schedule, DenseProfile), ScheduleError> {
    let schedule = Schedule::parse(literal)?;
    let profile = schedule.expand()?;
    Ok((schedule, profile))
}

fn parse_and_expand_range(literal: &str) -> Result<(Schedule, CorrectionRangeProfiles), ScheduleError> {
    let schedule = Schedule::parse(literal)?;
    let profiles = schedule.expand_correction_range()?;
    Ok((schedule, profiles))
}

/// Runs `expand` on a present literal; failures are logged and flagged.
fn expand_flagged<T, F>(name: &str, literal: Option<&str>, invalid: &mut bool, expand: F) -> Option<(Schedule, T)>
where
    F: FnOnce(&str) -> Result<(Schedule, T), ScheduleError>,
{
    match expand(literal?) {
        Ok(expanded) => Some(expanded),
        Err(err) => {
            let detail = match &err {
                ScheduleError::Parse(source) => source.to_string(),
                ScheduleError::Invalid(source) => source.to_string(),
            };
            warn!(schedule = name, %detail, "{err}");
            *invalid = true;
            None
        }
    }
}

/// Expands every schedule of `report` to mg/dL profiles, recording their
/// statistics and the settings check in `summary`.
pub fn expand_settings(report: &IssueReport, summary: &mut WindowSummary) -> ScheduleProfiles {
    let units = SettingsUnits::from_report(report);
    let mut profiles = ScheduleProfiles::default();

    if let Some((schedule, profile)) = expand_flagged(
        "basal_rate",
        report.basal_rate_schedule.as_deref(),
        &mut summary.basal_rate_schedule_invalid,
        parse_and_expand,
    ) {
        let median = profile.median();
        summary.scheduled_basal_rate_schedule_count = Some(schedule.len());
        summary.scheduled_basal_rate_median = finite(median);
        summary.scheduled_basal_rate_geomean = finite(profile.geometric_mean());
        summary.scheduled_basal_total_daily_insulin_expected = Some(profile.sum() / 12.0);
        summary.scheduled_basal_to_max_basal_ratio = report.maximum_basal_rate.and_then(|max| finite(max / median));
        profiles.basal_rate = Some(profile);
    }

    if let Some((schedule, profile)) = expand_flagged(
        "insulin_sensitivity_factor",
        report.isf_schedule.as_deref(),
        &mut summary.isf_schedule_invalid,
        parse_and_expand,
    ) {
        let profile = profile.to_mg_dl(units.isf);
        summary.isf_schedule_count = Some(schedule.len());
        summary.isf_median = finite(profile.median());
        summary.isf_geomean = finite(profile.geometric_mean());
        profiles.isf = Some(profile);
    }

    if let Some((schedule, profile)) = expand_flagged(
        "carb_ratio",
        report.carb_ratio_schedule.as_deref(),
        &mut summary.carb_ratio_schedule_invalid,
        parse_and_expand,
    ) {
        summary.carb_ratio_schedule_count = Some(schedule.len());
        summary.carb_ratio_median = finite(profile.median());
        summary.carb_ratio_geomean = finite(profile.geometric_mean());
        profiles.carb_ratio = Some(profile);
    }

    if let Some((schedule, range)) = expand_flagged(
        "correction_range",
        report.correction_range_schedule.as_deref(),
        &mut summary.correction_range_schedule_invalid,
        parse_and_expand_range,
    ) {
        let range = range.to_mg_dl(units.correction_range());
        summary.correction_range_schedule_count = Some(schedule.len());
        summary.bg_target_lower_median = finite(range.lower.median());
        summary.bg_target_lower_geomean = finite(range.lower.geometric_mean());
        summary.bg_target_midpoint_median = finite(range.midpoint.median());
        summary.bg_target_midpoint_geomean = finite(range.midpoint.geometric_mean());
        summary.bg_target_upper_median = finite(range.upper.median());
        summary.bg_target_upper_geomean = finite(range.upper.geometric_mean());
        summary.bg_target_span_median = finite(range.span().median());
        profiles.correction_range = Some(range);
    }

    summary.suspend_threshold = report
        .suspend_threshold
        .map(|value| units.suspend_threshold.setting_to_mg_dl(value));
    summary.contains_incorrect_settings_value = has_implausible_settings(summary);

    profiles
}

/// Suspend threshold outside `[0, 400]` mg/dL, or a negative ISF.
fn has_implausible_settings(summary: &WindowSummary) -> bool {
    let suspend_out_of_range = summary
        .suspend_threshold
        .is_some_and(|v| !(0.0..=MAX_SUSPEND_THRESHOLD).contains(&v));
    let negative_isf = [summary.isf_median, summary.isf_geomean]
        .into_iter()
        .flatten()
        .any(|v| v < 0.0);
    suspend_out_of_range || negative_isf
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;

    fn report() -> IssueReport {
        IssueReport::new("p", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_mg_dl_settings() {
        let mut report = report();
        report.basal_rate_schedule = Some("[{'startTime': 0, 'value': 1.0}, {'startTime': 43200, 'value': 2.0}]".into());
        report.isf_schedule = Some("[{'startTime': 0, 'value': 50}]".into());
        report.carb_ratio_schedule = Some("[{'startTime': 0, 'value': 10}]".into());
        report.correction_range_schedule = Some("[{'startTime': 0, 'value': [100, 120]}]".into());
        report.maximum_basal_rate = Some(6.0);
        report.suspend_threshold = Some(70.0);
        let mut summary = WindowSummary::default();
        let profiles = expand_settings(&report, &mut summary);

        assert_eq!(summary.scheduled_basal_rate_schedule_count, Some(2));
        assert_eq!(summary.scheduled_basal_rate_median, Some(1.5));
        assert_eq!(summary.scheduled_basal_total_daily_insulin_expected, Some(36.0));
        assert_eq!(summary.scheduled_basal_to_max_basal_ratio, Some(4.0));
        assert_eq!(summary.isf_median, Some(50.0));
        assert_eq!(summary.carb_ratio_median, Some(10.0));
        assert_eq!(summary.bg_target_midpoint_median, Some(110.0));
        assert_eq!(summary.bg_target_span_median, Some(20.0));
        assert_eq!(summary.suspend_threshold, Some(70.0));
        assert!(!summary.contains_incorrect_settings_value);
        assert!(profiles.basal_rate.is_some());
        assert!(profiles.correction_range.is_some());
    }

    #[test]
    fn test_mmol_isf_converts_targets_too() {
        let mut report = report();
        report.isf_unit = Some("mmol/L/U".into());
        report.isf_schedule = Some("[{'startTime': 0, 'value': 2.0}]".into());
        report.correction_range_schedule = Some("[{'startTime': 0, 'value': [6.0, 8.0]}]".into());
        let mut summary = WindowSummary::default();
        let profiles = expand_settings(&report, &mut summary);

        assert_eq!(summary.isf_median, Some(36.0312));
        assert_eq!(summary.bg_target_lower_median, Some(108.0935));
        assert_eq!(summary.bg_target_upper_median, Some(144.1247));
        assert_eq!(profiles.isf.unwrap().slot(100), 36.0312);
    }

    #[test]
    fn test_invalid_schedule_is_flagged_not_fatal() {
        let mut report = report();
        report.basal_rate_schedule = Some("[{'startTime': 0, 'value': 1.0}, {'startTime': 100, 'value': 2.0}]".into());
        report.carb_ratio_schedule = Some("not a schedule".into());
        report.isf_schedule = Some("[{'startTime': 0, 'value': 40}]".into());
        let mut summary = WindowSummary::default();
        let profiles = expand_settings(&report, &mut summary);

        assert!(summary.basal_rate_schedule_invalid);
        assert!(summary.carb_ratio_schedule_invalid);
        assert!(!summary.isf_schedule_invalid);
        assert!(!summary.correction_range_schedule_invalid);
        assert_eq!(summary.scheduled_basal_rate_median, None);
        assert!(profiles.basal_rate.is_none());
        assert!(profiles.isf.is_some());
    }

    #[test]
    fn test_implausible_suspend_threshold() {
        let mut report = report();
        report.suspend_threshold = Some(24.0);
        report.suspend_threshold_unit = Some("mmol/L".into());
        let mut summary = WindowSummary::default();
        expand_settings(&report, &mut summary);
        assert_eq!(summary.suspend_threshold, Some(432.3742));
        assert!(summary.contains_incorrect_settings_value);
    }
}
