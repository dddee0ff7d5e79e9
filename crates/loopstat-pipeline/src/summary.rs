//! One flat summary record per analysis window
//!
//! [`WindowSummary`] is written as a single CSV row, so every field is a
//! scalar and the serialized names are the column headers. Statistics that
//! could not be computed (no data, or a schedule that failed to expand) are
//! left as `None` and come out as empty cells.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use loopstat_stats::descriptive;
use serde::{Deserialize, Serialize};

use crate::{
    risk,
    rolling::CgmRange,
    series::TICK_MINUTES,
    timeline::{Column, Timeline},
    units::{ROUND_PRECISION, round_to},
    window::AnalysisWindow,
};

/// Glucose Management Indicator, `3.31 + 0.02392 * mean` (mg/dL)
#[must_use]
pub fn glucose_management_indicator(mean_mg_dl: f64) -> f64 {
    3.31 + 0.023_92 * mean_mg_dl
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[expect(clippy::struct_excessive_bools)]
pub struct WindowSummary {
    pub loop_id: String,
    pub report_num: usize,
    pub report_timestamp: Option<DateTime<Utc>>,
    pub file_name: Option<String>,
    pub local_timezone: String,
    pub surrounding_data_available: bool,

    pub maximum_basal_rate: Option<f64>,
    /// In mg/dL
    pub suspend_threshold: Option<f64>,
    pub suspend_threshold_unit: Option<String>,
    pub isf_unit: Option<String>,
    pub contains_incorrect_settings_value: bool,

    pub scheduled_basal_rate_schedule_count: Option<usize>,
    pub scheduled_basal_rate_median: Option<f64>,
    pub scheduled_basal_rate_geomean: Option<f64>,
    pub scheduled_basal_total_daily_insulin_expected: Option<f64>,
    pub scheduled_basal_to_max_basal_ratio: Option<f64>,
    pub basal_rate_schedule_invalid: bool,

    pub isf_schedule_count: Option<usize>,
    pub isf_median: Option<f64>,
    pub isf_geomean: Option<f64>,
    pub isf_schedule_invalid: bool,

    pub carb_ratio_schedule_count: Option<usize>,
    pub carb_ratio_median: Option<f64>,
    pub carb_ratio_geomean: Option<f64>,
    pub carb_ratio_schedule_invalid: bool,

    pub correction_range_schedule_count: Option<usize>,
    pub bg_target_lower_median: Option<f64>,
    pub bg_target_lower_geomean: Option<f64>,
    pub bg_target_midpoint_median: Option<f64>,
    pub bg_target_midpoint_geomean: Option<f64>,
    pub bg_target_upper_median: Option<f64>,
    pub bg_target_upper_geomean: Option<f64>,
    pub bg_target_span_median: Option<f64>,
    pub correction_range_schedule_invalid: bool,

    pub cgm_deduplicated_points: Option<usize>,
    pub percent_cgm_available: Option<f64>,
    pub percent_above_250: Option<f64>,
    pub percent_above_180: Option<f64>,
    pub percent_70_180: Option<f64>,
    pub percent_54_70: Option<f64>,
    pub percent_below_70: Option<f64>,
    pub percent_below_54: Option<f64>,
    pub percent_below_40: Option<f64>,
    pub cgm_mean: Option<f64>,
    pub cgm_gmi: Option<f64>,
    pub cgm_std: Option<f64>,
    pub cgm_median: Option<f64>,
    pub cgm_geomean: Option<f64>,
    pub cgm_geostd: Option<f64>,
    #[serde(rename = "LBGI")]
    pub lbgi: Option<f64>,
    #[serde(rename = "HBGI")]
    pub hbgi: Option<f64>,
    #[serde(rename = "BGRI")]
    pub bgri: Option<f64>,
    #[serde(rename = "LBGI_RS")]
    pub lbgi_rs: Option<u8>,
    #[serde(rename = "HBGI_RS")]
    pub hbgi_rs: Option<u8>,

    pub basals_deduplicated: Option<usize>,
    pub boluses_deduplicated: Option<usize>,
    pub carb_entries_deduplicated: Option<usize>,

    pub days_with_basals: Option<usize>,
    pub basal_total_daily_mean: Option<f64>,
    pub basal_total_daily_median: Option<f64>,
    pub basal_total_daily_geomean: Option<f64>,
    pub days_with_boluses: Option<usize>,
    pub bolus_total_daily_mean: Option<f64>,
    pub bolus_total_daily_median: Option<f64>,
    pub bolus_total_daily_geomean: Option<f64>,
    pub days_with_insulin: Option<usize>,
    pub insulin_total_daily_mean: Option<f64>,
    pub insulin_total_daily_median: Option<f64>,
    pub insulin_total_daily_geomean: Option<f64>,
    pub days_with_carbs: Option<usize>,
    pub carbs_total_daily_mean: Option<f64>,
    pub carbs_total_daily_median: Option<f64>,
    pub carbs_total_daily_geomean: Option<f64>,

    pub carb_weighted_carb_ratio: Option<f64>,
    pub insulin_weighted_isf: Option<f64>,

    /// Hours per local day spent below half the steady-state IOB
    pub dka_index_daily_median: Option<f64>,
    pub dka_index_daily_max: Option<f64>,
    pub dka_risk_score: Option<u8>,
}

/// `Some(v)` when `v` is finite.
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Mean, median and geometric mean of the nonzero daily totals of a column
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTotals {
    pub days: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub geometric_mean: Option<f64>,
}

impl DailyTotals {
    /// Sums `column` per local date; days summing to zero are not counted.
    #[must_use]
    pub fn new(timeline: &Timeline, column: &Column) -> Self {
        let Some(values) = column.values() else {
            return Self::default();
        };
        let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (time, value) in timeline.local_times.iter().zip(values) {
            *per_day.entry(time.date_naive()).or_default() += value.unwrap_or(0.0);
        }
        let totals = per_day.into_values().filter(|&t| t != 0.0).collect::<Vec<_>>();
        if totals.is_empty() {
            return Self::default();
        }
        Self {
            days: totals.len(),
            mean: finite(descriptive::mean(&totals)),
            median: finite(descriptive::median(&totals)),
            geometric_mean: finite(descriptive::geometric_mean(&totals)),
        }
    }
}

/// Hours below half the steady-state IOB on each local day that has both
/// IOB and a scheduled basal rate.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn daily_dka_hours(timeline: &Timeline) -> Vec<f64> {
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for (i, time) in timeline.local_times.iter().enumerate() {
        let (Some(iob), Some(sbr)) = (timeline.iob.get(i), timeline.sbr.get(i)) else {
            continue;
        };
        *per_day.entry(time.date_naive()).or_default() += usize::from(risk::is_low_insulin(iob, sbr));
    }
    per_day
        .into_values()
        .map(|ticks| ticks as f64 * TICK_MINUTES as f64 / 60.0)
        .collect()
}

impl WindowSummary {
    /// Identity fields of `window`; every statistic unset.
    #[must_use]
    pub fn new(window: &AnalysisWindow) -> Self {
        let report = &window.report;
        Self {
            loop_id: window.participant_id.clone(),
            report_num: window.index,
            report_timestamp: Some(report.report_timestamp),
            file_name: report.file_name.clone(),
            local_timezone: window.timezone.name().to_owned(),
            maximum_basal_rate: report.maximum_basal_rate,
            suspend_threshold_unit: report.suspend_threshold_unit.clone(),
            isf_unit: report.isf_unit.clone(),
            ..Self::default()
        }
    }

    /// CGM statistics over the output window.
    ///
    /// Availability is measured against the span from the first to the last
    /// reading, not the whole window.
    #[expect(clippy::cast_precision_loss)]
    pub fn record_cgm(&mut self, timeline: &Timeline) {
        let readings = timeline
            .cgm
            .values()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((i, (*v)?)))
            .collect::<Vec<_>>();
        let (Some(&(first, _)), Some(&(last, _))) = (readings.first(), readings.last()) else {
            self.percent_cgm_available = Some(0.0);
            return;
        };
        let values = readings.iter().map(|&(_, v)| v).collect::<Vec<_>>();
        let n = values.len() as f64;
        let possible = (last - first + 1) as f64;
        let percent = |range: CgmRange| {
            let inside = values.iter().filter(|&&v| range.contains(v)).count() as f64;
            Some(round_to(100.0 * inside / n, ROUND_PRECISION))
        };

        self.percent_cgm_available = Some(round_to(100.0 * n / possible, ROUND_PRECISION));
        self.percent_above_250 = percent(CgmRange::Gt250);
        self.percent_above_180 = percent(CgmRange::Gt180);
        self.percent_70_180 = percent(CgmRange::Range70To180);
        self.percent_54_70 = percent(CgmRange::Range54To70);
        self.percent_below_70 = percent(CgmRange::Lt70);
        self.percent_below_54 = percent(CgmRange::Lt54);
        self.percent_below_40 = percent(CgmRange::Lt40);

        let mean = descriptive::mean(&values);
        self.cgm_mean = finite(mean);
        self.cgm_gmi = finite(glucose_management_indicator(mean));
        self.cgm_std = finite(descriptive::population_std(&values));
        self.cgm_median = finite(descriptive::median(&values));
        self.cgm_geomean = finite(descriptive::geometric_mean(&values));
        self.cgm_geostd = finite(descriptive::geometric_std(&values));

        let bg_risk = risk::blood_glucose_risk(&values);
        self.lbgi = finite(bg_risk.lbgi);
        self.hbgi = finite(bg_risk.hbgi);
        self.bgri = finite(bg_risk.bgri);
        self.lbgi_rs = self.lbgi.map(risk::lbgi_risk_score);
        self.hbgi_rs = self.hbgi.map(risk::hbgi_risk_score);
    }

    /// Daily insulin and carb totals, weighted settings and the DKA index.
    pub fn record_insulin_and_carbs(&mut self, timeline: &Timeline) {
        let basal = DailyTotals::new(timeline, &timeline.basal_pulse_delivered);
        self.days_with_basals = Some(basal.days);
        self.basal_total_daily_mean = basal.mean;
        self.basal_total_daily_median = basal.median;
        self.basal_total_daily_geomean = basal.geometric_mean;

        let bolus = DailyTotals::new(timeline, &timeline.bolus);
        self.days_with_boluses = Some(bolus.days);
        self.bolus_total_daily_mean = bolus.mean;
        self.bolus_total_daily_median = bolus.median;
        self.bolus_total_daily_geomean = bolus.geometric_mean;

        let insulin = DailyTotals::new(timeline, &timeline.total_insulin_delivered);
        self.days_with_insulin = Some(insulin.days);
        self.insulin_total_daily_mean = insulin.mean;
        self.insulin_total_daily_median = insulin.median;
        self.insulin_total_daily_geomean = insulin.geometric_mean;

        let carbs = DailyTotals::new(timeline, &timeline.carbs);
        self.days_with_carbs = Some(carbs.days);
        self.carbs_total_daily_mean = carbs.mean;
        self.carbs_total_daily_median = carbs.median;
        self.carbs_total_daily_geomean = carbs.geometric_mean;

        let weighted = timeline.weighted_settings();
        self.carb_weighted_carb_ratio = weighted.carb_weighted_carb_ratio;
        self.insulin_weighted_isf = weighted.insulin_weighted_isf;

        let dka_hours = daily_dka_hours(timeline);
        if !dka_hours.is_empty() {
            let median = descriptive::median(&dka_hours);
            self.dka_index_daily_median = finite(median);
            self.dka_index_daily_max = dka_hours.iter().copied().reduce(f64::max);
            self.dka_risk_score = Some(risk::dka_risk_score(median));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone as _};
    use chrono_tz::Tz;

    use super::*;

    fn timeline(len: usize) -> Timeline {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let local_times = (0..len)
            .map(|i| (start + TimeDelta::minutes(5 * i64::try_from(i).unwrap())).with_timezone(&Tz::UTC))
            .collect();
        Timeline {
            local_times,
            cgm: Column::Absent,
            set_basal_rate: Column::Absent,
            basal_pulse_delivered: Column::Absent,
            bolus: Column::Absent,
            carbs: Column::Absent,
            carb_absorption_minutes: Column::Absent,
            total_insulin_delivered: Column::Absent,
            iob: Column::Absent,
            sbr: Column::Absent,
            isf: Column::Absent,
            carb_ratio: Column::Absent,
            bg_target_lower: Column::Absent,
            bg_target_upper: Column::Absent,
            rolling: Vec::new(),
        }
    }

    #[test]
    fn test_no_cgm_reports_zero_availability() {
        let mut summary = WindowSummary::default();
        summary.record_cgm(&timeline(10));
        assert_eq!(summary.percent_cgm_available, Some(0.0));
        assert_eq!(summary.cgm_mean, None);
        assert_eq!(summary.lbgi_rs, None);
    }

    #[test]
    fn test_cgm_availability_over_reading_span() {
        let mut t = timeline(20);
        let mut cgm = vec![None; 20];
        // readings at ticks 5..=9, with 7 missing
        for i in [5, 6, 8, 9] {
            cgm[i] = Some(100.0);
        }
        t.cgm = Column::Present(cgm);
        let mut summary = WindowSummary::default();
        summary.record_cgm(&t);
        assert_eq!(summary.percent_cgm_available, Some(80.0));
        assert_eq!(summary.percent_70_180, Some(100.0));
        assert_eq!(summary.percent_below_70, Some(0.0));
        assert_eq!(summary.cgm_std, Some(0.0));
        assert!((summary.cgm_gmi.unwrap() - 5.702).abs() < 1e-12);
    }

    #[test]
    fn test_range_percentages_rounded() {
        let mut t = timeline(3);
        t.cgm = Column::Present(vec![Some(50.0), Some(70.0), Some(200.0)]);
        let mut summary = WindowSummary::default();
        summary.record_cgm(&t);
        assert_eq!(summary.percent_below_70, Some(33.3333));
        assert_eq!(summary.percent_54_70, Some(33.3333));
        assert_eq!(summary.percent_70_180, Some(33.3333));
        assert_eq!(summary.percent_above_180, Some(33.3333));
        assert_eq!(summary.percent_below_54, Some(33.3333));
        assert_eq!(summary.percent_below_40, Some(0.0));
    }

    #[test]
    fn test_daily_totals_skip_zero_days() {
        // three UTC days; the second has no delivery
        let mut t = timeline(3 * 288);
        let mut bolus = vec![None; 3 * 288];
        bolus[10] = Some(2.0);
        bolus[20] = Some(2.0);
        bolus[2 * 288 + 5] = Some(1.0);
        t.bolus = Column::Present(bolus);
        let totals = DailyTotals::new(&t, &t.bolus);
        assert_eq!(totals.days, 2);
        assert_eq!(totals.mean, Some(2.5));
        assert_eq!(totals.median, Some(2.5));
        assert!((totals.geometric_mean.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(DailyTotals::new(&t, &t.carbs), DailyTotals::default());
    }

    #[test]
    fn test_daily_dka_hours() {
        let mut t = timeline(2 * 288);
        t.sbr = Column::Present(vec![Some(1.0); 2 * 288]);
        let mut iob = vec![Some(2.0); 2 * 288];
        // 3 hours low on day one, none on day two
        for value in iob.iter_mut().take(36) {
            *value = Some(0.0);
        }
        t.iob = Column::Present(iob);
        assert_eq!(daily_dka_hours(&t), vec![3.0, 0.0]);

        let mut summary = WindowSummary::default();
        summary.record_insulin_and_carbs(&t);
        assert_eq!(summary.dka_index_daily_median, Some(1.5));
        assert_eq!(summary.dka_index_daily_max, Some(3.0));
        assert_eq!(summary.dka_risk_score, Some(0));
        assert_eq!(summary.days_with_basals, Some(0));
    }
}
