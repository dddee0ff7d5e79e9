//! Unified five-minute timeline of one analysis window
//!
//! [`compose`] lays every aligned stream and every expanded schedule onto a
//! common tick skeleton covering `[sample_start, sample_end]`:
//!
//! * streams are matched on the absolute tick instant
//! * schedules are matched on the slot of the tick's local time of day
//!   (`(hour * 60 + minute) / 5`), so they follow the participant's clock
//!   across DST changes
//!
//! A stream or schedule that is missing entirely becomes [`Column::Absent`]
//! rather than a column of unset values, so consumers can tell "no data at
//! this tick" apart from "no data at all".

use chrono::{DateTime, Timelike as _, Utc};
use chrono_tz::Tz;

use crate::{
    rolling::RollingColumns,
    schedule::{CorrectionRangeProfiles, DenseProfile},
    series::RegularizedSeries,
    window::AnalysisWindow,
};

/// A timeline column that may be missing altogether
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum Column {
    Present(Vec<Option<f64>>),
    Absent,
}

impl Column {
    /// Looks up `series` at each tick; absent if there is no series.
    #[must_use]
    pub fn from_series(series: Option<&RegularizedSeries>, ticks: &[DateTime<Utc>]) -> Self {
        match series {
            Some(series) => Self::Present(ticks.iter().map(|&t| series.get(t)).collect()),
            None => Self::Absent,
        }
    }

    /// Looks up `profile` at each tick's local time of day.
    #[must_use]
    pub fn from_profile(profile: Option<&DenseProfile>, local_times: &[DateTime<Tz>]) -> Self {
        match profile {
            Some(profile) => Self::Present(
                local_times
                    .iter()
                    .map(|t| Some(profile.at_minute(t.hour() * 60 + t.minute())))
                    .collect(),
            ),
            None => Self::Absent,
        }
    }

    #[must_use]
    pub fn values(&self) -> Option<&[Option<f64>]> {
        match self {
            Self::Present(values) => Some(values),
            Self::Absent => None,
        }
    }

    /// Value at tick `index`; `None` if unset or absent.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values().and_then(|values| values.get(index).copied().flatten())
    }

    /// All set values, in tick order.
    #[must_use]
    pub fn present_values(&self) -> Vec<f64> {
        self.values()
            .map(|values| values.iter().flatten().copied().collect())
            .unwrap_or_default()
    }
}

/// Insulin and carb streams over the buffered window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsulinCarbStreams {
    pub set_basal_rate: Option<RegularizedSeries>,
    pub basal_pulse_delivered: Option<RegularizedSeries>,
    pub bolus: Option<RegularizedSeries>,
    pub carbs: Option<RegularizedSeries>,
    pub carb_absorption_minutes: Option<RegularizedSeries>,
    pub total_insulin_delivered: Option<RegularizedSeries>,
    pub iob: Option<RegularizedSeries>,
}

/// Expanded settings schedules, each absent if missing or invalid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleProfiles {
    pub basal_rate: Option<DenseProfile>,
    pub isf: Option<DenseProfile>,
    pub carb_ratio: Option<DenseProfile>,
    pub correction_range: Option<CorrectionRangeProfiles>,
}

/// Settings averaged over what was actually delivered or eaten
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedSettings {
    pub carb_weighted_carb_ratio: Option<f64>,
    pub insulin_weighted_isf: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub local_times: Vec<DateTime<Tz>>,
    pub cgm: Column,
    pub set_basal_rate: Column,
    pub basal_pulse_delivered: Column,
    pub bolus: Column,
    pub carbs: Column,
    pub carb_absorption_minutes: Column,
    pub total_insulin_delivered: Column,
    pub iob: Column,
    pub sbr: Column,
    pub isf: Column,
    pub carb_ratio: Column,
    pub bg_target_lower: Column,
    pub bg_target_upper: Column,
    /// Rolling statistics, one entry per window size
    pub rolling: Vec<RollingColumns>,
}

/// Merges streams and schedules onto the window's tick skeleton.
#[must_use]
pub fn compose(
    window: &AnalysisWindow,
    cgm: Option<&RegularizedSeries>,
    streams: &InsulinCarbStreams,
    profiles: &ScheduleProfiles,
) -> Timeline {
    let ticks = window.sample_range().ticks().collect::<Vec<_>>();
    let local_times = ticks
        .iter()
        .map(|t| t.with_timezone(&window.timezone))
        .collect::<Vec<_>>();
    let stream = |series: &Option<RegularizedSeries>| Column::from_series(series.as_ref(), &ticks);
    let schedule = |profile: Option<&DenseProfile>| Column::from_profile(profile, &local_times);
    let correction = profiles.correction_range.as_ref();

    Timeline {
        cgm: Column::from_series(cgm, &ticks),
        set_basal_rate: stream(&streams.set_basal_rate),
        basal_pulse_delivered: stream(&streams.basal_pulse_delivered),
        bolus: stream(&streams.bolus),
        carbs: stream(&streams.carbs),
        carb_absorption_minutes: stream(&streams.carb_absorption_minutes),
        total_insulin_delivered: stream(&streams.total_insulin_delivered),
        iob: stream(&streams.iob),
        sbr: schedule(profiles.basal_rate.as_ref()),
        isf: schedule(profiles.isf.as_ref()),
        carb_ratio: schedule(profiles.carb_ratio.as_ref()),
        bg_target_lower: schedule(correction.map(|c| &c.lower)),
        bg_target_upper: schedule(correction.map(|c| &c.upper)),
        rolling: Vec::new(),
        local_times,
    }
}

/// `Σ(weight · setting) / Σ weight`; `None` without weights or with a zero total.
fn weighted_mean(weights: &Column, setting: &Column) -> Option<f64> {
    let (weights, setting) = (weights.values()?, setting.values()?);
    let denominator = weights.iter().flatten().sum::<f64>();
    if denominator == 0.0 {
        return None;
    }
    let numerator = weights
        .iter()
        .zip(setting)
        .filter_map(|(w, s)| Some((*w)? * (*s)?))
        .sum::<f64>();
    Some(numerator / denominator)
}

impl Timeline {
    #[must_use]
    pub fn len(&self) -> usize {
        self.local_times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local_times.is_empty()
    }

    /// Carb ratio weighted by carbs eaten and ISF weighted by insulin delivered.
    #[must_use]
    pub fn weighted_settings(&self) -> WeightedSettings {
        WeightedSettings {
            carb_weighted_carb_ratio: weighted_mean(&self.carbs, &self.carb_ratio),
            insulin_weighted_isf: weighted_mean(&self.total_insulin_delivered, &self.isf),
        }
    }

    /// Composed columns in export order, followed by every rolling column.
    #[must_use]
    pub fn named_columns(&self) -> Vec<(String, Option<&[Option<f64>]>)> {
        let composed = [
            ("cgm", &self.cgm),
            ("set_basal_rate", &self.set_basal_rate),
            ("basal_pulse_delivered", &self.basal_pulse_delivered),
            ("bolus", &self.bolus),
            ("carbs", &self.carbs),
            ("carb_absorption_minutes", &self.carb_absorption_minutes),
            ("total_insulin_delivered", &self.total_insulin_delivered),
            ("iob", &self.iob),
            ("sbr", &self.sbr),
            ("isf", &self.isf),
            ("carb_ratio", &self.carb_ratio),
            ("bg_target_lower", &self.bg_target_lower),
            ("bg_target_upper", &self.bg_target_upper),
        ];
        composed
            .into_iter()
            .map(|(name, column)| (name.to_owned(), column.values()))
            .chain(
                self.rolling
                    .iter()
                    .flat_map(RollingColumns::named_columns)
                    .map(|(name, values)| (name, Some(values))),
            )
            .collect()
    }
}
