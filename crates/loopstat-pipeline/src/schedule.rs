//! 24-hour settings schedules
//!
//! An issue report stores each therapy setting (basal rate, ISF, carb ratio,
//! correction range) as a sparse list of `{startTime, value}` entries: a value
//! holds from its start time until the next entry, wrapping at midnight.
//! This module parses those literals and expands them into a
//! [`DenseProfile`] of 288 five-minute slots.
//!
//! # Expansion
//!
//! Each entry is written into slot `floor(start_seconds / 300)`. Unset slots
//! are forward-filled from the preceding set slot; slot 0 takes the value of
//! slot 287 when the first entry starts after midnight, and the fill runs
//! again.
//!
//! ```
//! use loopstat_pipeline::schedule::Schedule;
//!
//! let schedule =
//!     Schedule::parse("[{'startTime': 0, 'value': 0.8}, {'startTime': 21600, 'value': 1.2}]")
//!         .unwrap();
//! let profile = schedule.expand().unwrap();
//! assert_eq!(profile.values().len(), 288);
//! assert_eq!(profile.slot(71), 0.8);
//! assert_eq!(profile.slot(72), 1.2);
//! assert_eq!(profile.slot(287), 1.2);
//! ```

use serde::Deserialize;

use crate::units::GlucoseUnit;
use loopstat_stats::descriptive;

/// Five-minute slots in one day
pub const SLOTS_PER_DAY: usize = 288;

/// Minutes covered by one slot
pub const MINUTES_PER_SLOT: i64 = 5;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("malformed schedule literal: {source}")]
pub struct ScheduleParseError {
    source: serde_json::Error,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum InvalidScheduleError {
    #[display("schedule has no entries")]
    Empty,
    #[display("start time {minutes} min is not a multiple of 5 minutes")]
    Misaligned { minutes: i64 },
    #[display("start time {minutes} min lies outside the day")]
    OutOfDay { minutes: i64 },
    #[display("expected a single value, found a range at {minutes} min")]
    UnexpectedRange { minutes: i64 },
    #[display("expected a range, found a single value at {minutes} min")]
    ExpectedRange { minutes: i64 },
}

/// Value held by one schedule entry
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScheduleValue {
    Scalar(f64),
    Range([f64; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry {
    pub start_seconds: f64,
    pub value: ScheduleValue,
}

impl ScheduleEntry {
    #[expect(clippy::cast_possible_truncation)]
    fn start_minutes(&self) -> i64 {
        (self.start_seconds / 60.0).floor() as i64
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StartTime {
    Seconds(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    start_time: StartTime,
    value: ScheduleValue,
}

/// An ordered list of schedule entries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    #[must_use]
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    /// Parses an issue-report schedule literal.
    ///
    /// The literal is a JSON array written with either quote style; string
    /// start times must hold a number.
    pub fn parse(literal: &str) -> Result<Self, ScheduleParseError> {
        let json = literal.replace('\'', "\"");
        let raw: Vec<RawEntry> =
            serde_json::from_str(&json).map_err(|source| ScheduleParseError { source })?;
        let entries = raw
            .into_iter()
            .map(|entry| {
                let start_seconds = match entry.start_time {
                    StartTime::Seconds(seconds) => seconds,
                    StartTime::Text(text) => serde_json::from_str(text.trim())
                        .map_err(|source| ScheduleParseError { source })?,
                };
                Ok(ScheduleEntry {
                    start_seconds,
                    value: entry.value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expands a scalar-valued schedule (basal rate, ISF, carb ratio).
    pub fn expand(&self) -> Result<DenseProfile, InvalidScheduleError> {
        let values = self
            .expand_values()?
            .into_iter()
            .map(|(minutes, value)| match value {
                ScheduleValue::Scalar(v) => Ok(v),
                ScheduleValue::Range(_) => Err(InvalidScheduleError::UnexpectedRange { minutes }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DenseProfile { values })
    }

    /// Expands a correction-range schedule into its lower, upper and midpoint
    /// profiles.
    pub fn expand_correction_range(&self) -> Result<CorrectionRangeProfiles, InvalidScheduleError> {
        let mut lower = Vec::with_capacity(SLOTS_PER_DAY);
        let mut upper = Vec::with_capacity(SLOTS_PER_DAY);
        for (minutes, value) in self.expand_values()? {
            let ScheduleValue::Range([lo, hi]) = value else {
                return Err(InvalidScheduleError::ExpectedRange { minutes });
            };
            lower.push(lo);
            upper.push(hi);
        }
        Ok(CorrectionRangeProfiles::new(
            DenseProfile { values: lower },
            DenseProfile { values: upper },
        ))
    }

    /// Dense slot values, each paired with the start minute of the entry it
    /// came from.
    fn expand_values(&self) -> Result<Vec<(i64, ScheduleValue)>, InvalidScheduleError> {
        match self.entries.as_slice() {
            [] => Err(InvalidScheduleError::Empty),
            // a lone entry holds all day, wherever it starts
            [entry] => Ok(vec![(entry.start_minutes().max(0), entry.value); SLOTS_PER_DAY]),
            entries => {
                let mut slots: Vec<Option<(i64, ScheduleValue)>> = vec![None; SLOTS_PER_DAY];
                for entry in entries {
                    let minutes = entry.start_minutes();
                    if minutes % MINUTES_PER_SLOT != 0 {
                        return Err(InvalidScheduleError::Misaligned { minutes });
                    }
                    let slot = usize::try_from(minutes / MINUTES_PER_SLOT)
                        .ok()
                        .filter(|slot| *slot < SLOTS_PER_DAY)
                        .ok_or(InvalidScheduleError::OutOfDay { minutes })?;
                    slots[slot] = Some((minutes, entry.value));
                }
                forward_fill_slots(&mut slots);
                if slots[0].is_none() {
                    slots[0] = slots[SLOTS_PER_DAY - 1];
                    forward_fill_slots(&mut slots);
                }
                // at least one slot was written, so the wraparound fill reaches every slot
                Ok(slots.into_iter().flatten().collect())
            }
        }
    }
}

fn forward_fill_slots<T: Copy>(slots: &mut [Option<T>]) {
    let mut last = None;
    for slot in slots {
        match *slot {
            Some(value) => last = Some(value),
            None => *slot = last,
        }
    }
}

/// A setting value for each of the 288 five-minute slots of a day
#[derive(Debug, Clone, PartialEq)]
pub struct DenseProfile {
    values: Vec<f64>,
}

impl DenseProfile {
    /// Builds a profile from exactly [`SLOTS_PER_DAY`] values.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold one value per slot.
    #[must_use]
    pub fn from_values(values: Vec<f64>) -> Self {
        assert_eq!(values.len(), SLOTS_PER_DAY, "a profile has one value per slot");
        Self { values }
    }

    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            values: vec![value; SLOTS_PER_DAY],
        }
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Value in effect at `minute_of_day` (0..1440).
    #[must_use]
    pub fn at_minute(&self, minute_of_day: u32) -> f64 {
        self.values[minute_of_day as usize / 5 % SLOTS_PER_DAY]
    }

    #[must_use]
    pub fn median(&self) -> f64 {
        descriptive::median(&self.values)
    }

    /// `exp(mean(ln v))`; undefined when any slot is not positive.
    #[must_use]
    pub fn geometric_mean(&self) -> f64 {
        descriptive::geometric_mean(&self.values)
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Converts every slot to mg/dL.
    #[must_use]
    pub fn to_mg_dl(&self, unit: GlucoseUnit) -> Self {
        Self {
            values: self.values.iter().map(|&v| unit.setting_to_mg_dl(v)).collect(),
        }
    }
}

/// The three profiles derived from a correction-range schedule
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRangeProfiles {
    pub lower: DenseProfile,
    pub upper: DenseProfile,
    pub midpoint: DenseProfile,
}

impl CorrectionRangeProfiles {
    #[must_use]
    pub fn new(lower: DenseProfile, upper: DenseProfile) -> Self {
        let midpoint = lower
            .values
            .iter()
            .zip(&upper.values)
            .map(|(&lo, &hi)| f64::midpoint(lo, hi))
            .collect();
        Self {
            lower,
            upper,
            midpoint: DenseProfile { values: midpoint },
        }
    }

    /// Width of the target range per slot.
    #[must_use]
    pub fn span(&self) -> DenseProfile {
        let values = self
            .lower
            .values
            .iter()
            .zip(&self.upper.values)
            .map(|(lo, hi)| hi - lo)
            .collect();
        DenseProfile { values }
    }

    /// Converts all three profiles to mg/dL.
    ///
    /// The midpoint is recomputed from the converted bounds.
    #[must_use]
    pub fn to_mg_dl(&self, unit: GlucoseUnit) -> Self {
        Self::new(self.lower.to_mg_dl(unit), self.upper.to_mg_dl(unit))
    }
}

/// Entry count and central tendency of an expanded schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSummary {
    pub entry_count: usize,
    pub median: f64,
    pub geometric_mean: f64,
}

impl ScheduleSummary {
    #[must_use]
    pub fn new(schedule: &Schedule, profile: &DenseProfile) -> Self {
        Self {
            entry_count: schedule.len(),
            median: profile.median(),
            geometric_mean: profile.geometric_mean(),
        }
    }
}
