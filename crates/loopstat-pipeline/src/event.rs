//! Raw pump and CGM events
//!
//! A participant's event table is loaded once into [`RawEvent`]s and never
//! mutated afterwards; every stage filters or groups borrowed events.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The event streams the pipeline reconstructs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[display("basal")]
    Basal,
    #[display("bolus")]
    Bolus,
    #[display("carb")]
    Carb,
    #[display("cgm")]
    Cgm,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("unknown event type: {kind:?}")]
pub struct UnknownEventKindError {
    pub kind: String,
}

impl FromStr for EventKind {
    type Err = UnknownEventKindError;

    /// Parses both the export type names (`food`, `cbg`) and the stream names.
    ///
    /// ```
    /// # use loopstat_pipeline::event::EventKind;
    /// assert_eq!("cbg".parse::<EventKind>().unwrap(), EventKind::Cgm);
    /// assert_eq!("food".parse::<EventKind>().unwrap(), EventKind::Carb);
    /// assert!("wizard".parse::<EventKind>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basal" => Ok(Self::Basal),
            "bolus" => Ok(Self::Bolus),
            "food" | "carb" => Ok(Self::Carb),
            "cbg" | "cgm" => Ok(Self::Cgm),
            _ => Err(UnknownEventKindError { kind: s.to_owned() }),
        }
    }
}

/// Carbohydrate payload of a food entry
///
/// Exports encode net carbs under either of two field names; both are summed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbPayload {
    pub carbohydrates_net: Option<f64>,
    pub carbohydrate_net: Option<f64>,
    /// Absorption time the user entered with the carbs
    pub absorption_minutes: Option<f64>,
}

impl CarbPayload {
    /// Grams of carbohydrate across both payload fields, `None` if neither is set.
    #[must_use]
    pub fn grams(&self) -> Option<f64> {
        match (self.carbohydrates_net, self.carbohydrate_net) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        }
    }
}

/// One recorded action from the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    /// Basal rate (U/h), bolus amount (U) or raw CGM reading (mmol/L)
    pub value: Option<f64>,
    pub carbs: CarbPayload,
    /// Source upload, used only to break duplicate ties
    pub upload_id: String,
    pub timezone_offset_minutes: Option<i32>,
}

impl RawEvent {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind, value: Option<f64>, upload_id: &str) -> Self {
        Self {
            timestamp,
            kind,
            value,
            carbs: CarbPayload::default(),
            upload_id: upload_id.to_owned(),
            timezone_offset_minutes: None,
        }
    }
}

/// All events of one participant
#[derive(Debug, Clone, Default)]
pub struct ParticipantData {
    pub participant_id: String,
    pub events: Vec<RawEvent>,
}

impl ParticipantData {
    #[must_use]
    pub fn new(participant_id: impl Into<String>, events: Vec<RawEvent>) -> Self {
        Self {
            participant_id: participant_id.into(),
            events,
        }
    }

    /// The most frequent timezone offset recorded on the events.
    ///
    /// Ties go to the smallest offset.
    #[must_use]
    pub fn most_common_offset_minutes(&self) -> Option<i32> {
        let mut counts = BTreeMap::<i32, usize>::new();
        for offset in self.events.iter().filter_map(|e| e.timezone_offset_minutes) {
            *counts.entry(offset).or_default() += 1;
        }
        counts
            .into_iter()
            .rev()
            .max_by_key(|&(_, count)| count)
            .map(|(offset, _)| offset)
    }
}
