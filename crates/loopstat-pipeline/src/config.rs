//! Pipeline configuration
//!
//! Every stage receives its thresholds through [`PipelineConfig`]; nothing
//! is read from process-wide state. The CLI loads it from JSON, where any
//! omitted field takes its default.
//!
//! ```json
//! {
//!   "analysis_window_days": 7,
//!   "rolling_hours": [1, 2, 4, 8],
//!   "fallback_utc_offset_minutes": -360
//! }
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Days on each side of the report day included in the analysis window
    pub analysis_window_days: i64,
    /// Days of extra data before the window used only for IOB run-in
    pub lookback_days: i64,
    /// Rolling statistics window sizes, in hours
    pub rolling_hours: Vec<u32>,
    /// Fraction of a rolling window that must hold data for a defined value
    pub min_coverage: f64,
    /// Minimum consecutive in-range ticks for a glycemic event
    pub event_min_ticks: usize,
    /// Maximum ticks a basal rate is carried forward past its last event
    pub basal_fill_limit: usize,
    /// UTC offset used when neither the report nor the data carries one
    pub fallback_utc_offset_minutes: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_window_days: 7,
            lookback_days: 1,
            rolling_hours: (1..=8).collect(),
            min_coverage: 0.7,
            event_min_ticks: 3,
            basal_fill_limit: 288,
            fallback_utc_offset_minutes: -360,
        }
    }
}
