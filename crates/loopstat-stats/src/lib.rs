//! Numeric building blocks for the loopstat pipeline.
//!
//! This crate provides small, dependency-free tools that the time-series
//! pipeline composes into windowed glucose and insulin statistics:
//!
//! - **Descriptive statistics**: mean, median, standard deviation and the
//!   geometric mean/standard deviation over `f64` samples
//! - **Run-length encoding**: collapse a series into runs of equal values
//! - **Rolling windows**: backward-looking windowed aggregation with a
//!   minimum-coverage rule, and the shift that re-anchors a backward window
//!   onto the tick where the forward window begins
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`run_length`]: Run-length encoding of sequences
//! - [`rolling`]: Rolling window aggregation over series with missing values
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use loopstat_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! assert_eq!(stats.median, 3.0);
//! ```
//!
//! ## Finding runs
//!
//! ```
//! use loopstat_stats::run_length::run_lengths;
//!
//! let runs = run_lengths(&[false, true, true, true, false]);
//! assert_eq!(runs.len(), 3);
//! assert_eq!(runs[1].start, 1);
//! assert_eq!(runs[1].len, 3);
//! ```
//!
//! ## Forward-looking rolling mean
//!
//! ```
//! use loopstat_stats::{descriptive, rolling::RollingWindow};
//!
//! let values = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
//! let window = RollingWindow::new(2, 2);
//! let means = window.forward(&values, descriptive::mean);
//! assert_eq!(means, vec![Some(1.5), Some(2.5), Some(3.5), None]);
//! ```

pub mod descriptive;
pub mod rolling;
pub mod run_length;
