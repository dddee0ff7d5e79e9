//! Insulin on board
//!
//! IOB at a tick is the superposition of every earlier delivery, each scaled
//! by a decay kernel: `iob[t] = Σ amount[t - i] * kernel[i]`. The kernel is
//! the per-tick insulin effect of one unit of insulin, normally produced by an
//! external metabolism model and loaded from a JSON array; a Loop-style
//! exponential curve is built in for when no model output is available.

use serde::{Deserialize, Serialize};

use crate::series::TICK_MINUTES;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum KernelError {
    #[display("decay kernel is empty")]
    Empty,
    #[display("decay kernel weight {index} is not finite")]
    NonFinite { index: usize },
}

/// Validated, non-empty sequence of finite per-tick effect weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct DecayKernel {
    weights: Vec<f64>,
}

impl TryFrom<Vec<f64>> for DecayKernel {
    type Error = KernelError;

    fn try_from(weights: Vec<f64>) -> Result<Self, Self::Error> {
        if weights.is_empty() {
            return Err(KernelError::Empty);
        }
        if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
            return Err(KernelError::NonFinite { index });
        }
        Ok(Self { weights })
    }
}

impl From<DecayKernel> for Vec<f64> {
    fn from(kernel: DecayKernel) -> Self {
        kernel.weights
    }
}

impl DecayKernel {
    pub fn new(weights: Vec<f64>) -> Result<Self, KernelError> {
        Self::try_from(weights)
    }

    /// Samples `model` every tick over its action duration.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn exponential(model: &ExponentialInsulinModel) -> Self {
        let weights = (0..)
            .map(|i| f64::from(i) * TICK_MINUTES as f64)
            .take_while(|&minutes| minutes < model.action_duration_minutes)
            .map(|minutes| model.remaining_fraction(minutes))
            .collect::<Vec<_>>();
        if weights.is_empty() {
            return Self { weights: vec![1.0] };
        }
        Self { weights }
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Always `false`; kept for API symmetry with [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl Default for DecayKernel {
    fn default() -> Self {
        Self::exponential(&ExponentialInsulinModel::default())
    }
}

/// Exponential insulin activity curve as used by Loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialInsulinModel {
    pub action_duration_minutes: f64,
    pub peak_activity_minutes: f64,
}

impl Default for ExponentialInsulinModel {
    /// Rapid-acting adult curve.
    fn default() -> Self {
        Self {
            action_duration_minutes: 360.0,
            peak_activity_minutes: 75.0,
        }
    }
}

impl ExponentialInsulinModel {
    /// Fraction of a dose still active `minutes` after delivery.
    ///
    /// ```
    /// # use loopstat_pipeline::iob::ExponentialInsulinModel;
    /// let model = ExponentialInsulinModel::default();
    /// assert_eq!(model.remaining_fraction(0.0), 1.0);
    /// assert_eq!(model.remaining_fraction(360.0), 0.0);
    /// assert!(model.remaining_fraction(75.0) > model.remaining_fraction(150.0));
    /// ```
    #[must_use]
    pub fn remaining_fraction(&self, minutes: f64) -> f64 {
        let td = self.action_duration_minutes;
        let tp = self.peak_activity_minutes;
        if minutes <= 0.0 {
            return 1.0;
        }
        if minutes >= td {
            return 0.0;
        }
        let tau = tp * (1.0 - tp / td) / (1.0 - 2.0 * tp / td);
        let a = 2.0 * tau / td;
        let s = 1.0 / (1.0 - a + (1.0 + a) * (-td / tau).exp());
        1.0 - s
            * (1.0 - a)
            * ((minutes.powi(2) / (tau * td * (1.0 - a)) - minutes / tau - 1.0) * (-minutes / tau).exp() + 1.0)
    }
}

/// Convolves per-tick insulin amounts with `kernel`.
///
/// Unset amounts count as no delivery. The result has the same length as
/// `amounts`; effects running past the end are dropped.
///
/// ```
/// # use loopstat_pipeline::iob::{DecayKernel, convolve};
/// let kernel = DecayKernel::new(vec![1.0, 0.5, 0.25]).unwrap();
/// let iob = convolve(&[Some(2.0), None, Some(1.0), None], &kernel);
/// assert_eq!(iob, vec![2.0, 1.0, 1.5, 0.5]);
/// ```
#[must_use]
pub fn convolve(amounts: &[Option<f64>], kernel: &DecayKernel) -> Vec<f64> {
    let mut buffer = vec![0.0; amounts.len() + kernel.len()];
    for (t, amount) in amounts.iter().enumerate() {
        let Some(amount) = *amount else {
            continue;
        };
        for (i, weight) in kernel.weights().iter().enumerate() {
            buffer[t + i] += amount * weight;
        }
    }
    buffer.truncate(amounts.len());
    buffer
}
