//! Temperature alarm.
//!
//! Fires whenever the last few means are all above the threshold. There is
//! no latching or cool-down: every qualifying update fires again.
use log::warn;

use crate::Float;

/// Alarm engine.
#[derive(Debug, Clone)]
pub struct AlarmEngine {
    threshold: Float,
    window: usize,
    active: bool,
    raised: u64,
}

impl AlarmEngine {
    /// Create new alarm engine.
    #[must_use]
    pub fn new(threshold: Float, window: usize) -> Self {
        Self {
            threshold,
            window,
            active: false,
            raised: 0,
        }
    }

    /// Current threshold.
    #[must_use]
    pub fn threshold(&self) -> Float {
        self.threshold
    }

    /// Change the threshold.
    pub fn set_threshold(&mut self, threshold: Float) {
        self.threshold = threshold;
    }

    /// Did the last evaluation fire?
    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }

    /// Number of times the alarm has fired.
    #[must_use]
    pub fn raised(&self) -> u64 {
        self.raised
    }

    /// Evaluate the alarm after the mean series changed.
    ///
    /// Returns true if the alarm fires.
    pub fn evaluate(&mut self, mean: &[Float]) -> bool {
        self.active = self.window > 0
            && mean.len() >= self.window
            && mean[mean.len() - self.window..]
                .iter()
                .all(|&m| !m.is_nan() && m > self.threshold);
        if self.active {
            self.raised += 1;
            warn!(
                "ALARM: last {} means above {}: {:?}",
                self.window,
                self.threshold,
                &mean[mean.len() - self.window..]
            );
        }
        self.active
    }
}
