/*! Radar point buffer and display scale.

The radar is an ultrasonic range finder on a servo. Each sample is a servo
angle and a distance. The last few samples are kept for a sweep display,
and the display scale follows the recent maximum distance.

The scale grows as soon as a sample doesn't fit, but only shrinks when the
recent maximum has been well below it for a while:

```text
scale
  ^     grow immediately
  |       +------------+
  |       |            |  shrink: margin exceeded
  |  -----+            |          and cooldown passed
  |                    +--------
  +---------------------------------> time
```
*/
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::Float;

/// Convert servo degrees (0 to 180, 90 straight ahead) to radians centered
/// on straight ahead.
#[must_use]
pub fn servo_to_radians(degrees: Float) -> Float {
    (degrees - 90.0).to_radians()
}

/// One point on the radar display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadarPoint {
    /// Angle, 0 is straight ahead.
    pub angle_radians: Float,
    /// Distance, NaN if the sample was an error.
    pub distance_cm: Float,
}

/// Fixed capacity FIFO of radar points.
#[derive(Debug, Clone)]
pub struct RadarBuffer {
    points: VecDeque<RadarPoint>,
    window: usize,
    last_angle: Float,
}

impl RadarBuffer {
    /// Create a new buffer holding at most `window` points.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            points: VecDeque::new(),
            window,
            last_angle: 0.0,
        }
    }

    /// Max number of points.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Change the max number of points, evicting the oldest if needed.
    pub fn set_window(&mut self, window: usize) {
        self.window = window;
        self.evict();
    }

    /// Angle of the last valid sample, in radians.
    #[must_use]
    pub fn last_angle(&self) -> Float {
        self.last_angle
    }

    fn evict(&mut self) {
        while self.points.len() > self.window {
            self.points.pop_front();
        }
    }

    /// Add a valid sample.
    pub fn push_sample(&mut self, servo_degrees: Float, distance_cm: Float) {
        self.last_angle = servo_to_radians(servo_degrees);
        self.points.push_back(RadarPoint {
            angle_radians: self.last_angle,
            distance_cm,
        });
        self.evict();
    }

    /// Add an error, as a NaN distance at the last known angle.
    pub fn push_error(&mut self) {
        self.points.push_back(RadarPoint {
            angle_radians: self.last_angle,
            distance_cm: Float::NAN,
        });
        self.evict();
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Copy out the points, oldest first.
    #[must_use]
    pub fn points(&self) -> Vec<RadarPoint> {
        self.points.iter().copied().collect()
    }
}

/// Radar display scale, with hysteresis.
#[derive(Debug, Clone)]
pub struct ScaleController {
    current: Float,
    last_change: Option<Instant>,
    history: VecDeque<(Instant, Float)>,
    history_window: Duration,
    shrink_margin: Float,
    shrink_cooldown: Duration,
}

impl ScaleController {
    /// Create new scale controller.
    #[must_use]
    pub fn new(
        initial: Float,
        history_window: Duration,
        shrink_margin: Float,
        shrink_cooldown: Duration,
    ) -> Self {
        Self {
            current: initial,
            last_change: None,
            history: VecDeque::new(),
            history_window,
            shrink_margin,
            shrink_cooldown,
        }
    }

    /// Current scale, in cm.
    #[must_use]
    pub fn current(&self) -> Float {
        self.current
    }

    /// Change the shrink margin.
    pub fn set_shrink_margin(&mut self, margin: Float) {
        self.shrink_margin = margin;
    }

    /// Change the shrink cooldown.
    pub fn set_shrink_cooldown(&mut self, cooldown: Duration) {
        self.shrink_cooldown = cooldown;
    }

    fn expired(&self, now: Instant, t: Instant) -> bool {
        now.saturating_duration_since(t) > self.history_window
    }

    /// Max distance seen within the history window ending at `now`.
    #[must_use]
    pub fn recent_max(&self, now: Instant) -> Option<Float> {
        self.history
            .iter()
            .filter(|&&(t, _)| !self.expired(now, t))
            .map(|&(_, d)| d)
            .reduce(Float::max)
    }

    /// Feed a new distance. Returns true if the scale changed.
    pub fn update(&mut self, now: Instant, distance: Float) -> bool {
        self.history.push_back((now, distance));
        while let Some(&(t, _)) = self.history.front() {
            if self.expired(now, t) {
                self.history.pop_front();
            } else {
                break;
            }
        }
        let Some(max) = self.recent_max(now) else {
            return false;
        };
        let new = max.floor() + 1.0;
        if max > self.current {
            debug!("Radar scale growing {} -> {new}", self.current);
        } else if self.current - max >= self.shrink_margin && self.cooled_down(now) {
            info!("Radar scale shrinking {} -> {new}", self.current);
        } else {
            return false;
        }
        self.current = new;
        self.last_change = Some(now);
        true
    }

    fn cooled_down(&self, now: Instant) -> bool {
        match self.last_change {
            None => true,
            Some(t) => now.saturating_duration_since(t) >= self.shrink_cooldown,
        }
    }
}
