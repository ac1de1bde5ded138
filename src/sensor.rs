/*! Sensor packet assembly.

A sensor packet arrives as up to three frames: temperature (`01`),
humidity (`02`), and finalize (`03`). Only the finalize appends a sample.

The sample history is four parallel series (timestamp, temperature,
humidity, mean) that always have the same length. Placeholders keep them
aligned:

* `None` temperature/humidity: collection was paused.
* NaN temperature/humidity: the sensor reported an error.
* NaN mean: no mean available for that sample.
*/
use log::{debug, warn};
use serde::Serialize;

use crate::Float;

/// Temperature and humidity received since the last finalize.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingPacket {
    /// Last temperature.
    pub temperature: Option<Float>,
    /// Last humidity.
    pub humidity: Option<Float>,
}

/// One row of the sample history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSample {
    /// Seconds since collection was first started.
    pub timestamp: Float,
    /// Temperature, `None` if paused, NaN on sensor error.
    pub temperature: Option<Float>,
    /// Humidity, `None` if paused, NaN on sensor error.
    pub humidity: Option<Float>,
    /// Moving average, NaN if not available.
    pub mean: Float,
}

/// Sample history.
///
/// Grows without bound. At one packet per second that's tens of megabytes
/// per day, which is fine for a pass-length session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSeries {
    timestamps: Vec<Float>,
    temperature: Vec<Option<Float>>,
    humidity: Vec<Option<Float>>,
    mean: Vec<Float>,
}

impl SensorSeries {
    /// Create empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, with no mean yet.
    pub fn push(&mut self, timestamp: Float, temperature: Option<Float>, humidity: Option<Float>) {
        self.timestamps.push(timestamp);
        self.temperature.push(temperature);
        self.humidity.push(humidity);
        self.mean.push(Float::NAN);
    }

    /// Set the mean of the newest sample.
    pub fn set_last_mean(&mut self, mean: Float) {
        if let Some(m) = self.mean.last_mut() {
            *m = mean;
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True if there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp series.
    #[must_use]
    pub fn timestamps(&self) -> &[Float] {
        &self.timestamps
    }

    /// Temperature series.
    #[must_use]
    pub fn temperature(&self) -> &[Option<Float>] {
        &self.temperature
    }

    /// Humidity series.
    #[must_use]
    pub fn humidity(&self) -> &[Option<Float>] {
        &self.humidity
    }

    /// Mean series.
    #[must_use]
    pub fn mean(&self) -> &[Float] {
        &self.mean
    }

    /// Get one sample.
    #[must_use]
    pub fn get(&self, n: usize) -> Option<SensorSample> {
        Some(SensorSample {
            timestamp: *self.timestamps.get(n)?,
            temperature: *self.temperature.get(n)?,
            humidity: *self.humidity.get(n)?,
            mean: *self.mean.get(n)?,
        })
    }

    /// Get the newest sample.
    #[must_use]
    pub fn last(&self) -> Option<SensorSample> {
        self.get(self.len().checked_sub(1)?)
    }
}

/// Assembles sensor packets into the sample history.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    pending: PendingPacket,
    clear_on_finalize: bool,
}

impl Assembler {
    /// Create new assembler.
    ///
    /// With `clear_on_finalize` false, a packet missing its temperature or
    /// humidity reuses the value from the previous packet.
    #[must_use]
    pub fn new(clear_on_finalize: bool) -> Self {
        Self {
            pending: PendingPacket::default(),
            clear_on_finalize,
        }
    }

    /// Change the clear on finalize behaviour.
    pub fn set_clear_on_finalize(&mut self, clear: bool) {
        self.clear_on_finalize = clear;
    }

    /// Currently buffered values.
    #[must_use]
    pub fn pending(&self) -> PendingPacket {
        self.pending
    }

    /// Buffer a temperature.
    pub fn temperature(&mut self, v: Float) {
        self.pending.temperature = Some(v);
    }

    /// Buffer a humidity.
    pub fn humidity(&mut self, v: Float) {
        self.pending.humidity = Some(v);
    }

    /// Finalize the packet.
    ///
    /// Returns false, and touches nothing, if temperature or humidity is
    /// missing. While paused (`collecting` false) the sample is appended with
    /// null values, so time keeps advancing.
    pub fn finalize(&mut self, series: &mut SensorSeries, timestamp: Float, collecting: bool) -> bool {
        let (Some(t), Some(h)) = (self.pending.temperature, self.pending.humidity) else {
            warn!("Finalize without both temperature and humidity ({:?}), dropping", self.pending);
            return false;
        };
        if collecting {
            debug!("Sample at {timestamp:.1}s: T={t} H={h}");
            series.push(timestamp, Some(t), Some(h));
        } else {
            debug!("Sample at {timestamp:.1}s while paused");
            series.push(timestamp, None, None);
        }
        if self.clear_on_finalize {
            self.pending = PendingPacket::default();
        }
        true
    }

    /// Record a sensor error as a NaN sample.
    pub fn sensor_error(&mut self, series: &mut SensorSeries, timestamp: Float, code: i32) {
        warn!("Sensor error {code} at {timestamp:.1}s");
        series.push(timestamp, Some(Float::NAN), Some(Float::NAN));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_aligned(s: &SensorSeries) {
        assert_eq!(s.timestamps().len(), s.temperature().len());
        assert_eq!(s.timestamps().len(), s.humidity().len());
        assert_eq!(s.timestamps().len(), s.mean().len());
    }

    #[test]
    fn incomplete_dropped() {
        let mut s = SensorSeries::new();
        let mut a = Assembler::new(false);
        assert!(!a.finalize(&mut s, 1.0, true));
        a.temperature(20.0);
        assert!(!a.finalize(&mut s, 1.0, true));
        assert!(s.is_empty());
        assert_eq!(
            a.pending(),
            PendingPacket {
                temperature: Some(20.0),
                humidity: None
            }
        );
    }

    #[test]
    fn complete_packet() {
        let mut s = SensorSeries::new();
        let mut a = Assembler::new(false);
        a.temperature(25.5);
        a.humidity(60.0);
        assert!(a.finalize(&mut s, 2.0, true));
        let last = s.last().unwrap();
        assert_eq!(last.timestamp, 2.0);
        assert_eq!(last.temperature, Some(25.5));
        assert_eq!(last.humidity, Some(60.0));
        assert!(last.mean.is_nan());
        assert_aligned(&s);
    }

    #[test]
    fn stale_values_reused() {
        let mut s = SensorSeries::new();
        let mut a = Assembler::new(false);
        a.temperature(25.5);
        a.humidity(60.0);
        assert!(a.finalize(&mut s, 1.0, true));
        a.temperature(26.0);
        assert!(a.finalize(&mut s, 2.0, true));
        assert_eq!(s.humidity(), &[Some(60.0), Some(60.0)]);
        assert_eq!(s.temperature(), &[Some(25.5), Some(26.0)]);
    }

    #[test]
    fn clear_on_finalize() {
        let mut s = SensorSeries::new();
        let mut a = Assembler::new(true);
        a.temperature(25.5);
        a.humidity(60.0);
        assert!(a.finalize(&mut s, 1.0, true));
        a.temperature(26.0);
        assert!(!a.finalize(&mut s, 2.0, true));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn paused() {
        let mut s = SensorSeries::new();
        let mut a = Assembler::new(false);
        a.temperature(25.5);
        a.humidity(60.0);
        assert!(a.finalize(&mut s, 3.0, false));
        assert_eq!(s.timestamps(), &[3.0]);
        assert_eq!(s.temperature(), &[None::<Float>]);
        assert_eq!(s.humidity(), &[None::<Float>]);
        assert_aligned(&s);
    }

    #[test]
    fn errors_advance_time() {
        let mut s = SensorSeries::new();
        let mut a = Assembler::new(false);
        a.sensor_error(&mut s, 1.0, -1);
        a.sensor_error(&mut s, 2.0, -2);
        assert_eq!(s.timestamps(), &[1.0, 2.0]);
        assert!(s.temperature().iter().all(|t| t.unwrap().is_nan()));
        assert!(s.humidity().iter().all(|t| t.unwrap().is_nan()));
        assert_aligned(&s);
    }
}
