/*! Decoder state.

[`Telemetry`] owns everything the decoder knows: sample history, radar
points and scale, text messages, servo angle, and the alarm. It's fed one
[`Message`] at a time, and is read by copying out a [`Snapshot`].

Nothing in here does I/O or locking. Time is passed in, so the state can be
driven deterministically.
*/
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::aggregate::{self, Mode};
use crate::alarm::AlarmEngine;
use crate::command::Command;
use crate::config::Config;
use crate::message::{Message, RadarFault};
use crate::radar::{RadarBuffer, RadarPoint, ScaleController};
use crate::sensor::{Assembler, SensorSeries};
use crate::textlog::TextLog;
use crate::Float;

/// Frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Frames classified.
    pub frames: u64,
    /// Frames not understood.
    pub unrecognized: u64,
    /// Frames understood, but dropped due to a bad field.
    pub dropped: u64,
    /// Finalize frames dropped because the packet was incomplete.
    pub incomplete: u64,
    /// Radar errors, hardware or corrupt.
    pub radar_errors: u64,
}

/// One text message, as shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    /// Message text.
    pub body: String,
    /// Seconds since it was received.
    pub age: Float,
}

/// Read only copy of the decoder state.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Seconds since collection was first started.
    pub timestamps: Vec<Float>,
    /// Temperature series.
    pub temperature: Vec<Option<Float>>,
    /// Humidity series.
    pub humidity: Vec<Option<Float>>,
    /// Moving average series.
    pub mean: Vec<Float>,
    /// Radar points, oldest first.
    pub radar: Vec<RadarPoint>,
    /// Radar display scale, in cm.
    pub scale: Float,
    /// Last reported servo angle, `None` if invalid or never reported.
    pub servo_degrees: Option<Float>,
    /// Did the last mean update trip the alarm?
    pub alarm: bool,
    /// Times the alarm has tripped.
    pub alarms_raised: u64,
    /// Newest text messages, oldest first.
    pub messages: Vec<TextMessage>,
    /// Averaging mode.
    pub mode: Mode,
    /// Alarm threshold.
    pub threshold: Float,
    /// Is data being collected, or paused?
    pub collecting: bool,
    /// Frame counters.
    pub counters: Counters,
}

/// Decoder state.
#[derive(Debug, Clone)]
pub struct Telemetry {
    mode: Mode,
    mean_window: usize,
    started: Option<Instant>,
    collecting: bool,
    assembler: Assembler,
    series: SensorSeries,
    alarm: AlarmEngine,
    radar: RadarBuffer,
    scale: ScaleController,
    text: TextLog,
    servo_degrees: Option<Float>,
    counters: Counters,
}

impl Telemetry {
    /// Create new state from config.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            mode: config.mode,
            mean_window: config.mean_window,
            started: None,
            collecting: false,
            assembler: Assembler::new(config.clear_on_finalize),
            series: SensorSeries::new(),
            alarm: AlarmEngine::new(config.alarm_threshold, config.alarm_window),
            radar: RadarBuffer::new(config.radar_window),
            scale: ScaleController::new(
                config.initial_scale,
                config.scale_history,
                config.shrink_margin,
                config.shrink_cooldown,
            ),
            text: TextLog::new(config.text_ttl, config.text_display),
            servo_degrees: None,
            counters: Counters::default(),
        }
    }

    /// Start (or restart) collecting.
    ///
    /// The first start sets the reference time for sample timestamps. It's
    /// never reset.
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            info!("Collection started");
            self.started = Some(now);
        }
        self.collecting = true;
    }

    /// Pause collecting. Samples keep arriving, but are recorded as null.
    pub fn pause(&mut self) {
        self.collecting = false;
    }

    /// Resume collecting after a pause. Unlike `start()`, this doesn't set
    /// the reference time.
    pub fn resume(&mut self) {
        self.collecting = true;
    }

    /// Is data being collected?
    #[must_use]
    pub fn collecting(&self) -> bool {
        self.collecting
    }

    /// Averaging mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Set averaging mode. Applies to samples from now on.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Set the alarm threshold.
    pub fn set_threshold(&mut self, t: Float) {
        self.alarm.set_threshold(t);
    }

    /// Set the number of radar points kept.
    pub fn set_radar_window(&mut self, n: usize) {
        self.radar.set_window(n);
    }

    /// Set the radar scale shrink margin.
    pub fn set_shrink_margin(&mut self, m: Float) {
        self.scale.set_shrink_margin(m);
    }

    /// Set the radar scale shrink cooldown.
    pub fn set_shrink_cooldown(&mut self, d: Duration) {
        self.scale.set_shrink_cooldown(d);
    }

    /// Set whether pending sensor values are forgotten after a finalize.
    pub fn set_clear_on_finalize(&mut self, clear: bool) {
        self.assembler.set_clear_on_finalize(clear);
    }

    /// Sample history.
    #[must_use]
    pub fn series(&self) -> &SensorSeries {
        &self.series
    }

    /// Radar points.
    #[must_use]
    pub fn radar(&self) -> &RadarBuffer {
        &self.radar
    }

    /// Frame counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.counters
    }

    fn timestamp(&self, now: Instant) -> Float {
        self.started
            .map(|t| now.saturating_duration_since(t).as_secs_f32())
            .unwrap_or(0.0)
    }

    /// Count a frame that didn't yield a message.
    pub fn dropped(&mut self) {
        self.counters.frames += 1;
        self.counters.dropped += 1;
    }

    /// Apply one message.
    ///
    /// Returns commands to send to the satellite in response.
    pub fn apply(&mut self, msg: Message, now: Instant) -> Vec<Command> {
        self.counters.frames += 1;
        trace!("Applying {msg:?}");
        match msg {
            Message::Text { body } => self.text.push(body, now),
            Message::SensorError { code } => {
                let ts = self.timestamp(now);
                self.assembler.sensor_error(&mut self.series, ts, code);
                return self.update_mean(None);
            }
            Message::Temperature { value } => self.assembler.temperature(value),
            Message::Humidity { value } => self.assembler.humidity(value),
            Message::MeanFinalize { value } => return self.finalize(value, now),
            Message::ServoInvalid => {
                warn!("Servo reports invalid position");
                self.servo_degrees = None;
            }
            Message::ServoAngle { degrees } => {
                debug!("Servo at {degrees}°");
                self.servo_degrees = Some(degrees);
            }
            Message::RadarError { fault } => {
                match fault {
                    RadarFault::Hardware(code) => warn!("Radar error {code}"),
                    RadarFault::CorruptData => warn!("Radar sample corrupt"),
                }
                self.counters.radar_errors += 1;
                self.radar.push_error();
            }
            Message::RadarSample {
                servo_degrees,
                distance_cm,
            } => {
                self.radar.push_sample(servo_degrees, distance_cm);
                self.scale.update(now, distance_cm);
            }
            Message::Unrecognized { .. } => self.counters.unrecognized += 1,
        }
        Vec::new()
    }

    fn finalize(&mut self, from_satellite: Option<Float>, now: Instant) -> Vec<Command> {
        let ts = self.timestamp(now);
        if !self
            .assembler
            .finalize(&mut self.series, ts, self.collecting)
        {
            self.counters.incomplete += 1;
            return Vec::new();
        }
        self.update_mean(from_satellite)
    }

    /// Recompute the newest mean, and re-evaluate the alarm on it.
    fn update_mean(&mut self, from_satellite: Option<Float>) -> Vec<Command> {
        if let Some(m) = aggregate::compute(
            self.mode,
            self.series.temperature(),
            self.mean_window,
            from_satellite,
        ) {
            self.series.set_last_mean(m);
        }
        if self.alarm.evaluate(self.series.mean()) {
            vec![Command::Alarm]
        } else {
            Vec::new()
        }
    }

    /// Copy out the current state.
    ///
    /// Takes `&mut self` because expired text messages are pruned.
    pub fn snapshot(&mut self, now: Instant) -> Snapshot {
        Snapshot {
            timestamps: self.series.timestamps().to_vec(),
            temperature: self.series.temperature().to_vec(),
            humidity: self.series.humidity().to_vec(),
            mean: self.series.mean().to_vec(),
            radar: self.radar.points(),
            scale: self.scale.current(),
            servo_degrees: self.servo_degrees,
            alarm: self.alarm.active(),
            alarms_raised: self.alarm.raised(),
            messages: self
                .text
                .tail(now)
                .into_iter()
                .map(|e| TextMessage {
                    age: now.saturating_duration_since(e.received_at).as_secs_f32(),
                    body: e.body,
                })
                .collect(),
            mode: self.mode,
            threshold: self.alarm.threshold(),
            collecting: self.collecting,
            counters: self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::classify;

    fn feed(t: &mut Telemetry, frames: &[&str], now: Instant) -> Vec<Command> {
        let mut out = Vec::new();
        for f in frames {
            match classify(f) {
                Some(m) => out.extend(t.apply(m, now)),
                None => t.dropped(),
            }
        }
        out
    }

    fn packet(temp: Float) -> [String; 3] {
        [
            format!("16:1:01:{temp}"),
            "16:1:02:50.0".to_string(),
            format!("16:1:03:{temp}"),
        ]
    }

    fn feed_packets(t: &mut Telemetry, temps: &[Float], now: Instant) -> Vec<Command> {
        let mut out = Vec::new();
        for &temp in temps {
            let p = packet(temp);
            let frames: Vec<&str> = p.iter().map(String::as_str).collect();
            out.extend(feed(t, &frames, now));
        }
        out
    }

    fn assert_aligned(t: &Telemetry) {
        let s = t.series();
        assert_eq!(s.timestamps().len(), s.temperature().len());
        assert_eq!(s.timestamps().len(), s.humidity().len());
        assert_eq!(s.timestamps().len(), s.mean().len());
    }

    #[test]
    fn timestamps_from_first_start() {
        let mut t = Telemetry::new(&Config::default());
        let t0 = Instant::now();
        feed_packets(&mut t, &[20.0], t0);
        t.start(t0 + Duration::from_secs(1));
        feed_packets(&mut t, &[20.0], t0 + Duration::from_secs(3));
        // Restart doesn't reset the reference.
        t.start(t0 + Duration::from_secs(10));
        feed_packets(&mut t, &[20.0], t0 + Duration::from_secs(11));
        assert_eq!(t.series().timestamps(), &[0.0, 2.0, 10.0]);
    }

    #[test]
    fn ground_mean_after_ten() {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        t.start(now);
        let temps: Vec<Float> = (20..30).map(|v| v as Float).collect();
        feed_packets(&mut t, &temps[..9], now);
        assert!(t.series().mean().iter().all(|m| m.is_nan()));
        feed_packets(&mut t, &temps[9..], now);
        assert_eq!(t.series().mean()[9], 24.5);
        assert_aligned(&t);
    }

    #[test]
    fn satellite_mean() {
        let mut t = Telemetry::new(&Config::default());
        t.set_mode(Mode::SatelliteComputed);
        let now = Instant::now();
        t.start(now);
        feed(
            &mut t,
            &["16:1:01:20", "16:1:02:50", "16:1:03:19.5", "16:1:03:bad"],
            now,
        );
        let mean = t.series().mean();
        assert_eq!(mean[0], 19.5);
        assert!(mean[1].is_nan());
    }

    #[test]
    fn paused_packets_break_ground_mean() {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        t.start(now);
        feed_packets(&mut t, &[20.0; 9], now);
        t.pause();
        feed_packets(&mut t, &[20.0], now);
        t.start(now);
        feed_packets(&mut t, &[20.0; 5], now);
        // Every window of 10 so far contains the paused sample.
        assert!(t.series().mean().iter().all(|m| m.is_nan()));
        assert_eq!(t.series().temperature()[9], None);
        assert_aligned(&t);
    }

    #[test]
    fn sensor_error_advances_series() {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        t.start(now);
        feed(&mut t, &["16:1:-1", "16:1:-2"], now);
        assert_eq!(t.series().len(), 2);
        assert_aligned(&t);
    }

    #[test]
    fn alarm_repeats() {
        let mut t = Telemetry::new(&Config::default());
        t.set_mode(Mode::SatelliteComputed);
        let now = Instant::now();
        t.start(now);
        let cmds = feed_packets(&mut t, &[31.0, 32.0], now);
        assert!(cmds.is_empty());
        let cmds = feed_packets(&mut t, &[33.0], now);
        assert_eq!(cmds, vec![Command::Alarm]);
        let cmds = feed_packets(&mut t, &[34.0], now);
        assert_eq!(cmds, vec![Command::Alarm]);
        let snap = t.snapshot(now);
        assert!(snap.alarm);
        assert_eq!(snap.alarms_raised, 2);
    }

    #[test]
    fn sensor_error_clears_alarm() {
        let mut t = Telemetry::new(&Config::default());
        t.set_mode(Mode::SatelliteComputed);
        let now = Instant::now();
        t.start(now);
        let cmds = feed_packets(&mut t, &[31.0, 32.0, 33.0], now);
        assert_eq!(cmds, vec![Command::Alarm]);
        assert!(t.snapshot(now).alarm);
        assert!(feed(&mut t, &["16:1:-1"], now).is_empty());
        let snap = t.snapshot(now);
        assert!(!snap.alarm);
        assert!(snap.mean[3].is_nan());
        assert_eq!(snap.alarms_raised, 1);
    }

    #[test]
    fn unrecognized_changes_nothing_but_counters() {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        t.start(now);
        feed_packets(&mut t, &[20.0], now);
        let before = t.snapshot(now);
        feed(&mut t, &["garbage", "16:9:1:2", "16:2:7", "15:1:01:3"], now);
        let after = t.snapshot(now);
        assert_eq!(after.counters.unrecognized, 4);
        assert_eq!(after.timestamps, before.timestamps);
        assert_eq!(after.temperature, before.temperature);
        assert_eq!(after.radar, before.radar);
        assert_eq!(after.scale, before.scale);
        assert_eq!(after.servo_degrees, before.servo_degrees);
        assert_eq!(after.messages, before.messages);
    }

    #[test]
    fn bad_fields_dropped() {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        t.start(now);
        feed(&mut t, &["16:1:01:x", "16:1:02:50", "16:1:03:1", "16:2:0:y"], now);
        assert!(t.series().is_empty());
        let c = t.counters();
        assert_eq!(c.dropped, 2);
        assert_eq!(c.incomplete, 1);
        assert_eq!(c.frames, 4);
    }

    #[test]
    fn servo() {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        feed(&mut t, &["16:2:0:120"], now);
        assert_eq!(t.snapshot(now).servo_degrees, Some(120.0));
        feed(&mut t, &["16:2:-1"], now);
        assert_eq!(t.snapshot(now).servo_degrees, None);
    }

    #[test]
    fn snapshot_is_json() -> anyhow::Result<()> {
        let mut t = Telemetry::new(&Config::default());
        let now = Instant::now();
        t.start(now);
        feed(&mut t, &["16:1:-1", "16:3:0:90:15", "16:0:hi"], now);
        let j = serde_json::to_value(t.snapshot(now))?;
        // NaN isn't representable in JSON.
        assert_eq!(j["temperature"][0], serde_json::Value::Null);
        assert_eq!(j["radar"][0]["distance_cm"], 15.0);
        assert_eq!(j["messages"][0]["body"], "hi");
        assert_eq!(j["mode"], "GroundComputed");
        Ok(())
    }
}
