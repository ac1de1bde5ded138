//! Runtime configuration of the decoder.
//!
//! Every value here can also be changed while running, through the setters
//! on [`Station`][crate::station::Station].
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Float;
use crate::aggregate::Mode;

/// Decoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alarm when the last `alarm_window` means are all above this.
    pub alarm_threshold: Float,

    /// Who computes the moving average.
    pub mode: Mode,

    /// Number of temperatures averaged in ground computed mode.
    pub mean_window: usize,

    /// Number of trailing means that must exceed the threshold.
    pub alarm_window: usize,

    /// Max number of radar points kept.
    pub radar_window: usize,

    /// Radar scale before any sample arrives, in cm.
    pub initial_scale: Float,

    /// How far above the recent max distance the scale must be before it
    /// shrinks, in cm.
    pub shrink_margin: Float,

    /// Minimum time between a scale change and a shrink.
    #[serde(with = "millis")]
    pub shrink_cooldown: Duration,

    /// How far back radar distances count towards the scale.
    #[serde(with = "millis")]
    pub scale_history: Duration,

    /// Text messages older than this are dropped.
    #[serde(with = "millis")]
    pub text_ttl: Duration,

    /// Max number of text messages shown.
    pub text_display: usize,

    /// Forget temperature and humidity after a packet is finalized, instead
    /// of reusing them if the next packet is missing one.
    pub clear_on_finalize: bool,

    /// Reader backoff when there is no data.
    #[serde(with = "millis")]
    pub idle_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alarm_threshold: 30.0,
            mode: Mode::GroundComputed,
            mean_window: 10,
            alarm_window: 3,
            radar_window: 7,
            initial_scale: 30.0,
            shrink_margin: 50.0,
            shrink_cooldown: Duration::from_secs(5),
            scale_history: Duration::from_secs(5),
            text_ttl: Duration::from_secs(4),
            text_display: 5,
            clear_on_finalize: false,
            idle_backoff: crate::graph::DEFAULT_IDLE_SLEEP,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_partial() -> anyhow::Result<()> {
        let c: Config =
            serde_json::from_str(r#"{"alarm_threshold": 25.5, "mode": "SatelliteComputed", "text_ttl": 1500}"#)?;
        assert_eq!(c.alarm_threshold, 25.5);
        assert_eq!(c.mode, Mode::SatelliteComputed);
        assert_eq!(c.text_ttl, Duration::from_millis(1500));
        assert_eq!(c.radar_window, 7);
        let s = serde_json::to_string(&c)?;
        assert!(s.contains(r#""shrink_cooldown":5000"#), "{s}");
        Ok(())
    }
}
