/*! Moving average of temperature.

The average is either computed here on the ground, from the received
temperatures, or taken verbatim from the satellite's finalize frame.
*/
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Float;

/// Who computes the moving average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Average the last N temperatures received.
    #[default]
    GroundComputed,
    /// Use the mean the satellite sends with every finalize.
    SatelliteComputed,
}

/// Mean of the last `window` entries of `series`.
///
/// Returns `None` if there are fewer than `window` entries, or if any of
/// them is null (collection was paused). A NaN entry (sensor error) is not
/// null, and makes the mean NaN.
#[must_use]
pub fn trailing_mean(series: &[Option<Float>], window: usize) -> Option<Float> {
    if window == 0 || series.len() < window {
        return None;
    }
    let sum = series[series.len() - window..]
        .iter()
        .copied()
        .fold_options(0.0, |acc, v| acc + v)?;
    Some(sum / window as Float)
}

/// Mean for the newest sample, given the mode.
#[must_use]
pub fn compute(
    mode: Mode,
    temperature: &[Option<Float>],
    window: usize,
    from_satellite: Option<Float>,
) -> Option<Float> {
    match mode {
        Mode::GroundComputed => trailing_mean(temperature, window),
        Mode::SatelliteComputed => from_satellite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short() {
        let s: Vec<_> = (0..9).map(|v| Some(v as Float)).collect();
        assert_eq!(trailing_mean(&s, 10), None);
        assert_eq!(trailing_mean(&[], 10), None);
        assert_eq!(trailing_mean(&s, 0), None);
    }

    #[test]
    fn full_window() {
        let s: Vec<_> = (20..30).map(|v| Some(v as Float)).collect();
        assert_eq!(trailing_mean(&s, 10), Some(24.5));
        let mut s = s;
        s.push(Some(40.0));
        // 21..=29 and 40.
        assert_eq!(trailing_mean(&s, 10), Some(26.5));
    }

    #[test]
    fn null_in_window() {
        let mut s: Vec<_> = (0..12).map(|v| Some(v as Float)).collect();
        s[5] = None;
        assert_eq!(trailing_mean(&s, 10), None);
        // Null falls out of the window.
        s.extend([Some(1.0); 4]);
        assert!(trailing_mean(&s, 10).is_some());
    }

    #[test]
    fn nan_in_window() {
        let mut s: Vec<_> = (0..10).map(|v| Some(v as Float)).collect();
        s[3] = Some(Float::NAN);
        assert!(trailing_mean(&s, 10).unwrap().is_nan());
    }

    #[test]
    fn modes() {
        let s: Vec<_> = (20..30).map(|v| Some(v as Float)).collect();
        assert_eq!(compute(Mode::GroundComputed, &s, 10, Some(1.0)), Some(24.5));
        assert_eq!(compute(Mode::SatelliteComputed, &s, 10, Some(1.0)), Some(1.0));
        assert_eq!(compute(Mode::SatelliteComputed, &s, 10, None), None);
    }
}
