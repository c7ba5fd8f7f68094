use serde::{Deserialize, Serialize};

/// Loudness window mapped onto the 0-255 brightness scale.
///
/// `exponent` shapes the curve: values above 1.0 bias the output so that
/// only loud passages reach full brightness.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbfsRange {
    pub min: f64,
    pub max: f64,
    pub exponent: f64,
}

impl Default for DbfsRange {
    fn default() -> Self {
        Self {
            min: -27.0,
            max: 0.0,
            exponent: 2.0,
        }
    }
}

/// Maps a dBFS loudness value to a 0-255 brightness level.
///
/// Input is clamped to the range, normalized to `[0, 1]`, raised to the
/// range's exponent and scaled. Non-finite input is treated as silence.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn loudness_to_brightness(loudness: f64, range: &DbfsRange) -> u8 {
    let loudness = if loudness.is_nan() { range.min } else { loudness };
    let clamped = loudness.clamp(range.min, range.max);
    let normalized = (clamped - range.min) / (range.max - range.min);
    (normalized.powf(range.exponent) * 255.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_range_endpoints() {
        let range = DbfsRange::default();
        assert_eq!(loudness_to_brightness(-27.0, &range), 0);
        assert_eq!(loudness_to_brightness(0.0, &range), 255);
        // clamped below the window
        assert_eq!(loudness_to_brightness(-60.0, &range), 0);
        assert_eq!(loudness_to_brightness(6.0, &range), 255);
    }

    #[test]
    fn test_monotonic_within_range() {
        let range = DbfsRange::default();
        let mut previous = 0;
        let mut db = range.min;
        while db <= range.max {
            let brightness = loudness_to_brightness(db, &range);
            assert!(brightness >= previous, "not monotonic at {db} dBFS");
            previous = brightness;
            db += 0.25;
        }
    }

    #[test]
    fn test_exponent_bias() {
        let range = DbfsRange::default();
        // halfway through the window lands well below half brightness
        let halfway = loudness_to_brightness(-13.5, &range);
        assert!(halfway < 128, "halfway brightness {halfway}");
    }

    #[test]
    fn test_non_finite_input() {
        let range = DbfsRange::default();
        assert_eq!(loudness_to_brightness(f64::NAN, &range), 0);
        assert_eq!(loudness_to_brightness(f64::INFINITY, &range), 255);
        assert_eq!(loudness_to_brightness(f64::NEG_INFINITY, &range), 0);
    }
}
