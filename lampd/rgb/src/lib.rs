use serde::{Deserialize, Serialize};
use std::ops;
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

mod hsv;
mod loudness;

pub use hsv::{hsv_to_rgb, rgb_to_hsv};
pub use loudness::{loudness_to_brightness, DbfsRange};

/// The red channel tops out below full scale on this hardware, and green/blue
/// overpower red when mixed, so mixed colors are rebalanced before driving
/// the LEDs.
const RED_MAX: u8 = 240;
const RED_GREEN_SCALING_FACTOR: f64 = 1.7;
const RED_BLUE_SCALING_FACTOR: f64 = 2.0;

/// RGB LED color.
#[derive(Eq, PartialEq, Copy, Clone, Default, Debug, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ParseColorError {
    #[error("color {0:?} is not `#rrggbb` or a known color name")]
    Invalid(String),
}

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const CYAN: Rgb = Rgb(0, 255, 255);
    pub const MAGENTA: Rgb = Rgb(255, 0, 255);

    /// Named colors accepted in feature values and offered by the menu.
    pub const NAMED: [(&'static str, Rgb); 8] = [
        ("black", Rgb::OFF),
        ("white", Rgb::WHITE),
        ("red", Rgb::RED),
        ("green", Rgb::GREEN),
        ("blue", Rgb::BLUE),
        ("yellow", Rgb::YELLOW),
        ("cyan", Rgb::CYAN),
        ("magenta", Rgb::MAGENTA),
    ];

    /// Linear per-channel interpolation between `self` and `other`.
    /// `t == 0.0` yields `self` and `t == 1.0` yields exactly `other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| {
            ((1.0 - t) * f64::from(a) + t * f64::from(b)).round() as u8
        };
        Rgb(
            channel(self.0, other.0),
            channel(self.1, other.1),
            channel(self.2, other.2),
        )
    }

    /// Rebalances a color to the hardware gamut: red is capped, and green
    /// and blue are scaled down whenever red is present in the mix.
    pub fn balanced(self) -> Self {
        if self.0 == 0 {
            return self;
        }
        Rgb(
            self.0.min(RED_MAX),
            (f64::from(self.1) / RED_GREEN_SCALING_FACTOR) as u8,
            (f64::from(self.2) / RED_BLUE_SCALING_FACTOR) as u8,
        )
    }

    /// Keeps hue and saturation, sets the HSV value channel from a 0-255
    /// brightness level.
    pub fn with_brightness(self, brightness: u8) -> Self {
        let (h, s, _) = rgb_to_hsv(self);
        hsv_to_rgb(h, s, f64::from(brightness) / 255.0 * 100.0)
    }

    /// Scales all channels so the largest one reaches full scale. Black has
    /// no hue to maximize and is returned unchanged.
    pub fn maximize_brightness(self) -> Self {
        let (h, s, v) = rgb_to_hsv(self);
        if v == 0.0 {
            return self;
        }
        hsv_to_rgb(h, s, 100.0)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    pub fn is_off(&self) -> bool {
        self.0 == 0 && self.1 == 0 && self.2 == 0
    }
}

impl FromStr for Rgb {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 6 {
                if let (Ok(r), Ok(g), Ok(b)) = (
                    u8::from_str_radix(&hex[0..2], 16),
                    u8::from_str_radix(&hex[2..4], 16),
                    u8::from_str_radix(&hex[4..6], 16),
                ) {
                    return Ok(Rgb(r, g, b));
                }
            }
            return Err(ParseColorError::Invalid(s.to_owned()));
        }
        Rgb::NAMED
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, color)| color)
            .ok_or_else(|| ParseColorError::Invalid(s.to_owned()))
    }
}

impl ops::Mul<f64> for Rgb {
    type Output = Self;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn mul(self, rhs: f64) -> Self::Output {
        let rhs = rhs.clamp(0.0, 1.0);
        Rgb(
            (f64::from(self.0) * rhs).round() as u8,
            (f64::from(self.1) * rhs).round() as u8,
            (f64::from(self.2) * rhs).round() as u8,
        )
    }
}

impl ops::MulAssign<f64> for Rgb {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

impl Add for Rgb {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Rgb(
            self.0.saturating_add(rhs.0),
            self.1.saturating_add(rhs.1),
            self.2.saturating_add(rhs.2),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lerp_endpoints() {
        let from = Rgb(10, 200, 45);
        let to = Rgb(255, 0, 128);
        assert_eq!(from.lerp(to, 0.0), from);
        assert_eq!(from.lerp(to, 1.0), to);
        // out-of-range factors are clamped, not extrapolated
        assert_eq!(from.lerp(to, 1.5), to);
    }

    #[test]
    fn test_hex_round_trip() {
        let color = Rgb(0xff, 0x00, 0x7f);
        assert_eq!(color.to_hex(), "#ff007f");
        assert_eq!("#ff007f".parse::<Rgb>().unwrap(), color);
        assert_eq!("magenta".parse::<Rgb>().unwrap(), Rgb::MAGENTA);
        assert!("#ff007".parse::<Rgb>().is_err());
        assert!("fuchsia".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_balanced_caps_red_and_scales_mix() {
        assert_eq!(Rgb(255, 255, 255).balanced(), Rgb(240, 150, 127));
        // no red in the mix, nothing to rebalance
        assert_eq!(Rgb(0, 200, 100).balanced(), Rgb(0, 200, 100));
    }

    #[test]
    fn test_brightness_scaling() {
        assert_eq!(Rgb(100, 100, 100) * 0.0, Rgb::OFF);
        assert_eq!(Rgb(100, 100, 100) * 2.0, Rgb(100, 100, 100));
        assert_eq!(Rgb::RED.with_brightness(0), Rgb::OFF);
        assert_eq!(Rgb(100, 0, 0).maximize_brightness(), Rgb::RED);
        assert_eq!(Rgb::OFF.maximize_brightness(), Rgb::OFF);
    }
}
