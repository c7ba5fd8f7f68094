//! RGB ↔ HSV conversion.
//!
//! Hue is in degrees `[0, 360)`, saturation and value are percentages
//! `[0, 100]`.

use crate::Rgb;

#[allow(clippy::float_cmp)]
pub fn rgb_to_hsv(color: Rgb) -> (f64, f64, f64) {
    let r = f64::from(color.0) / 255.0;
    let g = f64::from(color.1) / 255.0;
    let b = f64::from(color.2) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if max == min {
        0.0
    } else if max == r {
        (60.0 * ((g - b) / delta) + 360.0) % 360.0
    } else if max == g {
        (60.0 * ((b - r) / delta) + 120.0) % 360.0
    } else {
        (60.0 * ((r - g) / delta) + 240.0) % 360.0
    };
    let s = if max == 0.0 { 0.0 } else { (delta / max) * 100.0 };
    let v = max * 100.0;

    (h, s, v)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let s = s / 100.0;
    let v = v / 100.0;

    if s == 0.0 {
        // achromatic
        let level = (v * 255.0).round() as u8;
        return Rgb(level, level, level);
    }

    let h = (h % 360.0) / 60.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match i as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgb(
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_primary_round_trips() {
        for color in [
            Rgb::RED,
            Rgb::GREEN,
            Rgb::BLUE,
            Rgb::YELLOW,
            Rgb::CYAN,
            Rgb::MAGENTA,
            Rgb::WHITE,
            Rgb::OFF,
        ] {
            let (h, s, v) = rgb_to_hsv(color);
            assert_eq!(hsv_to_rgb(h, s, v), color);
        }
    }

    #[test]
    fn test_hue_degrees() {
        assert_eq!(rgb_to_hsv(Rgb::RED).0, 0.0);
        assert_eq!(rgb_to_hsv(Rgb::GREEN).0, 120.0);
        assert_eq!(rgb_to_hsv(Rgb::BLUE).0, 240.0);
    }

    #[test]
    fn test_hue_wraps() {
        assert_eq!(hsv_to_rgb(360.0, 100.0, 100.0), Rgb::RED);
        assert_eq!(hsv_to_rgb(480.0, 100.0, 100.0), Rgb::GREEN);
    }
}
