//! Hardware abstraction for the LED outputs.

use crate::engine::LampFrame;
use lamp_rgb::Rgb;

/// Full PWM duty range of the LED driver.
pub const MAX_DUTY_CYCLE: u16 = 65535;

/// Sink for rendered LED colors.
///
/// Implementations own the register-level PWM driving; the engine only hands
/// them 8-bit channel values per LED.
pub trait LedSink: Send + 'static {
    fn set_channel_duty(&mut self, led_index: usize, color: Rgb);

    fn render(&mut self, frame: &LampFrame) {
        for (i, color) in frame.iter().enumerate() {
            self.set_channel_duty(i, *color);
        }
    }
}

/// Expands an 8-bit channel value to the full duty range.
///
/// We're driving PNP transistors, thus the duty cycle is inverted:
/// duty 0 is fully on.
pub fn channel_duty(value: u8) -> u16 {
    MAX_DUTY_CYCLE - u16::from(value) * 257
}

/// A sink that only logs the duty cycles, for running without LED hardware.
pub struct StubSink;

impl LedSink for StubSink {
    fn set_channel_duty(&mut self, led_index: usize, color: Rgb) {
        tracing::trace!(
            "led {led_index} duty ({}, {}, {})",
            channel_duty(color.0),
            channel_duty(color.1),
            channel_duty(color.2),
        );
    }
}

/// Records every write, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    pub writes: Vec<(usize, Rgb)>,
}

#[cfg(test)]
impl LedSink for RecordingSink {
    fn set_channel_duty(&mut self, led_index: usize, color: Rgb) {
        self.writes.push((led_index, color));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_duty_inverted() {
        assert_eq!(channel_duty(255), 0);
        assert_eq!(channel_duty(0), MAX_DUTY_CYCLE);
        assert!(channel_duty(1) > channel_duty(254));
    }
}
