use lamp_rgb::Rgb;

use crate::engine::{AnimationState, LampFrame, LAMP_ENGINE_FPS};

/// Blinks a color against black at a fixed toggle rate. Runs indefinitely.
pub struct Flash {
    color: Rgb,
    on: bool,
    ticks_per_toggle: u32,
    ticks: u32,
}

impl Flash {
    #[must_use]
    pub fn new(color: Rgb, rate_hz: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ticks_per_toggle = ((LAMP_ENGINE_FPS as f64 / rate_hz) as u32).max(1);
        Self {
            color,
            on: true,
            ticks_per_toggle,
            ticks: 0,
        }
    }

    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        frame.fill(if self.on { self.color } else { Rgb::OFF });
        self.ticks += 1;
        if self.ticks >= self.ticks_per_toggle {
            self.on = !self.on;
            self.ticks = 0;
        }
        AnimationState::Running
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::LAMP_LED_COUNT;

    #[test]
    fn test_toggles_at_rate() {
        // 2 Hz toggle rate: 30 ticks on, 30 ticks off
        let mut flash = Flash::new(Rgb::CYAN, 2.0);
        let mut frame = [Rgb::OFF; LAMP_LED_COUNT];

        for _ in 0..30 {
            flash.animate(&mut frame);
            assert_eq!(frame[0], Rgb::CYAN);
        }
        for _ in 0..30 {
            flash.animate(&mut frame);
            assert_eq!(frame[0], Rgb::OFF);
        }
        flash.animate(&mut frame);
        assert_eq!(frame[0], Rgb::CYAN);
    }
}
