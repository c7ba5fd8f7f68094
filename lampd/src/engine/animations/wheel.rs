use lamp_rgb::{hsv_to_rgb, rgb_to_hsv, Rgb};

use crate::engine::{AnimationState, LampFrame, LAMP_ENGINE_FPS};

/// Continuous hue rotation at fixed saturation and value, starting from the
/// hue of a base color. Runs indefinitely.
pub struct Wheel {
    h: f64,
    s: f64,
    v: f64,
    hue_step: f64,
}

impl Wheel {
    #[must_use]
    pub fn new(base: Rgb, duration_s: f64) -> Self {
        let (h, s, v) = rgb_to_hsv(base);
        let steps = (duration_s * LAMP_ENGINE_FPS as f64).max(1.0);
        Self {
            h,
            s,
            v,
            hue_step: 360.0 / steps,
        }
    }

    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        self.h += self.hue_step;
        if self.h > 360.0 {
            self.h = 0.0;
        }
        frame.fill(hsv_to_rgb(self.h, self.s, self.v));
        AnimationState::Running
    }
}
