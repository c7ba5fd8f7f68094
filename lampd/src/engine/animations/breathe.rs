use lamp_rgb::Rgb;

use crate::engine::{AnimationState, LampFrame, LAMP_ENGINE_FPS};

/// Brightness floor, so the lamp never goes fully dark mid-breath.
const MIN_BRIGHTNESS: f64 = 0.05;

/// Triangular-wave brightness sweep of a base color: dims to the floor,
/// brightens back to full, reverses at each extreme. Runs indefinitely.
pub struct Breathe {
    base: Rgb,
    steps: u32,
    step: u32,
    brightening: bool,
}

impl Breathe {
    #[must_use]
    pub fn new(base: Rgb, duration_s: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = ((duration_s * LAMP_ENGINE_FPS as f64) as u32).max(1);
        Self {
            base,
            steps,
            step: 1,
            brightening: false,
        }
    }

    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        if self.step > self.steps {
            self.step = 1;
            self.brightening = !self.brightening;
        }

        let progress = f64::from(self.step) / f64::from(self.steps);
        let dim_factor = if self.brightening {
            progress.max(MIN_BRIGHTNESS)
        } else {
            (1.0 - progress).max(MIN_BRIGHTNESS)
        };
        frame.fill(self.base * dim_factor);
        self.step += 1;

        AnimationState::Running
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::LAMP_LED_COUNT;

    #[test]
    fn test_never_darker_than_floor() {
        let mut breathe = Breathe::new(Rgb(200, 100, 40), 0.2);
        let mut frame = [Rgb::OFF; LAMP_LED_COUNT];
        for _ in 0..100 {
            assert!(breathe.animate(&mut frame).is_running());
            assert!(
                frame[0].0 >= (200.0 * MIN_BRIGHTNESS) as u8,
                "dipped below the brightness floor: {:?}",
                frame[0]
            );
        }
    }

    #[test]
    fn test_reverses_direction_at_extremes() {
        let duration_s = 0.1;
        let steps = (duration_s * LAMP_ENGINE_FPS as f64) as u32;
        let mut breathe = Breathe::new(Rgb::WHITE, duration_s);
        let mut frame = [Rgb::OFF; LAMP_LED_COUNT];

        // first sweep dims
        breathe.animate(&mut frame);
        let early = frame[0].0;
        for _ in 1..steps {
            breathe.animate(&mut frame);
        }
        let dimmed = frame[0].0;
        assert!(dimmed < early);

        // second sweep brightens again
        for _ in 0..steps {
            breathe.animate(&mut frame);
        }
        assert!(frame[0].0 > dimmed);
    }
}
