use lamp_rgb::Rgb;

use crate::engine::{AnimationState, LampFrame, LAMP_ENGINE_FPS};

/// Linear fade from one color to another over a fixed number of steps.
/// The final step emits the target color exactly, then the animation stops
/// itself.
pub struct Transition {
    from: Rgb,
    to: Rgb,
    steps: u32,
    step: u32,
}

impl Transition {
    #[must_use]
    pub fn new(from: Rgb, to: Rgb, duration_s: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = ((duration_s * LAMP_ENGINE_FPS as f64) as u32).max(1);
        Self {
            from,
            to,
            steps,
            step: 1,
        }
    }

    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        let t = f64::from(self.step) / f64::from(self.steps);
        frame.fill(self.from.lerp(self.to, t));

        if self.step >= self.steps {
            return AnimationState::Finished;
        }
        self.step += 1;
        AnimationState::Running
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::LAMP_LED_COUNT;

    #[test]
    fn test_final_step_hits_target_exactly() {
        let from = Rgb(3, 250, 17);
        let to = Rgb(240, 1, 99);
        let mut transition = Transition::new(from, to, 0.5);
        let mut frame = [Rgb::OFF; LAMP_LED_COUNT];

        let mut ticks = 0;
        while transition.animate(&mut frame).is_running() {
            ticks += 1;
            assert!(ticks <= 30, "transition did not terminate");
        }
        assert_eq!(frame, [to; LAMP_LED_COUNT]);
        assert_eq!(ticks, 29);
    }

    #[test]
    fn test_single_step_transition() {
        let mut transition = Transition::new(Rgb::OFF, Rgb::WHITE, 0.0);
        let mut frame = [Rgb::OFF; LAMP_LED_COUNT];
        assert_eq!(transition.animate(&mut frame), AnimationState::Finished);
        assert_eq!(frame[0], Rgb::WHITE);
    }
}
