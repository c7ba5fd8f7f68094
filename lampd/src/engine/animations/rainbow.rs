use lamp_rgb::Rgb;

use crate::engine::animations::Transition;
use crate::engine::{AnimationState, LampFrame};

/// The classic seven rainbow colors, walked in order.
pub const RAINBOW_COLORS: [Rgb; 7] = [
    Rgb(255, 0, 0),   // red
    Rgb(255, 127, 0), // orange
    Rgb(255, 255, 0), // yellow
    Rgb(0, 255, 0),   // green
    Rgb(0, 0, 255),   // blue
    Rgb(75, 0, 130),  // indigo
    Rgb(148, 0, 211), // violet
];

/// Endless cycle through the rainbow palette, one [`Transition`] per leg.
pub struct Rainbow {
    index: usize,
    duration_s: f64,
    leg: Transition,
}

impl Rainbow {
    #[must_use]
    pub fn new(duration_s: f64) -> Self {
        Self {
            index: 0,
            duration_s,
            leg: Transition::new(RAINBOW_COLORS[0], RAINBOW_COLORS[1], duration_s),
        }
    }

    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        if self.leg.animate(frame).is_running() {
            return AnimationState::Running;
        }
        // leg finished on this tick; wrap around and start the next one
        self.index = (self.index + 1) % RAINBOW_COLORS.len();
        let next = (self.index + 1) % RAINBOW_COLORS.len();
        self.leg = Transition::new(
            RAINBOW_COLORS[self.index],
            RAINBOW_COLORS[next],
            self.duration_s,
        );
        AnimationState::Running
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{LAMP_ENGINE_FPS, LAMP_LED_COUNT};

    #[test]
    fn test_wraps_through_all_colors() {
        let duration_s = 0.1;
        let mut rainbow = Rainbow::new(duration_s);
        let mut frame = [Rgb::OFF; LAMP_LED_COUNT];

        let steps_per_leg = (duration_s * LAMP_ENGINE_FPS as f64) as u32;
        for leg in 0..RAINBOW_COLORS.len() {
            for _ in 0..steps_per_leg {
                assert!(rainbow.animate(&mut frame).is_running());
            }
            // each leg lands exactly on the next palette color
            let expected = RAINBOW_COLORS[(leg + 1) % RAINBOW_COLORS.len()];
            assert_eq!(frame[0], expected);
        }
        // a full cycle returns to the first leg
        assert_eq!(rainbow.index, 0);
    }
}
