pub mod breathe;
pub mod flash;
pub mod rainbow;
pub mod transition;
pub mod visualizer;
pub mod wheel;

pub use self::breathe::Breathe;
pub use self::flash::Flash;
pub use self::rainbow::Rainbow;
pub use self::transition::Transition;
pub use self::visualizer::{BandMapping, Visualizer, VisualizerConfig};
pub use self::wheel::Wheel;

use crate::engine::{AnimationState, LampFrame};

/// The active animation of the lamp. Exactly one variant exists at a time;
/// replacing the value is how an animation is stopped, so a superseded
/// variant can never tick again.
pub enum Animation {
    None,
    Transition(Transition),
    Rainbow(Rainbow),
    Breathe(Breathe),
    Wheel(Wheel),
    Flash(Flash),
    Visualizer(Visualizer),
}

impl Animation {
    /// Advances the animation by one step at the engine frame rate and
    /// writes the resulting colors into `frame`. Pure computation; never
    /// blocks.
    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        match self {
            Animation::None => AnimationState::Finished,
            Animation::Transition(animation) => animation.animate(frame),
            Animation::Rainbow(animation) => animation.animate(frame),
            Animation::Breathe(animation) => animation.animate(frame),
            Animation::Wheel(animation) => animation.animate(frame),
            Animation::Flash(animation) => animation.animate(frame),
            Animation::Visualizer(animation) => animation.animate(frame),
        }
    }

    /// The value of the `animation` feature that selects this variant.
    pub fn name(&self) -> &'static str {
        match self {
            Animation::None => "none",
            Animation::Transition(_) => "transition",
            Animation::Rainbow(_) => "rainbow",
            Animation::Breathe(_) => "breathe",
            Animation::Wheel(_) => "wheel",
            Animation::Flash(_) => "flash_color",
            Animation::Visualizer(_) => "audio_visualizer",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Animation::None)
    }
}
