//! Audio-reactive animation.
//!
//! Fed by the FFT stream at the network sample rate, rendered at the engine
//! frame rate. Every received frame becomes a short run of interpolated
//! colors so the lamp glides between loudness targets instead of stepping.

use std::collections::VecDeque;

use lamp_rgb::{loudness_to_brightness, DbfsRange, Rgb};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::{AnimationState, LampFrame, LAMP_ENGINE_FPS};
use crate::stream::AudioFrame;

/// Upper bound of buffered interpolation colors. The queue holds well under
/// half a second of output; overflow drops the newest colors so the lag
/// behind the stream stays bounded.
const COLOR_QUEUE_CAPACITY: usize = 8;

/// Reduction of a band range to a single loudness value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandMapping {
    /// Loudest band of the range.
    MaxOfRange { from: usize, to: Option<usize> },
    /// Quietest band of the range.
    MinOfRange { from: usize, to: Option<usize> },
    /// Average loudness of the range.
    MeanOfRange { from: usize, to: Option<usize> },
    /// Picks one of the other reductions at random on every frame.
    RandomChoice { from: usize, to: Option<usize> },
}

impl BandMapping {
    fn loudness(&self, bands: &[f32]) -> f64 {
        match *self {
            BandMapping::MaxOfRange { from, to } => Self::slice(bands, from, to)
                .iter()
                .fold(f64::NEG_INFINITY, |acc, &band| acc.max(f64::from(band))),
            BandMapping::MinOfRange { from, to } => Self::slice(bands, from, to)
                .iter()
                .fold(f64::INFINITY, |acc, &band| acc.min(f64::from(band))),
            BandMapping::MeanOfRange { from, to } => {
                let range = Self::slice(bands, from, to);
                if range.is_empty() {
                    return f64::NEG_INFINITY;
                }
                range.iter().map(|&band| f64::from(band)).sum::<f64>()
                    / range.len() as f64
            }
            BandMapping::RandomChoice { from, to } => {
                let pick = match rand::thread_rng().gen_range(0..3_u8) {
                    0 => BandMapping::MaxOfRange { from, to },
                    1 => BandMapping::MinOfRange { from, to },
                    _ => BandMapping::MeanOfRange { from, to },
                };
                pick.loudness(bands)
            }
        }
    }

    fn slice(bands: &[f32], from: usize, to: Option<usize>) -> &[f32] {
        let from = from.min(bands.len());
        let to = to.unwrap_or(bands.len()).clamp(from, bands.len());
        &bands[from..to]
    }
}

/// Per-channel mapping from the loudness spectrum to a target color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub dbfs: DbfsRange,
    pub red: BandMapping,
    pub green: BandMapping,
    pub blue: BandMapping,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            dbfs: DbfsRange::default(),
            red: BandMapping::MaxOfRange { from: 0, to: Some(3) },
            green: BandMapping::MinOfRange { from: 3, to: Some(7) },
            blue: BandMapping::MeanOfRange { from: 7, to: None },
        }
    }
}

/// The audio-reactive variant. `feed` runs on the network cadence, `animate`
/// on the render cadence; the bounded color queue decouples the two so that
/// rendering never waits for data.
pub struct Visualizer {
    config: VisualizerConfig,
    /// Interpolation colors per received frame: `ceil(render / sample rate)`.
    steps_per_frame: u32,
    /// Newest colors are pushed to the front, rendering consumes from the
    /// back, so consumption is FIFO by insertion order.
    queue: VecDeque<Rgb>,
    last_target: Rgb,
    last_rendered: Rgb,
}

impl Visualizer {
    #[must_use]
    pub fn new(sample_rate: u8, config: VisualizerConfig) -> Self {
        let sample_rate = u64::from(sample_rate.max(1));
        #[allow(clippy::cast_possible_truncation)]
        let steps_per_frame = LAMP_ENGINE_FPS.div_ceil(sample_rate) as u32;
        Self {
            config,
            steps_per_frame,
            queue: VecDeque::with_capacity(COLOR_QUEUE_CAPACITY),
            last_target: Rgb::OFF,
            last_rendered: Rgb::OFF,
        }
    }

    /// Turns a received frame into a run of interpolation colors toward the
    /// new loudness target. Called once per network frame.
    pub fn feed(&mut self, frame: &AudioFrame) {
        let target = self.target_color(frame.bands());

        if self.steps_per_frame <= 1 {
            self.enqueue(target);
        } else {
            for i in 0..self.steps_per_frame {
                let t = f64::from(i) / f64::from(self.steps_per_frame - 1);
                self.enqueue(self.last_target.lerp(target, t));
            }
        }
        self.last_target = target;
    }

    pub fn animate(&mut self, frame: &mut LampFrame) -> AnimationState {
        if let Some(color) = self.queue.pop_back() {
            self.last_rendered = color;
        }
        // hold the last color when the queue runs dry; never wait for data
        frame.fill(self.last_rendered);
        AnimationState::Running
    }

    /// Applies a new channel mapping without resetting the color queue.
    pub fn set_config(&mut self, config: VisualizerConfig) {
        self.config = config;
    }

    fn target_color(&self, bands: &[f32]) -> Rgb {
        Rgb(
            loudness_to_brightness(self.config.red.loudness(bands), &self.config.dbfs),
            loudness_to_brightness(self.config.green.loudness(bands), &self.config.dbfs),
            loudness_to_brightness(self.config.blue.loudness(bands), &self.config.dbfs),
        )
    }

    fn enqueue(&mut self, color: Rgb) {
        if self.queue.len() >= COLOR_QUEUE_CAPACITY {
            // full: drop the newest color rather than block or grow
            return;
        }
        self.queue.push_front(color);
    }
}
