//! Lamp feature routing.
//!
//! The lamp owns the LED sink and the active animation. Every control
//! surface (pub/sub, menu, persisted state replay) funnels through
//! [`Lamp::change_feature`], which arbitrates between direct color writes
//! and the animation sources.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::animations::{
    Animation, Breathe, Flash, Rainbow, Visualizer, VisualizerConfig, Wheel,
};
use crate::engine::{LampFrame, LAMP_LED_COUNT};
use crate::hal::LedSink;
use crate::stream::{AudioFrame, StreamConfig};
use lamp_rgb::Rgb;

pub const FEATURE_GLOBAL_COLOR: &str = "change_global_color";
pub const FEATURE_ANIMATION: &str = "animation";
pub const FEATURE_VISUALIZER: &str = "enable_audio_visualizer";
pub const FEATURE_VISUALIZER_CONFIG: &str = "audio_visualizer_config";

/// Default leg/sweep duration of the looping animations.
const DEFAULT_ANIMATION_DURATION_S: f64 = 5.0;
/// A full hue rotation takes a minute by default.
const WHEEL_DURATION_S: f64 = 60.0;
const FLASH_RATE_HZ: f64 = 2.0;

/// An accepted feature change, for broadcast and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureChange {
    pub feature_id: String,
    pub value: Value,
}

impl FeatureChange {
    fn new(feature_id: &str, value: Value) -> Self {
        Self {
            feature_id: feature_id.to_owned(),
            value,
        }
    }
}

/// Invalid feature values. Absorbed locally: the request is logged and
/// ignored, no state changes.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not a valid color value")]
    InvalidColor(Value),
    #[error("unknown animation {0:?}")]
    UnknownAnimation(String),
    #[error("expected a string value, got {0}")]
    NotAString(Value),
    #[error("led index {0} is out of range")]
    LedIndex(usize),
    #[error("invalid visualizer config: {0}")]
    VisualizerConfig(#[from] serde_json::Error),
}

/// 1/0, true/false and "on"/"off" style toggle values all appear in the
/// wild; accept them all.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "on"),
        _ => false,
    }
}

fn parse_color(value: &Value) -> Result<Rgb, ConfigError> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| ConfigError::InvalidColor(value.clone())),
        Value::Number(n) => {
            let packed = n
                .as_u64()
                .filter(|&packed| packed <= 0xff_ff_ff)
                .ok_or_else(|| ConfigError::InvalidColor(value.clone()))?;
            Ok(Rgb(
                (packed >> 16) as u8,
                (packed >> 8) as u8,
                packed as u8,
            ))
        }
        _ => Err(ConfigError::InvalidColor(value.clone())),
    }
}

/// `change_led_<N>_color` addresses a single LED.
fn led_color_index(feature_id: &str) -> Option<usize> {
    feature_id
        .strip_prefix("change_led_")?
        .strip_suffix("_color")?
        .parse()
        .ok()
}

pub struct Lamp<S: LedSink> {
    sink: S,
    frame: LampFrame,
    animation: Animation,
    /// Last requested global color, before gamut balancing.
    global_color: Rgb,
    visualizer_enabled: bool,
    visualizer_config: VisualizerConfig,
    stream_config: Option<StreamConfig>,
}

impl<S: LedSink> Lamp<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            frame: [Rgb::OFF; LAMP_LED_COUNT],
            animation: Animation::None,
            global_color: Rgb::OFF,
            visualizer_enabled: false,
            visualizer_config: VisualizerConfig::default(),
            stream_config: None,
        }
    }

    /// Routes a feature update. Returns the `(feature, value)` pairs that
    /// actually changed, for propagation to subscribers; malformed values
    /// are logged and change nothing.
    pub fn change_feature(&mut self, feature_id: &str, value: Value) -> Vec<FeatureChange> {
        match self.route(feature_id, value) {
            Ok(changes) => changes,
            Err(e) => {
                warn!("rejected update for {feature_id}: {e}");
                Vec::new()
            }
        }
    }

    /// Replays persisted feature values through the regular routing. The
    /// caller is responsible for not emitting notifications for these.
    pub fn restore_state<I>(&mut self, features: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (feature_id, value) in features {
            let _ = self.change_feature(&feature_id, value);
        }
    }

    /// Feeds the audio visualizer, lazily constructing it on the first
    /// frame after a stream config is known.
    pub fn dance(&mut self, frame: &AudioFrame) {
        if !self.visualizer_enabled {
            return;
        }
        let Some(config) = self.stream_config else {
            return;
        };
        if !matches!(self.animation, Animation::Visualizer(_)) {
            self.animation = Animation::Visualizer(Visualizer::new(
                config.sample_rate,
                self.visualizer_config.clone(),
            ));
        }
        if let Animation::Visualizer(visualizer) = &mut self.animation {
            visualizer.feed(frame);
        }
    }

    /// Advances the active animation by one step and writes the result to
    /// the hardware. Pure computation plus a synchronous sink write.
    pub fn render_tick(&mut self) {
        if self.animation.is_none() {
            return;
        }
        let state = self.animation.animate(&mut self.frame);
        self.sink.render(&self.frame);
        if !state.is_running() {
            // terminal variants stop themselves; drop the spent value so no
            // stale tick can ever fire
            self.animation = Animation::None;
        }
    }

    pub fn set_stream_config(&mut self, config: StreamConfig) {
        // a reconnect may renegotiate the sample rate; rebuild the
        // visualizer lazily with the new pacing
        if self.stream_config != Some(config)
            && matches!(self.animation, Animation::Visualizer(_))
        {
            self.animation = Animation::None;
        }
        self.stream_config = Some(config);
    }

    /// Replaces the active animation without touching the feature state.
    /// Used by menu previews.
    pub fn set_animation(&mut self, animation: Animation) {
        self.animation = animation;
    }

    /// The feature a menu session should restore on cancel.
    pub fn active_feature(&self) -> (String, Value) {
        if self.visualizer_enabled {
            (FEATURE_VISUALIZER.to_owned(), Value::from(1_u8))
        } else if !self.animation.is_none() {
            (
                FEATURE_ANIMATION.to_owned(),
                Value::from(self.animation_name()),
            )
        } else {
            (
                FEATURE_GLOBAL_COLOR.to_owned(),
                Value::from(self.global_color.to_hex()),
            )
        }
    }

    pub fn global_color(&self) -> Rgb {
        self.global_color
    }

    pub fn animation_name(&self) -> &'static str {
        self.animation.name()
    }

    pub fn visualizer_enabled(&self) -> bool {
        self.visualizer_enabled
    }

    fn route(
        &mut self,
        feature_id: &str,
        value: Value,
    ) -> Result<Vec<FeatureChange>, ConfigError> {
        match feature_id {
            FEATURE_GLOBAL_COLOR => {
                let color = parse_color(&value)?;
                let mut changes = self.stop_animation_sources();
                self.global_color = color;
                self.frame.fill(color.balanced());
                self.sink.render(&self.frame);
                changes.push(FeatureChange::new(feature_id, value));
                Ok(changes)
            }
            FEATURE_ANIMATION => {
                let name = value
                    .as_str()
                    .ok_or_else(|| ConfigError::NotAString(value.clone()))?;
                let animation = self.animation_by_name(name)?;
                let mut changes = Vec::new();
                if self.visualizer_enabled {
                    self.visualizer_enabled = false;
                    changes.push(FeatureChange::new(FEATURE_VISUALIZER, Value::from(0_u8)));
                }
                // replacing the value stops the previous variant before the
                // new one ever ticks
                self.animation = animation;
                changes.push(FeatureChange::new(feature_id, value));
                Ok(changes)
            }
            FEATURE_VISUALIZER => {
                let enable = truthy(&value);
                if enable == self.visualizer_enabled {
                    return Ok(Vec::new());
                }
                let mut changes = Vec::new();
                self.visualizer_enabled = enable;
                if enable {
                    if !self.animation.is_none() {
                        changes.push(FeatureChange::new(
                            FEATURE_ANIMATION,
                            Value::from("none"),
                        ));
                    }
                    // the visualizer variant itself is built lazily on the
                    // first frame, once the stream config is known
                    self.animation = Animation::None;
                } else if matches!(self.animation, Animation::Visualizer(_)) {
                    self.animation = Animation::None;
                }
                changes.push(FeatureChange::new(
                    feature_id,
                    Value::from(u8::from(enable)),
                ));
                Ok(changes)
            }
            FEATURE_VISUALIZER_CONFIG => {
                let config: VisualizerConfig = serde_json::from_value(value.clone())?;
                if let Animation::Visualizer(visualizer) = &mut self.animation {
                    visualizer.set_config(config.clone());
                }
                self.visualizer_config = config;
                Ok(vec![FeatureChange::new(feature_id, value)])
            }
            _ => {
                if let Some(index) = led_color_index(feature_id) {
                    if index >= LAMP_LED_COUNT {
                        return Err(ConfigError::LedIndex(index));
                    }
                    let color = parse_color(&value)?;
                    let mut changes = self.stop_animation_sources();
                    self.frame[index] = color.balanced();
                    self.sink.set_channel_duty(index, self.frame[index]);
                    changes.push(FeatureChange::new(feature_id, value));
                    Ok(changes)
                } else {
                    // unknown ids pass through unchanged so newer
                    // controllers can round-trip features this firmware
                    // doesn't know
                    debug!("passing through unknown feature {feature_id}");
                    Ok(vec![FeatureChange::new(feature_id, value)])
                }
            }
        }
    }

    /// Direct color writes take over from whatever animation source was
    /// driving the LEDs.
    fn stop_animation_sources(&mut self) -> Vec<FeatureChange> {
        let mut changes = Vec::new();
        if self.visualizer_enabled {
            self.visualizer_enabled = false;
            changes.push(FeatureChange::new(FEATURE_VISUALIZER, Value::from(0_u8)));
        }
        if !self.animation.is_none() {
            self.animation = Animation::None;
            changes.push(FeatureChange::new(FEATURE_ANIMATION, Value::from("none")));
        }
        changes
    }

    fn animation_by_name(&self, name: &str) -> Result<Animation, ConfigError> {
        let base = if self.global_color.is_off() {
            Rgb::WHITE
        } else {
            self.global_color
        };
        match name {
            "none" => Ok(Animation::None),
            "rainbow" => Ok(Animation::Rainbow(Rainbow::new(
                DEFAULT_ANIMATION_DURATION_S,
            ))),
            "breathe" => Ok(Animation::Breathe(Breathe::new(
                base.maximize_brightness(),
                DEFAULT_ANIMATION_DURATION_S,
            ))),
            "wheel" => Ok(Animation::Wheel(Wheel::new(
                base.maximize_brightness(),
                WHEEL_DURATION_S,
            ))),
            "flash_color" => Ok(Animation::Flash(Flash::new(base, FLASH_RATE_HZ))),
            other => Err(ConfigError::UnknownAnimation(other.to_owned())),
        }
    }
}
