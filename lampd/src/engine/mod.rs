//! LED engine.
//!
//! A single task owns the lamp, the menu state machine and the stream task
//! handle. It multiplexes the render interval against the event channel, so
//! animation switching is atomic and no stale tick can ever touch the LEDs.

pub mod animations;

use std::time::Duration;

use futures::future::{self, Either};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};
use tracing::{debug, info, warn};

use crate::hal::LedSink;
use crate::lamp::{self, FeatureChange, Lamp};
use crate::menu::{InputEvent, Menu, MenuAction, Preview};
use crate::stream::{AudioFrame, StreamConfig, StreamTask};
use self::animations::{Animation, Flash};
use lamp_rgb::Rgb;

/// Number of LEDs in the lamp.
pub const LAMP_LED_COUNT: usize = 4;

/// Render frame rate.
pub const LAMP_ENGINE_FPS: u64 = 60;

/// Toggle rate of the flash previewing a highlighted menu entry.
const MENU_BADGE_FLASH_RATE_HZ: f64 = 2.0;

/// One frame of colors for the lamp's LEDs.
pub type LampFrame = [Rgb; LAMP_LED_COUNT];

/// Returned by every animation tick.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AnimationState {
    /// The animation is finished and shouldn't be called again
    Finished,
    /// The animation is still running
    Running,
}

impl AnimationState {
    /// if it is the `Running` variant
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self == AnimationState::Running
    }
}

/// Events consumed by the engine task.
#[derive(Debug)]
pub enum Event {
    /// Feature update from the control channel.
    Feature { feature_id: String, value: Value },
    /// Raw user input from the encoder/button driver.
    Input(InputEvent),
    /// One frame of loudness values from the stream task.
    Audio(AudioFrame),
    /// The stream task completed a (re)connection handshake.
    StreamConnected(StreamConfig),
}

/// Where the FFT stream lives.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub host: String,
    pub port: u16,
}

pub struct Runner<S: LedSink> {
    lamp: Lamp<S>,
    menu: Menu,
    stream: Option<StreamTask>,
    stream_opts: StreamOptions,
    engine_tx: mpsc::Sender<Event>,
    broadcast_tx: mpsc::Sender<FeatureChange>,
    persist_tx: mpsc::Sender<FeatureChange>,
}

impl<S: LedSink> Runner<S> {
    pub fn new(
        lamp: Lamp<S>,
        stream_opts: StreamOptions,
        engine_tx: mpsc::Sender<Event>,
        broadcast_tx: mpsc::Sender<FeatureChange>,
        persist_tx: mpsc::Sender<FeatureChange>,
    ) -> Self {
        Self {
            lamp,
            menu: Menu::new(),
            stream: None,
            stream_opts,
            engine_tx,
            broadcast_tx,
            persist_tx,
        }
    }

    /// Replays persisted feature values at startup. Silent: nothing is
    /// broadcast and nothing is written back to the store.
    pub async fn restore(&mut self, features: Vec<(String, Value)>) {
        self.lamp.restore_state(features);
        // a persisted visualizer toggle needs its stream task back
        self.set_stream(self.lamp.visualizer_enabled()).await;
        info!("restored persisted state");
    }

    pub async fn event(&mut self, event: Event) {
        match event {
            Event::Feature { feature_id, value } => {
                if self.menu.in_session() {
                    debug!("menu session active, dropping update for {feature_id}");
                    return;
                }
                self.apply_feature(&feature_id, value, true).await;
            }
            Event::Input(input) => {
                let active = self.lamp.active_feature();
                let color = self.lamp.global_color();
                if let Some(action) = self.menu.handle(input, active, color) {
                    self.act(action).await;
                }
            }
            Event::Audio(frame) => {
                // menu previews own the LEDs while a session is active
                if !self.menu.in_session() {
                    self.lamp.dance(&frame);
                }
            }
            Event::StreamConnected(config) => {
                self.lamp.set_stream_config(config);
            }
        }
    }

    /// Advances the active animation by one frame. Called on every render
    /// interval tick.
    pub async fn tick(&mut self) {
        if let Some(action) = self.menu.poll_timeout() {
            self.act(action).await;
        }
        self.lamp.render_tick();
    }

    pub async fn shutdown(&mut self) {
        self.set_stream(false).await;
    }

    async fn act(&mut self, action: MenuAction) {
        match action {
            MenuAction::Commit { feature_id, value } => {
                self.apply_feature(&feature_id, value, true).await;
            }
            MenuAction::Restore { feature_id, value } => {
                self.apply_feature(&feature_id, value, false).await;
            }
            MenuAction::Preview(Preview::Badge(color)) => {
                self.lamp.set_animation(Animation::Flash(Flash::new(
                    color,
                    MENU_BADGE_FLASH_RATE_HZ,
                )));
            }
            MenuAction::Preview(Preview::Candidate { feature_id, value }) => {
                // previews drive the lamp but are never broadcast/persisted
                let _ = self.lamp.change_feature(&feature_id, value);
            }
        }
    }

    async fn apply_feature(&mut self, feature_id: &str, value: Value, notify: bool) {
        let changes = self.lamp.change_feature(feature_id, value);
        for change in &changes {
            if change.feature_id == lamp::FEATURE_VISUALIZER {
                self.set_stream(lamp::truthy(&change.value)).await;
            }
        }
        if !notify {
            return;
        }
        for change in changes {
            if self.broadcast_tx.try_send(change.clone()).is_err() {
                debug!("broadcast queue full, dropping {}", change.feature_id);
            }
            if self.persist_tx.try_send(change).is_err() {
                warn!("persist queue full, dropping state update");
            }
        }
    }

    async fn set_stream(&mut self, enable: bool) {
        if enable {
            if self.stream.is_none() {
                self.stream = Some(StreamTask::spawn(
                    self.stream_opts.host.clone(),
                    self.stream_opts.port,
                    self.engine_tx.clone(),
                ));
            }
        } else if let Some(task) = self.stream.take() {
            // wait for the socket teardown so two stream tasks never overlap
            task.shutdown().await;
        }
    }
}

pub async fn event_loop<S: LedSink>(
    rx: mpsc::Receiver<Event>,
    mut runner: Runner<S>,
) -> eyre::Result<()> {
    let mut interval = time::interval(Duration::from_millis(1000 / LAMP_ENGINE_FPS));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut interval = IntervalStream::new(interval);
    let mut rx = ReceiverStream::new(rx);
    loop {
        match future::select(rx.next(), interval.next()).await {
            Either::Left((None, _)) => {
                break;
            }
            Either::Left((Some(event), _)) => {
                runner.event(event).await;
            }
            Either::Right(_) => {
                runner.tick().await;
            }
        }
    }
    runner.shutdown().await;
    Ok(())
}
