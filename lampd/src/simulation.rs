//! Scripted feature show, for bring-up without a control transport.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time;
use tracing::info;

use crate::engine::Event;
use crate::lamp;
use crate::menu::InputEvent;

fn feature(feature_id: &str, value: Value) -> Event {
    Event::Feature {
        feature_id: feature_id.to_owned(),
        value,
    }
}

/// Walks the lamp through every control surface once: direct colors, each
/// animation, a menu session driven by synthetic encoder input, then the
/// audio visualizer (which needs a reachable FFT server to show anything).
pub async fn feature_show(
    engine_tx: mpsc::Sender<Event>,
    step_delay: Duration,
) -> eyre::Result<()> {
    let steps = vec![
        feature(lamp::FEATURE_GLOBAL_COLOR, json!("#ff0000")),
        feature(lamp::FEATURE_GLOBAL_COLOR, json!("#00ff00")),
        feature("change_led_0_color", json!("#0000ff")),
        feature(lamp::FEATURE_ANIMATION, json!("rainbow")),
        feature(lamp::FEATURE_ANIMATION, json!("breathe")),
        feature(lamp::FEATURE_ANIMATION, json!("wheel")),
        feature(lamp::FEATURE_ANIMATION, json!("flash_color")),
        // a menu session: open, pick the global-color item, commit white
        Event::Input(InputEvent::LongPress),
        Event::Input(InputEvent::ShortPress),
        Event::Input(InputEvent::EncoderNext),
        Event::Input(InputEvent::ShortPress),
        // brightness nudge from idle
        Event::Input(InputEvent::EncoderPrev),
        feature(lamp::FEATURE_VISUALIZER, json!(1)),
        feature(lamp::FEATURE_VISUALIZER, json!(0)),
        feature(lamp::FEATURE_GLOBAL_COLOR, json!("#ffffff")),
    ];
    for event in steps {
        info!("simulation: {event:?}");
        engine_tx.send(event).await?;
        time::sleep(step_delay).await;
    }
    info!("simulation done");
    Ok(())
}
