//! Pub/sub control dispatch.
//!
//! The transport itself (broker connection, device registration) is an
//! external collaborator; it hands raw inbound payloads to `dispatch_inbound`
//! and drains outbound broadcasts from the channel fed by
//! `broadcast_changes`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::Event;
use crate::lamp::FeatureChange;

/// Capacity of the outbound broadcast queue; sends never block and overflow
/// is dropped.
pub const BROADCAST_CAPACITY: usize = 8;

const STATE_UPDATE_REQUEST: &str = "state-update";

#[derive(Debug, Deserialize)]
struct InboundMessage {
    request: String,
    payload: UpdatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    device_id: String,
    feature_id: String,
    state: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Broadcast<'a> {
    device_id: &'a str,
    feature_id: &'a str,
    state: &'a Value,
}

/// Filters raw transport payloads and forwards matching feature updates to
/// the engine. Runs until the inbound channel closes.
pub async fn dispatch_inbound(
    device_id: String,
    known_features: HashSet<String>,
    mut inbound_rx: mpsc::Receiver<String>,
    engine_tx: mpsc::Sender<Event>,
) {
    while let Some(raw) = inbound_rx.recv().await {
        let message: InboundMessage = match serde_json::from_str(&raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to parse control message: {e}");
                continue;
            }
        };
        if message.request != STATE_UPDATE_REQUEST {
            debug!("ignoring request {:?}", message.request);
            continue;
        }
        if message.payload.device_id != device_id {
            continue;
        }
        if !known_features.contains(&message.payload.feature_id) {
            debug!(
                "ignoring update for unknown feature {:?}",
                message.payload.feature_id
            );
            continue;
        }
        let event = Event::Feature {
            feature_id: message.payload.feature_id,
            value: message.payload.state,
        };
        if engine_tx.send(event).await.is_err() {
            // engine is gone; shut this task down too
            break;
        }
    }
}

/// Serializes accepted feature changes onto the outbound transport channel.
/// One message per accepted change.
pub async fn broadcast_changes(
    device_id: String,
    mut changes_rx: mpsc::Receiver<FeatureChange>,
    outbound_tx: mpsc::Sender<String>,
) {
    while let Some(change) = changes_rx.recv().await {
        let broadcast = Broadcast {
            device_id: &device_id,
            feature_id: &change.feature_id,
            state: &change.value,
        };
        match serde_json::to_string(&broadcast) {
            Ok(json) => {
                if outbound_tx.try_send(json).is_err() {
                    debug!("transport backlogged, dropping broadcast");
                }
            }
            Err(e) => warn!("failed to serialize broadcast: {e}"),
        }
    }
}
