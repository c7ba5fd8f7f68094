//! Persisted device state.
//!
//! The state file mirrors what the device manager knows about the lamp:
//! feature schemas with their current values, plus free-form config. It is
//! loaded once at startup and rewritten (debounced) after every accepted
//! feature change. A corrupt or missing file falls back to the compiled
//! defaults; nothing here is fatal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::LAMP_LED_COUNT;
use crate::engine::animations::VisualizerConfig;
use crate::lamp;
use crate::lamp::FeatureChange;

/// Quiet window after the last feature change before the state is written.
const PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub valid_values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub schema: FeatureSchema,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub id: String,
    pub name: String,
    pub features: Vec<Feature>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl DeviceState {
    /// The compiled default state of a factory-fresh lamp.
    pub fn default_lamp(device_id: &str) -> Self {
        let mut features = vec![
            Feature {
                id: lamp::FEATURE_GLOBAL_COLOR.to_owned(),
                schema: FeatureSchema {
                    default: json!("#ffffff"),
                    valid_values: None,
                },
                value: None,
            },
            Feature {
                id: lamp::FEATURE_ANIMATION.to_owned(),
                schema: FeatureSchema {
                    default: json!("none"),
                    valid_values: Some(vec![
                        json!("none"),
                        json!("rainbow"),
                        json!("breathe"),
                        json!("wheel"),
                        json!("flash_color"),
                    ]),
                },
                value: None,
            },
            Feature {
                id: lamp::FEATURE_VISUALIZER.to_owned(),
                schema: FeatureSchema {
                    default: json!(0),
                    valid_values: Some(vec![json!(0), json!(1)]),
                },
                value: None,
            },
            Feature {
                id: lamp::FEATURE_VISUALIZER_CONFIG.to_owned(),
                schema: FeatureSchema {
                    default: serde_json::to_value(VisualizerConfig::default())
                        .unwrap_or(Value::Null),
                    valid_values: None,
                },
                value: None,
            },
        ];
        for led in 0..LAMP_LED_COUNT {
            features.push(Feature {
                id: format!("change_led_{led}_color"),
                schema: FeatureSchema {
                    default: json!("#ffffff"),
                    valid_values: None,
                },
                value: None,
            });
        }
        Self {
            id: device_id.to_owned(),
            name: "RGB lamp".to_owned(),
            features,
            config: Map::new(),
        }
    }

    /// Loads the persisted state, falling back to `defaults` on any error.
    pub async fn load(path: &Path, defaults: DeviceState) -> DeviceState {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<DeviceState>(&bytes) {
                Ok(state) => {
                    info!("loaded previous state from {}", path.display());
                    state
                }
                Err(e) => {
                    warn!("corrupt state file, using defaults: {e}");
                    defaults
                }
            },
            Err(e) => {
                info!("no previous state ({e}), using defaults");
                defaults
            }
        }
    }

    pub fn feature_ids(&self) -> HashSet<String> {
        self.features
            .iter()
            .map(|feature| feature.id.clone())
            .collect()
    }

    /// The values to replay through the lamp at startup: the persisted value
    /// where one exists, the schema default otherwise. Per-LED colors defer
    /// to the global color unless one was explicitly set, so a default
    /// doesn't paint over the restored global color.
    pub fn initial_features(&self) -> Vec<(String, Value)> {
        self.features
            .iter()
            .filter(|feature| {
                feature.value.is_some() || !feature.id.starts_with("change_led_")
            })
            .map(|feature| {
                let value = feature
                    .value
                    .clone()
                    .unwrap_or_else(|| feature.schema.default.clone());
                (feature.id.clone(), value)
            })
            .collect()
    }

    pub fn set_feature(&mut self, feature_id: &str, value: Value) {
        if let Some(feature) =
            self.features.iter_mut().find(|f| f.id == feature_id)
        {
            feature.value = Some(value);
        }
    }
}

/// Seam for the external storage collaborator.
#[async_trait]
pub trait Persister: Send + Sync + 'static {
    async fn persist(&self, state: &DeviceState) -> Result<(), StoreError>;
}

pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Persister for JsonFile {
    async fn persist(&self, state: &DeviceState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

/// Applies feature changes to the in-memory state and persists it once the
/// burst has settled. Runs until the change channel closes, flushing any
/// pending write on the way out.
pub async fn persist_task(
    mut state: DeviceState,
    persister: impl Persister,
    mut changes_rx: mpsc::Receiver<FeatureChange>,
) {
    while let Some(change) = changes_rx.recv().await {
        state.set_feature(&change.feature_id, change.value);
        let mut closed = false;
        // absorb the burst until nothing new arrives for the debounce window
        loop {
            match timeout(PERSIST_DEBOUNCE, changes_rx.recv()).await {
                Ok(Some(change)) => {
                    state.set_feature(&change.feature_id, change.value);
                }
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }
        match persister.persist(&state).await {
            Ok(()) => debug!("state persisted"),
            Err(e) => warn!("failed to persist state: {e}"),
        }
        if closed {
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingPersister {
        writes: Arc<Mutex<Vec<DeviceState>>>,
    }

    #[async_trait]
    impl Persister for RecordingPersister {
        async fn persist(&self, state: &DeviceState) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    fn change(feature_id: &str, value: Value) -> FeatureChange {
        FeatureChange {
            feature_id: feature_id.to_owned(),
            value,
        }
    }

    #[tokio::test]
    async fn test_debounce_collapses_bursts() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let (changes_tx, changes_rx) = mpsc::channel(8);
        let task = tokio::spawn(persist_task(
            DeviceState::default_lamp("lamp-0"),
            RecordingPersister {
                writes: Arc::clone(&writes),
            },
            changes_rx,
        ));

        for hex in ["#000001", "#000002", "#000003"] {
            changes_tx
                .send(change(lamp::FEATURE_GLOBAL_COLOR, json!(hex)))
                .await
                .unwrap();
        }
        drop(changes_tx);
        task.await.unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1, "burst must collapse into one write");
        let color = writes[0]
            .features
            .iter()
            .find(|f| f.id == lamp::FEATURE_GLOBAL_COLOR)
            .unwrap();
        assert_eq!(color.value, Some(json!("#000003")));
    }

    #[tokio::test]
    async fn test_load_falls_back_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let state =
            DeviceState::load(&path, DeviceState::default_lamp("lamp-0")).await;
        assert_eq!(state.id, "lamp-0");
        assert!(state.features.iter().all(|f| f.value.is_none()));
    }

    #[tokio::test]
    async fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = DeviceState::default_lamp("lamp-0");
        state.set_feature(lamp::FEATURE_ANIMATION, json!("rainbow"));
        JsonFile::new(path.clone()).persist(&state).await.unwrap();

        let loaded =
            DeviceState::load(&path, DeviceState::default_lamp("other")).await;
        assert_eq!(loaded.id, "lamp-0");
        let animation = loaded
            .features
            .iter()
            .find(|f| f.id == lamp::FEATURE_ANIMATION)
            .unwrap();
        assert_eq!(animation.value, Some(json!("rainbow")));
    }

    #[test]
    fn test_initial_features_prefer_persisted_values() {
        let mut state = DeviceState::default_lamp("lamp-0");
        state.set_feature(lamp::FEATURE_GLOBAL_COLOR, json!("#123456"));
        let initial = state.initial_features();
        let color = initial
            .iter()
            .find(|(id, _)| id == lamp::FEATURE_GLOBAL_COLOR)
            .unwrap();
        assert_eq!(color.1, json!("#123456"));
        let animation = initial
            .iter()
            .find(|(id, _)| id == lamp::FEATURE_ANIMATION)
            .unwrap();
        assert_eq!(animation.1, json!("none"), "defaults fill the gaps");
    }
}
