//! Read-only engine status snapshot.

use serde::Serialize;

use crate::classifiers::{ClassifierRegistry, catalog_names};

/// Descriptor reported for the learned classifier family.
pub const MODEL_TYPE: &str = "state_of_the_art_deepfake_detection";

/// Per-classifier load state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierStatus {
    pub name: String,
    pub loaded: bool,
    pub weights_initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

/// What the engine can do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// At least one classifier is loaded
    pub models_loaded: bool,
    pub capability_available: bool,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_reason: Option<String>,
    pub available_classifiers: Vec<String>,
    pub loaded_classifiers: Vec<String>,
    pub total_loaded: usize,
    pub classifiers: Vec<ClassifierStatus>,
    pub video_decoder_available: bool,
    pub model_type: String,
}

impl EngineStatus {
    pub fn collect(registry: &ClassifierRegistry, video_decoder_available: bool) -> Self {
        let capability = registry.capability();
        let loaded_classifiers = registry.loaded_names();

        Self {
            models_loaded: !loaded_classifiers.is_empty(),
            capability_available: capability.is_available(),
            device: capability.device_name().to_string(),
            capability_reason: capability.reason().map(str::to_string),
            available_classifiers: catalog_names(),
            total_loaded: loaded_classifiers.len(),
            loaded_classifiers,
            classifiers: registry
                .handles()
                .iter()
                .map(|h| ClassifierStatus {
                    name: h.name.clone(),
                    loaded: h.loaded,
                    weights_initialized: h.weights_initialized,
                    load_error: h.load_error.clone(),
                })
                .collect(),
            video_decoder_available,
            model_type: MODEL_TYPE.to_string(),
        }
    }
}
