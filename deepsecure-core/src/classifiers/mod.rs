//! Classifier registry.
//!
//! The registry owns every classifier instance for the lifetime of the
//! engine. Instances are constructed and loaded once, then only read, so the
//! registry can be shared across threads without locking.
//!
//! Three architectures make up the built-in catalog:
//!
//! | name | head | output |
//! |---|---|---|
//! | `faceforensics` | one hidden layer | two-class softmax |
//! | `dfdc` | spatial attention mask | single sigmoid |
//! | `celebdf` | two hidden layers | two-class softmax |

#[cfg(feature = "classifiers")]
mod models;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capability::Capability;
use crate::config::UntrainedWeightsPolicy;
use crate::error::{CoreError, CoreResult};
use crate::preprocessing::ImageTensor;
use crate::types::PredictionRecord;

/// Suffix shared by all weight files in a checkpoint directory.
pub const WEIGHT_FILE_SUFFIX: &str = "_model.safetensors";

/// Suffix of the marker written next to weight files that were synthesized
/// from fresh initialization rather than trained.
pub const UNTRAINED_MARKER_SUFFIX: &str = "_model.untrained";

/// Built-in classifier architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    FaceForensics,
    Dfdc,
    CelebDf,
}

/// Catalog order. Also the order predictions are reported in.
pub const CATALOG: [Architecture; 3] = [
    Architecture::FaceForensics,
    Architecture::Dfdc,
    Architecture::CelebDf,
];

impl Architecture {
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::FaceForensics => "faceforensics",
            Architecture::Dfdc => "dfdc",
            Architecture::CelebDf => "celebdf",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CATALOG.into_iter().find(|a| a.name() == name)
    }

    /// File name of the weights inside a checkpoint directory.
    pub fn weight_file(&self) -> String {
        format!("{}{}", self.name(), WEIGHT_FILE_SUFFIX)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names of all catalog classifiers.
pub fn catalog_names() -> Vec<String> {
    CATALOG.iter().map(|a| a.name().to_string()).collect()
}

/// Raw classifier output for one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierOutput {
    pub fake_probability: f64,
    /// Set by two-class softmax heads.
    pub real_probability: Option<f64>,
}

/// Uniform scoring capability shared by all classifier architectures.
///
/// Implementations must be callable concurrently from several threads.
pub trait Classifier: Send + Sync {
    fn score(&self, input: &ImageTensor) -> CoreResult<ClassifierOutput>;
}

/// Registry entry for one classifier.
#[derive(Clone)]
pub struct ClassifierHandle {
    pub name: String,
    pub loaded: bool,
    pub load_error: Option<String>,
    /// True when the instance runs on freshly initialized parameters.
    pub weights_initialized: bool,
    classifier: Option<Arc<dyn Classifier>>,
}

impl fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierHandle")
            .field("name", &self.name)
            .field("loaded", &self.loaded)
            .field("load_error", &self.load_error)
            .field("weights_initialized", &self.weights_initialized)
            .finish()
    }
}

impl ClassifierHandle {
    fn failed(name: &str, error: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            loaded: false,
            load_error: Some(error.to_string()),
            weights_initialized: false,
            classifier: None,
        }
    }
}

/// Classifiers keyed by name, in registration order.
#[derive(Debug)]
pub struct ClassifierRegistry {
    capability: Capability,
    policy: UntrainedWeightsPolicy,
    handles: Vec<ClassifierHandle>,
}

impl ClassifierRegistry {
    pub fn new(capability: Capability, policy: UntrainedWeightsPolicy) -> Self {
        Self {
            capability,
            policy,
            handles: Vec::new(),
        }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Registers an already constructed classifier as loaded and trained.
    /// Replaces any entry with the same name.
    pub fn register(&mut self, name: impl Into<String>, classifier: Arc<dyn Classifier>) {
        self.insert(ClassifierHandle {
            name: name.into(),
            loaded: true,
            load_error: None,
            weights_initialized: false,
            classifier: Some(classifier),
        });
    }

    /// Constructs the named catalog architecture and loads weights from `path`.
    ///
    /// A missing file yields freshly initialized weights and
    /// `weights_initialized = true`. Returns whether the classifier ended up
    /// loaded; failures are recorded on the handle.
    pub fn register_and_load(&mut self, name: &str, path: &Path) -> bool {
        let handle = self.build_handle(name, path);
        let loaded = handle.loaded;
        match (&handle.load_error, handle.weights_initialized) {
            (Some(err), _) => log::warn!("Classifier '{name}' not loaded: {err}"),
            (None, true) => log::warn!(
                "Classifier '{name}' is using untrained weights from {}",
                path.display()
            ),
            (None, false) => log::debug!("Loaded classifier '{name}' from {}", path.display()),
        }
        self.insert(handle);
        loaded
    }

    /// Loads every catalog classifier from `directory`.
    ///
    /// Missing weight files are synthesized on disk from fresh initialization
    /// and marked as untrained. Fails with
    /// [`CoreError::CapabilityUnavailable`] when the backend cannot run.
    pub fn load_all(&mut self, directory: &Path) -> CoreResult<BTreeMap<String, bool>> {
        if !self.capability.is_available() {
            return Err(CoreError::CapabilityUnavailable(
                self.capability
                    .reason()
                    .unwrap_or("classifier backend unavailable")
                    .to_string(),
            ));
        }

        std::fs::create_dir_all(directory)?;

        let mut outcome = BTreeMap::new();
        for arch in CATALOG {
            let path = directory.join(arch.weight_file());
            let loaded = self.register_and_load(arch.name(), &path);
            outcome.insert(arch.name().to_string(), loaded);
        }

        log::info!(
            "Loaded {}/{} classifiers from {}",
            self.loaded_names().len(),
            CATALOG.len(),
            directory.display()
        );
        Ok(outcome)
    }

    /// Scores `input` with the named classifier.
    pub fn score(&self, name: &str, input: &ImageTensor) -> CoreResult<ClassifierOutput> {
        let classifier = self
            .handles
            .iter()
            .find(|h| h.name == name && h.loaded)
            .and_then(|h| h.classifier.as_ref())
            .ok_or_else(|| CoreError::ClassifierUnavailable(name.to_string()))?;
        classifier.score(input)
    }

    /// Runs every loaded classifier on `input`. Failures become error records.
    pub fn predict_all(&self, input: &ImageTensor) -> Vec<PredictionRecord> {
        self.predict_where(input, |_| true)
    }

    /// Runs the loaded classifiers among `names` on `input`.
    pub fn predict_named(&self, input: &ImageTensor, names: &[String]) -> Vec<PredictionRecord> {
        self.predict_where(input, |name| names.iter().any(|n| n == name))
    }

    fn predict_where(
        &self,
        input: &ImageTensor,
        include: impl Fn(&str) -> bool,
    ) -> Vec<PredictionRecord> {
        self.handles
            .iter()
            .filter(|h| h.loaded && include(&h.name))
            .map(|h| match self.score(&h.name, input) {
                Ok(output) => {
                    let record = PredictionRecord::scored(&h.name, output.fake_probability);
                    match output.real_probability {
                        Some(real) => record.with_real_probability(real),
                        None => record,
                    }
                }
                Err(e) => {
                    log::warn!("Classifier '{}' failed: {e}", h.name);
                    PredictionRecord::from_error(&h.name, &e)
                }
            })
            .collect()
    }

    pub fn handles(&self) -> &[ClassifierHandle] {
        &self.handles
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| h.loaded)
            .map(|h| h.name.clone())
            .collect()
    }

    pub fn has_loaded(&self) -> bool {
        self.handles.iter().any(|h| h.loaded)
    }

    pub fn is_untrained(&self, name: &str) -> bool {
        self.handles
            .iter()
            .any(|h| h.name == name && h.weights_initialized)
    }

    fn insert(&mut self, handle: ClassifierHandle) {
        match self.handles.iter_mut().find(|h| h.name == handle.name) {
            Some(existing) => *existing = handle,
            None => self.handles.push(handle),
        }
    }

    fn build_handle(&self, name: &str, path: &Path) -> ClassifierHandle {
        if !self.capability.is_available() {
            return ClassifierHandle::failed(
                name,
                CoreError::CapabilityUnavailable(
                    self.capability.reason().unwrap_or_default().to_string(),
                ),
            );
        }

        let Some(arch) = Architecture::from_name(name) else {
            return ClassifierHandle::failed(name, format!("unknown architecture '{name}'"));
        };

        match construct(arch, path, &self.capability) {
            Ok((classifier, weights_initialized)) => {
                if weights_initialized && self.policy == UntrainedWeightsPolicy::Skip {
                    return ClassifierHandle::failed(
                        name,
                        "no trained weights and untrained classifiers are skipped",
                    );
                }
                ClassifierHandle {
                    name: name.to_string(),
                    loaded: true,
                    load_error: None,
                    weights_initialized,
                    classifier: Some(classifier),
                }
            }
            Err(e) => ClassifierHandle::failed(name, e),
        }
    }
}

/// Path of the untrained marker that belongs to a weight file.
pub(crate) fn untrained_marker(weights: &Path) -> PathBuf {
    let stem = weights
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(WEIGHT_FILE_SUFFIX))
        .unwrap_or("classifier");
    weights.with_file_name(format!("{stem}{UNTRAINED_MARKER_SUFFIX}"))
}

#[cfg(feature = "classifiers")]
fn construct(
    arch: Architecture,
    path: &Path,
    capability: &Capability,
) -> CoreResult<(Arc<dyn Classifier>, bool)> {
    models::load_or_initialize(arch, path, capability.device())
}

#[cfg(not(feature = "classifiers"))]
fn construct(
    _arch: Architecture,
    _path: &Path,
    _capability: &Capability,
) -> CoreResult<(Arc<dyn Classifier>, bool)> {
    Err(CoreError::CapabilityUnavailable(
        "built without the 'classifiers' feature".to_string(),
    ))
}
