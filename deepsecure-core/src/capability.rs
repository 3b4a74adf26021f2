// ============================================================================
// deepsecure-core/src/capability.rs
// ============================================================================
//
// CAPABILITY PROBE: Learned Classifier Availability
//
// Decides once, at engine construction, whether the learned classifier
// family can run and on which device. An unavailable backend is not an
// error: the engine falls back to the heuristic analyzers.

use crate::config::CoreConfig;

/// Outcome of the capability probe.
#[derive(Debug, Clone)]
pub struct Capability {
    available: bool,
    device_name: String,
    reason: Option<String>,
    #[cfg(feature = "classifiers")]
    device: candle_core::Device,
}

impl Capability {
    /// Probes the classifier backend according to `config`.
    pub fn probe(config: &CoreConfig) -> Self {
        if !config.enable_classifiers {
            let capability = Self::unavailable("classifiers disabled by configuration");
            log::info!("Classifier backend disabled; running heuristic-only");
            return capability;
        }
        probe_backend(config.prefer_gpu)
    }

    /// A capability that reports the backend as unusable.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            device_name: "cpu".to_string(),
            reason: Some(reason.into()),
            #[cfg(feature = "classifiers")]
            device: candle_core::Device::Cpu,
        }
    }

    /// A usable CPU capability.
    #[cfg(feature = "classifiers")]
    pub fn cpu() -> Self {
        Self {
            available: true,
            device_name: "cpu".to_string(),
            reason: None,
            device: candle_core::Device::Cpu,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Device descriptor, `cpu` or `cuda:N`.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Why the backend is unavailable, if it is.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    #[cfg(feature = "classifiers")]
    pub(crate) fn device(&self) -> &candle_core::Device {
        &self.device
    }
}

#[cfg(feature = "classifiers")]
fn probe_backend(prefer_gpu: bool) -> Capability {
    use candle_core::{DType, Device, Tensor};

    let (device, device_name) = if prefer_gpu && candle_core::utils::cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => (device, "cuda:0".to_string()),
            Err(e) => {
                log::warn!("CUDA device initialization failed, using CPU: {e}");
                (Device::Cpu, "cpu".to_string())
            }
        }
    } else {
        (Device::Cpu, "cpu".to_string())
    };

    // A trivial allocation confirms the device actually works.
    if let Err(e) = Tensor::zeros(1, DType::F32, &device) {
        let reason = format!("tensor allocation on {device_name} failed: {e}");
        log::warn!("Classifier backend unavailable: {reason}");
        return Capability::unavailable(reason);
    }

    log::info!("Classifier backend available on {device_name}");
    Capability {
        available: true,
        device_name,
        reason: None,
        device,
    }
}

#[cfg(not(feature = "classifiers"))]
fn probe_backend(_prefer_gpu: bool) -> Capability {
    let reason = "built without the 'classifiers' feature";
    log::warn!("Classifier backend unavailable: {reason}");
    Capability::unavailable(reason)
}
