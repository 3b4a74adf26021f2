// ============================================================================
// deepsecure-core/src/classifiers/models.rs
// ============================================================================
//
// CLASSIFIER ARCHITECTURES: candle Networks Behind the Classifier Trait
//
// All three architectures share a small strided convolutional backbone and
// differ only in the head. Weights live in one safetensors file per
// classifier, keyed by the VarBuilder paths used below.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use candle_core::{D, DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder, VarMap, conv2d, linear};
use sha2::{Digest, Sha256};

use super::{Architecture, Classifier, ClassifierOutput, untrained_marker};
use crate::error::CoreResult;
use crate::preprocessing::ImageTensor;

/// Channel count of the backbone's final feature map.
const FEATURE_CHANNELS: usize = 64;

/// Constructs `arch` and fills it from `path`.
///
/// When the file is missing the freshly initialized parameters are written to
/// `path` together with an untrained marker holding the file's SHA-256, so
/// later runs load the same parameters and still report them as untrained.
/// A marker whose digest no longer matches the weight file is stale and is
/// removed. Returns the classifier and whether it runs on initialized weights.
pub(super) fn load_or_initialize(
    arch: Architecture,
    path: &Path,
    device: &Device,
) -> CoreResult<(Arc<dyn Classifier>, bool)> {
    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

    let classifier: Arc<dyn Classifier> = match arch {
        Architecture::FaceForensics => Arc::new(BinarySoftmaxNet::new(vb, &[512], device)?),
        Architecture::CelebDf => Arc::new(BinarySoftmaxNet::new(vb, &[512, 256], device)?),
        Architecture::Dfdc => Arc::new(AttentionNet::new(vb, device)?),
    };

    let marker = untrained_marker(path);
    let weights_initialized = if path.exists() {
        varmap.load(path)?;
        let synthesized = marker_matches(&marker, path)?;
        if synthesized {
            log::warn!(
                "Classifier '{arch}' loaded weights synthesized by an earlier run from {}",
                path.display()
            );
        }
        synthesized
    } else {
        log::warn!(
            "No weights for '{arch}' at {}; initializing untrained parameters",
            path.display()
        );
        if let Err(e) = persist_initialized(&varmap, path, &marker) {
            log::warn!(
                "Could not write initialized weights for '{arch}' to {}: {e}",
                path.display()
            );
        }
        true
    };

    Ok((classifier, weights_initialized))
}

fn persist_initialized(varmap: &VarMap, path: &Path, marker: &Path) -> CoreResult<()> {
    varmap.save(path)?;
    std::fs::write(marker, format!("{}\n", compute_sha256(path)?))?;
    log::info!("Synthesized initialized weights at {}", path.display());
    Ok(())
}

/// Whether `marker` exists and records the current digest of `weights`.
fn marker_matches(marker: &Path, weights: &Path) -> CoreResult<bool> {
    let Ok(recorded) = std::fs::read_to_string(marker) else {
        return Ok(false);
    };
    if recorded.trim() == compute_sha256(weights)? {
        return Ok(true);
    }

    log::info!(
        "Weights at {} were replaced since they were synthesized; removing stale marker {}",
        weights.display(),
        marker.display()
    );
    if let Err(e) = std::fs::remove_file(marker) {
        log::warn!("Could not remove {}: {e}", marker.display());
    }
    Ok(false)
}

/// SHA-256 of a file as a lowercase hex string.
fn compute_sha256(path: &Path) -> CoreResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn input_tensor(input: &ImageTensor, device: &Device) -> candle_core::Result<Tensor> {
    let [n, c, h, w] = input.shape;
    Tensor::from_slice(&input.data, (n, c, h, w), device)
}

/// Three stride-2 3x3 convolutions: 224 -> 112 -> 56 -> 28.
struct Backbone {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
}

impl Backbone {
    fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        Ok(Self {
            conv1: conv2d(3, 16, 3, cfg, vb.pp("conv1"))?,
            conv2: conv2d(16, 32, 3, cfg, vb.pp("conv2"))?,
            conv3: conv2d(32, FEATURE_CHANNELS, 3, cfg, vb.pp("conv3"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.conv1.forward(xs)?.relu()?;
        let xs = self.conv2.forward(&xs)?.relu()?;
        self.conv3.forward(&xs)?.relu()
    }
}

/// Backbone, global average pool, MLP head, two-class softmax.
/// Class 0 is real, class 1 is fake.
struct BinarySoftmaxNet {
    backbone: Backbone,
    hidden: Vec<Linear>,
    output: Linear,
    device: Device,
}

impl BinarySoftmaxNet {
    fn new(vb: VarBuilder, hidden_sizes: &[usize], device: &Device) -> candle_core::Result<Self> {
        let backbone = Backbone::new(vb.pp("backbone"))?;
        let mut hidden = Vec::with_capacity(hidden_sizes.len());
        let mut width = FEATURE_CHANNELS;
        for (i, &size) in hidden_sizes.iter().enumerate() {
            hidden.push(linear(width, size, vb.pp(format!("head.hidden{i}")))?);
            width = size;
        }
        let output = linear(width, 2, vb.pp("head.output"))?;
        Ok(Self {
            backbone,
            hidden,
            output,
            device: device.clone(),
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = self.backbone.forward(xs)?.mean((2, 3))?;
        for layer in &self.hidden {
            xs = layer.forward(&xs)?.relu()?;
        }
        let logits = self.output.forward(&xs)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }
}

impl Classifier for BinarySoftmaxNet {
    fn score(&self, input: &ImageTensor) -> CoreResult<ClassifierOutput> {
        let xs = input_tensor(input, &self.device)?;
        let probs = self.forward(&xs)?.to_vec2::<f32>()?;
        let row = probs.first().map(Vec::as_slice).unwrap_or_default();
        match row {
            [real, fake] => Ok(ClassifierOutput {
                fake_probability: *fake as f64,
                real_probability: Some(*real as f64),
            }),
            _ => Err(crate::error::CoreError::Backend(format!(
                "expected two class probabilities, got {}",
                row.len()
            ))),
        }
    }
}

/// Backbone whose feature map is gated by a learned 1x1 spatial attention
/// mask before pooling, followed by a single sigmoid output.
struct AttentionNet {
    backbone: Backbone,
    attention_reduce: Conv2d,
    attention_mask: Conv2d,
    classifier: Linear,
    device: Device,
}

impl AttentionNet {
    fn new(vb: VarBuilder, device: &Device) -> candle_core::Result<Self> {
        let pointwise = Conv2dConfig::default();
        Ok(Self {
            backbone: Backbone::new(vb.pp("backbone"))?,
            attention_reduce: conv2d(FEATURE_CHANNELS, 32, 1, pointwise, vb.pp("attention.reduce"))?,
            attention_mask: conv2d(32, 1, 1, pointwise, vb.pp("attention.mask"))?,
            classifier: linear(FEATURE_CHANNELS, 1, vb.pp("head.output"))?,
            device: device.clone(),
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.backbone.forward(xs)?;
        let attention = self.attention_reduce.forward(&features)?.relu()?;
        let attention = candle_nn::ops::sigmoid(&self.attention_mask.forward(&attention)?)?;
        let pooled = features.broadcast_mul(&attention)?.mean((2, 3))?;
        candle_nn::ops::sigmoid(&self.classifier.forward(&pooled)?)
    }
}

impl Classifier for AttentionNet {
    fn score(&self, input: &ImageTensor) -> CoreResult<ClassifierOutput> {
        let xs = input_tensor(input, &self.device)?;
        let out = self.forward(&xs)?.flatten_all()?.to_vec1::<f32>()?;
        let fake = out.first().copied().ok_or_else(|| {
            crate::error::CoreError::Backend("attention head produced no output".to_string())
        })?;
        Ok(ClassifierOutput {
            fake_probability: fake as f64,
            real_probability: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::preprocess;
    use image::{DynamicImage, Rgb, RgbImage};

    fn sample_input() -> ImageTensor {
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 90]));
        preprocess(&DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn test_missing_weights_are_synthesized_and_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Architecture::FaceForensics.weight_file());

        let (_, initialized) =
            load_or_initialize(Architecture::FaceForensics, &path, &Device::Cpu).unwrap();
        assert!(initialized);
        assert!(path.exists());
        assert!(untrained_marker(&path).exists());

        // Reloading the synthesized file keeps the untrained flag.
        let (_, initialized) =
            load_or_initialize(Architecture::FaceForensics, &path, &Device::Cpu).unwrap();
        assert!(initialized);
    }

    #[test]
    fn test_marker_records_weight_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Architecture::Dfdc.weight_file());
        load_or_initialize(Architecture::Dfdc, &path, &Device::Cpu).unwrap();

        let recorded = std::fs::read_to_string(untrained_marker(&path)).unwrap();
        assert_eq!(recorded.trim(), compute_sha256(&path).unwrap());
        assert_eq!(recorded.trim().len(), 64);
    }

    #[test]
    fn test_replaced_weights_count_as_trained() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Architecture::FaceForensics.weight_file());
        let (_, initialized) =
            load_or_initialize(Architecture::FaceForensics, &path, &Device::Cpu).unwrap();
        assert!(initialized);

        // Drop a different parameter set over the synthesized file.
        let other_dir = tempfile::tempdir().unwrap();
        let other = other_dir.path().join(Architecture::FaceForensics.weight_file());
        load_or_initialize(Architecture::FaceForensics, &other, &Device::Cpu).unwrap();
        std::fs::copy(&other, &path).unwrap();

        let (_, initialized) =
            load_or_initialize(Architecture::FaceForensics, &path, &Device::Cpu).unwrap();
        assert!(!initialized);
        assert!(!untrained_marker(&path).exists());
    }

    #[test]
    fn test_reloaded_weights_score_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Architecture::Dfdc.weight_file());
        let input = sample_input();

        let (first, _) = load_or_initialize(Architecture::Dfdc, &path, &Device::Cpu).unwrap();
        let (second, _) = load_or_initialize(Architecture::Dfdc, &path, &Device::Cpu).unwrap();

        let a = first.score(&input).unwrap();
        let b = second.score(&input).unwrap();
        assert!((a.fake_probability - b.fake_probability).abs() < 1e-6);
        assert!(a.real_probability.is_none());
    }

    #[test]
    fn test_softmax_heads_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_input();

        for arch in [Architecture::FaceForensics, Architecture::CelebDf] {
            let path = dir.path().join(arch.weight_file());
            let (classifier, _) = load_or_initialize(arch, &path, &Device::Cpu).unwrap();
            let output = classifier.score(&input).unwrap();
            let real = output.real_probability.unwrap();
            assert!((0.0..=1.0).contains(&output.fake_probability));
            assert!((output.fake_probability + real - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mismatched_weight_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let dfdc_path = dir.path().join(Architecture::Dfdc.weight_file());
        load_or_initialize(Architecture::Dfdc, &dfdc_path, &Device::Cpu).unwrap();

        // celebdf has hidden layers that the dfdc file lacks.
        let result = load_or_initialize(Architecture::CelebDf, &dfdc_path, &Device::Cpu);
        assert!(result.is_err());
    }

    #[test]
    fn test_corrupt_weight_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Architecture::FaceForensics.weight_file());
        std::fs::write(&path, b"not a safetensors file").unwrap();
        assert!(load_or_initialize(Architecture::FaceForensics, &path, &Device::Cpu).is_err());
    }
}
