// ============================================================================
// deepsecure-core/src/preprocessing.rs
// ============================================================================
//
// PREPROCESSING: Image to Normalized Classifier Input
//
// Every classifier consumes the same input: a 224x224 RGB raster scaled to
// [0, 1], normalized per channel with ImageNet statistics, laid out as
// [1, 3, H, W]. The conversion is pure, so repeated calls are bit-identical.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::config::MODEL_INPUT_SIZE;

/// Per-channel mean of the training distribution (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the training distribution (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Dense `f32` tensor in NCHW layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    pub fn height(&self) -> usize {
        self.shape[2]
    }

    pub fn width(&self) -> usize {
        self.shape[3]
    }

    /// Value at channel `c`, row `y`, column `x` of the first batch entry.
    pub fn at(&self, c: usize, y: usize, x: usize) -> f32 {
        let plane = self.height() * self.width();
        self.data[c * plane + y * self.width() + x]
    }
}

/// Converts a decoded image into the normalized classifier input.
pub fn preprocess(image: &DynamicImage) -> ImageTensor {
    let resized = image
        .resize_exact(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();
    rgb8_to_normalized_nchw(&resized)
}

fn rgb8_to_normalized_nchw(img: &RgbImage) -> ImageTensor {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; plane * 3];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * w + x) as usize;
        for c in 0..3 {
            let scaled = pixel[c] as f32 / 255.0;
            data[idx + plane * c] = (scaled - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    ImageTensor {
        shape: [1, 3, h as usize, w as usize],
        data,
    }
}
