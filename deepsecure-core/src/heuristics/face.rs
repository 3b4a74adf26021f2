//! Face detection and the face-consistency signal.
//!
//! The engine only needs face rectangles, so detectors plug in through
//! [`FaceDetector`]. The default, [`SkinToneFaceDetector`], needs no model
//! file: it segments skin-coloured pixels in YCbCr space and keeps connected
//! regions with a face-like size, aspect and fill. Hosts with a learned
//! detector inject it instead.

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::error::CoreResult;

/// Score used when no face is found or the detector fails.
pub const NEUTRAL_FACE_SCORE: f64 = 0.5;

/// Intensity variance mapped to a score of 1.0.
const FACE_VARIANCE_SCALE: f64 = 1000.0;

/// Axis-aligned face rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersects the region with an image of the given size.
    fn clipped(&self, image_width: u32, image_height: u32) -> Option<FaceRegion> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let width = self.width.min(image_width - self.x);
        let height = self.height.min(image_height - self.y);
        (width > 0 && height > 0).then_some(FaceRegion::new(self.x, self.y, width, height))
    }
}

/// Locates faces in an RGB raster.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> CoreResult<Vec<FaceRegion>>;
}

/// Detector that never finds a face. Used until a host injects a real one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(&self, _image: &RgbImage) -> CoreResult<Vec<FaceRegion>> {
        Ok(Vec::new())
    }
}

/// Model-free detector for frontal faces on skin-coloured regions.
#[derive(Debug, Clone, Copy)]
pub struct SkinToneFaceDetector {
    /// Smallest region, as a fraction of the image area.
    pub min_area_fraction: f64,
    /// Smallest region side in pixels.
    pub min_side: u32,
    /// Accepted height / width range of the bounding box.
    pub aspect_range: (f64, f64),
    /// Minimum share of skin pixels inside the bounding box.
    pub min_fill: f64,
}

impl Default for SkinToneFaceDetector {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.005,
            min_side: 16,
            aspect_range: (0.8, 2.2),
            min_fill: 0.45,
        }
    }
}

/// Chroma box for skin in full-range YCbCr.
const SKIN_CB: (f64, f64) = (77.0, 127.0);
const SKIN_CR: (f64, f64) = (133.0, 173.0);
const SKIN_MIN_LUMA: f64 = 40.0;

fn is_skin([r, g, b]: [u8; 3]) -> bool {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    y >= SKIN_MIN_LUMA
        && (SKIN_CB.0..=SKIN_CB.1).contains(&cb)
        && (SKIN_CR.0..=SKIN_CR.1).contains(&cr)
}

/// Bounding box and pixel count of one labelled region.
#[derive(Debug, Clone, Copy)]
struct Blob {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
}

impl Blob {
    fn at(x: u32, y: u32) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y, pixels: 0 }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels += 1;
    }

    fn region(&self) -> FaceRegion {
        FaceRegion::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x + 1,
            self.max_y - self.min_y + 1,
        )
    }
}

impl SkinToneFaceDetector {
    fn accepts(&self, blob: &Blob, image_area: f64) -> bool {
        let region = blob.region();
        let box_area = region.width as f64 * region.height as f64;
        let aspect = region.height as f64 / region.width as f64;
        region.width >= self.min_side
            && region.height >= self.min_side
            && box_area >= self.min_area_fraction * image_area
            && (self.aspect_range.0..=self.aspect_range.1).contains(&aspect)
            && blob.pixels as f64 / box_area >= self.min_fill
    }
}

impl FaceDetector for SkinToneFaceDetector {
    fn detect(&self, image: &RgbImage) -> CoreResult<Vec<FaceRegion>> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }

        let mask = GrayImage::from_fn(w, h, |x, y| {
            Luma([if is_skin(image.get_pixel(x, y).0) { 255 } else { 0 }])
        });
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        // Label 0 is background; labels are dense from 1.
        let mut blobs: Vec<Option<Blob>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0] as usize;
            if label == 0 {
                continue;
            }
            if blobs.len() < label {
                blobs.resize(label, None);
            }
            blobs[label - 1].get_or_insert_with(|| Blob::at(x, y)).add(x, y);
        }

        let image_area = w as f64 * h as f64;
        let mut faces: Vec<(u64, FaceRegion)> = blobs
            .into_iter()
            .flatten()
            .filter(|blob| self.accepts(blob, image_area))
            .map(|blob| (blob.pixels, blob.region()))
            .collect();
        faces.sort_by(|a, b| b.0.cmp(&a.0));
        log::trace!("Skin-tone detector found {} face candidate(s)", faces.len());

        Ok(faces.into_iter().map(|(_, region)| region).collect())
    }
}

/// Mean over faces of `min(intensity_variance / 1000, 1)`. No faces is neutral.
pub fn face_consistency(gray: &GrayImage, faces: &[FaceRegion]) -> f64 {
    let (w, h) = gray.dimensions();
    let scores: Vec<f64> = faces
        .iter()
        .filter_map(|face| face.clipped(w, h))
        .map(|face| (region_variance(gray, &face) / FACE_VARIANCE_SCALE).min(1.0))
        .collect();

    if scores.is_empty() {
        return NEUTRAL_FACE_SCORE;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn region_variance(gray: &GrayImage, face: &FaceRegion) -> f64 {
    let n = (face.width as f64) * (face.height as f64);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in face.y..face.y + face.height {
        for x in face.x..face.x + face.width {
            let v = gray.get_pixel(x, y)[0] as f64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const LIGHT_SKIN: Rgb<u8> = Rgb([240, 190, 160]);
    const DARK_SKIN: Rgb<u8> = Rgb([150, 100, 75]);
    const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);

    /// Dark background with a textured skin-coloured ellipse centred at (64, 64).
    fn portrait(rx: f64, ry: f64, skin: [Rgb<u8>; 2]) -> RgbImage {
        RgbImage::from_fn(128, 128, |x, y| {
            let dx = (x as f64 - 64.0) / rx;
            let dy = (y as f64 - 64.0) / ry;
            if dx * dx + dy * dy <= 1.0 {
                skin[((x + y) % 2) as usize]
            } else {
                BACKGROUND
            }
        })
    }

    #[test]
    fn test_no_faces_is_neutral() {
        let gray = GrayImage::new(32, 32);
        assert_eq!(face_consistency(&gray, &[]), NEUTRAL_FACE_SCORE);
    }

    #[test]
    fn test_flat_face_scores_zero() {
        let gray = GrayImage::from_pixel(32, 32, Luma([120]));
        let score = face_consistency(&gray, &[FaceRegion::new(4, 4, 10, 10)]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_high_contrast_face_saturates() {
        // Checkerboard of 0/255 has variance 255^2/4, far above the scale.
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
        let score = face_consistency(&gray, &[FaceRegion::new(0, 0, 16, 16)]);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_regions_outside_image_are_ignored() {
        let gray = GrayImage::new(8, 8);
        assert_eq!(
            face_consistency(&gray, &[FaceRegion::new(50, 50, 4, 4)]),
            NEUTRAL_FACE_SCORE
        );
    }

    #[test]
    fn test_skin_tone_classification() {
        assert!(is_skin(LIGHT_SKIN.0));
        assert!(is_skin(DARK_SKIN.0));
        assert!(!is_skin(BACKGROUND.0));
        assert!(!is_skin([40, 90, 220]));
    }

    #[test]
    fn test_skin_ellipse_is_detected() {
        let image = portrait(25.0, 35.0, [LIGHT_SKIN, DARK_SKIN]);
        let faces = SkinToneFaceDetector::default().detect(&image).unwrap();
        assert_eq!(faces.len(), 1);
        let face = faces[0];
        assert!((38..=40).contains(&face.x));
        assert!((28..=30).contains(&face.y));
        assert!(face.height > face.width);
    }

    #[test]
    fn test_detected_face_moves_score_off_neutral() {
        let image = portrait(25.0, 35.0, [LIGHT_SKIN, DARK_SKIN]);
        let faces = SkinToneFaceDetector::default().detect(&image).unwrap();
        let gray = image::DynamicImage::ImageRgb8(image).to_luma8();
        let score = face_consistency(&gray, &faces);
        assert!(score > 0.9, "score {score}");
    }

    #[test]
    fn test_non_face_regions_are_rejected() {
        let detector = SkinToneFaceDetector::default();
        // Blue ellipse: right shape, wrong colour.
        let blue = portrait(25.0, 35.0, [Rgb([40, 90, 220]); 2]);
        assert!(detector.detect(&blue).unwrap().is_empty());
        // Wide skin band: right colour, wrong aspect.
        let band = portrait(60.0, 10.0, [LIGHT_SKIN; 2]);
        assert!(detector.detect(&band).unwrap().is_empty());
        // Speck below the minimum size.
        let speck = portrait(3.0, 4.0, [LIGHT_SKIN; 2]);
        assert!(detector.detect(&speck).unwrap().is_empty());
        assert!(detector.detect(&RgbImage::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_null_detector_finds_nothing() {
        let faces = NoFaceDetector.detect(&RgbImage::new(4, 4)).unwrap();
        assert!(faces.is_empty());
    }
}
