//! Image decoding.
//!
//! The format is sniffed from the file contents rather than the extension,
//! so transport temp files with arbitrary names still decode.

use image::{DynamicImage, ImageReader};
use std::path::Path;

use crate::error::{CoreResult, media_unreadable};

/// Decodes the image at `path`.
pub fn load_image(path: &Path) -> CoreResult<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| media_unreadable(path, e))?
        .with_guessed_format()
        .map_err(|e| media_unreadable(path, e))?;

    let image = reader.decode().map_err(|e| media_unreadable(path, e))?;
    log::debug!(
        "Decoded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}
