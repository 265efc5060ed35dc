//! Image loading for OCR: from a file on disk or from a raw clipboard bitmap.
//!
//! Clipboard bitmaps are round-tripped through a transient PNG so they go through
//! the same decoder as imported files. The temp file is owned by a [`TempArtifact`]
//! and removed on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, ImageFormat, RgbaImage};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

const TEMP_PREFIX: &str = "snip_temp_";
const TEMP_SUFFIX: &str = ".png";

#[derive(Error, Debug)]
pub enum ImageSourceError {
    #[error("Image file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to create temporary image file: {0}")]
    TempFile(#[from] std::io::Error),
}

/// Uncompressed RGBA8 bitmap as read from the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBitmap {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

impl RawBitmap {
    pub fn new(width: usize, height: usize, bytes: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes,
        }
    }

    /// A bitmap with zero area or no pixel data counts as "no image".
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.bytes.is_empty()
    }

    /// Pixel bytes, or `None` when the buffer doesn't match the stated dimensions.
    pub fn pixel_bytes(&self) -> Option<&[u8]> {
        let expected = self.width.checked_mul(self.height)?.checked_mul(4)?;
        (self.bytes.len() == expected).then_some(self.bytes.as_slice())
    }

    fn to_rgba_image(&self) -> Result<RgbaImage, ImageSourceError> {
        let width = u32::try_from(self.width)
            .map_err(|_| ImageSourceError::Decode(format!("width {} too large", self.width)))?;
        let height = u32::try_from(self.height)
            .map_err(|_| ImageSourceError::Decode(format!("height {} too large", self.height)))?;
        RgbaImage::from_raw(width, height, self.bytes.clone()).ok_or_else(|| {
            ImageSourceError::Decode(format!(
                "bitmap buffer of {} bytes does not fit {}x{} RGBA",
                self.bytes.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// A transient file that is deleted when this value goes out of scope.
///
/// Call [`TempArtifact::close`] to delete it eagerly; a failed delete is logged and
/// never returned to the caller.
pub struct TempArtifact {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl TempArtifact {
    /// Creates an empty PNG temp file in the OS temp directory.
    pub fn create() -> Result<Self, ImageSourceError> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(dir: impl AsRef<Path>) -> Result<Self, ImageSourceError> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)?;
        let path = file.path().to_path_buf();
        debug!(path = %path.display(), "Created temp artifact");
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes `image` as PNG into the temp file and flushes it.
    pub fn write_png(&mut self, image: &DynamicImage) -> Result<(), ImageSourceError> {
        let Some(file) = self.file.as_mut() else {
            return Err(ImageSourceError::TempFile(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "temp artifact already closed",
            )));
        };
        image
            .write_to(file.as_file_mut(), ImageFormat::Png)
            .map_err(|e| ImageSourceError::Decode(format!("Failed to encode PNG: {e}")))?;
        file.flush()?;

        let written = file.as_file().metadata().map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(ImageSourceError::Decode(
                "Temp file was not created properly".to_string(),
            ));
        }
        debug!(bytes = written, path = %self.path.display(), "Wrote temp PNG");
        Ok(())
    }

    /// Deletes the file now.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => debug!(path = %self.path.display(), "Cleaned up temp file"),
            Err(e) => warn!(error = %e, path = %self.path.display(), "Could not remove temp file"),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Loads and decodes an image file.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<DynamicImage, ImageSourceError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ImageSourceError::NotFound(path.to_path_buf()));
    }

    let image = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            ImageSourceError::NotFound(path.to_path_buf())
        }
        other => ImageSourceError::Decode(other.to_string()),
    })?;

    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Loaded image file"
    );
    Ok(image)
}

/// Decodes a clipboard bitmap via a temp PNG in the OS temp directory.
pub fn load_from_bitmap(bitmap: &RawBitmap) -> Result<DynamicImage, ImageSourceError> {
    load_from_bitmap_in(std::env::temp_dir(), bitmap)
}

/// Same as [`load_from_bitmap`], with the temp file placed in `dir`.
///
/// The returned image is always single-channel grayscale or 8-bit RGB.
pub fn load_from_bitmap_in(
    dir: impl AsRef<Path>,
    bitmap: &RawBitmap,
) -> Result<DynamicImage, ImageSourceError> {
    if bitmap.is_empty() {
        return Err(ImageSourceError::Decode("clipboard bitmap is empty".to_string()));
    }
    let rgba = DynamicImage::ImageRgba8(bitmap.to_rgba_image()?);

    let mut artifact = TempArtifact::create_in(dir)?;
    artifact.write_png(&rgba)?;

    let decoded = image::open(artifact.path())
        .map_err(|e| ImageSourceError::Decode(e.to_string()))?;
    artifact.close();

    Ok(normalize_color(decoded))
}

/// Converts anything other than L8 or RGB8 to RGB8.
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => image,
        other => {
            debug!(color = ?other, "Converting image to RGB for OCR");
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
    }
}
