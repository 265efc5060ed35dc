//! Clipboard bitmap access.
//!
//! The capture session only needs two operations on the shared system clipboard:
//! read the current bitmap and clear it. [`ClipboardSource`] isolates those so the
//! session can be driven by a scripted clipboard in tests.

use arboard::Clipboard;
use thiserror::Error;
use tracing::{debug, warn};

use crate::image_source::RawBitmap;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("Clipboard operation failed: {0}")]
    Operation(String),
}

/// Read/clear access to a clipboard that may contain a bitmap.
pub trait ClipboardSource {
    /// The current bitmap, or `None` when the clipboard holds no image.
    fn read_bitmap(&mut self) -> Result<Option<RawBitmap>, ClipboardError>;

    fn clear(&mut self) -> Result<(), ClipboardError>;
}

/// The OS clipboard via `arboard`.
///
/// A fresh `arboard::Clipboard` is opened per call; holding one open across the
/// armed window can block other writers on some X11 setups.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }

    fn open() -> Result<Clipboard, ClipboardError> {
        Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_bitmap(&mut self) -> Result<Option<RawBitmap>, ClipboardError> {
        let mut clipboard = Self::open()?;
        match clipboard.get_image() {
            Ok(data) => {
                let bitmap = RawBitmap::new(data.width, data.height, data.bytes.into_owned());
                // Sizes only; clipboard content never goes into logs.
                debug!(
                    width = bitmap.width,
                    height = bitmap.height,
                    bytes = bitmap.bytes.len(),
                    "Read bitmap from clipboard"
                );
                Ok(Some(bitmap))
            }
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Operation(e.to_string())),
        }
    }

    fn clear(&mut self) -> Result<(), ClipboardError> {
        let mut clipboard = Self::open()?;
        clipboard.clear().map_err(|e| {
            warn!(error = %e, "Failed to clear clipboard");
            ClipboardError::Operation(e.to_string())
        })?;
        debug!("Cleared clipboard");
        Ok(())
    }
}

/// Equality used for change detection.
///
/// Two missing/empty bitmaps are equal; missing vs present is unequal; different
/// dimensions are unequal. Otherwise the pixel bytes are compared exactly, and a
/// buffer that can't be read as `width * height` RGBA pixels compares unequal.
pub fn images_equal(a: Option<&RawBitmap>, b: Option<&RawBitmap>) -> bool {
    let a = a.filter(|bm| !bm.is_empty());
    let b = b.filter(|bm| !bm.is_empty());
    match (a, b) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(a), Some(b)) => {
            if (a.width, a.height) != (b.width, b.height) {
                return false;
            }
            match (a.pixel_bytes(), b.pixel_bytes()) {
                (Some(pa), Some(pb)) => pa == pb,
                _ => false,
            }
        }
    }
}

/// Equality key for a clipboard bitmap, taken when a capture is armed.
#[derive(Debug, Clone, Default)]
pub struct BitmapFingerprint(Option<RawBitmap>);

impl BitmapFingerprint {
    pub fn of(bitmap: Option<&RawBitmap>) -> Self {
        Self(bitmap.filter(|bm| !bm.is_empty()).cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn matches(&self, bitmap: Option<&RawBitmap>) -> bool {
        images_equal(self.0.as_ref(), bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(width: usize, height: usize, fill: u8) -> RawBitmap {
        RawBitmap::new(width, height, vec![fill; width * height * 4])
    }

    #[test]
    fn test_identical_bitmaps_are_equal() {
        let a = bitmap(4, 3, 9);
        let b = bitmap(4, 3, 9);
        assert!(images_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn test_dimension_mismatch_is_unequal() {
        // Same byte count, different shape.
        let a = bitmap(4, 3, 9);
        let b = bitmap(3, 4, 9);
        assert!(!images_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn test_single_byte_difference_is_unequal() {
        let a = bitmap(2, 2, 0);
        let mut b = a.clone();
        b.bytes[15] = 1;
        assert!(!images_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn test_null_handling() {
        let empty = RawBitmap::new(0, 0, Vec::new());
        let some = bitmap(1, 1, 0);
        assert!(images_equal(None, None));
        assert!(images_equal(None, Some(&empty)));
        assert!(!images_equal(None, Some(&some)));
        assert!(!images_equal(Some(&some), None));
    }

    #[test]
    fn test_unreadable_buffer_is_unequal() {
        let truncated = RawBitmap::new(2, 2, vec![0; 3]);
        assert!(!images_equal(Some(&truncated), Some(&truncated.clone())));
    }

    #[test]
    fn test_fingerprint_matches() {
        let base = bitmap(2, 2, 5);
        let fp = BitmapFingerprint::of(Some(&base));
        assert!(fp.matches(Some(&base)));
        assert!(!fp.matches(Some(&bitmap(2, 2, 6))));
        assert!(!fp.matches(None));
        assert!(BitmapFingerprint::of(None).matches(None));
    }
}
