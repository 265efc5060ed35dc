//! System interactions (clipboard, snip helper, OCR)

mod clipboard;
mod ocr;
mod screenshot;

pub use clipboard::{images_equal, BitmapFingerprint, ClipboardError, ClipboardSource, SystemClipboard};
pub use ocr::{
    classify_first_attempt, decide, is_language_resource_error, FallbackNotes, FirstAttempt,
    LanguagePreferences, OcrBackend, OcrEngine, OcrError, OcrResult, TesseractBackend,
};
pub use screenshot::{default_snip_command, LaunchError, SnipLauncher, SystemSnipTool};
