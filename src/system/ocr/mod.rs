//! OCR (Optical Character Recognition) with a language fallback policy.
//!
//! Recognition is tried with the richest language preference first (e.g. `eng+pol`).
//! If that fails because a language model is missing, or yields nothing usable,
//! a single retry with the primary language runs. There is never more than one retry.

mod tesseract;

pub use tesseract::TesseractBackend;

use std::path::PathBuf;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const TESSDATA_DOWNLOAD_BASE: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("{0}")]
    Launch(String),
    #[error("{0}")]
    Backend(String),
    #[error("Failed to prepare image for OCR: {0}")]
    Encode(String),
    #[error("No OCR languages configured")]
    NoLanguages,
}

/// A local text-recognition call for one language model identifier.
pub trait OcrBackend {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError>;
}

/// Language models to try, richest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePreferences {
    richest: String,
    fallback: String,
}

impl LanguagePreferences {
    /// Takes the first entry as the richest model and the second as the primary-only
    /// fallback. With a single entry both attempts use it.
    pub fn new<I, S>(ordered: I) -> Result<Self, OcrError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut langs = ordered
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty());
        let richest = langs.next().ok_or(OcrError::NoLanguages)?;
        let fallback = langs.next().unwrap_or_else(|| richest.clone());
        Ok(Self { richest, fallback })
    }

    pub fn richest(&self) -> &str {
        &self.richest
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Language codes in the richest model that the fallback drops (`pol` for `eng+pol` -> `eng`).
    pub fn secondary_codes(&self) -> Vec<&str> {
        let primary: Vec<&str> = split_codes(&self.fallback).collect();
        split_codes(&self.richest)
            .filter(|code| !primary.contains(code))
            .collect()
    }
}

impl Default for LanguagePreferences {
    fn default() -> Self {
        Self {
            richest: "eng+pol".to_string(),
            fallback: "eng".to_string(),
        }
    }
}

fn split_codes(langs: &str) -> impl Iterator<Item = &str> {
    langs.split(['+', ',', ' ']).map(str::trim).filter(|c| !c.is_empty())
}

/// Outcome of one OCR request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum OcrResult {
    Text(String),
    Degraded {
        text: String,
        reason: String,
        remediation: String,
    },
    Failure {
        reason: String,
    },
}

impl OcrResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Degraded { text, .. } => Some(text),
            Self::Failure { .. } => None,
        }
    }

    /// Text block shown to the user.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Degraded {
                text,
                reason,
                remediation,
            } => format!(
                "[INFO] {reason}.\n{remediation}\n\n{}\n\n{text}",
                "=".repeat(50)
            ),
            Self::Failure { reason } => format!("[ERROR] {reason}"),
        }
    }
}

/// How the first (richest) attempt went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstAttempt {
    Usable(String),
    /// Failed with an error that looks like a missing language model.
    LanguageMissing(String),
    /// Failed for another reason, or produced only whitespace.
    Unusable,
}

/// Whether an error message points at a missing language resource.
///
/// Known-imprecise: the backend offers no error code, so any message mentioning
/// "language" or one of the secondary codes matches.
pub fn is_language_resource_error(message: &str, secondary_codes: &[&str]) -> bool {
    let lower = message.to_lowercase();
    lower.contains("language")
        || secondary_codes
            .iter()
            .any(|code| lower.contains(&code.to_lowercase()))
}

pub fn classify_first_attempt(
    outcome: Result<String, OcrError>,
    secondary_codes: &[&str],
) -> FirstAttempt {
    match outcome {
        Ok(text) if !text.trim().is_empty() => FirstAttempt::Usable(text),
        Ok(_) => {
            debug!("First OCR attempt returned no text");
            FirstAttempt::Unusable
        }
        Err(e) => {
            let message = e.to_string();
            if is_language_resource_error(&message, secondary_codes) {
                FirstAttempt::LanguageMissing(message)
            } else {
                warn!(error = %message, "First OCR attempt failed");
                FirstAttempt::Unusable
            }
        }
    }
}

/// Everything the decision needs besides the two outcomes.
#[derive(Debug, Clone)]
pub struct FallbackNotes {
    pub fallback: String,
    pub secondary_codes: Vec<String>,
    pub tessdata_dir: PathBuf,
}

impl FallbackNotes {
    fn degraded_reason(&self) -> String {
        let missing = if self.secondary_codes.is_empty() {
            "secondary".to_string()
        } else {
            self.secondary_codes.join("+")
        };
        format!(
            "{missing} language model unavailable, using {} only",
            self.fallback
        )
    }

    fn remediation(&self) -> String {
        let dir = self.tessdata_dir.display();
        if self.secondary_codes.is_empty() {
            return format!(
                "Install the missing language traineddata into: {dir}\nThen restart this app"
            );
        }
        self.secondary_codes
            .iter()
            .map(|code| {
                format!(
                    "To add {code} support:\n\
                     1. Download: {TESSDATA_DOWNLOAD_BASE}/{code}.traineddata\n\
                     2. Save to: {dir}\n\
                     3. Restart this app"
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Combines the first attempt and the (optional) primary-only retry into one result.
pub fn decide(
    first: FirstAttempt,
    retry: Option<Result<String, OcrError>>,
    notes: &FallbackNotes,
) -> OcrResult {
    match (first, retry) {
        (FirstAttempt::Usable(text), _) => OcrResult::Text(text),
        (FirstAttempt::LanguageMissing(_) | FirstAttempt::Unusable, Some(Ok(text)))
            if text.trim().is_empty() =>
        {
            OcrResult::Failure {
                reason: "No text recognized in image".to_string(),
            }
        }
        (FirstAttempt::LanguageMissing(_), Some(Ok(text))) => OcrResult::Degraded {
            text,
            reason: notes.degraded_reason(),
            remediation: notes.remediation(),
        },
        (FirstAttempt::LanguageMissing(_), Some(Err(e))) => OcrResult::Failure {
            reason: format!("Failed with {} too: {e}", notes.fallback),
        },
        (FirstAttempt::Unusable, Some(Ok(text))) => {
            OcrResult::Text(format!("[Using {} only]\n\n{text}", notes.fallback))
        }
        (FirstAttempt::Unusable, Some(Err(e))) => OcrResult::Failure {
            reason: format!("OCR failed: {e}"),
        },
        (FirstAttempt::LanguageMissing(message), None) => OcrResult::Failure {
            reason: format!("OCR failed: {message}"),
        },
        (FirstAttempt::Unusable, None) => OcrResult::Failure {
            reason: "No text recognized in image".to_string(),
        },
    }
}

/// Runs an [`OcrBackend`] under the fallback policy.
pub struct OcrEngine<B> {
    backend: B,
    tessdata_dir: PathBuf,
}

impl<B: OcrBackend> OcrEngine<B> {
    pub fn new(backend: B, tessdata_dir: PathBuf) -> Self {
        Self {
            backend,
            tessdata_dir,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn recognize(&self, image: &DynamicImage, languages: &LanguagePreferences) -> OcrResult {
        let secondary = languages.secondary_codes();
        debug!(
            lang = languages.richest(),
            width = image.width(),
            height = image.height(),
            "Starting OCR"
        );

        let first = classify_first_attempt(
            self.backend.recognize(image, languages.richest()),
            &secondary,
        );

        let retry = match &first {
            FirstAttempt::Usable(_) => None,
            FirstAttempt::LanguageMissing(message) => {
                info!(
                    error = %message,
                    fallback = languages.fallback(),
                    "Language model unavailable, retrying with primary language"
                );
                Some(self.backend.recognize(image, languages.fallback()))
            }
            FirstAttempt::Unusable => {
                debug!(lang = languages.fallback(), "Retrying with primary language only");
                Some(self.backend.recognize(image, languages.fallback()))
            }
        };

        let notes = FallbackNotes {
            fallback: languages.fallback().to_string(),
            secondary_codes: secondary.iter().map(|c| c.to_string()).collect(),
            tessdata_dir: self.tessdata_dir.clone(),
        };
        let result = decide(first, retry, &notes);

        match &result {
            OcrResult::Text(text) => info!(chars = text.len(), "OCR completed"),
            OcrResult::Degraded { text, .. } => {
                info!(chars = text.len(), "OCR completed with reduced language model")
            }
            OcrResult::Failure { reason } => warn!(reason = %reason, "OCR failed"),
        }
        result
    }
}
