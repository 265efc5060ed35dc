//! OCR via the local `tesseract` executable.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, error};

use super::{OcrBackend, OcrError};
use crate::image_source::TempArtifact;

#[derive(Debug, Clone)]
pub struct TesseractBackend {
    command: PathBuf,
    tessdata_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl TesseractBackend {
    pub fn new(command: impl Into<PathBuf>, tessdata_dir: Option<PathBuf>) -> Self {
        Self {
            command: command.into(),
            tessdata_dir,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for the PNG handed to tesseract.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd
    }

    /// Installed language models as reported by `tesseract --list-langs`.
    pub fn available_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = self
            .base_command()
            .arg("--list-langs")
            .output()
            .map_err(|e| self.launch_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Backend(format!(
                "tesseract --list-langs failed: {}",
                stderr.trim()
            )));
        }
        Ok(parse_list_langs(&String::from_utf8_lossy(&output.stdout)))
    }

    fn launch_error(&self, e: std::io::Error) -> OcrError {
        error!(error = %e, command = %self.command.display(), "Failed to execute tesseract");
        OcrError::Launch(format!(
            "Failed to run {} (is tesseract installed?): {e}",
            self.command.display()
        ))
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new("tesseract", None)
    }
}

impl OcrBackend for TesseractBackend {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError> {
        let mut artifact = TempArtifact::create_in(&self.temp_dir)
            .map_err(|e| OcrError::Encode(e.to_string()))?;
        artifact
            .write_png(image)
            .map_err(|e| OcrError::Encode(e.to_string()))?;

        debug!(lang = language, image = %artifact.path().display(), "Running tesseract");
        let output = self
            .base_command()
            .arg(artifact.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .map_err(|e| self.launch_error(e))?;
        artifact.close();

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "tesseract stderr");
        }

        // A partially missing model still exits 0 on some versions; treat it as failure.
        if !output.status.success() || reports_failed_language_load(&stderr) {
            let exit_code = output.status.code().unwrap_or(-1);
            let message = if stderr.trim().is_empty() {
                format!("tesseract failed with exit code {exit_code}")
            } else {
                stderr.trim().to_string()
            };
            error!(code = exit_code, lang = language, "Text extraction failed");
            return Err(OcrError::Backend(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

fn reports_failed_language_load(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("failed loading language") || lower.contains("couldn't load any languages")
}

fn parse_list_langs(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}
