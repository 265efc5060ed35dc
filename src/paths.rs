//! Path utilities for locating the tesseract language data directory.

use std::env;
use std::path::{Path, PathBuf};

/// Where the platform's tesseract package usually keeps its traineddata files.
fn platform_tessdata_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from(r"C:\Program Files\Tesseract-OCR\tessdata")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/opt/homebrew/share/tessdata")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from("/usr/share/tessdata")
    }
}

/// Gets the tessdata directory to point users at when a language model is missing.
///
/// Order: configured directory, `TESSDATA_PREFIX`, a `tessdata` folder next to an
/// explicitly located tesseract executable, then the platform default.
pub fn get_tessdata_dir(configured: Option<&Path>, tesseract_cmd: &Path) -> PathBuf {
    resolve_tessdata_dir(configured, env::var("TESSDATA_PREFIX").ok(), tesseract_cmd)
}

fn resolve_tessdata_dir(
    configured: Option<&Path>,
    env_prefix: Option<String>,
    tesseract_cmd: &Path,
) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    if let Some(prefix) = env_prefix.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(prefix);
    }
    // A bare "tesseract" has an empty parent; only use real directories.
    if let Some(parent) = tesseract_cmd.parent().filter(|p| !p.as_os_str().is_empty()) {
        return parent.join("tessdata");
    }
    platform_tessdata_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_dir_wins() {
        let dir = resolve_tessdata_dir(
            Some(Path::new("/data/tess")),
            Some("/env/tess".to_string()),
            Path::new("/opt/tesseract/tesseract"),
        );
        assert_eq!(dir, PathBuf::from("/data/tess"));
    }

    #[test]
    fn test_env_prefix_before_command_dir() {
        let dir = resolve_tessdata_dir(None, Some("/env/tess".to_string()), Path::new("/opt/t/tesseract"));
        assert_eq!(dir, PathBuf::from("/env/tess"));
    }

    #[test]
    fn test_command_parent_tessdata() {
        let dir = resolve_tessdata_dir(None, None, Path::new("/opt/tesseract/tesseract"));
        assert_eq!(dir, PathBuf::from("/opt/tesseract/tessdata"));
    }

    #[test]
    fn test_bare_command_uses_platform_default() {
        let dir = resolve_tessdata_dir(None, Some(String::new()), Path::new("tesseract"));
        assert_eq!(dir, platform_tessdata_dir());
    }
}
