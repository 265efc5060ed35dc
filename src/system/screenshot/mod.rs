//! Launching the OS screen-snip helper.
//!
//! The helper is fire-and-forget: we never wait on it or read its output. Its
//! only observable effect is a new bitmap on the clipboard.

use std::process::{Child, Command};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("No snip command configured")]
    NoCommand,
    #[error("Could not open snip tool `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts an external region-capture tool that writes to the clipboard.
pub trait SnipLauncher {
    fn launch(&mut self) -> Result<(), LaunchError>;
}

/// Default snip command for the current platform.
pub fn default_snip_command() -> Vec<String> {
    #[cfg(target_os = "windows")]
    let argv: &[&str] = &["explorer", "ms-screenclip:"];
    // -i interactive region, -c copy to clipboard instead of a file
    #[cfg(target_os = "macos")]
    let argv: &[&str] = &["screencapture", "-i", "-c"];
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let argv: &[&str] = &["gnome-screenshot", "--area", "--clipboard"];

    argv.iter().map(|s| s.to_string()).collect()
}

/// Spawns a configured command line as the snip helper.
#[derive(Debug)]
pub struct SystemSnipTool {
    argv: Vec<String>,
    child: Option<Child>,
}

impl SystemSnipTool {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv, child: None }
    }

    /// Reaps a previously launched helper if it already exited.
    fn reap(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(?status, "Snip helper exited");
                self.child = None;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to query snip helper status");
                self.child = None;
            }
        }
    }
}

impl Default for SystemSnipTool {
    fn default() -> Self {
        Self::new(default_snip_command())
    }
}

impl SnipLauncher for SystemSnipTool {
    fn launch(&mut self) -> Result<(), LaunchError> {
        self.reap();

        let (program, args) = self.argv.split_first().ok_or(LaunchError::NoCommand)?;
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: program.clone(),
                source,
            })?;

        info!(program = %program, pid = child.id(), "Launched snip helper");
        self.child = Some(child);
        Ok(())
    }
}

impl Drop for SystemSnipTool {
    fn drop(&mut self) {
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snip_command_not_empty() {
        assert!(!default_snip_command().is_empty());
    }

    #[test]
    fn test_empty_command_is_launch_error() {
        let mut tool = SystemSnipTool::new(Vec::new());
        assert!(matches!(tool.launch(), Err(LaunchError::NoCommand)));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let mut tool = SystemSnipTool::new(vec!["snip-ocr-no-such-helper-binary".to_string()]);
        assert!(matches!(tool.launch(), Err(LaunchError::Spawn { .. })));
    }
}
