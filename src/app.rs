//! Session-owning controller and its event loop.
//!
//! [`OcrApp`] is the only owner of the capture session. Host requests and timer
//! ticks all reach it on one thread, which keeps "at most one armed session" and
//! "resolve exactly once" true without locks. Results and status lines go back to
//! the host through [`HostEvents`].

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{CaptureSession, CaptureSettings, Clock, Resolution, ResolutionKind};
use crate::image_source::{self, RawBitmap};
use crate::system::{ClipboardSource, LanguagePreferences, OcrBackend, OcrEngine, OcrResult, SnipLauncher};

pub const STATUS_READY: &str = "Choose an action:";
pub const STATUS_ALREADY_CAPTURING: &str = "A capture is already in progress (cancel it first).";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CaptureError {
    #[error("A capture session is already armed")]
    AlreadyArmed,
}

/// Callbacks from the core to whatever renders it.
pub trait HostEvents {
    fn on_status_change(&mut self, message: &str);
    fn on_result(&mut self, result: &OcrResult);

    /// How a capture session ended. Called before any OCR result for it.
    fn on_capture_finished(&mut self, _kind: ResolutionKind) {}
}

/// Requests a host can send into the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Capture,
    Import(PathBuf),
    Cancel,
    Quit,
}

pub struct OcrApp<C, L, B> {
    clipboard: C,
    launcher: L,
    engine: OcrEngine<B>,
    languages: LanguagePreferences,
    settings: CaptureSettings,
    temp_dir: PathBuf,
    session: Option<CaptureSession>,
}

impl<C, L, B> OcrApp<C, L, B>
where
    C: ClipboardSource,
    L: SnipLauncher,
    B: OcrBackend,
{
    pub fn new(
        clipboard: C,
        launcher: L,
        engine: OcrEngine<B>,
        languages: LanguagePreferences,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            clipboard,
            launcher,
            engine,
            languages,
            settings,
            temp_dir: std::env::temp_dir(),
            session: None,
        }
    }

    /// Directory for the clipboard round-trip PNG.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn engine(&self) -> &OcrEngine<B> {
        &self.engine
    }

    pub fn is_capturing(&self) -> bool {
        self.session.as_ref().is_some_and(CaptureSession::is_armed)
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        self.session.as_ref().and_then(CaptureSession::next_wakeup)
    }

    /// Starts a snip capture. Rejected while another capture is armed.
    pub fn request_capture(
        &mut self,
        now: Instant,
        host: &mut impl HostEvents,
    ) -> Result<(), CaptureError> {
        if self.is_capturing() {
            warn!("Capture requested while one is already armed");
            host.on_status_change(STATUS_ALREADY_CAPTURING);
            return Err(CaptureError::AlreadyArmed);
        }

        let mut session = CaptureSession::new(self.settings);
        match session.arm(&mut self.clipboard, &mut self.launcher, now) {
            Some(resolution) => self.finish(resolution, host),
            None => {
                host.on_status_change(&format!(
                    "Waiting for you to snip... (cancel to abort, times out in {}s)",
                    self.settings.timeout.as_secs()
                ));
                self.session = Some(session);
            }
        }
        Ok(())
    }

    /// Cancels the armed capture, if any. Returns whether anything was cancelled.
    pub fn cancel_capture(&mut self, host: &mut impl HostEvents) -> bool {
        let Some(resolution) = self.session.as_mut().and_then(CaptureSession::cancel) else {
            return false;
        };
        self.finish(resolution, host);
        true
    }

    /// Runs due poll/timeout timers.
    pub fn tick(&mut self, now: Instant, host: &mut impl HostEvents) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(resolution) = session.advance(&mut self.clipboard, now) {
            self.finish(resolution, host);
        }
    }

    /// Loads an image file and runs OCR on it.
    pub fn request_file_import(&mut self, path: &Path, host: &mut impl HostEvents) -> OcrResult {
        let result = match image_source::load_from_file(path) {
            Ok(image) => self.engine.recognize(&image, &self.languages),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to load image");
                OcrResult::Failure {
                    reason: e.to_string(),
                }
            }
        };
        self.report(&result, host);
        result
    }

    /// Tears the session down and reports its outcome.
    fn finish(&mut self, resolution: Resolution, host: &mut impl HostEvents) {
        self.session = None;
        host.on_capture_finished(resolution.kind());
        match resolution {
            Resolution::Image(bitmap) => self.process_clipboard_image(&bitmap, host),
            Resolution::Cancelled => {
                host.on_status_change("Snipping cancelled by user.");
            }
            Resolution::TimedOut => {
                host.on_status_change(
                    "Timeout: No new image found in clipboard. Did you cancel the snip?",
                );
            }
            Resolution::Error(message) => {
                host.on_status_change(&format!("[ERROR] {message}"));
            }
        }
    }

    fn process_clipboard_image(&mut self, bitmap: &RawBitmap, host: &mut impl HostEvents) {
        let result = match image_source::load_from_bitmap_in(&self.temp_dir, bitmap) {
            Ok(image) => self.engine.recognize(&image, &self.languages),
            Err(e) => {
                warn!(error = %e, "Failed to process clipboard image");
                OcrResult::Failure {
                    reason: format!("Failed to process clipboard image: {e}"),
                }
            }
        };
        self.report(&result, host);
    }

    fn report(&self, result: &OcrResult, host: &mut impl HostEvents) {
        host.on_result(result);
        let status = match result {
            OcrResult::Text(_) | OcrResult::Degraded { .. } => "OCR completed!",
            OcrResult::Failure { .. } => "OCR failed.",
        };
        host.on_status_change(status);
    }
}

/// When the loop returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Until `Quit` or the command channel closes with nothing armed.
    Interactive,
    /// After the first command has been fully handled.
    Once,
}

/// Drives `app` from `commands` and its own timers on the calling thread.
pub fn run_event_loop<C, L, B, K, H>(
    app: &mut OcrApp<C, L, B>,
    clock: &K,
    commands: &Receiver<HostCommand>,
    host: &mut H,
    mode: LoopMode,
) where
    C: ClipboardSource,
    L: SnipLauncher,
    B: OcrBackend,
    K: Clock,
    H: HostEvents,
{
    let mut disconnected = false;
    let mut handled = false;

    loop {
        if mode == LoopMode::Once && handled && !app.is_capturing() {
            break;
        }

        let command = match (app.next_wakeup(), disconnected) {
            (Some(at), false) => {
                let wait = at.saturating_duration_since(clock.now());
                match commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        disconnected = true;
                        None
                    }
                }
            }
            (Some(at), true) => {
                std::thread::sleep(at.saturating_duration_since(clock.now()));
                None
            }
            (None, false) => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
            (None, true) => break,
        };

        match command {
            None => app.tick(clock.now(), host),
            Some(HostCommand::Capture) => {
                // Rejection is already reported to the host.
                let _ = app.request_capture(clock.now(), host);
                handled = true;
            }
            Some(HostCommand::Import(path)) => {
                app.request_file_import(&path, host);
                handled = true;
            }
            Some(HostCommand::Cancel) => {
                if !app.cancel_capture(host) {
                    debug!("Cancel received with no armed capture");
                }
            }
            Some(HostCommand::Quit) => {
                info!("Quit requested");
                app.cancel_capture(host);
                break;
            }
        }
    }
}
