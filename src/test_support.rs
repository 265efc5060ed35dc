//! Scripted stand-ins for the clipboard, snip helper, OCR backend and host.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use image::DynamicImage;

use crate::app::HostEvents;
use crate::capture::ResolutionKind;
use crate::image_source::RawBitmap;
use crate::system::{ClipboardError, ClipboardSource, LaunchError, OcrBackend, OcrError, OcrResult, SnipLauncher};

pub fn bitmap(width: usize, height: usize, fill: u8) -> RawBitmap {
    RawBitmap::new(width, height, vec![fill; width * height * 4])
}

#[derive(Default)]
struct ClipboardState {
    current: Option<RawBitmap>,
    fail_next_read: bool,
    reads: usize,
    clears: usize,
}

/// In-memory clipboard. Clones share the same contents, so a test can keep a
/// handle while the app owns another.
#[derive(Clone, Default)]
pub struct ScriptedClipboard(Rc<RefCell<ClipboardState>>);

impl ScriptedClipboard {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_bitmap(bitmap: RawBitmap) -> Self {
        let clipboard = Self::default();
        clipboard.set(Some(bitmap));
        clipboard
    }

    pub fn set(&self, bitmap: Option<RawBitmap>) {
        self.0.borrow_mut().current = bitmap;
    }

    pub fn current(&self) -> Option<RawBitmap> {
        self.0.borrow().current.clone()
    }

    pub fn fail_next_read(&self) {
        self.0.borrow_mut().fail_next_read = true;
    }

    pub fn reads(&self) -> usize {
        self.0.borrow().reads
    }

    pub fn clears(&self) -> usize {
        self.0.borrow().clears
    }
}

impl ClipboardSource for ScriptedClipboard {
    fn read_bitmap(&mut self) -> Result<Option<RawBitmap>, ClipboardError> {
        let mut state = self.0.borrow_mut();
        state.reads += 1;
        if std::mem::take(&mut state.fail_next_read) {
            return Err(ClipboardError::Operation("scripted read failure".to_string()));
        }
        Ok(state.current.clone())
    }

    fn clear(&mut self) -> Result<(), ClipboardError> {
        let mut state = self.0.borrow_mut();
        state.clears += 1;
        state.current = None;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    fail: bool,
    launches: Rc<Cell<usize>>,
    /// Written to this clipboard on launch, like a snip tool finishing instantly.
    writes: Option<(ScriptedClipboard, RawBitmap)>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn writing(clipboard: ScriptedClipboard, bitmap: RawBitmap) -> Self {
        Self {
            writes: Some((clipboard, bitmap)),
            ..Self::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.get()
    }
}

impl SnipLauncher for ScriptedLauncher {
    fn launch(&mut self) -> Result<(), LaunchError> {
        if self.fail {
            return Err(LaunchError::Spawn {
                program: "snip".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        self.launches.set(self.launches.get() + 1);
        if let Some((clipboard, bitmap)) = &self.writes {
            clipboard.set(Some(bitmap.clone()));
        }
        Ok(())
    }
}

/// OCR backend answering from a per-language script.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: HashMap<String, Result<String, String>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, language: &str, text: &str) -> Self {
        self.responses
            .insert(language.to_string(), Ok(text.to_string()));
        self
    }

    pub fn err(mut self, language: &str, message: &str) -> Self {
        self.responses
            .insert(language.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl OcrBackend for ScriptedBackend {
    fn recognize(&self, _image: &DynamicImage, language: &str) -> Result<String, OcrError> {
        self.calls.borrow_mut().push(language.to_string());
        match self.responses.get(language) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(OcrError::Backend(message.clone())),
            None => Err(OcrError::Backend(format!("no scripted response for {language}"))),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub statuses: Vec<String>,
    pub results: Vec<OcrResult>,
    pub captures: Vec<ResolutionKind>,
}

impl HostEvents for RecordingHost {
    fn on_status_change(&mut self, message: &str) {
        self.statuses.push(message.to_string());
    }

    fn on_result(&mut self, result: &OcrResult) {
        self.results.push(result.clone());
    }

    fn on_capture_finished(&mut self, kind: ResolutionKind) {
        self.captures.push(kind);
    }
}
