//! Clipboard-based snip capture.
//!
//! There is no OS event for "the clipboard changed", so a capture session arms by
//! fingerprinting and clearing the clipboard, launches the snip helper, then polls
//! at a fixed interval until a new bitmap shows up, the user cancels, or the
//! deadline passes. Time is passed in explicitly so the whole machine can be driven
//! by synthetic ticks.
//!
//! ```text
//! Idle --arm--> Armed --poll (new bitmap)--> Resolved(Image)
//!   |             |----cancel--------------> Resolved(Cancelled)
//!   |             '----deadline------------> Resolved(TimedOut)
//!   '--arm (launch fails)------------------> Resolved(Error)
//! ```
//!
//! Resolution is idempotent: only the first resolving event has an effect.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::image_source::RawBitmap;
use crate::system::{BitmapFingerprint, ClipboardSource, SnipLauncher};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the current instant for the event loop.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// How a session ended. Emitted exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Image(RawBitmap),
    Cancelled,
    TimedOut,
    Error(String),
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Self::Image(_) => ResolutionKind::Image,
            Self::Cancelled => ResolutionKind::Cancelled,
            Self::TimedOut => ResolutionKind::TimedOut,
            Self::Error(_) => ResolutionKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Image,
    Cancelled,
    TimedOut,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Resolved(ResolutionKind),
}

#[derive(Debug)]
pub struct CaptureSession {
    settings: CaptureSettings,
    state: SessionState,
    baseline: BitmapFingerprint,
    armed_at: Option<Instant>,
    next_poll: Option<Instant>,
    deadline: Option<Instant>,
    polls: u32,
    cancelled: bool,
}

impl CaptureSession {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            state: SessionState::Idle,
            baseline: BitmapFingerprint::default(),
            armed_at: None,
            next_poll: None,
            deadline: None,
            polls: 0,
            cancelled: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == SessionState::Armed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn poll_count(&self) -> u32 {
        self.polls
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.armed_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }

    /// Idle -> Armed. Returns a resolution only if the helper failed to launch.
    ///
    /// Calling this on a session that already left Idle does nothing.
    pub fn arm(
        &mut self,
        clipboard: &mut impl ClipboardSource,
        launcher: &mut impl SnipLauncher,
        now: Instant,
    ) -> Option<Resolution> {
        if self.state != SessionState::Idle {
            warn!(state = ?self.state, "Ignoring arm on a session that is not idle");
            return None;
        }

        let current = clipboard.read_bitmap().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read clipboard baseline, treating it as empty");
            None
        });
        self.baseline = BitmapFingerprint::of(current.as_ref());
        debug!(empty = self.baseline.is_empty(), "Captured clipboard baseline");

        if let Err(e) = clipboard.clear() {
            warn!(error = %e, "Failed to clear clipboard before snip");
        }

        // Enter Armed first so the launch failure goes through the normal resolve path.
        self.state = SessionState::Armed;
        if let Err(e) = launcher.launch() {
            warn!(error = %e, "Snip helper failed to launch");
            return self.resolve(Resolution::Error(e.to_string()));
        }

        self.armed_at = Some(now);
        self.next_poll = Some(now + self.settings.poll_interval);
        self.deadline = Some(now + self.settings.timeout);
        info!(
            poll_ms = self.settings.poll_interval.as_millis(),
            timeout_ms = self.settings.timeout.as_millis(),
            "Capture armed, waiting for snip"
        );
        None
    }

    /// One poll of the clipboard. Resolves with the bitmap if it is new.
    pub fn on_poll_tick(
        &mut self,
        clipboard: &mut impl ClipboardSource,
        now: Instant,
    ) -> Option<Resolution> {
        if !self.is_armed() {
            return None;
        }
        self.polls += 1;
        self.next_poll = Some(now + self.settings.poll_interval);

        let current = match clipboard.read_bitmap() {
            Ok(current) => current,
            Err(e) => {
                debug!(error = %e, poll = self.polls, "Clipboard read failed during poll");
                return None;
            }
        };

        match current {
            Some(bitmap) if !bitmap.is_empty() && !self.baseline.matches(Some(&bitmap)) => {
                info!(
                    width = bitmap.width,
                    height = bitmap.height,
                    poll = self.polls,
                    elapsed_ms = self.elapsed(now).as_millis(),
                    "New clipboard image detected"
                );
                self.resolve(Resolution::Image(bitmap))
            }
            _ => None,
        }
    }

    /// The one-shot deadline fired.
    pub fn on_timeout(&mut self) -> Option<Resolution> {
        if !self.is_armed() {
            return None;
        }
        info!(polls = self.polls, "Capture timed out, no new image in clipboard");
        self.resolve(Resolution::TimedOut)
    }

    /// User cancellation. A no-op once the session has resolved.
    pub fn cancel(&mut self) -> Option<Resolution> {
        if !self.is_armed() {
            debug!(state = ?self.state, "Cancel ignored, session not armed");
            return None;
        }
        self.cancelled = true;
        info!("Snipping cancelled by user");
        self.resolve(Resolution::Cancelled)
    }

    /// Fires whichever timers are due at `now`.
    ///
    /// A due poll runs before a due deadline, so an image that arrives on the same
    /// tick as the timeout wins.
    pub fn advance(
        &mut self,
        clipboard: &mut impl ClipboardSource,
        now: Instant,
    ) -> Option<Resolution> {
        if self.next_poll.is_some_and(|at| at <= now) {
            if let Some(resolution) = self.on_poll_tick(clipboard, now) {
                return Some(resolution);
            }
        }
        if self.deadline.is_some_and(|at| at <= now) {
            return self.on_timeout();
        }
        None
    }

    /// When the loop should next call [`CaptureSession::advance`].
    pub fn next_wakeup(&self) -> Option<Instant> {
        if !self.is_armed() {
            return None;
        }
        match (self.next_poll, self.deadline) {
            (Some(poll), Some(deadline)) => Some(poll.min(deadline)),
            (poll, deadline) => poll.or(deadline),
        }
    }

    fn resolve(&mut self, resolution: Resolution) -> Option<Resolution> {
        if !self.is_armed() {
            return None;
        }
        self.state = SessionState::Resolved(resolution.kind());
        self.next_poll = None;
        self.deadline = None;
        self.baseline = BitmapFingerprint::default();
        debug!(outcome = ?resolution.kind(), "Capture session resolved");
        Some(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bitmap, ScriptedClipboard, ScriptedLauncher};

    fn fast() -> CaptureSettings {
        CaptureSettings {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }

    fn armed(clipboard: &mut ScriptedClipboard, t0: Instant) -> CaptureSession {
        let mut session = CaptureSession::new(fast());
        let mut launcher = ScriptedLauncher::new();
        assert_eq!(session.arm(clipboard, &mut launcher, t0), None);
        assert!(session.is_armed());
        session
    }

    #[test]
    fn test_arm_fingerprints_then_clears_and_launches() {
        let mut clipboard = ScriptedClipboard::with_bitmap(bitmap(10, 10, 1));
        let mut launcher = ScriptedLauncher::new();
        let mut session = CaptureSession::new(fast());

        assert_eq!(session.arm(&mut clipboard, &mut launcher, Instant::now()), None);

        assert_eq!(clipboard.reads(), 1);
        assert_eq!(clipboard.clears(), 1);
        assert!(clipboard.current().is_none());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(session.state(), SessionState::Armed);
    }

    #[test]
    fn test_launch_failure_resolves_error_without_polling() {
        let mut clipboard = ScriptedClipboard::empty();
        let mut launcher = ScriptedLauncher::failing();
        let mut session = CaptureSession::new(fast());
        let t0 = Instant::now();

        let resolution = session.arm(&mut clipboard, &mut launcher, t0);

        assert!(matches!(resolution, Some(Resolution::Error(_))));
        assert_eq!(session.state(), SessionState::Resolved(ResolutionKind::Error));
        assert_eq!(session.next_wakeup(), None);
        assert_eq!(session.advance(&mut clipboard, t0 + Duration::from_secs(60)), None);
        assert_eq!(session.poll_count(), 0);
    }

    #[test]
    fn test_new_bitmap_on_third_tick_resolves_once() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);
        let tick = |n: u32| t0 + Duration::from_millis(200) * n;

        assert_eq!(session.advance(&mut clipboard, tick(1)), None);
        assert_eq!(session.advance(&mut clipboard, tick(2)), None);
        let snip = bitmap(100, 50, 200);
        clipboard.set(Some(snip.clone()));

        assert_eq!(session.advance(&mut clipboard, tick(3)), Some(Resolution::Image(snip)));
        assert_eq!(session.poll_count(), 3);

        // Nothing fires after resolution, not even the deadline.
        clipboard.set(Some(bitmap(5, 5, 1)));
        assert_eq!(session.advance(&mut clipboard, tick(4)), None);
        assert_eq!(session.advance(&mut clipboard, t0 + Duration::from_secs(31)), None);
        assert_eq!(session.cancel(), None);
        assert_eq!(session.state(), SessionState::Resolved(ResolutionKind::Image));
    }

    #[test]
    fn test_same_image_as_baseline_is_ignored() {
        let original = bitmap(8, 8, 42);
        let mut clipboard = ScriptedClipboard::with_bitmap(original.clone());
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);

        // Some other process puts the old image back.
        clipboard.set(Some(original));
        assert_eq!(session.on_poll_tick(&mut clipboard, t0), None);
        assert!(session.is_armed());
    }

    #[test]
    fn test_zero_size_bitmap_is_ignored() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);

        clipboard.set(Some(RawBitmap::new(0, 10, Vec::new())));
        assert_eq!(session.on_poll_tick(&mut clipboard, t0), None);
        assert!(session.is_armed());
    }

    #[test]
    fn test_clipboard_read_error_keeps_polling() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);

        clipboard.fail_next_read();
        assert_eq!(session.on_poll_tick(&mut clipboard, t0), None);
        assert!(session.is_armed());

        clipboard.set(Some(bitmap(2, 2, 9)));
        assert!(matches!(
            session.on_poll_tick(&mut clipboard, t0),
            Some(Resolution::Image(_))
        ));
    }

    #[test]
    fn test_timeout_resolves_once() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);

        assert_eq!(session.advance(&mut clipboard, t0 + Duration::from_secs(29)), None);
        assert_eq!(
            session.advance(&mut clipboard, t0 + Duration::from_secs(30)),
            Some(Resolution::TimedOut)
        );
        assert_eq!(session.on_timeout(), None);
        assert_eq!(session.cancel(), None);
        assert_eq!(session.state(), SessionState::Resolved(ResolutionKind::TimedOut));
    }

    #[test]
    fn test_poll_wins_over_timeout_on_same_tick() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);

        clipboard.set(Some(bitmap(3, 3, 3)));
        let resolution = session.advance(&mut clipboard, t0 + Duration::from_secs(30));

        assert!(matches!(resolution, Some(Resolution::Image(_))));
    }

    #[test]
    fn test_cancel_while_armed_then_late_events_ignored() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);

        assert_eq!(session.cancel(), Some(Resolution::Cancelled));
        assert!(session.is_cancelled());

        clipboard.set(Some(bitmap(4, 4, 4)));
        assert_eq!(session.advance(&mut clipboard, t0 + Duration::from_secs(40)), None);
        assert_eq!(session.cancel(), None);
        assert_eq!(session.state(), SessionState::Resolved(ResolutionKind::Cancelled));
    }

    #[test]
    fn test_cancel_before_arm_is_noop() {
        let mut session = CaptureSession::new(fast());
        assert_eq!(session.cancel(), None);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_next_wakeup_is_next_poll() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let session = armed(&mut clipboard, t0);
        assert_eq!(session.next_wakeup(), Some(t0 + Duration::from_millis(200)));
        assert_eq!(session.deadline(), Some(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_rearm_is_ignored() {
        let mut clipboard = ScriptedClipboard::empty();
        let t0 = Instant::now();
        let mut session = armed(&mut clipboard, t0);
        let mut launcher = ScriptedLauncher::new();

        assert_eq!(session.arm(&mut clipboard, &mut launcher, t0), None);
        assert_eq!(launcher.launches(), 0);
    }
}
