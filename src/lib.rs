pub mod app;
pub mod capture;
pub mod config;
pub mod image_source;
pub mod paths;
pub mod system;

#[cfg(test)]
mod test_support;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use app::{run_event_loop, HostCommand, HostEvents, LoopMode, OcrApp};
use capture::{ResolutionKind, SystemClock};
use config::{Config, LogLevel};
use system::{OcrEngine, OcrResult, SystemClipboard, SystemSnipTool, TesseractBackend};

pub type SystemApp = OcrApp<SystemClipboard, SystemSnipTool, TesseractBackend>;

const INTERACTIVE_HELP: &str =
    "Commands: c = capture via snip tool, i <path> = import image, <Enter> = cancel capture, q = quit";

/// `RUST_LOG` wins over the configured level.
pub fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn build_app(cfg: &Config) -> SystemApp {
    let backend = TesseractBackend::new(cfg.tesseract_cmd(), cfg.tessdata_dir.clone());
    OcrApp::new(
        SystemClipboard::new(),
        SystemSnipTool::new(cfg.snip_command()),
        OcrEngine::new(backend, cfg.tessdata_dir()),
        cfg.languages(),
        cfg.capture_settings(),
    )
}

/// Prints status lines to stderr and OCR output to stdout.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    failed: bool,
}

impl ConsoleHost {
    pub fn failed(&self) -> bool {
        self.failed
    }
}

impl HostEvents for ConsoleHost {
    fn on_status_change(&mut self, message: &str) {
        eprintln!("{message}");
    }

    fn on_capture_finished(&mut self, kind: ResolutionKind) {
        self.failed = matches!(kind, ResolutionKind::TimedOut | ResolutionKind::Error);
    }

    fn on_result(&mut self, result: &OcrResult) {
        self.failed = matches!(result, OcrResult::Failure { .. });
        println!("{}", result.render());
    }
}

/// Parses one line typed in interactive mode.
pub fn parse_command(line: &str) -> Option<HostCommand> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));
    match word.to_ascii_lowercase().as_str() {
        "" | "esc" | "cancel" => Some(HostCommand::Cancel),
        "c" | "capture" => Some(HostCommand::Capture),
        "i" | "import" if !rest.is_empty() => Some(HostCommand::Import(PathBuf::from(rest))),
        "q" | "quit" | "exit" => Some(HostCommand::Quit),
        _ => None,
    }
}

/// Forwards stdin lines to the event loop. `map` turns a line into a command.
fn spawn_stdin_reader<F>(tx: mpsc::Sender<HostCommand>, map: F)
where
    F: Fn(&str) -> Option<HostCommand> + Send + 'static,
{
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match map(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("{INTERACTIVE_HELP}"),
            }
        }
        debug!("stdin closed");
    });
}

/// One-shot file import. Returns the process exit code.
pub fn run_import(cfg: &Config, path: &Path) -> i32 {
    let mut app = build_app(cfg);
    let mut host = ConsoleHost::default();
    app.request_file_import(path, &mut host);
    i32::from(host.failed())
}

/// One snip capture; any line on stdin cancels it. Returns the process exit code.
pub fn run_capture(cfg: &Config) -> i32 {
    let mut app = build_app(cfg);
    let mut host = ConsoleHost::default();
    let (tx, rx) = mpsc::channel();
    if tx.send(HostCommand::Capture).is_err() {
        return 1;
    }
    eprintln!("Press Enter to cancel.");
    spawn_stdin_reader(tx, |_| Some(HostCommand::Cancel));

    run_event_loop(&mut app, &SystemClock, &rx, &mut host, LoopMode::Once);
    i32::from(host.failed())
}

/// Interactive loop driven by stdin commands.
pub fn run_interactive(cfg: &Config) -> i32 {
    let mut app = build_app(cfg);
    let mut host = ConsoleHost::default();
    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx, parse_command);

    info!("Interactive session started");
    eprintln!("{}\n{INTERACTIVE_HELP}", app::STATUS_READY);
    run_event_loop(&mut app, &SystemClock, &rx, &mut host, LoopMode::Interactive);
    0
}

/// Prints installed tesseract language models.
pub fn run_list_languages(cfg: &Config) -> i32 {
    let backend = TesseractBackend::new(cfg.tesseract_cmd(), cfg.tessdata_dir.clone());
    match backend.available_languages() {
        Ok(langs) => {
            for lang in langs {
                println!("{lang}");
            }
            0
        }
        Err(e) => {
            error!(error = %e, "Could not list tesseract languages");
            eprintln!("[ERROR] {e}");
            1
        }
    }
}
