use std::path::Path;

const USAGE: &str = "Usage: snip-ocr [capture | import <path> | langs | config [path | init]]";

fn main() {
    let cfg = snip_ocr::config::load_config();
    snip_ocr::init_logging(cfg.log_level());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => snip_ocr::run_interactive(&cfg),
        ["capture"] => snip_ocr::run_capture(&cfg),
        ["import", path] => snip_ocr::run_import(&cfg, Path::new(path)),
        ["langs"] => snip_ocr::run_list_languages(&cfg),
        ["config"] => match serde_json::to_string_pretty(&cfg.effective()) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                eprintln!("Failed to serialize config: {e}");
                1
            }
        },
        ["config", "path"] => match snip_ocr::config::config_path() {
            Some(path) => {
                println!("{}", path.display());
                0
            }
            None => {
                eprintln!("No config directory available on this platform");
                1
            }
        },
        ["config", "init"] => match snip_ocr::config::init_config() {
            Ok((path, true)) => {
                println!("Wrote default config to {}", path.display());
                0
            }
            Ok((path, false)) => {
                println!("Config already exists at {}", path.display());
                0
            }
            Err(e) => {
                eprintln!("Failed to write config: {e}");
                1
            }
        },
        ["-h" | "--help" | "help"] => {
            println!("{USAGE}");
            0
        }
        _ => {
            eprintln!("{USAGE}");
            2
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
}
