use std::path::Path;

use anyhow::Result;

use mqttgram_config::{Severity, discover_config_file, validate};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn check(config_path: Option<&Path>) -> Result<()> {
    match config_path.map(Path::to_path_buf).or_else(discover_config_file) {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults and environment.\n"),
    }

    let config = mqttgram_config::load(config_path)?;
    let result = validate(&config);

    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!(
            "  {BOLD}{color}{}{RESET} {} ({}): {}",
            d.severity, d.path, d.env, d.message
        );
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
