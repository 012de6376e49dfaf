//! Logging bootstrap for the listener process.
//!
//! JSONL goes to the central log file and a compact copy to stderr.
//! `RUST_LOG` takes precedence over the configured level.

use std::path::PathBuf;
use tracing::Level;

/// Value of the `service` field on every log line.
const SERVICE_NAME: &str = "edge-listener";

/// Install the global subscriber. `log_path` replaces the default log file.
///
/// ```ignore
/// init_logging("debug", Some(paths.log_file()));
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}

/// Parse a configured level name. `None` for names tracing does not know.
pub fn parse_level(name: &str) -> Option<Level> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => return None,
    };
    Some(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_names() {
        let cases = [
            ("trace", Level::TRACE),
            ("Debug", Level::DEBUG),
            (" info ", Level::INFO),
            ("WARNING", Level::WARN),
            ("error", Level::ERROR),
        ];
        for (name, expected) in cases {
            assert_eq!(parse_level(name), Some(expected), "{name}");
        }
    }

    #[test]
    fn test_parse_level_rejects_unknown() {
        assert_eq!(parse_level(""), None);
        assert_eq!(parse_level("verbose"), None);
    }
}
