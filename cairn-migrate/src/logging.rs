//! Logging setup for migration runs.
//!
//! The engine emits `tracing` events; nothing is printed unless a subscriber
//! is installed. Applications can install their own, or call [`init`] with
//! the `tracing-subscriber` feature enabled to get one driven by environment
//! variables:
//!
//! - `CAIRN_DEBUG=true|1|yes` - log at debug level
//! - `CAIRN_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `CAIRN_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! Events carry structured fields:
//!
//! ```rust,ignore
//! info!(migration = %file_name, kind = "Collection", "Applied migration");
//! warn!(migration = %file_name, undo = %undo, error = %cause, "Migration failed, applying undo");
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Environment variable enabling debug logging.
pub const DEBUG_VAR: &str = "CAIRN_DEBUG";
/// Environment variable selecting the log level.
pub const LEVEL_VAR: &str = "CAIRN_LOG_LEVEL";
/// Environment variable selecting the output format.
pub const FORMAT_VAR: &str = "CAIRN_LOG_FORMAT";

/// Check if `CAIRN_DEBUG` is set to a truthy value.
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// The level selected by `CAIRN_LOG_LEVEL` and `CAIRN_DEBUG`.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

/// The format selected by `CAIRN_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var(FORMAT_VAR).ok().as_deref())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn resolve_level(level: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match level.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(format: Option<&str>) -> &'static str {
    match format.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// Install a global subscriber once, if logging was requested.
///
/// Does nothing unless `CAIRN_DEBUG` or `CAIRN_LOG_LEVEL` is set, or when
/// the `tracing-subscriber` feature is disabled. Later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!("cairn={},cairn_migrate={}", level, level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match get_log_format() {
                "pretty" => registry.with(fmt::layer().pretty()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().json()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "Cairn logging initialized"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("true"));
        assert!(is_truthy("YES"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_level_resolution() {
        assert_eq!(resolve_level(None, false), "warn");
        assert_eq!(resolve_level(None, true), "debug");
        assert_eq!(resolve_level(Some("INFO"), true), "info");
        assert_eq!(resolve_level(Some("verbose"), false), "warn");
        assert_eq!(resolve_level(Some("verbose"), true), "debug");
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(resolve_format(None), "json");
        assert_eq!(resolve_format(Some("Pretty")), "pretty");
        assert_eq!(resolve_format(Some("compact")), "compact");
        assert_eq!(resolve_format(Some("xml")), "json");
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
