//! Lightweight structured logging shared by the opmeta crates.
//!
//! Output goes to stderr through `emit_term`. The level comes from the
//! `OPMETA_LOG` environment variable:
//! - `OPMETA_LOG=off` - no logs
//! - `OPMETA_LOG=error` / `warn` / `info` / `debug` - that level and above
//!
//! When the variable is unset the caller's default applies.

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable selecting the log level.
pub const LOG_ENV: &str = "OPMETA_LOG";

static INIT: Once = Once::new();

/// Parse a level name. `None` means logging is switched off.
fn parse_level(name: &str) -> Result<Option<emit::Level>, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" | "none" => Ok(None),
        "error" => Ok(Some(emit::Level::Error)),
        "warn" | "warning" => Ok(Some(emit::Level::Warn)),
        "info" => Ok(Some(emit::Level::Info)),
        "debug" | "trace" => Ok(Some(emit::Level::Debug)),
        other => Err(other.to_string()),
    }
}

/// Initialize diagnostics from `OPMETA_LOG`, logging nothing if it is unset.
pub fn init_diagnostics() {
    init_with_default("off");
}

/// Initialize diagnostics from `OPMETA_LOG`, falling back to `default`.
///
/// Only the first call has any effect.
pub fn init_with_default(default: &str) {
    INIT.call_once(|| {
        let requested = std::env::var(LOG_ENV).unwrap_or_else(|_| default.to_string());

        let level = match parse_level(&requested) {
            Ok(Some(level)) => level,
            Ok(None) => return,
            Err(unknown) => {
                // Nothing is wired up yet, so this one goes straight to stderr.
                eprintln!("Warning: Unknown {LOG_ENV} value '{unknown}', using 'info'");
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Log normal progress: "Queried 312 rows", "Upload successful".
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log per-step detail useful when debugging a run.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recovered failures: defaulted rows, failed deletes, retries.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that end the run or lose data.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}
