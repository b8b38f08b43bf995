//! Structured tracing for the bridge
//!
//! Every event carries a stable `event = "..."` field (`allocation`,
//! `release`, `native_call`, `phase`, ...) so a single call can be followed
//! through serialization, the export and cleanup. `RUST_LOG` overrides the
//! configured level; output goes to stderr or to a non-blocking file writer.

use crate::error::BridgeError;
use crate::interop::CallPhase;
use once_cell::sync::OnceCell;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Set once; keeps the file writer's guard alive until exit
static LOGGER_INITIALIZED: OnceCell<Option<WorkerGuard>> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for `mazebridge` targets when `RUST_LOG` is unset
    pub level: Level,
    /// Append to this file instead of stderr
    pub log_path: Option<PathBuf>,
    pub json_format: bool,
    /// Emit enter/close events for the per-call `invoke` span
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// `MAZEBRIDGE_LOG_LEVEL`, `MAZEBRIDGE_LOG_FILE`, `MAZEBRIDGE_LOG_JSON`
    /// and `MAZEBRIDGE_LOG_SPANS`; the last two only need to be present
    pub fn from_env() -> Self {
        let flag = |name: &str| std::env::var_os(name).is_some();
        Self {
            level: std::env::var("MAZEBRIDGE_LOG_LEVEL")
                .ok()
                .and_then(|text| parse_level(&text))
                .unwrap_or(Level::WARN),
            log_path: std::env::var_os("MAZEBRIDGE_LOG_FILE").map(PathBuf::from),
            json_format: flag("MAZEBRIDGE_LOG_JSON"),
            show_spans: flag("MAZEBRIDGE_LOG_SPANS"),
        }
    }

    /// Everything down to per-transient allocation events
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

pub fn parse_level(text: &str) -> Option<Level> {
    match text.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Install the global subscriber; only the first call has any effect
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("mazebridge={}", config.level.as_str().to_lowercase()))
        });

        let (writer, guard) = match config.log_path.as_deref() {
            Some(path) => {
                let directory = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "mazebridge.log".to_string());
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (fmt::writer::BoxMakeWriter::new(writer), Some(guard))
            }
            None => (fmt::writer::BoxMakeWriter::new(io::stderr), None),
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(if config.show_spans {
                FmtSpan::ENTER | FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            })
            .with_target(true)
            .with_line_number(cfg!(debug_assertions));
        let layer = if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        };

        // another subscriber may already be installed (tests, embedding)
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init();
        guard
    });
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Log a transient allocation
#[inline]
pub fn log_allocation(address: u32, size: u32) {
    tracing::trace!(
        event = "allocation",
        address,
        bytes = size,
        "transient allocated"
    );
}

/// Log an allocator refusal
pub fn log_allocation_failure(size: u32, live: usize) {
    tracing::warn!(
        event = "allocation_failed",
        bytes = size,
        live_transients = live,
        "module allocator returned null"
    );
}

/// Log a transient release
#[inline]
pub fn log_release(address: u32, size: u32) {
    tracing::trace!(
        event = "release",
        address,
        bytes = size,
        "transient released"
    );
}

pub fn log_release_failure(address: u32, error: &BridgeError) {
    tracing::error!(
        event = "release_failed",
        address,
        error = %error,
        "transient release failed"
    );
}

/// Log a native export call
pub fn log_native_call(function: &str, param_count: usize) {
    tracing::debug!(
        event = "native_call",
        function,
        params = param_count,
        "calling export"
    );
}

/// Log a native export return
pub fn log_native_return(function: &str, has_value: bool) {
    tracing::trace!(
        event = "native_return",
        function,
        has_value,
        "export returned"
    );
}

/// Log a failed `invoke`
pub fn log_call_error(function: &str, error: &BridgeError) {
    if error.is_config() {
        tracing::warn!(event = "call_rejected", function, error = %error, "call rejected");
    } else {
        tracing::error!(event = "call_error", function, error = %error, "call failed");
    }
}

/// Log a call state transition
#[inline]
pub fn log_phase(function: &str, phase: CallPhase) {
    tracing::trace!(event = "phase", function, phase = ?phase);
}

/// Wall-clock timing of bridge calls
pub mod perf {
    use std::time::{Duration, Instant};

    /// Start timing `function`; the elapsed time is logged when the timer drops
    #[must_use]
    pub fn track(function: &str) -> CallTimer<'_> {
        CallTimer {
            function,
            start: Instant::now(),
        }
    }

    pub struct CallTimer<'a> {
        function: &'a str,
        start: Instant,
    }

    impl CallTimer<'_> {
        pub fn function(&self) -> &str {
            self.function
        }

        pub fn elapsed(&self) -> Duration {
            self.start.elapsed()
        }
    }

    impl Drop for CallTimer<'_> {
        fn drop(&mut self) {
            tracing::debug!(
                event = "call_timing",
                function = self.function,
                micros = self.elapsed().as_micros() as u64
            );
        }
    }
}
