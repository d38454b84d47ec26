//! Logging setup for the query pipeline.
//!
//! Compact timestamped output with per-target level configuration.
//! Pipeline stages log under the targets `fetch`, `parse`, `chunk`,
//! `semantic`, `retrieve`, `answer`, `cache` and `query`.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! query = "debug"
//! cache = "info"
//! ```
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=query=debug,answer=trace docquery ask https://example.com/policy.pdf -q "..."
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Initialize logging with configuration.
///
/// Only the first call takes effect. Output goes to stderr so answers
/// printed on stdout stay machine-readable.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Log a pipeline event at info level under a stage target.
///
/// # Examples
/// ```ignore
/// log_event!("cache", "built", "{url} ({chunks} chunks)");
/// ```
#[macro_export]
macro_rules! log_event {
    ($target:literal, $event:expr) => {
        tracing::info!(target: $target, "{}", $event)
    };
    ($target:literal, $event:expr, $($arg:tt)*) => {
        tracing::info!(target: $target, "{}: {}", $event, format!($($arg)*))
    };
}

/// Log a pipeline event at debug level under a stage target.
#[macro_export]
macro_rules! debug_event {
    ($target:literal, $event:expr) => {
        tracing::debug!(target: $target, "{}", $event)
    };
    ($target:literal, $event:expr, $($arg:tt)*) => {
        tracing::debug!(target: $target, "{}: {}", $event, format!($($arg)*))
    };
}
