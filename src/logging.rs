//! Diagnostics for the tracker, routers and the `filemon` binary.
//!
//! Every line carries a bracketed component so output from concurrent parts
//! can be told apart:
//!
//! | component   | `info`                          | `debug`                                  |
//! |-------------|---------------------------------|------------------------------------------|
//! | `tracker`   | dispatch loop started / stopped | paths added, observers registered, tags   |
//! | `router`    |                                 | files tracked, released, still waiting    |
//! | `broadcast` |                                 | side-channel deliveries                   |
//! | `watch`     | per-event reports from the CLI  |                                          |
//!
//! Worker failures do not go through these macros. Routers hand them to their
//! [`Logger`](crate::watcher::Logger), which `TracingLogger` turns into
//! `error` records.
//!
//! Logs go to stderr; stdout belongs to `filemon watch` event lines and
//! `filemon config` output.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "filemon::watcher::router" = "debug"
//! ```
//!
//! `RUST_LOG` replaces the configured filter entirely:
//! ```bash
//! RUST_LOG=filemon::watcher=debug filemon watch ./inbox --accumulate
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm in local time.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// `default,module=level,...` with modules in a stable order.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    modules
        .into_iter()
        .fold(config.default.clone(), |mut directives, (module, level)| {
            directives.push_str(&format!(",{module}={level}"));
            directives
        })
}

/// Filter from `RUST_LOG`, else from config.
///
/// A config filter that fails to parse is replaced by the default level; the
/// parse error is returned so it can be reported once a subscriber exists.
fn build_filter(config: &LoggingConfig) -> (EnvFilter, Option<String>) {
    if std::env::var("RUST_LOG").is_ok() {
        return (EnvFilter::from_default_env(), None);
    }

    let directives = filter_directives(config);
    match EnvFilter::try_new(&directives) {
        Ok(filter) => (filter, None),
        Err(err) => (
            EnvFilter::new(LoggingConfig::default().default),
            Some(format!("ignoring logging settings `{directives}`: {err}")),
        ),
    }
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let (filter, rejected) = build_filter(config);

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();

        if let Some(reason) = rejected {
            tracing::warn!("[logging] {reason}");
        }
    });
}

pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level line tagged with a component.
///
/// ```ignore
/// log_event!("tracker", "running", "{} observers", count);
/// log_event!("tracker", "stopped");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level counterpart of [`log_event!`].
///
/// ```ignore
/// debug_event!("router", "released", "{}", path.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Warn-level counterpart of [`log_event!`].
#[macro_export]
macro_rules! warn_event {
    ($component:expr, $event:expr) => {
        tracing::warn!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::warn!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        config.modules.insert("filemon::watcher".to_string(), "debug".to_string());
        config.modules.insert("filemon::config".to_string(), "trace".to_string());

        assert_eq!(
            filter_directives(&config),
            "warn,filemon::config=trace,filemon::watcher=debug"
        );
    }

    #[test]
    fn test_invalid_level_falls_back() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }

        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("filemon::watcher".to_string(), "loud".to_string());

        let (_, rejected) = build_filter(&config);
        let reason = rejected.expect("invalid level must be reported");
        assert!(reason.contains("loud"));

        let (_, rejected) = build_filter(&LoggingConfig::default());
        assert!(rejected.is_none());
    }
}
