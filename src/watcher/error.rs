//! Error types for the tracker and signal routers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from tracker and router setup.
///
/// Runtime failures (worker errors, watch-source errors) never surface here;
/// they are logged and broadcast instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watch source: {source}")]
    WatchInit {
        #[source]
        source: notify::Error,
    },

    #[error("Cannot watch path {path}: {source}")]
    WatchAdd {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Could not generate a unique observer tag after {attempts} attempts")]
    TagExhausted { attempts: usize },

    #[error("{component} must be given a logger")]
    LoggerRequired { component: &'static str },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Tracker is already running")]
    AlreadyRunning,

    #[error("Tracker has been stopped")]
    Stopped,
}

pub type WatchResult<T> = Result<T, WatchError>;
