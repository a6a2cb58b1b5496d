//! Layered configuration for trackers, routers and logging.
//!
//! Sources, lowest precedence first:
//! - Default values
//! - `.filemon/settings.toml`, found by walking up from the current directory
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FILEMON_` and use double
//! underscores to separate nested levels:
//! - `FILEMON_TRACKER__BROADCAST_CAPACITY=1024` sets `tracker.broadcast_capacity`
//! - `FILEMON_ROUTER__MODE=accumulating` sets `router.mode`
//! - `FILEMON_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::watcher::RouterMode;

const CONFIG_DIR: &str = ".filemon";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "FILEMON_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Defaults applied to routers built with `SignalRouterBuilder::config`
    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Capacity of the event side channel
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Directories the binary watches when none are given on the command line
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: RouterMode,

    /// Drop a resident worker once it completes
    #[serde(default = "default_true")]
    pub free_on_completion: bool,

    /// Also drop a resident worker after a hard failure
    #[serde(default)]
    pub evict_on_failure: bool,

    /// Emit a debug line when a worker is still waiting for its trigger
    #[serde(default = "default_true")]
    pub log_not_ready: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `filemon::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_broadcast_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            tracker: TrackerConfig::default(),
            router: RouterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            watch_paths: Vec::new(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::Immediate,
            free_on_completion: true,
            evict_on_failure: false,
            log_not_ready: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.filemon/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Render as TOML for display
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.tracker.broadcast_capacity, 256);
        assert_eq!(settings.router.mode, RouterMode::Immediate);
        assert!(settings.router.free_on_completion);
        assert!(!settings.router.evict_on_failure);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[tracker]
broadcast_capacity = 16
watch_paths = ["/srv/inbox"]

[router]
mode = "accumulating"
free_on_completion = false

[logging]
default = "info"

[logging.modules]
"filemon::watcher" = "trace"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.tracker.broadcast_capacity, 16);
        assert_eq!(settings.tracker.watch_paths, vec![PathBuf::from("/srv/inbox")]);
        assert_eq!(settings.router.mode, RouterMode::Accumulating);
        assert!(!settings.router.free_on_completion);
        // Unspecified values keep their defaults
        assert!(settings.router.log_not_ready);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["filemon::watcher"], "trace");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/settings.toml");

        let mut settings = Settings::default();
        settings.tracker.broadcast_capacity = 32;
        settings.router.evict_on_failure = true;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.tracker.broadcast_capacity, 32);
        assert!(loaded.router.evict_on_failure);
    }
}
