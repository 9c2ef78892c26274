//! Runtime settings.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file (`<config_dir>/postwhale/config.toml` unless a path is given),
//! then `POSTWHALE_*` environment variables. `POSTWHALE_WORKER_ARGS` is split
//! on spaces.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeOptions, WorkerCommand};
use crate::codec::DEFAULT_MAX_FRAME_BYTES;

const APP_DIR: &str = "postwhale";
const ENV_PREFIX: &str = "POSTWHALE";
const DEFAULT_WORKER: &str = "postwhale-backend";
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A source could not be read or the values do not fit.
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("Invalid value for {key}: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Effective settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Worker executable.
    pub worker_path: PathBuf,
    /// Worker arguments.
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// Per-call deadline in milliseconds.
    pub call_timeout_ms: u64,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
    /// Preference file for configs and favorites.
    pub preferences_path: PathBuf,
}

impl Settings {
    /// Platform config directory for the application.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR))
    }

    /// Default location of the settings file.
    #[must_use]
    pub fn default_file() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    fn default_preferences_path() -> PathBuf {
        Self::config_dir().map_or_else(
            || PathBuf::from("postwhale-preferences.json"),
            |dir| dir.join("preferences.json"),
        )
    }

    /// Loads settings.
    ///
    /// An explicit `file` must exist; the default file is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("worker_path", DEFAULT_WORKER)?
            .set_default("worker_args", Vec::<String>::new())?
            .set_default("call_timeout_ms", DEFAULT_CALL_TIMEOUT_MS)?
            .set_default("max_frame_bytes", DEFAULT_MAX_FRAME_BYTES as u64)?
            .set_default(
                "preferences_path",
                Self::default_preferences_path().display().to_string(),
            )?;

        match file {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                if let Some(path) = Self::default_file() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("worker_args"),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.call_timeout_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "call_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(SettingsError::Invalid {
                key: "max_frame_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Per-call deadline.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Bridge tunables.
    #[must_use]
    pub const fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            call_timeout: self.call_timeout(),
            max_frame_bytes: self.max_frame_bytes,
        }
    }

    /// Command launching the worker.
    #[must_use]
    pub fn worker_command(&self) -> WorkerCommand {
        WorkerCommand::new(&self.worker_path).args(self.worker_args.iter().cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn file_overrides_defaults() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "worker_path = \"/opt/postwhale/backend\"\nworker_args = [\"--db\", \"/tmp/pw.db\"]\ncall_timeout_ms = 5000\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.worker_path, PathBuf::from("/opt/postwhale/backend"));
        assert_eq!(settings.call_timeout(), Duration::from_secs(5));
        assert_eq!(settings.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(
            settings.worker_command(),
            WorkerCommand::new("/opt/postwhale/backend").args(["--db", "/tmp/pw.db"])
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = Settings::load(Some(&dir.path().join("absent.toml")));

        assert!(matches!(result, Err(SettingsError::Config(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "call_timeout_ms = 0\n").unwrap();

        let result = Settings::load(Some(&path));

        assert!(matches!(
            result,
            Err(SettingsError::Invalid { key: "call_timeout_ms", .. })
        ));
    }

    #[test]
    fn bridge_options_follow_settings() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_frame_bytes = 1024\n").unwrap();

        let options = Settings::load(Some(&path)).unwrap().bridge_options();

        assert_eq!(options.max_frame_bytes, 1024);
        assert_eq!(options.call_timeout, Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS));
    }
}
