//! Daemon-wide configuration: where the HTTP control plane binds, and the
//! default `Options` new services inherit when a request doesn't override
//! them.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::options::Options;

/// Overwrites the default config path (`~/.config/warden/config.yml`).
pub const CONFIG_PATH_ENV: &str = "WARDEN_CONFIG_PATH";

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9191
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub default_options: Options,
}

impl Default for Settings {
    fn default() -> Self {
        Settings { bind_host: default_bind_host(), port: default_port(), default_options: Options::default() }
    }
}

impl Settings {
    /// A missing file is not an error on first run; it's read as defaults.
    /// A present-but-malformed file is.
    pub fn read(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|err| Error::IoPath(path.to_path_buf(), "reading configuration", err))?;
        serde_yaml::from_str(&content).map_err(|err| Error::ConfigDeserialization(err.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::IoPath(parent.to_path_buf(), "creating configuration directory", err))?;
        }
        let content = serde_yaml::to_string(self).map_err(|err| Error::ConfigDeserialization(err.to_string()))?;
        fs::write(path, content).map_err(|err| Error::IoPath(path.to_path_buf(), "writing configuration", err))
    }

    /// `$WARDEN_CONFIG_PATH` if set, else `~/.config/warden/config.yml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("warden").join("config.yml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        assert_eq!(Settings::read(&path).unwrap(), Settings::default());
    }

    #[test]
    fn save_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yml");
        let settings = Settings { port: 4242, ..Settings::default() };
        settings.save(&path).unwrap();
        assert_eq!(Settings::read(&path).unwrap(), settings);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "not: [valid\n").unwrap();
        assert!(Settings::read(&path).is_err());
    }
}
