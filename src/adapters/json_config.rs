//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] over a single JSON file.
//!
//! - Missing file → [`SystemConfig::default()`].
//! - Unparseable file → [`ConfigError::Corrupted`]; never silently replaced.
//! - Missing fields fall back to their defaults (`#[serde(default)]`).
//! - Both load and save validate; an invalid config is refused as a whole.
//! - Save writes a sibling temp file and renames it over the target, so a
//!   power cut never leaves a half-written config behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::ConfigPort;
use crate::config::SystemConfig;
use crate::error::ConfigError;

pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonFileConfig {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("CONFIG: {} not found, using defaults", self.path.display());
                return Ok(SystemConfig::default());
            }
            Err(e) => return Err(ConfigError::Io(e.to_string())),
        };
        let config: SystemConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        config.validate()?;
        info!("CONFIG: loaded {}", self.path.display());
        Ok(config)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate().inspect_err(|e| warn!("CONFIG: refusing to save: {}", e))?;
        let text =
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Io(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ConfigError::Io(e.to_string()))?;
        info!("CONFIG: saved {}", self.path.display());
        Ok(())
    }
}
