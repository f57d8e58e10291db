//! Configuration
//!
//! Read from `--config <path>` or `<config dir>/loopdeck/config.toml`. Every
//! field has a default, so a missing file or a partial file is fine:
//!
//! ```toml
//! default_cps = 0.5
//! grid_steps = 16
//!
//! [osc]
//! host = "127.0.0.1"
//! port = 57130
//! reply_timeout_ms = 2000
//!
//! [control]
//! port = 57131
//!
//! [generator]
//! command = "llm"
//! args = ["-m", "some-model"]
//! ```

use crate::error::{SessionError, SessionResult};
use crate::step_grid::GridSize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tempo used when no playing track declares one
    pub default_cps: f64,
    /// Step count for grid views (8 or 16)
    pub grid_steps: usize,
    /// Pattern collection file; defaults under the data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_path: Option<PathBuf>,
    pub osc: OscConfig,
    pub control: ControlConfig,
    pub generator: GeneratorConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub host: String,
    pub port: u16,
    pub reply_timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub port: u16,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program run with the prompt as its last argument
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_cps: 0.5,
            grid_steps: 16,
            collection_path: None,
            osc: OscConfig::default(),
            control: ControlConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 57130,
            reply_timeout_ms: 2000,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { port: 57131 }
    }
}

impl OscConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Config {
    /// `<config dir>/loopdeck/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("loopdeck").join("config.toml"))
    }

    /// Load from an explicit path, or the default location if it exists
    pub fn load(path: Option<&Path>) -> SessionResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| SessionError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::parse(&content)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.default_cps.is_finite() || self.default_cps <= 0.0 {
            return Err(format!("default_cps must be positive, got {}", self.default_cps));
        }
        if GridSize::from_steps(self.grid_steps).is_none() {
            return Err(format!("grid_steps must be 8 or 16, got {}", self.grid_steps));
        }
        Ok(())
    }

    pub fn grid_size(&self) -> GridSize {
        GridSize::from_steps(self.grid_steps).unwrap_or(GridSize::Sixteen)
    }

    /// Collection file: configured path, else `<data dir>/loopdeck/patterns.json`
    pub fn collection_path(&self) -> PathBuf {
        self.collection_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("loopdeck")
                .join("patterns.json")
        })
    }
}
