//! Configuration system
//!
//! Library configuration is plain serializable data. It can be built in code
//! or loaded from a TOML or RON file; the format follows the file extension.
//! Every section is optional in a file and falls back to its defaults.

use std::path::{Path, PathBuf};

pub use serde::{Deserialize, Serialize};

use crate::logging::{debug, LogSource};

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format implied by the extension of `path`
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn parse<T: for<'de> Deserialize<'de>>(self, text: &str) -> Result<T, ConfigError> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string())),
            Self::Ron => ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    fn render<T: Serialize>(self, value: &T) -> Result<String, ConfigError> {
        match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| ConfigError::Serialize(e.to_string())),
            Self::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }
}

/// Serializable configuration stored in a TOML or RON file
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from `path`
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config = format.parse(&text)?;
        debug!(target: LogSource::Core.target(), "loaded {format:?} config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from `path`, or the defaults if there is no such file
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!(target: LogSource::Core.target(), "no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write configuration to `path`
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = ConfigFormat::from_path(path)?.render(self)?;
        std::fs::write(path, text).map_err(ConfigError::Io)?;
        debug!(target: LogSource::Core.target(), "saved config to {}", path.display());
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid for its format
    #[error("malformed config: {0}")]
    Parse(String),

    /// The configuration could not be rendered
    #[error("config could not be serialized: {0}")]
    Serialize(String),

    /// The extension names neither TOML nor RON
    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

/// Top-level library configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VkfwConfig {
    /// Which backends may be probed at startup
    pub backends: BackendConfig,
    /// Debug logging sources
    pub logging: LoggingConfig,
    /// Event loop tuning
    pub events: EventConfig,
}

impl Config for VkfwConfig {}

/// Backend selection
///
/// Every backend is enabled unless listed in `disabled`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Names of backends that must never be probed
    pub disabled: Vec<String>,
}

impl BackendConfig {
    /// Whether a backend with this name may be probed
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Disable a backend by name
    pub fn disable(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.is_enabled(&name) {
            self.disabled.push(name);
        }
    }
}

/// Per-source debug logging switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Core dispatch and registry messages
    pub core: bool,
    /// Platform (clock, loader) messages
    pub platform: bool,
    /// Backend protocol messages
    pub backend: bool,
}

impl LoggingConfig {
    /// Every source enabled
    pub const fn all() -> Self {
        Self { core: true, platform: true, backend: true }
    }

    /// Whether debug output is enabled for a source
    pub const fn is_enabled(&self, source: LogSource) -> bool {
        match source {
            LogSource::Core => self.core,
            LogSource::Platform => self.platform,
            LogSource::Backend => self.backend,
        }
    }

    /// Enable debug output for a source
    pub fn enable(&mut self, source: LogSource) {
        match source {
            LogSource::Core => self.core = true,
            LogSource::Platform => self.platform = true,
            LogSource::Backend => self.backend = true,
        }
    }
}

/// Event loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// The dispatch loop will not start another blocking wait when less than
    /// this many microseconds remain before its deadline
    pub wait_guard_micros: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { wait_guard_micros: crate::time::MILLIS }
    }
}
