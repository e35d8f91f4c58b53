//! simbind Configuration
//!
//! Handles parsing and management of simbind.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::module::{Binding, DynamicLoader, MarshalLimits, DEFAULT_MAX_ARG_LEN};

/// File name searched for by [`SimbindConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "simbind.toml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "SIMBIND_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching simbind.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimbindConfig {
    /// How modules are located and opened
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Limits on strings passed into modules
    #[serde(default)]
    pub marshal: MarshalConfig,
}

impl SimbindConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: SimbindConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `SIMBIND_CONFIG` if set, otherwise search up from the
    /// current directory.
    pub fn from_env() -> ConfigResult<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }
        let cwd = std::env::current_dir()?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.marshal.max_arg_len == 0 {
            return Err(ConfigError::Invalid(
                "marshal.max_arg_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Module loader settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directories searched for modules given by bare name
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Symbol binding mode: "lazy" (default) or "now"
    #[serde(default)]
    pub binding: Binding,
}

impl LoaderConfig {
    /// Build the loader described by this section
    pub fn build(&self) -> DynamicLoader {
        let mut loader = DynamicLoader::new(self.binding);
        for path in &self.search_paths {
            loader.add_search_path(path);
        }
        loader
    }
}

/// String marshaling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarshalConfig {
    /// Longest accepted string argument in bytes, terminator excluded
    #[serde(default = "default_max_arg_len")]
    pub max_arg_len: usize,
}

fn default_max_arg_len() -> usize {
    DEFAULT_MAX_ARG_LEN
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            max_arg_len: default_max_arg_len(),
        }
    }
}

impl MarshalConfig {
    pub fn limits(&self) -> MarshalLimits {
        MarshalLimits {
            max_arg_len: self.max_arg_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimbindConfig::default();
        assert!(config.loader.search_paths.is_empty());
        assert_eq!(config.loader.binding, Binding::Lazy);
        assert_eq!(config.marshal.max_arg_len, 1024);
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[loader]
search_paths = ["build/sim", "/opt/models"]
binding = "now"

[marshal]
max_arg_len = 256
"#;
        let config: SimbindConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.loader.search_paths.len(), 2);
        assert_eq!(config.loader.binding, Binding::Now);
        assert_eq!(config.marshal.limits().max_arg_len, 256);

        let loader = config.loader.build();
        assert_eq!(loader.search_paths()[0], Path::new("build/sim"));
        assert_eq!(loader.binding(), Binding::Now);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SimbindConfig = toml::from_str("[loader]\n").unwrap();
        assert_eq!(config.marshal.max_arg_len, DEFAULT_MAX_ARG_LEN);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config: SimbindConfig = toml::from_str("[marshal]\nmax_arg_len = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = SimbindConfig::load(Path::new("/no/such/simbind.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("simbind-config-{}.toml", std::process::id()));
        let mut config = SimbindConfig::default();
        config.marshal.max_arg_len = 64;
        config.loader.search_paths.push(PathBuf::from("models"));
        config.save(&path).unwrap();

        let loaded = SimbindConfig::load(&path).unwrap();
        assert_eq!(loaded.marshal.max_arg_len, 64);
        assert_eq!(loaded.loader.search_paths, vec![PathBuf::from("models")]);
        let _ = std::fs::remove_file(&path);
    }
}
