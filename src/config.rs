use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Settings loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Mapper-wide switches with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperSettings {
    /// Global switch for every cache model
    pub cache_models_enabled: bool,

    /// Statement ids are qualified as `namespace.id`
    pub use_statement_namespaces: bool,

    /// Lazy sub-selects load on first access instead of with the main rows
    pub lazy_loading_enabled: bool,

    /// Entry bound for cache models that do not set a size
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Default cache size must be between 1 and 1000000"
    ))]
    pub default_cache_size: usize,

    /// Maximum nesting of eager sub-selects
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max sub-select depth must be between 1 and 64"
    ))]
    pub max_sub_select_depth: usize,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            cache_models_enabled: true,
            use_statement_namespaces: false,
            lazy_loading_enabled: true,
            default_cache_size: 100,
            max_sub_select_depth: 8,
        }
    }
}

impl MapperSettings {
    /// Create settings from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self {
            cache_models_enabled: parse_env_var("DATAMAPPER_CACHE_MODELS_ENABLED", "true")?,
            use_statement_namespaces: parse_env_var(
                "DATAMAPPER_USE_STATEMENT_NAMESPACES",
                "false",
            )?,
            lazy_loading_enabled: parse_env_var("DATAMAPPER_LAZY_LOADING_ENABLED", "true")?,
            default_cache_size: parse_env_var("DATAMAPPER_DEFAULT_CACHE_SIZE", "100")?,
            max_sub_select_depth: parse_env_var("DATAMAPPER_MAX_SUB_SELECT_DEPTH", "8")?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Create settings from a YAML file; missing keys keep their defaults
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content.to_string(),
            source: Box::new(e),
        })?;

        settings.validate()?;
        Ok(settings)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.trim().parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
