// Configuration management module
// Handles TOML configuration loading and validation

pub mod settings;

pub use settings::{
    AppConfig, CompletionConfig, Config, ConfigError, DatabaseConfig, EmbeddingConfig,
    RetrievalConfig,
};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("concierge"))
        .ok_or(ConfigError::DirectoryError)
}
