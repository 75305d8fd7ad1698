
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_NUM_RESULTS: usize = 5;
pub const DEFAULT_BUFFER_CAPACITY: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub name: String,
    pub website: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_start_button_text")]
    pub start_button_text: String,
    #[serde(default)]
    pub logo_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    /// Full connection URL override. A `sqlite:` URL selects the SQLite
    /// backend; otherwise the MySQL backend is built from the fields above.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionConfig {
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub num_results: usize,
    pub buffer_capacity: usize,
}

fn default_icon() -> String {
    "🤖".to_string()
}

fn default_description() -> String {
    "Secure AI-powered chat interface".to_string()
}

fn default_start_button_text() -> String {
    "Start chat session".to_string()
}

fn default_completion_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_results: DEFAULT_NUM_RESULTS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error(
        "Configuration file not found: {0}. Create it with the required [app], [database], and [completion] settings"
    )]
    MissingFile(PathBuf),
    #[error("Missing required setting: {0} (cannot be empty)")]
    MissingSetting(&'static str),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid result count: {0} (must be between 1 and 20)")]
    InvalidNumResults(usize),
    #[error("Invalid buffer capacity: {0} (must be between 1 and 10)")]
    InvalidBufferCapacity(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    /// Load and validate configuration from `config.toml` in the given
    /// directory. A missing file or missing required key is fatal.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Err(ConfigError::MissingFile(config_path).into());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app.validate()?;
        self.database.validate()?;
        self.completion.validate()?;
        self.embedding.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingSetting("app.name"));
        }
        if self.website.trim().is_empty() {
            return Err(ConfigError::MissingSetting("app.website"));
        }
        Url::parse(&self.website).map_err(|_| ConfigError::InvalidUrl(self.website.clone()))?;
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(ConfigError::MissingSetting("database.url"));
            }
            return Ok(());
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingSetting("database.host"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::MissingSetting("database.user"));
        }
        if self.password.trim().is_empty() {
            return Err(ConfigError::MissingSetting("database.password"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingSetting("database.name"));
        }
        Ok(())
    }
}

impl CompletionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingSetting("completion.api_key"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingSetting("completion.model"));
        }
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingSetting("embedding.model"));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    pub fn embedding_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_results == 0 || self.num_results > 20 {
            return Err(ConfigError::InvalidNumResults(self.num_results));
        }
        if self.buffer_capacity == 0 || self.buffer_capacity > 10 {
            return Err(ConfigError::InvalidBufferCapacity(self.buffer_capacity));
        }
        Ok(())
    }
}
