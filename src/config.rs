/// Configuration system for svn-harvest
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, HarvestError};
use crate::types::{CrawlParameters, Credentials, ExclusionPattern, RepositoryAddress};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Where to crawl and as whom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository URL, e.g. `svn://host/repo` or `file:///var/svn/repo`
    #[serde(default)]
    pub url: String,

    /// Path within the repository to crawl
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub login: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Revision window and exclusion policy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrawlConfig {
    #[serde(default)]
    pub start_revision: u64,

    /// Absent means the latest revision
    #[serde(default)]
    pub end_revision: Option<u64>,

    /// Regular expressions matched against the whole changed path
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Files larger than this (in bytes) are left out
    #[serde(default)]
    pub max_file_size: Option<u64>,
}

/// Indexing sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,

    /// Actions per bulk request
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,

    /// NDJSON output file; stdout when absent
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Pause between two crawls in watch mode
    #[serde(default = "default_update_rate_secs")]
    pub update_rate_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

// Default value functions
fn default_path() -> String {
    "/".to_string()
}

fn default_index_name() -> String {
    "svn".to_string()
}

fn default_bulk_size() -> usize {
    200
}

fn default_update_rate_secs() -> u64 {
    15 * 60
}

fn default_checkpoint_path() -> PathBuf {
    crate::paths::PlatformPaths::default_checkpoint_path()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: default_path(),
            login: None,
            password: None,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            bulk_size: default_bulk_size(),
            output: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_rate_secs: default_update_rate_secs(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, HarvestError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, HarvestError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from `path` (or the default location), apply env overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self, HarvestError> {
        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)?
            }
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), HarvestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.repository.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("repository.url".to_string()).into());
        }

        RepositoryAddress::parse(&self.repository.url).map_err(|e| ConfigError::InvalidValue {
            key: "repository.url".to_string(),
            reason: e.to_string(),
        })?;

        if self.index.bulk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.bulk_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.schedule.update_rate_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "schedule.update_rate_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if let Some(end) = self.crawl.end_revision
            && end < self.crawl.start_revision
        {
            return Err(ConfigError::InvalidValue {
                key: "crawl.end_revision".to_string(),
                reason: format!(
                    "must not be lower than start_revision ({}), got {}",
                    self.crawl.start_revision, end
                ),
            }
            .into());
        }

        for pattern in &self.crawl.exclude_patterns {
            ExclusionPattern::new(pattern)?;
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SVN_HARVEST_*` overrides from `lookup`; unparsable numbers are ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SVN_HARVEST_URL") {
            self.repository.url = url;
        }

        if let Some(path) = lookup("SVN_HARVEST_PATH") {
            self.repository.path = path;
        }

        if let Some(login) = lookup("SVN_HARVEST_LOGIN") {
            self.repository.login = Some(login);
        }

        if let Some(password) = lookup("SVN_HARVEST_PASSWORD") {
            self.repository.password = Some(password);
        }

        if let Some(rate) = lookup("SVN_HARVEST_UPDATE_RATE")
            && let Ok(secs) = rate.parse()
        {
            self.schedule.update_rate_secs = secs;
        }

        if let Some(bulk_size) = lookup("SVN_HARVEST_BULK_SIZE")
            && let Ok(size) = bulk_size.parse()
        {
            self.index.bulk_size = size;
        }
    }

    pub fn address(&self) -> Result<RepositoryAddress, HarvestError> {
        Ok(RepositoryAddress::parse(&self.repository.url)?)
    }

    /// Credentials, if a login is configured
    pub fn credentials(&self) -> Option<Credentials> {
        self.repository
            .login
            .as_ref()
            .filter(|login| !login.is_empty())
            .map(|login| Credentials::new(login.clone(), self.repository.password.clone()))
    }

    /// Parameters of a crawl starting at `start` (the configured start when `None`)
    pub fn crawl_parameters(&self, start: Option<u64>) -> Result<CrawlParameters, HarvestError> {
        Ok(CrawlParameters::new(self.repository.path.clone())
            .with_start_revision(start.unwrap_or(self.crawl.start_revision))
            .with_end_revision(self.crawl.end_revision)
            .with_credentials(self.credentials())
            .with_exclude_patterns(&self.crawl.exclude_patterns)?
            .with_max_file_size(self.crawl.max_file_size))
    }

    /// Checkpoint key of the configured repository path
    pub fn checkpoint_key(&self) -> Result<String, HarvestError> {
        Ok(crate::checkpoint::RevisionCheckpoint::key(
            &self.address()?.url(),
            &self.repository.path,
        ))
    }

    pub fn update_rate(&self) -> Duration {
        Duration::from_secs(self.schedule.update_rate_secs)
    }
}
