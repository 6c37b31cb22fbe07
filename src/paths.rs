/// Platform-specific locations of svn-harvest's files
///
/// Base directories come from `dirs` (XDG on Linux, `Library/...` on macOS,
/// `%LOCALAPPDATA%`/`%APPDATA%` on Windows) and fall back to the working
/// directory when the platform reports none.
use std::path::PathBuf;

const APP_DIR: &str = "svn-harvest";

pub struct PlatformPaths;

impl PlatformPaths {
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns: {data_dir}/svn-harvest
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Returns: {cache_dir}/svn-harvest
    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR)
    }

    /// Returns: {config_dir}/svn-harvest
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Returns: {cache_dir}/svn-harvest/checkpoints.json
    pub fn default_checkpoint_path() -> PathBuf {
        Self::project_cache_dir().join("checkpoints.json")
    }

    /// Returns: {data_dir}/svn-harvest/locks
    pub fn default_lock_dir() -> PathBuf {
        Self::project_data_dir().join("locks")
    }

    /// Returns: {config_dir}/svn-harvest/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
