/// Centralized error types for svn-harvest using thiserror
///
/// Connection failures are the only ones that halt a crawl; content and
/// mapping failures are recovered where they happen and only surface in logs.
use thiserror::Error;

/// Main error type for the harvester
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors raised while opening a repository location
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Unsupported repository scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid repository address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Repository unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Authentication rejected for {url}: {reason}")]
    AuthenticationFailed { url: String, reason: String },

    #[error("Failed to launch svn client: {0}")]
    ClientUnavailable(String),
}

/// Unrecoverable failures talking to an already opened repository
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("svn {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse svn {command} output: {reason}")]
    ParseFailed { command: String, reason: String },

    #[error("No such revision: {0}")]
    NoSuchRevision(u64),
}

/// Failure fetching one file's content; the document keeps absent content
#[derive(Error, Debug)]
#[error("Failed to fetch content of {path}@{revision}: {reason}")]
pub struct ContentFetchError {
    pub path: String,
    pub revision: u64,
    pub reason: String,
}

/// Unexpected data for one changed path; the document is skipped
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Path {path} is missing at revision {revision}")]
    MissingEntry { path: String, revision: u64 },

    #[error("Failed to inspect {path}@{revision}: {reason}")]
    Lookup {
        path: String,
        revision: u64,
        reason: String,
    },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },
}

/// Errors related to the revision checkpoint file
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to load checkpoint from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save checkpoint to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

/// Errors related to handing records to the indexing sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to serialize record '{id}': {reason}")]
    Serialize { id: String, reason: String },

    #[error("Failed to write bulk request: {0}")]
    WriteFailed(String),
}

impl HarvestError {
    /// Connection-level failures are the only ones that halt an invocation
    pub fn is_connection(&self) -> bool {
        matches!(self, HarvestError::Connection(_))
    }

    /// Check if this is a user error (configuration, validation) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            HarvestError::Validation(_)
                | HarvestError::Config(_)
                | HarvestError::Connection(ConnectionError::UnsupportedScheme(_))
                | HarvestError::Connection(ConnectionError::InvalidAddress { .. })
        )
    }

    /// Check if retrying on the next scheduled run may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvestError::Connection(ConnectionError::Unreachable { .. })
                | HarvestError::Repository(RepositoryError::CommandFailed { .. })
        )
    }
}
