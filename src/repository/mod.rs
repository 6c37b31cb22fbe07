//! Repository connectors
//!
//! A [`Repository`] answers the four questions the crawler asks of a
//! Subversion repository: what is the latest revision, does a path exist at a
//! revision, what are a file's bytes at a revision, and which commits touched a
//! path in a revision range. Connectors are opened through a
//! [`ConnectorRegistry`] keyed by URL scheme.

/// In-process repository history for tests and benchmarks
pub mod memory;
/// Connector driving the `svn` command-line client
pub mod svn;
/// Parsers for `svn --xml` output
pub mod xml;

pub use memory::MemoryRepository;
pub use svn::SvnCommandRepository;

use crate::error::{ConnectionError, HarvestError};
use crate::types::{ChangeKind, Credentials, NodeKind, RepositoryAddress};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata of a path that exists at a given revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub path: String,
    pub kind: NodeKind,
    /// Only known for files
    pub size: Option<u64>,
    pub last_changed_revision: u64,
}

/// Bytes of a file at a revision and its declared MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl FileContent {
    /// Subversion treats files without a MIME type as text
    pub fn is_text(&self) -> bool {
        is_text_mime_type(self.mime_type.as_deref())
    }
}

pub fn is_text_mime_type(mime_type: Option<&str>) -> bool {
    match mime_type {
        None => true,
        Some(mime) => {
            let mime = mime.trim();
            mime.is_empty()
                || mime.starts_with("text/")
                || mime == "image/x-xbitmap"
                || mime == "image/x-xpixmap"
        }
    }
}

/// One path touched by a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    pub path: String,
    pub change: ChangeKind,
    pub kind: NodeKind,
    pub copy_from_path: Option<String>,
    pub copy_from_revision: Option<u64>,
}

impl ChangedPath {
    pub fn new(path: impl Into<String>, change: ChangeKind, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            change,
            kind,
            copy_from_path: None,
            copy_from_revision: None,
        }
    }

    pub fn copied_from(&self) -> Option<String> {
        match (&self.copy_from_path, self.copy_from_revision) {
            (Some(path), Some(rev)) => Some(format!("{}@{}", path, rev)),
            (Some(path), None) => Some(path.clone()),
            _ => None,
        }
    }
}

/// One commit as reported by the repository log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub revision: u64,
    pub author: Option<String>,
    pub date: DateTime<Utc>,
    pub message: String,
    /// In the order the repository reported them
    pub changed_paths: Vec<ChangedPath>,
}

/// Read access to one opened repository location
///
/// Paths starting with `/` are relative to the repository root; other paths
/// are relative to the opened location.
pub trait Repository: Send + Sync {
    /// The address this handle was opened on
    fn location(&self) -> &RepositoryAddress;

    /// Identity string stamped on harvested revisions
    fn identity(&self) -> String {
        self.location().identity().to_string()
    }

    fn latest_revision(&self) -> Result<u64, HarvestError>;

    /// `Ok(None)` when the path does not exist at that revision
    fn path_info(&self, path: &str, revision: u64) -> Result<Option<PathInfo>, HarvestError>;

    /// `Ok(None)` when the path is not a file at that revision
    fn file_content(&self, path: &str, revision: u64)
    -> Result<Option<FileContent>, HarvestError>;

    /// Commits touching `path` in `[start, end]`, by increasing revision
    fn log_entries(&self, path: &str, start: u64, end: u64)
    -> Result<Vec<LogEntry>, HarvestError>;
}

impl<R: Repository + ?Sized> Repository for Arc<R> {
    fn location(&self) -> &RepositoryAddress {
        (**self).location()
    }

    fn identity(&self) -> String {
        (**self).identity()
    }

    fn latest_revision(&self) -> Result<u64, HarvestError> {
        (**self).latest_revision()
    }

    fn path_info(&self, path: &str, revision: u64) -> Result<Option<PathInfo>, HarvestError> {
        (**self).path_info(path, revision)
    }

    fn file_content(
        &self,
        path: &str,
        revision: u64,
    ) -> Result<Option<FileContent>, HarvestError> {
        (**self).file_content(path, revision)
    }

    fn log_entries(
        &self,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<LogEntry>, HarvestError> {
        (**self).log_entries(path, start, end)
    }
}

/// Opens a repository handle for an address
pub type ConnectorFactory = Box<
    dyn Fn(&RepositoryAddress, Option<&Credentials>) -> Result<Box<dyn Repository>, HarvestError>
        + Send
        + Sync,
>;

/// Schemes handled by the `svn` command-line client
pub const SVN_SCHEMES: [&str; 5] = ["file", "svn", "svn+ssh", "http", "https"];

/// Scheme → connector factory, built once at start-up
#[derive(Default)]
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the command-line connector installed for every svn scheme
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for scheme in SVN_SCHEMES {
            registry.register(
                scheme,
                Box::new(|address, credentials| {
                    let repo = SvnCommandRepository::open(address, credentials)?;
                    Ok(Box::new(repo) as Box<dyn Repository>)
                }),
            );
        }
        registry
    }

    /// Install (or replace) the factory for a scheme
    pub fn register(&mut self, scheme: &str, factory: ConnectorFactory) {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.factories.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Open a handle, failing with a connection error for unknown schemes
    pub fn open(
        &self,
        address: &RepositoryAddress,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Repository>, HarvestError> {
        let factory = self
            .factories
            .get(address.scheme())
            .ok_or_else(|| ConnectionError::UnsupportedScheme(address.scheme().to_string()))?;

        tracing::debug!("Opening repository {} via '{}' connector", address, address.scheme());
        factory(address, credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_mime_types() {
        assert!(is_text_mime_type(None));
        assert!(is_text_mime_type(Some("text/plain")));
        assert!(is_text_mime_type(Some("text/x-java; charset=utf-8")));
        assert!(is_text_mime_type(Some("image/x-xbitmap")));
        assert!(!is_text_mime_type(Some("application/octet-stream")));
        assert!(!is_text_mime_type(Some("image/png")));
    }

    #[test]
    fn test_copied_from() {
        let mut changed = ChangedPath::new("/branches/b1", ChangeKind::Added, NodeKind::Dir);
        assert_eq!(changed.copied_from(), None);

        changed.copy_from_path = Some("/trunk".to_string());
        changed.copy_from_revision = Some(12);
        assert_eq!(changed.copied_from().as_deref(), Some("/trunk@12"));
    }

    #[test]
    fn test_default_registry_schemes() {
        let registry = ConnectorRegistry::with_defaults();
        assert_eq!(
            registry.schemes(),
            vec!["file", "http", "https", "svn", "svn+ssh"]
        );
        assert!(registry.supports("HTTPS"));
        assert!(!registry.supports("ftp"));
    }

    #[test]
    fn test_open_unsupported_scheme() {
        let registry = ConnectorRegistry::with_defaults();
        let address = RepositoryAddress::parse("ftp://example.org/repo").unwrap();
        let err = registry.open(&address, None).err().unwrap();
        assert!(err.is_connection());
        assert!(matches!(
            err,
            HarvestError::Connection(ConnectionError::UnsupportedScheme(ref s)) if s == "ftp"
        ));
    }

    #[test]
    fn test_register_custom_scheme() {
        let mut registry = ConnectorRegistry::new();
        let repo = Arc::new(
            MemoryRepository::new(RepositoryAddress::parse("mem:///demo").unwrap()),
        );
        registry.register("mem", repo.connector());

        let address = RepositoryAddress::parse("mem:///demo").unwrap();
        let handle = registry.open(&address, None).unwrap();
        assert_eq!(handle.latest_revision().unwrap(), 0);
        assert_eq!(handle.identity(), "/demo");
    }
}
