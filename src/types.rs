//! Data model shared by the connector, the crawler and the indexing sink
//!
//! Internal entities ([`Revision`], [`Document`]) are kept separate from their
//! external projections ([`RevisionRecord`], [`DocumentRecord`]), which define
//! exactly what gets serialized into the index.

use crate::error::{ConnectionError, ValidationError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Collection receiving revision records
pub const REVISION_COLLECTION: &str = "svnrevision";

/// Collection receiving document records
pub const DOCUMENT_COLLECTION: &str = "svndocument";

/// ISO-8601 with millisecond precision and a numeric offset, e.g. `2013-05-01T12:00:00.000+0000`
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Whether a repository is reached through the local filesystem or the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Local,
    Network { secure: bool },
}

/// Location of a repository, parsed once from a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryAddress {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    path: String,
}

impl RepositoryAddress {
    /// Parse a repository URL such as `file:///var/svn/repo` or `https://host/svn/repo`
    pub fn parse(address: &str) -> Result<Self, ConnectionError> {
        let url = url::Url::parse(address.trim()).map_err(|e| ConnectionError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_string());

        let mut path = url.path().trim_end_matches('/').to_string();
        if path.is_empty() {
            path.push('/');
        }

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host,
            port: url.port(),
            path,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path of the location within its host (or filesystem)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn protocol(&self) -> Protocol {
        match self.host {
            None => Protocol::Local,
            Some(_) => Protocol::Network {
                secure: self.scheme == "https" || self.scheme.starts_with("svn+"),
            },
        }
    }

    /// Identity string stamped on every revision of this repository
    pub fn identity(&self) -> &str {
        &self.path
    }

    /// Canonical URL form, without a trailing slash
    pub fn url(&self) -> String {
        let mut url = format!("{}://", self.scheme);
        if let Some(host) = &self.host {
            url.push_str(host);
        }
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        if self.path != "/" {
            url.push_str(&self.path);
        }
        url
    }
}

impl fmt::Display for RepositoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Login and password for network repositories
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: Option<String>) -> Self {
        Self {
            login: login.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// How a path changed within a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "D")]
    Deleted,
    #[serde(rename = "R")]
    Replaced,
}

impl ChangeKind {
    /// Parse the single-letter action used by `svn log`
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "A" => Some(ChangeKind::Added),
            "M" => Some(ChangeKind::Modified),
            "D" => Some(ChangeKind::Deleted),
            "R" => Some(ChangeKind::Replaced),
            _ => None,
        }
    }

    pub fn action(&self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Modified => 'M',
            ChangeKind::Deleted => 'D',
            ChangeKind::Replaced => 'R',
        }
    }

    /// Size is only meaningful for nodes that exist after the change
    pub fn has_meaningful_size(&self) -> bool {
        matches!(self, ChangeKind::Added | ChangeKind::Modified)
    }
}

/// Kind of versioned node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
    Unknown,
}

impl NodeKind {
    pub fn from_svn(kind: &str) -> Self {
        match kind {
            "file" => NodeKind::File,
            "dir" => NodeKind::Dir,
            _ => NodeKind::Unknown,
        }
    }
}

/// An exclusion regex, kept with its source text for reporting
#[derive(Debug, Clone)]
pub struct ExclusionPattern {
    source: String,
    regex: Regex,
}

impl ExclusionPattern {
    /// Compile a pattern that must match the whole path
    pub fn new(pattern: &str) -> Result<Self, ValidationError> {
        let regex =
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ValidationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Inputs of one crawl invocation
#[derive(Debug, Clone)]
pub struct CrawlParameters {
    pub path: String,
    pub start_revision: u64,
    /// `None` crawls up to the latest revision
    pub end_revision: Option<u64>,
    pub credentials: Option<Credentials>,
    pub exclude_patterns: Vec<ExclusionPattern>,
    pub max_file_size: Option<u64>,
}

impl CrawlParameters {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() { "/".to_string() } else { path },
            start_revision: 0,
            end_revision: None,
            credentials: None,
            exclude_patterns: Vec::new(),
            max_file_size: None,
        }
    }

    pub fn with_start_revision(mut self, start: u64) -> Self {
        self.start_revision = start;
        self
    }

    pub fn with_end_revision(mut self, end: Option<u64>) -> Self {
        self.end_revision = end;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Compile exclusion patterns, keeping configuration order
    pub fn with_exclude_patterns<S: AsRef<str>>(
        mut self,
        patterns: &[S],
    ) -> Result<Self, ValidationError> {
        self.exclude_patterns = patterns
            .iter()
            .map(|p| ExclusionPattern::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn with_max_file_size(mut self, max: Option<u64>) -> Self {
        self.max_file_size = max;
        self
    }
}

/// Outcome of evaluating exclusion policy for one changed path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterDecision {
    /// Drop the path from the revision entirely
    pub exclude: bool,
    /// Index the document but never fetch its content
    pub skip_content: bool,
    pub reason: Option<String>,
}

impl FilterDecision {
    pub fn include() -> Self {
        Self::default()
    }

    pub fn matched_pattern(pattern: &str) -> Self {
        Self {
            exclude: true,
            skip_content: true,
            reason: Some(format!("matches [{}]", pattern)),
        }
    }

    pub fn too_big(size: u64) -> Self {
        Self {
            exclude: true,
            skip_content: false,
            reason: Some(format!("size too big [{}]", size)),
        }
    }
}

/// Stable id of a revision: two crawls of the same commit yield the same id
pub fn revision_id(repository: &str, revision: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository.as_bytes());
    hasher.update([0u8]);
    hasher.update(revision.to_be_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable id of one changed path within one revision
pub fn document_id(repository: &str, path: &str, revision: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository.as_bytes());
    hasher.update([0u8]);
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update(revision.to_be_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// One commit and the documents harvested from it
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub revision: u64,
    pub author: Option<String>,
    pub date: DateTime<Utc>,
    pub message: String,
    pub repository: String,
    pub documents: Vec<Document>,
}

impl Revision {
    pub fn id(&self) -> String {
        revision_id(&self.repository, self.revision)
    }

    pub fn add_document(&mut self, document: Document) {
        self.documents.push(document);
    }

    pub fn record(&self) -> RevisionRecord {
        RevisionRecord {
            id: self.id(),
            author: self.author.clone(),
            repository: self.repository.clone(),
            revision: self.revision,
            date: format_date(&self.date),
            message: self.message.clone(),
        }
    }
}

/// One changed path within one revision
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub change: ChangeKind,
    pub kind: NodeKind,
    pub revision: u64,
    pub repository: String,
    pub author: Option<String>,
    pub date: DateTime<Utc>,
    pub message: String,
    /// Source of a copy, as `path@revision`
    pub copied_from: Option<String>,
    pub content: Option<String>,
    /// Why content was not fetched, if it was not
    pub content_skipped: Option<String>,
}

impl Document {
    pub fn id(&self) -> String {
        document_id(&self.repository, &self.path, self.revision)
    }

    pub fn record(&self) -> DocumentRecord {
        DocumentRecord {
            id: self.id(),
            path: self.path.clone(),
            revision: self.revision,
            author: self.author.clone(),
            date: format_date(&self.date),
            message: self.message.clone(),
            change: self.change,
            kind: self.kind,
            copied_from: self.copied_from.clone(),
            content: self.content.clone(),
            content_skipped: self.content_skipped.clone(),
        }
    }
}

/// Serialized form of a [`Revision`]; documents are indexed separately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub id: String,
    pub author: Option<String>,
    pub repository: String,
    pub revision: u64,
    pub date: String,
    pub message: String,
}

/// Serialized form of a [`Document`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub path: String,
    pub revision: u64,
    pub author: Option<String>,
    pub date: String,
    pub message: String,
    pub change: ChangeKind,
    pub kind: NodeKind,
    pub copied_from: Option<String>,
    pub content: Option<String>,
    pub content_skipped: Option<String>,
}
