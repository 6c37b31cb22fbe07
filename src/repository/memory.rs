use super::{
    ChangedPath, ConnectorFactory, FileContent, LogEntry, PathInfo, Repository,
};
use crate::error::{ConnectionError, HarvestError, RepositoryError};
use crate::types::{ChangeKind, NodeKind, RepositoryAddress};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Timestamp of revision 0 when commits don't set one (2013-05-01T12:00:00Z)
const EPOCH_SECS: i64 = 1_367_409_600;

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: NodeKind,
    content: Vec<u8>,
    mime_type: Option<String>,
    last_changed: u64,
}

type Tree = BTreeMap<String, MemoryNode>;

/// A complete repository history held in memory
///
/// Revision 0 holds only the root directory. Each [`CommitBuilder::commit`]
/// appends one revision with its tree snapshot and log entry, so every query
/// answers exactly like a real repository would for the same history.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    address: RepositoryAddress,
    snapshots: Vec<Tree>,
    log: Vec<LogEntry>,
    failing_content: HashSet<String>,
    unreachable: bool,
}

impl MemoryRepository {
    pub fn new(address: RepositoryAddress) -> Self {
        let mut root = Tree::new();
        root.insert(
            "/".to_string(),
            MemoryNode {
                kind: NodeKind::Dir,
                content: Vec::new(),
                mime_type: None,
                last_changed: 0,
            },
        );
        Self {
            address,
            snapshots: vec![root],
            log: Vec::new(),
            failing_content: HashSet::new(),
            unreachable: false,
        }
    }

    pub fn head(&self) -> u64 {
        (self.snapshots.len() - 1) as u64
    }

    /// Start a new commit on top of the latest revision
    pub fn commit(&mut self, author: &str, message: &str) -> CommitBuilder<'_> {
        let revision = self.head() + 1;
        let tree = self.snapshots[self.snapshots.len() - 1].clone();
        CommitBuilder {
            repo: self,
            revision,
            author: Some(author.to_string()),
            message: message.to_string(),
            date: Utc
                .timestamp_opt(EPOCH_SECS + revision as i64 * 60, 0)
                .single()
                .unwrap_or_default(),
            tree,
            changes: Vec::new(),
        }
    }

    /// Make every content fetch of `path` fail
    pub fn fail_content_for(&mut self, path: &str) {
        self.failing_content.insert(normalize(path));
    }

    /// Make opening the repository fail as if the host were down
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// Factory that hands out this shared history for any address of its scheme
    pub fn connector(self: &Arc<Self>) -> ConnectorFactory {
        let repo = Arc::clone(self);
        Box::new(move |address, _credentials| {
            if repo.unreachable {
                return Err(ConnectionError::Unreachable {
                    url: address.url(),
                    reason: "repository is offline".to_string(),
                }
                .into());
            }
            Ok(Box::new(Arc::clone(&repo)) as Box<dyn Repository>)
        })
    }

    fn snapshot(&self, revision: u64) -> Result<&Tree, HarvestError> {
        self.snapshots
            .get(revision as usize)
            .ok_or_else(|| RepositoryError::NoSuchRevision(revision).into())
    }
}

impl Repository for MemoryRepository {
    fn location(&self) -> &RepositoryAddress {
        &self.address
    }

    fn latest_revision(&self) -> Result<u64, HarvestError> {
        Ok(self.head())
    }

    fn path_info(&self, path: &str, revision: u64) -> Result<Option<PathInfo>, HarvestError> {
        let path = normalize(path);
        let tree = self.snapshot(revision)?;
        Ok(tree.get(&path).map(|node| PathInfo {
            path: path.clone(),
            kind: node.kind,
            size: match node.kind {
                NodeKind::File => Some(node.content.len() as u64),
                _ => None,
            },
            last_changed_revision: node.last_changed,
        }))
    }

    fn file_content(
        &self,
        path: &str,
        revision: u64,
    ) -> Result<Option<FileContent>, HarvestError> {
        let path = normalize(path);
        if self.failing_content.contains(&path) {
            return Err(RepositoryError::CommandFailed {
                command: "cat".to_string(),
                stderr: format!("simulated failure reading {}@{}", path, revision),
            }
            .into());
        }
        let tree = self.snapshot(revision)?;
        Ok(tree
            .get(&path)
            .filter(|node| node.kind == NodeKind::File)
            .map(|node| FileContent {
                bytes: node.content.clone(),
                mime_type: node.mime_type.clone(),
            }))
    }

    fn log_entries(
        &self,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<LogEntry>, HarvestError> {
        self.snapshot(end)?;
        let path = normalize(path);
        Ok(self
            .log
            .iter()
            .filter(|entry| entry.revision >= start && entry.revision <= end)
            .filter(|entry| {
                entry
                    .changed_paths
                    .iter()
                    .any(|changed| is_within(&changed.path, &path))
            })
            .cloned()
            .collect())
    }
}

/// Builds one commit of a [`MemoryRepository`]
pub struct CommitBuilder<'a> {
    repo: &'a mut MemoryRepository,
    revision: u64,
    author: Option<String>,
    message: String,
    date: DateTime<Utc>,
    tree: Tree,
    changes: Vec<ChangedPath>,
}

impl CommitBuilder<'_> {
    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.author = None;
        self
    }

    pub fn add_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.put_file(path, content.as_ref(), None, ChangeKind::Added)
    }

    pub fn add_file_with_mime(self, path: &str, content: impl AsRef<[u8]>, mime: &str) -> Self {
        self.put_file(path, content.as_ref(), Some(mime), ChangeKind::Added)
    }

    pub fn modify_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        let mime = self
            .tree
            .get(&normalize(path))
            .and_then(|node| node.mime_type.clone());
        self.put_file(path, content.as_ref(), mime.as_deref(), ChangeKind::Modified)
    }

    /// Delete and re-add `path` in the same commit
    pub fn replace_file(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        remove_subtree(&mut self.tree, &normalize(path));
        self.put_file(path, content.as_ref(), None, ChangeKind::Replaced)
    }

    pub fn add_dir(mut self, path: &str) -> Self {
        let path = normalize(path);
        self.ensure_parents(&path);
        self.tree.insert(
            path.clone(),
            MemoryNode {
                kind: NodeKind::Dir,
                content: Vec::new(),
                mime_type: None,
                last_changed: self.revision,
            },
        );
        self.changes
            .push(ChangedPath::new(path, ChangeKind::Added, NodeKind::Dir));
        self
    }

    /// Remove `path` and everything below it
    pub fn delete(mut self, path: &str) -> Self {
        let path = normalize(path);
        let kind = self
            .tree
            .get(&path)
            .map(|node| node.kind)
            .unwrap_or(NodeKind::Unknown);
        remove_subtree(&mut self.tree, &path);
        self.changes
            .push(ChangedPath::new(path, ChangeKind::Deleted, kind));
        self
    }

    /// Copy `from` as it was at `from_revision` to `to`, like a branch or a rename's add half
    pub fn copy(mut self, from: &str, from_revision: u64, to: &str) -> Self {
        let from = normalize(from);
        let to = normalize(to);
        self.ensure_parents(&to);

        let source = self
            .repo
            .snapshots
            .get(from_revision as usize)
            .cloned()
            .unwrap_or_default();
        let mut kind = NodeKind::Unknown;
        for (path, node) in source.iter().filter(|(p, _)| is_within(p, &from)) {
            if *path == from {
                kind = node.kind;
            }
            let target = format!("{}{}", to, &path[from.len()..]);
            self.tree.insert(target, node.clone());
        }

        let mut changed = ChangedPath::new(to, ChangeKind::Added, kind);
        changed.copy_from_path = Some(from);
        changed.copy_from_revision = Some(from_revision);
        self.changes.push(changed);
        self
    }

    /// Record the revision and return its number
    pub fn commit(self) -> u64 {
        let revision = self.revision;
        self.repo.snapshots.push(self.tree);
        self.repo.log.push(LogEntry {
            revision,
            author: self.author,
            date: self.date,
            message: self.message,
            changed_paths: self.changes,
        });
        revision
    }

    fn put_file(mut self, path: &str, content: &[u8], mime: Option<&str>, change: ChangeKind) -> Self {
        let path = normalize(path);
        self.ensure_parents(&path);
        self.tree.insert(
            path.clone(),
            MemoryNode {
                kind: NodeKind::File,
                content: content.to_vec(),
                mime_type: mime.map(|m| m.to_string()),
                last_changed: self.revision,
            },
        );
        self.changes.push(ChangedPath::new(path, change, NodeKind::File));
        self
    }

    // Intermediate directories appear silently, without their own changed path
    fn ensure_parents(&mut self, path: &str) {
        let mut parent = path;
        while let Some(idx) = parent.rfind('/') {
            parent = &parent[..idx];
            if parent.is_empty() {
                break;
            }
            self.tree
                .entry(parent.to_string())
                .or_insert_with(|| MemoryNode {
                    kind: NodeKind::Dir,
                    content: Vec::new(),
                    mime_type: None,
                    last_changed: self.revision,
                });
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn is_within(candidate: &str, ancestor: &str) -> bool {
    ancestor == "/"
        || candidate == ancestor
        || candidate
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn remove_subtree(tree: &mut Tree, path: &str) {
    tree.retain(|candidate, _| !is_within(candidate, path) || (path == "/" && candidate == "/"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> MemoryRepository {
        MemoryRepository::new(RepositoryAddress::parse("mem:///repo").unwrap())
    }

    #[test]
    fn test_empty_repository() {
        let repo = repo();
        assert_eq!(repo.latest_revision().unwrap(), 0);
        let root = repo.path_info("/", 0).unwrap().unwrap();
        assert_eq!(root.kind, NodeKind::Dir);
    }

    #[test]
    fn test_path_existence_across_revisions() {
        let mut repo = repo();
        repo.commit("alice", "add").add_file("/a.txt", "one").commit();
        repo.commit("alice", "del").delete("/a.txt").commit();

        assert!(repo.path_info("/a.txt", 0).unwrap().is_none());
        let info = repo.path_info("/a.txt", 1).unwrap().unwrap();
        assert_eq!(info.kind, NodeKind::File);
        assert_eq!(info.size, Some(3));
        assert_eq!(info.last_changed_revision, 1);
        assert!(repo.path_info("/a.txt", 2).unwrap().is_none());
    }

    #[test]
    fn test_relative_paths_resolve_from_root() {
        let mut repo = repo();
        repo.commit("alice", "add").add_file("/dir/a.txt", "x").commit();
        assert!(repo.path_info("dir/a.txt", 1).unwrap().is_some());
        assert!(repo.path_info("/dir", 1).unwrap().is_some());
    }

    #[test]
    fn test_no_such_revision() {
        let repo = repo();
        let err = repo.path_info("/", 5).unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Repository(RepositoryError::NoSuchRevision(5))
        ));
    }

    #[test]
    fn test_file_content_and_mime() {
        let mut repo = repo();
        repo.commit("alice", "add")
            .add_file("/a.txt", "text")
            .add_file_with_mime("/b.bin", [0u8, 1, 2], "application/octet-stream")
            .add_dir("/d")
            .commit();

        let text = repo.file_content("/a.txt", 1).unwrap().unwrap();
        assert!(text.is_text());
        assert_eq!(text.bytes, b"text");

        let binary = repo.file_content("/b.bin", 1).unwrap().unwrap();
        assert!(!binary.is_text());

        assert!(repo.file_content("/d", 1).unwrap().is_none());
        assert!(repo.file_content("/missing", 1).unwrap().is_none());
    }

    #[test]
    fn test_failing_content() {
        let mut repo = repo();
        repo.commit("alice", "add").add_file("/a.txt", "text").commit();
        repo.fail_content_for("/a.txt");
        assert!(repo.file_content("/a.txt", 1).is_err());
    }

    #[test]
    fn test_log_filters_by_path_and_range() {
        let mut repo = repo();
        repo.commit("alice", "r1").add_file("/a.txt", "1").commit();
        repo.commit("bob", "r2").add_file("/sub/b.txt", "2").commit();
        repo.commit("carol", "r3").modify_file("/a.txt", "3").commit();

        let all = repo.log_entries("/", 0, 3).unwrap();
        assert_eq!(
            all.iter().map(|e| e.revision).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let sub = repo.log_entries("/sub", 0, 3).unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].revision, 2);
        assert_eq!(sub[0].author.as_deref(), Some("bob"));

        let ranged = repo.log_entries("/", 2, 3).unwrap();
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn test_copy_records_source() {
        let mut repo = repo();
        repo.commit("alice", "r1").add_file("/trunk/a.txt", "1").commit();
        repo.commit("alice", "branch")
            .copy("/trunk", 1, "/branches/b1")
            .commit();

        assert!(repo.path_info("/branches/b1/a.txt", 2).unwrap().is_some());
        let entry = &repo.log_entries("/", 2, 2).unwrap()[0];
        assert_eq!(entry.changed_paths.len(), 1);
        assert_eq!(
            entry.changed_paths[0].copied_from().as_deref(),
            Some("/trunk@1")
        );
    }

    #[test]
    fn test_unreachable_connector() {
        let mut inner = repo();
        inner.set_unreachable(true);
        let shared = Arc::new(inner);
        let factory = shared.connector();
        let address = RepositoryAddress::parse("mem:///repo").unwrap();
        let err = factory(&address, None).err().unwrap();
        assert!(err.is_connection());
    }
}
