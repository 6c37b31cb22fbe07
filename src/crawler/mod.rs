//! History crawling
//!
//! One crawl opens the repository, narrows the requested revision range to
//! one where the crawled path exists, enumerates the log for that range and
//! maps every changed path that survives the [`EntryFilter`] to a
//! [`Document`](crate::types::Document).

pub mod filter;
pub mod mapper;
pub mod range;

pub use filter::EntryFilter;
pub use mapper::{BINARY_PLACEHOLDER, map_document, map_revision};
pub use range::{ResolvedEnd, is_root, resolve_end_revision};

use crate::error::HarvestError;
use crate::repository::{ConnectorRegistry, Repository};
use crate::types::{CrawlParameters, Credentials, RepositoryAddress, Revision};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where a crawl stands, or how it ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Opening,
    ResolvingRange,
    Enumerating,
    /// Every revision of the range was processed
    Done,
    /// The range was empty or the path existed nowhere in it
    Empty,
    /// Stopped early; the revisions processed so far are kept
    Cancelled,
    Failed,
}

/// Result of one crawl invocation
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub state: CrawlState,
    pub start: u64,
    /// Resolved end; `None` when no valid range exists
    pub end: Option<u64>,
    pub revisions: Vec<Revision>,
}

impl CrawlOutcome {
    fn empty(start: u64, end: Option<u64>) -> Self {
        Self {
            state: CrawlState::Empty,
            start,
            end,
            revisions: Vec::new(),
        }
    }

    /// Highest revision harvested, if any
    pub fn last_revision(&self) -> Option<u64> {
        self.revisions.last().map(|r| r.revision)
    }

    pub fn document_count(&self) -> usize {
        self.revisions.iter().map(|r| r.documents.len()).sum()
    }
}

/// Runs crawls against repositories opened through a [`ConnectorRegistry`]
///
/// Holds no per-crawl state; one instance serves any number of sequential or
/// concurrent invocations.
pub struct Crawler {
    registry: ConnectorRegistry,
}

impl Crawler {
    pub fn new(registry: ConnectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// HEAD revision of the repository at `address`
    pub fn latest_revision(
        &self,
        address: &RepositoryAddress,
        credentials: Option<&Credentials>,
    ) -> Result<u64, HarvestError> {
        let repo = self.registry.open(address, credentials)?;
        repo.latest_revision()
    }

    /// Open `address` and crawl it
    pub fn crawl(
        &self,
        address: &RepositoryAddress,
        params: &CrawlParameters,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, HarvestError> {
        tracing::debug!("Crawl state: {:?} {}", CrawlState::Opening, address);
        let repo = self
            .registry
            .open(address, params.credentials.as_ref())
            .inspect_err(|e| tracing::error!("Failed to open {}: {}", address, e))?;
        crawl_repository(repo.as_ref(), params, cancel)
    }
}

/// Crawl an already opened repository
pub fn crawl_repository(
    repo: &dyn Repository,
    params: &CrawlParameters,
    cancel: &CancellationToken,
) -> Result<CrawlOutcome, HarvestError> {
    let started = Instant::now();
    let identity = repo.identity();
    let start = params.start_revision;

    tracing::debug!("Crawl state: {:?}", CrawlState::ResolvingRange);
    let end = match resolve_end_revision(repo, &params.path, start, params.end_revision)
        .inspect_err(|e| log_failure(&params.path, e))?
    {
        ResolvedEnd::Revision(end) => end,
        ResolvedEnd::NoValidRange => {
            tracing::warn!(
                "No revision range to crawl for path [{}] from revision {}",
                params.path,
                start
            );
            return Ok(CrawlOutcome::empty(start, None));
        }
    };

    if start > end {
        tracing::info!(
            "Nothing to crawl for path [{}]: start {} is after end {}",
            params.path,
            start,
            end
        );
        return Ok(CrawlOutcome::empty(start, Some(end)));
    }

    tracing::info!(
        "Crawling {} path [{}] revisions {}..={}",
        identity,
        params.path,
        start,
        end
    );

    tracing::debug!("Crawl state: {:?}", CrawlState::Enumerating);
    let entries = repo
        .log_entries(&params.path, start, end)
        .inspect_err(|e| log_failure(&params.path, e))?;

    let filter = EntryFilter::new(params);
    let mut revisions: Vec<Revision> = Vec::with_capacity(entries.len());
    let mut state = CrawlState::Done;

    for entry in &entries {
        if cancel.is_cancelled() {
            tracing::info!(
                "Crawl of [{}] cancelled after {} revisions",
                params.path,
                revisions.len()
            );
            state = CrawlState::Cancelled;
            break;
        }

        if let Some(previous) = revisions.last()
            && entry.revision <= previous.revision
        {
            tracing::warn!(
                "Ignoring out-of-order log entry r{} after r{}",
                entry.revision,
                previous.revision
            );
            continue;
        }

        let mut revision = map_revision(entry, &identity);
        for changed in &entry.changed_paths {
            let decision = match filter.decide(repo, entry.revision, changed) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!("Skipping {}@{}: {}", changed.path, entry.revision, e);
                    continue;
                }
            };
            if decision.exclude {
                continue;
            }
            revision.add_document(map_document(repo, changed, &revision, &decision));
        }

        tracing::debug!(
            "Extracted r{} with {} documents",
            revision.revision,
            revision.documents.len()
        );
        revisions.push(revision);
    }

    let outcome = CrawlOutcome {
        state,
        start,
        end: Some(end),
        revisions,
    };

    tracing::info!(
        "Crawled {} revisions ({} documents) of [{}] in {:?}",
        outcome.revisions.len(),
        outcome.document_count(),
        params.path,
        started.elapsed()
    );

    Ok(outcome)
}

fn log_failure(path: &str, err: &HarvestError) {
    tracing::error!(
        "Crawl of [{}] failed in state {:?}: {}",
        path,
        CrawlState::Failed,
        err
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ChangedPath, FileContent, LogEntry, MemoryRepository, PathInfo};
    use crate::types::{ChangeKind, NodeKind};
    use std::sync::Arc;

    fn address() -> RepositoryAddress {
        RepositoryAddress::parse("mem:///repo").unwrap()
    }

    fn crawler_for(repo: MemoryRepository) -> Crawler {
        let mut registry = ConnectorRegistry::new();
        registry.register("mem", Arc::new(repo).connector());
        Crawler::new(registry)
    }

    fn three_files() -> MemoryRepository {
        let mut repo = MemoryRepository::new(address());
        repo.commit("alice", "one").add_file("/file1", "first").commit();
        repo.commit("bob", "two").add_file("/file2", "second").commit();
        repo.commit("carol", "three").add_file("/file3", "third").commit();
        repo
    }

    #[test]
    fn test_crawl_whole_history() {
        let crawler = crawler_for(three_files());
        let outcome = crawler
            .crawl(&address(), &CrawlParameters::new("/"), &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.state, CrawlState::Done);
        assert_eq!(outcome.end, Some(3));
        let numbers: Vec<u64> = outcome.revisions.iter().map(|r| r.revision).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(outcome.document_count(), 3);
        assert_eq!(outcome.last_revision(), Some(3));
        assert_eq!(
            outcome.revisions[1].documents[0].content.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_crawl_sub_range() {
        let crawler = crawler_for(three_files());
        let params = CrawlParameters::new("/")
            .with_start_revision(2)
            .with_end_revision(Some(2));
        let outcome = crawler
            .crawl(&address(), &params, &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.revisions.len(), 1);
        assert_eq!(outcome.revisions[0].revision, 2);
    }

    #[test]
    fn test_start_after_end_is_empty() {
        let crawler = crawler_for(three_files());
        let params = CrawlParameters::new("/").with_start_revision(4);
        let outcome = crawler
            .crawl(&address(), &params, &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.state, CrawlState::Empty);
        assert_eq!(outcome.end, Some(3));
        assert!(outcome.revisions.is_empty());
    }

    #[test]
    fn test_missing_path_is_empty() {
        let crawler = crawler_for(three_files());
        let outcome = crawler
            .crawl(
                &address(),
                &CrawlParameters::new("/nowhere"),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(outcome.state, CrawlState::Empty);
        assert_eq!(outcome.end, None);
    }

    #[test]
    fn test_cancelled_before_first_commit() {
        let crawler = crawler_for(three_files());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = crawler
            .crawl(&address(), &CrawlParameters::new("/"), &cancel)
            .unwrap();
        assert_eq!(outcome.state, CrawlState::Cancelled);
        assert!(outcome.revisions.is_empty());
    }

    #[test]
    fn test_excluded_paths_leave_revision_in_place() {
        let mut repo = MemoryRepository::new(address());
        repo.commit("alice", "mixed")
            .add_file("/keep.txt", "k")
            .add_file("/drop.log", "d")
            .commit();
        let crawler = crawler_for(repo);
        let params = CrawlParameters::new("/")
            .with_exclude_patterns(&[r".*\.log"])
            .unwrap();
        let outcome = crawler
            .crawl(&address(), &params, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.revisions.len(), 1);
        let paths: Vec<&str> = outcome.revisions[0]
            .documents
            .iter()
            .map(|d| d.path.as_str())
            .collect();
        assert_eq!(paths, vec!["/keep.txt"]);
    }

    /// Reports a modification of a path the history never had
    struct PhantomChange(MemoryRepository);

    impl Repository for PhantomChange {
        fn location(&self) -> &RepositoryAddress {
            self.0.location()
        }

        fn latest_revision(&self) -> Result<u64, HarvestError> {
            self.0.latest_revision()
        }

        fn path_info(
            &self,
            path: &str,
            revision: u64,
        ) -> Result<Option<PathInfo>, HarvestError> {
            self.0.path_info(path, revision)
        }

        fn file_content(
            &self,
            path: &str,
            revision: u64,
        ) -> Result<Option<FileContent>, HarvestError> {
            self.0.file_content(path, revision)
        }

        fn log_entries(
            &self,
            path: &str,
            start: u64,
            end: u64,
        ) -> Result<Vec<LogEntry>, HarvestError> {
            let mut entries = self.0.log_entries(path, start, end)?;
            for entry in &mut entries {
                entry.changed_paths.insert(
                    0,
                    ChangedPath::new("/phantom.txt", ChangeKind::Modified, NodeKind::File),
                );
            }
            Ok(entries)
        }
    }

    #[test]
    fn test_mapping_error_skips_only_that_document() {
        let repo = PhantomChange(three_files());
        let params = CrawlParameters::new("/").with_max_file_size(Some(1024));
        let outcome = crawl_repository(&repo, &params, &CancellationToken::new()).unwrap();

        assert_eq!(outcome.state, CrawlState::Done);
        assert_eq!(outcome.revisions.len(), 3);
        for revision in &outcome.revisions {
            assert_eq!(revision.documents.len(), 1);
            assert_ne!(revision.documents[0].path, "/phantom.txt");
        }
    }

    /// Cancels the crawl while fetching content of `revision`
    struct CancelDuringFetch {
        inner: MemoryRepository,
        revision: u64,
        cancel: CancellationToken,
    }

    impl Repository for CancelDuringFetch {
        fn location(&self) -> &RepositoryAddress {
            self.inner.location()
        }

        fn latest_revision(&self) -> Result<u64, HarvestError> {
            self.inner.latest_revision()
        }

        fn path_info(
            &self,
            path: &str,
            revision: u64,
        ) -> Result<Option<PathInfo>, HarvestError> {
            self.inner.path_info(path, revision)
        }

        fn file_content(
            &self,
            path: &str,
            revision: u64,
        ) -> Result<Option<FileContent>, HarvestError> {
            if revision == self.revision {
                self.cancel.cancel();
            }
            self.inner.file_content(path, revision)
        }

        fn log_entries(
            &self,
            path: &str,
            start: u64,
            end: u64,
        ) -> Result<Vec<LogEntry>, HarvestError> {
            self.inner.log_entries(path, start, end)
        }
    }

    #[test]
    fn test_cancelled_mid_crawl_keeps_finished_revisions() {
        let cancel = CancellationToken::new();
        let repo = CancelDuringFetch {
            inner: three_files(),
            revision: 2,
            cancel: cancel.clone(),
        };
        let outcome = crawl_repository(&repo, &CrawlParameters::new("/"), &cancel).unwrap();

        assert_eq!(outcome.state, CrawlState::Cancelled);
        let numbers: Vec<u64> = outcome.revisions.iter().map(|r| r.revision).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(
            outcome.revisions[1].documents[0].content.as_deref(),
            Some("second")
        );
        assert_eq!(outcome.last_revision(), Some(2));
    }

    #[test]
    fn test_unreachable_repository_fails() {
        let mut repo = three_files();
        repo.set_unreachable(true);
        let crawler = crawler_for(repo);
        let err = crawler
            .crawl(&address(), &CrawlParameters::new("/"), &CancellationToken::new())
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_latest_revision() {
        let crawler = crawler_for(three_files());
        assert_eq!(crawler.latest_revision(&address(), None).unwrap(), 3);
    }

    #[test]
    fn test_revision_ids_are_stable() {
        let crawler = crawler_for(three_files());
        let cancel = CancellationToken::new();
        let first = crawler
            .crawl(&address(), &CrawlParameters::new("/"), &cancel)
            .unwrap();
        let second = crawler
            .crawl(&address(), &CrawlParameters::new("/"), &cancel)
            .unwrap();
        let ids = |o: &CrawlOutcome| -> Vec<String> { o.revisions.iter().map(|r| r.id()).collect() };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.revisions, second.revisions);
    }
}
