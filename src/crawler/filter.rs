use crate::error::MappingError;
use crate::repository::{ChangedPath, Repository};
use crate::types::{CrawlParameters, ExclusionPattern, FilterDecision};

/// Exclusion policy for the changed paths of one crawl
///
/// Patterns are checked first, in configuration order; the size ceiling only
/// applies to paths that exist after the change.
pub struct EntryFilter {
    patterns: Vec<ExclusionPattern>,
    max_file_size: Option<u64>,
}

impl EntryFilter {
    pub fn new(params: &CrawlParameters) -> Self {
        Self {
            patterns: params.exclude_patterns.clone(),
            max_file_size: params.max_file_size,
        }
    }

    pub fn decide(
        &self,
        repo: &dyn Repository,
        revision: u64,
        changed: &ChangedPath,
    ) -> Result<FilterDecision, MappingError> {
        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(&changed.path)) {
            let decision = FilterDecision::matched_pattern(pattern.as_str());
            log_exclusion(&changed.path, revision, &decision);
            return Ok(decision);
        }

        if let Some(max) = self.max_file_size
            && changed.change.has_meaningful_size()
        {
            let info = repo
                .path_info(&changed.path, revision)
                .map_err(|e| MappingError::Lookup {
                    path: changed.path.clone(),
                    revision,
                    reason: e.to_string(),
                })?
                .ok_or_else(|| MappingError::MissingEntry {
                    path: changed.path.clone(),
                    revision,
                })?;

            if let Some(size) = info.size
                && size > max
            {
                let decision = FilterDecision::too_big(size);
                log_exclusion(&changed.path, revision, &decision);
                return Ok(decision);
            }
        }

        Ok(FilterDecision::include())
    }
}

fn log_exclusion(path: &str, revision: u64, decision: &FilterDecision) {
    tracing::warn!(
        "Excluding {}@{}: {}",
        path,
        revision,
        decision.reason.as_deref().unwrap_or("no reason")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use crate::types::{ChangeKind, NodeKind, RepositoryAddress};

    fn repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new(RepositoryAddress::parse("mem:///repo").unwrap());
        repo.commit("alice", "files")
            .add_file("/small.txt", "tiny")
            .add_file("/big.bin", vec![0u8; 64])
            .add_dir("/docs")
            .commit();
        repo
    }

    fn changed(path: &str, change: ChangeKind, kind: NodeKind) -> ChangedPath {
        ChangedPath::new(path, change, kind)
    }

    #[test]
    fn test_no_policy_includes_everything() {
        let filter = EntryFilter::new(&CrawlParameters::new("/"));
        let decision = filter
            .decide(
                &repo(),
                1,
                &changed("/big.bin", ChangeKind::Added, NodeKind::File),
            )
            .unwrap();
        assert_eq!(decision, FilterDecision::include());
    }

    #[test]
    fn test_pattern_must_match_whole_path() {
        let params = CrawlParameters::new("/")
            .with_exclude_patterns(&["big"])
            .unwrap();
        let filter = EntryFilter::new(&params);
        let decision = filter
            .decide(
                &repo(),
                1,
                &changed("/big.bin", ChangeKind::Added, NodeKind::File),
            )
            .unwrap();
        assert!(!decision.exclude);
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let params = CrawlParameters::new("/")
            .with_exclude_patterns(&[r".*\.txt", r".*\.bin", r"/big.*"])
            .unwrap()
            .with_max_file_size(Some(1));
        let filter = EntryFilter::new(&params);
        let decision = filter
            .decide(
                &repo(),
                1,
                &changed("/big.bin", ChangeKind::Added, NodeKind::File),
            )
            .unwrap();
        assert!(decision.exclude);
        assert!(decision.skip_content);
        assert_eq!(decision.reason.as_deref(), Some(r"matches [.*\.bin]"));
    }

    #[test]
    fn test_size_ceiling() {
        let params = CrawlParameters::new("/").with_max_file_size(Some(10));
        let filter = EntryFilter::new(&params);
        let repo = repo();

        let decision = filter
            .decide(
                &repo,
                1,
                &changed("/big.bin", ChangeKind::Added, NodeKind::File),
            )
            .unwrap();
        assert!(decision.exclude);
        assert!(!decision.skip_content);
        assert_eq!(decision.reason.as_deref(), Some("size too big [64]"));

        let decision = filter
            .decide(
                &repo,
                1,
                &changed("/small.txt", ChangeKind::Added, NodeKind::File),
            )
            .unwrap();
        assert!(!decision.exclude);
    }

    #[test]
    fn test_directories_pass_size_ceiling() {
        let params = CrawlParameters::new("/").with_max_file_size(Some(0));
        let filter = EntryFilter::new(&params);
        let decision = filter
            .decide(&repo(), 1, &changed("/docs", ChangeKind::Added, NodeKind::Dir))
            .unwrap();
        assert!(!decision.exclude);
    }

    #[test]
    fn test_deleted_paths_skip_size_lookup() {
        let params = CrawlParameters::new("/").with_max_file_size(Some(0));
        let filter = EntryFilter::new(&params);
        let decision = filter
            .decide(
                &repo(),
                1,
                &changed("/gone.txt", ChangeKind::Deleted, NodeKind::File),
            )
            .unwrap();
        assert_eq!(decision, FilterDecision::include());
    }

    #[test]
    fn test_missing_entry_is_mapping_error() {
        let params = CrawlParameters::new("/").with_max_file_size(Some(10));
        let filter = EntryFilter::new(&params);
        let err = filter
            .decide(
                &repo(),
                1,
                &changed("/phantom.txt", ChangeKind::Modified, NodeKind::File),
            )
            .unwrap_err();
        assert!(matches!(err, MappingError::MissingEntry { revision: 1, .. }));
    }

    #[test]
    fn test_lookup_failure_is_mapping_error() {
        let params = CrawlParameters::new("/").with_max_file_size(Some(10));
        let filter = EntryFilter::new(&params);
        let err = filter
            .decide(
                &repo(),
                99,
                &changed("/small.txt", ChangeKind::Modified, NodeKind::File),
            )
            .unwrap_err();
        assert!(matches!(err, MappingError::Lookup { .. }));
    }
}
