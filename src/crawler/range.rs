use crate::error::HarvestError;
use crate::repository::Repository;

/// End of the revision range that is safe to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedEnd {
    Revision(u64),
    /// The path exists at no revision in `[start, end]`
    NoValidRange,
}

/// The repository root always exists, so its range never needs narrowing
pub fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

/// Narrow `end` down to the last revision at which `path` exists
///
/// Asking the log for a path at a revision where it does not exist fails, so
/// a path deleted before the requested end is crawled up to the last revision
/// that still had it. The scan walks backwards one revision at a time.
pub fn resolve_end_revision(
    repo: &dyn Repository,
    path: &str,
    start: u64,
    end: Option<u64>,
) -> Result<ResolvedEnd, HarvestError> {
    let end = match end {
        Some(end) => end,
        None => repo.latest_revision()?,
    };

    if is_root(path) {
        return Ok(ResolvedEnd::Revision(end));
    }

    if repo.path_info(path, end)?.is_some() {
        return Ok(ResolvedEnd::Revision(end));
    }

    if start >= end {
        tracing::warn!(
            "Path [{}] does not exist at revision {} and start revision is {}",
            path,
            end,
            start
        );
        return Ok(ResolvedEnd::NoValidRange);
    }

    tracing::debug!(
        "Path [{}] missing at revision {}, scanning back to {}",
        path,
        end,
        start
    );

    for revision in (start..end).rev() {
        if repo.path_info(path, revision)?.is_some() {
            tracing::info!(
                "Path [{}] last existed at revision {}, crawling up to it",
                path,
                revision
            );
            return Ok(ResolvedEnd::Revision(revision));
        }
    }

    tracing::warn!(
        "Path [{}] likely didn't exist between revisions {} and {}",
        path,
        start,
        end
    );
    Ok(ResolvedEnd::NoValidRange)
}
