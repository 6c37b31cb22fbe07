use crate::error::ContentFetchError;
use crate::repository::{ChangedPath, LogEntry, Repository};
use crate::types::{ChangeKind, Document, FilterDecision, NodeKind, Revision};

/// Stored instead of the bytes of files whose MIME type is not textual
pub const BINARY_PLACEHOLDER: &str = "Not text type";

pub const SKIPPED_DELETED: &str = "deleted";
pub const SKIPPED_DIRECTORY: &str = "directory";
pub const SKIPPED_NOT_A_FILE: &str = "not a file";
pub const SKIPPED_FETCH_FAILED: &str = "content fetch failed";

/// A revision with no documents yet; the driver appends them
pub fn map_revision(entry: &LogEntry, repository: &str) -> Revision {
    Revision {
        revision: entry.revision,
        author: entry.author.clone(),
        date: entry.date,
        message: entry.message.clone(),
        repository: repository.to_string(),
        documents: Vec::new(),
    }
}

/// Build the document for one changed path, fetching content when allowed
///
/// A failed fetch never fails the document: it is logged and the document
/// keeps absent content.
pub fn map_document(
    repo: &dyn Repository,
    changed: &ChangedPath,
    parent: &Revision,
    decision: &FilterDecision,
) -> Document {
    let (content, content_skipped) = if changed.change == ChangeKind::Deleted {
        (None, Some(SKIPPED_DELETED.to_string()))
    } else if decision.skip_content {
        (None, decision.reason.clone())
    } else if changed.kind == NodeKind::Dir {
        (None, Some(SKIPPED_DIRECTORY.to_string()))
    } else {
        match fetch_content(repo, &changed.path, parent.revision) {
            Ok(Some(text)) => (Some(text), None),
            Ok(None) => (None, Some(SKIPPED_NOT_A_FILE.to_string())),
            Err(e) => {
                tracing::warn!("{}", e);
                (None, Some(SKIPPED_FETCH_FAILED.to_string()))
            }
        }
    };

    tracing::debug!(
        "Extracted {} {}@{}",
        changed.change.action(),
        changed.path,
        parent.revision
    );

    Document {
        path: changed.path.clone(),
        change: changed.change,
        kind: changed.kind,
        revision: parent.revision,
        repository: parent.repository.clone(),
        author: parent.author.clone(),
        date: parent.date,
        message: parent.message.clone(),
        copied_from: changed.copied_from(),
        content,
        content_skipped,
    }
}

/// `Ok(None)` when the path turns out not to be a file at that revision
fn fetch_content(
    repo: &dyn Repository,
    path: &str,
    revision: u64,
) -> Result<Option<String>, ContentFetchError> {
    let file = repo
        .file_content(path, revision)
        .map_err(|e| ContentFetchError {
            path: path.to_string(),
            revision,
            reason: e.to_string(),
        })?;

    Ok(file.map(|file| {
        if file.is_text() {
            String::from_utf8_lossy(&file.bytes).into_owned()
        } else {
            BINARY_PLACEHOLDER.to_string()
        }
    }))
}
