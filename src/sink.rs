//! Indexing sink
//!
//! Harvested revisions are turned into [`IndexAction`]s, one per revision and
//! one per document, and handed to an [`IndexSink`] in bulk batches. Ids are
//! content-addressed, so re-submitting a revision overwrites rather than
//! duplicates it.

use crate::error::SinkError;
use crate::types::{DOCUMENT_COLLECTION, REVISION_COLLECTION, Revision};
use serde::Serialize;
use std::io::Write;

/// One record to (re)index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexAction {
    pub id: String,
    pub collection: &'static str,
    pub source: serde_json::Value,
}

impl IndexAction {
    fn new<T: Serialize>(id: String, collection: &'static str, record: &T) -> Result<Self, SinkError> {
        let source = serde_json::to_value(record).map_err(|e| SinkError::Serialize {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id,
            collection,
            source,
        })
    }
}

/// The revision record followed by its documents, in report order
pub fn revision_actions(revision: &Revision) -> Result<Vec<IndexAction>, SinkError> {
    let mut actions = Vec::with_capacity(revision.documents.len() + 1);
    let record = revision.record();
    actions.push(IndexAction::new(
        record.id.clone(),
        REVISION_COLLECTION,
        &record,
    )?);
    for document in &revision.documents {
        let record = document.record();
        actions.push(IndexAction::new(
            record.id.clone(),
            DOCUMENT_COLLECTION,
            &record,
        )?);
    }
    Ok(actions)
}

/// Outcome of one or more bulk submissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub submitted: usize,
    /// Ids the sink refused, with its reason
    pub failures: Vec<(String, String)>,
}

impl BulkReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn merge(&mut self, other: BulkReport) {
        self.submitted += other.submitted;
        self.failures.extend(other.failures);
    }
}

/// Destination of index actions
///
/// Item-level failures are reported in the [`BulkReport`]; an `Err` means the
/// whole batch was lost. Nothing is retried.
pub trait IndexSink: Send {
    fn submit(&mut self, batch: &[IndexAction]) -> Result<BulkReport, SinkError>;
}

impl<S: IndexSink + ?Sized> IndexSink for Box<S> {
    fn submit(&mut self, batch: &[IndexAction]) -> Result<BulkReport, SinkError> {
        (**self).submit(batch)
    }
}

/// Submit `actions` in batches of at most `bulk_size`
///
/// Stops at the first batch that fails outright.
pub fn submit_all(
    sink: &mut dyn IndexSink,
    actions: &[IndexAction],
    bulk_size: usize,
) -> Result<BulkReport, SinkError> {
    let mut report = BulkReport::default();
    for batch in actions.chunks(bulk_size.max(1)) {
        let batch_report = sink.submit(batch)?;
        tracing::debug!("Executed bulk request with {} actions", batch.len());
        for (id, reason) in &batch_report.failures {
            tracing::warn!("Failed to index {}: {}", id, reason);
        }
        report.merge(batch_report);
    }
    Ok(report)
}

/// Writes Elasticsearch-style bulk NDJSON: an action line, then the source
pub struct NdjsonSink<W: Write + Send> {
    writer: W,
    index: String,
}

impl<W: Write + Send> NdjsonSink<W> {
    pub fn new(writer: W, index: impl Into<String>) -> Self {
        Self {
            writer,
            index: index.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_action(&mut self, action: &IndexAction) -> Result<(), SinkError> {
        let header = serde_json::json!({
            "index": {
                "_index": format!("{}-{}", self.index, action.collection),
                "_id": action.id,
            }
        });
        let serialize = |e: serde_json::Error| SinkError::Serialize {
            id: action.id.clone(),
            reason: e.to_string(),
        };
        let header = serde_json::to_string(&header).map_err(serialize)?;
        let source = serde_json::to_string(&action.source).map_err(serialize)?;
        writeln!(self.writer, "{}\n{}", header, source)
            .map_err(|e| SinkError::WriteFailed(e.to_string()))
    }
}

impl<W: Write + Send> IndexSink for NdjsonSink<W> {
    fn submit(&mut self, batch: &[IndexAction]) -> Result<BulkReport, SinkError> {
        let mut report = BulkReport::default();
        for action in batch {
            match self.write_action(action) {
                Ok(()) => report.submitted += 1,
                Err(SinkError::WriteFailed(reason)) => return Err(SinkError::WriteFailed(reason)),
                Err(e) => report.failures.push((action.id.clone(), e.to_string())),
            }
        }
        self.writer
            .flush()
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        Ok(report)
    }
}

/// Keeps every accepted action in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub actions: Vec<IndexAction>,
    pub batches: usize,
    reject_all: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that reports every item as failed
    pub fn rejecting() -> Self {
        Self {
            reject_all: true,
            ..Self::default()
        }
    }

    pub fn ids_in(&self, collection: &str) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| a.collection == collection)
            .map(|a| a.id.as_str())
            .collect()
    }
}

impl IndexSink for MemorySink {
    fn submit(&mut self, batch: &[IndexAction]) -> Result<BulkReport, SinkError> {
        self.batches += 1;
        if self.reject_all {
            return Ok(BulkReport {
                submitted: 0,
                failures: batch
                    .iter()
                    .map(|a| (a.id.clone(), "rejected".to_string()))
                    .collect(),
            });
        }
        self.actions.extend_from_slice(batch);
        Ok(BulkReport {
            submitted: batch.len(),
            failures: Vec::new(),
        })
    }
}
