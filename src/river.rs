//! Polling scheduler
//!
//! A [`River`] crawls the configured repository path from the revision after
//! its checkpoint, hands the result to an [`IndexSink`] and sleeps for the
//! update rate, until cancelled. The checkpoint only advances when the sink
//! accepted every action, so a failed bulk request is retried by the next
//! iteration.

use crate::checkpoint::RevisionCheckpoint;
use crate::config::Config;
use crate::crawler::{CrawlState, Crawler};
use crate::error::HarvestError;
use crate::lock::CrawlLock;
use crate::sink::{IndexSink, revision_actions, submit_all};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// `None` when the iteration was skipped because another process holds the lock
    pub state: Option<CrawlState>,
    pub revisions: usize,
    pub documents: usize,
    pub submitted: usize,
    pub failed: usize,
    /// Checkpoint value after the iteration
    pub checkpoint: Option<u64>,
}

impl RunSummary {
    fn skipped() -> Self {
        Self {
            state: None,
            revisions: 0,
            documents: 0,
            submitted: 0,
            failed: 0,
            checkpoint: None,
        }
    }
}

#[derive(Clone)]
pub struct River {
    crawler: Arc<Crawler>,
    config: Config,
    lock_dir: PathBuf,
}

impl River {
    /// Locks live next to the checkpoint file
    pub fn new(crawler: Arc<Crawler>, config: Config) -> Self {
        let lock_dir = config
            .checkpoint
            .path
            .parent()
            .map(|parent| parent.join("locks"))
            .unwrap_or_else(crate::paths::PlatformPaths::default_lock_dir);
        Self {
            crawler,
            config,
            lock_dir,
        }
    }

    pub fn with_lock_dir(mut self, lock_dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = lock_dir.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One crawl-and-index iteration; blocks on repository I/O
    pub fn run_once(
        &self,
        sink: &mut dyn IndexSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let key = self.config.checkpoint_key()?;
        let Some(_lock) = CrawlLock::try_acquire_in(&self.lock_dir, &key)? else {
            tracing::warn!("Another process is crawling {}, skipping this run", key);
            return Ok(RunSummary::skipped());
        };

        let checkpoint_path = &self.config.checkpoint.path;
        let mut checkpoint = RevisionCheckpoint::load(checkpoint_path)
            .context("Failed to load revision checkpoint")?;
        let start = checkpoint.next_start(&key, self.config.crawl.start_revision);

        let address = self.config.address()?;
        let params = self.config.crawl_parameters(Some(start))?;
        let outcome = self
            .crawler
            .crawl(&address, &params, cancel)
            .with_context(|| format!("Failed to crawl {}", key))?;

        let mut summary = RunSummary {
            state: Some(outcome.state),
            revisions: outcome.revisions.len(),
            documents: outcome.document_count(),
            submitted: 0,
            failed: 0,
            checkpoint: checkpoint.last_revision(&key),
        };

        let Some(last) = outcome.last_revision() else {
            tracing::info!("Nothing to index for {} from revision {}", key, start);
            return Ok(summary);
        };

        let mut actions = Vec::new();
        for revision in &outcome.revisions {
            actions.extend(revision_actions(revision)?);
        }

        let report = submit_all(sink, &actions, self.config.index.bulk_size)
            .context("Failed to submit bulk request")?;
        summary.submitted = report.submitted;
        summary.failed = report.failures.len();

        if report.has_failures() {
            tracing::warn!(
                "{} of {} actions failed, keeping checkpoint of {} at {:?}",
                report.failures.len(),
                actions.len(),
                key,
                summary.checkpoint
            );
            return Ok(summary);
        }

        if checkpoint.record(&key, last) {
            checkpoint
                .save(checkpoint_path)
                .context("Failed to save revision checkpoint")?;
        }
        summary.checkpoint = checkpoint.last_revision(&key);

        tracing::info!(
            "Indexed {} revisions ({} documents) of {}, checkpoint at r{}",
            summary.revisions,
            summary.documents,
            key,
            last
        );
        Ok(summary)
    }

    /// Run iterations until `cancel` fires, then hand the sink back
    ///
    /// A failed iteration is logged and retried after the next pause.
    pub async fn run<S: IndexSink + 'static>(self, sink: S, cancel: CancellationToken) -> Result<S> {
        let rate = self.config.update_rate();
        let mut sink = sink;

        tracing::info!(
            "Starting river on {} (every {:?})",
            self.config.repository.url,
            rate
        );

        while !cancel.is_cancelled() {
            let river = self.clone();
            let token = cancel.clone();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let mut sink = sink;
                let result = river.run_once(&mut sink, &token);
                (sink, result)
            })
            .await
            .context("River iteration panicked")?;
            sink = returned;

            if let Err(e) = result {
                let retryable = e
                    .downcast_ref::<HarvestError>()
                    .is_none_or(HarvestError::is_retryable);
                if retryable {
                    tracing::error!("River iteration failed: {:#}", e);
                } else {
                    tracing::error!("River iteration failed, check the configuration: {:#}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(rate) => {}
                _ = cancel.cancelled() => {}
            }
        }

        tracing::info!("River on {} stopped", self.config.repository.url);
        Ok(sink)
    }
}
