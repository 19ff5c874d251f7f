//! Scan orchestration: rule loading, enumeration and the worker pool
//!
//! # Design
//!
//! - Validate every rule source once, up front, with the empty binding
//! - The calling thread walks the scan root and feeds a shared [`WorkQueue`]
//! - N scoped worker threads each take a path, bind the external variables
//!   for it, compile a private rule set, evaluate it and merge the outcome
//! - Wait on the drain barrier, then send one shutdown signal per worker
//!
//! Rule sets are compiled per file because the external variables differ for
//! every file. Compiled sets never leave the worker that built them.

use crate::aggregator::{FileOutcome, ResultAggregator};
use crate::binding::{relative_path, ExternalBinding};
use crate::cancel::CancellationToken;
use crate::config::{default_workers, YaraScanConfig};
use crate::engine::{PatternEngine, YaraEngine};
use crate::error::{Result, ScanIssue, YaraScanError};
use crate::queue::WorkQueue;
use crate::rules::{load_rules, RuleSource};
use crate::types::{ScanResult, ScanStats};
use crate::walk::FileEnumerator;
use std::any::Any;
use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scan result plus run statistics
#[derive(Debug)]
pub struct ScanReport {
    pub result: ScanResult,
    pub stats: ScanStats,
}

/// Concurrent rule scanner over a directory tree
pub struct YaraScanner<E: PatternEngine = YaraEngine> {
    engine: E,
    workers: usize,
    follow_symlinks: bool,
    cancel: CancellationToken,
}

impl YaraScanner<YaraEngine> {
    /// Scanner backed by YARA with one worker per available core
    pub fn new() -> Self {
        Self::with_engine(YaraEngine::new())
    }

    /// Scanner backed by YARA using the worker and symlink settings of `config`
    pub fn from_config(config: &YaraScanConfig) -> Self {
        Self::new()
            .workers(config.effective_workers())
            .follow_symlinks(config.follow_symlinks)
    }
}

impl Default for YaraScanner<YaraEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PatternEngine> YaraScanner<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            workers: default_workers().max(1),
            follow_symlinks: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Worker pool size; 0 picks the available parallelism
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 {
            default_workers().max(1)
        } else {
            workers
        };
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Share a token that stops the scan at the next dequeue when cancelled
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Scan every file under `root` with the rules under `rules_root`.
    ///
    /// Only a missing or unreadable rules directory is an error; everything
    /// else is recorded in the result's `errors`.
    pub fn scan<I, S>(&self, root: &Path, rules_root: &Path, ignore_names: I) -> Result<ScanResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Ok(self.scan_with_stats(root, rules_root, ignore_names)?.result)
    }

    /// Same as [`scan`](Self::scan), also returning run statistics
    pub fn scan_with_stats<I, S>(
        &self,
        root: &Path,
        rules_root: &Path,
        ignore_names: I,
    ) -> Result<ScanReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let start = Instant::now();
        info!(
            root = %root.display(),
            rules = %rules_root.display(),
            workers = self.workers,
            "Starting YARA scan"
        );

        let loaded = load_rules(&self.engine, rules_root)?;
        let aggregator = ResultAggregator::with_issues(loaded.issues);
        aggregator.set_rule_counts(loaded.sources.len() as u64, loaded.rejected);

        if loaded.sources.is_empty() {
            warn!(rules = %rules_root.display(), "No valid rule sources; nothing to scan");
            aggregator.push_issue(ScanIssue::EmptyRuleSet {
                rules_root: rules_root.to_path_buf(),
            });
            return Ok(self.finish(&aggregator, start));
        }

        let sources = loaded.sources;
        let queue = WorkQueue::new();
        let enumerator = FileEnumerator::new(root)
            .ignore_names(ignore_names)
            .follow_symlinks(self.follow_symlinks);

        thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let spawned = thread::Builder::new()
                    .name(format!("yarascan-worker-{id}"))
                    .spawn_scoped(scope, {
                        let (queue, aggregator, sources) = (&queue, &aggregator, &sources);
                        move || self.run_worker(id, root, sources, queue, aggregator)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Release the workers already waiting so the scope can end
                        queue.shutdown(handles.len());
                        return Err(YaraScanError::InvalidState(format!(
                            "Failed to spawn scan worker {id}: {e}"
                        )));
                    }
                }
            }

            self.enqueue_files(root, enumerator, &queue, &aggregator);

            queue.wait_drained();
            queue.shutdown(handles.len());

            for (id, handle) in handles.into_iter().enumerate() {
                if let Err(payload) = handle.join() {
                    aggregator.push_issue(ScanIssue::WorkerPanicked {
                        worker: id,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
            Ok(())
        })?;

        Ok(self.finish(&aggregator, start))
    }

    /// Producer side: walk the root and push every file onto the queue.
    fn enqueue_files(
        &self,
        root: &Path,
        enumerator: FileEnumerator,
        queue: &WorkQueue,
        aggregator: &ResultAggregator,
    ) {
        for item in enumerator.files() {
            if self.cancel.is_cancelled() {
                info!("Scan cancelled; stopping enumeration");
                break;
            }
            match item {
                Ok(path) => {
                    aggregator.note_enqueued();
                    queue.push(path);
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| relative_path(root, p))
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(path = %path, error = %e, "Failed to walk scan root");
                    aggregator.push_issue(ScanIssue::Walk {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Consumer loop for one worker; returns on shutdown.
    fn run_worker(
        &self,
        id: usize,
        root: &Path,
        sources: &[RuleSource],
        queue: &WorkQueue,
        aggregator: &ResultAggregator,
    ) {
        debug!(worker = id, "Scan worker started");

        while let Some(ticket) = queue.next() {
            if self.cancel.is_cancelled() {
                aggregator.note_abandoned();
                continue;
            }

            let path = ticket.path();
            let rel_path = relative_path(root, path);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                scan_file(&self.engine, sources, root, path)
            }))
            .unwrap_or_else(|payload| {
                FileOutcome::Failed(format!("engine panicked: {}", panic_message(payload.as_ref())))
            });

            match &outcome {
                FileOutcome::Failed(message) => {
                    warn!(worker = id, path = %rel_path, error = %message, "File scan failed");
                }
                FileOutcome::Matches(records) if !records.is_empty() => {
                    debug!(worker = id, path = %rel_path, rules = records.len(), "File matched");
                }
                FileOutcome::Matches(_) => {}
            }

            aggregator.record_file(rel_path, outcome);
            // Acknowledge only after the outcome is merged
            drop(ticket);
        }

        debug!(worker = id, "Scan worker stopped");
    }

    fn finish(&self, aggregator: &ResultAggregator, start: Instant) -> ScanReport {
        if self.cancel.is_cancelled() {
            aggregator.mark_cancelled();
        }
        let (result, mut stats) = aggregator.finish();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            rules_loaded = stats.rule_sources_loaded,
            rules_rejected = stats.rule_sources_rejected,
            enqueued = stats.files_enqueued,
            scanned = stats.files_scanned,
            matched = stats.files_matched,
            failed = stats.files_failed,
            abandoned = stats.files_abandoned,
            errors = result.errors.len(),
            duration_ms = stats.duration_ms,
            "YARA scan complete"
        );

        ScanReport { result, stats }
    }
}

/// Bind, compile and evaluate one file.
fn scan_file<E: PatternEngine>(
    engine: &E,
    sources: &[RuleSource],
    root: &Path,
    path: &Path,
) -> FileOutcome {
    let binding = ExternalBinding::for_file(root, path);

    // Sources already validated, so a failure here is still only this file's
    let compiled = match engine.compile(sources, &binding) {
        Ok(compiled) => compiled,
        Err(e) => return FileOutcome::Failed(e.to_string()),
    };

    match engine.evaluate(&compiled, path) {
        Ok(records) => FileOutcome::Matches(records),
        Err(e) => FileOutcome::Failed(e.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
