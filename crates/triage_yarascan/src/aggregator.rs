//! Lock-protected aggregation of per-file outcomes
//!
//! The lock is held only while one file's outcome is merged, never during
//! I/O or rule evaluation.

use crate::error::ScanIssue;
use crate::types::{MatchRecord, ScanResult, ScanStats};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What happened to one scanned file
#[derive(Debug)]
pub enum FileOutcome {
    /// Evaluation succeeded; may be empty
    Matches(Vec<MatchRecord>),
    /// Compile or evaluation failed with this message
    Failed(String),
}

#[derive(Debug, Default)]
struct Inner {
    result: ScanResult,
    stats: ScanStats,
    cancelled: bool,
}

/// Exclusive owner of the mutable [`ScanResult`] during a scan
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<Inner>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with issues raised before workers start (rule loading).
    pub fn with_issues(issues: impl IntoIterator<Item = ScanIssue>) -> Self {
        let aggregator = Self::new();
        {
            let mut inner = aggregator.lock();
            inner
                .result
                .errors
                .extend(issues.into_iter().map(|issue| issue.to_string()));
        }
        aggregator
    }

    // Each file merges whole, so a poisoned lock never holds a torn update
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_issue(&self, issue: ScanIssue) {
        self.lock().result.errors.push(issue.to_string());
    }

    pub fn set_rule_counts(&self, loaded: u64, rejected: u64) {
        let mut inner = self.lock();
        inner.stats.rule_sources_loaded = loaded;
        inner.stats.rule_sources_rejected = rejected;
    }

    pub fn note_enqueued(&self) {
        self.lock().stats.files_enqueued += 1;
    }

    pub fn note_abandoned(&self) {
        self.lock().stats.files_abandoned += 1;
    }

    /// Record that the scan was cancelled, even if nothing was queued yet.
    pub fn mark_cancelled(&self) {
        self.lock().cancelled = true;
    }

    /// Merge one file's outcome in a single critical section.
    pub fn record_file(&self, rel_path: String, outcome: FileOutcome) {
        let mut inner = self.lock();
        match outcome {
            FileOutcome::Matches(records) => {
                inner.stats.files_scanned += 1;
                if records.is_empty() {
                    return;
                }
                inner.stats.files_matched += 1;
                let rules = inner.result.matches.entry(rel_path).or_default();
                for record in records {
                    rules.insert(record.rule.clone(), record);
                }
            }
            FileOutcome::Failed(message) => {
                inner.stats.files_failed += 1;
                inner.result.errors.push(
                    ScanIssue::FileScan {
                        path: rel_path,
                        message,
                    }
                    .to_string(),
                );
            }
        }
    }

    /// Take the finished result and counters.
    ///
    /// Appends the abort notice when the scan was cancelled or any queued
    /// path was skipped.
    pub fn finish(&self) -> (ScanResult, ScanStats) {
        let mut inner = self.lock();
        let abandoned = inner.stats.files_abandoned;
        if inner.cancelled || abandoned > 0 {
            inner
                .result
                .errors
                .push(ScanIssue::Aborted { abandoned }.to_string());
        }
        let Inner { result, stats, .. } = std::mem::take(&mut *inner);
        (result, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_matches_grouped_by_file_and_rule() {
        let aggregator = ResultAggregator::new();
        aggregator.record_file(
            "a.bin".to_string(),
            FileOutcome::Matches(vec![
                MatchRecord::new("mz", "pe.yar"),
                MatchRecord::new("packed", "pe.yar"),
            ]),
        );
        aggregator.record_file("b.txt".to_string(), FileOutcome::Matches(Vec::new()));

        let (result, stats) = aggregator.finish();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches["a.bin"].len(), 2);
        assert!(!result.matches.contains_key("b.txt"));
        assert!(result.errors.is_empty());
        assert_eq!(stats.files_scanned, 2);
        assert_eq!(stats.files_matched, 1);
    }

    #[test]
    fn test_failure_recorded_with_path() {
        let aggregator = ResultAggregator::with_issues([ScanIssue::RuleCompile {
            namespace: "bad.yar".to_string(),
            message: "syntax error".to_string(),
        }]);
        aggregator.record_file(
            "locked.txt".to_string(),
            FileOutcome::Failed("permission denied".to_string()),
        );

        let (result, stats) = aggregator.finish();
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("bad.yar"));
        assert_eq!(result.errors[1], "locked.txt: permission denied");
        assert!(result.matches.is_empty());
        assert_eq!(stats.files_failed, 1);
    }

    #[test]
    fn test_abandoned_adds_single_abort_entry() {
        let aggregator = ResultAggregator::new();
        aggregator.note_abandoned();
        aggregator.note_abandoned();

        let (result, stats) = aggregator.finish();
        assert_eq!(stats.files_abandoned, 2);
        assert_eq!(
            result.errors,
            vec!["scan aborted: 2 queued file(s) were not scanned".to_string()]
        );
    }

    #[test]
    fn test_cancelled_before_queueing_still_reports_abort() {
        let aggregator = ResultAggregator::new();
        aggregator.mark_cancelled();

        let (result, _) = aggregator.finish();
        assert_eq!(
            result.errors,
            vec!["scan aborted: 0 queued file(s) were not scanned".to_string()]
        );
    }

    #[test]
    fn test_concurrent_merges_lose_nothing() {
        let aggregator = Arc::new(ResultAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for i in 0..100 {
                        aggregator.record_file(
                            format!("w{worker}/f{i}"),
                            FileOutcome::Matches(vec![MatchRecord::new("hit", "r.yar")]),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (result, stats) = aggregator.finish();
        assert_eq!(result.matches.len(), 800);
        assert_eq!(stats.files_matched, 800);
    }
}
