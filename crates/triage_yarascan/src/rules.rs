//! Rule source discovery and validation
//!
//! Every rule file under the rules root is compiled on its own with the empty
//! validation binding. Files that fail are reported and left out, so one bad
//! rule never keeps the others from running.

use crate::binding::{relative_path, ExternalBinding};
use crate::engine::PatternEngine;
use crate::error::{Result, ScanIssue, YaraScanError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File extensions treated as rule sources (compared case-insensitively)
pub const RULE_EXTENSIONS: &[&str] = &["yar", "yara"];

/// A rule file that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    /// Path of the rule file under the rules root
    pub path: PathBuf,
    /// Path relative to the rules root with `/` separators
    pub namespace: String,
    /// Source text, read once at load time
    pub text: String,
}

/// Output of [`load_rules`]
#[derive(Debug, Default)]
pub struct LoadedRules {
    /// Validated sources, ordered by namespace
    pub sources: Vec<RuleSource>,
    /// One entry per rejected source or unreadable rules sub-directory
    pub issues: Vec<ScanIssue>,
    /// Number of candidate rule files rejected
    pub rejected: u64,
}

/// Check that `rules_root` is a readable directory.
///
/// This is the only fatal condition of a scan.
pub fn ensure_rules_root(rules_root: &Path) -> Result<()> {
    if !rules_root.exists() {
        return Err(YaraScanError::RulesRootMissing(rules_root.to_path_buf()));
    }
    if !rules_root.is_dir() {
        return Err(YaraScanError::RulesRootNotDirectory(rules_root.to_path_buf()));
    }
    fs::read_dir(rules_root)?;
    Ok(())
}

/// Discover and validate every rule source under `rules_root`.
pub fn load_rules<E: PatternEngine>(engine: &E, rules_root: &Path) -> Result<LoadedRules> {
    ensure_rules_root(rules_root)?;

    let validation_binding = ExternalBinding::default();
    let mut loaded = LoadedRules::default();

    for entry in WalkDir::new(rules_root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_path(rules_root, p))
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(path = %path, error = %e, "Failed to walk rules directory");
                loaded.issues.push(ScanIssue::Walk {
                    path,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_rule_file(entry.path()) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let namespace = relative_path(rules_root, &path);

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(rule_file = %namespace, error = %e, "Failed to read rule source");
                loaded.rejected += 1;
                loaded.issues.push(ScanIssue::RuleCompile {
                    namespace,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let source = RuleSource {
            path,
            namespace,
            text,
        };

        match engine.compile(std::slice::from_ref(&source), &validation_binding) {
            Ok(_) => {
                info!(rule_file = %source.namespace, "Loaded rule source");
                loaded.sources.push(source);
            }
            Err(e) => {
                warn!(rule_file = %source.namespace, error = %e, "Rejected rule source");
                loaded.rejected += 1;
                loaded.issues.push(ScanIssue::RuleCompile {
                    namespace: source.namespace,
                    message: e.to_string(),
                });
            }
        }
    }

    loaded.sources.sort_by(|a, b| a.namespace.cmp(&b.namespace));
    debug!(
        loaded = loaded.sources.len(),
        rejected = loaded.rejected,
        "Rule validation complete"
    );
    Ok(loaded)
}

fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RULE_EXTENSIONS.iter().any(|r| ext.eq_ignore_ascii_case(r)))
        .unwrap_or(false)
}
