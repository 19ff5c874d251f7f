//! Triage YARA scan - concurrent rule scanning over extracted artifacts
//!
//! Walks a case folder of parsed artifacts and evaluates a directory of YARA
//! rules against every file with a fixed pool of worker threads.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌───────────────┐
//! │ Rule Loader │     │  Enumerator │     │ Worker Pool │     │  Aggregator   │
//! │ (validate   │────▶│  (walkdir → │────▶│ (bind →     │────▶│ (Mutex<Scan-  │
//! │  each .yar) │     │  WorkQueue) │     │  compile →  │     │   Result>)    │
//! │             │     │             │     │  evaluate)  │     │               │
//! └─────────────┘     └─────────────┘     └─────────────┘     └───────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **RuleSource**: One rule file, namespaced by its path under the rules root
//! - **ExternalBinding**: Per-file values for `filename`, `filepath`, `extension`,
//!   `filetype` and `owner`
//! - **PatternEngine**: Compiles sources with a binding and evaluates files
//! - **ScanResult**: `errors` plus `matches` keyed by relative path and rule

pub mod aggregator;
pub mod binding;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod queue;
pub mod rules;
pub mod scanner;
pub mod types;
pub mod walk;

// Re-exports for convenience
pub use binding::{ExternalBinding, ExternalVariable};
pub use cancel::CancellationToken;
pub use config::{YaraScanConfig, RULES_PATH_ENV};
pub use engine::{EngineError, PatternEngine, YaraEngine};
pub use error::{Result, ScanIssue, YaraScanError};
pub use rules::{load_rules, RuleSource};
pub use scanner::{ScanReport, YaraScanner};
pub use types::{MatchRecord, MetaValue, ScanResult, ScanStats};
