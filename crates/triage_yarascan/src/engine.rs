//! Pattern-matching engine seam
//!
//! The orchestration in [`crate::scanner`] only sees [`PatternEngine`]; the
//! YARA backend lives behind it so another engine can be swapped in without
//! touching the worker pool.

use crate::binding::ExternalBinding;
use crate::rules::RuleSource;
use crate::types::{MatchRecord, MetaValue};
use std::path::Path;
use thiserror::Error;

/// Failure inside the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// Compiles rule sources with one external binding and evaluates the result.
///
/// A compiled set is owned by the worker that built it and is never shared,
/// so implementations need no internal locking around compilation.
pub trait PatternEngine: Send + Sync {
    type Compiled;

    /// Combine `sources`, each under its own namespace, with `binding`.
    fn compile(
        &self,
        sources: &[RuleSource],
        binding: &ExternalBinding,
    ) -> Result<Self::Compiled, EngineError>;

    /// Run a compiled set against the file at `path`.
    fn evaluate(&self, compiled: &Self::Compiled, path: &Path)
        -> Result<Vec<MatchRecord>, EngineError>;
}

/// [`PatternEngine`] backed by `yara-x`
#[derive(Debug, Clone, Copy, Default)]
pub struct YaraEngine;

impl YaraEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PatternEngine for YaraEngine {
    type Compiled = yara_x::Rules;

    fn compile(
        &self,
        sources: &[RuleSource],
        binding: &ExternalBinding,
    ) -> Result<yara_x::Rules, EngineError> {
        let mut compiler = yara_x::Compiler::new();

        // Globals must exist before any source referencing them is added
        for (name, value) in binding.iter() {
            compiler.define_global(name, value).map_err(|e| {
                EngineError::Compile(format!("failed to define external `{name}`: {e}"))
            })?;
        }

        for source in sources {
            compiler.new_namespace(&source.namespace);
            let code =
                yara_x::SourceCode::from(source.text.as_str()).with_origin(source.namespace.as_str());
            compiler
                .add_source(code)
                .map_err(|e| EngineError::Compile(e.to_string()))?;
        }

        Ok(compiler.build())
    }

    fn evaluate(
        &self,
        compiled: &yara_x::Rules,
        path: &Path,
    ) -> Result<Vec<MatchRecord>, EngineError> {
        let mut scanner = yara_x::Scanner::new(compiled);
        let results = scanner
            .scan_file(path)
            .map_err(|e| EngineError::Evaluation(e.to_string()))?;

        Ok(results.matching_rules().map(|rule| to_match_record(&rule)).collect())
    }
}

fn to_match_record(rule: &yara_x::Rule<'_, '_>) -> MatchRecord {
    let mut record = MatchRecord::new(rule.identifier(), rule.namespace());
    record.tags = rule
        .tags()
        .map(|tag| tag.identifier().to_string())
        .collect();
    record.meta = rule
        .metadata()
        .map(|(key, value)| (key.to_string(), to_meta_value(value)))
        .collect();

    // Same shape as `yara -s`: offset, pattern identifier, matched bytes
    for pattern in rule.patterns() {
        for m in pattern.matches() {
            record.strings.push(format!(
                "0x{:x}:{}: {}",
                m.range().start,
                pattern.identifier(),
                m.data().escape_ascii()
            ));
        }
    }

    record
}

fn to_meta_value(value: yara_x::MetaValue<'_>) -> MetaValue {
    match value {
        yara_x::MetaValue::Integer(i) => MetaValue::Integer(i),
        yara_x::MetaValue::Float(f) => MetaValue::Float(f),
        yara_x::MetaValue::Bool(b) => MetaValue::Bool(b),
        yara_x::MetaValue::String(s) => MetaValue::String(s.to_string()),
        yara_x::MetaValue::Bytes(b) => MetaValue::String(b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn source(namespace: &str, text: &str) -> RuleSource {
        RuleSource {
            path: PathBuf::from(format!("/rules/{namespace}")),
            namespace: namespace.to_string(),
            text: text.to_string(),
        }
    }

    const MZ_RULE: &str = r#"
rule mz_header : pe executable {
    meta:
        author = "triage"
        score = 70
        confirmed = true
    strings:
        $mz = "MZ"
    condition:
        $mz at 0
}
"#;

    #[test]
    fn test_compile_and_match_record_shape() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a.bin");
        fs::write(&target, b"MZ\x90\x00rest").unwrap();

        let engine = YaraEngine::new();
        let rules = engine
            .compile(&[source("pe/mz.yar", MZ_RULE)], &ExternalBinding::default())
            .unwrap();
        let records = engine.evaluate(&rules, &target).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.rule, "mz_header");
        assert_eq!(record.namespace, "pe/mz.yar");
        assert_eq!(record.tags, vec!["pe", "executable"]);
        assert_eq!(record.meta["author"], MetaValue::String("triage".to_string()));
        assert_eq!(record.meta["score"], MetaValue::Integer(70));
        assert_eq!(record.meta["confirmed"], MetaValue::Bool(true));
        assert_eq!(record.strings, vec!["0x0:$mz: MZ"]);
    }

    #[test]
    fn test_no_match_yields_empty() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("b.txt");
        fs::write(&target, "plain text").unwrap();

        let engine = YaraEngine::new();
        let rules = engine
            .compile(&[source("mz.yar", MZ_RULE)], &ExternalBinding::default())
            .unwrap();
        assert!(engine.evaluate(&rules, &target).unwrap().is_empty());
    }

    #[test]
    fn test_syntax_error_is_compile_error() {
        let engine = YaraEngine::new();
        let err = engine
            .compile(
                &[source("broken.yar", "rule broken { condition: }")],
                &ExternalBinding::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn test_undeclared_external_fails_to_compile() {
        let engine = YaraEngine::new();
        let rule = r#"rule uses_unknown { condition: device_name == "iPhone" }"#;
        let err = engine
            .compile(&[source("unknown.yar", rule)], &ExternalBinding::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn test_bound_externals_drive_condition() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("ps.json");
        fs::write(&target, "{}").unwrap();

        let rule = r#"rule json_by_extension { condition: extension == ".json" and filename == "ps.json" }"#;
        let engine = YaraEngine::new();

        let bound = ExternalBinding::for_file(temp.path(), &target);
        let rules = engine.compile(&[source("ext.yar", rule)], &bound).unwrap();
        assert_eq!(engine.evaluate(&rules, &target).unwrap().len(), 1);

        let unbound = engine
            .compile(&[source("ext.yar", rule)], &ExternalBinding::default())
            .unwrap();
        assert!(engine.evaluate(&unbound, &target).unwrap().is_empty());
    }

    #[test]
    fn test_same_rule_name_in_two_namespaces() {
        let engine = YaraEngine::new();
        let rule = "rule dup { condition: true }";
        let result = engine.compile(
            &[source("a.yar", rule), source("b/a.yar", rule)],
            &ExternalBinding::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_file_is_evaluation_error() {
        let temp = TempDir::new().unwrap();
        let engine = YaraEngine::new();
        let rules = engine
            .compile(&[source("mz.yar", MZ_RULE)], &ExternalBinding::default())
            .unwrap();
        let err = engine
            .evaluate(&rules, &temp.path().join("gone.bin"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(_)));
    }
}
