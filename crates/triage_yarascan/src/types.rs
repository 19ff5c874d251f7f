//! Result types produced by a scan

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Match records
// ============================================================================

/// Scalar metadata value declared in a rule's `meta:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Integer(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// One rule matching one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Rule identifier; the key of this record in the result map
    #[serde(skip)]
    pub rule: String,
    pub tags: Vec<String>,
    pub meta: BTreeMap<String, MetaValue>,
    pub strings: Vec<String>,
    /// Namespace of the rule source the rule came from
    #[serde(rename = "rule_file")]
    pub namespace: String,
}

impl MatchRecord {
    pub fn new(rule: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            tags: Vec::new(),
            meta: BTreeMap::new(),
            strings: Vec::new(),
            namespace: namespace.into(),
        }
    }
}

// ============================================================================
// Scan result
// ============================================================================

/// Matches for one file, keyed by rule identifier
pub type FileMatches = BTreeMap<String, MatchRecord>;

/// Top-level scan output.
///
/// Serializes to exactly two fields: `errors` and `matches`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Rule-compile, walk and file-scan errors in the order they were recorded
    pub errors: Vec<String>,
    /// Relative file path → rule identifier → match record
    pub matches: BTreeMap<String, FileMatches>,
}

impl ScanResult {
    /// True when the scan recorded no errors at all
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of (file, rule) matches
    pub fn match_count(&self) -> usize {
        self.matches.values().map(|rules| rules.len()).sum()
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Statistics from a scan operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Rule sources that compiled during validation
    pub rule_sources_loaded: u64,
    /// Rule sources rejected during validation
    pub rule_sources_rejected: u64,
    /// Files pushed onto the work queue
    pub files_enqueued: u64,
    /// Files evaluated (matched or not)
    pub files_scanned: u64,
    /// Files with at least one match
    pub files_matched: u64,
    /// Files whose compile or evaluation failed
    pub files_failed: u64,
    /// Files dequeued after cancellation and skipped
    pub files_abandoned: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> MatchRecord {
        let mut record = MatchRecord::new("mz_header", "pe/mz.yar");
        record.tags = vec!["pe".to_string()];
        record.meta.insert("author".to_string(), "triage".into());
        record.meta.insert("score".to_string(), 70i64.into());
        record.strings = vec!["0x0:$mz: MZ".to_string()];
        record
    }

    #[test]
    fn test_result_serializes_two_top_level_fields() {
        let mut result = ScanResult::default();
        result.errors.push("oops".to_string());
        let mut rules = FileMatches::new();
        rules.insert("mz_header".to_string(), sample_record());
        result.matches.insert("a.bin".to_string(), rules);

        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(value["errors"][0], "oops");

        let record = &value["matches"]["a.bin"]["mz_header"];
        assert_eq!(record["rule_file"], "pe/mz.yar");
        assert_eq!(record["tags"][0], "pe");
        assert_eq!(record["meta"]["score"], 70);
        assert_eq!(record["meta"]["author"], "triage");
        assert_eq!(record["strings"][0], "0x0:$mz: MZ");
        assert!(record.get("rule").is_none());
    }

    #[test]
    fn test_meta_value_untagged_parsing() {
        let meta: BTreeMap<String, MetaValue> =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 1.5, "d": "x"}"#).unwrap();
        assert_eq!(meta["a"], MetaValue::Bool(true));
        assert_eq!(meta["b"], MetaValue::Integer(3));
        assert_eq!(meta["c"], MetaValue::Float(1.5));
        assert_eq!(meta["d"], MetaValue::String("x".to_string()));
    }

    #[test]
    fn test_match_count() {
        let mut result = ScanResult::default();
        assert!(result.is_clean());
        assert_eq!(result.match_count(), 0);

        let mut rules = FileMatches::new();
        rules.insert("one".to_string(), MatchRecord::new("one", "a.yar"));
        rules.insert("two".to_string(), MatchRecord::new("two", "a.yar"));
        result.matches.insert("x".to_string(), rules);
        assert_eq!(result.match_count(), 2);
    }
}
