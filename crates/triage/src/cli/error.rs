//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;
use triage_yarascan::{YaraScanError, RULES_PATH_ENV};

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Case folder does not exist
    pub fn case_not_found(path: &Path) -> Self {
        Self::new(format!("Case folder not found: {}", path.display()))
            .with_context("The extracted sysdiagnose folder to scan does not exist")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", path.display()),
                "TRY: Extract the sysdiagnose archive first and pass the extracted folder"
                    .to_string(),
            ])
    }

    /// Case path exists but is not a directory
    pub fn not_a_directory(path: &Path) -> Self {
        Self::new(format!("Not a directory: {}", path.display()))
            .with_context("yarascan expects an extracted case folder, not a single file")
            .with_suggestions([format!(
                "TRY: Scan the parent directory: triage yarascan {}",
                path.parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string())
            )])
    }

    /// Rules directory is missing
    pub fn rules_not_found(path: &Path) -> Self {
        Self::new(format!("YARA rules directory not found: {}", path.display()))
            .with_context("Scanning needs a directory of .yar/.yara rule files")
            .with_suggestions([
                "TRY: Point --rules at your rules directory".to_string(),
                format!("TRY: Or set {RULES_PATH_ENV}=/path/to/rules"),
            ])
    }

    /// Rules path is a file
    pub fn rules_not_a_directory(path: &Path) -> Self {
        Self::new(format!("YARA rules path is not a directory: {}", path.display()))
            .with_context("Rule sources are discovered by walking a directory")
            .with_suggestions([format!(
                "TRY: Move the rule file into a directory and pass that: --rules {}",
                path.parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string())
            )])
    }

    /// Configuration file could not be loaded
    pub fn invalid_config(path: &Path, reason: &str) -> Self {
        Self::new(format!("Invalid configuration file: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Known keys are rules_path, workers, output_file_name, follow_symlinks"
                    .to_string(),
                format!("TRY: Check the TOML syntax: cat {}", path.display()),
            ])
    }

    /// Result file could not be written
    pub fn cannot_write_output(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot write results: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Check write permissions on the case folder".to_string(),
                "TRY: Write elsewhere with --output FILE".to_string(),
            ])
    }
}

impl From<YaraScanError> for HelpfulError {
    fn from(err: YaraScanError) -> Self {
        match err {
            YaraScanError::RulesRootMissing(path) => Self::rules_not_found(&path),
            YaraScanError::RulesRootNotDirectory(path) => Self::rules_not_a_directory(&path),
            other => Self::new(other.to_string()).with_context("The scan could not run"),
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print a fatal error as a JSON object on stdout for `--json` callers
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({ "error": format!("{:#}", err) }),
    };
    println!("{payload}");
}
