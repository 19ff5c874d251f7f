//! External variables bound into rule compilation per scanned file

use std::borrow::Cow;
use std::path::{Component, Path};

/// The closed set of external variables every rule source may reference.
///
/// Rules that mention any other identifier fail to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalVariable {
    Filename,
    Filepath,
    Extension,
    Filetype,
    Owner,
}

impl ExternalVariable {
    pub const ALL: [ExternalVariable; 5] = [
        ExternalVariable::Filename,
        ExternalVariable::Filepath,
        ExternalVariable::Extension,
        ExternalVariable::Filetype,
        ExternalVariable::Owner,
    ];

    /// Identifier as written in rule conditions
    pub fn name(self) -> &'static str {
        match self {
            ExternalVariable::Filename => "filename",
            ExternalVariable::Filepath => "filepath",
            ExternalVariable::Extension => "extension",
            ExternalVariable::Filetype => "filetype",
            ExternalVariable::Owner => "owner",
        }
    }
}

/// Values for every [`ExternalVariable`], built fresh for each file.
///
/// `ExternalBinding::default()` (all empty) is the binding used to validate
/// rule sources before the scan starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalBinding {
    pub filename: String,
    pub filepath: String,
    pub extension: String,
    pub filetype: String,
    pub owner: String,
}

impl ExternalBinding {
    /// Bind the values for `path`, a file somewhere below `root`.
    ///
    /// `filetype` and `owner` stay empty; nothing upstream populates them yet.
    pub fn for_file(root: &Path, path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        Self {
            filename,
            filepath: relative_path(root, path),
            extension,
            filetype: String::new(),
            owner: String::new(),
        }
    }

    pub fn get(&self, var: ExternalVariable) -> &str {
        match var {
            ExternalVariable::Filename => &self.filename,
            ExternalVariable::Filepath => &self.filepath,
            ExternalVariable::Extension => &self.extension,
            ExternalVariable::Filetype => &self.filetype,
            ExternalVariable::Owner => &self.owner,
        }
    }

    /// `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        ExternalVariable::ALL
            .into_iter()
            .map(move |var| (var.name(), self.get(var)))
    }
}

/// Path of `path` relative to `root`, joined with `/` on every platform.
///
/// Falls back to the full path when `path` is not under `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    normalize_path_to_forward_slashes(rel)
}

fn normalize_path_to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| match c {
            // Joined below, so the root contributes only the leading '/'
            Component::RootDir => Cow::Borrowed(""),
            other => other.as_os_str().to_string_lossy(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
