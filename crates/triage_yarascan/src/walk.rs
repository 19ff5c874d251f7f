//! Recursive file enumeration for the scan root
//!
//! Enumeration is lazy and one-shot: it reflects the live filesystem while it
//! runs. Files created or removed during a scan may or may not be seen.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Builder for a single walk over a scan root
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    root: PathBuf,
    ignore_names: HashSet<OsString>,
    follow_symlinks: bool,
}

impl FileEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_names: HashSet::new(),
            follow_symlinks: false,
        }
    }

    /// Skip files whose base name is one of `names`.
    ///
    /// Only files are matched; a directory with an ignored name is still walked.
    pub fn ignore_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.ignore_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Start the walk
    pub fn files(self) -> Files {
        Files {
            inner: WalkDir::new(&self.root)
                .follow_links(self.follow_symlinks)
                .into_iter(),
            ignore_names: self.ignore_names,
        }
    }
}

/// Iterator over file paths below the scan root
pub struct Files {
    inner: walkdir::IntoIter,
    ignore_names: HashSet<OsString>,
}

impl Iterator for Files {
    type Item = Result<PathBuf, walkdir::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            // With follow_links the file type is already the target's, so a
            // symlink here is one we were told not to follow
            if !entry.file_type().is_file() {
                continue;
            }

            if self.ignore_names.contains(entry.file_name()) {
                tracing::debug!(path = %entry.path().display(), "Skipping ignored file");
                continue;
            }

            return Some(Ok(entry.into_path()));
        }
    }
}
