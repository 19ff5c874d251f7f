//! Size-rotated log file
//!
//! `<stem>.log` is the live file; older generations are `<stem>.log.1`
//! (newest) through `<stem>.log.<keep - 1>` (oldest).

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How many files to keep and how large each may grow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Total files including the live one; at least 1
    pub keep: usize,
    pub max_bytes: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            keep: 5,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Append-only log file that rotates before a write would exceed the limit.
#[derive(Debug)]
pub struct RotatingLog {
    path: PathBuf,
    policy: RotationPolicy,
    file: File,
    written: u64,
}

impl RotatingLog {
    /// Open (or create) `<dir>/<stem>.log`, creating `dir` as needed.
    pub fn open(dir: &Path, stem: &str, policy: RotationPolicy) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
        let policy = RotationPolicy {
            keep: policy.keep.max(1),
            ..policy
        };
        let path = dir.join(format!("{}.log", file_stem(stem)));
        let (file, written) = open_append(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        let mut log = Self {
            path,
            policy,
            file,
            written,
        };
        if log.written >= log.policy.max_bytes {
            log.rotate()
                .with_context(|| format!("Failed to rotate log file: {}", log.path.display()))?;
        }
        Ok(log)
    }

    /// Path of the live file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn generation(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.policy.keep - 1;
        if oldest == 0 {
            // Nothing is kept; start the live file over
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        remove_if_present(&self.generation(oldest))?;
        for n in (1..oldest).rev() {
            rename_if_present(&self.generation(n), &self.generation(n + 1))?;
        }
        rename_if_present(&self.path, &self.generation(1))?;

        let (file, written) = open_append(&self.path)?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.policy.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn rename_if_present(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Cloneable [`RotatingLog`] handle for `tracing_subscriber::fmt`.
#[derive(Debug, Clone)]
pub struct SharedLog {
    inner: Arc<Mutex<RotatingLog>>,
}

impl SharedLog {
    pub fn new(log: RotatingLog) -> Self {
        Self {
            inner: Arc::new(Mutex::new(log)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RotatingLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLog {
    type Writer = SharedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}
