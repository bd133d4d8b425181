//! Modification-time based staleness.
//!
//! A target's backing file is looked up through a [`Filesystem`]. A missing
//! file is never an error: it makes the target maximally stale.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// Source of target modification times.
pub trait Filesystem: Send + Sync {
    /// Modification time of the file backing `target`, or `None` if it does
    /// not exist.
    fn modified(&self, target: &str) -> Option<SystemTime>;
}

impl<T: Filesystem + ?Sized> Filesystem for Arc<T> {
    fn modified(&self, target: &str) -> Option<SystemTime> {
        (**self).modified(target)
    }
}

// ---------------------------------------------------------------------------
// LocalFilesystem
// ---------------------------------------------------------------------------

/// Targets are paths on the local filesystem, relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve targets against the process working directory at lookup time.
    pub fn current_dir() -> Self {
        Self::new(".")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, target: &str) -> PathBuf {
        let path = Path::new(target);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for LocalFilesystem {
    fn default() -> Self {
        Self::current_dir()
    }
}

impl Filesystem for LocalFilesystem {
    fn modified(&self, target: &str) -> Option<SystemTime> {
        let path = self.resolve(target);
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(time) => Some(time),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Treating unreadable target as missing");
                }
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryFilesystem
// ---------------------------------------------------------------------------

/// In-memory modification times, for embedding and deterministic tests.
///
/// Shared through an `Arc` so timestamps can change after the runner takes it.
#[derive(Debug, Default)]
pub struct MemoryFilesystem {
    times: Mutex<HashMap<String, SystemTime>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update `target` with a modification time of `secs` after the epoch.
    pub fn touch(&self, target: &str, secs: u64) {
        self.set_modified(target, SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
    }

    pub fn set_modified(&self, target: &str, time: SystemTime) {
        self.lock().insert(target.to_string(), time);
    }

    pub fn remove(&self, target: &str) {
        self.lock().remove(target);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SystemTime>> {
        self.times.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Filesystem for MemoryFilesystem {
    fn modified(&self, target: &str) -> Option<SystemTime> {
        self.lock().get(target).copied()
    }
}

// ---------------------------------------------------------------------------
// StatCache: one consistent snapshot per resolution pass
// ---------------------------------------------------------------------------

/// How equal modification times compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `a` must be strictly newer than `b`.
    Strict,
    /// `a` may be as old as `b`.
    Inclusive,
}

/// Reads each target's modification time at most once.
pub struct StatCache<'a> {
    fs: &'a dyn Filesystem,
    seen: HashMap<String, Option<SystemTime>>,
}

impl<'a> StatCache<'a> {
    pub fn new(fs: &'a dyn Filesystem) -> Self {
        Self {
            fs,
            seen: HashMap::new(),
        }
    }

    pub fn modified(&mut self, target: &str) -> Option<SystemTime> {
        if let Some(time) = self.seen.get(target) {
            return *time;
        }
        let time = self.fs.modified(target);
        self.seen.insert(target.to_string(), time);
        time
    }

    pub fn exists(&mut self, target: &str) -> bool {
        self.modified(target).is_some()
    }

    /// Whether `a` is newer than `b`.
    ///
    /// A missing `a` is always newer (it demands a rebuild); otherwise a
    /// missing `b` never is.
    pub fn is_newer(&mut self, a: &str, b: &str, comparison: Comparison) -> bool {
        let Some(a_time) = self.modified(a) else {
            return true;
        };
        let Some(b_time) = self.modified(b) else {
            return false;
        };
        match comparison {
            Comparison::Strict => a_time > b_time,
            Comparison::Inclusive => a_time >= b_time,
        }
    }

    /// `target` exists and is at least as new as every dependency. A missing
    /// dependency makes the target out of date.
    pub fn is_up_to_date<I, S>(&mut self, target: &str, deps: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.exists(target) {
            return false;
        }
        deps.into_iter()
            .all(|dep| self.is_newer(target, dep.as_ref(), Comparison::Inclusive))
    }
}
