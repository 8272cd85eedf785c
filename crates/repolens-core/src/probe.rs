//! Local filesystem probing for cloned repositories
//!
//! Resolves whether a remote repository also exists as a local clone under
//! a configured base directory, and reads its README when present. A
//! directory counts as a clone only if it contains a `.git` entry.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// README filenames tried in order when reading local content.
const README_NAMES: &[&str] = &[
    "README.md",
    "README.MD",
    "readme.md",
    "README.rst",
    "README.txt",
    "README",
];

/// Probe for local clones under a base directory.
#[derive(Debug, Clone)]
pub struct CloneProbe {
    base: PathBuf,
}

impl CloneProbe {
    /// Create a probe rooted at the given base directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory this probe searches.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Locate a local clone of the named repository.
    ///
    /// Returns the clone directory iff `<base>/<name>` exists and contains
    /// a `.git` entry.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        if !self.base.exists() {
            return None;
        }

        let candidate = self.base.join(name);
        if candidate.is_dir() && candidate.join(".git").exists() {
            debug!("Found local clone for '{}' at {:?}", name, candidate);
            Some(candidate)
        } else {
            None
        }
    }

    /// Read README content from a local clone directory.
    ///
    /// Tries the common README filenames in order; unreadable or non-UTF-8
    /// candidates are skipped rather than treated as errors.
    pub fn read_readme(&self, clone_path: &Path) -> Option<String> {
        for name in README_NAMES {
            let path = clone_path.join(name);
            if path.is_file() {
                match fs::read_to_string(&path) {
                    Ok(content) => return Some(content),
                    Err(_) => continue,
                }
            }
        }
        None
    }
}
