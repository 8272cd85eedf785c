//! Repository snapshot model and content fingerprinting
//!
//! A [`RepositorySnapshot`] is the synchronizable state of one remote
//! repository at a point in time. Its `fingerprint` is a hash over exactly
//! the text that would be embedded for it, so staleness of an embedding can
//! be decided by string comparison instead of re-reading content.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum number of characters of README content included in the indexable
/// text. Longer READMEs are truncated to keep embedding inputs bounded.
pub const README_EXCERPT_MAX: usize = 4000;

/// The synchronizable state of one remote repository.
///
/// `id` is the stable identifier (`owner/name` form) and is unique within a
/// sync pass. `pushed_at` is the provider-reported last-modified timestamp,
/// monotonic per repository; change detection compares only this field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    /// Stable identifier, `owner/name`
    pub id: String,
    /// Display name (repository name without owner)
    pub name: String,
    /// Description from the remote provider
    pub description: Option<String>,
    /// Topic tags, in provider order
    #[serde(default)]
    pub topics: Vec<String>,
    /// Provider-reported last-modified timestamp
    pub pushed_at: DateTime<Utc>,
    /// Web URL
    #[serde(default)]
    pub html_url: String,
    /// Clone URL
    #[serde(default)]
    pub clone_url: String,
    /// Default branch name
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Whether the repository is private
    #[serde(default)]
    pub private: bool,
    /// Path of a local clone, if the filesystem probe found one
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Hash of the indexable text this snapshot was last fingerprinted with.
    /// Empty until the indexable text has been assembled for this snapshot.
    #[serde(default)]
    pub fingerprint: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepositorySnapshot {
    /// Build the text that gets embedded for this repository.
    ///
    /// Deterministic concatenation of name, description, topics, and a
    /// bounded README excerpt, so the same inputs always produce the same
    /// fingerprint.
    pub fn indexable_text(&self, readme: Option<&str>) -> String {
        let mut parts = vec![self.name.clone()];

        if let Some(description) = &self.description {
            if !description.is_empty() {
                parts.push(description.clone());
            }
        }

        if !self.topics.is_empty() {
            parts.push(format!("Topics: {}", self.topics.join(", ")));
        }

        if let Some(readme) = readme {
            let excerpt = truncate_chars(readme, README_EXCERPT_MAX);
            if !excerpt.trim().is_empty() {
                parts.push(excerpt.to_string());
            }
        }

        parts.join("\n\n")
    }

    /// Compute and store the fingerprint for the given indexable text.
    pub fn set_fingerprint(&mut self, indexable_text: &str) {
        self.fingerprint = content_fingerprint(indexable_text);
    }

    /// Whether this snapshot has been fingerprinted yet.
    pub fn has_fingerprint(&self) -> bool {
        !self.fingerprint.is_empty()
    }
}

/// Hash the indexable text of a repository.
///
/// The fingerprint changes if and only if the indexed text changed.
pub fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("{:x}", digest)
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
