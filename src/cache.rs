//! Checksum cache for incremental conversion runs.
//!
//! Encoding is the expensive part of a run, and most runs over a game's
//! texture tree only touch a handful of files. The cache records, per source
//! file, the checksum it had when it was last converted successfully; the next
//! run skips every file whose checksum still matches.
//!
//! # Keys
//!
//! - **Relative path** of the source file under the input root, with `/`
//!   separators, so the cache survives moving the whole tree.
//! - **Checksum**: SHA-256 of the file contents. Content-based rather than
//!   mtime-based so it survives `git checkout` and archive extraction.
//! - **Settings hash**: SHA-256 over everything that changes the produced
//!   bytes (active codecs, container, scaling, suffixes...). A different
//!   settings hash invalidates the whole cache.
//!
//! # Storage
//!
//! One sidecar per destination, `<destination>_filescrc.txt`, holding JSON:
//!
//! ```json
//! { "version": 1, "settings": "9f2c…", "entries": { "textures/wall.tga": "ab12…" } }
//! ```
//!
//! A missing, unreadable or mismatched file loads as an empty cache and the
//! run simply converts everything.
//!
//! # Archives
//!
//! The cache is never used when the destination is an archive: the archive is
//! rewritten from scratch each run, so skipped files would be missing from it.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Appended to the destination path to name the sidecar.
pub const CACHE_SUFFIX: &str = "_filescrc.txt";

/// Bump to invalidate every existing cache file.
const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileCache {
    pub version: u32,
    pub settings: String,
    pub entries: BTreeMap<String, String>,
}

impl FileCache {
    pub fn empty(settings: &str) -> Self {
        Self {
            version: CACHE_VERSION,
            settings: settings.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Load `cache_file`, or an empty cache if it is absent, corrupt, from
    /// another version, or written under different settings.
    pub fn load(cache_file: &Path, settings: &str) -> Self {
        let content = match std::fs::read_to_string(cache_file) {
            Ok(c) => c,
            Err(_) => return Self::empty(settings),
        };
        let cache: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(path = %cache_file.display(), error = %e, "ignoring corrupt cache");
                return Self::empty(settings);
            }
        };
        if cache.version != CACHE_VERSION || cache.settings != settings {
            tracing::debug!(path = %cache_file.display(), "cache written with other settings");
            return Self::empty(settings);
        }
        cache
    }

    pub fn save(&self, cache_file: &Path) -> io::Result<()> {
        if let Some(parent) = cache_file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(cache_file, json)
    }

    /// True iff `path` was recorded with exactly `checksum`.
    pub fn should_skip(&self, path: &str, checksum: &str) -> bool {
        self.entries.get(path).is_some_and(|c| c == checksum)
    }

    pub fn record(&mut self, path: String, checksum: String) {
        self.entries.insert(path, checksum);
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sidecar path for `destination`: the path string with trailing separators
/// stripped and [`CACHE_SUFFIX`] appended.
pub fn cache_path_for(destination: &Path) -> PathBuf {
    let s = destination.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    PathBuf::from(format!("{trimmed}{CACHE_SUFFIX}"))
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 over settings fragments, NUL-separated so `["ab", "c"]` and
/// `["a", "bc"]` differ.
pub fn hash_settings<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}
