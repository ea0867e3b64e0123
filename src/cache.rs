//! Disk-backed memoization for expensive deterministic transforms.
//!
//! Entries are addressed by a blake3 digest of the transformed bytes and a
//! caller-chosen header, so any change to either misses. Values are written
//! to a temporary file next to their final location and renamed into place,
//! which keeps concurrent writers of the same key from leaving a torn entry.

use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tempfile::NamedTempFile;

pub const DISABLE_ENV: &str = "JKL_DISABLE_CACHE";

#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    enabled: bool,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
        }
    }

    /// Per-user directory under the system temp dir, honouring `JKL_DISABLE_CACHE`.
    pub fn from_env() -> Self {
        let user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| "default".to_string());
        let cache = Self::new(env::temp_dir().join(format!("jkl-cache-{user}")));
        let disabled = env::var(DISABLE_ENV).is_ok_and(|value| !value.is_empty());
        if disabled { cache.disabled() } else { cache }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_cache<F>(&self, header: &str, content: &[u8], compute: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if !self.enabled {
            return compute();
        }

        let path = self.entry_path(header, content);
        match fs::read(&path) {
            Ok(stored) if !stored.is_empty() => return Ok(stored),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cache entry {}", path.display()));
            }
        }

        let value = compute()?;
        self.store(&path, &value)?;
        Ok(value)
    }

    fn entry_path(&self, header: &str, content: &[u8]) -> PathBuf {
        let mut hasher = Hasher::new();
        hasher.update(content);
        hasher.update(b"\n");
        hasher.update(header.as_bytes());
        let digest = hasher.finalize().to_hex();
        let (bucket, rest) = digest.as_str().split_at(2);
        self.dir.join(bucket).join(rest)
    }

    fn store(&self, path: &Path, value: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .with_context(|| format!("cache entry {} has no parent", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache directory {}", parent.display()))?;

        let mut staged = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to stage cache entry in {}", parent.display()))?;
        staged
            .write_all(value)
            .with_context(|| format!("failed to write cache entry {}", path.display()))?;
        staged
            .persist(path)
            .with_context(|| format!("failed to persist cache entry {}", path.display()))?;
        Ok(())
    }
}
