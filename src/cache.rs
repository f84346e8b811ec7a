//! Transformer Cache (spec.md §4.2). Content-addressed: the key is a hash
//! of the source bytes, the transformer's own cache-busting key, and the
//! canonical JSON of the transform options. Pure `get`/single-writer `put`
//! — the single-flight guarantee that concurrent identical requests share
//! one computation lives one layer up, in [`crate::worker_pool`].

use crate::core::traits::TransformOptions;
use crate::transform::TransformResult;
use crate::utils::{BundlerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Hex-encoded blake3 digest. Spec.md names `sha1` as the literal
/// primitive; we substitute blake3 (faster, no known weaknesses) and keep
/// the keying *shape* — `source ++ transformerCacheKey ++ canonicalJson(options)`
/// — normative instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(pub String);

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn compute_key(
    source: &[u8],
    transformer_cache_key: &str,
    options: &TransformOptions,
) -> Result<CacheKey> {
    let canonical_options = serde_json::to_string(options)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(source);
    hasher.update(b"\0");
    hasher.update(transformer_cache_key.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_options.as_bytes());
    Ok(CacheKey(hasher.finalize().to_hex().to_string()))
}

/// The cached half of a transform: everything deterministic from
/// `(source, transformerCacheKey, options)` alone. Resolved dependency
/// paths and numeric ids are *not* part of this — those come from the
/// graph, which is per-session, not content-addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub code: String,
    /// Per-module source-map fragment, serialized v3 JSON (spec.md §3
    /// Transformer Cache Entry: `{ code, map, dependencies }`).
    pub map: Option<String>,
    pub dependencies: Vec<CachedDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDependency {
    pub request: String,
    pub kind: CachedImportKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CachedImportKind {
    Static,
    Dynamic,
}

impl From<&crate::transform::RawDependency> for CachedDependency {
    fn from(d: &crate::transform::RawDependency) -> Self {
        Self {
            request: d.request.clone(),
            kind: match d.kind {
                crate::core::models::ImportKind::Static => CachedImportKind::Static,
                crate::core::models::ImportKind::Dynamic => CachedImportKind::Dynamic,
            },
        }
    }
}

impl From<&TransformResult> for CacheEntry {
    fn from(r: &TransformResult) -> Self {
        Self {
            code: r.code.clone(),
            map: r.map.clone(),
            dependencies: r.dependencies.iter().map(CachedDependency::from).collect(),
        }
    }
}

/// On-disk envelope: a checksum of the payload bytes alongside the
/// payload itself. A mismatch on read (bit rot, a crash mid-write that
/// somehow slipped past the atomic rename, a foreign writer) is treated
/// as a cache miss, never a hard error — the worker pool just recomputes.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    checksum: [u8; 32],
    payload: Vec<u8>,
}

pub struct Cache {
    root: PathBuf,
    max_bytes: u64,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, max_bytes })
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let bytes = fs::read(&path).ok()?;
        let envelope: Envelope = bincode::deserialize(&bytes).ok()?;
        let actual = blake3::hash(&envelope.payload);
        if actual.as_bytes() != &envelope.checksum {
            // Corrupt entry; remove it so it stops costing us a failed
            // read on every subsequent lookup.
            let _ = fs::remove_file(&path);
            return None;
        }
        let entry: CacheEntry = bincode::deserialize(&envelope.payload).ok()?;
        let _ = touch(&path);
        Some(entry)
    }

    /// Writes `entry` atomically: serialize to a temp file in the same
    /// directory as the final path, then rename over it. A reader racing
    /// the write either sees the old complete file or the new complete
    /// file, never a partial one.
    pub fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(key);
        let dir = path.parent().expect("entry_path always has a parent");
        fs::create_dir_all(dir)?;

        let payload = bincode::serialize(entry)?;
        let checksum = *blake3::hash(&payload).as_bytes();
        let envelope = Envelope { checksum, payload };
        let bytes = bincode::serialize(&envelope)?;

        let tmp_name = format!(".{}.tmp-{}", key.0, std::process::id());
        let tmp_path = dir.join(tmp_name);
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &path)?;

        self.evict_if_over_budget()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let prefix = &key.0[..2.min(key.0.len())];
        self.root.join(prefix).join(format!("{}.cache", key.0))
    }

    /// Bounded LRU eviction: walks every entry, ranks by last-modified
    /// time (touched on every `get`), and removes the oldest until the
    /// total is back under budget. Good enough for a per-project cache
    /// directory; not meant to scale to millions of entries.
    fn evict_if_over_budget(&self) -> Result<()> {
        let mut entries: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
        let mut total: u64 = 0;

        for shard in fs::read_dir(&self.root)?.flatten() {
            if !shard.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            for file in fs::read_dir(shard.path())?.flatten() {
                let meta = match file.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if !meta.is_file() {
                    continue;
                }
                let size = meta.len();
                let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                total += size;
                entries.push((file.path(), size, mtime));
            }
        }

        if total <= self.max_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in entries {
            if total <= self.max_bytes {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(size);
            }
        }
        Ok(())
    }
}

fn touch(path: &Path) -> Result<()> {
    let now = std::time::SystemTime::now();
    let file = fs::File::open(path)?;
    file.set_modified(now).map_err(BundlerError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            code: "console.log(1);".to_string(),
            map: None,
            dependencies: vec![CachedDependency {
                request: "./a".to_string(),
                kind: CachedImportKind::Static,
            }],
        }
    }

    #[test]
    fn round_trips_an_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::new(dir.path(), 10 * 1024 * 1024).unwrap();
        let key = compute_key(b"source", "key-v1", &TransformOptions::default()).unwrap();

        assert!(cache.get(&key).is_none());
        cache.put(&key, &sample_entry()).unwrap();

        let loaded = cache.get(&key).unwrap();
        assert_eq!(loaded.code, "console.log(1);");
        assert_eq!(loaded.dependencies[0].request, "./a");
    }

    #[test]
    fn key_changes_with_options() {
        let mut dev = TransformOptions::default();
        dev.dev = true;
        let mut prod = TransformOptions::default();
        prod.dev = false;

        let a = compute_key(b"source", "key-v1", &dev).unwrap();
        let b = compute_key(b"source", "key-v1", &prod).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn corrupt_entry_is_a_silent_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::new(dir.path(), 10 * 1024 * 1024).unwrap();
        let key = compute_key(b"source", "key-v1", &TransformOptions::default()).unwrap();
        cache.put(&key, &sample_entry()).unwrap();

        let path = cache.entry_path(&key);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn eviction_keeps_total_under_budget() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::new(dir.path(), 200).unwrap();
        for i in 0..20 {
            let key = compute_key(format!("source-{i}").as_bytes(), "key-v1", &TransformOptions::default()).unwrap();
            let entry = CacheEntry {
                code: "x".repeat(64),
                map: None,
                dependencies: vec![],
            };
            cache.put(&key, &entry).unwrap();
        }

        let mut total = 0u64;
        for shard in fs::read_dir(dir.path()).unwrap().flatten() {
            if shard.file_type().unwrap().is_dir() {
                for file in fs::read_dir(shard.path()).unwrap().flatten() {
                    total += file.metadata().unwrap().len();
                }
            }
        }
        assert!(total <= 200, "total {total} exceeds budget");
    }
}
