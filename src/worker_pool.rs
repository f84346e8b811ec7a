//! Worker Pool (spec.md §4.3): bounded parallelism over the Transformer
//! Cache, single-flight per cache key, fair FIFO-within-priority
//! admission. CPU-bound parsing runs on `spawn_blocking` so the pool
//! still plays nicely with the async driver (spec.md §4.8) that owns it.

use crate::cache::{compute_key, Cache, CacheEntry, CacheKey};
use crate::core::traits::TransformOptions;
use crate::utils::{BundlerError, Result};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OnceCell, Semaphore};

/// `Priority::EntryPoint` jobs are always admitted ahead of `Normal` ones;
/// within a class, admission is FIFO (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    EntryPoint,
    Normal,
}

struct Job {
    path: PathBuf,
    source: Arc<str>,
    key: CacheKey,
    respond: oneshot::Sender<Result<CacheEntry>>,
}

pub struct WorkerPool {
    cache: Arc<Cache>,
    transformer_cache_key: String,
    inflight: Arc<DashMap<CacheKey, Arc<OnceCell<CacheEntry>>>>,
    hi_tx: mpsc::UnboundedSender<Job>,
    lo_tx: mpsc::UnboundedSender<Job>,
}

impl WorkerPool {
    /// `max_workers` bounds how many transforms run concurrently — spec.md
    /// §6 `maxWorkers`, overridable from the default of half the logical
    /// cores.
    pub fn new(cache: Arc<Cache>, max_workers: usize, transformer_cache_key: String) -> Self {
        let (hi_tx, hi_rx) = mpsc::unbounded_channel();
        let (lo_tx, lo_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        let cache_for_loop = cache.clone();

        tokio::spawn(dispatch_loop(hi_rx, lo_rx, semaphore, cache_for_loop));

        Self {
            cache,
            transformer_cache_key,
            inflight: Arc::new(DashMap::new()),
            hi_tx,
            lo_tx,
        }
    }

    pub fn default_worker_count() -> usize {
        (num_cpus::get() / 2).max(1)
    }

    /// Transforms `source`, sharing in-flight work with any other caller
    /// currently requesting the identical `(source, options)` pair
    /// (single-flight, spec.md §4.3). A cache hit short-circuits the
    /// queue entirely.
    pub async fn transform(
        &self,
        path: PathBuf,
        source: Arc<str>,
        options: TransformOptions,
        priority: Priority,
    ) -> Result<CacheEntry> {
        let key = compute_key(source.as_bytes(), &self.transformer_cache_key, &options)?;

        if let Some(entry) = self.cache.get(&key) {
            return Ok(entry);
        }

        let cell = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_try_init(|| self.enqueue(key.clone(), path, source, priority))
            .await
            .cloned();

        self.inflight.remove(&key);
        result
    }

    async fn enqueue(
        &self,
        key: CacheKey,
        path: PathBuf,
        source: Arc<str>,
        priority: Priority,
    ) -> Result<CacheEntry> {
        let (tx, rx) = oneshot::channel();
        let job = Job {
            path,
            source,
            key,
            respond: tx,
        };
        let sender = match priority {
            Priority::EntryPoint => &self.hi_tx,
            Priority::Normal => &self.lo_tx,
        };
        sender.send(job).map_err(|_| BundlerError::SessionEnded)?;
        rx.await.map_err(|_| BundlerError::SessionEnded)?
    }
}

async fn dispatch_loop(
    mut hi: mpsc::UnboundedReceiver<Job>,
    mut lo: mpsc::UnboundedReceiver<Job>,
    semaphore: Arc<Semaphore>,
    cache: Arc<Cache>,
) {
    loop {
        let job = tokio::select! {
            biased;
            job = hi.recv() => job,
            job = lo.recv() => job,
        };
        let Some(job) = job else { break };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let cache = cache.clone();

        tokio::spawn(async move {
            let _permit = permit;
            run_job(job, cache).await;
        });
    }
}

async fn run_job(job: Job, cache: Arc<Cache>) {
    let Job {
        path,
        source,
        key,
        respond,
    } = job;

    let result = tokio::task::spawn_blocking(move || crate::transform::transform(&path, &source))
        .await
        .map_err(|e| BundlerError::config(e.to_string()))
        .and_then(|inner| inner);

    let outcome = result.map(|transform_result| {
        let entry = CacheEntry::from(&transform_result);
        let _ = cache.put(&key, &entry);
        entry
    });

    let _ = respond.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn transforms_and_caches_a_module() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(Cache::new(dir.path(), 10 * 1024 * 1024).unwrap());
        let pool = WorkerPool::new(cache, 2, "key-v1".to_string());

        let result = pool
            .transform(
                PathBuf::from("a.js"),
                Arc::from("import b from './b';\n"),
                TransformOptions::default(),
                Priority::EntryPoint,
            )
            .await
            .unwrap();

        assert_eq!(result.dependencies.len(), 1);
        assert_eq!(result.dependencies[0].request, "./b");
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_computation() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(Cache::new(dir.path(), 10 * 1024 * 1024).unwrap());
        let pool = Arc::new(WorkerPool::new(cache, 4, "key-v1".to_string()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                pool.transform(
                    PathBuf::from("shared.js"),
                    Arc::from("const x = 1;\n"),
                    TransformOptions::default(),
                    Priority::Normal,
                )
                .await
                .unwrap()
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn syntax_error_does_not_poison_the_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(Cache::new(dir.path(), 10 * 1024 * 1024).unwrap());
        let pool = WorkerPool::new(cache, 2, "key-v1".to_string());

        let err = pool
            .transform(
                PathBuf::from("broken.js"),
                Arc::from("function( {"),
                TransformOptions::default(),
                Priority::Normal,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BundlerError::Transform(_)));

        let ok = pool
            .transform(
                PathBuf::from("broken.js"),
                Arc::from("const x = 1;\n"),
                TransformOptions::default(),
                Priority::Normal,
            )
            .await
            .unwrap();
        assert_eq!(ok.dependencies.len(), 0);
    }
}
