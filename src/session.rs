//! Session/Driver (spec.md §2 "Session/Driver"): wraps one client's
//! [`DeltaCalculator`] with the epoch bookkeeping the delta wire format
//! needs (`deltaBundleId`, spec.md §6) and the watcher loop that feeds it
//! change events.

use crate::core::models::{Delta, Graph};
use crate::core::traits::{Reporter, ReporterEvent};
use crate::delta::DeltaCalculator;
use crate::id_allocator::IdAllocator;
use crate::utils::{BundlerError, Result};
use crate::watch::{WatchEvent, Watcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The watcher's ready signal has an upper bound enforced only at startup
/// (spec.md §5).
const WATCHER_READY_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Session {
    calculator: Arc<DeltaCalculator>,
    reporter: Arc<dyn Reporter>,
    epoch: Mutex<String>,
}

impl Session {
    pub fn new(calculator: DeltaCalculator, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            calculator: Arc::new(calculator),
            reporter,
            epoch: Mutex::new(new_epoch()),
        }
    }

    /// `getDelta(reset)` (spec.md §4.5) plus the epoch id clients echo back
    /// as `deltaBundleId`. A fresh epoch is minted whenever the delta is
    /// non-empty; two back-to-back no-op calls keep reporting the same one
    /// (spec.md §8 property 3).
    pub async fn get_delta(&self, reset: bool) -> Result<(String, Delta)> {
        let start = std::time::Instant::now();
        self.reporter.report(ReporterEvent::TraverseStart { dirty_count: 0 });
        let delta = self.calculator.get_delta(reset).await?;
        self.reporter.report(ReporterEvent::TraverseDone { duration: start.elapsed() });
        self.reporter.report(ReporterEvent::DeltaPublished {
            modified: delta.modified.len(),
            deleted: delta.deleted.len(),
            reset: delta.reset,
        });

        if !delta.is_empty() {
            *self.epoch.lock().await = new_epoch();
        }
        let epoch = self.epoch.lock().await.clone();
        Ok((epoch, delta))
    }

    /// A read-only graph snapshot for the serializers (spec.md §4.8).
    pub async fn snapshot(&self) -> (Graph, IdAllocator) {
        self.calculator.snapshot().await
    }

    /// Forwards a watcher-observed change event to the calculator
    /// (spec.md §4.5). Exposed directly so callers that already run their
    /// own watcher loop (rather than handing it to [`Self::drive_watcher`])
    /// can still feed events in.
    pub async fn notify_change(&self, path: std::path::PathBuf) {
        self.calculator.on_change(path).await;
    }

    /// Forwards a watcher-observed delete event (spec.md §4.5).
    pub async fn notify_delete(&self, path: std::path::PathBuf) {
        self.calculator.on_delete(path).await;
    }

    /// Forwards a watcher-observed add event (spec.md §4.4/§4.5: a no-op
    /// unless a subsequent dirty retransform references the path).
    pub async fn notify_add(&self, path: std::path::PathBuf) {
        self.calculator.on_add(path).await;
    }

    /// `end()` (spec.md §4.5): idempotent, cancels any in-flight build,
    /// rejects future `get_delta` calls.
    pub fn end(&self) {
        self.calculator.end();
    }

    /// Drives an injected watcher: awaits readiness under
    /// [`WATCHER_READY_TIMEOUT`], then forwards every event into the
    /// calculator and invokes `on_delta` with the resulting delta. Returns
    /// once the watcher's event stream ends or the session is torn down.
    pub async fn drive_watcher<W, F, Fut>(&self, mut watcher: W, mut on_delta: F) -> Result<()>
    where
        W: Watcher,
        F: FnMut(String, Delta) -> Fut,
        Fut: Future<Output = ()>,
    {
        tokio::time::timeout(WATCHER_READY_TIMEOUT, watcher.ready())
            .await
            .map_err(|_| BundlerError::WatcherTimeout)??;

        while let Some(event) = watcher.next_event().await {
            match event {
                WatchEvent::Changed(path) => self.calculator.on_change(path).await,
                WatchEvent::Deleted(path) => self.calculator.on_delete(path).await,
                WatchEvent::Added(path) => self.calculator.on_add(path).await,
            }

            match self.get_delta(false).await {
                Ok((epoch, delta)) => on_delta(epoch, delta).await,
                Err(BundlerError::SessionEnded) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn new_epoch() -> String {
    uuid::Uuid::new_v4().to_string()
}
