use std::time::Duration;
use tracing::{error, info, warn};

/// Initializes the process-wide `tracing` subscriber. Filter defaults to
/// `bramble=info`; set `RUST_LOG=bramble=debug` for per-module
/// transform/cache tracing.
pub struct Logger;

impl Logger {
    pub fn init() {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bramble=info")),
            )
            .with_target(false)
            .without_time()
            .init();
    }

    pub fn session_start(root: &str, entry_count: usize) {
        info!("bramble: starting delta session ({} entry points)", entry_count);
        info!("  root: {}", root);
    }

    pub fn traverse_start(dirty_count: usize) {
        if dirty_count == 0 {
            info!("initial traverse");
        } else {
            info!("traverse: {} dirty module(s)", dirty_count);
        }
    }

    pub fn delta_published(modified: usize, deleted: usize, reset: bool) {
        info!(
            "delta: {} modified, {} deleted{}",
            modified,
            deleted,
            if reset { ", reset" } else { "" }
        );
    }

    pub fn transform_error(path: &str, message: &str) {
        error!("transform error in {}: {}", path, message);
    }

    pub fn error(msg: &str) {
        error!("{}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("{}", msg);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        tracing::debug!("{}", msg);
    }
}

/// Scoped timing helper; logs at debug level on drop.
pub struct Timer {
    name: &'static str,
    start: std::time::Instant,
}

impl Timer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        tracing::debug!("{} took {:.2?}", self.name, self.start.elapsed());
    }
}
