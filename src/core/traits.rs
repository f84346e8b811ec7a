//! Injected capability records (design note, spec.md §9): rather than an
//! open-ended plugin/reflection surface, each dynamic hook Metro exposes
//! becomes one narrow trait with enumerated methods.

use crate::core::models::{Module, ModuleId};
use std::path::PathBuf;

/// Per-bundle-request transform knobs threaded through the Worker Pool's
/// cache key (spec.md §3 Transformer Cache Entry: keyed in part on
/// `options`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct TransformOptions {
    pub platform: String,
    pub dev: bool,
    pub minify: bool,
    pub hot: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            platform: "web".to_string(),
            dev: true,
            minify: false,
            hot: false,
        }
    }
}

/// `getTransformOptions`: compute per-request transform options from the
/// entry points and platform, e.g. to flip on JSX dev transforms only for
/// certain entry points.
pub trait TransformOptionsProvider: Send + Sync {
    fn transform_options(&self, entry_points: &[PathBuf], platform: &str) -> TransformOptions;
}

pub struct DefaultTransformOptionsProvider;

impl TransformOptionsProvider for DefaultTransformOptionsProvider {
    fn transform_options(&self, _entry_points: &[PathBuf], platform: &str) -> TransformOptions {
        TransformOptions {
            platform: platform.to_string(),
            ..TransformOptions::default()
        }
    }
}

/// `getPolyfills`: extra `script`-typed modules prepended before user
/// entry points, loaded once per platform.
pub trait PolyfillProvider: Send + Sync {
    fn polyfills(&self, platform: &str) -> Vec<PathBuf>;
}

pub struct NoPolyfills;

impl PolyfillProvider for NoPolyfills {
    fn polyfills(&self, _platform: &str) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// `postProcessModules`: a final pass over the modules about to be
/// serialized, in BFS order, after the graph snapshot is taken but before
/// bytes are emitted.
pub trait ModulePostProcessor: Send + Sync {
    fn post_process(&self, modules: Vec<Module>) -> Vec<Module>;
}

pub struct IdentityPostProcessor;

impl ModulePostProcessor for IdentityPostProcessor {
    fn post_process(&self, modules: Vec<Module>) -> Vec<Module> {
        modules
    }
}

/// Enumerated reporter events — the narrow interface a terminal UI or
/// structured-log sink can subscribe to without reaching into the driver.
#[derive(Debug, Clone)]
pub enum ReporterEvent {
    TraverseStart { dirty_count: usize },
    TraverseDone { duration: std::time::Duration },
    DeltaPublished { modified: usize, deleted: usize, reset: bool },
    TransformFailed { path: PathBuf, message: String },
    ModuleAdded { id: ModuleId, path: PathBuf },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: ReporterEvent);
}

/// Reporter backed by `tracing`, the ambient logging choice (SPEC_FULL §4.10).
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: ReporterEvent) {
        match event {
            ReporterEvent::TraverseStart { dirty_count } => {
                crate::utils::Logger::traverse_start(dirty_count)
            }
            ReporterEvent::TraverseDone { duration } => {
                tracing::info!("traverse done in {:.2?}", duration)
            }
            ReporterEvent::DeltaPublished { modified, deleted, reset } => {
                crate::utils::Logger::delta_published(modified, deleted, reset)
            }
            ReporterEvent::TransformFailed { path, message } => {
                crate::utils::Logger::transform_error(&path.display().to_string(), &message)
            }
            ReporterEvent::ModuleAdded { id, path } => {
                tracing::debug!("module #{} <- {}", id, path.display())
            }
        }
    }
}
