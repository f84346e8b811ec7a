//! Watcher adapter (spec.md §2 "watch backend"; Non-goals: "it does not
//! itself watch the filesystem — it consumes events from an injected
//! watcher"). [`Watcher`] is the narrow interface any watch backend must
//! satisfy; [`NotifyWatcher`] is the one concrete `notify`-backed adapter
//! the crate ships, the way the teacher's own `UltraWatcher` wrapped
//! `notify::RecommendedWatcher` — just behind a trait boundary now, so the
//! Delta Calculator never reaches into `notify` directly.

use crate::utils::{BundlerError, Result};
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherExt};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Changed(PathBuf),
    Deleted(PathBuf),
    Added(PathBuf),
}

/// Injected capability (spec.md §5: "the Worker Pool ... driver ...
/// awaiting ... watcher events"). Implementors own their OS integration;
/// the core only calls `ready`/`next_event`.
#[async_trait]
pub trait Watcher: Send {
    /// Resolves once the backend has finished its initial scan. The
    /// ~120s startup bound (spec.md §5) is enforced by the caller
    /// ([`crate::session::Session::drive_watcher`]), not by implementors.
    async fn ready(&mut self) -> Result<()>;

    /// The next change event, or `None` once the event stream has
    /// permanently ended.
    async fn next_event(&mut self) -> Option<WatchEvent>;
}

/// `notify`-backed adapter recursively watching a fixed set of roots.
/// Filters VCS/build noise the same way the teacher's watcher did
/// (`.git`, `node_modules`, the transform cache directory, editor swap
/// files) — pure signal-to-noise filtering, not part of the core's
/// dirty-tracking semantics.
pub struct NotifyWatcher {
    _inner: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl NotifyWatcher {
    pub fn new(roots: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if should_ignore(&event) {
                return;
            }
            for watch_event in translate(&event) {
                let _ = tx.send(watch_event);
            }
        })
        .map_err(|e| BundlerError::config(format!("failed to start watcher: {e}")))?;

        for root in roots {
            inner
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| BundlerError::config(format!("failed to watch {}: {}", root.display(), e)))?;
        }

        Ok(Self { _inner: inner, rx })
    }
}

#[async_trait]
impl Watcher for NotifyWatcher {
    async fn ready(&mut self) -> Result<()> {
        // `notify`'s recursive watch call above completes its scan
        // synchronously in `new`; there is no separate readiness signal.
        Ok(())
    }

    async fn next_event(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

fn should_ignore(event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
        return true;
    }
    event.paths.iter().any(|p| {
        let s = p.to_string_lossy();
        s.contains(".git")
            || s.contains("node_modules")
            || s.contains(".bramble-cache")
            || s.ends_with('~')
            || s.ends_with(".swp")
    })
}

fn translate(event: &Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Remove(_) => event.paths.iter().cloned().map(WatchEvent::Deleted).collect(),
        EventKind::Create(_) => event.paths.iter().cloned().map(WatchEvent::Added).collect(),
        _ => event.paths.iter().cloned().map(WatchEvent::Changed).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn create_events_translate_to_added() {
        let e = event(EventKind::Create(CreateKind::File), vec![PathBuf::from("new.js")]);
        let out = translate(&e);
        assert!(matches!(out.as_slice(), [WatchEvent::Added(p)] if p == &PathBuf::from("new.js")));
    }

    #[test]
    fn remove_events_translate_to_deleted() {
        let e = event(EventKind::Remove(RemoveKind::File), vec![PathBuf::from("gone.js")]);
        let out = translate(&e);
        assert!(matches!(out.as_slice(), [WatchEvent::Deleted(p)] if p == &PathBuf::from("gone.js")));
    }

    #[test]
    fn modify_events_translate_to_changed() {
        let e = event(EventKind::Modify(ModifyKind::Any), vec![PathBuf::from("edited.js")]);
        let out = translate(&e);
        assert!(matches!(out.as_slice(), [WatchEvent::Changed(p)] if p == &PathBuf::from("edited.js")));
    }

    #[test]
    fn node_modules_paths_are_ignored() {
        let e = event(
            EventKind::Modify(ModifyKind::Any),
            vec![PathBuf::from("node_modules/pkg/index.js")],
        );
        assert!(should_ignore(&e));
    }

    #[test]
    fn access_events_are_ignored() {
        let e = event(EventKind::Access(notify::event::AccessKind::Any), vec![PathBuf::from("a.js")]);
        assert!(should_ignore(&e));
    }
}
