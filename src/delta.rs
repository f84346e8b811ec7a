//! Delta Calculator (spec.md §4.5): the explicit `Fresh`/`Clean`/`Dirty`/
//! `Building` state machine driving `DependencyGraph`. A single-flight
//! gate serializes concurrent `get_delta` callers onto one traversal;
//! watcher events arriving mid-build queue into a pending set applied
//! right after. `end()` cancels the in-flight build and rejects waiters.

use crate::core::models::{Delta, Graph, Module, ModuleType};
use crate::graph::DependencyGraph;
use crate::utils::{BundlerError, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirtyKind {
    Changed,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Clean,
    Dirty,
    Building,
}

struct Inner {
    state: State,
    dirty: HashMap<PathBuf, DirtyKind>,
    pending: HashMap<PathBuf, DirtyKind>,
}

enum BuildPlan {
    Initial,
    Reset,
    Traverse(HashMap<PathBuf, DirtyKind>),
}

pub struct DeltaCalculator {
    graph: Mutex<DependencyGraph>,
    inner: Mutex<Inner>,
    build_done: Notify,
    entry_points: Vec<(PathBuf, ModuleType)>,
    ended: std::sync::atomic::AtomicBool,
}

impl DeltaCalculator {
    pub fn new(graph: DependencyGraph, entry_points: Vec<(PathBuf, ModuleType)>) -> Self {
        Self {
            graph: Mutex::new(graph),
            inner: Mutex::new(Inner {
                state: State::Fresh,
                dirty: HashMap::new(),
                pending: HashMap::new(),
            }),
            build_done: Notify::new(),
            entry_points,
            ended: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub async fn on_change(&self, path: PathBuf) {
        self.mark(path, DirtyKind::Changed).await;
    }

    pub async fn on_delete(&self, path: PathBuf) {
        self.mark(path, DirtyKind::Deleted).await;
    }

    /// A previously-unseen path the watcher reports as added. Per spec.md
    /// §4.4/§4.5 this is always ignored at the graph level; `traverse`
    /// discovers genuinely new files on its own, through the dependency
    /// edges of whatever dirty module ends up referencing them.
    pub async fn on_add(&self, path: PathBuf) {
        let graph = self.graph.lock().await;
        graph.mark_added(&path);
    }

    /// Routes a dirty mark to whichever set is live right now: `dirty` if
    /// no build is in flight, `pending` (applied right after the current
    /// build publishes) if one is. `HashMap::insert` overwriting a prior
    /// entry is what gives delete-then-change on the same path its
    /// coalesced, single-retransform outcome (spec.md §4.5 S4).
    async fn mark(&self, path: PathBuf, kind: DirtyKind) {
        if self.ended.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let mut guard = self.inner.lock().await;
        if guard.state == State::Building {
            guard.pending.insert(path, kind);
        } else {
            guard.dirty.insert(path, kind);
            if guard.state == State::Clean {
                guard.state = State::Dirty;
            }
        }
    }

    /// `getDelta(reset)` (spec.md §4.5). At most one traversal runs at a
    /// time; concurrent callers block on the same in-flight build rather
    /// than starting their own.
    pub async fn get_delta(&self, reset: bool) -> Result<Delta> {
        loop {
            if self.ended.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(BundlerError::SessionEnded);
            }

            let plan;
            let mut retry_snapshot: Option<HashMap<PathBuf, DirtyKind>> = None;
            {
                let mut guard = self.inner.lock().await;
                match guard.state {
                    State::Building => {
                        drop(guard);
                        self.build_done.notified().await;
                        continue;
                    }
                    State::Fresh => {
                        plan = BuildPlan::Initial;
                        guard.state = State::Building;
                    }
                    _ if reset => {
                        plan = BuildPlan::Reset;
                        guard.state = State::Building;
                    }
                    State::Clean => {
                        return Ok(Delta::default());
                    }
                    State::Dirty => {
                        let snapshot = std::mem::take(&mut guard.dirty);
                        retry_snapshot = Some(snapshot.clone());
                        plan = BuildPlan::Traverse(snapshot);
                        guard.state = State::Building;
                    }
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = self.wait_for_end() => Err(BundlerError::SessionEnded),
                result = self.run_build(plan) => result,
            };

            let mut guard = self.inner.lock().await;
            match &outcome {
                Ok(_) => {
                    // A `Reset` plan snapshots the reachable set without
                    // consuming `guard.dirty` (it isn't a traversal of the
                    // dirty set), so any edits marked dirty before or during
                    // the build are still owed a retransform — merge them
                    // with whatever else queued up as `pending` and recover
                    // to `Dirty` rather than stranding them under `Clean`.
                    for (path, kind) in std::mem::take(&mut guard.pending) {
                        guard.dirty.entry(path).or_insert(kind);
                    }
                    guard.state = if guard.dirty.is_empty() { State::Clean } else { State::Dirty };
                }
                Err(_) => {
                    // Recover to Dirty so the next call retries the same
                    // set (spec.md §4.5: "the next getDelta retries the
                    // same dirty set"); anything accumulated as pending
                    // during the failed build joins the retry set too.
                    if let Some(snapshot) = retry_snapshot.take() {
                        for (path, kind) in snapshot {
                            guard.dirty.entry(path).or_insert(kind);
                        }
                    }
                    for (path, kind) in guard.pending.drain() {
                        guard.dirty.entry(path).or_insert(kind);
                    }
                    guard.state = if guard.dirty.is_empty() { State::Clean } else { State::Dirty };
                }
            }
            drop(guard);
            self.build_done.notify_waiters();
            return outcome;
        }
    }

    /// A read-only snapshot of the current graph and its id allocator, for
    /// a [`crate::session::Session`] to hand to the serializers. Cloning
    /// the graph here (rather than handing out a reference) keeps the
    /// snapshot stable across the `await` points serialization needs,
    /// without holding the traversal lock for the whole write.
    pub async fn snapshot(&self) -> (Graph, crate::id_allocator::IdAllocator) {
        let graph = self.graph.lock().await;
        (graph.graph.clone(), graph.allocator().clone())
    }

    /// `end()` (spec.md §4.5): aborts the in-flight traversal (via the
    /// `select!` race in `get_delta`) and causes every subsequent call to
    /// reject immediately. The graph itself is left intact for late
    /// readers; only new builds are refused.
    pub fn end(&self) {
        self.ended.store(true, std::sync::atomic::Ordering::SeqCst);
        self.build_done.notify_waiters();
    }

    async fn wait_for_end(&self) {
        loop {
            if self.ended.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            self.build_done.notified().await;
        }
    }

    async fn run_build(&self, plan: BuildPlan) -> Result<Delta> {
        match plan {
            BuildPlan::Initial => {
                let mut graph = self.graph.lock().await;
                graph.initial_traverse(self.entry_points.clone()).await
            }
            BuildPlan::Reset => {
                let graph = self.graph.lock().await;
                let modified: HashMap<PathBuf, Module> = graph
                    .graph
                    .reachable()
                    .into_iter()
                    .filter_map(|path| graph.graph.modules.get(&path).map(|m| (path, m.clone())))
                    .collect();
                Ok(Delta {
                    modified,
                    deleted: HashSet::new(),
                    reset: true,
                })
            }
            BuildPlan::Traverse(dirty) => {
                let mut graph = self.graph.lock().await;
                let deleted_paths: HashSet<PathBuf> = dirty
                    .iter()
                    .filter(|(_, kind)| **kind == DirtyKind::Deleted)
                    .map(|(p, _)| p.clone())
                    .collect();
                let changed_paths: HashSet<PathBuf> = dirty
                    .iter()
                    .filter(|(_, kind)| **kind == DirtyKind::Changed)
                    .map(|(p, _)| p.clone())
                    .collect();

                let mut deleted = graph.remove_paths(&deleted_paths);
                let mut result = graph.traverse(&changed_paths).await?;
                deleted.extend(result.deleted.drain());
                result.deleted = deleted;
                Ok(result)
            }
        }
    }
}
