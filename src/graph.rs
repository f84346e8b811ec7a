//! Dependency Graph traversal (spec.md §4.4): the engine behind
//! [`crate::core::models::Graph`]. Resolves and transforms modules
//! breadth-first, wires `dependencies`/`inverseDependencies` atomically,
//! and runs a reference-counted reachability sweep on deletion.

use crate::cache::CachedImportKind;
use crate::core::models::{Delta, Dependency, Graph, ImportKind, Module, ModuleType};
use crate::core::traits::TransformOptions;
use crate::id_allocator::IdAllocator;
use crate::resolver::Resolver;
use crate::utils::Result;
use crate::worker_pool::{Priority, WorkerPool};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct DependencyGraph {
    pub graph: Graph,
    resolver: Resolver,
    worker_pool: Arc<WorkerPool>,
    allocator: IdAllocator,
    transform_options: TransformOptions,
    platform: String,
    blacklist: Option<Regex>,
    /// `module_type` override for paths supplied directly as entry points
    /// (polyfills enter as `Script`, run-module requests as `RequireCall`);
    /// everything discovered through a `require`/`import` edge is `Module`.
    entry_kinds: HashMap<PathBuf, ModuleType>,
}

impl DependencyGraph {
    pub fn new(
        resolver: Resolver,
        worker_pool: Arc<WorkerPool>,
        allocator: IdAllocator,
        transform_options: TransformOptions,
        platform: String,
    ) -> Result<Self> {
        let blacklist = resolver.config().blacklist()?;
        Ok(Self {
            graph: Graph::new(),
            resolver,
            worker_pool,
            allocator,
            transform_options,
            platform,
            blacklist,
            entry_kinds: HashMap::new(),
        })
    }

    /// `initialTraverse(entryPoints) -> {added}` (spec.md §4.4). `entries`
    /// pairs each root path with the module type it enters the graph as.
    pub async fn initial_traverse(&mut self, entries: Vec<(PathBuf, ModuleType)>) -> Result<Delta> {
        self.graph.entry_points = entries.iter().map(|(p, _)| p.clone()).collect();
        self.entry_kinds = entries.iter().cloned().collect();

        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        for (path, _) in &entries {
            if visited.insert(path.clone()) {
                queue.push_back(path.clone());
            }
        }

        let mut modified = HashMap::new();
        while let Some(path) = queue.pop_front() {
            let module_type = self.entry_kinds.get(&path).copied().unwrap_or(ModuleType::Module);
            let priority = if self.graph.entry_points.contains(&path) {
                Priority::EntryPoint
            } else {
                Priority::Normal
            };
            let module = self.load_module(&path, module_type, priority).await?;
            for dep in module.dependency_paths() {
                if visited.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
            modified.insert(path, module);
        }

        for (path, module) in &modified {
            self.graph.modules.insert(path.clone(), module.clone());
        }
        self.rewire_inverse_dependencies();

        Ok(Delta {
            modified,
            deleted: HashSet::new(),
            reset: true,
        })
    }

    /// `traverse(dirtyPaths) -> {added, deleted}` (spec.md §4.4). Only
    /// paths still present in the graph are re-transformed; the caller is
    /// responsible for having already dropped paths no longer reachable.
    pub async fn traverse(&mut self, dirty_paths: &HashSet<PathBuf>) -> Result<Delta> {
        let mut modified: HashMap<PathBuf, Module> = HashMap::new();
        let mut newly_unreachable: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();

        for path in dirty_paths {
            if self.graph.modules.contains_key(path) {
                queue.push_back(path.clone());
            }
        }
        let mut seen_in_this_build: HashSet<PathBuf> = queue.iter().cloned().collect();

        while let Some(path) = queue.pop_front() {
            let old_module = self.graph.modules.get(&path).cloned();
            let old_deps: HashSet<PathBuf> = old_module
                .as_ref()
                .map(|m| m.dependency_paths().cloned().collect())
                .unwrap_or_default();

            let module_type = self
                .entry_kinds
                .get(&path)
                .copied()
                .or_else(|| old_module.as_ref().map(|m| m.module_type))
                .unwrap_or(ModuleType::Module);
            let priority = if self.graph.entry_points.contains(&path) {
                Priority::EntryPoint
            } else {
                Priority::Normal
            };
            let new_module = self.load_module(&path, module_type, priority).await?;
            let new_deps: HashSet<PathBuf> = new_module.dependency_paths().cloned().collect();

            for added in new_deps.difference(&old_deps) {
                if seen_in_this_build.insert(added.clone()) && !self.graph.modules.contains_key(added) {
                    queue.push_back(added.clone());
                }
            }

            for removed in old_deps.difference(&new_deps) {
                if let Some(target) = self.graph.modules.get_mut(removed) {
                    target.inverse_dependencies.remove(&path);
                    if target.inverse_dependencies.is_empty() && !self.graph.entry_points.contains(removed) {
                        newly_unreachable.insert(removed.clone());
                    }
                }
            }

            self.graph.modules.insert(path.clone(), new_module.clone());
            modified.insert(path, new_module);
        }

        self.rewire_inverse_dependencies();

        let deleted = self.sweep_unreachable(newly_unreachable);
        for path in &deleted {
            modified.remove(path);
        }

        Ok(Delta {
            modified,
            deleted,
            reset: false,
        })
    }

    /// `markAdded(path)`: a no-op. A freshly-seen path only matters once a
    /// dirty retransform's new dependency list actually references it,
    /// which `traverse` already discovers on its own (spec.md §4.4).
    pub fn mark_added(&self, _path: &Path) {}

    /// The id allocator handle, threaded through to the serializers so
    /// emitted `require(<id>)` calls agree with the RAM bundle's table
    /// offsets (design note, spec.md §9).
    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    /// Removes confirmed-deleted paths directly, without touching disk,
    /// and cascades the reachability sweep from their former dependencies.
    /// Used for watcher delete events that reach a build without an
    /// intervening change event on the same path (spec.md §4.5 S4: a
    /// delete immediately followed by a change on the same path coalesces
    /// into a single dirty retransform instead, handled by `traverse`).
    pub fn remove_paths(&mut self, paths: &HashSet<PathBuf>) -> HashSet<PathBuf> {
        let mut deleted = HashSet::new();
        let mut candidates = Vec::new();

        for path in paths {
            if let Some(module) = self.graph.modules.remove(path) {
                deleted.insert(path.clone());
                for dep in module.dependency_paths() {
                    if let Some(target) = self.graph.modules.get_mut(dep) {
                        target.inverse_dependencies.remove(path);
                        if target.inverse_dependencies.is_empty() && !self.graph.entry_points.contains(dep) {
                            candidates.push(dep.clone());
                        }
                    }
                }
            }
        }

        deleted.extend(self.sweep_unreachable(candidates.into_iter().collect()));
        deleted
    }

    async fn load_module(&self, path: &Path, module_type: ModuleType, priority: Priority) -> Result<Module> {
        let output_id = self.allocator.id_of(path);

        if self.resolver.is_asset(path) {
            return Ok(Module {
                path: path.to_path_buf(),
                module_type: ModuleType::Asset,
                code: String::new(),
                output: None,
                dependencies: Vec::new(),
                inverse_dependencies: HashSet::new(),
                output_id,
            });
        }

        if let Some(re) = &self.blacklist {
            if re.is_match(&path.to_string_lossy()) {
                // Blacklist vs. resolve order (spec.md §9, normative):
                // skip traversal but still treat the edge as resolved, so
                // the module exists (satisfying invariant 1) with no
                // dependencies of its own.
                return Ok(Module {
                    path: path.to_path_buf(),
                    module_type: ModuleType::Comment,
                    code: String::new(),
                    output: None,
                    dependencies: Vec::new(),
                    inverse_dependencies: HashSet::new(),
                    output_id,
                });
            }
        }

        let source = tokio::fs::read_to_string(path).await?;
        let entry = self
            .worker_pool
            .transform(
                path.to_path_buf(),
                Arc::from(source.as_str()),
                self.transform_options.clone(),
                priority,
            )
            .await?;

        let mut dependencies = Vec::with_capacity(entry.dependencies.len());
        for raw in &entry.dependencies {
            let target = self.resolver.resolve(path, &raw.request, &self.platform)?;
            dependencies.push(Dependency {
                request: raw.request.clone(),
                path: target,
                kind: match raw.kind {
                    CachedImportKind::Static => ImportKind::Static,
                    CachedImportKind::Dynamic => ImportKind::Dynamic,
                },
            });
        }

        Ok(Module {
            path: path.to_path_buf(),
            module_type,
            code: entry.code,
            output: entry.map.map(Arc::from),
            dependencies,
            inverse_dependencies: HashSet::new(),
            output_id,
        })
    }

    /// Rebuilds every module's `inverseDependencies` from the current
    /// `dependencies` lists. Simpler, and just as correct, as incremental
    /// bookkeeping for the modules touched in a single build batch; the
    /// reachability sweep in [`Self::sweep_unreachable`] handles deletion
    /// incrementally instead, where correctness depends on not clobbering
    /// untouched modules' edges.
    fn rewire_inverse_dependencies(&mut self) {
        let edges: Vec<(PathBuf, PathBuf)> = self
            .graph
            .modules
            .values()
            .flat_map(|m| m.dependency_paths().map(move |d| (m.path.clone(), d.clone())))
            .collect();
        for module in self.graph.modules.values_mut() {
            module.inverse_dependencies.clear();
        }
        for (from, to) in edges {
            if let Some(target) = self.graph.modules.get_mut(&to) {
                target.inverse_dependencies.insert(from);
            }
        }
    }

    /// Reference-counted reachability sweep (spec.md §9): pops candidates
    /// whose inverse-dependency set emptied out, removes them, and pushes
    /// their own dependencies as new candidates. Deletion is transitive.
    fn sweep_unreachable(&mut self, seed: HashSet<PathBuf>) -> HashSet<PathBuf> {
        let mut stack: Vec<PathBuf> = seed.into_iter().collect();
        let mut deleted = HashSet::new();

        while let Some(path) = stack.pop() {
            if deleted.contains(&path) || self.graph.entry_points.contains(&path) {
                continue;
            }
            let still_unreachable = self
                .graph
                .modules
                .get(&path)
                .map(|m| m.inverse_dependencies.is_empty())
                .unwrap_or(false);
            if !still_unreachable {
                continue;
            }

            if let Some(module) = self.graph.modules.remove(&path) {
                deleted.insert(path.clone());
                for dep in module.dependency_paths() {
                    if let Some(target) = self.graph.modules.get_mut(dep) {
                        target.inverse_dependencies.remove(&path);
                        if target.inverse_dependencies.is_empty() {
                            stack.push(dep.clone());
                        }
                    }
                }
            }
        }

        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use std::fs;
    use tempfile::TempDir;

    async fn setup(dir: &TempDir) -> DependencyGraph {
        let root = dir.path().to_path_buf();
        let config = Config::default_for_root(&root);
        let resolver = Resolver::new(config.clone());
        let cache = Arc::new(Cache::new(config.cache_dir(), 10 * 1024 * 1024).unwrap());
        let pool = Arc::new(WorkerPool::new(cache, 2, config.transformer_key.clone()));
        DependencyGraph::new(
            resolver,
            pool,
            IdAllocator::new(),
            TransformOptions::default(),
            "web".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn initial_traverse_discovers_transitive_dependencies() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("entry.js"), "require('./a');\n").unwrap();
        fs::write(dir.path().join("a.js"), "require('./b');\n").unwrap();
        fs::write(dir.path().join("b.js"), "").unwrap();

        let mut graph = setup(&dir).await;
        let entry = dir.path().join("entry.js");
        let delta = graph
            .initial_traverse(vec![(entry.clone(), ModuleType::Module)])
            .await
            .unwrap();

        assert!(delta.reset);
        assert_eq!(delta.modified.len(), 3);
        assert_eq!(graph.graph.reachable().len(), 3);
        graph.graph.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn traverse_removes_modules_no_longer_referenced() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("entry.js"), "require('./a');\n").unwrap();
        fs::write(dir.path().join("a.js"), "require('./b');\n").unwrap();
        fs::write(dir.path().join("b.js"), "").unwrap();

        let mut graph = setup(&dir).await;
        let entry = dir.path().join("entry.js");
        graph
            .initial_traverse(vec![(entry.clone(), ModuleType::Module)])
            .await
            .unwrap();

        // `a.js` drops its dependency on `b.js`.
        fs::write(dir.path().join("a.js"), "").unwrap();
        let mut dirty = HashSet::new();
        dirty.insert(dir.path().join("a.js"));
        let delta = graph.traverse(&dirty).await.unwrap();

        assert!(delta.deleted.contains(&dir.path().join("b.js")));
        assert!(!graph.graph.modules.contains_key(&dir.path().join("b.js")));
        graph.graph.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn traverse_with_no_changes_yields_empty_delta() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("entry.js"), "").unwrap();
        let mut graph = setup(&dir).await;
        let entry = dir.path().join("entry.js");
        graph
            .initial_traverse(vec![(entry.clone(), ModuleType::Module)])
            .await
            .unwrap();

        let delta = graph.traverse(&HashSet::new()).await.unwrap();
        assert!(delta.is_empty());
    }
}
