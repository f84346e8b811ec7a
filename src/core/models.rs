use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Stable numeric module identifier, assigned once by the
/// [`crate::id_allocator::IdAllocator`] and never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u32);

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five-way tagged variant controlling emission order (design note,
/// spec.md §9). `Asset` modules carry no JS code (asset bytes are an
/// external collaborator's concern); `Comment` modules carry no emitted
/// code either and exist purely so resolver-injected shims keep the
/// graph's inverse-dependency accounting honest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    Script,
    Module,
    RequireCall,
    Asset,
    Comment,
}

impl ModuleType {
    /// `true` for the only type the indexed RAM bundle's offset/length
    /// table actually indexes (spec.md §4.8) — everything else either
    /// folds into the single "startup" blob (`Script`, `RequireCall`) or
    /// is handled by an external collaborator (`Asset`, `Comment`).
    pub fn is_indexed(self) -> bool {
        matches!(self, ModuleType::Module)
    }

    /// `true` for the types concatenated into the RAM bundle's startup
    /// segment / the plain bundle's pre- and post-module sections.
    pub fn is_startup(self) -> bool {
        matches!(self, ModuleType::Script | ModuleType::RequireCall)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Static,
    Dynamic,
}

/// One `require`/`import` occurrence as it appeared in source, before
/// resolution.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub request: String,
    pub path: PathBuf,
    pub kind: ImportKind,
}

/// A single source file plus its transformed code, dependencies, and
/// numeric id (spec.md §3).
#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub module_type: ModuleType,
    pub code: String,
    /// Per-module source-map fragment for `code`, as serialized v3 JSON
    /// (spec.md §3 `output`); shared cheaply because unrelated modules'
    /// retransforms don't invalidate it.
    pub output: Option<Arc<str>>,
    /// Ordered by first appearance in source (require-before-duplicates).
    pub dependencies: Vec<Dependency>,
    pub inverse_dependencies: HashSet<PathBuf>,
    pub output_id: ModuleId,
}

impl Module {
    /// Resolved targets only, in source order — the shape most consumers
    /// (graph traversal, serializers) actually want.
    pub fn dependency_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.dependencies.iter().map(|d| &d.path)
    }
}

/// `{ entryPoints, modules }` (spec.md §3). Entry point order is
/// preserved; it determines plain-bundle BFS iteration order.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub entry_points: Vec<PathBuf>,
    pub modules: HashMap<PathBuf, Module>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invariant 2 (spec.md §8): the module set reachable from
    /// `entry_points` via `dependencies`.
    pub fn reachable(&self) -> HashSet<PathBuf> {
        let mut seen = HashSet::new();
        let mut stack: Vec<PathBuf> = self.entry_points.clone();
        while let Some(path) = stack.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(module) = self.modules.get(&path) {
                for dep in module.dependency_paths() {
                    if !seen.contains(dep) {
                        stack.push(dep.clone());
                    }
                }
            }
        }
        seen
    }

    /// BFS over entry points in order, edges in source order — the
    /// iteration order plain-bundle concatenation and indexed-RAM id
    /// assignment both rely on for determinism (spec.md §4.8).
    pub fn bfs_order(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut queue: std::collections::VecDeque<PathBuf> =
            self.entry_points.iter().cloned().collect();
        let mut order = Vec::new();
        for e in &self.entry_points {
            seen.insert(e.clone());
        }
        while let Some(path) = queue.pop_front() {
            order.push(path.clone());
            if let Some(module) = self.modules.get(&path) {
                for dep in module.dependency_paths() {
                    if seen.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        order
    }

    /// Checks invariant 1: every dependency edge has a matching
    /// inverse-dependency entry on its target.
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), String> {
        for (path, module) in &self.modules {
            for dep in module.dependency_paths() {
                let target = self
                    .modules
                    .get(dep)
                    .ok_or_else(|| format!("{} depends on missing module {}", path.display(), dep.display()))?;
                if !target.inverse_dependencies.contains(path) {
                    return Err(format!(
                        "{} -> {} missing inverse edge",
                        path.display(),
                        dep.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// `{ modified, deleted, reset }` (spec.md §3/§4.8).
#[derive(Debug, Default, Clone)]
pub struct Delta {
    pub modified: HashMap<PathBuf, Module>,
    pub deleted: HashSet<PathBuf>,
    pub reset: bool,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty() && !self.reset
    }
}
