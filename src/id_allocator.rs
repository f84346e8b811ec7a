//! Module-ID Allocator (spec.md §4.6). Assignment is monotonically
//! increasing in order of first call within a session; ids are never
//! reused, even once their module is deleted (design note, §9: the
//! allocator handle is threaded into both the rewrite pass and the
//! serializer so emitted `require(<id>)` calls always agree with table
//! offsets).

use crate::core::models::ModuleId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    by_path: HashMap<PathBuf, ModuleId>,
    next: u32,
}

/// Cheaply cloned handle; every clone shares the same underlying counter
/// and path table, so any number of components (resolver callbacks, the
/// transformer's require-rewrite pass, the serializer) can hold one.
#[derive(Clone, Default)]
pub struct IdAllocator {
    inner: Arc<Mutex<Inner>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing id for `path`, or assigns the next one.
    pub fn id_of(&self, path: &Path) -> ModuleId {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.by_path.get(path) {
            return *id;
        }
        let id = ModuleId(inner.next);
        inner.next += 1;
        inner.by_path.insert(path.to_path_buf(), id);
        id
    }

    /// The id a path was already assigned, without allocating one.
    pub fn existing_id_of(&self, path: &Path) -> Option<ModuleId> {
        self.inner.lock().by_path.get(path).copied()
    }

    /// One greater than the maximum assigned id — `N` in the indexed RAM
    /// bundle layout (spec.md §6). Zero if nothing has been allocated yet.
    pub fn table_size(&self) -> u32 {
        self.inner.lock().next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_monotonic() {
        let alloc = IdAllocator::new();
        let a = alloc.id_of(Path::new("/a.js"));
        let b = alloc.id_of(Path::new("/b.js"));
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        // Re-querying the same path never reassigns.
        assert_eq!(alloc.id_of(Path::new("/a.js")), a);
        assert_eq!(alloc.table_size(), 2);
    }

    #[test]
    fn ids_are_never_reused_even_if_deleted_conceptually() {
        let alloc = IdAllocator::new();
        let a = alloc.id_of(Path::new("/a.js"));
        let _b = alloc.id_of(Path::new("/b.js"));
        // Pretend /a.js got deleted from the graph; the allocator itself
        // doesn't forget, so a third module still gets id 2, not 0.
        let c = alloc.id_of(Path::new("/c.js"));
        assert_eq!(c.0, 2);
        assert_eq!(alloc.existing_id_of(Path::new("/a.js")), Some(a));
    }
}
