//! Serializers (spec.md §4.8): turn a [`crate::core::models::Graph`]
//! snapshot into the three bundle artifacts plus their source maps, and
//! turn a [`crate::core::models::Delta`] into the delta wire response.
//!
//! All four serializers share one ordering pass over the graph
//! ([`collect_modules`]) so that "pre-modules, modules, post-modules, in
//! BFS/source order" (spec.md §4.8) only needs to be gotten right once.

pub mod delta_response;
pub mod file_ram;
pub mod plain;
pub mod ram_bundle;
pub mod source_map;

use crate::core::models::{Graph, ModuleType};
use crate::id_allocator::IdAllocator;
use crate::utils::Result;
use crate::wrap::wrap_module;
use std::path::PathBuf;
use std::sync::Arc;

/// A module as the serializers consume it: already wrapped into its final
/// emitted form (spec.md §4.7), in the order it will appear in the
/// concatenated output.
pub struct SerializableModule {
    pub path: PathBuf,
    pub id: u32,
    pub module_type: ModuleType,
    pub code: String,
    pub output: Option<Arc<str>>,
}

/// Orders every reachable module as "pre-modules (script), modules (BFS
/// from the entry points, edges in source order), post-modules
/// (require-call)" (spec.md §4.8), wrapping each one's code along the way.
/// `Asset`/`Comment` modules are dropped: they carry no emittable code
/// (asset bytes are an external collaborator's concern; blacklisted
/// modules are graph bookkeeping only, spec.md §9).
pub fn collect_modules(graph: &Graph, allocator: &IdAllocator) -> Result<Vec<SerializableModule>> {
    let order = graph.bfs_order();

    let mut pre = Vec::new();
    let mut main = Vec::new();
    let mut post = Vec::new();

    for path in order {
        let Some(module) = graph.modules.get(&path) else {
            continue;
        };
        if matches!(module.module_type, ModuleType::Asset | ModuleType::Comment) {
            continue;
        }

        let code = wrap_module(module, allocator)?;
        let entry = SerializableModule {
            path: module.path.clone(),
            id: module.output_id.0,
            module_type: module.module_type,
            code,
            output: module.output.clone(),
        };

        match module.module_type {
            ModuleType::Script => pre.push(entry),
            ModuleType::RequireCall => post.push(entry),
            ModuleType::Module => main.push(entry),
            ModuleType::Asset | ModuleType::Comment => unreachable!("filtered above"),
        }
    }

    pre.extend(main);
    pre.extend(post);
    Ok(pre)
}
