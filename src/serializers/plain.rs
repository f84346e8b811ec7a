//! Plain bundle serializer (spec.md §4.8 "Plain bundle"): pre-modules,
//! modules, post-modules concatenated in order, with an optional
//! `//# sourceMappingURL=` trailer.

use super::{collect_modules, source_map};
use crate::core::models::Graph;
use crate::id_allocator::IdAllocator;
use crate::utils::Result;
use base64::Engine;

pub struct PlainBundle {
    pub code: String,
    pub map: String,
}

/// Determinism (spec.md §8 property 5): a pure function of the graph
/// snapshot and allocator state, no wall-clock or random input.
pub fn serialize(
    graph: &Graph,
    allocator: &IdAllocator,
    source_map_url: Option<&str>,
    inline_source_map: bool,
) -> Result<PlainBundle> {
    let modules = collect_modules(graph, allocator)?;
    let map = source_map::build_index_map(&modules)?;

    let mut code = String::new();
    for (i, module) in modules.iter().enumerate() {
        if i > 0 {
            code.push('\n');
        }
        code.push_str(&module.code);
    }

    if inline_source_map {
        let encoded = base64::engine::general_purpose::STANDARD.encode(map.as_bytes());
        code.push_str(&format!(
            "\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{encoded}\n"
        ));
    } else if let Some(url) = source_map_url {
        code.push_str(&format!("\n//# sourceMappingURL={url}\n"));
    }

    Ok(PlainBundle { code, map })
}
