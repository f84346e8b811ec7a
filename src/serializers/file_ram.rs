//! File RAM bundle serializer (spec.md §4.8 "File RAM bundle", layout in
//! §6): a directory of per-module files plus the `UNBUNDLE` sentinel.

use super::collect_modules;
use crate::core::models::{Graph, ModuleType};
use crate::id_allocator::IdAllocator;
use crate::utils::Result;
use std::path::Path;

/// `0xFB0BD1E5` little-endian — the same magic as the indexed RAM bundle's
/// preface (spec.md §8 property 7).
pub const SENTINEL_BYTES: [u8; 4] = [0xE5, 0xD1, 0x0B, 0xFB];

/// Writes `out_dir/UNBUNDLE`, `out_dir/js-modules/<id>.js` per `Module`,
/// and `out_dir/js-modules/UNBUNDLE.js` for the startup segment.
pub async fn write(out_dir: &Path, graph: &Graph, allocator: &IdAllocator) -> Result<()> {
    let modules = collect_modules(graph, allocator)?;
    let js_modules_dir = out_dir.join("js-modules");
    tokio::fs::create_dir_all(&js_modules_dir).await?;
    tokio::fs::write(out_dir.join("UNBUNDLE"), SENTINEL_BYTES).await?;

    let mut startup = String::new();
    for module in &modules {
        match module.module_type {
            ModuleType::Script | ModuleType::RequireCall => {
                if !startup.is_empty() {
                    startup.push('\n');
                }
                startup.push_str(&module.code);
            }
            ModuleType::Module => {
                let path = js_modules_dir.join(format!("{}.js", module.id));
                tokio::fs::write(path, &module.code).await?;
            }
            ModuleType::Asset | ModuleType::Comment => unreachable!("filtered by collect_modules"),
        }
    }

    tokio::fs::write(js_modules_dir.join("UNBUNDLE.js"), startup).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::core::models::ModuleType as MType;
    use crate::core::traits::TransformOptions;
    use crate::graph::DependencyGraph;
    use crate::resolver::Resolver;
    use crate::worker_pool::WorkerPool;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_sentinel_and_per_module_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("entry.js"), "require('./a');\n").unwrap();
        fs::write(dir.path().join("a.js"), "const x = 1;\n").unwrap();

        let root = dir.path().to_path_buf();
        let config = Config::default_for_root(&root);
        let resolver = Resolver::new(config.clone());
        let cache = Arc::new(Cache::new(config.cache_dir(), 10 * 1024 * 1024).unwrap());
        let pool = Arc::new(WorkerPool::new(cache, 2, config.transformer_key.clone()));
        let allocator = IdAllocator::new();
        let mut graph = DependencyGraph::new(
            resolver,
            pool,
            allocator.clone(),
            TransformOptions::default(),
            "web".to_string(),
        )
        .unwrap();
        graph
            .initial_traverse(vec![(dir.path().join("entry.js"), MType::Module)])
            .await
            .unwrap();

        let out_dir = dir.path().join("out");
        write(&out_dir, &graph.graph, &allocator).await.unwrap();

        let sentinel = fs::read(out_dir.join("UNBUNDLE")).unwrap();
        assert_eq!(sentinel, SENTINEL_BYTES);
        assert!(out_dir.join("js-modules/UNBUNDLE.js").exists());

        let entry_id = allocator.existing_id_of(&dir.path().join("entry.js")).unwrap();
        let module_file = out_dir.join(format!("js-modules/{}.js", entry_id.0));
        assert!(module_file.exists());
        let content = fs::read_to_string(module_file).unwrap();
        assert!(content.contains("__d(function(global, require, module, exports)"));
    }
}
