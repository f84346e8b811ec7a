//! Delta wire response serializer (spec.md §4.8 "Delta response", §6):
//! `{ id, pre, post, delta, reset }` JSON, `content-type:
//! application/json`. A deleted module's entry carries `null` in place of
//! code.

use crate::core::models::{Delta, ModuleType};
use crate::id_allocator::IdAllocator;
use crate::utils::Result;
use crate::wrap::wrap_module;
use serde_json::{json, Value};

pub fn serialize(epoch: &str, delta: &Delta, allocator: &IdAllocator) -> Result<Value> {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    let mut body: Vec<(u32, Value)> = Vec::new();

    let mut modified: Vec<_> = delta.modified.values().collect();
    modified.sort_by_key(|m| m.output_id.0);

    for module in modified {
        let code = wrap_module(module, allocator)?;
        match module.module_type {
            ModuleType::Script => pre.push(json!([module.output_id.0, code])),
            ModuleType::RequireCall => post.push(json!([module.output_id.0, code])),
            ModuleType::Module => body.push((module.output_id.0, json!(code))),
            ModuleType::Asset | ModuleType::Comment => {}
        }
    }

    for path in &delta.deleted {
        if let Some(id) = allocator.existing_id_of(path) {
            body.push((id.0, Value::Null));
        }
    }
    body.sort_by_key(|(id, _)| *id);
    let delta_entries: Vec<Value> = body.into_iter().map(|(id, code)| json!([id, code])).collect();

    Ok(json!({
        "id": epoch,
        "pre": pre,
        "post": post,
        "delta": delta_entries,
        "reset": delta.reset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Module, ModuleId};
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;

    fn module(id: u32, module_type: ModuleType) -> Module {
        Module {
            path: PathBuf::from(format!("{id}.js")),
            module_type,
            code: "const x = 1;".to_string(),
            output: None,
            dependencies: Vec::new(),
            inverse_dependencies: HashSet::new(),
            output_id: ModuleId(id),
        }
    }

    #[test]
    fn deleted_modules_carry_null_code() {
        let allocator = IdAllocator::new();
        let deleted_path = PathBuf::from("gone.js");
        allocator.id_of(&deleted_path);

        let delta = Delta {
            modified: HashMap::new(),
            deleted: {
                let mut s = HashSet::new();
                s.insert(deleted_path);
                s
            },
            reset: false,
        };

        let response = serialize("epoch-1", &delta, &allocator).unwrap();
        let entries = response["delta"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0][1], Value::Null);
    }

    #[test]
    fn script_and_require_call_modules_land_in_pre_and_post() {
        let allocator = IdAllocator::new();
        let script = module(0, ModuleType::Script);
        let main = module(1, ModuleType::Module);

        let mut modified = HashMap::new();
        modified.insert(script.path.clone(), script);
        modified.insert(main.path.clone(), main);

        let delta = Delta {
            modified,
            deleted: HashSet::new(),
            reset: true,
        };

        let response = serialize("epoch-1", &delta, &allocator).unwrap();
        assert_eq!(response["pre"].as_array().unwrap().len(), 1);
        assert_eq!(response["delta"].as_array().unwrap().len(), 1);
        assert_eq!(response["reset"], true);
    }
}
