//! Source map serializer (spec.md §4.8 "Source map"): an index-style
//! source map whose `sections` concatenate each module's per-module map
//! fragment at the `(line, column)` offset where that module's code
//! begins in the final bundle.

use super::SerializableModule;
use crate::utils::Result;
use serde_json::{json, Value};

/// Tracks the running `(line, column)` cursor as bundle segments are
/// appended, advancing by counting line breaks and trailing-line
/// characters the way the spec's "column-aware offset tracker" does.
#[derive(Default)]
struct OffsetTracker {
    line: u32,
    column: u32,
}

impl OffsetTracker {
    fn position(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }
}

/// Builds the index-style map for modules in the exact concatenation
/// order `plain::serialize` joins them with (one `\n` between each
/// module's code) — the two must stay in lockstep or offsets drift.
pub fn build_index_map(modules: &[SerializableModule]) -> Result<String> {
    let mut tracker = OffsetTracker::default();
    let mut sections = Vec::with_capacity(modules.len());

    for (i, module) in modules.iter().enumerate() {
        if i > 0 {
            tracker.advance("\n");
        }
        let (line, column) = tracker.position();
        let map: Value = match &module.output {
            Some(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
            None => Value::Null,
        };
        sections.push(json!({
            "offset": { "line": line, "column": column },
            "map": map,
        }));
        tracker.advance(&module.code);
    }

    let index = json!({
        "version": 3,
        "file": "bundle.js",
        "sections": sections,
    });
    Ok(serde_json::to_string(&index)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ModuleType;
    use std::path::PathBuf;

    fn module(id: u32, code: &str) -> SerializableModule {
        SerializableModule {
            path: PathBuf::from(format!("{id}.js")),
            id,
            module_type: ModuleType::Module,
            code: code.to_string(),
            output: None,
        }
    }

    #[test]
    fn first_section_starts_at_origin() {
        let modules = vec![module(0, "line one\nline two"), module(1, "const x = 1;")];
        let map: Value = serde_json::from_str(&build_index_map(&modules).unwrap()).unwrap();
        let sections = map["sections"].as_array().unwrap();
        assert_eq!(sections[0]["offset"]["line"], 0);
        assert_eq!(sections[0]["offset"]["column"], 0);
    }

    #[test]
    fn second_section_offset_follows_first_modules_line_count() {
        // "line one\nline two" is two lines; the separating "\n" before the
        // next module starts a third line at column 0.
        let modules = vec![module(0, "line one\nline two"), module(1, "const x = 1;")];
        let map: Value = serde_json::from_str(&build_index_map(&modules).unwrap()).unwrap();
        let sections = map["sections"].as_array().unwrap();
        assert_eq!(sections[1]["offset"]["line"], 2);
        assert_eq!(sections[1]["offset"]["column"], 0);
    }

    #[test]
    fn single_line_modules_offset_by_column_not_line() {
        let modules = vec![module(0, "aaa"), module(1, "bbb")];
        let map: Value = serde_json::from_str(&build_index_map(&modules).unwrap()).unwrap();
        let sections = map["sections"].as_array().unwrap();
        // "aaa" (3 chars) + the joining "\n" advances to line 1, column 0 —
        // not the same line, since the separator itself is a line break.
        assert_eq!(sections[1]["offset"]["line"], 1);
        assert_eq!(sections[1]["offset"]["column"], 0);
    }
}
