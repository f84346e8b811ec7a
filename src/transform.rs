//! The concrete transform a Worker Pool job runs (spec.md §4.2/§4.3). Only
//! does what the core needs — locate `import`/`require`/dynamic-`import()`
//! specifiers and hand back lightly re-emitted code — not a Babel-config
//! plugin pipeline (that stays an out-of-scope external collaborator).
//!
//! Dependency extraction runs here, inside the parallel, cacheable worker
//! job. Rewriting `require('x')` text into `require(<numericId>)` does
//! NOT: that needs ids the [`crate::id_allocator::IdAllocator`] only hands
//! out once the single-threaded graph has resolved every request, so it
//! happens later, in [`crate::wrap`]. Baking ids in here would make the
//! content-addressed cache key depend on global allocator state instead of
//! just source bytes + options, defeating content-addressing (spec.md §4.2).

use crate::core::models::ImportKind;
use crate::utils::{BundlerError, Result, SourceLocation, TransformErrorKind};
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, Expression, ModuleDeclaration, Statement};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use sourcemap::SourceMapBuilder;
use std::path::Path;

/// One `import`/`require` occurrence before resolution.
#[derive(Debug, Clone)]
pub struct RawDependency {
    pub request: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub code: String,
    /// Per-module source map, serialized v3 JSON (spec.md §3 `output`).
    pub map: Option<String>,
    pub dependencies: Vec<RawDependency>,
}

/// A line-level identity map from `code`'s lines back to `source`'s lines
/// at `path` — good enough to point a debugger at the right file and line
/// without a full token-level mapper (out of scope; no Babel-style plugin
/// pipeline runs here to begin with).
fn build_map(path: &Path, source: &str, code: &str) -> Result<String> {
    let mut builder = SourceMapBuilder::new(None);
    let source_id = builder.add_source(&path.to_string_lossy());
    builder.set_source_contents(source_id, Some(source));
    for (line_idx, _) in code.lines().enumerate() {
        let line = line_idx as u32;
        builder.add_raw(line, 0, line, 0, Some(source_id), None, false);
    }
    let map = builder.into_sourcemap();
    let mut buf = Vec::new();
    map.to_writer(&mut buf)
        .map_err(|e| BundlerError::config(format!("source map serialization failed: {e}")))?;
    String::from_utf8(buf).map_err(|e| BundlerError::config(e.to_string()))
}

pub fn source_type_for(path: &Path) -> SourceType {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts") => SourceType::default().with_typescript(true).with_module(true),
        Some("tsx") => SourceType::default()
            .with_typescript(true)
            .with_jsx(true)
            .with_module(true),
        Some("jsx") => SourceType::default().with_jsx(true).with_module(true),
        _ => SourceType::default().with_module(true),
    }
}

/// Parses `source` and extracts its dependency requests. `code` in the
/// result is the source re-emitted through `oxc_codegen` — a stand-in for
/// whatever minimal, Babel-config-free normalization a real transform
/// would apply, not a full transform/minify pass (both out of scope).
pub fn transform(path: &Path, source: &str) -> Result<TransformResult> {
    let allocator = Allocator::default();
    let source_type = source_type_for(path);

    let parser_result = Parser::new(&allocator, source, source_type).parse();
    if !parser_result.errors.is_empty() {
        let message = parser_result
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(BundlerError::Transform(crate::utils::TransformError {
            path: path.to_path_buf(),
            kind: TransformErrorKind::Syntax,
            message,
            location: Some(SourceLocation::default()),
        }));
    }

    let program = parser_result.program;
    let dependencies = collect_dependencies(&program);
    let code = Codegen::new()
        .with_options(CodegenOptions::default())
        .build(&program)
        .code;
    let map = Some(build_map(path, source, &code)?);

    Ok(TransformResult { code, map, dependencies })
}

fn collect_dependencies(program: &oxc_ast::ast::Program) -> Vec<RawDependency> {
    let mut deps = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ModuleDeclaration(decl) => match &**decl {
                ModuleDeclaration::ImportDeclaration(import) => {
                    deps.push(RawDependency {
                        request: import.source.value.to_string(),
                        kind: ImportKind::Static,
                    });
                }
                ModuleDeclaration::ExportNamedDeclaration(export) => {
                    if let Some(source) = &export.source {
                        deps.push(RawDependency {
                            request: source.value.to_string(),
                            kind: ImportKind::Static,
                        });
                    }
                }
                ModuleDeclaration::ExportAllDeclaration(export) => {
                    deps.push(RawDependency {
                        request: export.source.value.to_string(),
                        kind: ImportKind::Static,
                    });
                }
                _ => {}
            },
            Statement::ExpressionStatement(expr_stmt) => {
                collect_from_expression(&expr_stmt.expression, &mut deps);
            }
            Statement::VariableDeclaration(var_decl) => {
                for declarator in &var_decl.declarations {
                    if let Some(init) = &declarator.init {
                        collect_from_expression(init, &mut deps);
                    }
                }
            }
            _ => {}
        }
    }

    deps
}

fn collect_from_expression(expr: &Expression, deps: &mut Vec<RawDependency>) {
    if let Expression::CallExpression(call) = expr {
        let is_dynamic_import = matches!(&call.callee, Expression::Import(_));
        let is_require =
            matches!(&call.callee, Expression::Identifier(id) if id.name == "require");

        if is_dynamic_import || is_require {
            if let Some(Argument::StringLiteral(lit)) = call.arguments.first() {
                deps.push(RawDependency {
                    request: lit.value.to_string(),
                    kind: if is_dynamic_import {
                        ImportKind::Dynamic
                    } else {
                        ImportKind::Static
                    },
                });
            }
            // A non-literal first argument is a dynamic `require(expr)` —
            // unsupported per spec.md Non-goals, so it's not a dependency
            // edge (there's nothing static to resolve).
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extracts_static_imports_in_order() {
        let src = "import a from './a';\nimport b from './b';\n";
        let result = transform(&PathBuf::from("entry.js"), src).unwrap();
        let requests: Vec<_> = result.dependencies.iter().map(|d| d.request.clone()).collect();
        assert_eq!(requests, vec!["./a", "./b"]);
    }

    #[test]
    fn extracts_require_and_dynamic_import() {
        let src = "const a = require('./a');\nimport('./b');\n";
        let result = transform(&PathBuf::from("entry.js"), src).unwrap();
        assert_eq!(result.dependencies.len(), 2);
        assert_eq!(result.dependencies[0].kind, ImportKind::Static);
        assert_eq!(result.dependencies[1].kind, ImportKind::Dynamic);
    }

    #[test]
    fn ignores_dynamic_require_expression() {
        let src = "const name = 'a'; const x = require(name);\n";
        let result = transform(&PathBuf::from("entry.js"), src).unwrap();
        assert!(result.dependencies.is_empty());
    }

    #[test]
    fn syntax_error_surfaces_as_transform_error() {
        let src = "function( {";
        let err = transform(&PathBuf::from("broken.js"), src).unwrap_err();
        match err {
            BundlerError::Transform(e) => assert_eq!(e.kind, TransformErrorKind::Syntax),
            other => panic!("expected Transform error, got {other:?}"),
        }
    }
}
