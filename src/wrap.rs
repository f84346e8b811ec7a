//! Module Wrapping (spec.md §4.7). Turns a module's bare transformed code
//! plus its resolved dependency list into the final emitted form: a
//! self-registering factory for `Module`-typed sources, the code verbatim
//! for `Script`, a bare `require(<id>)` statement for `RequireCall`, and
//! nothing at all for `Asset`/`Comment`.
//!
//! This is also where `require('x')`/`import('x')` text gets rewritten to
//! `require(<numericId>)`: that rewrite needs ids the allocator only hands
//! out once the graph has resolved every request, so it can't happen
//! inside the parallel, cacheable worker transform (see `transform.rs`).
//! Same allocator handle, two call sites — the design note in spec.md §9.

use crate::core::models::{Module, ModuleType};
use crate::id_allocator::IdAllocator;
use crate::utils::{BundlerError, Result, SourceLocation, TransformErrorKind};
use oxc_allocator::{Allocator, Box as OxcBox};
use oxc_ast::ast::{Argument, Expression, NumericLiteral, Statement};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_syntax::number::NumberBase;
use std::collections::HashMap;

/// Replaces the literal string argument of a `require(...)`/dynamic
/// `import(...)` call with `id`, in place.
fn rewrite_call<'a>(allocator: &'a Allocator, call: &mut oxc_ast::ast::CallExpression<'a>, id_by_request: &HashMap<String, u32>) {
    let is_require = matches!(&call.callee, Expression::Identifier(ident) if ident.name == "require");
    let is_dynamic_import = matches!(&call.callee, Expression::Import(_));
    if !is_require && !is_dynamic_import {
        return;
    }
    if let Some(Argument::StringLiteral(lit)) = call.arguments.first() {
        if let Some(&id) = id_by_request.get(lit.value.as_str()) {
            let numeric = NumericLiteral {
                span: lit.span,
                value: id as f64,
                raw: "",
                base: NumberBase::Decimal,
            };
            call.arguments[0] = Argument::NumericLiteral(OxcBox::new_in(numeric, allocator));
        }
    }
}

/// Rewrites requires in the same statement shapes `transform.rs` extracts
/// dependencies from — top-level expression statements and variable
/// initializers. Anything nested deeper was never recorded as a
/// dependency in the first place, so there is nothing for it to rewrite.
fn rewrite_in_place<'a>(
    allocator: &'a Allocator,
    program: &mut oxc_ast::ast::Program<'a>,
    id_by_request: &HashMap<String, u32>,
) {
    for stmt in program.body.iter_mut() {
        match stmt {
            Statement::ExpressionStatement(expr_stmt) => {
                if let Expression::CallExpression(call) = &mut expr_stmt.expression {
                    rewrite_call(allocator, call, id_by_request);
                }
            }
            Statement::VariableDeclaration(var_decl) => {
                for declarator in var_decl.declarations.iter_mut() {
                    if let Some(Expression::CallExpression(call)) = &mut declarator.init {
                        rewrite_call(allocator, call, id_by_request);
                    }
                }
            }
            _ => {}
        }
    }
}

fn rewrite_requires(code: &str, id_by_request: &HashMap<String, u32>) -> Result<String> {
    if id_by_request.is_empty() {
        return Ok(code.to_string());
    }

    let allocator = Allocator::default();
    let source_type = oxc_span::SourceType::default().with_module(true);
    let parser_result = Parser::new(&allocator, code, source_type).parse();
    if !parser_result.errors.is_empty() {
        return Ok(code.to_string());
    }

    let mut program = parser_result.program;
    rewrite_in_place(&allocator, &mut program, id_by_request);

    Ok(Codegen::new()
        .with_options(CodegenOptions::default())
        .build(&program)
        .code)
}

fn request_to_id_map(module: &Module, allocator: &IdAllocator) -> HashMap<String, u32> {
    module
        .dependencies
        .iter()
        .filter_map(|dep| {
            allocator
                .existing_id_of(&dep.path)
                .map(|id| (dep.request.clone(), id.0))
        })
        .collect()
}

/// Produces the final emitted code for one module, per its type.
pub fn wrap_module(module: &Module, allocator: &IdAllocator) -> Result<String> {
    match module.module_type {
        ModuleType::Asset | ModuleType::Comment => Ok(String::new()),
        ModuleType::Script => {
            let ids = request_to_id_map(module, allocator);
            rewrite_requires(&module.code, &ids)
        }
        ModuleType::RequireCall => {
            let target = module.dependencies.first().ok_or_else(|| {
                BundlerError::Transform(crate::utils::TransformError {
                    path: module.path.clone(),
                    kind: TransformErrorKind::Plugin,
                    message: "require-call module has no target dependency".to_string(),
                    location: Some(SourceLocation::default()),
                })
            })?;
            let target_id = allocator.existing_id_of(&target.path).ok_or_else(|| {
                BundlerError::Transform(crate::utils::TransformError {
                    path: module.path.clone(),
                    kind: TransformErrorKind::Plugin,
                    message: "require-call target has no assigned id".to_string(),
                    location: Some(SourceLocation::default()),
                })
            })?;
            Ok(format!("require({});\n", target_id))
        }
        ModuleType::Module => {
            let ids = request_to_id_map(module, allocator);
            let rewritten = rewrite_requires(&module.code, &ids)?;
            let dep_ids: Vec<String> = module
                .dependencies
                .iter()
                .filter_map(|dep| allocator.existing_id_of(&dep.path))
                .map(|id| id.0.to_string())
                .collect();
            Ok(format!(
                "__d(function(global, require, module, exports) {{\n{}\n}}, {}, [{}]);\n",
                rewritten,
                module.output_id,
                dep_ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Dependency, ImportKind};
    use std::path::PathBuf;

    fn module_with(module_type: ModuleType, code: &str, deps: Vec<(&str, &str)>) -> (Module, IdAllocator) {
        let allocator = IdAllocator::new();
        let path = PathBuf::from("entry.js");
        let id = allocator.id_of(&path);
        let dependencies = deps
            .into_iter()
            .map(|(req, target)| {
                let target_path = PathBuf::from(target);
                allocator.id_of(&target_path);
                Dependency {
                    request: req.to_string(),
                    path: target_path,
                    kind: ImportKind::Static,
                }
            })
            .collect();
        (
            Module {
                path,
                module_type,
                code: code.to_string(),
                output: None,
                dependencies,
                inverse_dependencies: Default::default(),
                output_id: id,
            },
            allocator,
        )
    }

    #[test]
    fn module_type_wraps_with_registration_and_rewritten_requires() {
        let (module, allocator) =
            module_with(ModuleType::Module, "require('./a');\n", vec![("./a", "a.js")]);
        let wrapped = wrap_module(&module, &allocator).unwrap();
        assert!(wrapped.starts_with("__d(function(global, require, module, exports) {"));
        assert!(wrapped.contains("require(1)"));
        assert!(wrapped.contains("}, 0, [1]);"));
    }

    #[test]
    fn script_type_emits_verbatim_with_rewritten_requires() {
        let (module, allocator) =
            module_with(ModuleType::Script, "require('./a');\n", vec![("./a", "a.js")]);
        let wrapped = wrap_module(&module, &allocator).unwrap();
        assert!(!wrapped.contains("__d("));
        assert!(wrapped.contains("require(1)"));
    }

    #[test]
    fn require_call_type_emits_bare_require_of_target_id() {
        let (module, allocator) =
            module_with(ModuleType::RequireCall, "", vec![("./entry-real", "real.js")]);
        let wrapped = wrap_module(&module, &allocator).unwrap();
        assert_eq!(wrapped, "require(1);\n");
    }

    #[test]
    fn asset_type_emits_nothing() {
        let (module, allocator) = module_with(ModuleType::Asset, "ignored", vec![]);
        let wrapped = wrap_module(&module, &allocator).unwrap();
        assert_eq!(wrapped, "");
    }
}
