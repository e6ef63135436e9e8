//! Modules: `import`/`export` between scripts
//!
//! [`parse_module`] resolves and parses the whole import graph up front,
//! collecting every problem per module. [`execute_module`] then runs each
//! imported module once, copies the requested exports into the importing
//! run as constants, and runs the module body on the async processor.

use super::context::EvaluationContext;
use super::process_async::process_statements_async;
use super::process_common::QueueInfo;
use super::scope::{LogicalThread, ThreadRef};
use crate::ast::{BindingPattern, Span, Statement};
use crate::error::{EngineError, ParseError, ParseErrorCode};
use crate::host::{ModuleResolver, Parser};
use crate::prelude::{index_map_new, index_set_new, FxHashMap, FxHashSet, IndexMap, IndexSet, Rc, RefCell};
use crate::value::Value;
use futures::future::{FutureExt, LocalBoxFuture};
use tracing::debug;

/// A parsed module and its resolved imports
pub struct KsxModule {
    pub name: String,
    pub statements: Vec<Rc<Statement>>,
    pub exports: IndexSet<String>,
    /// Imported modules by module file name
    pub imports: FxHashMap<String, Rc<KsxModule>>,
    executed: RefCell<Option<IndexMap<String, Value>>>,
}

impl std::fmt::Debug for KsxModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KsxModule")
            .field("name", &self.name)
            .field("exports", &self.exports)
            .field("imports", &self.imports.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl KsxModule {
    /// Whether the module has already run as an import
    pub fn is_executed(&self) -> bool {
        self.executed.borrow().is_some()
    }
}

fn collect_exports(statements: &[Rc<Statement>]) -> IndexSet<String> {
    let mut exports = index_set_new();
    for statement in statements {
        match statement.as_ref() {
            Statement::Const(decl) if decl.is_exported => {
                for var in &decl.declarations {
                    pattern_names(&var.pattern, &mut exports);
                }
            }
            Statement::Function(decl) if decl.is_exported => {
                exports.insert(decl.name.clone());
            }
            _ => {}
        }
    }
    exports
}

fn pattern_names(pattern: &BindingPattern, out: &mut IndexSet<String>) {
    match pattern {
        BindingPattern::Identifier(name) => {
            out.insert(name.clone());
        }
        BindingPattern::Array(items) => {
            for item in items.iter().flatten() {
                pattern_names(item, out);
            }
        }
        BindingPattern::Object(properties) => {
            for property in properties {
                pattern_names(&property.value, out);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct ParseState {
    parsed: FxHashMap<String, Rc<KsxModule>>,
    /// Modules currently being parsed, for cycle detection
    stack: Vec<String>,
    errors: IndexMap<String, Vec<ParseError>>,
}

impl ParseState {
    fn report(&mut self, module: &str, code: ParseErrorCode, arg: &str, span: Span) {
        self.errors
            .entry(module.to_string())
            .or_default()
            .push(ParseError::new(code, arg, span.start, span.line, span.column));
    }
}

/// Parse `source` as module `name` together with everything it imports
pub async fn parse_module(
    name: &str,
    source: &str,
    parser: &dyn Parser,
    resolver: &dyn ModuleResolver,
) -> Result<Rc<KsxModule>, EngineError> {
    let mut state = ParseState::default();
    let module = parse_recursive(name.to_string(), source.to_string(), parser, resolver, &mut state).await?;
    if !state.errors.is_empty() {
        return Err(EngineError::ModuleErrors(state.errors));
    }
    module.ok_or_else(|| EngineError::internal_error(format!("module '{}' was not parsed", name)))
}

fn parse_recursive<'a>(
    name: String,
    source: String,
    parser: &'a dyn Parser,
    resolver: &'a dyn ModuleResolver,
    state: &'a mut ParseState,
) -> LocalBoxFuture<'a, Result<Option<Rc<KsxModule>>, EngineError>> {
    async move {
        let statements = match parser.parse_statements(&source) {
            Ok(statements) => statements,
            Err(errors) => {
                state.errors.entry(name).or_default().extend(errors);
                return Ok(None);
            }
        };
        state.stack.push(name.clone());
        let mut imports = FxHashMap::default();
        let mut local_names = FxHashSet::default();
        for statement in &statements {
            let Statement::Import(decl) = statement.as_ref() else {
                continue;
            };
            for spec in &decl.imports {
                if !local_names.insert(spec.local_name().to_string()) {
                    state.report(&name, ParseErrorCode::DuplicateImport, spec.local_name(), decl.span);
                }
            }
            let target = &decl.module_file;
            if state.stack.contains(target) {
                state.report(&name, ParseErrorCode::CircularImport, target, decl.span);
                continue;
            }
            let cached = state.parsed.get(target).cloned();
            let dependency = match cached {
                Some(module) => Some(module),
                None => match resolver.resolve(target).await? {
                    Some(source) => {
                        debug!(module = %target, importer = %name, "resolved import");
                        parse_recursive(target.clone(), source, parser, resolver, &mut *state).await?
                    }
                    None => {
                        state.report(&name, ParseErrorCode::ModuleNotFound, target, decl.span);
                        None
                    }
                },
            };
            let Some(dependency) = dependency else {
                continue;
            };
            for spec in &decl.imports {
                if !dependency.exports.contains(&spec.name) {
                    state.report(&name, ParseErrorCode::ExportNotFound, &spec.name, decl.span);
                }
            }
            imports.insert(target.clone(), dependency);
        }
        state.stack.pop();
        let module = Rc::new(KsxModule {
            name: name.clone(),
            exports: collect_exports(&statements),
            statements,
            imports,
            executed: RefCell::new(None),
        });
        state.parsed.insert(name, module.clone());
        Ok(Some(module))
    }
    .boxed_local()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution
// ═══════════════════════════════════════════════════════════════════════════════

/// Run `module` on the context's main thread
pub async fn execute_module(
    module: &Rc<KsxModule>,
    ctx: &EvaluationContext,
) -> Result<QueueInfo, EngineError> {
    let thread = ctx.ensure_main_thread();
    run_module(module, ctx, &thread).await
}

fn run_module<'a>(
    module: &'a Rc<KsxModule>,
    ctx: &'a EvaluationContext,
    thread: &'a ThreadRef,
) -> LocalBoxFuture<'a, Result<QueueInfo, EngineError>> {
    async move {
        bind_imports(module, ctx, thread).await?;
        process_statements_async(ctx, thread, module.statements.clone()).await
    }
    .boxed_local()
}

async fn bind_imports(
    module: &Rc<KsxModule>,
    ctx: &EvaluationContext,
    thread: &ThreadRef,
) -> Result<(), EngineError> {
    for statement in &module.statements {
        let Statement::Import(decl) = statement.as_ref() else {
            continue;
        };
        let dependency = module.imports.get(&decl.module_file).ok_or_else(|| {
            EngineError::module_error(format!("Cannot find module: {}", decl.module_file))
        })?;
        let exports = module_exports(dependency, ctx).await?;
        let block = thread.borrow().top_block()?;
        for spec in &decl.imports {
            let value = exports.get(&spec.name).cloned().ok_or_else(|| {
                EngineError::module_error(format!(
                    "Module {} does not export {}",
                    decl.module_file, spec.name
                ))
            })?;
            block.borrow_mut().declare(spec.local_name(), value, true)?;
        }
    }
    Ok(())
}

/// Exported values of `module`, running it on its own main thread the first
/// time it is imported
async fn module_exports(
    module: &Rc<KsxModule>,
    ctx: &EvaluationContext,
) -> Result<IndexMap<String, Value>, EngineError> {
    if let Some(exports) = module.executed.borrow().as_ref() {
        return Ok(exports.clone());
    }
    debug!(module = %module.name, "executing imported module");
    let thread = LogicalThread::new_main();
    run_module(module, ctx, &thread).await?;
    let top = thread.borrow().top_block()?;
    let mut exports = index_map_new();
    for name in &module.exports {
        let value = top.borrow().get(name).unwrap_or_default();
        exports.insert(name.clone(), value);
    }
    *module.executed.borrow_mut() = Some(exports.clone());
    Ok(exports)
}
