//! KSX binding language engine
//!
//! Runs parsed statement trees on a labeled statement queue, either
//! synchronously under a wall-clock budget or asynchronously with host
//! futures, cooperative yielding and cancellation.
//!
//! # Example
//!
//! ```
//! use ksx::builder::*;
//! use ksx::{run_sync, EvaluationContext, Value};
//!
//! let ctx = EvaluationContext::new();
//! let statements = program(vec![
//!     let_("x", num(2.0)),
//!     expr_stmt(mul(ident("x"), num(21.0))),
//! ]);
//! let completion = run_sync(&ctx, statements).unwrap();
//! assert_eq!(completion.value, Value::from(42));
//! ```

pub mod ast;
pub mod builder;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod prelude;
pub mod value;

pub use error::{EngineError, ParseError, ParseErrorCode};
pub use host::{
    AllowAll, BannedFunctions, CapabilityGate, CapabilityVerdict, MapModuleResolver,
    ModuleResolver, Parser, StatementObserver, UpdateHook,
};
pub use interpreter::{EvalOptions, EvaluationContext, EvaluationContextBuilder, QueueInfo};
pub use value::{CheapClone, JsArray, JsFunction, JsObject, JsPromise, JsString, Value};

use crate::ast::Statement;
use crate::interpreter::scope::ThreadRef;
use crate::prelude::Rc;

/// Outcome of a top-level run
#[derive(Debug, Clone)]
pub struct Completion {
    /// `return` value of the run, or the value of its last expression statement
    pub value: Value,
    pub info: QueueInfo,
}

fn reset_completion(ctx: &EvaluationContext) -> ThreadRef {
    let thread = ctx.ensure_main_thread();
    {
        let mut t = thread.borrow_mut();
        t.return_value = None;
        if let Some(block) = t.blocks.first() {
            block.borrow_mut().return_value = None;
        }
    }
    thread
}

fn parser(ctx: &EvaluationContext) -> Result<Rc<dyn Parser>, EngineError> {
    ctx.parser()
        .ok_or_else(|| EngineError::runtime("No parser configured for this context"))
}

/// Run `statements` on the context's main thread without awaiting
pub fn run_sync(
    ctx: &EvaluationContext,
    statements: Vec<Rc<Statement>>,
) -> Result<Completion, EngineError> {
    let thread = reset_completion(ctx);
    let info = interpreter::process_statements(ctx, &thread, statements)?;
    Ok(Completion {
        value: ctx.completion_value(),
        info,
    })
}

/// Run `statements` on the context's main thread, awaiting host futures
pub async fn run_async(
    ctx: &EvaluationContext,
    statements: Vec<Rc<Statement>>,
) -> Result<Completion, EngineError> {
    let thread = reset_completion(ctx);
    let info = interpreter::process_statements_async(ctx, &thread, statements).await?;
    Ok(Completion {
        value: ctx.completion_value(),
        info,
    })
}

pub fn run_script_sync(ctx: &EvaluationContext, source: &str) -> Result<Completion, EngineError> {
    let statements = parser(ctx)?
        .parse_statements(source)
        .map_err(EngineError::Parse)?;
    run_sync(ctx, statements)
}

pub async fn run_script_async(
    ctx: &EvaluationContext,
    source: &str,
) -> Result<Completion, EngineError> {
    let statements = parser(ctx)?
        .parse_statements(source)
        .map_err(EngineError::Parse)?;
    run_async(ctx, statements).await
}

/// Evaluate a single-expression binding such as an attribute value
pub fn evaluate_binding(ctx: &EvaluationContext, source: &str) -> Result<Value, EngineError> {
    let expr = parser(ctx)?.parse_expr(source).map_err(EngineError::Parse)?;
    let _clock = ctx.enter_sync_run();
    let thread = ctx.ensure_main_thread();
    interpreter::evaluate_sync(ctx, &thread, &expr)
}

/// Parse module `name` and everything it imports, then execute it
pub async fn run_module(
    ctx: &EvaluationContext,
    name: &str,
    source: &str,
) -> Result<Completion, EngineError> {
    let parser = parser(ctx)?;
    let resolver = ctx
        .module_resolver()
        .ok_or_else(|| EngineError::module_error("No module resolver configured for this context"))?;
    let module = interpreter::parse_module(name, source, parser.as_ref(), resolver.as_ref()).await?;
    reset_completion(ctx);
    let info = interpreter::execute_module(&module, ctx).await?;
    Ok(Completion {
        value: ctx.completion_value(),
        info,
    })
}
