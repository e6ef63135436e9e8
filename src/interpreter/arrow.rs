//! Arrow function invocation
//!
//! Each call runs on a child [`LogicalThread`] of the caller: parameters are
//! bound into the child's function block, the body runs through a nested
//! statement queue, and the child is detached from its parent when the call
//! ends, whether it succeeded or not.

use super::context::EvaluationContext;
use super::declarations::{bind_pattern, BindMode};
use super::eval_async::evaluate_async;
use super::eval_sync::evaluate_sync;
use super::process_async::process_statements_async;
use super::process_sync::process_statements;
use super::scope::{LogicalThread, ThreadRef};
use crate::ast::{Expression, ReturnStatement, Statement};
use crate::error::EngineError;
use crate::prelude::Rc;
use crate::value::{ArrowClosure, JsFunction, Value};
use futures::future::{FutureExt, LocalBoxFuture};

/// Arguments of an arrow call
pub enum ArrowArgs<'a> {
    Values(Vec<Value>),
    /// Argument expressions evaluated on the caller's thread once the child
    /// thread exists
    Deferred(&'a [Expression]),
}

/// Statements of the arrow body; an expression body becomes a `return`
fn body_statements(closure: &ArrowClosure) -> Vec<Rc<Statement>> {
    match closure.expr.body.as_ref() {
        Statement::Block(block) => block.statements.clone(),
        Statement::Expression(expr) => vec![Rc::new(Statement::Return(ReturnStatement {
            expression: Some(expr.expression.clone()),
            span: expr.span,
        }))],
        _ => vec![closure.expr.body.clone()],
    }
}

fn take_result(child: &ThreadRef) -> Value {
    let mut child = child.borrow_mut();
    let value = child.return_value.take().unwrap_or_default();
    child.pop_block();
    value
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sync
// ═══════════════════════════════════════════════════════════════════════════════

pub fn call_arrow_sync(
    ctx: &EvaluationContext,
    caller: &ThreadRef,
    closure: &ArrowClosure,
    args: ArrowArgs<'_>,
) -> Result<Value, EngineError> {
    let child = LogicalThread::spawn_child(caller, closure.closures.clone());
    let result = run_sync(ctx, caller, &child, closure, args);
    LogicalThread::detach(caller, &child);
    result
}

fn run_sync(
    ctx: &EvaluationContext,
    caller: &ThreadRef,
    child: &ThreadRef,
    closure: &ArrowClosure,
    args: ArrowArgs<'_>,
) -> Result<Value, EngineError> {
    let block = child.borrow().top_block()?;
    let params = &closure.expr.params;
    match args {
        ArrowArgs::Values(values) => {
            for (index, param) in params.iter().enumerate() {
                let value = values.get(index).cloned().unwrap_or_default();
                bind_pattern(&block, param, value, BindMode::Bind { is_const: false })?;
            }
        }
        ArrowArgs::Deferred(exprs) => {
            for (index, expr) in exprs.iter().enumerate() {
                let value = evaluate_sync(ctx, caller, expr)?;
                if let Some(param) = params.get(index) {
                    bind_pattern(&block, param, value, BindMode::Bind { is_const: false })?;
                }
            }
            for param in params.iter().skip(exprs.len()) {
                bind_pattern(&block, param, Value::Undefined, BindMode::Bind { is_const: false })?;
            }
        }
    }
    process_statements(ctx, child, body_statements(closure))?;
    Ok(take_result(child))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Async
// ═══════════════════════════════════════════════════════════════════════════════

pub fn call_arrow_async<'a>(
    ctx: &'a EvaluationContext,
    caller: &'a ThreadRef,
    closure: &'a ArrowClosure,
    args: ArrowArgs<'a>,
) -> LocalBoxFuture<'a, Result<Value, EngineError>> {
    async move {
        let child = LogicalThread::spawn_child(caller, closure.closures.clone());
        let result = run_async(ctx, caller, &child, closure, args).await;
        LogicalThread::detach(caller, &child);
        result
    }
    .boxed_local()
}

async fn run_async(
    ctx: &EvaluationContext,
    caller: &ThreadRef,
    child: &ThreadRef,
    closure: &ArrowClosure,
    args: ArrowArgs<'_>,
) -> Result<Value, EngineError> {
    let block = child.borrow().top_block()?;
    let params = &closure.expr.params;
    match args {
        ArrowArgs::Values(values) => {
            for (index, param) in params.iter().enumerate() {
                let value = values.get(index).cloned().unwrap_or_default();
                bind_pattern(&block, param, value, BindMode::Bind { is_const: false })?;
            }
        }
        ArrowArgs::Deferred(exprs) => {
            for (index, expr) in exprs.iter().enumerate() {
                let value = evaluate_async(ctx, caller, expr).await?;
                if let Some(param) = params.get(index) {
                    bind_pattern(&block, param, value, BindMode::Bind { is_const: false })?;
                }
            }
            for param in params.iter().skip(exprs.len()) {
                bind_pattern(&block, param, Value::Undefined, BindMode::Bind { is_const: false })?;
            }
        }
    }
    process_statements_async(ctx, child, body_statements(closure)).await?;
    Ok(take_result(child))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Host callbacks
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap an arrow value passed to a host function as a sync host function
pub fn host_callable_sync(ctx: &EvaluationContext, thread: &ThreadRef, value: Value) -> Value {
    let Value::Function(JsFunction::Arrow(closure)) = value else {
        return value;
    };
    let name = closure.expr.name.clone().unwrap_or_else(|| "anonymous".to_string());
    let ctx = ctx.clone();
    let thread = thread.clone();
    Value::Function(JsFunction::native(&name, move |_, args| {
        call_arrow_sync(&ctx, &thread, &closure, ArrowArgs::Values(args))
    }))
}

/// Wrap an arrow value passed to a host function as an async host function
pub fn host_callable_async(ctx: &EvaluationContext, thread: &ThreadRef, value: Value) -> Value {
    let Value::Function(JsFunction::Arrow(closure)) = value else {
        return value;
    };
    let name = closure.expr.name.clone().unwrap_or_else(|| "anonymous".to_string());
    let ctx = ctx.clone();
    let thread = thread.clone();
    Value::Function(JsFunction::native_async(&name, move |_, args| {
        let ctx = ctx.clone();
        let thread = thread.clone();
        let closure = closure.clone();
        async move { call_arrow_async(&ctx, &thread, &closure, ArrowArgs::Values(args)).await }
    }))
}
