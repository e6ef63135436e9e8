//! Asynchronous expression evaluator
//!
//! Same dispatch as the sync evaluator with every recursive step awaited.
//! Results of host calls are deep-resolved: promises found in the returned
//! value, including inside arrays and objects, are awaited in place.

use super::arrow::{self, ArrowArgs};
use super::context::{EvaluationContext, Place};
use super::eval_common::{
    callable, check_capability, is_spread, literal_value, member_place, read_member, spread_into,
    spread_object, static_key, ThisStack,
};
use super::operators;
use super::scope::ThreadRef;
use crate::ast::{
    AssignmentExpression, Expression, FunctionInvocationExpression, ObjectProperty, PropertyKey,
    UnaryOp, UpdateExpression,
};
use crate::error::EngineError;
use crate::prelude::FxHashSet;
use crate::value::{JsFunction, JsObject, NativeKind, Value};
use futures::future::{FutureExt, LocalBoxFuture};

/// Evaluate `expr` on `thread`, awaiting host functions
pub async fn evaluate_async(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    expr: &Expression,
) -> Result<Value, EngineError> {
    let mut this = ThisStack::new();
    let value = eval(ctx, thread, &mut this, expr).await?;
    this.check_balanced(0)?;
    Ok(value)
}

fn eval<'a>(
    ctx: &'a EvaluationContext,
    thread: &'a ThreadRef,
    this: &'a mut ThisStack,
    expr: &'a Expression,
) -> LocalBoxFuture<'a, Result<Value, EngineError>> {
    async move {
        match expr {
            Expression::Literal(lit) => Ok(literal_value(&lit.value)),
            Expression::Identifier(id) => Ok(ctx.read_identifier(thread, &id.name, id.is_global)),
            Expression::TemplateLiteral(template) => {
                let mut out = String::new();
                for segment in &template.segments {
                    let value = eval(ctx, thread, this, segment).await?;
                    out.push_str(value.to_js_string().as_str());
                }
                Ok(Value::from(out))
            }
            Expression::Array(array) => {
                let mut items = Vec::with_capacity(array.items.len());
                for item in &array.items {
                    match item {
                        Expression::Spread(spread) => {
                            let value = eval(ctx, thread, this, &spread.operand).await?;
                            spread_into(&mut items, value)?;
                        }
                        item => items.push(eval(ctx, thread, this, item).await?),
                    }
                }
                Ok(Value::from(items))
            }
            Expression::Object(literal) => {
                let object = JsObject::new();
                for property in &literal.properties {
                    match property {
                        ObjectProperty::KeyValue { key, value } => {
                            let key = match key {
                                PropertyKey::Computed(expr) => {
                                    eval(ctx, thread, this, expr).await?.to_property_key()
                                }
                                key => static_key(key).ok_or_else(|| {
                                    EngineError::internal_error("unexpected property key")
                                })?,
                            };
                            let value = eval(ctx, thread, this, value).await?;
                            object.set(key, value);
                        }
                        ObjectProperty::Spread(expr) => {
                            let value = eval(ctx, thread, this, expr).await?;
                            spread_object(&object, &value);
                        }
                    }
                }
                Ok(Value::Object(object))
            }
            Expression::Spread(spread) => eval(ctx, thread, this, &spread.operand).await,
            Expression::MemberAccess(member) => {
                let object = eval(ctx, thread, this, &member.object).await?;
                read_member(ctx, &object, &member.member, member.is_optional)
            }
            Expression::CalculatedMemberAccess(member) => {
                let object = eval(ctx, thread, this, &member.object).await?;
                let key = eval(ctx, thread, this, &member.member).await?.to_property_key();
                read_member(ctx, &object, key.as_str(), false)
            }
            Expression::FunctionInvocation(call) => invoke(ctx, thread, this, call).await,
            Expression::Arrow(arrow) => Ok(Value::Function(JsFunction::arrow(
                arrow.clone(),
                thread.borrow().obtain_closures(),
            ))),
            Expression::Unary(unary) => {
                if unary.operator == UnaryOp::Delete {
                    return delete(ctx, thread, this, &unary.operand).await;
                }
                let value = eval(ctx, thread, this, &unary.operand).await?;
                Ok(operators::unary(unary.operator, &value))
            }
            Expression::Binary(binary) => {
                let left = eval(ctx, thread, this, &binary.left).await?;
                if operators::is_logical(binary.operator) {
                    return match operators::short_circuit(binary.operator, &left) {
                        Some(value) => Ok(value),
                        None => eval(ctx, thread, this, &binary.right).await,
                    };
                }
                let right = eval(ctx, thread, this, &binary.right).await?;
                operators::binary(binary.operator, &left, &right)
            }
            Expression::Conditional(cond) => {
                if eval(ctx, thread, this, &cond.condition).await?.to_boolean() {
                    eval(ctx, thread, this, &cond.consequent).await
                } else {
                    eval(ctx, thread, this, &cond.alternate).await
                }
            }
            Expression::Assignment(assign) => assignment(ctx, thread, this, assign).await,
            Expression::Prefix(update) => update_expr(ctx, thread, this, update, true).await,
            Expression::Postfix(update) => update_expr(ctx, thread, this, update, false).await,
            Expression::Sequence(seq) => {
                let mut last = Value::Undefined;
                for expr in &seq.expressions {
                    last = eval(ctx, thread, this, expr).await?;
                }
                Ok(last)
            }
        }
    }
    .boxed_local()
}

async fn place(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    target: &Expression,
) -> Result<Place, EngineError> {
    match target {
        Expression::Identifier(id) => Ok(ctx.identifier_place(thread, &id.name, id.is_global)),
        Expression::MemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object).await?;
            member_place(&object, member.member.as_str().into())
        }
        Expression::CalculatedMemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object).await?;
            let key = eval(ctx, thread, this, &member.member).await?.to_property_key();
            member_place(&object, key)
        }
        _ => Err(EngineError::runtime("Invalid left-hand side in assignment")),
    }
}

async fn run_update<'a>(
    ctx: &EvaluationContext,
    update: LocalBoxFuture<'a, Result<Value, EngineError>>,
) -> Result<Value, EngineError> {
    match ctx.update_hook() {
        Some(hook) => hook.run_async(update).await,
        None => update.await,
    }
}

async fn assignment(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    assign: &AssignmentExpression,
) -> Result<Value, EngineError> {
    let target = place(ctx, thread, this, &assign.target).await?;
    target.check_writable()?;
    let update = async {
        let value = match assign.operator.binary_op() {
            None => eval(ctx, thread, this, &assign.value).await?,
            Some(op) => {
                let current = target.get();
                if let Some(unchanged) = operators::short_circuit(op, &current) {
                    return Ok::<Value, EngineError>(unchanged);
                }
                let right = eval(ctx, thread, this, &assign.value).await?;
                operators::binary(op, &current, &right)?
            }
        };
        target.set(value.clone())?;
        Ok::<Value, EngineError>(value)
    };
    run_update(ctx, update.boxed_local()).await
}

async fn update_expr(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    update: &UpdateExpression,
    prefix: bool,
) -> Result<Value, EngineError> {
    let target = place(ctx, thread, this, &update.operand).await?;
    target.check_writable()?;
    let mutation = async {
        let (old, new) = operators::update(update.operator, &target.get());
        target.set(new.clone())?;
        Ok::<Value, EngineError>(if prefix { new } else { old })
    };
    run_update(ctx, mutation.boxed_local()).await
}

async fn delete(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    operand: &Expression,
) -> Result<Value, EngineError> {
    match operand {
        Expression::MemberAccess(_) | Expression::CalculatedMemberAccess(_) => {
            let target = place(ctx, thread, this, operand).await?;
            Ok(Value::Boolean(target.delete()))
        }
        Expression::Identifier(_) => Ok(Value::Boolean(false)),
        other => {
            eval(ctx, thread, this, other).await?;
            Ok(Value::Boolean(true))
        }
    }
}

async fn eval_args(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    args: &[Expression],
    for_host: bool,
) -> Result<Vec<Value>, EngineError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Expression::Spread(spread) => {
                let value = eval(ctx, thread, this, &spread.operand).await?;
                spread_into(&mut values, value)?;
            }
            arg => values.push(eval(ctx, thread, this, arg).await?),
        }
    }
    if for_host {
        values = values
            .into_iter()
            .map(|value| arrow::host_callable_async(ctx, thread, value))
            .collect();
    }
    Ok(values)
}

async fn invoke(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    call: &FunctionInvocationExpression,
) -> Result<Value, EngineError> {
    let callee = match call.callee.as_ref() {
        Expression::MemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object).await?;
            let callee = read_member(ctx, &object, &member.member, member.is_optional)?;
            this.push(object);
            callee
        }
        Expression::CalculatedMemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object).await?;
            let key = eval(ctx, thread, this, &member.member).await?.to_property_key();
            let callee = read_member(ctx, &object, key.as_str(), false)?;
            this.push(object);
            callee
        }
        other => {
            let callee = eval(ctx, thread, this, other).await?;
            this.push(Value::Object(ctx.local_context().clone()));
            callee
        }
    };
    let result = call_value(ctx, thread, this, callee, call).await;
    this.pop();
    result
}

async fn call_value(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    callee: Value,
    call: &FunctionInvocationExpression,
) -> Result<Value, EngineError> {
    let Some(function) = callable(ctx, callee, &call.callee)? else {
        return Ok(Value::Undefined);
    };
    check_capability(ctx, &function)?;
    match &function {
        JsFunction::Native(native) => {
            let args = eval_args(ctx, thread, this, &call.arguments, true).await?;
            let receiver = this.current().cloned().unwrap_or_default();
            let result = match &native.kind {
                NativeKind::Sync(body) => body(&receiver, args)?,
                NativeKind::Async(body) => body(receiver, args).await?,
            };
            deep_resolve(result).await
        }
        JsFunction::Arrow(closure) => {
            let args = if call.arguments.iter().any(is_spread) {
                ArrowArgs::Values(eval_args(ctx, thread, this, &call.arguments, false).await?)
            } else {
                ArrowArgs::Deferred(&call.arguments)
            };
            arrow::call_arrow_async(ctx, thread, closure, args).await
        }
    }
}

/// Await every promise reachable from `value`, replacing it in place
pub async fn deep_resolve(value: Value) -> Result<Value, EngineError> {
    let mut visited = FxHashSet::default();
    resolve_inner(value, &mut visited).await
}

fn resolve_inner<'a>(
    value: Value,
    visited: &'a mut FxHashSet<usize>,
) -> LocalBoxFuture<'a, Result<Value, EngineError>> {
    async move {
        match value {
            Value::Promise(promise) => {
                let settled = promise.settle().await?;
                resolve_inner(settled, visited).await
            }
            Value::Array(array) => {
                if visited.insert(array.id()) {
                    for index in 0..array.len() {
                        let Some(item) = array.get(index) else { continue };
                        if needs_resolve(&item) {
                            let resolved = resolve_inner(item, visited).await?;
                            array.set(index, resolved);
                        }
                    }
                }
                Ok(Value::Array(array))
            }
            Value::Object(object) => {
                if visited.insert(object.id()) {
                    for (key, item) in object.entries() {
                        if needs_resolve(&item) {
                            let resolved = resolve_inner(item, visited).await?;
                            object.set(key, resolved);
                        }
                    }
                }
                Ok(Value::Object(object))
            }
            other => Ok(other),
        }
    }
    .boxed_local()
}

fn needs_resolve(value: &Value) -> bool {
    matches!(value, Value::Promise(_) | Value::Array(_) | Value::Object(_))
}
