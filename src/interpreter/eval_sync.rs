//! Synchronous expression evaluator
//!
//! Never awaits. Host functions that are asynchronous, or that hand back a
//! promise, are rejected with [`EngineError::AsyncInSync`].

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
use crate::value::{JsFunction, JsObject, NativeKind, Value};

/// Evaluate `expr` on `thread`
pub fn evaluate_sync(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    expr: &Expression,
) -> Result<Value, EngineError> {
    let mut this = ThisStack::new();
    let value = eval(ctx, thread, &mut this, expr)?;
    this.check_balanced(0)?;
    Ok(value)
}

fn eval(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    expr: &Expression,
) -> Result<Value, EngineError> {
    match expr {
        Expression::Literal(lit) => Ok(literal_value(&lit.value)),
        Expression::Identifier(id) => Ok(ctx.read_identifier(thread, &id.name, id.is_global)),
        Expression::TemplateLiteral(template) => {
            let mut out = String::new();
            for segment in &template.segments {
                out.push_str(eval(ctx, thread, this, segment)?.to_js_string().as_str());
            }
            Ok(Value::from(out))
        }
        Expression::Array(array) => {
            let mut items = Vec::with_capacity(array.items.len());
            for item in &array.items {
                match item {
                    Expression::Spread(spread) => {
                        let value = eval(ctx, thread, this, &spread.operand)?;
                        spread_into(&mut items, value)?;
                    }
                    item => items.push(eval(ctx, thread, this, item)?),
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
                            PropertyKey::Computed(expr) => eval(ctx, thread, this, expr)?.to_property_key(),
                            key => static_key(key)
                                .ok_or_else(|| EngineError::internal_error("unexpected property key"))?,
                        };
                        let value = eval(ctx, thread, this, value)?;
                        object.set(key, value);
                    }
                    ObjectProperty::Spread(expr) => {
                        let value = eval(ctx, thread, this, expr)?;
                        spread_object(&object, &value);
                    }
                }
            }
            Ok(Value::Object(object))
        }
        Expression::Spread(spread) => eval(ctx, thread, this, &spread.operand),
        Expression::MemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object)?;
            read_member(ctx, &object, &member.member, member.is_optional)
        }
        Expression::CalculatedMemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object)?;
            let key = eval(ctx, thread, this, &member.member)?.to_property_key();
            read_member(ctx, &object, key.as_str(), false)
        }
        Expression::FunctionInvocation(call) => invoke(ctx, thread, this, call),
        Expression::Arrow(arrow) => Ok(Value::Function(JsFunction::arrow(
            arrow.clone(),
            thread.borrow().obtain_closures(),
        ))),
        Expression::Unary(unary) => {
            if unary.operator == UnaryOp::Delete {
                return delete(ctx, thread, this, &unary.operand);
            }
            let value = eval(ctx, thread, this, &unary.operand)?;
            Ok(operators::unary(unary.operator, &value))
        }
        Expression::Binary(binary) => {
            let left = eval(ctx, thread, this, &binary.left)?;
            if operators::is_logical(binary.operator) {
                return match operators::short_circuit(binary.operator, &left) {
                    Some(value) => Ok(value),
                    None => eval(ctx, thread, this, &binary.right),
                };
            }
            let right = eval(ctx, thread, this, &binary.right)?;
            operators::binary(binary.operator, &left, &right)
        }
        Expression::Conditional(cond) => {
            if eval(ctx, thread, this, &cond.condition)?.to_boolean() {
                eval(ctx, thread, this, &cond.consequent)
            } else {
                eval(ctx, thread, this, &cond.alternate)
            }
        }
        Expression::Assignment(assign) => assignment(ctx, thread, this, assign),
        Expression::Prefix(update) => update_expr(ctx, thread, this, update, true),
        Expression::Postfix(update) => update_expr(ctx, thread, this, update, false),
        Expression::Sequence(seq) => {
            let mut last = Value::Undefined;
            for expr in &seq.expressions {
                last = eval(ctx, thread, this, expr)?;
            }
            Ok(last)
        }
    }
}

fn place(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    target: &Expression,
) -> Result<Place, EngineError> {
    match target {
        Expression::Identifier(id) => Ok(ctx.identifier_place(thread, &id.name, id.is_global)),
        Expression::MemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object)?;
            member_place(&object, member.member.as_str().into())
        }
        Expression::CalculatedMemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object)?;
            let key = eval(ctx, thread, this, &member.member)?.to_property_key();
            member_place(&object, key)
        }
        _ => Err(EngineError::runtime("Invalid left-hand side in assignment")),
    }
}

fn run_update(
    ctx: &EvaluationContext,
    update: &mut dyn FnMut() -> Result<Value, EngineError>,
) -> Result<Value, EngineError> {
    match ctx.update_hook() {
        Some(hook) => hook.run_sync(update),
        None => update(),
    }
}

fn assignment(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    assign: &AssignmentExpression,
) -> Result<Value, EngineError> {
    let target = place(ctx, thread, this, &assign.target)?;
    target.check_writable()?;
    run_update(ctx, &mut || {
        let value = match assign.operator.binary_op() {
            None => eval(ctx, thread, this, &assign.value)?,
            Some(op) => {
                let current = target.get();
                if let Some(unchanged) = operators::short_circuit(op, &current) {
                    return Ok(unchanged);
                }
                let right = eval(ctx, thread, this, &assign.value)?;
                operators::binary(op, &current, &right)?
            }
        };
        target.set(value.clone())?;
        Ok(value)
    })
}

fn update_expr(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    update: &UpdateExpression,
    prefix: bool,
) -> Result<Value, EngineError> {
    let target = place(ctx, thread, this, &update.operand)?;
    target.check_writable()?;
    run_update(ctx, &mut || {
        let (old, new) = operators::update(update.operator, &target.get());
        target.set(new.clone())?;
        Ok(if prefix { new } else { old })
    })
}

fn delete(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    operand: &Expression,
) -> Result<Value, EngineError> {
    match operand {
        Expression::MemberAccess(_) | Expression::CalculatedMemberAccess(_) => {
            let target = place(ctx, thread, this, operand)?;
            Ok(Value::Boolean(target.delete()))
        }
        Expression::Identifier(_) => Ok(Value::Boolean(false)),
        other => {
            eval(ctx, thread, this, other)?;
            Ok(Value::Boolean(true))
        }
    }
}

/// Evaluate call arguments, expanding spreads. Arrow functions handed to
/// host functions become host-callable.
pub(crate) fn eval_args(
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
                let value = eval(ctx, thread, this, &spread.operand)?;
                spread_into(&mut values, value)?;
            }
            arg => values.push(eval(ctx, thread, this, arg)?),
        }
    }
    if for_host {
        values = values
            .into_iter()
            .map(|value| arrow::host_callable_sync(ctx, thread, value))
            .collect();
    }
    Ok(values)
}

fn invoke(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    this: &mut ThisStack,
    call: &FunctionInvocationExpression,
) -> Result<Value, EngineError> {
    let callee = match call.callee.as_ref() {
        Expression::MemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object)?;
            let callee = read_member(ctx, &object, &member.member, member.is_optional)?;
            this.push(object);
            callee
        }
        Expression::CalculatedMemberAccess(member) => {
            let object = eval(ctx, thread, this, &member.object)?;
            let key = eval(ctx, thread, this, &member.member)?.to_property_key();
            let callee = read_member(ctx, &object, key.as_str(), false)?;
            this.push(object);
            callee
        }
        other => {
            let callee = eval(ctx, thread, this, other)?;
            this.push(Value::Object(ctx.local_context().clone()));
            callee
        }
    };
    let result = call_value(ctx, thread, this, callee, call);
    this.pop();
    result
}

fn call_value(
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
            let NativeKind::Sync(body) = &native.kind else {
                return Err(EngineError::AsyncInSync {
                    function: native.name.to_string(),
                });
            };
            let args = eval_args(ctx, thread, this, &call.arguments, true)?;
            let receiver = this.current().cloned().unwrap_or_default();
            match body(&receiver, args)? {
                Value::Promise(_) => Err(EngineError::AsyncInSync {
                    function: native.name.to_string(),
                }),
                value => Ok(value),
            }
        }
        JsFunction::Arrow(closure) => {
            let args = if call.arguments.iter().any(is_spread) {
                ArrowArgs::Values(eval_args(ctx, thread, this, &call.arguments, false)?)
            } else {
                ArrowArgs::Deferred(&call.arguments)
            };
            arrow::call_arrow_sync(ctx, thread, closure, args)
        }
    }
}
