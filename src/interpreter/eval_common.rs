//! Pieces of expression evaluation that do not depend on the evaluation mode

use super::context::{EvaluationContext, Place};
use crate::ast::{Expression, LiteralValue, PropertyKey};
use crate::error::EngineError;
use crate::value::{get_property, number_to_string, parse_index, JsFunction, JsObject, JsString, Value};

/// Receivers of member calls being evaluated. A member callee pushes its
/// object; the invocation pops it once the call returns.
#[derive(Debug, Default)]
pub struct ThisStack {
    values: Vec<Value>,
}

impl ThisStack {
    pub fn new() -> Self {
        ThisStack::default()
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.values.pop()
    }

    pub fn current(&self) -> Option<&Value> {
        self.values.last()
    }

    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// Every evaluation must leave the stack as it found it
    pub fn check_balanced(&self, depth: usize) -> Result<(), EngineError> {
        if self.values.len() == depth {
            Ok(())
        } else {
            Err(EngineError::internal_error(format!(
                "unbalanced receiver stack: expected depth {}, found {}",
                depth,
                self.values.len()
            )))
        }
    }
}

pub fn literal_value(value: &LiteralValue) -> Value {
    match value {
        LiteralValue::Undefined => Value::Undefined,
        LiteralValue::Null => Value::Null,
        LiteralValue::Boolean(b) => Value::Boolean(*b),
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::String(s) => Value::from(s.as_str()),
    }
}

/// Key of a non-computed object literal property
pub fn static_key(key: &PropertyKey) -> Option<JsString> {
    match key {
        PropertyKey::Identifier(name) | PropertyKey::String(name) => Some(JsString::from(name.as_str())),
        PropertyKey::Number(n) => Some(JsString::from(number_to_string(*n))),
        PropertyKey::Computed(_) => None,
    }
}

pub fn is_spread(expr: &Expression) -> bool {
    matches!(expr, Expression::Spread(_))
}

/// Append the elements of an iterable (`...value`) to `out`
pub fn spread_into(out: &mut Vec<Value>, value: Value) -> Result<(), EngineError> {
    match value {
        Value::Array(array) => out.extend(array.to_vec()),
        Value::String(s) => out.extend(s.as_str().chars().map(|c| Value::from(c.to_string()))),
        other => {
            return Err(EngineError::type_error(format!(
                "{} is not iterable",
                other.to_display_string()
            )));
        }
    }
    Ok(())
}

/// Copy own properties of `value` into an object literal (`{...value}`)
pub fn spread_object(target: &JsObject, value: &Value) {
    match value {
        Value::Object(source) => {
            for (key, value) in source.entries() {
                target.set(key, value);
            }
        }
        Value::Array(array) => {
            for (index, value) in array.to_vec().into_iter().enumerate() {
                target.set(index.to_string(), value);
            }
        }
        Value::String(s) => {
            for (index, c) in s.as_str().chars().enumerate() {
                target.set(index.to_string(), Value::from(c.to_string()));
            }
        }
        _ => {}
    }
}

/// `object.key` honouring the optional-access option
pub fn read_member(
    ctx: &EvaluationContext,
    object: &Value,
    key: &str,
    is_optional: bool,
) -> Result<Value, EngineError> {
    get_property(
        object,
        key,
        is_optional || ctx.options().default_to_optional_member_access,
    )
}

/// Storage place of `object[key]`
pub fn member_place(object: &Value, key: JsString) -> Result<Place, EngineError> {
    match object {
        Value::Object(object) => Ok(Place::Property {
            object: object.clone(),
            key,
        }),
        Value::Array(array) if key.as_str() == "length" => Ok(Place::ArrayLength(array.clone())),
        Value::Array(array) => match parse_index(key.as_str()) {
            Some(index) => Ok(Place::Element {
                array: array.clone(),
                index,
            }),
            None => Err(EngineError::type_error(format!(
                "Cannot create property '{}' on array",
                key
            ))),
        },
        Value::Undefined | Value::Null => Err(EngineError::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            object.to_js_string(),
            key
        ))),
        other => Err(EngineError::type_error(format!(
            "Cannot create property '{}' on {}",
            key,
            other.type_of()
        ))),
    }
}

/// Reject the call when the host's capability gate bans `function`
pub fn check_capability(ctx: &EvaluationContext, function: &JsFunction) -> Result<(), EngineError> {
    let verdict = ctx.capability_gate().check(function);
    if verdict.banned {
        return Err(EngineError::Banned {
            function: verdict.function.unwrap_or_else(|| function.name()),
            help: verdict.help.unwrap_or_default(),
        });
    }
    Ok(())
}

/// Callee value → function. `None` means the call is skipped and yields
/// `undefined` (optional call of a nullish value).
pub fn callable(
    ctx: &EvaluationContext,
    callee: Value,
    callee_expr: &Expression,
) -> Result<Option<JsFunction>, EngineError> {
    match callee {
        Value::Function(function) => Ok(Some(function)),
        value if value.is_nullish() && ctx.options().default_to_optional_member_access => Ok(None),
        _ => Err(EngineError::type_error(format!(
            "{} is not a function",
            describe(callee_expr)
        ))),
    }
}

/// Short source-like name of an expression for diagnostics
pub fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(id) => id.name.clone(),
        Expression::MemberAccess(member) => format!("{}.{}", describe(&member.object), member.member),
        Expression::CalculatedMemberAccess(member) => format!("{}[...]", describe(&member.object)),
        Expression::FunctionInvocation(call) => format!("{}(...)", describe(&call.callee)),
        Expression::Literal(lit) => literal_value(&lit.value).to_display_string(),
        _ => "expression".to_string(),
    }
}
