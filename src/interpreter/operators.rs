//! Operator semantics shared by the sync and async evaluators

use crate::ast::{BinaryOp, UnaryOp, UpdateOp};
use crate::error::EngineError;
use crate::prelude::math;
use crate::value::{parse_index, JsString, Value};
use std::cmp::Ordering;

/// For `&&`, `||` and `??`: the result when the right operand is not needed.
/// `None` means the right operand must be evaluated and becomes the result.
pub fn short_circuit(op: BinaryOp, left: &Value) -> Option<Value> {
    let done = match op {
        BinaryOp::And => !left.to_boolean(),
        BinaryOp::Or => left.to_boolean(),
        BinaryOp::Coalesce => !left.is_nullish(),
        _ => return None,
    };
    done.then(|| left.clone())
}

pub fn is_logical(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce)
}

/// Apply a binary operator to evaluated operands
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EngineError> {
    Ok(match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(math::rem(left.to_number(), right.to_number())),
        BinaryOp::Exp => Value::Number(math::pow(left.to_number(), right.to_number())),

        BinaryOp::Eq => Value::Boolean(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Boolean(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Boolean(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Boolean(!left.strict_equals(right)),
        BinaryOp::Lt => Value::Boolean(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LtEq => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Boolean(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GtEq => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),

        BinaryOp::BitAnd => int32(math::to_int32(left.to_number()) & math::to_int32(right.to_number())),
        BinaryOp::BitOr => int32(math::to_int32(left.to_number()) | math::to_int32(right.to_number())),
        BinaryOp::BitXor => int32(math::to_int32(left.to_number()) ^ math::to_int32(right.to_number())),
        BinaryOp::LShift => {
            int32(math::to_int32(left.to_number()).wrapping_shl(shift_count(right)))
        }
        BinaryOp::RShift => {
            int32(math::to_int32(left.to_number()).wrapping_shr(shift_count(right)))
        }
        BinaryOp::URShift => Value::Number(f64::from(
            math::to_uint32(left.to_number()).wrapping_shr(shift_count(right)),
        )),

        // Reached only once short_circuit declined
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => right.clone(),

        BinaryOp::In => Value::Boolean(has_property(right, &left.to_property_key())?),
    })
}

fn int32(n: i32) -> Value {
    Value::Number(f64::from(n))
}

fn shift_count(value: &Value) -> u32 {
    math::to_uint32(value.to_number()) & 0x1f
}

fn add(left: &Value, right: &Value) -> Value {
    let stringy = |v: &Value| {
        matches!(
            v,
            Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_)
        )
    };
    if stringy(left) || stringy(right) {
        let mut out = left.to_js_string().to_string();
        out.push_str(right.to_js_string().as_str());
        Value::String(JsString::from(out))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

/// Relational comparison; `None` when either side is NaN
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn has_property(target: &Value, key: &JsString) -> Result<bool, EngineError> {
    match target {
        Value::Object(object) => Ok(object.contains(key.as_str())),
        Value::Array(array) => Ok(key.as_str() == "length"
            || parse_index(key.as_str()).is_some_and(|index| index < array.len())),
        other => Err(EngineError::type_error(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            key,
            other.to_display_string()
        ))),
    }
}

/// Apply a unary operator. `delete` needs a place and is handled by the
/// evaluators; on a plain value it yields `true`.
pub fn unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Typeof => Value::from(value.type_of()),
        UnaryOp::Delete => Value::Boolean(true),
        UnaryOp::Plus => Value::Number(value.to_number()),
        UnaryOp::Minus => Value::Number(-value.to_number()),
        UnaryOp::Not => Value::Boolean(!value.to_boolean()),
        UnaryOp::BitNot => int32(!math::to_int32(value.to_number())),
    }
}

/// `++`/`--`: returns `(old, new)` as numbers
pub fn update(op: UpdateOp, value: &Value) -> (Value, Value) {
    let old = value.to_number();
    let new = match op {
        UpdateOp::Increment => old + 1.0,
        UpdateOp::Decrement => old - 1.0,
    };
    (Value::Number(old), Value::Number(new))
}
