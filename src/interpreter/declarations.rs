//! Binding of declarations, destructuring patterns and hoisted functions

use super::scope::BlockRef;
use crate::ast::{BindingPattern, Statement};
use crate::error::EngineError;
use crate::prelude::Rc;
use crate::value::{get_property, JsFunction, Value};

/// How a pattern introduces its names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// `let`/`const`: redeclaring a name of the same block is an error
    Declare { is_const: bool },
    /// Parameters and loop variables: always a fresh binding
    Bind { is_const: bool },
}

impl BindMode {
    fn is_const(self) -> bool {
        match self {
            BindMode::Declare { is_const } | BindMode::Bind { is_const } => is_const,
        }
    }
}

/// Bind `pattern` against `value` in `block`, destructuring recursively
pub fn bind_pattern(
    block: &BlockRef,
    pattern: &BindingPattern,
    value: Value,
    mode: BindMode,
) -> Result<(), EngineError> {
    match pattern {
        BindingPattern::Identifier(name) => {
            let mut block = block.borrow_mut();
            match mode {
                BindMode::Declare { .. } => block.declare(name, value, mode.is_const())?,
                BindMode::Bind { .. } => block.bind(name, value, mode.is_const()),
            }
            Ok(())
        }
        BindingPattern::Array(items) => {
            check_destructurable(&value)?;
            for (index, item) in items.iter().enumerate() {
                let Some(item) = item else { continue };
                let element = get_property(&value, &index.to_string(), false)?;
                bind_pattern(block, item, element, mode)?;
            }
            Ok(())
        }
        BindingPattern::Object(properties) => {
            check_destructurable(&value)?;
            for property in properties {
                let element = get_property(&value, &property.key, false)?;
                bind_pattern(block, &property.value, element, mode)?;
            }
            Ok(())
        }
    }
}

fn check_destructurable(value: &Value) -> Result<(), EngineError> {
    if value.is_nullish() {
        return Err(EngineError::type_error(format!(
            "Cannot destructure '{}' as it is {}.",
            value.to_js_string(),
            value.to_js_string()
        )));
    }
    Ok(())
}

/// Bind every function declaration of `statements` into `block` before any
/// of them runs. Each function closes over `closures`.
pub fn hoist_functions(
    block: &BlockRef,
    statements: &[Rc<Statement>],
    closures: &[BlockRef],
) -> Result<(), EngineError> {
    for statement in statements {
        if let Statement::Function(decl) = statement.as_ref() {
            let function = JsFunction::arrow(decl.function.clone(), closures.to_vec());
            block
                .borrow_mut()
                .declare(&decl.name, Value::Function(function), false)?;
        }
    }
    Ok(())
}
