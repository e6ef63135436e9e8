//! Error types for the KSX engine

use crate::prelude::IndexMap;
use crate::value::{JsObject, Value};
use thiserror::Error;

/// Parse error codes reported by the parser and by module resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorCode {
    ExpressionExpected,        // K001
    UnexpectedToken,           // K002
    IdentifierExpected,        // K003
    RBraceExpected,            // K004
    RSquareExpected,           // K005
    RParenExpected,            // K006
    InvalidPropertyName,       // K007
    ColonExpected,             // K008
    DestructureInitializer,    // K009
    InvalidArgumentList,       // K010
    ForLoopInitializer,        // K011
    LBraceExpected,            // K012
    CatchOrFinallyExpected,    // K013
    LParenExpected,            // K014
    CaseOrDefaultExpected,     // K015
    DuplicateDefault,          // K016
    InvalidArrayDestructure,   // K017
    InvalidObjectDestructure,  // K018
    ExportTargetExpected,      // K019
    FromExpected,              // K020
    ModuleNameExpected,        // K021
    DuplicateImport,           // K022
    ModuleNotFound,            // K023
    CircularImport,            // K024
    ExportNotFound,            // K025
}

impl ParseErrorCode {
    pub fn code(self) -> &'static str {
        match self {
            ParseErrorCode::ExpressionExpected => "K001",
            ParseErrorCode::UnexpectedToken => "K002",
            ParseErrorCode::IdentifierExpected => "K003",
            ParseErrorCode::RBraceExpected => "K004",
            ParseErrorCode::RSquareExpected => "K005",
            ParseErrorCode::RParenExpected => "K006",
            ParseErrorCode::InvalidPropertyName => "K007",
            ParseErrorCode::ColonExpected => "K008",
            ParseErrorCode::DestructureInitializer => "K009",
            ParseErrorCode::InvalidArgumentList => "K010",
            ParseErrorCode::ForLoopInitializer => "K011",
            ParseErrorCode::LBraceExpected => "K012",
            ParseErrorCode::CatchOrFinallyExpected => "K013",
            ParseErrorCode::LParenExpected => "K014",
            ParseErrorCode::CaseOrDefaultExpected => "K015",
            ParseErrorCode::DuplicateDefault => "K016",
            ParseErrorCode::InvalidArrayDestructure => "K017",
            ParseErrorCode::InvalidObjectDestructure => "K018",
            ParseErrorCode::ExportTargetExpected => "K019",
            ParseErrorCode::FromExpected => "K020",
            ParseErrorCode::ModuleNameExpected => "K021",
            ParseErrorCode::DuplicateImport => "K022",
            ParseErrorCode::ModuleNotFound => "K023",
            ParseErrorCode::CircularImport => "K024",
            ParseErrorCode::ExportNotFound => "K025",
        }
    }

    /// Message template; `{0}` is replaced by the error argument
    pub fn message(self) -> &'static str {
        match self {
            ParseErrorCode::ExpressionExpected => "An expression expected",
            ParseErrorCode::UnexpectedToken => "Unexpected token: {0}",
            ParseErrorCode::IdentifierExpected => "An identifier expected",
            ParseErrorCode::RBraceExpected => "'}' expected",
            ParseErrorCode::RSquareExpected => "']' expected",
            ParseErrorCode::RParenExpected => "')' expected",
            ParseErrorCode::InvalidPropertyName => "Invalid object property name type",
            ParseErrorCode::ColonExpected => "':' expected",
            ParseErrorCode::DestructureInitializer => "Initializer expected",
            ParseErrorCode::InvalidArgumentList => "Invalid argument list",
            ParseErrorCode::ForLoopInitializer => "Declaration expected",
            ParseErrorCode::LBraceExpected => "'{' expected",
            ParseErrorCode::CatchOrFinallyExpected => "'catch' or 'finally' expected",
            ParseErrorCode::LParenExpected => "'(' expected",
            ParseErrorCode::CaseOrDefaultExpected => "'case' or 'default' expected",
            ParseErrorCode::DuplicateDefault => "'default' case can be used only once within a switch statement",
            ParseErrorCode::InvalidArrayDestructure => "Invalid array destructuring target",
            ParseErrorCode::InvalidObjectDestructure => "Invalid object destructuring target",
            ParseErrorCode::ExportTargetExpected => "'const' or 'function' expected after 'export'",
            ParseErrorCode::FromExpected => "'from' expected",
            ParseErrorCode::ModuleNameExpected => "A module name string expected",
            ParseErrorCode::DuplicateImport => "Duplicate import name: {0}",
            ParseErrorCode::ModuleNotFound => "Cannot find module: {0}",
            ParseErrorCode::CircularImport => "Circular module import: {0}",
            ParseErrorCode::ExportNotFound => "Module does not export: {0}",
        }
    }
}

impl std::fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A structured parse error
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {text} ({line}:{column})")]
pub struct ParseError {
    pub code: ParseErrorCode,
    pub text: String,
    pub position: usize,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    /// Create an error with the code's message, substituting `arg` for `{0}`
    pub fn new(code: ParseErrorCode, arg: &str, position: usize, line: u32, column: u32) -> Self {
        ParseError {
            code,
            text: code.message().replace("{0}", arg),
            position,
            line,
            column,
        }
    }
}

/// Main error type for the engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A value raised by a `throw` statement
    #[error("Uncaught {}", .value.to_display_string())]
    Thrown { value: Value },

    /// An error raised while processing a statement, with its position
    #[error("{source} ({statement} at {line}:{column})")]
    StatementExecution {
        statement: &'static str,
        line: u32,
        column: u32,
        source: Box<EngineError>,
    },

    #[error("Sync evaluation exceeded the {timeout_ms}ms time budget")]
    Timeout { timeout_ms: u64 },

    #[error("Function {function} is not allowed to call. {help}")]
    Banned { function: String, help: String },

    #[error("Function {function} is asynchronous and cannot run in sync evaluation")]
    AsyncInSync { function: String },

    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("Error: {message}")]
    Runtime { message: String },

    #[error("ModuleError: {message}")]
    Module { message: String },

    /// Source text handed to the engine did not parse
    #[error("SyntaxError: {}", format_parse_errors(.0))]
    Parse(Vec<ParseError>),

    #[error("Module parsing failed: {}", format_module_errors(.0))]
    ModuleErrors(IndexMap<String, Vec<ParseError>>),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

fn format_module_errors(errors: &IndexMap<String, Vec<ParseError>>) -> String {
    errors
        .iter()
        .flat_map(|(module, list)| list.iter().map(move |e| format!("{} in {}", e, module)))
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    pub fn thrown(value: impl Into<Value>) -> Self {
        EngineError::Thrown {
            value: value.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        EngineError::TypeError {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        EngineError::Runtime {
            message: message.into(),
        }
    }

    pub fn module_error(message: impl Into<String>) -> Self {
        EngineError::Module {
            message: message.into(),
        }
    }

    /// Create an internal error for unexpected engine states
    pub fn internal_error(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }

    /// The innermost error, with statement wrappers removed
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::StatementExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True for banned calls and for async calls attempted in sync mode
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self.root_cause(),
            EngineError::Banned { .. } | EngineError::AsyncInSync { .. }
        )
    }

    /// Whether a script `try` may handle this error
    pub fn is_catchable(&self) -> bool {
        !matches!(self.root_cause(), EngineError::Timeout { .. })
    }

    /// Attach the statement being processed, unless the error already carries
    /// a position or is a script-level value
    pub fn at_statement(self, statement: &crate::ast::Statement) -> Self {
        match self {
            EngineError::Thrown { .. }
            | EngineError::StatementExecution { .. }
            | EngineError::Timeout { .. }
            | EngineError::Parse(_)
            | EngineError::ModuleErrors(_) => self,
            other => {
                let span = statement.span();
                EngineError::StatementExecution {
                    statement: statement.kind_name(),
                    line: span.line,
                    column: span.column,
                    source: Box::new(other),
                }
            }
        }
    }

    /// Error class name exposed to scripts
    pub fn name(&self) -> &'static str {
        match self.root_cause() {
            EngineError::TypeError { .. } => "TypeError",
            EngineError::Timeout { .. } => "TimeoutError",
            EngineError::Banned { .. } | EngineError::AsyncInSync { .. } => "CapabilityError",
            EngineError::Parse(_) => "SyntaxError",
            EngineError::Module { .. } | EngineError::ModuleErrors(_) => "ModuleError",
            EngineError::Internal(_) => "InternalError",
            _ => "Error",
        }
    }

    /// Value bound by a `catch` clause
    pub fn to_value(&self) -> Value {
        match self.root_cause() {
            EngineError::Thrown { value } => value.clone(),
            root => {
                let message = match root {
                    EngineError::TypeError { message }
                    | EngineError::Runtime { message }
                    | EngineError::Module { message } => message.clone(),
                    other => other.to_string(),
                };
                let object = JsObject::new();
                object.set("name", Value::from(self.name()));
                object.set("message", Value::from(message));
                Value::Object(object)
            }
        }
    }
}
