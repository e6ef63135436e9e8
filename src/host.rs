//! Host collaborator traits
//!
//! The engine never parses source text, loads files, or decides which host
//! functions are allowed. Hosts plug those concerns in through these traits.

use crate::ast::{Expression, Statement};
use crate::error::{EngineError, ParseError};
use crate::interpreter::context::EvaluationContext;
use crate::interpreter::scope::ThreadRef;
use crate::prelude::{FxHashMap, Rc};
use crate::value::{JsFunction, Value};
use futures::future::LocalBoxFuture;

/// Turns source text into trees
pub trait Parser {
    fn parse_statements(&self, source: &str) -> Result<Vec<Rc<Statement>>, Vec<ParseError>>;

    /// Parse a single expression (value bindings)
    fn parse_expr(&self, source: &str) -> Result<Expression, Vec<ParseError>>;
}

/// Loads module source by name. `Ok(None)` means the module does not exist.
pub trait ModuleResolver {
    fn resolve<'a>(
        &'a self,
        module_name: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<String>, EngineError>>;
}

/// Resolver over an in-memory name → source table
#[derive(Debug, Default, Clone)]
pub struct MapModuleResolver {
    sources: FxHashMap<String, String>,
}

impl MapModuleResolver {
    pub fn new() -> Self {
        MapModuleResolver::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }
}

impl ModuleResolver for MapModuleResolver {
    fn resolve<'a>(
        &'a self,
        module_name: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<String>, EngineError>> {
        let source = self.sources.get(module_name).cloned();
        Box::pin(async move { Ok(source) })
    }
}

/// Result of a capability check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityVerdict {
    pub banned: bool,
    pub function: Option<String>,
    pub help: Option<String>,
}

impl CapabilityVerdict {
    pub fn allowed() -> Self {
        CapabilityVerdict::default()
    }

    pub fn banned(function: impl Into<String>, help: impl Into<String>) -> Self {
        CapabilityVerdict {
            banned: true,
            function: Some(function.into()),
            help: Some(help.into()),
        }
    }
}

/// Consulted before every function invocation
pub trait CapabilityGate {
    fn check(&self, function: &JsFunction) -> CapabilityVerdict;
}

/// Gate that allows every call
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl CapabilityGate for AllowAll {
    fn check(&self, _function: &JsFunction) -> CapabilityVerdict {
        CapabilityVerdict::allowed()
    }
}

/// Gate that bans host functions by name
#[derive(Debug, Default, Clone)]
pub struct BannedFunctions {
    banned: FxHashMap<String, String>,
}

impl BannedFunctions {
    pub fn new() -> Self {
        BannedFunctions::default()
    }

    /// Ban `name`; `help` is appended to the error message
    pub fn ban(mut self, name: impl Into<String>, help: impl Into<String>) -> Self {
        self.banned.insert(name.into(), help.into());
        self
    }
}

impl CapabilityGate for BannedFunctions {
    fn check(&self, function: &JsFunction) -> CapabilityVerdict {
        if !matches!(function, JsFunction::Native(_)) {
            return CapabilityVerdict::allowed();
        }
        let name = function.name();
        match self.banned.get(&name) {
            Some(help) => CapabilityVerdict::banned(name, help.clone()),
            None => CapabilityVerdict::allowed(),
        }
    }
}

/// Wraps every assignment and increment so the host can observe or batch
/// mutations. Both methods default to running the update directly.
pub trait UpdateHook {
    fn run_sync(
        &self,
        update: &mut dyn FnMut() -> Result<Value, EngineError>,
    ) -> Result<Value, EngineError> {
        update()
    }

    fn run_async<'a>(
        &'a self,
        update: LocalBoxFuture<'a, Result<Value, EngineError>>,
    ) -> LocalBoxFuture<'a, Result<Value, EngineError>> {
        update
    }
}

/// Called after every statement the async processor completes
pub trait StatementObserver {
    fn on_statement_completed<'a>(
        &'a self,
        ctx: &'a EvaluationContext,
        thread: &'a ThreadRef,
        statement: &'a Statement,
    ) -> LocalBoxFuture<'a, Result<(), EngineError>>;
}
