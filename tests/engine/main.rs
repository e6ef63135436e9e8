//! Integration tests for the engine, organized by feature
//!
//! Programs are built with `ksx::builder` and run through the public API in
//! both processor modes.

mod control_flow;
mod functions;
mod modules;
mod switch;
mod timeout;
mod try_finally;

use ksx::ast::{Expression, Statement};
use ksx::prelude::{FxHashMap, Rc};
use ksx::{
    builder, Completion, EngineError, EvaluationContext, JsObject, ParseError, ParseErrorCode,
    Parser, Value,
};

/// Context whose globals hold `pairs`
pub fn context_with(pairs: Vec<(&str, Value)>) -> EvaluationContext {
    EvaluationContext::builder()
        .globals(JsObject::from_pairs(pairs))
        .build()
}

pub fn try_sync(ctx: &EvaluationContext, statements: Vec<Statement>) -> Result<Completion, EngineError> {
    ksx::run_sync(ctx, builder::program(statements))
}

pub async fn try_async(
    ctx: &EvaluationContext,
    statements: Vec<Statement>,
) -> Result<Completion, EngineError> {
    ksx::run_async(ctx, builder::program(statements)).await
}

/// Run synchronously on a fresh context and return the completion value
#[allow(clippy::expect_used)]
pub fn run_sync(statements: Vec<Statement>) -> Value {
    let ctx = EvaluationContext::new();
    try_sync(&ctx, statements).expect("sync run failed").value
}

/// Run asynchronously on a fresh context and return the completion value
#[allow(clippy::expect_used)]
pub async fn run_async(statements: Vec<Statement>) -> Value {
    let ctx = EvaluationContext::new();
    try_async(&ctx, statements).await.expect("async run failed").value
}

/// Completion value of a run, or the value it threw
pub type Outcome = Result<Value, Value>;

fn outcome(result: Result<Completion, EngineError>) -> Outcome {
    result.map(|c| c.value).map_err(|e| e.to_value())
}

/// Run `statements` in both modes on fresh contexts, check that the outcomes
/// and the final values of `watched` agree, and return the sync side
pub async fn run_both_watching(statements: Vec<Statement>, watched: &[&str]) -> (Outcome, Vec<Value>) {
    let sync_ctx = EvaluationContext::new();
    let sync_outcome = outcome(try_sync(&sync_ctx, statements.clone()));
    let sync_vars: Vec<Value> = watched.iter().map(|name| var(&sync_ctx, name)).collect();

    let async_ctx = EvaluationContext::new();
    let async_outcome = outcome(try_async(&async_ctx, statements).await);
    let async_vars: Vec<Value> = watched.iter().map(|name| var(&async_ctx, name)).collect();

    assert_eq!(sync_outcome, async_outcome, "sync and async outcomes differ");
    assert_eq!(sync_vars, async_vars, "sync and async variables differ");
    (sync_outcome, sync_vars)
}

/// Run in both modes and return the agreed completion value
#[allow(clippy::expect_used)]
pub async fn run_both(statements: Vec<Statement>) -> Value {
    let (outcome, _) = run_both_watching(statements, &[]).await;
    outcome.expect("run failed")
}

/// Top-level variable of the context's main thread
pub fn var(ctx: &EvaluationContext, name: &str) -> Value {
    ctx.main_var(name).unwrap_or_default()
}

/// Whether `result` failed with a message containing `needle`
pub fn throws<T>(result: Result<T, EngineError>, needle: &str) -> bool {
    match result {
        Err(e) => e.to_string().contains(needle),
        Ok(_) => false,
    }
}

/// Parser over a fixed table of source text to prebuilt trees
#[derive(Default)]
pub struct TableParser {
    scripts: FxHashMap<String, Vec<Rc<Statement>>>,
    expressions: FxHashMap<String, Expression>,
}

impl TableParser {
    pub fn new() -> Self {
        TableParser::default()
    }

    pub fn script(mut self, source: &str, statements: Vec<Statement>) -> Self {
        self.scripts
            .insert(source.to_string(), builder::program(statements));
        self
    }

    pub fn expression(mut self, source: &str, expression: Expression) -> Self {
        self.expressions.insert(source.to_string(), expression);
        self
    }
}

fn unknown_source(source: &str) -> Vec<ParseError> {
    vec![ParseError::new(ParseErrorCode::UnexpectedToken, source, 0, 1, 1)]
}

impl Parser for TableParser {
    fn parse_statements(&self, source: &str) -> Result<Vec<Rc<Statement>>, Vec<ParseError>> {
        self.scripts
            .get(source)
            .cloned()
            .ok_or_else(|| unknown_source(source))
    }

    fn parse_expr(&self, source: &str) -> Result<Expression, Vec<ParseError>> {
        self.expressions
            .get(source)
            .cloned()
            .ok_or_else(|| unknown_source(source))
    }
}
