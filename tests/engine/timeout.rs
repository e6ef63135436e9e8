//! Sync time budget

use super::{try_async, try_sync, var};
use ksx::builder::*;
use ksx::{EngineError, EvalOptions, EvaluationContext, JsFunction, JsObject, Value};
use std::time::Duration;

/// Context with the given budget and a `nap()` host function that blocks for 30ms
fn budget_context(sync_timeout_ms: u64) -> EvaluationContext {
    let globals = JsObject::from_pairs([(
        "nap",
        Value::Function(JsFunction::native("nap", |_, _| {
            std::thread::sleep(Duration::from_millis(30));
            Ok(Value::Undefined)
        })),
    )]);
    EvaluationContext::builder()
        .options(EvalOptions {
            sync_timeout_ms,
            ..EvalOptions::default()
        })
        .globals(globals)
        .build()
}

fn is_timeout<T>(result: &Result<T, EngineError>) -> bool {
    matches!(result, Err(err) if matches!(err.root_cause(), EngineError::Timeout { .. }))
}

#[test]
fn test_infinite_loop_times_out() {
    let ctx = budget_context(50);
    let result = try_sync(&ctx, vec![while_(bool_lit(true), block(vec![]))]);
    assert!(is_timeout(&result));
    assert!(result.is_err_and(|e| e.to_string().contains("50ms")));
}

#[test]
fn test_timeout_checked_before_next_statement() {
    let ctx = budget_context(10);
    let result = try_sync(
        &ctx,
        vec![expr_stmt(call(ident("nap"), vec![])), let_("after", num(1.0))],
    );
    assert!(is_timeout(&result));
    assert_eq!(var(&ctx, "after"), Value::Undefined);
}

#[test]
fn test_try_cannot_catch_timeout() {
    let ctx = budget_context(50);
    let result = try_sync(
        &ctx,
        vec![
            let_("caught", bool_lit(false)),
            try_(
                vec![while_(bool_lit(true), block(vec![]))],
                Some((None, vec![expr_stmt(assign(ident("caught"), bool_lit(true)))])),
                None,
            ),
        ],
    );
    assert!(is_timeout(&result));
    assert_eq!(var(&ctx, "caught"), Value::from(false));
}

#[test]
fn test_zero_disables_budget() {
    let ctx = budget_context(0);
    let result = try_sync(
        &ctx,
        vec![
            expr_stmt(call(ident("nap"), vec![])),
            expr_stmt(call(ident("nap"), vec![])),
            let_("after", num(1.0)),
        ],
    );
    assert!(result.is_ok());
    assert_eq!(var(&ctx, "after"), Value::from(1));
}

#[test]
fn test_function_calls_share_the_budget() {
    let ctx = budget_context(10);
    let result = try_sync(
        &ctx,
        vec![
            function(
                "slow",
                vec![],
                vec![expr_stmt(call(ident("nap"), vec![])), return_(num(1.0))],
            ),
            expr_stmt(call(ident("slow"), vec![])),
        ],
    );
    assert!(is_timeout(&result));
}

#[test]
fn test_budget_restarts_per_run() {
    let ctx = budget_context(50);
    assert!(try_sync(&ctx, vec![expr_stmt(call(ident("nap"), vec![]))]).is_ok());
    assert!(try_sync(&ctx, vec![expr_stmt(call(ident("nap"), vec![]))]).is_ok());
}

#[tokio::test]
async fn test_async_runs_ignore_sync_budget() {
    let ctx = budget_context(10);
    let result = try_async(
        &ctx,
        vec![expr_stmt(call(ident("nap"), vec![])), let_("after", num(1.0))],
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(var(&ctx, "after"), Value::from(1));
}
