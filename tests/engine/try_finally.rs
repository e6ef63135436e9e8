//! Try/catch/finally: catching, rethrowing, and deferred exits through finally

use super::{run_both, run_both_watching, run_sync, try_sync, Outcome};
use ksx::ast::{AssignmentOp, Statement};
use ksx::builder::*;
use ksx::{EvaluationContext, Value};

fn bump(name: &str) -> Statement {
    expr_stmt(postfix_inc(ident(name)))
}

fn append(name: &str, text: &str) -> Statement {
    expr_stmt(assign_op(AssignmentOp::AddAssign, ident(name), str_lit(text)))
}

/// Run `body` after `let f = 0` in both modes and report the outcome and
/// how often `f` was bumped
async fn count_finally(body: Vec<Statement>) -> (Outcome, Value) {
    let mut statements = vec![let_("f", num(0.0))];
    statements.extend(body);
    let (outcome, mut vars) = run_both_watching(statements, &["f"]).await;
    (outcome, vars.pop().unwrap_or_default())
}

/// `function f() {}` declared twice in one block
fn duplicate_functions() -> Vec<Statement> {
    vec![function("f", vec![], vec![]), function("f", vec![], vec![])]
}

// -----------------------------------------------------------------------------
// Catching
// -----------------------------------------------------------------------------

#[test]
fn test_catch_binds_thrown_value() {
    assert_eq!(
        run_sync(vec![
            let_pattern(pat("r"), None),
            try_(
                vec![throw(str_lit("boom!"))],
                Some((Some("e"), vec![expr_stmt(assign(ident("r"), ident("e")))])),
                None,
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from("boom!")
    );
}

#[test]
fn test_catch_engine_error_as_object() {
    assert_eq!(
        run_sync(vec![
            const_("k", num(1.0)),
            let_pattern(pat("r"), None),
            try_(
                vec![expr_stmt(assign(ident("k"), num(2.0)))],
                Some((Some("e"), vec![expr_stmt(assign(ident("r"), member(ident("e"), "name")))])),
                None,
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from("TypeError")
    );
}

#[test]
fn test_catch_without_binding() {
    assert_eq!(
        run_sync(vec![
            let_("r", num(0.0)),
            try_(
                vec![throw(num(1.0)), expr_stmt(assign(ident("r"), num(5.0)))],
                Some((None, vec![expr_stmt(assign(ident("r"), num(2.0)))])),
                None,
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from(2)
    );
}

#[test]
fn test_rethrow_from_catch_reaches_outer_try() {
    assert_eq!(
        run_sync(vec![
            let_pattern(pat("r"), None),
            try_(
                vec![try_(
                    vec![throw(str_lit("inner"))],
                    Some((Some("e"), vec![throw(add(ident("e"), str_lit("+outer")))])),
                    None,
                )],
                Some((Some("e"), vec![expr_stmt(assign(ident("r"), ident("e")))])),
                None,
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from("inner+outer")
    );
}

#[test]
fn test_error_in_finally_replaces_pending_error() {
    assert_eq!(
        run_sync(vec![
            let_pattern(pat("r"), None),
            try_(
                vec![try_(vec![throw(num(1.0))], None, Some(vec![throw(num(2.0))]))],
                Some((Some("e"), vec![expr_stmt(assign(ident("r"), ident("e")))])),
                None,
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from(2)
    );
}

#[test]
fn test_caught_error_unwinds_loop_scopes() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![
            let_("r", str_lit("")),
            try_(
                vec![while_(
                    bool_lit(true),
                    block(vec![block(vec![throw(str_lit("x"))])]),
                )],
                Some((Some("e"), vec![expr_stmt(assign(ident("r"), ident("e")))])),
                None,
            ),
            expr_stmt(ident("r")),
        ],
    );
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from("x")));
    let thread = ctx.ensure_main_thread();
    let thread = thread.borrow();
    assert!(thread.loops.is_empty());
    assert!(thread.try_blocks.is_empty());
    assert_eq!(thread.blocks.len(), 1);
}

#[test]
fn test_uncaught_throw_reports_value() {
    let ctx = EvaluationContext::new();
    let Err(err) = try_sync(&ctx, vec![throw(str_lit("boom!"))]) else {
        panic!("expected an error");
    };
    assert_eq!(err.to_value(), Value::from("boom!"));
    assert!(err.to_string().contains("boom!"));
}

// -----------------------------------------------------------------------------
// Finally runs exactly once
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_finally_after_normal_completion() {
    let (outcome, count) = count_finally(vec![try_(vec![], None, Some(vec![bump("f")]))]).await;
    assert!(outcome.is_ok());
    assert_eq!(count, Value::from(1));
}

#[tokio::test]
async fn test_finally_after_caught_throw() {
    let (outcome, count) = count_finally(vec![try_(
        vec![throw(num(1.0))],
        Some((None, vec![])),
        Some(vec![bump("f")]),
    )])
    .await;
    assert!(outcome.is_ok());
    assert_eq!(count, Value::from(1));
}

#[tokio::test]
async fn test_finally_after_uncaught_throw() {
    let (outcome, count) =
        count_finally(vec![try_(vec![throw(num(1.0))], None, Some(vec![bump("f")]))]).await;
    assert_eq!(outcome, Err(Value::from(1)));
    assert_eq!(count, Value::from(1));
}

#[tokio::test]
async fn test_finally_after_throw_in_catch() {
    let (outcome, count) = count_finally(vec![try_(
        vec![throw(num(1.0))],
        Some((None, vec![throw(num(2.0))])),
        Some(vec![bump("f")]),
    )])
    .await;
    assert_eq!(outcome, Err(Value::from(2)));
    assert_eq!(count, Value::from(1));
}

#[tokio::test]
async fn test_finally_after_return() {
    let (outcome, count) = count_finally(vec![
        function(
            "g",
            vec![],
            vec![try_(vec![return_(num(1.0))], None, Some(vec![bump("f")]))],
        ),
        expr_stmt(call(ident("g"), vec![])),
    ])
    .await;
    assert_eq!(outcome, Ok(Value::from(1)));
    assert_eq!(count, Value::from(1));
}

#[tokio::test]
async fn test_finally_after_break() {
    let (outcome, count) = count_finally(vec![while_(
        bool_lit(true),
        block(vec![try_(vec![break_()], None, Some(vec![bump("f")]))]),
    )])
    .await;
    assert!(outcome.is_ok());
    assert_eq!(count, Value::from(1));
}

#[tokio::test]
async fn test_finally_after_each_continue() {
    let (outcome, count) = count_finally(vec![for_(
        Some(let_("i", num(0.0))),
        Some(lt(ident("i"), num(3.0))),
        Some(postfix_inc(ident("i"))),
        block(vec![try_(vec![continue_()], None, Some(vec![bump("f")]))]),
    )])
    .await;
    assert!(outcome.is_ok());
    assert_eq!(count, Value::from(3));
}

#[tokio::test]
async fn test_nested_try_break_runs_every_finally() {
    assert_eq!(
        run_both(vec![
            let_("log", str_lit("")),
            while_(
                bool_lit(true),
                block(vec![try_(
                    vec![try_(vec![break_()], None, Some(vec![append("log", "a")]))],
                    None,
                    Some(vec![append("log", "b")]),
                )]),
            ),
            expr_stmt(ident("log")),
        ])
        .await,
        Value::from("ab")
    );
}

#[tokio::test]
async fn test_nested_try_continue_runs_every_finally() {
    assert_eq!(
        run_both(vec![
            let_("log", str_lit("")),
            for_(
                Some(let_("i", num(0.0))),
                Some(lt(ident("i"), num(2.0))),
                Some(postfix_inc(ident("i"))),
                block(vec![
                    try_(
                        vec![try_(vec![continue_()], None, Some(vec![append("log", "a")]))],
                        None,
                        Some(vec![append("log", "b")]),
                    ),
                    append("log", "!"),
                ]),
            ),
            expr_stmt(ident("log")),
        ])
        .await,
        Value::from("abab")
    );
}

// -----------------------------------------------------------------------------
// Errors while opening a section
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_declaration_in_try_block_is_caught() {
    let (outcome, vars) = run_both_watching(
        vec![
            let_("r", num(0.0)),
            try_(
                duplicate_functions(),
                Some((Some("e"), vec![expr_stmt(assign(ident("r"), num(1.0)))])),
                None,
            ),
            expr_stmt(assign_op(AssignmentOp::AddAssign, ident("r"), num(10.0))),
            throw(str_lit("later")),
        ],
        &["r"],
    )
    .await;
    assert_eq!(vars, vec![Value::from(11)]);
    assert_eq!(outcome, Err(Value::from("later")));
}

#[tokio::test]
async fn test_duplicate_declaration_in_catch_block_runs_finally() {
    let mut catch_body = duplicate_functions();
    catch_body.push(expr_stmt(assign(ident("r"), num(5.0))));
    let (outcome, vars) = run_both_watching(
        vec![
            let_("r", num(0.0)),
            try_(
                vec![try_(
                    vec![throw(num(1.0))],
                    Some((Some("e"), catch_body)),
                    Some(vec![bump("r")]),
                )],
                Some((None, vec![expr_stmt(assign_op(
                    AssignmentOp::AddAssign,
                    ident("r"),
                    num(10.0),
                ))])),
                None,
            ),
            expr_stmt(assign_op(AssignmentOp::AddAssign, ident("r"), num(100.0))),
            throw(str_lit("later")),
        ],
        &["r"],
    )
    .await;
    assert_eq!(vars, vec![Value::from(111)]);
    assert_eq!(outcome, Err(Value::from("later")));
}

#[tokio::test]
async fn test_duplicate_declaration_in_finally_block_propagates() {
    let (outcome, vars) = run_both_watching(
        vec![
            let_("r", num(0.0)),
            try_(
                vec![try_(vec![bump("r")], None, Some(duplicate_functions()))],
                Some((None, vec![expr_stmt(assign_op(
                    AssignmentOp::AddAssign,
                    ident("r"),
                    num(10.0),
                ))])),
                None,
            ),
            expr_stmt(ident("r")),
        ],
        &["r"],
    )
    .await;
    assert_eq!(outcome, Ok(Value::from(11)));
    assert_eq!(vars, vec![Value::from(11)]);
}

// -----------------------------------------------------------------------------
// Return through finally
// -----------------------------------------------------------------------------

#[test]
fn test_return_in_finally_overrides() {
    assert_eq!(
        run_sync(vec![
            function(
                "g",
                vec![],
                vec![try_(vec![return_(num(1.0))], None, Some(vec![return_(num(2.0))]))],
            ),
            expr_stmt(call(ident("g"), vec![])),
        ]),
        Value::from(2)
    );
}

#[test]
fn test_pending_error_wins_over_finally_return() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![try_(vec![throw(str_lit("err"))], None, Some(vec![return_(num(123.0))]))],
    );
    assert_eq!(result.err().map(|e| e.to_value()), Some(Value::from("err")));
    let thread = ctx.ensure_main_thread();
    assert_eq!(thread.borrow().return_value, Some(Value::from(123)));
}

#[test]
fn test_return_value_survives_finally() {
    assert_eq!(
        run_sync(vec![
            let_("f", num(0.0)),
            function(
                "g",
                vec![],
                vec![try_(
                    vec![return_(str_lit("kept"))],
                    None,
                    Some(vec![bump("f")]),
                )],
            ),
            expr_stmt(call(ident("g"), vec![])),
        ]),
        Value::from("kept")
    );
}
