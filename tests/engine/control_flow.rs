//! Control flow: if/else, loops, break/continue

use super::{run_both, run_both_watching, run_sync, throws, try_sync, var};
use ksx::ast::{AssignmentOp, BinaryOp, ForVarBinding, Statement};
use ksx::builder::*;
use ksx::{EngineError, EvaluationContext, Value};

fn sum_to(n: f64) -> Vec<Statement> {
    vec![
        let_("sum", num(0.0)),
        for_(
            Some(let_("i", num(0.0))),
            Some(lt(ident("i"), num(n))),
            Some(postfix_inc(ident("i"))),
            block(vec![expr_stmt(assign_op(
                AssignmentOp::AddAssign,
                ident("sum"),
                ident("i"),
            ))]),
        ),
        expr_stmt(ident("sum")),
    ]
}

fn eq(left: ksx::ast::Expression, right: ksx::ast::Expression) -> ksx::ast::Expression {
    strict_eq(left, right)
}

// -----------------------------------------------------------------------------
// If/Else
// -----------------------------------------------------------------------------

#[test]
fn test_if_else_branches() {
    let program = |flag: bool| {
        vec![
            let_("r", num(0.0)),
            if_(
                bool_lit(flag),
                block(vec![expr_stmt(assign(ident("r"), num(1.0)))]),
                Some(block(vec![expr_stmt(assign(ident("r"), num(2.0)))])),
            ),
            expr_stmt(ident("r")),
        ]
    };
    assert_eq!(run_sync(program(true)), Value::from(1));
    assert_eq!(run_sync(program(false)), Value::from(2));
}

#[test]
fn test_if_without_else() {
    assert_eq!(
        run_sync(vec![
            let_("r", num(0.0)),
            if_(bool_lit(false), expr_stmt(assign(ident("r"), num(1.0))), None),
            expr_stmt(ident("r")),
        ]),
        Value::from(0)
    );
}

// -----------------------------------------------------------------------------
// Loops
// -----------------------------------------------------------------------------

#[test]
fn test_for_loop_sum() {
    assert_eq!(run_sync(sum_to(5.0)), Value::from(10));
}

#[test]
fn test_for_loop_never_entered() {
    assert_eq!(run_sync(sum_to(0.0)), Value::from(0));
}

#[tokio::test]
async fn test_while_with_continue() {
    assert_eq!(
        run_both(vec![
            let_("i", num(0.0)),
            let_("n", num(0.0)),
            while_(
                lt(ident("i"), num(5.0)),
                block(vec![
                    expr_stmt(postfix_inc(ident("i"))),
                    if_(
                        eq(binary(BinaryOp::Mod, ident("i"), num(2.0)), num(0.0)),
                        continue_(),
                        None,
                    ),
                    expr_stmt(postfix_inc(ident("n"))),
                ]),
            ),
            expr_stmt(ident("n")),
        ])
        .await,
        Value::from(3)
    );
}

#[tokio::test]
async fn test_break_out_of_infinite_while() {
    assert_eq!(
        run_both(vec![
            let_("i", num(0.0)),
            while_(
                bool_lit(true),
                block(vec![
                    expr_stmt(postfix_inc(ident("i"))),
                    if_(eq(ident("i"), num(4.0)), break_(), None),
                ]),
            ),
            expr_stmt(ident("i")),
        ])
        .await,
        Value::from(4)
    );
}

#[tokio::test]
async fn test_do_while_runs_once() {
    assert_eq!(
        run_both(vec![
            let_("n", num(0.0)),
            do_while(block(vec![expr_stmt(postfix_inc(ident("n")))]), bool_lit(false)),
            expr_stmt(ident("n")),
        ])
        .await,
        Value::from(1)
    );
}

#[tokio::test]
async fn test_continue_in_for_runs_update() {
    assert_eq!(
        run_both(vec![
            let_("n", num(0.0)),
            for_(
                Some(let_("i", num(0.0))),
                Some(lt(ident("i"), num(5.0))),
                Some(postfix_inc(ident("i"))),
                block(vec![
                    if_(lt(ident("i"), num(3.0)), continue_(), None),
                    expr_stmt(postfix_inc(ident("n"))),
                ]),
            ),
            expr_stmt(ident("n")),
        ])
        .await,
        Value::from(2)
    );
}

#[test]
fn test_nested_break_leaves_inner_loop_only() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![
            let_("c", num(0.0)),
            for_(
                Some(let_("i", num(0.0))),
                Some(lt(ident("i"), num(3.0))),
                Some(postfix_inc(ident("i"))),
                block(vec![for_(
                    Some(let_("j", num(0.0))),
                    Some(lt(ident("j"), num(3.0))),
                    Some(postfix_inc(ident("j"))),
                    block(vec![
                        if_(eq(ident("j"), num(1.0)), break_(), None),
                        expr_stmt(postfix_inc(ident("c"))),
                    ]),
                )]),
            ),
        ],
    );
    let Ok(completion) = result else {
        panic!("run failed");
    };
    assert_eq!(var(&ctx, "c"), Value::from(3));
    assert_eq!(completion.info.max_loops, 2);
    assert!(completion.info.clear_to_label_calls >= 3);
}

#[tokio::test]
async fn test_for_of_with_continue_and_break() {
    assert_eq!(
        run_both(vec![
            let_("sum", num(0.0)),
            for_of(
                ForVarBinding::Const,
                "x",
                array(vec![num(1.0), num(2.0), num(3.0), num(4.0), num(5.0)]),
                block(vec![
                    if_(eq(ident("x"), num(2.0)), continue_(), None),
                    if_(eq(ident("x"), num(5.0)), break_(), None),
                    expr_stmt(assign_op(AssignmentOp::AddAssign, ident("sum"), ident("x"))),
                ]),
            ),
            expr_stmt(ident("sum")),
        ])
        .await,
        Value::from(8)
    );
}

#[tokio::test]
async fn test_nested_loops_break_and_continue_in_both_modes() {
    let inner = |exit: Statement| {
        for_(
            Some(let_("j", num(0.0))),
            Some(lt(ident("j"), num(3.0))),
            Some(postfix_inc(ident("j"))),
            block(vec![
                if_(eq(ident("j"), num(1.0)), exit, None),
                expr_stmt(postfix_inc(ident("c"))),
            ]),
        )
    };
    let program = |exit: Statement| {
        vec![
            let_("c", num(0.0)),
            let_("outer", num(0.0)),
            for_(
                Some(let_("i", num(0.0))),
                Some(lt(ident("i"), num(3.0))),
                Some(postfix_inc(ident("i"))),
                block(vec![inner(exit), expr_stmt(postfix_inc(ident("outer")))]),
            ),
        ]
    };
    let (broken, vars) = run_both_watching(program(break_()), &["c", "outer"]).await;
    assert!(broken.is_ok());
    assert_eq!(vars, vec![Value::from(3), Value::from(3)]);
    let (continued, vars) = run_both_watching(program(continue_()), &["c", "outer"]).await;
    assert!(continued.is_ok());
    assert_eq!(vars, vec![Value::from(6), Value::from(3)]);
}

#[test]
fn test_for_of_assigns_existing_binding() {
    assert_eq!(
        run_sync(vec![
            let_pattern(pat("last"), None),
            for_of(
                ForVarBinding::None,
                "last",
                array(vec![num(1.0), num(2.0), num(3.0)]),
                block(vec![]),
            ),
            expr_stmt(ident("last")),
        ]),
        Value::from(3)
    );
}

#[test]
fn test_for_of_over_string() {
    assert_eq!(
        run_sync(vec![
            let_("out", str_lit("")),
            for_of(
                ForVarBinding::Let,
                "ch",
                str_lit("abc"),
                expr_stmt(assign(ident("out"), add(ident("ch"), ident("out")))),
            ),
            expr_stmt(ident("out")),
        ]),
        Value::from("cba")
    );
}

#[test]
fn test_for_of_non_iterable_is_type_error() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![for_of(ForVarBinding::Const, "x", num(1.0), block(vec![]))],
    );
    let Err(err) = result else {
        panic!("expected an error");
    };
    assert!(matches!(err.root_cause(), EngineError::TypeError { .. }));
    assert!(matches!(err, EngineError::StatementExecution { statement: "ForOfStatement", .. }));
}

#[test]
fn test_break_outside_loop_is_an_error() {
    let ctx = EvaluationContext::new();
    assert!(throws(try_sync(&ctx, vec![break_()]), "Illegal break"));
    assert!(throws(try_sync(&ctx, vec![continue_()]), "Illegal continue"));
}

#[test]
fn test_return_at_top_level_stops_the_run() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![
            let_("a", num(1.0)),
            return_(str_lit("done")),
            expr_stmt(assign(ident("a"), num(2.0))),
        ],
    );
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from("done")));
    assert_eq!(var(&ctx, "a"), Value::from(1));
}
