//! Switch statements: matching, fallthrough, break and continue

use super::{run_both, run_sync, try_async, try_sync};
use ksx::ast::{AssignmentOp, Expression};
use ksx::builder::*;
use ksx::{EvaluationContext, Value};

fn append(name: &str, text: &str) -> ksx::ast::Statement {
    expr_stmt(assign_op(AssignmentOp::AddAssign, ident(name), str_lit(text)))
}

async fn pick(discriminant: Expression) -> Value {
    run_both(vec![
        let_("r", str_lit("")),
        switch(
            discriminant,
            vec![
                case(num(1.0), vec![append("r", "one"), break_()]),
                case(num(2.0), vec![append("r", "two"), break_()]),
                default_case(vec![append("r", "other")]),
            ],
        ),
        expr_stmt(ident("r")),
    ])
    .await
}

#[tokio::test]
async fn test_switch_matches_case() {
    assert_eq!(pick(num(2.0)).await, Value::from("two"));
    assert_eq!(pick(num(1.0)).await, Value::from("one"));
}

#[tokio::test]
async fn test_switch_falls_back_to_default() {
    assert_eq!(pick(num(7.0)).await, Value::from("other"));
}

#[tokio::test]
async fn test_switch_uses_strict_equality() {
    assert_eq!(pick(str_lit("1")).await, Value::from("other"));
}

#[test]
fn test_switch_fallthrough() {
    assert_eq!(
        run_sync(vec![
            let_("r", str_lit("")),
            switch(
                num(1.0),
                vec![
                    case(num(1.0), vec![append("r", "a")]),
                    case(num(2.0), vec![append("r", "b"), break_()]),
                    case(num(3.0), vec![append("r", "c")]),
                ],
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from("ab")
    );
}

#[test]
fn test_switch_default_in_the_middle_falls_through() {
    assert_eq!(
        run_sync(vec![
            let_("r", str_lit("")),
            switch(
                num(9.0),
                vec![
                    case(num(1.0), vec![append("r", "1")]),
                    default_case(vec![append("r", "d")]),
                    case(num(2.0), vec![append("r", "2")]),
                ],
            ),
            expr_stmt(ident("r")),
        ]),
        Value::from("d2")
    );
}

#[tokio::test]
async fn test_switch_without_match_or_default() {
    // a leaked switch scope would make the loop's break target the switch
    let program = || {
        vec![
            let_("r", str_lit("unchanged")),
            let_("n", num(0.0)),
            while_(
                bool_lit(true),
                block(vec![
                    switch(num(5.0), vec![case(num(1.0), vec![append("r", "!")])]),
                    expr_stmt(postfix_inc(ident("n"))),
                    break_(),
                ]),
            ),
            expr_stmt(add(ident("r"), ident("n"))),
        ]
    };
    let ctx = EvaluationContext::new();
    let Ok(completion) = try_sync(&ctx, program()) else {
        panic!("sync run failed");
    };
    assert_eq!(completion.value, Value::from("unchanged1"));
    assert_eq!(completion.info.max_loops, 1);

    let ctx = EvaluationContext::new();
    let Ok(completion) = try_async(&ctx, program()).await else {
        panic!("async run failed");
    };
    assert_eq!(completion.value, Value::from("unchanged1"));
    assert_eq!(completion.info.max_loops, 1);
}

#[test]
fn test_matched_switch_scope_counts_as_loop() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![
            let_("r", str_lit("")),
            switch(num(1.0), vec![case(num(1.0), vec![append("r", "one")])]),
            expr_stmt(ident("r")),
        ],
    );
    let Ok(completion) = result else {
        panic!("run failed");
    };
    assert_eq!(completion.value, Value::from("one"));
    assert_eq!(completion.info.max_loops, 1);
    let thread = ctx.ensure_main_thread();
    assert!(thread.borrow().loops.is_empty());
}

#[test]
fn test_break_in_switch_stays_in_loop() {
    assert_eq!(
        run_sync(vec![
            let_("i", num(0.0)),
            let_("n", num(0.0)),
            while_(
                lt(ident("i"), num(3.0)),
                block(vec![
                    expr_stmt(postfix_inc(ident("i"))),
                    switch(ident("i"), vec![case(num(2.0), vec![break_()])]),
                    expr_stmt(postfix_inc(ident("n"))),
                ]),
            ),
            expr_stmt(ident("n")),
        ]),
        Value::from(3)
    );
}

#[test]
fn test_continue_in_switch_targets_enclosing_loop() {
    assert_eq!(
        run_sync(vec![
            let_("n", num(0.0)),
            for_(
                Some(let_("i", num(0.0))),
                Some(lt(ident("i"), num(3.0))),
                Some(postfix_inc(ident("i"))),
                block(vec![switch(
                    ident("i"),
                    vec![
                        case(num(1.0), vec![continue_()]),
                        default_case(vec![expr_stmt(postfix_inc(ident("n")))]),
                    ],
                )]),
            ),
            expr_stmt(ident("n")),
        ]),
        Value::from(2)
    );
}
