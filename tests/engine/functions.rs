//! Function declarations, arrow closures and host function calls

use super::{context_with, run_sync, throws, try_sync, var};
use ksx::ast::BinaryOp;
use ksx::builder::*;
use ksx::value::NativeKind;
use ksx::{BannedFunctions, EngineError, EvaluationContext, JsFunction, JsObject, Value};

/// Call a host-visible function value from a sync host function
fn call_host(function: Option<&Value>, args: Vec<Value>) -> Result<Value, EngineError> {
    let Some(Value::Function(JsFunction::Native(native))) = function else {
        return Err(EngineError::type_error("callback is not a host function"));
    };
    match &native.kind {
        NativeKind::Sync(body) => body(&Value::Undefined, args),
        NativeKind::Async(_) => Err(EngineError::type_error("callback is async")),
    }
}

#[test]
fn test_function_call() {
    assert_eq!(
        run_sync(vec![
            function("add", vec!["a", "b"], vec![return_(add(ident("a"), ident("b")))]),
            expr_stmt(call(ident("add"), vec![num(2.0), num(3.0)])),
        ]),
        Value::from(5)
    );
}

#[test]
fn test_function_is_hoisted() {
    assert_eq!(
        run_sync(vec![
            let_("r", call(ident("g"), vec![])),
            function("g", vec![], vec![return_(num(7.0))]),
            expr_stmt(ident("r")),
        ]),
        Value::from(7)
    );
}

#[test]
fn test_recursion() {
    assert_eq!(
        run_sync(vec![
            function(
                "fact",
                vec!["n"],
                vec![
                    if_(binary(BinaryOp::LtEq, ident("n"), num(1.0)), return_(num(1.0)), None),
                    return_(mul(
                        ident("n"),
                        call(ident("fact"), vec![sub(ident("n"), num(1.0))]),
                    )),
                ],
            ),
            expr_stmt(call(ident("fact"), vec![num(5.0)])),
        ]),
        Value::from(120)
    );
}

#[test]
fn test_closure_keeps_captured_block() {
    assert_eq!(
        run_sync(vec![
            function(
                "makeCounter",
                vec![],
                vec![
                    let_("n", num(0.0)),
                    return_(arrow(
                        vec![],
                        block(vec![expr_stmt(postfix_inc(ident("n"))), return_(ident("n"))]),
                    )),
                ],
            ),
            const_("c", call(ident("makeCounter"), vec![])),
            expr_stmt(call(ident("c"), vec![])),
            expr_stmt(call(ident("c"), vec![])),
        ]),
        Value::from(2)
    );
}

#[test]
fn test_arrow_expression_body() {
    assert_eq!(
        run_sync(vec![
            const_("double", arrow(vec!["x"], expr_stmt(mul(ident("x"), num(2.0))))),
            expr_stmt(call(ident("double"), vec![num(21.0)])),
        ]),
        Value::from(42)
    );
}

#[test]
fn test_missing_arguments_are_undefined() {
    assert_eq!(
        run_sync(vec![
            function("second", vec!["a", "b"], vec![return_(ident("b"))]),
            expr_stmt(call(ident("second"), vec![num(1.0)])),
        ]),
        Value::Undefined
    );
}

#[test]
fn test_extra_arguments_are_still_evaluated() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![
            let_("i", num(0.0)),
            function("first", vec!["a"], vec![return_(ident("a"))]),
            expr_stmt(call(ident("first"), vec![num(1.0), postfix_inc(ident("i"))])),
        ],
    );
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(1)));
    assert_eq!(var(&ctx, "i"), Value::from(1));
}

#[test]
fn test_arguments_evaluate_in_caller_scope() {
    assert_eq!(
        run_sync(vec![
            let_("x", num(1.0)),
            function(
                "f",
                vec!["a"],
                vec![let_("x", num(100.0)), return_(ident("a"))],
            ),
            expr_stmt(call(ident("f"), vec![ident("x")])),
        ]),
        Value::from(1)
    );
}

#[test]
fn test_spread_arguments() {
    assert_eq!(
        run_sync(vec![
            function("add3", vec!["a", "b", "c"], vec![return_(add(add(ident("a"), ident("b")), ident("c")))]),
            expr_stmt(call(
                ident("add3"),
                vec![num(1.0), spread(array(vec![num(2.0), num(3.0)]))],
            )),
        ]),
        Value::from(6)
    );
}

#[test]
fn test_child_threads_are_detached() {
    let ctx = EvaluationContext::new();
    let result = try_sync(
        &ctx,
        vec![
            function("fail", vec![], vec![throw(str_lit("no"))]),
            function("ok", vec![], vec![return_(num(1.0))]),
            expr_stmt(call(ident("ok"), vec![])),
            try_(
                vec![expr_stmt(call(ident("fail"), vec![]))],
                Some((None, vec![])),
                None,
            ),
        ],
    );
    assert!(result.is_ok());
    let thread = ctx.ensure_main_thread();
    assert!(thread.borrow().child_threads.is_empty());
}

#[test]
fn test_calling_a_non_function_is_type_error() {
    let ctx = EvaluationContext::new();
    let result = try_sync(&ctx, vec![let_("x", num(1.0)), expr_stmt(call(ident("x"), vec![]))]);
    let Err(err) = result else {
        panic!("expected an error");
    };
    assert!(matches!(err.root_cause(), EngineError::TypeError { .. }));
    assert!(err.to_string().contains("is not a function"));
}

// -----------------------------------------------------------------------------
// Host functions
// -----------------------------------------------------------------------------

#[test]
fn test_unqualified_call_receives_local_context() {
    let local = JsObject::from_pairs([("tag", Value::from("local"))]);
    let globals = JsObject::from_pairs([(
        "whoami",
        Value::Function(JsFunction::native("whoami", |this, _| {
            ksx::value::get_property(this, "tag", true)
        })),
    )]);
    let ctx = EvaluationContext::builder()
        .local_context(local)
        .globals(globals)
        .build();
    let result = try_sync(&ctx, vec![expr_stmt(call(ident("whoami"), vec![]))]);
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from("local")));
}

#[test]
fn test_arrow_passed_to_host_function() {
    let ctx = context_with(vec![(
        "apply",
        Value::Function(JsFunction::native("apply", |_, args| {
            let input = args.get(1).cloned().unwrap_or_default();
            call_host(args.first(), vec![input])
        })),
    )]);
    let result = try_sync(
        &ctx,
        vec![
            let_("offset", num(10.0)),
            expr_stmt(call(
                ident("apply"),
                vec![arrow(vec!["v"], expr_stmt(add(ident("v"), ident("offset")))), num(5.0)],
            )),
        ],
    );
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(15)));
}

#[test]
fn test_arrow_statement_receives_event_args() {
    let ctx = EvaluationContext::builder()
        .event_args(vec![Value::from(3), Value::from(4)])
        .build();
    let result = try_sync(
        &ctx,
        vec![arrow_stmt(vec!["a", "b"], expr_stmt(mul(ident("a"), ident("b"))))],
    );
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(12)));
}

#[test]
fn test_banned_function_is_rejected() {
    let globals = JsObject::from_pairs([(
        "danger",
        Value::Function(JsFunction::native("danger", |_, _| Ok(Value::Null))),
    )]);
    let ctx = EvaluationContext::builder()
        .globals(globals)
        .capability_gate(BannedFunctions::new().ban("danger", "Use safe() instead."))
        .build();
    let result = try_sync(&ctx, vec![expr_stmt(call(ident("danger"), vec![]))]);
    let Err(err) = result else {
        panic!("expected the call to be banned");
    };
    assert!(err.is_capability_error());
    assert!(matches!(err.root_cause(), EngineError::Banned { .. }));
    assert!(err.to_string().contains("Use safe() instead."));
}

#[test]
fn test_banned_call_never_runs_the_function() {
    let globals = JsObject::from_pairs([(
        "danger",
        Value::Function(JsFunction::native("danger", |_, _| Err(EngineError::runtime("ran")))),
    )]);
    let ctx = EvaluationContext::builder()
        .globals(globals)
        .capability_gate(BannedFunctions::new().ban("danger", ""))
        .build();
    assert!(!throws(
        try_sync(&ctx, vec![expr_stmt(call(ident("danger"), vec![]))]),
        "ran"
    ));
}
