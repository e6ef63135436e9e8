//! Modules, script entry points and value bindings

use super::{throws, TableParser};
use ksx::builder::*;
use ksx::prelude::{Cell, Rc};
use ksx::{
    EngineError, EvaluationContext, JsFunction, JsObject, MapModuleResolver, ParseErrorCode, Value,
};

fn lib_parser() -> TableParser {
    TableParser::new()
        .script(
            "lib-src",
            vec![
                export_const("answer", num(21.0)),
                let_("hidden", num(1.0)),
                export_function("twice", vec!["x"], vec![return_(mul(ident("x"), num(2.0)))]),
            ],
        )
        .script(
            "main-src",
            vec![
                import(vec![("answer", None), ("twice", None)], "lib"),
                expr_stmt(call(ident("twice"), vec![ident("answer")])),
            ],
        )
}

fn module_context(parser: TableParser, resolver: MapModuleResolver) -> EvaluationContext {
    EvaluationContext::builder()
        .parser(parser)
        .module_resolver(resolver)
        .build()
}

fn module_error_codes(result: Result<ksx::Completion, EngineError>, module: &str) -> Vec<ParseErrorCode> {
    match result {
        Err(EngineError::ModuleErrors(errors)) => errors
            .get(module)
            .map(|list| list.iter().map(|e| e.code).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_run_module_with_imports() {
    let ctx = module_context(lib_parser(), MapModuleResolver::new().with_module("lib", "lib-src"));
    let result = ksx::run_module(&ctx, "main", "main-src").await;
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(42)));
}

#[tokio::test]
async fn test_import_alias() {
    let parser = lib_parser().script(
        "alias-src",
        vec![
            import(vec![("answer", Some("a"))], "lib"),
            expr_stmt(add(ident("a"), num(1.0))),
        ],
    );
    let ctx = module_context(parser, MapModuleResolver::new().with_module("lib", "lib-src"));
    let result = ksx::run_module(&ctx, "main", "alias-src").await;
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(22)));
}

#[tokio::test]
async fn test_imported_binding_is_const() {
    let parser = lib_parser().script(
        "assign-src",
        vec![
            import(vec![("answer", None)], "lib"),
            expr_stmt(assign(ident("answer"), num(0.0))),
        ],
    );
    let ctx = module_context(parser, MapModuleResolver::new().with_module("lib", "lib-src"));
    let result = ksx::run_module(&ctx, "main", "assign-src").await;
    assert!(result.is_err_and(|e| matches!(e.root_cause(), EngineError::TypeError { .. })));
}

#[tokio::test]
async fn test_shared_import_runs_once() {
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let globals = JsObject::from_pairs([(
        "hit",
        Value::Function(JsFunction::native("hit", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(Value::Undefined)
        })),
    )]);
    let parser = TableParser::new()
        .script(
            "base-src",
            vec![expr_stmt(call(ident("hit"), vec![])), export_const("one", num(1.0))],
        )
        .script(
            "util-src",
            vec![
                import(vec![("one", None)], "base"),
                export_const("two", add(ident("one"), num(1.0))),
            ],
        )
        .script(
            "main-src",
            vec![
                import(vec![("one", None)], "base"),
                import(vec![("two", None)], "util"),
                expr_stmt(add(ident("one"), ident("two"))),
            ],
        );
    let resolver = MapModuleResolver::new()
        .with_module("base", "base-src")
        .with_module("util", "util-src");
    let ctx = EvaluationContext::builder()
        .globals(globals)
        .parser(parser)
        .module_resolver(resolver)
        .build();
    let result = ksx::run_module(&ctx, "main", "main-src").await;
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(3)));
    assert_eq!(hits.get(), 1);
}

// -----------------------------------------------------------------------------
// Module errors
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_module() {
    let parser = TableParser::new().script("main-src", vec![import(vec![("x", None)], "nowhere")]);
    let ctx = module_context(parser, MapModuleResolver::new());
    let result = ksx::run_module(&ctx, "main", "main-src").await;
    assert_eq!(module_error_codes(result, "main"), vec![ParseErrorCode::ModuleNotFound]);
}

#[tokio::test]
async fn test_circular_import() {
    let parser = TableParser::new()
        .script(
            "a-src",
            vec![import(vec![("b", None)], "b"), export_const("a", num(1.0))],
        )
        .script(
            "b-src",
            vec![import(vec![("a", None)], "a"), export_const("b", num(2.0))],
        );
    let resolver = MapModuleResolver::new()
        .with_module("a", "a-src")
        .with_module("b", "b-src");
    let ctx = module_context(parser, resolver);
    let result = ksx::run_module(&ctx, "a", "a-src").await;
    assert_eq!(module_error_codes(result, "b"), vec![ParseErrorCode::CircularImport]);
}

#[tokio::test]
async fn test_missing_export() {
    let parser = lib_parser().script("bad-src", vec![import(vec![("hidden", None)], "lib")]);
    let ctx = module_context(parser, MapModuleResolver::new().with_module("lib", "lib-src"));
    let result = ksx::run_module(&ctx, "main", "bad-src").await;
    assert_eq!(module_error_codes(result, "main"), vec![ParseErrorCode::ExportNotFound]);
}

#[tokio::test]
async fn test_duplicate_import_name() {
    let parser = lib_parser().script(
        "dup-src",
        vec![
            import(vec![("answer", None)], "lib"),
            import(vec![("twice", Some("answer"))], "lib"),
        ],
    );
    let ctx = module_context(parser, MapModuleResolver::new().with_module("lib", "lib-src"));
    let result = ksx::run_module(&ctx, "main", "dup-src").await;
    assert_eq!(module_error_codes(result, "main"), vec![ParseErrorCode::DuplicateImport]);
}

#[tokio::test]
async fn test_parse_errors_are_collected_per_module() {
    let parser = TableParser::new().script("main-src", vec![import(vec![("x", None)], "broken")]);
    let resolver = MapModuleResolver::new().with_module("broken", "not parseable");
    let ctx = module_context(parser, resolver);
    let result = ksx::run_module(&ctx, "main", "main-src").await;
    assert_eq!(module_error_codes(result, "broken"), vec![ParseErrorCode::UnexpectedToken]);
}

#[tokio::test]
async fn test_run_module_requires_resolver() {
    let ctx = EvaluationContext::builder().parser(lib_parser()).build();
    assert!(throws(ksx::run_module(&ctx, "main", "main-src").await, "resolver"));
}

// -----------------------------------------------------------------------------
// Scripts and bindings
// -----------------------------------------------------------------------------

#[test]
fn test_run_script_sync() {
    let parser = TableParser::new().script("1 + 2", vec![expr_stmt(add(num(1.0), num(2.0)))]);
    let ctx = EvaluationContext::builder().parser(parser).build();
    let result = ksx::run_script_sync(&ctx, "1 + 2");
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from(3)));
}

#[tokio::test]
async fn test_run_script_async() {
    let parser = TableParser::new().script("'a' + 'b'", vec![expr_stmt(add(str_lit("a"), str_lit("b")))]);
    let ctx = EvaluationContext::builder().parser(parser).build();
    let result = ksx::run_script_async(&ctx, "'a' + 'b'").await;
    assert_eq!(result.ok().map(|c| c.value), Some(Value::from("ab")));
}

#[test]
fn test_script_parse_error() {
    let ctx = EvaluationContext::builder().parser(TableParser::new()).build();
    let result = ksx::run_script_sync(&ctx, "let = ;");
    let Err(EngineError::Parse(errors)) = result else {
        panic!("expected a parse error");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors.iter().all(|e| e.code == ParseErrorCode::UnexpectedToken));
}

#[test]
fn test_script_without_parser() {
    let ctx = EvaluationContext::new();
    assert!(throws(ksx::run_script_sync(&ctx, "1"), "No parser configured"));
}

#[test]
fn test_evaluate_binding_reads_local_context() {
    let parser = TableParser::new().expression("count + 1", add(ident("count"), num(1.0)));
    let ctx = EvaluationContext::builder()
        .parser(parser)
        .local_context(JsObject::from_pairs([("count", Value::from(2))]))
        .build();
    assert_eq!(ksx::evaluate_binding(&ctx, "count + 1").ok(), Some(Value::from(3)));
}
