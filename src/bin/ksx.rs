//! CLI tool for running pre-parsed KSX statement lists
//!
//! Usage: ksx [options] <statements.json>
//!
//! Options:
//!   --timeout <ms>         Sync time budget in milliseconds, 0 for unlimited (default: 1000)
//!   --async                Run with the async processor
//!   --yield-interval <n>   Statements between yields in async mode (default: 1000)
//!   --options <file>       Evaluation options as JSON
//!   --context <file>       Local context object as JSON
//!   --stats                Print queue statistics to stderr
//!
//! The input file holds a JSON array of statements. `print(...)` writes its
//! arguments to stdout; in async mode `sleep(ms)` resolves after a delay.
//! Logging is controlled with `RUST_LOG` (default: warn).

use ksx::ast::Statement;
use ksx::prelude::Rc;
use ksx::{run_async, run_sync, Completion, EvalOptions, EvaluationContext, JsFunction, JsObject, Value};
use std::env;
use std::fs;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// CLI configuration
struct Config {
    input: String,
    timeout_ms: Option<u64>,
    yield_interval: Option<usize>,
    options_path: Option<String>,
    context_path: Option<String>,
    run_async: bool,
    stats: bool,
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map_or("ksx", |s| s.as_str());

    let mut config = Config {
        input: String::new(),
        timeout_ms: None,
        yield_interval: None,
        options_path: None,
        context_path: None,
        run_async: false,
        stats: false,
    };
    let mut input: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        let Some(arg) = args.get(i) else {
            break;
        };
        match arg.as_str() {
            "--timeout" => {
                i += 1;
                config.timeout_ms = Some(
                    args.get(i)
                        .ok_or_else(|| "--timeout requires a value".to_string())?
                        .parse::<u64>()
                        .map_err(|_| "--timeout must be a non-negative integer".to_string())?,
                );
            }
            "--yield-interval" => {
                i += 1;
                config.yield_interval = Some(
                    args.get(i)
                        .ok_or_else(|| "--yield-interval requires a value".to_string())?
                        .parse::<usize>()
                        .map_err(|_| "--yield-interval must be a non-negative integer".to_string())?,
                );
            }
            "--options" => {
                i += 1;
                config.options_path = Some(
                    args.get(i)
                        .ok_or_else(|| "--options requires a file".to_string())?
                        .clone(),
                );
            }
            "--context" => {
                i += 1;
                config.context_path = Some(
                    args.get(i)
                        .ok_or_else(|| "--context requires a file".to_string())?
                        .clone(),
                );
            }
            "--async" => config.run_async = true,
            "--stats" => config.stats = true,
            other if other.starts_with('-') => return Err(format!("Unknown option: {}", other)),
            other => input = Some(other),
        }
        i += 1;
    }

    config.input = input
        .ok_or_else(|| {
            format!(
                "Usage: {} [--timeout <ms>] [--async] [--yield-interval <n>] [--options <file>] [--context <file>] [--stats] <statements.json>",
                program_name
            )
        })?
        .to_string();
    Ok(config)
}

fn load_options(config: &Config) -> Result<EvalOptions, Box<dyn std::error::Error>> {
    let mut options = match &config.options_path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path, e))?;
            EvalOptions::from_json_str(&text)?
        }
        None => EvalOptions::default(),
    };
    if let Some(timeout_ms) = config.timeout_ms {
        options.sync_timeout_ms = timeout_ms;
    }
    if let Some(yield_interval) = config.yield_interval {
        options.yield_interval = yield_interval;
    }
    Ok(options)
}

fn load_context(path: &str) -> Result<JsObject, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path, e))?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    match Value::from_json(&json) {
        Value::Object(object) => Ok(object),
        _ => Err(format!("{} must contain a JSON object", path).into()),
    }
}

fn host_globals() -> JsObject {
    let globals = JsObject::new();
    globals.set(
        "print",
        Value::Function(JsFunction::native("print", |_, args| {
            let line = args
                .iter()
                .map(|arg| arg.to_display_string())
                .collect::<Vec<_>>()
                .join(" ");
            println!("{}", line);
            Ok(Value::Undefined)
        })),
    );
    globals.set(
        "sleep",
        Value::Function(JsFunction::native_async("sleep", |_, args| async move {
            let ms = args.first().map_or(0.0, |v| v.to_number()).max(0.0);
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
            Ok(Value::Undefined)
        })),
    );
    globals
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = parse_args()?;
    let text = fs::read_to_string(&config.input)
        .map_err(|e| format!("Cannot read {}: {}", config.input, e))?;
    let statements: Vec<Statement> =
        serde_json::from_str(&text).map_err(|e| format!("Invalid statement list {}: {}", config.input, e))?;
    let statements: Vec<Rc<Statement>> = statements.into_iter().map(Rc::new).collect();

    let token = CancellationToken::new();
    let mut builder = EvaluationContext::builder()
        .options(load_options(&config)?)
        .globals(host_globals())
        .cancellation_token(token.clone());
    if let Some(path) = &config.context_path {
        builder = builder.local_context(load_context(path)?);
    }
    let ctx = builder.build();

    let start = Instant::now();
    let completion: Completion = if config.run_async {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(async {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            });
            run_async(&ctx, statements).await
        })?
    } else {
        run_sync(&ctx, statements)?
    };
    let elapsed = start.elapsed();

    if completion.value != Value::Undefined {
        println!("{}", serde_json::to_string(&completion.value.to_json()?)?);
    }
    if config.stats {
        eprintln!("{}", serde_json::to_string_pretty(&completion.info)?);
        eprintln!("elapsed: {:?}", elapsed);
    }
    Ok(())
}
