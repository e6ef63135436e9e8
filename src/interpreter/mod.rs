//! Queue-driven statement and expression engine
//!
//! Statements run off a labeled queue ([`queue`]) on logical threads
//! ([`scope`]). The sync and async processors share every control-flow
//! decision through [`process_common`] and differ only in how they evaluate
//! expressions and whether they may await.

pub mod arrow;
pub mod context;
pub mod declarations;
pub mod eval_async;
pub mod eval_common;
pub mod eval_sync;
pub mod module;
pub mod operators;
pub mod process_async;
pub mod process_common;
pub mod process_sync;
pub mod queue;
pub mod scope;

pub use context::{EvalOptions, EvaluationContext, EvaluationContextBuilder, Place};
pub use eval_async::{deep_resolve, evaluate_async};
pub use eval_sync::evaluate_sync;
pub use module::{execute_module, parse_module, KsxModule};
pub use process_async::process_statements_async;
pub use process_common::QueueInfo;
pub use process_sync::process_statements;
pub use queue::{ClearTarget, ProcessOutcome, QueueItem, StatementQueue};
pub use scope::{BlockRef, BlockScope, LogicalThread, ThreadRef};
