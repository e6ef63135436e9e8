//! Synchronous statement processor
//!
//! Drains a statement queue without ever awaiting. The whole run, including
//! nested arrow calls, shares one wall-clock budget checked before every item.

use super::arrow::{call_arrow_sync, ArrowArgs};
use super::context::EvaluationContext;
use super::eval_sync::evaluate_sync;
use super::process_common::{self as common, QueueInfo, QueueRun};
use super::queue::{ProcessOutcome, QueueItem};
use super::scope::ThreadRef;
use crate::ast::{Statement, VarDeclaration};
use crate::error::EngineError;
use crate::prelude::Rc;
use crate::value::{ArrowClosure, Value};

/// Run `statements` on `thread` until the queue drains
pub fn process_statements(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statements: Vec<Rc<Statement>>,
) -> Result<QueueInfo, EngineError> {
    let _clock = ctx.enter_sync_run();
    let mut run = QueueRun::start(ctx, thread, statements)?;
    let result = loop {
        let Some(item) = run.next(thread) else {
            break Ok(());
        };
        if let Err(err) = ctx.check_sync_timeout() {
            break Err(err);
        }
        let outcome = match process_item(ctx, thread, &item) {
            Ok(outcome) => Ok(outcome),
            Err(err) => common::recover(thread, err, &item.statement),
        };
        if let Err(err) = outcome.and_then(|outcome| run.apply(thread, outcome)) {
            break Err(err);
        }
    };
    run.finish(thread, result)
}

fn declare_all(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    declarations: &[VarDeclaration],
    is_const: bool,
) -> Result<ProcessOutcome, EngineError> {
    for decl in declarations {
        let value = match &decl.init {
            Some(init) => evaluate_sync(ctx, thread, init)?,
            None => Value::Undefined,
        };
        common::declare(thread, &decl.pattern, value, is_const)?;
    }
    Ok(ProcessOutcome::none())
}

fn process_item(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    item: &QueueItem,
) -> Result<ProcessOutcome, EngineError> {
    let statement = &item.statement;
    match statement.as_ref() {
        Statement::Empty(empty) => Ok(common::process_empty(thread, empty)),
        Statement::Expression(expr) => {
            let value = evaluate_sync(ctx, thread, &expr.expression)?;
            common::set_block_value(thread, value)?;
            Ok(ProcessOutcome::none())
        }
        Statement::ArrowExpression(arrow) => {
            let closure = ArrowClosure {
                expr: arrow.expression.clone(),
                closures: thread.borrow().obtain_closures(),
            };
            let value = call_arrow_sync(ctx, thread, &closure, ArrowArgs::Values(ctx.event_args()))?;
            common::set_block_value(thread, value)?;
            Ok(ProcessOutcome::none())
        }
        Statement::Let(stmt) => declare_all(ctx, thread, &stmt.declarations, false),
        Statement::Const(stmt) => declare_all(ctx, thread, &stmt.declarations, true),
        Statement::Function(_) | Statement::Import(_) => Ok(ProcessOutcome::none()),
        Statement::Block(block) => common::enter_block(ctx, thread, block),
        Statement::If(stmt) => {
            let condition = evaluate_sync(ctx, thread, &stmt.condition)?.to_boolean();
            let branch = if condition {
                Some(&stmt.then_branch)
            } else {
                stmt.else_branch.as_ref()
            };
            Ok(common::branch(ctx, branch))
        }
        Statement::Switch(switch) => {
            if item.guard {
                return Ok(common::leave_switch(thread));
            }
            let discriminant = evaluate_sync(ctx, thread, &switch.discriminant)?;
            let mut matched = None;
            for (index, case) in switch.cases.iter().enumerate() {
                if let Some(test) = &case.test {
                    if evaluate_sync(ctx, thread, test)?.strict_equals(&discriminant) {
                        matched = Some(index);
                        break;
                    }
                }
            }
            let matched = matched.or_else(|| switch.cases.iter().position(|case| case.test.is_none()));
            match matched {
                Some(index) => common::enter_switch(ctx, thread, statement, switch, index),
                None => Ok(ProcessOutcome::none()),
            }
        }
        Statement::While(stmt) => {
            let condition = evaluate_sync(ctx, thread, &stmt.condition)?.to_boolean();
            if item.guard {
                Ok(common::loop_guard(ctx, thread, statement, &stmt.body, condition))
            } else if condition {
                Ok(common::enter_loop(ctx, thread, statement, &stmt.body))
            } else {
                Ok(ProcessOutcome::none())
            }
        }
        Statement::DoWhile(stmt) => {
            if !item.guard {
                return Ok(common::enter_loop(ctx, thread, statement, &stmt.body));
            }
            let condition = evaluate_sync(ctx, thread, &stmt.condition)?.to_boolean();
            Ok(common::loop_guard(ctx, thread, statement, &stmt.body, condition))
        }
        Statement::For(stmt) => {
            if !item.guard {
                return Ok(common::enter_for(ctx, thread, statement, stmt));
            }
            let condition = match &stmt.condition {
                Some(condition) => evaluate_sync(ctx, thread, condition)?.to_boolean(),
                None => true,
            };
            Ok(common::for_guard(ctx, thread, statement, stmt, condition))
        }
        Statement::ForIn(stmt) => {
            if item.guard {
                return common::for_each_step(ctx, thread, statement, stmt.binding, &stmt.id, &stmt.body);
            }
            let value = evaluate_sync(ctx, thread, &stmt.expression)?;
            match common::for_in_iteration(&value) {
                Some(iteration) => common::enter_for_each(
                    ctx,
                    thread,
                    statement,
                    iteration,
                    stmt.binding,
                    &stmt.id,
                    &stmt.body,
                ),
                None => Ok(ProcessOutcome::none()),
            }
        }
        Statement::ForOf(stmt) => {
            if item.guard {
                return common::for_each_step(ctx, thread, statement, stmt.binding, &stmt.id, &stmt.body);
            }
            let value = evaluate_sync(ctx, thread, &stmt.expression)?;
            let iteration = common::for_of_iteration(&value)?;
            common::enter_for_each(ctx, thread, statement, iteration, stmt.binding, &stmt.id, &stmt.body)
        }
        Statement::Try(stmt) => {
            if item.guard {
                common::try_guard(ctx, thread, statement, stmt)
            } else {
                common::enter_try(ctx, thread, statement, stmt)
            }
        }
        Statement::Return(stmt) => {
            let value = match &stmt.expression {
                Some(expr) => evaluate_sync(ctx, thread, expr)?,
                None => Value::Undefined,
            };
            Ok(common::return_from(thread, Some(value)))
        }
        Statement::Break(_) => common::break_from(thread),
        Statement::Continue(_) => common::continue_from(thread),
        Statement::Throw(stmt) => Err(EngineError::thrown(evaluate_sync(ctx, thread, &stmt.expression)?)),
    }
}
