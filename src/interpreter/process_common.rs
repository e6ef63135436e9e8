//! Statement handling shared by the sync and async processors
//!
//! Everything here is mode-independent: the processors evaluate the
//! expressions a statement needs and hand the values to these helpers, which
//! update the thread's scope stacks and describe the queue mutation as a
//! [`ProcessOutcome`].

use super::context::EvaluationContext;
use super::declarations::{bind_pattern, hoist_functions, BindMode};
use super::queue::{ClearTarget, ProcessOutcome, QueueItem, StatementQueue};
use super::scope::{
    BlockRef, ExitType, LogicalThread, LoopIteration, LoopScope, ThreadRef, TryPhase, TryScope,
};
use crate::ast::{
    BindingPattern, BlockStatement, EmptyStatement, ExpressionStatement, ForStatement, ForVarBinding,
    Statement, SwitchStatement, TryStatement,
};
use crate::error::EngineError;
use crate::prelude::Rc;
use crate::value::{JsString, Value};
use serde::Serialize;
use tracing::{debug, trace, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Queue runs
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters collected while draining one queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub processed_statements: usize,
    pub max_queue_length: usize,
    pub unshifted_items: usize,
    pub clear_to_label_calls: usize,
    pub max_blocks: usize,
    pub max_loops: usize,
    pub cancelled: bool,
}

/// One drain of a statement queue on a thread
pub(crate) struct QueueRun {
    queue: StatementQueue,
    pub info: QueueInfo,
    depths: (usize, usize, usize),
}

impl QueueRun {
    /// Seed the queue with `statements`, hoisting their function
    /// declarations into the thread's top block
    pub fn start(
        ctx: &EvaluationContext,
        thread: &ThreadRef,
        statements: Vec<Rc<Statement>>,
    ) -> Result<Self, EngineError> {
        let (depths, top, closures) = {
            let t = thread.borrow();
            (t.depths(), t.top_block()?, t.obtain_closures())
        };
        hoist_functions(&top, &statements, &closures)?;
        let mut queue = StatementQueue::new();
        for statement in statements {
            queue.push(ctx.queue_item(statement, false));
        }
        let info = QueueInfo {
            max_queue_length: queue.len(),
            ..QueueInfo::default()
        };
        debug!(queued = queue.len(), "statement queue started");
        Ok(QueueRun { queue, info, depths })
    }

    /// Dequeue the next item and record the label following it on the thread
    pub fn next(&mut self, thread: &ThreadRef) -> Option<QueueItem> {
        let item = self.queue.dequeue()?;
        thread.borrow_mut().break_label_value = self.queue.next_label();
        self.info.processed_statements += 1;
        trace!(
            label = item.label,
            kind = item.statement.kind_name(),
            guard = item.guard,
            "processing statement"
        );
        Some(item)
    }

    /// Apply a statement's outcome: unshift first, then clear. A clear
    /// target that is no longer queued means the scope state is corrupt.
    pub fn apply(&mut self, thread: &ThreadRef, outcome: ProcessOutcome) -> Result<(), EngineError> {
        if !outcome.to_unshift.is_empty() {
            self.info.unshifted_items += outcome.to_unshift.len();
            self.queue.unshift(outcome.to_unshift);
        }
        if let Some(target) = outcome.clear_to_label {
            self.info.clear_to_label_calls += 1;
            if !self.queue.clear_to_label(target) {
                return Err(EngineError::internal_error(format!(
                    "clear target {target:?} is not queued"
                )));
            }
        }
        self.info.max_queue_length = self.info.max_queue_length.max(self.queue.len());
        let t = thread.borrow();
        self.info.max_blocks = self.info.max_blocks.max(t.blocks.len());
        self.info.max_loops = self.info.max_loops.max(t.loops.len());
        Ok(())
    }

    /// Restore the thread's scope stacks and report the run
    pub fn finish(
        self,
        thread: &ThreadRef,
        result: Result<(), EngineError>,
    ) -> Result<QueueInfo, EngineError> {
        thread.borrow_mut().restore_depths(self.depths);
        match result {
            Ok(()) => {
                debug!(
                    processed = self.info.processed_statements,
                    max_queue = self.info.max_queue_length,
                    unshifted = self.info.unshifted_items,
                    cleared = self.info.clear_to_label_calls,
                    cancelled = self.info.cancelled,
                    "statement queue finished"
                );
                Ok(self.info)
            }
            Err(err) => {
                warn!(error = %err, "uncaught error ended statement queue");
                Err(err)
            }
        }
    }
}

/// Route an error raised by `statement` to the innermost try scope, or give
/// it back when nothing can catch it
pub(crate) fn recover(
    thread: &ThreadRef,
    err: EngineError,
    statement: &Statement,
) -> Result<ProcessOutcome, EngineError> {
    let err = err.at_statement(statement);
    if !err.is_catchable() {
        return Err(err);
    }
    let mut t = thread.borrow_mut();
    let Some(scope) = t.try_blocks.last_mut() else {
        return Err(err);
    };
    scope.error_source = Some(scope.phase);
    scope.error_to_throw = Some(err);
    scope.phase = TryPhase::Error;
    let (blocks, loops, label) = (scope.block_depth, scope.loop_depth, scope.try_label);
    t.unwind(blocks, loops);
    Ok(ProcessOutcome::clear_to(ClearTarget::Label(label)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Blocks and declarations
// ═══════════════════════════════════════════════════════════════════════════════

fn block_sentinel(ctx: &EvaluationContext) -> QueueItem {
    ctx.queue_item(
        Rc::new(Statement::Empty(EmptyStatement {
            remove_block_scope: true,
            ..EmptyStatement::default()
        })),
        false,
    )
}

/// Items for `statements` followed by the sentinel that pops their block
fn block_items(ctx: &EvaluationContext, statements: &[Rc<Statement>]) -> Vec<QueueItem> {
    let mut items: Vec<QueueItem> = statements
        .iter()
        .map(|statement| ctx.queue_item(statement.clone(), false))
        .collect();
    items.push(block_sentinel(ctx));
    items
}

/// Push a block scope with hoisted functions and return it
fn open_block(thread: &ThreadRef, statements: &[Rc<Statement>]) -> Result<BlockRef, EngineError> {
    let block = thread.borrow_mut().push_block();
    let closures = thread.borrow().obtain_closures();
    hoist_functions(&block, statements, &closures)?;
    Ok(block)
}

pub(crate) fn enter_block(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    block: &BlockStatement,
) -> Result<ProcessOutcome, EngineError> {
    open_block(thread, &block.statements)?;
    Ok(ProcessOutcome::unshift(block_items(ctx, &block.statements)))
}

pub(crate) fn process_empty(thread: &ThreadRef, empty: &EmptyStatement) -> ProcessOutcome {
    if empty.remove_block_scope {
        thread.borrow_mut().pop_block();
    }
    ProcessOutcome::none()
}

/// Record the value of an expression statement on the innermost block
pub(crate) fn set_block_value(thread: &ThreadRef, value: Value) -> Result<(), EngineError> {
    let block = thread.borrow().top_block()?;
    block.borrow_mut().return_value = Some(value);
    Ok(())
}

/// `let`/`const` binding into the innermost block
pub(crate) fn declare(
    thread: &ThreadRef,
    pattern: &BindingPattern,
    value: Value,
    is_const: bool,
) -> Result<(), EngineError> {
    let block = thread.borrow().top_block()?;
    bind_pattern(&block, pattern, value, BindMode::Declare { is_const })
}

pub(crate) fn branch(ctx: &EvaluationContext, statement: Option<&Rc<Statement>>) -> ProcessOutcome {
    match statement {
        Some(statement) => ProcessOutcome::unshift(vec![ctx.queue_item(statement.clone(), false)]),
        None => ProcessOutcome::none(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Abrupt completion
// ═══════════════════════════════════════════════════════════════════════════════

/// Hand an abrupt exit to the innermost try so its `finally` runs first
fn defer_to_try(thread: &mut LogicalThread, exit: ExitType) -> ProcessOutcome {
    let Some(scope) = thread.try_blocks.last_mut() else {
        return ProcessOutcome::clear_to(ClearTarget::All);
    };
    scope.exit_type = Some(exit);
    let (blocks, loops, label) = (scope.block_depth, scope.loop_depth, scope.try_label);
    thread.unwind(blocks, loops);
    ProcessOutcome::clear_to(ClearTarget::Label(label))
}

/// `return`: store the value (if any) and leave the thread's queue
pub(crate) fn return_from(thread: &ThreadRef, value: Option<Value>) -> ProcessOutcome {
    let mut t = thread.borrow_mut();
    if let Some(value) = value {
        t.return_value = Some(value);
    }
    if t.try_blocks.is_empty() {
        ProcessOutcome::clear_to(ClearTarget::All)
    } else {
        defer_to_try(&mut t, ExitType::Return)
    }
}

pub(crate) fn break_from(thread: &ThreadRef) -> Result<ProcessOutcome, EngineError> {
    let mut t = thread.borrow_mut();
    let scope = t
        .break_target()
        .and_then(|index| t.loops.get(index).cloned())
        .ok_or_else(|| EngineError::runtime("Illegal break statement"))?;
    if scope.try_block_depth < t.try_blocks.len() {
        return Ok(defer_to_try(&mut t, ExitType::Break));
    }
    if scope.is_switch {
        // the switch guard releases the scope
        return Ok(ProcessOutcome::clear_to(scope.break_label));
    }
    t.release_loop();
    Ok(ProcessOutcome::clear_to(scope.break_label))
}

pub(crate) fn continue_from(thread: &ThreadRef) -> Result<ProcessOutcome, EngineError> {
    let mut t = thread.borrow_mut();
    let (index, scope) = t
        .continue_target()
        .and_then(|index| t.loops.get(index).cloned().map(|scope| (index, scope)))
        .ok_or_else(|| EngineError::runtime("Illegal continue statement"))?;
    if scope.try_block_depth < t.try_blocks.len() {
        return Ok(defer_to_try(&mut t, ExitType::Continue));
    }
    t.loops.truncate(index + 1);
    t.blocks.truncate(scope.continue_block_depth);
    Ok(ProcessOutcome::clear_to(scope.continue_label))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loops
// ═══════════════════════════════════════════════════════════════════════════════

fn set_continue_label(thread: &ThreadRef, label: usize) {
    if let Some(scope) = thread.borrow_mut().loops.last_mut() {
        scope.continue_label = ClearTarget::Label(label);
    }
}

/// Run `body` once more, then re-guard `statement`
fn iterate(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    body: &Rc<Statement>,
) -> ProcessOutcome {
    let body = ctx.queue_item(body.clone(), false);
    let guard = ctx.queue_item(statement.clone(), true);
    set_continue_label(thread, guard.label);
    ProcessOutcome::unshift(vec![body, guard])
}

/// First pass of `while` (condition already true) and `do..while`
pub(crate) fn enter_loop(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    body: &Rc<Statement>,
) -> ProcessOutcome {
    {
        let mut t = thread.borrow_mut();
        let scope = LoopScope::new(&t, 0, false);
        t.loops.push(scope);
    }
    iterate(ctx, thread, statement, body)
}

/// Guard pass of `while`/`do..while`
pub(crate) fn loop_guard(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    body: &Rc<Statement>,
    condition: bool,
) -> ProcessOutcome {
    if condition {
        iterate(ctx, thread, statement, body)
    } else {
        thread.borrow_mut().release_loop();
        ProcessOutcome::none()
    }
}

/// First pass of `for`: open the loop scope and its declaration block, run
/// the initializer, then the guard
pub(crate) fn enter_for(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    for_stmt: &ForStatement,
) -> ProcessOutcome {
    {
        let mut t = thread.borrow_mut();
        let mut scope = LoopScope::new(&t, 1, false);
        scope.update = for_stmt.update.as_ref().map(|update| {
            Rc::new(Statement::Expression(ExpressionStatement {
                expression: update.clone(),
                span: update.span(),
            }))
        });
        t.loops.push(scope);
        t.push_block();
    }
    let mut items = Vec::with_capacity(2);
    if let Some(init) = &for_stmt.init {
        items.push(ctx.queue_item(init.clone(), false));
    }
    items.push(ctx.queue_item(statement.clone(), true));
    ProcessOutcome::unshift(items)
}

/// Guard pass of `for`: body, update, guard while the condition holds
pub(crate) fn for_guard(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    for_stmt: &ForStatement,
    condition: bool,
) -> ProcessOutcome {
    if !condition {
        thread.borrow_mut().release_loop();
        return ProcessOutcome::none();
    }
    let update = thread.borrow().loops.last().and_then(|scope| scope.update.clone());
    let body = ctx.queue_item(for_stmt.body.clone(), false);
    let update = update.map(|update| ctx.queue_item(update, false));
    let guard = ctx.queue_item(statement.clone(), true);
    set_continue_label(
        thread,
        update.as_ref().map_or(guard.label, |update| update.label),
    );
    let mut items = vec![body];
    items.extend(update);
    items.push(guard);
    ProcessOutcome::unshift(items)
}

/// Keys visited by `for..in`, snapshotted when the loop starts
pub(crate) fn for_in_iteration(value: &Value) -> Option<LoopIteration> {
    let keys: Vec<JsString> = match value {
        Value::Undefined | Value::Null => return None,
        Value::Object(object) => object.keys(),
        Value::Array(array) => (0..array.len()).map(|i| JsString::from(i.to_string())).collect(),
        Value::String(s) => (0..s.char_len()).map(|i| JsString::from(i.to_string())).collect(),
        _ => Vec::new(),
    };
    Some(LoopIteration::Keys { keys, index: 0 })
}

/// Values visited by `for..of`
pub(crate) fn for_of_iteration(value: &Value) -> Result<LoopIteration, EngineError> {
    match value {
        Value::Array(array) => Ok(LoopIteration::Array {
            array: array.clone(),
            index: 0,
        }),
        Value::String(s) => Ok(LoopIteration::Chars {
            chars: s.as_str().chars().collect(),
            index: 0,
        }),
        other => Err(EngineError::type_error(format!(
            "{} is not iterable",
            other.to_display_string()
        ))),
    }
}

/// First pass of `for..in`/`for..of`
pub(crate) fn enter_for_each(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    iteration: LoopIteration,
    binding: ForVarBinding,
    id: &str,
    body: &Rc<Statement>,
) -> Result<ProcessOutcome, EngineError> {
    {
        let mut t = thread.borrow_mut();
        let mut scope = LoopScope::new(&t, 1, false);
        scope.iteration = iteration;
        t.loops.push(scope);
        t.push_block();
    }
    for_each_step(ctx, thread, statement, binding, id, body)
}

/// Bind the next element and run the body, or release the loop when done
pub(crate) fn for_each_step(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    binding: ForVarBinding,
    id: &str,
    body: &Rc<Statement>,
) -> Result<ProcessOutcome, EngineError> {
    let next = thread
        .borrow_mut()
        .loops
        .last_mut()
        .and_then(|scope| scope.iteration.next_value());
    let Some(value) = next else {
        thread.borrow_mut().release_loop();
        return Ok(ProcessOutcome::none());
    };
    match binding {
        ForVarBinding::None => ctx.identifier_place(thread, id, false).set(value)?,
        ForVarBinding::Let | ForVarBinding::Const => {
            let block = thread.borrow().top_block()?;
            block
                .borrow_mut()
                .bind(id, value, binding == ForVarBinding::Const);
        }
    }
    Ok(iterate(ctx, thread, statement, body))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Switch
// ═══════════════════════════════════════════════════════════════════════════════

/// Run the cases from `matched` onward (fallthrough), then the guard that
/// releases the switch scope. `break` clears to that guard.
pub(crate) fn enter_switch(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    switch: &SwitchStatement,
    matched: usize,
) -> Result<ProcessOutcome, EngineError> {
    let statements: Vec<Rc<Statement>> = switch
        .cases
        .iter()
        .skip(matched)
        .flat_map(|case| case.statements.iter().cloned())
        .collect();
    let guard = ctx.queue_item(statement.clone(), true);
    {
        let mut t = thread.borrow_mut();
        let mut scope = LoopScope::new(&t, 0, true);
        scope.break_label = ClearTarget::Label(guard.label);
        t.loops.push(scope);
    }
    open_block(thread, &statements)?;
    let mut items: Vec<QueueItem> = statements
        .iter()
        .map(|statement| ctx.queue_item(statement.clone(), false))
        .collect();
    items.push(guard);
    Ok(ProcessOutcome::unshift(items))
}

pub(crate) fn leave_switch(thread: &ThreadRef) -> ProcessOutcome {
    thread.borrow_mut().release_loop();
    ProcessOutcome::none()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Try / catch / finally
// ═══════════════════════════════════════════════════════════════════════════════

/// Open a new section (try, catch or finally body) of the innermost try
fn open_section(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    block: &BlockStatement,
    phase: TryPhase,
    catch_binding: Option<(&str, Value)>,
) -> Result<ProcessOutcome, EngineError> {
    let guard = ctx.queue_item(statement.clone(), true);
    if let Some(scope) = thread.borrow_mut().try_blocks.last_mut() {
        scope.phase = phase;
        scope.try_label = guard.label;
    }
    let scope_block = match open_block(thread, &block.statements) {
        Ok(scope_block) => scope_block,
        Err(err) => {
            // The section's own hoisting failed: hand the error to this try
            // and queue the guard so its clear target exists
            let mut outcome = recover(thread, err, statement)?;
            outcome.to_unshift = vec![guard];
            return Ok(outcome);
        }
    };
    if let Some((name, value)) = catch_binding {
        scope_block.borrow_mut().bind(name, value, false);
    }
    let mut items = block_items(ctx, &block.statements);
    items.push(guard);
    Ok(ProcessOutcome::unshift(items))
}

pub(crate) fn enter_try(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    try_stmt: &TryStatement,
) -> Result<ProcessOutcome, EngineError> {
    {
        let mut t = thread.borrow_mut();
        let scope = TryScope {
            statement: statement.clone(),
            phase: TryPhase::Try,
            try_label: 0,
            error_to_throw: None,
            error_source: None,
            exit_type: None,
            block_depth: t.blocks.len(),
            loop_depth: t.loops.len(),
        };
        t.try_blocks.push(scope);
    }
    open_section(ctx, thread, statement, &try_stmt.try_block, TryPhase::Try, None)
}

/// Guard pass of a try statement: advance its phase
pub(crate) fn try_guard(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    try_stmt: &TryStatement,
) -> Result<ProcessOutcome, EngineError> {
    let (phase, source) = {
        let t = thread.borrow();
        let scope = t
            .try_blocks
            .last()
            .ok_or_else(|| EngineError::internal_error("try guard without a try scope"))?;
        (scope.phase, scope.error_source)
    };
    match (phase, source) {
        (TryPhase::Try | TryPhase::Catch, _) => finally_or_complete(ctx, thread, statement, try_stmt),
        (TryPhase::Error, Some(TryPhase::Try)) => match &try_stmt.catch_block {
            Some(catch_block) => {
                let caught = {
                    let mut t = thread.borrow_mut();
                    let scope = t.try_blocks.last_mut();
                    scope.and_then(|scope| {
                        scope.error_source = None;
                        scope.error_to_throw.take()
                    })
                };
                let value = caught.map(|err| err.to_value()).unwrap_or_default();
                let binding = try_stmt.catch_variable.as_deref().map(|name| (name, value));
                open_section(ctx, thread, statement, catch_block, TryPhase::Catch, binding)
            }
            None => finally_or_complete(ctx, thread, statement, try_stmt),
        },
        (TryPhase::Error, Some(TryPhase::Catch)) => finally_or_complete(ctx, thread, statement, try_stmt),
        (TryPhase::Error, _) => {
            if let Some(scope) = thread.borrow_mut().try_blocks.last_mut() {
                scope.exit_type = None;
            }
            complete_try(thread)
        }
        (TryPhase::Finally | TryPhase::PostFinally, _) => complete_try(thread),
    }
}

fn finally_or_complete(
    ctx: &EvaluationContext,
    thread: &ThreadRef,
    statement: &Rc<Statement>,
    try_stmt: &TryStatement,
) -> Result<ProcessOutcome, EngineError> {
    match &try_stmt.finally_block {
        Some(finally_block) => {
            open_section(ctx, thread, statement, finally_block, TryPhase::Finally, None)
        }
        None => complete_try(thread),
    }
}

/// Pop the try scope; a pending error is rethrown, otherwise a deferred
/// break/continue/return is carried out now
fn complete_try(thread: &ThreadRef) -> Result<ProcessOutcome, EngineError> {
    let scope = {
        let mut t = thread.borrow_mut();
        let mut scope = t
            .try_blocks
            .pop()
            .ok_or_else(|| EngineError::internal_error("try guard without a try scope"))?;
        scope.phase = TryPhase::PostFinally;
        t.unwind(scope.block_depth, scope.loop_depth);
        scope
    };
    if let Some(err) = scope.error_to_throw {
        return Err(err);
    }
    match scope.exit_type {
        None => Ok(ProcessOutcome::none()),
        Some(ExitType::Return) => Ok(return_from(thread, None)),
        Some(ExitType::Break) => break_from(thread),
        Some(ExitType::Continue) => continue_from(thread),
    }
}
