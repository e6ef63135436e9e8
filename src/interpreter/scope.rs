//! Scope stacks of a logical thread
//!
//! A [`LogicalThread`] is the control-flow state of one call frame: block
//! scopes for variables, loop scopes for `break`/`continue` targets, and try
//! scopes for the catch/finally state machine. It is bookkeeping only; nothing
//! here is scheduled.

use super::queue::ClearTarget;
use crate::ast::Statement;
use crate::error::EngineError;
use crate::prelude::{FxHashMap, FxHashSet, Rc, RefCell, Weak};
use crate::value::{JsArray, JsString, Value};

pub type BlockRef = Rc<RefCell<BlockScope>>;
pub type ThreadRef = Rc<RefCell<LogicalThread>>;

// ═══════════════════════════════════════════════════════════════════════════════
// Block scopes
// ═══════════════════════════════════════════════════════════════════════════════

/// Variables of one lexical block
#[derive(Debug, Default)]
pub struct BlockScope {
    pub vars: FxHashMap<String, Value>,
    pub const_vars: FxHashSet<String>,
    /// Value of the last expression statement run in this block
    pub return_value: Option<Value>,
}

impl BlockScope {
    pub fn new_ref() -> BlockRef {
        Rc::new(RefCell::new(BlockScope::default()))
    }

    /// Bind a new name; redeclaring in the same block is an error
    pub fn declare(&mut self, name: &str, value: Value, is_const: bool) -> Result<(), EngineError> {
        if self.vars.contains_key(name) {
            return Err(EngineError::runtime(format!(
                "Variable '{}' is already declared",
                name
            )));
        }
        self.bind(name, value, is_const);
        Ok(())
    }

    /// Bind or rebind a name without the redeclaration check
    pub fn bind(&mut self, name: &str, value: Value, is_const: bool) {
        self.vars.insert(name.to_string(), value);
        if is_const {
            self.const_vars.insert(name.to_string());
        } else {
            self.const_vars.remove(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.const_vars.contains(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loop scopes
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-loop iteration state for `for..in` and `for..of`
#[derive(Debug, Clone, Default)]
pub enum LoopIteration {
    #[default]
    None,
    /// Keys snapshotted when the loop started
    Keys { keys: Vec<JsString>, index: usize },
    /// Live view of an array; the length is re-read on every pass
    Array { array: JsArray, index: usize },
    Chars { chars: Vec<char>, index: usize },
}

impl LoopIteration {
    /// Advance and return the next value, or `None` when exhausted
    pub fn next_value(&mut self) -> Option<Value> {
        match self {
            LoopIteration::None => None,
            LoopIteration::Keys { keys, index } => {
                let key = keys.get(*index)?.clone();
                *index += 1;
                Some(Value::String(key))
            }
            LoopIteration::Array { array, index } => {
                let value = array.get(*index)?;
                *index += 1;
                Some(value)
            }
            LoopIteration::Chars { chars, index } => {
                let c = chars.get(*index)?;
                *index += 1;
                Some(Value::from(c.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopScope {
    pub break_label: ClearTarget,
    pub continue_label: ClearTarget,
    pub break_block_depth: usize,
    pub continue_block_depth: usize,
    /// Try-stack depth when the loop started
    pub try_block_depth: usize,
    pub is_switch: bool,
    pub iteration: LoopIteration,
    /// `for` update expression, wrapped once as a statement
    pub update: Option<Rc<Statement>>,
}

impl LoopScope {
    /// A loop scope at the current depth of `thread`; `extra_blocks` counts
    /// loop-owned blocks kept across `continue` (the `for` declaration block)
    pub fn new(thread: &LogicalThread, extra_blocks: usize, is_switch: bool) -> Self {
        let depth = thread.blocks.len();
        LoopScope {
            break_label: thread.break_label_value,
            continue_label: ClearTarget::All,
            break_block_depth: depth,
            continue_block_depth: depth + extra_blocks,
            try_block_depth: thread.try_blocks.len(),
            is_switch,
            iteration: LoopIteration::None,
            update: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Try scopes
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPhase {
    Try,
    Catch,
    Finally,
    Error,
    PostFinally,
}

/// Abrupt completion deferred until `finally` has run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitType {
    Break,
    Continue,
    Return,
}

#[derive(Debug, Clone)]
pub struct TryScope {
    pub statement: Rc<Statement>,
    pub phase: TryPhase,
    /// Label of the re-guarded try statement currently in the queue
    pub try_label: usize,
    pub error_to_throw: Option<EngineError>,
    pub error_source: Option<TryPhase>,
    pub exit_type: Option<ExitType>,
    /// Block and loop depths when the try statement started
    pub block_depth: usize,
    pub loop_depth: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Logical threads
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct LogicalThread {
    pub parent: Option<Weak<RefCell<LogicalThread>>>,
    pub child_threads: Vec<ThreadRef>,
    /// Blocks captured by the arrow function this thread runs
    pub closures: Vec<BlockRef>,
    pub blocks: Vec<BlockRef>,
    pub loops: Vec<LoopScope>,
    pub try_blocks: Vec<TryScope>,
    /// Label of the item following the statement being processed
    pub break_label_value: ClearTarget,
    pub return_value: Option<Value>,
}

impl LogicalThread {
    /// A main thread with its single top-level block
    pub fn new_main() -> ThreadRef {
        Rc::new(RefCell::new(LogicalThread {
            blocks: vec![BlockScope::new_ref()],
            ..LogicalThread::default()
        }))
    }

    /// Create a child of `parent` for an arrow invocation and register it
    pub fn spawn_child(parent: &ThreadRef, closures: Vec<BlockRef>) -> ThreadRef {
        let child = Rc::new(RefCell::new(LogicalThread {
            parent: Some(Rc::downgrade(parent)),
            closures,
            blocks: vec![BlockScope::new_ref()],
            ..LogicalThread::default()
        }));
        parent.borrow_mut().child_threads.push(child.clone());
        child
    }

    /// Remove `child` from `parent`'s child list
    pub fn detach(parent: &ThreadRef, child: &ThreadRef) {
        parent
            .borrow_mut()
            .child_threads
            .retain(|c| !Rc::ptr_eq(c, child));
    }

    pub fn parent(&self) -> Option<ThreadRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn top_block(&self) -> Result<BlockRef, EngineError> {
        self.blocks
            .last()
            .cloned()
            .ok_or_else(|| EngineError::internal_error("thread has no block scope"))
    }

    pub fn push_block(&mut self) -> BlockRef {
        let block = BlockScope::new_ref();
        self.blocks.push(block.clone());
        block
    }

    pub fn pop_block(&mut self) {
        self.blocks.pop();
    }

    /// Drop block and loop scopes opened after the given depths
    pub fn unwind(&mut self, block_depth: usize, loop_depth: usize) {
        self.blocks.truncate(block_depth);
        self.loops.truncate(loop_depth);
    }

    /// Pop the innermost loop scope and the blocks it opened
    pub fn release_loop(&mut self) {
        if let Some(scope) = self.loops.pop() {
            self.blocks.truncate(scope.break_block_depth);
        }
    }

    /// Index of the loop `break` targets: the innermost loop or switch
    pub fn break_target(&self) -> Option<usize> {
        self.loops.len().checked_sub(1)
    }

    /// Index of the loop `continue` targets: the innermost non-switch loop
    pub fn continue_target(&self) -> Option<usize> {
        self.loops.iter().rposition(|scope| !scope.is_switch)
    }

    /// Block scopes an arrow created on this thread closes over, outermost first
    pub fn obtain_closures(&self) -> Vec<BlockRef> {
        let mut closures = match self.parent() {
            Some(parent) => parent.borrow().obtain_closures(),
            None => Vec::new(),
        };
        closures.extend(self.closures.iter().cloned());
        closures.extend(self.blocks.iter().cloned());
        closures
    }

    /// Depths of every scope stack, used to restore the thread after a run
    pub fn depths(&self) -> (usize, usize, usize) {
        (self.blocks.len(), self.loops.len(), self.try_blocks.len())
    }

    pub fn restore_depths(&mut self, (blocks, loops, tries): (usize, usize, usize)) {
        self.blocks.truncate(blocks);
        self.loops.truncate(loops);
        self.try_blocks.truncate(tries);
    }
}
