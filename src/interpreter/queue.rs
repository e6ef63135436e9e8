//! Labeled statement queue
//!
//! Control flow is flattened into one linear work list. Entering a block,
//! loop or try injects its statements at the front; abrupt completion
//! (`break`, `continue`, `return`, a caught error) discards the front of the
//! queue up to a remembered label. Labels are issued by the evaluation context
//! and are unique for its lifetime.

use crate::ast::Statement;
use crate::prelude::{Rc, VecDeque};

/// Where `clear_to_label` stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearTarget {
    Label(usize),
    /// Discard the whole queue
    #[default]
    All,
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub label: usize,
    pub statement: Rc<Statement>,
    /// Re-entry of a loop/try/switch statement to advance its state machine
    pub guard: bool,
}

/// Queue mutation requested by processing one statement
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub to_unshift: Vec<QueueItem>,
    pub clear_to_label: Option<ClearTarget>,
}

impl ProcessOutcome {
    pub fn none() -> Self {
        ProcessOutcome::default()
    }

    pub fn unshift(items: Vec<QueueItem>) -> Self {
        ProcessOutcome {
            to_unshift: items,
            clear_to_label: None,
        }
    }

    pub fn clear_to(target: ClearTarget) -> Self {
        ProcessOutcome {
            to_unshift: Vec::new(),
            clear_to_label: Some(target),
        }
    }
}

#[derive(Debug, Default)]
pub struct StatementQueue {
    items: VecDeque<QueueItem>,
}

impl StatementQueue {
    pub fn new() -> Self {
        StatementQueue::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    /// Insert `items` at the front, keeping their order
    pub fn unshift(&mut self, items: Vec<QueueItem>) {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    pub fn dequeue(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    /// Label of the next item, or `All` when nothing follows
    pub fn next_label(&self) -> ClearTarget {
        self.peek()
            .map_or(ClearTarget::All, |item| ClearTarget::Label(item.label))
    }

    /// Discard items in front of the labeled one; the labeled item stays and
    /// runs next. Returns false (and leaves the queue alone) if the label is
    /// not queued.
    pub fn clear_to_label(&mut self, target: ClearTarget) -> bool {
        match target {
            ClearTarget::All => {
                self.items.clear();
                true
            }
            ClearTarget::Label(label) => {
                match self.items.iter().position(|item| item.label == label) {
                    Some(index) => {
                        self.items.drain(..index);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}
