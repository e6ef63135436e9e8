//! Evaluation context: everything a run shares across threads
//!
//! An [`EvaluationContext`] is a cheap-clone handle. It is created per
//! top-level run (or per host binding scope), owned by the caller, and never
//! shared across OS threads.

use super::queue::QueueItem;
use super::scope::{BlockRef, LogicalThread, ThreadRef};
use crate::ast::Statement;
use crate::error::EngineError;
use crate::host::{AllowAll, CapabilityGate, ModuleResolver, Parser, StatementObserver, UpdateHook};
use crate::prelude::{Cell, Rc, RefCell};
use crate::value::{CheapClone, JsArray, JsObject, JsString, Value};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

// ═══════════════════════════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluation options; every field has a default so hosts can supply a
/// partial JSON document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// Treat every member access as `?.` and calls of `null`/`undefined` as no-ops
    pub default_to_optional_member_access: bool,
    /// Wall-clock budget of a sync run in milliseconds; 0 disables the check
    pub sync_timeout_ms: u64,
    /// Statements the async processor runs between yields to the host
    pub yield_interval: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            default_to_optional_member_access: true,
            sync_timeout_ms: 1000,
            yield_interval: 1000,
        }
    }
}

impl EvalOptions {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::runtime(format!("Invalid evaluation options: {}", e)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════════════

struct ContextInner {
    options: EvalOptions,
    local_context: JsObject,
    app_context: Option<JsObject>,
    globals: JsObject,
    main_thread: RefCell<Option<ThreadRef>>,
    cancellation_token: CancellationToken,
    module_resolver: Option<Rc<dyn ModuleResolver>>,
    parser: Option<Rc<dyn Parser>>,
    capability_gate: Rc<dyn CapabilityGate>,
    update_hook: Option<Rc<dyn UpdateHook>>,
    statement_observer: Option<Rc<dyn StatementObserver>>,
    event_args: RefCell<Vec<Value>>,
    next_label: Cell<usize>,
    sync_started: Cell<Option<Instant>>,
    sync_depth: Cell<usize>,
}

#[derive(Clone)]
pub struct EvaluationContext {
    inner: Rc<ContextInner>,
}

impl CheapClone for EvaluationContext {}

impl Default for EvaluationContext {
    fn default() -> Self {
        EvaluationContext::builder().build()
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("options", &self.inner.options)
            .field("next_label", &self.inner.next_label.get())
            .finish_non_exhaustive()
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        EvaluationContext::default()
    }

    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }

    pub fn options(&self) -> &EvalOptions {
        &self.inner.options
    }

    /// The binding target object; also the receiver of unqualified calls
    pub fn local_context(&self) -> &JsObject {
        &self.inner.local_context
    }

    pub fn app_context(&self) -> Option<&JsObject> {
        self.inner.app_context.as_ref()
    }

    pub fn globals(&self) -> &JsObject {
        &self.inner.globals
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation_token
    }

    pub fn module_resolver(&self) -> Option<Rc<dyn ModuleResolver>> {
        self.inner.module_resolver.clone()
    }

    pub fn parser(&self) -> Option<Rc<dyn Parser>> {
        self.inner.parser.clone()
    }

    pub fn capability_gate(&self) -> &dyn CapabilityGate {
        self.inner.capability_gate.as_ref()
    }

    pub fn update_hook(&self) -> Option<Rc<dyn UpdateHook>> {
        self.inner.update_hook.clone()
    }

    pub fn statement_observer(&self) -> Option<Rc<dyn StatementObserver>> {
        self.inner.statement_observer.clone()
    }

    /// Arguments passed to arrow expression statements
    pub fn event_args(&self) -> Vec<Value> {
        self.inner.event_args.borrow().clone()
    }

    pub fn set_event_args(&self, args: Vec<Value>) {
        *self.inner.event_args.borrow_mut() = args;
    }

    pub fn main_thread(&self) -> Option<ThreadRef> {
        self.inner.main_thread.borrow().clone()
    }

    /// The main thread, created with a single block on first use
    pub fn ensure_main_thread(&self) -> ThreadRef {
        self.inner
            .main_thread
            .borrow_mut()
            .get_or_insert_with(LogicalThread::new_main)
            .clone()
    }

    /// Value of the last run: an explicit `return` value, otherwise the last
    /// expression statement of the main thread's top block
    pub fn completion_value(&self) -> Value {
        let Some(thread) = self.main_thread() else {
            return Value::Undefined;
        };
        let thread = thread.borrow();
        if let Some(value) = &thread.return_value {
            return value.clone();
        }
        thread
            .blocks
            .first()
            .and_then(|block| block.borrow().return_value.clone())
            .unwrap_or_default()
    }

    /// Read a variable of the main thread's top block
    pub fn main_var(&self, name: &str) -> Option<Value> {
        let thread = self.main_thread()?;
        let thread = thread.borrow();
        let block = thread.blocks.first()?;
        block.borrow().get(name)
    }

    pub fn next_label(&self) -> usize {
        let label = self.inner.next_label.get();
        self.inner.next_label.set(label + 1);
        label
    }

    pub fn queue_item(&self, statement: Rc<Statement>, guard: bool) -> QueueItem {
        QueueItem {
            label: self.next_label(),
            statement,
            guard,
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Sync time budget
    // ───────────────────────────────────────────────────────────────────────

    /// Start (or join) the sync clock; the outermost run owns the start tick
    pub(crate) fn enter_sync_run(&self) -> SyncRunGuard<'_> {
        let depth = self.inner.sync_depth.get();
        if depth == 0 {
            self.inner.sync_started.set(Some(Instant::now()));
        }
        self.inner.sync_depth.set(depth + 1);
        SyncRunGuard { ctx: self }
    }

    pub(crate) fn check_sync_timeout(&self) -> Result<(), EngineError> {
        let timeout_ms = self.inner.options.sync_timeout_ms;
        if timeout_ms == 0 {
            return Ok(());
        }
        match self.inner.sync_started.get() {
            Some(started) if started.elapsed().as_millis() > u128::from(timeout_ms) => {
                Err(EngineError::Timeout { timeout_ms })
            }
            _ => Ok(()),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Identifier resolution
    // ───────────────────────────────────────────────────────────────────────

    /// Read an identifier. Unresolved names read as `undefined`.
    pub fn read_identifier(&self, thread: &ThreadRef, name: &str, is_global: bool) -> Value {
        self.identifier_place(thread, name, is_global).get()
    }

    /// Resolve an identifier to a storage place. Lookup order: thread blocks
    /// innermost first, the thread's closures, then the parent threads; then
    /// the local context, the app context (when the value is defined), and
    /// finally the globals object.
    pub fn identifier_place(&self, thread: &ThreadRef, name: &str, is_global: bool) -> Place {
        if !is_global {
            if let Some(block) = find_block(thread, name) {
                return Place::Variable {
                    block,
                    name: name.to_string(),
                };
            }
            if self.inner.local_context.contains(name) {
                return Place::Property {
                    object: self.inner.local_context.cheap_clone(),
                    key: JsString::from(name),
                };
            }
            if let Some(app) = &self.inner.app_context {
                if app.get(name).is_some_and(|v| !matches!(v, Value::Undefined)) {
                    return Place::Property {
                        object: app.cheap_clone(),
                        key: JsString::from(name),
                    };
                }
            }
        }
        Place::Property {
            object: self.inner.globals.cheap_clone(),
            key: JsString::from(name),
        }
    }
}

/// Standard names every script can read; host globals of the same name win
fn seed_fallback_globals(globals: &JsObject) {
    let fallbacks = [
        ("Infinity", Value::Number(f64::INFINITY)),
        ("NaN", Value::Number(f64::NAN)),
        ("undefined", Value::Undefined),
    ];
    for (name, value) in fallbacks {
        if !globals.contains(name) {
            globals.set(name, value);
        }
    }
}

fn find_block(thread: &ThreadRef, name: &str) -> Option<BlockRef> {
    let mut current = Some(thread.clone());
    while let Some(thread) = current {
        let parent = {
            let thread = thread.borrow();
            if let Some(block) = thread.blocks.iter().rev().find(|b| b.borrow().has(name)) {
                return Some(block.clone());
            }
            if let Some(block) = thread.closures.iter().rev().find(|b| b.borrow().has(name)) {
                return Some(block.clone());
            }
            thread.parent()
        };
        current = parent;
    }
    None
}

pub(crate) struct SyncRunGuard<'a> {
    ctx: &'a EvaluationContext,
}

impl Drop for SyncRunGuard<'_> {
    fn drop(&mut self) {
        let depth = self.ctx.inner.sync_depth.get().saturating_sub(1);
        self.ctx.inner.sync_depth.set(depth);
        if depth == 0 {
            self.ctx.inner.sync_started.set(None);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Places
// ═══════════════════════════════════════════════════════════════════════════════

/// A resolved assignment target
#[derive(Debug, Clone)]
pub enum Place {
    Variable { block: BlockRef, name: String },
    Property { object: JsObject, key: JsString },
    Element { array: JsArray, index: usize },
    ArrayLength(JsArray),
}

impl Place {
    pub fn get(&self) -> Value {
        match self {
            Place::Variable { block, name } => block.borrow().get(name).unwrap_or_default(),
            Place::Property { object, key } => object.get(key.as_str()).unwrap_or_default(),
            Place::Element { array, index } => array.get(*index).unwrap_or_default(),
            Place::ArrayLength(array) => Value::Number(array.len() as f64),
        }
    }

    /// Reject writes to `const` bindings
    pub fn check_writable(&self) -> Result<(), EngineError> {
        match self {
            Place::Variable { block, name } if block.borrow().is_const(name) => Err(
                EngineError::type_error(format!("A const variable cannot be modified: {}", name)),
            ),
            _ => Ok(()),
        }
    }

    pub fn set(&self, value: Value) -> Result<(), EngineError> {
        self.check_writable()?;
        match self {
            Place::Variable { block, name } => {
                block.borrow_mut().vars.insert(name.clone(), value);
            }
            Place::Property { object, key } => object.set(key.cheap_clone(), value),
            Place::Element { array, index } => array.set(*index, value),
            Place::ArrayLength(array) => {
                let len = value.to_number();
                if len < 0.0 || len.fract() != 0.0 || len > u32::MAX as f64 {
                    return Err(EngineError::type_error("Invalid array length"));
                }
                let len = len as usize;
                if len < array.len() {
                    array.truncate(len);
                } else if len > array.len() {
                    array.set(len - 1, Value::Undefined);
                }
            }
        }
        Ok(())
    }

    /// `delete` semantics: only object properties can be removed
    pub fn delete(&self) -> bool {
        match self {
            Place::Property { object, key } => object.remove(key.as_str()),
            Place::Element { array, index } => {
                if *index < array.len() {
                    array.set(*index, Value::Undefined);
                }
                true
            }
            Place::Variable { .. } | Place::ArrayLength(_) => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct EvaluationContextBuilder {
    options: EvalOptions,
    local_context: Option<JsObject>,
    app_context: Option<JsObject>,
    globals: Option<JsObject>,
    cancellation_token: Option<CancellationToken>,
    module_resolver: Option<Rc<dyn ModuleResolver>>,
    parser: Option<Rc<dyn Parser>>,
    capability_gate: Option<Rc<dyn CapabilityGate>>,
    update_hook: Option<Rc<dyn UpdateHook>>,
    statement_observer: Option<Rc<dyn StatementObserver>>,
    event_args: Vec<Value>,
}

impl EvaluationContextBuilder {
    pub fn options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn local_context(mut self, local_context: JsObject) -> Self {
        self.local_context = Some(local_context);
        self
    }

    pub fn app_context(mut self, app_context: JsObject) -> Self {
        self.app_context = Some(app_context);
        self
    }

    pub fn globals(mut self, globals: JsObject) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn module_resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.module_resolver = Some(Rc::new(resolver));
        self
    }

    pub fn parser(mut self, parser: impl Parser + 'static) -> Self {
        self.parser = Some(Rc::new(parser));
        self
    }

    pub fn capability_gate(mut self, gate: impl CapabilityGate + 'static) -> Self {
        self.capability_gate = Some(Rc::new(gate));
        self
    }

    pub fn update_hook(mut self, hook: impl UpdateHook + 'static) -> Self {
        self.update_hook = Some(Rc::new(hook));
        self
    }

    pub fn statement_observer(mut self, observer: impl StatementObserver + 'static) -> Self {
        self.statement_observer = Some(Rc::new(observer));
        self
    }

    pub fn event_args(mut self, args: Vec<Value>) -> Self {
        self.event_args = args;
        self
    }

    pub fn build(self) -> EvaluationContext {
        let globals = self.globals.unwrap_or_default();
        seed_fallback_globals(&globals);
        EvaluationContext {
            inner: Rc::new(ContextInner {
                options: self.options,
                local_context: self.local_context.unwrap_or_default(),
                app_context: self.app_context,
                globals,
                main_thread: RefCell::new(None),
                cancellation_token: self.cancellation_token.unwrap_or_default(),
                module_resolver: self.module_resolver,
                parser: self.parser,
                capability_gate: self.capability_gate.unwrap_or_else(|| Rc::new(AllowAll)),
                update_hook: self.update_hook,
                statement_observer: self.statement_observer,
                event_args: RefCell::new(self.event_args),
                next_label: Cell::new(1),
                sync_started: Cell::new(None),
                sync_depth: Cell::new(0),
            }),
        }
    }
}
