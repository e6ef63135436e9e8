//! Runtime values for the KSX engine

use crate::ast::ArrowExpression;
use crate::error::EngineError;
use crate::interpreter::scope::BlockRef;
use crate::prelude::{fmt, index_map_new, FxHashSet, IndexMap, Rc, RefCell};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::future::Future;

/// Marker trait for types whose `clone()` only bumps a reference count.
///
/// Use `cheap_clone()` at call sites to make the O(1) cost explicit.
pub trait CheapClone: Clone {
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: ?Sized> CheapClone for Rc<T> {}

/// A KSX value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
    Array(JsArray),
    Object(JsObject),
    Function(JsFunction),
    Promise(JsPromise),
}

impl CheapClone for Value {}

impl Value {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn as_function(&self) -> Option<&JsFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Convert to boolean (ToBoolean)
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) => true,
        }
    }

    /// Convert to number (ToNumber)
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s.as_str()),
            Value::Array(arr) => {
                // [] -> 0, [x] -> ToNumber(x), otherwise NaN
                let items = arr.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            Value::Object(_) | Value::Function(_) | Value::Promise(_) => f64::NAN,
        }
    }

    /// Convert to string (ToString)
    pub fn to_js_string(&self) -> JsString {
        match self {
            Value::Undefined => JsString::from("undefined"),
            Value::Null => JsString::from("null"),
            Value::Boolean(true) => JsString::from("true"),
            Value::Boolean(false) => JsString::from("false"),
            Value::Number(n) => JsString::from(number_to_string(*n)),
            Value::String(s) => s.cheap_clone(),
            Value::Array(arr) => {
                let parts: Vec<String> = arr
                    .borrow()
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else {
                            v.to_js_string().to_string()
                        }
                    })
                    .collect();
                JsString::from(parts.join(","))
            }
            Value::Object(_) => JsString::from("[object Object]"),
            Value::Function(f) => JsString::from(format!("function {}() {{ [code] }}", f.name())),
            Value::Promise(_) => JsString::from("[object Promise]"),
        }
    }

    /// Human readable form used in error messages
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            Value::Object(_) | Value::Array(_) => self
                .to_json()
                .map(|json| json.to_string())
                .unwrap_or_else(|_| self.to_js_string().to_string()),
            other => other.to_js_string().to_string(),
        }
    }

    /// Strict equality (===)
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            // NaN !== NaN, 0 === -0
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Loose equality (==) for primitives; references compare by identity
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Boolean(_), _)
            | (_, Value::Boolean(_)) => {
                if self.is_reference() || other.is_reference() {
                    self.to_js_string() == other.to_js_string()
                } else {
                    self.to_number() == other.to_number()
                }
            }
            (a, b) if a.is_reference() != b.is_reference() => a.to_js_string() == b.to_js_string(),
            (a, b) => a.strict_equals(b),
        }
    }

    fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_)
        )
    }

    /// Property key form of a value (`a[key]`)
    pub fn to_property_key(&self) -> JsString {
        self.to_js_string()
    }

    /// Convert a JSON document into a value tree
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Array(JsArray::from_vec(items.iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = JsObject::new();
                for (key, value) in map {
                    object.set(key.as_str(), Value::from_json(value));
                }
                Value::Object(object)
            }
        }
    }

    /// Convert to JSON; functions and `undefined` map to `null`, cycles are an error
    pub fn to_json(&self) -> Result<serde_json::Value, EngineError> {
        let mut visiting = FxHashSet::default();
        self.to_json_inner(&mut visiting)
    }

    fn to_json_inner(
        &self,
        visiting: &mut FxHashSet<usize>,
    ) -> Result<serde_json::Value, EngineError> {
        Ok(match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Promise(_) => {
                serde_json::Value::Null
            }
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(arr) => {
                if !visiting.insert(arr.id()) {
                    return Err(EngineError::type_error("Converting circular structure to JSON"));
                }
                let items = arr.to_vec();
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(item.to_json_inner(visiting)?);
                }
                visiting.remove(&arr.id());
                serde_json::Value::Array(out)
            }
            Value::Object(object) => {
                if !visiting.insert(object.id()) {
                    return Err(EngineError::type_error("Converting circular structure to JSON"));
                }
                let mut out = serde_json::Map::new();
                for (key, value) in object.entries() {
                    out.insert(key.to_string(), value.to_json_inner(visiting)?);
                }
                visiting.remove(&object.id());
                serde_json::Value::Object(out)
            }
        })
    }
}

/// ToNumber for strings: whitespace trimmed, empty is 0, hex/binary/octal prefixes allowed
fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0b", 2), ("0B", 2), ("0o", 8), ("0O", 8)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust accepts "inf"/"nan" spellings that JavaScript does not
    if trimmed
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s.as_str()),
            Value::Array(arr) => write!(f, "{:?}", arr.borrow().as_slice()),
            Value::Object(obj) => {
                let mut map = f.debug_map();
                for (key, value) in obj.entries() {
                    map.entry(&key.as_str(), &value);
                }
                map.finish()
            }
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Promise(_) => write!(f, "Promise {{ <pending> }}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Structural equality for primitives, identity for references.
/// Unlike `===`, NaN equals NaN so tests can compare results directly.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (a, b) => a.strict_equals(b),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(JsString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(JsString::from(s))
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Value::String(s)
    }
}

impl From<JsArray> for Value {
    fn from(arr: JsArray) -> Self {
        Value::Array(arr)
    }
}

impl From<JsObject> for Value {
    fn from(obj: JsObject) -> Self {
        Value::Object(obj)
    }
}

impl From<JsFunction> for Value {
    fn from(func: JsFunction) -> Self {
        Value::Function(func)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(JsArray::from_vec(items))
    }
}

impl fmt::Debug for JsArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Array(self.cheap_clone()), f)
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Object(self.cheap_clone()), f)
    }
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name())
    }
}

impl fmt::Debug for JsPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Promise {{ <pending> }}")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Strings
// ═══════════════════════════════════════════════════════════════════════════════

/// Reference-counted string
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Rc<str>);

impl CheapClone for JsString {}

impl JsString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in UTF-16 code units would differ for astral characters;
    /// KSX counts chars
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for JsString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString(s.into())
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString(s.into())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Arrays and objects
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared, mutable array
#[derive(Clone, Default)]
pub struct JsArray(Rc<RefCell<Vec<Value>>>);

impl CheapClone for JsArray {}

impl JsArray {
    pub fn new() -> Self {
        JsArray::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        JsArray(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Store at `index`, padding with `undefined` when writing past the end
    pub fn set(&self, index: usize, value: Value) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        if let Some(slot) = items.get_mut(index) {
            *slot = value;
        }
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn truncate(&self, len: usize) {
        self.0.borrow_mut().truncate(len);
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn ptr_eq(&self, other: &JsArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity used for cycle detection
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// Shared, mutable object with insertion-ordered properties
#[derive(Clone)]
pub struct JsObject(Rc<RefCell<IndexMap<JsString, Value>>>);

impl CheapClone for JsObject {}

impl Default for JsObject {
    fn default() -> Self {
        JsObject::new()
    }
}

impl JsObject {
    pub fn new() -> Self {
        JsObject(Rc::new(RefCell::new(index_map_new())))
    }

    pub fn from_pairs<K: Into<JsString>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let object = JsObject::new();
        for (key, value) in pairs {
            object.set(key, value);
        }
        object
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn set(&self, key: impl Into<JsString>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    /// Remove a property, preserving the order of the rest
    pub fn remove(&self, key: &str) -> bool {
        self.0.borrow_mut().shift_remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<JsString> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(JsString, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.cheap_clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &JsObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity used for cycle detection
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// Read `value[key]`. Reading from `null`/`undefined` is a TypeError unless
/// `optional` is set, in which case it yields `undefined`.
pub fn get_property(value: &Value, key: &str, optional: bool) -> Result<Value, EngineError> {
    Ok(match value {
        Value::Undefined | Value::Null => {
            if optional {
                Value::Undefined
            } else {
                return Err(EngineError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    value.to_js_string(),
                    key
                )));
            }
        }
        Value::Object(object) => object.get(key).unwrap_or_default(),
        Value::Array(arr) => {
            if key == "length" {
                Value::Number(arr.len() as f64)
            } else {
                parse_index(key)
                    .and_then(|index| arr.get(index))
                    .unwrap_or_default()
            }
        }
        Value::String(s) => {
            if key == "length" {
                Value::Number(s.char_len() as f64)
            } else {
                parse_index(key)
                    .and_then(|index| s.as_str().chars().nth(index))
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default()
            }
        }
        Value::Function(func) if key == "name" => Value::from(func.name()),
        _ => Value::Undefined,
    })
}

/// Canonical array index ("0", "12", not "01" or "-1")
pub fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════════════

pub type SyncNativeFn = dyn Fn(&Value, Vec<Value>) -> Result<Value, EngineError>;
pub type AsyncNativeFn = dyn Fn(Value, Vec<Value>) -> LocalBoxFuture<'static, Result<Value, EngineError>>;

/// Host function body
#[derive(Clone)]
pub enum NativeKind {
    Sync(Rc<SyncNativeFn>),
    /// Only callable from the async evaluator
    Async(Rc<AsyncNativeFn>),
}

pub struct NativeFunction {
    pub name: JsString,
    pub kind: NativeKind,
}

/// A compiled arrow function: its tree plus the block scopes it closes over
pub struct ArrowClosure {
    pub expr: Rc<ArrowExpression>,
    pub closures: Vec<BlockRef>,
}

#[derive(Clone)]
pub enum JsFunction {
    Native(Rc<NativeFunction>),
    Arrow(Rc<ArrowClosure>),
}

impl CheapClone for JsFunction {}

impl JsFunction {
    /// Wrap a synchronous host function. The first argument is the receiver.
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value, EngineError> + 'static,
    {
        JsFunction::Native(Rc::new(NativeFunction {
            name: JsString::from(name),
            kind: NativeKind::Sync(Rc::new(f)),
        }))
    }

    /// Wrap an asynchronous host function
    pub fn native_async<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, EngineError>> + 'static,
    {
        JsFunction::Native(Rc::new(NativeFunction {
            name: JsString::from(name),
            kind: NativeKind::Async(Rc::new(move |this, args| f(this, args).boxed_local())),
        }))
    }

    pub fn arrow(expr: Rc<ArrowExpression>, closures: Vec<BlockRef>) -> Self {
        JsFunction::Arrow(Rc::new(ArrowClosure { expr, closures }))
    }

    pub fn name(&self) -> String {
        match self {
            JsFunction::Native(native) => native.name.to_string(),
            JsFunction::Arrow(arrow) => arrow
                .expr
                .name
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, JsFunction::Native(native) if matches!(native.kind, NativeKind::Async(_)))
    }

    pub fn ptr_eq(&self, other: &JsFunction) -> bool {
        match (self, other) {
            (JsFunction::Native(a), JsFunction::Native(b)) => Rc::ptr_eq(a, b),
            (JsFunction::Arrow(a), JsFunction::Arrow(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Promises
// ═══════════════════════════════════════════════════════════════════════════════

/// A pending host result. Cloning shares the same underlying future.
#[derive(Clone)]
pub struct JsPromise(Shared<LocalBoxFuture<'static, Result<Value, EngineError>>>);

impl CheapClone for JsPromise {}

impl JsPromise {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, EngineError>> + 'static,
    {
        JsPromise(future.boxed_local().shared())
    }

    pub fn resolved(value: Value) -> Self {
        JsPromise::new(async move { Ok(value) })
    }

    pub fn rejected(error: EngineError) -> Self {
        JsPromise::new(async move { Err(error) })
    }

    /// Wait for the promise to settle
    pub async fn settle(&self) -> Result<Value, EngineError> {
        self.0.clone().await
    }

    pub fn ptr_eq(&self, other: &JsPromise) -> bool {
        self.0.ptr_eq(&other.0)
    }
}
