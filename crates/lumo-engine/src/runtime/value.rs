// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lumo value representation.
//!
//! Heap values are reference counted with [`Arc`]; their mutable parts
//! (upvalue cells, method tables, instance fields) sit behind `parking_lot`
//! locks so chunks and values can be shared between threads.
//!
//! `PartialEq` on [`Value`] is structural equality, the relation used by the
//! constant pool and by codec round-trip checks. Floats compare by bit
//! pattern there, so `0.0` and `-0.0` stay distinct constants. The language's
//! own `==` lives in the interpreter.

use crate::compiler::bytecode::Chunk;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A shared, mutable upvalue cell.
pub type UpvalueCell = Arc<Mutex<Upvalue>>;

/// Host callback backing a [`NativeFunction`].
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A Lumo value.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// IEEE 754 double
    Float(f64),
    /// Immutable string
    String(Arc<str>),
    /// Unicode scalar value
    Char(char),
    /// Boolean
    Bool(bool),
    /// nil
    Nil,
    /// The unit value, returned by functions without a result
    Void,
    /// A compiled function, not yet closed over its environment
    Function(Arc<Function>),
    /// A function with its captured upvalues
    Closure(Arc<Closure>),
    /// A host function
    NativeFunction(Arc<NativeFunction>),
    /// Integer range
    Range(Range),
    /// A record type; calling it constructs an instance
    Record(Arc<Record>),
    /// A record instance
    Instance(Arc<Instance>),
    /// A method paired with its receiver
    BoundMethod(Arc<BoundMethod>),
}

impl Value {
    /// Returns the type name used in runtime error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Char(_) => "char",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::Void => "void",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
            Value::NativeFunction(_) => "native function",
            Value::Range(_) => "range",
            Value::Record(_) => "record",
            Value::Instance(_) => "instance",
            Value::BoundMethod(_) => "bound method",
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if this value can be the callee of `CALL`.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Closure(_) | Value::NativeFunction(_) | Value::Record(_) | Value::BoundMethod(_)
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Void, Value::Void) => true,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::NativeFunction(a), Value::NativeFunction(b)) => Arc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Char(c) => write!(f, "{}", c),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::Void => write!(f, "void"),
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
            Value::Closure(closure) => write!(f, "<fn {}>", closure.function.name()),
            Value::NativeFunction(native) => write!(f, "<native fn {}>", native.name),
            Value::Range(range) => write!(f, "{}", range),
            Value::Record(record) => write!(f, "<record {}>", record.name),
            Value::Instance(instance) => {
                write!(f, "{} {{", instance.record.name)?;
                let fields = instance.fields.read();
                for (i, (name, value)) in instance.record.fields.iter().zip(fields.iter()).enumerate()
                {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, value)?;
                }
                write!(f, " }}")
            }
            Value::BoundMethod(bound) => {
                write!(f, "<bound method {}>", bound.method.function.name())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

// ============================================================================
// Functions and closures
// ============================================================================

/// A compiled function: its arity and its own chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Number of declared parameters (the callee slot is not counted)
    pub arity: u32,
    /// The function body
    pub chunk: Chunk,
}

impl Function {
    /// Creates a new function.
    pub fn new(arity: u32, chunk: Chunk) -> Self {
        Self { arity, chunk }
    }

    /// The function name, or `"script"` for the top-level chunk.
    pub fn name(&self) -> &str {
        self.chunk.name.as_deref().unwrap_or("script")
    }
}

/// A captured variable.
///
/// While open, the variable still lives in the interpreter's locals stack at
/// `locals_index`. Once closed, `closed` holds the value and the index is
/// meaningless.
#[derive(Debug, Clone, PartialEq)]
pub struct Upvalue {
    /// Absolute slot in the locals stack, while open
    pub locals_index: u32,
    /// Position in the owning closure's upvalue list
    pub upvalue_index: u32,
    /// The captured value, once closed
    pub closed: Option<Value>,
}

impl Upvalue {
    /// Creates an open upvalue.
    pub fn open(locals_index: u32, upvalue_index: u32) -> Self {
        Self {
            locals_index,
            upvalue_index,
            closed: None,
        }
    }

    /// Returns true once the value has been copied out of the locals stack.
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

/// A function together with its captured upvalues.
#[derive(Debug)]
pub struct Closure {
    /// The underlying function
    pub function: Arc<Function>,
    /// Captured variables, in the order the compiler resolved them
    pub upvalues: Vec<UpvalueCell>,
}

impl Closure {
    /// Creates a closure.
    pub fn new(function: Arc<Function>, upvalues: Vec<UpvalueCell>) -> Self {
        Self { function, upvalues }
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        if !(Arc::ptr_eq(&self.function, &other.function) || self.function == other.function) {
            return false;
        }
        self.upvalues.len() == other.upvalues.len()
            && self
                .upvalues
                .iter()
                .zip(&other.upvalues)
                .all(|(a, b)| Arc::ptr_eq(a, b) || *a.lock() == *b.lock())
    }
}

/// A host function callable from Lumo code.
pub struct NativeFunction {
    /// Global name the function is registered under
    pub name: String,
    /// Expected argument count
    pub arity: u32,
    /// The host callback
    pub callback: NativeFn,
}

impl NativeFunction {
    /// Wraps a host callback.
    pub fn new<F>(name: impl Into<String>, arity: u32, callback: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({}/{})", self.name, self.arity)
    }
}

// ============================================================================
// Ranges
// ============================================================================

/// An integer range. Doubles as its own iteration cursor: `start` is the
/// next element to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// First element
    pub start: i64,
    /// Bound
    pub end: i64,
    /// Increment, `1` or `-1`
    pub step: i64,
    /// Whether `end` itself is produced
    pub inclusive: bool,
    /// Set once stepping past the last element would overflow `i64`
    pub exhausted: bool,
}

impl Range {
    /// Creates a range that counts down when `start > end`.
    pub fn new(start: i64, end: i64, inclusive: bool) -> Self {
        Self {
            start,
            end,
            step: if start > end { -1 } else { 1 },
            inclusive,
            exhausted: false,
        }
    }

    /// Returns true if the cursor has not run past `end`.
    pub fn has_next(&self) -> bool {
        if self.exhausted {
            return false;
        }
        match (self.step >= 0, self.inclusive) {
            (true, false) => self.start < self.end,
            (true, true) => self.start <= self.end,
            (false, false) => self.start > self.end,
            (false, true) => self.start >= self.end,
        }
    }

    /// Moves the cursor one step.
    pub fn advance(&mut self) {
        match self.start.checked_add(self.step) {
            Some(next) => self.start = next,
            None => self.exhausted = true,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.inclusive { "..=" } else { ".." };
        write!(f, "{}{}{}", self.start, op, self.end)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A record type: a name, ordered fields and a method table.
#[derive(Debug)]
pub struct Record {
    /// The record name
    pub name: String,
    /// Field names, in constructor order
    pub fields: Vec<String>,
    /// Methods, appended at run time by `APPEND_METHODS`
    pub methods: RwLock<Vec<Arc<Closure>>>,
    field_slots: FxHashMap<String, usize>,
}

impl Record {
    /// Creates a record without methods.
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        let field_slots = fields
            .iter()
            .enumerate()
            .map(|(slot, name)| (name.clone(), slot))
            .collect();
        Self {
            name: name.into(),
            fields,
            methods: RwLock::new(Vec::new()),
            field_slots,
        }
    }

    /// Position of a field in an instance's field list.
    pub fn field_slot(&self, name: &str) -> Option<usize> {
        self.field_slots.get(name).copied()
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Option<Arc<Closure>> {
        self.methods
            .read()
            .iter()
            .find(|m| m.function.name() == name)
            .cloned()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.fields == other.fields
            && *self.methods.read() == *other.methods.read()
    }
}

/// An instance of a record.
#[derive(Debug)]
pub struct Instance {
    /// Field values, aligned with `record.fields`
    pub fields: RwLock<Vec<Value>>,
    /// The record this is an instance of
    pub record: Arc<Record>,
}

impl Instance {
    /// Creates an instance from positional field values.
    pub fn new(record: Arc<Record>, fields: Vec<Value>) -> Self {
        Self {
            fields: RwLock::new(fields),
            record,
        }
    }

    /// Reads a field by name.
    pub fn get(&self, name: &str) -> Option<Value> {
        let slot = self.record.field_slot(name)?;
        self.fields.read().get(slot).cloned()
    }

    /// Writes a field by name. Returns false if the record has no such field.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let Some(slot) = self.record.field_slot(name) else {
            return false;
        };
        match self.fields.write().get_mut(slot) {
            Some(field) => {
                *field = value;
                true
            }
            None => false,
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.record, &other.record) || self.record == other.record)
            && *self.fields.read() == *other.fields.read()
    }
}

/// A method closure bound to its receiver.
#[derive(Debug, PartialEq)]
pub struct BoundMethod {
    /// The value passed in slot 0
    pub receiver: Value,
    /// The method
    pub method: Arc<Closure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_range_counts_down() {
        let mut range = Range::new(3, 1, true);
        assert_eq!(range.step, -1);
        let mut seen = Vec::new();
        while range.has_next() {
            seen.push(range.start);
            range.advance();
        }
        assert_eq!(seen, vec![3, 2, 1]);
    }

    #[test]
    fn test_range_stops_at_integer_bounds() {
        let mut range = Range::new(i64::MAX - 1, i64::MAX, true);
        let mut seen = Vec::new();
        while range.has_next() {
            seen.push(range.start);
            range.advance();
        }
        assert_eq!(seen, vec![i64::MAX - 1, i64::MAX]);

        let mut down = Range::new(i64::MIN, i64::MIN, true);
        assert!(down.has_next());
        down.advance();
        assert!(!down.has_next());
    }

    #[test]
    fn test_empty_range() {
        assert!(!Range::new(2, 2, false).has_next());
        assert!(Range::new(2, 2, true).has_next());
    }

    #[test]
    fn test_instance_fields() {
        let record = Arc::new(Record::new("Point", vec!["x".into(), "y".into()]));
        let point = Instance::new(record, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(point.get("y"), Some(Value::Int(2)));
        assert!(point.set("x", Value::Int(5)));
        assert!(!point.set("z", Value::Int(5)));
        assert_eq!(
            Value::Instance(Arc::new(point)).to_string(),
            "Point { x: 5, y: 2 }"
        );
    }

    #[test]
    fn test_record_structural_equality() {
        let a = Record::new("P", vec!["x".into()]);
        let b = Record::new("P", vec!["x".into()]);
        assert_eq!(a, b);
        let c = Record::new("Q", vec!["x".into()]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_native_functions_compare_by_identity() {
        let native = Arc::new(NativeFunction::new("id", 1, |args| Ok(args[0].clone())));
        let a = Value::NativeFunction(native.clone());
        let b = Value::NativeFunction(native);
        let c = Value::NativeFunction(Arc::new(NativeFunction::new("id", 1, |_| Ok(Value::Nil))));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
