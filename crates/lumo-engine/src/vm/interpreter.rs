// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode interpreter.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::comparison::{comparable, compare, values_equal};
use super::error::RuntimeError;
use crate::compiler::bytecode::{CAPTURE_WIDTH, Chunk, OPERAND_WIDTH, OpCode};
use crate::runtime::value::{
    BoundMethod, Closure, Function, Instance, NativeFunction, Range, Record, Upvalue,
    UpvalueCell, Value,
};

type Result<T> = std::result::Result<T, RuntimeError>;

/// Maximum call depth before `StackOverflow`.
const MAX_FRAMES: usize = 1024;

/// An active call.
struct CallFrame {
    /// The closure being executed
    closure: Arc<Closure>,
    /// Offset of the next instruction
    ip: usize,
    /// Locals index of slot 0
    locals_base: usize,
    /// Stack height before the callee was pushed
    stack_base: usize,
}

/// Reads the `n`th fixed-width operand of the instruction at `ip`.
fn operand(chunk: &Chunk, ip: usize, n: usize) -> Result<u32> {
    chunk
        .read_u32(ip + 1 + n * OPERAND_WIDTH)
        .ok_or(RuntimeError::Truncated(ip))
}

fn constant(chunk: &Chunk, index: u32) -> Result<Value> {
    chunk
        .constants
        .get(index as usize)
        .cloned()
        .ok_or(RuntimeError::InvalidConstant(index))
}

fn name_constant(chunk: &Chunk, index: u32) -> Result<Arc<str>> {
    match constant(chunk, index)? {
        Value::String(name) => Ok(name),
        _ => Err(RuntimeError::InvalidConstant(index)),
    }
}

fn expect_bool(value: &Value, operation: &'static str) -> Result<bool> {
    value.as_bool().ok_or(RuntimeError::UnexpectedType {
        operation,
        expected: "bool",
        found: value.type_name(),
    })
}

fn no_such_property(receiver: &Value, property: &str) -> RuntimeError {
    let type_name = match receiver {
        Value::Instance(instance) => instance.record.name.clone(),
        other => other.type_name().to_string(),
    };
    RuntimeError::NoSuchProperty {
        property: property.to_string(),
        type_name,
    }
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::Mod => "%",
        }
    }
}

fn int_arithmetic(op: Arith, a: i64, b: i64) -> Result<Value> {
    let result = match op {
        Arith::Add => a.checked_add(b),
        Arith::Sub => a.checked_sub(b),
        Arith::Mul => a.checked_mul(b),
        Arith::Div | Arith::Mod if b == 0 => return Err(RuntimeError::DivisionByZero),
        Arith::Div => a.checked_div(b),
        Arith::Mod => a.checked_rem(b),
    };
    result
        .map(Value::Int)
        .ok_or(RuntimeError::IntegerOverflow(op.symbol()))
}

fn arithmetic(op: Arith, a: &Value, b: &Value) -> Result<Value> {
    let float = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    };

    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_arithmetic(op, *x, *y),
        (Value::String(x), Value::String(y)) if matches!(op, Arith::Add) => {
            Ok(Value::from(format!("{}{}", x, y)))
        }
        (Value::String(x), Value::Char(y)) if matches!(op, Arith::Add) => {
            Ok(Value::from(format!("{}{}", x, y)))
        }
        _ => match (float(a), float(b)) {
            (Some(x), Some(y)) => Ok(Value::Float(match op {
                Arith::Add => x + y,
                Arith::Sub => x - y,
                Arith::Mul => x * y,
                Arith::Div => x / y,
                Arith::Mod => x % y,
            })),
            _ => Err(RuntimeError::TypeMismatch {
                operation: op.symbol(),
                left: a.type_name(),
                right: b.type_name(),
            }),
        },
    }
}

/// The reference bytecode interpreter.
///
/// Values live on `stack`; variables that were moved off it by `DEF_LOCAL`
/// live on a separate `locals` stack, indexed from the current frame's base.
/// Globals are a flat vector, filled in order by `DEF_GLOBAL` after the
/// natives registered with [`VM::define_native`].
pub struct VM {
    /// The value stack
    stack: Vec<Value>,
    /// Local variables
    locals: Vec<Value>,
    /// Global variables
    globals: Vec<Value>,
    /// Call stack
    frames: Vec<CallFrame>,
    /// Upvalues still pointing into `locals`, oldest first
    open_upvalues: Vec<UpvalueCell>,
    /// Native functions, in global slot order
    natives: Vec<Value>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    /// Creates a new VM with no natives.
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            locals: Vec::with_capacity(64),
            globals: Vec::new(),
            frames: Vec::with_capacity(64),
            open_upvalues: Vec::new(),
            natives: Vec::new(),
        }
    }

    /// Registers a host function in the next global slot.
    ///
    /// Natives must be defined in the same order as they were given to
    /// [`CompilerOptions::native`](crate::compiler::CompilerOptions::native).
    pub fn define_native<F>(&mut self, name: &str, arity: u32, callback: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.natives.push(Value::NativeFunction(Arc::new(NativeFunction::new(
            name, arity, callback,
        ))));
    }

    /// Global slots as left by the last run.
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Values left on the stack by the last run.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Runs a compiled program until `EXIT_SUCCESS` or a top-level return.
    pub fn run(&mut self, chunk: &Chunk) -> Result<()> {
        self.stack.clear();
        self.locals.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        self.globals = self.natives.clone();

        let script = Arc::new(Closure::new(
            Arc::new(Function::new(0, chunk.clone())),
            Vec::new(),
        ));
        self.frames.push(CallFrame {
            closure: script,
            ip: 0,
            locals_base: 0,
            stack_base: 0,
        });

        debug!(bytes = chunk.code.len(), "Running chunk");
        let result = self.execute();
        if let Err(err) = &result {
            debug!(%err, depth = self.frames.len(), "Execution failed");
        }
        result
    }

    fn execute(&mut self) -> Result<()> {
        loop {
            let (closure, ip) = {
                let frame = self.frame()?;
                (Arc::clone(&frame.closure), frame.ip)
            };
            let chunk = &closure.function.chunk;

            let byte = *chunk
                .code
                .get(ip)
                .ok_or_else(|| RuntimeError::UnexpectedEnd(closure.function.name().to_string()))?;
            let op = OpCode::from_byte(byte).ok_or(RuntimeError::InvalidOpcode { byte, offset: ip })?;

            let mut next = ip + 1 + op.operand_width();
            if op == OpCode::PushClosure {
                next += operand(chunk, ip, 1)? as usize * CAPTURE_WIDTH;
            }
            if next > chunk.code.len() {
                return Err(RuntimeError::Truncated(ip));
            }
            self.frame_mut()?.ip = next;

            trace!(offset = ip, op = op.mnemonic(), stack = self.stack.len(), "step");

            match op {
                OpCode::PushConst => {
                    let value = constant(chunk, operand(chunk, ip, 0)?)?;
                    self.stack.push(value);
                }
                OpCode::PushClosure => {
                    let index = operand(chunk, ip, 0)?;
                    let Value::Function(function) = constant(chunk, index)? else {
                        return Err(RuntimeError::InvalidConstant(index));
                    };
                    let count = operand(chunk, ip, 1)? as usize;
                    let base = self.frame()?.locals_base;

                    let mut upvalues = Vec::with_capacity(count);
                    for i in 0..count {
                        let at = ip + 1 + 2 * OPERAND_WIDTH + i * CAPTURE_WIDTH;
                        let is_local = chunk.code.get(at).copied().ok_or(RuntimeError::Truncated(ip))?;
                        let slot = chunk.read_u32(at + 1).ok_or(RuntimeError::Truncated(ip))?;
                        let cell = if is_local != 0 {
                            self.capture_upvalue(base + slot as usize, i as u32)
                        } else {
                            closure
                                .upvalues
                                .get(slot as usize)
                                .cloned()
                                .ok_or(RuntimeError::InvalidUpvalue(slot))?
                        };
                        upvalues.push(cell);
                    }
                    self.stack
                        .push(Value::Closure(Arc::new(Closure::new(function, upvalues))));
                }
                OpCode::PushTrue => self.stack.push(Value::Bool(true)),
                OpCode::PushFalse => self.stack.push(Value::Bool(false)),
                OpCode::PushNil => self.stack.push(Value::Nil),
                OpCode::PushVoid => self.stack.push(Value::Void),
                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::DefLocal => {
                    let value = self.pop()?;
                    self.locals.push(value);
                }
                OpCode::GetLocal => {
                    let slot = self.frame()?.locals_base + operand(chunk, ip, 0)? as usize;
                    let value = self
                        .locals
                        .get(slot)
                        .cloned()
                        .ok_or(RuntimeError::InvalidLocal(slot))?;
                    self.stack.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.frame()?.locals_base + operand(chunk, ip, 0)? as usize;
                    let value = self.peek()?.clone();
                    *self
                        .locals
                        .get_mut(slot)
                        .ok_or(RuntimeError::InvalidLocal(slot))? = value;
                }
                OpCode::PopLocal | OpCode::CloseUpvalue => {
                    let len = self.locals.len().checked_sub(1).ok_or(RuntimeError::StackUnderflow)?;
                    self.truncate_locals(len);
                }
                OpCode::PopnLocal => {
                    let n = operand(chunk, ip, 0)? as usize;
                    let len = self.locals.len().checked_sub(n).ok_or(RuntimeError::StackUnderflow)?;
                    self.truncate_locals(len);
                }
                OpCode::GetUpvalue => {
                    let index = operand(chunk, ip, 0)?;
                    let cell = closure
                        .upvalues
                        .get(index as usize)
                        .ok_or(RuntimeError::InvalidUpvalue(index))?;
                    let value = self.read_upvalue(cell)?;
                    self.stack.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = operand(chunk, ip, 0)?;
                    let cell = closure
                        .upvalues
                        .get(index as usize)
                        .ok_or(RuntimeError::InvalidUpvalue(index))?;
                    let value = self.peek()?.clone();
                    self.write_upvalue(cell, value)?;
                }
                OpCode::DefGlobal => {
                    let value = self.pop()?;
                    self.globals.push(value);
                }
                OpCode::GetGlobal => {
                    let slot = operand(chunk, ip, 0)?;
                    let value = self
                        .globals
                        .get(slot as usize)
                        .cloned()
                        .ok_or(RuntimeError::UndefinedGlobal(slot))?;
                    self.stack.push(value);
                }
                OpCode::SetGlobal => {
                    let slot = operand(chunk, ip, 0)?;
                    let value = self.peek()?.clone();
                    *self
                        .globals
                        .get_mut(slot as usize)
                        .ok_or(RuntimeError::UndefinedGlobal(slot))? = value;
                }

                OpCode::GetProperty => {
                    let name = name_constant(chunk, operand(chunk, ip, 0)?)?;
                    let receiver = self.pop()?;
                    let value = self.get_property(&receiver, &name)?;
                    self.stack.push(value);
                }
                OpCode::SetProperty => {
                    let name = name_constant(chunk, operand(chunk, ip, 0)?)?;
                    let value = self.pop()?;
                    let receiver = self.pop()?;
                    match &receiver {
                        Value::Instance(instance) if instance.set(&name, value.clone()) => {
                            self.stack.push(value);
                        }
                        _ => return Err(no_such_property(&receiver, &name)),
                    }
                }

                OpCode::Call => {
                    let argc = operand(chunk, ip, 0)? as usize;
                    self.call_value(argc)?;
                }
                OpCode::CallProperty => {
                    let name = name_constant(chunk, operand(chunk, ip, 0)?)?;
                    let argc = operand(chunk, ip, 1)? as usize;
                    self.call_property(&name, argc)?;
                }
                OpCode::AppendMethods => {
                    let n = operand(chunk, ip, 0)? as usize;
                    self.append_methods(n)?;
                }

                OpCode::Jump => {
                    let distance = operand(chunk, ip, 0)? as usize;
                    self.frame_mut()?.ip = next + distance;
                }
                OpCode::JumpTrue | OpCode::JumpFalse => {
                    let distance = operand(chunk, ip, 0)? as usize;
                    let condition = expect_bool(self.peek()?, op.mnemonic())?;
                    if condition == (op == OpCode::JumpTrue) {
                        self.frame_mut()?.ip = next + distance;
                    }
                }
                OpCode::JumpHasNoNext => {
                    let distance = operand(chunk, ip, 0)? as usize;
                    let exhausted = match self.peek()? {
                        Value::Range(range) => !range.has_next(),
                        other => {
                            return Err(RuntimeError::UnexpectedType {
                                operation: op.mnemonic(),
                                expected: "iterator",
                                found: other.type_name(),
                            });
                        }
                    };
                    if exhausted {
                        self.frame_mut()?.ip = next + distance;
                    }
                }
                OpCode::Loop => {
                    let distance = operand(chunk, ip, 0)? as usize;
                    self.frame_mut()?.ip = next
                        .checked_sub(distance)
                        .ok_or(RuntimeError::InvalidJump(ip))?;
                }

                OpCode::Add => self.binary_arithmetic(Arith::Add)?,
                OpCode::Sub => self.binary_arithmetic(Arith::Sub)?,
                OpCode::Mul => self.binary_arithmetic(Arith::Mul)?,
                OpCode::Div => self.binary_arithmetic(Arith::Div)?,
                OpCode::Mod => self.binary_arithmetic(Arith::Mod)?,
                OpCode::Neg => {
                    let value = self.pop()?;
                    let result = match value {
                        Value::Int(n) => Value::Int(
                            n.checked_neg()
                                .ok_or(RuntimeError::IntegerOverflow("-"))?,
                        ),
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(RuntimeError::UnexpectedType {
                                operation: "-",
                                expected: "number",
                                found: other.type_name(),
                            });
                        }
                    };
                    self.stack.push(result);
                }

                OpCode::Eq | OpCode::Ne => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let equal = values_equal(&a, &b);
                    self.stack.push(Value::Bool(equal == (op == OpCode::Eq)));
                }
                OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    if !comparable(&a, &b) {
                        return Err(RuntimeError::TypeMismatch {
                            operation: op.mnemonic(),
                            left: a.type_name(),
                            right: b.type_name(),
                        });
                    }
                    let ordering = compare(&a, &b);
                    let result = match op {
                        OpCode::Lt => ordering == Some(Ordering::Less),
                        OpCode::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                        OpCode::Gt => ordering == Some(Ordering::Greater),
                        _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    };
                    self.stack.push(Value::Bool(result));
                }

                OpCode::Not => {
                    let value = self.pop()?;
                    let b = expect_bool(&value, op.mnemonic())?;
                    self.stack.push(Value::Bool(!b));
                }
                OpCode::And | OpCode::Or => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let (a, b) = (expect_bool(&a, op.mnemonic())?, expect_bool(&b, op.mnemonic())?);
                    let result = if op == OpCode::And { a && b } else { a || b };
                    self.stack.push(Value::Bool(result));
                }
                OpCode::AssertBool => {
                    expect_bool(self.peek()?, op.mnemonic())?;
                }

                OpCode::MakeRange | OpCode::MakeInclRange => {
                    let end = self.pop()?;
                    let start = self.pop()?;
                    let (Value::Int(start), Value::Int(end)) = (&start, &end) else {
                        return Err(RuntimeError::TypeMismatch {
                            operation: op.mnemonic(),
                            left: start.type_name(),
                            right: end.type_name(),
                        });
                    };
                    let range = Range::new(*start, *end, op == OpCode::MakeInclRange);
                    self.stack.push(Value::Range(range));
                }
                OpCode::MakeIterator => {
                    // Ranges are their own cursor
                    let value = self.peek()?;
                    if !matches!(value, Value::Range(_)) {
                        return Err(RuntimeError::UnexpectedType {
                            operation: op.mnemonic(),
                            expected: "range",
                            found: value.type_name(),
                        });
                    }
                }
                OpCode::GetNext => {
                    let current = match self.peek()? {
                        Value::Range(range) => range.start,
                        other => {
                            return Err(RuntimeError::UnexpectedType {
                                operation: op.mnemonic(),
                                expected: "iterator",
                                found: other.type_name(),
                            });
                        }
                    };
                    self.stack.push(Value::Int(current));
                }
                OpCode::Advance => match self.stack.last_mut() {
                    Some(Value::Range(range)) => range.advance(),
                    Some(other) => {
                        return Err(RuntimeError::UnexpectedType {
                            operation: op.mnemonic(),
                            expected: "iterator",
                            found: other.type_name(),
                        });
                    }
                    None => return Err(RuntimeError::StackUnderflow),
                },

                OpCode::Return => {
                    let result = self.pop()?;
                    if self.return_from_frame(result)? {
                        return Ok(());
                    }
                }
                OpCode::ReturnVoid => {
                    if self.return_from_frame(Value::Void)? {
                        return Ok(());
                    }
                }
                OpCode::ExitSuccess => {
                    debug!(globals = self.globals.len(), "Program exited");
                    return Ok(());
                }
            }
        }
    }

    fn frame(&self) -> Result<&CallFrame> {
        self.frames.last().ok_or(RuntimeError::StackUnderflow)
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames.last_mut().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn peek(&self) -> Result<&Value> {
        self.stack.last().ok_or(RuntimeError::StackUnderflow)
    }

    fn binary_arithmetic(&mut self, op: Arith) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = arithmetic(op, &a, &b)?;
        self.stack.push(result);
        Ok(())
    }

    // ========================================================================
    // Upvalues
    // ========================================================================

    /// Returns the open upvalue for a locals slot, creating it if needed.
    fn capture_upvalue(&mut self, locals_index: usize, upvalue_index: u32) -> UpvalueCell {
        if let Some(cell) = self
            .open_upvalues
            .iter()
            .find(|cell| cell.lock().locals_index as usize == locals_index)
        {
            return Arc::clone(cell);
        }
        let cell = Arc::new(Mutex::new(Upvalue::open(locals_index as u32, upvalue_index)));
        self.open_upvalues.push(Arc::clone(&cell));
        cell
    }

    /// Closes every open upvalue at or above `from`.
    fn close_upvalues(&mut self, from: usize) {
        let locals = &self.locals;
        self.open_upvalues.retain(|cell| {
            let mut upvalue = cell.lock();
            let index = upvalue.locals_index as usize;
            if index < from {
                return true;
            }
            upvalue.closed = Some(locals.get(index).cloned().unwrap_or(Value::Nil));
            false
        });
    }

    fn truncate_locals(&mut self, len: usize) {
        self.close_upvalues(len);
        self.locals.truncate(len);
    }

    fn read_upvalue(&self, cell: &UpvalueCell) -> Result<Value> {
        let upvalue = cell.lock();
        match &upvalue.closed {
            Some(value) => Ok(value.clone()),
            None => {
                let index = upvalue.locals_index as usize;
                self.locals
                    .get(index)
                    .cloned()
                    .ok_or(RuntimeError::InvalidLocal(index))
            }
        }
    }

    fn write_upvalue(&mut self, cell: &UpvalueCell, value: Value) -> Result<()> {
        let mut upvalue = cell.lock();
        if upvalue.is_closed() {
            upvalue.closed = Some(value);
            return Ok(());
        }
        let index = upvalue.locals_index as usize;
        *self
            .locals
            .get_mut(index)
            .ok_or(RuntimeError::InvalidLocal(index))? = value;
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Calls the value `argc` slots below the top of the stack.
    fn call_value(&mut self, argc: usize) -> Result<()> {
        let slot = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow)?;

        match self.stack[slot].clone() {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Function(function) => {
                self.call_closure(Arc::new(Closure::new(function, Vec::new())), argc)
            }
            Value::BoundMethod(bound) => {
                self.stack[slot] = bound.receiver.clone();
                self.call_closure(Arc::clone(&bound.method), argc)
            }
            Value::Record(record) => {
                if argc != record.fields.len() {
                    return Err(RuntimeError::ArityMismatch {
                        name: record.name.clone(),
                        expected: record.fields.len() as u32,
                        found: argc as u32,
                    });
                }
                let fields = self.stack.split_off(slot + 1);
                self.stack.truncate(slot);
                self.stack
                    .push(Value::Instance(Arc::new(Instance::new(record, fields))));
                Ok(())
            }
            Value::NativeFunction(native) => {
                if argc as u32 != native.arity {
                    return Err(RuntimeError::ArityMismatch {
                        name: native.name.clone(),
                        expected: native.arity,
                        found: argc as u32,
                    });
                }
                let args = self.stack.split_off(slot + 1);
                self.stack.truncate(slot);
                trace!(native = %native.name, argc, "call native");
                let result = (native.callback)(&args).map_err(|message| RuntimeError::Native {
                    name: native.name.clone(),
                    message,
                })?;
                self.stack.push(result);
                Ok(())
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    /// Pushes a frame whose slot 0 is the callee slot and whose following
    /// slots are the arguments.
    fn call_closure(&mut self, closure: Arc<Closure>, argc: usize) -> Result<()> {
        if argc as u32 != closure.function.arity {
            return Err(RuntimeError::ArityMismatch {
                name: closure.function.name().to_string(),
                expected: closure.function.arity,
                found: argc as u32,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }
        let slot = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow)?;

        let locals_base = self.locals.len();
        self.locals.extend(self.stack.drain(slot..));
        trace!(function = closure.function.name(), argc, depth = self.frames.len(), "call");
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            locals_base,
            stack_base: slot,
        });
        Ok(())
    }

    /// `CALL_PROPERTY`: a field holding a callable wins over a method.
    fn call_property(&mut self, name: &str, argc: usize) -> Result<()> {
        let slot = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow)?;
        let receiver = self.stack[slot].clone();

        let Value::Instance(instance) = &receiver else {
            return Err(no_such_property(&receiver, name));
        };
        if let Some(field) = instance.get(name) {
            self.stack[slot] = field;
            return self.call_value(argc);
        }
        match instance.record.method(name) {
            // The receiver already sits in the callee slot
            Some(method) => self.call_closure(method, argc),
            None => Err(no_such_property(&receiver, name)),
        }
    }

    fn get_property(&self, receiver: &Value, name: &str) -> Result<Value> {
        if let Value::Instance(instance) = receiver {
            if let Some(value) = instance.get(name) {
                return Ok(value);
            }
            if let Some(method) = instance.record.method(name) {
                return Ok(Value::BoundMethod(Arc::new(BoundMethod {
                    receiver: receiver.clone(),
                    method,
                })));
            }
        }
        Err(no_such_property(receiver, name))
    }

    /// Replaces the record below `n` closures with a copy carrying them as
    /// extra methods. The record in the constant pool is left untouched.
    fn append_methods(&mut self, n: usize) -> Result<()> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(RuntimeError::StackUnderflow)?;
        let mut methods = Vec::with_capacity(n);
        for value in self.stack.split_off(start) {
            match value {
                Value::Closure(closure) => methods.push(closure),
                other => {
                    return Err(RuntimeError::UnexpectedType {
                        operation: "APPEND_METHODS",
                        expected: "closure",
                        found: other.type_name(),
                    });
                }
            }
        }

        let record = match self.pop()? {
            Value::Record(record) => record,
            other => {
                return Err(RuntimeError::UnexpectedType {
                    operation: "APPEND_METHODS",
                    expected: "record",
                    found: other.type_name(),
                });
            }
        };
        let extended = Record::new(record.name.clone(), record.fields.clone());
        {
            let mut table = extended.methods.write();
            table.extend(record.methods.read().iter().cloned());
            table.extend(methods);
        }
        self.stack.push(Value::Record(Arc::new(extended)));
        Ok(())
    }

    /// Pops the current frame and pushes `result` for the caller. Returns
    /// true if the script frame itself returned.
    fn return_from_frame(&mut self, result: Value) -> Result<bool> {
        let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
        self.truncate_locals(frame.locals_base);
        self.stack.truncate(frame.stack_base);
        if self.frames.is_empty() {
            return Ok(true);
        }
        self.stack.push(result);
        Ok(false)
    }
}
