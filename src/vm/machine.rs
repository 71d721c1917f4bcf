//! The resumable interpreter behind a context.
//!
//! [`Machine::run`] executes until it reaches something only the owning
//! context can do with no lock held: a native call, a line cue while the
//! host wants to be told about statements, or an exception. It then returns
//! a [`Yield`] and can be resumed later from exactly that point, which is
//! what makes suspend, nested execution and host callbacks possible.

use std::sync::Arc;

use crate::core::engine::Engine;
use crate::core::function::{Function, FunctionBody};
use crate::core::script_object::ScriptObject;
use crate::types::callbacks::GenericFn;
use crate::types::script_value::Value;
use crate::vm::instruction::Instr;
use crate::vm::ops;
use crate::vm::script_code::ScriptCode;

pub(crate) const NULL_POINTER: &str = "Null pointer access";
pub(crate) const STACK_OVERFLOW: &str = "Stack overflow";
pub(crate) const UNBOUND_FUNCTION: &str = "Unbound function called";
pub(crate) const DISCARDED_FUNCTION: &str = "Called a function whose module was discarded";
pub(crate) const COPY_FAILED: &str = "Object cannot be copied";

#[derive(Debug, Clone, Copy)]
pub(crate) struct TryBlock {
    pub(crate) catch_pc: usize,
    pub(crate) stack_depth: usize,
}

/// One script function activation.
pub(crate) struct Frame {
    pub(crate) function: Function,
    pub(crate) code: Arc<ScriptCode>,
    /// Next instruction to execute.
    pub(crate) pc: usize,
    pub(crate) locals: Vec<Value>,
    pub(crate) stack_base: usize,
    pub(crate) try_blocks: Vec<TryBlock>,
    pub(crate) this: Value,
    /// Constructor run by `New`: the frame evaluates to `this`.
    pub(crate) returns_this: bool,
}

impl Frame {
    /// Instruction currently executing, or about to.
    pub(crate) fn current_pc(&self) -> usize {
        self.pc.saturating_sub(1)
    }

    pub(crate) fn position(&self) -> (i32, i32) {
        self.code.line_at(self.current_pc())
    }
}

/// A call into a host function, performed by the context.
pub(crate) struct NativeCall {
    pub(crate) function: Function,
    pub(crate) callable: GenericFn,
    pub(crate) object: Value,
    pub(crate) args: Vec<Value>,
}

pub(crate) enum Yield {
    Native(NativeCall),
    /// A statement boundary was reached while the context asked to stop at
    /// lines.
    Line,
    Exception(String),
    Finished,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Limits {
    /// Maximum number of script frames, 0 for no limit.
    pub(crate) max_frames: usize,
}

enum Target {
    Script(Option<Arc<ScriptCode>>),
    Native(GenericFn),
    Redirect(Function, Option<Value>),
    Unbound,
}

#[derive(Default)]
pub(crate) struct Machine {
    pub(crate) frames: Vec<Frame>,
    pub(crate) stack: Vec<Value>,
    pub(crate) return_value: Value,
}

impl Machine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    /// Start a call of `function`. Script functions get a frame; natives are
    /// handed back for the caller to run.
    pub(crate) fn enter(
        &mut self,
        function: Function,
        this: Value,
        args: Vec<Value>,
        limits: &Limits,
    ) -> Result<Option<NativeCall>, String> {
        let function = resolve_virtual(&function, &this);
        self.invoke(function, this, args, false, limits)
    }

    fn invoke(
        &mut self,
        function: Function,
        this: Value,
        args: Vec<Value>,
        returns_this: bool,
        limits: &Limits,
    ) -> Result<Option<NativeCall>, String> {
        let target = match function.body() {
            FunctionBody::Script(_) => Target::Script(function.script_code()),
            FunctionBody::Native(callable) => Target::Native(callable.clone()),
            FunctionBody::Imported(_) => match function.import_binding() {
                Some(bound) => Target::Redirect(bound, None),
                None => Target::Unbound,
            },
            FunctionBody::Delegate { object, method } => {
                Target::Redirect(method.clone(), Some(Value::Object(Some(object.clone()))))
            }
            FunctionBody::Interface | FunctionBody::Funcdef => Target::Unbound,
        };
        match target {
            Target::Script(Some(code)) => {
                self.push_frame(function, code, this, args, returns_this, limits)?;
                Ok(None)
            }
            Target::Script(None) => Err(DISCARDED_FUNCTION.into()),
            Target::Native(callable) => Ok(Some(NativeCall {
                function,
                callable,
                object: this,
                args,
            })),
            Target::Redirect(target, bound_this) => {
                let this = bound_this.unwrap_or(this);
                let target = resolve_virtual(&target, &this);
                self.invoke(target, this, args, returns_this, limits)
            }
            Target::Unbound => Err(UNBOUND_FUNCTION.into()),
        }
    }

    fn push_frame(
        &mut self,
        function: Function,
        code: Arc<ScriptCode>,
        this: Value,
        mut args: Vec<Value>,
        returns_this: bool,
        limits: &Limits,
    ) -> Result<(), String> {
        if limits.max_frames != 0 && self.frames.len() >= limits.max_frames {
            return Err(STACK_OVERFLOW.into());
        }
        args.truncate(code.param_count as usize);
        let mut locals = args;
        locals.extend(
            code.locals[locals.len()..]
                .iter()
                .map(|var| Value::default_for(&var.data_type)),
        );
        self.frames.push(Frame {
            function,
            code,
            pc: 0,
            locals,
            stack_base: self.stack.len(),
            try_blocks: Vec::new(),
            this,
            returns_this,
        });
        Ok(())
    }

    /// Deliver the result of a native call made on behalf of the top frame,
    /// or of the whole execution when no frame is left.
    pub(crate) fn complete_native(&mut self, function: &Function, result: Value) {
        if self.frames.is_empty() {
            self.return_value = result;
        } else if !function.signature().return_type.is_void() {
            self.stack.push(result);
        }
    }

    /// Run until the next yield point.
    pub(crate) fn run(&mut self, engine: &Engine, limits: &Limits, stop_at_line: &dyn Fn() -> bool) -> Yield {
        loop {
            let Some(frame) = self.frames.last() else {
                return Yield::Finished;
            };
            let code = Arc::clone(&frame.code);
            let depth = self.frames.len();
            match self.run_frame(&code, depth, engine, limits, stop_at_line) {
                Ok(Some(yielded)) => return yielded,
                Ok(None) => {}
                Err(message) => return Yield::Exception(message),
            }
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    fn pop_args(&mut self, argc: u32) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(argc as usize);
        self.stack.split_off(at)
    }

    fn top(&mut self) -> Result<&mut Frame, String> {
        self.frames
            .last_mut()
            .ok_or_else(|| "Call stack is empty".to_string())
    }

    /// Execute the top frame until it returns, calls, or yields.
    fn run_frame(
        &mut self,
        code: &ScriptCode,
        depth: usize,
        engine: &Engine,
        limits: &Limits,
        stop_at_line: &dyn Fn() -> bool,
    ) -> Result<Option<Yield>, String> {
        while self.frames.len() == depth {
            let frame = self.top()?;
            let pc = frame.pc;
            frame.pc = pc + 1;
            let Some(instr) = code.instructions.get(pc) else {
                // falling off the end of a void function
                self.do_return(Value::Void)?;
                continue;
            };
            match instr {
                Instr::PushConst(value) => self.stack.push(value.clone()),
                Instr::LoadLocal(index) => {
                    let value = self.top()?.locals.get(*index as usize).cloned().unwrap_or_default();
                    self.stack.push(value);
                }
                Instr::StoreLocal(index) => {
                    let value = self.stack.last().cloned().unwrap_or_default();
                    let frame = self.top()?;
                    if let Some(slot) = frame.locals.get_mut(*index as usize) {
                        let old = std::mem::replace(slot, value);
                        drop(old);
                    }
                }
                Instr::ClearLocal(index) => {
                    let index = *index as usize;
                    let reset = code.locals.get(index).map(|var| Value::default_for(&var.data_type));
                    let frame = self.top()?;
                    if let (Some(slot), Some(reset)) = (frame.locals.get_mut(index), reset) {
                        let old = std::mem::replace(slot, reset);
                        drop(old);
                    }
                }
                Instr::LoadGlobal(slot) => self.stack.push(slot.get()),
                Instr::StoreGlobal(slot) => {
                    let value = self.stack.last().cloned().unwrap_or_default();
                    slot.set(value);
                }
                Instr::LoadField(index) => {
                    let object = self.pop();
                    let Value::Object(Some(object)) = object else {
                        return Err(NULL_POINTER.into());
                    };
                    self.stack.push(object.get_property(*index).unwrap_or_default());
                }
                Instr::StoreField(index) => {
                    let value = self.pop();
                    let Value::Object(Some(object)) = self.pop() else {
                        return Err(NULL_POINTER.into());
                    };
                    let old = object
                        .0
                        .props
                        .lock()
                        .get_mut(*index as usize)
                        .map(|slot| std::mem::replace(slot, value.clone()));
                    drop(old);
                    self.stack.push(value);
                }
                Instr::LoadThis => {
                    let this = self.top()?.this.clone();
                    self.stack.push(this);
                }
                Instr::Pop => drop(self.pop()),
                Instr::Dup => {
                    let value = self.stack.last().cloned().unwrap_or_default();
                    self.stack.push(value);
                }
                Instr::Arith(op, kind) => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = ops::arith(*op, *kind, &a, &b)?;
                    self.stack.push(result);
                }
                Instr::Compare(op, kind) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(ops::compare(*op, *kind, &a, &b)));
                }
                Instr::CompareStr(op) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(ops::compare_str(*op, &a, &b)));
                }
                Instr::Identity(negate) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a.same_identity(&b) != *negate));
                }
                Instr::Not => {
                    let value = self.pop();
                    self.stack.push(Value::Bool(!value.as_bool()));
                }
                Instr::Neg(kind) => {
                    let value = self.pop();
                    self.stack.push(ops::neg(*kind, &value));
                }
                Instr::BitNot(kind) => {
                    let value = self.pop();
                    self.stack.push(ops::bit_not(*kind, &value));
                }
                Instr::Convert(kind) => {
                    let value = self.pop();
                    self.stack.push(value.convert(*kind));
                }
                Instr::Concat => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::from(format!("{a}{b}").as_str()));
                }
                Instr::Jump(target) => self.top()?.pc = *target,
                Instr::JumpIfFalse(target) => {
                    if !self.pop().as_bool() {
                        self.top()?.pc = *target;
                    }
                }
                Instr::JumpIfTrue(target) => {
                    if self.pop().as_bool() {
                        self.top()?.pc = *target;
                    }
                }
                Instr::Call { function, argc } => {
                    let function = upgrade(function)?;
                    let args = self.pop_args(*argc);
                    if let Some(call) = self.invoke(function, Value::Void, args, false, limits)? {
                        return Ok(Some(Yield::Native(call)));
                    }
                }
                Instr::CallImport { function, argc } => {
                    let function = upgrade(function)?;
                    let args = self.pop_args(*argc);
                    if let Some(call) = self.invoke(function, Value::Void, args, false, limits)? {
                        return Ok(Some(Yield::Native(call)));
                    }
                }
                Instr::CallMethod { function, argc, is_virtual } => {
                    let function = upgrade(function)?;
                    let args = self.pop_args(*argc);
                    let object = self.pop();
                    if object.is_null() {
                        return Err(NULL_POINTER.into());
                    }
                    let function = if *is_virtual { resolve_virtual(&function, &object) } else { function };
                    if let Some(call) = self.invoke(function, object, args, false, limits)? {
                        return Ok(Some(Yield::Native(call)));
                    }
                }
                Instr::CallPtr { argc } => {
                    let args = self.pop_args(*argc);
                    let Value::Function(Some(function)) = self.pop() else {
                        return Err(NULL_POINTER.into());
                    };
                    if let Some(call) = self.invoke(function, Value::Void, args, false, limits)? {
                        return Ok(Some(Yield::Native(call)));
                    }
                }
                Instr::New { type_info, ctor, argc } => {
                    let args = self.pop_args(*argc);
                    let object = ScriptObject::new_uninitialized(type_info);
                    match ctor.upgrade() {
                        Some(ctor) => {
                            let this = Value::Object(Some(object));
                            if let Some(call) = self.invoke(Function(ctor), this, args, true, limits)? {
                                return Ok(Some(Yield::Native(call)));
                            }
                        }
                        None => self.stack.push(Value::Object(Some(object))),
                    }
                }
                Instr::Return => self.do_return(Value::Void)?,
                Instr::ReturnValue => {
                    let value = self.pop();
                    self.do_return(value)?;
                }
                Instr::Line(..) => {
                    if stop_at_line() {
                        return Ok(Some(Yield::Line));
                    }
                }
                Instr::Cast(target) => {
                    let value = self.pop();
                    let keep = value
                        .as_object()
                        .is_some_and(|o| o.get_object_type().is_assignable_to(target));
                    self.stack.push(if keep { value } else { Value::Object(None) });
                }
                Instr::CopyObject => {
                    let value = self.pop();
                    let copy = match value {
                        Value::Object(Some(object)) => {
                            let copy = object.deep_copy().map_err(|_| COPY_FAILED.to_string())?;
                            Value::Object(Some(copy))
                        }
                        Value::Object(None) => return Err(NULL_POINTER.into()),
                        other => other,
                    };
                    self.stack.push(copy);
                }
                Instr::AssignObject => {
                    let source = self.pop();
                    let target = self.pop();
                    match (&target, &source) {
                        (Value::Object(Some(dst)), Value::Object(Some(src))) => {
                            dst.copy_from(src).map_err(|_| COPY_FAILED.to_string())?;
                        }
                        (Value::Object(_), Value::Object(_)) => return Err(NULL_POINTER.into()),
                        _ => {}
                    }
                    self.stack.push(target);
                }
                Instr::TryBegin(catch_pc) => {
                    let stack_depth = self.stack.len();
                    self.top()?.try_blocks.push(TryBlock {
                        catch_pc: *catch_pc,
                        stack_depth,
                    });
                }
                Instr::TryEnd => {
                    self.top()?.try_blocks.pop();
                }
                Instr::MakeDelegate(method) => {
                    let method = upgrade(method)?;
                    let Value::Object(Some(object)) = self.pop() else {
                        return Err(NULL_POINTER.into());
                    };
                    let delegate = engine
                        .create_delegate(&method, &object)
                        .map_err(|e| e.to_string())?;
                    self.stack.push(Value::Function(Some(delegate)));
                }
                Instr::PushFunction(function) => {
                    let function = upgrade(function)?;
                    self.stack.push(Value::Function(Some(function)));
                }
            }
        }
        Ok(None)
    }

    fn do_return(&mut self, value: Value) -> Result<(), String> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| "Call stack is empty".to_string())?;
        let pushes = frame.returns_this || !frame.function.signature().return_type.is_void();
        let result = if frame.returns_this { frame.this.clone() } else { value };
        let leftovers = self.stack.split_off(frame.stack_base.min(self.stack.len()));
        drop(leftovers);
        drop(frame);
        if self.frames.is_empty() {
            self.return_value = result;
        } else if pushes {
            self.stack.push(result);
        }
        Ok(())
    }

    /// Transfer control to the innermost enclosing `catch`. Returns `false`
    /// when nothing catches, leaving the call stack intact for inspection.
    pub(crate) fn unwind(&mut self) -> bool {
        let Some(index) = self.frames.iter().rposition(|f| !f.try_blocks.is_empty()) else {
            return false;
        };
        let dropped: Vec<Frame> = self.frames.drain(index + 1..).collect();
        let frame = &mut self.frames[index];
        let Some(block) = frame.try_blocks.pop() else {
            return false;
        };
        frame.pc = block.catch_pc;
        let leftovers = self.stack.split_off(block.stack_depth.min(self.stack.len()));
        drop(leftovers);
        drop(dropped);
        true
    }

    /// Frame `level` counted from the innermost.
    pub(crate) fn frame_at(&self, level: u32) -> Option<&Frame> {
        self.frames.iter().rev().nth(level as usize)
    }

    pub(crate) fn frame_at_mut(&mut self, level: u32) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().nth(level as usize)
    }
}

fn upgrade(function: &std::sync::Weak<crate::core::function::FunctionData>) -> Result<Function, String> {
    function
        .upgrade()
        .map(Function)
        .ok_or_else(|| DISCARDED_FUNCTION.to_string())
}

/// The implementation of `function` for the runtime type of `object`.
pub(crate) fn resolve_virtual(function: &Function, object: &Value) -> Function {
    let Some(object) = object.as_object() else {
        return function.clone();
    };
    if function.get_object_type().is_none() {
        return function.clone();
    }
    let object_type = object.get_object_type();
    let details = object_type.details().read();
    details
        .methods
        .iter()
        .find(|m| m.get_name() == function.get_name() && m.signature().same_params(function.signature()))
        .cloned()
        .unwrap_or_else(|| function.clone())
}
