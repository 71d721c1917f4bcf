use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use angelscript_core::{
    ContextState, EngineProperty, FunctionType, PrimitiveKind, ReturnCode, ScriptResult,
    TypeModifiers,
};

use crate::core::engine::{Engine, EngineData};
use crate::core::function::{Function, FunctionBody};
use crate::core::script_generic::ScriptGeneric;
use crate::core::script_object::ScriptObject;
use crate::internal::thread_manager;
use crate::types::callbacks::{ExceptionCallbackFn, LineCallbackFn};
use crate::types::script_value::Value;
use crate::types::user_data::{UserData, UserDataStore, UserDataValue};
use crate::vm::machine::{Limits, Machine, Yield, NULL_POINTER};

const TOO_MANY_NESTED_CALLS: &str = "Too many nested calls";
const NESTED_STATE_NOT_RESTORED: &str = "Nested state was not popped";

/// Where and why the last exception was raised.
#[derive(Debug, Clone)]
struct ExceptionInfo {
    message: String,
    function: Option<Function>,
    line: i32,
    col: i32,
    section: Option<String>,
    catchable: bool,
}

/// Description of a local variable in a script frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: Option<String>,
    pub type_id: i32,
    pub type_modifiers: TypeModifiers,
    pub is_var_on_heap: bool,
    pub stack_offset: i32,
}

/// Everything one execution owns. Pushed aside whole by `push_state`.
struct ContextInner {
    state: ContextState,
    function: Option<Function>,
    object: Value,
    args: Vec<Value>,
    machine: Machine,
    exception: Option<ExceptionInfo>,
    system_function: Option<Function>,
    pending_exception: Option<(String, bool)>,
}

impl ContextInner {
    fn new() -> Self {
        Self {
            state: ContextState::Uninitialized,
            function: None,
            object: Value::Void,
            args: Vec::new(),
            machine: Machine::new(),
            exception: None,
            system_function: None,
            pending_exception: None,
        }
    }
}

pub(crate) struct ContextData {
    engine: Weak<EngineData>,
    inner: Mutex<ContextInner>,
    /// States saved by `push_state`, innermost last. Locked after `inner`.
    nested: Mutex<Vec<ContextInner>>,
    suspend_requested: AtomicBool,
    abort_requested: AtomicBool,
    line_callback: RwLock<Option<LineCallbackFn>>,
    exception_callback: RwLock<Option<ExceptionCallbackFn>>,
    user_data: UserDataStore,
}

/// An execution context: prepares a function, runs it, and keeps its call
/// stack while it is suspended or after it raised an exception.
///
/// ```text
/// Uninitialized -> Prepared -> Active <-> Suspended
///                                 |-> Finished | Aborted | Exception
/// ```
///
/// No lock is held while native functions or callbacks run, so they may call
/// back into the same context to suspend, abort, raise an exception or run a
/// nested call between [`push_state`](Self::push_state) and
/// [`pop_state`](Self::pop_state).
///
/// ```
/// use angelscript_runtime::prelude::*;
///
/// let engine = Engine::create();
/// let module = engine.get_module("m", GetModuleFlags::AlwaysCreate).unwrap();
/// module.add_script_section("s", "int twice(int v) { return v * 2; }", 0).unwrap();
/// module.build().unwrap();
///
/// let func = module.get_function_by_decl("int twice(int)").unwrap();
/// let ctx = engine.create_context().unwrap();
/// ctx.prepare(&func).unwrap();
/// ctx.set_arg_dword(0, 21).unwrap();
/// assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
/// assert_eq!(ctx.get_return_dword(), 42);
/// ```
#[derive(Clone)]
pub struct Context(pub(crate) Arc<ContextData>);

impl Context {
    pub(crate) fn new(engine: &Engine) -> Context {
        Context(Arc::new(ContextData {
            engine: Arc::downgrade(&engine.0),
            inner: Mutex::new(ContextInner::new()),
            nested: Mutex::new(Vec::new()),
            suspend_requested: AtomicBool::new(false),
            abort_requested: AtomicBool::new(false),
            line_callback: RwLock::new(None),
            exception_callback: RwLock::new(None),
            user_data: UserDataStore::new(),
        }))
    }

    pub fn get_engine(&self) -> Option<Engine> {
        self.0.engine.upgrade().map(Engine)
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn get_state(&self) -> ContextState {
        self.0.inner.lock().state
    }

    // Execution control

    pub fn prepare(&self, function: &Function) -> ScriptResult<()> {
        let mut inner = self.0.inner.lock();
        if matches!(inner.state, ContextState::Active | ContextState::Suspended) {
            return Err(ReturnCode::ContextActive.into());
        }
        if !Weak::ptr_eq(&function.0.engine, &self.0.engine)
            || function.get_func_type() == FunctionType::Funcdef
        {
            return Err(ReturnCode::InvalidArg.into());
        }
        if matches!(function.body(), FunctionBody::Script(_)) && function.script_code().is_none() {
            return Err(ReturnCode::NoFunction.into());
        }
        let mut prepared = ContextInner::new();
        prepared.state = ContextState::Prepared;
        prepared.args = function
            .signature()
            .params
            .iter()
            .map(|p| Value::default_for(&p.data_type))
            .collect();
        prepared.function = Some(function.clone());
        let old = std::mem::replace(&mut *inner, prepared);
        drop(inner);
        drop(old);
        tracing::trace!(function = %function.get_declaration(true, true, false), "context prepared");
        Ok(())
    }

    pub fn unprepare(&self) -> ScriptResult<()> {
        let mut inner = self.0.inner.lock();
        if matches!(inner.state, ContextState::Active | ContextState::Suspended) {
            return Err(ReturnCode::ContextActive.into());
        }
        let old = std::mem::replace(&mut *inner, ContextInner::new());
        drop(inner);
        drop(old);
        Ok(())
    }

    /// Run the prepared function, or resume a suspended one, until it
    /// finishes, suspends, aborts or raises an uncaught exception.
    pub fn execute(&self) -> ScriptResult<ContextState> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Context::execute");

        let engine = self.get_engine().ok_or(ReturnCode::Error)?;
        let limits = Limits {
            max_frames: engine.get_engine_property(EngineProperty::MaxCallStackSize),
        };
        let mut first: Option<Result<Yield, String>> = None;
        {
            let mut inner = self.0.inner.lock();
            match inner.state {
                ContextState::Prepared => {
                    let function = inner.function.clone().ok_or(ReturnCode::ContextNotPrepared)?;
                    let this = std::mem::take(&mut inner.object);
                    let args = std::mem::take(&mut inner.args);
                    inner.state = ContextState::Active;
                    let needs_object = function.get_object_type().is_some() && !function.is_constructor();
                    first = if needs_object && this.as_object().is_none() {
                        Some(Err(NULL_POINTER.to_string()))
                    } else {
                        match inner.machine.enter(function, this, args, &limits) {
                            Ok(Some(call)) => Some(Ok(Yield::Native(call))),
                            Ok(None) => None,
                            Err(message) => Some(Err(message)),
                        }
                    };
                }
                ContextState::Suspended => inner.state = ContextState::Active,
                _ => return Err(ReturnCode::ContextNotPrepared.into()),
            }
        }
        self.0.suspend_requested.store(false, Ordering::Release);
        self.0.abort_requested.store(false, Ordering::Release);

        thread_manager::push_active(self);
        let state = self.run(&engine, &limits, first);
        thread_manager::pop_active();

        tracing::debug!(state = ?state, "context execution returned");
        if state.is_terminal() {
            engine.auto_collect();
        }
        Ok(state)
    }

    fn run(&self, engine: &Engine, limits: &Limits, mut next: Option<Result<Yield, String>>) -> ContextState {
        loop {
            let step = match next.take() {
                Some(step) => step,
                None => {
                    let has_line_callback = self.0.line_callback.read().is_some();
                    let data = &self.0;
                    let stop = move || {
                        has_line_callback
                            || data.suspend_requested.load(Ordering::Acquire)
                            || data.abort_requested.load(Ordering::Acquire)
                    };
                    match self.0.inner.lock().machine.run(engine, limits, &stop) {
                        Yield::Exception(message) => Err(message),
                        other => Ok(other),
                    }
                }
            };
            match step {
                Ok(Yield::Finished) => {
                    self.0.inner.lock().state = ContextState::Finished;
                    return ContextState::Finished;
                }
                Ok(Yield::Native(call)) => {
                    let depth = self.0.nested.lock().len();
                    let function = call.function.clone();
                    self.0.inner.lock().system_function = Some(function.clone());
                    let mut generic = ScriptGeneric::new(engine.clone(), call.function, call.object, call.args);
                    (call.callable)(&mut generic);
                    let result = generic.take_return_value();
                    drop(generic);
                    let leaked = self.restore_nested(depth);

                    let mut inner = self.0.inner.lock();
                    inner.system_function = None;
                    if leaked && inner.pending_exception.is_none() {
                        inner.pending_exception = Some((NESTED_STATE_NOT_RESTORED.into(), true));
                    }
                    if let Some((message, catchable)) = inner.pending_exception.take() {
                        drop(inner);
                        drop(result);
                        match self.raise(message, catchable) {
                            Some(state) => return state,
                            None => continue,
                        }
                    }
                    inner.machine.complete_native(&function, result);
                    drop(inner);
                    if let Some(state) = self.check_interrupts() {
                        return state;
                    }
                }
                Ok(Yield::Line) => {
                    let callback = self.0.line_callback.read().clone();
                    if let Some(callback) = callback {
                        callback(self);
                    }
                    let pending = self.0.inner.lock().pending_exception.take();
                    if let Some((message, catchable)) = pending {
                        match self.raise(message, catchable) {
                            Some(state) => return state,
                            None => continue,
                        }
                    }
                    if let Some(state) = self.check_interrupts() {
                        return state;
                    }
                }
                Ok(Yield::Exception(message)) | Err(message) => {
                    if let Some(state) = self.raise(message, true) {
                        return state;
                    }
                }
            }
        }
    }

    /// Record an exception, tell the host, and unwind to a `catch` when one
    /// encloses the current position. Returns the final state when nothing
    /// catches.
    fn raise(&self, message: String, catchable: bool) -> Option<ContextState> {
        {
            let mut inner = self.0.inner.lock();
            let initial = inner.function.clone();
            let info = match inner.machine.frame_at(0) {
                Some(frame) => {
                    let (line, col) = frame.position();
                    ExceptionInfo {
                        message,
                        function: Some(frame.function.clone()),
                        line,
                        col,
                        section: frame.code.section.clone(),
                        catchable,
                    }
                }
                None => ExceptionInfo {
                    message,
                    function: initial,
                    line: 0,
                    col: 0,
                    section: None,
                    catchable,
                },
            };
            tracing::debug!(message = %info.message, line = info.line, "script exception");
            inner.exception = Some(info);
        }
        let callback = self.0.exception_callback.read().clone();
        if let Some(callback) = callback {
            callback(self);
        }
        let mut inner = self.0.inner.lock();
        if catchable && inner.machine.unwind() {
            return None;
        }
        inner.state = ContextState::Exception;
        Some(ContextState::Exception)
    }

    /// Honour abort and suspend requests at a safe point.
    fn check_interrupts(&self) -> Option<ContextState> {
        if self.0.abort_requested.load(Ordering::Acquire) {
            let old = {
                let mut inner = self.0.inner.lock();
                inner.state = ContextState::Aborted;
                std::mem::take(&mut inner.machine)
            };
            drop(old);
            return Some(ContextState::Aborted);
        }
        if self.0.suspend_requested.load(Ordering::Acquire) {
            let mut inner = self.0.inner.lock();
            if inner.machine.is_idle() {
                return None;
            }
            inner.state = ContextState::Suspended;
            self.0.suspend_requested.store(false, Ordering::Release);
            return Some(ContextState::Suspended);
        }
        None
    }

    /// Pop states a native function pushed and never popped. Returns whether
    /// any were found.
    fn restore_nested(&self, depth: usize) -> bool {
        let mut leaked = false;
        loop {
            let old = {
                let mut inner = self.0.inner.lock();
                let mut nested = self.0.nested.lock();
                if nested.len() <= depth {
                    break;
                }
                let Some(saved) = nested.pop() else {
                    break;
                };
                std::mem::replace(&mut *inner, saved)
            };
            drop(old);
            leaked = true;
        }
        leaked
    }

    /// Stop execution. A running context stops at its next safe point; a
    /// suspended one is aborted immediately.
    pub fn abort(&self) -> ScriptResult<()> {
        let mut inner = self.0.inner.lock();
        match inner.state {
            ContextState::Suspended => {
                inner.state = ContextState::Aborted;
                let old = std::mem::take(&mut inner.machine);
                drop(inner);
                drop(old);
            }
            ContextState::Active => self.0.abort_requested.store(true, Ordering::Release),
            _ => {}
        }
        Ok(())
    }

    /// Ask a running context to suspend at its next safe point.
    pub fn suspend(&self) -> ScriptResult<()> {
        if self.get_state() == ContextState::Active {
            self.0.suspend_requested.store(true, Ordering::Release);
        }
        Ok(())
    }

    // Nested execution

    /// Save the running execution so the context can run another function.
    /// Only valid from a native function called by this context.
    pub fn push_state(&self) -> ScriptResult<()> {
        let max_nested = self
            .get_engine()
            .map_or(0, |e| e.get_engine_property(EngineProperty::MaxNestedCalls));
        let mut inner = self.0.inner.lock();
        if inner.state != ContextState::Active {
            return Err(ReturnCode::Error.into());
        }
        let mut nested = self.0.nested.lock();
        if nested.len() >= max_nested {
            inner.pending_exception = Some((TOO_MANY_NESTED_CALLS.into(), true));
            return Err(ReturnCode::Error.into());
        }
        nested.push(std::mem::replace(&mut *inner, ContextInner::new()));
        tracing::trace!(depth = nested.len(), "context state pushed");
        Ok(())
    }

    /// Restore the execution saved by the matching [`push_state`](Self::push_state).
    pub fn pop_state(&self) -> ScriptResult<()> {
        let old = {
            let mut inner = self.0.inner.lock();
            let mut nested = self.0.nested.lock();
            if nested.is_empty() || matches!(inner.state, ContextState::Active | ContextState::Suspended) {
                return Err(ReturnCode::Error.into());
            }
            let Some(saved) = nested.pop() else {
                return Err(ReturnCode::Error.into());
            };
            std::mem::replace(&mut *inner, saved)
        };
        drop(old);
        Ok(())
    }

    /// Whether a state is pushed, and how many.
    pub fn is_nested(&self) -> (bool, u32) {
        let count = self.0.nested.lock().len() as u32;
        (count > 0, count)
    }

    // Arguments

    /// Object the prepared method is called on.
    pub fn set_object(&self, object: Option<ScriptObject>) -> ScriptResult<()> {
        let mut inner = self.0.inner.lock();
        if inner.state != ContextState::Prepared {
            return Err(ReturnCode::ContextNotPrepared.into());
        }
        let is_method = inner.function.as_ref().is_some_and(|f| f.get_object_type().is_some());
        if !is_method {
            return Err(ReturnCode::Error.into());
        }
        let old = std::mem::replace(&mut inner.object, Value::Object(object));
        drop(inner);
        drop(old);
        Ok(())
    }

    fn set_arg(&self, index: u32, make: impl FnOnce(&crate::types::data_type::DataType) -> ScriptResult<Value>) -> ScriptResult<()> {
        let mut inner = self.0.inner.lock();
        if inner.state != ContextState::Prepared {
            return Err(ReturnCode::ContextNotPrepared.into());
        }
        let param = inner
            .function
            .as_ref()
            .and_then(|f| f.get_param(index))
            .ok_or(ReturnCode::InvalidArg)?;
        let value = make(&param.data_type)?;
        let slot = inner.args.get_mut(index as usize).ok_or(ReturnCode::InvalidArg)?;
        let old = std::mem::replace(slot, value);
        drop(inner);
        drop(old);
        Ok(())
    }

    fn set_arg_bits(&self, index: u32, width: u32, bits: u64) -> ScriptResult<()> {
        self.set_arg(index, |ty| match ty.primitive_kind() {
            Some(kind) if kind != PrimitiveKind::Void && kind.size() == width => Ok(Value::from_bits(kind, bits)),
            _ => Err(ReturnCode::InvalidType.into()),
        })
    }

    pub fn set_arg_byte(&self, index: u32, value: u8) -> ScriptResult<()> {
        self.set_arg_bits(index, 1, value as u64)
    }

    pub fn set_arg_word(&self, index: u32, value: u16) -> ScriptResult<()> {
        self.set_arg_bits(index, 2, value as u64)
    }

    pub fn set_arg_dword(&self, index: u32, value: u32) -> ScriptResult<()> {
        self.set_arg_bits(index, 4, value as u64)
    }

    pub fn set_arg_qword(&self, index: u32, value: u64) -> ScriptResult<()> {
        self.set_arg_bits(index, 8, value)
    }

    pub fn set_arg_float(&self, index: u32, value: f32) -> ScriptResult<()> {
        self.set_arg(index, |ty| match ty.primitive_kind() {
            Some(PrimitiveKind::Float) => Ok(Value::Float(value)),
            _ => Err(ReturnCode::InvalidType.into()),
        })
    }

    pub fn set_arg_double(&self, index: u32, value: f64) -> ScriptResult<()> {
        self.set_arg(index, |ty| match ty.primitive_kind() {
            Some(PrimitiveKind::Double) => Ok(Value::Double(value)),
            _ => Err(ReturnCode::InvalidType.into()),
        })
    }

    /// Pass an object or handle. `None` is only accepted for handles.
    pub fn set_arg_object(&self, index: u32, object: Option<ScriptObject>) -> ScriptResult<()> {
        self.set_arg(index, |ty| {
            if !ty.is_object() || ty.is_string() {
                return Err(ReturnCode::InvalidType.into());
            }
            Value::Object(object).coerce(ty).ok_or_else(|| ReturnCode::InvalidType.into())
        })
    }

    /// Pass any value, converting primitives to the parameter type.
    pub fn set_arg_value(&self, index: u32, value: impl Into<Value>) -> ScriptResult<()> {
        let value = value.into();
        self.set_arg(index, |ty| value.coerce(ty).ok_or_else(|| ReturnCode::InvalidType.into()))
    }

    pub(crate) fn get_address_of_arg(&self, index: u32) -> *mut c_void {
        let inner = self.0.inner.lock();
        if inner.state != ContextState::Prepared {
            return std::ptr::null_mut();
        }
        inner
            .args
            .get(index as usize)
            .map_or(std::ptr::null_mut(), Value::payload_ptr)
    }

    // Return value

    fn return_bits(&self) -> u64 {
        let inner = self.0.inner.lock();
        if inner.state != ContextState::Finished {
            return 0;
        }
        inner.machine.return_value.to_bits()
    }

    pub fn get_return_byte(&self) -> u8 {
        self.return_bits() as u8
    }

    pub fn get_return_word(&self) -> u16 {
        self.return_bits() as u16
    }

    pub fn get_return_dword(&self) -> u32 {
        self.return_bits() as u32
    }

    pub fn get_return_qword(&self) -> u64 {
        self.return_bits()
    }

    pub fn get_return_float(&self) -> f32 {
        f32::from_bits(self.return_bits() as u32)
    }

    pub fn get_return_double(&self) -> f64 {
        f64::from_bits(self.return_bits())
    }

    pub fn get_return_object(&self) -> Option<ScriptObject> {
        self.get_return_value().as_object().cloned()
    }

    /// The returned value, or `Void` unless the context finished.
    pub fn get_return_value(&self) -> Value {
        let inner = self.0.inner.lock();
        if inner.state != ContextState::Finished {
            return Value::Void;
        }
        inner.machine.return_value.clone()
    }

    pub(crate) fn get_address_of_return_value(&self) -> *mut c_void {
        let inner = self.0.inner.lock();
        if inner.state != ContextState::Finished {
            return std::ptr::null_mut();
        }
        inner.machine.return_value.payload_ptr()
    }

    // Exception handling

    /// Raise a script exception from a native function or a callback.
    pub fn set_exception(&self, message: &str, allow_catch: bool) -> ScriptResult<()> {
        let mut inner = self.0.inner.lock();
        if inner.state != ContextState::Active {
            return Err(ReturnCode::Error.into());
        }
        inner.pending_exception = Some((message.to_string(), allow_catch));
        Ok(())
    }

    /// Line, column and section of the last exception.
    pub fn get_exception_line_number(&self) -> (i32, Option<i32>, Option<String>) {
        match &self.0.inner.lock().exception {
            Some(info) => (info.line, Some(info.col), info.section.clone()),
            None => (0, None, None),
        }
    }

    pub fn get_exception_function(&self) -> Option<Function> {
        self.0.inner.lock().exception.as_ref()?.function.clone()
    }

    pub fn get_exception_string(&self) -> Option<String> {
        self.0.inner.lock().exception.as_ref().map(|e| e.message.clone())
    }

    /// Whether the exception being raised will land in a script `catch`.
    pub fn will_exception_be_caught(&self) -> bool {
        let inner = self.0.inner.lock();
        let catchable = inner.exception.as_ref().is_some_and(|e| e.catchable);
        catchable && inner.machine.frames.iter().any(|f| !f.try_blocks.is_empty())
    }

    pub fn set_exception_callback(&self, callback: ExceptionCallbackFn) -> ScriptResult<()> {
        *self.0.exception_callback.write() = Some(callback);
        Ok(())
    }

    pub fn clear_exception_callback(&self) -> ScriptResult<()> {
        *self.0.exception_callback.write() = None;
        Ok(())
    }

    /// Install a callback invoked at every statement. It may call
    /// [`suspend`](Self::suspend) or [`abort`](Self::abort).
    pub fn set_line_callback(&self, callback: LineCallbackFn) -> ScriptResult<()> {
        *self.0.line_callback.write() = Some(callback);
        Ok(())
    }

    pub fn clear_line_callback(&self) -> ScriptResult<()> {
        *self.0.line_callback.write() = None;
        Ok(())
    }

    // Call stack inspection

    pub fn get_callstack_size(&self) -> u32 {
        self.0.inner.lock().machine.frames.len() as u32
    }

    pub fn get_function(&self, stack_level: u32) -> Option<Function> {
        let inner = self.0.inner.lock();
        inner.machine.frame_at(stack_level).map(|f| f.function.clone())
    }

    pub fn get_line_number(&self, stack_level: u32) -> (i32, Option<i32>, Option<String>) {
        let inner = self.0.inner.lock();
        match inner.machine.frame_at(stack_level) {
            Some(frame) => {
                let (line, col) = frame.position();
                (line, Some(col), frame.code.section.clone())
            }
            None => (0, None, None),
        }
    }

    // Variable inspection

    pub fn get_var_count(&self, stack_level: u32) -> i32 {
        let inner = self.0.inner.lock();
        match inner.machine.frame_at(stack_level) {
            Some(frame) => frame.code.visible_locals().count() as i32,
            None => ReturnCode::InvalidArg.code(),
        }
    }

    /// Slot of the `var_index`-th visible variable.
    fn var_slot(frame: &crate::vm::machine::Frame, var_index: u32) -> Option<usize> {
        frame.code.visible_locals().nth(var_index as usize).map(|(slot, _)| slot)
    }

    pub fn get_var(&self, var_index: u32, stack_level: u32) -> ScriptResult<VariableInfo> {
        let inner = self.0.inner.lock();
        let frame = inner.machine.frame_at(stack_level).ok_or(ReturnCode::InvalidArg)?;
        let slot = Self::var_slot(frame, var_index).ok_or(ReturnCode::InvalidArg)?;
        let var = &frame.code.locals[slot];
        let mut type_modifiers = TypeModifiers::empty();
        if var.data_type.is_const {
            type_modifiers |= TypeModifiers::CONST;
        }
        Ok(VariableInfo {
            name: Some(var.name.clone()),
            type_id: var.data_type.type_id(),
            type_modifiers,
            is_var_on_heap: var.data_type.is_object(),
            stack_offset: slot as i32,
        })
    }

    pub fn get_var_declaration(&self, var_index: u32, stack_level: u32, include_namespace: bool) -> Option<String> {
        let inner = self.0.inner.lock();
        let frame = inner.machine.frame_at(stack_level)?;
        let slot = Self::var_slot(frame, var_index)?;
        let var = &frame.code.locals[slot];
        Some(format!("{} {}", var.data_type.declaration(include_namespace), var.name))
    }

    /// Current value of a local variable.
    pub fn get_var_value(&self, var_index: u32, stack_level: u32) -> Option<Value> {
        let inner = self.0.inner.lock();
        let frame = inner.machine.frame_at(stack_level)?;
        let slot = Self::var_slot(frame, var_index)?;
        frame.locals.get(slot).cloned()
    }

    pub(crate) fn get_address_of_var(&self, var_index: u32, stack_level: u32) -> *mut c_void {
        let mut inner = self.0.inner.lock();
        let Some(frame) = inner.machine.frame_at_mut(stack_level) else {
            return std::ptr::null_mut();
        };
        match Self::var_slot(frame, var_index) {
            Some(slot) => frame.locals.get(slot).map_or(std::ptr::null_mut(), Value::payload_ptr),
            None => std::ptr::null_mut(),
        }
    }

    pub fn is_var_in_scope(&self, var_index: u32, stack_level: u32) -> bool {
        let inner = self.0.inner.lock();
        let Some(frame) = inner.machine.frame_at(stack_level) else {
            return false;
        };
        Self::var_slot(frame, var_index).is_some_and(|slot| frame.code.is_in_scope(slot, frame.current_pc()))
    }

    // This pointer

    pub fn get_this_type_id(&self, stack_level: u32) -> i32 {
        self.get_this_object(stack_level).map_or(0, |o| o.get_type_id())
    }

    pub fn get_this_object(&self, stack_level: u32) -> Option<ScriptObject> {
        let inner = self.0.inner.lock();
        inner.machine.frame_at(stack_level)?.this.as_object().cloned()
    }

    /// Native function currently called by this context.
    pub fn get_system_function(&self) -> Option<Function> {
        self.0.inner.lock().system_function.clone()
    }

    // User data

    pub fn set_user_data<T: UserData>(&self, data: T) -> Option<UserDataValue> {
        self.0.user_data.set(data)
    }

    pub fn get_user_data<T: UserData>(&self) -> Option<Arc<T>> {
        self.0.user_data.get::<T>()
    }

    pub(crate) fn user_data_store(&self) -> &UserDataStore {
        &self.0.user_data
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("state", &self.get_state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn build(engine: &Engine, code: &str) -> Module {
        let module = engine.get_module("test", GetModuleFlags::AlwaysCreate).unwrap();
        module.add_script_section("test", code, 0).unwrap();
        module.build().unwrap();
        module
    }

    #[test]
    fn fresh_context_is_uninitialized() {
        let engine = Engine::create();
        let ctx = engine.create_context().unwrap();
        assert_eq!(ctx.get_state(), ContextState::Uninitialized);
        assert_eq!(
            ctx.execute().unwrap_err().return_code(),
            ReturnCode::ContextNotPrepared
        );
        assert!(ctx.unprepare().is_ok());
    }

    #[test]
    fn arguments_are_width_checked() {
        let engine = Engine::create();
        let module = build(&engine, "double scale(double v, int8 f) { return v * f; }");
        let func = module.get_function_by_name("scale").unwrap();
        let ctx = engine.create_context().unwrap();
        ctx.prepare(&func).unwrap();
        assert_eq!(ctx.set_arg_dword(0, 1).unwrap_err().return_code(), ReturnCode::InvalidType);
        assert_eq!(ctx.set_arg_double(5, 1.0).unwrap_err().return_code(), ReturnCode::InvalidArg);
        ctx.set_arg_double(0, 1.5).unwrap();
        ctx.set_arg_byte(1, 4).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(ctx.get_return_double(), 6.0);
    }

    #[test]
    fn exceptions_report_location() {
        let engine = Engine::create();
        let module = build(&engine, "int f(int d)\n{\n  return 10 / d;\n}");
        let func = module.get_function_by_name("f").unwrap();
        let ctx = engine.create_context().unwrap();
        ctx.prepare(&func).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Exception);
        assert_eq!(ctx.get_exception_string().as_deref(), Some("Divide by zero"));
        assert_eq!(ctx.get_exception_line_number().0, 3);
        assert_eq!(ctx.get_exception_function(), Some(func));
        assert_eq!(ctx.get_callstack_size(), 1);
        assert_eq!(ctx.get_var_value(0, 0), Some(Value::Int32(0)));
    }

    #[test]
    fn line_callback_can_suspend() {
        let engine = Engine::create();
        let module = build(&engine, "int f() { int a = 1; a += 1; return a; }");
        let func = module.get_function_by_name("f").unwrap();
        let ctx = engine.create_context().unwrap();
        let lines = Arc::new(AtomicUsize::new(0));
        let seen = lines.clone();
        ctx.set_line_callback(Arc::new(move |ctx: &Context| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                ctx.suspend().unwrap();
            }
        }))
        .unwrap();
        ctx.prepare(&func).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Suspended);
        assert_eq!(ctx.prepare(&func).unwrap_err().return_code(), ReturnCode::ContextActive);
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(ctx.get_return_dword(), 2);
        assert!(lines.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn abort_while_suspended_unwinds() {
        let engine = Engine::create();
        let module = build(&engine, "void f() { int a = 1; a = 2; }");
        let func = module.get_function_by_name("f").unwrap();
        let ctx = engine.create_context().unwrap();
        ctx.set_line_callback(Arc::new(|ctx: &Context| {
            ctx.suspend().unwrap();
        }))
        .unwrap();
        ctx.prepare(&func).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Suspended);
        ctx.abort().unwrap();
        assert_eq!(ctx.get_state(), ContextState::Aborted);
        assert_eq!(ctx.get_callstack_size(), 0);
    }

    #[test]
    fn push_and_pop_restore_the_running_state() {
        let engine = Engine::create();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        engine
            .register_global_function("void nest()", move |generic: &mut ScriptGeneric| {
                let ctx = get_active_context().unwrap();
                ctx.push_state().unwrap();
                sink.lock().push((ctx.get_state(), ctx.is_nested()));
                ctx.pop_state().unwrap();
                sink.lock().push((ctx.get_state(), ctx.is_nested()));
                let _ = generic;
            })
            .unwrap();
        let module = build(&engine, "void f() { nest(); }");
        let func = module.get_function_by_name("f").unwrap();
        let ctx = engine.create_context().unwrap();
        ctx.prepare(&func).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(
            *observed.lock(),
            vec![
                (ContextState::Uninitialized, (true, 1)),
                (ContextState::Active, (false, 0)),
            ]
        );
    }

    #[test]
    fn unprepare_while_active_leaves_the_run_intact() {
        let engine = Engine::create();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        engine
            .register_global_function("void interrupt()", move |_: &mut ScriptGeneric| {
                let ctx = get_active_context().unwrap();
                let result = ctx.unprepare().map_err(|e| e.return_code());
                sink.lock().push((result, ctx.get_state()));
            })
            .unwrap();
        let module = build(&engine, "int f(int v) { int r = v + 3; interrupt(); return r; }");
        let ctx = engine.create_context().unwrap();
        ctx.prepare(&module.get_function_by_name("f").unwrap()).unwrap();
        ctx.set_arg_dword(0, 4).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(ctx.get_return_dword(), 7);
        assert_eq!(
            *observed.lock(),
            vec![(Err(ReturnCode::ContextActive), ContextState::Active)]
        );
    }

    #[test]
    fn set_exception_from_native_is_catchable() {
        let engine = Engine::create();
        engine
            .register_global_function("void fail()", |_: &mut ScriptGeneric| {
                let ctx = get_active_context().unwrap();
                ctx.set_exception("host failure", true).unwrap();
            })
            .unwrap();
        let module = build(
            &engine,
            "int f() { try { fail(); return 1; } catch { return 2; } return 3; }\nvoid g() { fail(); }",
        );
        let ctx = engine.create_context().unwrap();
        ctx.prepare(&module.get_function_by_name("f").unwrap()).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(ctx.get_return_dword(), 2);

        ctx.prepare(&module.get_function_by_name("g").unwrap()).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Exception);
        assert_eq!(ctx.get_exception_string().as_deref(), Some("host failure"));
    }
}
