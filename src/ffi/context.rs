//! `asContext_*`.

use std::ffi::{c_char, c_int, c_void};
use std::sync::Arc;

use angelscript_core::{as_bool, from_as_bool, CallingConvention, ContextState, ReturnCode, AS_FALSE};

use crate::core::context::Context;
use crate::core::function::Function;
use crate::types::callbacks::LineCallbackFn;

use super::types::*;

const EXECUTION_ERROR: c_int = ContextState::Error as c_int;

unsafe fn context(ptr: *mut asIScriptContext) -> Option<Context> {
    unsafe { from_ptr::<Context>(ptr) }
}

/// Wrap a C context callback. Only the C calling convention is accepted.
fn context_callback(callback: asCONTEXTCALLBACK_t, param: *mut c_void, call_conv: c_int) -> Result<LineCallbackFn, c_int> {
    let callback = callback.ok_or(INVALID_ARG)?;
    match CallingConvention::try_from(call_conv as u32) {
        Ok(CallingConvention::Cdecl) => {}
        Ok(_) => return Err(ReturnCode::NotSupported.code()),
        Err(_) => return Err(ReturnCode::WrongCallingConv.code()),
    }
    let param = HostPtr(param);
    Ok(Arc::new(move |ctx: &Context| {
        let param = param;
        unsafe { callback(as_ptr(ctx), param.0) };
    }))
}

/// Write the optional column and section of a `(line, column, section)`
/// triple and return the line.
unsafe fn position(
    (line, col, section): (i32, Option<i32>, Option<String>),
    column: *mut c_int,
    section_name: *mut *const c_char,
) -> c_int {
    unsafe {
        write_out(column, col.unwrap_or(0));
        write_out(section_name, opt_str(section.as_deref()));
    }
    line
}

// Context management

/// Innermost context executing on the calling thread. Borrowed.
#[unsafe(no_mangle)]
pub extern "C" fn asGetActiveContext() -> *mut asIScriptContext {
    opt_ptr(crate::get_active_context())
}

/// Borrowed; null once the engine is gone.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetEngine(c: *mut asIScriptContext) -> *mut asIScriptEngine {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    opt_ptr(ctx.get_engine())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_AddRef(c: *mut asIScriptContext) -> c_int {
    unsafe { add_ref::<Context>(c) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_Release(c: *mut asIScriptContext) -> c_int {
    unsafe { release::<Context>(c) }
}

// Execution

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetState(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, EXECUTION_ERROR);
    u32::from(ctx.get_state()) as c_int
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_Prepare(c: *mut asIScriptContext, func: *mut asIScriptFunction) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    let func = or_return!(unsafe { from_ptr::<Function>(func) }, INVALID_ARG);
    code(ctx.prepare(&func))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_Unprepare(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.unprepare())
}

/// Returns the resulting state, or a negative code when execution could not
/// start.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_Execute(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code_with(ctx.execute(), |state| u32::from(state) as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_Abort(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.abort())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_Suspend(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.suspend())
}

/// State of the execution currently in the context; the same as
/// `asContext_GetState`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetStateOfExecution(c: *mut asIScriptContext) -> c_int {
    unsafe { asContext_GetState(c) }
}

// State management

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_PushState(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.push_state())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_PopState(c: *mut asIScriptContext) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.pop_state())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_IsNested(c: *mut asIScriptContext, nest_count: *mut asUINT) -> asBOOL {
    let ctx = or_return!(unsafe { context(c) }, AS_FALSE);
    let (nested, count) = ctx.is_nested();
    unsafe { write_out(nest_count, count) };
    as_bool(nested)
}

// Object pointer

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetObject(c: *mut asIScriptContext, obj: *mut c_void) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_object(unsafe { object(obj) }))
}

// Arguments

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgByte(c: *mut asIScriptContext, arg: asUINT, value: asBYTE) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_byte(arg, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgWord(c: *mut asIScriptContext, arg: asUINT, value: asWORD) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_word(arg, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgDWord(c: *mut asIScriptContext, arg: asUINT, value: asDWORD) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_dword(arg, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgQWord(c: *mut asIScriptContext, arg: asUINT, value: asQWORD) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_qword(arg, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgFloat(c: *mut asIScriptContext, arg: asUINT, value: f32) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_float(arg, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgDouble(c: *mut asIScriptContext, arg: asUINT, value: f64) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_double(arg, value))
}

/// Object arguments are passed by address; `addr` must be a script object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgAddress(c: *mut asIScriptContext, arg: asUINT, addr: *mut c_void) -> c_int {
    unsafe { asContext_SetArgObject(c, arg, addr) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgObject(c: *mut asIScriptContext, arg: asUINT, obj: *mut c_void) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    code(ctx.set_arg_object(arg, unsafe { object(obj) }))
}

/// `?` parameters are not supported.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetArgVarType(
    c: *mut asIScriptContext,
    _arg: asUINT,
    _ptr: *mut c_void,
    _type_id: c_int,
) -> c_int {
    if c.is_null() {
        return INVALID_ARG;
    }
    ReturnCode::NotSupported.code()
}

/// Valid until the argument is set again or the context is prepared anew.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetAddressOfArg(c: *mut asIScriptContext, arg: asUINT) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    ctx.get_address_of_arg(arg)
}

// Return value

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnByte(c: *mut asIScriptContext) -> asBYTE {
    let ctx = or_return!(unsafe { context(c) }, 0);
    ctx.get_return_byte()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnWord(c: *mut asIScriptContext) -> asWORD {
    let ctx = or_return!(unsafe { context(c) }, 0);
    ctx.get_return_word()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnDWord(c: *mut asIScriptContext) -> asDWORD {
    let ctx = or_return!(unsafe { context(c) }, 0);
    ctx.get_return_dword()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnQWord(c: *mut asIScriptContext) -> asQWORD {
    let ctx = or_return!(unsafe { context(c) }, 0);
    ctx.get_return_qword()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnFloat(c: *mut asIScriptContext) -> f32 {
    let ctx = or_return!(unsafe { context(c) }, 0.0);
    ctx.get_return_float()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnDouble(c: *mut asIScriptContext) -> f64 {
    let ctx = or_return!(unsafe { context(c) }, 0.0);
    ctx.get_return_double()
}

/// Returned handles come back as objects.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnAddress(c: *mut asIScriptContext) -> *mut c_void {
    unsafe { asContext_GetReturnObject(c) }
}

/// Borrowed from the context until it is prepared again.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetReturnObject(c: *mut asIScriptContext) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    ctx.get_return_object().map_or(std::ptr::null_mut(), |o| object_ptr(&o))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetAddressOfReturnValue(c: *mut asIScriptContext) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    ctx.get_address_of_return_value()
}

// Exception handling

/// Raise a catchable exception from a host function.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetException(c: *mut asIScriptContext, string: *const c_char) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    let string = unsafe { str_arg(string) }.unwrap_or("");
    code(ctx.set_exception(string, true))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetExceptionLineNumber(
    c: *mut asIScriptContext,
    column: *mut c_int,
    section_name: *mut *const c_char,
) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    unsafe { position(ctx.get_exception_line_number(), column, section_name) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetExceptionFunction(c: *mut asIScriptContext) -> *mut asIScriptFunction {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    opt_ptr(ctx.get_exception_function())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetExceptionString(c: *mut asIScriptContext) -> *const c_char {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null());
    opt_str(ctx.get_exception_string().as_deref())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetExceptionCallback(
    c: *mut asIScriptContext,
    callback: asCONTEXTCALLBACK_t,
    obj: *mut c_void,
    call_conv: c_int,
) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    match context_callback(callback, obj, call_conv) {
        Ok(callback) => code(ctx.set_exception_callback(callback)),
        Err(rc) => rc,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_ClearExceptionCallback(c: *mut asIScriptContext) {
    let ctx = or_return!(unsafe { context(c) }, ());
    drop(ctx.clear_exception_callback());
}

// Line callback

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetLineCallback(
    c: *mut asIScriptContext,
    callback: asCONTEXTCALLBACK_t,
    obj: *mut c_void,
    call_conv: c_int,
) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    match context_callback(callback, obj, call_conv) {
        Ok(callback) => code(ctx.set_line_callback(callback)),
        Err(rc) => rc,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_ClearLineCallback(c: *mut asIScriptContext) {
    let ctx = or_return!(unsafe { context(c) }, ());
    drop(ctx.clear_line_callback());
}

// Debugging

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetCallstackSize(c: *mut asIScriptContext) -> asUINT {
    let ctx = or_return!(unsafe { context(c) }, 0);
    ctx.get_callstack_size()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetFunction(c: *mut asIScriptContext, stack_level: asUINT) -> *mut asIScriptFunction {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    opt_ptr(ctx.get_function(stack_level))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetLineNumber(
    c: *mut asIScriptContext,
    stack_level: asUINT,
    column: *mut c_int,
    section_name: *mut *const c_char,
) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    unsafe { position(ctx.get_line_number(stack_level), column, section_name) }
}

// Variables

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetVarCount(c: *mut asIScriptContext, stack_level: asUINT) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, INVALID_ARG);
    ctx.get_var_count(stack_level)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetVarDeclaration(
    c: *mut asIScriptContext,
    var_index: asUINT,
    stack_level: asUINT,
    include_namespace: asBOOL,
) -> *const c_char {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null());
    opt_str(
        ctx.get_var_declaration(var_index, stack_level, from_as_bool(include_namespace))
            .as_deref(),
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetAddressOfVar(
    c: *mut asIScriptContext,
    var_index: asUINT,
    stack_level: asUINT,
) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    ctx.get_address_of_var(var_index, stack_level)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_IsVarInScope(c: *mut asIScriptContext, var_index: asUINT, stack_level: asUINT) -> asBOOL {
    let ctx = or_return!(unsafe { context(c) }, AS_FALSE);
    as_bool(ctx.is_var_in_scope(var_index, stack_level))
}

// This pointer

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetThisTypeId(c: *mut asIScriptContext, stack_level: asUINT) -> c_int {
    let ctx = or_return!(unsafe { context(c) }, 0);
    ctx.get_this_type_id(stack_level)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetThisPointer(c: *mut asIScriptContext, stack_level: asUINT) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    ctx.get_this_object(stack_level)
        .map_or(std::ptr::null_mut(), |o| object_ptr(&o))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetSystemFunction(c: *mut asIScriptContext) -> *mut asIScriptFunction {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    opt_ptr(ctx.get_system_function())
}

// User data

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_GetUserData(c: *mut asIScriptContext, type_: asPWORD) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    get_user_data(ctx.user_data_store(), type_)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asContext_SetUserData(c: *mut asIScriptContext, data: *mut c_void, type_: asPWORD) -> *mut c_void {
    let ctx = or_return!(unsafe { context(c) }, std::ptr::null_mut());
    set_user_data(ctx.user_data_store(), data, type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::engine::*;
    use crate::ffi::module::*;
    use angelscript_core::ANGELSCRIPT_VERSION;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SCRIPT: &std::ffi::CStr = c"int twice(int x) { int y = x * 2; return y; }\n\
void spin() { for (int i = 0; i < 3; i++) { } }\n\
void fail() { int z = 0; int w = 1 / z; }";

    struct Fixture {
        engine: *mut asIScriptEngine,
        module: *mut asIScriptModule,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
            unsafe {
                let module = asEngine_GetModule(engine, c"test".as_ptr(), 2);
                assert_eq!(asModule_AddScriptSection(module, c"test".as_ptr(), SCRIPT.as_ptr(), 0, 0), 0);
                assert_eq!(asModule_Build(module), 0);
                Fixture { engine, module }
            }
        }

        fn function(&self, decl: &std::ffi::CStr) -> *mut asIScriptFunction {
            unsafe { asModule_GetFunctionByDecl(self.module, decl.as_ptr()) }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            unsafe { asEngine_ShutDownAndRelease(self.engine) };
        }
    }

    #[test]
    fn prepare_execute_return() {
        let fx = Fixture::new();
        unsafe {
            let ctx = asEngine_CreateContext(fx.engine);
            assert_eq!(asContext_GetState(ctx), ContextState::Uninitialized as c_int);
            assert_eq!(asContext_Prepare(ctx, fx.function(c"int twice(int)")), 0);
            assert_eq!(asContext_GetState(ctx), ContextState::Prepared as c_int);
            assert_eq!(asContext_SetArgDWord(ctx, 0, 21), 0);
            assert_eq!(asContext_SetArgDouble(ctx, 0, 1.0), ReturnCode::InvalidType.code());
            assert_eq!(asContext_Execute(ctx), ContextState::Finished as c_int);
            assert_eq!(asContext_GetReturnDWord(ctx), 42);
            assert_eq!(asContext_Unprepare(ctx), 0);
            assert_eq!(asContext_Release(ctx), 0);
        }
    }

    #[test]
    fn prepare_null_leaves_context_uninitialized() {
        let fx = Fixture::new();
        unsafe {
            let ctx = asEngine_CreateContext(fx.engine);
            assert_eq!(asContext_Prepare(ctx, std::ptr::null_mut()), INVALID_ARG);
            assert_eq!(asContext_GetState(ctx), ContextState::Uninitialized as c_int);
            assert_eq!(asContext_Execute(ctx), ReturnCode::ContextNotPrepared.code());
            asContext_Release(ctx);
        }
    }

    #[test]
    fn null_context_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asContext_GetState(null), EXECUTION_ERROR);
            assert_eq!(asContext_Execute(null), INVALID_ARG);
            assert_eq!(asContext_GetReturnQWord(null), 0);
            assert_eq!(asContext_IsNested(null, std::ptr::null_mut()), AS_FALSE);
            assert!(asContext_GetExceptionString(null).is_null());
            asContext_ClearLineCallback(null);
        }
    }

    #[test]
    fn exceptions_are_reported() {
        let fx = Fixture::new();
        unsafe {
            let ctx = asEngine_CreateContext(fx.engine);
            asContext_Prepare(ctx, fx.function(c"void fail()"));
            assert_eq!(asContext_Execute(ctx), ContextState::Exception as c_int);
            let message = std::ffi::CStr::from_ptr(asContext_GetExceptionString(ctx));
            assert_eq!(message.to_str().unwrap(), "Divide by zero");
            let mut column = 0;
            let mut section = std::ptr::null();
            assert_eq!(asContext_GetExceptionLineNumber(ctx, &mut column, &mut section), 3);
            assert_eq!(std::ffi::CStr::from_ptr(section).to_str().unwrap(), "test");
            assert_eq!(asContext_GetExceptionFunction(ctx), fx.function(c"void fail()"));
            asContext_Release(ctx);
        }
    }

    unsafe extern "C" fn suspend_on_line(ctx: *mut asIScriptContext, param: *mut c_void) {
        let lines = unsafe { &*(param as *const AtomicU32) };
        if lines.fetch_add(1, Ordering::SeqCst) == 0 {
            unsafe { asContext_Suspend(ctx) };
        }
    }

    #[test]
    fn line_callback_can_suspend() {
        let fx = Fixture::new();
        let lines = AtomicU32::new(0);
        unsafe {
            let ctx = asEngine_CreateContext(fx.engine);
            let param = (&lines as *const AtomicU32).cast_mut().cast();
            assert_eq!(asContext_SetLineCallback(ctx, Some(suspend_on_line), param, 0), 0);
            asContext_Prepare(ctx, fx.function(c"void spin()"));
            assert_eq!(asContext_Execute(ctx), ContextState::Suspended as c_int);
            assert_eq!(asContext_Prepare(ctx, fx.function(c"void spin()")), ReturnCode::ContextActive.code());
            assert_eq!(asContext_Execute(ctx), ContextState::Finished as c_int);
            asContext_Release(ctx);
        }
        assert!(lines.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn push_state_requires_running_context() {
        let fx = Fixture::new();
        unsafe {
            let ctx = asEngine_CreateContext(fx.engine);
            assert!(asContext_PushState(ctx) < 0);
            assert!(asContext_PopState(ctx) < 0);
            let mut count = 9;
            assert_eq!(asContext_IsNested(ctx, &mut count), AS_FALSE);
            assert_eq!(count, 0);
            asContext_Release(ctx);
        }
    }
}
