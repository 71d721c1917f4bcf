//! `asScriptGeneric_*`, used from inside a host function registered with
//! the generic calling convention. The frame pointer is only valid for the
//! duration of that call.
//!
//! The return setters return nothing in C. A setter whose width does not
//! match the declared return type leaves the return value unchanged.

use std::ffi::{c_int, c_void};

use angelscript_core::ScriptResult;

use crate::core::script_object::ScriptObject;

use super::types::*;

fn report(result: ScriptResult<()>) {
    if let Err(error) = result {
        tracing::debug!(%error, "generic return value rejected");
    }
}

// Arguments

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgCount(g: *mut asIScriptGeneric) -> c_int {
    let generic = or_return!(unsafe { generic(g) }, INVALID_ARG);
    generic.get_arg_count() as c_int
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgTypeId(g: *mut asIScriptGeneric, idx: asUINT) -> c_int {
    let generic = or_return!(unsafe { generic(g) }, INVALID_ARG);
    generic.get_arg_type_id(idx).0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgByte(g: *mut asIScriptGeneric, idx: asUINT) -> asBYTE {
    let generic = or_return!(unsafe { generic(g) }, 0);
    generic.get_arg_byte(idx)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgWord(g: *mut asIScriptGeneric, idx: asUINT) -> asWORD {
    let generic = or_return!(unsafe { generic(g) }, 0);
    generic.get_arg_word(idx)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgDWord(g: *mut asIScriptGeneric, idx: asUINT) -> asUINT {
    let generic = or_return!(unsafe { generic(g) }, 0);
    generic.get_arg_dword(idx)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgQWord(g: *mut asIScriptGeneric, idx: asUINT) -> asQWORD {
    let generic = or_return!(unsafe { generic(g) }, 0);
    generic.get_arg_qword(idx)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgFloat(g: *mut asIScriptGeneric, idx: asUINT) -> f32 {
    let generic = or_return!(unsafe { generic(g) }, 0.0);
    generic.get_arg_float(idx)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgDouble(g: *mut asIScriptGeneric, idx: asUINT) -> f64 {
    let generic = or_return!(unsafe { generic(g) }, 0.0);
    generic.get_arg_double(idx)
}

/// Objects come back as the object pointer, other arguments as the
/// address of their storage in the frame.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgAddress(g: *mut asIScriptGeneric, idx: asUINT) -> *mut c_void {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    generic.get_arg_address(idx)
}

/// Borrowed; add a reference to keep the object past the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetArgObject(g: *mut asIScriptGeneric, idx: asUINT) -> *mut c_void {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    generic
        .get_arg(idx)
        .and_then(|value| value.as_object())
        .map_or(std::ptr::null_mut(), object_ptr)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetAddressOfArg(g: *mut asIScriptGeneric, idx: asUINT) -> *mut c_void {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    generic.get_address_of_arg(idx)
}

// Frame

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetFunction(g: *mut asIScriptGeneric) -> *mut asIScriptFunction {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    as_ptr(generic.get_function())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetEngine(g: *mut asIScriptGeneric) -> *mut asIScriptEngine {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    as_ptr(generic.get_engine())
}

/// `this` of a method call, null for global functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetObject(g: *mut asIScriptGeneric) -> *mut c_void {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    match generic.get_object().as_object() {
        Some(obj) => object_ptr(obj),
        None => generic.get_address_of_object(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetObjectTypeId(g: *mut asIScriptGeneric) -> c_int {
    let generic = or_return!(unsafe { generic(g) }, INVALID_ARG);
    generic.get_object_type_id()
}

// Return value

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_GetAddressOfReturnLocation(g: *mut asIScriptGeneric) -> *mut c_void {
    let generic = or_return!(unsafe { generic(g) }, std::ptr::null_mut());
    generic.get_address_of_return_location()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnByte(g: *mut asIScriptGeneric, val: asBYTE) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_byte(val));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnWord(g: *mut asIScriptGeneric, val: asWORD) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_word(val));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnDWord(g: *mut asIScriptGeneric, val: asUINT) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_dword(val));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnQWord(g: *mut asIScriptGeneric, val: asQWORD) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_qword(val));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnFloat(g: *mut asIScriptGeneric, val: f32) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_float(val));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnDouble(g: *mut asIScriptGeneric, val: f64) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_double(val));
}

/// Hands over the reference `addr` carries, typically one from
/// `asEngine_CreateScriptObject`. A null `addr` returns a null handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnAddress(g: *mut asIScriptGeneric, addr: *mut c_void) {
    let generic = or_return!(unsafe { generic(g) }, ());
    let object = unsafe { take_ptr::<ScriptObject>(addr.cast()) };
    report(generic.set_return_object(object));
}

/// The frame adds its own reference; the caller keeps theirs.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptGeneric_SetReturnObject(g: *mut asIScriptGeneric, obj: *mut c_void) {
    let generic = or_return!(unsafe { generic(g) }, ());
    report(generic.set_return_object(unsafe { object(obj) }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::context::*;
    use crate::ffi::engine::*;
    use crate::ffi::module::*;
    use angelscript_core::{type_id, ContextState, ANGELSCRIPT_VERSION};
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicI32, AtomicPtr, Ordering};

    const GENERIC: asDWORD = 6;

    unsafe extern "C" fn mix(g: *mut asIScriptGeneric) {
        unsafe {
            let a = asScriptGeneric_GetArgDWord(g, 0) as i32;
            let b = asScriptGeneric_GetArgDouble(g, 1);
            asScriptGeneric_SetReturnDouble(g, a as f64 + b);
        }
    }

    unsafe extern "C" fn widen(g: *mut asIScriptGeneric) {
        unsafe {
            let byte = asScriptGeneric_GetArgByte(g, 0) as u64;
            let word = asScriptGeneric_GetArgWord(g, 1) as u64;
            let qword = asScriptGeneric_GetArgQWord(g, 2);
            let float = asScriptGeneric_GetArgFloat(g, 3);
            asScriptGeneric_SetReturnQWord(g, byte + word + qword + float as u64);
        }
    }

    unsafe extern "C" fn wrong_width(g: *mut asIScriptGeneric) {
        unsafe { asScriptGeneric_SetReturnByte(g, 9) };
    }

    static SEEN_ENGINE: AtomicPtr<asIScriptEngine> = AtomicPtr::new(std::ptr::null_mut());
    static SEEN_ARGS: AtomicI32 = AtomicI32::new(-1);
    static SEEN_TYPE: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn inspect(g: *mut asIScriptGeneric) {
        unsafe {
            SEEN_ENGINE.store(asScriptGeneric_GetEngine(g), Ordering::SeqCst);
            SEEN_ARGS.store(asScriptGeneric_GetArgCount(g), Ordering::SeqCst);
            SEEN_TYPE.store(asScriptGeneric_GetArgTypeId(g, 0), Ordering::SeqCst);
            assert!(asScriptGeneric_GetObject(g).is_null());
            assert_eq!(asScriptGeneric_GetObjectTypeId(g), 0);
            let name = crate::ffi::function::asFunction_GetName(asScriptGeneric_GetFunction(g));
            assert_eq!(CStr::from_ptr(name).to_str().unwrap(), "inspect");
        }
    }

    /// Build `code`, run `entry` and return the context, left in its
    /// finished state.
    fn run(engine: *mut asIScriptEngine, code: &CStr, entry: &CStr) -> *mut asIScriptContext {
        unsafe {
            let module = asEngine_GetModule(engine, c"test".as_ptr(), 2);
            asModule_AddScriptSection(module, c"test".as_ptr(), code.as_ptr(), 0, 0);
            assert_eq!(asModule_Build(module), 0);
            let ctx = asEngine_CreateContext(engine);
            let func = asModule_GetFunctionByDecl(module, entry.as_ptr());
            assert_eq!(asContext_Prepare(ctx, func), 0);
            assert_eq!(asContext_Execute(ctx), ContextState::Finished as c_int);
            ctx
        }
    }

    #[test]
    fn arguments_arrive_at_their_width() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            asEngine_RegisterGlobalFunction(engine, c"double mix(int, double)".as_ptr(), Some(mix), GENERIC);
            asEngine_RegisterGlobalFunction(
                engine,
                c"uint64 widen(uint8, uint16, uint64, float)".as_ptr(),
                Some(widen),
                GENERIC,
            );
            let ctx = run(
                engine,
                c"double a() { return mix(-3, 0.5); } uint64 b() { return widen(200, 60000, 5000000000, 2.0f); }",
                c"double a()",
            );
            assert_eq!(asContext_GetReturnDouble(ctx), -2.5);

            let module = asEngine_GetModule(engine, c"test".as_ptr(), 0);
            asContext_Prepare(ctx, asModule_GetFunctionByDecl(module, c"uint64 b()".as_ptr()));
            asContext_Execute(ctx);
            assert_eq!(asContext_GetReturnQWord(ctx), 200 + 60000 + 5_000_000_000 + 2);
            asContext_Release(ctx);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn mismatched_return_width_keeps_default() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            asEngine_RegisterGlobalFunction(engine, c"int wrong()".as_ptr(), Some(wrong_width), GENERIC);
            let ctx = run(engine, c"int a() { return wrong(); }", c"int a()");
            assert_eq!(asContext_GetReturnDWord(ctx), 0);
            asContext_Release(ctx);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn frame_exposes_engine_and_function() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            asEngine_RegisterGlobalFunction(engine, c"void inspect(float)".as_ptr(), Some(inspect), GENERIC);
            let ctx = run(engine, c"void a() { inspect(1.0f); }", c"void a()");
            assert_eq!(SEEN_ENGINE.load(Ordering::SeqCst), engine);
            assert_eq!(SEEN_ARGS.load(Ordering::SeqCst), 1);
            assert_eq!(SEEN_TYPE.load(Ordering::SeqCst), type_id::FLOAT);
            asContext_Release(ctx);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn null_frame_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asScriptGeneric_GetArgDWord(null, 0), 0);
            assert_eq!(asScriptGeneric_GetArgDouble(null, 0), 0.0);
            assert!(asScriptGeneric_GetArgObject(null, 0).is_null());
            assert!(asScriptGeneric_GetEngine(null).is_null());
            assert_eq!(asScriptGeneric_GetArgCount(null), INVALID_ARG);
            asScriptGeneric_SetReturnDWord(null, 1);
            asScriptGeneric_SetReturnAddress(null, std::ptr::null_mut());
        }
    }
}
