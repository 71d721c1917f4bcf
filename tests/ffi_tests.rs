//! Drives the C surface the way a C host would.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

use angelscript_runtime::ffi::context::*;
use angelscript_runtime::ffi::engine::*;
use angelscript_runtime::ffi::function::*;
use angelscript_runtime::ffi::generic::*;
use angelscript_runtime::ffi::module::*;
use angelscript_runtime::ffi::script_object::*;
use angelscript_runtime::ffi::string_factory::*;
use angelscript_runtime::ffi::*;
use angelscript_core::CallingConvention;
use angelscript_runtime::prelude::{ContextState, MessageType, ReturnCode};
use angelscript_runtime::ANGELSCRIPT_VERSION;
use parking_lot::Mutex;

const GENERIC: asDWORD = CallingConvention::Generic as asDWORD;
const CDECL: asDWORD = CallingConvention::Cdecl as asDWORD;
const ALWAYS_CREATE: asDWORD = 2;

unsafe extern "C" fn collect_message(msg: *const asSMessageInfo, param: *mut c_void) {
    let sink = unsafe { &*param.cast::<Mutex<Vec<(c_int, c_int, String)>>>() };
    let msg = unsafe { &*msg };
    let text = unsafe { CStr::from_ptr(msg.message) }.to_string_lossy().into_owned();
    sink.lock().push((msg.type_, msg.row, text));
}

unsafe extern "C" fn clamp(generic: *mut asIScriptGeneric) {
    unsafe {
        let value = asScriptGeneric_GetArgDWord(generic, 0) as i32;
        let limit = asScriptGeneric_GetArgDWord(generic, 1) as i32;
        asScriptGeneric_SetReturnDWord(generic, value.min(limit) as asUINT);
    }
}

unsafe extern "C" fn call_depth(generic: *mut asIScriptGeneric) {
    unsafe {
        let ctx = asGetActiveContext();
        asScriptGeneric_SetReturnDWord(generic, asContext_GetCallstackSize(ctx));
    }
}

unsafe extern "C" fn count_lines(ctx: *mut asIScriptContext, param: *mut c_void) {
    let lines = unsafe { &mut *param.cast::<u32>() };
    *lines += 1;
    if *lines == 2 {
        unsafe { asContext_Suspend(ctx) };
    }
}

fn compile(engine: *mut asIScriptEngine, name: &CStr, code: &CStr) -> (*mut asIScriptModule, c_int) {
    unsafe {
        let module = asEngine_GetModule(engine, name.as_ptr(), ALWAYS_CREATE);
        assert_eq!(asModule_AddScriptSection(module, name.as_ptr(), code.as_ptr(), 0, 0), 0);
        (module, asModule_Build(module))
    }
}

#[test]
fn host_functions_and_globals() {
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    let mut bonus: i32 = 5;
    unsafe {
        let id = asEngine_RegisterGlobalFunction(engine, c"int clamp(int, int)".as_ptr(), Some(clamp), GENERIC);
        assert!(id >= 0);
        assert_eq!(
            asEngine_RegisterGlobalFunction(engine, c"int other(int)".as_ptr(), Some(clamp), CDECL),
            ReturnCode::NotSupported.code()
        );
        assert_eq!(
            asEngine_RegisterGlobalProperty(engine, c"int bonus".as_ptr(), (&raw mut bonus).cast()),
            0
        );

        let (module, rc) = compile(engine, c"host", c"int score(int raw) { bonus += 1; return clamp(raw, 100) + bonus; }");
        assert_eq!(rc, 0);
        let score = asModule_GetFunctionByName(module, c"score".as_ptr());
        assert_eq!(CStr::from_ptr(asFunction_GetDeclaration(score, true, false, false)).to_str().unwrap(), "int score(int)");

        let ctx = asEngine_CreateContext(engine);
        assert_eq!(asContext_Prepare(ctx, score), 0);
        assert_eq!(asContext_SetArgDWord(ctx, 0, 250), 0);
        assert_eq!(asContext_Execute(ctx), u32::from(ContextState::Finished) as c_int);
        assert_eq!(asContext_GetReturnDWord(ctx), 106);
        assert_eq!(asContext_Release(ctx), 0);
        asEngine_ShutDownAndRelease(engine);
    }
    assert_eq!(bonus, 6);
}

#[test]
fn host_functions_find_the_calling_context() {
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    unsafe {
        assert!(asGetActiveContext().is_null());
        asEngine_RegisterGlobalFunction(engine, c"uint depth()".as_ptr(), Some(call_depth), GENERIC);
        let (module, rc) = compile(engine, c"depth", c"uint inner() { return depth(); }\nuint outer() { return inner(); }");
        assert_eq!(rc, 0);
        let ctx = asEngine_CreateContext(engine);
        asContext_Prepare(ctx, asModule_GetFunctionByName(module, c"outer".as_ptr()));
        assert_eq!(asContext_Execute(ctx), u32::from(ContextState::Finished) as c_int);
        assert_eq!(asContext_GetReturnDWord(ctx), 2);
        asContext_Release(ctx);
        asEngine_ShutDownAndRelease(engine);
    }
}

#[test]
fn build_errors_reach_the_message_callback() {
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    let messages: Mutex<Vec<(c_int, c_int, String)>> = Mutex::new(Vec::new());
    unsafe {
        let param = (&raw const messages).cast_mut().cast::<c_void>();
        assert_eq!(asEngine_SetMessageCallback(engine, Some(collect_message), param, CDECL), 0);
        let (module, rc) = compile(engine, c"broken", c"void f()\n{\n  nothing();\n}");
        assert!(rc < 0);
        assert_eq!(asModule_GetFunctionCount(module), 0);
        asEngine_ShutDownAndRelease(engine);
    }
    let messages = messages.lock();
    let error = messages
        .iter()
        .find(|(kind, _, _)| *kind == c_int::from(MessageType::Error))
        .unwrap();
    assert_eq!(error.1, 3);
    assert!(error.2.contains("nothing"));
}

#[test]
fn line_callbacks_suspend_execution() {
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    let mut lines: u32 = 0;
    unsafe {
        let (module, rc) = compile(engine, c"lines", c"int f()\n{\n  int a = 1;\n  a += 2;\n  return a;\n}");
        assert_eq!(rc, 0);
        let ctx = asEngine_CreateContext(engine);
        assert_eq!(
            asContext_SetLineCallback(ctx, Some(count_lines), (&raw mut lines).cast(), CDECL as c_int),
            0
        );
        assert_eq!(asContext_Prepare(ctx, asModule_GetFunctionByName(module, c"f".as_ptr())), 0);
        assert_eq!(asContext_Execute(ctx), u32::from(ContextState::Suspended) as c_int);
        let mut column: c_int = 0;
        let mut section: *const c_char = std::ptr::null();
        let line = asContext_GetLineNumber(ctx, 0, &mut column, &mut section);
        assert!(line >= 3);
        assert_eq!(CStr::from_ptr(section).to_str().unwrap(), "lines");
        assert_eq!(asContext_Execute(ctx), u32::from(ContextState::Finished) as c_int);
        assert_eq!(asContext_GetReturnDWord(ctx), 3);
        asContext_Release(ctx);
        asEngine_ShutDownAndRelease(engine);
    }
    assert!(lines >= 3);
}

#[test]
fn exceptions_are_reported_through_the_context() {
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    unsafe {
        let (module, rc) = compile(engine, c"ex", c"int f(int d)\n{\n  return 1 / d;\n}");
        assert_eq!(rc, 0);
        let f = asModule_GetFunctionByName(module, c"f".as_ptr());
        let ctx = asEngine_CreateContext(engine);
        asContext_Prepare(ctx, f);
        asContext_SetArgDWord(ctx, 0, 0);
        assert_eq!(asContext_Execute(ctx), u32::from(ContextState::Exception) as c_int);
        assert_eq!(CStr::from_ptr(asContext_GetExceptionString(ctx)).to_str().unwrap(), "Divide by zero");
        let mut section: *const c_char = std::ptr::null();
        assert_eq!(asContext_GetExceptionLineNumber(ctx, std::ptr::null_mut(), &mut section), 3);
        assert_eq!(CStr::from_ptr(section).to_str().unwrap(), "ex");
        assert_eq!(asContext_GetExceptionFunction(ctx), f);
        asContext_Release(ctx);
        asEngine_ShutDownAndRelease(engine);
    }
}

#[test]
fn script_objects_round_trip_through_the_context() {
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    unsafe {
        let (module, rc) = compile(
            engine,
            c"obj",
            c"class Pos { int x = 3; }\nPos@ make() { Pos p; p.x = 8; return p; }\nint read(Pos@ p) { return p.x; }",
        );
        assert_eq!(rc, 0);
        let ctx = asEngine_CreateContext(engine);
        asContext_Prepare(ctx, asModule_GetFunctionByName(module, c"make".as_ptr()));
        assert_eq!(asContext_Execute(ctx), u32::from(ContextState::Finished) as c_int);
        let object = asContext_GetReturnObject(ctx).cast::<asIScriptObject>();
        assert!(!object.is_null());
        // borrowed from the context; keep it past the next prepare
        asScriptObject_AddRef(object);
        assert_eq!(*asScriptObject_GetAddressOfProperty(object, 0).cast::<i32>(), 8);

        asContext_Prepare(ctx, asModule_GetFunctionByName(module, c"read".as_ptr()));
        assert_eq!(asContext_SetArgObject(ctx, 0, object.cast()), 0);
        asContext_Execute(ctx);
        assert_eq!(asContext_GetReturnDWord(ctx), 8);

        asContext_Release(ctx);
        assert!(asScriptObject_Release(object) >= 0);
        asEngine_ShutDownAndRelease(engine);
    }
}

// A host string factory keeping each constant in a leaked CString.

unsafe extern "C" fn make_constant(data: *const c_char, length: asUINT, _param: *mut c_void) -> *const c_void {
    let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), length as usize) };
    match CString::new(bytes.to_ascii_uppercase()) {
        Ok(text) => text.into_raw().cast_const().cast(),
        Err(_) => std::ptr::null(),
    }
}

unsafe extern "C" fn free_constant(str: *const c_void, param: *mut c_void) -> c_int {
    drop(unsafe { CString::from_raw(str.cast_mut().cast()) });
    let released = unsafe { &mut *param.cast::<u32>() };
    *released += 1;
    0
}

unsafe extern "C" fn constant_bytes(str: *const c_void, data: *mut c_char, length: *mut asUINT, _param: *mut c_void) -> c_int {
    let text = unsafe { CStr::from_ptr(str.cast()) }.to_bytes();
    unsafe {
        if !data.is_null() {
            std::ptr::copy_nonoverlapping(text.as_ptr(), data.cast::<u8>(), text.len());
        }
        *length = text.len() as asUINT;
    }
    0
}

#[test]
fn host_string_factory_supplies_and_releases_constants() {
    let mut released: u32 = 0;
    let mut table = asIStringFactory {
        get_string_constant: Some(make_constant),
        release_string_constant: Some(free_constant),
        get_raw_string_data: Some(constant_bytes),
        param: (&raw mut released).cast(),
    };
    let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
    unsafe {
        assert_eq!(asEngine_RegisterStringFactory(engine, c"string".as_ptr(), &mut table), 0);
        let (module, rc) = compile(engine, c"str", c"uint f() { string s = \"quiet\"; return s.length(); }");
        assert_eq!(rc, 0);
        let ctx = asEngine_CreateContext(engine);
        asContext_Prepare(ctx, asModule_GetFunctionByName(module, c"f".as_ptr()));
        asContext_Execute(ctx);
        assert_eq!(asContext_GetReturnDWord(ctx), 5);
        asContext_Release(ctx);

        asModule_Discard(module);
        asEngine_ShutDownAndRelease(engine);
    }
    assert_eq!(released, 1);
}
