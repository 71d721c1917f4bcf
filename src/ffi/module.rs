//! `asModule_*`.
//!
//! Modules belong to their engine and have no reference counting of their
//! own. A module pointer stays valid until the module is discarded.

use std::ffi::{c_char, c_int, c_void};

use angelscript_core::{CompileFlags, ReturnCode, ScriptResult};

use crate::compiler::bytecode_io::BinaryStream;
use crate::core::context::Context;
use crate::core::function::Function;
use crate::core::module::Module;

use super::types::*;

unsafe fn module(ptr: *mut asIScriptModule) -> Option<Module> {
    unsafe { from_ptr::<Module>(ptr) }
}

/// [`BinaryStream`] over host callbacks.
struct HostStream<'a>(&'a asIBinaryStream);

impl BinaryStream for HostStream<'_> {
    fn write(&mut self, data: &[u8]) -> ScriptResult<()> {
        let write = self.0.write.ok_or(ReturnCode::InvalidArg)?;
        let rc = unsafe { write(data.as_ptr().cast(), data.len() as asUINT, self.0.param) };
        if rc < 0 {
            return Err(ReturnCode::Error.into());
        }
        Ok(())
    }

    fn read(&mut self, out: &mut [u8]) -> ScriptResult<()> {
        let read = self.0.read.ok_or(ReturnCode::InvalidArg)?;
        let rc = unsafe { read(out.as_mut_ptr().cast(), out.len() as asUINT, self.0.param) };
        if rc < 0 {
            return Err(ReturnCode::Error.into());
        }
        Ok(())
    }
}

// Module management

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetEngine(m: *mut asIScriptModule) -> *mut asIScriptEngine {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    opt_ptr(module.get_engine())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_SetName(m: *mut asIScriptModule, name: *const c_char) {
    let module = or_return!(unsafe { module(m) }, ());
    let name = or_return!(unsafe { str_arg(name) }, ());
    module.set_name(name);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetName(m: *mut asIScriptModule) -> *const c_char {
    let module = or_return!(unsafe { module(m) }, std::ptr::null());
    return_str(&module.get_name())
}

/// The pointer is invalid afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_Discard(m: *mut asIScriptModule) {
    let module = or_return!(unsafe { module(m) }, ());
    module.discard();
}

// Script sections

/// `code_length` of 0 means `code` is NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_AddScriptSection(
    m: *mut asIScriptModule,
    name: *const c_char,
    script: *const c_char,
    code_length: usize,
    line_offset: c_int,
) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let name = or_return!(unsafe { str_arg(name) }, INVALID_ARG);
    if script.is_null() {
        return INVALID_ARG;
    }
    let text = if code_length == 0 {
        unsafe { str_arg(script) }
    } else {
        let bytes = unsafe { std::slice::from_raw_parts(script.cast::<u8>(), code_length) };
        std::str::from_utf8(bytes).ok()
    };
    let text = or_return!(text, INVALID_ARG);
    code(module.add_script_section(name, text, line_offset))
}

// Build

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_Build(m: *mut asIScriptModule) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    code(module.build())
}

/// On success `*out_func`, when given, receives a reference the caller
/// releases.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_CompileFunction(
    m: *mut asIScriptModule,
    section_name: *const c_char,
    script: *const c_char,
    line_offset: c_int,
    compile_flags: asDWORD,
    out_func: *mut *mut asIScriptFunction,
) -> c_int {
    unsafe { write_out(out_func, std::ptr::null_mut()) };
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let section_name = unsafe { str_arg(section_name) }.unwrap_or("");
    let source = or_return!(unsafe { str_arg(script) }, INVALID_ARG);
    let flags = CompileFlags::from_bits_truncate(compile_flags);
    code_with(module.compile_function(section_name, source, line_offset, flags), |function| {
        if !out_func.is_null() {
            unsafe { out_func.write(into_ptr(function)) };
        }
        ReturnCode::Success.code()
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_CompileGlobalVar(
    m: *mut asIScriptModule,
    section_name: *const c_char,
    script: *const c_char,
    line_offset: c_int,
) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let section_name = unsafe { str_arg(section_name) }.unwrap_or("");
    let source = or_return!(unsafe { str_arg(script) }, INVALID_ARG);
    code(module.compile_global_var(section_name, source, line_offset))
}

// Namespaces

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_SetDefaultNamespace(m: *mut asIScriptModule, name_space: *const c_char) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let name_space = or_return!(unsafe { str_arg(name_space) }, INVALID_ARG);
    code(module.set_default_namespace(name_space))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetDefaultNamespace(m: *mut asIScriptModule) -> *const c_char {
    let module = or_return!(unsafe { module(m) }, std::ptr::null());
    return_str(&module.get_default_namespace())
}

// Functions

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetFunctionCount(m: *mut asIScriptModule) -> asUINT {
    let module = or_return!(unsafe { module(m) }, 0);
    module.get_function_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetFunctionByIndex(m: *mut asIScriptModule, index: asUINT) -> *mut asIScriptFunction {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    opt_ptr(module.get_function_by_index(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetFunctionByDecl(m: *mut asIScriptModule, decl: *const c_char) -> *mut asIScriptFunction {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    let decl = or_return!(unsafe { str_arg(decl) }, std::ptr::null_mut());
    opt_ptr(module.get_function_by_decl(decl))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetFunctionByName(m: *mut asIScriptModule, name: *const c_char) -> *mut asIScriptFunction {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    let name = or_return!(unsafe { str_arg(name) }, std::ptr::null_mut());
    opt_ptr(module.get_function_by_name(name))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_RemoveFunction(m: *mut asIScriptModule, func: *mut asIScriptFunction) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let func = or_return!(unsafe { from_ptr::<Function>(func) }, INVALID_ARG);
    code(module.remove_function(&func))
}

// Global variables

/// A null `ctx` runs the initialisers on a temporary context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_ResetGlobalVars(m: *mut asIScriptModule, ctx: *mut asIScriptContext) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let ctx = unsafe { from_ptr::<Context>(ctx) };
    code(module.reset_global_vars(ctx.as_ref()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetGlobalVarCount(m: *mut asIScriptModule) -> asUINT {
    let module = or_return!(unsafe { module(m) }, 0);
    module.get_global_var_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetGlobalVarIndexByName(m: *mut asIScriptModule, name: *const c_char) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let name = or_return!(unsafe { str_arg(name) }, INVALID_ARG);
    code_with(module.get_global_var_index_by_name(name), |i| i as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetGlobalVarIndexByDecl(m: *mut asIScriptModule, decl: *const c_char) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(module.get_global_var_index_by_decl(decl), |i| i as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetGlobalVarDeclaration(
    m: *mut asIScriptModule,
    index: asUINT,
    include_namespace: bool,
) -> *const c_char {
    let module = or_return!(unsafe { module(m) }, std::ptr::null());
    opt_str(module.get_global_var_declaration(index, include_namespace).as_deref())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetGlobalVar(
    m: *mut asIScriptModule,
    index: asUINT,
    name: *mut *const c_char,
    name_space: *mut *const c_char,
    type_id: *mut c_int,
    is_const: *mut bool,
) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let var = or_return!(module.get_global_var(index), INVALID_ARG);
    unsafe {
        write_out(name, return_str(&var.name));
        write_out(name_space, return_str(&var.namespace));
        write_out(type_id, var.type_id);
        write_out(is_const, var.is_const);
    }
    ReturnCode::Success.code()
}

/// Valid until the variable is assigned a new object or the module is
/// rebuilt.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetAddressOfGlobalVar(m: *mut asIScriptModule, index: asUINT) -> *mut c_void {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    module.get_address_of_global_var(index)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_RemoveGlobalVar(m: *mut asIScriptModule, index: asUINT) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    code(module.remove_global_var(index))
}

// Type identification

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetObjectTypeCount(m: *mut asIScriptModule) -> asUINT {
    let module = or_return!(unsafe { module(m) }, 0);
    module.get_object_type_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetObjectTypeByIndex(m: *mut asIScriptModule, index: asUINT) -> *mut asITypeInfo {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    opt_ptr(module.get_object_type_by_index(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetTypeIdByDecl(m: *mut asIScriptModule, decl: *const c_char) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(module.get_type_id_by_decl(decl), |id| id)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetTypeInfoByName(m: *mut asIScriptModule, name: *const c_char) -> *mut asITypeInfo {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    let name = or_return!(unsafe { str_arg(name) }, std::ptr::null_mut());
    opt_ptr(module.get_type_info_by_name(name))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetTypeInfoByDecl(m: *mut asIScriptModule, decl: *const c_char) -> *mut asITypeInfo {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    let decl = or_return!(unsafe { str_arg(decl) }, std::ptr::null_mut());
    opt_ptr(module.get_type_info_by_decl(decl))
}

// Enums and typedefs

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetEnumCount(m: *mut asIScriptModule) -> asUINT {
    let module = or_return!(unsafe { module(m) }, 0);
    module.get_enum_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetEnumByIndex(m: *mut asIScriptModule, index: asUINT) -> *mut asITypeInfo {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    opt_ptr(module.get_enum_by_index(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetTypedefCount(m: *mut asIScriptModule) -> asUINT {
    let module = or_return!(unsafe { module(m) }, 0);
    module.get_typedef_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetTypedefByIndex(m: *mut asIScriptModule, index: asUINT) -> *mut asITypeInfo {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    opt_ptr(module.get_typedef_by_index(index))
}

// Imports

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetImportedFunctionCount(m: *mut asIScriptModule) -> asUINT {
    let module = or_return!(unsafe { module(m) }, 0);
    module.get_imported_function_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetImportedFunctionIndexByDecl(m: *mut asIScriptModule, decl: *const c_char) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(module.get_imported_function_index_by_decl(decl), |i| i as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetImportedFunctionDeclaration(m: *mut asIScriptModule, import_index: asUINT) -> *const c_char {
    let module = or_return!(unsafe { module(m) }, std::ptr::null());
    opt_str(module.get_imported_function_declaration(import_index).as_deref())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetImportedFunctionSourceModule(m: *mut asIScriptModule, import_index: asUINT) -> *const c_char {
    let module = or_return!(unsafe { module(m) }, std::ptr::null());
    opt_str(module.get_imported_function_source_module(import_index).as_deref())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_BindImportedFunction(
    m: *mut asIScriptModule,
    import_index: asUINT,
    func: *mut asIScriptFunction,
) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let func = or_return!(unsafe { from_ptr::<Function>(func) }, INVALID_ARG);
    code(module.bind_imported_function(import_index, &func))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_UnbindImportedFunction(m: *mut asIScriptModule, import_index: asUINT) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    code(module.unbind_imported_function(import_index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_BindAllImportedFunctions(m: *mut asIScriptModule) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    code(module.bind_all_imported_functions())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_UnbindAllImportedFunctions(m: *mut asIScriptModule) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    code(module.unbind_all_imported_functions())
}

// Byte code

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_SaveByteCode(
    m: *mut asIScriptModule,
    out: *mut asIBinaryStream,
    strip_debug_info: bool,
) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let out = or_return!(unsafe { out.as_ref() }, INVALID_ARG);
    code(module.save_byte_code(&mut HostStream(out), strip_debug_info))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_LoadByteCode(
    m: *mut asIScriptModule,
    in_: *mut asIBinaryStream,
    was_debug_info_stripped: *mut bool,
) -> c_int {
    let module = or_return!(unsafe { module(m) }, INVALID_ARG);
    let in_ = or_return!(unsafe { in_.as_ref() }, INVALID_ARG);
    code_with(module.load_byte_code(&mut HostStream(in_)), |stripped| {
        unsafe { write_out(was_debug_info_stripped, stripped) };
        ReturnCode::Success.code()
    })
}

// User data

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_GetUserData(m: *mut asIScriptModule, type_: asPWORD) -> *mut c_void {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    get_user_data(module.user_data_store(), type_)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asModule_SetUserData(m: *mut asIScriptModule, data: *mut c_void, type_: asPWORD) -> *mut c_void {
    let module = or_return!(unsafe { module(m) }, std::ptr::null_mut());
    set_user_data(module.user_data_store(), data, type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::engine::*;
    use angelscript_core::ANGELSCRIPT_VERSION;
    use std::ffi::CStr;

    unsafe extern "C" fn write_vec(ptr: *const c_void, size: asUINT, param: *mut c_void) -> c_int {
        let buffer = unsafe { &mut *(param as *mut Vec<u8>) };
        buffer.extend_from_slice(unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), size as usize) });
        0
    }

    unsafe extern "C" fn read_vec(ptr: *mut c_void, size: asUINT, param: *mut c_void) -> c_int {
        let buffer = unsafe { &mut *(param as *mut Vec<u8>) };
        let size = size as usize;
        if buffer.len() < size {
            return -1;
        }
        let head: Vec<u8> = buffer.drain(..size).collect();
        unsafe { std::ptr::copy_nonoverlapping(head.as_ptr(), ptr.cast::<u8>(), size) };
        0
    }

    fn new_module(engine: *mut asIScriptEngine, name: &CStr, code: &CStr) -> *mut asIScriptModule {
        unsafe {
            let module = asEngine_GetModule(engine, name.as_ptr(), 2);
            assert_eq!(asModule_AddScriptSection(module, name.as_ptr(), code.as_ptr(), 0, 0), 0);
            module
        }
    }

    #[test]
    fn build_and_query() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        let module = new_module(engine, c"main", c"const int limit = 3; int counter; int get() { return limit; }");
        unsafe {
            assert_eq!(asModule_Build(module), 0);
            assert_eq!(CStr::from_ptr(asModule_GetName(module)).to_str().unwrap(), "main");
            assert_eq!(asModule_GetFunctionCount(module), 1);
            assert!(!asModule_GetFunctionByName(module, c"get".as_ptr()).is_null());
            assert_eq!(asModule_GetGlobalVarCount(module), 2);
            assert_eq!(asModule_GetGlobalVarIndexByName(module, c"counter".as_ptr()), 1);
            let mut is_const = false;
            let mut type_id = 0;
            asModule_GetGlobalVar(module, 0, std::ptr::null_mut(), std::ptr::null_mut(), &mut type_id, &mut is_const);
            assert!(is_const);
            assert_eq!(type_id, angelscript_core::type_id::INT32);
            let limit = asModule_GetAddressOfGlobalVar(module, 0).cast::<i32>();
            assert_eq!(*limit, 3);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn failed_build_reports_error() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        let module = new_module(engine, c"bad", c"void f() { undefined(); }");
        unsafe {
            assert_eq!(asModule_Build(module), ReturnCode::Error.code());
            assert_eq!(asModule_GetFunctionCount(module), 0);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn compiled_function_is_owned_by_caller() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        let module = new_module(engine, c"main", c"int base = 40;");
        unsafe {
            asModule_Build(module);
            let mut func = std::ptr::null_mut();
            let rc = asModule_CompileFunction(module, c"adhoc".as_ptr(), c"int f() { return base + 2; }".as_ptr(), 0, 0, &mut func);
            assert_eq!(rc, 0);
            assert!(!func.is_null());
            assert_eq!(asModule_GetFunctionCount(module), 0);
            crate::ffi::function::asFunction_Release(func);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn byte_code_round_trips_through_host_stream() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        let source = new_module(engine, c"source", c"int seven() { return 7; }");
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = asIBinaryStream {
            write: Some(write_vec),
            read: Some(read_vec),
            param: (&mut buffer as *mut Vec<u8>).cast(),
        };
        unsafe {
            asModule_Build(source);
            assert_eq!(asModule_SaveByteCode(source, &mut stream, true), 0);
            let target = asEngine_GetModule(engine, c"target".as_ptr(), 2);
            let mut stripped = false;
            assert_eq!(asModule_LoadByteCode(target, &mut stream, &mut stripped), 0);
            assert!(stripped);
            assert!(!asModule_GetFunctionByDecl(target, c"int seven()".as_ptr()).is_null());
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn null_module_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asModule_Build(null), INVALID_ARG);
            assert_eq!(asModule_GetFunctionCount(null), 0);
            assert!(asModule_GetName(null).is_null());
            let mut out = 1 as *mut asIScriptFunction;
            assert_eq!(asModule_CompileFunction(null, c"s".as_ptr(), c"void f() {}".as_ptr(), 0, 0, &mut out), INVALID_ARG);
            assert!(out.is_null());
            asModule_Discard(null);
        }
    }
}
