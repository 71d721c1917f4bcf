//! `asFunction_*`.

use std::ffi::{c_char, c_int, c_void};

use angelscript_core::ReturnCode;

use crate::core::function::Function;

use super::types::*;

unsafe fn function(ptr: *mut asIScriptFunction) -> Option<Function> {
    unsafe { from_ptr::<Function>(ptr) }
}

// Function management

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetEngine(f: *mut asIScriptFunction) -> *mut asIScriptEngine {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    opt_ptr(function.get_engine())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_AddRef(f: *mut asIScriptFunction) -> c_int {
    unsafe { add_ref::<Function>(f) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_Release(f: *mut asIScriptFunction) -> c_int {
    unsafe { release::<Function>(f) }
}

// Function info

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetId(f: *mut asIScriptFunction) -> c_int {
    let function = or_return!(unsafe { function(f) }, INVALID_ARG);
    function.get_id()
}

/// `asFUNC_DUMMY` (-1) for a null function.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetFuncType(f: *mut asIScriptFunction) -> c_int {
    let function = or_return!(unsafe { function(f) }, -1);
    function.get_func_type().into()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetModuleName(f: *mut asIScriptFunction) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    opt_str(function.get_module_name())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetModule(f: *mut asIScriptFunction) -> *mut asIScriptModule {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    opt_ptr(function.get_module())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetScriptSectionName(f: *mut asIScriptFunction) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    opt_str(function.get_script_section_name())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetConfigGroup(f: *mut asIScriptFunction) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    opt_str(function.get_config_group())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetAccessMask(f: *mut asIScriptFunction) -> asDWORD {
    let function = or_return!(unsafe { function(f) }, 0);
    function.get_access_mask()
}

/// Auxiliary values attached from Rust are not visible as pointers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetAuxiliary(f: *mut asIScriptFunction) -> *mut c_void {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    function
        .get_auxiliary()
        .and_then(|v| v.downcast::<HostPtr>().ok())
        .map_or(std::ptr::null_mut(), |p| p.0)
}

// Function signature

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetObjectType(f: *mut asIScriptFunction) -> *mut asITypeInfo {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    opt_ptr(function.get_object_type())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetObjectName(f: *mut asIScriptFunction) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    opt_str(function.get_object_name())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetName(f: *mut asIScriptFunction) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    return_str(function.get_name())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetNamespace(f: *mut asIScriptFunction) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    return_str(function.get_namespace())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetDeclaration(
    f: *mut asIScriptFunction,
    include_object_name: bool,
    include_namespace: bool,
    include_param_names: bool,
) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    return_str(&function.get_declaration(include_object_name, include_namespace, include_param_names))
}

macro_rules! flag_getters {
    ($($c_name:ident => $method:ident;)*) => {
        $(
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn $c_name(f: *mut asIScriptFunction) -> bool {
                let function = or_return!(unsafe { function(f) }, false);
                function.$method()
            }
        )*
    };
}

flag_getters! {
    asFunction_IsReadOnly => is_read_only;
    asFunction_IsPrivate => is_private;
    asFunction_IsProtected => is_protected;
    asFunction_IsFinal => is_final;
    asFunction_IsOverride => is_override;
    asFunction_IsShared => is_shared;
    asFunction_IsExplicit => is_explicit;
    asFunction_IsProperty => is_property;
}

// Parameters

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetParamCount(f: *mut asIScriptFunction) -> asUINT {
    let function = or_return!(unsafe { function(f) }, 0);
    function.get_param_count()
}

/// Every out pointer may be null. `*name` and `*default_arg` are null when
/// the parameter has none.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetParam(
    f: *mut asIScriptFunction,
    index: asUINT,
    type_id: *mut c_int,
    flags: *mut asDWORD,
    name: *mut *const c_char,
    default_arg: *mut *const c_char,
) -> c_int {
    let function = or_return!(unsafe { function(f) }, INVALID_ARG);
    let param = or_return!(function.get_param(index), INVALID_ARG);
    unsafe {
        write_out(type_id, param.type_id());
        write_out(flags, param.modifiers.bits());
        write_out(name, opt_str(param.name.as_deref()));
        write_out(default_arg, opt_str(param.default_text.as_deref()));
    }
    ReturnCode::Success.code()
}

// Return type

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetReturnTypeId(f: *mut asIScriptFunction, flags: *mut asDWORD) -> c_int {
    let function = or_return!(unsafe { function(f) }, INVALID_ARG);
    let (type_id, modifiers) = function.get_return_type_id();
    unsafe { write_out(flags, modifiers.bits()) };
    type_id
}

// Function pointers

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetTypeId(f: *mut asIScriptFunction) -> c_int {
    let function = or_return!(unsafe { function(f) }, INVALID_ARG);
    function.get_type_id()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_IsCompatibleWithTypeId(f: *mut asIScriptFunction, type_id: c_int) -> bool {
    let function = or_return!(unsafe { function(f) }, false);
    function.is_compatible_with_type_id(type_id)
}

// Delegates

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetDelegateObject(f: *mut asIScriptFunction) -> *mut c_void {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    function.get_delegate_object().as_ref().map_or(std::ptr::null_mut(), object_ptr)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetDelegateObjectType(f: *mut asIScriptFunction) -> *mut asITypeInfo {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    opt_ptr(function.get_delegate_object_type())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetDelegateFunction(f: *mut asIScriptFunction) -> *mut asIScriptFunction {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    opt_ptr(function.get_delegate_function())
}

// Debug info

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetVarCount(f: *mut asIScriptFunction) -> asUINT {
    let function = or_return!(unsafe { function(f) }, 0);
    function.get_var_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetVar(
    f: *mut asIScriptFunction,
    index: asUINT,
    name: *mut *const c_char,
    type_id: *mut c_int,
) -> c_int {
    let function = or_return!(unsafe { function(f) }, INVALID_ARG);
    let (var_name, var_type) = or_return!(function.get_var(index), INVALID_ARG);
    unsafe {
        write_out(name, return_str(&var_name));
        write_out(type_id, var_type);
    }
    ReturnCode::Success.code()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetVarDecl(
    f: *mut asIScriptFunction,
    index: asUINT,
    include_namespace: bool,
) -> *const c_char {
    let function = or_return!(unsafe { function(f) }, std::ptr::null());
    opt_str(function.get_var_decl(index, include_namespace).as_deref())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_FindNextLineWithCode(f: *mut asIScriptFunction, line: c_int) -> c_int {
    let function = or_return!(unsafe { function(f) }, INVALID_ARG);
    function.find_next_line_with_code(line)
}

/// The instruction stream is not laid out as words, so this always
/// returns null. `*length` receives the instruction count.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetByteCode(f: *mut asIScriptFunction, length: *mut asUINT) -> *mut asDWORD {
    let count = unsafe { function(f) }.map_or(0, |function| function.get_byte_code_length() as asUINT);
    unsafe { write_out(length, count) };
    std::ptr::null_mut()
}

// User data

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_GetUserData(f: *mut asIScriptFunction, type_: asPWORD) -> *mut c_void {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    get_user_data(function.user_data_store(), type_)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asFunction_SetUserData(f: *mut asIScriptFunction, data: *mut c_void, type_: asPWORD) -> *mut c_void {
    let function = or_return!(unsafe { function(f) }, std::ptr::null_mut());
    set_user_data(function.user_data_store(), data, type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::engine::*;
    use crate::ffi::module::*;
    use angelscript_core::{type_id, ANGELSCRIPT_VERSION};
    use std::ffi::CStr;

    fn text(ptr: *const c_char) -> String {
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    #[test]
    fn describes_script_function() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            let module = asEngine_GetModule(engine, c"lib".as_ptr(), 2);
            let code = c"namespace math {\nint scale(int value, int factor = 2) {\n  int result = value * factor;\n  return result;\n}\n}";
            asModule_AddScriptSection(module, c"lib.as".as_ptr(), code.as_ptr(), 0, 0);
            assert_eq!(asModule_Build(module), 0);
            let f = asModule_GetFunctionByName(module, c"scale".as_ptr());

            assert_eq!(text(asFunction_GetName(f)), "scale");
            assert_eq!(text(asFunction_GetNamespace(f)), "math");
            assert_eq!(text(asFunction_GetModuleName(f)), "lib");
            assert_eq!(text(asFunction_GetScriptSectionName(f)), "lib.as");
            assert_eq!(asFunction_GetFuncType(f), 1);
            assert_eq!(asFunction_GetModule(f), module);
            assert_eq!(asFunction_GetEngine(f), engine);
            assert_eq!(
                text(asFunction_GetDeclaration(f, true, true, true)),
                "int math::scale(int value, int factor = 2)"
            );

            assert_eq!(asFunction_GetParamCount(f), 2);
            let mut tid = 0;
            let mut name = std::ptr::null();
            let mut default = std::ptr::null();
            assert_eq!(asFunction_GetParam(f, 1, &mut tid, std::ptr::null_mut(), &mut name, &mut default), 0);
            assert_eq!(tid, type_id::INT32);
            assert_eq!(text(name), "factor");
            assert_eq!(text(default), "2");
            assert_eq!(asFunction_GetParam(f, 2, &mut tid, std::ptr::null_mut(), &mut name, &mut default), INVALID_ARG);

            assert_eq!(asFunction_GetReturnTypeId(f, std::ptr::null_mut()), type_id::INT32);
            assert!(asFunction_GetVarCount(f) >= 3);
            assert_eq!(asFunction_FindNextLineWithCode(f, 1), 3);
            assert!(!asFunction_IsReadOnly(f));

            let mut length = 0;
            assert!(asFunction_GetByteCode(f, &mut length).is_null());
            assert!(length > 0);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn user_data_slots_are_per_key() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            let module = asEngine_GetModule(engine, c"m".as_ptr(), 2);
            asModule_AddScriptSection(module, c"m".as_ptr(), c"void f() {}".as_ptr(), 0, 0);
            asModule_Build(module);
            let f = asModule_GetFunctionByIndex(module, 0);
            let mut marker = 5u8;
            let ptr = (&mut marker as *mut u8).cast::<c_void>();
            assert!(asFunction_SetUserData(f, ptr, 1).is_null());
            assert_eq!(asFunction_GetUserData(f, 1), ptr);
            assert!(asFunction_GetUserData(f, 2).is_null());
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn null_function_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asFunction_GetId(null), INVALID_ARG);
            assert_eq!(asFunction_GetFuncType(null), -1);
            assert!(asFunction_GetName(null).is_null());
            assert!(!asFunction_IsShared(null));
            assert_eq!(asFunction_AddRef(null), 0);
            let mut length = 9;
            asFunction_GetByteCode(null, &mut length);
            assert_eq!(length, 0);
        }
    }
}
