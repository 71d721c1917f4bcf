//! `asEngine_*` and the library entry points.

use std::ffi::{c_char, c_int, c_void, CString};
use std::sync::Arc;

use angelscript_core::{
    as_bool, from_as_bool, Behaviour, CallingConvention, EngineProperty, GCFlags, GetModuleFlags,
    MessageType, ObjectTypeFlags, PrimitiveKind, ReturnCode, ANGELSCRIPT_VERSION,
};

use crate::core::context::Context;
use crate::core::engine::Engine;
use crate::core::function::Function;
use crate::core::module::Module;
use crate::core::script_object::ScriptObject;
use crate::core::typeinfo::TypeInfo;
use crate::types::callbacks::{GenericFn, MessageInfo};
use crate::types::global_slot::GlobalSlot;

use super::string_factory::{asIStringFactory, HostStringFactory};
use super::types::*;

/// Wrap a C generic function for registration.
pub(crate) fn generic_fn(function: unsafe extern "C" fn(*mut asIScriptGeneric)) -> GenericFn {
    Arc::new(move |generic| unsafe { function(generic_ptr(generic)) })
}

/// Host functions must use the generic convention.
fn check_generic(call_conv: asDWORD) -> Result<(), c_int> {
    match CallingConvention::try_from(call_conv) {
        Ok(CallingConvention::Generic) => Ok(()),
        Ok(_) => Err(ReturnCode::NotSupported.code()),
        Err(_) => Err(ReturnCode::WrongCallingConv.code()),
    }
}

/// Host callbacks use the plain C convention.
fn check_cdecl(call_conv: asDWORD) -> Result<(), c_int> {
    match CallingConvention::try_from(call_conv) {
        Ok(CallingConvention::Cdecl) => Ok(()),
        Ok(_) => Err(ReturnCode::NotSupported.code()),
        Err(_) => Err(ReturnCode::WrongCallingConv.code()),
    }
}

// Library

/// A new engine, or null when `version` is not compatible with this
/// library: same major and minor version, revision no newer.
#[unsafe(no_mangle)]
pub extern "C" fn asCreateScriptEngine(version: asUINT) -> *mut asIScriptEngine {
    let ours = ANGELSCRIPT_VERSION;
    let compatible = version / 10000 == ours / 10000
        && (version / 100) % 100 == (ours / 100) % 100
        && version % 100 <= ours % 100;
    if !compatible {
        tracing::warn!(version, "incompatible engine version requested");
        return std::ptr::null_mut();
    }
    into_ptr(Engine::create())
}

#[unsafe(no_mangle)]
pub extern "C" fn asGetLibraryVersion() -> *const c_char {
    c"2.37.0".as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn asGetLibraryOptions() -> *const c_char {
    c"AS_GENERIC_ONLY AS_NO_JIT ".as_ptr()
}

// Reference counting

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_AddRef(engine: *mut asIScriptEngine) -> c_int {
    unsafe { add_ref::<Engine>(engine) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_Release(engine: *mut asIScriptEngine) -> c_int {
    unsafe { release::<Engine>(engine) }
}

/// Discard all modules and garbage, then release the caller's reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_ShutDownAndRelease(engine: *mut asIScriptEngine) -> c_int {
    let engine = or_return!(unsafe { take_ptr::<Engine>(engine) }, 0);
    engine.shut_down_and_release() as c_int
}

// Engine properties

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetEngineProperty(
    engine: *mut asIScriptEngine,
    property: asDWORD,
    value: asPWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let property = or_return!(EngineProperty::try_from(property).ok(), INVALID_ARG);
    code(engine.set_engine_property(property, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetEngineProperty(engine: *mut asIScriptEngine, property: asDWORD) -> asPWORD {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    let property = or_return!(EngineProperty::try_from(property).ok(), 0);
    engine.get_engine_property(property)
}

// Message callback

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetMessageCallback(
    engine: *mut asIScriptEngine,
    callback: asMESSAGECALLBACK_t,
    param: *mut c_void,
    call_conv: asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let callback = or_return!(callback, INVALID_ARG);
    if let Err(rc) = check_cdecl(call_conv) {
        return rc;
    }
    let param = HostPtr(param);
    engine.set_message_callback_fn(Arc::new(move |info: &MessageInfo| {
        let section = CString::new(info.section.replace('\0', "")).unwrap_or_default();
        let message = CString::new(info.message.replace('\0', "")).unwrap_or_default();
        let raw = asSMessageInfo {
            section: section.as_ptr(),
            row: info.row,
            col: info.col,
            type_: info.msg_type.into(),
            message: message.as_ptr(),
        };
        let param = param;
        unsafe { callback(&raw, param.0) };
    }));
    ReturnCode::Success.code()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_ClearMessageCallback(engine: *mut asIScriptEngine) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    code(engine.clear_message_callback())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_WriteMessage(
    engine: *mut asIScriptEngine,
    section: *const c_char,
    row: c_int,
    col: c_int,
    type_: c_int,
    message: *const c_char,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let section = unsafe { str_arg(section) }.unwrap_or("");
    let message = or_return!(unsafe { str_arg(message) }, INVALID_ARG);
    let msg_type = or_return!(MessageType::try_from(type_).ok(), INVALID_ARG);
    code(engine.write_message(section, row, col, msg_type, message))
}

// JIT compiler

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetJITCompiler(_engine: *mut asIScriptEngine) -> *mut asIJITCompiler {
    std::ptr::null_mut()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetJITCompiler(engine: *mut asIScriptEngine, _compiler: *mut asIJITCompiler) -> c_int {
    if engine.is_null() {
        return INVALID_ARG;
    }
    ReturnCode::NotSupported.code()
}

// Global functions

/// Returns the new function's id.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterGlobalFunction(
    engine: *mut asIScriptEngine,
    declaration: *const c_char,
    func_pointer: asGENFUNC_t,
    call_conv: asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let declaration = or_return!(unsafe { str_arg(declaration) }, INVALID_ARG);
    let function = or_return!(func_pointer, INVALID_ARG);
    if let Err(rc) = check_generic(call_conv) {
        return rc;
    }
    code_with(
        engine.register_global_function_with_auxiliary(declaration, generic_fn(function), None),
        |f| f.get_id(),
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalFunctionCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_global_function_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalFunctionByIndex(
    engine: *mut asIScriptEngine,
    index: asUINT,
) -> *mut asIScriptFunction {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_global_function_by_index(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalFunctionByDecl(
    engine: *mut asIScriptEngine,
    decl: *const c_char,
) -> *mut asIScriptFunction {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let decl = or_return!(unsafe { str_arg(decl) }, std::ptr::null_mut());
    opt_ptr(engine.get_global_function_by_decl(decl))
}

// Global properties

/// Register a primitive global living at `pointer`. The memory must stay
/// valid for the engine's lifetime. Object typed properties cannot be
/// registered from C.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterGlobalProperty(
    engine: *mut asIScriptEngine,
    declaration: *const c_char,
    pointer: *mut c_void,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let declaration = or_return!(unsafe { str_arg(declaration) }, INVALID_ARG);
    if pointer.is_null() {
        return INVALID_ARG;
    }
    let type_text = match declaration.trim().rsplit_once(char::is_whitespace) {
        Some((type_text, _)) => type_text,
        None => return ReturnCode::InvalidDeclaration.code(),
    };
    let kind = match engine.get_type_id_by_decl(type_text) {
        Ok(type_id) => PrimitiveKind::from_type_id(type_id),
        Err(error) => return error.code(),
    };
    let kind = or_return!(kind, ReturnCode::NotSupported.code());
    let slot = Arc::new(unsafe { GlobalSlot::external(pointer, kind) });
    code(engine.register_global_property(declaration, slot))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalPropertyCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_global_property_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalPropertyByIndex(
    engine: *mut asIScriptEngine,
    index: asUINT,
    name: *mut *const c_char,
    name_space: *mut *const c_char,
    type_id: *mut c_int,
    is_const: *mut asBOOL,
    config_group: *mut *const c_char,
    pointer: *mut *mut c_void,
    access_mask: *mut asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let property = or_return!(engine.get_global_property_by_index(index), INVALID_ARG);
    unsafe {
        write_out(name, return_str(&property.name));
        write_out(name_space, return_str(&property.namespace));
        write_out(type_id, property.type_id);
        write_out(is_const, as_bool(property.is_const));
        write_out(config_group, opt_str(property.config_group.as_deref()));
        write_out(pointer, property.slot.address());
        write_out(access_mask, property.access_mask);
    }
    ReturnCode::Success.code()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalPropertyIndexByName(
    engine: *mut asIScriptEngine,
    name: *const c_char,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let name = or_return!(unsafe { str_arg(name) }, INVALID_ARG);
    code_with(engine.get_global_property_index_by_name(name), |i| i as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGlobalPropertyIndexByDecl(
    engine: *mut asIScriptEngine,
    decl: *const c_char,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(engine.get_global_property_index_by_decl(decl), |i| i as c_int)
}

// Object types

/// Returns the new type's id.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterObjectType(
    engine: *mut asIScriptEngine,
    name: *const c_char,
    byte_size: c_int,
    flags: asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let name = or_return!(unsafe { str_arg(name) }, INVALID_ARG);
    if byte_size < 0 {
        return INVALID_ARG;
    }
    let flags = ObjectTypeFlags::from_bits_truncate(flags);
    code_with(engine.register_object_type(name, byte_size as u32, flags), |t| t.get_type_id())
}

/// Properties are stored by the runtime, so `byte_offset` is ignored.
/// Returns the property's index.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterObjectProperty(
    engine: *mut asIScriptEngine,
    obj: *const c_char,
    declaration: *const c_char,
    _byte_offset: c_int,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let obj = or_return!(unsafe { str_arg(obj) }, INVALID_ARG);
    let declaration = or_return!(unsafe { str_arg(declaration) }, INVALID_ARG);
    code_with(engine.register_object_property(obj, declaration), |i| i as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterObjectMethod(
    engine: *mut asIScriptEngine,
    obj: *const c_char,
    declaration: *const c_char,
    func_pointer: asGENFUNC_t,
    call_conv: asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let obj = or_return!(unsafe { str_arg(obj) }, INVALID_ARG);
    let declaration = or_return!(unsafe { str_arg(declaration) }, INVALID_ARG);
    let function = or_return!(func_pointer, INVALID_ARG);
    if let Err(rc) = check_generic(call_conv) {
        return rc;
    }
    code_with(
        engine.register_object_method_with_auxiliary(obj, declaration, generic_fn(function), None),
        |f| f.get_id(),
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterObjectBehaviour(
    engine: *mut asIScriptEngine,
    obj: *const c_char,
    behaviour: asDWORD,
    declaration: *const c_char,
    func_pointer: asGENFUNC_t,
    call_conv: asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let obj = or_return!(unsafe { str_arg(obj) }, INVALID_ARG);
    let declaration = or_return!(unsafe { str_arg(declaration) }, INVALID_ARG);
    let behaviour = or_return!(Behaviour::try_from(behaviour).ok(), INVALID_ARG);
    let function = or_return!(func_pointer, INVALID_ARG);
    if let Err(rc) = check_generic(call_conv) {
        return rc;
    }
    code_with(
        engine.register_object_behaviour_with_auxiliary(obj, behaviour, declaration, generic_fn(function), None),
        |f| f.get_id(),
    )
}

// Interfaces

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterInterface(engine: *mut asIScriptEngine, name: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let name = or_return!(unsafe { str_arg(name) }, INVALID_ARG);
    code_with(engine.register_interface(name), |t| t.get_type_id())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterInterfaceMethod(
    engine: *mut asIScriptEngine,
    intf: *const c_char,
    declaration: *const c_char,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let intf = or_return!(unsafe { str_arg(intf) }, INVALID_ARG);
    let declaration = or_return!(unsafe { str_arg(declaration) }, INVALID_ARG);
    code_with(engine.register_interface_method(intf, declaration), |f| f.get_id())
}

// String factory

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetStringFactoryReturnTypeId(
    engine: *mut asIScriptEngine,
    flags: *mut asDWORD,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    code_with(engine.get_string_factory_return_type_id(), |(type_id, modifiers)| {
        unsafe { write_out(flags, modifiers.bits()) };
        type_id
    })
}

/// `factory` must outlive the engine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterStringFactory(
    engine: *mut asIScriptEngine,
    datatype: *const c_char,
    factory: *mut asIStringFactory,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let datatype = or_return!(unsafe { str_arg(datatype) }, INVALID_ARG);
    let factory = or_return!(unsafe { HostStringFactory::new(factory) }, INVALID_ARG);
    code(engine.register_string_factory(datatype, factory))
}

// Default array type

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterDefaultArrayType(engine: *mut asIScriptEngine, type_: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let type_ = or_return!(unsafe { str_arg(type_) }, INVALID_ARG);
    code(engine.register_default_array_type(type_))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetDefaultArrayTypeId(engine: *mut asIScriptEngine) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    code_with(engine.get_default_array_type_id(), |id| id)
}

// Enums

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterEnum(engine: *mut asIScriptEngine, type_: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let type_ = or_return!(unsafe { str_arg(type_) }, INVALID_ARG);
    code_with(engine.register_enum(type_), |t| t.get_type_id())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterEnumValue(
    engine: *mut asIScriptEngine,
    type_: *const c_char,
    name: *const c_char,
    value: c_int,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let type_ = or_return!(unsafe { str_arg(type_) }, INVALID_ARG);
    let name = or_return!(unsafe { str_arg(name) }, INVALID_ARG);
    code(engine.register_enum_value(type_, name, value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetEnumCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_enum_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetEnumByIndex(engine: *mut asIScriptEngine, index: asUINT) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_enum_by_index(index))
}

// Funcdefs

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterFuncdef(engine: *mut asIScriptEngine, decl: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(engine.register_funcdef(decl), |t| t.get_type_id())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetFuncdefCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_funcdef_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetFuncdefByIndex(engine: *mut asIScriptEngine, index: asUINT) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_funcdef_by_index(index))
}

// Typedefs

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RegisterTypedef(
    engine: *mut asIScriptEngine,
    type_: *const c_char,
    decl: *const c_char,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let type_ = or_return!(unsafe { str_arg(type_) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(engine.register_typedef(type_, decl), |t| t.get_type_id())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypedefCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_typedef_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypedefByIndex(engine: *mut asIScriptEngine, index: asUINT) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_typedef_by_index(index))
}

// Configuration groups

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_BeginConfigGroup(engine: *mut asIScriptEngine, group_name: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let group_name = or_return!(unsafe { str_arg(group_name) }, INVALID_ARG);
    code(engine.begin_config_group(group_name))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_EndConfigGroup(engine: *mut asIScriptEngine) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    code(engine.end_config_group())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RemoveConfigGroup(engine: *mut asIScriptEngine, group_name: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let group_name = or_return!(unsafe { str_arg(group_name) }, INVALID_ARG);
    code(engine.remove_config_group(group_name))
}

/// Returns the previous mask.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetDefaultAccessMask(engine: *mut asIScriptEngine, default_mask: asDWORD) -> asDWORD {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.set_default_access_mask(default_mask)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetDefaultNamespace(engine: *mut asIScriptEngine, name_space: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let name_space = or_return!(unsafe { str_arg(name_space) }, INVALID_ARG);
    code(engine.set_default_namespace(name_space))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetDefaultNamespace(engine: *mut asIScriptEngine) -> *const c_char {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null());
    return_str(&engine.get_default_namespace())
}

// Modules

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetModule(
    engine: *mut asIScriptEngine,
    module: *const c_char,
    flag: asDWORD,
) -> *mut asIScriptModule {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let module = or_return!(unsafe { str_arg(module) }, std::ptr::null_mut());
    let flag = or_return!(GetModuleFlags::try_from(flag).ok(), std::ptr::null_mut());
    opt_ptr(engine.get_module(module, flag).ok())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_DiscardModule(engine: *mut asIScriptEngine, module: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let module = or_return!(unsafe { str_arg(module) }, INVALID_ARG);
    code(engine.discard_module(module))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetModuleCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_module_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetModuleByIndex(engine: *mut asIScriptEngine, index: asUINT) -> *mut asIScriptModule {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr::<Module>(engine.get_module_by_index(index))
}

// Script objects

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_CreateContext(engine: *mut asIScriptEngine) -> *mut asIScriptContext {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    engine.create_context().map_or(std::ptr::null_mut(), into_ptr)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_CreateScriptObject(engine: *mut asIScriptEngine, type_: *const asITypeInfo) -> *mut c_void {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let type_ = or_return!(unsafe { from_ptr::<TypeInfo>(type_) }, std::ptr::null_mut());
    engine
        .create_script_object(&type_)
        .map_or(std::ptr::null_mut(), |o| into_ptr(o).cast())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_CreateScriptObjectCopy(
    engine: *mut asIScriptEngine,
    obj: *mut c_void,
    type_: *const asITypeInfo,
) -> *mut c_void {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let obj = or_return!(unsafe { object(obj) }, std::ptr::null_mut());
    let type_ = or_return!(unsafe { from_ptr::<TypeInfo>(type_) }, std::ptr::null_mut());
    engine
        .create_script_object_copy(&obj, &type_)
        .map_or(std::ptr::null_mut(), |o| into_ptr(o).cast())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_CreateUninitializedScriptObject(
    engine: *mut asIScriptEngine,
    type_: *const asITypeInfo,
) -> *mut c_void {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let type_ = or_return!(unsafe { from_ptr::<TypeInfo>(type_) }, std::ptr::null_mut());
    engine
        .create_uninitialized_script_object(&type_)
        .map_or(std::ptr::null_mut(), |o| into_ptr(o).cast())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_CreateDelegate(
    engine: *mut asIScriptEngine,
    func: *mut asIScriptFunction,
    obj: *mut c_void,
) -> *mut asIScriptFunction {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let func = or_return!(unsafe { from_ptr::<Function>(func) }, std::ptr::null_mut());
    let obj = or_return!(unsafe { object(obj) }, std::ptr::null_mut());
    engine.create_delegate(&func, &obj).map_or(std::ptr::null_mut(), into_ptr)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_AssignScriptObject(
    engine: *mut asIScriptEngine,
    dst_obj: *mut c_void,
    src_obj: *mut c_void,
    type_: *const asITypeInfo,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let dst = or_return!(unsafe { object(dst_obj) }, INVALID_ARG);
    let src = or_return!(unsafe { object(src_obj) }, INVALID_ARG);
    let type_ = or_return!(unsafe { from_ptr::<TypeInfo>(type_) }, INVALID_ARG);
    code(engine.assign_script_object(&dst, &src, &type_))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_ReleaseScriptObject(
    engine: *mut asIScriptEngine,
    obj: *mut c_void,
    _type: *const asITypeInfo,
) {
    if engine.is_null() {
        return;
    }
    unsafe { release::<ScriptObject>(obj.cast()) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_AddRefScriptObject(
    engine: *mut asIScriptEngine,
    obj: *mut c_void,
    _type: *const asITypeInfo,
) {
    if engine.is_null() {
        return;
    }
    unsafe { add_ref::<ScriptObject>(obj.cast()) };
}

/// On success `*new_ptr` receives a new reference, or null when the cast is
/// not allowed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RefCastObject(
    engine: *mut asIScriptEngine,
    obj: *mut c_void,
    from_type: *mut asITypeInfo,
    to_type: *mut asITypeInfo,
    new_ptr: *mut *mut c_void,
    use_only_implicit_cast: asBOOL,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let from_type = or_return!(unsafe { from_ptr::<TypeInfo>(from_type) }, INVALID_ARG);
    let to_type = or_return!(unsafe { from_ptr::<TypeInfo>(to_type) }, INVALID_ARG);
    if new_ptr.is_null() {
        return INVALID_ARG;
    }
    let Some(obj) = (unsafe { object(obj) }) else {
        unsafe { new_ptr.write(std::ptr::null_mut()) };
        return ReturnCode::Success.code();
    };
    code_with(
        engine.ref_cast_object(&obj, &from_type, &to_type, from_as_bool(use_only_implicit_cast)),
        |cast| {
            let raw = cast.map_or(std::ptr::null_mut(), |o| into_ptr(o).cast());
            unsafe { new_ptr.write(raw) };
            ReturnCode::Success.code()
        },
    )
}

/// The flag is owned by the object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetWeakRefFlagOfScriptObject(
    engine: *mut asIScriptEngine,
    obj: *mut c_void,
    type_: *const asITypeInfo,
) -> *mut asILockableSharedBool {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let obj = or_return!(unsafe { object(obj) }, std::ptr::null_mut());
    let type_ = or_return!(unsafe { from_ptr::<TypeInfo>(type_) }, std::ptr::null_mut());
    opt_ptr(engine.get_weak_ref_flag_of_script_object(&obj, &type_))
}

// Context pooling

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_RequestContext(engine: *mut asIScriptEngine) -> *mut asIScriptContext {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    engine.request_context().map_or(std::ptr::null_mut(), into_ptr)
}

/// Takes over the caller's reference to `ctx`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_ReturnContext(engine: *mut asIScriptEngine, ctx: *mut asIScriptContext) {
    let ctx = or_return!(unsafe { take_ptr::<Context>(ctx) }, ());
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, ());
    if let Err(error) = engine.return_context(ctx) {
        tracing::warn!(%error, "context could not be returned");
    }
}

/// Install host pool callbacks, or remove them when both are null.
///
/// `request_ctx` returns a context carrying a reference that passes to the
/// caller of `asEngine_RequestContext`; `return_ctx` receives a context
/// carrying a reference it must keep or release.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetContextCallbacks(
    engine: *mut asIScriptEngine,
    request_ctx: asREQUESTCONTEXTFUNC_t,
    return_ctx: asRETURNCONTEXTFUNC_t,
    param: *mut c_void,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let (request, give_back) = match (request_ctx, return_ctx) {
        (None, None) => return code(engine.clear_context_callbacks()),
        (Some(request), Some(give_back)) => (request, give_back),
        _ => return INVALID_ARG,
    };
    let param = HostPtr(param);
    engine.set_context_callback_fns(
        Arc::new(move |engine: &Engine| {
            let param = param;
            let raw = unsafe { request(as_ptr(engine), param.0) };
            unsafe { take_ptr::<Context>(raw) }
        }),
        Arc::new(move |engine: &Engine, ctx: Context| {
            let param = param;
            unsafe { give_back(as_ptr(engine), into_ptr(ctx), param.0) };
        }),
    );
    ReturnCode::Success.code()
}

// Garbage collection

/// Runs one iteration with `flags`; no flags means a full cycle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GarbageCollect(engine: *mut asIScriptEngine, flags: asDWORD) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let flags = GCFlags::from_bits_truncate(flags);
    let flags = if flags.is_empty() { GCFlags::FULL_CYCLE } else { flags };
    engine.garbage_collect(flags, 1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetGCStatistics(
    engine: *mut asIScriptEngine,
    current_size: *mut asUINT,
    total_destroyed: *mut asUINT,
    total_detected: *mut asUINT,
    new_objects: *mut asUINT,
    total_new_destroyed: *mut asUINT,
) {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, ());
    let stats = engine.get_gc_statistics();
    unsafe {
        write_out(current_size, stats.current_size);
        write_out(total_destroyed, stats.total_destroyed);
        write_out(total_detected, stats.total_detected);
        write_out(new_objects, stats.new_objects);
        write_out(total_new_destroyed, stats.total_new_destroyed);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_NotifyGarbageCollectorOfNewObject(
    engine: *mut asIScriptEngine,
    obj: *mut c_void,
    _type: *mut asITypeInfo,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let obj = or_return!(unsafe { object(obj) }, INVALID_ARG);
    engine.notify_garbage_collector_of_new_object(&obj);
    ReturnCode::Success.code()
}

/// Pointers written to `obj` and `type_` are borrowed from the collector.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetObjectInGC(
    engine: *mut asIScriptEngine,
    idx: asUINT,
    seq_nbr: *mut asUINT,
    obj: *mut *mut c_void,
    type_: *mut *mut asITypeInfo,
) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let (seq, found, info) = or_return!(engine.get_object_in_gc(idx), INVALID_ARG);
    unsafe {
        write_out(seq_nbr, seq);
        write_out(obj, object_ptr(&found));
        write_out(type_, as_ptr(&info));
    }
    ReturnCode::Success.code()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GCEnumCallback(engine: *mut asIScriptEngine, reference: *mut c_void) {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, ());
    let reference = or_return!(unsafe { object(reference) }, ());
    engine.gc_enum_callback(&reference);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_ForwardGCEnumReferences(
    engine: *mut asIScriptEngine,
    reference: *mut c_void,
    _type: *mut asITypeInfo,
) {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, ());
    let reference = or_return!(unsafe { object(reference) }, ());
    engine.forward_gc_enum_references(&reference);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_ForwardGCReleaseReferences(
    engine: *mut asIScriptEngine,
    reference: *mut c_void,
    _type: *mut asITypeInfo,
) {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, ());
    let reference = or_return!(unsafe { object(reference) }, ());
    engine.forward_gc_release_references(&reference);
}

/// A null callback removes the current one.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetCircularRefDetectedCallback(
    engine: *mut asIScriptEngine,
    callback: asCIRCULARREFFUNC_t,
    param: *mut c_void,
) {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, ());
    let param = HostPtr(param);
    let callback = callback.map(|callback| {
        Arc::new(move |info: &TypeInfo, obj: &ScriptObject| {
            let param = param;
            unsafe { callback(as_ptr(info), object_ptr(obj), param.0) };
        }) as crate::types::callbacks::CircularRefCallbackFn
    });
    engine.set_circular_ref_callback_fn(callback);
}

// Type identification

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypeInfoByName(engine: *mut asIScriptEngine, name: *const c_char) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let name = or_return!(unsafe { str_arg(name) }, std::ptr::null_mut());
    opt_ptr(engine.get_type_info_by_name(name))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypeInfoByDecl(engine: *mut asIScriptEngine, decl: *const c_char) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    let decl = or_return!(unsafe { str_arg(decl) }, std::ptr::null_mut());
    opt_ptr(engine.get_type_info_by_decl(decl))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypeIdByDecl(engine: *mut asIScriptEngine, decl: *const c_char) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    let decl = or_return!(unsafe { str_arg(decl) }, INVALID_ARG);
    code_with(engine.get_type_id_by_decl(decl), |id| id)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypeDeclaration(
    engine: *mut asIScriptEngine,
    type_id: c_int,
    include_namespace: asBOOL,
) -> *const c_char {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null());
    opt_str(engine.get_type_declaration(type_id, from_as_bool(include_namespace)).as_deref())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetSizeOfPrimitiveType(engine: *mut asIScriptEngine, type_id: c_int) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    code_with(engine.get_size_of_primitive_type(type_id), |size| size as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetTypeInfoById(engine: *mut asIScriptEngine, type_id: c_int) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_type_info_by_id(type_id))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetObjectTypeCount(engine: *mut asIScriptEngine) -> asUINT {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, 0);
    engine.get_object_type_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetObjectTypeByIndex(engine: *mut asIScriptEngine, index: asUINT) -> *mut asITypeInfo {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_object_type_by_index(index))
}

// User data

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetUserData(engine: *mut asIScriptEngine, type_: asPWORD) -> *mut c_void {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    get_user_data(engine.user_data_store(), type_)
}

/// Returns the pointer previously stored under `type_`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_SetUserData(engine: *mut asIScriptEngine, data: *mut c_void, type_: asPWORD) -> *mut c_void {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    set_user_data(engine.user_data_store(), data, type_)
}

// Function ids

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetLastFunctionId(engine: *mut asIScriptEngine) -> c_int {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, INVALID_ARG);
    engine.get_last_function_id()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asEngine_GetFunctionById(engine: *mut asIScriptEngine, func_id: c_int) -> *mut asIScriptFunction {
    let engine = or_return!(unsafe { from_ptr::<Engine>(engine) }, std::ptr::null_mut());
    opt_ptr(engine.get_function_by_id(func_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn engine() -> *mut asIScriptEngine {
        asCreateScriptEngine(ANGELSCRIPT_VERSION)
    }

    #[test]
    fn version_must_match_major_and_minor() {
        let e = engine();
        assert!(!e.is_null());
        assert!(asCreateScriptEngine(ANGELSCRIPT_VERSION + 10000).is_null());
        assert!(asCreateScriptEngine(ANGELSCRIPT_VERSION + 1).is_null());
        let version = unsafe { CStr::from_ptr(asGetLibraryVersion()) };
        assert_eq!(version.to_str().unwrap(), angelscript_core::ANGELSCRIPT_VERSION_STRING);
        unsafe { asEngine_ShutDownAndRelease(e) };
    }

    #[test]
    fn add_ref_then_release_keeps_count() {
        let e = engine();
        unsafe {
            assert_eq!(asEngine_AddRef(e), 2);
            assert_eq!(asEngine_Release(e), 1);
            assert_eq!(asEngine_Release(e), 0);
        }
    }

    #[test]
    fn null_engine_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asEngine_AddRef(null), 0);
            assert_eq!(asEngine_SetEngineProperty(null, 0, 1), INVALID_ARG);
            assert_eq!(asEngine_GetGlobalFunctionCount(null), 0);
            assert!(asEngine_GetModule(null, c"m".as_ptr(), 1).is_null());
            assert!(asEngine_CreateContext(null).is_null());
            assert_eq!(asEngine_RegisterObjectType(null, c"T".as_ptr(), 0, 1), INVALID_ARG);
            asEngine_GCEnumCallback(null, std::ptr::null_mut());
        }
    }

    unsafe extern "C" fn add(raw: *mut asIScriptGeneric) {
        let generic = unsafe { generic(raw) }.unwrap();
        let sum = generic.get_arg_dword(0).wrapping_add(generic.get_arg_dword(1));
        generic.set_return_dword(sum).unwrap();
    }

    #[test]
    fn registration_requires_generic_convention() {
        let e = engine();
        unsafe {
            let rc = asEngine_RegisterGlobalFunction(e, c"int add(int, int)".as_ptr(), Some(add), 0);
            assert_eq!(rc, ReturnCode::NotSupported.code());
            let id = asEngine_RegisterGlobalFunction(e, c"int add(int, int)".as_ptr(), Some(add), 6);
            assert!(id > 0);
            assert_eq!(asEngine_GetGlobalFunctionCount(e), 1);
            let by_id = asEngine_GetFunctionById(e, id);
            assert_eq!(by_id, asEngine_GetGlobalFunctionByIndex(e, 0));
            asEngine_Release(e);
        }
    }

    #[test]
    fn global_property_reads_host_memory() {
        let e = engine();
        let mut score: i32 = 7;
        unsafe {
            let rc = asEngine_RegisterGlobalProperty(e, c"int score".as_ptr(), (&mut score as *mut i32).cast());
            assert_eq!(rc, 0);
            assert_eq!(asEngine_GetGlobalPropertyIndexByName(e, c"score".as_ptr()), 0);
            let mut type_id = 0;
            let mut pointer = std::ptr::null_mut();
            asEngine_GetGlobalPropertyByIndex(
                e,
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut type_id,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut pointer,
                std::ptr::null_mut(),
            );
            assert_eq!(type_id, angelscript_core::type_id::INT32);
            assert_eq!(pointer, (&mut score as *mut i32).cast());
            asEngine_Release(e);
        }
        assert_eq!(score, 7);
    }

    unsafe extern "C" fn count_messages(msg: *const asSMessageInfo, param: *mut c_void) {
        let msg = unsafe { &*msg };
        assert_eq!(msg.type_, MessageType::Warning as c_int);
        let seen = unsafe { &*(param as *const AtomicI32) };
        seen.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn message_callback_receives_written_messages() {
        let e = engine();
        let seen = AtomicI32::new(0);
        let param = (&seen as *const AtomicI32).cast_mut().cast();
        unsafe {
            assert_eq!(asEngine_SetMessageCallback(e, Some(count_messages), param, 3), ReturnCode::NotSupported.code());
            assert_eq!(asEngine_SetMessageCallback(e, Some(count_messages), param, 0), 0);
            asEngine_WriteMessage(e, c"host".as_ptr(), 1, 1, MessageType::Warning as c_int, c"careful".as_ptr());
            asEngine_ClearMessageCallback(e);
            asEngine_WriteMessage(e, c"host".as_ptr(), 1, 1, MessageType::Warning as c_int, c"ignored".as_ptr());
            asEngine_Release(e);
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn user_data_returns_previous_pointer() {
        let e = engine();
        let mut value = 5u8;
        let p = (&mut value as *mut u8).cast::<c_void>();
        unsafe {
            assert!(asEngine_SetUserData(e, p, 42).is_null());
            assert_eq!(asEngine_GetUserData(e, 42), p);
            assert_eq!(asEngine_SetUserData(e, std::ptr::null_mut(), 42), p);
            asEngine_Release(e);
        }
    }

    #[test]
    fn pooled_contexts_come_back() {
        let e = engine();
        unsafe {
            let ctx = asEngine_RequestContext(e);
            assert!(!ctx.is_null());
            asEngine_ReturnContext(e, ctx);
            let again = asEngine_RequestContext(e);
            assert_eq!(again, ctx);
            super::super::context::asContext_Release(again);
            asEngine_Release(e);
        }
    }
}
