//! `asTypeInfo_*`.

use std::ffi::{c_char, c_int, c_void};

use angelscript_core::{as_bool, from_as_bool, ReturnCode};

use crate::core::typeinfo::TypeInfo;

use super::types::*;

unsafe fn type_info(ptr: *const asITypeInfo) -> Option<TypeInfo> {
    unsafe { from_ptr::<TypeInfo>(ptr) }
}

// Type info management

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetEngine(ti: *mut asITypeInfo) -> *mut asIScriptEngine {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_engine())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetConfigGroup(ti: *mut asITypeInfo) -> *const c_char {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null());
    opt_str(ti.get_config_group())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetAccessMask(ti: *mut asITypeInfo) -> asDWORD {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_access_mask()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetModule(ti: *mut asITypeInfo) -> *mut asIScriptModule {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_module())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_AddRef(ti: *mut asITypeInfo) -> c_int {
    unsafe { add_ref::<TypeInfo>(ti) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_Release(ti: *mut asITypeInfo) -> c_int {
    unsafe { release::<TypeInfo>(ti) }
}

// Type info

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetName(ti: *mut asITypeInfo) -> *const c_char {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null());
    return_str(ti.get_name())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetNamespace(ti: *mut asITypeInfo) -> *const c_char {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null());
    return_str(ti.get_namespace())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetBaseType(ti: *mut asITypeInfo) -> *mut asITypeInfo {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_base_type())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_DerivesFrom(ti: *mut asITypeInfo, obj_type: *const asITypeInfo) -> asBOOL {
    let ti = or_return!(unsafe { type_info(ti) }, as_bool(false));
    let other = or_return!(unsafe { type_info(obj_type) }, as_bool(false));
    as_bool(ti.derives_from(&other))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetFlags(ti: *mut asITypeInfo) -> asDWORD {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_flags().bits()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetSize(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_size()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetTypeId(ti: *mut asITypeInfo) -> c_int {
    let ti = or_return!(unsafe { type_info(ti) }, INVALID_ARG);
    ti.get_type_id()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetSubTypeId(ti: *mut asITypeInfo, sub_type_index: asUINT) -> c_int {
    let ti = or_return!(unsafe { type_info(ti) }, INVALID_ARG);
    ti.get_sub_type_id(sub_type_index)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetSubType(ti: *mut asITypeInfo, sub_type_index: asUINT) -> *mut asITypeInfo {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_sub_type(sub_type_index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetSubTypeCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_sub_type_count()
}

// Interfaces

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetInterfaceCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_interface_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetInterface(ti: *mut asITypeInfo, index: asUINT) -> *mut asITypeInfo {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_interface(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_Implements(ti: *mut asITypeInfo, obj_type: *const asITypeInfo) -> asBOOL {
    let ti = or_return!(unsafe { type_info(ti) }, as_bool(false));
    let interface = or_return!(unsafe { type_info(obj_type) }, as_bool(false));
    as_bool(ti.implements(&interface))
}

// Factories

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetFactoryCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_factory_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetFactoryByIndex(ti: *mut asITypeInfo, index: asUINT) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_factory_by_index(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetFactoryByDecl(ti: *mut asITypeInfo, decl: *const c_char) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    let decl = or_return!(unsafe { str_arg(decl) }, std::ptr::null_mut());
    opt_ptr(ti.get_factory_by_decl(decl))
}

// Methods

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetMethodCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_method_count()
}

/// Methods are always returned as resolved for the type, so `get_virtual`
/// makes no difference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetMethodByIndex(
    ti: *mut asITypeInfo,
    index: asUINT,
    get_virtual: asBOOL,
) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_method_by_index(index, from_as_bool(get_virtual)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetMethodByName(
    ti: *mut asITypeInfo,
    name: *const c_char,
    get_virtual: asBOOL,
) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    let name = or_return!(unsafe { str_arg(name) }, std::ptr::null_mut());
    opt_ptr(ti.get_method_by_name(name, from_as_bool(get_virtual)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetMethodByDecl(
    ti: *mut asITypeInfo,
    decl: *const c_char,
    get_virtual: asBOOL,
) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    let decl = or_return!(unsafe { str_arg(decl) }, std::ptr::null_mut());
    opt_ptr(ti.get_method_by_decl(decl, from_as_bool(get_virtual)))
}

// Properties

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetPropertyCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_property_count()
}

/// `*offset` is the property's slot index. Properties are never composite,
/// so `*composite_offset` is 0 and `*is_composite_indirect` is false.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetProperty(
    ti: *mut asITypeInfo,
    index: asUINT,
    name: *mut *const c_char,
    type_id: *mut c_int,
    is_private: *mut asBOOL,
    is_protected: *mut asBOOL,
    offset: *mut c_int,
    is_reference: *mut asBOOL,
    access_mask: *mut asDWORD,
    composite_offset: *mut c_int,
    is_composite_indirect: *mut asBOOL,
) -> c_int {
    let ti = or_return!(unsafe { type_info(ti) }, INVALID_ARG);
    let property = or_return!(ti.get_property(index), INVALID_ARG);
    unsafe {
        write_out(name, return_str(&property.name));
        write_out(type_id, property.type_id());
        write_out(is_private, as_bool(property.is_private));
        write_out(is_protected, as_bool(property.is_protected));
        write_out(offset, property.offset);
        write_out(is_reference, as_bool(property.is_reference));
        write_out(access_mask, property.access_mask);
        write_out(composite_offset, 0);
        write_out(is_composite_indirect, as_bool(false));
    }
    ReturnCode::Success.code()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetPropertyDeclaration(
    ti: *mut asITypeInfo,
    index: asUINT,
    include_namespace: asBOOL,
) -> *const c_char {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null());
    opt_str(
        ti.get_property_declaration(index, from_as_bool(include_namespace))
            .as_deref(),
    )
}

// Behaviours

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetBehaviourCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_behaviour_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetBehaviourByIndex(
    ti: *mut asITypeInfo,
    index: asUINT,
    out_behaviour: *mut asDWORD,
) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    let (behaviour, function) = or_return!(ti.get_behaviour_by_index(index), std::ptr::null_mut());
    unsafe { write_out(out_behaviour, behaviour.into()) };
    as_ptr(&function)
}

// Child types

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetChildFuncdefCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_child_funcdef_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetChildFuncdef(ti: *mut asITypeInfo, index: asUINT) -> *mut asITypeInfo {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_child_funcdef(index))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetParentType(ti: *mut asITypeInfo) -> *mut asITypeInfo {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_parent_type())
}

// Enums

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetEnumValueCount(ti: *mut asITypeInfo) -> asUINT {
    let ti = or_return!(unsafe { type_info(ti) }, 0);
    ti.get_enum_value_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetEnumValueByIndex(
    ti: *mut asITypeInfo,
    index: asUINT,
    out_value: *mut c_int,
) -> *const c_char {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null());
    let (name, value) = or_return!(ti.get_enum_value_by_index(index), std::ptr::null());
    unsafe { write_out(out_value, value) };
    return_str(&name)
}

// Typedefs and funcdefs

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetTypedefTypeId(ti: *mut asITypeInfo) -> c_int {
    let ti = or_return!(unsafe { type_info(ti) }, INVALID_ARG);
    ti.get_typedef_type_id()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetFuncdefSignature(ti: *mut asITypeInfo) -> *mut asIScriptFunction {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    opt_ptr(ti.get_funcdef_signature())
}

// User data

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_GetUserData(ti: *mut asITypeInfo, type_: asPWORD) -> *mut c_void {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    get_user_data(ti.user_data_store(), type_)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asTypeInfo_SetUserData(ti: *mut asITypeInfo, data: *mut c_void, type_: asPWORD) -> *mut c_void {
    let ti = or_return!(unsafe { type_info(ti) }, std::ptr::null_mut());
    set_user_data(ti.user_data_store(), data, type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::engine::*;
    use crate::ffi::module::*;
    use angelscript_core::{type_id, ANGELSCRIPT_VERSION, AS_FALSE, AS_TRUE};
    use std::ffi::CStr;

    const SCRIPT: &CStr = c"
interface IShape { float area(); }
class Base { int id; }
class Square : Base, IShape {
    float side;
    private int secret;
    float area() { return side * side; }
}
enum Color { Red, Green = 5 }
typedef int Handle;
";

    fn text(ptr: *const c_char) -> String {
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn build() -> (*mut asIScriptEngine, *mut asIScriptModule) {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            let module = asEngine_GetModule(engine, c"shapes".as_ptr(), 2);
            asModule_AddScriptSection(module, c"shapes".as_ptr(), SCRIPT.as_ptr(), 0, 0);
            assert_eq!(asModule_Build(module), 0);
            (engine, module)
        }
    }

    #[test]
    fn class_hierarchy() {
        let (engine, module) = build();
        unsafe {
            let square = asModule_GetTypeInfoByName(module, c"Square".as_ptr());
            let base = asModule_GetTypeInfoByName(module, c"Base".as_ptr());
            let shape = asModule_GetTypeInfoByName(module, c"IShape".as_ptr());
            assert_eq!(text(asTypeInfo_GetName(square)), "Square");
            assert_eq!(asTypeInfo_GetBaseType(square), base);
            assert_eq!(asTypeInfo_DerivesFrom(square, base), AS_TRUE);
            assert_eq!(asTypeInfo_DerivesFrom(base, square), AS_FALSE);
            assert_eq!(asTypeInfo_Implements(square, shape), AS_TRUE);
            assert_eq!(asTypeInfo_GetInterfaceCount(square), 1);
            assert_eq!(asTypeInfo_GetModule(square), module);

            let area = asTypeInfo_GetMethodByName(square, c"area".as_ptr(), AS_TRUE);
            assert!(!area.is_null());
            assert_eq!(asTypeInfo_GetMethodByDecl(square, c"float area()".as_ptr(), AS_FALSE), area);

            assert_eq!(asTypeInfo_GetPropertyCount(square), 3);
            let mut name = std::ptr::null();
            let mut tid = 0;
            let mut private = AS_FALSE;
            let rc = asTypeInfo_GetProperty(
                square,
                2,
                &mut name,
                &mut tid,
                &mut private,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            assert_eq!(rc, 0);
            assert_eq!(text(name), "secret");
            assert_eq!(tid, type_id::INT32);
            assert_eq!(private, AS_TRUE);
            assert_eq!(text(asTypeInfo_GetPropertyDeclaration(square, 1, AS_FALSE)), "float side");
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn enums_and_typedefs() {
        let (engine, module) = build();
        unsafe {
            assert_eq!(asModule_GetEnumCount(module), 1);
            let color = asModule_GetEnumByIndex(module, 0);
            assert_eq!(asTypeInfo_GetEnumValueCount(color), 2);
            let mut value = 0;
            assert_eq!(text(asTypeInfo_GetEnumValueByIndex(color, 1, &mut value)), "Green");
            assert_eq!(value, 5);
            assert!(asTypeInfo_GetEnumValueByIndex(color, 2, &mut value).is_null());

            let handle = asModule_GetTypedefByIndex(module, 0);
            assert_eq!(asTypeInfo_GetTypedefTypeId(handle), type_id::INT32);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn null_type_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asTypeInfo_GetTypeId(null), INVALID_ARG);
            assert_eq!(asTypeInfo_GetFlags(null), 0);
            assert_eq!(asTypeInfo_DerivesFrom(null, null), AS_FALSE);
            assert!(asTypeInfo_GetBehaviourByIndex(null, 0, std::ptr::null_mut()).is_null());
        }
    }
}
