//! `asScriptObject_*` and `asLockableSharedBool_*`.

use std::ffi::{c_char, c_int, c_void};

use angelscript_core::{as_bool, from_as_bool};

use crate::core::lockable_shared_bool::LockableSharedBool;
use crate::core::script_object::ScriptObject;

use super::types::*;

unsafe fn script_object(ptr: *const asIScriptObject) -> Option<ScriptObject> {
    unsafe { from_ptr::<ScriptObject>(ptr) }
}

// Object management

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetEngine(s: *mut asIScriptObject) -> *mut asIScriptEngine {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null_mut());
    opt_ptr(object.get_engine())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_AddRef(s: *mut asIScriptObject) -> c_int {
    unsafe { add_ref::<ScriptObject>(s) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_Release(s: *mut asIScriptObject) -> c_int {
    unsafe { release::<ScriptObject>(s) }
}

/// Owned by the object; valid while the caller holds a reference to the
/// object, or after an `asLockableSharedBool_AddRef`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetWeakRefFlag(s: *mut asIScriptObject) -> *mut asILockableSharedBool {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null_mut());
    as_ptr(&object.get_weak_ref_flag())
}

// Type info

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetObjectType(s: *mut asIScriptObject) -> *mut asITypeInfo {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null_mut());
    as_ptr(&object.get_object_type())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetTypeId(s: *mut asIScriptObject) -> c_int {
    let object = or_return!(unsafe { script_object(s) }, INVALID_ARG);
    object.get_type_id()
}

// Properties

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetPropertyCount(s: *mut asIScriptObject) -> asUINT {
    let object = or_return!(unsafe { script_object(s) }, 0);
    object.get_property_count()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetPropertyTypeId(s: *mut asIScriptObject, prop: asUINT) -> c_int {
    let object = or_return!(unsafe { script_object(s) }, INVALID_ARG);
    object.get_property_type_id(prop)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetPropertyName(s: *mut asIScriptObject, prop: asUINT) -> *const c_char {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null());
    opt_str(object.get_property_name(prop).as_deref())
}

/// Primitive properties come back as the address of their value, object
/// properties as the address of the slot holding the object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetAddressOfProperty(s: *mut asIScriptObject, prop: asUINT) -> *mut c_void {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null_mut());
    object.get_address_of_property(prop)
}

// Copying

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_CopyFrom(s: *mut asIScriptObject, other: *const asIScriptObject) -> c_int {
    let object = or_return!(unsafe { script_object(s) }, INVALID_ARG);
    let other = or_return!(unsafe { script_object(other) }, INVALID_ARG);
    code(object.copy_from(&other))
}

// User data

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_GetUserData(s: *mut asIScriptObject, type_: asPWORD) -> *mut c_void {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null_mut());
    get_user_data(object.user_data_store(), type_)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asScriptObject_SetUserData(s: *mut asIScriptObject, data: *mut c_void, type_: asPWORD) -> *mut c_void {
    let object = or_return!(unsafe { script_object(s) }, std::ptr::null_mut());
    set_user_data(object.user_data_store(), data, type_)
}

// Weak-reference flags

unsafe fn shared_bool(ptr: *mut asILockableSharedBool) -> Option<LockableSharedBool> {
    unsafe { from_ptr::<LockableSharedBool>(ptr) }
}

/// A new unset flag carrying one reference.
#[unsafe(no_mangle)]
pub extern "C" fn asCreateLockableSharedBool() -> *mut asILockableSharedBool {
    into_ptr(LockableSharedBool::new())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asLockableSharedBool_AddRef(b: *mut asILockableSharedBool) -> c_int {
    unsafe { add_ref::<LockableSharedBool>(b) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asLockableSharedBool_Release(b: *mut asILockableSharedBool) -> c_int {
    unsafe { release::<LockableSharedBool>(b) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asLockableSharedBool_Get(b: *mut asILockableSharedBool) -> asBOOL {
    let flag = or_return!(unsafe { shared_bool(b) }, as_bool(false));
    as_bool(flag.get())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asLockableSharedBool_Set(b: *mut asILockableSharedBool, value: asBOOL) {
    let flag = or_return!(unsafe { shared_bool(b) }, ());
    flag.set(from_as_bool(value));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asLockableSharedBool_Lock(b: *mut asILockableSharedBool) {
    let flag = or_return!(unsafe { shared_bool(b) }, ());
    flag.lock();
}

/// The calling thread must hold the lock.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn asLockableSharedBool_Unlock(b: *mut asILockableSharedBool) {
    let flag = or_return!(unsafe { shared_bool(b) }, ());
    unsafe { flag.unlock() };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::engine::*;
    use crate::ffi::module::*;
    use angelscript_core::{type_id, ANGELSCRIPT_VERSION, AS_FALSE, AS_TRUE};
    use std::ffi::CStr;

    fn point_type(engine: *mut asIScriptEngine) -> *mut asITypeInfo {
        unsafe {
            let module = asEngine_GetModule(engine, c"geo".as_ptr(), 2);
            asModule_AddScriptSection(module, c"geo".as_ptr(), c"class Point { int x = 1; double y = 2.5; }".as_ptr(), 0, 0);
            assert_eq!(asModule_Build(module), 0);
            asModule_GetTypeInfoByName(module, c"Point".as_ptr())
        }
    }

    #[test]
    fn properties_are_addressable() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            let ty = point_type(engine);
            let obj = asEngine_CreateScriptObject(engine, ty).cast::<asIScriptObject>();
            assert!(!obj.is_null());
            assert_eq!(asScriptObject_GetObjectType(obj), ty);
            assert_eq!(asScriptObject_GetPropertyCount(obj), 2);
            assert_eq!(asScriptObject_GetPropertyTypeId(obj, 1), type_id::DOUBLE);
            assert_eq!(CStr::from_ptr(asScriptObject_GetPropertyName(obj, 0)).to_str().unwrap(), "x");
            assert!(asScriptObject_GetPropertyName(obj, 2).is_null());

            let x = asScriptObject_GetAddressOfProperty(obj, 0).cast::<i32>();
            assert_eq!(*x, 1);
            *x = 42;
            let copy = asEngine_CreateScriptObject(engine, ty).cast::<asIScriptObject>();
            assert_eq!(asScriptObject_CopyFrom(copy, obj), 0);
            assert_eq!(*asScriptObject_GetAddressOfProperty(copy, 0).cast::<i32>(), 42);

            asScriptObject_Release(copy);
            asScriptObject_Release(obj);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn weak_flag_flips_on_destruction() {
        let engine = asCreateScriptEngine(ANGELSCRIPT_VERSION);
        unsafe {
            let ty = point_type(engine);
            let obj = asEngine_CreateScriptObject(engine, ty).cast::<asIScriptObject>();
            let flag = asScriptObject_GetWeakRefFlag(obj);
            asLockableSharedBool_AddRef(flag);
            assert_eq!(asLockableSharedBool_Get(flag), AS_FALSE);
            assert_eq!(asScriptObject_Release(obj), 0);
            assert_eq!(asLockableSharedBool_Get(flag), AS_TRUE);
            assert_eq!(asLockableSharedBool_Release(flag), 0);
            asEngine_ShutDownAndRelease(engine);
        }
    }

    #[test]
    fn shared_bool_lock_and_set() {
        let flag = asCreateLockableSharedBool();
        unsafe {
            asLockableSharedBool_Lock(flag);
            asLockableSharedBool_Set(flag, AS_TRUE);
            asLockableSharedBool_Unlock(flag);
            assert_eq!(asLockableSharedBool_Get(flag), AS_TRUE);
            assert_eq!(asLockableSharedBool_AddRef(flag), 2);
            assert_eq!(asLockableSharedBool_Release(flag), 1);
            assert_eq!(asLockableSharedBool_Release(flag), 0);
        }
    }

    #[test]
    fn null_object_is_neutral() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(asScriptObject_GetPropertyCount(null), 0);
            assert_eq!(asScriptObject_CopyFrom(null, null), INVALID_ARG);
            assert!(asScriptObject_GetWeakRefFlag(null).is_null());
            assert_eq!(asLockableSharedBool_Get(std::ptr::null_mut()), AS_FALSE);
            asLockableSharedBool_Unlock(std::ptr::null_mut());
        }
    }
}
