//! Opaque handle types, integer aliases and callback signatures of the C
//! surface, plus the helpers every family uses to cross the boundary.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void, CStr};
use std::marker::{PhantomData, PhantomPinned};
use std::sync::Arc;

use angelscript_core::{ReturnCode, ScriptResult};

use crate::core::context::{Context, ContextData};
use crate::core::engine::{Engine, EngineData};
use crate::core::function::{Function, FunctionData};
use crate::core::lockable_shared_bool::{LockableSharedBool, SharedBoolData};
use crate::core::module::{Module, ModuleData};
use crate::core::script_generic::ScriptGeneric;
use crate::core::script_object::{ObjectData, ScriptObject};
use crate::core::typeinfo::{TypeInfo, TypeInfoData};
use crate::types::user_data::{UserDataStore, UserDataValue};

pub use angelscript_core::AsBool as asBOOL;

pub type asBYTE = u8;
pub type asWORD = u16;
pub type asDWORD = u32;
pub type asQWORD = u64;
pub type asUINT = u32;
pub type asPWORD = usize;

macro_rules! opaque {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _data: [u8; 0],
                _marker: PhantomData<(*mut u8, PhantomPinned)>,
            }
        )*
    };
}

opaque! {
    /// An [`Engine`].
    asIScriptEngine;
    /// A [`Module`]. Owned by its engine; there is no add-ref.
    asIScriptModule;
    /// A [`Context`].
    asIScriptContext;
    /// A [`Function`].
    asIScriptFunction;
    /// A [`TypeInfo`].
    asITypeInfo;
    /// A [`ScriptObject`]. Functions taking `void *obj` expect one of these.
    asIScriptObject;
    /// The [`ScriptGeneric`] frame passed to a generic function.
    asIScriptGeneric;
    /// A [`LockableSharedBool`].
    asILockableSharedBool;
    /// Never produced; JIT compilation is not supported.
    asIJITCompiler;
}

/// Message delivered to the message callback. The strings are valid for the
/// duration of the call.
#[repr(C)]
pub struct asSMessageInfo {
    pub section: *const c_char,
    pub row: c_int,
    pub col: c_int,
    pub type_: c_int,
    pub message: *const c_char,
}

/// Byte stream for `asModule_SaveByteCode`/`asModule_LoadByteCode`. Both
/// callbacks return a negative value on failure.
#[repr(C)]
pub struct asIBinaryStream {
    pub write: Option<unsafe extern "C" fn(ptr: *const c_void, size: asUINT, param: *mut c_void) -> c_int>,
    pub read: Option<unsafe extern "C" fn(ptr: *mut c_void, size: asUINT, param: *mut c_void) -> c_int>,
    pub param: *mut c_void,
}

pub type asMESSAGECALLBACK_t = Option<unsafe extern "C" fn(msg: *const asSMessageInfo, param: *mut c_void)>;
pub type asGENFUNC_t = Option<unsafe extern "C" fn(generic: *mut asIScriptGeneric)>;
pub type asCONTEXTCALLBACK_t = Option<unsafe extern "C" fn(ctx: *mut asIScriptContext, param: *mut c_void)>;
pub type asREQUESTCONTEXTFUNC_t =
    Option<unsafe extern "C" fn(engine: *mut asIScriptEngine, param: *mut c_void) -> *mut asIScriptContext>;
pub type asRETURNCONTEXTFUNC_t =
    Option<unsafe extern "C" fn(engine: *mut asIScriptEngine, ctx: *mut asIScriptContext, param: *mut c_void)>;
pub type asCIRCULARREFFUNC_t =
    Option<unsafe extern "C" fn(type_info: *mut asITypeInfo, obj: *const c_void, param: *mut c_void)>;

pub(crate) const INVALID_ARG: c_int = ReturnCode::InvalidArg as c_int;

/// A host pointer carried inside callbacks and user data. The host is
/// responsible for whatever it points at.
#[derive(Clone, Copy)]
pub(crate) struct HostPtr(pub(crate) *mut c_void);

unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

// Handles

/// A reference-counted handle whose shared data is what C callers point at.
pub(crate) trait Handle: Sized {
    type Raw;
    type Data;

    fn from_arc(data: Arc<Self::Data>) -> Self;
    fn arc(&self) -> &Arc<Self::Data>;
    fn into_arc(self) -> Arc<Self::Data>;
}

macro_rules! handle {
    ($handle:ident, $raw:ty, $data:ty) => {
        impl Handle for $handle {
            type Raw = $raw;
            type Data = $data;

            fn from_arc(data: Arc<$data>) -> Self {
                $handle(data)
            }

            fn arc(&self) -> &Arc<$data> {
                &self.0
            }

            fn into_arc(self) -> Arc<$data> {
                self.0
            }
        }
    };
}

handle!(Engine, asIScriptEngine, EngineData);
handle!(Module, asIScriptModule, ModuleData);
handle!(Context, asIScriptContext, ContextData);
handle!(Function, asIScriptFunction, FunctionData);
handle!(TypeInfo, asITypeInfo, TypeInfoData);
handle!(ScriptObject, asIScriptObject, ObjectData);
handle!(LockableSharedBool, asILockableSharedBool, SharedBoolData);

/// A new handle to what `ptr` points at, or `None` for null.
///
/// # Safety
/// `ptr` must be null or a pointer previously handed out for `H` whose
/// object is still alive.
pub(crate) unsafe fn from_ptr<H: Handle>(ptr: *const H::Raw) -> Option<H> {
    let data = ptr.cast::<H::Data>();
    if data.is_null() {
        return None;
    }
    unsafe {
        Arc::increment_strong_count(data);
        Some(H::from_arc(Arc::from_raw(data)))
    }
}

/// Pointer to `handle` that does not carry a reference. Valid while
/// something else keeps the object alive.
pub(crate) fn as_ptr<H: Handle>(handle: &H) -> *mut H::Raw {
    Arc::as_ptr(handle.arc()).cast::<H::Raw>().cast_mut()
}

pub(crate) fn opt_ptr<H: Handle>(handle: Option<H>) -> *mut H::Raw {
    handle.as_ref().map_or(std::ptr::null_mut(), as_ptr)
}

/// Pointer that carries one reference, released with [`release`].
pub(crate) fn into_ptr<H: Handle>(handle: H) -> *mut H::Raw {
    Arc::into_raw(handle.into_arc()).cast::<H::Raw>().cast_mut()
}

/// Take over the reference `ptr` carries.
///
/// # Safety
/// `ptr` must be null or carry a reference the caller gives up.
pub(crate) unsafe fn take_ptr<H: Handle>(ptr: *const H::Raw) -> Option<H> {
    let data = ptr.cast::<H::Data>();
    if data.is_null() {
        return None;
    }
    Some(H::from_arc(unsafe { Arc::from_raw(data) }))
}

/// Add a reference, returning the new count. 0 for null.
///
/// # Safety
/// As for [`from_ptr`].
pub(crate) unsafe fn add_ref<H: Handle>(ptr: *const H::Raw) -> c_int {
    match unsafe { from_ptr::<H>(ptr) } {
        Some(handle) => {
            let count = Arc::strong_count(handle.arc());
            std::mem::forget(handle);
            count as c_int
        }
        None => 0,
    }
}

/// Drop a reference, returning the remaining count. 0 for null.
///
/// # Safety
/// `ptr` must carry a reference owned by the caller.
pub(crate) unsafe fn release<H: Handle>(ptr: *const H::Raw) -> c_int {
    match unsafe { take_ptr::<H>(ptr) } {
        Some(handle) => {
            let remaining = Arc::strong_count(handle.arc()) - 1;
            drop(handle);
            remaining as c_int
        }
        None => 0,
    }
}

/// A script object passed as `void *`.
///
/// # Safety
/// As for [`from_ptr`].
pub(crate) unsafe fn object(ptr: *const c_void) -> Option<ScriptObject> {
    unsafe { from_ptr::<ScriptObject>(ptr.cast()) }
}

pub(crate) fn object_ptr(object: &ScriptObject) -> *mut c_void {
    as_ptr(object).cast()
}

/// # Safety
/// `ptr` must be null or the frame passed to the running generic function.
pub(crate) unsafe fn generic<'a>(ptr: *mut asIScriptGeneric) -> Option<&'a mut ScriptGeneric> {
    unsafe { ptr.cast::<ScriptGeneric>().as_mut() }
}

pub(crate) fn generic_ptr(generic: &mut ScriptGeneric) -> *mut asIScriptGeneric {
    (generic as *mut ScriptGeneric).cast()
}

// Strings and results

/// Borrow a NUL-terminated UTF-8 argument.
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated string that outlives the
/// returned borrow.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Return `text` through the calling thread's scratch buffers.
pub(crate) fn return_str(text: &str) -> *const c_char {
    crate::internal::thread_manager::scratch_cstr(text)
}

pub(crate) fn opt_str(text: Option<&str>) -> *const c_char {
    text.map_or(std::ptr::null(), return_str)
}

pub(crate) fn code(result: ScriptResult<()>) -> c_int {
    match result {
        Ok(()) => ReturnCode::Success.code(),
        Err(error) => error.code(),
    }
}

/// `Ok` values mapped through `f`, errors as their code.
pub(crate) fn code_with<T>(result: ScriptResult<T>, f: impl FnOnce(T) -> c_int) -> c_int {
    match result {
        Ok(value) => f(value),
        Err(error) => error.code(),
    }
}

/// Write `value` through `out` when the host asked for it.
///
/// # Safety
/// `out` must be null or valid for a write of `T`.
pub(crate) unsafe fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        unsafe { out.write(value) }
    }
}

// User data

/// Store a host pointer under `key`, returning the pointer stored before.
/// A null `data` clears the slot.
pub(crate) fn set_user_data(store: &UserDataStore, data: *mut c_void, key: asPWORD) -> *mut c_void {
    let old = if data.is_null() {
        store.remove_raw(key)
    } else {
        store.set_raw(key, Arc::new(HostPtr(data)))
    };
    host_ptr(old)
}

pub(crate) fn get_user_data(store: &UserDataStore, key: asPWORD) -> *mut c_void {
    host_ptr(store.get_raw(key))
}

/// Values stored from Rust are not visible as pointers.
fn host_ptr(value: Option<UserDataValue>) -> *mut c_void {
    value
        .and_then(|v| v.downcast::<HostPtr>().ok())
        .map_or(std::ptr::null_mut(), |p| p.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_ref_and_release_report_counts() {
        let engine = Engine::create();
        let ptr = into_ptr(engine.clone());
        unsafe {
            assert_eq!(add_ref::<Engine>(ptr), 3);
            assert_eq!(release::<Engine>(ptr), 2);
            assert_eq!(release::<Engine>(ptr), 1);
        }
        assert_eq!(engine.ref_count(), 1);
    }

    #[test]
    fn null_handles_are_neutral() {
        unsafe {
            assert!(from_ptr::<Engine>(std::ptr::null()).is_none());
            assert_eq!(add_ref::<Context>(std::ptr::null()), 0);
            assert_eq!(release::<Function>(std::ptr::null()), 0);
            assert!(str_arg(std::ptr::null()).is_none());
        }
    }

    #[test]
    fn raw_user_data_round_trips() {
        let store = UserDataStore::new();
        let mut a = 1u32;
        let mut b = 2u32;
        let pa = (&mut a as *mut u32).cast::<c_void>();
        let pb = (&mut b as *mut u32).cast::<c_void>();
        assert!(set_user_data(&store, pa, 7).is_null());
        assert_eq!(set_user_data(&store, pb, 7), pa);
        assert_eq!(get_user_data(&store, 7), pb);
        assert_eq!(set_user_data(&store, std::ptr::null_mut(), 7), pb);
        assert!(get_user_data(&store, 7).is_null());
    }
}
