//! Host string factories.
//!
//! A C host provides its factory as an [`asIStringFactory`] table. The engine
//! wraps it in [`HostStringFactory`], which builds the runtime's string value
//! for every constant and remembers the host's pointer so the constant can be
//! handed back on release.

use std::ffi::{c_char, c_int, c_void};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use angelscript_core::{ReturnCode, ScriptResult};

use crate::core::string_factory::StringFactory;
use crate::types::script_value::ScriptString;

use super::types::{asUINT, HostPtr, INVALID_ARG};

/// Callback table of a host string factory. The table must outlive every
/// engine it is registered with.
///
/// `get_raw_string_data` is called twice: first with a null `data` to read
/// the length, then with a buffer of that length.
#[repr(C)]
pub struct asIStringFactory {
    pub get_string_constant:
        Option<unsafe extern "C" fn(data: *const c_char, length: asUINT, param: *mut c_void) -> *const c_void>,
    pub release_string_constant: Option<unsafe extern "C" fn(str: *const c_void, param: *mut c_void) -> c_int>,
    pub get_raw_string_data: Option<
        unsafe extern "C" fn(str: *const c_void, data: *mut c_char, length: *mut asUINT, param: *mut c_void) -> c_int,
    >,
    pub param: *mut c_void,
}

/// [`StringFactory`] backed by a host callback table.
pub(crate) struct HostStringFactory {
    table: *const asIStringFactory,
    /// Host constant behind each string handed to the engine, keyed by the
    /// string's buffer.
    constants: Mutex<FxHashMap<usize, (ScriptString, HostPtr)>>,
}

// The table is immutable host data and the host pointers are only passed
// back to the host.
unsafe impl Send for HostStringFactory {}
unsafe impl Sync for HostStringFactory {}

impl HostStringFactory {
    /// # Safety
    /// `table` must point at a complete table that outlives the factory.
    pub(crate) unsafe fn new(table: *const asIStringFactory) -> Option<Arc<Self>> {
        let complete = unsafe { table.as_ref() }.is_some_and(|t| {
            t.get_string_constant.is_some() && t.release_string_constant.is_some() && t.get_raw_string_data.is_some()
        });
        complete.then(|| {
            Arc::new(Self {
                table,
                constants: Mutex::new(FxHashMap::default()),
            })
        })
    }

    fn table(&self) -> &asIStringFactory {
        // checked non-null in `new`
        unsafe { &*self.table }
    }
}

impl StringFactory for HostStringFactory {
    fn get_string_constant(&self, data: &[u8]) -> Option<ScriptString> {
        let table = self.table();
        let get = table.get_string_constant?;
        let host = unsafe { get(data.as_ptr().cast(), data.len() as asUINT, table.param) };
        if host.is_null() {
            return None;
        }
        let bytes = unsafe { raw_data(table, host) }.unwrap_or_else(|| data.to_vec());
        let value = ScriptString::new(String::from_utf8_lossy(&bytes).into_owned());
        self.constants
            .lock()
            .insert(value.as_ptr() as usize, (value.clone(), HostPtr(host.cast_mut())));
        Some(value)
    }

    fn release_string_constant(&self, value: &ScriptString) -> ScriptResult<()> {
        let (_, host) = self
            .constants
            .lock()
            .remove(&(value.as_ptr() as usize))
            .ok_or(ReturnCode::InvalidArg)?;
        let table = self.table();
        let release = table.release_string_constant.ok_or(ReturnCode::Error)?;
        let rc = unsafe { release(host.0, table.param) };
        angelscript_core::ScriptError::from_code(rc)
    }

    fn get_raw_string_data(&self, value: &ScriptString) -> Vec<u8> {
        let host = self.constants.lock().get(&(value.as_ptr() as usize)).map(|(_, h)| *h);
        host.and_then(|h| unsafe { raw_data(self.table(), h.0) })
            .unwrap_or_else(|| value.as_str().as_bytes().to_vec())
    }
}

/// # Safety
/// `host` must be a constant produced by `table`.
unsafe fn raw_data(table: &asIStringFactory, host: *const c_void) -> Option<Vec<u8>> {
    let raw = table.get_raw_string_data?;
    let mut length: asUINT = 0;
    if unsafe { raw(host, std::ptr::null_mut(), &mut length, table.param) } < 0 {
        return None;
    }
    let mut buffer = vec![0u8; length as usize];
    if unsafe { raw(host, buffer.as_mut_ptr().cast(), &mut length, table.param) } < 0 {
        return None;
    }
    buffer.truncate(length as usize);
    Some(buffer)
}

// Forwarders

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asStringFactory_GetStringConstant(
    factory: *mut asIStringFactory,
    data: *const c_char,
    length: asUINT,
) -> *const c_void {
    let table = or_return!(unsafe { factory.as_ref() }, std::ptr::null());
    let get = or_return!(table.get_string_constant, std::ptr::null());
    if data.is_null() && length > 0 {
        return std::ptr::null();
    }
    unsafe { get(data, length, table.param) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asStringFactory_ReleaseStringConstant(
    factory: *mut asIStringFactory,
    str: *const c_void,
) -> c_int {
    let table = or_return!(unsafe { factory.as_ref() }, INVALID_ARG);
    let release = or_return!(table.release_string_constant, INVALID_ARG);
    if str.is_null() {
        return INVALID_ARG;
    }
    unsafe { release(str, table.param) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn asStringFactory_GetRawStringData(
    factory: *mut asIStringFactory,
    str: *const c_void,
    data: *mut c_char,
    length: *mut asUINT,
) -> c_int {
    let table = or_return!(unsafe { factory.as_ref() }, INVALID_ARG);
    let raw = or_return!(table.get_raw_string_data, INVALID_ARG);
    if str.is_null() || length.is_null() {
        return INVALID_ARG;
    }
    unsafe { raw(str, data, length, table.param) }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ffi::CString;

    // Host constants are leaked CStrings; the counter tracks live ones.
    unsafe extern "C" fn get(data: *const c_char, length: asUINT, param: *mut c_void) -> *const c_void {
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), length as usize) };
        let live = unsafe { &*(param as *const std::sync::atomic::AtomicI32) };
        live.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        CString::new(bytes.to_ascii_uppercase()).map_or(std::ptr::null(), |s| s.into_raw().cast_const().cast())
    }

    unsafe extern "C" fn release(str: *const c_void, param: *mut c_void) -> c_int {
        drop(unsafe { CString::from_raw(str.cast_mut().cast()) });
        let live = unsafe { &*(param as *const std::sync::atomic::AtomicI32) };
        live.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn raw(str: *const c_void, data: *mut c_char, length: *mut asUINT, _: *mut c_void) -> c_int {
        let bytes = unsafe { std::ffi::CStr::from_ptr(str.cast()) }.to_bytes();
        if !data.is_null() {
            let n = bytes.len().min(unsafe { *length } as usize);
            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.cast(), n) };
        }
        unsafe { *length = bytes.len() as asUINT };
        0
    }

    pub(crate) fn upper_case_table(live: &std::sync::atomic::AtomicI32) -> asIStringFactory {
        asIStringFactory {
            get_string_constant: Some(get),
            release_string_constant: Some(release),
            get_raw_string_data: Some(raw),
            param: (live as *const std::sync::atomic::AtomicI32).cast_mut().cast(),
        }
    }

    #[test]
    fn host_factory_owns_its_constants() {
        let live = std::sync::atomic::AtomicI32::new(0);
        let table = upper_case_table(&live);
        let factory = unsafe { HostStringFactory::new(&table) }.unwrap();

        let value = factory.get_string_constant(b"hello").unwrap();
        assert_eq!(value.as_str(), "HELLO");
        assert_eq!(factory.get_raw_string_data(&value), b"HELLO");
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 1);

        factory.release_string_constant(&value).unwrap();
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(factory.release_string_constant(&value).is_err());
    }

    #[test]
    fn incomplete_tables_are_rejected() {
        let table = asIStringFactory {
            get_string_constant: Some(get),
            release_string_constant: None,
            get_raw_string_data: Some(raw),
            param: std::ptr::null_mut(),
        };
        assert!(unsafe { HostStringFactory::new(&table) }.is_none());
        assert!(unsafe { HostStringFactory::new(std::ptr::null()) }.is_none());
    }

    #[test]
    fn forwarders_reject_null_arguments() {
        unsafe {
            assert!(asStringFactory_GetStringConstant(std::ptr::null_mut(), c"x".as_ptr(), 1).is_null());
            assert_eq!(
                asStringFactory_ReleaseStringConstant(std::ptr::null_mut(), std::ptr::null()),
                INVALID_ARG
            );
        }
    }
}
