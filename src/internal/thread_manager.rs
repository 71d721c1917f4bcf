//! Per-thread state: the stack of contexts executing on this thread and the
//! scratch buffers backing strings returned across the C surface.

use std::cell::RefCell;
use std::ffi::{c_char, CString};

use crate::core::context::Context;

/// How many returned strings stay valid at once on one thread.
const SCRATCH_SLOTS: usize = 8;

#[derive(Default)]
struct ThreadLocalData {
    active_contexts: Vec<Context>,
    scratch: Vec<CString>,
    next_scratch: usize,
}

thread_local! {
    static THREAD_DATA: RefCell<ThreadLocalData> = RefCell::new(ThreadLocalData::default());
}

/// Mark `context` as executing on this thread.
pub(crate) fn push_active(context: &Context) {
    THREAD_DATA.with(|data| data.borrow_mut().active_contexts.push(context.clone()));
}

/// Undo the matching [`push_active`].
pub(crate) fn pop_active() {
    let popped = THREAD_DATA.with(|data| data.borrow_mut().active_contexts.pop());
    drop(popped);
}

/// The innermost context executing on this thread.
pub(crate) fn active_context() -> Option<Context> {
    THREAD_DATA.with(|data| data.borrow().active_contexts.last().cloned())
}

/// Keep `text` alive in a thread-local slot and return a pointer to it.
///
/// The pointer stays valid until [`SCRATCH_SLOTS`] further strings have been
/// stored on the same thread. Interior NULs truncate the string.
pub(crate) fn scratch_cstr(text: &str) -> *const c_char {
    let bytes: Vec<u8> = text.bytes().take_while(|&b| b != 0).collect();
    // no interior NUL after the truncation above
    let owned = CString::new(bytes).unwrap_or_default();
    THREAD_DATA.with(|data| {
        let mut data = data.borrow_mut();
        let slot = data.next_scratch;
        data.next_scratch = (slot + 1) % SCRATCH_SLOTS;
        // slots fill in order, so an unfilled slot is always the next push
        if slot == data.scratch.len() {
            data.scratch.push(owned);
        } else {
            data.scratch[slot] = owned;
        }
        data.scratch[slot].as_ptr()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn scratch_strings_survive_several_calls() {
        let a = scratch_cstr("first");
        let b = scratch_cstr("second");
        let c = scratch_cstr("bad\0tail");
        unsafe {
            assert_eq!(CStr::from_ptr(a).to_str().unwrap(), "first");
            assert_eq!(CStr::from_ptr(b).to_str().unwrap(), "second");
            assert_eq!(CStr::from_ptr(c).to_str().unwrap(), "bad");
        }
    }

    #[test]
    fn no_active_context_outside_execution() {
        assert!(active_context().is_none());
    }
}
