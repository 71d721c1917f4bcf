use std::ffi::c_void;

use angelscript_core::PrimitiveKind;
use parking_lot::Mutex;

use crate::types::script_value::Value;

enum Storage {
    Owned(Mutex<Value>),
    /// Primitive living in host memory, registered through the C surface.
    External { ptr: *mut c_void, kind: PrimitiveKind },
}

/// Storage of one global variable or registered global property.
///
/// Compiled code and the host share the slot through an `Arc`, so a value
/// written by either side is seen by the other.
pub struct GlobalSlot {
    storage: Storage,
}

// External slots point at host memory the registrant keeps alive for the
// engine's lifetime; every access goes through `read`/`write` below.
unsafe impl Send for GlobalSlot {}
unsafe impl Sync for GlobalSlot {}

impl GlobalSlot {
    pub fn new(value: Value) -> Self {
        Self {
            storage: Storage::Owned(Mutex::new(value)),
        }
    }

    /// # Safety
    /// `ptr` must be valid for reads and writes of `kind` for as long as the
    /// slot is reachable.
    pub(crate) unsafe fn external(ptr: *mut c_void, kind: PrimitiveKind) -> Self {
        Self {
            storage: Storage::External { ptr, kind },
        }
    }

    pub fn get(&self) -> Value {
        match &self.storage {
            Storage::Owned(value) => value.lock().clone(),
            Storage::External { ptr, kind } => unsafe { read_external(*ptr, *kind) },
        }
    }

    /// Replace the value, returning the old one so the caller can drop it
    /// outside any lock it holds.
    pub fn replace(&self, value: Value) -> Value {
        match &self.storage {
            Storage::Owned(slot) => std::mem::replace(&mut *slot.lock(), value),
            Storage::External { ptr, kind } => unsafe {
                let old = read_external(*ptr, *kind);
                write_external(*ptr, &value.convert(*kind));
                old
            },
        }
    }

    pub fn set(&self, value: Value) {
        drop(self.replace(value));
    }

    pub(crate) fn address(&self) -> *mut c_void {
        match &self.storage {
            Storage::Owned(value) => value.lock().payload_ptr(),
            Storage::External { ptr, .. } => *ptr,
        }
    }
}

unsafe fn read_external(ptr: *mut c_void, kind: PrimitiveKind) -> Value {
    unsafe {
        match kind {
            PrimitiveKind::Void => Value::Void,
            PrimitiveKind::Bool => Value::Bool(*(ptr as *const u8) != 0),
            PrimitiveKind::Int8 => Value::Int8(*(ptr as *const i8)),
            PrimitiveKind::Int16 => Value::Int16(*(ptr as *const i16)),
            PrimitiveKind::Int32 => Value::Int32(*(ptr as *const i32)),
            PrimitiveKind::Int64 => Value::Int64(*(ptr as *const i64)),
            PrimitiveKind::Uint8 => Value::UInt8(*(ptr as *const u8)),
            PrimitiveKind::Uint16 => Value::UInt16(*(ptr as *const u16)),
            PrimitiveKind::Uint32 => Value::UInt32(*(ptr as *const u32)),
            PrimitiveKind::Uint64 => Value::UInt64(*(ptr as *const u64)),
            PrimitiveKind::Float => Value::Float(*(ptr as *const f32)),
            PrimitiveKind::Double => Value::Double(*(ptr as *const f64)),
        }
    }
}

unsafe fn write_external(ptr: *mut c_void, value: &Value) {
    unsafe {
        match *value {
            Value::Bool(v) => *(ptr as *mut u8) = v as u8,
            Value::Int8(v) => *(ptr as *mut i8) = v,
            Value::Int16(v) => *(ptr as *mut i16) = v,
            Value::Int32(v) => *(ptr as *mut i32) = v,
            Value::Int64(v) => *(ptr as *mut i64) = v,
            Value::UInt8(v) => *(ptr as *mut u8) = v,
            Value::UInt16(v) => *(ptr as *mut u16) = v,
            Value::UInt32(v) => *(ptr as *mut u32) = v,
            Value::UInt64(v) => *(ptr as *mut u64) = v,
            Value::Float(v) => *(ptr as *mut f32) = v,
            Value::Double(v) => *(ptr as *mut f64) = v,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_slot_replace() {
        let slot = GlobalSlot::new(Value::Int32(1));
        assert_eq!(slot.replace(Value::Int32(2)), Value::Int32(1));
        assert_eq!(slot.get(), Value::Int32(2));
    }

    #[test]
    fn external_slot_reads_host_memory() {
        let mut host: f64 = 1.25;
        let slot = unsafe {
            GlobalSlot::external(&mut host as *mut f64 as *mut c_void, PrimitiveKind::Double)
        };
        assert_eq!(slot.get(), Value::Double(1.25));
        slot.set(Value::Int32(3));
        assert_eq!(host, 3.0);
    }
}
