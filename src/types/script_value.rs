//! Values as the VM, the generic calling convention and the host exchange
//! them.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use angelscript_core::PrimitiveKind;

use crate::core::function::Function;
use crate::core::script_object::ScriptObject;
use crate::types::data_type::{DataType, DataTypeKind};

/// Immutable script string. Clones share one buffer.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptString(Arc<String>);

impl ScriptString {
    pub fn new(value: impl Into<String>) -> Self {
        ScriptString(Arc::new(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of handles sharing this buffer.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Address of the shared buffer, stable for the string's lifetime.
    pub(crate) fn as_ptr(&self) -> *const String {
        Arc::as_ptr(&self.0)
    }
}

impl fmt::Debug for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::borrow::Borrow<str> for ScriptString {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for ScriptString {
    fn from(value: &str) -> Self {
        ScriptString::new(value)
    }
}

impl From<String> for ScriptString {
    fn from(value: String) -> Self {
        ScriptString(Arc::new(value))
    }
}

/// A dynamically typed value.
///
/// Primitives are stored by value. Enum values are `Int32`. Object handles
/// and function handles hold a strong reference, so a `Value` keeps what it
/// points at alive. A non-handle object variable is an `Object(Some(..))`
/// that is never shared with another variable.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(ScriptString),
    Object(Option<ScriptObject>),
    Function(Option<Function>),
}

impl Value {
    /// The zero value of a primitive.
    pub fn zero(kind: PrimitiveKind) -> Value {
        match kind {
            PrimitiveKind::Void => Value::Void,
            PrimitiveKind::Bool => Value::Bool(false),
            PrimitiveKind::Int8 => Value::Int8(0),
            PrimitiveKind::Int16 => Value::Int16(0),
            PrimitiveKind::Int32 => Value::Int32(0),
            PrimitiveKind::Int64 => Value::Int64(0),
            PrimitiveKind::Uint8 => Value::UInt8(0),
            PrimitiveKind::Uint16 => Value::UInt16(0),
            PrimitiveKind::Uint32 => Value::UInt32(0),
            PrimitiveKind::Uint64 => Value::UInt64(0),
            PrimitiveKind::Float => Value::Float(0.0),
            PrimitiveKind::Double => Value::Double(0.0),
        }
    }

    /// The value a variable of type `ty` holds before anything is assigned.
    ///
    /// Object variables start as null; the compiler emits the construction.
    pub fn default_for(ty: &DataType) -> Value {
        match &ty.kind {
            DataTypeKind::Primitive(kind) => Value::zero(*kind),
            DataTypeKind::Enum(_) => Value::Int32(0),
            DataTypeKind::Object(info) if info.is_string_type() && !ty.is_handle => {
                Value::String(ScriptString::default())
            }
            DataTypeKind::Funcdef(_) => Value::Function(None),
            DataTypeKind::Object(_) | DataTypeKind::Null => Value::Object(None),
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::Void => PrimitiveKind::Void,
            Value::Bool(_) => PrimitiveKind::Bool,
            Value::Int8(_) => PrimitiveKind::Int8,
            Value::Int16(_) => PrimitiveKind::Int16,
            Value::Int32(_) => PrimitiveKind::Int32,
            Value::Int64(_) => PrimitiveKind::Int64,
            Value::UInt8(_) => PrimitiveKind::Uint8,
            Value::UInt16(_) => PrimitiveKind::Uint16,
            Value::UInt32(_) => PrimitiveKind::Uint32,
            Value::UInt64(_) => PrimitiveKind::Uint64,
            Value::Float(_) => PrimitiveKind::Float,
            Value::Double(_) => PrimitiveKind::Double,
            _ => return None,
        })
    }

    /// Raw bits of a primitive, zero-extended from its native width.
    ///
    /// Non-primitives report 0.
    pub fn to_bits(&self) -> u64 {
        match *self {
            Value::Bool(v) => v as u64,
            Value::Int8(v) => v as u8 as u64,
            Value::Int16(v) => v as u16 as u64,
            Value::Int32(v) => v as u32 as u64,
            Value::Int64(v) => v as u64,
            Value::UInt8(v) => v as u64,
            Value::UInt16(v) => v as u64,
            Value::UInt32(v) => v as u64,
            Value::UInt64(v) => v,
            Value::Float(v) => v.to_bits() as u64,
            Value::Double(v) => v.to_bits(),
            _ => 0,
        }
    }

    /// Reinterpret the low bits of `bits` as a value of `kind`.
    pub fn from_bits(kind: PrimitiveKind, bits: u64) -> Value {
        match kind {
            PrimitiveKind::Void => Value::Void,
            PrimitiveKind::Bool => Value::Bool(bits as u8 != 0),
            PrimitiveKind::Int8 => Value::Int8(bits as u8 as i8),
            PrimitiveKind::Int16 => Value::Int16(bits as u16 as i16),
            PrimitiveKind::Int32 => Value::Int32(bits as u32 as i32),
            PrimitiveKind::Int64 => Value::Int64(bits as i64),
            PrimitiveKind::Uint8 => Value::UInt8(bits as u8),
            PrimitiveKind::Uint16 => Value::UInt16(bits as u16),
            PrimitiveKind::Uint32 => Value::UInt32(bits as u32),
            PrimitiveKind::Uint64 => Value::UInt64(bits),
            PrimitiveKind::Float => Value::Float(f32::from_bits(bits as u32)),
            PrimitiveKind::Double => Value::Double(f64::from_bits(bits)),
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Bool(v) => v,
            Value::Float(v) => v != 0.0,
            Value::Double(v) => v != 0.0,
            Value::Object(ref o) => o.is_some(),
            Value::Function(ref f) => f.is_some(),
            _ => self.to_bits() != 0,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Value::Bool(v) => v as i64,
            Value::Int8(v) => v as i64,
            Value::Int16(v) => v as i64,
            Value::Int32(v) => v as i64,
            Value::Int64(v) => v,
            Value::UInt8(v) => v as i64,
            Value::UInt16(v) => v as i64,
            Value::UInt32(v) => v as i64,
            Value::UInt64(v) => v as i64,
            Value::Float(v) => v as i64,
            Value::Double(v) => v as i64,
            _ => 0,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match *self {
            Value::Int8(v) => v as u64,
            Value::Int16(v) => v as u64,
            Value::Int32(v) => v as u64,
            Value::Int64(v) => v as u64,
            Value::Float(v) => v as u64,
            Value::Double(v) => v as u64,
            _ => self.as_i64() as u64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Float(v) => v as f64,
            Value::Double(v) => v,
            Value::UInt64(v) => v as f64,
            _ => self.as_i64() as f64,
        }
    }

    /// Numeric conversion with `as` semantics.
    pub fn convert(&self, kind: PrimitiveKind) -> Value {
        if self.primitive_kind() == Some(kind) {
            return self.clone();
        }
        let float_source = matches!(self, Value::Float(_) | Value::Double(_));
        match kind {
            PrimitiveKind::Void => Value::Void,
            PrimitiveKind::Bool => Value::Bool(self.as_bool()),
            PrimitiveKind::Float => Value::Float(self.as_f64() as f32),
            PrimitiveKind::Double => Value::Double(self.as_f64()),
            _ if float_source => {
                let v = self.as_f64();
                if kind.is_signed() {
                    Value::from_bits(kind, (v as i64) as u64)
                } else {
                    Value::from_bits(kind, v as u64)
                }
            }
            _ => Value::from_bits(kind, self.as_i64() as u64),
        }
    }

    pub fn as_object(&self) -> Option<&ScriptObject> {
        match self {
            Value::Object(Some(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&ScriptString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(Some(f)) => Some(f),
            _ => None,
        }
    }

    /// `true` for a null object or function handle.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Object(None) | Value::Function(None))
    }

    /// Handle identity as tested by `is`.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => match (a, b) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            },
            (Value::Function(a), Value::Function(b)) => match (a, b) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            },
            (Value::Object(None), Value::Function(None))
            | (Value::Function(None), Value::Object(None)) => true,
            _ => false,
        }
    }

    /// Convert for storage in a variable of type `ty`: primitives convert
    /// numerically, handles must point at a compatible type. `None` when the
    /// value does not fit.
    pub(crate) fn coerce(self, ty: &DataType) -> Option<Value> {
        match (&ty.kind, self) {
            (DataTypeKind::Primitive(PrimitiveKind::Void), _) => None,
            (DataTypeKind::Primitive(kind), v) if v.primitive_kind().is_some_and(|k| k != PrimitiveKind::Void) => {
                Some(v.convert(*kind))
            }
            (DataTypeKind::Enum(_), v) if v.primitive_kind().is_some_and(|k| k != PrimitiveKind::Void) => {
                Some(v.convert(PrimitiveKind::Int32))
            }
            (DataTypeKind::Object(info), v @ Value::String(_)) if info.is_string_type() => Some(v),
            (DataTypeKind::Object(info), Value::Object(Some(obj))) => {
                obj.get_object_type().is_assignable_to(info).then_some(Value::Object(Some(obj)))
            }
            (DataTypeKind::Object(info), Value::Object(None) | Value::Function(None))
                if ty.is_handle && !info.is_string_type() =>
            {
                Some(Value::Object(None))
            }
            (DataTypeKind::Funcdef(_), Value::Object(None) | Value::Function(None)) => Some(Value::Function(None)),
            (DataTypeKind::Funcdef(info), Value::Function(Some(func))) => {
                let compatible = info
                    .get_funcdef_signature()
                    .is_some_and(|sig| func.is_compatible_with(&sig));
                compatible.then_some(Value::Function(Some(func)))
            }
            (DataTypeKind::Null, v) if v.is_null() => Some(v),
            _ => None,
        }
    }

    /// Address of the payload, for the address-of accessors on the C
    /// surface. Objects and functions report the object itself.
    pub(crate) fn payload_ptr(&self) -> *mut c_void {
        match self {
            Value::Void => std::ptr::null_mut(),
            Value::Bool(v) => v as *const bool as *mut c_void,
            Value::Int8(v) => v as *const i8 as *mut c_void,
            Value::Int16(v) => v as *const i16 as *mut c_void,
            Value::Int32(v) => v as *const i32 as *mut c_void,
            Value::Int64(v) => v as *const i64 as *mut c_void,
            Value::UInt8(v) => v as *const u8 as *mut c_void,
            Value::UInt16(v) => v as *const u16 as *mut c_void,
            Value::UInt32(v) => v as *const u32 as *mut c_void,
            Value::UInt64(v) => v as *const u64 as *mut c_void,
            Value::Float(v) => v as *const f32 as *mut c_void,
            Value::Double(v) => v as *const f64 as *mut c_void,
            Value::String(s) => s.as_ptr() as *mut c_void,
            Value::Object(Some(obj)) => obj.as_ptr() as *mut c_void,
            Value::Function(Some(func)) => func.as_ptr() as *mut c_void,
            Value::Object(None) | Value::Function(None) => std::ptr::null_mut(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(_) | Value::Function(_), Value::Object(_) | Value::Function(_)) => {
                self.same_identity(other)
            }
            (a, b) => match (a.primitive_kind(), b.primitive_kind()) {
                (Some(ka), Some(kb)) if ka == kb => a.to_bits() == b.to_bits(),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("Void"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int8(v) => write!(f, "Int8({v})"),
            Value::Int16(v) => write!(f, "Int16({v})"),
            Value::Int32(v) => write!(f, "Int32({v})"),
            Value::Int64(v) => write!(f, "Int64({v})"),
            Value::UInt8(v) => write!(f, "UInt8({v})"),
            Value::UInt16(v) => write!(f, "UInt16({v})"),
            Value::UInt32(v) => write!(f, "UInt32({v})"),
            Value::UInt64(v) => write!(f, "UInt64({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => write!(f, "Object({o:?})"),
            Value::Function(func) => write!(f, "Function({func:?})"),
        }
    }
}

/// Text used when a value is concatenated to a string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s.as_str()),
            Value::Object(None) | Value::Function(None) => f.write_str("null"),
            Value::Object(Some(obj)) => write!(f, "{}", obj.get_object_type().get_name()),
            Value::Function(Some(func)) => f.write_str(func.get_name()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    ScriptString => String,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(ScriptString::new(v))
    }
}

impl From<ScriptObject> for Value {
    fn from(v: ScriptObject) -> Self {
        Value::Object(Some(v))
    }
}

impl From<Option<ScriptObject>> for Value {
    fn from(v: Option<ScriptObject>) -> Self {
        Value::Object(v)
    }
}
