//! Type-id encoding.
//!
//! A type id is an `i32`. Ids `0..=11` are the primitives. Every other type
//! gets a sequence number in the low bits plus category flags; a handle to an
//! object type sets [`TypeIdFlags::OBJHANDLE`] on top of the object's id.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Category bits of a type id.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeIdFlags: u32 {
        const OBJHANDLE = 0x4000_0000;
        const HANDLETOCONST = 0x2000_0000;
        const MASK_OBJECT = 0x1C00_0000;
        const APPOBJECT = 0x0400_0000;
        const SCRIPTOBJECT = 0x0800_0000;
        const TEMPLATE = 0x1000_0000;
        const MASK_SEQNBR = 0x03FF_FFFF;
    }
}

pub const VOID: i32 = 0;
pub const BOOL: i32 = 1;
pub const INT8: i32 = 2;
pub const INT16: i32 = 3;
pub const INT32: i32 = 4;
pub const INT64: i32 = 5;
pub const UINT8: i32 = 6;
pub const UINT16: i32 = 7;
pub const UINT32: i32 = 8;
pub const UINT64: i32 = 9;
pub const FLOAT: i32 = 10;
pub const DOUBLE: i32 = 11;

/// First sequence number handed out to non-primitive types.
pub const FIRST_SEQUENCE: i32 = 12;

const OBJHANDLE: i32 = TypeIdFlags::OBJHANDLE.bits() as i32;
const HANDLETOCONST: i32 = TypeIdFlags::HANDLETOCONST.bits() as i32;
const MASK_OBJECT: i32 = TypeIdFlags::MASK_OBJECT.bits() as i32;
const SCRIPTOBJECT: i32 = TypeIdFlags::SCRIPTOBJECT.bits() as i32;
const MASK_SEQNBR: i32 = TypeIdFlags::MASK_SEQNBR.bits() as i32;

/// `true` for ids `0..=11`.
#[inline]
pub fn is_primitive(type_id: i32) -> bool {
    (VOID..=DOUBLE).contains(&type_id)
}

/// `true` when the id refers to an object type, with or without handle.
#[inline]
pub fn is_object(type_id: i32) -> bool {
    type_id & MASK_OBJECT != 0
}

#[inline]
pub fn is_handle(type_id: i32) -> bool {
    type_id & OBJHANDLE != 0
}

#[inline]
pub fn is_handle_to_const(type_id: i32) -> bool {
    type_id & HANDLETOCONST != 0
}

#[inline]
pub fn is_script_object(type_id: i32) -> bool {
    type_id & SCRIPTOBJECT != 0
}

/// The id with handle bits removed.
#[inline]
pub fn base_of(type_id: i32) -> i32 {
    type_id & !(OBJHANDLE | HANDLETOCONST)
}

/// Sequence number part of the id.
#[inline]
pub fn sequence_of(type_id: i32) -> i32 {
    type_id & MASK_SEQNBR
}

/// Compose an id from a sequence number and category flags.
#[inline]
pub fn compose(sequence: i32, flags: TypeIdFlags) -> i32 {
    (sequence & MASK_SEQNBR) | flags.bits() as i32
}

/// The handle form of an object id.
#[inline]
pub fn handle_of(type_id: i32, to_const: bool) -> i32 {
    let id = type_id | OBJHANDLE;
    if to_const { id | HANDLETOCONST } else { id }
}

/// Built-in numeric, boolean and void types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const fn type_id(self) -> i32 {
        match self {
            PrimitiveKind::Void => VOID,
            PrimitiveKind::Bool => BOOL,
            PrimitiveKind::Int8 => INT8,
            PrimitiveKind::Int16 => INT16,
            PrimitiveKind::Int32 => INT32,
            PrimitiveKind::Int64 => INT64,
            PrimitiveKind::Uint8 => UINT8,
            PrimitiveKind::Uint16 => UINT16,
            PrimitiveKind::Uint32 => UINT32,
            PrimitiveKind::Uint64 => UINT64,
            PrimitiveKind::Float => FLOAT,
            PrimitiveKind::Double => DOUBLE,
        }
    }

    pub const fn from_type_id(type_id: i32) -> Option<PrimitiveKind> {
        Some(match type_id {
            VOID => PrimitiveKind::Void,
            BOOL => PrimitiveKind::Bool,
            INT8 => PrimitiveKind::Int8,
            INT16 => PrimitiveKind::Int16,
            INT32 => PrimitiveKind::Int32,
            INT64 => PrimitiveKind::Int64,
            UINT8 => PrimitiveKind::Uint8,
            UINT16 => PrimitiveKind::Uint16,
            UINT32 => PrimitiveKind::Uint32,
            UINT64 => PrimitiveKind::Uint64,
            FLOAT => PrimitiveKind::Float,
            DOUBLE => PrimitiveKind::Double,
            _ => return None,
        })
    }

    /// Keyword spelling, using the short aliases for 32-bit integers.
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "int8",
            PrimitiveKind::Int16 => "int16",
            PrimitiveKind::Int32 => "int",
            PrimitiveKind::Int64 => "int64",
            PrimitiveKind::Uint8 => "uint8",
            PrimitiveKind::Uint16 => "uint16",
            PrimitiveKind::Uint32 => "uint",
            PrimitiveKind::Uint64 => "uint64",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Size in bytes of a value of this kind.
    pub const fn size(self) -> u32 {
        match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Bool | PrimitiveKind::Int8 | PrimitiveKind::Uint8 => 1,
            PrimitiveKind::Int16 | PrimitiveKind::Uint16 => 2,
            PrimitiveKind::Int32 | PrimitiveKind::Uint32 | PrimitiveKind::Float => 4,
            PrimitiveKind::Int64 | PrimitiveKind::Uint64 | PrimitiveKind::Double => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int8
                | PrimitiveKind::Int16
                | PrimitiveKind::Int32
                | PrimitiveKind::Int64
                | PrimitiveKind::Uint8
                | PrimitiveKind::Uint16
                | PrimitiveKind::Uint32
                | PrimitiveKind::Uint64
        )
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int8 | PrimitiveKind::Int16 | PrimitiveKind::Int32 | PrimitiveKind::Int64
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_ids_are_stable() {
        assert_eq!(PrimitiveKind::Int32.type_id(), 4);
        assert_eq!(PrimitiveKind::Double.type_id(), 11);
        assert_eq!(PrimitiveKind::from_type_id(8), Some(PrimitiveKind::Uint32));
        assert_eq!(PrimitiveKind::from_type_id(12), None);
        assert!(is_primitive(DOUBLE));
        assert!(!is_primitive(FIRST_SEQUENCE));
    }

    #[test]
    fn handle_bits_compose_and_strip() {
        let id = compose(40, TypeIdFlags::SCRIPTOBJECT);
        assert!(is_object(id));
        assert!(is_script_object(id));
        let handle = handle_of(id, true);
        assert!(is_handle(handle));
        assert!(is_handle_to_const(handle));
        assert_eq!(base_of(handle), id);
        assert_eq!(sequence_of(handle), 40);
    }

    #[test]
    fn sizes() {
        assert_eq!(PrimitiveKind::Bool.size(), 1);
        assert_eq!(PrimitiveKind::Uint16.size(), 2);
        assert_eq!(PrimitiveKind::Float.size(), 4);
        assert_eq!(PrimitiveKind::Int64.size(), 8);
    }
}
