//! Resolved types of variables, parameters and expressions.

use std::fmt;

use angelscript_core::{type_id, PrimitiveKind};

use crate::core::typeinfo::TypeInfo;

/// What a [`DataType`] is made of.
#[derive(Clone, PartialEq, Eq)]
pub enum DataTypeKind {
    Primitive(PrimitiveKind),
    /// Registered type, script class or interface.
    Object(TypeInfo),
    Enum(TypeInfo),
    Funcdef(TypeInfo),
    /// Type of the `null` literal.
    Null,
}

/// A type with its qualifiers.
#[derive(Clone, PartialEq, Eq)]
pub struct DataType {
    pub kind: DataTypeKind,
    pub is_handle: bool,
    pub is_const: bool,
    pub is_handle_const: bool,
}

impl DataType {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::from_kind(DataTypeKind::Primitive(kind))
    }

    pub fn void() -> Self {
        Self::primitive(PrimitiveKind::Void)
    }

    pub fn null() -> Self {
        let mut ty = Self::from_kind(DataTypeKind::Null);
        ty.is_handle = true;
        ty
    }

    /// Value of an object type, or of an enum/funcdef depending on `info`.
    pub fn of(info: &TypeInfo) -> Self {
        let kind = if info.is_enum() {
            DataTypeKind::Enum(info.clone())
        } else if info.is_funcdef() {
            DataTypeKind::Funcdef(info.clone())
        } else {
            DataTypeKind::Object(info.clone())
        };
        let mut ty = Self::from_kind(kind);
        // funcdefs only exist as handles
        ty.is_handle = info.is_funcdef();
        ty
    }

    pub fn handle(info: &TypeInfo) -> Self {
        let mut ty = Self::of(info);
        ty.is_handle = true;
        ty
    }

    fn from_kind(kind: DataTypeKind) -> Self {
        Self {
            kind,
            is_handle: false,
            is_const: false,
            is_handle_const: false,
        }
    }

    pub fn with_const(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    /// The same type without `const` qualifiers.
    pub fn unqualified(&self) -> Self {
        let mut ty = self.clone();
        ty.is_const = false;
        ty.is_handle_const = false;
        ty
    }

    pub fn type_id(&self) -> i32 {
        match &self.kind {
            DataTypeKind::Primitive(kind) => kind.type_id(),
            DataTypeKind::Enum(info) => info.get_type_id(),
            DataTypeKind::Object(info) | DataTypeKind::Funcdef(info) => {
                if self.is_handle {
                    type_id::handle_of(info.get_type_id(), self.is_const)
                } else {
                    info.get_type_id()
                }
            }
            DataTypeKind::Null => type_id::handle_of(0, false),
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.kind {
            DataTypeKind::Primitive(kind) => Some(kind),
            DataTypeKind::Enum(_) => Some(PrimitiveKind::Int32),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.kind == DataTypeKind::Primitive(PrimitiveKind::Void)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, DataTypeKind::Primitive(_))
    }

    /// Primitives and enums.
    pub fn is_numeric_like(&self) -> bool {
        match self.kind {
            DataTypeKind::Primitive(kind) => kind.is_numeric(),
            DataTypeKind::Enum(_) => true,
            _ => false,
        }
    }

    pub fn is_bool(&self) -> bool {
        self.kind == DataTypeKind::Primitive(PrimitiveKind::Bool)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, DataTypeKind::Enum(_))
    }

    pub fn is_funcdef(&self) -> bool {
        matches!(self.kind, DataTypeKind::Funcdef(_))
    }

    pub fn is_null(&self) -> bool {
        self.kind == DataTypeKind::Null
    }

    pub fn is_string(&self) -> bool {
        matches!(&self.kind, DataTypeKind::Object(info) if info.is_string_type())
    }

    /// Object or funcdef type, handle or not.
    pub fn is_object(&self) -> bool {
        matches!(self.kind, DataTypeKind::Object(_) | DataTypeKind::Funcdef(_))
    }

    /// A non-handle variable of a reference type, with value semantics.
    pub fn is_object_value(&self) -> bool {
        matches!(&self.kind, DataTypeKind::Object(info) if !self.is_handle && !info.is_string_type())
    }

    /// Handles, including the null type.
    pub fn is_handle_like(&self) -> bool {
        self.is_handle || self.is_null()
    }

    pub fn type_info(&self) -> Option<&TypeInfo> {
        match &self.kind {
            DataTypeKind::Object(info) | DataTypeKind::Enum(info) | DataTypeKind::Funcdef(info) => {
                Some(info)
            }
            _ => None,
        }
    }

    /// Same base type, ignoring handle and const qualifiers.
    pub fn same_base(&self, other: &DataType) -> bool {
        self.kind == other.kind
    }

    /// Size in bytes as the C surface reports it.
    pub fn size(&self) -> u32 {
        match &self.kind {
            DataTypeKind::Primitive(kind) => kind.size(),
            DataTypeKind::Enum(_) => 4,
            _ => std::mem::size_of::<usize>() as u32,
        }
    }

    pub fn declaration(&self, include_namespace: bool) -> String {
        let mut out = String::new();
        if self.is_const {
            out.push_str("const ");
        }
        match &self.kind {
            DataTypeKind::Primitive(kind) => out.push_str(kind.name()),
            DataTypeKind::Null => out.push_str("null"),
            DataTypeKind::Object(info) | DataTypeKind::Enum(info) | DataTypeKind::Funcdef(info) => {
                let ns = info.get_namespace();
                if include_namespace && !ns.is_empty() {
                    out.push_str(ns);
                    out.push_str("::");
                }
                out.push_str(info.get_name());
            }
        }
        if self.is_handle && !self.is_null() {
            out.push('@');
            if self.is_handle_const {
                out.push_str(" const");
            }
        }
        out
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration(true))
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.declaration(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_declarations() {
        let ty = DataType::primitive(PrimitiveKind::Uint32).with_const(true);
        assert_eq!(ty.declaration(true), "const uint");
        assert_eq!(ty.type_id(), type_id::UINT32);
        assert_eq!(ty.size(), 4);
        assert!(ty.is_numeric_like());
    }

    #[test]
    fn null_is_a_handle() {
        let ty = DataType::null();
        assert!(ty.is_handle_like());
        assert!(!ty.is_object_value());
        assert!(type_id::is_handle(ty.type_id()));
    }
}
