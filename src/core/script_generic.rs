use std::ffi::c_void;

use angelscript_core::{PrimitiveKind, ReturnCode, ScriptResult, TypeModifiers};

use crate::core::engine::Engine;
use crate::core::function::Function;
use crate::core::script_object::ScriptObject;
use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::script_value::{ScriptString, Value};
use crate::types::user_data::UserDataValue;

/// Call frame handed to functions registered with the generic calling
/// convention.
///
/// Arguments are already converted to the declared parameter types. The
/// fixed-width getters reinterpret the stored bits, so an argument read at
/// the width it was passed at comes back unchanged. Reading past the
/// argument count yields zero or null.
pub struct ScriptGeneric {
    pub(crate) engine: Engine,
    pub(crate) function: Function,
    pub(crate) object: Value,
    pub(crate) args: Vec<Value>,
    pub(crate) return_value: Value,
}

impl ScriptGeneric {
    pub(crate) fn new(engine: Engine, function: Function, object: Value, args: Vec<Value>) -> Self {
        let return_value = Value::default_for(&function.signature().return_type);
        Self {
            engine,
            function,
            object,
            args,
            return_value,
        }
    }

    pub fn get_engine(&self) -> &Engine {
        &self.engine
    }

    pub fn get_function(&self) -> &Function {
        &self.function
    }

    pub fn get_auxiliary(&self) -> Option<UserDataValue> {
        self.function.get_auxiliary()
    }

    /// `this` of a method call; `Void` for global functions.
    pub fn get_object(&self) -> &Value {
        &self.object
    }

    pub fn get_object_type_id(&self) -> i32 {
        match &self.object {
            Value::Object(Some(obj)) => obj.get_type_id(),
            Value::Void => 0,
            _ => self
                .function
                .get_object_type()
                .map_or(0, |t| t.get_type_id()),
        }
    }

    pub(crate) fn get_address_of_object(&self) -> *mut c_void {
        self.object.payload_ptr()
    }

    pub fn get_arg_count(&self) -> u32 {
        self.args.len() as u32
    }

    pub fn get_arg_type_id(&self, index: u32) -> (i32, TypeModifiers) {
        match self.function.get_param(index) {
            Some(param) => {
                let mut modifiers = param.modifiers;
                if param.data_type.is_const {
                    modifiers |= TypeModifiers::CONST;
                }
                (param.type_id(), modifiers)
            }
            None => (ReturnCode::InvalidArg.code(), TypeModifiers::empty()),
        }
    }

    fn arg_bits(&self, index: u32) -> u64 {
        self.args.get(index as usize).map_or(0, Value::to_bits)
    }

    pub fn get_arg_byte(&self, index: u32) -> u8 {
        self.arg_bits(index) as u8
    }

    pub fn get_arg_word(&self, index: u32) -> u16 {
        self.arg_bits(index) as u16
    }

    pub fn get_arg_dword(&self, index: u32) -> u32 {
        self.arg_bits(index) as u32
    }

    pub fn get_arg_qword(&self, index: u32) -> u64 {
        self.arg_bits(index)
    }

    pub fn get_arg_float(&self, index: u32) -> f32 {
        f32::from_bits(self.arg_bits(index) as u32)
    }

    pub fn get_arg_double(&self, index: u32) -> f64 {
        f64::from_bits(self.arg_bits(index))
    }

    /// Address of the argument's storage inside this frame.
    pub(crate) fn get_arg_address(&self, index: u32) -> *mut c_void {
        match self.args.get(index as usize) {
            Some(Value::Object(Some(obj))) => obj.as_ptr() as *mut c_void,
            Some(value) => value.payload_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    pub(crate) fn get_address_of_arg(&mut self, index: u32) -> *mut c_void {
        match self.args.get(index as usize) {
            Some(value) => value.payload_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    pub fn get_arg_object(&self, index: u32) -> Option<ScriptObject> {
        self.args.get(index as usize)?.as_object().cloned()
    }

    pub fn get_arg_string(&self, index: u32) -> Option<ScriptString> {
        self.args.get(index as usize)?.as_string().cloned()
    }

    pub fn get_arg_function(&self, index: u32) -> Option<Function> {
        self.args.get(index as usize)?.as_function().cloned()
    }

    pub fn get_arg(&self, index: u32) -> Option<&Value> {
        self.args.get(index as usize)
    }

    fn return_type(&self) -> &DataType {
        &self.function.signature().return_type
    }

    /// Store a primitive return of exactly `width` bytes.
    fn set_return_bits(&mut self, width: u32, bits: u64) -> ScriptResult<()> {
        let kind = match self.return_type().primitive_kind() {
            Some(kind) if kind != PrimitiveKind::Void && kind.size() == width => kind,
            _ => return Err(ReturnCode::InvalidType.into()),
        };
        self.return_value = Value::from_bits(kind, bits);
        Ok(())
    }

    pub fn set_return_byte(&mut self, value: u8) -> ScriptResult<()> {
        self.set_return_bits(1, value as u64)
    }

    pub fn set_return_word(&mut self, value: u16) -> ScriptResult<()> {
        self.set_return_bits(2, value as u64)
    }

    pub fn set_return_dword(&mut self, value: u32) -> ScriptResult<()> {
        self.set_return_bits(4, value as u64)
    }

    pub fn set_return_qword(&mut self, value: u64) -> ScriptResult<()> {
        self.set_return_bits(8, value)
    }

    pub fn set_return_float(&mut self, value: f32) -> ScriptResult<()> {
        if self.return_type().primitive_kind() != Some(PrimitiveKind::Float) {
            return Err(ReturnCode::InvalidType.into());
        }
        self.return_value = Value::Float(value);
        Ok(())
    }

    pub fn set_return_double(&mut self, value: f64) -> ScriptResult<()> {
        if self.return_type().primitive_kind() != Some(PrimitiveKind::Double) {
            return Err(ReturnCode::InvalidType.into());
        }
        self.return_value = Value::Double(value);
        Ok(())
    }

    /// Return an object or a handle. The frame keeps its own reference.
    pub fn set_return_object(&mut self, object: Option<ScriptObject>) -> ScriptResult<()> {
        let ty = self.return_type();
        let accepts = match (&ty.kind, &object) {
            (DataTypeKind::Object(_), None) => ty.is_handle,
            (DataTypeKind::Object(target), Some(obj)) => obj.get_object_type().is_assignable_to(target),
            _ => false,
        };
        if !accepts {
            return Err(ReturnCode::InvalidType.into());
        }
        self.return_value = Value::Object(object);
        Ok(())
    }

    /// Return any value, converting primitives to the declared type.
    pub fn set_return_value(&mut self, value: impl Into<Value>) -> ScriptResult<()> {
        let value = value.into();
        let ty = self.return_type().clone();
        self.return_value = match (&ty.kind, value) {
            (DataTypeKind::Primitive(PrimitiveKind::Void), _) => {
                return Err(ReturnCode::InvalidType.into());
            }
            (DataTypeKind::Primitive(kind), v) if v.primitive_kind().is_some() => v.convert(*kind),
            (DataTypeKind::Enum(_), v) if v.primitive_kind().is_some() => v.convert(PrimitiveKind::Int32),
            (DataTypeKind::Object(info), v @ Value::String(_)) if info.is_string_type() => v,
            (DataTypeKind::Object(_), Value::Object(obj)) => return self.set_return_object(obj),
            (DataTypeKind::Funcdef(_), v @ Value::Function(_)) => v,
            _ => return Err(ReturnCode::InvalidType.into()),
        };
        Ok(())
    }

    pub fn get_return_value(&self) -> &Value {
        &self.return_value
    }

    pub(crate) fn get_address_of_return_location(&mut self) -> *mut c_void {
        self.return_value.payload_ptr()
    }

    pub fn get_return_type_id(&self) -> (i32, TypeModifiers) {
        self.function.get_return_type_id()
    }

    pub(crate) fn take_return_value(&mut self) -> Value {
        std::mem::take(&mut self.return_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn frame(decl: &str, args: Vec<Value>) -> ScriptGeneric {
        let engine = Engine::create();
        engine.register_global_function(decl, |_| {}).unwrap();
        let func = engine.get_global_function_by_index(0).unwrap();
        ScriptGeneric::new(engine, func, Value::Void, args)
    }

    #[test]
    fn getters_reinterpret_bits() {
        let g = frame(
            "void f(int8, uint16, int, double)",
            vec![Value::Int8(-1), Value::UInt16(65535), Value::Int32(-2), Value::Double(0.5)],
        );
        assert_eq!(g.get_arg_byte(0), 0xFF);
        assert_eq!(g.get_arg_word(1), 0xFFFF);
        assert_eq!(g.get_arg_dword(2), (-2i32) as u32);
        assert_eq!(g.get_arg_double(3), 0.5);
        assert_eq!(g.get_arg_qword(9), 0);
        assert!(g.get_arg_object(0).is_none());
    }

    #[test]
    fn return_width_is_checked() {
        let mut g = frame("int f()", Vec::new());
        assert_eq!(g.get_return_value(), &Value::Int32(0));
        assert_eq!(
            g.set_return_qword(1).unwrap_err().return_code(),
            ReturnCode::InvalidType
        );
        g.set_return_dword(7).unwrap();
        assert_eq!(g.get_return_value(), &Value::Int32(7));
        g.set_return_value(3.9f64).unwrap();
        assert_eq!(g.get_return_value(), &Value::Int32(3));
    }

    #[test]
    fn float_returns_need_float_type() {
        let mut g = frame("float f()", Vec::new());
        assert!(g.set_return_double(1.0).is_err());
        g.set_return_float(1.5).unwrap();
        assert_eq!(g.get_return_value(), &Value::Float(1.5));
        assert_eq!(g.get_arg_type_id(0).0, ReturnCode::InvalidArg.code());
    }
}
