use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use angelscript_core::{ReturnCode, ScriptResult};

use crate::core::engine::Engine;
use crate::core::function::FunctionBody;
use crate::core::lockable_shared_bool::LockableSharedBool;
use crate::core::typeinfo::TypeInfo;
use crate::types::data_type::DataTypeKind;
use crate::types::script_value::Value;
use crate::types::user_data::{UserData, UserDataStore, UserDataValue};

pub(crate) struct ObjectData {
    pub(crate) type_info: TypeInfo,
    /// Property slots, in the order of the type's property list.
    pub(crate) props: Mutex<Vec<Value>>,
    /// Host payload of a registered reference type.
    pub(crate) native: Mutex<Option<Box<dyn Any + Send>>>,
    pub(crate) weak_flag: OnceLock<LockableSharedBool>,
    pub(crate) user_data: UserDataStore,
}

impl Drop for ObjectData {
    fn drop(&mut self) {
        if let Some(flag) = self.weak_flag.get() {
            let guard = flag.lock_guard();
            guard.set(true);
        }
        self.user_data.clear();
    }
}

/// A live instance of a script class or of a host-registered reference type.
///
/// Script class instances carry one [`Value`] per declared property, base
/// class properties first. Instances of registered types carry a host payload
/// instead, reachable through [`with_native`](Self::with_native).
///
/// Cloning the handle adds a reference; dropping it releases one. The object
/// is destroyed when the last handle goes away, or by the garbage collector
/// when it is only kept alive by a reference cycle.
///
/// ```
/// use angelscript_runtime::prelude::*;
///
/// let engine = Engine::create();
/// let module = engine.get_module("m", GetModuleFlags::AlwaysCreate).unwrap();
/// module.add_script_section("s", "class Point { int x = 1; int y = 2; }", 0).unwrap();
/// module.build().unwrap();
///
/// let point_type = module.get_type_info_by_name("Point").unwrap();
/// let point = engine.create_script_object(&point_type).unwrap();
/// assert_eq!(point.get_property_count(), 2);
/// assert_eq!(point.get_property_by_name("y"), Some(Value::Int32(2)));
///
/// point.set_property(0, Value::Int32(10)).unwrap();
/// assert_eq!(point.get_property(0), Some(Value::Int32(10)));
/// ```
///
/// # Weak references
///
/// [`get_weak_ref_flag`](Self::get_weak_ref_flag) hands out a shared flag
/// that flips to `true` when the object is destroyed. Holding the flag does
/// not keep the object alive.
#[derive(Clone)]
pub struct ScriptObject(pub(crate) Arc<ObjectData>);

impl ScriptObject {
    /// Create an instance and hand it to the collector when the type can
    /// take part in reference cycles.
    pub(crate) fn new_object(
        type_info: &TypeInfo,
        props: Vec<Value>,
        native: Option<Box<dyn Any + Send>>,
    ) -> ScriptObject {
        let object = ScriptObject(Arc::new(ObjectData {
            type_info: type_info.clone(),
            props: Mutex::new(props),
            native: Mutex::new(native),
            weak_flag: OnceLock::new(),
            user_data: UserDataStore::new(),
        }));
        if type_info.is_garbage_collected() {
            if let Some(engine) = type_info.get_engine() {
                engine.notify_garbage_collector_of_new_object(&object);
            }
        }
        object
    }

    /// Wrap a host value as an instance of the registered type `type_info`.
    ///
    /// Factories registered for host types use this to build the object they
    /// return.
    pub fn new_native<T: Any + Send>(type_info: &TypeInfo, payload: T) -> ScriptObject {
        Self::new_object(type_info, Self::default_props(type_info), Some(Box::new(payload)))
    }

    fn default_props(type_info: &TypeInfo) -> Vec<Value> {
        type_info
            .details()
            .read()
            .properties
            .iter()
            .map(|p| Value::default_for(&p.data_type))
            .collect()
    }

    /// An instance with every property at its type's default, no constructor
    /// run.
    pub(crate) fn new_uninitialized(type_info: &TypeInfo) -> ScriptObject {
        Self::new_object(type_info, Self::default_props(type_info), None)
    }

    pub fn get_engine(&self) -> Option<Engine> {
        self.0.type_info.get_engine()
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn get_type_id(&self) -> i32 {
        self.0.type_info.get_type_id()
    }

    pub fn get_object_type(&self) -> TypeInfo {
        self.0.type_info.clone()
    }

    pub fn get_property_count(&self) -> u32 {
        self.0.props.lock().len() as u32
    }

    pub fn get_property_type_id(&self, index: u32) -> i32 {
        match self.0.type_info.get_property(index) {
            Some(prop) => prop.type_id(),
            None => ReturnCode::InvalidArg.code(),
        }
    }

    pub fn get_property_name(&self, index: u32) -> Option<String> {
        self.0.type_info.get_property(index).map(|p| p.name)
    }

    pub fn get_property(&self, index: u32) -> Option<Value> {
        self.0.props.lock().get(index as usize).cloned()
    }

    pub fn get_property_by_name(&self, name: &str) -> Option<Value> {
        let index = self.0.type_info.property_index(name)?;
        self.get_property(index as u32)
    }

    /// Store `value` in a property, converting primitives to the declared
    /// type.
    pub fn set_property(&self, index: u32, value: Value) -> ScriptResult<()> {
        let prop = self
            .0
            .type_info
            .get_property(index)
            .ok_or(ReturnCode::InvalidArg)?;
        let value = match (&prop.data_type.kind, &value) {
            (DataTypeKind::Primitive(kind), v) if v.primitive_kind().is_some() => v.convert(*kind),
            (DataTypeKind::Enum(_), v) if v.primitive_kind().is_some() => {
                v.convert(angelscript_core::PrimitiveKind::Int32)
            }
            (DataTypeKind::Object(target), Value::Object(Some(obj))) => {
                if !obj.get_object_type().is_assignable_to(target) {
                    return Err(ReturnCode::InvalidType.into());
                }
                value
            }
            (DataTypeKind::Object(_), Value::Object(None)) if prop.data_type.is_handle => value,
            (DataTypeKind::Object(info), Value::String(_)) if info.is_string_type() => value,
            (DataTypeKind::Funcdef(_), Value::Function(_)) => value,
            _ => return Err(ReturnCode::InvalidType.into()),
        };
        let old = {
            let mut props = self.0.props.lock();
            let slot = props.get_mut(index as usize).ok_or(ReturnCode::InvalidArg)?;
            std::mem::replace(slot, value)
        };
        drop(old);
        Ok(())
    }

    pub fn set_property_by_name(&self, name: &str, value: Value) -> ScriptResult<()> {
        let index = self
            .0
            .type_info
            .property_index(name)
            .ok_or(ReturnCode::InvalidArg)?;
        self.set_property(index as u32, value)
    }

    /// Address of a property's storage, valid until the property is
    /// reassigned.
    pub(crate) fn get_address_of_property(&self, index: u32) -> *mut c_void {
        let props = self.0.props.lock();
        match props.get(index as usize) {
            Some(value) => value.payload_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Value assignment: copy every property of `other` into this object.
    ///
    /// Non-handle object properties are copied deeply, handles are shared.
    pub fn copy_from(&self, other: &ScriptObject) -> ScriptResult<()> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        if !self.0.type_info.ptr_eq(&other.0.type_info) {
            return Err(ReturnCode::InvalidType.into());
        }
        if self.0.native.lock().is_some() || other.0.native.lock().is_some() {
            return Err(ReturnCode::NotSupported.into());
        }
        let copied = other.copied_props()?;
        let old = std::mem::replace(&mut *self.0.props.lock(), copied);
        drop(old);
        Ok(())
    }

    /// A new object of the same type holding a copy of this one's properties.
    pub(crate) fn deep_copy(&self) -> ScriptResult<ScriptObject> {
        if self.0.native.lock().is_some() {
            return Err(ReturnCode::NotSupported.into());
        }
        let props = self.copied_props()?;
        Ok(Self::new_object(&self.0.type_info, props, None))
    }

    fn copied_props(&self) -> ScriptResult<Vec<Value>> {
        let snapshot = self.0.props.lock().clone();
        let types: Vec<bool> = self
            .0
            .type_info
            .details()
            .read()
            .properties
            .iter()
            .map(|p| p.data_type.is_object_value())
            .collect();
        snapshot
            .into_iter()
            .zip(types.into_iter().chain(std::iter::repeat(false)))
            .map(|(value, by_value)| match value {
                Value::Object(Some(obj)) if by_value => Ok(Value::Object(Some(obj.deep_copy()?))),
                other => Ok(other),
            })
            .collect()
    }

    /// The flag that turns `true` when this object is destroyed.
    pub fn get_weak_ref_flag(&self) -> LockableSharedBool {
        self.0.weak_flag.get_or_init(LockableSharedBool::new).clone()
    }

    pub fn set_user_data<T: UserData>(&self, data: T) -> Option<UserDataValue> {
        self.0.user_data.set(data)
    }

    pub fn get_user_data<T: UserData>(&self) -> Option<Arc<T>> {
        self.0.user_data.get::<T>()
    }

    pub(crate) fn user_data_store(&self) -> &UserDataStore {
        &self.0.user_data
    }

    /// Run `f` on the host payload when it is a `T`.
    pub fn with_native<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut native = self.0.native.lock();
        native.as_mut()?.downcast_mut::<T>().map(f)
    }

    pub fn set_native<T: Any + Send>(&self, payload: T) {
        let old = self.0.native.lock().replace(Box::new(payload));
        drop(old);
    }

    pub fn has_native(&self) -> bool {
        self.0.native.lock().is_some()
    }

    /// Objects directly reachable through this object's properties.
    ///
    /// A delegate stored in a property counts as a reference to its bound
    /// object only while the property holds the sole handle to the delegate.
    pub(crate) fn enum_references(&self, out: &mut Vec<ScriptObject>) {
        let props = self.0.props.lock();
        for value in props.iter() {
            match value {
                Value::Object(Some(obj)) => out.push(obj.clone()),
                Value::Function(Some(func)) if func.ref_count() == 1 => {
                    if let FunctionBody::Delegate { object, .. } = func.body() {
                        out.push(object.clone());
                    }
                }
                _ => {}
            }
        }
    }

    /// Null every object and function property, returning the old values so
    /// they can be dropped with no lock held.
    pub(crate) fn release_all_handles(&self) -> Vec<Value> {
        let mut props = self.0.props.lock();
        props
            .iter_mut()
            .filter_map(|slot| match slot {
                Value::Object(Some(_)) => Some(std::mem::replace(slot, Value::Object(None))),
                Value::Function(Some(_)) => Some(std::mem::replace(slot, Value::Function(None))),
                _ => None,
            })
            .collect()
    }

    pub fn ptr_eq(&self, other: &ScriptObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const ObjectData {
        Arc::as_ptr(&self.0)
    }
}

impl PartialEq for ScriptObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ScriptObject {}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("type", &self.0.type_info.get_name())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typeinfo::{PropertyInfo, TypeDetails, TypeInfoData, TypeKind};
    use crate::types::data_type::DataType;
    use angelscript_core::{type_id, ObjectTypeFlags, PrimitiveKind, TypeIdFlags};
    use parking_lot::RwLock;
    use std::sync::Weak;

    fn class(props: &[(&str, PrimitiveKind)]) -> TypeInfo {
        let properties = props
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| PropertyInfo {
                name: (*name).into(),
                data_type: DataType::primitive(*kind),
                is_private: false,
                is_protected: false,
                offset: i as i32,
                is_reference: false,
                access_mask: 1,
            })
            .collect();
        TypeInfo::new(TypeInfoData {
            engine: Weak::new(),
            name: "Thing".into(),
            namespace: String::new(),
            type_id: type_id::compose(40, TypeIdFlags::SCRIPTOBJECT),
            kind: TypeKind::Class,
            size: 0,
            module: Weak::new(),
            config_group: None,
            access_mask: 1,
            details: RwLock::new(TypeDetails {
                flags: ObjectTypeFlags::REF | ObjectTypeFlags::SCRIPT_OBJECT,
                properties,
                ..Default::default()
            }),
            user_data: UserDataStore::new(),
        })
    }

    #[test]
    fn properties_start_at_defaults_and_convert() {
        let ty = class(&[("hp", PrimitiveKind::Int32), ("speed", PrimitiveKind::Float)]);
        let obj = ScriptObject::new_uninitialized(&ty);
        assert_eq!(obj.get_property(0), Some(Value::Int32(0)));
        obj.set_property_by_name("speed", Value::Int32(3)).unwrap();
        assert_eq!(obj.get_property(1), Some(Value::Float(3.0)));
        assert!(obj.set_property(5, Value::Int32(1)).is_err());
        assert_eq!(obj.get_property_name(1).as_deref(), Some("speed"));
        assert_eq!(obj.get_property_type_id(0), PrimitiveKind::Int32.type_id());
    }

    #[test]
    fn weak_flag_flips_on_destruction() {
        let ty = class(&[]);
        let obj = ScriptObject::new_uninitialized(&ty);
        let flag = obj.get_weak_ref_flag();
        assert!(!flag.get());
        drop(obj);
        assert!(flag.get());
    }

    #[test]
    fn copy_from_requires_same_type() {
        let a = ScriptObject::new_uninitialized(&class(&[("x", PrimitiveKind::Int32)]));
        let b = ScriptObject::new_uninitialized(&class(&[("x", PrimitiveKind::Int32)]));
        assert_eq!(a.copy_from(&b).unwrap_err().return_code(), ReturnCode::InvalidType);

        let c = ScriptObject::new_uninitialized(&a.get_object_type());
        c.set_property(0, Value::Int32(9)).unwrap();
        a.copy_from(&c).unwrap();
        assert_eq!(a.get_property(0), Some(Value::Int32(9)));
    }

    #[test]
    fn native_payload_is_reachable_and_not_copyable() {
        let ty = class(&[]);
        let obj = ScriptObject::new_native(&ty, vec![1u8, 2, 3]);
        assert_eq!(obj.with_native(|v: &mut Vec<u8>| v.len()), Some(3));
        assert_eq!(obj.with_native(|_: &mut String| ()), None);
        assert_eq!(obj.deep_copy().unwrap_err().return_code(), ReturnCode::NotSupported);
    }
}
