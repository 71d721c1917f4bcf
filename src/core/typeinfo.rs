use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use angelscript_core::{type_id, Behaviour, ObjectTypeFlags};

use crate::core::engine::{Engine, EngineData};
use crate::core::function::Function;
use crate::core::module::{Module, ModuleData};
use crate::types::data_type::DataType;
use crate::types::user_data::{UserData, UserDataValue, UserDataStore};

/// What kind of entity a [`TypeInfo`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeKind {
    /// Registered by the host.
    Registered,
    /// Script class.
    Class,
    Interface,
    Enum,
    Funcdef,
    Typedef,
}

/// A property of an object type.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub data_type: DataType,
    pub is_private: bool,
    pub is_protected: bool,
    /// Index of the property's slot in the object.
    pub offset: i32,
    pub is_reference: bool,
    pub access_mask: u32,
}

impl PropertyInfo {
    pub fn type_id(&self) -> i32 {
        self.data_type.type_id()
    }
}

#[derive(Default)]
pub(crate) struct TypeDetails {
    pub(crate) flags: ObjectTypeFlags,
    pub(crate) base: Option<TypeInfo>,
    pub(crate) interfaces: Vec<TypeInfo>,
    /// Inherited properties first, in slot order.
    pub(crate) properties: Vec<PropertyInfo>,
    /// Every method callable on the type, overrides replacing the inherited
    /// entry.
    pub(crate) methods: Vec<Function>,
    /// Registered factories, or the constructors of a script class.
    pub(crate) factories: Vec<Function>,
    pub(crate) behaviours: Vec<(Behaviour, Function)>,
    pub(crate) enum_values: Vec<(String, i32)>,
    pub(crate) typedef_target: Option<DataType>,
    pub(crate) funcdef_signature: Option<Function>,
    pub(crate) child_funcdefs: Vec<TypeInfo>,
    pub(crate) parent: Weak<TypeInfoData>,
}

pub(crate) struct TypeInfoData {
    pub(crate) engine: Weak<EngineData>,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) type_id: i32,
    pub(crate) kind: TypeKind,
    pub(crate) size: u32,
    pub(crate) module: Weak<ModuleData>,
    pub(crate) config_group: Option<String>,
    pub(crate) access_mask: u32,
    pub(crate) details: RwLock<TypeDetails>,
    pub(crate) user_data: UserDataStore,
}

impl TypeInfoData {
    pub(crate) fn new(engine: &Engine, kind: TypeKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            engine: Arc::downgrade(&engine.0),
            name: name.into(),
            namespace: namespace.into(),
            type_id: 0,
            kind,
            size: 0,
            module: Weak::new(),
            config_group: None,
            access_mask: u32::MAX,
            details: RwLock::new(TypeDetails::default()),
            user_data: UserDataStore::new(),
        }
    }
}

/// A registered or script-declared type: object types, interfaces, enums,
/// funcdefs and typedefs.
#[derive(Clone)]
pub struct TypeInfo(pub(crate) Arc<TypeInfoData>);

impl TypeInfo {
    pub(crate) fn new(data: TypeInfoData) -> Self {
        TypeInfo(Arc::new(data))
    }

    pub fn get_engine(&self) -> Option<Engine> {
        self.0.engine.upgrade().map(Engine)
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn get_config_group(&self) -> Option<&str> {
        self.0.config_group.as_deref()
    }

    pub fn get_access_mask(&self) -> u32 {
        self.0.access_mask
    }

    pub fn get_module(&self) -> Option<Module> {
        self.0.module.upgrade().map(Module)
    }

    pub fn get_name(&self) -> &str {
        &self.0.name
    }

    pub fn get_namespace(&self) -> &str {
        &self.0.namespace
    }

    /// `Namespace::Name`, or just the name in the global namespace.
    pub fn qualified_name(&self) -> String {
        if self.0.namespace.is_empty() {
            self.0.name.clone()
        } else {
            format!("{}::{}", self.0.namespace, self.0.name)
        }
    }

    pub fn get_base_type(&self) -> Option<TypeInfo> {
        self.0.details.read().base.clone()
    }

    /// `true` when `other` is this type or one of its bases.
    pub fn derives_from(&self, other: &TypeInfo) -> bool {
        let mut current = Some(self.clone());
        while let Some(ty) = current {
            if ty.ptr_eq(other) {
                return true;
            }
            current = ty.get_base_type();
        }
        false
    }

    pub fn get_flags(&self) -> ObjectTypeFlags {
        self.0.details.read().flags
    }

    pub fn get_size(&self) -> u32 {
        self.0.size
    }

    pub fn get_type_id(&self) -> i32 {
        self.0.type_id
    }

    /// Templates are not supported, so there are no sub types.
    pub fn get_sub_type_id(&self, _index: u32) -> i32 {
        angelscript_core::ReturnCode::InvalidArg.code()
    }

    pub fn get_sub_type(&self, _index: u32) -> Option<TypeInfo> {
        None
    }

    pub fn get_sub_type_count(&self) -> u32 {
        0
    }

    pub fn get_interface_count(&self) -> u32 {
        self.0.details.read().interfaces.len() as u32
    }

    pub fn get_interface(&self, index: u32) -> Option<TypeInfo> {
        self.0.details.read().interfaces.get(index as usize).cloned()
    }

    /// `true` when this type or a base lists `interface`.
    pub fn implements(&self, interface: &TypeInfo) -> bool {
        let mut current = Some(self.clone());
        while let Some(ty) = current {
            if ty.0.details.read().interfaces.iter().any(|i| i.ptr_eq(interface)) {
                return true;
            }
            current = ty.get_base_type();
        }
        false
    }

    /// Whether a handle to this type converts implicitly to a handle of
    /// `target`.
    pub fn is_assignable_to(&self, target: &TypeInfo) -> bool {
        self.derives_from(target) || (target.is_interface() && self.implements(target))
    }

    pub fn get_factory_count(&self) -> u32 {
        self.0.details.read().factories.len() as u32
    }

    pub fn get_factory_by_index(&self, index: u32) -> Option<Function> {
        self.0.details.read().factories.get(index as usize).cloned()
    }

    pub fn get_factory_by_decl(&self, decl: &str) -> Option<Function> {
        let factories = self.0.details.read().factories.clone();
        let engine = self.get_engine()?;
        crate::compiler::declaration::find_by_decl(&engine, self.get_module().as_ref(), &factories, decl, None)
    }

    pub fn get_method_count(&self) -> u32 {
        self.0.details.read().methods.len() as u32
    }

    /// Methods are stored already resolved against overrides, so
    /// `get_virtual` makes no difference.
    pub fn get_method_by_index(&self, index: u32, _get_virtual: bool) -> Option<Function> {
        self.0.details.read().methods.get(index as usize).cloned()
    }

    pub fn get_method_by_name(&self, name: &str, _get_virtual: bool) -> Option<Function> {
        let details = self.0.details.read();
        let mut found = details.methods.iter().filter(|m| m.get_name() == name);
        let first = found.next()?.clone();
        // ambiguous when overloaded
        if found.next().is_some() { None } else { Some(first) }
    }

    pub fn get_method_by_decl(&self, decl: &str, _get_virtual: bool) -> Option<Function> {
        let methods = self.0.details.read().methods.clone();
        let engine = self.get_engine()?;
        crate::compiler::declaration::find_by_decl(&engine, self.get_module().as_ref(), &methods, decl, Some(self))
    }

    pub fn get_property_count(&self) -> u32 {
        self.0.details.read().properties.len() as u32
    }

    pub fn get_property(&self, index: u32) -> Option<PropertyInfo> {
        self.0.details.read().properties.get(index as usize).cloned()
    }

    pub fn get_property_declaration(&self, index: u32, include_namespace: bool) -> Option<String> {
        let prop = self.get_property(index)?;
        let mut decl = String::new();
        if prop.is_private {
            decl.push_str("private ");
        } else if prop.is_protected {
            decl.push_str("protected ");
        }
        decl.push_str(&prop.data_type.declaration(include_namespace));
        decl.push(' ');
        decl.push_str(&prop.name);
        Some(decl)
    }

    pub(crate) fn property_index(&self, name: &str) -> Option<usize> {
        self.0.details.read().properties.iter().position(|p| p.name == name)
    }

    pub fn get_behaviour_count(&self) -> u32 {
        self.0.details.read().behaviours.len() as u32
    }

    pub fn get_behaviour_by_index(&self, index: u32) -> Option<(Behaviour, Function)> {
        self.0.details.read().behaviours.get(index as usize).cloned()
    }

    pub(crate) fn behaviour(&self, behaviour: Behaviour) -> Option<Function> {
        self.0
            .details
            .read()
            .behaviours
            .iter()
            .find(|(b, _)| *b == behaviour)
            .map(|(_, f)| f.clone())
    }

    pub fn get_child_funcdef_count(&self) -> u32 {
        self.0.details.read().child_funcdefs.len() as u32
    }

    pub fn get_child_funcdef(&self, index: u32) -> Option<TypeInfo> {
        self.0.details.read().child_funcdefs.get(index as usize).cloned()
    }

    /// Class a child funcdef was declared in.
    pub fn get_parent_type(&self) -> Option<TypeInfo> {
        self.0.details.read().parent.upgrade().map(TypeInfo)
    }

    pub fn get_enum_value_count(&self) -> u32 {
        self.0.details.read().enum_values.len() as u32
    }

    pub fn get_enum_value_by_index(&self, index: u32) -> Option<(String, i32)> {
        self.0.details.read().enum_values.get(index as usize).cloned()
    }

    pub(crate) fn enum_value(&self, name: &str) -> Option<i32> {
        self.0
            .details
            .read()
            .enum_values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Type id the typedef aliases, or an error code for other types.
    pub fn get_typedef_type_id(&self) -> i32 {
        match &self.0.details.read().typedef_target {
            Some(target) => target.type_id(),
            None => angelscript_core::ReturnCode::InvalidType.code(),
        }
    }

    pub fn get_funcdef_signature(&self) -> Option<Function> {
        self.0.details.read().funcdef_signature.clone()
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

    pub fn is_enum(&self) -> bool {
        self.0.kind == TypeKind::Enum
    }

    pub fn is_funcdef(&self) -> bool {
        self.0.kind == TypeKind::Funcdef
    }

    pub fn is_typedef(&self) -> bool {
        self.0.kind == TypeKind::Typedef
    }

    pub fn is_interface(&self) -> bool {
        self.0.kind == TypeKind::Interface
    }

    /// Script class (not interface).
    pub fn is_script_class(&self) -> bool {
        self.0.kind == TypeKind::Class
    }

    /// Host-registered object type.
    pub fn is_registered(&self) -> bool {
        self.0.kind == TypeKind::Registered
    }

    /// The value type registered together with the string factory.
    pub fn is_string_type(&self) -> bool {
        self.0.kind == TypeKind::Registered && self.get_flags().contains(ObjectTypeFlags::VALUE)
    }

    pub fn is_garbage_collected(&self) -> bool {
        self.get_flags().contains(ObjectTypeFlags::GC)
    }

    pub fn is_abstract(&self) -> bool {
        self.get_flags().contains(ObjectTypeFlags::ABSTRACT)
    }

    pub fn is_script_object(&self) -> bool {
        type_id::is_script_object(self.0.type_id)
    }

    pub fn ptr_eq(&self, other: &TypeInfo) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<TypeInfoData> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn details(&self) -> &RwLock<TypeDetails> {
        &self.0.details
    }

    pub(crate) fn kind(&self) -> TypeKind {
        self.0.kind
    }

    /// Drop every reference this type holds to functions and other types.
    /// Used when the owning module or engine goes away.
    pub(crate) fn clear_details(&self) {
        let details = std::mem::take(&mut *self.0.details.write());
        let flags = details.flags;
        drop(details);
        self.0.details.write().flags = flags;
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TypeInfo {}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.qualified_name())
            .field("type_id", &self.0.type_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angelscript_core::TypeIdFlags;

    fn bare(name: &str, kind: TypeKind, flags: ObjectTypeFlags) -> TypeInfo {
        TypeInfo::new(TypeInfoData {
            engine: Weak::new(),
            name: name.into(),
            namespace: String::new(),
            type_id: type_id::compose(100, TypeIdFlags::SCRIPTOBJECT),
            kind,
            size: 0,
            module: Weak::new(),
            config_group: None,
            access_mask: 1,
            details: RwLock::new(TypeDetails {
                flags,
                ..Default::default()
            }),
            user_data: UserDataStore::new(),
        })
    }

    #[test]
    fn derivation_walks_bases() {
        let base = bare("Base", TypeKind::Class, ObjectTypeFlags::REF);
        let derived = bare("Derived", TypeKind::Class, ObjectTypeFlags::REF);
        derived.details().write().base = Some(base.clone());
        assert!(derived.derives_from(&base));
        assert!(!base.derives_from(&derived));
        assert_eq!(derived.get_base_type(), Some(base));
    }

    #[test]
    fn interfaces_are_inherited() {
        let iface = bare("I", TypeKind::Interface, ObjectTypeFlags::REF);
        let base = bare("Base", TypeKind::Class, ObjectTypeFlags::REF);
        let derived = bare("Derived", TypeKind::Class, ObjectTypeFlags::REF);
        base.details().write().interfaces.push(iface.clone());
        derived.details().write().base = Some(base);
        assert!(derived.implements(&iface));
        assert!(derived.is_assignable_to(&iface));
        assert_eq!(derived.get_interface_count(), 0);
    }

    #[test]
    fn clear_details_keeps_flags() {
        let ty = bare("E", TypeKind::Enum, ObjectTypeFlags::ENUM);
        ty.details().write().enum_values.push(("A".into(), 1));
        assert_eq!(ty.enum_value("A"), Some(1));
        ty.clear_details();
        assert_eq!(ty.get_enum_value_count(), 0);
        assert!(ty.get_flags().contains(ObjectTypeFlags::ENUM));
    }
}
