use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use bumpalo::Bump;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use angelscript_core::{
    type_id, Behaviour, ContextState, EngineProperty, FunctionType, GCFlags, GetModuleFlags,
    MessageType, ObjectTypeFlags, PrimitiveKind, ReturnCode, ScriptResult, TypeIdFlags,
    TypeModifiers,
};
use angelscript_parser::ast::{FunctionDecl, Parser};

use crate::compiler::declaration::{
    function_flags, is_identifier, is_namespace, split_qualified, TypeScope,
};
use crate::core::context::Context;
use crate::core::function::{Function, FunctionBody, FunctionData, ParamInfo, Signature};
use crate::core::lockable_shared_bool::LockableSharedBool;
use crate::core::module::Module;
use crate::core::script_generic::ScriptGeneric;
use crate::core::script_object::ScriptObject;
use crate::core::string_factory::{DefaultStringFactory, StringFactory};
use crate::core::typeinfo::{PropertyInfo, TypeInfo, TypeInfoData, TypeKind};
use crate::internal::callback_manager::CallbackManager;
use crate::internal::gc::{GarbageCollector, GcStatistics};
use crate::internal::registry::{RegisteredProperty, Registry};
use crate::types::callbacks::{
    CircularRefCallbackFn, GenericFn, MessageCallbackFn, MessageInfo, RequestContextCallbackFn,
    ReturnContextCallbackFn,
};
use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::{ScriptString, Value};
use crate::types::user_data::{UserData, UserDataStore, UserDataValue};

/// New objects that trigger a destroy pass when a context finishes.
const AUTO_GC_NEW_OBJECTS: usize = 64;

/// Tracked objects that trigger a full detection pass when a context
/// finishes.
const AUTO_GC_TRACKED_OBJECTS: u32 = 1024;

/// A global property registered by the host, as reported by
/// [`Engine::get_global_property_by_index`].
#[derive(Clone)]
pub struct GlobalPropertyInfo {
    pub name: String,
    pub namespace: String,
    /// Full declaration with the namespace, e.g. `const int game::lives`.
    pub declaration: String,
    pub type_id: i32,
    pub is_const: bool,
    pub config_group: Option<String>,
    pub access_mask: u32,
    pub slot: Arc<GlobalSlot>,
}

pub(crate) struct EngineData {
    properties: Mutex<[usize; EngineProperty::COUNT]>,
    pub(crate) registry: RwLock<Registry>,
    modules: RwLock<Vec<Module>>,
    pub(crate) callbacks: CallbackManager,
    pub(crate) gc: GarbageCollector,
    context_pool: Mutex<Vec<Context>>,
    next_type_sequence: AtomicI32,
    next_function_id: AtomicI32,
    functions: Mutex<FxHashMap<i32, Weak<FunctionData>>>,
    types: Mutex<FxHashMap<i32, Weak<TypeInfoData>>>,
    user_data: UserDataStore,
}

impl EngineData {
    pub(crate) fn forget_function(&self, id: i32) {
        let mut functions = self.functions.lock();
        if functions.get(&id).is_some_and(|f| f.strong_count() == 0) {
            functions.remove(&id);
        }
    }
}

impl Drop for EngineData {
    fn drop(&mut self) {
        let modules = std::mem::take(&mut *self.modules.write());
        for module in &modules {
            module.discard_contents();
        }
        drop(modules);
        self.context_pool.lock().clear();
        self.gc.clear(None);
        let removed = self.registry.write().clear();
        drop(removed);
        self.user_data.clear();
        tracing::debug!("engine destroyed");
    }
}

/// The script engine: registration interface, module table, context
/// factory and garbage collector.
///
/// Every other handle keeps only a weak reference to the engine, so the
/// host must keep an `Engine` alive for as long as it uses anything created
/// from it.
///
/// ```
/// use angelscript_runtime::prelude::*;
///
/// let engine = Engine::create();
/// engine
///     .register_global_function("int add(int a, int b)", |generic: &mut ScriptGeneric| {
///         let sum = generic.get_arg_dword(0).wrapping_add(generic.get_arg_dword(1));
///         generic.set_return_dword(sum).unwrap();
///     })
///     .unwrap();
///
/// let module = engine.get_module("main", GetModuleFlags::AlwaysCreate).unwrap();
/// module.add_script_section("main", "int run() { return add(40, 2); }", 0).unwrap();
/// module.build().unwrap();
///
/// let ctx = engine.create_context().unwrap();
/// ctx.prepare(&module.get_function_by_name("run").unwrap()).unwrap();
/// assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
/// assert_eq!(ctx.get_return_dword(), 42);
/// ```
#[derive(Clone)]
pub struct Engine(pub(crate) Arc<EngineData>);

impl Engine {
    pub fn create() -> Engine {
        let mut properties = [0usize; EngineProperty::COUNT];
        for (raw, slot) in properties.iter_mut().enumerate() {
            if let Ok(property) = EngineProperty::try_from(raw as u32) {
                *slot = property.default_value();
            }
        }
        let engine = Engine(Arc::new(EngineData {
            properties: Mutex::new(properties),
            registry: RwLock::new(Registry::new()),
            modules: RwLock::new(Vec::new()),
            callbacks: CallbackManager::new(),
            gc: GarbageCollector::new(),
            context_pool: Mutex::new(Vec::new()),
            next_type_sequence: AtomicI32::new(type_id::FIRST_SEQUENCE),
            next_function_id: AtomicI32::new(1),
            functions: Mutex::new(FxHashMap::default()),
            types: Mutex::new(FxHashMap::default()),
            user_data: UserDataStore::new(),
        }));
        tracing::info!(version = angelscript_core::ANGELSCRIPT_VERSION_STRING, "engine created");
        engine
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Discard every module and collect all garbage, then release this
    /// handle. Returns the number of handles still holding the engine.
    pub fn shut_down_and_release(self) -> usize {
        let modules = std::mem::take(&mut *self.0.modules.write());
        for module in &modules {
            module.discard_contents();
        }
        drop(modules);
        self.0.context_pool.lock().clear();
        self.0.gc.clear(Some(&self));
        Arc::strong_count(&self.0) - 1
    }

    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // Engine properties

    pub fn set_engine_property(&self, property: EngineProperty, value: usize) -> ScriptResult<()> {
        if property == EngineProperty::JitInterfaceVersion && !(1..=2).contains(&value) {
            return Err(ReturnCode::InvalidArg.into());
        }
        self.0.properties.lock()[u32::from(property) as usize] = value;
        Ok(())
    }

    pub fn get_engine_property(&self, property: EngineProperty) -> usize {
        self.0.properties.lock()[u32::from(property) as usize]
    }

    pub(crate) fn flag(&self, property: EngineProperty) -> bool {
        self.get_engine_property(property) != 0
    }

    // Compiler messages

    pub fn set_message_callback<F>(&self, callback: F) -> ScriptResult<()>
    where
        F: Fn(&MessageInfo) + Send + Sync + 'static,
    {
        self.set_message_callback_fn(Arc::new(callback));
        Ok(())
    }

    pub(crate) fn set_message_callback_fn(&self, callback: MessageCallbackFn) {
        self.0.callbacks.set_message_callback(Some(callback));
    }

    pub fn clear_message_callback(&self) -> ScriptResult<()> {
        self.0.callbacks.set_message_callback(None);
        Ok(())
    }

    pub fn write_message(
        &self,
        section: &str,
        row: i32,
        col: i32,
        msg_type: MessageType,
        message: &str,
    ) -> ScriptResult<()> {
        self.report(MessageInfo::new(section, row, col, msg_type, message));
        Ok(())
    }

    pub(crate) fn report(&self, info: MessageInfo) {
        self.0.callbacks.send_message(&info);
    }

    // Entity tracking

    /// Give `data` an id and make it reachable through `get_function_by_id`.
    pub(crate) fn new_function(&self, mut data: FunctionData) -> Function {
        data.id = self.0.next_function_id.fetch_add(1, Ordering::Relaxed);
        let function = Function::new(data);
        self.0.functions.lock().insert(function.get_id(), function.downgrade());
        function
    }

    /// Give `data` a type id carrying `flags` and make it reachable through
    /// `get_type_info_by_id`.
    pub(crate) fn new_type(&self, mut data: TypeInfoData, flags: TypeIdFlags) -> TypeInfo {
        let sequence = self.0.next_type_sequence.fetch_add(1, Ordering::Relaxed);
        data.type_id = type_id::compose(sequence, flags);
        let info = TypeInfo::new(data);
        self.0.types.lock().insert(info.get_type_id(), info.downgrade());
        info
    }

    /// Registered types and, when given, the types of `module`, module types
    /// first.
    pub(crate) fn visible_types(&self, module: Option<&Module>) -> Vec<TypeInfo> {
        let mut types = module.map(Module::types).unwrap_or_default();
        types.extend(self.0.registry.read().all_types().cloned());
        types
    }

    pub fn get_last_function_id(&self) -> i32 {
        self.0.next_function_id.load(Ordering::Relaxed) - 1
    }

    pub fn get_function_by_id(&self, id: i32) -> Option<Function> {
        let found = self.0.functions.lock().get(&id).and_then(Weak::upgrade);
        found.map(Function)
    }

    // Global functions

    pub fn register_global_function<F>(&self, declaration: &str, function: F) -> ScriptResult<Function>
    where
        F: Fn(&mut ScriptGeneric) + Send + Sync + 'static,
    {
        self.register_global_function_with_auxiliary(declaration, Arc::new(function), None)
    }

    /// Register a global function whose implementation can read `auxiliary`
    /// through [`ScriptGeneric::get_auxiliary`].
    pub fn register_global_function_with_auxiliary(
        &self,
        declaration: &str,
        function: GenericFn,
        auxiliary: Option<UserDataValue>,
    ) -> ScriptResult<Function> {
        let arena = Bump::new();
        let decl = parse_signature(declaration, &arena)?;
        if decl.is_constructor() || decl.is_destructor {
            return Err(ReturnCode::InvalidDeclaration.into());
        }
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        let signature = registry_signature(&registry, &namespace, None, &decl)?;
        let name = decl.name.name;
        if registry.has_name(&namespace, name) {
            return Err(ReturnCode::NameTaken.into());
        }
        if registry
            .find_functions(&namespace, name, u32::MAX)
            .iter()
            .any(|f| f.signature().same_params(&signature))
        {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        let mut data = FunctionData::new(self, FunctionType::System, name, signature, FunctionBody::Native(function));
        data.namespace = namespace;
        data.flags = function_flags(&decl.modifiers, false);
        data.access_mask = registry.default_access_mask;
        data.config_group = registry.current_group();
        data.auxiliary = auxiliary;
        let function = self.new_function(data);
        registry.functions.push(function.clone());
        tracing::debug!(declaration, "registered global function");
        Ok(function)
    }

    pub fn get_global_function_count(&self) -> u32 {
        self.0.registry.read().functions.len() as u32
    }

    pub fn get_global_function_by_index(&self, index: u32) -> Option<Function> {
        self.0.registry.read().functions.get(index as usize).cloned()
    }

    pub fn get_global_function_by_decl(&self, declaration: &str) -> Option<Function> {
        let functions: Vec<Function> = {
            let registry = self.0.registry.read();
            registry
                .functions
                .iter()
                .filter(|f| f.get_namespace() == registry.default_namespace)
                .cloned()
                .collect()
        };
        crate::compiler::declaration::find_by_decl(self, None, &functions, declaration, None)
    }

    // Global properties

    /// Register a global variable backed by `slot`. The host keeps its own
    /// `Arc` to read and write the value the scripts see.
    pub fn register_global_property(&self, declaration: &str, slot: Arc<GlobalSlot>) -> ScriptResult<()> {
        let arena = Bump::new();
        let (ty, name) = Parser::parse_property_declaration(declaration, &arena)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        let types = registry_types(&registry);
        let data_type = TypeScope::new(&types, &namespace)
            .resolve(&ty)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        if data_type.is_void() {
            return Err(ReturnCode::InvalidType.into());
        }
        if registry.has_name(&namespace, name.name) || !registry.find_functions(&namespace, name.name, u32::MAX).is_empty() {
            return Err(ReturnCode::NameTaken.into());
        }
        let current = slot.get();
        let initial = current.coerce(&data_type).unwrap_or_else(|| Value::default_for(&data_type));
        slot.set(initial);
        let config_group = registry.current_group();
        let access_mask = registry.default_access_mask;
        registry.properties.push(RegisteredProperty {
            name: name.name.to_string(),
            namespace,
            is_const: data_type.is_const,
            data_type: data_type.unqualified(),
            slot,
            config_group,
            access_mask,
        });
        tracing::debug!(declaration, "registered global property");
        Ok(())
    }

    pub fn get_global_property_count(&self) -> u32 {
        self.0.registry.read().properties.len() as u32
    }

    pub fn get_global_property_by_index(&self, index: u32) -> Option<GlobalPropertyInfo> {
        let registry = self.0.registry.read();
        let property = registry.properties.get(index as usize)?;
        Some(GlobalPropertyInfo {
            name: property.name.clone(),
            namespace: property.namespace.clone(),
            declaration: property.declaration(true),
            type_id: property.data_type.type_id(),
            is_const: property.is_const,
            config_group: property.config_group.clone(),
            access_mask: property.access_mask,
            slot: property.slot.clone(),
        })
    }

    /// Index of the property `name`, which may be qualified with a
    /// namespace. Unqualified names are looked up in the default namespace.
    pub fn get_global_property_index_by_name(&self, name: &str) -> ScriptResult<u32> {
        let registry = self.0.registry.read();
        let (namespace, name) = qualify(&registry.default_namespace, name);
        registry
            .properties
            .iter()
            .position(|p| p.name == name && p.namespace == namespace)
            .map(|i| i as u32)
            .ok_or_else(|| ReturnCode::NoGlobalVar.into())
    }

    pub fn get_global_property_index_by_decl(&self, declaration: &str) -> ScriptResult<u32> {
        let arena = Bump::new();
        let (ty, name) = Parser::parse_property_declaration(declaration, &arena)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        let registry = self.0.registry.read();
        let namespace = registry.default_namespace.clone();
        let types = registry_types(&registry);
        let data_type = TypeScope::new(&types, &namespace)
            .resolve(&ty)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        registry
            .properties
            .iter()
            .position(|p| {
                p.name == name.name
                    && p.namespace == namespace
                    && p.data_type == data_type.unqualified()
                    && p.is_const == data_type.is_const
            })
            .map(|i| i as u32)
            .ok_or_else(|| ReturnCode::NoGlobalVar.into())
    }

    // Object types

    /// Register a host reference type. Value types other than the string
    /// type are not supported.
    pub fn register_object_type(&self, name: &str, size: u32, flags: ObjectTypeFlags) -> ScriptResult<TypeInfo> {
        if name.contains('<') || flags.contains(ObjectTypeFlags::TEMPLATE) {
            return Err(ReturnCode::NotSupported.into());
        }
        if !is_identifier(name) {
            return Err(ReturnCode::InvalidName.into());
        }
        let is_ref = flags.contains(ObjectTypeFlags::REF);
        let is_value = flags.contains(ObjectTypeFlags::VALUE);
        if is_ref == is_value {
            return Err(ReturnCode::InvalidArg.into());
        }
        if is_value {
            return Err(ReturnCode::NotSupported.into());
        }
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        if registry.find_type(&namespace, name, u32::MAX).is_some() {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        if registry.has_name(&namespace, name) {
            return Err(ReturnCode::NameTaken.into());
        }
        let mut data = TypeInfoData::new(self, TypeKind::Registered, name, namespace);
        data.size = size;
        data.config_group = registry.current_group();
        data.access_mask = registry.default_access_mask;
        data.details.get_mut().flags = flags | ObjectTypeFlags::APP_CLASS;
        let info = self.new_type(data, TypeIdFlags::APPOBJECT);
        registry.types.push(info.clone());
        tracing::debug!(name, type_id = info.get_type_id(), "registered object type");
        Ok(info)
    }

    /// Add a property to a registered type. Returns the property's slot
    /// index in instances created afterwards.
    pub fn register_object_property(&self, object: &str, declaration: &str) -> ScriptResult<u32> {
        let arena = Bump::new();
        let (ty, name) = Parser::parse_property_declaration(declaration, &arena)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        let registry = self.0.registry.read();
        let owner = registered_object(&registry, object)?;
        let namespace = registry.default_namespace.clone();
        let types = registry_types(&registry);
        let data_type = TypeScope::new(&types, &namespace)
            .resolve(&ty)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        if data_type.is_void() {
            return Err(ReturnCode::InvalidType.into());
        }
        let mut details = owner.details().write();
        if details.properties.iter().any(|p| p.name == name.name) {
            return Err(ReturnCode::NameTaken.into());
        }
        let index = details.properties.len();
        details.properties.push(PropertyInfo {
            name: name.name.to_string(),
            data_type,
            is_private: false,
            is_protected: false,
            offset: index as i32,
            is_reference: false,
            access_mask: registry.default_access_mask,
        });
        Ok(index as u32)
    }

    pub fn register_object_method<F>(&self, object: &str, declaration: &str, function: F) -> ScriptResult<Function>
    where
        F: Fn(&mut ScriptGeneric) + Send + Sync + 'static,
    {
        self.register_object_method_with_auxiliary(object, declaration, Arc::new(function), None)
    }

    pub fn register_object_method_with_auxiliary(
        &self,
        object: &str,
        declaration: &str,
        function: GenericFn,
        auxiliary: Option<UserDataValue>,
    ) -> ScriptResult<Function> {
        let arena = Bump::new();
        let decl = parse_signature(declaration, &arena)?;
        if decl.is_constructor() || decl.is_destructor {
            return Err(ReturnCode::InvalidDeclaration.into());
        }
        let registry = self.0.registry.read();
        let owner = registered_object(&registry, object)?;
        let namespace = registry.default_namespace.clone();
        let signature = registry_signature(&registry, &namespace, Some(&owner), &decl)?;
        let name = decl.name.name;
        let duplicate = owner
            .details()
            .read()
            .methods
            .iter()
            .any(|m| m.get_name() == name && m.signature().same_params(&signature) && m.is_read_only() == decl.is_const);
        if duplicate {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        let mut data = FunctionData::new(self, FunctionType::System, name, signature, FunctionBody::Native(function));
        data.set_object_type(&owner);
        data.namespace = owner.get_namespace().to_string();
        data.flags = function_flags(&decl.modifiers, decl.is_const);
        data.access_mask = registry.default_access_mask;
        data.config_group = registry.current_group();
        data.auxiliary = auxiliary;
        let method = self.new_function(data);
        owner.details().write().methods.push(method.clone());
        Ok(method)
    }

    pub fn register_object_behaviour<F>(
        &self,
        object: &str,
        behaviour: Behaviour,
        declaration: &str,
        function: F,
    ) -> ScriptResult<Function>
    where
        F: Fn(&mut ScriptGeneric) + Send + Sync + 'static,
    {
        self.register_object_behaviour_with_auxiliary(object, behaviour, declaration, Arc::new(function), None)
    }

    /// Register a behaviour of a host reference type.
    ///
    /// `Factory` adds a way to construct the type from scripts. `AddRef` and
    /// `Release` are accepted but never called, since handles are counted by
    /// the runtime. `EnumRefs` and `ReleaseRefs` require a garbage collected
    /// type.
    pub fn register_object_behaviour_with_auxiliary(
        &self,
        object: &str,
        behaviour: Behaviour,
        declaration: &str,
        function: GenericFn,
        auxiliary: Option<UserDataValue>,
    ) -> ScriptResult<Function> {
        match behaviour {
            Behaviour::TemplateCallback | Behaviour::ListFactory => {
                return Err(ReturnCode::NotSupported.into());
            }
            Behaviour::Construct | Behaviour::ListConstruct | Behaviour::Destruct => {
                return Err(ReturnCode::IllegalBehaviourForType.into());
            }
            _ => {}
        }
        let arena = Bump::new();
        let decl = parse_signature(declaration, &arena)?;
        let registry = self.0.registry.read();
        let owner = registered_object(&registry, object)?;
        let flags = owner.get_flags();
        if matches!(behaviour, Behaviour::EnumRefs | Behaviour::ReleaseRefs | Behaviour::SetGcFlag | Behaviour::GetGcFlag)
            && !flags.contains(ObjectTypeFlags::GC)
        {
            return Err(ReturnCode::IllegalBehaviourForType.into());
        }
        let namespace = registry.default_namespace.clone();
        let signature = registry_signature(&registry, &namespace, Some(&owner), &decl)?;
        if behaviour == Behaviour::Factory {
            let returns_owner = signature.return_type.is_handle
                && signature.return_type.type_info().is_some_and(|t| t.ptr_eq(&owner));
            if !returns_owner {
                return Err(ReturnCode::InvalidDeclaration.into());
            }
        }
        let name = if behaviour == Behaviour::Factory { owner.get_name().to_string() } else { decl.name.name.to_string() };
        let mut data = FunctionData::new(self, FunctionType::System, name, signature, FunctionBody::Native(function));
        data.namespace = owner.get_namespace().to_string();
        if behaviour != Behaviour::Factory {
            data.set_object_type(&owner);
        }
        data.access_mask = registry.default_access_mask;
        data.config_group = registry.current_group();
        data.auxiliary = auxiliary;
        let function = self.new_function(data);
        let mut details = owner.details().write();
        if behaviour == Behaviour::Factory {
            if details.factories.iter().any(|f| f.signature().same_params(function.signature())) {
                return Err(ReturnCode::AlreadyRegistered.into());
            }
            details.factories.push(function.clone());
        } else if details.behaviours.iter().any(|(b, _)| *b == behaviour) {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        details.behaviours.push((behaviour, function.clone()));
        Ok(function)
    }

    // Interfaces

    pub fn register_interface(&self, name: &str) -> ScriptResult<TypeInfo> {
        if !is_identifier(name) {
            return Err(ReturnCode::InvalidName.into());
        }
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        if registry.find_type(&namespace, name, u32::MAX).is_some() {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        if registry.has_name(&namespace, name) {
            return Err(ReturnCode::NameTaken.into());
        }
        let mut data = TypeInfoData::new(self, TypeKind::Interface, name, namespace);
        data.config_group = registry.current_group();
        data.access_mask = registry.default_access_mask;
        data.details.get_mut().flags = ObjectTypeFlags::REF | ObjectTypeFlags::NOCOUNT;
        let info = self.new_type(data, TypeIdFlags::SCRIPTOBJECT);
        registry.types.push(info.clone());
        Ok(info)
    }

    pub fn register_interface_method(&self, interface: &str, declaration: &str) -> ScriptResult<Function> {
        let arena = Bump::new();
        let decl = parse_signature(declaration, &arena)?;
        let registry = self.0.registry.read();
        let namespace = registry.default_namespace.clone();
        let types = registry_types(&registry);
        let owner = TypeScope::new(&types, &namespace)
            .find(None, interface)
            .filter(TypeInfo::is_interface)
            .ok_or(ReturnCode::InvalidArg)?;
        let signature = registry_signature(&registry, &namespace, Some(&owner), &decl)?;
        let mut data = FunctionData::new(self, FunctionType::Interface, decl.name.name, signature, FunctionBody::Interface);
        data.set_object_type(&owner);
        data.namespace = owner.get_namespace().to_string();
        data.flags = function_flags(&decl.modifiers, decl.is_const);
        data.config_group = registry.current_group();
        let method = self.new_function(data);
        owner.details().write().methods.push(method.clone());
        Ok(method)
    }

    // String factory

    /// Register the provider of string constants and the value type that
    /// string literals have, e.g. `"string"`. The type gets the methods
    /// `length`, `isEmpty`, `substr` and `findFirst`.
    pub fn register_string_factory(&self, datatype: &str, factory: Arc<dyn StringFactory>) -> ScriptResult<()> {
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration(datatype, &arena).map_err(|_| ReturnCode::InvalidDeclaration)?;
        let angelscript_parser::ast::TypeBase::Named(name) = ty.base else {
            return Err(ReturnCode::InvalidType.into());
        };
        let string_type = {
            let mut registry = self.0.registry.write();
            if registry.string_factory.is_some() {
                return Err(ReturnCode::AlreadyRegistered.into());
            }
            let namespace = registry.default_namespace.clone();
            let existing = registry.find_type(&namespace, name.name, u32::MAX);
            let string_type = match existing {
                Some(existing) if existing.is_string_type() => existing,
                Some(_) => return Err(ReturnCode::NameTaken.into()),
                None => {
                    let mut data = TypeInfoData::new(self, TypeKind::Registered, name.name, namespace);
                    data.size = std::mem::size_of::<usize>() as u32;
                    data.config_group = registry.current_group();
                    data.details.get_mut().flags = ObjectTypeFlags::VALUE | ObjectTypeFlags::APP_CLASS;
                    let info = self.new_type(data, TypeIdFlags::APPOBJECT);
                    registry.types.push(info.clone());
                    info
                }
            };
            registry.string_factory = Some(factory);
            registry.string_type = Some(string_type.clone());
            string_type
        };
        self.register_string_methods(&string_type)
    }

    /// Register the interning [`DefaultStringFactory`] for the type `string`.
    pub fn register_default_string_factory(&self) -> ScriptResult<()> {
        self.register_string_factory("string", Arc::new(DefaultStringFactory::new()))
    }

    pub fn get_string_factory(&self) -> Option<Arc<dyn StringFactory>> {
        self.0.registry.read().string_factory.clone()
    }

    pub fn get_string_factory_return_type_id(&self) -> ScriptResult<(i32, TypeModifiers)> {
        let registry = self.0.registry.read();
        let string_type = registry.string_type.as_ref().ok_or(ReturnCode::NoFunction)?;
        Ok((string_type.get_type_id(), TypeModifiers::CONST))
    }

    fn register_string_methods(&self, string_type: &TypeInfo) -> ScriptResult<()> {
        let name = string_type.qualified_name();
        let this = |generic: &ScriptGeneric| generic.get_object().as_string().cloned().unwrap_or_default();
        self.register_object_method(&name, "uint length() const", move |generic: &mut ScriptGeneric| {
            let len = this(generic).len() as u32;
            report(generic.set_return_dword(len));
        })?;
        self.register_object_method(&name, "bool isEmpty() const", move |generic: &mut ScriptGeneric| {
            let empty = this(generic).is_empty();
            report(generic.set_return_value(empty));
        })?;
        self.register_object_method(
            &name,
            &format!("{name} substr(uint start = 0, int count = -1) const"),
            move |generic: &mut ScriptGeneric| {
                let text = this(generic);
                let start = (generic.get_arg_dword(0) as usize).min(text.len());
                let count = generic.get_arg_dword(1) as i32;
                let end = if count < 0 { text.len() } else { (start + count as usize).min(text.len()) };
                let slice = text.as_str().get(start..end).unwrap_or("");
                report(generic.set_return_value(ScriptString::new(slice)));
            },
        )?;
        self.register_object_method(
            &name,
            &format!("int findFirst(const {name} &in str, uint start = 0) const"),
            move |generic: &mut ScriptGeneric| {
                let text = this(generic);
                let needle = generic.get_arg_string(0).unwrap_or_default();
                let start = (generic.get_arg_dword(1) as usize).min(text.len());
                let found = text
                    .as_str()
                    .get(start..)
                    .and_then(|rest| rest.find(needle.as_str()))
                    .map_or(-1, |i| (i + start) as i32);
                report(generic.set_return_dword(found as u32));
            },
        )?;
        Ok(())
    }

    /// Arrays are not part of the language subset.
    pub fn register_default_array_type(&self, _datatype: &str) -> ScriptResult<()> {
        Err(ReturnCode::NotSupported.into())
    }

    pub fn get_default_array_type_id(&self) -> ScriptResult<i32> {
        Err(ReturnCode::NoFunction.into())
    }

    // Enums

    pub fn register_enum(&self, name: &str) -> ScriptResult<TypeInfo> {
        if !is_identifier(name) {
            return Err(ReturnCode::InvalidName.into());
        }
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        if registry.find_type(&namespace, name, u32::MAX).is_some() {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        if registry.has_name(&namespace, name) {
            return Err(ReturnCode::NameTaken.into());
        }
        let mut data = TypeInfoData::new(self, TypeKind::Enum, name, namespace);
        data.size = 4;
        data.config_group = registry.current_group();
        data.access_mask = registry.default_access_mask;
        data.details.get_mut().flags = ObjectTypeFlags::ENUM;
        let info = self.new_type(data, TypeIdFlags::empty());
        registry.enums.push(info.clone());
        Ok(info)
    }

    pub fn register_enum_value(&self, enum_name: &str, name: &str, value: i32) -> ScriptResult<()> {
        if !is_identifier(name) {
            return Err(ReturnCode::InvalidName.into());
        }
        let registry = self.0.registry.read();
        let namespace = registry.default_namespace.clone();
        let (scope, enum_name) = split_qualified(enum_name);
        let enum_namespace = crate::compiler::declaration::join_namespace(&namespace, scope);
        let info = registry
            .enums
            .iter()
            .find(|e| e.get_name() == enum_name && e.get_namespace() == enum_namespace)
            .cloned()
            .ok_or(ReturnCode::InvalidType)?;
        let mut details = info.details().write();
        if details.enum_values.iter().any(|(n, _)| n == name) {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        details.enum_values.push((name.to_string(), value));
        Ok(())
    }

    pub fn get_enum_count(&self) -> u32 {
        self.0.registry.read().enums.len() as u32
    }

    pub fn get_enum_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.registry.read().enums.get(index as usize).cloned()
    }

    // Funcdefs and typedefs

    pub fn register_funcdef(&self, declaration: &str) -> ScriptResult<TypeInfo> {
        let arena = Bump::new();
        let decl = parse_signature(declaration, &arena)?;
        if decl.is_constructor() || decl.is_destructor {
            return Err(ReturnCode::InvalidDeclaration.into());
        }
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        let name = decl.name.name;
        if registry.find_type(&namespace, name, u32::MAX).is_some() {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        if registry.has_name(&namespace, name) {
            return Err(ReturnCode::NameTaken.into());
        }
        let signature = registry_signature(&registry, &namespace, None, &decl)?;
        let mut data = FunctionData::new(self, FunctionType::Funcdef, name, signature, FunctionBody::Funcdef);
        data.namespace = namespace.clone();
        data.config_group = registry.current_group();
        let signature = self.new_function(data);

        let mut data = TypeInfoData::new(self, TypeKind::Funcdef, name, namespace);
        data.size = std::mem::size_of::<usize>() as u32;
        data.config_group = registry.current_group();
        data.access_mask = registry.default_access_mask;
        {
            let details = data.details.get_mut();
            details.flags = ObjectTypeFlags::FUNCDEF | ObjectTypeFlags::REF;
            details.funcdef_signature = Some(signature);
        }
        let info = self.new_type(data, TypeIdFlags::APPOBJECT);
        registry.funcdefs.push(info.clone());
        Ok(info)
    }

    pub fn get_funcdef_count(&self) -> u32 {
        self.0.registry.read().funcdefs.len() as u32
    }

    pub fn get_funcdef_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.registry.read().funcdefs.get(index as usize).cloned()
    }

    /// The funcdef type whose signature object is `signature`.
    pub(crate) fn funcdef_for_signature(&self, signature: &Function) -> Option<TypeInfo> {
        let types: Vec<Weak<TypeInfoData>> = self.0.types.lock().values().cloned().collect();
        types.iter().filter_map(Weak::upgrade).map(TypeInfo).find(|t| {
            t.is_funcdef()
                && t
                    .details()
                    .read()
                    .funcdef_signature
                    .as_ref()
                    .is_some_and(|s| s.ptr_eq(signature))
        })
    }

    /// Register `name` as an alias of a primitive type.
    pub fn register_typedef(&self, name: &str, declaration: &str) -> ScriptResult<TypeInfo> {
        if !is_identifier(name) {
            return Err(ReturnCode::InvalidName.into());
        }
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration(declaration, &arena).map_err(|_| ReturnCode::InvalidDeclaration)?;
        let angelscript_parser::ast::TypeBase::Primitive(kind) = ty.base else {
            return Err(ReturnCode::InvalidType.into());
        };
        if kind == PrimitiveKind::Void || ty.is_handle || ty.is_const {
            return Err(ReturnCode::InvalidType.into());
        }
        let mut registry = self.0.registry.write();
        let namespace = registry.default_namespace.clone();
        if registry.find_type(&namespace, name, u32::MAX).is_some() {
            return Err(ReturnCode::AlreadyRegistered.into());
        }
        if registry.has_name(&namespace, name) {
            return Err(ReturnCode::NameTaken.into());
        }
        let mut data = TypeInfoData::new(self, TypeKind::Typedef, name, namespace);
        data.size = kind.size();
        data.config_group = registry.current_group();
        data.access_mask = registry.default_access_mask;
        {
            let details = data.details.get_mut();
            details.flags = ObjectTypeFlags::TYPEDEF;
            details.typedef_target = Some(DataType::primitive(kind));
        }
        let info = self.new_type(data, TypeIdFlags::empty());
        registry.typedefs.push(info.clone());
        Ok(info)
    }

    pub fn get_typedef_count(&self) -> u32 {
        self.0.registry.read().typedefs.len() as u32
    }

    pub fn get_typedef_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.registry.read().typedefs.get(index as usize).cloned()
    }

    // Configuration groups

    /// Start a group: everything registered until `end_config_group` can
    /// later be removed together.
    pub fn begin_config_group(&self, name: &str) -> ScriptResult<()> {
        let mut registry = self.0.registry.write();
        if registry.current_group.is_some() {
            return Err(ReturnCode::NotSupported.into());
        }
        if registry.config_groups.iter().any(|g| g == name) {
            return Err(ReturnCode::NameTaken.into());
        }
        registry.config_groups.push(name.to_string());
        registry.current_group = Some(name.to_string());
        Ok(())
    }

    pub fn end_config_group(&self) -> ScriptResult<()> {
        let mut registry = self.0.registry.write();
        if registry.current_group.take().is_none() {
            return Err(ReturnCode::Error.into());
        }
        Ok(())
    }

    /// Remove every entity of the group. Fails while a module compiled
    /// against the group is still loaded.
    pub fn remove_config_group(&self, name: &str) -> ScriptResult<()> {
        let in_use = self.0.modules.read().iter().any(|m| m.uses_config_group(name));
        if in_use {
            return Err(ReturnCode::ConfigGroupIsInUse.into());
        }
        let removed = {
            let mut registry = self.0.registry.write();
            if registry.current_group.as_deref() == Some(name) {
                return Err(ReturnCode::ConfigGroupIsInUse.into());
            }
            registry.remove_group(name)
        };
        for ty in &removed.types {
            ty.clear_details();
        }
        tracing::debug!(group = name, types = removed.types.len(), functions = removed.functions.len(), "removed config group");
        drop(removed);
        Ok(())
    }

    // Access masks and namespaces

    /// Access mask given to entities registered from now on. Returns the
    /// previous mask.
    pub fn set_default_access_mask(&self, mask: u32) -> u32 {
        std::mem::replace(&mut self.0.registry.write().default_access_mask, mask)
    }

    pub fn set_default_namespace(&self, namespace: &str) -> ScriptResult<()> {
        if !is_namespace(namespace) {
            return Err(ReturnCode::InvalidArg.into());
        }
        self.0.registry.write().default_namespace = namespace.strip_prefix("::").unwrap_or(namespace).to_string();
        Ok(())
    }

    pub fn get_default_namespace(&self) -> String {
        self.0.registry.read().default_namespace.clone()
    }

    // Modules

    pub fn get_module(&self, name: &str, flag: GetModuleFlags) -> ScriptResult<Module> {
        let existing = self.find_module(name);
        match (flag, existing) {
            (GetModuleFlags::OnlyIfExists, None) => Err(ReturnCode::NoModule.into()),
            (GetModuleFlags::OnlyIfExists | GetModuleFlags::CreateIfNotExists, Some(module)) => Ok(module),
            (GetModuleFlags::AlwaysCreate, Some(module)) => {
                module.discard();
                Ok(self.add_module(name))
            }
            (_, None) => Ok(self.add_module(name)),
        }
    }

    fn find_module(&self, name: &str) -> Option<Module> {
        self.0.modules.read().iter().find(|m| m.get_name() == name).cloned()
    }

    fn add_module(&self, name: &str) -> Module {
        let module = Module::new(self, name);
        self.0.modules.write().push(module.clone());
        tracing::debug!(module = name, "module created");
        module
    }

    pub fn discard_module(&self, name: &str) -> ScriptResult<()> {
        let module = self.find_module(name).ok_or(ReturnCode::NoModule)?;
        module.discard();
        Ok(())
    }

    /// Take `module` out of the table. Its contents are released by the
    /// caller.
    pub(crate) fn remove_module(&self, module: &Module) {
        let removed = {
            let mut modules = self.0.modules.write();
            let index = modules.iter().position(|m| m.ptr_eq(module));
            index.map(|i| modules.remove(i))
        };
        drop(removed);
    }

    pub fn get_module_count(&self) -> u32 {
        self.0.modules.read().len() as u32
    }

    pub fn get_module_by_index(&self, index: u32) -> Option<Module> {
        self.0.modules.read().get(index as usize).cloned()
    }

    // Contexts

    pub fn create_context(&self) -> ScriptResult<Context> {
        tracing::trace!("context created");
        Ok(Context::new(self))
    }

    /// A context from the host's pool callback, or from the engine's own
    /// pool.
    pub fn request_context(&self) -> ScriptResult<Context> {
        if let Some((request, _)) = self.0.callbacks.context_callbacks() {
            return request(self).ok_or_else(|| ReturnCode::Error.into());
        }
        let pooled = self.0.context_pool.lock().pop();
        match pooled {
            Some(ctx) => {
                tracing::trace!("context taken from pool");
                Ok(ctx)
            }
            None => self.create_context(),
        }
    }

    pub fn return_context(&self, ctx: Context) -> ScriptResult<()> {
        if !ctx.get_engine().is_some_and(|e| e.ptr_eq(self)) {
            return Err(ReturnCode::InvalidArg.into());
        }
        if let Some((_, give_back)) = self.0.callbacks.context_callbacks() {
            give_back(self, ctx);
            return Ok(());
        }
        ctx.unprepare()?;
        self.0.context_pool.lock().push(ctx);
        tracing::trace!("context returned to pool");
        Ok(())
    }

    pub fn set_context_callbacks<R, G>(&self, request: R, give_back: G) -> ScriptResult<()>
    where
        R: Fn(&Engine) -> Option<Context> + Send + Sync + 'static,
        G: Fn(&Engine, Context) + Send + Sync + 'static,
    {
        self.set_context_callback_fns(Arc::new(request), Arc::new(give_back));
        Ok(())
    }

    pub(crate) fn set_context_callback_fns(&self, request: RequestContextCallbackFn, give_back: ReturnContextCallbackFn) {
        self.0.callbacks.set_context_callbacks(Some((request, give_back)));
    }

    pub fn clear_context_callbacks(&self) -> ScriptResult<()> {
        self.0.callbacks.set_context_callbacks(None);
        Ok(())
    }

    // Script objects

    /// A new instance of `type_info` built by its default constructor or
    /// parameterless factory.
    pub fn create_script_object(&self, type_info: &TypeInfo) -> ScriptResult<ScriptObject> {
        let default_ctor = type_info
            .details()
            .read()
            .factories
            .iter()
            .find(|f| f.get_param_count() == 0)
            .cloned();
        match type_info.kind() {
            TypeKind::Class => {
                let ctor = default_ctor.ok_or(ReturnCode::NoFunction)?;
                let object = ScriptObject::new_uninitialized(type_info);
                let ctx = Context::new(self);
                ctx.prepare(&ctor)?;
                ctx.set_object(Some(object.clone()))?;
                match ctx.execute()? {
                    ContextState::Finished => Ok(object),
                    _ => Err(ReturnCode::Error.into()),
                }
            }
            TypeKind::Registered if !type_info.is_string_type() => {
                let factory = default_ctor.ok_or(ReturnCode::NoFunction)?;
                match self.call_native(&factory, Value::Void, Vec::new()) {
                    Value::Object(Some(object)) => Ok(object),
                    _ => Err(ReturnCode::Error.into()),
                }
            }
            _ => Err(ReturnCode::InvalidType.into()),
        }
    }

    pub fn create_script_object_copy(&self, object: &ScriptObject, type_info: &TypeInfo) -> ScriptResult<ScriptObject> {
        if !object.get_object_type().is_assignable_to(type_info) {
            return Err(ReturnCode::InvalidType.into());
        }
        object.deep_copy()
    }

    /// An instance with every property at its default and no constructor
    /// run. For a registered type this is an object without a host payload,
    /// which a factory can fill in with [`ScriptObject::set_native`].
    pub fn create_uninitialized_script_object(&self, type_info: &TypeInfo) -> ScriptResult<ScriptObject> {
        let creatable = match type_info.kind() {
            TypeKind::Class => true,
            TypeKind::Registered => !type_info.is_string_type(),
            _ => false,
        };
        if !creatable {
            return Err(ReturnCode::InvalidType.into());
        }
        Ok(ScriptObject::new_uninitialized(type_info))
    }

    pub fn assign_script_object(&self, dst: &ScriptObject, src: &ScriptObject, type_info: &TypeInfo) -> ScriptResult<()> {
        if !dst.get_object_type().ptr_eq(type_info) || !src.get_object_type().is_assignable_to(type_info) {
            return Err(ReturnCode::InvalidType.into());
        }
        dst.copy_from(src)
    }

    /// `object` as a handle of `to_type`, or `None` when the object's type
    /// does not convert. With `use_only_implicit_cast` only upcasts from
    /// `from_type` are allowed.
    pub fn ref_cast_object(
        &self,
        object: &ScriptObject,
        from_type: &TypeInfo,
        to_type: &TypeInfo,
        use_only_implicit_cast: bool,
    ) -> ScriptResult<Option<ScriptObject>> {
        let allowed = if use_only_implicit_cast {
            from_type.is_assignable_to(to_type)
        } else {
            object.get_object_type().is_assignable_to(to_type)
        };
        Ok(allowed.then(|| object.clone()))
    }

    pub fn get_weak_ref_flag_of_script_object(&self, object: &ScriptObject, type_info: &TypeInfo) -> Option<LockableSharedBool> {
        object
            .get_object_type()
            .is_assignable_to(type_info)
            .then(|| object.get_weak_ref_flag())
    }

    /// Bind `method` to `object`, yielding a function callable through a
    /// funcdef handle.
    pub fn create_delegate(&self, method: &Function, object: &ScriptObject) -> ScriptResult<Function> {
        let owner = method.get_object_type().ok_or(ReturnCode::InvalidArg)?;
        if !object.get_object_type().is_assignable_to(&owner) {
            return Err(ReturnCode::InvalidArg.into());
        }
        let method = crate::vm::machine::resolve_virtual(method, &Value::Object(Some(object.clone())));
        let body = FunctionBody::Delegate {
            object: object.clone(),
            method: method.clone(),
        };
        let mut data = FunctionData::new(self, FunctionType::Delegate, method.get_name(), method.signature().clone(), body);
        data.namespace = method.get_namespace().to_string();
        Ok(self.new_function(data))
    }

    /// Run a host function outside of any context.
    pub(crate) fn call_native(&self, function: &Function, object: Value, args: Vec<Value>) -> Value {
        let FunctionBody::Native(callable) = function.body() else {
            return Value::Void;
        };
        let callable = callable.clone();
        let mut generic = ScriptGeneric::new(self.clone(), function.clone(), object, args);
        callable(&mut generic);
        generic.take_return_value()
    }

    /// Invoke a behaviour of `object`'s type with default arguments.
    pub(crate) fn call_behaviour(&self, behaviour: &Function, object: &ScriptObject) {
        let args = behaviour
            .signature()
            .params
            .iter()
            .map(|p: &ParamInfo| Value::default_for(&p.data_type))
            .collect();
        let result = self.call_native(behaviour, Value::Object(Some(object.clone())), args);
        drop(result);
    }

    // Garbage collection

    /// Run the collector. With `ONE_STEP` each iteration performs one step
    /// of the cycle. Returns 1 while a cycle is still in progress.
    pub fn garbage_collect(&self, flags: GCFlags, num_iterations: u32) -> i32 {
        #[cfg(feature = "profiling")]
        profiling::scope!("Engine::garbage_collect");

        let mut result = 0;
        for _ in 0..num_iterations.max(1) {
            result = self.0.gc.collect(self, flags);
            if result == 0 {
                break;
            }
        }
        result
    }

    pub fn get_gc_statistics(&self) -> GcStatistics {
        self.0.gc.statistics()
    }

    /// Track `object` for cycle detection. Instances of garbage collected
    /// types are tracked automatically when created.
    pub fn notify_garbage_collector_of_new_object(&self, object: &ScriptObject) {
        self.0.gc.add_object(object);
    }

    /// Tracked object at `index` with its sequence number and type.
    pub fn get_object_in_gc(&self, index: u32) -> Option<(u32, ScriptObject, TypeInfo)> {
        self.0.gc.object_at(index)
    }

    /// Report a reference from within an `EnumRefs` behaviour.
    pub fn gc_enum_callback(&self, reference: &ScriptObject) {
        self.0.gc.enum_callback(reference);
    }

    /// Report the references of an object held by value inside a host type.
    pub fn forward_gc_enum_references(&self, object: &ScriptObject) {
        self.0.gc.forward_enum_references(self, object);
    }

    pub fn forward_gc_release_references(&self, object: &ScriptObject) {
        self.0.gc.forward_release_references(self, object);
    }

    pub fn set_circular_ref_detected_callback<F>(&self, callback: F) -> ScriptResult<()>
    where
        F: Fn(&TypeInfo, &ScriptObject) + Send + Sync + 'static,
    {
        self.set_circular_ref_callback_fn(Some(Arc::new(callback)));
        Ok(())
    }

    pub(crate) fn set_circular_ref_callback_fn(&self, callback: Option<CircularRefCallbackFn>) {
        self.0.callbacks.set_circular_ref_callback(callback);
    }

    pub fn clear_circular_ref_detected_callback(&self) -> ScriptResult<()> {
        self.set_circular_ref_callback_fn(None);
        Ok(())
    }

    /// Collection run after a context finishes, when enabled.
    pub(crate) fn auto_collect(&self) {
        if !self.flag(EngineProperty::AutoGarbageCollect) {
            return;
        }
        if self.0.gc.statistics().current_size >= AUTO_GC_TRACKED_OBJECTS {
            self.0.gc.collect(self, GCFlags::FULL_CYCLE);
        } else if self.0.gc.new_object_count() >= AUTO_GC_NEW_OBJECTS {
            self.0.gc.collect(self, GCFlags::FULL_CYCLE | GCFlags::DESTROY_GARBAGE);
        }
    }

    // Type identification

    pub fn get_type_id_by_decl(&self, declaration: &str) -> ScriptResult<i32> {
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration(declaration, &arena).map_err(|_| ReturnCode::InvalidDeclaration)?;
        let types = self.visible_types(None);
        let namespace = self.get_default_namespace();
        let data_type = TypeScope::new(&types, &namespace)
            .resolve(&ty)
            .map_err(|_| ReturnCode::InvalidType)?;
        Ok(data_type.type_id())
    }

    pub fn get_type_declaration(&self, type_id: i32, include_namespace: bool) -> Option<String> {
        if let Some(kind) = PrimitiveKind::from_type_id(type_id) {
            return Some(kind.name().to_string());
        }
        let info = self.get_type_info_by_id(type_id)?;
        let mut data_type = DataType::of(&info);
        if info.is_enum() || info.is_typedef() {
            return Some(data_type.declaration(include_namespace));
        }
        data_type.is_handle = type_id::is_handle(type_id) || info.is_funcdef();
        data_type.is_const = type_id::is_handle_to_const(type_id);
        Some(data_type.declaration(include_namespace))
    }

    pub fn get_size_of_primitive_type(&self, type_id: i32) -> ScriptResult<u32> {
        if let Some(kind) = PrimitiveKind::from_type_id(type_id) {
            return Ok(kind.size());
        }
        match self.get_type_info_by_id(type_id) {
            Some(info) if info.is_enum() || info.is_typedef() => Ok(info.get_size()),
            _ => Err(ReturnCode::InvalidType.into()),
        }
    }

    pub fn get_type_info_by_id(&self, type_id: i32) -> Option<TypeInfo> {
        if PrimitiveKind::from_type_id(type_id).is_some() {
            return None;
        }
        let mut types = self.0.types.lock();
        let base = type_id::base_of(type_id);
        match types.get(&base).map(Weak::upgrade) {
            Some(Some(info)) => Some(TypeInfo(info)),
            Some(None) => {
                types.remove(&base);
                None
            }
            None => None,
        }
    }

    /// Registered type named `name`, which may be qualified with a
    /// namespace.
    pub fn get_type_info_by_name(&self, name: &str) -> Option<TypeInfo> {
        let registry = self.0.registry.read();
        let (namespace, name) = qualify(&registry.default_namespace, name);
        registry.find_type(&namespace, name, u32::MAX)
    }

    pub fn get_type_info_by_decl(&self, declaration: &str) -> Option<TypeInfo> {
        let type_id = self.get_type_id_by_decl(declaration).ok()?;
        self.get_type_info_by_id(type_id)
    }

    /// Registered object types and interfaces.
    pub fn get_object_type_count(&self) -> u32 {
        self.0.registry.read().types.len() as u32
    }

    pub fn get_object_type_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.registry.read().types.get(index as usize).cloned()
    }

    // User data

    pub fn set_user_data<T: UserData>(&self, data: T) -> Option<UserDataValue> {
        self.0.user_data.set(data)
    }

    pub fn get_user_data<T: UserData>(&self) -> Option<Arc<T>> {
        self.0.user_data.get::<T>()
    }

    pub(crate) fn user_data_store(&self) -> &UserDataStore {
        &self.0.user_data
    }
}

impl PartialEq for Engine {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Engine {}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("modules", &self.get_module_count())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// String methods return a fixed type, so a rejected return value means the
/// registration and the callback disagree.
fn report(result: ScriptResult<()>) {
    if let Err(error) = result {
        debug_assert!(false, "string method return rejected: {error}");
        tracing::debug!(%error, "string method return rejected");
    }
}

fn parse_signature<'ast>(declaration: &str, arena: &'ast Bump) -> ScriptResult<FunctionDecl<'ast>> {
    Parser::parse_function_signature(declaration, arena).map_err(|_| ReturnCode::InvalidDeclaration.into())
}

fn registry_types(registry: &Registry) -> Vec<TypeInfo> {
    registry.all_types().cloned().collect()
}

fn registry_signature(
    registry: &Registry,
    namespace: &str,
    class: Option<&TypeInfo>,
    decl: &FunctionDecl<'_>,
) -> ScriptResult<Signature> {
    let types = registry_types(registry);
    let mut scope = TypeScope::new(&types, namespace);
    scope.class = class;
    let signature = scope.signature(decl).map_err(|_| ReturnCode::InvalidDeclaration)?;
    if signature
        .params
        .iter()
        .any(|p| p.modifiers.intersects(TypeModifiers::OUTREF))
    {
        return Err(ReturnCode::NotSupported.into());
    }
    Ok(signature)
}

/// The registered object type written as `object`, e.g. `"Player"`.
fn registered_object(registry: &Registry, object: &str) -> ScriptResult<TypeInfo> {
    let arena = Bump::new();
    let ty = Parser::parse_type_declaration(object, &arena).map_err(|_| ReturnCode::InvalidArg)?;
    let types = registry_types(registry);
    let data_type = TypeScope::new(&types, &registry.default_namespace)
        .resolve(&ty)
        .map_err(|_| ReturnCode::InvalidArg)?;
    match data_type.kind {
        DataTypeKind::Object(info) if info.is_registered() => Ok(info),
        _ => Err(ReturnCode::InvalidArg.into()),
    }
}

/// Namespace and name of a possibly qualified `name`, relative to
/// `default_namespace` when unqualified.
fn qualify<'a>(default_namespace: &str, name: &'a str) -> (String, &'a str) {
    if name.contains("::") {
        let (namespace, name) = split_qualified(name);
        (namespace.to_string(), name)
    } else {
        (default_namespace.to_string(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn properties_start_at_defaults() {
        let engine = Engine::create();
        assert_eq!(engine.get_engine_property(EngineProperty::AutoGarbageCollect), 1);
        assert_eq!(engine.get_engine_property(EngineProperty::MaxNestedCalls), 100);
        engine.set_engine_property(EngineProperty::RequireEnumScope, 1).unwrap();
        assert!(engine.flag(EngineProperty::RequireEnumScope));
        assert!(engine.set_engine_property(EngineProperty::JitInterfaceVersion, 7).is_err());
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let engine = Engine::create();
        engine.register_global_function("void f(int)", |_| {}).unwrap();
        engine.register_global_function("void f(float)", |_| {}).unwrap();
        let err = engine.register_global_function("int f(int)", |_| {}).unwrap_err();
        assert_eq!(err.return_code(), ReturnCode::AlreadyRegistered);
        let err = engine.register_global_function("void g(Missing)", |_| {}).unwrap_err();
        assert_eq!(err.return_code(), ReturnCode::InvalidDeclaration);
        assert_eq!(engine.get_global_function_count(), 2);
        assert!(engine.get_global_function_by_decl("void f(float)").is_some());
        assert!(engine.get_global_function_by_decl("void f(double)").is_none());
    }

    #[test]
    fn global_properties_share_their_slot() {
        let engine = Engine::create();
        let slot = Arc::new(GlobalSlot::new(Value::Int64(3)));
        engine.register_global_property("int lives", slot.clone()).unwrap();
        assert_eq!(slot.get(), Value::Int32(3));
        let index = engine.get_global_property_index_by_name("lives").unwrap();
        let info = engine.get_global_property_by_index(index).unwrap();
        assert!(Arc::ptr_eq(&info.slot, &slot));
        assert_eq!(info.type_id, PrimitiveKind::Int32.type_id());
        assert_eq!(engine.get_global_property_index_by_decl("int lives").unwrap(), index);
        let err = engine.register_global_property("float lives", Arc::new(GlobalSlot::new(Value::Void)));
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::NameTaken);
    }

    #[test]
    fn grouped_properties_keep_their_group_and_mask() {
        let engine = Engine::create();
        engine.set_default_access_mask(4);
        engine.set_default_namespace("game").unwrap();
        engine.begin_config_group("extra").unwrap();
        engine
            .register_global_property("const int lives", Arc::new(GlobalSlot::new(Value::Int32(3))))
            .unwrap();
        engine.end_config_group().unwrap();
        let index = engine.get_global_property_index_by_name("lives").unwrap();
        let info = engine.get_global_property_by_index(index).unwrap();
        assert_eq!(info.config_group.as_deref(), Some("extra"));
        assert_eq!(info.access_mask, 4);
        assert!(info.is_const);
        assert_eq!(info.declaration, "const int game::lives");
    }

    #[test]
    fn object_types_need_a_single_kind() {
        let engine = Engine::create();
        let err = engine.register_object_type("Both", 0, ObjectTypeFlags::REF | ObjectTypeFlags::VALUE);
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::InvalidArg);
        let err = engine.register_object_type("Vec3", 12, ObjectTypeFlags::VALUE);
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::NotSupported);
        let err = engine.register_object_type("class", 0, ObjectTypeFlags::REF);
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::InvalidName);
        let player = engine.register_object_type("Player", 0, ObjectTypeFlags::REF).unwrap();
        assert!(type_id::is_object(player.get_type_id()));
        assert_eq!(engine.get_type_id_by_decl("Player@").unwrap(), type_id::handle_of(player.get_type_id(), false));
        assert_eq!(engine.get_type_declaration(type_id::handle_of(player.get_type_id(), false), true).as_deref(), Some("Player@"));
        let err = engine.register_object_type("Player", 0, ObjectTypeFlags::REF);
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::AlreadyRegistered);
    }

    #[test]
    fn behaviours_are_validated() {
        let engine = Engine::create();
        engine.register_object_type("Res", 0, ObjectTypeFlags::REF).unwrap();
        let err = engine.register_object_behaviour("Res", Behaviour::EnumRefs, "void f(int&in)", |_| {});
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::IllegalBehaviourForType);
        let err = engine.register_object_behaviour("Res", Behaviour::TemplateCallback, "bool f(int&in)", |_| {});
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::NotSupported);
        let err = engine.register_object_behaviour("Res", Behaviour::Factory, "int f()", |_| {});
        assert_eq!(err.unwrap_err().return_code(), ReturnCode::InvalidDeclaration);
        let factory = engine
            .register_object_behaviour("Res", Behaviour::Factory, "Res@ f()", |_| {})
            .unwrap();
        assert_eq!(factory.get_name(), "Res");
        engine
            .register_object_behaviour("Res", Behaviour::AddRef, "void f()", |_| {})
            .unwrap();
        let res = engine.get_type_info_by_name("Res").unwrap();
        assert_eq!(res.get_factory_count(), 1);
        assert_eq!(res.get_behaviour_count(), 2);
    }

    #[test]
    fn native_factories_create_objects() {
        let engine = Engine::create();
        let counter = engine.register_object_type("Counter", 0, ObjectTypeFlags::REF).unwrap();
        let ty = counter.clone();
        engine
            .register_object_behaviour("Counter", Behaviour::Factory, "Counter@ f()", move |generic: &mut ScriptGeneric| {
                let object = ScriptObject::new_native(&ty, 5u32);
                generic.set_return_object(Some(object)).unwrap();
            })
            .unwrap();
        let object = engine.create_script_object(&counter).unwrap();
        assert_eq!(object.with_native(|v: &mut u32| *v), Some(5));
    }

    #[test]
    fn config_groups_remove_their_entities() {
        let engine = Engine::create();
        engine.begin_config_group("extra").unwrap();
        assert_eq!(engine.begin_config_group("other").unwrap_err().return_code(), ReturnCode::NotSupported);
        engine.register_global_function("void extra()", |_| {}).unwrap();
        engine.end_config_group().unwrap();
        assert_eq!(engine.end_config_group().unwrap_err().return_code(), ReturnCode::Error);
        let f = engine.get_global_function_by_index(0).unwrap();
        assert_eq!(f.get_config_group(), Some("extra"));
        engine.remove_config_group("extra").unwrap();
        assert_eq!(engine.get_global_function_count(), 0);
    }

    #[test]
    fn namespaces_scope_registrations() {
        let engine = Engine::create();
        assert!(engine.set_default_namespace("bad::").is_err());
        engine.set_default_namespace("game").unwrap();
        engine.register_enum("Color").unwrap();
        engine.register_enum_value("Color", "Red", 1).unwrap();
        engine.set_default_namespace("").unwrap();
        assert!(engine.get_type_info_by_name("Color").is_none());
        let color = engine.get_type_info_by_name("game::Color").unwrap();
        assert_eq!(color.get_enum_value_by_index(0), Some(("Red".to_string(), 1)));
        assert_eq!(engine.get_size_of_primitive_type(color.get_type_id()).unwrap(), 4);
    }

    #[test]
    fn module_table() {
        let engine = Engine::create();
        assert_eq!(
            engine.get_module("a", GetModuleFlags::OnlyIfExists).unwrap_err().return_code(),
            ReturnCode::NoModule
        );
        let a = engine.get_module("a", GetModuleFlags::CreateIfNotExists).unwrap();
        let again = engine.get_module("a", GetModuleFlags::CreateIfNotExists).unwrap();
        assert!(a.ptr_eq(&again));
        let fresh = engine.get_module("a", GetModuleFlags::AlwaysCreate).unwrap();
        assert!(!a.ptr_eq(&fresh));
        assert_eq!(engine.get_module_count(), 1);
        engine.discard_module("a").unwrap();
        assert_eq!(engine.get_module_count(), 0);
    }

    #[test]
    fn context_pool_reuses_contexts() {
        let engine = Engine::create();
        let ctx = engine.request_context().unwrap();
        let pooled = ctx.clone();
        engine.return_context(ctx).unwrap();
        let again = engine.request_context().unwrap();
        assert!(again.ptr_eq(&pooled));

        let requested = Arc::new(AtomicUsize::new(0));
        let counter = requested.clone();
        engine
            .set_context_callbacks(
                move |engine: &Engine| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    engine.create_context().ok()
                },
                |_: &Engine, _ctx: Context| {},
            )
            .unwrap();
        let ctx = engine.request_context().unwrap();
        engine.return_context(ctx).unwrap();
        assert_eq!(requested.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn functions_are_found_by_id() {
        let engine = Engine::create();
        let f = engine.register_global_function("void ping()", |_| {}).unwrap();
        assert_eq!(engine.get_last_function_id(), f.get_id());
        assert_eq!(engine.get_function_by_id(f.get_id()), Some(f.clone()));
        assert!(!f.is_read_only());
    }

    #[test]
    fn string_factory_registers_the_string_type() {
        let engine = Engine::create();
        assert!(engine.get_string_factory_return_type_id().is_err());
        engine.register_default_string_factory().unwrap();
        let (type_id, _) = engine.get_string_factory_return_type_id().unwrap();
        let string_type = engine.get_type_info_by_id(type_id).unwrap();
        assert!(string_type.is_string_type());
        assert!(string_type.get_method_by_name("length", false).is_some());
        assert_eq!(
            engine.register_default_string_factory().unwrap_err().return_code(),
            ReturnCode::AlreadyRegistered
        );
    }
}
