use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use parking_lot::RwLock;

use angelscript_core::{FunctionType, ReturnCode, TypeModifiers};

use crate::core::engine::{Engine, EngineData};
use crate::core::module::{Module, ModuleData};
use crate::core::script_object::ScriptObject;
use crate::core::typeinfo::{TypeInfo, TypeInfoData};
use crate::types::callbacks::GenericFn;
use crate::types::data_type::DataType;
use crate::types::user_data::{UserData, UserDataValue, UserDataStore};
use crate::vm::script_code::ScriptCode;

bitflags! {
    /// Declaration traits of a function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FunctionFlags: u32 {
        /// `const` method.
        const READ_ONLY = 1 << 0;
        const PRIVATE = 1 << 1;
        const PROTECTED = 1 << 2;
        const FINAL = 1 << 3;
        const OVERRIDE = 1 << 4;
        const SHARED = 1 << 5;
        const EXPLICIT = 1 << 6;
        const PROPERTY = 1 << 7;
        const CONSTRUCTOR = 1 << 8;
        const ABSTRACT = 1 << 9;
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub data_type: DataType,
    pub modifiers: TypeModifiers,
    pub name: Option<String>,
    /// Source text of the default argument.
    pub default_text: Option<String>,
}

impl ParamInfo {
    pub fn type_id(&self) -> i32 {
        self.data_type.type_id()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Signature {
    pub(crate) return_type: DataType,
    pub(crate) return_is_ref: bool,
    pub(crate) params: Vec<ParamInfo>,
    pub(crate) is_const: bool,
}

impl Signature {
    pub(crate) fn new(return_type: DataType) -> Self {
        Self {
            return_type,
            return_is_ref: false,
            params: Vec::new(),
            is_const: false,
        }
    }

    /// Same parameter types, return type and constness.
    pub(crate) fn matches(&self, other: &Signature) -> bool {
        self.is_const == other.is_const && self.return_type == other.return_type && self.same_params(other)
    }

    pub(crate) fn same_params(&self, other: &Signature) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.data_type == b.data_type && a.modifiers == b.modifiers)
    }
}

pub(crate) enum FunctionBody {
    /// Compiled script code. `None` once the owning module is discarded.
    Script(RwLock<Option<Arc<ScriptCode>>>),
    /// Host function using the generic calling convention.
    Native(GenericFn),
    /// Interface method, resolved against the object at call time.
    Interface,
    /// Signature of a funcdef; never callable.
    Funcdef,
    /// Import bound at runtime to a function of another module.
    Imported(RwLock<Option<Function>>),
    Delegate { object: ScriptObject, method: Function },
}

pub(crate) struct FunctionData {
    pub(crate) engine: Weak<EngineData>,
    pub(crate) id: i32,
    pub(crate) func_type: FunctionType,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) object_type: Weak<TypeInfoData>,
    pub(crate) object_name: Option<String>,
    pub(crate) module: Weak<ModuleData>,
    pub(crate) module_name: Option<String>,
    pub(crate) signature: Signature,
    pub(crate) flags: FunctionFlags,
    pub(crate) access_mask: u32,
    pub(crate) config_group: Option<String>,
    pub(crate) section: Option<String>,
    /// Line and column of the declaration.
    pub(crate) declared_at: (i32, i32),
    pub(crate) body: FunctionBody,
    pub(crate) auxiliary: Option<UserDataValue>,
    pub(crate) user_data: UserDataStore,
}

impl FunctionData {
    /// A public, ungrouped function of `engine` with no module or object
    /// type. The id is assigned when the engine tracks it.
    pub(crate) fn new(
        engine: &Engine,
        func_type: FunctionType,
        name: impl Into<String>,
        signature: Signature,
        body: FunctionBody,
    ) -> Self {
        Self {
            engine: Arc::downgrade(&engine.0),
            id: 0,
            func_type,
            name: name.into(),
            namespace: String::new(),
            object_type: Weak::new(),
            object_name: None,
            module: Weak::new(),
            module_name: None,
            signature,
            flags: FunctionFlags::empty(),
            access_mask: u32::MAX,
            config_group: None,
            section: None,
            declared_at: (0, 0),
            body,
            auxiliary: None,
            user_data: UserDataStore::new(),
        }
    }

    pub(crate) fn set_object_type(&mut self, object_type: &TypeInfo) {
        self.object_type = object_type.downgrade();
        self.object_name = Some(object_type.get_name().to_string());
    }

    pub(crate) fn set_module(&mut self, module: &Module) {
        self.module = Arc::downgrade(&module.0);
        self.module_name = Some(module.get_name());
    }
}

impl Drop for FunctionData {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.forget_function(self.id);
        }
    }
}

/// A callable: script function, registered function, method, interface
/// method, funcdef signature, import or delegate.
#[derive(Clone)]
pub struct Function(pub(crate) Arc<FunctionData>);

impl Function {
    pub(crate) fn new(data: FunctionData) -> Self {
        Function(Arc::new(data))
    }

    pub fn get_engine(&self) -> Option<Engine> {
        self.0.engine.upgrade().map(Engine)
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn get_id(&self) -> i32 {
        self.0.id
    }

    pub fn get_func_type(&self) -> FunctionType {
        self.0.func_type
    }

    pub fn get_module_name(&self) -> Option<&str> {
        self.0.module_name.as_deref()
    }

    pub fn get_module(&self) -> Option<Module> {
        self.0.module.upgrade().map(Module)
    }

    pub fn get_script_section_name(&self) -> Option<&str> {
        self.0.section.as_deref()
    }

    pub fn get_config_group(&self) -> Option<&str> {
        self.0.config_group.as_deref()
    }

    pub fn get_access_mask(&self) -> u32 {
        self.0.access_mask
    }

    /// Host value attached at registration.
    pub fn get_auxiliary(&self) -> Option<UserDataValue> {
        self.0.auxiliary.clone()
    }

    pub fn get_object_type(&self) -> Option<TypeInfo> {
        self.0.object_type.upgrade().map(TypeInfo)
    }

    pub fn get_object_name(&self) -> Option<&str> {
        self.0.object_name.as_deref()
    }

    pub fn get_name(&self) -> &str {
        &self.0.name
    }

    pub fn get_namespace(&self) -> &str {
        &self.0.namespace
    }

    pub fn get_declaration(
        &self,
        include_object_name: bool,
        include_namespace: bool,
        include_param_names: bool,
    ) -> String {
        let sig = &self.0.signature;
        let mut decl = String::new();
        let is_ctor = self.0.flags.contains(FunctionFlags::CONSTRUCTOR);
        if !is_ctor {
            decl.push_str(&sig.return_type.declaration(include_namespace));
            if sig.return_is_ref {
                decl.push('&');
            }
            decl.push(' ');
        }
        if include_namespace && !self.0.namespace.is_empty() {
            decl.push_str(&self.0.namespace);
            decl.push_str("::");
        }
        if include_object_name {
            if let Some(object) = &self.0.object_name {
                decl.push_str(object);
                decl.push_str("::");
            }
        }
        decl.push_str(&self.0.name);
        decl.push('(');
        for (i, param) in sig.params.iter().enumerate() {
            if i > 0 {
                decl.push_str(", ");
            }
            decl.push_str(&param.data_type.declaration(include_namespace));
            if param.modifiers.contains(TypeModifiers::INOUTREF) {
                decl.push_str(" &inout");
            } else if param.modifiers.contains(TypeModifiers::OUTREF) {
                decl.push_str(" &out");
            } else if param.modifiers.contains(TypeModifiers::INREF) {
                decl.push_str(" &in");
            }
            if include_param_names {
                if let Some(name) = &param.name {
                    decl.push(' ');
                    decl.push_str(name);
                }
            }
            if let Some(default) = &param.default_text {
                decl.push_str(" = ");
                decl.push_str(default);
            }
        }
        decl.push(')');
        if sig.is_const {
            decl.push_str(" const");
        }
        decl
    }

    pub fn is_read_only(&self) -> bool {
        self.0.flags.contains(FunctionFlags::READ_ONLY)
    }

    pub fn is_private(&self) -> bool {
        self.0.flags.contains(FunctionFlags::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.0.flags.contains(FunctionFlags::PROTECTED)
    }

    pub fn is_final(&self) -> bool {
        self.0.flags.contains(FunctionFlags::FINAL)
    }

    pub fn is_override(&self) -> bool {
        self.0.flags.contains(FunctionFlags::OVERRIDE)
    }

    pub fn is_shared(&self) -> bool {
        self.0.flags.contains(FunctionFlags::SHARED)
    }

    pub fn is_explicit(&self) -> bool {
        self.0.flags.contains(FunctionFlags::EXPLICIT)
    }

    pub fn is_property(&self) -> bool {
        self.0.flags.contains(FunctionFlags::PROPERTY)
    }

    pub fn get_param_count(&self) -> u32 {
        self.0.signature.params.len() as u32
    }

    pub fn get_param(&self, index: u32) -> Option<ParamInfo> {
        self.0.signature.params.get(index as usize).cloned()
    }

    pub fn get_return_type_id(&self) -> (i32, TypeModifiers) {
        let sig = &self.0.signature;
        let mut modifiers = TypeModifiers::empty();
        if sig.return_type.is_const {
            modifiers |= TypeModifiers::CONST;
        }
        if sig.return_is_ref {
            modifiers |= TypeModifiers::INOUTREF;
        }
        (sig.return_type.type_id(), modifiers)
    }

    /// Type id of the funcdef this function is the signature of, or 0.
    pub fn get_type_id(&self) -> i32 {
        if self.0.func_type != FunctionType::Funcdef {
            return 0;
        }
        self.get_engine()
            .and_then(|e| e.funcdef_for_signature(self))
            .map_or(0, |t| t.get_type_id())
    }

    /// Whether a handle of this function can be stored in a variable of the
    /// funcdef `type_id`.
    pub fn is_compatible_with_type_id(&self, type_id: i32) -> bool {
        let Some(engine) = self.get_engine() else {
            return false;
        };
        let Some(funcdef) = engine.get_type_info_by_id(type_id) else {
            return false;
        };
        match funcdef.get_funcdef_signature() {
            Some(sig) => self.is_compatible_with(&sig),
            None => false,
        }
    }

    /// Same parameter and return types as `signature`. Delegates compare
    /// through their method.
    pub(crate) fn is_compatible_with(&self, signature: &Function) -> bool {
        let own = match &self.0.body {
            FunctionBody::Delegate { method, .. } => &method.0.signature,
            _ => &self.0.signature,
        };
        let other = &signature.0.signature;
        own.return_type == other.return_type && own.same_params(other)
    }

    pub fn get_delegate_object(&self) -> Option<ScriptObject> {
        match &self.0.body {
            FunctionBody::Delegate { object, .. } => Some(object.clone()),
            _ => None,
        }
    }

    pub fn get_delegate_object_type(&self) -> Option<TypeInfo> {
        self.get_delegate_object().map(|o| o.get_object_type())
    }

    pub fn get_delegate_function(&self) -> Option<Function> {
        match &self.0.body {
            FunctionBody::Delegate { method, .. } => Some(method.clone()),
            _ => None,
        }
    }

    /// Number of local variables, parameters included.
    pub fn get_var_count(&self) -> u32 {
        self.script_code().map_or(0, |code| code.locals.len() as u32)
    }

    /// Name and type id of a local variable.
    pub fn get_var(&self, index: u32) -> Option<(String, i32)> {
        let code = self.script_code()?;
        let var = code.locals.get(index as usize)?;
        Some((var.name.clone(), var.data_type.type_id()))
    }

    pub fn get_var_decl(&self, index: u32, include_namespace: bool) -> Option<String> {
        let code = self.script_code()?;
        let var = code.locals.get(index as usize)?;
        Some(format!("{} {}", var.data_type.declaration(include_namespace), var.name))
    }

    /// First line at or after `line` that has code, or an error code.
    pub fn find_next_line_with_code(&self, line: i32) -> i32 {
        let Some(code) = self.script_code() else {
            return ReturnCode::Error.code();
        };
        code.lines
            .iter()
            .map(|entry| entry.line)
            .filter(|&l| l >= line)
            .min()
            .unwrap_or(ReturnCode::Error.code())
    }

    /// Number of instructions in the compiled body.
    pub fn get_byte_code_length(&self) -> usize {
        self.script_code().map_or(0, |code| code.instructions.len())
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

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const FunctionData {
        Arc::as_ptr(&self.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<FunctionData> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn signature(&self) -> &Signature {
        &self.0.signature
    }

    pub(crate) fn body(&self) -> &FunctionBody {
        &self.0.body
    }

    pub(crate) fn is_constructor(&self) -> bool {
        self.0.flags.contains(FunctionFlags::CONSTRUCTOR)
    }

    pub(crate) fn script_code(&self) -> Option<Arc<ScriptCode>> {
        match &self.0.body {
            FunctionBody::Script(code) => code.read().clone(),
            _ => None,
        }
    }

    pub(crate) fn set_script_code(&self, code: Option<Arc<ScriptCode>>) {
        if let FunctionBody::Script(slot) = &self.0.body {
            let old = std::mem::replace(&mut *slot.write(), code);
            drop(old);
        }
    }

    /// Function an import is currently bound to.
    pub(crate) fn import_binding(&self) -> Option<Function> {
        match &self.0.body {
            FunctionBody::Imported(binding) => binding.read().clone(),
            _ => None,
        }
    }

    pub(crate) fn set_import_binding(&self, target: Option<Function>) {
        if let FunctionBody::Imported(binding) = &self.0.body {
            let old = std::mem::replace(&mut *binding.write(), target);
            drop(old);
        }
    }

    pub(crate) fn declared_line(&self) -> (i32, i32) {
        self.0.declared_at
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Function {}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.0.id)
            .field("decl", &self.get_declaration(true, true, false))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angelscript_core::PrimitiveKind;

    fn native(name: &str, params: &[(PrimitiveKind, &str)], ret: PrimitiveKind) -> Function {
        let mut signature = Signature::new(DataType::primitive(ret));
        signature.params = params
            .iter()
            .map(|(kind, name)| ParamInfo {
                data_type: DataType::primitive(*kind),
                modifiers: TypeModifiers::empty(),
                name: Some((*name).to_string()),
                default_text: None,
            })
            .collect();
        Function::new(FunctionData {
            engine: Weak::new(),
            id: 1,
            func_type: FunctionType::System,
            name: name.into(),
            namespace: "math".into(),
            object_type: Weak::new(),
            object_name: None,
            module: Weak::new(),
            module_name: None,
            signature,
            flags: FunctionFlags::empty(),
            access_mask: 1,
            config_group: None,
            section: None,
            declared_at: (0, 0),
            body: FunctionBody::Native(Arc::new(|_| {})),
            auxiliary: None,
            user_data: UserDataStore::new(),
        })
    }

    #[test]
    fn declaration_toggles() {
        let f = native("add", &[(PrimitiveKind::Int32, "a"), (PrimitiveKind::Double, "b")], PrimitiveKind::Int64);
        assert_eq!(f.get_declaration(false, false, false), "int64 add(int, double)");
        assert_eq!(f.get_declaration(true, true, true), "int64 math::add(int a, double b)");
    }

    #[test]
    fn params_and_return() {
        let f = native("neg", &[(PrimitiveKind::Float, "x")], PrimitiveKind::Float);
        assert_eq!(f.get_param_count(), 1);
        assert_eq!(f.get_param(0).map(|p| p.type_id()), Some(PrimitiveKind::Float.type_id()));
        assert!(f.get_param(1).is_none());
        assert_eq!(f.get_return_type_id().0, PrimitiveKind::Float.type_id());
        assert_eq!(f.get_var_count(), 0);
        assert!(f.get_delegate_object().is_none());
    }

    #[test]
    fn compatibility_ignores_names() {
        let a = native("a", &[(PrimitiveKind::Int32, "x")], PrimitiveKind::Void);
        let b = native("b", &[(PrimitiveKind::Int32, "y")], PrimitiveKind::Void);
        let c = native("c", &[(PrimitiveKind::Int64, "y")], PrimitiveKind::Void);
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }
}
