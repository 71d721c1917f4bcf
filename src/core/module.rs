use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use bumpalo::Bump;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;

use angelscript_core::{
    CompileFlags, ContextState, MessageType, ReturnCode, ScriptError, ScriptResult,
};
use angelscript_parser::ast::Parser;

use crate::compiler::builder::{self, BuildOutcome};
use crate::compiler::bytecode_io::{self, BinaryStream, SavedSection};
use crate::compiler::declaration::{find_by_decl, split_qualified, TypeScope};
use crate::core::context::Context;
use crate::core::engine::{Engine, EngineData};
use crate::core::function::Function;
use crate::core::typeinfo::TypeInfo;
use crate::types::callbacks::MessageInfo;
use crate::types::data_type::DataType;
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::{ScriptString, Value};
use crate::types::user_data::{UserData, UserDataStore, UserDataValue};

/// A script section waiting to be built.
#[derive(Debug, Clone)]
pub(crate) struct ScriptSection {
    pub(crate) name: String,
    pub(crate) code: String,
    pub(crate) line_offset: i32,
}

impl From<&ScriptSection> for SavedSection {
    fn from(section: &ScriptSection) -> Self {
        SavedSection {
            name: section.name.clone(),
            code: section.code.clone(),
            line_offset: section.line_offset,
        }
    }
}

/// A global variable declared by a script.
#[derive(Clone)]
pub(crate) struct ModuleGlobal {
    pub(crate) name: String,
    pub(crate) namespace: String,
    /// Unqualified; constness is kept in `is_const`.
    pub(crate) data_type: DataType,
    pub(crate) is_const: bool,
    pub(crate) slot: Arc<GlobalSlot>,
    /// Evaluates the initialiser and stores it in the slot.
    pub(crate) init: Option<Function>,
}

impl ModuleGlobal {
    pub(crate) fn declaration(&self, include_namespace: bool) -> String {
        let mut decl = String::new();
        if self.is_const {
            decl.push_str("const ");
        }
        decl.push_str(&self.data_type.declaration(include_namespace));
        decl.push(' ');
        if include_namespace && !self.namespace.is_empty() {
            decl.push_str(&self.namespace);
            decl.push_str("::");
        }
        decl.push_str(&self.name);
        decl
    }
}

#[derive(Clone)]
pub(crate) struct ImportEntry {
    pub(crate) function: Function,
    pub(crate) source_module: String,
}

/// Everything a build produced.
#[derive(Clone, Default)]
pub(crate) struct ModuleContents {
    pub(crate) functions: Vec<Function>,
    pub(crate) globals: Vec<ModuleGlobal>,
    /// Script classes and interfaces.
    pub(crate) classes: Vec<TypeInfo>,
    pub(crate) enums: Vec<TypeInfo>,
    /// Includes funcdefs declared inside classes.
    pub(crate) funcdefs: Vec<TypeInfo>,
    pub(crate) typedefs: Vec<TypeInfo>,
    pub(crate) imports: Vec<ImportEntry>,
    /// Methods, constructors, initialisers and funcdef signatures.
    pub(crate) owned: Vec<Function>,
    /// Constants obtained from the string factory.
    pub(crate) strings: Vec<ScriptString>,
    pub(crate) used_groups: FxHashSet<String>,
    pub(crate) sources: Vec<ScriptSection>,
}

impl ModuleContents {
    pub(crate) fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.classes
            .iter()
            .chain(&self.enums)
            .chain(&self.funcdefs)
            .chain(&self.typedefs)
    }

    /// Break the reference cycles between the contents and drop them.
    pub(crate) fn release(self, engine: Option<&Engine>) {
        for ty in self.types() {
            ty.clear_details();
        }
        for function in self.functions.iter().chain(&self.owned) {
            function.set_script_code(None);
        }
        for import in &self.imports {
            import.function.set_import_binding(None);
        }
        let old_values: Vec<Value> = self
            .globals
            .iter()
            .map(|g| g.slot.replace(Value::default_for(&g.data_type)))
            .collect();
        drop(old_values);
        if let Some(factory) = engine.and_then(Engine::get_string_factory) {
            for constant in &self.strings {
                let _ = factory.release_string_constant(constant);
            }
        }
        drop(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleState {
    Unbuilt,
    Built,
    Discarded,
}

pub(crate) struct ModuleData {
    engine: Weak<EngineData>,
    name: RwLock<String>,
    sections: Mutex<Vec<ScriptSection>>,
    contents: RwLock<ModuleContents>,
    state: Mutex<ModuleState>,
    building: AtomicBool,
    access_mask: AtomicU32,
    default_namespace: RwLock<String>,
    user_data: UserDataStore,
}

/// Public description of a script global, see
/// [`Module::get_global_var`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVarInfo {
    pub name: String,
    pub namespace: String,
    pub type_id: i32,
    pub is_const: bool,
}

/// A named compilation unit: script sections go in, functions, globals and
/// types come out of [`build`](Module::build).
#[derive(Clone)]
pub struct Module(pub(crate) Arc<ModuleData>);

impl Module {
    pub(crate) fn new(engine: &Engine, name: &str) -> Module {
        Module(Arc::new(ModuleData {
            engine: Arc::downgrade(&engine.0),
            name: RwLock::new(name.to_string()),
            sections: Mutex::new(Vec::new()),
            contents: RwLock::new(ModuleContents::default()),
            state: Mutex::new(ModuleState::Unbuilt),
            building: AtomicBool::new(false),
            access_mask: AtomicU32::new(1),
            default_namespace: RwLock::new(String::new()),
            user_data: UserDataStore::new(),
        }))
    }

    pub fn get_engine(&self) -> Option<Engine> {
        self.0.engine.upgrade().map(Engine)
    }

    fn engine(&self) -> ScriptResult<Engine> {
        self.get_engine().ok_or_else(|| ReturnCode::Error.into())
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn get_name(&self) -> String {
        self.0.name.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.0.name.write() = name.to_string();
    }

    pub(crate) fn state(&self) -> ModuleState {
        *self.0.state.lock()
    }

    pub fn ptr_eq(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Remove the module from the engine and release everything it
    /// compiled. Functions obtained from it can no longer be prepared.
    pub fn discard(&self) {
        let engine = self.get_engine();
        if let Some(engine) = &engine {
            engine.remove_module(self);
        }
        self.discard_contents();
        self.0.sections.lock().clear();
        *self.0.state.lock() = ModuleState::Discarded;
        tracing::debug!(module = %self.get_name(), "module discarded");
    }

    pub(crate) fn discard_contents(&self) {
        let contents = std::mem::take(&mut *self.0.contents.write());
        contents.release(self.get_engine().as_ref());
    }

    pub(crate) fn types(&self) -> Vec<TypeInfo> {
        self.0.contents.read().types().cloned().collect()
    }

    pub(crate) fn uses_config_group(&self, group: &str) -> bool {
        self.0.contents.read().used_groups.contains(group)
    }

    // Compilation

    /// Queue a section for the next [`build`](Self::build). `line_offset` is
    /// added to every line reported for the section.
    pub fn add_script_section(&self, name: &str, code: &str, line_offset: i32) -> ScriptResult<()> {
        if self.state() == ModuleState::Discarded {
            return Err(ReturnCode::Error.into());
        }
        if self.0.building.load(Ordering::Acquire) {
            return Err(ReturnCode::BuildInProgress.into());
        }
        self.0.sections.lock().push(ScriptSection {
            name: name.to_string(),
            code: code.to_string(),
            line_offset,
        });
        Ok(())
    }

    /// Compile the queued sections, replacing whatever the module held.
    ///
    /// Diagnostics go to the engine's message callback. When the engine
    /// property `InitGlobalVarsAfterBuild` is set, global variables are
    /// initialised before this returns.
    pub fn build(&self) -> ScriptResult<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Module::build");

        if self.state() == ModuleState::Discarded {
            return Err(ReturnCode::Error.into());
        }
        let engine = self.engine()?;
        if self.0.building.swap(true, Ordering::AcqRel) {
            return Err(ReturnCode::BuildInProgress.into());
        }
        let result = self.build_sections(&engine);
        self.0.building.store(false, Ordering::Release);
        result
    }

    fn build_sections(&self, engine: &Engine) -> ScriptResult<()> {
        let sections = std::mem::take(&mut *self.0.sections.lock());
        self.discard_contents();
        *self.0.state.lock() = ModuleState::Unbuilt;

        let name = self.get_name();
        tracing::info!(module = %name, sections = sections.len(), "building module");
        let outcome = builder::build_module(engine, self, &sections);
        self.report(engine, &outcome.messages);
        let BuildOutcome { contents, errors, .. } = outcome;
        let Some(mut contents) = contents else {
            tracing::warn!(module = %name, errors = errors.len(), "build failed");
            return Err(ScriptError::Build(errors));
        };
        contents.sources = sections;
        let globals = contents.globals.clone();
        *self.0.contents.write() = contents;
        *self.0.state.lock() = ModuleState::Built;
        tracing::info!(module = %name, "build succeeded");

        if engine.flag(angelscript_core::EngineProperty::InitGlobalVarsAfterBuild) {
            self.run_initializers(engine, &globals, None)?;
        }
        Ok(())
    }

    fn report(&self, engine: &Engine, messages: &[MessageInfo]) {
        for message in messages {
            match message.msg_type {
                MessageType::Error => tracing::error!(
                    section = %message.section, row = message.row, col = message.col, "{}", message.message
                ),
                MessageType::Warning => tracing::warn!(
                    section = %message.section, row = message.row, col = message.col, "{}", message.message
                ),
                MessageType::Information => tracing::debug!(
                    section = %message.section, row = message.row, col = message.col, "{}", message.message
                ),
            }
            engine.report(message.clone());
        }
    }

    /// Compile a single function against the module's current contents.
    /// With [`CompileFlags::ADD_TO_MODULE`] the function also becomes part
    /// of the module.
    pub fn compile_function(
        &self,
        section_name: &str,
        code: &str,
        line_offset: i32,
        flags: CompileFlags,
    ) -> ScriptResult<Function> {
        let engine = self.engine()?;
        if self.0.building.swap(true, Ordering::AcqRel) {
            return Err(ReturnCode::BuildInProgress.into());
        }
        let section = ScriptSection {
            name: section_name.to_string(),
            code: code.to_string(),
            line_offset,
        };
        let base = self.0.contents.read().clone();
        let outcome = builder::compile_function(&engine, self, base, &section, flags.contains(CompileFlags::ADD_TO_MODULE));
        self.report(&engine, &outcome.messages);
        let result = match (outcome.contents, outcome.function) {
            (Some(contents), Some(function)) => {
                *self.0.contents.write() = contents;
                Ok(function)
            }
            _ if outcome.errors.is_empty() => Err(ReturnCode::InvalidArg.into()),
            _ => Err(ScriptError::Build(outcome.errors)),
        };
        self.0.building.store(false, Ordering::Release);
        result
    }

    /// Declare and initialise global variables from `code`.
    pub fn compile_global_var(&self, section_name: &str, code: &str, line_offset: i32) -> ScriptResult<()> {
        let engine = self.engine()?;
        if self.0.building.swap(true, Ordering::AcqRel) {
            return Err(ReturnCode::BuildInProgress.into());
        }
        let section = ScriptSection {
            name: section_name.to_string(),
            code: code.to_string(),
            line_offset,
        };
        let base = self.0.contents.read().clone();
        let known = base.globals.len();
        let outcome = builder::compile_global_var(&engine, self, base, &section);
        self.report(&engine, &outcome.messages);
        let result = match outcome.contents {
            Some(contents) => {
                let added = contents.globals[known..].to_vec();
                *self.0.contents.write() = contents;
                self.run_initializers(&engine, &added, None)
            }
            None if outcome.errors.is_empty() => Err(ReturnCode::InvalidArg.into()),
            None => Err(ScriptError::Build(outcome.errors)),
        };
        self.0.building.store(false, Ordering::Release);
        result
    }

    fn run_initializers(&self, engine: &Engine, globals: &[ModuleGlobal], ctx: Option<&Context>) -> ScriptResult<()> {
        let owned;
        let ctx = match ctx {
            Some(ctx) => ctx,
            None => {
                owned = engine.create_context()?;
                &owned
            }
        };
        for global in globals {
            let Some(init) = &global.init else {
                continue;
            };
            ctx.prepare(init)?;
            let state = ctx.execute()?;
            if state != ContextState::Finished {
                let reason = ctx.get_exception_string().unwrap_or_else(|| format!("{state:?}"));
                let message = format!("Failed to initialize global variable '{}': {reason}", global.name);
                let section = init.get_script_section_name().unwrap_or_default().to_string();
                let (row, col) = init.declared_line();
                engine.report(MessageInfo::new(&section, row, col, MessageType::Error, &message));
                tracing::error!(module = %self.get_name(), "{message}");
                let _ = ctx.unprepare();
                return Err(ReturnCode::InitGlobalVarsFailed.into());
            }
        }
        ctx.unprepare()
    }

    // Namespaces

    pub fn set_default_namespace(&self, namespace: &str) -> ScriptResult<()> {
        if !crate::compiler::declaration::is_namespace(namespace) {
            return Err(ReturnCode::InvalidArg.into());
        }
        *self.0.default_namespace.write() = namespace.strip_prefix("::").unwrap_or(namespace).to_string();
        Ok(())
    }

    pub fn get_default_namespace(&self) -> String {
        self.0.default_namespace.read().clone()
    }

    fn qualify<'n>(&self, name: &'n str) -> (String, &'n str) {
        if name.contains("::") {
            let (namespace, name) = split_qualified(name);
            (namespace.to_string(), name)
        } else {
            (self.get_default_namespace(), name)
        }
    }

    // Functions

    pub fn get_function_count(&self) -> u32 {
        self.0.contents.read().functions.len() as u32
    }

    pub fn get_function_by_index(&self, index: u32) -> Option<Function> {
        self.0.contents.read().functions.get(index as usize).cloned()
    }

    /// Function in the default namespace declared as `declaration`.
    pub fn get_function_by_decl(&self, declaration: &str) -> Option<Function> {
        let engine = self.get_engine()?;
        let namespace = self.get_default_namespace();
        let functions: Vec<Function> = self
            .0
            .contents
            .read()
            .functions
            .iter()
            .filter(|f| f.get_namespace() == namespace)
            .cloned()
            .collect();
        find_by_decl(&engine, Some(self), &functions, declaration, None)
    }

    /// The only function called `name`, or `None` when there is none or the
    /// name is overloaded.
    pub fn get_function_by_name(&self, name: &str) -> Option<Function> {
        let (namespace, name) = self.qualify(name);
        let contents = self.0.contents.read();
        let mut found = contents
            .functions
            .iter()
            .filter(|f| f.get_name() == name && f.get_namespace() == namespace);
        let first = found.next()?.clone();
        if found.next().is_some() { None } else { Some(first) }
    }

    /// Take `function` out of the module. Code already compiled against it
    /// keeps working.
    pub fn remove_function(&self, function: &Function) -> ScriptResult<()> {
        let removed = {
            let mut contents = self.0.contents.write();
            let index = contents
                .functions
                .iter()
                .position(|f| f.ptr_eq(function))
                .ok_or(ReturnCode::NoFunction)?;
            let removed = contents.functions.remove(index);
            contents.owned.push(removed.clone());
            removed
        };
        drop(removed);
        Ok(())
    }

    // Global variables

    /// Reset every global to its initial value. Runs on `ctx` when given.
    pub fn reset_global_vars(&self, ctx: Option<&Context>) -> ScriptResult<()> {
        let engine = self.engine()?;
        let globals = self.0.contents.read().globals.clone();
        let old: Vec<Value> = globals
            .iter()
            .map(|g| g.slot.replace(Value::default_for(&g.data_type)))
            .collect();
        drop(old);
        self.run_initializers(&engine, &globals, ctx)
    }

    pub fn get_global_var_count(&self) -> u32 {
        self.0.contents.read().globals.len() as u32
    }

    pub fn get_global_var_index_by_name(&self, name: &str) -> ScriptResult<u32> {
        let (namespace, name) = self.qualify(name);
        self.0
            .contents
            .read()
            .globals
            .iter()
            .position(|g| g.name == name && g.namespace == namespace)
            .map(|i| i as u32)
            .ok_or_else(|| ReturnCode::NoGlobalVar.into())
    }

    pub fn get_global_var_index_by_decl(&self, declaration: &str) -> ScriptResult<u32> {
        let engine = self.engine()?;
        let arena = Bump::new();
        let (ty, name) = Parser::parse_property_declaration(declaration, &arena)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        let types = engine.visible_types(Some(self));
        let namespace = self.get_default_namespace();
        let data_type = TypeScope::new(&types, &namespace)
            .resolve(&ty)
            .map_err(|_| ReturnCode::InvalidDeclaration)?;
        self.0
            .contents
            .read()
            .globals
            .iter()
            .position(|g| {
                g.name == name.name
                    && g.namespace == namespace
                    && g.data_type == data_type.unqualified()
                    && g.is_const == data_type.is_const
            })
            .map(|i| i as u32)
            .ok_or_else(|| ReturnCode::NoGlobalVar.into())
    }

    pub fn get_global_var_declaration(&self, index: u32, include_namespace: bool) -> Option<String> {
        let contents = self.0.contents.read();
        contents.globals.get(index as usize).map(|g| g.declaration(include_namespace))
    }

    pub fn get_global_var(&self, index: u32) -> Option<GlobalVarInfo> {
        let contents = self.0.contents.read();
        let global = contents.globals.get(index as usize)?;
        Some(GlobalVarInfo {
            name: global.name.clone(),
            namespace: global.namespace.clone(),
            type_id: global.data_type.type_id(),
            is_const: global.is_const,
        })
    }

    pub fn get_global_var_value(&self, index: u32) -> Option<Value> {
        let slot = self.0.contents.read().globals.get(index as usize)?.slot.clone();
        Some(slot.get())
    }

    /// Store `value`, converted to the variable's type.
    pub fn set_global_var_value(&self, index: u32, value: Value) -> ScriptResult<()> {
        let (slot, data_type) = {
            let contents = self.0.contents.read();
            let global = contents.globals.get(index as usize).ok_or(ReturnCode::InvalidArg)?;
            (global.slot.clone(), global.data_type.clone())
        };
        let value = value.coerce(&data_type).ok_or(ReturnCode::InvalidType)?;
        let old = slot.replace(value);
        drop(old);
        Ok(())
    }

    pub(crate) fn get_address_of_global_var(&self, index: u32) -> *mut c_void {
        let contents = self.0.contents.read();
        contents
            .globals
            .get(index as usize)
            .map_or(std::ptr::null_mut(), |g| g.slot.address())
    }

    /// Remove a global. Code compiled against it keeps its storage.
    pub fn remove_global_var(&self, index: u32) -> ScriptResult<()> {
        let removed = {
            let mut contents = self.0.contents.write();
            if index as usize >= contents.globals.len() {
                return Err(ReturnCode::InvalidArg.into());
            }
            contents.globals.remove(index as usize)
        };
        drop(removed);
        Ok(())
    }

    // Types

    /// Script classes and interfaces.
    pub fn get_object_type_count(&self) -> u32 {
        self.0.contents.read().classes.len() as u32
    }

    pub fn get_object_type_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.contents.read().classes.get(index as usize).cloned()
    }

    pub fn get_type_id_by_decl(&self, declaration: &str) -> ScriptResult<i32> {
        let engine = self.engine()?;
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration(declaration, &arena).map_err(|_| ReturnCode::InvalidDeclaration)?;
        let types = engine.visible_types(Some(self));
        let namespace = self.get_default_namespace();
        let data_type = TypeScope::new(&types, &namespace)
            .resolve(&ty)
            .map_err(|_| ReturnCode::InvalidType)?;
        Ok(data_type.type_id())
    }

    /// Type declared by this module, in the default namespace unless `name`
    /// is qualified.
    pub fn get_type_info_by_name(&self, name: &str) -> Option<TypeInfo> {
        let (namespace, name) = self.qualify(name);
        self.0
            .contents
            .read()
            .types()
            .find(|t| t.get_name() == name && t.get_namespace() == namespace && t.get_parent_type().is_none())
            .cloned()
    }

    pub fn get_type_info_by_decl(&self, declaration: &str) -> Option<TypeInfo> {
        let type_id = self.get_type_id_by_decl(declaration).ok()?;
        self.get_engine()?.get_type_info_by_id(type_id)
    }

    pub fn get_enum_count(&self) -> u32 {
        self.0.contents.read().enums.len() as u32
    }

    pub fn get_enum_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.contents.read().enums.get(index as usize).cloned()
    }

    pub fn get_typedef_count(&self) -> u32 {
        self.0.contents.read().typedefs.len() as u32
    }

    pub fn get_typedef_by_index(&self, index: u32) -> Option<TypeInfo> {
        self.0.contents.read().typedefs.get(index as usize).cloned()
    }

    // Imports

    pub fn get_imported_function_count(&self) -> u32 {
        self.0.contents.read().imports.len() as u32
    }

    pub fn get_imported_function_index_by_decl(&self, declaration: &str) -> ScriptResult<u32> {
        let engine = self.engine()?;
        let imports: Vec<Function> = self.0.contents.read().imports.iter().map(|i| i.function.clone()).collect();
        let found = find_by_decl(&engine, Some(self), &imports, declaration, None).ok_or(ReturnCode::NoFunction)?;
        imports
            .iter()
            .position(|f| f.ptr_eq(&found))
            .map(|i| i as u32)
            .ok_or_else(|| ReturnCode::NoFunction.into())
    }

    pub fn get_imported_function_declaration(&self, index: u32) -> Option<String> {
        let contents = self.0.contents.read();
        let import = contents.imports.get(index as usize)?;
        Some(import.function.get_declaration(false, true, false))
    }

    pub fn get_imported_function_source_module(&self, index: u32) -> Option<String> {
        let contents = self.0.contents.read();
        contents.imports.get(index as usize).map(|i| i.source_module.clone())
    }

    /// Bind import `index` to `function`, which must have the same
    /// signature.
    pub fn bind_imported_function(&self, index: u32, function: &Function) -> ScriptResult<()> {
        let import = self
            .0
            .contents
            .read()
            .imports
            .get(index as usize)
            .map(|i| i.function.clone())
            .ok_or(ReturnCode::NoFunction)?;
        if !import.signature().matches(function.signature()) || function.get_object_type().is_some() {
            return Err(ReturnCode::InvalidInterface.into());
        }
        import.set_import_binding(Some(function.clone()));
        Ok(())
    }

    pub fn unbind_imported_function(&self, index: u32) -> ScriptResult<()> {
        let contents = self.0.contents.read();
        let import = contents.imports.get(index as usize).ok_or(ReturnCode::InvalidArg)?;
        import.function.set_import_binding(None);
        Ok(())
    }

    /// Bind every import to the function of the same declaration in its
    /// source module.
    pub fn bind_all_imported_functions(&self) -> ScriptResult<()> {
        let engine = self.engine()?;
        let imports = self.0.contents.read().imports.clone();
        let mut all_bound = true;
        for (index, import) in imports.iter().enumerate() {
            let declaration = import.function.get_declaration(false, true, false);
            let target = engine
                .get_module(&import.source_module, angelscript_core::GetModuleFlags::OnlyIfExists)
                .ok()
                .and_then(|source| source.get_function_by_decl(&declaration));
            match target {
                Some(target) if self.bind_imported_function(index as u32, &target).is_ok() => {}
                _ => {
                    tracing::debug!(import = %declaration, source = %import.source_module, "import left unbound");
                    all_bound = false;
                }
            }
        }
        if all_bound { Ok(()) } else { Err(ReturnCode::CantBindAllFunctions.into()) }
    }

    pub fn unbind_all_imported_functions(&self) -> ScriptResult<()> {
        for import in &self.0.contents.read().imports {
            import.function.set_import_binding(None);
        }
        Ok(())
    }

    // Byte code

    /// Write the module's sections to `stream`.
    pub fn save_byte_code(&self, stream: &mut dyn BinaryStream, strip_debug_info: bool) -> ScriptResult<()> {
        if self.state() != ModuleState::Built {
            return Err(ReturnCode::Error.into());
        }
        let sections: Vec<SavedSection> = self.0.contents.read().sources.iter().map(SavedSection::from).collect();
        bytecode_io::write_module(stream, &sections, strip_debug_info)
    }

    /// Rebuild the module from a stream written by
    /// [`save_byte_code`](Self::save_byte_code). Returns whether debug
    /// information was stripped when saving.
    pub fn load_byte_code(&self, stream: &mut dyn BinaryStream) -> ScriptResult<bool> {
        let (sections, stripped) = bytecode_io::read_module(stream)?;
        if self.0.building.load(Ordering::Acquire) {
            return Err(ReturnCode::BuildInProgress.into());
        }
        {
            let mut queued = self.0.sections.lock();
            queued.clear();
            queued.extend(sections.into_iter().map(|s| ScriptSection {
                name: s.name,
                code: s.code,
                line_offset: s.line_offset,
            }));
        }
        self.build()?;
        Ok(stripped)
    }

    // Access and user data

    /// Which registered entities the module may use. Returns the previous
    /// mask.
    pub fn set_access_mask(&self, mask: u32) -> u32 {
        self.0.access_mask.swap(mask, Ordering::AcqRel)
    }

    pub fn get_access_mask(&self) -> u32 {
        self.0.access_mask.load(Ordering::Acquire)
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
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Module {}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.get_name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode_io::MemoryStream;
    use crate::prelude::*;

    fn module(engine: &Engine, code: &str) -> Module {
        let module = engine.get_module("m", GetModuleFlags::AlwaysCreate).unwrap();
        module.add_script_section("m", code, 0).unwrap();
        module.build().unwrap();
        module
    }

    #[test]
    fn globals_are_initialised_after_build() {
        let engine = Engine::create();
        let module = module(&engine, "int a = 6 * 7;\nconst double half = 0.5;\nnamespace ns { int b = a + 1; }");
        assert_eq!(module.get_global_var_count(), 3);
        assert_eq!(module.get_global_var_value(0), Some(Value::Int32(42)));
        let b = module.get_global_var_index_by_name("ns::b").unwrap();
        assert_eq!(module.get_global_var_value(b), Some(Value::Int32(43)));
        assert_eq!(module.get_global_var_declaration(1, false).as_deref(), Some("const double half"));
        assert_eq!(module.get_global_var_index_by_decl("const double half").unwrap(), 1);

        module.set_global_var_value(0, Value::Int64(1)).unwrap();
        assert_eq!(module.get_global_var_value(0), Some(Value::Int32(1)));
        module.reset_global_vars(None).unwrap();
        assert_eq!(module.get_global_var_value(0), Some(Value::Int32(42)));
    }

    #[test]
    fn failed_build_reports_and_leaves_module_empty() {
        let engine = Engine::create();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        engine
            .set_message_callback(move |info: &MessageInfo| sink.lock().push(info.clone()))
            .unwrap();
        let module = engine.get_module("bad", GetModuleFlags::AlwaysCreate).unwrap();
        module.add_script_section("bad", "void f() {\n  undefined();\n}", 10).unwrap();
        let err = module.build().unwrap_err();
        assert!(matches!(err, ScriptError::Build(_)));
        assert_eq!(module.get_function_count(), 0);
        let messages = messages.lock();
        let error = messages.iter().find(|m| m.msg_type == MessageType::Error).unwrap();
        assert_eq!(error.section, "bad");
        assert_eq!(error.row, 12);
    }

    #[test]
    fn discard_invalidates_functions() {
        let engine = Engine::create();
        let module = module(&engine, "int f() { return 1; }");
        let f = module.get_function_by_decl("int f()").unwrap();
        module.discard();
        let ctx = engine.create_context().unwrap();
        assert_eq!(ctx.prepare(&f).unwrap_err().return_code(), ReturnCode::NoFunction);
        assert!(module.add_script_section("x", "", 0).is_err());
    }

    #[test]
    fn compiled_functions_can_join_the_module() {
        let engine = Engine::create();
        let module = module(&engine, "int base = 5;");
        let f = module
            .compile_function("extra", "int twice() { return base * 2; }", 0, CompileFlags::empty())
            .unwrap();
        assert_eq!(module.get_function_count(), 0);
        let ctx = engine.create_context().unwrap();
        ctx.prepare(&f).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(ctx.get_return_dword(), 10);

        module
            .compile_function("extra", "int thrice() { return base * 3; }", 0, CompileFlags::ADD_TO_MODULE)
            .unwrap();
        assert!(module.get_function_by_name("thrice").is_some());

        module.compile_global_var("vars", "int extra = base + 1;", 0).unwrap();
        let index = module.get_global_var_index_by_name("extra").unwrap();
        assert_eq!(module.get_global_var_value(index), Some(Value::Int32(6)));
    }

    #[test]
    fn imports_bind_to_source_module() {
        let engine = Engine::create();
        module(&engine, "int answer() { return 42; }");
        let user = engine.get_module("user", GetModuleFlags::AlwaysCreate).unwrap();
        user.add_script_section("user", "import int answer() from \"m\";\nint ask() { return answer(); }", 0)
            .unwrap();
        user.build().unwrap();
        assert_eq!(user.get_imported_function_count(), 1);
        assert_eq!(user.get_imported_function_source_module(0).as_deref(), Some("m"));
        assert_eq!(user.get_imported_function_index_by_decl("int answer()").unwrap(), 0);

        let ctx = engine.create_context().unwrap();
        let ask = user.get_function_by_name("ask").unwrap();
        ctx.prepare(&ask).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Exception);

        user.bind_all_imported_functions().unwrap();
        ctx.prepare(&ask).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        assert_eq!(ctx.get_return_dword(), 42);
    }

    #[test]
    fn byte_code_round_trip_rebuilds() {
        let engine = Engine::create();
        let source = module(&engine, "int f() { return 7; }");
        let mut stream = MemoryStream::new();
        source.save_byte_code(&mut stream, false).unwrap();

        let copy = engine.get_module("copy", GetModuleFlags::AlwaysCreate).unwrap();
        stream.rewind();
        assert!(!copy.load_byte_code(&mut stream).unwrap());
        assert!(copy.get_function_by_decl("int f()").is_some());
    }

    #[test]
    fn access_mask_hides_registered_functions() {
        let engine = Engine::create();
        engine.set_default_access_mask(2);
        engine.register_global_function("void secret()", |_| {}).unwrap();
        let module = engine.get_module("m", GetModuleFlags::AlwaysCreate).unwrap();
        module.add_script_section("m", "void f() { secret(); }", 0).unwrap();
        assert!(module.build().is_err());
        assert_eq!(module.set_access_mask(3), 1);
        module.add_script_section("m", "void f() { secret(); }", 0).unwrap();
        module.build().unwrap();
    }
}
