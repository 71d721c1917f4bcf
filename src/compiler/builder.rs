//! Turns script sections into module contents.
//!
//! Every named type is created before any declaration is resolved, so
//! declarations may refer to types that appear later in the module. Then
//! signatures, class layouts and globals are resolved, and finally every
//! body is compiled. A failed build leaves nothing behind: new types and
//! functions are cleared and string constants are returned to the factory.

use std::sync::Arc;

use bumpalo::Bump;

use angelscript_core::{
    CompilationError, EngineProperty, FunctionType, MessageType, ObjectTypeFlags, Span, TypeIdFlags,
    TypeModifiers,
};
use angelscript_parser::ast::{
    Block, ClassDecl, ClassMember, EnumDecl, FuncdefDecl, FunctionDecl, GlobalVarDecl, Ident, ImportDecl,
    InterfaceDecl, Item, Parser, QualifiedName, Script, TypeBase, TypeExpr, TypedefDecl, VarInit, Visibility,
};

use crate::compiler::const_eval::eval_int;
use crate::compiler::declaration::{function_flags, join_namespace};
use crate::compiler::function_compiler::{CompileEnv, CompiledBody, FunctionCompiler};
use crate::compiler::stmt::FieldInit;
use crate::core::engine::Engine;
use crate::core::function::{Function, FunctionBody, FunctionData, FunctionFlags, Signature};
use crate::core::module::{ImportEntry, Module, ModuleContents, ModuleGlobal, ScriptSection};
use crate::core::typeinfo::{PropertyInfo, TypeInfo, TypeInfoData, TypeKind};
use crate::types::callbacks::MessageInfo;
use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::{ScriptString, Value};
use crate::vm::instruction::Instr;

/// Result of a build. `contents` is `None` when the build failed or the
/// input was rejected; in the latter case `errors` is empty.
pub(crate) struct BuildOutcome {
    pub(crate) contents: Option<ModuleContents>,
    pub(crate) function: Option<Function>,
    pub(crate) errors: Vec<CompilationError>,
    pub(crate) messages: Vec<MessageInfo>,
}

impl BuildOutcome {
    fn rejected(messages: Vec<MessageInfo>) -> Self {
        Self {
            contents: None,
            function: None,
            errors: Vec::new(),
            messages,
        }
    }
}

/// Build `sections` into fresh module contents.
pub(crate) fn build_module(engine: &Engine, module: &Module, sections: &[ScriptSection]) -> BuildOutcome {
    #[cfg(feature = "profiling")]
    profiling::scope!("builder::build_module");

    let arena = Bump::new();
    let mut builder = Builder::new(engine, module, &arena, ModuleContents::default());
    for section in sections {
        if let Some((index, script)) = builder.parse_section(section) {
            builder.collect(index, "", script.items);
        }
    }
    builder.resolve_declarations();
    builder.finish(None)
}

/// Compile the single function in `section` on top of `base`. Unless
/// `add_to_module` is set the function is kept alive by the module but not
/// listed among its functions.
pub(crate) fn compile_function(
    engine: &Engine,
    module: &Module,
    base: ModuleContents,
    section: &ScriptSection,
    add_to_module: bool,
) -> BuildOutcome {
    let arena = Bump::new();
    let mut builder = Builder::new(engine, module, &arena, base);
    let Some((index, script)) = builder.parse_section(section) else {
        return builder.finish(None);
    };
    let [Item::Function(decl)] = script.items else {
        return BuildOutcome::rejected(builder.messages);
    };
    builder.refresh_types();
    let namespace = module.get_default_namespace();
    let function = builder.declare_function(index, &namespace, decl, add_to_module);
    builder.finish(function)
}

/// Add the global variables declared in `section` to `base`.
pub(crate) fn compile_global_var(
    engine: &Engine,
    module: &Module,
    base: ModuleContents,
    section: &ScriptSection,
) -> BuildOutcome {
    let arena = Bump::new();
    let mut builder = Builder::new(engine, module, &arena, base);
    let Some((index, script)) = builder.parse_section(section) else {
        return builder.finish(None);
    };
    if script.items.is_empty() || !script.items.iter().all(|item| matches!(item, Item::GlobalVar(_))) {
        return BuildOutcome::rejected(builder.messages);
    }
    builder.refresh_types();
    let namespace = module.get_default_namespace();
    for item in script.items {
        if let Item::GlobalVar(decl) = item {
            builder.declare_global(index, &namespace, decl);
        }
    }
    builder.finish(None)
}

struct SectionInfo {
    name: String,
    line_offset: i32,
}

/// A declaration waiting for the next phase.
struct Located<'ast, T> {
    section: usize,
    namespace: String,
    decl: &'ast T,
}

/// A type declaration and the type created for it.
struct Declared<'ast, T> {
    section: usize,
    namespace: String,
    decl: &'ast T,
    info: TypeInfo,
    /// Class a funcdef was declared in.
    owner: Option<TypeInfo>,
}

enum BodyKind<'ast> {
    Function {
        body: &'ast Block<'ast>,
        span: Span,
    },
    /// A declared constructor, or the default one when `body` is `None`.
    Constructor {
        body: Option<&'ast Block<'ast>>,
        span: Span,
    },
    GlobalInit {
        slot: Arc<GlobalSlot>,
        ty: DataType,
        init: Option<VarInit<'ast>>,
        span: Span,
    },
}

struct PendingBody<'ast> {
    function: Function,
    class: Option<TypeInfo>,
    section: usize,
    kind: BodyKind<'ast>,
}

/// Whether a property of type `ty` can keep another object alive.
fn holds_references(ty: &DataType) -> bool {
    match &ty.kind {
        DataTypeKind::Object(info) => {
            !info.is_string_type() && (ty.is_handle || info.is_script_class() || info.is_garbage_collected())
        }
        DataTypeKind::Funcdef(_) => true,
        _ => false,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

fn visit(i: usize, deps: &[Vec<usize>], marks: &mut [Mark], order: &mut Vec<usize>) -> bool {
    match marks[i] {
        Mark::Done => return order.contains(&i),
        Mark::Active => return false,
        Mark::New => {}
    }
    marks[i] = Mark::Active;
    let mut acyclic = true;
    for &dep in &deps[i] {
        acyclic &= visit(dep, deps, marks, order);
    }
    marks[i] = Mark::Done;
    if acyclic {
        order.push(i);
    }
    acyclic
}

/// Indices ordered so that each comes after everything it depends on,
/// followed by the indices that are on or behind a dependency cycle.
fn dependency_order(deps: &[Vec<usize>]) -> (Vec<usize>, Vec<usize>) {
    let mut marks = vec![Mark::New; deps.len()];
    let mut order = Vec::with_capacity(deps.len());
    for i in 0..deps.len() {
        visit(i, deps, &mut marks, &mut order);
    }
    let cyclic = (0..deps.len()).filter(|i| !order.contains(i)).collect();
    (order, cyclic)
}

struct Builder<'e, 'ast> {
    engine: &'e Engine,
    module: &'e Module,
    arena: &'ast Bump,
    env: CompileEnv,
    registered_types: Vec<TypeInfo>,
    disallow_globals: bool,
    contents: ModuleContents,
    sections: Vec<SectionInfo>,

    classes: Vec<Declared<'ast, ClassDecl<'ast>>>,
    interfaces: Vec<Declared<'ast, InterfaceDecl<'ast>>>,
    enums: Vec<Declared<'ast, EnumDecl<'ast>>>,
    funcdefs: Vec<Declared<'ast, FuncdefDecl<'ast>>>,
    typedefs: Vec<Declared<'ast, TypedefDecl<'ast>>>,
    functions: Vec<Located<'ast, FunctionDecl<'ast>>>,
    imports: Vec<Located<'ast, ImportDecl<'ast>>>,
    globals: Vec<Located<'ast, GlobalVarDecl<'ast>>>,

    bodies: Vec<PendingBody<'ast>>,
    field_inits: Vec<(TypeInfo, Vec<FieldInit<'ast>>)>,
    new_types: Vec<TypeInfo>,
    new_functions: Vec<Function>,
    errors: Vec<CompilationError>,
    messages: Vec<MessageInfo>,
}

impl<'e, 'ast> Builder<'e, 'ast> {
    fn new(engine: &'e Engine, module: &'e Module, arena: &'ast Bump, contents: ModuleContents) -> Self {
        let require_enum_scope = engine.flag(EngineProperty::RequireEnumScope);
        let line_cues = !engine.flag(EngineProperty::BuildWithoutLineCues);
        let disallow_globals = engine.flag(EngineProperty::DisallowGlobalVars);
        let registry = engine.0.registry.read();
        let registered_types: Vec<TypeInfo> = registry.all_types().cloned().collect();
        let env = CompileEnv {
            types: contents.types().chain(&registered_types).cloned().collect(),
            functions: registry.functions.clone(),
            properties: registry.properties.clone(),
            string_factory: registry.string_factory.clone(),
            string_type: registry.string_type.clone(),
            access_mask: module.get_access_mask(),
            require_enum_scope,
            line_cues,
        };
        drop(registry);
        Self {
            engine,
            module,
            arena,
            env,
            registered_types,
            disallow_globals,
            contents,
            sections: Vec::new(),
            classes: Vec::new(),
            interfaces: Vec::new(),
            enums: Vec::new(),
            funcdefs: Vec::new(),
            typedefs: Vec::new(),
            functions: Vec::new(),
            imports: Vec::new(),
            globals: Vec::new(),
            bodies: Vec::new(),
            field_inits: Vec::new(),
            new_types: Vec::new(),
            new_functions: Vec::new(),
            errors: Vec::new(),
            messages: Vec::new(),
        }
    }

    // Diagnostics

    fn fail(&mut self, section: usize, error: CompilationError) {
        let span = error.span();
        let info = &self.sections[section];
        self.messages.push(MessageInfo::new(
            &info.name,
            span.line as i32 + info.line_offset,
            span.col as i32,
            MessageType::Error,
            error.to_string(),
        ));
        self.errors.push(error);
    }

    fn parse_section(&mut self, section: &ScriptSection) -> Option<(usize, Script<'ast>)> {
        let index = self.sections.len();
        self.sections.push(SectionInfo {
            name: section.name.clone(),
            line_offset: section.line_offset,
        });
        match Parser::parse(&section.code, self.arena) {
            Ok(script) => Some((index, script)),
            Err(errors) => {
                tracing::debug!(section = %section.name, errors = errors.len(), "parse failed");
                for error in errors {
                    self.fail(index, error.into());
                }
                None
            }
        }
    }

    // Phase 1: collect declarations and create the named types

    fn collect(&mut self, section: usize, namespace: &str, items: &'ast [Item<'ast>]) {
        for item in items {
            match item {
                Item::Namespace(decl) => {
                    let path: Vec<&str> = decl.path.iter().map(|ident| ident.name).collect();
                    let inner = join_namespace(namespace, &path.join("::"));
                    self.collect(section, &inner, decl.items);
                }
                Item::Class(decl) => self.declare_class(section, namespace, decl),
                Item::Interface(decl) => {
                    let flags = ObjectTypeFlags::REF | ObjectTypeFlags::SCRIPT_OBJECT | ObjectTypeFlags::ABSTRACT;
                    let size = std::mem::size_of::<usize>() as u32;
                    if let Some(info) =
                        self.new_type(section, namespace, decl.name, TypeKind::Interface, flags, TypeIdFlags::SCRIPTOBJECT, size, None)
                    {
                        self.contents.classes.push(info.clone());
                        self.interfaces.push(Declared { section, namespace: namespace.to_string(), decl, info, owner: None });
                    }
                }
                Item::Enum(decl) => {
                    if let Some(info) =
                        self.new_type(section, namespace, decl.name, TypeKind::Enum, ObjectTypeFlags::ENUM, TypeIdFlags::empty(), 4, None)
                    {
                        self.contents.enums.push(info.clone());
                        self.enums.push(Declared { section, namespace: namespace.to_string(), decl, info, owner: None });
                    }
                }
                Item::Funcdef(decl) => self.declare_funcdef(section, namespace, decl, None),
                Item::Typedef(decl) => {
                    let size = match decl.target.base {
                        TypeBase::Primitive(kind) => kind.size(),
                        _ => 0,
                    };
                    if let Some(info) =
                        self.new_type(section, namespace, decl.name, TypeKind::Typedef, ObjectTypeFlags::TYPEDEF, TypeIdFlags::empty(), size, None)
                    {
                        self.contents.typedefs.push(info.clone());
                        self.typedefs.push(Declared { section, namespace: namespace.to_string(), decl, info, owner: None });
                    }
                }
                Item::Function(decl) => self.functions.push(Located { section, namespace: namespace.to_string(), decl }),
                Item::Import(decl) => self.imports.push(Located { section, namespace: namespace.to_string(), decl }),
                Item::GlobalVar(decl) => self.globals.push(Located { section, namespace: namespace.to_string(), decl }),
            }
        }
    }

    fn name_taken(&self, namespace: &str, name: &str) -> bool {
        self.env
            .types
            .iter()
            .chain(&self.new_types)
            .any(|t| t.get_name() == name && t.get_namespace() == namespace && t.get_parent_type().is_none())
    }

    #[allow(clippy::too_many_arguments)]
    fn new_type(
        &mut self,
        section: usize,
        namespace: &str,
        name: Ident<'_>,
        kind: TypeKind,
        flags: ObjectTypeFlags,
        id_flags: TypeIdFlags,
        size: u32,
        owner: Option<&TypeInfo>,
    ) -> Option<TypeInfo> {
        let taken = match owner {
            Some(owner) => owner.details().read().child_funcdefs.iter().any(|f| f.get_name() == name.name),
            None => self.name_taken(namespace, name.name),
        };
        if taken {
            self.fail(section, CompilationError::DuplicateDefinition { name: name.name.to_string(), span: name.span });
            return None;
        }
        let mut data = TypeInfoData::new(self.engine, kind, name.name, namespace);
        data.size = size;
        data.module = Arc::downgrade(&self.module.0);
        {
            let details = data.details.get_mut();
            details.flags = flags;
            if let Some(owner) = owner {
                details.parent = owner.downgrade();
            }
        }
        let info = self.engine.new_type(data, id_flags);
        if let Some(owner) = owner {
            owner.details().write().child_funcdefs.push(info.clone());
        }
        self.new_types.push(info.clone());
        Some(info)
    }

    fn declare_class(&mut self, section: usize, namespace: &str, decl: &'ast ClassDecl<'ast>) {
        let mut flags = ObjectTypeFlags::REF | ObjectTypeFlags::SCRIPT_OBJECT;
        flags.set(ObjectTypeFlags::ABSTRACT, decl.modifiers.is_abstract);
        flags.set(ObjectTypeFlags::NOINHERIT, decl.modifiers.is_final);
        flags.set(ObjectTypeFlags::SHARED, decl.modifiers.is_shared);
        let size = std::mem::size_of::<usize>() as u32;
        let Some(info) = self.new_type(section, namespace, decl.name, TypeKind::Class, flags, TypeIdFlags::SCRIPTOBJECT, size, None)
        else {
            return;
        };
        self.contents.classes.push(info.clone());
        for member in decl.members {
            if let ClassMember::Funcdef(funcdef) = member {
                self.declare_funcdef(section, namespace, funcdef, Some(&info));
            }
        }
        self.classes.push(Declared { section, namespace: namespace.to_string(), decl, info, owner: None });
    }

    fn declare_funcdef(&mut self, section: usize, namespace: &str, decl: &'ast FuncdefDecl<'ast>, owner: Option<&TypeInfo>) {
        let flags = ObjectTypeFlags::FUNCDEF | ObjectTypeFlags::REF;
        let size = std::mem::size_of::<usize>() as u32;
        if let Some(info) = self.new_type(section, namespace, decl.name, TypeKind::Funcdef, flags, TypeIdFlags::APPOBJECT, size, owner)
        {
            self.contents.funcdefs.push(info.clone());
            self.funcdefs.push(Declared {
                section,
                namespace: namespace.to_string(),
                decl,
                info,
                owner: owner.cloned(),
            });
        }
    }

    /// Make the types created so far visible to name resolution.
    fn refresh_types(&mut self) {
        self.env.types = self.contents.types().chain(&self.registered_types).cloned().collect();
    }

    // Resolution helpers

    fn note_type(&mut self, ty: &DataType) {
        if let Some(group) = ty.type_info().and_then(TypeInfo::get_config_group) {
            self.contents.used_groups.insert(group.to_string());
        }
    }

    fn resolve(&mut self, section: usize, namespace: &str, class: Option<&TypeInfo>, ty: &TypeExpr<'_>) -> Option<DataType> {
        let result = self.env.type_scope(namespace, class).resolve(ty);
        match result {
            Ok(data_type) => {
                self.note_type(&data_type);
                Some(data_type)
            }
            Err(error) => {
                self.fail(section, error);
                None
            }
        }
    }

    fn find_type(&mut self, section: usize, namespace: &str, name: &QualifiedName<'_>) -> Option<TypeInfo> {
        let found = self.env.type_scope(namespace, None).find(name.scope.as_ref(), name.ident.name);
        if found.is_none() {
            self.fail(section, CompilationError::UnknownType { name: name.to_string(), span: name.span() });
        }
        found
    }

    fn signature(&mut self, section: usize, namespace: &str, class: Option<&TypeInfo>, decl: &FunctionDecl<'_>) -> Option<Signature> {
        let result = self.env.type_scope(namespace, class).signature(decl);
        let signature = match result {
            Ok(signature) => signature,
            Err(error) => {
                self.fail(section, error);
                return None;
            }
        };
        if signature.params.iter().any(|p| p.modifiers.contains(TypeModifiers::OUTREF)) {
            self.fail(section, CompilationError::invalid(decl.span, "Output parameters are not supported"));
            return None;
        }
        let types: Vec<DataType> = std::iter::once(signature.return_type.clone())
            .chain(signature.params.iter().map(|p| p.data_type.clone()))
            .collect();
        for ty in &types {
            self.note_type(ty);
        }
        Some(signature)
    }

    #[allow(clippy::too_many_arguments)]
    fn new_function(
        &mut self,
        section: usize,
        namespace: &str,
        func_type: FunctionType,
        name: &str,
        signature: Signature,
        body: FunctionBody,
        flags: FunctionFlags,
        object_type: Option<&TypeInfo>,
        span: Span,
    ) -> Function {
        let info = &self.sections[section];
        let mut data = FunctionData::new(self.engine, func_type, name, signature, body);
        data.namespace = namespace.to_string();
        data.flags = flags;
        data.set_module(self.module);
        data.section = Some(info.name.clone());
        data.declared_at = (span.line as i32 + info.line_offset, span.col as i32);
        if let Some(object_type) = object_type {
            data.set_object_type(object_type);
        }
        let function = self.engine.new_function(data);
        self.new_functions.push(function.clone());
        function
    }

    fn script_function(
        &mut self,
        section: usize,
        namespace: &str,
        name: &str,
        signature: Signature,
        flags: FunctionFlags,
        object_type: Option<&TypeInfo>,
        span: Span,
    ) -> Function {
        let body = FunctionBody::Script(Default::default());
        self.new_function(section, namespace, FunctionType::Script, name, signature, body, flags, object_type, span)
    }

    // Phases 2 to 6

    fn resolve_declarations(&mut self) {
        self.refresh_types();
        self.resolve_typedefs();
        self.resolve_funcdefs();
        self.resolve_enums();
        self.resolve_interfaces();
        self.resolve_classes();

        let functions = std::mem::take(&mut self.functions);
        for located in &functions {
            self.declare_function(located.section, &located.namespace, located.decl, true);
        }
        let imports = std::mem::take(&mut self.imports);
        for located in &imports {
            self.declare_import(located);
        }
        let globals = std::mem::take(&mut self.globals);
        for located in &globals {
            self.declare_global(located.section, &located.namespace, located.decl);
        }
        tracing::debug!(
            types = self.new_types.len(),
            functions = self.new_functions.len(),
            errors = self.errors.len(),
            "declarations resolved"
        );
    }

    fn resolve_typedefs(&mut self) {
        let typedefs = std::mem::take(&mut self.typedefs);
        for declared in &typedefs {
            let Some(target) = self.resolve(declared.section, &declared.namespace, None, &declared.decl.target) else {
                continue;
            };
            if !target.is_primitive() || target.is_void() {
                self.fail(
                    declared.section,
                    CompilationError::invalid(
                        declared.decl.target.span,
                        format!("Typedef must refer to a primitive type, not '{target}'"),
                    ),
                );
                continue;
            }
            declared.info.details().write().typedef_target = Some(target.unqualified());
        }
        self.typedefs = typedefs;
    }

    fn resolve_funcdefs(&mut self) {
        let funcdefs = std::mem::take(&mut self.funcdefs);
        for declared in &funcdefs {
            let decl = declared.decl;
            let result: Result<Signature, CompilationError> = {
                let scope = self.env.type_scope(&declared.namespace, declared.owner.as_ref());
                scope.resolve(&decl.return_type.ty).and_then(|return_type| {
                    let mut signature = Signature::new(return_type);
                    signature.return_is_ref = decl.return_type.is_ref;
                    signature.params = scope.params(decl.params)?;
                    Ok(signature)
                })
            };
            let signature = match result {
                Ok(signature) => signature,
                Err(error) => {
                    self.fail(declared.section, error);
                    continue;
                }
            };
            let function = self.new_function(
                declared.section,
                &declared.namespace,
                FunctionType::Funcdef,
                decl.name.name,
                signature,
                FunctionBody::Funcdef,
                FunctionFlags::empty(),
                None,
                decl.span,
            );
            self.contents.owned.push(function.clone());
            declared.info.details().write().funcdef_signature = Some(function);
        }
        self.funcdefs = funcdefs;
    }

    fn resolve_enums(&mut self) {
        let enums = std::mem::take(&mut self.enums);
        for declared in &enums {
            let mut values: Vec<(String, i32)> = Vec::new();
            let mut next: i64 = 0;
            for entry in declared.decl.values {
                if values.iter().any(|(name, _)| name == entry.name.name) {
                    self.fail(
                        declared.section,
                        CompilationError::DuplicateDefinition { name: entry.name.name.to_string(), span: entry.name.span },
                    );
                    continue;
                }
                let value = match entry.value {
                    Some(expr) => {
                        // earlier values of the same enum are in scope
                        let lookup = |name: &QualifiedName<'_>| {
                            if name.scope.is_some() {
                                return None;
                            }
                            values.iter().find(|(n, _)| n == name.ident.name).map(|(_, v)| *v as i64)
                        };
                        match eval_int(expr, &lookup) {
                            Ok(value) => value,
                            Err(error) => {
                                self.fail(declared.section, error);
                                continue;
                            }
                        }
                    }
                    None => next,
                };
                values.push((entry.name.name.to_string(), value as i32));
                next = value + 1;
            }
            declared.info.details().write().enum_values = values;
        }
        self.enums = enums;
    }

    fn resolve_interfaces(&mut self) {
        let interfaces = std::mem::take(&mut self.interfaces);
        let mut bases: Vec<Vec<TypeInfo>> = Vec::with_capacity(interfaces.len());
        for declared in &interfaces {
            let mut found = Vec::new();
            for name in declared.decl.bases {
                let Some(base) = self.find_type(declared.section, &declared.namespace, name) else {
                    continue;
                };
                if base.is_interface() {
                    found.push(base);
                } else {
                    self.fail(
                        declared.section,
                        CompilationError::invalid(name.span(), format!("Interface can't inherit from '{}'", base.get_name())),
                    );
                }
            }
            bases.push(found);
        }
        let deps: Vec<Vec<usize>> = bases
            .iter()
            .map(|list| {
                list.iter()
                    .filter_map(|base| interfaces.iter().position(|d| d.info.ptr_eq(base)))
                    .collect()
            })
            .collect();
        let (order, cyclic) = dependency_order(&deps);
        for &i in &cyclic {
            let declared = &interfaces[i];
            self.fail(
                declared.section,
                CompilationError::invalid(
                    declared.decl.name.span,
                    format!("Circular inheritance involving '{}'", declared.info.get_name()),
                ),
            );
            bases[i].clear();
        }
        for &i in order.iter().chain(&cyclic) {
            self.lay_out_interface(&interfaces[i], &bases[i]);
        }
        self.interfaces = interfaces;
    }

    fn lay_out_interface(&mut self, declared: &Declared<'ast, InterfaceDecl<'ast>>, bases: &[TypeInfo]) {
        let info = &declared.info;
        let mut interfaces: Vec<TypeInfo> = Vec::new();
        let mut methods: Vec<Function> = Vec::new();
        for base in bases {
            let details = base.details().read();
            for inherited in std::iter::once(base).chain(&details.interfaces) {
                if !interfaces.iter().any(|i| i.ptr_eq(inherited)) {
                    interfaces.push(inherited.clone());
                }
            }
            for method in &details.methods {
                if !methods.iter().any(|m| m.get_name() == method.get_name() && m.signature().same_params(method.signature())) {
                    methods.push(method.clone());
                }
            }
        }
        for decl in declared.decl.methods {
            let Some(signature) = self.signature(declared.section, &declared.namespace, Some(info), decl) else {
                continue;
            };
            let duplicate = methods.iter().any(|m| {
                m.get_name() == decl.name.name
                    && m.signature().same_params(&signature)
                    && m.get_object_type().is_some_and(|owner| owner.ptr_eq(info))
            });
            if duplicate {
                self.fail(
                    declared.section,
                    CompilationError::DuplicateDefinition { name: decl.name.name.to_string(), span: decl.name.span },
                );
                continue;
            }
            let method = self.new_function(
                declared.section,
                &declared.namespace,
                FunctionType::Interface,
                decl.name.name,
                signature,
                FunctionBody::Interface,
                function_flags(&decl.modifiers, decl.is_const),
                Some(info),
                decl.span,
            );
            self.contents.owned.push(method.clone());
            methods.push(method);
        }
        let mut details = info.details().write();
        details.interfaces = interfaces;
        details.methods = methods;
    }

    fn resolve_classes(&mut self) {
        let classes = std::mem::take(&mut self.classes);
        let mut links: Vec<(Option<TypeInfo>, Vec<TypeInfo>)> = Vec::with_capacity(classes.len());
        for declared in &classes {
            let mut base: Option<TypeInfo> = None;
            let mut interfaces: Vec<TypeInfo> = Vec::new();
            for name in declared.decl.bases {
                let Some(found) = self.find_type(declared.section, &declared.namespace, name) else {
                    continue;
                };
                let problem = if found.is_interface() {
                    if !interfaces.iter().any(|i| i.ptr_eq(&found)) {
                        interfaces.push(found);
                    }
                    None
                } else if !found.is_script_class() {
                    Some(format!("Can't inherit from '{}'", found.get_name()))
                } else if base.is_some() {
                    Some("Can't inherit from more than one class".to_string())
                } else if found.get_flags().contains(ObjectTypeFlags::NOINHERIT) {
                    Some(format!("Can't inherit from class '{}' marked as final", found.get_name()))
                } else {
                    base = Some(found);
                    None
                };
                if let Some(message) = problem {
                    self.fail(declared.section, CompilationError::invalid(name.span(), message));
                }
            }
            links.push((base, interfaces));
        }
        let deps: Vec<Vec<usize>> = links
            .iter()
            .map(|(base, _)| {
                base.iter()
                    .filter_map(|base| classes.iter().position(|d| d.info.ptr_eq(base)))
                    .collect()
            })
            .collect();
        let (order, cyclic) = dependency_order(&deps);
        for &i in &cyclic {
            let declared = &classes[i];
            self.fail(
                declared.section,
                CompilationError::invalid(
                    declared.decl.name.span,
                    format!("Circular inheritance involving '{}'", declared.info.get_name()),
                ),
            );
            links[i].0 = None;
        }
        for &i in order.iter().chain(&cyclic) {
            let (base, interfaces) = &links[i];
            self.lay_out_class(&classes[i], base.as_ref(), interfaces);
        }
        self.classes = classes;
    }

    fn lay_out_class(&mut self, declared: &Declared<'ast, ClassDecl<'ast>>, base: Option<&TypeInfo>, listed: &[TypeInfo]) {
        let section = declared.section;
        let namespace = declared.namespace.as_str();
        let info = &declared.info;

        let mut flags = info.get_flags();
        let (mut properties, mut methods) = match base {
            Some(base) => {
                let details = base.details().read();
                if details.flags.contains(ObjectTypeFlags::GC) {
                    flags |= ObjectTypeFlags::GC;
                }
                (details.properties.clone(), details.methods.clone())
            }
            None => (Vec::new(), Vec::new()),
        };
        let mut interfaces: Vec<TypeInfo> = Vec::new();
        for listed in listed {
            let inherited = listed.details().read().interfaces.clone();
            for interface in std::iter::once(listed.clone()).chain(inherited) {
                if !interfaces.iter().any(|i| i.ptr_eq(&interface)) {
                    interfaces.push(interface);
                }
            }
        }

        let mut fields = Vec::new();
        let mut constructors: Vec<Function> = Vec::new();
        for member in declared.decl.members {
            match member {
                ClassMember::Field(field) => {
                    let Some(ty) = self.resolve(section, namespace, Some(info), &field.decl.ty) else {
                        continue;
                    };
                    for var in field.decl.vars {
                        if properties.iter().any(|p| p.name == var.name.name) {
                            self.fail(
                                section,
                                CompilationError::DuplicateDefinition { name: var.name.name.to_string(), span: var.name.span },
                            );
                            continue;
                        }
                        if holds_references(&ty) {
                            flags |= ObjectTypeFlags::GC;
                        }
                        let index = properties.len() as u32;
                        properties.push(PropertyInfo {
                            name: var.name.name.to_string(),
                            data_type: ty.clone(),
                            is_private: field.visibility == Visibility::Private,
                            is_protected: field.visibility == Visibility::Protected,
                            offset: index as i32,
                            is_reference: false,
                            access_mask: u32::MAX,
                        });
                        fields.push(FieldInit { index, ty: ty.clone(), init: var.init, span: var.span });
                    }
                }
                ClassMember::Method(decl) => {
                    if decl.is_destructor {
                        self.fail(section, CompilationError::invalid(decl.span, "Destructors are not supported"));
                        continue;
                    }
                    let Some(signature) = self.signature(section, namespace, Some(info), decl) else {
                        continue;
                    };
                    let Some(body) = decl.body.as_ref() else {
                        self.fail(section, CompilationError::other(decl.span, format!("Method '{}' has no body", decl.name.name)));
                        continue;
                    };
                    if decl.is_constructor() {
                        if decl.name.name != info.get_name() {
                            self.fail(
                                section,
                                CompilationError::other(decl.name.span, format!("Method '{}' needs a return type", decl.name.name)),
                            );
                            continue;
                        }
                        if constructors.iter().any(|c| c.signature().same_params(&signature)) {
                            self.fail(
                                section,
                                CompilationError::DuplicateDefinition { name: decl.name.name.to_string(), span: decl.name.span },
                            );
                            continue;
                        }
                        let flags = function_flags(&decl.modifiers, false) | FunctionFlags::CONSTRUCTOR;
                        let ctor = self.script_function(section, namespace, info.get_name(), signature, flags, Some(info), decl.span);
                        self.contents.owned.push(ctor.clone());
                        self.bodies.push(PendingBody {
                            function: ctor.clone(),
                            class: Some(info.clone()),
                            section,
                            kind: BodyKind::Constructor { body: Some(body), span: decl.span },
                        });
                        constructors.push(ctor);
                        continue;
                    }

                    let method_flags = function_flags(&decl.modifiers, decl.is_const);
                    let existing = methods
                        .iter()
                        .position(|m| m.get_name() == decl.name.name && m.signature().same_params(&signature));
                    match existing.map(|i| &methods[i]) {
                        Some(current) if current.get_object_type().is_some_and(|owner| owner.ptr_eq(info)) => {
                            self.fail(
                                section,
                                CompilationError::DuplicateDefinition { name: decl.name.name.to_string(), span: decl.name.span },
                            );
                            continue;
                        }
                        Some(current) if current.is_final() => {
                            self.fail(
                                section,
                                CompilationError::invalid(
                                    decl.name.span,
                                    format!("Method '{}' can't be overridden, it is final", decl.name.name),
                                ),
                            );
                            continue;
                        }
                        Some(_) => {}
                        None if method_flags.contains(FunctionFlags::OVERRIDE) => {
                            let in_interface = interfaces.iter().any(|interface| {
                                interface.details().read().methods.iter().any(|m| {
                                    m.get_name() == decl.name.name && m.signature().same_params(&signature)
                                })
                            });
                            if !in_interface {
                                self.fail(
                                    section,
                                    CompilationError::invalid(
                                        decl.name.span,
                                        format!("Method '{}' is marked as override but replaces nothing", decl.name.name),
                                    ),
                                );
                                continue;
                            }
                        }
                        None => {}
                    }
                    let method = self.script_function(section, namespace, decl.name.name, signature, method_flags, Some(info), decl.span);
                    self.contents.owned.push(method.clone());
                    self.bodies.push(PendingBody {
                        function: method.clone(),
                        class: Some(info.clone()),
                        section,
                        kind: BodyKind::Function { body, span: decl.span },
                    });
                    match existing {
                        Some(i) => methods[i] = method,
                        None => methods.push(method),
                    }
                }
                ClassMember::Funcdef(_) => {}
            }
        }

        if constructors.is_empty() {
            let ctor = self.script_function(
                section,
                namespace,
                info.get_name(),
                Signature::new(DataType::void()),
                FunctionFlags::CONSTRUCTOR,
                Some(info),
                declared.decl.span,
            );
            self.contents.owned.push(ctor.clone());
            self.bodies.push(PendingBody {
                function: ctor.clone(),
                class: Some(info.clone()),
                section,
                kind: BodyKind::Constructor { body: None, span: declared.decl.span },
            });
            constructors.push(ctor);
        }

        if !flags.contains(ObjectTypeFlags::ABSTRACT) {
            for interface in &interfaces {
                let required = interface.details().read().methods.clone();
                for wanted in required {
                    let implemented = methods.iter().any(|m| {
                        m.get_name() == wanted.get_name()
                            && m.signature().same_params(wanted.signature())
                            && m.signature().return_type == wanted.signature().return_type
                            && m.get_func_type() != FunctionType::Interface
                    });
                    if !implemented {
                        self.fail(
                            section,
                            CompilationError::other(
                                declared.decl.name.span,
                                format!(
                                    "Missing implementation of '{}'",
                                    wanted.get_declaration(true, false, false)
                                ),
                            ),
                        );
                    }
                }
            }
        }

        {
            let mut details = info.details().write();
            details.flags = flags;
            details.base = base.cloned();
            details.interfaces = interfaces;
            details.properties = properties;
            details.methods = methods;
            details.factories = constructors;
        }
        self.field_inits.push((info.clone(), fields));
    }

    fn declare_function(
        &mut self,
        section: usize,
        namespace: &str,
        decl: &'ast FunctionDecl<'ast>,
        add_to_module: bool,
    ) -> Option<Function> {
        if decl.is_constructor() || decl.is_destructor {
            self.fail(
                section,
                CompilationError::other(decl.name.span, format!("Function '{}' needs a return type", decl.name.name)),
            );
            return None;
        }
        let signature = self.signature(section, namespace, None, decl)?;
        let Some(body) = decl.body.as_ref() else {
            self.fail(section, CompilationError::other(decl.span, format!("Function '{}' has no body", decl.name.name)));
            return None;
        };
        if add_to_module {
            let duplicate = self.contents.functions.iter().any(|f| {
                f.get_name() == decl.name.name && f.get_namespace() == namespace && f.signature().same_params(&signature)
            });
            if duplicate {
                self.fail(
                    section,
                    CompilationError::DuplicateDefinition { name: decl.name.name.to_string(), span: decl.name.span },
                );
                return None;
            }
        }
        let flags = function_flags(&decl.modifiers, false);
        let function = self.script_function(section, namespace, decl.name.name, signature, flags, None, decl.span);
        if add_to_module {
            self.contents.functions.push(function.clone());
        } else {
            self.contents.owned.push(function.clone());
        }
        self.bodies.push(PendingBody {
            function: function.clone(),
            class: None,
            section,
            kind: BodyKind::Function { body, span: decl.span },
        });
        Some(function)
    }

    fn declare_import(&mut self, located: &Located<'ast, ImportDecl<'ast>>) {
        let decl = &located.decl.func;
        let Some(signature) = self.signature(located.section, &located.namespace, None, decl) else {
            return;
        };
        let function = self.new_function(
            located.section,
            &located.namespace,
            FunctionType::Imported,
            decl.name.name,
            signature,
            FunctionBody::Imported(Default::default()),
            function_flags(&decl.modifiers, false),
            None,
            decl.span,
        );
        self.contents.imports.push(ImportEntry {
            function,
            source_module: located.decl.module.to_string(),
        });
    }

    fn declare_global(&mut self, section: usize, namespace: &str, decl: &'ast GlobalVarDecl<'ast>) {
        if self.disallow_globals {
            self.fail(section, CompilationError::invalid(decl.span, "Global variables have been disallowed"));
            return;
        }
        if matches!(decl.decl.ty.base, TypeBase::Auto) {
            self.fail(section, CompilationError::other(decl.span, "'auto' is not supported for global variables"));
            return;
        }
        let Some(ty) = self.resolve(section, namespace, None, &decl.decl.ty) else {
            return;
        };
        for var in decl.decl.vars {
            let taken = self
                .contents
                .globals
                .iter()
                .any(|g| g.name == var.name.name && g.namespace == namespace);
            if taken {
                self.fail(
                    section,
                    CompilationError::DuplicateDefinition { name: var.name.name.to_string(), span: var.name.span },
                );
                continue;
            }
            if ty.is_const && var.init.is_none() {
                self.fail(
                    section,
                    CompilationError::other(var.span, format!("Constant '{}' must be initialised", var.name.name)),
                );
                continue;
            }
            let data_type = ty.unqualified();
            let slot = Arc::new(GlobalSlot::new(Value::default_for(&data_type)));
            let init = if var.init.is_some() || data_type.is_object_value() {
                let name = format!("$init_{}", var.name.name);
                let function = self.script_function(
                    section,
                    namespace,
                    &name,
                    Signature::new(DataType::void()),
                    FunctionFlags::empty(),
                    None,
                    var.span,
                );
                self.contents.owned.push(function.clone());
                self.bodies.push(PendingBody {
                    function: function.clone(),
                    class: None,
                    section,
                    kind: BodyKind::GlobalInit { slot: slot.clone(), ty: data_type.clone(), init: var.init, span: var.span },
                });
                Some(function)
            } else {
                None
            };
            self.contents.globals.push(ModuleGlobal {
                name: var.name.name.to_string(),
                namespace: namespace.to_string(),
                data_type,
                is_const: ty.is_const,
                slot,
                init,
            });
        }
    }

    // Phase 7: bodies

    fn compile_bodies(&self) -> Vec<(Function, usize, CompiledBody)> {
        self.bodies
            .iter()
            .map(|pending| {
                let section = &self.sections[pending.section];
                let mut compiler = FunctionCompiler::new(
                    &self.env,
                    &self.contents,
                    self.arena,
                    &pending.function,
                    pending.class.clone(),
                    Some(section.name.clone()),
                    section.line_offset,
                );
                match &pending.kind {
                    BodyKind::Function { body, span } => compiler.compile_function_body(body, *span),
                    BodyKind::Constructor { body, span } => {
                        let class = pending.class.as_ref();
                        let fields = class
                            .and_then(|c| self.field_inits.iter().find(|(t, _)| t.ptr_eq(c)))
                            .map(|(_, fields)| fields.as_slice())
                            .unwrap_or_default();
                        let base = class.and_then(TypeInfo::get_base_type);
                        let base_ctor = base.as_ref().and_then(|b| {
                            b.details()
                                .read()
                                .factories
                                .iter()
                                .find(|f| f.signature().params.is_empty())
                                .cloned()
                        });
                        if let (Some(base), None) = (&base, &base_ctor) {
                            compiler.error(CompilationError::invalid(
                                *span,
                                format!("Base class '{}' has no default constructor", base.get_name()),
                            ));
                        }
                        compiler.compile_constructor_prelude(base_ctor.as_ref(), fields, *span);
                        match body {
                            Some(body) => compiler.compile_function_body(body, *span),
                            None => {
                                compiler.emit(Instr::Return);
                            }
                        }
                    }
                    BodyKind::GlobalInit { slot, ty, init, span } => {
                        compiler.compile_global_init(slot.clone(), ty, *init, *span);
                    }
                }
                (pending.function.clone(), pending.section, compiler.finish())
            })
            .collect()
    }

    fn finish(mut self, function: Option<Function>) -> BuildOutcome {
        let mut strings: Vec<ScriptString> = Vec::new();
        // bodies of broken declarations would only add follow-up errors
        if self.errors.is_empty() {
            let compiled = self.compile_bodies();
            for (compiled_fn, section, body) in compiled {
                let CompiledBody { code, errors, strings: constants, used_groups } = body;
                if !errors.is_empty() {
                    let (row, col) = compiled_fn.declared_line();
                    let name = self.sections[section].name.clone();
                    self.messages.push(MessageInfo::new(
                        name,
                        row,
                        col,
                        MessageType::Information,
                        format!("Compiling {}", compiled_fn.get_declaration(true, true, true)),
                    ));
                    for error in errors {
                        self.fail(section, error);
                    }
                }
                strings.extend(constants);
                self.contents.used_groups.extend(used_groups);
                compiled_fn.set_script_code(Some(Arc::new(code)));
            }
        }

        if !self.errors.is_empty() {
            self.roll_back(&strings);
            return BuildOutcome {
                contents: None,
                function: None,
                errors: self.errors,
                messages: self.messages,
            };
        }
        self.contents.strings.extend(strings);
        BuildOutcome {
            contents: Some(self.contents),
            function,
            errors: Vec::new(),
            messages: self.messages,
        }
    }

    fn roll_back(&self, strings: &[ScriptString]) {
        for ty in &self.new_types {
            ty.clear_details();
        }
        for function in &self.new_functions {
            function.set_script_code(None);
        }
        if let Some(factory) = &self.env.string_factory {
            for constant in strings {
                let _ = factory.release_string_constant(constant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn build(engine: &Engine, code: &str) -> (Module, Result<(), ScriptError>, Vec<MessageInfo>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        engine
            .set_message_callback(move |info: &MessageInfo| sink.lock().push(info.clone()))
            .unwrap();
        let module = engine.get_module("b", GetModuleFlags::AlwaysCreate).unwrap();
        module.add_script_section("b", code, 0).unwrap();
        let result = module.build();
        let messages = messages.lock().clone();
        (module, result, messages)
    }

    fn run_int(engine: &Engine, module: &Module, name: &str) -> u32 {
        let ctx = engine.create_context().unwrap();
        let function = module.get_function_by_name(name).unwrap();
        ctx.prepare(&function).unwrap();
        assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
        ctx.get_return_dword()
    }

    #[test]
    fn dependency_order_reports_cycles() {
        let (order, cyclic) = dependency_order(&[vec![1], vec![], vec![3], vec![2]]);
        assert_eq!(order, vec![1, 0]);
        assert_eq!(cyclic, vec![2, 3]);
    }

    #[test]
    fn derived_classes_override_and_inherit() {
        let engine = Engine::create();
        let (module, result, _) = build(
            &engine,
            "class Base { int v = 1; int get() { return v; } int twice() { return get() * 2; } }\n\
             class Derived : Base { int get() override { return v + 10; } }\n\
             int run() { Derived d; Base@ b = d; return b.twice(); }",
        );
        result.unwrap();
        let derived = module.get_type_info_by_name("Derived").unwrap();
        assert_eq!(derived.get_property_count(), 1);
        assert!(derived.get_base_type().is_some());
        assert_eq!(run_int(&engine, &module, "run"), 22);
    }

    #[test]
    fn declaration_order_does_not_matter() {
        let engine = Engine::create();
        let (module, result, _) = build(
            &engine,
            "int run() { return make().value + Color::Blue; }\n\
             Box make() { Box b; b.value = 5; return b; }\n\
             class Box { int value; }\n\
             enum Color { Red, Green = 10, Blue }",
        );
        result.unwrap();
        assert_eq!(run_int(&engine, &module, "run"), 16);
        let color = module.get_type_info_by_name("Color").unwrap();
        assert_eq!(color.get_enum_value_by_index(2), Some(("Blue".to_string(), 11)));
    }

    #[test]
    fn interfaces_must_be_implemented() {
        let engine = Engine::create();
        let (_, result, messages) = build(
            &engine,
            "interface Shape { float area(); }\nclass Square : Shape { }",
        );
        assert!(result.is_err());
        assert!(messages.iter().any(|m| m.message.contains("Missing implementation")));
    }

    #[test]
    fn inheritance_errors_are_reported() {
        let engine = Engine::create();
        let (_, result, messages) = build(&engine, "class A : B {}\nclass B : A {}");
        assert!(result.is_err());
        assert!(messages.iter().any(|m| m.message.contains("Circular inheritance")));

        let (_, result, messages) = build(&engine, "final class A {}\nclass B : A {}");
        assert!(result.is_err());
        assert!(messages.iter().any(|m| m.message.contains("marked as final")));

        let (_, result, messages) = build(&engine, "class A { void f() {} }\nclass B : A { void g() override {} }");
        assert!(result.is_err());
        assert!(messages.iter().any(|m| m.message.contains("override")));
    }

    #[test]
    fn body_errors_follow_a_compiling_note() {
        let engine = Engine::create();
        let (module, result, messages) = build(&engine, "int f() {\n  return missing;\n}");
        assert!(result.is_err());
        assert_eq!(module.get_function_count(), 0);
        let info = messages.iter().position(|m| m.msg_type == MessageType::Information).unwrap();
        assert!(messages[info].message.starts_with("Compiling int f()"));
        let error = &messages[info + 1];
        assert_eq!(error.msg_type, MessageType::Error);
        assert_eq!(error.row, 2);
    }

    #[test]
    fn globals_can_be_disallowed() {
        let engine = Engine::create();
        engine.set_engine_property(EngineProperty::DisallowGlobalVars, 1).unwrap();
        let (_, result, messages) = build(&engine, "int g = 1;");
        assert!(result.is_err());
        assert!(messages.iter().any(|m| m.message.contains("disallowed")));
    }

    #[test]
    fn constructors_run_base_then_fields_then_body() {
        let engine = Engine::create();
        let (module, result, _) = build(
            &engine,
            "class A { int x = 1; A() { x = x * 10; } }\n\
             class B : A { int y = 2; B() { y = x + y; } }\n\
             int run() { B b; return b.y; }",
        );
        result.unwrap();
        assert_eq!(run_int(&engine, &module, "run"), 12);
    }
}
