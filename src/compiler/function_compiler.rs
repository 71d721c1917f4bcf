//! Per-function code generation state: the instruction buffer, local
//! variable scopes, jump patching and name lookup.
//!
//! Expressions, calls and statements are compiled by the `impl` blocks in
//! the sibling `expr`, `call` and `stmt` modules.

use std::sync::Arc;

use bumpalo::Bump;
use rustc_hash::FxHashSet;

use angelscript_core::{CompilationError, Span};
use angelscript_parser::ast::{QualifiedName, Scope};

use crate::compiler::declaration::{namespace_candidates, TypeScope};
use crate::core::function::Function;
use crate::core::module::ModuleContents;
use crate::core::string_factory::StringFactory;
use crate::core::typeinfo::TypeInfo;
use crate::internal::registry::RegisteredProperty;
use crate::types::data_type::DataType;
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::ScriptString;
use crate::vm::instruction::Instr;
use crate::vm::script_code::{LineEntry, LocalVar, ScriptCode};

pub(super) type CompileResult<T> = Result<T, CompilationError>;

/// What a build sees of the engine, captured once so that compiling never
/// takes an engine lock.
pub(crate) struct CompileEnv {
    /// Module types first, then registered ones.
    pub(crate) types: Vec<TypeInfo>,
    pub(crate) functions: Vec<Function>,
    pub(crate) properties: Vec<RegisteredProperty>,
    pub(crate) string_factory: Option<Arc<dyn StringFactory>>,
    pub(crate) string_type: Option<TypeInfo>,
    pub(crate) access_mask: u32,
    pub(crate) require_enum_scope: bool,
    pub(crate) line_cues: bool,
}

impl CompileEnv {
    pub(crate) fn type_scope<'a>(&'a self, namespace: &'a str, class: Option<&'a TypeInfo>) -> TypeScope<'a> {
        let mut scope = TypeScope::new(&self.types, namespace);
        scope.access_mask = self.access_mask;
        scope.class = class;
        scope
    }

    fn visible(&self, mask: u32) -> bool {
        mask & self.access_mask != 0
    }
}

/// Result of compiling an expression: its type, and whether the value is a
/// fresh object nobody else refers to.
#[derive(Debug, Clone)]
pub(super) struct Operand {
    pub(super) ty: DataType,
    pub(super) temp: bool,
}

impl Operand {
    pub(super) fn value(ty: DataType) -> Self {
        Self { ty, temp: false }
    }

    pub(super) fn temp(ty: DataType) -> Self {
        Self { ty, temp: true }
    }
}

/// A variable an identifier resolved to.
pub(super) enum Symbol {
    Local { slot: u32, ty: DataType, is_const: bool },
    /// Property of `this`.
    Field { index: u32, ty: DataType, is_const: bool },
    Global { slot: Arc<GlobalSlot>, ty: DataType, is_const: bool, group: Option<String> },
    EnumValue { ty: DataType, value: i32 },
}

/// An enclosing loop or `switch` that `break` (and for loops `continue`)
/// jumps out of.
pub(super) struct Breakable {
    pub(super) is_loop: bool,
    pub(super) try_depth: usize,
    pub(super) breaks: Vec<usize>,
    pub(super) continues: Vec<usize>,
}

pub(crate) struct FunctionCompiler<'a, 'ast> {
    pub(super) env: &'a CompileEnv,
    pub(super) contents: &'a ModuleContents,
    pub(super) arena: &'ast Bump,
    pub(super) namespace: String,
    pub(super) class: Option<TypeInfo>,
    pub(super) return_type: DataType,
    pub(super) is_constructor: bool,
    pub(super) is_const_method: bool,
    line_offset: i32,
    section: Option<String>,
    pub(super) code: Vec<Instr>,
    locals: Vec<LocalVar>,
    /// Slots declared in each open block, innermost last.
    scopes: Vec<Vec<u32>>,
    lines: Vec<LineEntry>,
    pub(super) breakables: Vec<Breakable>,
    pub(super) try_depth: usize,
    pub(super) errors: Vec<CompilationError>,
    pub(super) strings: Vec<ScriptString>,
    pub(super) used_groups: FxHashSet<String>,
    param_count: u32,
    temp_counter: u32,
}

/// What compiling one function produced besides its code.
pub(crate) struct CompiledBody {
    pub(crate) code: ScriptCode,
    pub(crate) errors: Vec<CompilationError>,
    pub(crate) strings: Vec<ScriptString>,
    pub(crate) used_groups: FxHashSet<String>,
}

impl<'a, 'ast> FunctionCompiler<'a, 'ast> {
    pub(crate) fn new(
        env: &'a CompileEnv,
        contents: &'a ModuleContents,
        arena: &'ast Bump,
        function: &Function,
        class: Option<TypeInfo>,
        section: Option<String>,
        line_offset: i32,
    ) -> Self {
        let signature = function.signature();
        let mut compiler = Self {
            env,
            contents,
            arena,
            namespace: function.get_namespace().to_string(),
            class,
            return_type: signature.return_type.clone(),
            is_constructor: function.is_constructor(),
            is_const_method: signature.is_const,
            line_offset,
            section,
            code: Vec::new(),
            locals: Vec::new(),
            scopes: vec![Vec::new()],
            lines: Vec::new(),
            breakables: Vec::new(),
            try_depth: 0,
            errors: Vec::new(),
            strings: Vec::new(),
            used_groups: FxHashSet::default(),
            param_count: signature.params.len() as u32,
            temp_counter: 0,
        };
        for param in &signature.params {
            // unnamed parameters still take a slot
            let name = param.name.clone().unwrap_or_default();
            let slot = compiler.locals.len() as u32;
            compiler.locals.push(LocalVar {
                name,
                data_type: param.data_type.clone(),
                scope: 0..usize::MAX,
                is_temporary: false,
            });
            compiler.scopes[0].push(slot);
        }
        compiler
    }

    pub(crate) fn finish(mut self) -> CompiledBody {
        let end = self.code.len();
        for local in &mut self.locals {
            if local.scope.end == usize::MAX {
                local.scope.end = end.max(local.scope.start + 1);
            }
        }
        CompiledBody {
            code: ScriptCode {
                instructions: self.code,
                locals: self.locals,
                param_count: self.param_count,
                lines: self.lines,
                section: self.section,
            },
            errors: self.errors,
            strings: self.strings,
            used_groups: self.used_groups,
        }
    }

    // Code buffer

    pub(super) fn emit(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    pub(super) fn here(&self) -> usize {
        self.code.len()
    }

    /// Point the jump at `at` to `target`.
    pub(super) fn patch(&mut self, at: usize, target: usize) {
        match self.code.get_mut(at) {
            Some(Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) | Instr::TryBegin(t)) => {
                *t = target;
            }
            _ => {}
        }
    }

    /// Compile into a separate buffer, for code whose type must be known
    /// before it is placed.
    pub(super) fn detached<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<(T, Vec<Instr>)> {
        let outer = std::mem::take(&mut self.code);
        let result = f(self);
        let inner = std::mem::replace(&mut self.code, outer);
        result.map(|value| (value, inner))
    }

    /// Append code produced by [`detached`](Self::detached), relocating its
    /// jumps.
    pub(super) fn splice(&mut self, code: Vec<Instr>) {
        let offset = self.code.len();
        for mut instr in code {
            if let Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) | Instr::TryBegin(t) = &mut instr {
                *t += offset;
            }
            self.code.push(instr);
        }
    }

    /// Record the start of a statement.
    pub(super) fn mark_line(&mut self, span: Span) {
        let line = span.line as i32 + self.line_offset;
        let col = span.col as i32;
        self.lines.push(LineEntry { pc: self.code.len(), line, col });
        if self.env.line_cues {
            self.emit(Instr::Line(line, col));
        }
    }

    pub(super) fn error(&mut self, error: CompilationError) {
        self.errors.push(error);
    }

    pub(super) fn note_group(&mut self, group: Option<&str>) {
        if let Some(group) = group {
            self.used_groups.insert(group.to_string());
        }
    }

    // Locals

    pub(super) fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost block, resetting the object variables it
    /// declared so they release what they hold.
    pub(super) fn pop_scope(&mut self) {
        let Some(slots) = self.scopes.pop() else {
            return;
        };
        for &slot in &slots {
            let holds_reference = self.locals[slot as usize].data_type.is_object();
            if holds_reference {
                self.emit(Instr::ClearLocal(slot));
            }
        }
        let end = self.code.len();
        for slot in slots {
            let local = &mut self.locals[slot as usize];
            local.scope.end = end.max(local.scope.start + 1);
        }
    }

    /// Declare a variable in the innermost block.
    pub(super) fn declare_local(&mut self, name: &str, ty: DataType, span: Span) -> CompileResult<u32> {
        let innermost = self.scopes.last().map(Vec::as_slice).unwrap_or_default();
        if innermost.iter().any(|&s| self.locals[s as usize].name == name) {
            return Err(CompilationError::DuplicateDefinition { name: name.to_string(), span });
        }
        Ok(self.add_local(name.to_string(), ty, false))
    }

    /// A hidden local for intermediate values.
    pub(super) fn temp_local(&mut self, ty: DataType) -> u32 {
        self.temp_counter += 1;
        let name = format!("$tmp{}", self.temp_counter);
        self.add_local(name, ty, true)
    }

    fn add_local(&mut self, name: String, data_type: DataType, is_temporary: bool) -> u32 {
        let slot = self.locals.len() as u32;
        let start = self.code.len();
        self.locals.push(LocalVar {
            name,
            data_type,
            scope: start..usize::MAX,
            is_temporary,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(slot);
        }
        slot
    }

    fn find_local(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .copied()
            .find(|&slot| {
                let local = &self.locals[slot as usize];
                !local.is_temporary && local.name == name
            })
    }

    // Name lookup

    pub(super) fn types(&self) -> TypeScope<'_> {
        self.env.type_scope(&self.namespace, self.class.as_ref())
    }

    pub(super) fn candidates(&self, scope: Option<&Scope<'_>>) -> Vec<String> {
        namespace_candidates(&self.namespace, scope)
    }

    /// Resolve a variable name: locals, then properties of `this`, then
    /// globals, then enum values.
    pub(super) fn lookup_variable(&self, name: &QualifiedName<'_>) -> Option<Symbol> {
        let ident = name.ident.name;
        if name.scope.is_none() {
            if let Some(slot) = self.find_local(ident) {
                let local = &self.locals[slot as usize];
                return Some(Symbol::Local {
                    slot,
                    ty: local.data_type.clone(),
                    is_const: local.data_type.is_const,
                });
            }
            if let Some(class) = &self.class {
                let details = class.details().read();
                if let Some(index) = details.properties.iter().position(|p| p.name == ident) {
                    let prop = &details.properties[index];
                    return Some(Symbol::Field {
                        index: index as u32,
                        ty: prop.data_type.clone(),
                        is_const: self.is_const_method && !self.is_constructor,
                    });
                }
            }
        }
        for namespace in self.candidates(name.scope.as_ref()) {
            if let Some(global) = self
                .contents
                .globals
                .iter()
                .find(|g| g.name == ident && g.namespace == namespace)
            {
                return Some(Symbol::Global {
                    slot: global.slot.clone(),
                    ty: global.data_type.clone(),
                    is_const: global.is_const,
                    group: None,
                });
            }
            if let Some(prop) = self
                .env
                .properties
                .iter()
                .find(|p| p.name == ident && p.namespace == namespace && self.env.visible(p.access_mask))
            {
                return Some(Symbol::Global {
                    slot: prop.slot.clone(),
                    ty: prop.data_type.clone(),
                    is_const: prop.is_const,
                    group: prop.config_group.clone(),
                });
            }
        }
        self.lookup_enum_value(name)
    }

    fn lookup_enum_value(&self, name: &QualifiedName<'_>) -> Option<Symbol> {
        let ident = name.ident.name;
        // `Enum::Value`
        if let Some(scope) = &name.scope {
            if let Some((last, parents)) = scope.segments.split_last() {
                let owner_scope = Scope {
                    is_global: scope.is_global,
                    segments: parents,
                    span: scope.span,
                };
                let owner_scope = (scope.is_global || !parents.is_empty()).then_some(owner_scope);
                if let Some(info) = self.types().find(owner_scope.as_ref(), last.name) {
                    if info.is_enum() {
                        if let Some(value) = info.enum_value(ident) {
                            return Some(Symbol::EnumValue { ty: DataType::of(&info), value });
                        }
                    }
                }
            }
        }
        if self.env.require_enum_scope {
            return None;
        }
        for namespace in self.candidates(name.scope.as_ref()) {
            let found = self.env.types.iter().find_map(|info| {
                if !info.is_enum() || info.get_namespace() != namespace || !self.env.visible(info.get_access_mask()) {
                    return None;
                }
                info.enum_value(ident).map(|value| (info.clone(), value))
            });
            if let Some((info, value)) = found {
                return Some(Symbol::EnumValue { ty: DataType::of(&info), value });
            }
        }
        None
    }

    /// Global functions named `name` in the innermost namespace that has
    /// any: script functions, imports and registered functions.
    pub(super) fn lookup_functions(&self, name: &QualifiedName<'_>) -> Vec<Function> {
        let ident = name.ident.name;
        for namespace in self.candidates(name.scope.as_ref()) {
            let mut found: Vec<Function> = self
                .contents
                .functions
                .iter()
                .filter(|f| f.get_name() == ident && f.get_namespace() == namespace)
                .cloned()
                .collect();
            found.extend(
                self.contents
                    .imports
                    .iter()
                    .map(|i| &i.function)
                    .filter(|f| f.get_name() == ident && f.get_namespace() == namespace)
                    .cloned(),
            );
            found.extend(
                self.env
                    .functions
                    .iter()
                    .filter(|f| {
                        f.get_name() == ident && f.get_namespace() == namespace && self.env.visible(f.get_access_mask())
                    })
                    .cloned(),
            );
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Methods of `class` named `name`.
    pub(super) fn lookup_methods(&self, class: &TypeInfo, name: &str) -> Vec<Function> {
        class
            .details()
            .read()
            .methods
            .iter()
            .filter(|m| m.get_name() == name && self.env.visible(m.get_access_mask()))
            .cloned()
            .collect()
    }

    /// Whether code in this function may touch a private or protected
    /// member of `owner`.
    pub(super) fn can_access_hidden(&self, owner: &TypeInfo) -> bool {
        self.class.as_ref().is_some_and(|class| class.derives_from(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::Engine;
    use angelscript_core::PrimitiveKind;

    fn env() -> CompileEnv {
        CompileEnv {
            types: Vec::new(),
            functions: Vec::new(),
            properties: Vec::new(),
            string_factory: None,
            string_type: None,
            access_mask: 1,
            require_enum_scope: false,
            line_cues: true,
        }
    }

    fn function(engine: &Engine) -> Function {
        use crate::core::function::{FunctionBody, FunctionData, ParamInfo, Signature};
        let mut signature = Signature::new(DataType::void());
        signature.params.push(ParamInfo {
            data_type: DataType::primitive(PrimitiveKind::Int32),
            modifiers: Default::default(),
            name: Some("p".into()),
            default_text: None,
        });
        let data = FunctionData::new(
            engine,
            angelscript_core::FunctionType::Script,
            "f",
            signature,
            FunctionBody::Script(Default::default()),
        );
        engine.new_function(data)
    }

    #[test]
    fn spliced_jumps_are_relocated() {
        let env = env();
        let contents = ModuleContents::default();
        let arena = Bump::new();
        let engine = Engine::create();
        let f = function(&engine);
        let mut compiler = FunctionCompiler::new(&env, &contents, &arena, &f, None, None, 0);
        compiler.emit(Instr::Pop);
        let ((), inner) = compiler
            .detached(|c| {
                c.emit(Instr::Jump(1));
                c.emit(Instr::Pop);
                Ok(())
            })
            .unwrap();
        compiler.splice(inner);
        assert!(matches!(compiler.code[1], Instr::Jump(2)));
    }

    #[test]
    fn inner_blocks_shadow_and_close() {
        let env = env();
        let contents = ModuleContents::default();
        let arena = Bump::new();
        let engine = Engine::create();
        let f = function(&engine);
        let mut compiler = FunctionCompiler::new(&env, &contents, &arena, &f, None, None, 0);
        let int = DataType::primitive(PrimitiveKind::Int32);
        assert!(compiler.declare_local("p", int.clone(), Span::default()).is_err());
        compiler.push_scope();
        let inner = compiler.declare_local("p", int, Span::default()).unwrap();
        assert_eq!(compiler.find_local("p"), Some(inner));
        compiler.pop_scope();
        assert_eq!(compiler.find_local("p"), Some(0));
        let body = compiler.finish();
        assert_eq!(body.code.param_count, 1);
        assert_eq!(body.code.locals.len(), 2);
    }

    #[test]
    fn statements_record_lines_with_offset() {
        let env = env();
        let contents = ModuleContents::default();
        let arena = Bump::new();
        let engine = Engine::create();
        let f = function(&engine);
        let mut compiler = FunctionCompiler::new(&env, &contents, &arena, &f, None, None, 10);
        compiler.mark_line(Span::new(2, 5, 1));
        let body = compiler.finish();
        assert_eq!(body.code.line_at(0), (12, 5));
        assert!(matches!(body.code.instructions[0], Instr::Line(12, 5)));
    }
}
