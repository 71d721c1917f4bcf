//! Calls: overload resolution, default arguments, methods, funcdef
//! handles and object construction.

use angelscript_core::{CompilationError, FunctionType, Span};
use angelscript_parser::ast::{Argument, CallExpr, Expr, MemberExpr, Parser, QualifiedName};

use crate::compiler::conversion::implicit;
use crate::compiler::function_compiler::{CompileResult, FunctionCompiler, Operand};
use crate::core::function::Function;
use crate::core::typeinfo::TypeInfo;
use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::script_value::{ScriptString, Value};
use crate::vm::instruction::Instr;

/// A compiled argument waiting for its parameter type.
pub(super) enum Arg {
    Value {
        operand: Operand,
        code: Vec<Instr>,
        span: Span,
    },
    /// A bare function name, usable where a funcdef is expected.
    Functions { functions: Vec<Function>, span: Span },
}

impl Arg {
    fn describe(&self) -> String {
        match self {
            Arg::Value { operand, .. } => operand.ty.to_string(),
            Arg::Functions { functions, .. } => {
                format!("{}()", functions.first().map_or("", Function::get_name))
            }
        }
    }
}

fn describe_args(args: &[Arg]) -> String {
    args.iter().map(Arg::describe).collect::<Vec<_>>().join(", ")
}

/// Total conversion cost of calling `candidate` with `args`, `None` when
/// the call is not possible.
fn match_cost(candidate: &Function, args: &[Arg]) -> Option<u32> {
    let params = &candidate.signature().params;
    if args.len() > params.len() || params[args.len()..].iter().any(|p| p.default_text.is_none()) {
        return None;
    }
    let mut total = 0;
    for (arg, param) in args.iter().zip(params) {
        match arg {
            Arg::Value { operand, .. } => total += implicit(&operand.ty, &param.data_type)?.cost,
            Arg::Functions { functions, .. } => {
                let DataTypeKind::Funcdef(info) = &param.data_type.kind else {
                    return None;
                };
                let signature = info.get_funcdef_signature()?;
                if !functions.iter().any(|f| f.is_compatible_with(&signature)) {
                    return None;
                }
            }
        }
    }
    Some(total)
}

impl<'a, 'ast> FunctionCompiler<'a, 'ast> {
    pub(super) fn compile_args(&mut self, args: &[Argument<'ast>]) -> CompileResult<Vec<Arg>> {
        let mut compiled = Vec::with_capacity(args.len());
        for arg in args {
            if let Some(name) = arg.name {
                return Err(CompilationError::invalid(name.span, "Named arguments are not supported"));
            }
            if let Some(functions) = self.function_reference(arg.value) {
                compiled.push(Arg::Functions { functions, span: arg.span });
                continue;
            }
            let (operand, code) = self.detached(|c| c.compile_expr(arg.value))?;
            compiled.push(Arg::Value {
                operand,
                code,
                span: arg.value.span(),
            });
        }
        Ok(compiled)
    }

    /// Pick the candidate with the cheapest conversions.
    pub(super) fn resolve_overload(
        &self,
        candidates: &[Function],
        args: &[Arg],
        name: &str,
        span: Span,
    ) -> CompileResult<Function> {
        let mut best: Option<(u32, &Function)> = None;
        let mut ambiguous = false;
        for candidate in candidates {
            let Some(cost) = match_cost(candidate, args) else {
                continue;
            };
            match best {
                Some((best_cost, _)) if cost > best_cost => {}
                Some((best_cost, _)) if cost == best_cost => ambiguous = true,
                _ => {
                    best = Some((cost, candidate));
                    ambiguous = false;
                }
            }
        }
        match best {
            None => Err(CompilationError::UnknownFunction {
                name: format!("{name}({})", describe_args(args)),
                span,
            }),
            Some(_) if ambiguous => Err(CompilationError::invalid(
                span,
                format!("Multiple matching signatures to '{name}({})'", describe_args(args)),
            )),
            Some((_, function)) => Ok(function.clone()),
        }
    }

    /// Place the arguments for `function`, converting each one and filling
    /// in defaults for the rest.
    pub(super) fn emit_args(&mut self, function: &Function, args: Vec<Arg>, span: Span) -> CompileResult<()> {
        let params = function.signature().params.clone();
        let provided = args.len();
        for (arg, param) in args.into_iter().zip(&params) {
            // by-value objects are copied, references are not
            let copy = param.modifiers.is_empty();
            match arg {
                Arg::Value { operand, code, span } => {
                    self.splice(code);
                    self.convert_operand(&operand, &param.data_type, copy, span)?;
                }
                Arg::Functions { functions, span } => {
                    let DataTypeKind::Funcdef(info) = &param.data_type.kind else {
                        return Err(CompilationError::mismatch(span, "Function passed where no funcdef is expected"));
                    };
                    self.push_function_for(info, &functions, span)?;
                }
            }
        }
        for param in params.iter().skip(provided) {
            let text = param.default_text.as_deref().ok_or_else(|| {
                CompilationError::other(span, format!("Missing argument for '{}'", function.get_name()))
            })?;
            let expr = Parser::parse_expression(text, self.arena).map_err(|_| {
                CompilationError::other(span, format!("Invalid default argument '{text}'"))
            })?;
            self.compile_to(expr, &param.data_type, param.modifiers.is_empty())?;
        }
        Ok(())
    }

    fn check_access(&self, function: &Function, span: Span) -> CompileResult<()> {
        if !(function.is_private() || function.is_protected()) {
            return Ok(());
        }
        let allowed = function
            .get_object_type()
            .is_some_and(|owner| self.can_access_hidden(&owner));
        if allowed {
            Ok(())
        } else {
            Err(CompilationError::invalid(
                span,
                format!("Illegal call to inaccessible method '{}'", function.get_name()),
            ))
        }
    }

    /// Call a global function or import.
    pub(super) fn call_function(&mut self, function: &Function, args: Vec<Arg>, span: Span) -> CompileResult<Operand> {
        self.note_group(function.get_config_group());
        self.emit_args(function, args, span)?;
        let argc = function.signature().params.len() as u32;
        let target = function.downgrade();
        if function.get_func_type() == FunctionType::Imported {
            self.emit(Instr::CallImport { function: target, argc });
        } else {
            self.emit(Instr::Call { function: target, argc });
        }
        Ok(Operand::temp(function.signature().return_type.clone()))
    }

    /// Call a method on the object already on the stack.
    fn call_method(&mut self, owner: &TypeInfo, method: &Function, args: Vec<Arg>, span: Span) -> CompileResult<Operand> {
        self.check_access(method, span)?;
        self.note_group(method.get_config_group());
        self.emit_args(method, args, span)?;
        let is_virtual = owner.is_script_class() || owner.is_interface();
        self.emit(Instr::CallMethod {
            function: method.downgrade(),
            argc: method.signature().params.len() as u32,
            is_virtual,
        });
        Ok(Operand::temp(method.signature().return_type.clone()))
    }

    /// Call through the funcdef handle already on the stack.
    fn call_through_handle(&mut self, callee: Operand, args: &[Argument<'ast>], span: Span) -> CompileResult<Operand> {
        let DataTypeKind::Funcdef(info) = &callee.ty.kind else {
            return Err(CompilationError::invalid(
                span,
                format!("Expression of type '{}' is not callable", callee.ty),
            ));
        };
        let signature = info
            .get_funcdef_signature()
            .ok_or_else(|| CompilationError::other(span, "Funcdef has no signature"))?;
        let args = self.compile_args(args)?;
        if match_cost(&signature, &args).is_none() {
            return Err(CompilationError::UnknownFunction {
                name: format!("{}({})", info.get_name(), describe_args(&args)),
                span,
            });
        }
        self.emit_args(&signature, args, span)?;
        self.emit(Instr::CallPtr {
            argc: signature.signature().params.len() as u32,
        });
        Ok(Operand::temp(signature.signature().return_type.clone()))
    }

    pub(super) fn compile_call(&mut self, call: &CallExpr<'ast>) -> CompileResult<Operand> {
        match call.callee.unparen() {
            Expr::Ident(name) => self.compile_named_call(name, call),
            Expr::Member(member) => self.compile_method_call(member, call),
            callee => {
                let operand = self.compile_expr(callee)?;
                self.call_through_handle(operand, call.args, call.span)
            }
        }
    }

    fn compile_named_call(&mut self, name: &QualifiedName<'ast>, call: &CallExpr<'ast>) -> CompileResult<Operand> {
        if self.lookup_variable(name).is_some() {
            let callee = self.compile_ident(name)?;
            return self.call_through_handle(callee, call.args, call.span);
        }
        if name.scope.is_none() {
            if let Some(class) = self.class.clone() {
                let mut methods = self.lookup_methods(&class, name.ident.name);
                if !methods.is_empty() {
                    if self.is_const_method && !self.is_constructor {
                        methods.retain(Function::is_read_only);
                    }
                    let args = self.compile_args(call.args)?;
                    let method = self.resolve_overload(&methods, &args, name.ident.name, call.span)?;
                    self.emit(Instr::LoadThis);
                    return self.call_method(&class, &method, args, call.span);
                }
            }
        }
        let functions = self.lookup_functions(name);
        if !functions.is_empty() {
            let args = self.compile_args(call.args)?;
            let function = self.resolve_overload(&functions, &args, name.ident.name, call.span)?;
            return self.call_function(&function, args, call.span);
        }
        if let Some(info) = self.types().find(name.scope.as_ref(), name.ident.name) {
            return self.compile_constructor_call(&info, call.args, call.span);
        }
        Err(CompilationError::UnknownFunction {
            name: name.to_string(),
            span: name.span(),
        })
    }

    fn compile_method_call(&mut self, member: &MemberExpr<'ast>, call: &CallExpr<'ast>) -> CompileResult<Operand> {
        let object = self.compile_expr(member.object)?;
        let owner = self.member_owner(&object, member.object.span())?;
        let name = member.member.name;
        let mut methods = self.lookup_methods(&owner, name);
        if methods.is_empty() {
            if owner.property_index(name).is_some() {
                let (index, prop) = self.find_property(&owner, name, member.member.span)?;
                self.emit(Instr::LoadField(index));
                return self.call_through_handle(Operand::value(prop.data_type), call.args, call.span);
            }
            return Err(CompilationError::UnknownFunction {
                name: format!("{}::{name}", owner.get_name()),
                span: member.member.span,
            });
        }
        if object.ty.is_const {
            methods.retain(Function::is_read_only);
        }
        let args = self.compile_args(call.args)?;
        let method = self.resolve_overload(&methods, &args, name, call.span)?;
        self.call_method(&owner, &method, args, call.span)
    }

    // Construction

    /// `T(args)`: construct a script class or registered type, convert to
    /// an enum or typedef, or make a funcdef handle.
    pub(super) fn compile_constructor_call(
        &mut self,
        info: &TypeInfo,
        args: &[Argument<'ast>],
        span: Span,
    ) -> CompileResult<Operand> {
        self.note_group(info.get_config_group());
        if info.is_funcdef() {
            return self.compile_funcdef_construct(info, args, span);
        }
        if info.is_string_type() {
            match args {
                [] => {
                    self.emit(Instr::PushConst(Value::String(ScriptString::default())));
                }
                [arg] => self.compile_to(arg.value, &DataType::of(info), false)?,
                _ => return Err(CompilationError::invalid(span, "Too many arguments for a string")),
            }
            return Ok(Operand::temp(DataType::of(info)));
        }
        if info.is_enum() || info.is_typedef() {
            let target = if info.is_enum() {
                DataType::of(info)
            } else {
                info.details()
                    .read()
                    .typedef_target
                    .clone()
                    .ok_or_else(|| CompilationError::other(span, "Typedef has no target"))?
            };
            let [arg] = args else {
                return Err(CompilationError::invalid(span, format!("Conversion to '{target}' takes one argument")));
            };
            let operand = self.compile_expr(arg.value)?;
            let kind = target.primitive_kind().ok_or_else(|| CompilationError::other(span, "Not a primitive"))?;
            let step = crate::compiler::conversion::explicit_primitive(&operand.ty, kind).ok_or_else(|| {
                CompilationError::mismatch(span, format!("Can't convert from '{}' to '{target}'", operand.ty))
            })?;
            step.emit(&mut self.code);
            return Ok(Operand::temp(target));
        }
        if info.is_interface() || info.is_abstract() {
            return Err(CompilationError::invalid(
                span,
                format!("Can't instantiate abstract class or interface '{}'", info.get_name()),
            ));
        }
        let factories = info.details().read().factories.clone();
        if factories.is_empty() {
            return Err(CompilationError::invalid(
                span,
                format!("Type '{}' has no constructor or factory", info.get_name()),
            ));
        }
        let args = self.compile_args(args)?;
        let ctor = self.resolve_overload(&factories, &args, info.get_name(), span)?;
        if !info.is_script_class() {
            let result = self.call_function(&ctor, args, span)?;
            return Ok(result);
        }
        self.check_access(&ctor, span)?;
        self.emit_args(&ctor, args, span)?;
        self.emit(Instr::New {
            type_info: info.clone(),
            ctor: ctor.downgrade(),
            argc: ctor.signature().params.len() as u32,
        });
        Ok(Operand::temp(DataType::of(info)))
    }

    /// `Funcdef(function)` or `Funcdef(object.method)`, the latter binding a
    /// delegate.
    fn compile_funcdef_construct(&mut self, info: &TypeInfo, args: &[Argument<'ast>], span: Span) -> CompileResult<Operand> {
        let [arg] = args else {
            return Err(CompilationError::invalid(span, format!("'{}' takes one argument", info.get_name())));
        };
        let result = Operand::temp(DataType::handle(info));
        if let Some(functions) = self.function_reference(arg.value) {
            self.push_function_for(info, &functions, arg.span)?;
            return Ok(result);
        }
        if let Expr::Member(member) = arg.value.unparen() {
            let (object, object_code) = self.detached(|c| c.compile_expr(member.object))?;
            if let DataTypeKind::Object(owner) = &object.ty.kind {
                let methods = self.lookup_methods(owner, member.member.name);
                if !methods.is_empty() {
                    let signature = info
                        .get_funcdef_signature()
                        .ok_or_else(|| CompilationError::other(span, "Funcdef has no signature"))?;
                    let method = methods
                        .iter()
                        .find(|m| m.is_compatible_with(&signature))
                        .cloned()
                        .ok_or_else(|| {
                            CompilationError::mismatch(
                                arg.span,
                                format!("No method '{}' matches funcdef '{}'", member.member.name, info.get_name()),
                            )
                        })?;
                    self.check_access(&method, arg.span)?;
                    self.splice(object_code);
                    self.emit(Instr::MakeDelegate(method.downgrade()));
                    return Ok(result);
                }
            }
        }
        self.compile_to(arg.value, &DataType::handle(info), false)?;
        Ok(result)
    }
}
