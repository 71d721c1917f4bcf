//! Statements, plus the entry points that compile a whole body, a
//! constructor prelude or a global variable initialiser.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use angelscript_core::{CompilationError, Span};
use angelscript_parser::ast::{
    Block, DoWhileStmt, ForInit, ForStmt, IfStmt, ReturnStmt, Stmt, SwitchStmt, TryStmt, TypeBase, VarDecl,
    VarInit, WhileStmt,
};

use crate::compiler::const_eval::eval_int;
use crate::compiler::function_compiler::{Breakable, CompileResult, FunctionCompiler, Symbol};
use crate::core::function::Function;
use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::Value;
use crate::vm::instruction::{CompareOp, Instr};

/// Initialiser of one class property, run by every constructor.
pub(crate) struct FieldInit<'ast> {
    pub(crate) index: u32,
    pub(crate) ty: DataType,
    pub(crate) init: Option<VarInit<'ast>>,
    pub(crate) span: Span,
}

/// Whether every path through `stmt` ends in a `return`.
fn always_returns(stmt: &Stmt<'_>) -> bool {
    match stmt {
        Stmt::Return(_) => true,
        Stmt::Block(block) => block.stmts.iter().any(always_returns),
        Stmt::If(s) => always_returns(&s.then_branch) && s.else_branch.as_ref().is_some_and(always_returns),
        Stmt::DoWhile(s) => always_returns(&s.body),
        Stmt::Try(s) => {
            s.try_block.stmts.iter().any(always_returns) && s.catch_block.stmts.iter().any(always_returns)
        }
        Stmt::Switch(s) => {
            let has_default = s.cases.iter().any(|c| c.is_default);
            let last_returns = s
                .cases
                .last()
                .is_some_and(|c| c.body.iter().any(always_returns));
            let breaks = s
                .cases
                .iter()
                .flat_map(|c| c.body.iter())
                .any(|stmt| matches!(stmt, Stmt::Break(_)));
            has_default && last_returns && !breaks
        }
        _ => false,
    }
}

impl<'a, 'ast> FunctionCompiler<'a, 'ast> {
    // Entry points

    /// Compile a function body. `end` is reported when a value-returning
    /// function can fall off its end.
    pub(crate) fn compile_function_body(&mut self, body: &Block<'ast>, end: Span) {
        for stmt in body.stmts {
            self.compile_statement(stmt);
        }
        let needs_value = !self.return_type.is_void() && !self.is_constructor;
        if needs_value && !body.stmts.iter().any(always_returns) {
            self.error(CompilationError::other(end, "Not all paths return a value"));
        }
        self.emit(Instr::Return);
    }

    /// Call the base class default constructor and run the property
    /// initialisers, in that order.
    pub(crate) fn compile_constructor_prelude(&mut self, base_ctor: Option<&Function>, fields: &[FieldInit<'ast>], span: Span) {
        self.mark_line(span);
        if let Some(base) = base_ctor {
            self.emit(Instr::LoadThis);
            self.emit(Instr::CallMethod {
                function: base.downgrade(),
                argc: 0,
                is_virtual: false,
            });
        }
        for field in fields {
            let marker = self.code.len();
            self.emit(Instr::LoadThis);
            match self.compile_initializer(&field.ty, field.init, field.span) {
                Ok(true) => {
                    self.emit(Instr::StoreField(field.index));
                    self.emit(Instr::Pop);
                }
                Ok(false) => {
                    self.code.truncate(marker);
                }
                Err(error) => self.error(error),
            }
        }
    }

    /// Body of the function that initialises one global variable.
    pub(crate) fn compile_global_init(
        &mut self,
        slot: Arc<GlobalSlot>,
        ty: &DataType,
        init: Option<VarInit<'ast>>,
        span: Span,
    ) {
        self.mark_line(span);
        match self.compile_initializer(ty, init, span) {
            Ok(true) => {
                self.emit(Instr::StoreGlobal(slot));
                self.emit(Instr::Pop);
            }
            Ok(false) => {}
            Err(error) => self.error(error),
        }
        self.emit(Instr::Return);
    }

    /// Push the initial value of a variable of type `ty`. Returns `false`
    /// when the type's default value needs no code.
    pub(super) fn compile_initializer(&mut self, ty: &DataType, init: Option<VarInit<'ast>>, span: Span) -> CompileResult<bool> {
        match init {
            Some(VarInit::Expr(expr)) => {
                self.compile_to(expr, ty, true)?;
                Ok(true)
            }
            Some(VarInit::Args(args)) => {
                if let DataTypeKind::Object(info) = &ty.kind {
                    if !ty.is_handle {
                        let info = info.clone();
                        let result = self.compile_constructor_call(&info, args, span)?;
                        self.convert_operand(&result, ty, false, span)?;
                        return Ok(true);
                    }
                }
                match args {
                    [arg] if arg.name.is_none() => {
                        self.compile_to(arg.value, ty, true)?;
                        Ok(true)
                    }
                    _ => Err(CompilationError::invalid(
                        span,
                        format!("Type '{ty}' can't be initialised with an argument list"),
                    )),
                }
            }
            None if ty.is_object_value() => {
                let Some(info) = ty.type_info().cloned() else {
                    return Ok(false);
                };
                let result = self.compile_constructor_call(&info, &[], span)?;
                self.convert_operand(&result, ty, false, span)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // Statements

    pub(super) fn compile_statement(&mut self, stmt: &Stmt<'ast>) {
        if let Err(error) = self.statement(stmt) {
            self.error(error);
        }
    }

    fn statement(&mut self, stmt: &Stmt<'ast>) -> CompileResult<()> {
        match stmt {
            Stmt::Block(block) => {
                self.compile_block(block);
                Ok(())
            }
            Stmt::Expr(None, _) => Ok(()),
            Stmt::Expr(Some(expr), span) => {
                self.mark_line(*span);
                self.compile_discard(expr)
            }
            Stmt::Var(decl) => {
                self.mark_line(decl.span);
                self.compile_var_decl(decl)
            }
            Stmt::Return(ret) => {
                self.mark_line(ret.span);
                self.compile_return(ret)
            }
            Stmt::Break(span) => {
                self.mark_line(*span);
                self.compile_jump_out(*span, false)
            }
            Stmt::Continue(span) => {
                self.mark_line(*span);
                self.compile_jump_out(*span, true)
            }
            Stmt::If(s) => {
                self.mark_line(s.span);
                self.compile_if(s);
                Ok(())
            }
            Stmt::While(s) => {
                self.mark_line(s.span);
                self.compile_while(s);
                Ok(())
            }
            Stmt::DoWhile(s) => {
                self.mark_line(s.span);
                self.compile_do_while(s);
                Ok(())
            }
            Stmt::For(s) => {
                self.mark_line(s.span);
                self.compile_for(s);
                Ok(())
            }
            Stmt::Switch(s) => {
                self.mark_line(s.span);
                self.compile_switch(s)
            }
            Stmt::Try(s) => {
                self.mark_line(s.span);
                self.compile_try(s);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &Block<'ast>) {
        self.push_scope();
        for stmt in block.stmts {
            self.compile_statement(stmt);
        }
        self.pop_scope();
    }

    /// A statement that is the body of a control structure gets its own
    /// scope even when it is not a block.
    fn compile_nested(&mut self, stmt: &Stmt<'ast>) {
        self.push_scope();
        self.compile_statement(stmt);
        self.pop_scope();
    }

    fn condition(&mut self, expr: &angelscript_parser::ast::Expr<'ast>) {
        if let Err(error) = self.compile_condition(expr) {
            self.error(error);
        }
    }

    fn compile_var_decl(&mut self, decl: &VarDecl<'ast>) -> CompileResult<()> {
        let is_auto = matches!(decl.ty.base, TypeBase::Auto);
        let declared = if is_auto { None } else { Some(self.types().resolve(&decl.ty)?) };
        for var in decl.vars {
            let ty = match (&declared, var.init) {
                (Some(ty), init) => {
                    let pushed = self.compile_initializer(ty, init, var.span)?;
                    let slot = self.declare_local(var.name.name, ty.clone(), var.name.span)?;
                    if pushed {
                        self.emit(Instr::StoreLocal(slot));
                        self.emit(Instr::Pop);
                    } else {
                        self.emit(Instr::ClearLocal(slot));
                    }
                    continue;
                }
                (None, Some(VarInit::Expr(expr))) => {
                    let operand = self.compile_expr(expr)?;
                    if operand.ty.is_void() || operand.ty.is_null() {
                        return Err(CompilationError::mismatch(
                            expr.span(),
                            format!("Can't infer a variable type from '{}'", operand.ty),
                        ));
                    }
                    if operand.ty.is_object_value() && !operand.temp {
                        self.emit(Instr::CopyObject);
                    }
                    operand.ty.unqualified().with_const(decl.ty.is_const)
                }
                (None, _) => {
                    return Err(CompilationError::other(
                        var.span,
                        "'auto' variables must be initialised with '='",
                    ));
                }
            };
            let slot = self.declare_local(var.name.name, ty, var.name.span)?;
            self.emit(Instr::StoreLocal(slot));
            self.emit(Instr::Pop);
        }
        Ok(())
    }

    fn compile_return(&mut self, ret: &ReturnStmt<'ast>) -> CompileResult<()> {
        let returns_nothing = self.return_type.is_void() || self.is_constructor;
        match (ret.value, returns_nothing) {
            (Some(value), true) => Err(CompilationError::mismatch(
                value.span(),
                "Can't return a value from a function returning 'void'",
            )),
            (None, false) => Err(CompilationError::mismatch(
                ret.span,
                format!("Function must return a value of type '{}'", self.return_type),
            )),
            (Some(value), false) => {
                let ty = self.return_type.clone();
                self.compile_to(value, &ty, true)?;
                self.emit(Instr::ReturnValue);
                Ok(())
            }
            (None, true) => {
                self.emit(Instr::Return);
                Ok(())
            }
        }
    }

    fn compile_jump_out(&mut self, span: Span, is_continue: bool) -> CompileResult<()> {
        let try_depth = self.try_depth;
        let target = self
            .breakables
            .iter()
            .rposition(|b| b.is_loop || !is_continue)
            .ok_or_else(|| {
                let keyword = if is_continue { "continue" } else { "break" };
                CompilationError::invalid(span, format!("'{keyword}' outside of a loop"))
            })?;
        let left_tries = try_depth - self.breakables[target].try_depth;
        for _ in 0..left_tries {
            self.emit(Instr::TryEnd);
        }
        let jump = self.emit(Instr::Jump(0));
        let breakable = &mut self.breakables[target];
        if is_continue {
            breakable.continues.push(jump);
        } else {
            breakable.breaks.push(jump);
        }
        Ok(())
    }

    fn open_breakable(&mut self, is_loop: bool) {
        self.breakables.push(Breakable {
            is_loop,
            try_depth: self.try_depth,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
    }

    fn close_breakable(&mut self, break_target: usize, continue_target: usize) {
        let Some(breakable) = self.breakables.pop() else {
            return;
        };
        for at in breakable.breaks {
            self.patch(at, break_target);
        }
        for at in breakable.continues {
            self.patch(at, continue_target);
        }
    }

    fn compile_if(&mut self, s: &IfStmt<'ast>) {
        self.condition(s.condition);
        let to_else = self.emit(Instr::JumpIfFalse(0));
        self.compile_nested(&s.then_branch);
        match &s.else_branch {
            Some(else_branch) => {
                let to_end = self.emit(Instr::Jump(0));
                let else_start = self.here();
                self.patch(to_else, else_start);
                self.compile_nested(else_branch);
                let end = self.here();
                self.patch(to_end, end);
            }
            None => {
                let end = self.here();
                self.patch(to_else, end);
            }
        }
    }

    fn compile_while(&mut self, s: &WhileStmt<'ast>) {
        let start = self.here();
        self.condition(s.condition);
        let exit = self.emit(Instr::JumpIfFalse(0));
        self.open_breakable(true);
        self.compile_nested(&s.body);
        self.emit(Instr::Jump(start));
        let end = self.here();
        self.patch(exit, end);
        self.close_breakable(end, start);
    }

    fn compile_do_while(&mut self, s: &DoWhileStmt<'ast>) {
        let start = self.here();
        self.open_breakable(true);
        self.compile_nested(&s.body);
        let check = self.here();
        self.condition(s.condition);
        self.emit(Instr::JumpIfTrue(start));
        let end = self.here();
        self.close_breakable(end, check);
    }

    fn compile_for(&mut self, s: &ForStmt<'ast>) {
        self.push_scope();
        match &s.init {
            Some(ForInit::Var(decl)) => {
                if let Err(error) = self.compile_var_decl(decl) {
                    self.error(error);
                }
            }
            Some(ForInit::Expr(expr)) => {
                if let Err(error) = self.compile_discard(expr) {
                    self.error(error);
                }
            }
            None => {}
        }
        let start = self.here();
        let exit = s.condition.map(|condition| {
            self.condition(condition);
            self.emit(Instr::JumpIfFalse(0))
        });
        self.open_breakable(true);
        self.compile_nested(&s.body);
        let update = self.here();
        for expr in s.update {
            if let Err(error) = self.compile_discard(expr) {
                self.error(error);
            }
        }
        self.emit(Instr::Jump(start));
        let end = self.here();
        if let Some(exit) = exit {
            self.patch(exit, end);
        }
        self.close_breakable(end, update);
        self.pop_scope();
    }

    fn compile_switch(&mut self, s: &SwitchStmt<'ast>) -> CompileResult<()> {
        let operand = self.compile_expr(s.expr)?;
        let kind = operand
            .ty
            .primitive_kind()
            .filter(|k| k.is_integer())
            .ok_or_else(|| {
                CompilationError::mismatch(
                    s.expr.span(),
                    format!("Switch expression must be an integer, not '{}'", operand.ty),
                )
            })?;
        let subject = self.temp_local(operand.ty.unqualified());
        self.emit(Instr::StoreLocal(subject));
        self.emit(Instr::Pop);

        // case labels are constants, resolved before any code is placed
        let labels: Vec<(usize, CompileResult<i64>, Span)> = {
            let lookup = |name: &angelscript_parser::ast::QualifiedName<'_>| match self.lookup_variable(name) {
                Some(Symbol::EnumValue { value, .. }) => Some(value as i64),
                _ => None,
            };
            s.cases
                .iter()
                .enumerate()
                .flat_map(|(i, case)| case.values.iter().map(move |v| (i, *v)))
                .map(|(i, value)| (i, eval_int(value, &lookup), value.span()))
                .collect()
        };

        let mut seen = FxHashSet::default();
        let mut jumps = Vec::new();
        for (case, value, span) in labels {
            let value = match value {
                Ok(value) => value,
                Err(error) => {
                    self.error(error);
                    continue;
                }
            };
            if !seen.insert(value) {
                self.error(CompilationError::DuplicateDefinition {
                    name: format!("case {value}"),
                    span,
                });
                continue;
            }
            self.emit(Instr::LoadLocal(subject));
            self.emit(Instr::PushConst(Value::Int64(value).convert(kind)));
            self.emit(Instr::Compare(CompareOp::Eq, kind));
            jumps.push((case, self.emit(Instr::JumpIfTrue(0))));
        }
        let to_default = self.emit(Instr::Jump(0));

        self.open_breakable(false);
        self.push_scope();
        let mut starts = Vec::with_capacity(s.cases.len());
        for case in s.cases {
            starts.push(self.here());
            for stmt in case.body {
                self.compile_statement(stmt);
            }
        }
        self.pop_scope();
        let end = self.here();
        for (case, at) in jumps {
            self.patch(at, starts[case]);
        }
        let default_start = s
            .cases
            .iter()
            .position(|c| c.is_default)
            .map_or(end, |i| starts[i]);
        self.patch(to_default, default_start);
        self.close_breakable(end, end);
        Ok(())
    }

    fn compile_try(&mut self, s: &TryStmt<'ast>) {
        let begin = self.emit(Instr::TryBegin(0));
        self.try_depth += 1;
        self.compile_block(&s.try_block);
        self.try_depth -= 1;
        self.emit(Instr::TryEnd);
        let to_end = self.emit(Instr::Jump(0));
        let catch_start = self.here();
        self.patch(begin, catch_start);
        self.compile_block(&s.catch_block);
        let end = self.here();
        self.patch(to_end, end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angelscript_parser::ast::{Item, Parser};
    use bumpalo::Bump;

    fn body_returns(source: &str) -> bool {
        let arena = Bump::new();
        let script = Parser::parse(source, &arena).unwrap();
        let Item::Function(func) = &script.items[0] else {
            panic!("expected a function");
        };
        func.body.unwrap().stmts.iter().any(always_returns)
    }

    #[test]
    fn return_analysis_follows_branches() {
        assert!(body_returns("int f() { return 1; }"));
        assert!(body_returns("int f(bool b) { if (b) return 1; else return 2; }"));
        assert!(!body_returns("int f(bool b) { if (b) return 1; }"));
        assert!(body_returns("int f() { try { return 1; } catch { return 2; } }"));
        assert!(body_returns("int f(int v) { switch (v) { case 1: return 1; default: return 0; } }"));
        assert!(!body_returns("int f(int v) { switch (v) { case 1: break; default: return 0; } }"));
        assert!(!body_returns("int f(int v) { while (v > 0) { return 1; } }"));
    }
}
