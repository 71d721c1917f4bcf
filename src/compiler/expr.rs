//! Expressions: literals, names, operators, assignment and conversions.

use std::sync::Arc;

use angelscript_core::{CompilationError, PrimitiveKind, Span};
use angelscript_parser::ast::{
    AssignExpr, AssignOp, BinaryExpr, BinaryOp, CastExpr, ConstructExpr, Expr, LiteralExpr, LiteralKind,
    MemberExpr, PostfixOp, QualifiedName, TernaryExpr, UnaryExpr, UnaryOp,
};

use crate::compiler::conversion::{arithmetic_kind, common_type, explicit_primitive, implicit};
use crate::compiler::function_compiler::{CompileResult, FunctionCompiler, Operand, Symbol};
use crate::core::function::Function;
use crate::core::typeinfo::{PropertyInfo, TypeInfo};
use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::Value;
use crate::vm::instruction::{ArithOp, CompareOp, Instr};
use crate::vm::ops::promote;

/// Where an assignable expression lives.
pub(super) enum PlaceKind {
    Local(u32),
    Global(Arc<GlobalSlot>),
    /// Property of the object left on the stack.
    Field(u32),
}

pub(super) struct Place {
    pub(super) kind: PlaceKind,
    pub(super) ty: DataType,
    pub(super) is_const: bool,
}

fn arith_op(op: BinaryOp) -> Option<ArithOp> {
    Some(match op {
        BinaryOp::Add => ArithOp::Add,
        BinaryOp::Sub => ArithOp::Sub,
        BinaryOp::Mul => ArithOp::Mul,
        BinaryOp::Div => ArithOp::Div,
        BinaryOp::Mod => ArithOp::Mod,
        BinaryOp::Pow => ArithOp::Pow,
        BinaryOp::BitAnd => ArithOp::BitAnd,
        BinaryOp::BitOr => ArithOp::BitOr,
        BinaryOp::BitXor => ArithOp::BitXor,
        BinaryOp::Shl => ArithOp::Shl,
        BinaryOp::Shr => ArithOp::Shr,
        BinaryOp::UShr => ArithOp::UShr,
        _ => return None,
    })
}

fn compare_op(op: BinaryOp) -> Option<CompareOp> {
    Some(match op {
        BinaryOp::Equal => CompareOp::Eq,
        BinaryOp::NotEqual => CompareOp::Ne,
        BinaryOp::Less => CompareOp::Lt,
        BinaryOp::LessEqual => CompareOp::Le,
        BinaryOp::Greater => CompareOp::Gt,
        BinaryOp::GreaterEqual => CompareOp::Ge,
        _ => return None,
    })
}

fn is_integer(ty: &DataType) -> bool {
    ty.primitive_kind().is_some_and(PrimitiveKind::is_integer)
}

/// Values that `+` can append to a string.
fn is_concatenable(ty: &DataType) -> bool {
    ty.is_string() || ty.is_numeric_like() || ty.is_bool()
}

impl<'a, 'ast> FunctionCompiler<'a, 'ast> {
    pub(super) fn compile_expr(&mut self, expr: &Expr<'ast>) -> CompileResult<Operand> {
        match expr {
            Expr::Literal(literal) => self.compile_literal(literal),
            Expr::Ident(name) => self.compile_ident(name),
            Expr::This(span) => self.compile_this(*span),
            Expr::Binary(binary) => self.compile_binary(binary),
            Expr::Unary(unary) => self.compile_unary(unary),
            Expr::Postfix(postfix) => {
                let sub = postfix.op == PostfixOp::Dec;
                self.compile_increment(postfix.operand, sub, false, postfix.span)
            }
            Expr::Assign(assign) => self.compile_assign(assign),
            Expr::Ternary(ternary) => self.compile_ternary(ternary),
            Expr::Call(call) => self.compile_call(call),
            Expr::Member(member) => self.compile_member(member),
            Expr::Cast(cast) => self.compile_cast(cast),
            Expr::Construct(construct) => self.compile_construct(construct),
            Expr::Paren(paren) => self.compile_expr(paren.inner),
        }
    }

    /// Compile `expr` and convert the result to `target`. Object values
    /// that are not temporaries are copied when `copy_values` is set.
    pub(super) fn compile_to(&mut self, expr: &Expr<'ast>, target: &DataType, copy_values: bool) -> CompileResult<()> {
        if let DataTypeKind::Funcdef(info) = &target.kind {
            if let Some(functions) = self.function_reference(expr) {
                return self.push_function_for(info, &functions, expr.span());
            }
        }
        let operand = self.compile_expr(expr)?;
        self.convert_operand(&operand, target, copy_values, expr.span())
    }

    pub(super) fn convert_operand(
        &mut self,
        operand: &Operand,
        target: &DataType,
        copy_values: bool,
        span: Span,
    ) -> CompileResult<()> {
        let conversion = implicit(&operand.ty, target).ok_or_else(|| {
            CompilationError::mismatch(
                span,
                format!("Can't implicitly convert from '{}' to '{}'", operand.ty, target),
            )
        })?;
        conversion.step.emit(&mut self.code);
        if copy_values && target.is_object_value() && !operand.temp {
            self.emit(Instr::CopyObject);
        }
        Ok(())
    }

    /// Convert a primitive or enum on the stack to `kind`.
    pub(super) fn convert_kind(&mut self, from: &DataType, kind: PrimitiveKind) {
        if from.primitive_kind() != Some(kind) {
            self.emit(Instr::Convert(kind));
        }
    }

    pub(super) fn compile_condition(&mut self, expr: &Expr<'ast>) -> CompileResult<()> {
        let operand = self.compile_expr(expr)?;
        if !operand.ty.is_bool() {
            return Err(CompilationError::mismatch(
                expr.span(),
                format!("Expression must be of boolean type, not '{}'", operand.ty),
            ));
        }
        Ok(())
    }

    /// Evaluate for side effects only.
    pub(super) fn compile_discard(&mut self, expr: &Expr<'ast>) -> CompileResult<()> {
        let operand = self.compile_expr(expr)?;
        if !operand.ty.is_void() {
            self.emit(Instr::Pop);
        }
        Ok(())
    }

    /// Functions a bare name (optionally written `@name`) refers to, when
    /// it names no variable.
    pub(super) fn function_reference(&self, expr: &Expr<'ast>) -> Option<Vec<Function>> {
        let mut expr = expr.unparen();
        if let Expr::Unary(unary) = expr {
            if unary.op == UnaryOp::HandleOf {
                expr = unary.operand.unparen();
            }
        }
        let Expr::Ident(name) = expr else {
            return None;
        };
        if self.lookup_variable(name).is_some() {
            return None;
        }
        let functions = self.lookup_functions(name);
        (!functions.is_empty()).then_some(functions)
    }

    /// Push a handle to the entry of `functions` matching the funcdef.
    pub(super) fn push_function_for(&mut self, funcdef: &TypeInfo, functions: &[Function], span: Span) -> CompileResult<()> {
        let signature = funcdef
            .get_funcdef_signature()
            .ok_or_else(|| CompilationError::other(span, "Funcdef has no signature"))?;
        let function = functions
            .iter()
            .find(|f| f.is_compatible_with(&signature))
            .ok_or_else(|| {
                CompilationError::mismatch(
                    span,
                    format!(
                        "No matching function '{}' for funcdef '{}'",
                        functions.first().map_or("", Function::get_name),
                        funcdef.get_name()
                    ),
                )
            })?;
        self.note_group(function.get_config_group());
        self.emit(Instr::PushFunction(function.downgrade()));
        Ok(())
    }

    // Operands

    fn compile_literal(&mut self, literal: &LiteralExpr<'ast>) -> CompileResult<Operand> {
        let (value, kind) = match literal.kind {
            LiteralKind::Int(v) => {
                if let Ok(v) = i32::try_from(v) {
                    (Value::Int32(v), PrimitiveKind::Int32)
                } else if let Ok(v) = i64::try_from(v) {
                    (Value::Int64(v), PrimitiveKind::Int64)
                } else {
                    (Value::UInt64(v), PrimitiveKind::Uint64)
                }
            }
            LiteralKind::Bits(v) => match u32::try_from(v) {
                Ok(v) => (Value::UInt32(v), PrimitiveKind::Uint32),
                Err(_) => (Value::UInt64(v), PrimitiveKind::Uint64),
            },
            LiteralKind::Float(v) => (Value::Float(v), PrimitiveKind::Float),
            LiteralKind::Double(v) => (Value::Double(v), PrimitiveKind::Double),
            LiteralKind::Bool(v) => (Value::Bool(v), PrimitiveKind::Bool),
            LiteralKind::String(text) => return self.compile_string(text, literal.span),
            LiteralKind::Null => {
                self.emit(Instr::PushConst(Value::Object(None)));
                return Ok(Operand::temp(DataType::null()));
            }
        };
        self.emit(Instr::PushConst(value));
        Ok(Operand::temp(DataType::primitive(kind)))
    }

    fn compile_string(&mut self, text: &str, span: Span) -> CompileResult<Operand> {
        let (Some(factory), Some(string_type)) = (&self.env.string_factory, &self.env.string_type) else {
            return Err(CompilationError::other(span, "String literals need a registered string factory"));
        };
        let constant = factory
            .get_string_constant(text.as_bytes())
            .ok_or_else(|| CompilationError::other(span, "The string factory rejected the constant"))?;
        let ty = DataType::of(string_type);
        self.note_group(string_type.get_config_group());
        self.strings.push(constant.clone());
        self.emit(Instr::PushConst(Value::String(constant)));
        Ok(Operand::temp(ty))
    }

    pub(super) fn compile_ident(&mut self, name: &QualifiedName<'ast>) -> CompileResult<Operand> {
        match self.lookup_variable(name) {
            Some(Symbol::Local { slot, ty, .. }) => {
                self.emit(Instr::LoadLocal(slot));
                Ok(Operand::value(ty))
            }
            Some(Symbol::Field { index, ty, .. }) => {
                self.emit(Instr::LoadThis);
                self.emit(Instr::LoadField(index));
                Ok(Operand::value(ty))
            }
            Some(Symbol::Global { slot, ty, group, .. }) => {
                self.note_group(group.as_deref());
                self.emit(Instr::LoadGlobal(slot));
                Ok(Operand::value(ty))
            }
            Some(Symbol::EnumValue { ty, value }) => {
                self.emit(Instr::PushConst(Value::Int32(value)));
                Ok(Operand::temp(ty))
            }
            None if !self.lookup_functions(name).is_empty() => Err(CompilationError::invalid(
                name.span(),
                format!("Function '{name}' can only be used where a funcdef is expected"),
            )),
            None => Err(CompilationError::UnknownVariable {
                name: name.to_string(),
                span: name.span(),
            }),
        }
    }

    fn compile_this(&mut self, span: Span) -> CompileResult<Operand> {
        let Some(class) = self.class.clone() else {
            return Err(CompilationError::invalid(span, "'this' is only available inside class methods"));
        };
        self.emit(Instr::LoadThis);
        Ok(Operand::value(DataType::of(&class)))
    }

    /// Property `name` of `info`, checking visibility.
    pub(super) fn find_property(&self, info: &TypeInfo, name: &str, span: Span) -> CompileResult<(u32, PropertyInfo)> {
        let index = info.property_index(name).ok_or_else(|| {
            CompilationError::UnknownVariable {
                name: format!("{}::{name}", info.get_name()),
                span,
            }
        })?;
        let prop = info
            .get_property(index as u32)
            .ok_or_else(|| CompilationError::other(span, "Property disappeared"))?;
        if (prop.is_private || prop.is_protected) && !self.can_access_hidden(info) {
            return Err(CompilationError::invalid(
                span,
                format!("Illegal access to inaccessible member '{name}'"),
            ));
        }
        Ok((index as u32, prop))
    }

    /// Type whose members `operand` exposes.
    pub(super) fn member_owner(&self, operand: &Operand, span: Span) -> CompileResult<TypeInfo> {
        match &operand.ty.kind {
            DataTypeKind::Object(info) => Ok(info.clone()),
            _ => Err(CompilationError::invalid(
                span,
                format!("Type '{}' has no members", operand.ty),
            )),
        }
    }

    fn compile_member(&mut self, member: &MemberExpr<'ast>) -> CompileResult<Operand> {
        let object = self.compile_expr(member.object)?;
        let owner = self.member_owner(&object, member.object.span())?;
        if owner.property_index(member.member.name).is_none() && !self.lookup_methods(&owner, member.member.name).is_empty() {
            return Err(CompilationError::invalid(
                member.member.span,
                format!("Method '{}' must be called, or bound through a funcdef", member.member.name),
            ));
        }
        let (index, prop) = self.find_property(&owner, member.member.name, member.member.span)?;
        self.emit(Instr::LoadField(index));
        Ok(Operand::value(prop.data_type))
    }

    // Operators

    fn compile_binary(&mut self, binary: &BinaryExpr<'ast>) -> CompileResult<Operand> {
        match binary.op {
            BinaryOp::And | BinaryOp::Or => return self.compile_logical(binary),
            BinaryOp::Is | BinaryOp::NotIs => return self.compile_identity(binary),
            _ => {}
        }
        let (left, left_code) = self.detached(|c| c.compile_expr(binary.left))?;
        let (right, right_code) = self.detached(|c| c.compile_expr(binary.right))?;
        let mismatch = || {
            CompilationError::mismatch(
                binary.span,
                format!("No matching operator '{}' for types '{}' and '{}'", binary.op, left.ty, right.ty),
            )
        };

        if binary.op == BinaryOp::Add && (left.ty.is_string() || right.ty.is_string()) {
            if !is_concatenable(&left.ty) || !is_concatenable(&right.ty) {
                return Err(mismatch());
            }
            let ty = if left.ty.is_string() { left.ty.unqualified() } else { right.ty.unqualified() };
            self.splice(left_code);
            self.splice(right_code);
            self.emit(Instr::Concat);
            return Ok(Operand::temp(ty));
        }

        if let Some(op) = compare_op(binary.op) {
            if left.ty.is_string() && right.ty.is_string() {
                self.splice(left_code);
                self.splice(right_code);
                self.emit(Instr::CompareStr(op));
                return Ok(Operand::temp(DataType::primitive(PrimitiveKind::Bool)));
            }
            if left.ty.is_handle_like() || right.ty.is_handle_like() || left.ty.is_object() || right.ty.is_object() {
                return Err(CompilationError::invalid(
                    binary.span,
                    format!("Operator '{}' does not compare handles; use 'is' or '!is'", binary.op),
                ));
            }
            let kind = if left.ty.is_bool() && right.ty.is_bool() {
                if !matches!(op, CompareOp::Eq | CompareOp::Ne) {
                    return Err(mismatch());
                }
                PrimitiveKind::Bool
            } else {
                arithmetic_kind(&left.ty, &right.ty).ok_or_else(mismatch)?
            };
            self.splice(left_code);
            self.convert_kind(&left.ty, kind);
            self.splice(right_code);
            self.convert_kind(&right.ty, kind);
            self.emit(Instr::Compare(op, kind));
            return Ok(Operand::temp(DataType::primitive(PrimitiveKind::Bool)));
        }

        if binary.op == BinaryOp::Xor {
            if !left.ty.is_bool() || !right.ty.is_bool() {
                return Err(mismatch());
            }
            self.splice(left_code);
            self.splice(right_code);
            self.emit(Instr::Compare(CompareOp::Ne, PrimitiveKind::Bool));
            return Ok(Operand::temp(DataType::primitive(PrimitiveKind::Bool)));
        }

        let op = arith_op(binary.op).ok_or_else(mismatch)?;
        let kind = self.operation_kind(binary.op, &left.ty, &right.ty, binary.span)?;
        self.splice(left_code);
        self.convert_kind(&left.ty, kind);
        self.splice(right_code);
        self.convert_kind(&right.ty, kind);
        self.emit(Instr::Arith(op, kind));
        Ok(Operand::temp(DataType::primitive(kind)))
    }

    /// Kind both operands of an arithmetic or bitwise operator convert to.
    fn operation_kind(&self, op: BinaryOp, left: &DataType, right: &DataType, span: Span) -> CompileResult<PrimitiveKind> {
        let mismatch = || {
            CompilationError::mismatch(
                span,
                format!("No matching operator '{op}' for types '{left}' and '{right}'"),
            )
        };
        if op.is_bitwise() {
            if !is_integer(left) || !is_integer(right) {
                return Err(mismatch());
            }
            let (l, r) = (
                left.primitive_kind().ok_or_else(mismatch)?,
                right.primitive_kind().ok_or_else(mismatch)?,
            );
            // shifts keep the type of the shifted value
            return Ok(match op {
                BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => promote(l, l),
                _ => promote(l, r),
            });
        }
        arithmetic_kind(left, right).ok_or_else(mismatch)
    }

    fn compile_logical(&mut self, binary: &BinaryExpr<'ast>) -> CompileResult<Operand> {
        self.compile_condition(binary.left)?;
        self.emit(Instr::Dup);
        let skip = if binary.op == BinaryOp::And {
            self.emit(Instr::JumpIfFalse(0))
        } else {
            self.emit(Instr::JumpIfTrue(0))
        };
        self.emit(Instr::Pop);
        self.compile_condition(binary.right)?;
        let end = self.here();
        self.patch(skip, end);
        Ok(Operand::temp(DataType::primitive(PrimitiveKind::Bool)))
    }

    fn compile_identity(&mut self, binary: &BinaryExpr<'ast>) -> CompileResult<Operand> {
        let left = self.compile_expr(binary.left)?;
        let right = self.compile_expr(binary.right)?;
        let referenceable = |ty: &DataType| (ty.is_object() && !ty.is_string()) || ty.is_null();
        if !referenceable(&left.ty) || !referenceable(&right.ty) {
            return Err(CompilationError::mismatch(
                binary.span,
                format!("Operator '{}' needs handles, not '{}' and '{}'", binary.op, left.ty, right.ty),
            ));
        }
        self.emit(Instr::Identity(binary.op == BinaryOp::NotIs));
        Ok(Operand::temp(DataType::primitive(PrimitiveKind::Bool)))
    }

    fn compile_unary(&mut self, unary: &UnaryExpr<'ast>) -> CompileResult<Operand> {
        match unary.op {
            UnaryOp::PreInc => return self.compile_increment(unary.operand, false, true, unary.span),
            UnaryOp::PreDec => return self.compile_increment(unary.operand, true, true, unary.span),
            _ => {}
        }
        let operand = self.compile_expr(unary.operand)?;
        let mismatch = || {
            CompilationError::mismatch(
                unary.span,
                format!("Operator is not defined for type '{}'", operand.ty),
            )
        };
        match unary.op {
            UnaryOp::Neg => {
                let kind = operand.ty.primitive_kind().filter(|k| k.is_numeric()).ok_or_else(mismatch)?;
                self.emit(Instr::Neg(kind));
                Ok(Operand::temp(DataType::primitive(kind)))
            }
            UnaryOp::Plus => {
                operand.ty.primitive_kind().filter(|k| k.is_numeric()).ok_or_else(mismatch)?;
                Ok(operand)
            }
            UnaryOp::Not => {
                if !operand.ty.is_bool() {
                    return Err(mismatch());
                }
                self.emit(Instr::Not);
                Ok(Operand::temp(operand.ty.unqualified()))
            }
            UnaryOp::BitNot => {
                if !is_integer(&operand.ty) {
                    return Err(mismatch());
                }
                let kind = operand.ty.primitive_kind().ok_or_else(mismatch)?;
                self.emit(Instr::BitNot(kind));
                Ok(Operand::temp(DataType::primitive(kind)))
            }
            UnaryOp::HandleOf => {
                if !operand.ty.is_object() || operand.ty.is_string() {
                    return Err(CompilationError::invalid(
                        unary.span,
                        format!("Object handle is not supported for '{}'", operand.ty),
                    ));
                }
                let mut ty = operand.ty;
                ty.is_handle = true;
                Ok(Operand { ty, temp: operand.temp })
            }
            UnaryOp::PreInc | UnaryOp::PreDec => Err(mismatch()),
        }
    }

    // Assignment

    /// Resolve an assignable expression. A field leaves its object on the
    /// stack.
    pub(super) fn compile_place(&mut self, expr: &Expr<'ast>) -> CompileResult<Place> {
        match expr {
            Expr::Paren(paren) => self.compile_place(paren.inner),
            Expr::Unary(unary) if unary.op == UnaryOp::HandleOf => self.compile_place(unary.operand),
            Expr::Ident(name) => match self.lookup_variable(name) {
                Some(Symbol::Local { slot, ty, is_const }) => Ok(Place {
                    kind: PlaceKind::Local(slot),
                    ty,
                    is_const,
                }),
                Some(Symbol::Field { index, ty, is_const }) => {
                    self.emit(Instr::LoadThis);
                    Ok(Place {
                        kind: PlaceKind::Field(index),
                        is_const: is_const || ty.is_const,
                        ty,
                    })
                }
                Some(Symbol::Global { slot, ty, is_const, group }) => {
                    self.note_group(group.as_deref());
                    Ok(Place {
                        kind: PlaceKind::Global(slot),
                        ty,
                        is_const,
                    })
                }
                Some(Symbol::EnumValue { .. }) => Err(CompilationError::invalid(
                    name.span(),
                    format!("Enum value '{name}' is not assignable"),
                )),
                None => Err(CompilationError::UnknownVariable {
                    name: name.to_string(),
                    span: name.span(),
                }),
            },
            Expr::Member(member) => {
                let object = self.compile_expr(member.object)?;
                let owner = self.member_owner(&object, member.object.span())?;
                let (index, prop) = self.find_property(&owner, member.member.name, member.member.span)?;
                Ok(Place {
                    kind: PlaceKind::Field(index),
                    is_const: object.ty.is_const || prop.data_type.is_const,
                    ty: prop.data_type,
                })
            }
            _ => Err(CompilationError::invalid(expr.span(), "Expression is not an l-value")),
        }
    }

    pub(super) fn load_place(&mut self, place: &Place) {
        match &place.kind {
            PlaceKind::Local(slot) => self.emit(Instr::LoadLocal(*slot)),
            PlaceKind::Global(slot) => self.emit(Instr::LoadGlobal(slot.clone())),
            PlaceKind::Field(index) => self.emit(Instr::LoadField(*index)),
        };
    }

    pub(super) fn store_place(&mut self, place: &Place) {
        match &place.kind {
            PlaceKind::Local(slot) => self.emit(Instr::StoreLocal(*slot)),
            PlaceKind::Global(slot) => self.emit(Instr::StoreGlobal(slot.clone())),
            PlaceKind::Field(index) => self.emit(Instr::StoreField(*index)),
        };
    }

    fn compile_assign(&mut self, assign: &AssignExpr<'ast>) -> CompileResult<Operand> {
        let is_handle_assign = matches!(
            assign.target.unparen(),
            Expr::Unary(unary) if unary.op == UnaryOp::HandleOf
        );
        let place = self.compile_place(assign.target)?;
        if place.is_const {
            return Err(CompilationError::invalid(
                assign.target.span(),
                "Can't assign to a read-only value",
            ));
        }
        let op = match assign.op {
            AssignOp::Assign => None,
            AssignOp::Compound(op) => Some(op),
        };
        let Some(op) = op else {
            if place.ty.is_object_value() && !is_handle_assign {
                // copy into the object the variable already holds
                self.load_place(&place);
                self.compile_to(assign.value, &place.ty, false)?;
                self.emit(Instr::AssignObject);
            } else {
                self.compile_to(assign.value, &place.ty, true)?;
                self.store_place(&place);
            }
            return Ok(Operand::value(place.ty));
        };

        if matches!(place.kind, PlaceKind::Field(_)) {
            self.emit(Instr::Dup);
        }
        self.load_place(&place);
        let (rhs, rhs_code) = self.detached(|c| c.compile_expr(assign.value))?;
        if place.ty.is_string() && op == BinaryOp::Add {
            if !is_concatenable(&rhs.ty) {
                return Err(CompilationError::mismatch(
                    assign.span,
                    format!("Can't append '{}' to a string", rhs.ty),
                ));
            }
            self.splice(rhs_code);
            self.emit(Instr::Concat);
        } else {
            let target = place
                .ty
                .primitive_kind()
                .filter(|k| k.is_numeric() && place.ty.is_primitive())
                .ok_or_else(|| {
                    CompilationError::mismatch(
                        assign.span,
                        format!("Operator '{op}=' is not defined for type '{}'", place.ty),
                    )
                })?;
            let arith = arith_op(op)
                .ok_or_else(|| CompilationError::invalid(assign.span, format!("Invalid compound operator '{op}='")))?;
            let kind = self.operation_kind(op, &place.ty, &rhs.ty, assign.span)?;
            self.convert_kind(&place.ty, kind);
            self.splice(rhs_code);
            self.convert_kind(&rhs.ty, kind);
            self.emit(Instr::Arith(arith, kind));
            if kind != target {
                self.emit(Instr::Convert(target));
            }
        }
        self.store_place(&place);
        Ok(Operand::value(place.ty))
    }

    fn compile_increment(&mut self, target: &Expr<'ast>, decrement: bool, prefix: bool, span: Span) -> CompileResult<Operand> {
        let place = self.compile_place(target)?;
        if place.is_const {
            return Err(CompilationError::invalid(span, "Can't modify a read-only value"));
        }
        let kind = place
            .ty
            .primitive_kind()
            .filter(|k| k.is_numeric() && place.ty.is_primitive())
            .ok_or_else(|| {
                CompilationError::mismatch(span, format!("Increment is not defined for type '{}'", place.ty))
            })?;
        let one = Value::Int32(1).convert(kind);
        let (op, undo) = if decrement { (ArithOp::Sub, ArithOp::Add) } else { (ArithOp::Add, ArithOp::Sub) };
        let is_field = matches!(place.kind, PlaceKind::Field(_));
        if is_field {
            self.emit(Instr::Dup);
        }
        self.load_place(&place);
        if !prefix && !is_field {
            self.emit(Instr::Dup);
        }
        self.emit(Instr::PushConst(one.clone()));
        self.emit(Instr::Arith(op, kind));
        self.store_place(&place);
        if !prefix {
            if is_field {
                // the object is gone, so recompute the old value
                self.emit(Instr::PushConst(one));
                self.emit(Instr::Arith(undo, kind));
            } else {
                self.emit(Instr::Pop);
            }
        }
        Ok(Operand::temp(DataType::primitive(kind)))
    }

    fn compile_ternary(&mut self, ternary: &TernaryExpr<'ast>) -> CompileResult<Operand> {
        self.compile_condition(ternary.condition)?;
        let (then, then_code) = self.detached(|c| c.compile_expr(ternary.then_expr))?;
        let (other, else_code) = self.detached(|c| c.compile_expr(ternary.else_expr))?;
        let ty = common_type(&then.ty, &other.ty).ok_or_else(|| {
            CompilationError::mismatch(
                ternary.span,
                format!("No common type for '{}' and '{}'", then.ty, other.ty),
            )
        })?;
        let to_else = self.emit(Instr::JumpIfFalse(0));
        self.splice(then_code);
        self.convert_operand(&then, &ty, false, ternary.then_expr.span())?;
        let to_end = self.emit(Instr::Jump(0));
        let else_start = self.here();
        self.patch(to_else, else_start);
        self.splice(else_code);
        self.convert_operand(&other, &ty, false, ternary.else_expr.span())?;
        let end = self.here();
        self.patch(to_end, end);
        Ok(Operand { ty, temp: then.temp && other.temp })
    }

    // Conversions

    fn compile_cast(&mut self, cast: &CastExpr<'ast>) -> CompileResult<Operand> {
        let target = self.types().resolve(&cast.target)?;
        let info = match &target.kind {
            DataTypeKind::Object(info) if target.is_handle => info.clone(),
            _ => {
                return Err(CompilationError::invalid(
                    cast.target.span,
                    format!("cast<> needs a handle type, not '{target}'"),
                ));
            }
        };
        self.note_group(info.get_config_group());
        let operand = self.compile_expr(cast.expr)?;
        let source = match &operand.ty.kind {
            DataTypeKind::Object(source) if !source.is_string_type() => source.clone(),
            DataTypeKind::Null => return Ok(Operand::temp(target)),
            _ => {
                return Err(CompilationError::mismatch(
                    cast.expr.span(),
                    format!("Can't cast '{}' to '{target}'", operand.ty),
                ));
            }
        };
        if !source.is_assignable_to(&info) {
            self.emit(Instr::Cast(info));
        }
        Ok(Operand::temp(target))
    }

    fn compile_construct(&mut self, construct: &ConstructExpr<'ast>) -> CompileResult<Operand> {
        let target = self.types().resolve(&construct.ty)?;
        let Some(kind) = target.primitive_kind().filter(|_| target.is_primitive()) else {
            return Err(CompilationError::invalid(construct.span, "Expected a primitive type"));
        };
        let [arg] = construct.args else {
            return Err(CompilationError::invalid(
                construct.span,
                format!("Conversion to '{target}' takes exactly one argument"),
            ));
        };
        if arg.name.is_some() {
            return Err(CompilationError::invalid(arg.span, "Named arguments are not supported"));
        }
        let operand = self.compile_expr(arg.value)?;
        let step = explicit_primitive(&operand.ty, kind).ok_or_else(|| {
            CompilationError::mismatch(
                construct.span,
                format!("Can't convert from '{}' to '{target}'", operand.ty),
            )
        })?;
        step.emit(&mut self.code);
        Ok(Operand::temp(DataType::primitive(kind)))
    }
}
