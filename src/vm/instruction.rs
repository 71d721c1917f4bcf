use std::fmt;
use std::sync::{Arc, Weak};

use angelscript_core::PrimitiveKind;

use crate::core::function::{Function, FunctionData};
use crate::core::typeinfo::TypeInfo;
use crate::types::global_slot::GlobalSlot;
use crate::types::script_value::Value;

/// Arithmetic and bitwise operators. Both operands are already converted to
/// the operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub(crate) fn test(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
        }
    }
}

/// One VM instruction.
///
/// Calls push the callee's arguments left to right; method calls push the
/// object first. Stores leave the stored value on the stack.
pub(crate) enum Instr {
    PushConst(Value),
    LoadLocal(u32),
    StoreLocal(u32),
    /// Reset a local to its type's default, releasing what it held.
    ClearLocal(u32),
    LoadGlobal(Arc<GlobalSlot>),
    StoreGlobal(Arc<GlobalSlot>),
    /// `[object] -> [value]`
    LoadField(u32),
    /// `[object, value] -> [value]`
    StoreField(u32),
    LoadThis,
    Pop,
    Dup,
    Arith(ArithOp, PrimitiveKind),
    Compare(CompareOp, PrimitiveKind),
    /// String comparison.
    CompareStr(CompareOp),
    /// Handle identity; `true` negates (`!is`).
    Identity(bool),
    Not,
    Neg(PrimitiveKind),
    BitNot(PrimitiveKind),
    Convert(PrimitiveKind),
    /// `[a, b] -> [string]`, either side formatted with `Display`.
    Concat,
    Jump(usize),
    JumpIfFalse(usize),
    JumpIfTrue(usize),
    Call { function: Weak<FunctionData>, argc: u32 },
    /// Method call with the object below the arguments. Virtual calls are
    /// resolved against the object's runtime type.
    CallMethod { function: Weak<FunctionData>, argc: u32, is_virtual: bool },
    /// Call through a funcdef handle stored below the arguments.
    CallPtr { argc: u32 },
    CallImport { function: Weak<FunctionData>, argc: u32 },
    /// Allocate a script class instance and run `ctor` on it.
    New { type_info: TypeInfo, ctor: Weak<FunctionData>, argc: u32 },
    Return,
    ReturnValue,
    Line(i32, i32),
    /// `[handle] -> [handle or null]`
    Cast(TypeInfo),
    /// `[object] -> [copy]`
    CopyObject,
    /// `[target, source] -> [target]` after copying properties.
    AssignObject,
    /// Enter a `try` block whose `catch` starts at the operand.
    TryBegin(usize),
    TryEnd,
    /// `[object] -> [delegate]` bound to the method.
    MakeDelegate(Weak<FunctionData>),
    PushFunction(Weak<FunctionData>),
}

fn name_of(function: &Weak<FunctionData>) -> String {
    function
        .upgrade()
        .map(|f| Function(f).get_name().to_string())
        .unwrap_or_else(|| "<discarded>".into())
}

impl fmt::Debug for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::PushConst(v) => write!(f, "PushConst {v:?}"),
            Instr::LoadLocal(i) => write!(f, "LoadLocal {i}"),
            Instr::StoreLocal(i) => write!(f, "StoreLocal {i}"),
            Instr::ClearLocal(i) => write!(f, "ClearLocal {i}"),
            Instr::LoadGlobal(_) => f.write_str("LoadGlobal"),
            Instr::StoreGlobal(_) => f.write_str("StoreGlobal"),
            Instr::LoadField(i) => write!(f, "LoadField {i}"),
            Instr::StoreField(i) => write!(f, "StoreField {i}"),
            Instr::LoadThis => f.write_str("LoadThis"),
            Instr::Pop => f.write_str("Pop"),
            Instr::Dup => f.write_str("Dup"),
            Instr::Arith(op, kind) => write!(f, "Arith {op:?} {kind}"),
            Instr::Compare(op, kind) => write!(f, "Compare {op:?} {kind}"),
            Instr::CompareStr(op) => write!(f, "CompareStr {op:?}"),
            Instr::Identity(negate) => write!(f, "Identity {negate}"),
            Instr::Not => f.write_str("Not"),
            Instr::Neg(kind) => write!(f, "Neg {kind}"),
            Instr::BitNot(kind) => write!(f, "BitNot {kind}"),
            Instr::Convert(kind) => write!(f, "Convert {kind}"),
            Instr::Concat => f.write_str("Concat"),
            Instr::Jump(t) => write!(f, "Jump {t}"),
            Instr::JumpIfFalse(t) => write!(f, "JumpIfFalse {t}"),
            Instr::JumpIfTrue(t) => write!(f, "JumpIfTrue {t}"),
            Instr::Call { function, argc } => write!(f, "Call {} {argc}", name_of(function)),
            Instr::CallMethod { function, argc, is_virtual } => {
                write!(f, "CallMethod {} {argc} virtual={is_virtual}", name_of(function))
            }
            Instr::CallPtr { argc } => write!(f, "CallPtr {argc}"),
            Instr::CallImport { function, argc } => write!(f, "CallImport {} {argc}", name_of(function)),
            Instr::New { type_info, argc, .. } => write!(f, "New {} {argc}", type_info.get_name()),
            Instr::Return => f.write_str("Return"),
            Instr::ReturnValue => f.write_str("ReturnValue"),
            Instr::Line(l, c) => write!(f, "Line {l}:{c}"),
            Instr::Cast(t) => write!(f, "Cast {}", t.get_name()),
            Instr::CopyObject => f.write_str("CopyObject"),
            Instr::AssignObject => f.write_str("AssignObject"),
            Instr::TryBegin(t) => write!(f, "TryBegin {t}"),
            Instr::TryEnd => f.write_str("TryEnd"),
            Instr::MakeDelegate(m) => write!(f, "MakeDelegate {}", name_of(m)),
            Instr::PushFunction(func) => write!(f, "PushFunction {}", name_of(func)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn compare_ops_map_orderings() {
        assert!(CompareOp::Le.test(Ordering::Equal));
        assert!(CompareOp::Le.test(Ordering::Less));
        assert!(!CompareOp::Gt.test(Ordering::Equal));
        assert!(CompareOp::Ne.test(Ordering::Greater));
    }

    #[test]
    fn debug_names_discarded_targets() {
        let instr = Instr::Call { function: Weak::new(), argc: 2 };
        assert_eq!(format!("{instr:?}"), "Call <discarded> 2");
    }
}
