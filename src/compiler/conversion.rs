//! Implicit and explicit conversions between data types, with the costs
//! overload resolution ranks candidates by.

use angelscript_core::PrimitiveKind;

use crate::types::data_type::{DataType, DataTypeKind};
use crate::types::script_value::Value;
use crate::vm::instruction::Instr;

/// Code needed to turn a value of one type into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Nothing,
    Convert(PrimitiveKind),
    /// `null` into a funcdef handle.
    NullFunction,
}

impl Step {
    pub(crate) fn emit(self, code: &mut Vec<Instr>) {
        match self {
            Step::Nothing => {}
            Step::Convert(kind) => code.push(Instr::Convert(kind)),
            Step::NullFunction => {
                code.push(Instr::Pop);
                code.push(Instr::PushConst(Value::Function(None)));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conversion {
    pub(crate) cost: u32,
    pub(crate) step: Step,
}

impl Conversion {
    const fn free() -> Self {
        Self { cost: 0, step: Step::Nothing }
    }

    const fn costing(cost: u32, step: Step) -> Self {
        Self { cost, step }
    }
}

/// Cost of converting between two primitive kinds, `None` when no implicit
/// conversion exists.
pub(crate) fn primitive_cost(from: PrimitiveKind, to: PrimitiveKind) -> Option<u32> {
    use PrimitiveKind::*;
    if from == to {
        return Some(0);
    }
    if matches!(from, Void | Bool) || matches!(to, Void | Bool) {
        return None;
    }
    let cost = match (from.is_float(), to.is_float()) {
        (false, false) => {
            if to.size() < from.size() {
                3
            } else if from.is_signed() != to.is_signed() {
                2
            } else {
                1
            }
        }
        (false, true) => 3,
        (true, false) => 4,
        (true, true) => {
            if from == Double { 3 } else { 1 }
        }
    };
    Some(cost)
}

/// How a value of type `from` converts implicitly to `to`.
pub(crate) fn implicit(from: &DataType, to: &DataType) -> Option<Conversion> {
    match (&from.kind, &to.kind) {
        (DataTypeKind::Primitive(a), DataTypeKind::Primitive(b)) => {
            let cost = primitive_cost(*a, *b)?;
            let step = if cost == 0 { Step::Nothing } else { Step::Convert(*b) };
            Some(Conversion::costing(cost, step))
        }
        (DataTypeKind::Enum(a), DataTypeKind::Enum(b)) => a.ptr_eq(b).then(Conversion::free),
        (DataTypeKind::Enum(_), DataTypeKind::Primitive(b)) => {
            let cost = primitive_cost(PrimitiveKind::Int32, *b)?;
            let step = if cost == 0 { Step::Nothing } else { Step::Convert(*b) };
            Some(Conversion::costing(cost + 1, step))
        }
        (DataTypeKind::Null, DataTypeKind::Object(info)) => {
            (to.is_handle && !info.is_string_type()).then(Conversion::free)
        }
        (DataTypeKind::Null, DataTypeKind::Funcdef(_)) => Some(Conversion::costing(0, Step::NullFunction)),
        (DataTypeKind::Object(a), DataTypeKind::Object(b)) => object_cost(from, a, to, b),
        (DataTypeKind::Funcdef(a), DataTypeKind::Funcdef(b)) => {
            if a.ptr_eq(b) {
                return Some(Conversion::free());
            }
            let (sa, sb) = (a.get_funcdef_signature()?, b.get_funcdef_signature()?);
            sa.signature().matches(sb.signature()).then(|| Conversion::costing(1, Step::Nothing))
        }
        _ => None,
    }
}

fn object_cost(
    from: &DataType,
    a: &crate::core::typeinfo::TypeInfo,
    to: &DataType,
    b: &crate::core::typeinfo::TypeInfo,
) -> Option<Conversion> {
    if a.is_string_type() || b.is_string_type() {
        return a.ptr_eq(b).then(Conversion::free);
    }
    // a handle to const never loses its constness
    if from.is_handle && to.is_handle && from.is_const && !to.is_const {
        return None;
    }
    let same = a.ptr_eq(b);
    if !same && !a.is_assignable_to(b) {
        return None;
    }
    let mut cost = if same { 0 } else { 1 };
    if from.is_handle != to.is_handle {
        // implicit handle of a value, or the object behind a handle
        cost += 1;
    }
    Some(Conversion::costing(cost, Step::Nothing))
}

/// Explicit conversion written as `T(expr)` for a primitive `T`.
pub(crate) fn explicit_primitive(from: &DataType, to: PrimitiveKind) -> Option<Step> {
    let source = from.primitive_kind()?;
    if to == PrimitiveKind::Void || source == PrimitiveKind::Void {
        return None;
    }
    if (to == PrimitiveKind::Bool) != (source == PrimitiveKind::Bool) {
        return None;
    }
    Some(if source == to && !from.is_enum() { Step::Nothing } else { Step::Convert(to) })
}

/// Result type of a binary arithmetic operation on two numeric operands.
pub(crate) fn arithmetic_kind(left: &DataType, right: &DataType) -> Option<PrimitiveKind> {
    let (a, b) = (left.primitive_kind()?, right.primitive_kind()?);
    if !a.is_numeric() || !b.is_numeric() {
        return None;
    }
    Some(crate::vm::ops::promote(a, b))
}

/// Common type of the two branches of `?:`.
pub(crate) fn common_type(a: &DataType, b: &DataType) -> Option<DataType> {
    if a.unqualified() == b.unqualified() {
        return Some(a.clone());
    }
    if a.is_numeric_like() && b.is_numeric_like() && !a.is_bool() && !b.is_bool() {
        return arithmetic_kind(a, b).map(DataType::primitive);
    }
    if a.is_null() && b.is_handle_like() {
        return Some(b.clone());
    }
    if b.is_null() && a.is_handle_like() {
        return Some(a.clone());
    }
    match (implicit(b, a), implicit(a, b)) {
        (Some(_), _) => Some(a.clone()),
        (None, Some(_)) => Some(b.clone()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveKind::*;

    #[test]
    fn numeric_costs_rank_widening_first() {
        assert_eq!(primitive_cost(Int32, Int32), Some(0));
        assert_eq!(primitive_cost(Int8, Int64), Some(1));
        assert_eq!(primitive_cost(Int32, Uint32), Some(2));
        assert_eq!(primitive_cost(Int64, Int8), Some(3));
        assert_eq!(primitive_cost(Int32, Double), Some(3));
        assert_eq!(primitive_cost(Double, Int32), Some(4));
        assert_eq!(primitive_cost(Float, Double), Some(1));
        assert_eq!(primitive_cost(Bool, Int32), None);
        assert_eq!(primitive_cost(Int32, Bool), None);
    }

    #[test]
    fn null_converts_to_handles_only() {
        let null = DataType::null();
        assert!(implicit(&null, &DataType::primitive(Int32)).is_none());
        assert!(implicit(&DataType::primitive(Int32), &DataType::primitive(Float)).is_some());
    }

    #[test]
    fn explicit_conversions_reject_bool_mixing() {
        let int = DataType::primitive(Int32);
        assert_eq!(explicit_primitive(&int, Float), Some(Step::Convert(Float)));
        assert_eq!(explicit_primitive(&int, Int32), Some(Step::Nothing));
        assert_eq!(explicit_primitive(&int, Bool), None);
        assert_eq!(explicit_primitive(&DataType::primitive(Bool), Bool), Some(Step::Nothing));
    }

    #[test]
    fn ternary_branches_promote() {
        let ty = common_type(&DataType::primitive(Int32), &DataType::primitive(Double)).unwrap();
        assert_eq!(ty, DataType::primitive(Double));
        assert!(common_type(&DataType::primitive(Bool), &DataType::primitive(Int32)).is_none());
    }
}
