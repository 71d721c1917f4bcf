//! Primitive arithmetic with script semantics: integer operations wrap,
//! division and modulo check for zero and for `MIN / -1`.

use angelscript_core::PrimitiveKind;

use crate::types::script_value::Value;
use crate::vm::instruction::{ArithOp, CompareOp};

pub(crate) const DIVIDE_BY_ZERO: &str = "Divide by zero";
pub(crate) const DIVIDE_OVERFLOW: &str = "Overflow in integer division";
pub(crate) const POW_OVERFLOW: &str = "Overflow in exponent operation";
pub(crate) const INVALID_OPERATION: &str = "Invalid operation";

fn signed_min(kind: PrimitiveKind) -> i64 {
    match kind.size() {
        1 => i8::MIN as i64,
        2 => i16::MIN as i64,
        4 => i32::MIN as i64,
        _ => i64::MIN,
    }
}

fn width_mask(kind: PrimitiveKind) -> u64 {
    match kind.size() {
        8 => u64::MAX,
        size => (1u64 << (size * 8)) - 1,
    }
}

pub(crate) fn arith(op: ArithOp, kind: PrimitiveKind, a: &Value, b: &Value) -> Result<Value, &'static str> {
    if kind.is_float() {
        return float_arith(op, kind, a.as_f64(), b.as_f64());
    }
    let signed = kind.is_signed();
    let (x, y) = if signed {
        (a.as_i64() as u64, b.as_i64() as u64)
    } else {
        (a.as_u64() & width_mask(kind), b.as_u64() & width_mask(kind))
    };
    let bits = kind.size() * 8;
    let shift = (b.as_u64() & (bits as u64 - 1)) as u32;
    let result = match op {
        ArithOp::Add => x.wrapping_add(y),
        ArithOp::Sub => x.wrapping_sub(y),
        ArithOp::Mul => x.wrapping_mul(y),
        ArithOp::Div | ArithOp::Mod => {
            if y == 0 {
                return Err(DIVIDE_BY_ZERO);
            }
            if signed {
                let (sa, sb) = (x as i64, y as i64);
                if sb == -1 && sa == signed_min(kind) {
                    return Err(DIVIDE_OVERFLOW);
                }
                if op == ArithOp::Div { (sa / sb) as u64 } else { (sa % sb) as u64 }
            } else if op == ArithOp::Div {
                x / y
            } else {
                x % y
            }
        }
        ArithOp::Pow => int_pow(kind, x, y)?,
        ArithOp::BitAnd => x & y,
        ArithOp::BitOr => x | y,
        ArithOp::BitXor => x ^ y,
        ArithOp::Shl => x << shift,
        ArithOp::Shr if signed => ((x as i64) >> shift) as u64,
        ArithOp::Shr => x >> shift,
        ArithOp::UShr => (x & width_mask(kind)) >> shift,
    };
    Ok(Value::from_bits(kind, result))
}

fn int_pow(kind: PrimitiveKind, x: u64, y: u64) -> Result<u64, &'static str> {
    if kind.is_signed() {
        let (base, exp) = (x as i64, y as i64);
        if exp < 0 {
            return match base {
                0 => Err(DIVIDE_BY_ZERO),
                1 => Ok(1),
                -1 => Ok(if exp % 2 == 0 { 1 } else { -1i64 as u64 }),
                _ => Ok(0),
            };
        }
        let exp = u32::try_from(exp).map_err(|_| POW_OVERFLOW)?;
        let value = base.checked_pow(exp).ok_or(POW_OVERFLOW)?;
        // must also fit the operation width
        if Value::from_bits(kind, value as u64).as_i64() != value {
            return Err(POW_OVERFLOW);
        }
        Ok(value as u64)
    } else {
        let exp = u32::try_from(y).map_err(|_| POW_OVERFLOW)?;
        let value = x.checked_pow(exp).ok_or(POW_OVERFLOW)?;
        if value & !width_mask(kind) != 0 {
            return Err(POW_OVERFLOW);
        }
        Ok(value)
    }
}

fn float_arith(op: ArithOp, kind: PrimitiveKind, x: f64, y: f64) -> Result<Value, &'static str> {
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div | ArithOp::Mod if y == 0.0 => return Err(DIVIDE_BY_ZERO),
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
        ArithOp::Pow => {
            let value = x.powf(y);
            if value.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(POW_OVERFLOW);
            }
            value
        }
        _ => return Err(INVALID_OPERATION),
    };
    Ok(match kind {
        PrimitiveKind::Float => Value::Float(result as f32),
        _ => Value::Double(result),
    })
}

pub(crate) fn compare(op: CompareOp, kind: PrimitiveKind, a: &Value, b: &Value) -> bool {
    let ordering = if kind.is_float() {
        a.as_f64().partial_cmp(&b.as_f64())
    } else if kind.is_signed() {
        Some(a.as_i64().cmp(&b.as_i64()))
    } else {
        Some(a.as_u64().cmp(&b.as_u64()))
    };
    match ordering {
        Some(ordering) => op.test(ordering),
        // NaN compares unequal to everything
        None => op == CompareOp::Ne,
    }
}

pub(crate) fn compare_str(op: CompareOp, a: &Value, b: &Value) -> bool {
    let a = a.as_string().map_or("", |s| s.as_str());
    let b = b.as_string().map_or("", |s| s.as_str());
    op.test(a.cmp(b))
}

pub(crate) fn neg(kind: PrimitiveKind, value: &Value) -> Value {
    match kind {
        PrimitiveKind::Float => Value::Float(-(value.as_f64() as f32)),
        PrimitiveKind::Double => Value::Double(-value.as_f64()),
        _ => Value::from_bits(kind, value.as_i64().wrapping_neg() as u64),
    }
}

pub(crate) fn bit_not(kind: PrimitiveKind, value: &Value) -> Value {
    Value::from_bits(kind, !value.to_bits())
}

/// Result kind of a binary numeric operation on `a` and `b`: the wider
/// operand wins, floating point beats integers, and mixed signedness takes
/// the signed kind of the wider size.
pub(crate) fn promote(a: PrimitiveKind, b: PrimitiveKind) -> PrimitiveKind {
    use PrimitiveKind::*;
    if a == Double || b == Double {
        return Double;
    }
    if a == Float || b == Float {
        return Float;
    }
    let size = a.size().max(b.size()).max(4);
    let signed = a.is_signed() || b.is_signed() || a == Bool || b == Bool;
    match (size, signed) {
        (8, true) => Int64,
        (8, false) => Uint64,
        (_, true) => Int32,
        (_, false) => Uint32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        let r = arith(ArithOp::Add, PrimitiveKind::Int32, &Value::Int32(i32::MAX), &Value::Int32(1));
        assert_eq!(r, Ok(Value::Int32(i32::MIN)));
        let r = arith(ArithOp::Sub, PrimitiveKind::Uint32, &Value::UInt32(0), &Value::UInt32(1));
        assert_eq!(r, Ok(Value::UInt32(u32::MAX)));
    }

    #[test]
    fn division_checks() {
        let zero = arith(ArithOp::Div, PrimitiveKind::Int32, &Value::Int32(1), &Value::Int32(0));
        assert_eq!(zero, Err(DIVIDE_BY_ZERO));
        let overflow = arith(ArithOp::Div, PrimitiveKind::Int32, &Value::Int32(i32::MIN), &Value::Int32(-1));
        assert_eq!(overflow, Err(DIVIDE_OVERFLOW));
        let fzero = arith(ArithOp::Mod, PrimitiveKind::Double, &Value::Double(1.0), &Value::Double(0.0));
        assert_eq!(fzero, Err(DIVIDE_BY_ZERO));
        let ok = arith(ArithOp::Mod, PrimitiveKind::Int32, &Value::Int32(-7), &Value::Int32(3));
        assert_eq!(ok, Ok(Value::Int32(-1)));
    }

    #[test]
    fn shifts_respect_signedness() {
        let v = Value::Int32(-8);
        assert_eq!(arith(ArithOp::Shr, PrimitiveKind::Int32, &v, &Value::Int32(1)), Ok(Value::Int32(-4)));
        assert_eq!(
            arith(ArithOp::UShr, PrimitiveKind::Int32, &v, &Value::Int32(28)),
            Ok(Value::Int32(0xF))
        );
        assert_eq!(arith(ArithOp::Shl, PrimitiveKind::Int32, &Value::Int32(1), &Value::Int32(33)), Ok(Value::Int32(2)));
    }

    #[test]
    fn powers() {
        assert_eq!(arith(ArithOp::Pow, PrimitiveKind::Int32, &Value::Int32(2), &Value::Int32(10)), Ok(Value::Int32(1024)));
        assert_eq!(
            arith(ArithOp::Pow, PrimitiveKind::Int32, &Value::Int32(2), &Value::Int32(31)),
            Err(POW_OVERFLOW)
        );
        assert_eq!(arith(ArithOp::Pow, PrimitiveKind::Int32, &Value::Int32(-1), &Value::Int32(-3)), Ok(Value::Int32(-1)));
        assert_eq!(arith(ArithOp::Pow, PrimitiveKind::Double, &Value::Double(2.0), &Value::Double(3.0)), Ok(Value::Double(8.0)));
    }

    #[test]
    fn comparisons() {
        assert!(compare(CompareOp::Lt, PrimitiveKind::Int32, &Value::Int32(-1), &Value::Int32(0)));
        assert!(!compare(CompareOp::Lt, PrimitiveKind::Uint32, &Value::UInt32(u32::MAX), &Value::UInt32(0)));
        assert!(compare(CompareOp::Ne, PrimitiveKind::Double, &Value::Double(f64::NAN), &Value::Double(f64::NAN)));
        assert!(compare_str(CompareOp::Lt, &Value::from("abc"), &Value::from("abd")));
    }

    #[test]
    fn promotion_rules() {
        use PrimitiveKind::*;
        assert_eq!(promote(Int8, Int16), Int32);
        assert_eq!(promote(Int32, Uint64), Int64);
        assert_eq!(promote(Uint32, Uint32), Uint32);
        assert_eq!(promote(Int64, Float), Float);
        assert_eq!(promote(Float, Double), Double);
    }

    #[test]
    fn unary_ops() {
        assert_eq!(neg(PrimitiveKind::Int32, &Value::Int32(5)), Value::Int32(-5));
        assert_eq!(bit_not(PrimitiveKind::Uint8, &Value::UInt8(0x0F)), Value::UInt8(0xF0));
        assert_eq!(neg(PrimitiveKind::Float, &Value::Float(1.5)), Value::Float(-1.5));
    }
}
