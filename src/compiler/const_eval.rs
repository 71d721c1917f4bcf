//! Integer constant expressions: enum values and `case` labels.

use angelscript_core::CompilationError;
use angelscript_parser::ast::{BinaryOp, Expr, LiteralKind, QualifiedName, UnaryOp};

/// Evaluate `expr` as a 64-bit integer constant. Names are resolved through
/// `lookup`, which knows the enum values in scope.
pub(crate) fn eval_int(
    expr: &Expr<'_>,
    lookup: &dyn Fn(&QualifiedName<'_>) -> Option<i64>,
) -> Result<i64, CompilationError> {
    let not_constant = || CompilationError::other(expr.span(), "Expression must be constant");
    match expr {
        Expr::Literal(literal) => match literal.kind {
            LiteralKind::Int(v) | LiteralKind::Bits(v) => Ok(v as i64),
            LiteralKind::Bool(b) => Ok(b as i64),
            _ => Err(not_constant()),
        },
        Expr::Paren(paren) => eval_int(paren.inner, lookup),
        Expr::Ident(name) => lookup(name).ok_or_else(|| CompilationError::UnknownVariable {
            name: name.to_string(),
            span: name.span(),
        }),
        Expr::Unary(unary) => {
            let value = eval_int(unary.operand, lookup)?;
            match unary.op {
                UnaryOp::Neg => Ok(value.wrapping_neg()),
                UnaryOp::Plus => Ok(value),
                UnaryOp::BitNot => Ok(!value),
                _ => Err(not_constant()),
            }
        }
        Expr::Binary(binary) => {
            let a = eval_int(binary.left, lookup)?;
            let b = eval_int(binary.right, lookup)?;
            let divide_by_zero = || CompilationError::invalid(binary.span, "Divide by zero");
            Ok(match binary.op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.checked_div(b).ok_or_else(divide_by_zero)?,
                BinaryOp::Mod => a.checked_rem(b).ok_or_else(divide_by_zero)?,
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a.wrapping_shl(b as u32),
                BinaryOp::Shr => a.wrapping_shr(b as u32),
                BinaryOp::UShr => ((a as u64).wrapping_shr(b as u32)) as i64,
                _ => return Err(not_constant()),
            })
        }
        _ => Err(not_constant()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angelscript_parser::ast::Parser;
    use bumpalo::Bump;

    fn eval(source: &str) -> Result<i64, CompilationError> {
        let arena = Bump::new();
        let expr = Parser::parse_expression(source, &arena).unwrap();
        eval_int(expr, &|name| (name.ident.name == "B").then_some(2))
    }

    #[test]
    fn arithmetic_and_names() {
        assert_eq!(eval("1 << 4").unwrap(), 16);
        assert_eq!(eval("-(B + 1) * 3").unwrap(), -9);
        assert_eq!(eval("0xff & ~1").unwrap(), 0xfe);
    }

    #[test]
    fn non_constants_are_rejected() {
        assert!(eval("1.5").is_err());
        assert!(matches!(eval("C"), Err(CompilationError::UnknownVariable { .. })));
        assert!(eval("1 / 0").is_err());
    }
}
