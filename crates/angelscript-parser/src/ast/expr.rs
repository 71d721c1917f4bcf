//! Expression nodes.
//!
//! Precedence, lowest first: assignment, `?:`, `|| ^^`, `&&`, `|`, `^`, `&`,
//! equality and `is`, relational, shifts, additive, multiplicative, `**`,
//! prefix operators, then postfix operators, calls and member access.

use angelscript_core::Span;

use super::node::{Ident, QualifiedName};
use super::ops::{AssignOp, BinaryOp, PostfixOp, UnaryOp};
use super::types::TypeExpr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    Literal(LiteralExpr<'ast>),
    Ident(QualifiedName<'ast>),
    This(Span),
    Binary(&'ast BinaryExpr<'ast>),
    Unary(&'ast UnaryExpr<'ast>),
    Postfix(&'ast PostfixExpr<'ast>),
    Assign(&'ast AssignExpr<'ast>),
    Ternary(&'ast TernaryExpr<'ast>),
    Call(&'ast CallExpr<'ast>),
    Member(&'ast MemberExpr<'ast>),
    Cast(&'ast CastExpr<'ast>),
    /// `int(x)`, `float(y)`: conversion spelled as a constructor call on a
    /// primitive keyword. Calls on named types parse as [`Expr::Call`].
    Construct(&'ast ConstructExpr<'ast>),
    Paren(&'ast ParenExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(e) => e.span,
            Expr::Ident(name) => name.span(),
            Expr::This(span) => *span,
            Expr::Binary(e) => e.span,
            Expr::Unary(e) => e.span,
            Expr::Postfix(e) => e.span,
            Expr::Assign(e) => e.span,
            Expr::Ternary(e) => e.span,
            Expr::Call(e) => e.span,
            Expr::Member(e) => e.span,
            Expr::Cast(e) => e.span,
            Expr::Construct(e) => e.span,
            Expr::Paren(e) => e.span,
        }
    }

    /// Strip any number of parentheses.
    pub fn unparen(&self) -> &Expr<'ast> {
        let mut expr = self;
        while let Expr::Paren(inner) = expr {
            expr = inner.inner;
        }
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiteralExpr<'ast> {
    pub kind: LiteralKind<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralKind<'ast> {
    /// Unsuffixed integer. Negative literals are a unary minus on this.
    Int(u64),
    /// Hex, binary or octal literal; typed as unsigned.
    Bits(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    /// Unescaped contents; adjacent literals are already concatenated.
    String(&'ast str),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    pub left: &'ast Expr<'ast>,
    pub op: BinaryOp,
    pub right: &'ast Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryExpr<'ast> {
    pub op: UnaryOp,
    pub operand: &'ast Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostfixExpr<'ast> {
    pub operand: &'ast Expr<'ast>,
    pub op: PostfixOp,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignExpr<'ast> {
    pub target: &'ast Expr<'ast>,
    pub op: AssignOp,
    pub value: &'ast Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TernaryExpr<'ast> {
    pub condition: &'ast Expr<'ast>,
    pub then_expr: &'ast Expr<'ast>,
    pub else_expr: &'ast Expr<'ast>,
    pub span: Span,
}

/// A call argument, optionally named (`f(count: 3)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Argument<'ast> {
    pub name: Option<Ident<'ast>>,
    pub value: &'ast Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    pub callee: &'ast Expr<'ast>,
    pub args: &'ast [Argument<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberExpr<'ast> {
    pub object: &'ast Expr<'ast>,
    pub member: Ident<'ast>,
    pub span: Span,
}

/// `cast<T>(expr)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastExpr<'ast> {
    pub target: TypeExpr<'ast>,
    pub expr: &'ast Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstructExpr<'ast> {
    pub ty: TypeExpr<'ast>,
    pub args: &'ast [Argument<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParenExpr<'ast> {
    pub inner: &'ast Expr<'ast>,
    pub span: Span,
}
