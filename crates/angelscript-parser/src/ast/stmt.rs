//! Statement nodes.

use angelscript_core::Span;

use super::expr::{Argument, Expr};
use super::node::Ident;
use super::types::TypeExpr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    /// Expression statement; `None` for a bare `;`.
    Expr(Option<&'ast Expr<'ast>>, Span),
    Var(VarDecl<'ast>),
    Return(ReturnStmt<'ast>),
    Break(Span),
    Continue(Span),
    Block(Block<'ast>),
    If(&'ast IfStmt<'ast>),
    While(&'ast WhileStmt<'ast>),
    DoWhile(&'ast DoWhileStmt<'ast>),
    For(&'ast ForStmt<'ast>),
    Switch(&'ast SwitchStmt<'ast>),
    Try(&'ast TryStmt<'ast>),
}

impl Stmt<'_> {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(_, span) | Stmt::Break(span) | Stmt::Continue(span) => *span,
            Stmt::Var(v) => v.span,
            Stmt::Return(r) => r.span,
            Stmt::Block(b) => b.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::DoWhile(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Switch(s) => s.span,
            Stmt::Try(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'ast> {
    pub stmts: &'ast [Stmt<'ast>],
    pub span: Span,
}

/// `T a = 1, b, c(2);` at any scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDecl<'ast> {
    pub ty: TypeExpr<'ast>,
    pub vars: &'ast [VarDeclarator<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDeclarator<'ast> {
    pub name: Ident<'ast>,
    pub init: Option<VarInit<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarInit<'ast> {
    /// `= expr`
    Expr(&'ast Expr<'ast>),
    /// `name(args)`
    Args(&'ast [Argument<'ast>]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnStmt<'ast> {
    pub value: Option<&'ast Expr<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfStmt<'ast> {
    pub condition: &'ast Expr<'ast>,
    pub then_branch: Stmt<'ast>,
    pub else_branch: Option<Stmt<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhileStmt<'ast> {
    pub condition: &'ast Expr<'ast>,
    pub body: Stmt<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoWhileStmt<'ast> {
    pub body: Stmt<'ast>,
    pub condition: &'ast Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForInit<'ast> {
    Var(VarDecl<'ast>),
    Expr(&'ast Expr<'ast>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForStmt<'ast> {
    pub init: Option<ForInit<'ast>>,
    pub condition: Option<&'ast Expr<'ast>>,
    pub update: &'ast [&'ast Expr<'ast>],
    pub body: Stmt<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchStmt<'ast> {
    pub expr: &'ast Expr<'ast>,
    pub cases: &'ast [SwitchCase<'ast>],
    pub span: Span,
}

/// One `case`/`default` label group. `values` is empty for `default`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchCase<'ast> {
    pub values: &'ast [&'ast Expr<'ast>],
    pub is_default: bool,
    pub body: &'ast [Stmt<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TryStmt<'ast> {
    pub try_block: Block<'ast>,
    pub catch_block: Block<'ast>,
    pub span: Span,
}
