//! Type expressions as written in source.

use std::fmt;

use angelscript_core::{PrimitiveKind, Span};

use super::node::{Ident, Scope};

/// What a type expression names before resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeBase<'ast> {
    Primitive(PrimitiveKind),
    Named(Ident<'ast>),
    /// `auto`; only valid for initialised locals.
    Auto,
}

/// A type such as `const Foo@`, `int` or `A::B@ const`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeExpr<'ast> {
    /// Leading `const`: the value (or the handled object) is read-only.
    pub is_const: bool,
    pub scope: Option<Scope<'ast>>,
    pub base: TypeBase<'ast>,
    /// Trailing `@`.
    pub is_handle: bool,
    /// `@ const`: the handle itself cannot be reassigned.
    pub is_handle_const: bool,
    pub span: Span,
}

impl<'ast> TypeExpr<'ast> {
    pub fn primitive(kind: PrimitiveKind, span: Span) -> Self {
        Self {
            is_const: false,
            scope: None,
            base: TypeBase::Primitive(kind),
            is_handle: false,
            is_handle_const: false,
            span,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.base, TypeBase::Primitive(PrimitiveKind::Void)) && !self.is_handle
    }
}

impl fmt::Display for TypeExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        if let Some(scope) = self.scope {
            if scope.is_global {
                f.write_str("::")?;
            }
            if !scope.segments.is_empty() {
                write!(f, "{}::", scope.path())?;
            }
        }
        match self.base {
            TypeBase::Primitive(kind) => f.write_str(kind.name())?,
            TypeBase::Named(ident) => f.write_str(ident.name)?,
            TypeBase::Auto => f.write_str("auto")?,
        }
        if self.is_handle {
            f.write_str("@")?;
            if self.is_handle_const {
                f.write_str(" const")?;
            }
        }
        Ok(())
    }
}

/// Reference modifier on a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefKind {
    #[default]
    None,
    /// `&` or `&in`
    In,
    Out,
    InOut,
}

/// A parameter in a function or funcdef declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param<'ast> {
    pub ty: TypeExpr<'ast>,
    pub ref_kind: RefKind,
    pub name: Option<Ident<'ast>>,
    pub default: Option<&'ast super::Expr<'ast>>,
    /// Source text of the default argument, kept so it can be compiled again
    /// at every call site.
    pub default_text: Option<&'ast str>,
    pub span: Span,
}

/// Declared return type. `None` on a [`super::FunctionDecl`] marks a
/// constructor or destructor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnType<'ast> {
    pub ty: TypeExpr<'ast>,
    /// `T &f()`; only accepted on registered declarations.
    pub is_ref: bool,
}
