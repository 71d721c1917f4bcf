//! Names and scopes shared by every node kind.

use std::fmt;

use angelscript_core::Span;

/// An identifier with its location.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ident<'ast> {
    pub name: &'ast str,
    pub span: Span,
}

impl<'ast> Ident<'ast> {
    pub fn new(name: &'ast str, span: Span) -> Self {
        Self { name, span }
    }
}

impl fmt::Debug for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.name, self.span)
    }
}

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A namespace qualifier such as `A::B::` or the global `::`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope<'ast> {
    /// Starts with `::`, so lookup begins at the global namespace.
    pub is_global: bool,
    pub segments: &'ast [Ident<'ast>],
    pub span: Span,
}

impl Scope<'_> {
    /// Segments joined with `::`, without a leading `::`.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push_str("::");
            }
            out.push_str(seg.name);
        }
        out
    }
}

/// An optionally scoped name, e.g. `Game::Player`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualifiedName<'ast> {
    pub scope: Option<Scope<'ast>>,
    pub ident: Ident<'ast>,
}

impl QualifiedName<'_> {
    pub fn span(&self) -> Span {
        match self.scope {
            Some(scope) => scope.span.to(self.ident.span),
            None => self.ident.span,
        }
    }
}

impl fmt::Display for QualifiedName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = self.scope {
            if scope.is_global {
                f.write_str("::")?;
            }
            if !scope.segments.is_empty() {
                write!(f, "{}::", scope.path())?;
            }
        }
        f.write_str(self.ident.name)
    }
}
