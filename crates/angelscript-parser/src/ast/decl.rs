//! Top-level and class-member declarations.

use angelscript_core::Span;

use super::expr::Expr;
use super::node::{Ident, QualifiedName};
use super::stmt::{Block, VarDecl};
use super::types::{Param, ReturnType, TypeExpr};

/// A parsed script section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Script<'ast> {
    pub items: &'ast [Item<'ast>],
    pub span: Span,
}

impl<'ast> Script<'ast> {
    pub fn items(&self) -> &'ast [Item<'ast>] {
        self.items
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Item<'ast> {
    Function(FunctionDecl<'ast>),
    Class(ClassDecl<'ast>),
    Interface(InterfaceDecl<'ast>),
    Enum(EnumDecl<'ast>),
    GlobalVar(GlobalVarDecl<'ast>),
    Namespace(NamespaceDecl<'ast>),
    Funcdef(FuncdefDecl<'ast>),
    Import(ImportDecl<'ast>),
    Typedef(TypedefDecl<'ast>),
}

impl Item<'_> {
    pub fn span(&self) -> Span {
        match self {
            Item::Function(d) => d.span,
            Item::Class(d) => d.span,
            Item::Interface(d) => d.span,
            Item::Enum(d) => d.span,
            Item::GlobalVar(d) => d.span,
            Item::Namespace(d) => d.span,
            Item::Funcdef(d) => d.span,
            Item::Import(d) => d.span,
            Item::Typedef(d) => d.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

/// Keywords that may precede or follow a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeclModifiers {
    pub visibility: Visibility,
    pub is_shared: bool,
    pub is_external: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_override: bool,
    pub is_explicit: bool,
    pub is_property: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionDecl<'ast> {
    pub modifiers: DeclModifiers,
    /// `None` for constructors and destructors.
    pub return_type: Option<ReturnType<'ast>>,
    pub is_destructor: bool,
    pub name: Ident<'ast>,
    pub params: &'ast [Param<'ast>],
    /// Trailing `const` on a method.
    pub is_const: bool,
    pub body: Option<Block<'ast>>,
    pub span: Span,
}

impl FunctionDecl<'_> {
    pub fn is_constructor(&self) -> bool {
        self.return_type.is_none() && !self.is_destructor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassMember<'ast> {
    Method(FunctionDecl<'ast>),
    Field(GlobalVarDecl<'ast>),
    Funcdef(FuncdefDecl<'ast>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassDecl<'ast> {
    pub modifiers: DeclModifiers,
    pub name: Ident<'ast>,
    /// Base class and implemented interfaces, in source order.
    pub bases: &'ast [QualifiedName<'ast>],
    pub members: &'ast [ClassMember<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceDecl<'ast> {
    pub modifiers: DeclModifiers,
    pub name: Ident<'ast>,
    pub bases: &'ast [QualifiedName<'ast>],
    pub methods: &'ast [FunctionDecl<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumValue<'ast> {
    pub name: Ident<'ast>,
    pub value: Option<&'ast Expr<'ast>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumDecl<'ast> {
    pub modifiers: DeclModifiers,
    pub name: Ident<'ast>,
    pub values: &'ast [EnumValue<'ast>],
    pub span: Span,
}

/// Global variable or class field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalVarDecl<'ast> {
    pub visibility: Visibility,
    pub decl: VarDecl<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamespaceDecl<'ast> {
    /// `namespace A::B { }` yields two segments.
    pub path: &'ast [Ident<'ast>],
    pub items: &'ast [Item<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuncdefDecl<'ast> {
    pub modifiers: DeclModifiers,
    pub return_type: ReturnType<'ast>,
    pub name: Ident<'ast>,
    pub params: &'ast [Param<'ast>],
    pub span: Span,
}

/// `import void f(int) from "other";`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportDecl<'ast> {
    pub func: FunctionDecl<'ast>,
    pub module: &'ast str,
    pub span: Span,
}

/// `typedef double real;`; only primitive targets are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypedefDecl<'ast> {
    pub target: TypeExpr<'ast>,
    pub name: Ident<'ast>,
    pub span: Span,
}
