//! Resolving written types and signatures against the types in scope.
//!
//! Used both by the script compiler and by the registration interface, which
//! parses declarations such as `"int add(int a, int b)"`.

use bumpalo::Bump;

use angelscript_core::{CompilationError, TypeModifiers};
use angelscript_parser::ast::{
    DeclModifiers, FunctionDecl, Param, Parser, RefKind, Scope, TypeBase, TypeExpr, Visibility,
};
use angelscript_parser::lexer::lookup_keyword;

use crate::core::engine::Engine;
use crate::core::function::{Function, FunctionFlags, ParamInfo, Signature};
use crate::core::module::Module;
use crate::core::typeinfo::TypeInfo;
use crate::types::data_type::DataType;

/// `a` and `b` joined with `::`, either may be empty.
pub(crate) fn join_namespace(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (false, true) => a.to_string(),
        (false, false) => format!("{a}::{b}"),
    }
}

/// Namespaces searched for a name written with `scope` from inside
/// `current`, innermost first.
pub(crate) fn namespace_candidates(current: &str, scope: Option<&Scope<'_>>) -> Vec<String> {
    let path = scope.map(|s| s.path()).unwrap_or_default();
    if scope.is_some_and(|s| s.is_global) {
        return vec![path];
    }
    let mut out = Vec::new();
    let mut namespace = current;
    loop {
        out.push(join_namespace(namespace, &path));
        if namespace.is_empty() {
            break;
        }
        namespace = namespace.rfind("::").map_or("", |i| &namespace[..i]);
    }
    out
}

/// Split `"a::b::name"` into `("a::b", "name")`.
pub(crate) fn split_qualified(name: &str) -> (&str, &str) {
    let name = name.strip_prefix("::").unwrap_or(name);
    match name.rfind("::") {
        Some(i) => (&name[..i], &name[i + 2..]),
        None => ("", name),
    }
}

/// A plain identifier that is not a reserved word.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && lookup_keyword(name).is_none()
}

/// `a::b::c` with every segment an identifier. The empty string is the
/// global namespace.
pub(crate) fn is_namespace(namespace: &str) -> bool {
    let namespace = namespace.strip_prefix("::").unwrap_or(namespace);
    namespace.is_empty() || namespace.split("::").all(is_identifier)
}

pub(crate) fn function_flags(modifiers: &DeclModifiers, is_const: bool) -> FunctionFlags {
    let mut flags = FunctionFlags::empty();
    flags.set(FunctionFlags::READ_ONLY, is_const);
    flags.set(FunctionFlags::PRIVATE, modifiers.visibility == Visibility::Private);
    flags.set(FunctionFlags::PROTECTED, modifiers.visibility == Visibility::Protected);
    flags.set(FunctionFlags::FINAL, modifiers.is_final);
    flags.set(FunctionFlags::OVERRIDE, modifiers.is_override);
    flags.set(FunctionFlags::SHARED, modifiers.is_shared);
    flags.set(FunctionFlags::EXPLICIT, modifiers.is_explicit);
    flags.set(FunctionFlags::PROPERTY, modifiers.is_property);
    flags.set(FunctionFlags::ABSTRACT, modifiers.is_abstract);
    flags
}

/// The named types visible from one namespace.
pub(crate) struct TypeScope<'a> {
    /// Module types first, then registered ones.
    pub(crate) types: &'a [TypeInfo],
    pub(crate) namespace: &'a str,
    pub(crate) access_mask: u32,
    /// Class whose member funcdefs are visible unqualified.
    pub(crate) class: Option<&'a TypeInfo>,
}

impl<'a> TypeScope<'a> {
    pub(crate) fn new(types: &'a [TypeInfo], namespace: &'a str) -> Self {
        Self {
            types,
            namespace,
            access_mask: u32::MAX,
            class: None,
        }
    }

    pub(crate) fn find(&self, scope: Option<&Scope<'_>>, name: &str) -> Option<TypeInfo> {
        if scope.is_none() {
            if let Some(child) = self.class.and_then(|class| child_funcdef(class, name)) {
                return Some(child);
            }
        }
        for namespace in namespace_candidates(self.namespace, scope) {
            let found = self.types.iter().find(|t| {
                t.get_name() == name
                    && t.get_namespace() == namespace
                    && t.get_access_mask() & self.access_mask != 0
                    && t.get_parent_type().is_none()
            });
            if let Some(found) = found {
                return Some(found.clone());
            }
        }
        // `Owner::Child` for funcdefs declared inside a class
        let scope = scope?;
        let (owner, parents) = scope.segments.split_last()?;
        let owner_scope = Scope {
            is_global: scope.is_global,
            segments: parents,
            span: scope.span,
        };
        let owner_scope = (scope.is_global || !parents.is_empty()).then_some(owner_scope);
        let owner = self.find(owner_scope.as_ref(), owner.name)?;
        child_funcdef(&owner, name)
    }

    pub(crate) fn resolve(&self, ty: &TypeExpr<'_>) -> Result<DataType, CompilationError> {
        let mut data_type = match ty.base {
            TypeBase::Primitive(kind) => {
                if ty.is_handle {
                    return Err(CompilationError::invalid(
                        ty.span,
                        format!("Object handle is not supported for '{}'", kind.name()),
                    ));
                }
                DataType::primitive(kind)
            }
            TypeBase::Auto => {
                return Err(CompilationError::other(
                    ty.span,
                    "'auto' is only allowed for initialized variables",
                ));
            }
            TypeBase::Named(ident) => {
                let info = self.find(ty.scope.as_ref(), ident.name).ok_or_else(|| {
                    CompilationError::UnknownType {
                        name: ident.name.to_string(),
                        span: ident.span,
                    }
                })?;
                if info.is_typedef() {
                    let target = info.details().read().typedef_target.clone();
                    match target {
                        Some(target) if !ty.is_handle => target,
                        _ => {
                            return Err(CompilationError::invalid(
                                ty.span,
                                format!("Object handle is not supported for '{}'", info.get_name()),
                            ));
                        }
                    }
                } else if info.is_funcdef() {
                    DataType::handle(&info)
                } else if info.is_enum() || info.is_string_type() {
                    if ty.is_handle {
                        return Err(CompilationError::invalid(
                            ty.span,
                            format!("Object handle is not supported for '{}'", info.get_name()),
                        ));
                    }
                    DataType::of(&info)
                } else {
                    if info.is_interface() && !ty.is_handle {
                        return Err(CompilationError::invalid(
                            ty.span,
                            format!("Interface '{}' can only be used through a handle", info.get_name()),
                        ));
                    }
                    let mut data_type = DataType::of(&info);
                    data_type.is_handle = ty.is_handle;
                    data_type
                }
            }
        };
        data_type.is_const = ty.is_const;
        data_type.is_handle_const = ty.is_handle_const;
        Ok(data_type)
    }

    pub(crate) fn params(&self, params: &[Param<'_>]) -> Result<Vec<ParamInfo>, CompilationError> {
        // `f(void)`
        if let [only] = params {
            if only.ty.is_void() && only.name.is_none() {
                return Ok(Vec::new());
            }
        }
        params
            .iter()
            .map(|param| {
                if param.ty.is_void() {
                    return Err(CompilationError::mismatch(param.span, "Parameter type can't be 'void'"));
                }
                let modifiers = match param.ref_kind {
                    RefKind::None => TypeModifiers::empty(),
                    RefKind::In => TypeModifiers::INREF,
                    RefKind::Out => TypeModifiers::OUTREF,
                    RefKind::InOut => TypeModifiers::INOUTREF,
                };
                Ok(ParamInfo {
                    data_type: self.resolve(&param.ty)?,
                    modifiers,
                    name: param.name.map(|n| n.name.to_string()),
                    default_text: param.default_text.map(str::to_owned),
                })
            })
            .collect()
    }

    pub(crate) fn signature(&self, decl: &FunctionDecl<'_>) -> Result<Signature, CompilationError> {
        let return_type = match &decl.return_type {
            Some(ret) => self.resolve(&ret.ty)?,
            None => DataType::void(),
        };
        let mut signature = Signature::new(return_type);
        signature.return_is_ref = decl.return_type.is_some_and(|r| r.is_ref);
        signature.is_const = decl.is_const;
        signature.params = self.params(decl.params)?;
        Ok(signature)
    }
}

fn child_funcdef(owner: &TypeInfo, name: &str) -> Option<TypeInfo> {
    owner
        .details()
        .read()
        .child_funcdefs
        .iter()
        .find(|f| f.get_name() == name)
        .cloned()
}

/// The entry of `functions` declared as `declaration`. Constructors match
/// on name and parameters alone, so both `"Foo(int)"` and `"Foo@ Foo(int)"`
/// find them.
pub(crate) fn find_by_decl(
    engine: &Engine,
    module: Option<&Module>,
    functions: &[Function],
    declaration: &str,
    object_type: Option<&TypeInfo>,
) -> Option<Function> {
    let arena = Bump::new();
    let decl = Parser::parse_function_signature(declaration, &arena).ok()?;
    let types = engine.visible_types(module);
    let namespace = match module {
        Some(module) => module.get_default_namespace(),
        None => engine.get_default_namespace(),
    };
    let mut scope = TypeScope::new(&types, &namespace);
    scope.class = object_type;
    let signature = scope.signature(&decl).ok()?;
    functions
        .iter()
        .find(|f| {
            let own = f.signature();
            f.get_name() == decl.name.name
                && own.same_params(&signature)
                && (f.is_constructor()
                    || decl.is_constructor()
                    || (own.return_type == signature.return_type && own.is_const == signature.is_const))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_walk_outwards() {
        assert_eq!(namespace_candidates("a::b", None), vec!["a::b", "a", ""]);
        assert_eq!(namespace_candidates("", None), vec![""]);
    }

    #[test]
    fn scoped_candidates() {
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration("x::T", &arena).unwrap();
        let scope = ty.scope.unwrap();
        assert_eq!(namespace_candidates("a", Some(&scope)), vec!["a::x", "x"]);
        let ty = Parser::parse_type_declaration("::x::T", &arena).unwrap();
        assert_eq!(namespace_candidates("a", ty.scope.as_ref()), vec!["x"]);
    }

    #[test]
    fn identifiers_and_namespaces() {
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("while"));
        assert!(!is_identifier("int"));
        assert!(is_namespace(""));
        assert!(is_namespace("game::ui"));
        assert!(!is_namespace("game::"));
        assert_eq!(split_qualified("a::b::c"), ("a::b", "c"));
        assert_eq!(split_qualified("c"), ("", "c"));
    }

    #[test]
    fn primitive_signatures_resolve_without_types() {
        let arena = Bump::new();
        let decl = Parser::parse_function_signature("int add(int a, int8 b = 2)", &arena).unwrap();
        let scope = TypeScope::new(&[], "");
        let sig = scope.signature(&decl).unwrap();
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.params[1].default_text.as_deref(), Some("2"));
        assert_eq!(sig.params[0].name.as_deref(), Some("a"));

        let decl = Parser::parse_function_signature("void f(Missing m)", &arena).unwrap();
        assert!(matches!(
            scope.signature(&decl),
            Err(CompilationError::UnknownType { .. })
        ));
    }
}
