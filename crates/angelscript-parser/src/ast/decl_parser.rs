//! Declarations: functions, globals, classes, interfaces, enums,
//! namespaces, funcdefs, typedefs and imports.

use angelscript_core::{ParseError, ParseErrorKind};
use bumpalo::collections::Vec as BumpVec;

use super::decl::*;
use super::node::Ident;
use super::parser::Parser;
use super::types::{ReturnType, TypeBase};
use crate::lexer::TokenKind;

/// Where a function-shaped declaration appears; decides whether a body is
/// required.
#[derive(Clone, Copy, PartialEq, Eq)]
enum FuncContext<'a> {
    Global,
    Class(&'a str),
    Interface,
}

impl<'ast> Parser<'ast> {
    /// Items until `end`, recovering at declaration boundaries.
    pub(crate) fn parse_items_until(&mut self, end: TokenKind) -> &'ast [Item<'ast>] {
        let mut items = BumpVec::new_in(self.arena);
        while !self.check(end) && !self.is_at_end() {
            if self.eat(TokenKind::Semicolon).is_some() {
                continue;
            }
            let start = self.pos();
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.record(err);
                    self.synchronize(start);
                }
            }
        }
        items.into_bump_slice()
    }

    fn parse_modifiers(&mut self) -> DeclModifiers {
        let mut mods = DeclModifiers::default();
        while self.at_modifier() {
            match self.advance().lexeme {
                "shared" => mods.is_shared = true,
                "external" => mods.is_external = true,
                "abstract" => mods.is_abstract = true,
                _ => mods.is_final = true,
            }
        }
        mods
    }

    /// Modifier words are plain identifiers; they only act as modifiers when
    /// a declaration follows.
    fn at_modifier(&self) -> bool {
        let word = self.peek();
        if word.kind != TokenKind::Identifier
            || !matches!(word.lexeme, "shared" | "external" | "abstract" | "final")
        {
            return false;
        }
        match self.peek_nth(1).kind {
            TokenKind::Class
            | TokenKind::Interface
            | TokenKind::Enum
            | TokenKind::Funcdef
            | TokenKind::Const
            | TokenKind::ColonColon => true,
            TokenKind::Identifier => matches!(
                self.peek_nth(2).kind,
                TokenKind::Identifier
                    | TokenKind::At
                    | TokenKind::ColonColon
                    | TokenKind::Class
                    | TokenKind::Interface
                    | TokenKind::Enum
                    | TokenKind::Funcdef
            ),
            kind => kind.is_primitive_type(),
        }
    }

    fn parse_item(&mut self) -> Result<Item<'ast>, ParseError> {
        let mods = self.parse_modifiers();
        match self.peek().kind {
            TokenKind::Class => Ok(Item::Class(self.parse_class(mods)?)),
            TokenKind::Interface => Ok(Item::Interface(self.parse_interface(mods)?)),
            TokenKind::Enum => Ok(Item::Enum(self.parse_enum(mods)?)),
            TokenKind::Namespace => Ok(Item::Namespace(self.parse_namespace()?)),
            TokenKind::Funcdef => Ok(Item::Funcdef(self.parse_funcdef(mods)?)),
            TokenKind::Typedef => Ok(Item::Typedef(self.parse_typedef()?)),
            TokenKind::Import => Ok(Item::Import(self.parse_import()?)),
            _ => match self.parse_function_or_var(mods, FuncContext::Global)? {
                ClassMember::Method(func) => Ok(Item::Function(func)),
                ClassMember::Field(var) => Ok(Item::GlobalVar(var)),
                ClassMember::Funcdef(def) => Ok(Item::Funcdef(def)),
            },
        }
    }

    /// A function or a variable; both start with a type and a name.
    fn parse_function_or_var(
        &mut self,
        mods: DeclModifiers,
        ctx: FuncContext<'_>,
    ) -> Result<ClassMember<'ast>, ParseError> {
        let start = self.peek().span;

        if let FuncContext::Class(class_name) = ctx {
            if self.check(TokenKind::Tilde) {
                self.advance();
                let name = self.expect_ident()?;
                if name.name != class_name {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        name.span,
                        format!("destructor name must be '{class_name}'"),
                    ));
                }
                return self
                    .parse_function_rest(mods, None, true, name, start, ctx)
                    .map(ClassMember::Method);
            }
            if self.check_contextual(class_name) && self.peek_nth(1).kind == TokenKind::LeftParen {
                let name = self.expect_ident()?;
                return self
                    .parse_function_rest(mods, None, false, name, start, ctx)
                    .map(ClassMember::Method);
            }
        }

        let ty = self.parse_type()?;
        let is_ref = self.eat(TokenKind::Amp).is_some();
        let name = self.expect_ident()?;

        if self.check(TokenKind::LeftParen) {
            let before_params = self.pos();
            let return_type = Some(ReturnType { ty, is_ref });
            match self.parse_function_rest(mods, return_type, false, name, start, ctx) {
                Ok(func) => return Ok(ClassMember::Method(func)),
                // `Foo f(1, 2);` declares a variable with constructor arguments
                Err(err) if ctx != FuncContext::Interface => {
                    self.reset(before_params);
                    let looks_like_var = ty.base != TypeBase::Auto
                        && !is_ref
                        && self.parse_arguments().is_ok()
                        && matches!(self.peek().kind, TokenKind::Semicolon | TokenKind::Comma);
                    if !looks_like_var {
                        return Err(err);
                    }
                    self.reset(before_params);
                }
                Err(err) => return Err(err),
            }
        }

        if is_ref {
            return Err(ParseError::new(
                ParseErrorKind::NotSupported,
                name.span,
                "reference variables are not supported",
            ));
        }
        if ctx == FuncContext::Interface {
            return Err(ParseError::new(
                ParseErrorKind::InvalidSyntax,
                name.span,
                "interfaces can only declare methods",
            ));
        }
        let decl = self.parse_var_declarators(ty, name)?;
        Ok(ClassMember::Field(GlobalVarDecl {
            visibility: mods.visibility,
            decl,
            span: start.to(self.prev_span()),
        }))
    }

    /// Parameter list, trailing qualifiers and body of a function whose
    /// name has been consumed.
    fn parse_function_rest(
        &mut self,
        mut mods: DeclModifiers,
        return_type: Option<ReturnType<'ast>>,
        is_destructor: bool,
        name: Ident<'ast>,
        start: angelscript_core::Span,
        ctx: FuncContext<'_>,
    ) -> Result<FunctionDecl<'ast>, ParseError> {
        let params = self.parse_param_list()?;
        let is_const = self.eat(TokenKind::Const).is_some();
        self.parse_trailing_qualifiers(&mut mods);

        let body = if ctx == FuncContext::Interface {
            self.expect(TokenKind::Semicolon)?;
            None
        } else if self.check(TokenKind::LeftBrace) {
            Some(self.parse_block()?)
        } else if self.check(TokenKind::Semicolon) && (mods.is_external || mods.is_abstract) {
            self.advance();
            None
        } else {
            let token = *self.peek();
            return Err(ParseError::expected_token(
                token.span,
                "'{'",
                &format!("'{}'", token.lexeme),
            ));
        };

        Ok(FunctionDecl {
            modifiers: mods,
            return_type,
            is_destructor,
            name,
            params,
            is_const,
            body,
            span: start.to(self.prev_span()),
        })
    }

    fn parse_trailing_qualifiers(&mut self, mods: &mut DeclModifiers) {
        loop {
            if self.eat_contextual("final") {
                mods.is_final = true;
            } else if self.eat_contextual("override") {
                mods.is_override = true;
            } else if self.eat_contextual("property") {
                mods.is_property = true;
            } else if self.eat_contextual("explicit") {
                mods.is_explicit = true;
            } else {
                break;
            }
        }
    }

    /// Signature without a body, as used for registration and imports.
    pub(crate) fn parse_signature(&mut self) -> Result<FunctionDecl<'ast>, ParseError> {
        let start = self.peek().span;
        let mut mods = DeclModifiers::default();
        // registration may name behaviours without a return type
        let (return_type, is_destructor, name) = if self.eat(TokenKind::Tilde).is_some() {
            (None, true, self.expect_ident()?)
        } else if self.check(TokenKind::Identifier) && self.peek_nth(1).kind == TokenKind::LeftParen {
            (None, false, self.expect_ident()?)
        } else {
            let ty = self.parse_type()?;
            let is_ref = self.eat(TokenKind::Amp).is_some();
            (Some(ReturnType { ty, is_ref }), false, self.expect_ident()?)
        };
        let params = self.parse_param_list()?;
        let is_const = self.eat(TokenKind::Const).is_some();
        self.parse_trailing_qualifiers(&mut mods);
        Ok(FunctionDecl {
            modifiers: mods,
            return_type,
            is_destructor,
            name,
            params,
            is_const,
            body: None,
            span: start.to(self.prev_span()),
        })
    }

    fn parse_bases(&mut self) -> Result<&'ast [super::QualifiedName<'ast>], ParseError> {
        let mut bases = BumpVec::new_in(self.arena);
        if self.eat(TokenKind::Colon).is_some() {
            loop {
                bases.push(self.parse_qualified_name()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        Ok(bases.into_bump_slice())
    }

    fn parse_class(&mut self, mods: DeclModifiers) -> Result<ClassDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Class)?.span;
        let name = self.expect_ident()?;
        let bases = self.parse_bases()?;
        self.expect(TokenKind::LeftBrace)?;

        let mut members = BumpVec::new_in(self.arena);
        while !self.check(TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(ParseError::unexpected_eof(self.peek().span));
            }
            if self.eat(TokenKind::Semicolon).is_some() {
                continue;
            }
            let mut member_mods = DeclModifiers::default();
            if self.eat(TokenKind::Private).is_some() {
                member_mods.visibility = Visibility::Private;
            } else if self.eat(TokenKind::Protected).is_some() {
                member_mods.visibility = Visibility::Protected;
            }
            if self.check(TokenKind::Funcdef) {
                members.push(ClassMember::Funcdef(self.parse_funcdef(member_mods)?));
                continue;
            }
            if self.check_contextual("explicit") {
                self.advance();
                member_mods.is_explicit = true;
            }
            members.push(self.parse_function_or_var(member_mods, FuncContext::Class(name.name))?);
        }
        self.advance();

        Ok(ClassDecl {
            modifiers: mods,
            name,
            bases,
            members: members.into_bump_slice(),
            span: start.to(self.prev_span()),
        })
    }

    fn parse_interface(&mut self, mods: DeclModifiers) -> Result<InterfaceDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Interface)?.span;
        let name = self.expect_ident()?;
        let bases = self.parse_bases()?;
        self.expect(TokenKind::LeftBrace)?;

        let mut methods = BumpVec::new_in(self.arena);
        while self.eat(TokenKind::RightBrace).is_none() {
            if self.is_at_end() {
                return Err(ParseError::unexpected_eof(self.peek().span));
            }
            match self.parse_function_or_var(DeclModifiers::default(), FuncContext::Interface)? {
                ClassMember::Method(func) => methods.push(func),
                _ => {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        self.prev_span(),
                        "interfaces can only declare methods",
                    ));
                }
            }
        }

        Ok(InterfaceDecl {
            modifiers: mods,
            name,
            bases,
            methods: methods.into_bump_slice(),
            span: start.to(self.prev_span()),
        })
    }

    fn parse_enum(&mut self, mods: DeclModifiers) -> Result<EnumDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Enum)?.span;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LeftBrace)?;
        let mut values = BumpVec::new_in(self.arena);
        while !self.check(TokenKind::RightBrace) {
            let value_name = self.expect_ident()?;
            let value = if self.eat(TokenKind::Equal).is_some() {
                Some(self.parse_expr(3)?)
            } else {
                None
            };
            values.push(EnumValue {
                name: value_name,
                value,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightBrace)?;
        Ok(EnumDecl {
            modifiers: mods,
            name,
            values: values.into_bump_slice(),
            span: start.to(self.prev_span()),
        })
    }

    fn parse_namespace(&mut self) -> Result<NamespaceDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Namespace)?.span;
        let mut path = BumpVec::new_in(self.arena);
        loop {
            path.push(self.expect_ident()?);
            if self.eat(TokenKind::ColonColon).is_none() {
                break;
            }
        }
        self.expect(TokenKind::LeftBrace)?;
        let items = self.parse_items_until(TokenKind::RightBrace);
        self.expect(TokenKind::RightBrace)?;
        Ok(NamespaceDecl {
            path: path.into_bump_slice(),
            items,
            span: start.to(self.prev_span()),
        })
    }

    fn parse_funcdef(&mut self, mods: DeclModifiers) -> Result<FuncdefDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Funcdef)?.span;
        let ty = self.parse_type()?;
        let is_ref = self.eat(TokenKind::Amp).is_some();
        let name = self.expect_ident()?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(FuncdefDecl {
            modifiers: mods,
            return_type: ReturnType { ty, is_ref },
            name,
            params,
            span: start.to(self.prev_span()),
        })
    }

    fn parse_typedef(&mut self) -> Result<TypedefDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Typedef)?.span;
        let target = self.parse_type()?;
        if !matches!(target.base, TypeBase::Primitive(_)) || target.is_handle {
            return Err(ParseError::new(
                ParseErrorKind::NotSupported,
                target.span,
                "typedef is only supported for primitive types",
            ));
        }
        let name = self.expect_ident()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(TypedefDecl {
            target,
            name,
            span: start.to(self.prev_span()),
        })
    }

    fn parse_import(&mut self) -> Result<ImportDecl<'ast>, ParseError> {
        let start = self.expect(TokenKind::Import)?.span;
        let func = self.parse_signature()?;
        if func.return_type.is_none() {
            return Err(ParseError::expected_type(func.name.span, &format!("'{}'", func.name.name)));
        }
        if !self.eat_contextual("from") {
            let token = *self.peek();
            return Err(ParseError::expected_token(
                token.span,
                "'from'",
                &format!("'{}'", token.lexeme),
            ));
        }
        let module = self.expect(TokenKind::StringLiteral)?.lexeme;
        self.expect(TokenKind::Semicolon)?;
        Ok(ImportDecl {
            func,
            module,
            span: start.to(self.prev_span()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use bumpalo::Bump;

    #[test]
    fn class_with_members() {
        let arena = Bump::new();
        let script = Parser::parse(
            r#"
            class Player : Entity, IDamageable {
                private int health = 100;
                Player() { health = 10; }
                Player(int h) { health = h; }
                ~Player() {}
                int get_health() const { return health; }
                void hit(int amount) override { health -= amount; }
            }
            "#,
            &arena,
        )
        .unwrap();
        let Item::Class(class) = script.items()[0] else {
            panic!("expected class");
        };
        assert_eq!(class.bases.len(), 2);
        assert_eq!(class.members.len(), 6);
        assert!(matches!(class.members[0], ClassMember::Field(f) if f.visibility == Visibility::Private));
        assert!(matches!(class.members[1], ClassMember::Method(m) if m.is_constructor()));
        assert!(matches!(class.members[3], ClassMember::Method(m) if m.is_destructor));
        assert!(matches!(class.members[4], ClassMember::Method(m) if m.is_const));
        assert!(matches!(class.members[5], ClassMember::Method(m) if m.modifiers.is_override));
    }

    #[test]
    fn global_variable_with_constructor_arguments() {
        let arena = Bump::new();
        let script = Parser::parse("Vec origin(0, 0); int f(int a) { return a; }", &arena).unwrap();
        assert!(matches!(script.items()[0], Item::GlobalVar(_)));
        assert!(matches!(script.items()[1], Item::Function(_)));
    }

    #[test]
    fn namespaces_enums_and_funcdefs() {
        let arena = Bump::new();
        let script = Parser::parse(
            "namespace A::B { enum Color { Red, Green = 5, Blue, } funcdef void CB(int); }",
            &arena,
        )
        .unwrap();
        let Item::Namespace(ns) = script.items()[0] else {
            panic!("expected namespace");
        };
        assert_eq!(ns.path.len(), 2);
        assert!(matches!(ns.items[0], Item::Enum(e) if e.values.len() == 3));
        assert!(matches!(ns.items[1], Item::Funcdef(_)));
    }

    #[test]
    fn interface_and_import() {
        let arena = Bump::new();
        let script = Parser::parse(
            "interface IShape { double area() const; } import int helper(int) from \"lib\";",
            &arena,
        )
        .unwrap();
        assert!(matches!(script.items()[0], Item::Interface(i) if i.methods.len() == 1));
        assert!(matches!(script.items()[1], Item::Import(i) if i.module == "lib"));
    }

    #[test]
    fn shared_modifier() {
        let arena = Bump::new();
        let script = Parser::parse("shared class S {} final class F {}", &arena).unwrap();
        assert!(matches!(script.items()[0], Item::Class(c) if c.modifiers.is_shared));
        assert!(matches!(script.items()[1], Item::Class(c) if c.modifiers.is_final));
    }

    #[test]
    fn typedef_of_class_is_rejected() {
        let arena = Bump::new();
        assert!(Parser::parse("typedef Foo Bar;", &arena).is_err());
        assert!(Parser::parse("typedef double real;", &arena).is_ok());
    }
}
