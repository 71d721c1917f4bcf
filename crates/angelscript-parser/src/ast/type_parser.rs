//! Types, scopes and parameter lists.

use angelscript_core::{ParseError, ParseErrorKind, PrimitiveKind};
use bumpalo::collections::Vec as BumpVec;

use super::node::{Ident, QualifiedName, Scope};
use super::parser::Parser;
use super::types::{Param, RefKind, TypeBase, TypeExpr};
use crate::lexer::TokenKind;

/// Primitive named by a type keyword. `auto` is handled separately.
pub fn primitive_of(kind: TokenKind) -> Option<PrimitiveKind> {
    Some(match kind {
        TokenKind::Void => PrimitiveKind::Void,
        TokenKind::Bool => PrimitiveKind::Bool,
        TokenKind::Int8 => PrimitiveKind::Int8,
        TokenKind::Int16 => PrimitiveKind::Int16,
        TokenKind::Int => PrimitiveKind::Int32,
        TokenKind::Int64 => PrimitiveKind::Int64,
        TokenKind::UInt8 => PrimitiveKind::Uint8,
        TokenKind::UInt16 => PrimitiveKind::Uint16,
        TokenKind::UInt => PrimitiveKind::Uint32,
        TokenKind::UInt64 => PrimitiveKind::Uint64,
        TokenKind::Float => PrimitiveKind::Float,
        TokenKind::Double => PrimitiveKind::Double,
        _ => return None,
    })
}

impl<'ast> Parser<'ast> {
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr<'ast>, ParseError> {
        let start = self.peek().span;
        let is_const = self.eat(TokenKind::Const).is_some();
        let scope = self.parse_scope_prefix();

        let token = *self.peek();
        let base = if token.kind == TokenKind::Auto {
            TypeBase::Auto
        } else if let Some(kind) = primitive_of(token.kind) {
            TypeBase::Primitive(kind)
        } else if token.kind == TokenKind::Identifier {
            TypeBase::Named(Ident::new(token.lexeme, token.span))
        } else {
            return Err(ParseError::expected_type(
                token.span,
                &format!("'{}'", token.lexeme),
            ));
        };
        self.advance();

        if self.check(TokenKind::Less) {
            return Err(ParseError::new(
                ParseErrorKind::NotSupported,
                self.peek().span,
                "template types are not supported",
            ));
        }
        if self.check(TokenKind::LeftBracket) {
            return Err(ParseError::new(
                ParseErrorKind::NotSupported,
                self.peek().span,
                "array types are not supported",
            ));
        }

        let mut is_handle = false;
        let mut is_handle_const = false;
        if self.eat(TokenKind::At).is_some() {
            is_handle = true;
            is_handle_const = self.eat(TokenKind::Const).is_some();
        }

        Ok(TypeExpr {
            is_const,
            scope,
            base,
            is_handle,
            is_handle_const,
            span: start.to(self.prev_span()),
        })
    }

    /// Consume `::` and `Name::` pairs in front of a name.
    pub(crate) fn parse_scope_prefix(&mut self) -> Option<Scope<'ast>> {
        let start = self.peek().span;
        let is_global = self.eat(TokenKind::ColonColon).is_some();
        let mut segments = BumpVec::new_in(self.arena);
        while self.check(TokenKind::Identifier) && self.peek_nth(1).kind == TokenKind::ColonColon {
            let token = self.advance();
            self.advance();
            segments.push(Ident::new(token.lexeme, token.span));
        }
        if !is_global && segments.is_empty() {
            return None;
        }
        Some(Scope {
            is_global,
            segments: segments.into_bump_slice(),
            span: start.to(self.prev_span()),
        })
    }

    pub(crate) fn parse_qualified_name(&mut self) -> Result<QualifiedName<'ast>, ParseError> {
        let scope = self.parse_scope_prefix();
        let ident = self.expect_ident()?;
        Ok(QualifiedName { scope, ident })
    }

    /// Index just past a type starting at token `idx`, if one is there.
    pub(crate) fn scan_type(&self, mut idx: usize) -> Option<usize> {
        if self.kind_at(idx) == TokenKind::Const {
            idx += 1;
        }
        if self.kind_at(idx) == TokenKind::ColonColon {
            idx += 1;
        }
        while self.kind_at(idx) == TokenKind::Identifier
            && self.kind_at(idx + 1) == TokenKind::ColonColon
        {
            idx += 2;
        }
        let kind = self.kind_at(idx);
        if !(kind.is_primitive_type() || kind == TokenKind::Identifier) {
            return None;
        }
        idx += 1;
        if self.kind_at(idx) == TokenKind::At {
            idx += 1;
            if self.kind_at(idx) == TokenKind::Const {
                idx += 1;
            }
        }
        Some(idx)
    }

    /// `true` when the upcoming tokens are `Type name`.
    pub(crate) fn is_var_decl_start(&self) -> bool {
        self.scan_type(self.pos())
            .is_some_and(|end| self.kind_at(end) == TokenKind::Identifier)
    }

    /// `( params )`; a lone `void` means no parameters.
    pub(crate) fn parse_param_list(&mut self) -> Result<&'ast [Param<'ast>], ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut params = BumpVec::new_in(self.arena);
        if self.check(TokenKind::Void) && self.peek_nth(1).kind == TokenKind::RightParen {
            self.advance();
        }
        if self.eat(TokenKind::RightParen).is_some() {
            return Ok(params.into_bump_slice());
        }
        loop {
            params.push(self.parse_param()?);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen)?;
        Ok(params.into_bump_slice())
    }

    fn parse_param(&mut self) -> Result<Param<'ast>, ParseError> {
        let ty = self.parse_type()?;
        let mut ref_kind = RefKind::None;
        if self.eat(TokenKind::Amp).is_some() {
            ref_kind = if self.eat(TokenKind::In).is_some() {
                RefKind::In
            } else if self.eat(TokenKind::Out).is_some() {
                RefKind::Out
            } else if self.eat(TokenKind::InOut).is_some() {
                RefKind::InOut
            } else {
                RefKind::In
            };
        }
        let name = if self.check(TokenKind::Identifier) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let (default, default_text) = if self.eat(TokenKind::Equal).is_some() {
            let start = self.pos();
            let expr = self.parse_expr(3)?;
            (Some(expr), Some(self.source_since(start)))
        } else {
            (None, None)
        };
        Ok(Param {
            ty,
            ref_kind,
            name,
            default,
            default_text,
            span: ty.span.to(self.prev_span()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Parser, RefKind, TypeBase};
    use angelscript_core::{ParseErrorKind, PrimitiveKind};
    use bumpalo::Bump;

    #[test]
    fn const_handle_forms() {
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration("const Foo@ const", &arena).unwrap();
        assert!(ty.is_const && ty.is_handle && ty.is_handle_const);
        assert_eq!(ty.to_string(), "const Foo@ const");
    }

    #[test]
    fn primitive_aliases() {
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration("int32", &arena).unwrap();
        assert_eq!(ty.base, TypeBase::Primitive(PrimitiveKind::Int32));
    }

    #[test]
    fn arrays_are_rejected() {
        let arena = Bump::new();
        let errors = Parser::parse_type_declaration("int[]", &arena).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().kind, ParseErrorKind::NotSupported);
    }

    #[test]
    fn reference_modifiers() {
        let arena = Bump::new();
        let decl = Parser::parse_function_signature("void f(int &in a, int &out b, int)", &arena).unwrap();
        assert_eq!(decl.params[0].ref_kind, RefKind::In);
        assert_eq!(decl.params[1].ref_kind, RefKind::Out);
        assert!(decl.params[2].name.is_none());
    }

    #[test]
    fn void_parameter_list_is_empty() {
        let arena = Bump::new();
        let decl = Parser::parse_function_signature("int f(void)", &arena).unwrap();
        assert!(decl.params.is_empty());
    }
}
