//! Parser state, token helpers and the public entry points.

use angelscript_core::{ParseError, ParseErrorKind, ParseErrors, Span};
use bumpalo::Bump;

use super::decl::{FunctionDecl, Script};
use super::expr::Expr;
use super::node::Ident;
use super::types::TypeExpr;
use crate::lexer::{Lexer, Token, TokenKind};

/// Recursive-descent parser producing an arena-allocated AST.
///
/// The source and every node live in the arena passed to the entry point,
/// so the returned tree outlives the input string.
pub struct Parser<'ast> {
    tokens: Vec<Token<'ast>>,
    pos: usize,
    pub(crate) arena: &'ast Bump,
    source: &'ast str,
    errors: ParseErrors,
}

impl<'ast> Parser<'ast> {
    fn new(source: &str, arena: &'ast Bump) -> Self {
        let source = arena.alloc_str(source);
        let (tokens, lex_errors) = Lexer::new(source, arena).tokenize();
        let mut errors = ParseErrors::new();
        for err in lex_errors {
            errors.push(err.into());
        }
        // Lexical errors are already reported; keep the parser from
        // reporting the same position twice.
        let tokens = tokens
            .into_iter()
            .filter(|t| t.kind != TokenKind::Error)
            .collect();
        Self {
            tokens,
            pos: 0,
            arena,
            source,
            errors,
        }
    }

    /// Parse a complete script section.
    pub fn parse(source: &str, arena: &'ast Bump) -> Result<Script<'ast>, ParseErrors> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Parser::parse");

        let mut parser = Parser::new(source, arena);
        let start = parser.peek().span;
        let items = parser.parse_items_until(TokenKind::Eof);
        let span = start.to(parser.peek().span);
        parser.finish(Script { items, span })
    }

    /// Parse a registration signature such as `"int add(int a, int b)"` or
    /// `"uint length() const"`. No body is accepted.
    pub fn parse_function_signature(
        source: &str,
        arena: &'ast Bump,
    ) -> Result<FunctionDecl<'ast>, ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_signature();
        parser.complete(result)
    }

    /// Parse a property declaration such as `"const int counter"`.
    pub fn parse_property_declaration(
        source: &str,
        arena: &'ast Bump,
    ) -> Result<(TypeExpr<'ast>, Ident<'ast>), ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let result = parser
            .parse_type()
            .and_then(|ty| Ok((ty, parser.expect_ident()?)));
        parser.complete(result)
    }

    /// Parse a bare type such as `"Foo@"` or `"const double"`.
    pub fn parse_type_declaration(
        source: &str,
        arena: &'ast Bump,
    ) -> Result<TypeExpr<'ast>, ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_type();
        parser.complete(result)
    }

    /// Parse a single expression, e.g. a default argument.
    pub fn parse_expression(
        source: &str,
        arena: &'ast Bump,
    ) -> Result<&'ast Expr<'ast>, ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_expr(0);
        parser.complete(result)
    }

    fn complete<T>(mut self, result: Result<T, ParseError>) -> Result<T, ParseErrors> {
        match result {
            Ok(value) => {
                if !self.is_at_end() {
                    let token = *self.peek();
                    self.errors.push(ParseError::new(
                        ParseErrorKind::UnexpectedToken,
                        token.span,
                        format!("unexpected '{}' after declaration", token.lexeme),
                    ));
                }
                self.finish(value)
            }
            Err(err) => {
                self.errors.push(err);
                Err(self.errors)
            }
        }
    }

    fn finish<T>(self, value: T) -> Result<T, ParseErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors)
        }
    }

    pub(crate) fn record(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    // token helpers

    #[inline]
    pub(crate) fn peek(&self) -> &Token<'ast> {
        self.peek_nth(0)
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token<'ast> {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    #[inline]
    pub(crate) fn kind_at(&self, idx: usize) -> TokenKind {
        self.tokens
            .get(idx)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn advance(&mut self) -> Token<'ast> {
        let token = *self.peek();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }

    #[inline]
    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// `true` when the next token is the identifier `word`. Used for
    /// contextual keywords like `final` or `from`.
    pub(crate) fn check_contextual(&self, word: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Identifier && token.lexeme == word
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token<'ast>> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub(crate) fn eat_contextual(&mut self, word: &str) -> bool {
        if self.check_contextual(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token<'ast>, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let token = *self.peek();
        if token.kind == TokenKind::Eof {
            return Err(ParseError::unexpected_eof(token.span));
        }
        Err(ParseError::expected_token(
            token.span,
            kind.describe(),
            &format!("'{}'", token.lexeme),
        ))
    }

    pub(crate) fn expect_ident(&mut self) -> Result<Ident<'ast>, ParseError> {
        let token = *self.peek();
        if token.kind == TokenKind::Identifier {
            self.advance();
            Ok(Ident::new(token.lexeme, token.span))
        } else {
            Err(ParseError::expected_identifier(
                token.span,
                &format!("'{}'", token.lexeme),
            ))
        }
    }

    /// Span of the most recently consumed token.
    pub(crate) fn prev_span(&self) -> Span {
        match self.pos.checked_sub(1) {
            Some(idx) => self.tokens[idx].span,
            None => self.peek().span,
        }
    }

    /// Source text from token `start` up to the last consumed token.
    pub(crate) fn source_since(&self, start: usize) -> &'ast str {
        if start >= self.pos {
            return "";
        }
        let from = self.tokens[start].offset as usize;
        let to = self.tokens[self.pos - 1].end_offset() as usize;
        self.source.get(from..to).unwrap_or("")
    }

    /// Skip the declaration that started at token `item_start`: rewind, then
    /// stop past the first `;` outside braces or the `}` that closes the
    /// declaration's outermost block.
    pub(crate) fn synchronize(&mut self, item_start: usize) {
        self.pos = item_start;
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.advance().kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => return,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Item, TypeBase};

    #[test]
    fn parse_collects_every_item() {
        let arena = Bump::new();
        let script = Parser::parse("int x = 1; void f() {} class A {}", &arena).unwrap();
        assert_eq!(script.items().len(), 3);
        assert!(matches!(script.items()[1], Item::Function(_)));
    }

    #[test]
    fn errors_recover_at_item_boundary() {
        let arena = Bump::new();
        let errors = Parser::parse("int = ; void g() {} int y", &arena).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn property_declaration() {
        let arena = Bump::new();
        let (ty, name) = Parser::parse_property_declaration("const int counter", &arena).unwrap();
        assert!(ty.is_const);
        assert_eq!(name.name, "counter");
        assert!(Parser::parse_property_declaration("int counter extra", &arena).is_err());
    }

    #[test]
    fn type_declaration() {
        let arena = Bump::new();
        let ty = Parser::parse_type_declaration("Game::Entity@", &arena).unwrap();
        assert!(ty.is_handle);
        assert_eq!(ty.scope.map(|s| s.path()), Some("Game".to_string()));
        assert!(matches!(ty.base, TypeBase::Named(id) if id.name == "Entity"));
    }

    #[test]
    fn source_text_of_default_argument_is_kept() {
        let arena = Bump::new();
        let decl =
            Parser::parse_function_signature("string substr(uint start = 0, int count = -1) const", &arena)
                .unwrap();
        assert!(decl.is_const);
        assert_eq!(decl.params[1].default_text, Some("-1"));
    }
}
