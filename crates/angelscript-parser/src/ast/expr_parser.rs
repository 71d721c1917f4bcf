//! Expression parsing by precedence climbing.

use angelscript_core::{ParseError, ParseErrorKind, Span};
use bumpalo::collections::Vec as BumpVec;

use super::expr::*;
use super::node::{Ident, QualifiedName};
use super::ops::{AssignOp, BinaryOp, PostfixOp, UnaryOp};
use super::parser::Parser;
use super::type_parser::primitive_of;
use super::types::TypeExpr;
use crate::lexer::TokenKind;

const TERNARY_BP: u8 = 3;

impl<'ast> Parser<'ast> {
    /// Parse an expression whose operators bind at least as tightly as
    /// `min_bp`. `0` parses a full expression including assignment.
    pub(crate) fn parse_expr(&mut self, min_bp: u8) -> Result<&'ast Expr<'ast>, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let kind = self.peek().kind;

            if let Some(op) = PostfixOp::from_token(kind) {
                if PostfixOp::BINDING_POWER < min_bp {
                    break;
                }
                let token = self.advance();
                let span = lhs.span().to(token.span);
                lhs = self.alloc(Expr::Postfix(self.arena.alloc(PostfixExpr {
                    operand: lhs,
                    op,
                    span,
                })));
                continue;
            }

            match kind {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_ident()?;
                    let span = lhs.span().to(member.span);
                    lhs = self.alloc(Expr::Member(self.arena.alloc(MemberExpr {
                        object: lhs,
                        member,
                        span,
                    })));
                    continue;
                }
                TokenKind::LeftParen => {
                    let args = self.parse_arguments()?;
                    let span = lhs.span().to(self.prev_span());
                    lhs = self.alloc(Expr::Call(self.arena.alloc(CallExpr {
                        callee: lhs,
                        args,
                        span,
                    })));
                    continue;
                }
                TokenKind::LeftBracket => {
                    return Err(ParseError::new(
                        ParseErrorKind::NotSupported,
                        self.peek().span,
                        "index operator is not supported",
                    ));
                }
                TokenKind::Question => {
                    if TERNARY_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let then_expr = self.parse_expr(TERNARY_BP)?;
                    self.expect(TokenKind::Colon)?;
                    let else_expr = self.parse_expr(TERNARY_BP)?;
                    let span = lhs.span().to(else_expr.span());
                    lhs = self.alloc(Expr::Ternary(self.arena.alloc(TernaryExpr {
                        condition: lhs,
                        then_expr,
                        else_expr,
                        span,
                    })));
                    continue;
                }
                _ => {}
            }

            if let Some(op) = AssignOp::from_token(kind) {
                let (l_bp, r_bp) = AssignOp::BINDING_POWER;
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let value = self.parse_expr(r_bp)?;
                let span = lhs.span().to(value.span());
                lhs = self.alloc(Expr::Assign(self.arena.alloc(AssignExpr {
                    target: lhs,
                    op,
                    value,
                    span,
                })));
                continue;
            }

            if let Some(op) = BinaryOp::from_token(kind) {
                let (l_bp, r_bp) = op.binding_power();
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let right = self.parse_expr(r_bp)?;
                let span = lhs.span().to(right.span());
                lhs = self.alloc(Expr::Binary(self.arena.alloc(BinaryExpr {
                    left: lhs,
                    op,
                    right,
                    span,
                })));
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    #[inline]
    fn alloc(&self, expr: Expr<'ast>) -> &'ast Expr<'ast> {
        self.arena.alloc(expr)
    }

    fn literal(&self, kind: LiteralKind<'ast>, span: Span) -> &'ast Expr<'ast> {
        self.alloc(Expr::Literal(LiteralExpr { kind, span }))
    }

    fn parse_prefix(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let token = *self.peek();

        if let Some(op) = UnaryOp::from_token(token.kind) {
            self.advance();
            let operand = self.parse_expr(UnaryOp::BINDING_POWER)?;
            let span = token.span.to(operand.span());
            return Ok(self.alloc(Expr::Unary(self.arena.alloc(UnaryExpr {
                op,
                operand,
                span,
            }))));
        }

        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = token.lexeme.parse::<u64>().map_err(|_| {
                    ParseError::new(
                        ParseErrorKind::InvalidLiteral,
                        token.span,
                        format!("integer literal '{}' is too large", token.lexeme),
                    )
                })?;
                Ok(self.literal(LiteralKind::Int(value), token.span))
            }
            TokenKind::BitsLiteral => {
                self.advance();
                let (radix, digits) = match &token.lexeme[..2] {
                    "0x" | "0X" => (16, &token.lexeme[2..]),
                    "0b" | "0B" => (2, &token.lexeme[2..]),
                    "0o" | "0O" => (8, &token.lexeme[2..]),
                    _ => (10, &token.lexeme[2..]),
                };
                let value = u64::from_str_radix(digits, radix).map_err(|_| {
                    ParseError::new(
                        ParseErrorKind::InvalidLiteral,
                        token.span,
                        format!("invalid literal '{}'", token.lexeme),
                    )
                })?;
                Ok(self.literal(LiteralKind::Bits(value), token.span))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let text = token.lexeme.trim_end_matches(['f', 'F']);
                let value = text.parse::<f32>().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidLiteral, token.span, "invalid float")
                })?;
                Ok(self.literal(LiteralKind::Float(value), token.span))
            }
            TokenKind::DoubleLiteral => {
                self.advance();
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidLiteral, token.span, "invalid double")
                })?;
                Ok(self.literal(LiteralKind::Double(value), token.span))
            }
            TokenKind::StringLiteral | TokenKind::HeredocLiteral => {
                self.advance();
                let mut span = token.span;
                let mut text = token.lexeme;
                if matches!(
                    self.peek().kind,
                    TokenKind::StringLiteral | TokenKind::HeredocLiteral
                ) {
                    let mut joined = bumpalo::collections::String::from_str_in(text, self.arena);
                    while matches!(
                        self.peek().kind,
                        TokenKind::StringLiteral | TokenKind::HeredocLiteral
                    ) {
                        let next = self.advance();
                        joined.push_str(next.lexeme);
                        span = span.to(next.span);
                    }
                    text = joined.into_bump_str();
                }
                Ok(self.literal(LiteralKind::String(text), span))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(self.literal(LiteralKind::Bool(token.kind == TokenKind::True), token.span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.literal(LiteralKind::Null, token.span))
            }
            TokenKind::This => {
                self.advance();
                Ok(self.alloc(Expr::This(token.span)))
            }
            TokenKind::Identifier | TokenKind::ColonColon => {
                let scope = self.parse_scope_prefix();
                let ident = self.expect_ident()?;
                Ok(self.alloc(Expr::Ident(QualifiedName { scope, ident })))
            }
            TokenKind::Cast => self.parse_cast(),
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RightParen)?;
                let span = token.span.to(self.prev_span());
                Ok(self.alloc(Expr::Paren(self.arena.alloc(ParenExpr { inner, span }))))
            }
            kind if primitive_of(kind).is_some() && self.peek_nth(1).kind == TokenKind::LeftParen => {
                let ty = self.parse_type()?;
                let args = self.parse_arguments()?;
                let span = token.span.to(self.prev_span());
                Ok(self.alloc(Expr::Construct(self.arena.alloc(ConstructExpr { ty, args, span }))))
            }
            TokenKind::Eof => Err(ParseError::unexpected_eof(token.span)),
            _ => Err(ParseError::expected_expression(
                token.span,
                &format!("'{}'", token.lexeme),
            )),
        }
    }

    /// `cast<T>(expr)`
    fn parse_cast(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let start = self.expect(TokenKind::Cast)?.span;
        self.expect(TokenKind::Less)?;
        let target: TypeExpr<'ast> = self.parse_type()?;
        self.expect(TokenKind::Greater)?;
        self.expect(TokenKind::LeftParen)?;
        let expr = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen)?;
        let span = start.to(self.prev_span());
        Ok(self.alloc(Expr::Cast(self.arena.alloc(CastExpr { target, expr, span }))))
    }

    /// `( [name:] expr, ... )`
    pub(crate) fn parse_arguments(&mut self) -> Result<&'ast [Argument<'ast>], ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut args = BumpVec::new_in(self.arena);
        if self.eat(TokenKind::RightParen).is_some() {
            return Ok(args.into_bump_slice());
        }
        loop {
            let start = self.peek().span;
            let name = if self.check(TokenKind::Identifier)
                && self.peek_nth(1).kind == TokenKind::Colon
            {
                let token = self.advance();
                self.advance();
                Some(Ident::new(token.lexeme, token.span))
            } else {
                None
            };
            let value = self.parse_expr(0)?;
            args.push(Argument {
                name,
                value,
                span: start.to(value.span()),
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen)?;
        Ok(args.into_bump_slice())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use bumpalo::Bump;

    fn parse<'a>(source: &str, arena: &'a Bump) -> &'a Expr<'a> {
        Parser::parse_expression(source, arena).unwrap()
    }

    #[test]
    fn multiplication_binds_tighter() {
        let arena = Bump::new();
        let Expr::Binary(add) = parse("1 + 2 * 3", &arena) else {
            panic!("expected binary");
        };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(add.right, Expr::Binary(mul) if mul.op == BinaryOp::Mul));
    }

    #[test]
    fn assignment_is_right_associative() {
        let arena = Bump::new();
        let Expr::Assign(outer) = parse("a = b += 2", &arena) else {
            panic!("expected assignment");
        };
        assert!(matches!(outer.value, Expr::Assign(inner) if inner.op == AssignOp::Compound(BinaryOp::Add)));
    }

    #[test]
    fn handle_assignment_target() {
        let arena = Bump::new();
        let Expr::Assign(assign) = parse("@a = b", &arena) else {
            panic!("expected assignment");
        };
        assert!(matches!(assign.target, Expr::Unary(u) if u.op == UnaryOp::HandleOf));
    }

    #[test]
    fn calls_members_and_scopes() {
        let arena = Bump::new();
        let Expr::Call(call) = parse("Game::world.spawn(1, name: \"x\")", &arena) else {
            panic!("expected call");
        };
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.args[1].name.map(|n| n.name), Some("name"));
        let Expr::Member(member) = call.callee else {
            panic!("expected member");
        };
        assert!(matches!(member.object, Expr::Ident(q) if q.scope.is_some()));
    }

    #[test]
    fn ternary_and_is() {
        let arena = Bump::new();
        let Expr::Ternary(t) = parse("h !is null ? 1 : 2", &arena) else {
            panic!("expected ternary");
        };
        assert!(matches!(t.condition, Expr::Binary(b) if b.op == BinaryOp::NotIs));
    }

    #[test]
    fn literals() {
        let arena = Bump::new();
        assert!(matches!(parse("0xFF", &arena), Expr::Literal(l) if l.kind == LiteralKind::Bits(255)));
        assert!(matches!(parse("1.5f", &arena), Expr::Literal(l) if l.kind == LiteralKind::Float(1.5)));
        assert!(matches!(parse("\"a\" \"b\"", &arena), Expr::Literal(l) if l.kind == LiteralKind::String("ab")));
    }

    #[test]
    fn conversions_and_casts() {
        let arena = Bump::new();
        assert!(matches!(parse("int(2.5)", &arena), Expr::Construct(_)));
        assert!(matches!(parse("cast<Foo>(h)", &arena), Expr::Cast(c) if c.target.to_string() == "Foo"));
    }

    #[test]
    fn postfix_and_prefix() {
        let arena = Bump::new();
        assert!(matches!(parse("-x++", &arena), Expr::Unary(u) if matches!(u.operand, Expr::Postfix(_))));
    }
}
