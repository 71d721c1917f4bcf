//! Statement parsing.

use angelscript_core::ParseError;
use bumpalo::collections::Vec as BumpVec;

use super::node::Ident;
use super::parser::Parser;
use super::stmt::*;
use super::types::TypeExpr;
use crate::lexer::TokenKind;

impl<'ast> Parser<'ast> {
    pub(crate) fn parse_block(&mut self) -> Result<Block<'ast>, ParseError> {
        let start = self.expect(TokenKind::LeftBrace)?.span;
        let mut stmts = BumpVec::new_in(self.arena);
        while !self.check(TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(ParseError::unexpected_eof(self.peek().span));
            }
            stmts.push(self.parse_statement()?);
        }
        self.advance();
        Ok(Block {
            stmts: stmts.into_bump_slice(),
            span: start.to(self.prev_span()),
        })
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let token = *self.peek();
        match token.kind {
            TokenKind::LeftBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Expr(None, token.span))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_statement()?;
                let span = token.span.to(body.span());
                Ok(Stmt::While(self.arena.alloc(WhileStmt {
                    condition,
                    body,
                    span,
                })))
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_statement()?;
                self.expect(TokenKind::While)?;
                let condition = self.parse_condition()?;
                self.expect(TokenKind::Semicolon)?;
                let span = token.span.to(self.prev_span());
                Ok(Stmt::DoWhile(self.arena.alloc(DoWhileStmt {
                    body,
                    condition,
                    span,
                })))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Break(token.span))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Continue(token.span))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr(0)?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return(ReturnStmt {
                    value,
                    span: token.span.to(self.prev_span()),
                }))
            }
            TokenKind::Try => {
                self.advance();
                let try_block = self.parse_block()?;
                self.expect(TokenKind::Catch)?;
                let catch_block = self.parse_block()?;
                let span = token.span.to(catch_block.span);
                Ok(Stmt::Try(self.arena.alloc(TryStmt {
                    try_block,
                    catch_block,
                    span,
                })))
            }
            _ if self.is_var_decl_start() => {
                let ty = self.parse_type()?;
                let name = self.expect_ident()?;
                Ok(Stmt::Var(self.parse_var_declarators(ty, name)?))
            }
            _ => {
                let expr = self.parse_expr(0)?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(Some(expr), expr.span().to(self.prev_span())))
            }
        }
    }

    /// Rest of a variable declaration after its type and first name, up to
    /// and including the `;`.
    pub(crate) fn parse_var_declarators(
        &mut self,
        ty: TypeExpr<'ast>,
        first: Ident<'ast>,
    ) -> Result<VarDecl<'ast>, ParseError> {
        let mut vars = BumpVec::new_in(self.arena);
        let mut name = first;
        loop {
            let init = if self.eat(TokenKind::Equal).is_some() {
                Some(VarInit::Expr(self.parse_expr(2)?))
            } else if self.check(TokenKind::LeftParen) {
                Some(VarInit::Args(self.parse_arguments()?))
            } else {
                None
            };
            vars.push(VarDeclarator {
                name,
                init,
                span: name.span.to(self.prev_span()),
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
            name = self.expect_ident()?;
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(VarDecl {
            ty,
            vars: vars.into_bump_slice(),
            span: ty.span.to(self.prev_span()),
        })
    }

    fn parse_condition(&mut self) -> Result<&'ast super::Expr<'ast>, ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let expr = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen)?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::If)?.span;
        let condition = self.parse_condition()?;
        let then_branch = self.parse_statement()?;
        let else_branch = if self.eat(TokenKind::Else).is_some() {
            Some(self.parse_statement()?)
        } else {
            None
        };
        let span = start.to(self.prev_span());
        Ok(Stmt::If(self.arena.alloc(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        })))
    }

    fn parse_for(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::For)?.span;
        self.expect(TokenKind::LeftParen)?;

        let init = if self.eat(TokenKind::Semicolon).is_some() {
            None
        } else if self.is_var_decl_start() {
            let ty = self.parse_type()?;
            let name = self.expect_ident()?;
            Some(ForInit::Var(self.parse_var_declarators(ty, name)?))
        } else {
            let expr = self.parse_expr(0)?;
            self.expect(TokenKind::Semicolon)?;
            Some(ForInit::Expr(expr))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        self.expect(TokenKind::Semicolon)?;

        let mut update = BumpVec::new_in(self.arena);
        if !self.check(TokenKind::RightParen) {
            loop {
                update.push(self.parse_expr(0)?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_statement()?;
        let span = start.to(body.span());
        Ok(Stmt::For(self.arena.alloc(ForStmt {
            init,
            condition,
            update: update.into_bump_slice(),
            body,
            span,
        })))
    }

    fn parse_switch(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::Switch)?.span;
        let expr = self.parse_condition()?;
        self.expect(TokenKind::LeftBrace)?;

        let mut cases = BumpVec::new_in(self.arena);
        while !self.check(TokenKind::RightBrace) {
            let case_start = self.peek().span;
            let mut values = BumpVec::new_in(self.arena);
            let mut is_default = false;
            // consecutive labels share one body
            loop {
                if self.eat(TokenKind::Case).is_some() {
                    values.push(self.parse_expr(3)?);
                    self.expect(TokenKind::Colon)?;
                } else if self.eat(TokenKind::Default).is_some() {
                    is_default = true;
                    self.expect(TokenKind::Colon)?;
                } else {
                    break;
                }
            }
            if values.is_empty() && !is_default {
                let token = *self.peek();
                return Err(ParseError::expected_token(
                    token.span,
                    "'case' or 'default'",
                    &format!("'{}'", token.lexeme),
                ));
            }
            let mut body = BumpVec::new_in(self.arena);
            while !matches!(
                self.peek().kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RightBrace | TokenKind::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                values: values.into_bump_slice(),
                is_default,
                body: body.into_bump_slice(),
                span: case_start.to(self.prev_span()),
            });
        }
        self.expect(TokenKind::RightBrace)?;
        let span = start.to(self.prev_span());
        Ok(Stmt::Switch(self.arena.alloc(SwitchStmt {
            expr,
            cases: cases.into_bump_slice(),
            span,
        })))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use bumpalo::Bump;

    fn body<'a>(source: &str, arena: &'a Bump) -> &'a [Stmt<'a>] {
        let script = Parser::parse(source, arena).unwrap();
        let Item::Function(f) = script.items()[0] else {
            panic!("expected function");
        };
        f.body.unwrap().stmts
    }

    #[test]
    fn declarations_versus_expressions() {
        let arena = Bump::new();
        let stmts = body("void f() { Foo@ h; a = b; int x = 1, y; Foo f(1); x++; }", &arena);
        assert!(matches!(stmts[0], Stmt::Var(v) if v.ty.is_handle));
        assert!(matches!(stmts[1], Stmt::Expr(Some(_), _)));
        assert!(matches!(stmts[2], Stmt::Var(v) if v.vars.len() == 2));
        assert!(matches!(stmts[3], Stmt::Var(v) if matches!(v.vars[0].init, Some(VarInit::Args(a)) if a.len() == 1)));
        assert!(matches!(stmts[4], Stmt::Expr(Some(Expr::Postfix(_)), _)));
    }

    #[test]
    fn loops() {
        let arena = Bump::new();
        let stmts = body(
            "void f() { for (int i = 0; i < 3; i++, j--) {} while (true) break; do { continue; } while (false); }",
            &arena,
        );
        assert!(matches!(stmts[0], Stmt::For(f) if f.update.len() == 2 && matches!(f.init, Some(ForInit::Var(_)))));
        assert!(matches!(stmts[1], Stmt::While(_)));
        assert!(matches!(stmts[2], Stmt::DoWhile(_)));
    }

    #[test]
    fn switch_groups_labels() {
        let arena = Bump::new();
        let stmts = body(
            "void f(int x) { switch (x) { case 1: case 2: x = 0; break; default: x = 1; } }",
            &arena,
        );
        let Stmt::Switch(s) = stmts[0] else {
            panic!("expected switch");
        };
        assert_eq!(s.cases.len(), 2);
        assert_eq!(s.cases[0].values.len(), 2);
        assert!(s.cases[1].is_default);
    }

    #[test]
    fn try_catch_and_if_else() {
        let arena = Bump::new();
        let stmts = body("void f() { try { g(); } catch { return; } if (a) b(); else c(); }", &arena);
        assert!(matches!(stmts[0], Stmt::Try(_)));
        assert!(matches!(stmts[1], Stmt::If(i) if i.else_branch.is_some()));
    }
}
