//! Converts source text into tokens.
//!
//! The whole input is scanned up front; the parser needs unbounded
//! lookahead to tell declarations from expressions. Identifier lexemes and
//! unescaped string contents are copied into the arena.

use angelscript_core::{LexError, Span};
use bumpalo::Bump;

use super::cursor::{Cursor, is_ident_continue, is_ident_start};
use super::token::{Token, TokenKind, lookup_keyword};

pub struct Lexer<'src, 'ast> {
    cursor: Cursor<'src>,
    arena: &'ast Bump,
    errors: Vec<LexError>,
}

impl<'src, 'ast> Lexer<'src, 'ast> {
    pub fn new(source: &'src str, arena: &'ast Bump) -> Self {
        Self {
            cursor: Cursor::new(source),
            arena,
            errors: Vec::new(),
        }
    }

    /// Scan every token, ending with a single `Eof`.
    pub fn tokenize(mut self) -> (Vec<Token<'ast>>, Vec<LexError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, self.errors)
    }

    fn scan_token(&mut self) -> Token<'ast> {
        loop {
            self.skip_whitespace();
            if self.cursor.check_str("//") {
                self.cursor.eat_while(|c| c != '\n');
                continue;
            }
            if self.cursor.check_str("/*") {
                let (line, col) = (self.cursor.line(), self.cursor.column());
                self.cursor.advance_n(2);
                loop {
                    if self.cursor.is_eof() {
                        self.errors.push(LexError::UnterminatedComment {
                            span: Span::new(line, col, 2),
                        });
                        break;
                    }
                    if self.cursor.check_str("*/") {
                        self.cursor.advance_n(2);
                        break;
                    }
                    self.cursor.advance();
                }
                continue;
            }
            break;
        }

        let start = self.cursor.offset();
        let (line, col) = (self.cursor.line(), self.cursor.column());

        let Some(c) = self.cursor.peek() else {
            return Token::new(TokenKind::Eof, "", Span::point(line, col), start);
        };

        if c == '"' || c == '\'' {
            return self.scan_string(c, start, line, col);
        }
        if c.is_ascii_digit() || (c == '.' && self.cursor.peek_nth(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number(start, line, col);
        }
        if is_ident_start(c) {
            let text = self.cursor.eat_while(is_ident_continue);
            let kind = lookup_keyword(text).unwrap_or(TokenKind::Identifier);
            let lexeme = self.arena.alloc_str(text);
            return Token::new(kind, lexeme, Span::new(line, col, text.len() as u32), start);
        }
        self.scan_operator(start, line, col)
    }

    fn skip_whitespace(&mut self) {
        if self.cursor.check_str("\u{FEFF}") {
            self.cursor.advance();
        }
        self.cursor.eat_while(|c| c.is_whitespace());
    }

    fn make(&self, kind: TokenKind, start: u32, line: u32, col: u32) -> Token<'ast> {
        let text = self.cursor.slice_from(start);
        Token::new(
            kind,
            self.arena.alloc_str(text),
            Span::new(line, col, text.len() as u32),
            start,
        )
    }

    fn scan_string(&mut self, quote: char, start: u32, line: u32, col: u32) -> Token<'ast> {
        if quote == '"' && self.cursor.check_str("\"\"\"") {
            self.cursor.advance_n(3);
            let body_start = self.cursor.offset();
            loop {
                if self.cursor.is_eof() {
                    self.errors.push(LexError::UnterminatedString {
                        span: Span::new(line, col, 3),
                    });
                    return self.make(TokenKind::Error, start, line, col);
                }
                if self.cursor.check_str("\"\"\"") {
                    break;
                }
                self.cursor.advance();
            }
            let body = self.cursor.slice_from(body_start);
            self.cursor.advance_n(3);
            let len = self.cursor.offset() - start;
            return Token::new(
                TokenKind::HeredocLiteral,
                self.arena.alloc_str(body),
                Span::new(line, col, len),
                start,
            );
        }

        self.cursor.advance();
        let mut value = String::new();
        loop {
            match self.cursor.peek() {
                None | Some('\n') => {
                    self.errors.push(LexError::UnterminatedString {
                        span: Span::new(line, col, 1),
                    });
                    return self.make(TokenKind::Error, start, line, col);
                }
                Some(c) if c == quote => {
                    self.cursor.advance();
                    break;
                }
                Some('\\') => {
                    self.cursor.advance();
                    let esc_line = self.cursor.line();
                    let esc_col = self.cursor.column();
                    match self.cursor.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('0') => value.push('\0'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some('\'') => value.push('\''),
                        Some(kind @ ('x' | 'u' | 'U')) => {
                            let digits = match kind {
                                'x' => 2,
                                'u' => 4,
                                _ => 8,
                            };
                            let hex_start = self.cursor.offset();
                            for _ in 0..digits {
                                if self.cursor.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                                    self.cursor.advance();
                                }
                            }
                            let hex = self.cursor.slice_from(hex_start);
                            match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                                Some(ch) if !hex.is_empty() => value.push(ch),
                                _ => self.errors.push(LexError::InvalidNumber {
                                    span: Span::new(esc_line, esc_col, hex.len() as u32 + 1),
                                    detail: "invalid escape sequence".into(),
                                }),
                            }
                        }
                        Some(other) => {
                            self.errors.push(LexError::UnexpectedChar {
                                ch: other,
                                span: Span::new(esc_line, esc_col, 1),
                            });
                        }
                        None => {}
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.cursor.advance();
                }
            }
        }
        let len = self.cursor.offset() - start;
        Token::new(
            TokenKind::StringLiteral,
            self.arena.alloc_str(&value),
            Span::new(line, col, len),
            start,
        )
    }

    fn scan_number(&mut self, start: u32, line: u32, col: u32) -> Token<'ast> {
        if self.cursor.peek() == Some('0') {
            let radix_digit = match self.cursor.peek_nth(1) {
                Some('x' | 'X') => Some(16),
                Some('b' | 'B') => Some(2),
                Some('o' | 'O') => Some(8),
                Some('d' | 'D') => Some(10),
                _ => None,
            };
            if let Some(radix) = radix_digit {
                self.cursor.advance_n(2);
                let digits = self.cursor.eat_while(|c| c.is_digit(radix));
                if digits.is_empty() {
                    self.errors.push(LexError::InvalidNumber {
                        span: Span::new(line, col, 2),
                        detail: "missing digits after radix prefix".into(),
                    });
                    return self.make(TokenKind::Error, start, line, col);
                }
                return self.make(TokenKind::BitsLiteral, start, line, col);
            }
        }

        let mut is_real = false;
        self.cursor.eat_while(|c| c.is_ascii_digit());
        if self.cursor.peek() == Some('.') && self.cursor.peek_nth(1).is_none_or(|c| !is_ident_start(c)) {
            is_real = true;
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(self.cursor.peek(), Some('e' | 'E')) {
            let sign_then_digit = match self.cursor.peek_nth(1) {
                Some('+' | '-') => self.cursor.peek_nth(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if sign_then_digit {
                is_real = true;
                self.cursor.advance();
                if matches!(self.cursor.peek(), Some('+' | '-')) {
                    self.cursor.advance();
                }
                self.cursor.eat_while(|c| c.is_ascii_digit());
            }
        }
        if matches!(self.cursor.peek(), Some('f' | 'F')) {
            self.cursor.advance();
            return self.make(TokenKind::FloatLiteral, start, line, col);
        }
        let kind = if is_real {
            TokenKind::DoubleLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.make(kind, start, line, col)
    }

    fn scan_operator(&mut self, start: u32, line: u32, col: u32) -> Token<'ast> {
        use TokenKind::*;

        const OPERATORS: &[(&str, TokenKind)] = &[
            (">>>=", GreaterGreaterGreaterEqual),
            (">>>", GreaterGreaterGreater),
            ("**=", StarStarEqual),
            ("<<=", LessLessEqual),
            (">>=", GreaterGreaterEqual),
            ("**", StarStar),
            ("++", PlusPlus),
            ("--", MinusMinus),
            ("&&", AmpAmp),
            ("||", PipePipe),
            ("^^", CaretCaret),
            ("+=", PlusEqual),
            ("-=", MinusEqual),
            ("*=", StarEqual),
            ("/=", SlashEqual),
            ("%=", PercentEqual),
            ("&=", AmpEqual),
            ("|=", PipeEqual),
            ("^=", CaretEqual),
            ("==", EqualEqual),
            ("!=", BangEqual),
            ("<=", LessEqual),
            (">=", GreaterEqual),
            ("<<", LessLess),
            (">>", GreaterGreater),
            ("::", ColonColon),
            ("+", Plus),
            ("-", Minus),
            ("*", Star),
            ("/", Slash),
            ("%", Percent),
            ("&", Amp),
            ("|", Pipe),
            ("^", Caret),
            ("~", Tilde),
            ("!", Bang),
            ("=", Equal),
            ("<", Less),
            (">", Greater),
            ("?", Question),
            (":", Colon),
            (".", Dot),
            (",", Comma),
            (";", Semicolon),
            ("(", LeftParen),
            (")", RightParen),
            ("{", LeftBrace),
            ("}", RightBrace),
            ("[", LeftBracket),
            ("]", RightBracket),
            ("@", At),
        ];

        if self.cursor.check_str("!is") && self.cursor.peek_nth(3).is_none_or(|c| !is_ident_continue(c)) {
            self.cursor.advance_n(3);
            return self.make(NotIs, start, line, col);
        }

        for (text, kind) in OPERATORS {
            if self.cursor.check_str(text) {
                self.cursor.advance_n(text.len());
                return self.make(*kind, start, line, col);
            }
        }

        let ch = self.cursor.advance().unwrap_or('\0');
        self.errors.push(LexError::UnexpectedChar {
            ch,
            span: Span::new(line, col, ch.len_utf8() as u32),
        });
        self.make(Error, start, line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let arena = Bump::new();
        let (tokens, errors) = Lexer::new(source, &arena).tokenize();
        assert!(errors.is_empty(), "{errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1 2.5 3.0f 1e3 0xFF .5"),
            vec![
                TokenKind::IntLiteral,
                TokenKind::DoubleLiteral,
                TokenKind::FloatLiteral,
                TokenKind::DoubleLiteral,
                TokenKind::BitsLiteral,
                TokenKind::DoubleLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("a >>>= b >> c"),
            vec![
                TokenKind::Identifier,
                TokenKind::GreaterGreaterGreaterEqual,
                TokenKind::Identifier,
                TokenKind::GreaterGreater,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn not_is_is_one_token() {
        assert_eq!(
            kinds("a !is null"),
            vec![TokenKind::Identifier, TokenKind::NotIs, TokenKind::Null, TokenKind::Eof]
        );
        assert_eq!(
            kinds("!isValid"),
            vec![TokenKind::Bang, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn strings_are_unescaped() {
        let arena = Bump::new();
        let (tokens, errors) = Lexer::new(r#""a\tb\x41" """raw\n""""#, &arena).tokenize();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].lexeme, "a\tbA");
        assert_eq!(tokens[1].kind, TokenKind::HeredocLiteral);
        assert_eq!(tokens[1].lexeme, "raw\\n");
    }

    #[test]
    fn comments_and_positions() {
        let arena = Bump::new();
        let (tokens, _) = Lexer::new("// c\n/* x */ int y", &arena).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[0].span.line, 2);
        assert_eq!(tokens[1].span.col, 13);
        assert_eq!(tokens[1].offset, 17);
    }

    #[test]
    fn unterminated_string_is_reported() {
        let arena = Bump::new();
        let (_, errors) = Lexer::new("\"abc", &arena).tokenize();
        assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
    }
}
