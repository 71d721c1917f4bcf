//! Token kinds produced by the lexer.

use angelscript_core::Span;
use std::fmt;

/// A token with its text and position.
///
/// The lexeme lives in the parse arena so the AST can borrow it after the
/// source string is gone.
#[derive(Clone, Copy, PartialEq)]
pub struct Token<'ast> {
    pub kind: TokenKind,
    pub lexeme: &'ast str,
    pub span: Span,
    /// Byte offset of the first character in the source.
    pub offset: u32,
}

impl<'ast> Token<'ast> {
    #[inline]
    pub fn new(kind: TokenKind, lexeme: &'ast str, span: Span, offset: u32) -> Self {
        Self {
            kind,
            lexeme,
            span,
            offset,
        }
    }

    /// Byte offset one past the last character.
    #[inline]
    pub fn end_offset(&self) -> u32 {
        self.offset + self.span.len
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?} @ {:?})", self.kind, self.lexeme, self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // literals
    IntLiteral,
    /// `0x1F`, `0b101`, `0o17`, `0d99`
    BitsLiteral,
    FloatLiteral,
    DoubleLiteral,
    StringLiteral,
    HeredocLiteral,

    Identifier,

    // primitive type keywords
    Void,
    Bool,
    Int,
    Int8,
    Int16,
    Int64,
    UInt,
    UInt8,
    UInt16,
    UInt64,
    Float,
    Double,
    Auto,

    // value keywords
    True,
    False,
    Null,
    This,

    // control flow
    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Try,
    Catch,

    // declarations
    Class,
    Interface,
    Enum,
    Namespace,
    Funcdef,
    Typedef,
    Import,
    Const,
    Private,
    Protected,
    Cast,
    In,
    Out,
    InOut,

    // operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Amp,
    Pipe,
    Caret,
    Tilde,
    AmpAmp,
    PipePipe,
    CaretCaret,
    Bang,
    Is,
    NotIs,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    StarStarEqual,
    SlashEqual,
    PercentEqual,
    AmpEqual,
    PipeEqual,
    CaretEqual,
    LessLessEqual,
    GreaterGreaterEqual,
    GreaterGreaterGreaterEqual,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LessLess,
    GreaterGreater,
    GreaterGreaterGreater,
    Question,
    Colon,
    ColonColon,
    Dot,
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    At,

    Eof,
    Error,
}

impl TokenKind {
    /// `true` for keywords naming a primitive type or `auto`.
    pub fn is_primitive_type(self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Int
                | TokenKind::Int8
                | TokenKind::Int16
                | TokenKind::Int64
                | TokenKind::UInt
                | TokenKind::UInt8
                | TokenKind::UInt16
                | TokenKind::UInt64
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Auto
        )
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::StarStarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
                | TokenKind::AmpEqual
                | TokenKind::PipeEqual
                | TokenKind::CaretEqual
                | TokenKind::LessLessEqual
                | TokenKind::GreaterGreaterEqual
                | TokenKind::GreaterGreaterGreaterEqual
        )
    }

    /// Human readable description used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::IntLiteral | TokenKind::BitsLiteral => "integer literal",
            TokenKind::FloatLiteral | TokenKind::DoubleLiteral => "float literal",
            TokenKind::StringLiteral | TokenKind::HeredocLiteral => "string literal",
            TokenKind::Identifier => "identifier",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::Eof => "end of file",
            TokenKind::Error => "invalid token",
            _ => "token",
        }
    }
}

/// Keyword lookup for an identifier-shaped lexeme.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "void" => TokenKind::Void,
        "bool" => TokenKind::Bool,
        "int" | "int32" => TokenKind::Int,
        "int8" => TokenKind::Int8,
        "int16" => TokenKind::Int16,
        "int64" => TokenKind::Int64,
        "uint" | "uint32" => TokenKind::UInt,
        "uint8" => TokenKind::UInt8,
        "uint16" => TokenKind::UInt16,
        "uint64" => TokenKind::UInt64,
        "float" => TokenKind::Float,
        "double" => TokenKind::Double,
        "auto" => TokenKind::Auto,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "this" => TokenKind::This,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "class" => TokenKind::Class,
        "interface" => TokenKind::Interface,
        "enum" => TokenKind::Enum,
        "namespace" => TokenKind::Namespace,
        "funcdef" => TokenKind::Funcdef,
        "typedef" => TokenKind::Typedef,
        "import" => TokenKind::Import,
        "const" => TokenKind::Const,
        "private" => TokenKind::Private,
        "protected" => TokenKind::Protected,
        "cast" => TokenKind::Cast,
        "in" => TokenKind::In,
        "out" => TokenKind::Out,
        "inout" => TokenKind::InOut,
        "is" => TokenKind::Is,
        "and" => TokenKind::AmpAmp,
        "or" => TokenKind::PipePipe,
        "xor" => TokenKind::CaretCaret,
        "not" => TokenKind::Bang,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_aliases() {
        assert_eq!(lookup_keyword("int32"), Some(TokenKind::Int));
        assert_eq!(lookup_keyword("uint"), Some(TokenKind::UInt));
        assert_eq!(lookup_keyword("and"), Some(TokenKind::AmpAmp));
        assert_eq!(lookup_keyword("player"), None);
    }

    #[test]
    fn primitive_type_classification() {
        assert!(TokenKind::Double.is_primitive_type());
        assert!(TokenKind::Auto.is_primitive_type());
        assert!(!TokenKind::Identifier.is_primitive_type());
        assert!(TokenKind::PercentEqual.is_assignment());
        assert!(!TokenKind::EqualEqual.is_assignment());
    }
}
